use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use structopt::StructOpt;

use wafwatch::aggregation::RuleAllowList;
use wafwatch::alerting::SlackNotifier;
use wafwatch::config::Config;
use wafwatch::enrichment::{decorate_blocked_ips, IpInfoClient};
use wafwatch::input::{QueuePoller, S3BatchFetcher};
use wafwatch::pipeline::Pipeline;

/// WAF block-log aggregation and notification job
#[derive(StructOpt, Debug)]
#[structopt(name = "wafwatch", about = "Aggregates WAF block logs and notifies Slack")]
struct Opt {
    /// Load configuration from a TOML file instead of the environment
    #[structopt(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let opt = Opt::from_args();

    let config = match opt.config {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };

    // Cancellation is cooperative: the pipeline stops at the next batch
    // boundary and the run fails without partial delivery.
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    ctrlc::set_handler(move || {
        log::info!("received shutdown signal, cancelling run");
        flag.store(true, Ordering::SeqCst);
    })?;

    let aws_config = aws_config::load_from_env().await;
    let s3 = aws_sdk_s3::Client::new(&aws_config);
    let sqs = aws_sdk_sqs::Client::new(&aws_config);

    let poller = QueuePoller::new(sqs, &config.queue_url);
    let keys = poller.drain_keys().await?;
    log::info!("processing {} keys", keys.len());

    let rules = RuleAllowList::new(config.allowed_rule_ids.clone());
    let pipeline =
        Pipeline::new(S3BatchFetcher::new(s3, &config.bucket), rules).with_cancel_flag(cancelled);

    let counts = pipeline.run(&keys).await?;
    if counts.is_empty() {
        log::info!("no blocked requests matched the allow-list, nothing to report");
        return Ok(());
    }

    log::info!("decorating {} IPs", counts.len());
    let lookup = IpInfoClient::new(&config.ipinfo_token);
    let ips = decorate_blocked_ips(&lookup, counts).await?;

    let notifier = SlackNotifier::new(config.slack_webhooks.clone());
    notifier.post_summary(&ips, config.batch_size).await?;

    log::info!("finished, reported {} unique IPs", ips.len());
    Ok(())
}
