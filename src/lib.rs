pub mod aggregation;
pub mod alerting;
pub mod config;
pub mod enrichment;
pub mod input;
pub mod models;
pub mod pipeline;

// Re-export commonly used types
pub use aggregation::{aggregate_batch, merge_batch, RuleAllowList};
pub use alerting::SlackNotifier;
pub use config::Config;
pub use enrichment::{decorate_blocked_ips, IpInfoClient, IpLookup};
pub use input::{BatchFetcher, QueuePoller, S3BatchFetcher};
pub use models::{BlockCount, BlockedIp, WafLog};
pub use pipeline::{Pipeline, PipelineError};
