//! Notification delivery to Slack webhooks
//!
//! Builds a Block Kit document summarising blocked client IPs as a table
//! and posts it to every configured webhook. Delivery is paginated: each
//! page of records becomes its own message.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use crate::models::BlockedIp;

/// Errors that can occur during summary delivery
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook {webhook} returned status {status}: {body}")]
    Status {
        webhook: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("page size must be at least 1")]
    ZeroPageSize,
}

/// Posts blocked-IP summaries to one or more Slack webhooks.
pub struct SlackNotifier {
    client: Client,
    webhooks: Vec<String>,
}

impl SlackNotifier {
    pub fn new(webhooks: Vec<String>) -> Self {
        SlackNotifier {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            webhooks,
        }
    }

    /// Deliver the summary, `page_size` records per message.
    ///
    /// Pages are sent in order to every webhook; the first failed delivery
    /// aborts the remainder. Single attempt, no retries.
    pub async fn post_summary(
        &self,
        ips: &[BlockedIp],
        page_size: usize,
    ) -> Result<(), AlertError> {
        if page_size == 0 {
            return Err(AlertError::ZeroPageSize);
        }

        let title = format!(
            "WAF block report for {}",
            chrono::Utc::now().format("%Y-%m-%d")
        );
        let pages = ips.chunks(page_size).len();

        for (index, page) in ips.chunks(page_size).enumerate() {
            let description = format!(
                "Blocked client IPs, page {} of {} ({} unique IPs in total).",
                index + 1,
                pages,
                ips.len()
            );
            let document = build_document(&title, &description, page);

            for webhook in &self.webhooks {
                self.post_document(webhook, &document).await?;
            }

            log::info!("posted summary page {}/{}", index + 1, pages);
        }

        Ok(())
    }

    async fn post_document(
        &self,
        webhook: &str,
        document: &serde_json::Value,
    ) -> Result<(), AlertError> {
        let response = self.client.post(webhook).json(document).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Status {
                webhook: webhook.to_string(),
                status,
                body,
            });
        }

        Ok(())
    }
}

/// Build the Block Kit document for one page of records: a header block,
/// a description section, and a table with a bold header row.
fn build_document(title: &str, description: &str, ips: &[BlockedIp]) -> serde_json::Value {
    let mut rows = vec![header_row()];
    for ip in ips {
        rows.push(ip_row(ip));
    }

    serde_json::json!({
        "blocks": [
            {
                "type": "header",
                "text": { "type": "plain_text", "text": title }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": description }
            },
            {
                "type": "table",
                "rows": rows
            }
        ]
    })
}

fn header_row() -> Vec<serde_json::Value> {
    ["IP", "Country", "Region", "City", "Org", "Count"]
        .iter()
        .map(|label| text_cell(label, true))
        .collect()
}

fn ip_row(ip: &BlockedIp) -> Vec<serde_json::Value> {
    vec![
        text_cell(&ip.ip, false),
        text_cell(&ip.country, false),
        text_cell(&ip.region, false),
        text_cell(&ip.city, false),
        text_cell(&ip.org, false),
        text_cell(&ip.count.to_string(), false),
    ]
}

fn text_cell(text: &str, bold: bool) -> serde_json::Value {
    let mut element = serde_json::json!({ "type": "text", "text": text });
    if bold {
        element["style"] = serde_json::json!({ "bold": true });
    }

    serde_json::json!({
        "type": "rich_text",
        "elements": [{
            "type": "rich_text_section",
            "elements": [element]
        }]
    })
}
