//! Event queue polling
//!
//! Drains an SQS queue of S3 object-creation notifications, collecting the
//! object keys of newly landed log batches. Consumed messages are deleted;
//! delivery is at-least-once and duplicate keys are tolerated downstream.

use aws_sdk_sqs::Client as SqsClient;
use serde::Deserialize;
use thiserror::Error;

/// Errors draining the notification queue
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed to receive messages: {0}")]
    Receive(String),

    #[error("failed to delete message: {0}")]
    Delete(String),

    #[error("malformed event body: {0}")]
    Body(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct S3Event {
    #[serde(rename = "Records")]
    records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct S3EventRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct S3Entity {
    object: S3Object,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct S3Object {
    key: String,
}

/// Extract the object keys named by one S3 event notification body.
pub fn parse_event_body(body: &str) -> Result<Vec<String>, QueueError> {
    let event: S3Event = serde_json::from_str(body)?;
    Ok(event.records.into_iter().map(|r| r.s3.object.key).collect())
}

/// Polls an SQS queue for S3 event notifications.
pub struct QueuePoller {
    client: SqsClient,
    queue_url: String,
}

impl QueuePoller {
    pub fn new(client: SqsClient, queue_url: impl Into<String>) -> Self {
        QueuePoller {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Drain the queue, returning every object key its messages name.
    ///
    /// Receives up to 10 messages at a time with a 5 second long poll and
    /// loops until the queue reports empty. Each message is deleted after
    /// its body has been parsed.
    pub async fn drain_keys(&self) -> Result<Vec<String>, QueueError> {
        let mut keys = Vec::new();

        loop {
            let output = self
                .client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(10)
                .wait_time_seconds(5)
                .send()
                .await
                .map_err(|err| QueueError::Receive(err.to_string()))?;

            let messages = output.messages.unwrap_or_default();
            if messages.is_empty() {
                log::info!("no more messages in queue");
                break;
            }

            for message in messages {
                if let Some(body) = message.body() {
                    keys.extend(parse_event_body(body)?);
                }

                match message.receipt_handle() {
                    Some(receipt) => {
                        self.client
                            .delete_message()
                            .queue_url(&self.queue_url)
                            .receipt_handle(receipt)
                            .send()
                            .await
                            .map_err(|err| QueueError::Delete(err.to_string()))?;
                    }
                    None => log::warn!("message has no receipt handle, cannot delete"),
                }
            }
        }

        Ok(keys)
    }
}
