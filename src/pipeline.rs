//! Pipeline orchestration
//!
//! Sequences fetch → decompress → aggregate → merge over an ordered list of
//! batch keys. The first hard failure aborts the run with the offending key;
//! counts already aggregated from earlier batches are discarded with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::aggregation::{
    aggregate_batch, merge_batch, open_batch, DecodeError, RuleAllowList, ScanError,
};
use crate::input::{BatchFetcher, FetchError};
use crate::models::BlockCount;

/// A hard failure in one stage of the run, tagged with the batch it hit.
/// Line-level parse failures never surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to fetch batch {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to decode batch {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: DecodeError,
    },

    #[error("failed to scan batch {key}: {source}")]
    Scan {
        key: String,
        #[source]
        source: ScanError,
    },

    #[error("run cancelled before batch {key}")]
    Cancelled { key: String },
}

/// Runs the ingestion pipeline over a list of batch keys.
pub struct Pipeline<F> {
    fetcher: F,
    rules: RuleAllowList,
    cancel: Option<Arc<AtomicBool>>,
}

impl<F: BatchFetcher> Pipeline<F> {
    pub fn new(fetcher: F, rules: RuleAllowList) -> Self {
        Pipeline {
            fetcher,
            rules,
            cancel: None,
        }
    }

    /// Abort between batches once the flag is raised. A batch is never
    /// half-merged: cancellation takes effect only at batch boundaries.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Process every batch key in order and return the run-wide counts.
    ///
    /// An empty key list yields an empty map. On any fetch, decode, or
    /// stream failure the whole run fails; the caller receives only the
    /// error, never a partial map.
    pub async fn run(&self, keys: &[String]) -> Result<HashMap<String, BlockCount>, PipelineError> {
        let mut global: HashMap<String, BlockCount> = HashMap::new();

        for key in keys {
            if self.is_cancelled() {
                return Err(PipelineError::Cancelled { key: key.clone() });
            }

            log::info!("handling batch {}", key);

            let bytes = self
                .fetcher
                .fetch_batch(key)
                .await
                .map_err(|source| PipelineError::Fetch {
                    key: key.clone(),
                    source,
                })?;

            let reader = open_batch(bytes).map_err(|source| PipelineError::Decode {
                key: key.clone(),
                source,
            })?;

            let counts =
                aggregate_batch(reader, &self.rules).map_err(|source| PipelineError::Scan {
                    key: key.clone(),
                    source,
                })?;

            merge_batch(&mut global, counts);
        }

        log::info!(
            "aggregated {} batches into {} unique client IPs",
            keys.len(),
            global.len()
        );

        Ok(global)
    }
}
