//! IP metadata enrichment using the IPInfo batch API
//!
//! Aggregated client IPs are looked up in one batch request and decorated
//! with location/organization attributes before delivery. Lookups are
//! best-effort single attempts; a failed request fails the run.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{BlockCount, BlockedIp};

/// Errors that can occur during metadata lookups
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lookup service returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Metadata for one IP as returned by the lookup service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IpDetails {
    pub ip: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub org: String,
}

/// Batch lookup of IP metadata, keyed by the queried address.
#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn lookup_batch(
        &self,
        ips: &[IpAddr],
    ) -> Result<HashMap<String, IpDetails>, EnrichError>;
}

const IPINFO_BATCH_URL: &str = "https://ipinfo.io/batch";

/// IPInfo.io client
pub struct IpInfoClient {
    http: Client,
    token: String,
    base_url: String,
}

impl IpInfoClient {
    pub fn new(token: impl Into<String>) -> Self {
        IpInfoClient {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            token: token.into(),
            base_url: IPINFO_BATCH_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (local stubs, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl IpLookup for IpInfoClient {
    async fn lookup_batch(
        &self,
        ips: &[IpAddr],
    ) -> Result<HashMap<String, IpDetails>, EnrichError> {
        let payload: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();

        let response = self
            .http
            .post(&self.base_url)
            .query(&[("token", self.token.as_str())])
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EnrichError::Status(response.status()));
        }

        let details: HashMap<String, IpDetails> = response.json().await?;
        Ok(details)
    }
}

/// Decorate aggregated block counts with lookup metadata.
///
/// Keys that do not parse as IP addresses are skipped before the lookup
/// (the degenerate empty-string key from address-less log lines falls out
/// here). IPs the service does not return are dropped. The result is
/// ordered by descending count, ties broken by IP, so downstream
/// pagination is deterministic.
pub async fn decorate_blocked_ips<L: IpLookup>(
    lookup: &L,
    counts: HashMap<String, BlockCount>,
) -> Result<Vec<BlockedIp>, EnrichError> {
    let mut addresses = Vec::with_capacity(counts.len());
    for ip in counts.keys() {
        match ip.parse::<IpAddr>() {
            Ok(addr) => addresses.push(addr),
            Err(_) => log::warn!("skipping unenrichable client IP {:?}", ip),
        }
    }

    let details = lookup.lookup_batch(&addresses).await?;

    let mut out = Vec::with_capacity(details.len());
    for (ip, info) in &details {
        let entry = match counts.get(ip) {
            Some(entry) => entry,
            None => continue,
        };

        out.push(BlockedIp {
            ip: entry.ip.clone(),
            count: entry.count,
            city: info.city.clone(),
            region: info.region.clone(),
            country: info.country.clone(),
            org: info.org.clone(),
        });
    }

    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));

    Ok(out)
}
