use serde::{Deserialize, Serialize};

/// One parsed line of a WAF log batch.
///
/// Unknown fields in the source JSON are ignored; missing fields default to
/// empty strings so a degenerate line still produces a usable record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WafLog {
    pub action: String,
    pub terminating_rule_id: String,
    pub http_request: HttpRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpRequest {
    pub client_ip: String,
}

/// Running block tally for one client IP. Lives for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCount {
    pub ip: String,
    pub count: u64,
}

/// A blocked client IP decorated with IPInfo metadata, ready for delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockedIp {
    pub ip: String,
    pub count: u64,
    pub city: String,
    pub region: String,
    pub country: String,
    pub org: String,
}
