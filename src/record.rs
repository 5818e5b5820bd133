use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// One request as captured by an ingress-nginx access log line.
///
/// Records are only ever built by [`crate::parser::parse`] and are never
/// mutated afterwards; the store shares them behind `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub request_id: String,
    pub timestamp: DateTime<FixedOffset>,
    /// Upstream the ingress routed the request to (`$proxy_upstream_name`)
    pub service_name: String,
    pub remote_addr: String,
    pub http_verb: String,
    pub url: String,
    pub http_referer: String,
    pub user_agent: String,
    pub status_code: u16,
    pub body_bytes_sent: u64,
    pub request_length: u64,
    /// End-to-end latency in seconds
    pub request_time: f64,
    pub alternate_upstream: String,
    pub upstream_addr: String,
    pub upstream_response_length: u64,
    pub upstream_response_time: f64,
    pub upstream_status: String,
}

impl RequestRecord {
    /// 5xx responses count as errors
    pub fn is_error(&self) -> bool {
        self.status_code >= 500
    }

    pub fn is_lagger(&self, threshold: f64) -> bool {
        self.request_time >= threshold
    }
}
