//! ingress-nginx access log parsing
//!
//! Turns one line of the ingress controller's default `log-format-upstream`
//! into a [`RequestRecord`]:
//!
//! ```text
//! $remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent
//! "$http_referer" "$http_user_agent" $request_length $request_time
//! [$proxy_upstream_name] [$proxy_alternative_upstream_name] $upstream_addr
//! $upstream_response_length $upstream_response_time $upstream_status $req_id
//! ```
//!
//! Numeric slots are matched loosely and converted afterwards, so a line with
//! the right shape but a bad value is reported as [`ParseError::InvalidField`]
//! rather than as a structural mismatch. Either way no record is produced.

use chrono::{DateTime, FixedOffset};
use regex::{Captures, Regex};
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

use crate::record::RequestRecord;

const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

static ACCESS_LOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<remote_addr>[0-9A-Fa-f.:]+) - - ",
        r"\[(?P<time_local>\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4})\] ",
        r#""(?P<http_verb>\w+) (?P<url>.+) HTTP/(?:\d(?:\.\d)?)" "#,
        r"(?P<status_code>\S+) (?P<body_bytes_sent>\S+) ",
        r#""(?P<http_referer>.*)" "(?P<user_agent>.*)" "#,
        r"(?P<request_length>\S+) (?P<request_time>\S+) ",
        r"\[(?P<proxy_upstream_name>[^\]]+)\] \[(?P<proxy_alternative_upstream>[^\]]*)\] ",
        r"(?P<upstream_addr>[^\s,]+(?:, [^\s,]+)*) ",
        r"(?P<upstream_response_length>[^\s,]+(?:, [^\s,]+)*) ",
        r"(?P<upstream_response_time>[^\s,]+(?:, [^\s,]+)*) ",
        r"(?P<upstream_status>[^\s,]+(?:, [^\s,]+)*) ",
        r"(?P<request_id>[0-9a-f]+)$",
    ))
    .expect("access log pattern is a valid regex")
});

/// Why a line did not produce a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line does not match the access log format")]
    NoMatch,
    #[error("field {field} has unconvertible value {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// Parse one access log line.
///
/// Trailing whitespace (including the newline delivered by a follow-mode
/// read) is ignored. When nginx retried the request against several
/// upstreams, `upstream_response_length` and `upstream_response_time` hold
/// one value per attempt; the value of the final attempt is kept.
pub fn parse(line: &str) -> Result<RequestRecord, ParseError> {
    let caps = ACCESS_LOG
        .captures(line.trim_end())
        .ok_or(ParseError::NoMatch)?;

    Ok(RequestRecord {
        request_id: text(&caps, "request_id"),
        timestamp: timestamp(&caps)?,
        service_name: text(&caps, "proxy_upstream_name"),
        remote_addr: text(&caps, "remote_addr"),
        http_verb: text(&caps, "http_verb"),
        url: text(&caps, "url"),
        http_referer: text(&caps, "http_referer"),
        user_agent: text(&caps, "user_agent"),
        status_code: number(&caps, "status_code")?,
        body_bytes_sent: number(&caps, "body_bytes_sent")?,
        request_length: number(&caps, "request_length")?,
        request_time: number(&caps, "request_time")?,
        alternate_upstream: text(&caps, "proxy_alternative_upstream"),
        upstream_addr: text(&caps, "upstream_addr"),
        upstream_response_length: last_attempt(&caps, "upstream_response_length")?,
        upstream_response_time: last_attempt(&caps, "upstream_response_time")?,
        upstream_status: text(&caps, "upstream_status"),
    })
}

fn raw<'h>(caps: &Captures<'h>, field: &'static str) -> &'h str {
    caps.name(field).map(|m| m.as_str()).unwrap_or_default()
}

fn text(caps: &Captures<'_>, field: &'static str) -> String {
    raw(caps, field).to_string()
}

/// Unsigned decimal with an optional fraction, as nginx writes numbers.
/// `FromStr` alone would also take signs, exponents, `NaN` and `inf`.
fn is_plain_number(value: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match value.split_once('.') {
        Some((whole, fraction)) => digits(whole) && digits(fraction),
        None => digits(value),
    }
}

fn convert<T: FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    let invalid = || ParseError::InvalidField {
        field,
        value: value.to_string(),
    };
    if !is_plain_number(value) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

fn number<T: FromStr>(caps: &Captures<'_>, field: &'static str) -> Result<T, ParseError> {
    convert(field, raw(caps, field))
}

fn last_attempt<T: FromStr>(caps: &Captures<'_>, field: &'static str) -> Result<T, ParseError> {
    let value = raw(caps, field);
    convert(field, value.rsplit(", ").next().unwrap_or(value))
}

fn timestamp(caps: &Captures<'_>) -> Result<DateTime<FixedOffset>, ParseError> {
    let value = raw(caps, "time_local");
    DateTime::parse_from_str(value, TIME_LOCAL_FORMAT).map_err(|_| ParseError::InvalidField {
        field: "time_local",
        value: value.to_string(),
    })
}
