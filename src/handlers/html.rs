//! Minimal HTML table rendering for browsers
//!
//! Column order follows the access log line.

use crate::record::RequestRecord;

const COLUMNS: [&str; 17] = [
    "request_id",
    "timestamp",
    "remote_addr",
    "http_verb",
    "url",
    "status_code",
    "body_bytes_sent",
    "http_referer",
    "user_agent",
    "request_length",
    "request_time",
    "service_name",
    "alternate_upstream",
    "upstream_addr",
    "upstream_response_length",
    "upstream_response_time",
    "upstream_status",
];

fn cells(record: &RequestRecord) -> [String; 17] {
    [
        record.request_id.clone(),
        record.timestamp.to_rfc3339(),
        record.remote_addr.clone(),
        record.http_verb.clone(),
        record.url.clone(),
        record.status_code.to_string(),
        record.body_bytes_sent.to_string(),
        record.http_referer.clone(),
        record.user_agent.clone(),
        record.request_length.to_string(),
        record.request_time.to_string(),
        record.service_name.clone(),
        record.alternate_upstream.clone(),
        record.upstream_addr.clone(),
        record.upstream_response_length.to_string(),
        record.upstream_response_time.to_string(),
        record.upstream_status.clone(),
    ]
}

pub fn records_table(records: &[&RequestRecord]) -> String {
    let mut html = String::from("<table border=\"1\" class=\"dataframe\">\n<thead>\n<tr>");
    for column in COLUMNS {
        html.push_str("<th>");
        html.push_str(column);
        html.push_str("</th>");
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");

    for record in records {
        html.push_str("<tr>");
        for cell in cells(record) {
            html.push_str("<td>");
            html.push_str(&escape(&cell));
            html.push_str("</td>");
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>\n");
    html
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
