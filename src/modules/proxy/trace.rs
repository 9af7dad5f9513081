//! Per-request access-trace records.
//!
//! One record per proxied request, emitted on the dedicated `proxy_trace`
//! target so deployments can route it to its own sink. The field shape is a
//! stable contract consumed by an external log-counting collaborator.

use tracing::info;

/// The fields of one access-trace record.
#[derive(Debug)]
pub struct TraceRecord<'a> {
    /// Resolved client IP.
    pub custom_ip: &'a str,
    /// Served domain.
    pub domain: &'a str,
    /// Clearance level the response was masked at; 0 when unmasked.
    pub masking_level: u8,
    /// Request path.
    pub path: &'a str,
    /// Listening port.
    pub port: u16,
    /// Chosen upstream target.
    pub target: &'a str,
    /// Resolved username; empty when anonymous.
    pub username: &'a str,
}

/// Emit the record.
pub fn emit(record: &TraceRecord<'_>) {
    info!(
        target: "proxy_trace",
        customIp = %record.custom_ip,
        domain = %record.domain,
        maskingLevel = record.masking_level,
        path = %record.path,
        port = record.port,
        target = %record.target,
        username = %record.username,
        "requesting record"
    );
}
