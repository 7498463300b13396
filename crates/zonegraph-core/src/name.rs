//! Hostname normalization.
//!
//! Every map key and comparison in the engine uses the normalized form:
//! trimmed, lowercase, with trailing dots removed.

use std::net::IpAddr;

/// Normalize a hostname. Idempotent.
#[must_use]
pub fn normalize_name(input: &str) -> String {
    input
        .trim()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .to_lowercase()
}

/// Normalize a record owner name, expanding `@` (or an empty name) to the
/// zone apex.
#[must_use]
pub fn owner_name(name: &str, zone: &str) -> String {
    let normalized = normalize_name(name);
    if normalized.is_empty() || normalized == "@" {
        normalize_name(zone)
    } else {
        normalized
    }
}

/// Returns true if the string is a literal IPv4 or IPv6 address
#[must_use]
pub fn is_ip_literal(value: &str) -> bool {
    value.trim().parse::<IpAddr>().is_ok()
}
