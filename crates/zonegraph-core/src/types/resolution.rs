use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Error text used for candidates nothing could resolve
pub const NO_RECORDS_FOUND: &str = "no records found";

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    /// Derived from the zone's own records
    Local,
    /// Obtained from an external resolver
    #[default]
    External,
}

/// Country information for an address
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeoInfo {
    /// Full country name
    #[serde(default)]
    pub country: Option<String>,

    /// Two-letter country code (ISO 3166-1 alpha-2)
    #[serde(default)]
    pub country_code: Option<String>,
}

/// The resolved path of one hostname: CNAME hops, terminal and addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    /// Name that was asked for, when different from `chain[0]` bookkeeping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_name: Option<String>,

    /// Hop names starting at the query name
    pub chain: Vec<String>,

    /// Final name of the chain
    pub terminal: String,

    /// IPv4 addresses of the terminal
    #[serde(default)]
    pub ipv4: Vec<String>,

    /// IPv6 addresses of the terminal
    #[serde(default)]
    pub ipv6: Vec<String>,

    /// PTR hostnames by address
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reverse_hostnames_by_ip: BTreeMap<String, Vec<String>>,

    /// Country by address
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub geo_by_ip: BTreeMap<String, GeoInfo>,

    /// Origin of this resolution
    #[serde(default)]
    pub source: ResolutionSource,

    /// Failure description, when resolution did not succeed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolutionResult {
    /// Result for a candidate nothing could resolve
    #[must_use]
    pub fn placeholder(name: &str) -> Self {
        Self {
            requested_name: Some(name.to_string()),
            chain: vec![name.to_string()],
            terminal: name.to_string(),
            error: Some(NO_RECORDS_FOUND.to_string()),
            ..Self::default()
        }
    }

    /// Returns true if the terminal has at least one address
    #[must_use]
    pub fn has_addresses(&self) -> bool {
        !self.ipv4.is_empty() || !self.ipv6.is_empty()
    }

    /// All addresses, IPv4 first
    pub fn addresses(&self) -> impl Iterator<Item = &String> {
        self.ipv4.iter().chain(self.ipv6.iter())
    }

    /// Number of CNAME hops taken (chain length minus the query name)
    #[must_use]
    pub fn hop_count(&self) -> usize {
        self.chain.len().saturating_sub(1)
    }

    /// The same resolution seen from one of its hops.
    ///
    /// Returns `None` if `hop` is not part of the chain.
    #[must_use]
    pub fn from_hop(&self, hop: &str) -> Option<Self> {
        let index = self.chain.iter().position(|h| h == hop)?;
        if index == 0 {
            return Some(Self {
                requested_name: Some(hop.to_string()),
                ..self.clone()
            });
        }
        Some(Self {
            requested_name: Some(hop.to_string()),
            chain: self.chain[index..].to_vec(),
            ..self.clone()
        })
    }

    /// Prefix this resolution with local hops that lead to its first name.
    ///
    /// `prefix` must end just before `chain[0]`. The joined chain is
    /// bounded like any other, see [`bounded`](Self::bounded).
    #[must_use]
    pub fn with_prefix(&self, prefix: &[String], max_hops: usize) -> Self {
        let mut chain = prefix.to_vec();
        chain.extend(self.chain.iter().cloned());
        Self {
            requested_name: prefix.first().cloned().or_else(|| self.requested_name.clone()),
            chain,
            ..self.clone()
        }
        .bounded(max_hops)
    }

    /// Cut the chain at its first repeated name and at `max_hops` hops.
    ///
    /// When the cut falls before the real terminal, the last kept hop
    /// becomes the terminal and the terminal's addresses are dropped.
    #[must_use]
    pub fn bounded(mut self, max_hops: usize) -> Self {
        let limit = max_hops.saturating_add(1);
        let mut seen = HashSet::new();
        let kept = self
            .chain
            .iter()
            .take_while(|hop| seen.insert(hop.as_str()))
            .take(limit)
            .count();
        if kept == self.chain.len() {
            return self;
        }

        self.chain.truncate(kept);
        if let Some(last) = self.chain.last() {
            self.terminal = last.clone();
        }
        self.ipv4.clear();
        self.ipv6.clear();
        self.reverse_hostnames_by_ip.clear();
        self.geo_by_ip.clear();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResolutionResult {
        ResolutionResult {
            requested_name: Some("www.example.com".into()),
            chain: vec![
                "www.example.com".into(),
                "edge.cdn.net".into(),
                "pop1.cdn.net".into(),
            ],
            terminal: "pop1.cdn.net".into(),
            ipv4: vec!["198.51.100.7".into()],
            ..ResolutionResult::default()
        }
    }

    #[test]
    fn test_placeholder_is_total() {
        let p = ResolutionResult::placeholder("gone.example.com");
        assert_eq!(p.chain, vec!["gone.example.com"]);
        assert_eq!(p.terminal, "gone.example.com");
        assert!(!p.has_addresses());
        assert_eq!(p.error.as_deref(), Some(NO_RECORDS_FOUND));
    }

    #[test]
    fn test_from_hop_slices_chain() {
        let sub = sample().from_hop("edge.cdn.net").unwrap();
        assert_eq!(sub.chain, vec!["edge.cdn.net", "pop1.cdn.net"]);
        assert_eq!(sub.terminal, "pop1.cdn.net");
        assert_eq!(sub.requested_name.as_deref(), Some("edge.cdn.net"));
        assert_eq!(sub.ipv4, vec!["198.51.100.7"]);
        assert!(sample().from_hop("other.net").is_none());
    }

    #[test]
    fn test_prefix_extends_chain() {
        let sub = sample().from_hop("edge.cdn.net").unwrap();
        let full = sub.with_prefix(&["cdn.example.com".to_string()], 15);
        assert_eq!(full.chain, vec!["cdn.example.com", "edge.cdn.net", "pop1.cdn.net"]);
        assert_eq!(full.requested_name.as_deref(), Some("cdn.example.com"));
        assert_eq!(full.hop_count(), 2);
        assert_eq!(full.ipv4, vec!["198.51.100.7"]);
    }

    #[test]
    fn test_prefix_respects_hop_limit() {
        let full = sample().with_prefix(&["cdn.example.com".to_string()], 2);
        assert_eq!(full.chain, vec!["cdn.example.com", "www.example.com", "edge.cdn.net"]);
        assert_eq!(full.terminal, "edge.cdn.net");
        assert!(!full.has_addresses());
    }

    #[test]
    fn test_prefix_stops_at_repeated_hop() {
        let looping = ResolutionResult {
            chain: vec!["edge.cdn.net".into(), "www.example.com".into(), "z.net".into()],
            terminal: "z.net".into(),
            ipv4: vec!["192.0.2.9".into()],
            ..ResolutionResult::default()
        };
        let full = looping.with_prefix(&["www.example.com".to_string()], 15);
        assert_eq!(full.chain, vec!["www.example.com", "edge.cdn.net"]);
        assert_eq!(full.terminal, "edge.cdn.net");
        assert!(full.ipv4.is_empty());
    }

    #[test]
    fn test_bounded_keeps_short_chains() {
        assert_eq!(sample().bounded(2), sample());
        assert_eq!(sample().bounded(15), sample());
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["requestedName"], "www.example.com");
        assert_eq!(json["source"], "external");
        assert!(json.get("reverseHostnamesByIp").is_none());
    }
}
