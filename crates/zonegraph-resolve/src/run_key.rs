//! Run keys: fingerprints of everything a resolution run depends on.

use ring::digest::{Context, SHA256};
use serde::Serialize;
use zonegraph_core::{normalize_name, Record, ResolverConfig, Result};

/// Identity of a resolution run.
///
/// Two runs with the same key would produce the same snapshot, so the second
/// can be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RunKey(String);

impl RunKey {
    /// SHA-256 of `records || zone || config || refresh`, hex encoded.
    ///
    /// Records are fingerprinted in order; every configuration field takes
    /// part.
    pub fn compute(
        records: &[Record],
        zone: &str,
        config: &ResolverConfig,
        refresh: u64,
    ) -> Result<Self> {
        let mut context = Context::new(&SHA256);

        context.update(records.len().to_string().as_bytes());
        context.update(b"|");
        for record in records {
            context.update(&serde_json::to_vec(record)?);
            context.update(b"\n");
        }
        context.update(b"|");

        context.update(normalize_name(zone).as_bytes());
        context.update(b"|");

        context.update(&serde_json::to_vec(config)?);
        context.update(b"|");

        context.update(&refresh.to_be_bytes());

        Ok(Self(hex::encode(context.finish().as_ref())))
    }

    /// Hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated digest for logs
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for RunKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonegraph_core::RecordType;

    fn records() -> Vec<Record> {
        vec![
            Record::new("1", RecordType::Cname, "www", "edge.example.net"),
            Record::new("2", RecordType::A, "edge.example.net", "203.0.113.5"),
        ]
    }

    fn key(records: &[Record], zone: &str, config: &ResolverConfig, refresh: u64) -> RunKey {
        RunKey::compute(records, zone, config, refresh).unwrap()
    }

    #[test]
    fn test_stable_for_same_inputs() {
        let config = ResolverConfig::default();
        let a = key(&records(), "example.com", &config, 0);
        let b = key(&records(), "Example.COM.", &config, 0);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_changes_with_each_input() {
        let config = ResolverConfig::default();
        let base = key(&records(), "example.com", &config, 0);

        let mut edited = records();
        edited[1].content = "203.0.113.6".into();
        assert_ne!(base, key(&edited, "example.com", &config, 0));

        assert_ne!(base, key(&records(), "example.org", &config, 0));

        let no_ptr = ResolverConfig {
            disable_ptr_lookups: true,
            ..ResolverConfig::default()
        };
        assert_ne!(base, key(&records(), "example.com", &no_ptr, 0));

        let ports = ResolverConfig {
            tcp_service_ports: vec![22],
            ..ResolverConfig::default()
        };
        assert_ne!(base, key(&records(), "example.com", &ports, 0));

        assert_ne!(base, key(&records(), "example.com", &config, 1));
    }
}
