//! Bulk resolution through a privileged backend.
//!
//! The wire types mirror the backend's batch command (`snake_case`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zonegraph_core::{
    normalize_name, DohProvider, GeoInfo, GeoProvider, ResolutionResult, ResolverConfig,
    ResolverMode, Result, ServiceProbe, TcpProbe, TopologyError,
};

use crate::resolver::{ExternalResolver, ResolveRequest, ResolverOutput};

/// Batch command arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub hostnames: Vec<String>,
    pub max_hops: u8,
    #[serde(default)]
    pub service_hosts: Vec<String>,
    pub doh_provider: DohProvider,
    #[serde(default)]
    pub doh_custom_url: Option<String>,
    pub resolver_mode: ResolverMode,
    pub dns_server: String,
    #[serde(default)]
    pub custom_dns_server: Option<String>,
    pub timeout_ms: u32,
    #[serde(default)]
    pub disable_ptr: bool,
    #[serde(default)]
    pub tcp_ports: Vec<u16>,
    #[serde(default)]
    pub disable_geo: bool,
    pub geo_provider: GeoProvider,
    pub scan_chain: bool,
}

impl BatchRequest {
    /// Build from a resolve request
    #[must_use]
    pub fn from_request(request: &ResolveRequest) -> Self {
        let config = &request.config;
        Self {
            hostnames: request.names.clone(),
            max_hops: config.max_resolution_hops,
            service_hosts: request.service_hosts.clone(),
            doh_provider: config.doh_provider,
            doh_custom_url: config.doh_custom_url.clone(),
            resolver_mode: config.resolver_mode,
            dns_server: config.dns_server.clone(),
            custom_dns_server: config.custom_dns_server.clone(),
            timeout_ms: config.lookup_timeout_ms,
            disable_ptr: config.disable_ptr_lookups,
            tcp_ports: config.tcp_service_ports.clone(),
            disable_geo: config.disable_geo_lookups,
            geo_provider: config.geo_provider,
            scan_chain: config.scan_resolution_chain,
        }
    }

    /// Resolver configuration equivalent to these arguments
    #[must_use]
    pub fn to_config(&self) -> ResolverConfig {
        ResolverConfig {
            resolver_mode: self.resolver_mode,
            dns_server: self.dns_server.clone(),
            custom_dns_server: self.custom_dns_server.clone(),
            doh_provider: self.doh_provider,
            doh_custom_url: self.doh_custom_url.clone(),
            max_resolution_hops: self.max_hops,
            lookup_timeout_ms: self.timeout_ms,
            disable_ptr_lookups: self.disable_ptr,
            disable_geo_lookups: self.disable_geo,
            geo_provider: self.geo_provider,
            scan_resolution_chain: self.scan_chain,
            tcp_service_ports: self.tcp_ports.clone(),
            ..ResolverConfig::default()
        }
    }
}

/// PTR names of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseEntry {
    pub ip: String,
    #[serde(default)]
    pub hostnames: Vec<String>,
}

/// Country of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoEntry {
    pub ip: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

/// One resolved hostname
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResolution {
    pub name: String,
    #[serde(default)]
    pub chain: Vec<String>,
    #[serde(default)]
    pub terminal: String,
    #[serde(default)]
    pub ipv4: Vec<String>,
    #[serde(default)]
    pub ipv6: Vec<String>,
    #[serde(default)]
    pub reverse_hostnames: Vec<ReverseEntry>,
    #[serde(default)]
    pub geo_by_ip: Vec<GeoEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<BatchResolution> for ResolutionResult {
    fn from(wire: BatchResolution) -> Self {
        let name = normalize_name(&wire.name);
        let mut chain: Vec<String> = wire
            .chain
            .iter()
            .map(|hop| normalize_name(hop))
            .filter(|hop| !hop.is_empty())
            .collect();
        if chain.first() != Some(&name) {
            chain.insert(0, name.clone());
        }
        let terminal = Some(normalize_name(&wire.terminal))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| chain.last().cloned().unwrap_or_else(|| name.clone()));
        if chain.last() != Some(&terminal) {
            chain.push(terminal.clone());
        }

        let reverse_hostnames_by_ip: BTreeMap<String, Vec<String>> = wire
            .reverse_hostnames
            .into_iter()
            .filter(|entry| !entry.hostnames.is_empty())
            .map(|entry| (entry.ip, entry.hostnames))
            .collect();
        let geo_by_ip = wire
            .geo_by_ip
            .into_iter()
            .map(|entry| {
                (
                    entry.ip,
                    GeoInfo {
                        country: entry.country,
                        country_code: entry.country_code,
                    },
                )
            })
            .collect();

        Self {
            requested_name: Some(name),
            chain,
            terminal,
            ipv4: wire.ipv4,
            ipv6: wire.ipv6,
            reverse_hostnames_by_ip,
            geo_by_ip,
            error: wire.error.filter(|e| !e.is_empty()),
            ..Self::default()
        }
    }
}

/// HTTP(S) probe result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProbe {
    pub host: String,
    pub https_up: bool,
    pub http_up: bool,
}

/// TCP probe result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTcpProbe {
    pub host: String,
    pub port: u16,
    pub up: bool,
}

/// Batch command response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub resolutions: Vec<BatchResolution>,
    #[serde(default)]
    pub probes: Vec<BatchProbe>,
    #[serde(default)]
    pub tcp_probes: Vec<BatchTcpProbe>,
}

impl From<BatchResponse> for ResolverOutput {
    fn from(response: BatchResponse) -> Self {
        let results = response
            .resolutions
            .into_iter()
            .filter(|r| !r.name.trim().is_empty())
            .map(|r| {
                let result = ResolutionResult::from(r);
                let key = result.chain[0].clone();
                (key, result)
            })
            .collect();
        Self {
            results,
            probes: response
                .probes
                .into_iter()
                .map(|p| ServiceProbe {
                    host: p.host,
                    https_up: p.https_up,
                    http_up: p.http_up,
                })
                .collect(),
            tcp_probes: response
                .tcp_probes
                .into_iter()
                .map(|p| TcpProbe {
                    host: p.host,
                    port: p.port,
                    up: p.up,
                })
                .collect(),
        }
    }
}

/// A privileged bulk resolver
#[async_trait]
pub trait BatchBackend: Send + Sync {
    /// Resolve every hostname and probe every service host
    async fn resolve_batch(&self, request: BatchRequest) -> Result<BatchResponse>;
}

/// [`ExternalResolver`] over an optional [`BatchBackend`].
///
/// Without a backend every call fails with
/// [`TopologyError::BackendUnavailable`], which callers treat as a signal to
/// fall back.
#[derive(Clone, Default)]
pub struct BatchBackendResolver {
    backend: Option<Arc<dyn BatchBackend>>,
}

impl std::fmt::Debug for BatchBackendResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchBackendResolver")
            .field("available", &self.backend.is_some())
            .finish()
    }
}

impl BatchBackendResolver {
    /// Resolver backed by `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn BatchBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Resolver with no backend
    #[must_use]
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Returns true if a backend is attached
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }
}

#[async_trait]
impl ExternalResolver for BatchBackendResolver {
    fn name(&self) -> &'static str {
        "batch"
    }

    async fn resolve(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolverOutput> {
        let Some(backend) = &self.backend else {
            return Err(TopologyError::BackendUnavailable(
                "no batch backend attached".into(),
            ));
        };

        let wire = BatchRequest::from_request(request);
        debug!(
            hosts = wire.hostnames.len(),
            service_hosts = wire.service_hosts.len(),
            "dispatching batch resolution"
        );
        let response = tokio::select! {
            () = cancel.cancelled() => return Err(TopologyError::Cancelled),
            response = backend.resolve_batch(wire) => response?,
        };

        let mut output = ResolverOutput::from(response);
        let max_hops = request.config.max_hops();
        for result in output.results.values_mut() {
            *result = std::mem::take(result).bounded(max_hops);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_round_trips_backend_json() {
        let json = serde_json::json!({
            "resolutions": [{
                "name": "WWW.example.com.",
                "chain": ["www.example.com", "edge.cdn.net."],
                "terminal": "edge.cdn.net",
                "ipv4": ["198.51.100.7"],
                "ipv6": [],
                "reverse_hostnames": [{"ip": "198.51.100.7", "hostnames": ["pop.cdn.net"]}],
                "geo_by_ip": [{"ip": "198.51.100.7", "country": "Germany", "country_code": "DE"}],
                "error": null
            }],
            "probes": [{"host": "www.example.com", "https_up": true, "http_up": false}],
            "tcp_probes": [{"host": "www.example.com", "port": 443, "up": true}]
        });
        let response: BatchResponse = serde_json::from_value(json).unwrap();
        let output = ResolverOutput::from(response);

        let result = &output.results["www.example.com"];
        assert_eq!(result.chain, vec!["www.example.com", "edge.cdn.net"]);
        assert_eq!(result.terminal, "edge.cdn.net");
        assert_eq!(result.reverse_hostnames_by_ip["198.51.100.7"], vec!["pop.cdn.net"]);
        assert_eq!(
            result.geo_by_ip["198.51.100.7"].country_code.as_deref(),
            Some("DE")
        );
        assert!(output.probes[0].https_up);
        assert_eq!(output.tcp_probes[0].port, 443);
    }

    #[test]
    fn test_missing_chain_is_repaired() {
        let result = ResolutionResult::from(BatchResolution {
            name: "api.example.com".into(),
            ipv4: vec!["192.0.2.1".into()],
            ..BatchResolution::default()
        });
        assert_eq!(result.chain, vec!["api.example.com"]);
        assert_eq!(result.terminal, "api.example.com");
    }

    #[test]
    fn test_request_carries_config() {
        let config = ResolverConfig {
            disable_ptr_lookups: true,
            tcp_service_ports: vec![22, 443],
            ..ResolverConfig::default()
        };
        let request = ResolveRequest {
            names: vec!["a.example.net".into()],
            service_hosts: vec!["www".into()],
            config: config.clone(),
        };
        let wire = BatchRequest::from_request(&request);
        assert!(wire.disable_ptr);
        assert_eq!(wire.tcp_ports, vec![22, 443]);
        assert_eq!(wire.to_config().cache_partition(), config.cache_partition());

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["scan_chain"], true);
        assert_eq!(json["doh_provider"], "cloudflare");
    }

    struct LoopingBackend;

    #[async_trait]
    impl BatchBackend for LoopingBackend {
        async fn resolve_batch(&self, request: BatchRequest) -> Result<BatchResponse> {
            let resolutions = request
                .hostnames
                .into_iter()
                .map(|name| BatchResolution {
                    chain: vec![
                        name.clone(),
                        "a.cdn.net".into(),
                        "b.cdn.net".into(),
                        "a.cdn.net".into(),
                        "c.cdn.net".into(),
                    ],
                    terminal: "c.cdn.net".into(),
                    ipv4: vec!["198.51.100.3".into()],
                    name,
                    ..BatchResolution::default()
                })
                .collect();
            Ok(BatchResponse {
                resolutions,
                ..BatchResponse::default()
            })
        }
    }

    #[tokio::test]
    async fn test_backend_chains_are_bounded() {
        let resolver = BatchBackendResolver::new(Arc::new(LoopingBackend));
        let cancel = CancellationToken::new();

        let short = ResolverConfig {
            max_resolution_hops: 1,
            ..ResolverConfig::default()
        };
        let output = resolver
            .resolve(&ResolveRequest::single("www.example.com", short), &cancel)
            .await
            .unwrap();
        let result = &output.results["www.example.com"];
        assert_eq!(result.chain, vec!["www.example.com", "a.cdn.net"]);
        assert_eq!(result.terminal, "a.cdn.net");
        assert!(!result.has_addresses());

        let output = resolver
            .resolve(
                &ResolveRequest::single("www.example.com", ResolverConfig::default()),
                &cancel,
            )
            .await
            .unwrap();
        let result = &output.results["www.example.com"];
        assert_eq!(
            result.chain,
            vec!["www.example.com", "a.cdn.net", "b.cdn.net"]
        );
        assert_eq!(result.terminal, "b.cdn.net");
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let resolver = BatchBackendResolver::unavailable();
        let request = ResolveRequest::single("a.example.net", ResolverConfig::default());
        let err = resolver
            .resolve(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_fallback_trigger());
        assert!(!resolver.is_available());
    }
}
