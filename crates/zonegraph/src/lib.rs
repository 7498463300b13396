//! DNS zone topology resolution and graph construction.
//!
//! Turns the flat record list of a zone into a graph of owners, CNAME
//! chains, mail exchangers and addresses, then enriches it with external
//! resolution of every target the zone points at.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use zonegraph::{Record, RecordType, ResolverConfig, ZoneTopology};
//!
//! #[tokio::main]
//! async fn main() -> zonegraph::Result<()> {
//!     let config = ResolverConfig::default();
//!     let engine = ZoneTopology::builder().system_backend().build(&config)?;
//!
//!     let records = vec![
//!         Record::new("1", RecordType::Cname, "www", "shop.myshopify.com"),
//!         Record::new("2", RecordType::Mx, "@", "10 mail.example.net"),
//!     ];
//!
//!     // Local view, no network
//!     let local = engine.local(&records, "example.com", &config)?;
//!     println!("{} nodes", local.graph.nodes.len());
//!
//!     // Resolved view
//!     if let Some(topology) = engine.resolve(&records, "example.com", &config).await? {
//!         for service in &topology.summary.detected_services {
//!             println!("{} -> {}", service.target, service.provider);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `default` - Uses rustls for TLS
//! - `rustls` - Use rustls for TLS (recommended)
//! - `native-tls` - Use system native TLS

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

// Re-export core types
pub use zonegraph_core::*;

// Re-export resolution
pub use zonegraph_resolve::{
    BatchBackend, CoordinatorStatus, ProgressState, ResolutionCache, ResolutionCoordinator,
    RunOutcome, SystemBatchBackend,
};
pub use zonegraph_resolve as resolve;

// Re-export runtime for convenience
pub use serde;
pub use serde_json;
pub use tokio;

/// The topology engine: local graph building plus coordinated external
/// resolution.
#[derive(Debug)]
pub struct ZoneTopology {
    coordinator: ResolutionCoordinator,
    fingerprinter: ServiceFingerprinter,
}

impl ZoneTopology {
    /// Start configuring an engine
    #[must_use]
    pub fn builder() -> ZoneTopologyBuilder {
        ZoneTopologyBuilder::default()
    }

    /// Topology from the zone's own records only
    pub fn local(
        &self,
        records: &[Record],
        zone: &str,
        config: &ResolverConfig,
    ) -> Result<Topology> {
        let config = config.clone().validate()?;
        let builder = RecordGraphBuilder::new(records, zone, config.max_hops());
        Ok(GraphAssembler::new(&builder, &self.fingerprinter).assemble())
    }

    /// Resolve the zone's targets externally and assemble the full topology.
    ///
    /// Returns `None` if a newer call superseded this one before it
    /// finished.
    pub async fn resolve(
        &self,
        records: &[Record],
        zone: &str,
        config: &ResolverConfig,
    ) -> Result<Option<Topology>> {
        let outcome = self.coordinator.run(records, zone, config).await?;
        let Some(snapshot) = outcome.snapshot() else {
            debug!(zone, "resolution superseded");
            return Ok(None);
        };

        let config = config.clone().validate()?;
        let builder = RecordGraphBuilder::new(records, zone, config.max_hops());
        Ok(Some(
            GraphAssembler::new(&builder, &self.fingerprinter)
                .with_snapshot(snapshot)
                .assemble(),
        ))
    }

    /// Progress of the current run
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.coordinator.subscribe()
    }

    /// Force the next [`resolve`](Self::resolve) to go to the network
    pub fn refresh(&self) {
        self.coordinator.refresh();
    }

    /// Forget the published snapshot, keeping cached results
    pub fn invalidate(&self) {
        self.coordinator.invalidate();
    }

    /// Abandon the run in flight
    pub fn cancel(&self) {
        self.coordinator.cancel();
    }

    /// The underlying coordinator
    pub const fn coordinator(&self) -> &ResolutionCoordinator {
        &self.coordinator
    }

    /// The fingerprinter
    pub const fn fingerprinter(&self) -> &ServiceFingerprinter {
        &self.fingerprinter
    }
}

/// Builder for [`ZoneTopology`]
#[derive(Default)]
pub struct ZoneTopologyBuilder {
    backend: Option<Arc<dyn BatchBackend>>,
    system_backend: bool,
    fingerprinter: Option<ServiceFingerprinter>,
    cache: Option<ResolutionCache>,
}

impl std::fmt::Debug for ZoneTopologyBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneTopologyBuilder")
            .field("backend", &self.backend.is_some())
            .field("system_backend", &self.system_backend)
            .finish_non_exhaustive()
    }
}

impl ZoneTopologyBuilder {
    /// Use a privileged batch backend
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn BatchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Resolve batches in-process with [`SystemBatchBackend`]
    #[must_use]
    pub const fn system_backend(mut self) -> Self {
        self.system_backend = true;
        self
    }

    /// Replace the built-in provider patterns
    #[must_use]
    pub fn fingerprinter(mut self, fingerprinter: ServiceFingerprinter) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self
    }

    /// Use this cache (e.g. one with a manual clock)
    #[must_use]
    pub fn cache(mut self, cache: ResolutionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the engine.
    ///
    /// `config` sizes the DoH rate limiter; per-run settings come from the
    /// config passed to each call.
    pub fn build(self, config: &ResolverConfig) -> Result<ZoneTopology> {
        let config = config.clone().validate()?;
        let backend = match (self.backend, self.system_backend) {
            (Some(backend), _) => Some(backend),
            (None, true) => {
                Some(Arc::new(SystemBatchBackend::new(&config)?) as Arc<dyn BatchBackend>)
            }
            (None, false) => None,
        };

        let mut coordinator = ResolutionCoordinator::standard(backend, &config)?;
        if let Some(cache) = self.cache {
            coordinator = coordinator.with_cache(cache);
        }
        Ok(ZoneTopology {
            coordinator,
            fingerprinter: self.fingerprinter.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zonegraph_resolve::batch::{BatchRequest, BatchResolution, BatchResponse};

    #[derive(Default)]
    struct StaticBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BatchBackend for StaticBackend {
        async fn resolve_batch(&self, request: BatchRequest) -> Result<BatchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let resolutions = request
                .hostnames
                .iter()
                .map(|name| match name.as_str() {
                    "shop.myshopify.com" => BatchResolution {
                        name: name.clone(),
                        chain: vec![name.clone(), "shops.myshopify.com".into()],
                        terminal: "shops.myshopify.com".into(),
                        ipv4: vec!["23.227.38.65".into()],
                        ..BatchResolution::default()
                    },
                    _ => BatchResolution {
                        name: name.clone(),
                        error: Some("no CNAME/A/AAAA records found".into()),
                        ..BatchResolution::default()
                    },
                })
                .collect();
            Ok(BatchResponse {
                resolutions,
                ..BatchResponse::default()
            })
        }
    }

    fn records() -> Vec<Record> {
        vec![
            Record::new("1", RecordType::Cname, "www", "edge.example.net"),
            Record::new("2", RecordType::A, "edge.example.net", "203.0.113.5"),
            Record::new("3", RecordType::Mx, "@", "10 mail.example.net"),
            Record::new("4", RecordType::Cname, "shop", "shop.myshopify.com"),
        ]
    }

    fn config() -> ResolverConfig {
        ResolverConfig {
            max_resolution_hops: 5,
            disable_service_discovery: true,
            ..ResolverConfig::default()
        }
    }

    #[test]
    fn test_local_topology() {
        let engine = ZoneTopology::builder()
            .build(&config())
            .unwrap();
        let topology = engine.local(&records(), "example.com", &config()).unwrap();

        let www = &topology.summary.per_node_summaries["www"];
        assert_eq!(www.chain, vec!["www", "edge.example.net"]);
        assert_eq!(www.ipv4, vec!["203.0.113.5"]);
        assert!(topology.summary.cname_chains.is_empty());

        let mx = &topology.summary.mx_trails[0];
        assert_eq!(mx.trail.priority, 10);
        assert_eq!(mx.trail.from, "example.com");
        assert_eq!(mx.trail.exchange, "mail.example.net");
    }

    #[test]
    fn test_local_rejects_bad_config() {
        let engine = ZoneTopology::builder().build(&config()).unwrap();
        let bad = ResolverConfig {
            max_resolution_hops: 16,
            ..config()
        };
        assert!(engine.local(&records(), "example.com", &bad).is_err());
    }

    #[test]
    fn test_refresh_goes_back_to_backend() {
        let backend = Arc::new(StaticBackend::default());
        let engine = ZoneTopology::builder()
            .backend(backend.clone())
            .build(&config())
            .unwrap();

        tokio_test::block_on(async {
            engine.resolve(&records(), "example.com", &config()).await.unwrap();
            engine.invalidate();
            engine.resolve(&records(), "example.com", &config()).await.unwrap();
            assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

            engine.refresh();
            engine.resolve(&records(), "example.com", &config()).await.unwrap();
            assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        });
    }

    #[tokio::test]
    async fn test_resolve_merges_backend_results() {
        let backend = Arc::new(StaticBackend::default());
        let engine = ZoneTopology::builder()
            .backend(backend.clone())
            .build(&config())
            .unwrap();

        let topology = engine
            .resolve(&records(), "example.com", &config())
            .await
            .unwrap()
            .unwrap();

        let shop = &topology.summary.per_node_summaries["shop"];
        assert_eq!(
            shop.chain,
            vec!["shop", "shop.myshopify.com", "shops.myshopify.com"]
        );
        assert_eq!(shop.ipv4, vec!["23.227.38.65"]);
        assert!(topology
            .summary
            .detected_services
            .iter()
            .any(|s| s.provider == "Shopify"));

        let progress = *engine.subscribe().borrow();
        assert!(!progress.running);
        assert_eq!(progress.done, progress.total);

        // Same inputs: served from the published snapshot.
        engine
            .resolve(&records(), "example.com", &config())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
