//! The external resolver capability.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use zonegraph_core::{ResolutionResult, ResolverConfig, Result, ServiceProbe, TcpProbe};

/// One call to an external resolver
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Normalized hostnames to resolve
    pub names: Vec<String>,
    /// Hosts to probe for HTTP(S)/TCP reachability
    pub service_hosts: Vec<String>,
    /// Validated configuration
    pub config: ResolverConfig,
}

impl ResolveRequest {
    /// Request for a single hostname without probes
    #[must_use]
    pub fn single(name: impl Into<String>, config: ResolverConfig) -> Self {
        Self {
            names: vec![name.into()],
            service_hosts: Vec::new(),
            config,
        }
    }
}

/// What an external resolver returned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverOutput {
    /// Results keyed by requested name
    pub results: BTreeMap<String, ResolutionResult>,
    /// HTTP(S) probes
    pub probes: Vec<ServiceProbe>,
    /// TCP probes
    pub tcp_probes: Vec<TcpProbe>,
}

impl ResolverOutput {
    /// Returns true if no hostname was resolved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A source of externally authoritative DNS data.
///
/// Implementations must return promptly with [`TopologyError::Cancelled`]
/// once `cancel` fires.
///
/// [`TopologyError::Cancelled`]: zonegraph_core::TopologyError::Cancelled
#[async_trait]
pub trait ExternalResolver: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Resolve every name in the request
    async fn resolve(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolverOutput>;
}
