use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ResolutionResult, ServiceProbe, TcpProbe};

/// Everything one resolution run produced for a zone.
///
/// `results` is total over the run's candidates and additionally indexed by
/// every hop and terminal it learned about.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionSnapshot {
    /// Key of the run that produced this snapshot
    pub run_key: String,
    /// Results by normalized hostname
    pub results: BTreeMap<String, ResolutionResult>,
    /// HTTP(S) reachability of service hosts
    #[serde(default)]
    pub probes: Vec<ServiceProbe>,
    /// TCP reachability of service hosts
    #[serde(default)]
    pub tcp_probes: Vec<TcpProbe>,
}

impl ResolutionSnapshot {
    /// Result for a hostname
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResolutionResult> {
        self.results.get(name)
    }
}
