use serde::{Deserialize, Serialize};

/// HTTP reachability of a service host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProbe {
    /// Probed host
    pub host: String,
    /// `https://host` answered
    pub https_up: bool,
    /// `http://host` answered
    pub http_up: bool,
}

impl ServiceProbe {
    /// Returns true if either scheme answered
    #[must_use]
    pub const fn is_up(&self) -> bool {
        self.https_up || self.http_up
    }
}

/// TCP connect probe of one host/port pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpProbe {
    /// Probed host
    pub host: String,
    /// Probed port
    pub port: u16,
    /// Connection succeeded within the lookup timeout
    pub up: bool,
}
