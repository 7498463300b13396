use thiserror::Error;

/// Result type alias for topology operations
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors that can occur while resolving or assembling a zone topology
#[derive(Error, Debug)]
pub enum TopologyError {
    /// Resolver configuration value outside its documented range
    #[error("invalid resolver configuration: {0}")]
    InvalidConfig(String),

    /// The privileged batch backend is not available in this process
    #[error("batch backend unavailable: {0}")]
    BackendUnavailable(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// DNS lookup failed
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// Query timed out
    #[error("query timed out after {0} ms")]
    Timeout(u64),

    /// The run was superseded or cancelled
    #[error("resolution run cancelled")]
    Cancelled,

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl TopologyError {
    /// Returns true if the error means "fall back to another resolver"
    /// rather than "the run failed"
    #[must_use]
    pub const fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::Http(_) | Self::Dns(_) | Self::Timeout(_)
        )
    }

    /// Returns true if the error is a configuration problem
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::Toml(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_triggers() {
        assert!(TopologyError::BackendUnavailable("absent".into()).is_fallback_trigger());
        assert!(TopologyError::Timeout(250).is_fallback_trigger());
        assert!(!TopologyError::Cancelled.is_fallback_trigger());
        assert!(!TopologyError::InvalidConfig("hops".into()).is_fallback_trigger());
    }

    #[test]
    fn test_display_messages() {
        let err = TopologyError::InvalidConfig("maxResolutionHops must be 1..=15, got 0".into());
        assert_eq!(
            err.to_string(),
            "invalid resolver configuration: maxResolutionHops must be 1..=15, got 0"
        );
        assert!(err.is_config_error());
    }
}
