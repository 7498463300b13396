//! Resolver configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TopologyError};

/// Smallest accepted hop bound
pub const MIN_HOPS: u8 = 1;
/// Largest accepted hop bound
pub const MAX_HOPS: u8 = 15;
/// Per-query timeout floor
pub const MIN_LOOKUP_TIMEOUT_MS: u32 = 250;
/// Per-query timeout ceiling
pub const MAX_LOOKUP_TIMEOUT_MS: u32 = 10_000;

/// Cloudflare DoH JSON endpoint
pub const CLOUDFLARE_DOH: &str = "https://cloudflare-dns.com/dns-query";
/// Google DoH JSON endpoint
pub const GOOGLE_DOH: &str = "https://dns.google/resolve";
/// Quad9 DoH JSON endpoint
pub const QUAD9_DOH: &str = "https://dns.quad9.net:5053/dns-query";

/// How external lookups are performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverMode {
    /// Classic DNS against a configured server, DoH as fallback
    #[default]
    Dns,
    /// DNS-over-HTTPS only
    Doh,
}

impl std::fmt::Display for ResolverMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dns => write!(f, "dns"),
            Self::Doh => write!(f, "doh"),
        }
    }
}

/// Preferred DNS-over-HTTPS provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DohProvider {
    /// dns.google
    Google,
    /// cloudflare-dns.com
    #[default]
    Cloudflare,
    /// dns.quad9.net
    Quad9,
    /// `dohCustomUrl`
    Custom,
}

impl DohProvider {
    /// JSON endpoint for a well-known provider
    #[must_use]
    pub const fn endpoint(self) -> Option<&'static str> {
        match self {
            Self::Google => Some(GOOGLE_DOH),
            Self::Cloudflare => Some(CLOUDFLARE_DOH),
            Self::Quad9 => Some(QUAD9_DOH),
            Self::Custom => None,
        }
    }

    /// Plain DNS server address of a well-known provider
    #[must_use]
    pub const fn server_ip(self) -> &'static str {
        match self {
            Self::Google => "8.8.8.8",
            Self::Quad9 => "9.9.9.9",
            Self::Cloudflare | Self::Custom => "1.1.1.1",
        }
    }
}

impl std::fmt::Display for DohProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Google => write!(f, "google"),
            Self::Cloudflare => write!(f, "cloudflare"),
            Self::Quad9 => write!(f, "quad9"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Service used for IP geolocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GeoProvider {
    /// <https://ipwho.is>
    #[default]
    #[serde(rename = "ipwhois")]
    IpWhois,
    /// <http://ip-api.com>
    #[serde(rename = "ip-api")]
    IpApi,
}

impl std::fmt::Display for GeoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IpWhois => write!(f, "ipwhois"),
            Self::IpApi => write!(f, "ip-api"),
        }
    }
}

/// Options controlling external resolution.
///
/// Field names follow the zone manager's settings (camelCase on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverConfig {
    /// Lookup transport
    pub resolver_mode: ResolverMode,

    /// DNS server address, or `custom` to use `custom_dns_server`
    pub dns_server: String,

    /// Server used when `dns_server` is `custom`
    pub custom_dns_server: Option<String>,

    /// Preferred DoH provider
    pub doh_provider: DohProvider,

    /// DoH endpoint used with the `custom` provider
    pub doh_custom_url: Option<String>,

    /// CNAME hop bound (1..=15)
    pub max_resolution_hops: u8,

    /// Per-query timeout in milliseconds (clamped to 250..=10000)
    pub lookup_timeout_ms: u32,

    /// Skip PTR lookups for resolved addresses
    pub disable_ptr_lookups: bool,

    /// Skip country lookups for resolved addresses
    pub disable_geo_lookups: bool,

    /// Geolocation service
    pub geo_provider: GeoProvider,

    /// Follow CNAME hops externally before querying addresses
    pub scan_resolution_chain: bool,

    /// Skip HTTP/TCP reachability probes
    pub disable_service_discovery: bool,

    /// Ports to TCP-probe on service hosts
    pub tcp_service_ports: Vec<u16>,

    /// Concurrent fallback lookups
    pub fallback_concurrency: usize,

    /// DoH requests per second across all fallback lookups
    pub doh_rate_limit: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolver_mode: ResolverMode::Dns,
            dns_server: String::from("1.1.1.1"),
            custom_dns_server: None,
            doh_provider: DohProvider::Cloudflare,
            doh_custom_url: None,
            max_resolution_hops: MAX_HOPS,
            lookup_timeout_ms: 1200,
            disable_ptr_lookups: false,
            disable_geo_lookups: false,
            geo_provider: GeoProvider::IpWhois,
            scan_resolution_chain: true,
            disable_service_discovery: false,
            tcp_service_ports: Vec::new(),
            fallback_concurrency: 16,
            doh_rate_limit: 50,
        }
    }
}

impl ResolverConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject out-of-range values and clamp the lookup timeout.
    pub fn validate(mut self) -> Result<Self> {
        if !(MIN_HOPS..=MAX_HOPS).contains(&self.max_resolution_hops) {
            return Err(TopologyError::InvalidConfig(format!(
                "maxResolutionHops must be {MIN_HOPS}..={MAX_HOPS}, got {}",
                self.max_resolution_hops
            )));
        }
        if self.fallback_concurrency == 0 {
            return Err(TopologyError::InvalidConfig(
                "fallbackConcurrency must be at least 1".into(),
            ));
        }
        if self.doh_rate_limit == 0 {
            return Err(TopologyError::InvalidConfig(
                "dohRateLimit must be at least 1".into(),
            ));
        }

        let custom_url = self
            .doh_custom_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        match custom_url {
            Some(raw) => {
                let parsed = url::Url::parse(raw).map_err(|e| {
                    TopologyError::InvalidConfig(format!("dohCustomUrl {raw:?}: {e}"))
                })?;
                if !matches!(parsed.scheme(), "https" | "http") {
                    return Err(TopologyError::InvalidConfig(format!(
                        "dohCustomUrl must be http(s), got {raw:?}"
                    )));
                }
            }
            None if self.doh_provider == DohProvider::Custom => {
                return Err(TopologyError::InvalidConfig(
                    "dohProvider is custom but dohCustomUrl is empty".into(),
                ));
            }
            None => {}
        }

        self.lookup_timeout_ms = self
            .lookup_timeout_ms
            .clamp(MIN_LOOKUP_TIMEOUT_MS, MAX_LOOKUP_TIMEOUT_MS);
        Ok(self)
    }

    /// Hop bound as a count
    #[must_use]
    pub fn max_hops(&self) -> usize {
        usize::from(self.max_resolution_hops.clamp(MIN_HOPS, MAX_HOPS))
    }

    /// Per-query timeout, never below the floor
    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(
            self.lookup_timeout_ms
                .clamp(MIN_LOOKUP_TIMEOUT_MS, MAX_LOOKUP_TIMEOUT_MS),
        ))
    }

    /// The DNS server lookups should go to.
    ///
    /// `custom` selects `custom_dns_server`; an empty selection falls back to
    /// the DoH provider's plain-DNS address.
    #[must_use]
    pub fn selected_dns_server(&self) -> String {
        let selected = self.dns_server.trim();
        if selected.eq_ignore_ascii_case("custom") {
            if let Some(custom) = self
                .custom_dns_server
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
            {
                return custom.to_string();
            }
        } else if !selected.is_empty() {
            return selected.to_string();
        }
        self.doh_provider.server_ip().to_string()
    }

    fn custom_doh_url(&self) -> Option<&str> {
        self.doh_custom_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// The endpoint a DNS server address maps to
    fn endpoint_for_server(&self, server: &str) -> String {
        match server {
            "1.1.1.1" | "1.0.0.1" => CLOUDFLARE_DOH.to_string(),
            "8.8.8.8" | "8.8.4.4" => GOOGLE_DOH.to_string(),
            "9.9.9.9" | "149.112.112.112" => QUAD9_DOH.to_string(),
            _ => self
                .custom_doh_url()
                .map_or_else(|| CLOUDFLARE_DOH.to_string(), str::to_string),
        }
    }

    /// Ranked DoH endpoints: the preferred one first, then the public
    /// defaults, without duplicates.
    #[must_use]
    pub fn doh_endpoints(&self) -> Vec<String> {
        let preferred = match (self.resolver_mode, self.doh_provider) {
            (_, DohProvider::Custom) => self
                .custom_doh_url()
                .map_or_else(|| CLOUDFLARE_DOH.to_string(), str::to_string),
            (ResolverMode::Doh, provider) => provider
                .endpoint()
                .unwrap_or(CLOUDFLARE_DOH)
                .to_string(),
            (ResolverMode::Dns, _) => self.endpoint_for_server(&self.selected_dns_server()),
        };

        let mut out = vec![preferred];
        for default in [CLOUDFLARE_DOH, GOOGLE_DOH, QUAD9_DOH] {
            if !out.iter().any(|e| e == default) {
                out.push(default.to_string());
            }
        }
        out
    }

    /// Cache partition for results produced under this configuration
    #[must_use]
    pub fn cache_partition(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|ptr={}|geo={}:{}|chain={}",
            self.resolver_mode,
            self.selected_dns_server(),
            self.doh_provider,
            self.custom_doh_url().unwrap_or_default(),
            self.max_hops(),
            !self.disable_ptr_lookups,
            !self.disable_geo_lookups,
            self.geo_provider,
            self.scan_resolution_chain,
        )
    }
}
