//! DNS-over-HTTPS (JSON API) client and the per-hostname fallback resolver.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::ACCEPT;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use zonegraph_core::{
    normalize_name, ResolutionResult, ResolverConfig, Result, TopologyError,
};

use crate::resolver::{ExternalResolver, ResolveRequest, ResolverOutput};

/// Error text for hosts with no CNAME, A or AAAA answer
pub const NO_ADDRESS_RECORDS: &str = "no CNAME/A/AAAA records found";

const DNS_JSON: &str = "application/dns-json";

/// Record types the engine asks DoH endpoints for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DohType {
    /// IPv4 address
    A,
    /// IPv6 address
    Aaaa,
    /// Canonical name
    Cname,
    /// Reverse pointer
    Ptr,
}

impl DohType {
    /// Query-string spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Ptr => "PTR",
        }
    }

    /// Numeric RR type used in answers
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::A => 1,
            Self::Cname => 5,
            Self::Ptr => 12,
            Self::Aaaa => 28,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status", default)]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    rtype: u16,
    data: String,
}

/// Rate-limited `application/dns-json` client
#[derive(Clone)]
pub struct DohClient {
    http: HttpClient,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for DohClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DohClient").finish_non_exhaustive()
    }
}

impl DohClient {
    /// Create a client allowing `per_second` queries per second.
    pub fn new(per_second: u32) -> Result<Self> {
        let http = HttpClient::builder()
            .user_agent(format!("zonegraph/{}", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .map_err(|e| TopologyError::Http(e.to_string()))?;
        Ok(Self::with_http(http, per_second))
    }

    /// Use an existing HTTP client
    #[must_use]
    pub fn with_http(http: HttpClient, per_second: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            http,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        }
    }

    /// Query one endpoint.
    ///
    /// Returns answers of the requested type only: addresses for A/AAAA,
    /// normalized names for CNAME/PTR. A non-zero DNS status yields an empty
    /// answer. The query is abandoned after `timeout` or when `cancel` fires.
    #[instrument(skip(self, cancel), level = "debug")]
    pub async fn query(
        &self,
        endpoint: &str,
        name: &str,
        rtype: DohType,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        self.limiter.until_ready().await;

        let child = cancel.child_token();
        let fetch = async {
            let response = self
                .http
                .get(endpoint)
                .query(&[("name", name), ("type", rtype.as_str())])
                .header(ACCEPT, DNS_JSON)
                .send()
                .await
                .map_err(|e| TopologyError::Http(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TopologyError::Http(format!("{endpoint} returned {status}")));
            }
            let body = response
                .text()
                .await
                .map_err(|e| TopologyError::Http(e.to_string()))?;
            Ok(serde_json::from_str::<DohResponse>(&body)?)
        };

        let parsed = tokio::select! {
            () = child.cancelled() => return Err(TopologyError::Cancelled),
            () = tokio::time::sleep(timeout) => {
                child.cancel();
                return Err(TopologyError::Timeout(duration_ms(timeout)));
            }
            parsed = fetch => parsed?,
        };

        if parsed.status != 0 {
            debug!(endpoint, host = %name, status = parsed.status, "non-zero DNS status");
            return Ok(Vec::new());
        }
        Ok(filter_answers(parsed.answer, rtype))
    }

    /// Try endpoints in order; the first non-empty answer wins.
    ///
    /// An endpoint that answers empty is not an error. If every endpoint
    /// fails, the last error is returned.
    pub async fn query_ranked(
        &self,
        endpoints: &[String],
        name: &str,
        rtype: DohType,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut last_error = None;
        let mut answered = false;
        for endpoint in endpoints {
            match self.query(endpoint, name, rtype, timeout, cancel).await {
                Ok(answers) if !answers.is_empty() => return Ok(answers),
                Ok(_) => answered = true,
                Err(TopologyError::Cancelled) => return Err(TopologyError::Cancelled),
                Err(e) => {
                    debug!(endpoint = %endpoint, host = %name, error = %e, "DoH endpoint failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(Vec::new()),
        }
    }
}

fn filter_answers(answers: Vec<DohAnswer>, rtype: DohType) -> Vec<String> {
    let mut seen = HashSet::new();
    answers
        .into_iter()
        .filter(|a| a.rtype == rtype.code())
        .filter_map(|a| match rtype {
            DohType::A | DohType::Aaaa => a
                .data
                .trim()
                .parse::<IpAddr>()
                .ok()
                .filter(|ip| ip.is_ipv4() == (rtype == DohType::A))
                .map(|ip| ip.to_string()),
            DohType::Cname | DohType::Ptr => {
                Some(normalize_name(&a.data)).filter(|n| !n.is_empty())
            }
        })
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Resolves hostnames one at a time against a ranked DoH endpoint list.
#[derive(Debug, Clone)]
pub struct FallbackDohResolver {
    client: DohClient,
    endpoints: Option<Vec<String>>,
}

impl FallbackDohResolver {
    /// Create a resolver limited to the configured DoH rate
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        Ok(Self::with_client(DohClient::new(config.doh_rate_limit)?))
    }

    /// Create from an existing client
    #[must_use]
    pub const fn with_client(client: DohClient) -> Self {
        Self {
            client,
            endpoints: None,
        }
    }

    /// Query these endpoints instead of the configured ranking
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Resolve a single hostname.
    ///
    /// Follows CNAMEs first when the configuration asks for it, then queries
    /// A and AAAA at the terminal in parallel. Failures end up in
    /// [`ResolutionResult::error`].
    pub async fn resolve_one(
        &self,
        name: &str,
        config: &ResolverConfig,
        cancel: &CancellationToken,
    ) -> Result<ResolutionResult> {
        let name = normalize_name(name);
        let endpoints = self
            .endpoints
            .clone()
            .unwrap_or_else(|| config.doh_endpoints());
        let timeout = config.lookup_timeout();

        let mut chain = vec![name.clone()];
        let mut seen = HashSet::from([name.clone()]);
        let mut errors = Vec::new();

        if config.scan_resolution_chain {
            let mut current = name.clone();
            for _ in 0..config.max_hops() {
                match self
                    .client
                    .query_ranked(&endpoints, &current, DohType::Cname, timeout, cancel)
                    .await
                {
                    Ok(targets) => {
                        let Some(next) = targets.into_iter().next() else {
                            break;
                        };
                        if !seen.insert(next.clone()) {
                            break;
                        }
                        chain.push(next.clone());
                        current = next;
                    }
                    Err(TopologyError::Cancelled) => return Err(TopologyError::Cancelled),
                    Err(e) => {
                        errors.push(e.to_string());
                        break;
                    }
                }
            }
        }

        let terminal = chain.last().cloned().unwrap_or_else(|| name.clone());
        let (ipv4, ipv6) = tokio::join!(
            self.client
                .query_ranked(&endpoints, &terminal, DohType::A, timeout, cancel),
            self.client
                .query_ranked(&endpoints, &terminal, DohType::Aaaa, timeout, cancel),
        );
        let mut take = |answer: Result<Vec<String>>| match answer {
            Ok(values) => Ok(values),
            Err(TopologyError::Cancelled) => Err(TopologyError::Cancelled),
            Err(e) => {
                errors.push(e.to_string());
                Ok(Vec::new())
            }
        };
        let ipv4 = take(ipv4)?;
        let ipv6 = take(ipv6)?;

        let error = if chain.len() == 1 && ipv4.is_empty() && ipv6.is_empty() {
            Some(errors.first().cloned().unwrap_or_else(|| NO_ADDRESS_RECORDS.to_string()))
        } else {
            None
        };

        debug!(host = %name, hops = chain.len() - 1, v4 = ipv4.len(), v6 = ipv6.len(), "DoH fallback resolved");
        Ok(ResolutionResult {
            requested_name: Some(name),
            chain,
            terminal,
            ipv4,
            ipv6,
            error,
            ..ResolutionResult::default()
        })
    }
}

#[async_trait]
impl ExternalResolver for FallbackDohResolver {
    fn name(&self) -> &'static str {
        "doh-fallback"
    }

    async fn resolve(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolverOutput> {
        let config = &request.config;
        let pending: Vec<_> = request
            .names
            .iter()
            .map(|name| self.resolve_one(name, config, cancel))
            .collect();
        let resolved: Vec<Result<ResolutionResult>> = stream::iter(pending)
            .buffer_unordered(config.fallback_concurrency.max(1))
            .collect()
            .await;

        let mut output = ResolverOutput::default();
        for result in resolved {
            let result = result?;
            if let Some(name) = result.requested_name.clone() {
                output.results.insert(name, result);
            }
        }
        Ok(output)
    }
}
