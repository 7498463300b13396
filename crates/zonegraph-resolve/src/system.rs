//! In-process [`BatchBackend`] built on hickory-resolver and DoH.
//!
//! This is the backend the desktop app runs with elevated network access:
//! classic DNS against the configured server (DoH per query when that
//! fails), PTR and country lookups, and reachability probes.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig as DnsConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioResolver;
use reqwest::redirect::Policy;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zonegraph_core::{
    normalize_name, GeoProvider, ResolverConfig, ResolverMode, Result, TopologyError,
};

use crate::batch::{
    BatchBackend, BatchProbe, BatchRequest, BatchResolution, BatchResponse, BatchTcpProbe,
    GeoEntry, ReverseEntry,
};
use crate::doh::{DohClient, DohType, NO_ADDRESS_RECORDS};

/// Hostnames resolved concurrently
pub const RESOLVE_PARALLELISM: usize = 16;
/// Probes and geo lookups run concurrently
pub const PROBE_PARALLELISM: usize = 8;
/// Per-probe timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const IPWHOIS_URL: &str = "https://ipwho.is";
const IP_API_URL: &str = "http://ip-api.com/json";

#[derive(Debug, Deserialize)]
struct IpWhoisResponse {
    #[serde(default)]
    success: bool,
    country: Option<String>,
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    status: String,
    country: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

/// Per-batch lookup state
struct Lookup<'a> {
    dns: Option<&'a TokioResolver>,
    endpoints: &'a [String],
    config: &'a ResolverConfig,
    cancel: &'a CancellationToken,
}

/// Resolves batches with the local network stack.
#[derive(Debug, Clone)]
pub struct SystemBatchBackend {
    http: HttpClient,
    doh: DohClient,
    doh_endpoints: Option<Vec<String>>,
}

impl SystemBatchBackend {
    /// Create a backend with its own HTTP clients
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .redirect(Policy::limited(4))
            .connect_timeout(Duration::from_secs(3))
            .timeout(PROBE_TIMEOUT)
            .user_agent(format!("zonegraph/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TopologyError::Http(e.to_string()))?;
        Ok(Self {
            http,
            doh: DohClient::new(config.doh_rate_limit)?,
            doh_endpoints: None,
        })
    }

    /// Query these DoH endpoints instead of the configured ranking
    #[must_use]
    pub fn with_doh_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.doh_endpoints = Some(endpoints);
        self
    }

    async fn resolve_host(&self, lookup: &Lookup<'_>, name: String) -> BatchResolution {
        let timeout = lookup.config.lookup_timeout();
        let mut chain = vec![name.clone()];
        let mut seen = HashSet::from([name.clone()]);
        let mut current = name.clone();

        if lookup.config.scan_resolution_chain {
            for _ in 0..lookup.config.max_hops() {
                let Some(next) = self.next_hop(lookup, &current, timeout).await else {
                    break;
                };
                if !seen.insert(next.clone()) {
                    break;
                }
                chain.push(next.clone());
                current = next;
            }
        }

        let (mut ipv4, mut ipv6) = match lookup.dns {
            Some(dns) => tokio::join!(
                dns_addresses(dns, &current, RecordType::A, timeout),
                dns_addresses(dns, &current, RecordType::AAAA, timeout),
            ),
            None => (Vec::new(), Vec::new()),
        };
        if ipv4.is_empty() || ipv6.is_empty() {
            let (doh_v4, doh_v6) = tokio::join!(
                self.doh_when(ipv4.is_empty(), lookup, &current, DohType::A, timeout),
                self.doh_when(ipv6.is_empty(), lookup, &current, DohType::Aaaa, timeout),
            );
            if ipv4.is_empty() {
                ipv4 = doh_v4;
            }
            if ipv6.is_empty() {
                ipv6 = doh_v6;
            }
        }

        let mut reverse_hostnames = Vec::new();
        if !lookup.config.disable_ptr_lookups {
            for ip in ipv4.iter().chain(ipv6.iter()) {
                let Ok(parsed) = ip.parse::<IpAddr>() else {
                    continue;
                };
                let hostnames = self.reverse(lookup, parsed, timeout).await;
                if !hostnames.is_empty() {
                    reverse_hostnames.push(ReverseEntry {
                        ip: ip.clone(),
                        hostnames,
                    });
                }
            }
        }

        let unresolved = chain.len() <= 1 && ipv4.is_empty() && ipv6.is_empty();
        BatchResolution {
            name,
            chain,
            terminal: current,
            ipv4,
            ipv6,
            reverse_hostnames,
            geo_by_ip: Vec::new(),
            error: unresolved.then(|| NO_ADDRESS_RECORDS.to_string()),
        }
    }

    async fn next_hop(&self, lookup: &Lookup<'_>, name: &str, timeout: Duration) -> Option<String> {
        if let Some(dns) = lookup.dns {
            if let Some(next) = dns_cname(dns, name, timeout).await {
                return Some(next);
            }
        }
        self.doh_when(true, lookup, name, DohType::Cname, timeout)
            .await
            .into_iter()
            .next()
    }

    async fn doh_when(
        &self,
        wanted: bool,
        lookup: &Lookup<'_>,
        name: &str,
        rtype: DohType,
        timeout: Duration,
    ) -> Vec<String> {
        if !wanted {
            return Vec::new();
        }
        match self
            .doh
            .query_ranked(lookup.endpoints, name, rtype, timeout, lookup.cancel)
            .await
        {
            Ok(values) => values,
            Err(e) => {
                debug!(host = %name, rtype = rtype.as_str(), error = %e, "DoH lookup failed");
                Vec::new()
            }
        }
    }

    async fn reverse(&self, lookup: &Lookup<'_>, ip: IpAddr, timeout: Duration) -> Vec<String> {
        if let Some(dns) = lookup.dns {
            if let Ok(Ok(ptr)) = tokio::time::timeout(timeout, dns.reverse_lookup(ip)).await {
                let mut names: Vec<String> = Vec::new();
                for host in ptr.iter().map(|p| normalize_name(&p.0.to_utf8())) {
                    if !host.is_empty() && !names.contains(&host) {
                        names.push(host);
                    }
                }
                return names;
            }
        }
        self.doh_when(true, lookup, &reverse_name(ip), DohType::Ptr, timeout)
            .await
    }

    async fn geo(&self, provider: GeoProvider, ip: &str) -> Option<GeoEntry> {
        let entry = match provider {
            GeoProvider::IpWhois => {
                let url = format!("{IPWHOIS_URL}/{ip}");
                let body: IpWhoisResponse = self.http.get(url).send().await.ok()?.json().await.ok()?;
                body.success.then_some(GeoEntry {
                    ip: ip.to_string(),
                    country: body.country,
                    country_code: body.country_code,
                })
            }
            GeoProvider::IpApi => {
                let url = format!("{IP_API_URL}/{ip}?fields=status,country,countryCode");
                let body: IpApiResponse = self.http.get(url).send().await.ok()?.json().await.ok()?;
                (body.status == "success").then_some(GeoEntry {
                    ip: ip.to_string(),
                    country: body.country,
                    country_code: body.country_code,
                })
            }
        };
        if entry.is_none() {
            debug!(ip, provider = %provider, "geo lookup returned nothing");
        }
        entry
    }
}

#[async_trait]
impl BatchBackend for SystemBatchBackend {
    async fn resolve_batch(&self, request: BatchRequest) -> Result<BatchResponse> {
        let config = request.to_config().validate()?;
        let dns = match config.resolver_mode {
            ResolverMode::Dns => Some(build_dns_resolver(&config)?),
            ResolverMode::Doh => None,
        };
        let endpoints = self
            .doh_endpoints
            .clone()
            .unwrap_or_else(|| config.doh_endpoints());
        let cancel = CancellationToken::new();
        let lookup = Lookup {
            dns: dns.as_ref(),
            endpoints: &endpoints,
            config: &config,
            cancel: &cancel,
        };

        let hosts = unique_hosts(&request.hostnames);
        info!(
            hosts = hosts.len(),
            mode = %config.resolver_mode,
            server = %config.selected_dns_server(),
            "resolving batch"
        );
        let mut resolutions: Vec<BatchResolution> = stream::iter(hosts)
            .map(|host| self.resolve_host(&lookup, host))
            .buffer_unordered(RESOLVE_PARALLELISM)
            .collect()
            .await;
        resolutions.sort_by(|a, b| a.name.cmp(&b.name));

        if !config.disable_geo_lookups {
            let addresses: Vec<String> = resolutions
                .iter()
                .flat_map(|r| r.ipv4.iter().chain(r.ipv6.iter()).cloned())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            let provider = config.geo_provider;
            let geo: BTreeMap<String, GeoEntry> = stream::iter(addresses)
                .map(|ip| async move { self.geo(provider, &ip).await })
                .buffer_unordered(PROBE_PARALLELISM)
                .filter_map(|entry| async move { entry })
                .map(|entry| (entry.ip.clone(), entry))
                .collect()
                .await;
            for resolution in &mut resolutions {
                resolution.geo_by_ip = resolution
                    .ipv4
                    .iter()
                    .chain(resolution.ipv6.iter())
                    .filter_map(|ip| geo.get(ip).cloned())
                    .collect();
            }
        }

        let service_hosts = unique_hosts(&request.service_hosts);
        let probes = stream::iter(service_hosts.clone())
            .map(|host| async move {
                let https = format!("https://{host}");
                let http = format!("http://{host}");
                let (https_up, http_up) =
                    tokio::join!(probe_url(&self.http, &https), probe_url(&self.http, &http));
                BatchProbe {
                    host,
                    https_up,
                    http_up,
                }
            })
            .buffer_unordered(PROBE_PARALLELISM)
            .collect()
            .await;

        let targets: Vec<(String, u16)> = service_hosts
            .iter()
            .flat_map(|host| request.tcp_ports.iter().map(move |port| (host.clone(), *port)))
            .collect();
        let tcp_probes = stream::iter(targets)
            .map(|(host, port)| async move {
                let up = probe_tcp(&host, port, PROBE_TIMEOUT).await;
                BatchTcpProbe { host, port, up }
            })
            .buffer_unordered(PROBE_PARALLELISM)
            .collect()
            .await;

        Ok(BatchResponse {
            resolutions,
            probes,
            tcp_probes,
        })
    }
}

fn unique_hosts(hosts: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    hosts
        .iter()
        .map(|h| normalize_name(h))
        .filter(|h| !h.is_empty() && seen.insert(h.clone()))
        .collect()
}

/// Resolver against the configured server, or the system configuration when
/// the selection is not an address.
fn build_dns_resolver(config: &ResolverConfig) -> Result<TokioResolver> {
    let mut opts = ResolverOpts::default();
    opts.timeout = config.lookup_timeout();
    opts.attempts = 1;

    let server = config.selected_dns_server();
    if let Ok(ip) = server.parse::<IpAddr>() {
        let group = NameServerConfigGroup::from_ips_clear(&[ip], 53, true);
        return Ok(TokioResolver::builder_with_config(
            DnsConfig::from_parts(None, vec![], group),
            TokioConnectionProvider::default(),
        )
        .with_options(opts)
        .build());
    }

    debug!(server = %server, "DNS server is not an address, using system configuration");
    let builder = TokioResolver::builder_tokio().map_err(|e| TopologyError::Dns(e.to_string()))?;
    Ok(builder.with_options(opts).build())
}

fn fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

async fn dns_cname(dns: &TokioResolver, name: &str, timeout: Duration) -> Option<String> {
    let lookup = tokio::time::timeout(timeout, dns.lookup(fqdn(name), RecordType::CNAME))
        .await
        .ok()?
        .ok()?;
    lookup.iter().find_map(|rdata| match rdata {
        RData::CNAME(cname) => Some(normalize_name(&cname.0.to_utf8())).filter(|n| !n.is_empty()),
        _ => None,
    })
}

async fn dns_addresses(
    dns: &TokioResolver,
    name: &str,
    rtype: RecordType,
    timeout: Duration,
) -> Vec<String> {
    let Ok(Ok(lookup)) = tokio::time::timeout(timeout, dns.lookup(fqdn(name), rtype)).await else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for rdata in lookup.iter() {
        let address = match rdata {
            RData::A(a) if rtype == RecordType::A => a.0.to_string(),
            RData::AAAA(aaaa) if rtype == RecordType::AAAA => aaaa.0.to_string(),
            _ => continue,
        };
        if !out.contains(&address) {
            out.push(address);
        }
    }
    out
}

/// `in-addr.arpa` / `ip6.arpa` name of an address
#[must_use]
pub fn reverse_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{d}.{c}.{b}.{a}.in-addr.arpa")
        }
        IpAddr::V6(v6) => {
            let mut labels: Vec<String> = v6
                .octets()
                .iter()
                .flat_map(|byte| [byte >> 4, byte & 0x0f])
                .map(|nibble| format!("{nibble:x}"))
                .collect();
            labels.reverse();
            format!("{}.ip6.arpa", labels.join("."))
        }
    }
}

/// True if the URL answered with any HTTP response within the client timeout
pub async fn probe_url(http: &HttpClient, url: &str) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, http.get(url).send()).await,
        Ok(Ok(_))
    )
}

/// True if a TCP connection to `host:port` succeeds within `timeout`
pub async fn probe_tcp(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}
