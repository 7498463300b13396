//! Merge local and external resolution into the final topology.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;
use tracing::debug;

use crate::fingerprint::{DetectedService, ServiceFingerprinter};
use crate::graph::{Area, EdgeKind, Graph, GraphIndex, MxTrail, Node, NodeKind, RecordGraphBuilder};
use crate::name::{is_ip_literal, normalize_name};
use crate::types::{
    GeoInfo, ResolutionResult, ResolutionSnapshot, ResolutionSource, ServiceProbe, TcpProbe,
};

/// Pick the resolution to show for a name.
///
/// Local data that reaches addresses wins and borrows the external PTR and
/// geo annotations for the addresses both agree on. Otherwise the external
/// result wins if it found addresses or followed more hops.
#[must_use]
pub fn pick_best_resolution(
    local: &ResolutionResult,
    external: Option<&ResolutionResult>,
) -> ResolutionResult {
    let Some(external) = external else {
        return local.clone();
    };

    if local.has_addresses() {
        let mut best = local.clone();
        for address in local.addresses() {
            if let Some(hosts) = external.reverse_hostnames_by_ip.get(address) {
                best.reverse_hostnames_by_ip
                    .insert(address.clone(), hosts.clone());
            }
            if let Some(geo) = external.geo_by_ip.get(address) {
                best.geo_by_ip.insert(address.clone(), geo.clone());
            }
        }
        return best;
    }

    if external.has_addresses() || external.chain.len() > local.chain.len() {
        return external.clone();
    }
    local.clone()
}

/// An address used by more than one name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedIp {
    /// Literal address
    pub address: String,
    /// Names with an A/AAAA edge to it, sorted
    pub names: Vec<String>,
}

/// An MX trail with its resolved endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MxTrailSummary {
    /// Owner, priority and exchange
    #[serde(flatten)]
    pub trail: MxTrail,
    /// Chain from the exchange
    pub chain: Vec<String>,
    /// Final name
    pub terminal: String,
    /// IPv4 endpoints
    pub ipv4: Vec<String>,
    /// IPv6 endpoints
    pub ipv6: Vec<String>,
}

/// Everything known about one hostname
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    /// CNAME chain
    pub chain: Vec<String>,
    /// Final name
    pub terminal: String,
    /// IPv4 addresses of the terminal
    pub ipv4: Vec<String>,
    /// IPv6 addresses of the terminal
    pub ipv6: Vec<String>,
    /// PTR hostnames by address
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reverse_hostnames_by_ip: BTreeMap<String, Vec<String>>,
    /// Country by address
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub geo_by_ip: BTreeMap<String, GeoInfo>,
    /// Where the chain came from
    pub source: ResolutionSource,
    /// Functional areas
    pub areas: BTreeSet<Area>,
    /// Detected provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Resolution failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Structured findings about a zone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Chains with more than one hop
    pub cname_chains: Vec<Vec<String>>,
    /// Addresses shared by several names
    pub shared_ips: Vec<SharedIp>,
    /// Provider matches, one per unique target
    pub detected_services: Vec<DetectedService>,
    /// MX trails, by priority then exchange
    pub mx_trails: Vec<MxTrailSummary>,
    /// Owner names per area
    pub area_counts: BTreeMap<Area, usize>,
    /// Per-name details
    pub per_node_summaries: BTreeMap<String, NodeSummary>,
    /// HTTP(S) reachability
    pub probes: Vec<ServiceProbe>,
    /// TCP reachability
    pub tcp_probes: Vec<TcpProbe>,
}

/// Graph plus summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Node/edge graph
    pub graph: Graph,
    /// Findings
    pub summary: Summary,
}

/// Builds the [`Topology`] of a zone from its records and, optionally, the
/// snapshot of an external resolution run.
#[derive(Debug, Clone)]
pub struct GraphAssembler<'a, 'r> {
    builder: &'a RecordGraphBuilder<'r>,
    fingerprinter: &'a ServiceFingerprinter,
    snapshot: Option<&'a ResolutionSnapshot>,
}

impl<'a, 'r> GraphAssembler<'a, 'r> {
    /// Local-only assembler
    #[must_use]
    pub const fn new(
        builder: &'a RecordGraphBuilder<'r>,
        fingerprinter: &'a ServiceFingerprinter,
    ) -> Self {
        Self {
            builder,
            fingerprinter,
            snapshot: None,
        }
    }

    /// Merge in external results
    #[must_use]
    pub const fn with_snapshot(mut self, snapshot: &'a ResolutionSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// External result for a name, reached through its local chain.
    ///
    /// Uses the first hop that was resolved externally, prefixed with the
    /// local hops leading to it. The joined chain stops at the first
    /// repeated name and never exceeds the builder's hop limit.
    #[must_use]
    pub fn external_view(&self, local: &ResolutionResult) -> Option<ResolutionResult> {
        let snapshot = self.snapshot?;
        let max_hops = self.builder.max_hops();
        local.chain.iter().enumerate().find_map(|(i, hop)| {
            let external = snapshot.get(hop).filter(|r| !r.chain.is_empty())?;
            Some(external.with_prefix(&local.chain[..i], max_hops))
        })
    }

    /// Best resolution of a name
    #[must_use]
    pub fn best_resolution(&self, name: &str) -> ResolutionResult {
        let local = self.builder.resolve_name_to_terminal(name);
        let external = self.external_view(&local);
        pick_best_resolution(&local, external.as_ref())
    }

    /// Build graph and summary.
    #[must_use]
    pub fn assemble(&self) -> Topology {
        let builder = self.builder;
        let mut index = GraphIndex::new();
        builder.populate(&mut index);

        let names: BTreeSet<String> = builder
            .owners()
            .iter()
            .cloned()
            .chain(builder.candidate_hostnames())
            .filter(|name| !name.is_empty())
            .collect();
        let best: BTreeMap<String, ResolutionResult> = names
            .iter()
            .map(|name| (name.clone(), self.best_resolution(name)))
            .collect();

        for resolution in best.values() {
            self.link_resolution(&mut index, resolution);
        }

        let hosts: BTreeSet<&str> = best
            .values()
            .flat_map(|r| r.chain.iter().chain(std::iter::once(&r.terminal)))
            .chain(names.iter())
            .map(String::as_str)
            .filter(|host| !host.is_empty() && !is_ip_literal(host))
            .collect();
        let detected_services: Vec<DetectedService> = hosts
            .into_iter()
            .filter_map(|host| self.fingerprinter.detect(host))
            .collect();
        for service in &detected_services {
            let from = builder.host_node(&mut index, &service.target, None);
            let to = index.node(NodeKind::Service, &service.provider, &service.provider, None);
            index.edge(&from, &to, EdgeKind::ServiceLink, &service.provider);
        }

        let graph = index.finish();
        let shared_ips = shared_ips(&graph);

        let mx_trails = builder
            .mx_trails()
            .into_iter()
            .map(|trail| {
                let resolved = best
                    .get(&trail.exchange)
                    .cloned()
                    .unwrap_or_else(|| self.best_resolution(&trail.exchange));
                MxTrailSummary {
                    trail,
                    chain: resolved.chain,
                    terminal: resolved.terminal,
                    ipv4: resolved.ipv4,
                    ipv6: resolved.ipv6,
                }
            })
            .collect();

        let cname_chains = builder
            .cname_map()
            .keys()
            .filter_map(|owner| best.get(owner))
            .filter(|r| r.chain.len() > 2)
            .map(|r| r.chain.clone())
            .collect();

        let email_path = builder.email_path_names();
        let mut area_counts: BTreeMap<Area, usize> = BTreeMap::new();
        let providers: HashMap<&str, &str> = detected_services
            .iter()
            .map(|s| (s.target.as_str(), s.provider.as_str()))
            .collect();
        let per_node_summaries = best
            .into_iter()
            .map(|(name, resolved)| {
                let areas = builder.classify(&name, &email_path);
                if builder.owners().contains(&name) {
                    for area in &areas {
                        *area_counts.entry(*area).or_default() += 1;
                    }
                }
                let summary = NodeSummary {
                    provider: providers
                        .get(resolved.terminal.as_str())
                        .or_else(|| providers.get(name.as_str()))
                        .map(|p| (*p).to_string()),
                    chain: resolved.chain,
                    terminal: resolved.terminal,
                    ipv4: resolved.ipv4,
                    ipv6: resolved.ipv6,
                    reverse_hostnames_by_ip: resolved.reverse_hostnames_by_ip,
                    geo_by_ip: resolved.geo_by_ip,
                    source: resolved.source,
                    areas,
                    error: resolved.error,
                };
                (name, summary)
            })
            .collect();

        let (probes, tcp_probes) = self
            .snapshot
            .map(|s| (s.probes.clone(), s.tcp_probes.clone()))
            .unwrap_or_default();

        debug!(
            zone = %builder.zone(),
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "assembled topology"
        );

        Topology {
            graph,
            summary: Summary {
                cname_chains,
                shared_ips,
                detected_services,
                mx_trails,
                area_counts,
                per_node_summaries,
                probes,
                tcp_probes,
            },
        }
    }

    /// Add hop, address and PTR edges for one resolution.
    fn link_resolution(&self, index: &mut GraphIndex, resolved: &ResolutionResult) {
        let mut previous: Option<String> = None;
        for hop in &resolved.chain {
            let id = self.builder.host_node(index, hop, None);
            if let Some(from) = &previous {
                if *from != id {
                    index.edge(from, &id, EdgeKind::Cname, "CNAME");
                }
            }
            previous = Some(id);
        }
        let Some(terminal) = previous else {
            return;
        };

        let families = [(&resolved.ipv4, EdgeKind::A, "A"), (&resolved.ipv6, EdgeKind::Aaaa, "AAAA")];
        for (addresses, kind, label) in families {
            for address in addresses {
                let address = canonical_ip(address);
                let ip = index.node(NodeKind::Ip, &address, &address, None);
                index.edge(&terminal, &ip, kind, label);
            }
        }

        for (address, hostnames) in &resolved.reverse_hostnames_by_ip {
            if !resolved.addresses().any(|a| a == address) {
                continue;
            }
            let address = canonical_ip(address);
            let ip = index.node(NodeKind::Ip, &address, &address, None);
            for hostname in hostnames {
                let hostname = normalize_name(hostname);
                if hostname.is_empty() {
                    continue;
                }
                let ptr = self.builder.host_node(index, &hostname, None);
                index.edge(&ip, &ptr, EdgeKind::Ptr, "PTR");
            }
        }
    }
}

/// Parsed-and-printed address, so `2001:DB8::1` and `2001:db8::1` share a node.
fn canonical_ip(address: &str) -> String {
    address
        .trim()
        .parse::<IpAddr>()
        .map_or_else(|_| address.trim().to_string(), |ip| ip.to_string())
}

/// Addresses with A/AAAA edges from more than one distinct name.
fn shared_ips(graph: &Graph) -> Vec<SharedIp> {
    let nodes: HashMap<&str, &Node> = graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut by_address: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for edge in graph.edges.iter().filter(|e| e.kind.is_address()) {
        let (Some(from), Some(to)) = (nodes.get(edge.from.as_str()), nodes.get(edge.to.as_str()))
        else {
            continue;
        };
        if let Some(address) = to.address.as_deref() {
            by_address.entry(address).or_default().insert(from.label.as_str());
        }
    }
    by_address
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(address, names)| SharedIp {
            address: address.to_string(),
            names: names.into_iter().map(str::to_string).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Record, RecordType};

    fn rec(id: &str, rtype: RecordType, name: &str, content: &str) -> Record {
        Record::new(id, rtype, name, content)
    }

    fn external(chain: &[&str], ipv4: &[&str]) -> ResolutionResult {
        ResolutionResult {
            requested_name: chain.first().map(|s| (*s).to_string()),
            chain: chain.iter().map(|s| (*s).to_string()).collect(),
            terminal: chain.last().map(|s| (*s).to_string()).unwrap_or_default(),
            ipv4: ipv4.iter().map(|s| (*s).to_string()).collect(),
            ..ResolutionResult::default()
        }
    }

    fn snapshot(results: Vec<(&str, ResolutionResult)>) -> ResolutionSnapshot {
        ResolutionSnapshot {
            run_key: "test".into(),
            results: results
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            ..ResolutionSnapshot::default()
        }
    }

    #[test]
    fn test_local_addresses_win() {
        let local = ResolutionResult {
            chain: vec!["x".into()],
            terminal: "x".into(),
            ipv4: vec!["9.9.9.9".into()],
            source: ResolutionSource::Local,
            ..ResolutionResult::default()
        };
        let mut ext = external(&["x"], &["1.1.1.1"]);
        ext.reverse_hostnames_by_ip
            .insert("1.1.1.1".into(), vec!["one.one.one.one".into()]);

        let best = pick_best_resolution(&local, Some(&ext));
        assert_eq!(best.chain, vec!["x"]);
        assert_eq!(best.terminal, "x");
        assert_eq!(best.ipv4, vec!["9.9.9.9"]);
        assert_eq!(best.source, ResolutionSource::Local);
        assert!(best.reverse_hostnames_by_ip.is_empty());
    }

    #[test]
    fn test_local_keeps_matching_ptr_annotations() {
        let local = ResolutionResult {
            chain: vec!["x".into()],
            terminal: "x".into(),
            ipv4: vec!["192.0.2.1".into()],
            source: ResolutionSource::Local,
            ..ResolutionResult::default()
        };
        let mut ext = external(&["x"], &["192.0.2.1"]);
        ext.reverse_hostnames_by_ip
            .insert("192.0.2.1".into(), vec!["host.example.net".into()]);
        let best = pick_best_resolution(&local, Some(&ext));
        assert_eq!(
            best.reverse_hostnames_by_ip.get("192.0.2.1"),
            Some(&vec!["host.example.net".to_string()])
        );
    }

    #[test]
    fn test_longer_external_chain_wins() {
        let local = ResolutionResult {
            chain: vec!["x".into()],
            terminal: "x".into(),
            source: ResolutionSource::Local,
            ..ResolutionResult::default()
        };
        let ext = external(&["x", "y", "z"], &[]);
        let best = pick_best_resolution(&local, Some(&ext));
        assert_eq!(best.chain, vec!["x", "y", "z"]);
        assert_eq!(best.terminal, "z");
        assert_eq!(best.source, ResolutionSource::External);
    }

    #[test]
    fn test_equal_chain_without_addresses_keeps_local() {
        let local = ResolutionResult {
            chain: vec!["x".into()],
            terminal: "x".into(),
            source: ResolutionSource::Local,
            ..ResolutionResult::default()
        };
        let ext = ResolutionResult::placeholder("x");
        assert_eq!(pick_best_resolution(&local, Some(&ext)), local);
        assert_eq!(pick_best_resolution(&local, None), local);
    }

    #[test]
    fn test_local_only_topology() {
        let records = vec![
            rec("1", RecordType::Cname, "www", "edge.example.net"),
            rec("2", RecordType::A, "edge.example.net", "203.0.113.5"),
        ];
        let builder = RecordGraphBuilder::new(&records, "example.com", 5);
        let fp = ServiceFingerprinter::default();
        let topology = GraphAssembler::new(&builder, &fp).assemble();

        let www = &topology.summary.per_node_summaries["www"];
        assert_eq!(www.chain, vec!["www", "edge.example.net"]);
        assert_eq!(www.terminal, "edge.example.net");
        assert_eq!(www.ipv4, vec!["203.0.113.5"]);
        assert_eq!(www.source, ResolutionSource::Local);
        assert!(topology.summary.cname_chains.is_empty());
        assert!(topology.summary.shared_ips.is_empty());

        let graph = &topology.graph;
        let ip = graph.find(NodeKind::Ip, "203.0.113.5").unwrap();
        let edge = graph.find(NodeKind::Record, "edge.example.net").unwrap();
        assert!(graph
            .outgoing(&edge.id)
            .any(|e| e.kind == EdgeKind::A && e.to == ip.id));
    }

    #[test]
    fn test_external_chain_extends_local_hop() {
        let records = vec![rec("1", RecordType::Cname, "www", "shop.example.net")];
        let builder = RecordGraphBuilder::new(&records, "example.com", 5);
        let fp = ServiceFingerprinter::default();
        let snap = snapshot(vec![(
            "shop.example.net",
            external(
                &["shop.example.net", "shops.myshopify.com"],
                &["23.227.38.65"],
            ),
        )]);
        let topology = GraphAssembler::new(&builder, &fp)
            .with_snapshot(&snap)
            .assemble();

        let www = &topology.summary.per_node_summaries["www"];
        assert_eq!(
            www.chain,
            vec!["www", "shop.example.net", "shops.myshopify.com"]
        );
        assert_eq!(www.ipv4, vec!["23.227.38.65"]);
        assert_eq!(www.provider.as_deref(), Some("Shopify"));
        assert_eq!(
            topology.summary.cname_chains,
            vec![vec![
                "www".to_string(),
                "shop.example.net".to_string(),
                "shops.myshopify.com".to_string()
            ]]
        );
        assert!(topology
            .summary
            .detected_services
            .iter()
            .any(|s| s.target == "shops.myshopify.com" && s.provider == "Shopify"));

        let graph = &topology.graph;
        let service = graph.find(NodeKind::Service, "Shopify").unwrap();
        assert!(graph
            .edges
            .iter()
            .any(|e| e.kind == EdgeKind::ServiceLink && e.to == service.id));
    }

    #[test]
    fn test_external_view_respects_hop_limit() {
        let records = vec![rec("1", RecordType::Cname, "www", "a.cdn.net")];
        let builder = RecordGraphBuilder::new(&records, "example.com", 2);
        let fp = ServiceFingerprinter::default();
        let snap = snapshot(vec![(
            "a.cdn.net",
            external(&["a.cdn.net", "b.cdn.net", "c.cdn.net"], &["198.51.100.1"]),
        )]);
        let assembler = GraphAssembler::new(&builder, &fp).with_snapshot(&snap);

        let best = assembler.best_resolution("www");
        assert_eq!(best.chain, vec!["www", "a.cdn.net", "b.cdn.net"]);
        assert_eq!(best.terminal, "b.cdn.net");
        assert!(!best.has_addresses());

        let topology = assembler.assemble();
        let www = &topology.summary.per_node_summaries["www"];
        assert_eq!(www.chain.len(), 3);
        assert!(topology
            .summary
            .cname_chains
            .iter()
            .all(|chain| chain.len() <= 3));
    }

    #[test]
    fn test_external_view_stops_at_cycle() {
        let records = vec![rec("1", RecordType::Cname, "www", "a.cdn.net")];
        let builder = RecordGraphBuilder::new(&records, "example.com", 5);
        let fp = ServiceFingerprinter::default();
        let snap = snapshot(vec![(
            "a.cdn.net",
            external(&["a.cdn.net", "www", "z.net"], &["198.51.100.2"]),
        )]);
        let assembler = GraphAssembler::new(&builder, &fp).with_snapshot(&snap);

        let best = assembler.best_resolution("www");
        assert_eq!(best.chain, vec!["www", "a.cdn.net"]);
        assert_eq!(best.terminal, "a.cdn.net");
        assert!(!best.has_addresses());
    }

    #[test]
    fn test_mx_trail_uses_best_resolution() {
        let records = vec![rec("mx", RecordType::Mx, "@", "10 mail.example.net")];
        let builder = RecordGraphBuilder::new(&records, "example.com", 5);
        let fp = ServiceFingerprinter::default();
        let snap = snapshot(vec![(
            "mail.example.net",
            external(&["mail.example.net"], &["198.51.100.25"]),
        )]);
        let topology = GraphAssembler::new(&builder, &fp)
            .with_snapshot(&snap)
            .assemble();

        let trails = &topology.summary.mx_trails;
        assert_eq!(trails.len(), 1);
        assert_eq!(trails[0].trail.priority, 10);
        assert_eq!(trails[0].trail.from, "example.com");
        assert_eq!(trails[0].ipv4, vec!["198.51.100.25"]);
        assert_eq!(topology.summary.area_counts.get(&Area::Email), Some(&1));
    }

    #[test]
    fn test_shared_ip_detection() {
        let records = vec![
            rec("1", RecordType::A, "@", "192.0.2.10"),
            rec("2", RecordType::A, "www", "192.0.2.10"),
            rec("3", RecordType::A, "api", "192.0.2.11"),
            rec("4", RecordType::Cname, "cdn", "www"),
        ];
        let builder = RecordGraphBuilder::new(&records, "example.com", 5);
        let fp = ServiceFingerprinter::default();
        let topology = GraphAssembler::new(&builder, &fp).assemble();
        assert_eq!(
            topology.summary.shared_ips,
            vec![SharedIp {
                address: "192.0.2.10".into(),
                names: vec!["example.com".into(), "www".into()],
            }]
        );
    }

    #[test]
    fn test_ptr_edges_from_external() {
        let records = vec![rec("1", RecordType::Cname, "www", "edge.example.net")];
        let builder = RecordGraphBuilder::new(&records, "example.com", 5);
        let fp = ServiceFingerprinter::default();
        let mut ext = external(&["edge.example.net"], &["203.0.113.9"]);
        ext.reverse_hostnames_by_ip
            .insert("203.0.113.9".into(), vec!["Host-9.Example.NET.".into()]);
        let snap = snapshot(vec![("edge.example.net", ext)]);
        let topology = GraphAssembler::new(&builder, &fp)
            .with_snapshot(&snap)
            .assemble();

        let graph = &topology.graph;
        let ip = graph.find(NodeKind::Ip, "203.0.113.9").unwrap();
        let ptr = graph.find(NodeKind::Target, "host-9.example.net").unwrap();
        assert!(graph
            .outgoing(&ip.id)
            .any(|e| e.kind == EdgeKind::Ptr && e.to == ptr.id));
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let records = vec![
            rec("1", RecordType::Cname, "www", "edge.example.net"),
            rec("2", RecordType::Mx, "@", "10 mx.example.net"),
            rec("3", RecordType::Ns, "@", "ns1.example.net"),
            rec("4", RecordType::Txt, "_dmarc", "v=DMARC1; p=none"),
        ];
        let builder = RecordGraphBuilder::new(&records, "example.com", 5);
        let fp = ServiceFingerprinter::default();
        let first = GraphAssembler::new(&builder, &fp).assemble();
        let second = GraphAssembler::new(&builder, &fp).assemble();
        assert_eq!(first, second);
    }
}
