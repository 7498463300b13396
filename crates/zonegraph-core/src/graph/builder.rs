//! Local graph primitives derived from a zone's own records.
//!
//! Everything here is a pure function of the record set: no I/O, no shared
//! state, safe to call from any thread.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::config::{MAX_HOPS, MIN_HOPS};
use crate::graph::areas::{classify_areas, Area};
use crate::graph::model::{EdgeKind, Graph, GraphIndex, NodeKind};
use crate::name::{is_ip_literal, normalize_name, owner_name};
use crate::types::{Record, RecordPayload, RecordType, ResolutionResult, ResolutionSource};

/// Owner name → CNAME target
pub type CnameMap = BTreeMap<String, String>;

/// Owner name → addresses, per family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMaps {
    /// A records
    pub ipv4: BTreeMap<String, BTreeSet<String>>,
    /// AAAA records
    pub ipv6: BTreeMap<String, BTreeSet<String>>,
}

impl AddressMaps {
    /// IPv4 addresses of a name, sorted
    #[must_use]
    pub fn ipv4_of(&self, name: &str) -> Vec<String> {
        self.ipv4
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// IPv6 addresses of a name, sorted
    #[must_use]
    pub fn ipv6_of(&self, name: &str) -> Vec<String> {
        self.ipv6
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// One MX record seen as a mail-delivery path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MxTrail {
    /// Owner of the MX record (zone apex for `@`)
    pub from: String,
    /// MX preference
    pub priority: u16,
    /// Exchange host
    pub exchange: String,
}

/// Build the CNAME map. Duplicate owners keep the last target.
#[must_use]
pub fn build_cname_map(records: &[Record], zone: &str) -> CnameMap {
    let mut map = CnameMap::new();
    for record in records {
        if let Some(RecordPayload::Alias { target }) = record.payload() {
            map.insert(owner_name(&record.name, zone), target);
        }
    }
    map
}

/// Build the address maps as the union of all A/AAAA records per owner.
#[must_use]
pub fn build_address_maps(records: &[Record], zone: &str) -> AddressMaps {
    let mut maps = AddressMaps::default();
    for record in records {
        let Some(RecordPayload::Address(ip)) = record.payload() else {
            continue;
        };
        let family = if ip.is_ipv4() {
            &mut maps.ipv4
        } else {
            &mut maps.ipv6
        };
        family
            .entry(owner_name(&record.name, zone))
            .or_default()
            .insert(ip.to_string());
    }
    maps
}

/// Derives CNAME chains, terminals, MX trails and area tags from a record
/// set, and emits the local part of the topology graph.
#[derive(Debug, Clone)]
pub struct RecordGraphBuilder<'a> {
    records: &'a [Record],
    zone: String,
    max_hops: usize,
    cname_map: CnameMap,
    addresses: AddressMaps,
    owners: BTreeSet<String>,
}

impl<'a> RecordGraphBuilder<'a> {
    /// Index a record set. `max_hops` is clamped to 1..=15.
    #[must_use]
    pub fn new(records: &'a [Record], zone: &str, max_hops: usize) -> Self {
        let zone = normalize_name(zone);
        Self {
            records,
            cname_map: build_cname_map(records, &zone),
            addresses: build_address_maps(records, &zone),
            owners: records
                .iter()
                .map(|r| owner_name(&r.name, &zone))
                .collect(),
            max_hops: max_hops.clamp(usize::from(MIN_HOPS), usize::from(MAX_HOPS)),
            zone,
        }
    }

    /// Normalized zone apex
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// The record set being analysed
    #[must_use]
    pub const fn records(&self) -> &'a [Record] {
        self.records
    }

    /// Effective hop bound
    #[must_use]
    pub const fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// CNAME map
    #[must_use]
    pub const fn cname_map(&self) -> &CnameMap {
        &self.cname_map
    }

    /// A/AAAA maps
    #[must_use]
    pub const fn address_maps(&self) -> &AddressMaps {
        &self.addresses
    }

    /// Normalized owner names carrying records
    #[must_use]
    pub const fn owners(&self) -> &BTreeSet<String> {
        &self.owners
    }

    /// Normalized owner of a record
    #[must_use]
    pub fn owner_of(&self, record: &Record) -> String {
        owner_name(&record.name, &self.zone)
    }

    /// Follow the CNAME map from `start`, stopping at a missing hop, a
    /// repeated name or the hop bound.
    fn walk(&self, start: &str) -> Vec<String> {
        let mut chain = vec![start.to_string()];
        let mut seen = HashSet::from([start.to_string()]);
        let mut current = start;
        for _ in 0..self.max_hops {
            let Some(next) = self.cname_map.get(current) else {
                break;
            };
            if !seen.insert(next.clone()) {
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// Transitive CNAME chains (more than one hop), ordered by owner.
    #[must_use]
    pub fn compute_cname_chains(&self) -> Vec<Vec<String>> {
        self.cname_map
            .keys()
            .map(|owner| self.walk(owner))
            .filter(|chain| chain.len() > 2)
            .collect()
    }

    /// Resolve a name through the zone's own records.
    ///
    /// Always returns a chain starting at `name`; addresses come from the
    /// terminal's A/AAAA records and may be empty.
    #[must_use]
    pub fn resolve_name_to_terminal(&self, name: &str) -> ResolutionResult {
        let name = normalize_name(name);
        let chain = self.walk(&name);
        let terminal = chain.last().cloned().unwrap_or_else(|| name.clone());
        ResolutionResult {
            requested_name: Some(name),
            ipv4: self.addresses.ipv4_of(&terminal),
            ipv6: self.addresses.ipv6_of(&terminal),
            chain,
            terminal,
            source: ResolutionSource::Local,
            ..ResolutionResult::default()
        }
    }

    /// MX exchanges plus every hop of their local chains
    #[must_use]
    pub fn email_path_names(&self) -> HashSet<String> {
        self.mx_trails()
            .iter()
            .flat_map(|trail| self.walk(&trail.exchange))
            .collect()
    }

    /// Area tags for one name
    #[must_use]
    pub fn classify(&self, name: &str, email_path_names: &HashSet<String>) -> BTreeSet<Area> {
        let name = normalize_name(name);
        let at_name: Vec<&Record> = self
            .records
            .iter()
            .filter(|r| self.owner_of(r) == name)
            .collect();
        classify_areas(&name, &at_name, email_path_names)
    }

    /// Non-IP targets of CNAME/NS/MX/SRV records, first-seen order.
    #[must_use]
    pub fn candidate_hostnames(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| r.record_type.has_host_target())
            .filter_map(Record::extract_target)
            .filter(|target| !is_ip_literal(target))
            .filter(|target| seen.insert(target.clone()))
            .collect()
    }

    /// MX records as trails, ordered by priority then exchange.
    #[must_use]
    pub fn mx_trails(&self) -> Vec<MxTrail> {
        let trails: BTreeSet<MxTrail> = self
            .records
            .iter()
            .filter_map(|record| match record.payload()? {
                RecordPayload::MailExchange { priority, exchange } => Some(MxTrail {
                    from: self.owner_of(record),
                    priority,
                    exchange,
                }),
                _ => None,
            })
            .collect();
        let mut trails: Vec<MxTrail> = trails.into_iter().collect();
        trails.sort_by(|a, b| {
            (a.priority, &a.exchange, &a.from).cmp(&(b.priority, &b.exchange, &b.from))
        });
        trails
    }

    /// Node for a hostname: the owner node when the zone has records for
    /// it, a target node otherwise.
    pub fn host_node(&self, index: &mut GraphIndex, name: &str, record_id: Option<&str>) -> String {
        if self.owners.contains(name) {
            index.node(NodeKind::Record, name, name, record_id)
        } else {
            index.node(NodeKind::Target, name, name, None)
        }
    }

    /// Emit the zone, owner, target, address and MX priority nodes.
    pub fn populate(&self, index: &mut GraphIndex) {
        let zone_id = index.node(NodeKind::Zone, &self.zone, &self.zone, None);

        for record in self.records {
            let owner = self.owner_of(record);
            let owner_id = index.node(NodeKind::Record, &owner, &owner, Some(&record.id));
            index.edge(&zone_id, &owner_id, EdgeKind::Owns, "owns");

            let Some(payload) = record.payload() else {
                continue;
            };
            match payload {
                RecordPayload::Address(ip) => {
                    let address = ip.to_string();
                    let ip_id = index.node(NodeKind::Ip, &address, &address, Some(&record.id));
                    let kind = if record.record_type == RecordType::A {
                        EdgeKind::A
                    } else {
                        EdgeKind::Aaaa
                    };
                    index.edge(&owner_id, &ip_id, kind, record.record_type.as_str());
                }
                RecordPayload::Alias { target } => {
                    let to = self.host_node(index, &target, None);
                    index.edge(&owner_id, &to, EdgeKind::Cname, "CNAME");
                }
                RecordPayload::NameServer { target } => {
                    let to = self.host_node(index, &target, None);
                    index.edge(&owner_id, &to, EdgeKind::Ns, "NS");
                }
                RecordPayload::MailExchange { priority, exchange } => {
                    let key = format!("{exchange}|{priority}");
                    let label = format!("MX {priority}");
                    let prio_id = index.node(NodeKind::MxPriority, &key, &label, None);
                    let to = self.host_node(index, &exchange, None);
                    let priority = priority.to_string();
                    index.edge(&owner_id, &prio_id, EdgeKind::Mx, &priority);
                    index.edge(&prio_id, &to, EdgeKind::Mx, &priority);
                }
                RecordPayload::Service { port, target, .. } => {
                    let to = self.host_node(index, &target, None);
                    index.edge(&owner_id, &to, EdgeKind::Srv, &format!("port {port}"));
                }
                RecordPayload::Text(_) | RecordPayload::Other(_) => {}
            }
        }
    }

    /// Local-only topology graph
    #[must_use]
    pub fn record_graph(&self) -> Graph {
        let mut index = GraphIndex::new();
        self.populate(&mut index);
        index.finish()
    }
}
