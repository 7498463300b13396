use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Kind of graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// The zone apex
    Zone,
    /// An owner name carrying records in the zone
    Record,
    /// A hostname some record points at (or a resolved hop)
    Target,
    /// A literal address
    Ip,
    /// A detected third-party provider
    Service,
    /// MX preference node between an owner and its exchange
    MxPriority,
}

/// Kind of graph edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    #[serde(rename = "CNAME")]
    Cname,
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "MX")]
    Mx,
    #[serde(rename = "NS")]
    Ns,
    #[serde(rename = "SRV")]
    Srv,
    #[serde(rename = "PTR")]
    Ptr,
    /// Hostname to detected provider
    #[serde(rename = "service-link")]
    ServiceLink,
    /// Zone apex to an owner name
    #[serde(rename = "owns")]
    Owns,
}

impl EdgeKind {
    /// Returns true for A/AAAA edges
    #[must_use]
    pub const fn is_address(self) -> bool {
        matches!(self, Self::A | Self::Aaaa)
    }
}

/// A node of the topology graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Stable id, deterministic for the node's dedupe key
    pub id: String,
    /// Node kind
    pub kind: NodeKind,
    /// Display label
    pub label: String,
    /// Record that produced this node, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Literal address for `ip` nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A directed edge of the topology graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id
    pub from: String,
    /// Destination node id
    pub to: String,
    /// Edge kind
    pub kind: EdgeKind,
    /// Display label
    pub label: String,
}

/// Node/edge graph of a zone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    /// Nodes in insertion order
    pub nodes: Vec<Node>,
    /// Edges in insertion order
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Look up a node by id
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Look up a node by kind and label
    #[must_use]
    pub fn find(&self, kind: NodeKind, label: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.kind == kind && n.label == label)
    }

    /// Edges leaving a node
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }
}

/// Incremental graph writer that assigns one id per (kind, key).
///
/// Ids are handed out in insertion order, so replaying the same inserts
/// reproduces the same ids.
#[derive(Debug, Default)]
pub struct GraphIndex {
    ids: HashMap<(NodeKind, String), usize>,
    edge_keys: HashSet<(String, String, EdgeKind)>,
    graph: Graph,
}

impl GraphIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for (kind, key), creating the node on first use.
    ///
    /// Later calls for the same key keep the first label, but fill in a
    /// missing record back-reference.
    pub fn node(
        &mut self,
        kind: NodeKind,
        key: &str,
        label: &str,
        record_id: Option<&str>,
    ) -> String {
        if let Some(&index) = self.ids.get(&(kind, key.to_string())) {
            let node = &mut self.graph.nodes[index];
            if node.record_id.is_none() {
                node.record_id = record_id.filter(|r| !r.is_empty()).map(str::to_string);
            }
            return node.id.clone();
        }

        let index = self.graph.nodes.len();
        let id = format!("n{index}");
        self.graph.nodes.push(Node {
            id: id.clone(),
            kind,
            label: label.to_string(),
            record_id: record_id.filter(|r| !r.is_empty()).map(str::to_string),
            address: (kind == NodeKind::Ip).then(|| key.to_string()),
        });
        self.ids.insert((kind, key.to_string()), index);
        id
    }

    /// Id of an existing node
    #[must_use]
    pub fn get(&self, kind: NodeKind, key: &str) -> Option<&str> {
        self.ids
            .get(&(kind, key.to_string()))
            .map(|&index| self.graph.nodes[index].id.as_str())
    }

    /// Add an edge unless an edge of the same kind already joins the pair.
    ///
    /// Returns true if the edge was new.
    pub fn edge(&mut self, from: &str, to: &str, kind: EdgeKind, label: &str) -> bool {
        if !self
            .edge_keys
            .insert((from.to_string(), to.to_string(), kind))
        {
            return false;
        }
        self.graph.edges.push(Edge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
            label: label.to_string(),
        });
        true
    }

    /// Read access to the graph built so far
    #[must_use]
    pub const fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Finish building
    #[must_use]
    pub fn finish(self) -> Graph {
        self.graph
    }
}
