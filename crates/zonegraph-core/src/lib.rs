//! Core types and topology construction for zonegraph.
//!
//! This crate is the pure half of the engine. It never touches the network:
//!
//! - **Types**: records, typed record payloads, resolution results and probes
//! - **Graph**: [`RecordGraphBuilder`] derives CNAME chains, address maps, MX
//!   trails and area tags from a record set
//! - **Assembly**: [`GraphAssembler`] merges local data with an external
//!   [`ResolutionSnapshot`] into a [`Topology`]
//! - **Config**: [`ResolverConfig`] and its validation
//! - **Errors**: [`TopologyError`]
//!
//! # Example
//!
//! ```rust
//! use zonegraph_core::{GraphAssembler, Record, RecordGraphBuilder, RecordType, ServiceFingerprinter};
//!
//! let records = vec![
//!     Record::new("1", RecordType::Cname, "www", "edge.example.net"),
//!     Record::new("2", RecordType::A, "edge.example.net", "203.0.113.5"),
//! ];
//! let builder = RecordGraphBuilder::new(&records, "example.com", 15);
//! let fingerprinter = ServiceFingerprinter::default();
//! let topology = GraphAssembler::new(&builder, &fingerprinter).assemble();
//!
//! assert_eq!(topology.summary.per_node_summaries["www"].ipv4, vec!["203.0.113.5"]);
//! ```

pub mod assembler;
pub mod config;
mod error;
pub mod fingerprint;
pub mod graph;
pub mod name;
pub mod types;

pub use assembler::{
    pick_best_resolution, GraphAssembler, MxTrailSummary, NodeSummary, SharedIp, Summary, Topology,
};
pub use config::{DohProvider, GeoProvider, ResolverConfig, ResolverMode};
pub use error::{Result, TopologyError};
pub use fingerprint::{DetectedService, ServiceFingerprinter};
pub use graph::{Area, Edge, EdgeKind, Graph, GraphIndex, MxTrail, Node, NodeKind, RecordGraphBuilder};
pub use name::normalize_name;
pub use types::*;
