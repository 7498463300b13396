//! Graph model and the local, record-only half of topology construction.

mod areas;
mod builder;
mod model;

pub use areas::{classify_areas, Area};
pub use builder::{build_address_maps, build_cname_map, AddressMaps, CnameMap, MxTrail, RecordGraphBuilder};
pub use model::{Edge, EdgeKind, Graph, GraphIndex, Node, NodeKind};
