mod probe;
mod record;
mod resolution;
mod snapshot;

pub use probe::*;
pub use record::*;
pub use resolution::*;
pub use snapshot::*;
