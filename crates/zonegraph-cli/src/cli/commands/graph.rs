//! `zonegraph graph` - local-only topology.

use anyhow::Result;
use tracing::debug;
use zonegraph::ZoneTopology;

use super::{read_records, Context};
use crate::cli::args::GraphArgs;
use crate::output::{self, OutputFormat};

pub fn execute(ctx: &Context, args: GraphArgs) -> Result<()> {
    let config = ctx.resolver_config()?;
    let records = read_records(&args.zone)?;
    debug!(records = records.len(), zone = %args.zone.zone, "building local topology");

    let engine = ZoneTopology::builder().build(&config)?;
    let topology = engine.local(&records, &args.zone.zone, &config)?;

    match (ctx.output_format, args.graph_only) {
        (OutputFormat::Json, true) => output::print_json(&topology.graph),
        (OutputFormat::Json, false) => output::print_json(&topology),
        (OutputFormat::Pretty, _) => {
            print!("{}", output::render_topology(&args.zone.zone, &topology));
            Ok(())
        }
    }
}
