//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Explore the resolution topology of a DNS zone
///
/// Reads a zone's records as JSON, follows every CNAME, MX, NS and SRV
/// target and shows where the zone's traffic actually ends up.
#[derive(Parser, Debug)]
#[command(name = "zonegraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Resolver config file (defaults to the platform config dir)
    #[arg(short, long, global = true, env = "ZONEGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the topology from the zone's own records only
    Graph(GraphArgs),

    /// Resolve every target externally and build the full topology
    Resolve(ResolveArgs),

    /// Manage resolver configuration
    Config(ConfigArgs),
}

// ============================================================================
// Zone input
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ZoneArgs {
    /// JSON file with the zone's records (`-` for stdin)
    #[arg(short, long)]
    pub records: PathBuf,

    /// Zone apex, e.g. example.com
    #[arg(short, long)]
    pub zone: String,
}

// ============================================================================
// Graph command
// ============================================================================

#[derive(Args, Debug)]
pub struct GraphArgs {
    #[command(flatten)]
    pub zone: ZoneArgs,

    /// Print the node/edge graph instead of the summary
    #[arg(long)]
    pub graph_only: bool,
}

// ============================================================================
// Resolve command
// ============================================================================

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub zone: ZoneArgs,

    /// Skip the in-process batch backend and resolve through DoH only
    #[arg(long)]
    pub no_backend: bool,

    /// Use DNS-over-HTTPS for every lookup
    #[arg(long)]
    pub doh: bool,

    /// Skip HTTP/TCP reachability probes
    #[arg(long)]
    pub no_probes: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective resolver configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
