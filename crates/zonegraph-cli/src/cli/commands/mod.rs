//! Command implementations.

pub mod config;
pub mod graph;
pub mod resolve;

use anyhow::{Context as _, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use zonegraph::{Record, ResolverConfig};

use super::args::ZoneArgs;
use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output format
    pub output_format: OutputFormat,

    /// Config file given on the command line
    pub config_path: Option<PathBuf>,

    /// Verbose output
    pub verbose: bool,
}

impl Context {
    /// Path of the resolver config file.
    pub fn config_path(&self) -> Result<PathBuf> {
        crate::config::path(self.config_path.as_deref())
    }

    /// Load the resolver configuration.
    pub fn resolver_config(&self) -> Result<ResolverConfig> {
        crate::config::load(&self.config_path()?)
    }
}

/// Read the zone's records from a JSON file or stdin.
pub fn read_records(args: &ZoneArgs) -> Result<Vec<Record>> {
    let content = if args.records == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.records)
            .with_context(|| format!("Failed to read {}", args.records.display()))?
    };

    serde_json::from_str(&content).with_context(|| {
        format!(
            "{} is not a JSON array of records",
            args.records.display()
        )
    })
}
