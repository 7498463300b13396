//! # zonegraph-cli
//!
//! Command-line interface for zonegraph.
//!
//! ## Features
//!
//! - **Local graphs**: topology from a zone's own records, no network
//! - **Resolution**: external CNAME/A/AAAA/PTR resolution with a live progress bar
//! - **Configuration**: resolver settings in `resolver.toml`
//! - **Multiple output formats**: pretty text or JSON

pub mod cli;
pub mod config;
pub mod output;

pub use cli::run;
