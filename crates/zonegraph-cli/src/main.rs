//! zonegraph - DNS zone topology explorer
//!
//! Builds the resolution graph of a zone from its records.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    zonegraph_cli::run().await
}
