//! `zonegraph config` - resolver configuration management.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::output::{self, OutputFormat};

pub fn execute(ctx: &Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(ctx),
        ConfigCommands::Path => show_path(ctx),
        ConfigCommands::Init { force } => init_config(ctx, force),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let config = ctx.resolver_config()?;

    match ctx.output_format {
        OutputFormat::Json => output::print_json(&config),
        OutputFormat::Pretty => {
            println!("{}", "Resolver Configuration:".bold());
            println!();
            println!("  {} {}", "mode:".bold(), config.resolver_mode);
            println!("  {} {}", "dns server:".bold(), config.selected_dns_server());
            println!("  {} {}", "doh provider:".bold(), config.doh_provider);
            println!("  {} {}", "doh endpoints:".bold(), config.doh_endpoints().join(", "));
            println!("  {} {}", "max hops:".bold(), config.max_resolution_hops);
            println!("  {} {} ms", "lookup timeout:".bold(), config.lookup_timeout_ms);
            println!("  {} {}", "ptr lookups:".bold(), !config.disable_ptr_lookups);
            println!(
                "  {} {} ({})",
                "geo lookups:".bold(),
                !config.disable_geo_lookups,
                config.geo_provider
            );
            println!("  {} {}", "follow chains:".bold(), config.scan_resolution_chain);
            println!("  {} {}", "service probes:".bold(), !config.disable_service_discovery);
            if !config.tcp_service_ports.is_empty() {
                let ports: Vec<String> =
                    config.tcp_service_ports.iter().map(ToString::to_string).collect();
                println!("  {} {}", "tcp ports:".bold(), ports.join(", "));
            }
            println!(
                "  {} {} ({}/s)",
                "fallback workers:".bold(),
                config.fallback_concurrency,
                config.doh_rate_limit
            );
            if ctx.verbose {
                println!();
                println!("  {} {}", "cache partition:".dimmed(), config.cache_partition());
            }
            Ok(())
        }
    }
}

fn show_path(ctx: &Context) -> Result<()> {
    println!("{}", ctx.config_path()?.display());
    Ok(())
}

fn init_config(ctx: &Context, force: bool) -> Result<()> {
    let path = ctx.config_path()?;
    crate::config::init(&path, force)?;
    println!("{} Wrote {}", "Success:".green().bold(), path.display());
    Ok(())
}
