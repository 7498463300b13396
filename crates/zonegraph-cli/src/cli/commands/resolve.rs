//! `zonegraph resolve` - full resolution with progress.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use zonegraph::{ResolverMode, ZoneTopology};

use super::{read_records, Context};
use crate::cli::args::ResolveArgs;
use crate::output::{self, OutputFormat};

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner} {msg} {bar:40.cyan/blue} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message("resolving");
    pb
}

pub async fn execute(ctx: &Context, args: ResolveArgs) -> Result<()> {
    let mut config = ctx.resolver_config()?;
    if args.doh {
        config.resolver_mode = ResolverMode::Doh;
    }
    if args.no_probes {
        config.disable_service_discovery = true;
    }
    let records = read_records(&args.zone)?;

    let mut builder = ZoneTopology::builder();
    if !args.no_backend {
        builder = builder.system_backend();
    }
    let engine = builder.build(&config)?;

    let show_progress = !args.quiet && ctx.output_format == OutputFormat::Pretty;
    let pb = show_progress.then(progress_bar);
    let watcher = pb.clone().map(|pb| {
        let mut rx = engine.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                pb.set_length(u64::try_from(state.total).unwrap_or(u64::MAX));
                pb.set_position(u64::try_from(state.done).unwrap_or(u64::MAX));
            }
        })
    });

    let topology = engine.resolve(&records, &args.zone.zone, &config).await;

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let Some(topology) = topology? else {
        anyhow::bail!("Resolution was superseded before it finished");
    };

    match ctx.output_format {
        OutputFormat::Json => output::print_json(&topology),
        OutputFormat::Pretty => {
            print!("{}", output::render_topology(&args.zone.zone, &topology));
            Ok(())
        }
    }
}
