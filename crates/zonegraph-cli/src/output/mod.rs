//! Output formatting.

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;
use zonegraph::{ResolutionSource, Topology};

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary with colors
    #[default]
    Pretty,
    /// JSON output
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!(
                "Unknown output format: {s}\n\
                 Valid formats: pretty, json"
            ),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{}", title.bold());
}

/// Render a topology summary as text.
#[must_use]
pub fn render_topology(zone: &str, topology: &Topology) -> String {
    let summary = &topology.summary;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({} nodes, {} edges)",
        "Zone".bold(),
        zone.cyan(),
        topology.graph.nodes.len(),
        topology.graph.edges.len()
    );

    if !summary.cname_chains.is_empty() {
        section(&mut out, "CNAME chains");
        for chain in &summary.cname_chains {
            let _ = writeln!(out, "  {}", chain.join(" → "));
        }
    }

    if !summary.mx_trails.is_empty() {
        section(&mut out, "Mail");
        for mx in &summary.mx_trails {
            let endpoints: Vec<&str> = mx
                .ipv4
                .iter()
                .chain(mx.ipv6.iter())
                .map(String::as_str)
                .collect();
            let _ = writeln!(
                out,
                "  {} {} {} → {}",
                mx.trail.from,
                mx.trail.priority.to_string().yellow(),
                mx.chain.join(" → "),
                if endpoints.is_empty() {
                    "unresolved".dimmed().to_string()
                } else {
                    endpoints.join(", ")
                }
            );
        }
    }

    if !summary.shared_ips.is_empty() {
        section(&mut out, "Shared addresses");
        for shared in &summary.shared_ips {
            let _ = writeln!(out, "  {}  {}", shared.address.green(), shared.names.join(", "));
        }
    }

    if !summary.detected_services.is_empty() {
        section(&mut out, "Services");
        for service in &summary.detected_services {
            let _ = writeln!(out, "  {}  {}", service.target, service.provider.magenta());
        }
    }

    if !summary.area_counts.is_empty() {
        section(&mut out, "Areas");
        let counts: Vec<String> = summary
            .area_counts
            .iter()
            .map(|(area, count)| format!("{area} {count}"))
            .collect();
        let _ = writeln!(out, "  {}", counts.join("  "));
    }

    section(&mut out, "Names");
    for (name, node) in &summary.per_node_summaries {
        let addresses: Vec<&str> = node
            .ipv4
            .iter()
            .chain(node.ipv6.iter())
            .map(String::as_str)
            .collect();
        let source = match node.source {
            ResolutionSource::Local => "local".dimmed(),
            ResolutionSource::External => "external".blue(),
        };
        let target = if node.terminal == *name {
            String::new()
        } else {
            format!(" → {}", node.terminal)
        };
        let detail = node.error.as_ref().map_or_else(
            || addresses.join(", ").green().to_string(),
            |e| e.red().to_string(),
        );
        let _ = writeln!(out, "  {name}{target}  {detail} [{source}]");
    }

    if !summary.probes.is_empty() || !summary.tcp_probes.is_empty() {
        section(&mut out, "Reachability");
        let mark = |up: bool| if up { "up".green() } else { "down".red() };
        for probe in &summary.probes {
            let _ = writeln!(
                out,
                "  {}  https {}  http {}",
                probe.host,
                mark(probe.https_up),
                mark(probe.http_up)
            );
        }
        for probe in &summary.tcp_probes {
            let _ = writeln!(out, "  {}:{}  tcp {}", probe.host, probe.port, mark(probe.up));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonegraph::{GraphAssembler, Record, RecordGraphBuilder, RecordType, ServiceFingerprinter};

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Pretty);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_render_lists_names_and_mail() {
        colored::control::set_override(false);
        let records = vec![
            Record::new("1", RecordType::Cname, "www", "edge.example.net"),
            Record::new("2", RecordType::A, "edge.example.net", "203.0.113.5"),
            Record::new("3", RecordType::Mx, "@", "10 mail.example.net"),
        ];
        let builder = RecordGraphBuilder::new(&records, "example.com", 15);
        let topology =
            GraphAssembler::new(&builder, &ServiceFingerprinter::default()).assemble();

        let text = render_topology("example.com", &topology);
        assert!(text.contains("Zone example.com"));
        assert!(text.contains("www → edge.example.net  203.0.113.5 [local]"));
        assert!(text.contains("example.com 10 mail.example.net → unresolved"));
    }
}
