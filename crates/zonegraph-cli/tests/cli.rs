use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

const RECORDS: &str = r#"[
  {"id": "1", "type": "CNAME", "name": "www", "content": "edge.example.net"},
  {"id": "2", "type": "A", "name": "edge.example.net", "content": "203.0.113.5"},
  {"id": "3", "type": "MX", "name": "@", "content": "10 mail.example.net"}
]"#;

fn zonegraph(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("zonegraph").unwrap();
    cmd.env("ZONEGRAPH_CONFIG", config).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_graph_json() {
    let dir = tempfile::tempdir().unwrap();
    let records = dir.path().join("records.json");
    std::fs::write(&records, RECORDS).unwrap();

    let output = zonegraph(&dir.path().join("resolver.toml"))
        .args(["graph", "--zone", "example.com", "--output", "json", "--records"])
        .arg(&records)
        .output()
        .unwrap();
    assert!(output.status.success());

    let topology: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let www = &topology["summary"]["perNodeSummaries"]["www"];
    assert_eq!(www["terminal"], "edge.example.net");
    assert_eq!(www["ipv4"][0], "203.0.113.5");
    assert_eq!(topology["summary"]["mxTrails"][0]["priority"], 10);
    assert!(topology["graph"]["nodes"].as_array().unwrap().len() > 3);
}

#[test]
fn test_graph_pretty_from_stdin() {
    let dir = tempfile::tempdir().unwrap();

    zonegraph(&dir.path().join("resolver.toml"))
        .args(["--no-color", "graph", "--zone", "example.com", "--records", "-"])
        .write_stdin(RECORDS)
        .assert()
        .success()
        .stdout(predicate::str::contains("Zone example.com"))
        .stdout(predicate::str::contains("mail.example.net"));
}

#[test]
fn test_bad_records_file() {
    let dir = tempfile::tempdir().unwrap();
    let records = dir.path().join("records.json");
    std::fs::write(&records, "{not json").unwrap();

    zonegraph(&dir.path().join("resolver.toml"))
        .args(["graph", "--zone", "example.com", "--records"])
        .arg(&records)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a JSON array of records"));
}

#[test]
fn test_config_init_show_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("conf").join("resolver.toml");

    zonegraph(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("resolver.toml"));

    zonegraph(&config).args(["config", "init"]).assert().success();
    assert!(config.exists());
    zonegraph(&config).args(["config", "init"]).assert().failure();

    let output = zonegraph(&config)
        .args(["config", "show", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["maxResolutionHops"], 15);
    assert_eq!(shown["resolverMode"], "dns");
}

#[test]
fn test_invalid_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("resolver.toml");
    std::fs::write(&config, "maxResolutionHops = 0\n").unwrap();

    zonegraph(&config)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("maxResolutionHops"));
}
