use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tetrad::Config;

const PEOPLE: &str = "@prefix ex: <http://example.org/> .\n\
    ex:alice ex:knows ex:bob, ex:carol .\n\
    ex:bob ex:knows ex:alice .\n\
    ex:alice ex:name \"Alice\" .\n";

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

fn file_iri(path: &Path) -> String {
    url::Url::from_file_path(path.canonicalize().unwrap())
        .unwrap()
        .to_string()
}

/// Runs the CLI in-process and returns what it printed.
fn run(args: &[&str]) -> anyhow::Result<String> {
    let mut out = Vec::new();
    let mut argv = vec!["tetrad"];
    argv.extend_from_slice(args);
    tetrad_cli::run_from_args_to(argv, &mut out)?;
    Ok(String::from_utf8(out).expect("utf8 output"))
}

#[test]
fn stats_counts_quads_per_graph() {
    let dir = TempDir::new().unwrap();
    let people = write_file(dir.path(), "people.ttl", PEOPLE);
    let out = run(&["stats", "--load", people.to_str().unwrap()]).unwrap();
    let mut lines = out.lines();
    assert_eq!(lines.next(), Some("4 quads"));
    let graph_line = lines.next().unwrap();
    assert!(graph_line.starts_with("<file://"), "{graph_line}");
    assert!(graph_line.ends_with("\t4"), "{graph_line}");
}

#[test]
fn match_prints_nquads() {
    let dir = TempDir::new().unwrap();
    let people = write_file(dir.path(), "people.ttl", PEOPLE);
    let out = run(&[
        "match",
        "--load",
        people.to_str().unwrap(),
        "--prefix",
        "ex=http://example.org/",
        "ex:alice",
        "ex:knows",
        "_",
    ])
    .unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(
        "<http://example.org/alice> <http://example.org/knows> <http://example.org/bob> <file://"
    ));
    assert!(lines[0].ends_with(" ."));
    assert!(lines[1].contains("<http://example.org/carol>"));
}

#[test]
fn match_in_other_graph_is_empty() {
    let dir = TempDir::new().unwrap();
    let people = write_file(dir.path(), "people.ttl", PEOPLE);
    let out = run(&[
        "match",
        "--load",
        people.to_str().unwrap(),
        "_",
        "<http://example.org/knows>",
        "?o",
        "<http://example.org/elsewhere>",
    ])
    .unwrap();
    assert!(out.is_empty());
}

#[test]
fn each_lists_distinct_terms() {
    let dir = TempDir::new().unwrap();
    let people = write_file(dir.path(), "people.ttl", PEOPLE);
    let out = run(&[
        "each",
        "-l",
        people.to_str().unwrap(),
        "--prefix",
        "ex=http://example.org/",
        "ex:alice",
        "ex:knows",
        "_",
    ])
    .unwrap();
    assert_eq!(out, "ex:bob\nex:carol\n");
}

#[test]
fn each_rejects_two_wildcards() {
    let dir = TempDir::new().unwrap();
    let people = write_file(dir.path(), "people.ttl", PEOPLE);
    let err = run(&["each", "-l", people.to_str().unwrap(), "_", "_", "\"Alice\""]).unwrap_err();
    assert!(err.to_string().contains("unbound"), "{err}");
}

#[test]
fn query_prints_table_and_json() {
    let dir = TempDir::new().unwrap();
    let people = write_file(dir.path(), "people.ttl", PEOPLE);
    let text = "PREFIX ex: <http://example.org/> SELECT ?x ?y WHERE { ?x ex:knows ?y . ?y ex:knows ?x }";

    let table = run(&["query", "-l", people.to_str().unwrap(), text]).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "?x\t?y");
    assert_eq!(lines.len(), 3);

    let json = run(&["query", "-l", people.to_str().unwrap(), "--json", text]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["head"]["vars"], serde_json::json!(["x", "y"]));
    assert_eq!(value["results"]["bindings"].as_array().unwrap().len(), 2);
    assert_eq!(
        value["results"]["bindings"][0]["x"]["type"],
        serde_json::json!("uri")
    );
}

#[test]
fn malformed_query_is_an_error() {
    let err = run(&["query", "SELECT ?x WHERE { ?x <http://example.org/p> }"]).unwrap_err();
    assert!(err.to_string().contains("offset"), "{err}");
}

#[test]
fn diff_prints_sparql_update() {
    let dir = TempDir::new().unwrap();
    let before = write_file(
        dir.path(),
        "doc.ttl",
        "@prefix ex: <http://example.org/> .\nex:a ex:p 1 .\nex:a ex:q ex:b .\n",
    );
    let after = write_file(
        dir.path(),
        "next.ttl",
        "@prefix ex: <http://example.org/> .\nex:a ex:p 2 .\nex:a ex:q ex:b .\n",
    );
    let graph = file_iri(&before);
    let out = run(&[
        "diff",
        "-l",
        before.to_str().unwrap(),
        &graph,
        after.to_str().unwrap(),
    ])
    .unwrap();
    assert!(out.contains("DELETE DATA {"), "{out}");
    assert!(out.contains("INSERT DATA {"), "{out}");
    assert!(out.contains("\"1\"^^<http://www.w3.org/2001/XMLSchema#integer>"));
    assert!(out.contains("\"2\"^^<http://www.w3.org/2001/XMLSchema#integer>"));
    assert!(!out.contains("<http://example.org/q>"));
}

#[test]
fn diff_of_identical_graph_prints_nothing() {
    let dir = TempDir::new().unwrap();
    let doc = write_file(dir.path(), "doc.ttl", PEOPLE);
    let graph = file_iri(&doc);
    let out = run(&["diff", "-l", doc.to_str().unwrap(), &graph, doc.to_str().unwrap()]).unwrap();
    assert!(out.is_empty(), "{out}");
}

#[test]
fn offline_fetch_fails() {
    let err = run(&["fetch", "--offline", "http://example.org/doc.ttl"]).unwrap_err();
    assert!(err.to_string().contains("1 of 1 fetches failed"), "{err}");
}

#[test]
fn offline_patch_fails_without_network() {
    let dir = TempDir::new().unwrap();
    let doc = write_file(dir.path(), "doc.ttl", PEOPLE);
    let err = run(&[
        "patch",
        "--offline",
        "http://example.org/remote",
        doc.to_str().unwrap(),
    ])
    .unwrap_err();
    assert!(err.to_string().contains("offline"), "{err}");
}

#[test]
fn config_round_trips_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tetrad.json");
    let out = run(&["config", "--offline", "--save", path.to_str().unwrap()]).unwrap();
    assert!(out.starts_with("Wrote configuration"));
    let saved = Config::from_file(&path).unwrap();
    assert!(saved.offline);

    let printed = run(&["config", "-c", path.to_str().unwrap()]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&printed).unwrap();
    assert_eq!(value["offline"], serde_json::json!(true));
    assert_eq!(value["update_method"], serde_json::json!("PATCH"));
}

#[test]
fn binary_prints_help_without_arguments() {
    let out = Command::new(env!("CARGO_BIN_EXE_tetrad"))
        .output()
        .expect("run tetrad");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Usage"), "{stderr}");
}

#[test]
fn binary_runs_stats() {
    let dir = TempDir::new().unwrap();
    let people = write_file(dir.path(), "people.ttl", PEOPLE);
    let out = Command::new(env!("CARGO_BIN_EXE_tetrad"))
        .args(["stats", "--load", people.to_str().unwrap()])
        .output()
        .expect("run tetrad");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("4 quads"));
}
