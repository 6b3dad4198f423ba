//! Command-line behaviour of the `huebridge` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn huebridge() -> Command {
    let mut cmd = Command::cargo_bin("huebridge").unwrap_or_else(|_| unreachable!());
    cmd.env_remove("OPENAI_API_KEY")
        .env_remove("HUEBRIDGE_API_KEY")
        .env_remove("HUEBRIDGE_REDIS_URL")
        .env_remove("HUEBRIDGE_CATALOG");
    cmd
}

fn catalog() -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap_or_else(|_| unreachable!());
    std::fs::write(
        file.path(),
        r##"{"products": [
          {"id": "p1", "name": "Azul Sereno", "color": "azul", "hex": "#4a7ab5", "roomTypes": ["sala"]},
          {"id": "p2", "name": "Verde Folha", "color": "verde", "hex": "#3f8f4f", "roomTypes": ["cozinha"]}
        ]}"##,
    )
    .unwrap_or_else(|_| unreachable!());
    file
}

#[test]
fn test_help_lists_commands() {
    huebridge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("worker"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("init-prompts"));
}

#[test]
fn test_route_rules_only() {
    huebridge()
        .args(["route", "tinta cor:azul para a sala", "--rules-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Router: rules"))
        .stdout(predicate::str::contains("filter_search"));
}

#[test]
fn test_route_without_intent() {
    huebridge()
        .args(["route", "bom dia", "--rules-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No action applies."));
}

#[test]
fn test_ask_in_process_json() {
    let catalog = catalog();
    let output = huebridge()
        .args(["--format", "json", "--catalog"])
        .arg(catalog.path())
        .args(["ask", "quero tinta cor:azul", "--in-process", "--rules-only"])
        .output()
        .unwrap_or_else(|_| unreachable!());
    assert!(output.status.success());

    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap_or_default();
    assert_eq!(outcome["needsClarification"], false);
    assert_eq!(outcome["recommendation"]["picks"][0]["id"], "p1");
}

#[test]
fn test_ask_through_worker() {
    let catalog = catalog();
    huebridge()
        .arg("--catalog")
        .arg(catalog.path())
        .env("HUEBRIDGE_WORKER_CMD", env!("CARGO_BIN_EXE_huebridge"))
        .args(["ask", "quero tinta cor:verde", "--rules-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Verde Folha"));
}

#[test]
fn test_blank_worker_command_uses_own_binary() {
    let catalog = catalog();
    huebridge()
        .arg("--catalog")
        .arg(catalog.path())
        .env("HUEBRIDGE_WORKER_CMD", "  ")
        .args(["ask", "quero tinta cor:verde", "--rules-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Verde Folha"));
}

#[test]
fn test_ask_needs_clarification() {
    huebridge()
        .args(["ask", "bom dia", "--in-process", "--rules-only"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Could you tell me more?"));
}

#[test]
fn test_tools_in_process() {
    huebridge()
        .args(["tools", "--in-process"])
        .assert()
        .success()
        .stdout(predicate::str::contains("semantic_search"))
        .stdout(predicate::str::contains("generate_image"));
}

#[test]
fn test_chat_session() {
    let catalog = catalog();
    huebridge()
        .arg("--catalog")
        .arg(catalog.path())
        .args(["chat", "--in-process", "--rules-only"])
        .write_stdin("quero tinta cor:azul\n/reset\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Azul Sereno"))
        .stdout(predicate::str::contains("Session reset."));
}

#[test]
fn test_missing_catalog_fails() {
    huebridge()
        .args(["--catalog", "/nonexistent/catalog.json", "tools", "--in-process"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load catalog"));
}

#[test]
fn test_init_prompts_json() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    huebridge()
        .args(["--format", "json", "init-prompts", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 1"));
    assert!(dir.path().join("router.md").exists());
}
