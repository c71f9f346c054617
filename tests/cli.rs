//! Binary-level tests for commands that need no remote service.

use assert_cmd::Command;
use predicates::prelude::*;

const SERVICE_VARS: &[&str] = &[
    "ICD_TRIAGE_PROVIDER",
    "AZURE_TENANT_ID",
    "AZURE_CLIENT_ID",
    "AZURE_CLIENT_SECRET",
    "AZURE_AI_PROJECT_ENDPOINT",
    "AZURE_AI_API_VERSION",
    "AZURE_AI_AGENT_AGENT",
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "ICD_TRIAGE_PROMPT_FILE",
    "RUST_LOG",
];

/// The binary with service settings scrubbed and an empty home.
fn icd_triage(home: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("icd-triage").unwrap_or_else(|_| unreachable!());
    for var in SERVICE_VARS {
        cmd.env_remove(var);
    }
    cmd.env("HOME", home.path());
    cmd
}

fn home() -> tempfile::TempDir {
    tempfile::tempdir().unwrap_or_else(|_| unreachable!())
}

#[test]
fn test_help_lists_commands() {
    let home = home();
    icd_triage(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("agents"))
        .stdout(predicate::str::contains("sources"));
}

#[test]
fn test_sources_text() {
    let home = home();
    icd_triage(&home)
        .arg("sources")
        .assert()
        .success()
        .stdout(predicate::str::contains("who-2019-en"))
        .stdout(predicate::str::contains("who-2025-fr"));
}

#[test]
fn test_sources_json() {
    let home = home();
    let output = icd_triage(&home)
        .args(["--format", "json", "sources"])
        .output()
        .unwrap_or_else(|_| unreachable!());
    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).unwrap_or_else(|_| unreachable!());
    assert_eq!(value.as_array().map(Vec::len), Some(4));
}

#[test]
fn test_prompt_wraps_note() {
    let home = home();
    icd_triage(&home)
        .args(["prompt", "--icd-source", "who-2019-fr", "Toux depuis trois semaines."])
        .assert()
        .success()
        .stdout(predicate::str::contains("(language: fr)"))
        .stdout(predicate::str::contains(
            "<note>\nToux depuis trois semaines.\n</note>",
        ));
}

#[test]
fn test_prompt_uses_template_file() {
    let home = home();
    let path = home.path().join("custom.md");
    std::fs::write(&path, "Only use {icd_website}.").unwrap_or_else(|_| unreachable!());

    icd_triage(&home)
        .args(["prompt", "--prompt-file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "Only use https://icd.who.int/browse10/2019/en.",
        ));
}

#[test]
fn test_analyze_without_credentials_names_variable() {
    let home = home();
    icd_triage(&home)
        .args(["analyze", "Chest pain.", "--agent", "asst_1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AZURE_AI_PROJECT_ENDPOINT"));
}

#[test]
fn test_analyze_openai_without_key_names_variable() {
    let home = home();
    icd_triage(&home)
        .args(["--provider", "openai", "analyze", "Chest pain."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn test_analyze_unknown_provider() {
    let home = home();
    icd_triage(&home)
        .args(["--provider", "bedrock", "analyze", "Chest pain."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported provider"));
}

#[test]
fn test_analyze_rejects_unknown_target() {
    let home = home();
    icd_triage(&home)
        .args(["analyze", "Chest pain.", "--target", "paper"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid argument"));
}

#[test]
fn test_analyze_reads_note_from_stdin() {
    let home = home();
    icd_triage(&home)
        .args(["analyze", "--agent", "asst_1"])
        .write_stdin("Chest pain radiating to the left arm.")
        .assert()
        .failure()
        .stderr(predicate::str::contains("AZURE_AI_PROJECT_ENDPOINT"));
}
