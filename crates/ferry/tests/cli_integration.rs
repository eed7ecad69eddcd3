//! CLI integration tests for the ferry command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Argument parsing works as expected
//! - Server registry edits persist to the config directory
//!
//! Note: These tests never contact an authorization server. Every run uses
//! its own temporary config directory.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the ferry binary.
fn ferry() -> Command {
    Command::cargo_bin("ferry").unwrap()
}

/// Get a command bound to an isolated config directory.
fn ferry_in(dir: &TempDir) -> Command {
    let mut cmd = ferry();
    cmd.env("FERRY_CONFIG_DIR", dir.path());
    cmd
}

fn add_server(dir: &TempDir, name: &str) {
    ferry_in(dir)
        .args([
            "servers",
            "add",
            name,
            "--url",
            "https://api.example.com/mcp",
            "--authorization-endpoint",
            "https://example.com/oauth/authorize",
            "--token-endpoint",
            "https://example.com/oauth/token",
            "--client-id",
            "abc",
            "--scope",
            "read",
        ])
        .assert()
        .success();
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    ferry()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("OAuth token bridge"));
}

#[test]
fn test_version_displays() {
    ferry()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ferry"));
}

#[test]
fn test_help_lists_subcommands() {
    ferry()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("auth"))
        .stdout(predicate::str::contains("servers"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("serve"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Global Flag Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flag_accepted() {
    ferry().args(["--verbose", "--help"]).assert().success();
}

#[test]
fn test_config_dir_flag_accepted() {
    ferry()
        .args(["--config-dir", "/tmp/ferry-test", "--help"])
        .assert()
        .success();
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommand Help Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_auth_help() {
    ferry()
        .args(["auth", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("refresh"))
        .stdout(predicate::str::contains("logout"));
}

#[test]
fn test_auth_login_help() {
    ferry()
        .args(["auth", "login", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--manual"))
        .stdout(predicate::str::contains("--timeout-secs"));
}

#[test]
fn test_servers_help() {
    ferry()
        .args(["servers", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("remove"));
}

#[test]
fn test_serve_help() {
    ferry()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--bind"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Invalid Input Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_subcommand_fails() {
    ferry()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_login_requires_server() {
    ferry()
        .args(["auth", "login"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("<SERVER>"));
}

#[test]
fn test_call_rejects_invalid_json() {
    let dir = TempDir::new().unwrap();
    add_server(&dir, "svc");

    ferry_in(&dir)
        .args(["call", "svc", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_call_unknown_server_fails() {
    let dir = TempDir::new().unwrap();

    ferry_in(&dir)
        .args(["call", "missing", "{}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("server 'missing' not found"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Registry Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_servers_list_empty() {
    let dir = TempDir::new().unwrap();

    ferry_in(&dir)
        .args(["servers", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No servers configured"));
}

#[test]
fn test_servers_add_list_remove() {
    let dir = TempDir::new().unwrap();
    add_server(&dir, "github");

    let config = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(config.contains("[servers.github.oauth]"));

    ferry_in(&dir)
        .args(["servers", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("github"))
        .stdout(predicate::str::contains("https://api.example.com/mcp"));

    ferry_in(&dir)
        .args(["servers", "remove", "github"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed server 'github'"));

    ferry_in(&dir)
        .args(["servers", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No servers configured"));
}

#[test]
fn test_servers_remove_deletes_stored_token() {
    let dir = TempDir::new().unwrap();
    add_server(&dir, "github");

    let tokens = dir.path().join("tokens");
    std::fs::create_dir_all(&tokens).unwrap();
    let token_file = tokens.join("github.json");
    std::fs::write(&token_file, r#"{"access_token":"t","token_type":"Bearer"}"#).unwrap();

    ferry_in(&dir)
        .args(["servers", "remove", "github"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Its stored token was deleted"));

    assert!(!token_file.exists());
}

#[test]
fn test_servers_add_rejects_url_without_scheme() {
    let dir = TempDir::new().unwrap();

    ferry_in(&dir)
        .args([
            "servers",
            "add",
            "svc",
            "--url",
            "api.example.com/mcp",
            "--authorization-endpoint",
            "https://example.com/oauth/authorize",
            "--token-endpoint",
            "https://example.com/oauth/token",
            "--client-id",
            "abc",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid server 'svc'"));
}

#[test]
fn test_servers_add_duplicate_requires_replace() {
    let dir = TempDir::new().unwrap();
    add_server(&dir, "github");

    ferry_in(&dir)
        .args([
            "servers",
            "add",
            "github",
            "--url",
            "https://other.example.com",
            "--authorization-endpoint",
            "https://example.com/oauth/authorize",
            "--token-endpoint",
            "https://example.com/oauth/token",
            "--client-id",
            "abc",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_auth_status_without_token() {
    let dir = TempDir::new().unwrap();
    add_server(&dir, "github");

    ferry_in(&dir)
        .args(["auth", "status", "github"])
        .assert()
        .success()
        .stdout(predicate::str::contains("github: not authenticated"));

    ferry_in(&dir)
        .args(["--json", "auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"authenticated\": false"));
}

#[test]
fn test_auth_refresh_without_token_fails_with_hint() {
    let dir = TempDir::new().unwrap();
    add_server(&dir, "github");

    ferry_in(&dir)
        .args(["auth", "refresh", "github"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ferry auth login github"));
}
