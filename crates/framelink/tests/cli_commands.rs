#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn framelink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_framelink"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("framelink should run")
}

fn json_stdout(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be json")
}

fn message_names(report: &serde_json::Value) -> Vec<String> {
    report["messages"]
        .as_array()
        .expect("messages array")
        .iter()
        .map(|message| message["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn simulate_completes_handshake_and_syncs_location() {
    let output = framelink(&["simulate", "--path", "/legacy/foo/bar", "--token", "secret"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report = json_stdout(&output);
    assert_eq!(report["state"], "connected");
    assert_eq!(
        message_names(&report),
        ["peer.connect", "host.connect", "peer.connected", "host.authnavigate"]
    );

    let authnavigate = &report["messages"][3]["payload"];
    assert_eq!(authnavigate["navigation"]["path"], "foo/bar");
    assert_eq!(authnavigate["token"], "<redacted>");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("secret"));
}

#[test]
fn simulate_applies_guest_navigation_and_title() {
    let output = framelink(&[
        "simulate",
        "--navigate",
        "orders/42",
        "--title",
        "Order 42",
    ]);

    assert!(output.status.success());
    let report = json_stdout(&output);
    assert_eq!(report["host_path"], "/legacy/orders/42");
    assert_eq!(report["title"], "Order 42");
}

#[test]
fn simulate_login_lands_on_dashboard() {
    let output = framelink(&["simulate", "--login", "fresh"]);

    assert!(output.status.success());
    let report = json_stdout(&output);
    assert_eq!(report["host_path"], "/dashboard");
    assert!(message_names(&report).contains(&"peer.logged-in".to_string()));
}

#[test]
fn simulate_sign_out_deauthenticates_guest() {
    let output = framelink(&["simulate", "--token", "secret", "--sign-out"]);

    assert!(output.status.success());
    let report = json_stdout(&output);
    assert_eq!(
        message_names(&report).last().map(String::as_str),
        Some("host.deauthenticated")
    );
}

#[test]
fn simulate_silent_guest_times_out_with_124() {
    let output = framelink(&["simulate", "--silent-guest", "--timeout", "1s"]);

    assert_eq!(output.status.code(), Some(124));
    let report = json_stdout(&output);
    assert!(report["state"]
        .as_str()
        .unwrap_or_default()
        .starts_with("error:"));
    assert!(report["elapsed_ms"].as_u64().unwrap_or_default() >= 1000);
    assert_eq!(message_names(&report), Vec::<String>::new());
    assert!(String::from_utf8_lossy(&output.stderr).contains("handshake timed out"));
}

#[test]
fn simulate_rejects_bad_timeout() {
    let output = framelink(&["simulate", "--timeout", "0s"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn catalog_lists_every_message() {
    let output = framelink(&["catalog"]);

    assert!(output.status.success());
    let rows = json_stdout(&output);
    let rows = rows.as_array().expect("catalog should be an array");
    assert_eq!(rows.len(), 12);
    let connect = rows
        .iter()
        .find(|row| row["name"] == "peer.connect")
        .expect("peer.connect listed");
    assert_eq!(connect["direction"], "guest-to-host");
    assert_eq!(connect["schema"], true);
}

#[test]
fn catalog_filters_by_direction() {
    let output = framelink(&["catalog", "--direction", "host-to-guest"]);

    assert!(output.status.success());
    let rows = json_stdout(&output);
    let rows = rows.as_array().expect("catalog should be an array");
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|row| row["direction"] == "host-to-guest"));
}

#[test]
fn validate_accepts_and_rejects_payloads() {
    let ok = framelink(&["validate", "peer.navigated", "--json", r#"{"path":"foo","params":{}}"#]);
    assert!(ok.status.success());
    assert_eq!(json_stdout(&ok)["valid"], true);

    let bad = framelink(&["validate", "peer.set-title", "--json", r#"{"title":7}"#]);
    assert_eq!(bad.status.code(), Some(60));
}

#[test]
fn validate_uses_schema_directory_overrides() {
    let dir = std::env::temp_dir().join(format!("framelink-schemas-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    std::fs::write(
        dir.join("peer.set-title.schema.json"),
        r#"{"type":"object","properties":{"title":{"type":"string","maxLength":3}},"required":["title"]}"#,
    )
    .expect("schema should be writable");

    let dir_arg = dir.to_string_lossy().into_owned();
    let output = framelink(&[
        "validate",
        "peer.set-title",
        "--json",
        r#"{"title":"too long"}"#,
        "--schemas",
        &dir_arg,
    ]);

    assert_eq!(output.status.code(), Some(60));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_reports_package_version() {
    let output = framelink(&["version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("framelink {}", env!("CARGO_PKG_VERSION"))
    );
}
