use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// One bill against services that refuse every connection. The single
/// question retry keeps the run alive for about a second and a half.
fn unreachable_services_config(port: u16, output_dir: &Path) -> String {
    format!(
        r#"
[controller]
bills = ["H.R.1"]
poll_interval_ms = 50
report_interval_ms = 500
run_timeout_secs = 30

[legislative]
api_base = "http://127.0.0.1:1"
api_key = "test-key"
timeout_secs = 2

[model]
api_base = "http://127.0.0.1:1"
timeout_secs = 2

[workers.question]
max_attempts = 2
backoff_base_ms = 1500
backoff_max_ms = 1500

[workers.link_check]
backoff_base_ms = 10
backoff_max_ms = 50

[workers.draft]
backoff_base_ms = 10
backoff_max_ms = 50

[output]
dir = "{}"

[server]
host = "127.0.0.1"
port = {}
"#,
        output_dir.display(),
        port
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the binary and return a handle
fn spawn_billwire(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_billwire"))
        .env("BILLWIRE_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn billwire")
}

/// Wait for the status API to answer
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_run_with_unreachable_services_fails_bill_and_writes_summary() {
    let port = get_available_port();
    let output_dir = TempDir::new().unwrap();
    let config = write_config(&unreachable_services_config(port, output_dir.path()));

    let mut child = spawn_billwire(config.path());

    assert!(
        wait_for_server(port, 40).await,
        "Status API did not start in time"
    );

    let json: serde_json::Value = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    let status = timeout(Duration::from_secs(30), child.wait())
        .await
        .expect("Run did not finish in time")
        .expect("Failed to wait for process");
    assert!(status.success());

    let summary_path = output_dir.path().join("summary.json");
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["bills_processed"], 0);
    assert_eq!(summary["total_bills"], 1);
    assert_eq!(summary["failed_bills"], serde_json::json!(["H.R.1"]));
    assert_eq!(summary["timed_out"], false);
}

#[tokio::test]
async fn test_config_endpoint_redacts_api_key() {
    let port = get_available_port();
    let output_dir = TempDir::new().unwrap();
    let config = write_config(&unreachable_services_config(port, output_dir.path()));

    let mut child = spawn_billwire(config.path());

    assert!(
        wait_for_server(port, 40).await,
        "Status API did not start in time"
    );

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/config", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let body = response.text().await.unwrap();
    assert!(!body.contains("test-key"));
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["legislative_api_key_configured"], true);
    assert_eq!(json["controller"]["bills"], serde_json::json!(["H.R.1"]));

    child.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_billwire"))
            .env("BILLWIRE_CONFIG", "/nonexistent/billwire.toml")
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_invalid_config_exits_with_error() {
    let config = write_config(
        r#"
[controller]
bills = []
"#,
    );

    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_billwire"))
            .env("BILLWIRE_CONFIG", config.path())
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("controller.bills"));
}
