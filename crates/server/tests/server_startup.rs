//! Binary-level tests: daemon startup and CLI exit codes.

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

/// A config whose qBittorrent endpoint is unreachable; the daemon still
/// starts and serves the API.
fn minimal_config(port: u16, data_dir: &Path) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {port}

[database]
path = "{db}"

[engine]
backend = "qbittorrent"
call_timeout_secs = 2

[engine.qbittorrent]
url = "http://127.0.0.1:9"
username = "admin"
password = "secret"
timeout_secs = 2

[backup]
dir = "{backups}"
on_shutdown = false
restore_on_start = false
"#,
        port = port,
        db = data_dir.join("stats.db").display(),
        backups = data_dir.join("backups").display(),
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

fn tamer() -> tokio::process::Command {
    let mut command = tokio::process::Command::new(env!("CARGO_BIN_EXE_tamer"));
    command
        .env("RUST_LOG", "error")
        .env_remove("TAMER_URL")
        .env_remove("TAMER_CONFIG")
        .kill_on_drop(true);
    command
}

/// Spawn the daemon with `serve --config`
fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tamer()
        .arg("serve")
        .arg("--config")
        .arg(config_path)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
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

async fn run_to_completion(command: &mut tokio::process::Command) -> std::process::Output {
    timeout(Duration::from_secs(10), command.output())
        .await
        .expect("Command timed out")
        .expect("Failed to execute command")
}

#[tokio::test]
async fn test_health_endpoint() {
    let data_dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&minimal_config(port, data_dir.path()));

    let mut server = spawn_server(config.path());
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    server.kill().await.ok();
}

#[tokio::test]
async fn test_config_endpoint_redacts_password() {
    let data_dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&minimal_config(port, data_dir.path()));

    let mut server = tamer()
        .arg("serve")
        .env("TAMER_CONFIG", config.path())
        .spawn()
        .expect("Failed to spawn server");
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/config", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["server"]["port"], port);
    assert_eq!(json["engine"]["backend"], "qbittorrent");
    assert_eq!(json["engine"]["qbittorrent"]["password_configured"], true);
    assert!(!json.to_string().contains("secret"));

    server.kill().await.ok();
}

#[tokio::test]
async fn test_cli_talks_to_daemon() {
    let data_dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&minimal_config(port, data_dir.path()));

    let mut server = spawn_server(config.path());
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );
    let url = format!("http://127.0.0.1:{}", port);

    let output = run_to_completion(tamer().args(["--url", &url, "list"])).await;
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "No torrents.\n");

    let output = run_to_completion(tamer().args(["--url", &url, "pause", "42"])).await;
    assert_eq!(output.status.code(), Some(1), "unknown id is a not-found error");

    let output = run_to_completion(tamer().args(["--url", &url, "priority", "42", "9"])).await;
    assert_eq!(output.status.code(), Some(1));

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let output = run_to_completion(
        tamer()
            .arg("serve")
            .arg("--config")
            .arg("/nonexistent/config.toml"),
    )
    .await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_invalid_config_exits_with_error() {
    // qbittorrent is the default backend and needs its section.
    let config = write_config("[server]\nport = 7399\n");
    let output = run_to_completion(tamer().arg("serve").arg("--config").arg(config.path())).await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_unreachable_daemon_exits_2() {
    let port = get_available_port();
    let url = format!("http://127.0.0.1:{}", port);

    let output = run_to_completion(tamer().args(["--url", &url, "--timeout", "2", "stats"])).await;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unreachable"));
}

#[tokio::test]
async fn test_argument_errors_exit_1() {
    let output = run_to_completion(tamer().args(["pause", "not-a-number"])).await;
    assert_eq!(output.status.code(), Some(1));

    let output = run_to_completion(tamer().args(["add", "x", "--priority", "8"])).await;
    assert_eq!(output.status.code(), Some(1));

    let output = run_to_completion(tamer().arg("--help")).await;
    assert_eq!(output.status.code(), Some(0));
}
