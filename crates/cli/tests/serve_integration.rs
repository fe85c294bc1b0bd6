//! Integration tests for the `caseflow serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port with the
//! fixture config and seed, makes HTTP requests, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from the process id so separate test binaries
/// don't collide on the same range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Kills the server when a test finishes, pass or fail.
struct Server {
    child: Child,
    port: u16,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

fn start_server() -> Server {
    let port = next_port();
    let child = Command::new(env!("CARGO_BIN_EXE_caseflow"))
        .arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .arg("--config")
        .arg(fixture("config.toml"))
        .arg("--seed")
        .arg(fixture("seed.json"))
        .env("RUST_LOG", "warn")
        .env_remove("CASEFLOW_PORT")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start caseflow serve");

    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server { child, port }
}

/// Send one HTTP/1.1 request and return (status, parsed JSON body).
fn request(
    port: u16,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> (u16, serde_json::Value) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n",
        method, path, port
    );
    if let Some(token) = token {
        head.push_str(&format!("Authorization: Bearer {}\r\n", token));
    }
    let body = body.unwrap_or("");
    head.push_str(&format!(
        "Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    ));
    std::io::Write::write_all(&mut stream, head.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    let (status, body) = parse_http_response(&response);
    let json = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let body = if headers
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked")
    {
        decode_chunked(&body)
    } else {
        body
    };
    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = (chunk_start + size).min(remaining.len());
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }
    result
}

const CLERK: Option<&str> = Some("clerk-token");
const ADMIN: Option<&str> = Some("admin-token");

const CASE_1_ADVANCE: &str = r#"{"caseId":"case-1","currentStageId":"intake","newStageId":"discovery","newStageName":"Discovery","serviceId":"svc-lit"}"#;
const CASE_2_ADVANCE: &str = r#"{"caseId":"case-2","currentStageId":"consult","newStageId":"drafting","newStageName":"Drafting"}"#;

#[test]
fn health_returns_200() {
    let server = start_server();
    let (status, body) = request(server.port, "GET", "/health", None, None);
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[test]
fn anonymous_transition_is_unauthenticated() {
    let server = start_server();
    let (status, body) = request(
        server.port,
        "POST",
        "/transition",
        None,
        Some(CASE_1_ADVANCE),
    );
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "unauthenticated");

    let (status, _) = request(
        server.port,
        "POST",
        "/transition",
        Some("forged-token"),
        Some(CASE_1_ADVANCE),
    );
    assert_eq!(status, 401);
}

#[test]
fn transition_with_flag_off_freezes_nothing() {
    let server = start_server();
    let (status, body) = request(
        server.port,
        "POST",
        "/transition",
        CLERK,
        Some(CASE_1_ADVANCE),
    );
    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["from"], "intake");
    assert_eq!(body["to"], "discovery");
    assert_eq!(body["toName"], "Discovery");
    assert_eq!(body["frozenTasks"], 0);
    assert_eq!(body["featureEnabled"], false);

    // Same request again: intake is no longer active.
    let (status, body) = request(
        server.port,
        "POST",
        "/transition",
        CLERK,
        Some(CASE_1_ADVANCE),
    );
    assert_eq!(status, 412);
    assert_eq!(body["error"]["code"], "failed-precondition");
}

#[test]
fn enabling_flag_freezes_open_tasks_and_unfreeze_clears() {
    let server = start_server();
    let (status, body) = request(
        server.port,
        "PUT",
        "/flags/FROZEN_TASKS_ON_STAGE_CHANGE",
        ADMIN,
        Some(r#"{"value":true}"#),
    );
    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["value"], true);

    let (status, body) = request(
        server.port,
        "POST",
        "/transition",
        CLERK,
        Some(CASE_2_ADVANCE),
    );
    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["featureEnabled"], true);
    assert_eq!(body["frozenTasks"], 2);

    let (status, body) = request(
        server.port,
        "POST",
        "/unfreeze",
        CLERK,
        Some(r#"{"taskId":"c2-t1"}"#),
    );
    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["taskId"], "c2-t1");

    let (status, body) = request(
        server.port,
        "POST",
        "/unfreeze",
        CLERK,
        Some(r#"{"taskId":"nope"}"#),
    );
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not-found");

    let (status, body) = request(server.port, "GET", "/freezes", CLERK, None);
    assert_eq!(status, 200);
    assert_eq!(body["pending"], serde_json::json!([]));
}

#[test]
fn flag_endpoints_validate_input() {
    let server = start_server();

    let (status, body) = request(server.port, "GET", "/flags", ADMIN, None);
    assert_eq!(status, 200);
    assert_eq!(body["flags"]["FROZEN_TASKS_ON_STAGE_CHANGE"], false);
    assert_eq!(body["schemaVersion"], "1.0.0");

    let (status, body) = request(
        server.port,
        "PUT",
        "/flags/FROZEN_TASKS_ON_STAGE_CHANGE",
        ADMIN,
        Some(r#"{"value":"yes"}"#),
    );
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid-argument");

    let (status, _) = request(server.port, "GET", "/flags/NOT_A_FLAG", ADMIN, None);
    assert_eq!(status, 404);

    let (status, _) = request(server.port, "GET", "/flags", None, None);
    assert_eq!(status, 401);
}

#[test]
fn missing_fields_are_invalid_arguments() {
    let server = start_server();
    let (status, body) = request(
        server.port,
        "POST",
        "/transition",
        CLERK,
        Some(r#"{"caseId":"case-1","currentStageId":"intake"}"#),
    );
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid-argument");

    let (status, _) = request(server.port, "POST", "/transition", CLERK, Some("{oops"));
    assert_eq!(status, 400);
}

#[test]
fn registry_lists_flags_as_json() {
    let output = Command::new(env!("CARGO_BIN_EXE_caseflow"))
        .args(["registry", "--output", "json"])
        .output()
        .expect("failed to run caseflow registry");
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("registry output is JSON");
    let flags = json["flags"].as_array().expect("flags array");
    assert!(flags
        .iter()
        .any(|f| f["key"] == "FROZEN_TASKS_ON_STAGE_CHANGE" && f["defaultValue"] == false));
}
