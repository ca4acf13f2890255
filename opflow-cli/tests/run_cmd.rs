use std::io::{Read, Write};
use std::net::TcpListener;

use assert_cmd::Command;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("tempfile");
    f.write_all(contents.as_bytes()).expect("write");
    f
}

fn opflow() -> Command {
    Command::cargo_bin("opflow").unwrap()
}

/// Answers `requests` connections with the same JSON body, then stops.
fn serve_json(status: &'static str, body: &'static str, requests: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    std::thread::spawn(move || {
        for stream in listener.incoming().take(requests) {
            let Ok(mut stream) = stream else { continue };
            let mut buf = [0u8; 8192];
            let mut seen = Vec::new();
            while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => seen.extend_from_slice(&buf[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{addr}")
}

#[test]
fn run_command_succeeds_and_prints_events() {
    let base = serve_json("200 OK", r#"{"ok":true}"#, 2);
    let manifest = format!(
        r#"
max_concurrent: 1
operations:
  - id: first
    url: {base}/a
    preset: background
    policy: {{ start_delay_ms: 0 }}
  - id: second
    url: {base}/b
    preset: background
    policy: {{ start_delay_ms: 0 }}
"#
    );
    let f = write_temp(&manifest);

    let out = opflow()
        .args(["run", "--format", "json", f.path().to_string_lossy().as_ref()])
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    let successes: Vec<&serde_json::Value> = lines.iter().filter(|l| l["event"] == "success").collect();
    assert_eq!(successes.len(), 2);
    assert_eq!(successes[0]["status"], 200);
    assert_eq!(successes[0]["body"]["ok"], true);

    let summary = lines.last().expect("summary");
    assert_eq!(summary["succeeded"], 2);
    assert_eq!(summary["total"], 2);
}

#[test]
fn run_command_returns_3_when_an_operation_is_fatal() {
    let manifest = r#"
operations:
  - id: unreachable
    url: http://127.0.0.1:1/
    policy: { max_retry_attempts: 0, start_delay_ms: 0, timeout_ms: 2000 }
"#;
    let f = write_temp(manifest);

    let out = opflow()
        .args(["run", f.path().to_string_lossy().as_ref()])
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(3)); // RUN_FAILED
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[unreachable] fatal"), "{stdout}");
    assert!(stdout.contains("0 succeeded, 0 failed, 1 fatal, 0 aborted"), "{stdout}");
}

#[test]
fn run_command_returns_3_on_client_error() {
    let base = serve_json("404 Not Found", r#"{"error":"missing"}"#, 1);
    let manifest = format!(
        "operations:\n  - id: gone\n    url: {base}/missing\n    preset: background\n    policy: {{ start_delay_ms: 0 }}\n"
    );
    let f = write_temp(&manifest);

    let out = opflow()
        .args(["run", f.path().to_string_lossy().as_ref()])
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(r#"[gone] failure 404 {"error":"missing"}"#), "{stdout}");
}

#[test]
fn run_command_rejects_invalid_manifest_before_sending() {
    let manifest = "operations:\n  - id: x\n    url: not-a-url\n";
    let f = write_temp(manifest);

    opflow()
        .args(["run", f.path().to_string_lossy().as_ref()])
        .assert()
        .code(2);
}

#[test]
fn zero_max_concurrent_flag_is_a_usage_error() {
    let f = write_temp("operations: []\n");

    let output = opflow()
        .args(["run", "--max-concurrent", "0", f.path().to_string_lossy().as_ref()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--max-concurrent"), "{stderr}");
}

#[test]
fn empty_manifest_runs_to_completion() {
    let f = write_temp("operations: []\n");
    opflow()
        .args(["run", "--quiet", f.path().to_string_lossy().as_ref()])
        .assert()
        .success();
}
