use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rubricd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rubricd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn result_str(value: &serde_json::Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {pointer}: {value}"))
        .to_string()
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rubricd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "rubrics.create",
        json!({ "type": "analytic" }),
    );
    let rubric_id = result_str(&created, "/result/rubric/id");

    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "rubrics.updateMeta",
        json!({ "rubricId": rubric_id, "field": "title", "value": "Smoke Rubric" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "rubrics.addCriterion",
        json!({ "rubricId": rubric_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "rubrics.totalPoints",
        json!({ "rubricId": rubric_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "rubrics.template.export",
        json!({ "rubricId": rubric_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "rubrics.save",
        json!({ "rubricId": rubric_id }),
    );
    let _ = request(&mut stdin, &mut reader, "9", "rubrics.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "rubrics.get",
        json!({ "rubricId": rubric_id }),
    );

    let started = request(
        &mut stdin,
        &mut reader,
        "11",
        "evaluations.start",
        json!({ "rubricId": rubric_id, "studentAttemptId": "attempt-1" }),
    );
    let session_id = result_str(&started, "/result/sessionId");
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "evaluations.score",
        json!({ "sessionId": session_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "evaluations.discard",
        json!({ "sessionId": session_id }),
    );

    let unknown = request(
        &mut stdin,
        &mut reader,
        "14",
        "rubrics.nonsense",
        json!({}),
    );
    assert_eq!(unknown.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        unknown.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn persistence_methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let created = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.create",
        json!({ "type": "holistic" }),
    );
    let rubric_id = result_str(&created, "/result/rubric/id");

    let saved = request(
        &mut stdin,
        &mut reader,
        "2",
        "rubrics.save",
        json!({ "rubricId": rubric_id }),
    );
    assert_eq!(saved.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        saved.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_workspace")
    );

    drop(stdin);
    let _ = child.wait();
}
