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
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
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

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("campus-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let session = request(
        &mut stdin,
        &mut reader,
        "3",
        "sessions.create",
        json!({ "name": "Smoke 2081", "startsOn": "2024-04-14", "endsOn": "2025-04-13" }),
    );
    let session_id = session
        .pointer("/result/sessionId")
        .and_then(|v| v.as_i64())
        .expect("sessionId");
    let _ = request(&mut stdin, &mut reader, "4", "sessions.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "faculties.create",
        json!({ "name": "Smoke Faculty" }),
    );
    let _ = request(&mut stdin, &mut reader, "6", "faculties.list", json!({}));

    let created = request(
        &mut stdin,
        &mut reader,
        "7",
        "grades.create",
        json!({
            "academicSessionId": session_id,
            "name": "Smoke Grade",
            "sections": {
                "hasFaculties": false,
                "sectionType": "standard",
                "sections": [{ "id": 0, "name": "A", "isNew": true }],
                "facultySections": []
            }
        }),
    );
    let grade_id = created
        .pointer("/result/gradeId")
        .and_then(|v| v.as_i64())
        .expect("gradeId");

    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "grades.list",
        json!({ "academicSessionId": session_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "grades.get",
        json!({ "gradeId": grade_id }),
    );

    let opened = request(
        &mut stdin,
        &mut reader,
        "10",
        "gradeDraft.open",
        json!({ "gradeId": grade_id }),
    );
    let draft_id = opened
        .pointer("/result/draftId")
        .and_then(|v| v.as_str())
        .expect("draftId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "gradeDraft.toggleSection",
        json!({ "draftId": draft_id, "name": "B", "checked": true }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "gradeDraft.view",
        json!({ "draftId": draft_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "gradeDraft.discard",
        json!({ "draftId": draft_id }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "grades.delete",
        json!({ "gradeId": grade_id }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
