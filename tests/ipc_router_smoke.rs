mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{send_line, spawn_sidecar, temp_dir};

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = test_support::request(stdin, reader, id, method, params);
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
    let workspace = temp_dir("mockexam-router-smoke");
    let bundle_out = workspace.path().join("smoke-backup.zip");
    let csv_dir = workspace.path().join("csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.path().join("ws").to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "3", "config.get", json!({}));
    let _ = request(&mut stdin, &mut reader, "4", "config.reload", json!({}));
    let _ = request(&mut stdin, &mut reader, "5", "catalog.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "answerKeys.save",
        json!({ "round": "1차", "subject": "국어", "answers": ["1", "2"] }),
    );
    let _ = request(&mut stdin, &mut reader, "7", "answerKeys.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "electives.select",
        json!({ "studentId": "s1", "round": "1차", "elective1": "화학", "elective2": "경제" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "electives.get",
        json!({ "studentId": "s1", "round": "1차" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "responses.submit",
        json!({ "studentId": "s1", "round": "1차", "subject": "국어", "answers": ["1", "3"] }),
    );
    let _ = request(&mut stdin, &mut reader, "11", "responses.get", json!({}));
    let _ = request(&mut stdin, &mut reader, "12", "answerLog.list", json!({}));
    let scope = json!({ "round": "1차", "subject": "국어", "studentId": "s1" });
    for (i, method) in [
        "grading.student",
        "grading.allStudents",
        "grading.questions",
        "grading.subjectReport",
        "stats.subjectAverage",
        "stats.roundTrend",
    ]
    .iter()
    .enumerate()
    {
        let _ = request(&mut stdin, &mut reader, &format!("13.{}", i), method, scope.clone());
    }
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "exchange.exportCsv",
        json!({ "dir": csv_dir.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "exchange.importCsv",
        json!({ "dir": csv_dir.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_methods_and_bad_lines_get_error_envelopes() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let unknown = test_support::request(&mut stdin, &mut reader, "1", "grades.teleport", json!({}));
    assert_eq!(unknown["ok"], json!(false));
    assert_eq!(unknown["error"]["code"], json!("not_implemented"));

    let garbage = send_line(&mut stdin, &mut reader, "{not json");
    assert_eq!(garbage["ok"], json!(false));
    assert_eq!(garbage["error"]["code"], json!("bad_json"));

    let no_ws = test_support::request(&mut stdin, &mut reader, "2", "answerKeys.get", json!({}));
    assert_eq!(no_ws["error"]["code"], json!("no_workspace"));

    drop(stdin);
    let _ = child.wait();
}
