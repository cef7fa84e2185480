mod test_support;

use serde_json::json;
use std::fs::File;
use std::io::Read;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn bundle_export_and_import_roundtrip() {
    let scratch = temp_dir("mockexam-backup");
    let src = scratch.path().join("src");
    let dst = scratch.path().join("dst");
    let bundle = scratch.path().join("out").join("exam-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": src.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "answerKeys.save",
        json!({ "round": "4차", "subject": "한국사", "answers": ["1", "2", "3"] }),
    );
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(exported["bundleFormat"], json!("mockexam-workspace-v1"));
    assert_eq!(exported["entryCount"], json!(2));

    let f = File::open(&bundle).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(manifest["dbSha256"], exported["dbSha256"]);
    archive
        .by_name("db/exam.sqlite3")
        .expect("database entry in bundle");

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy(), "workspacePath": dst.to_string_lossy() }),
    );
    assert_eq!(imported["bundleFormatDetected"], json!("mockexam-workspace-v1"));

    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert_eq!(health["workspacePath"], json!(dst.to_string_lossy()));
    let keys = request_ok(&mut stdin, &mut reader, "6", "answerKeys.get", json!({}));
    assert_eq!(keys["answerKeys"].as_array().map(|a| a.len()), Some(3));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn ephemeral_sessions_cannot_export_bundles() {
    let scratch = temp_dir("mockexam-backup-ephemeral");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(&mut stdin, &mut reader, "1", "workspace.select", json!({ "ephemeral": true }));
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": scratch.path().join("x.zip").to_string_lossy() }),
    );
    assert_eq!(code, "no_workspace");

    let junk = scratch.path().join("junk.bin");
    std::fs::write(&junk, b"definitely not a backup").expect("write junk");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "backup.importWorkspaceBundle",
        json!({ "inPath": junk.to_string_lossy(), "workspacePath": scratch.path().join("ws").to_string_lossy() }),
    );
    assert_eq!(code, "io_error");

    drop(stdin);
    let _ = child.wait();
}
