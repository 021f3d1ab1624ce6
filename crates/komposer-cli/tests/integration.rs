//! Integration tests for komposer-cli.
//!
//! Tests cover CLI binary invocation and JSON-envelope shape; operations
//! that would actually shell out to ffmpeg are exercised only up to their
//! validation boundary, since no ffmpeg toolchain is assumed to be present
//! wherever these tests run.

use std::process::Command;
use tempfile::TempDir;

struct Sandbox {
    _source_dir: TempDir,
    _temp_dir: TempDir,
    source_path: std::path::PathBuf,
    temp_path: std::path::PathBuf,
}

fn sandbox() -> Sandbox {
    let source_dir = TempDir::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    Sandbox {
        source_path: source_dir.path().to_path_buf(),
        temp_path: temp_dir.path().to_path_buf(),
        _source_dir: source_dir,
        _temp_dir: temp_dir,
    }
}

fn komposer_bin(sandbox: &Sandbox) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_komposer"));
    cmd.env("SOURCE_ROOTS", &sandbox.source_path);
    cmd.env("TEMP_ROOT", &sandbox.temp_path);
    cmd.env("METADATA_ROOT", sandbox.temp_path.join("metadata"));
    cmd.env("SCREENSHOTS_ROOT", sandbox.temp_path.join("screenshots"));
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout)
        .unwrap_or_else(|e| panic!("stdout was not JSON: {e}\nstdout: {:?}", String::from_utf8_lossy(&output.stdout)))
}

#[test]
fn cli_help_works() {
    let sandbox = sandbox();
    let output = komposer_bin(&sandbox)
        .arg("--help")
        .output()
        .expect("failed to run komposer --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("komposer"));
}

#[test]
fn cli_list_files_empty_source_root() {
    let sandbox = sandbox();
    let output = komposer_bin(&sandbox)
        .arg("list-files")
        .output()
        .expect("failed to run komposer list-files");
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["success"], serde_json::json!(true));
    assert_eq!(body["files"].as_array().unwrap().len(), 0);
}

#[test]
fn cli_list_files_reports_registered_source() {
    let sandbox = sandbox();
    std::fs::write(sandbox.source_path.join("clip.mp4"), b"fake media bytes").unwrap();

    let output = komposer_bin(&sandbox)
        .arg("list-files")
        .output()
        .expect("failed to run komposer list-files");
    assert!(output.status.success());
    let body = stdout_json(&output);
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], serde_json::json!("clip.mp4"));
    assert!(files[0]["id"].as_str().unwrap().starts_with("file_"));
}

#[test]
fn cli_available_operations_lists_catalog() {
    let sandbox = sandbox();
    let output = komposer_bin(&sandbox)
        .arg("available-operations")
        .output()
        .expect("failed to run komposer available-operations");
    assert!(output.status.success());
    let body = stdout_json(&output);
    let operations = body["operations"].as_array().unwrap();
    assert!(operations.iter().any(|op| op["name"] == serde_json::json!("trim")));
    assert!(operations.iter().any(|op| op["name"] == serde_json::json!("crossfade_transition")));
    for op in operations {
        assert!(op["description"].as_str().is_some_and(|d| !d.is_empty()));
    }
}

#[test]
fn cli_process_file_rejects_unknown_operation() {
    let sandbox = sandbox();
    std::fs::write(sandbox.source_path.join("clip.mp4"), b"fake media bytes").unwrap();

    let list_output = komposer_bin(&sandbox).arg("list-files").output().unwrap();
    let files = stdout_json(&list_output);
    let handle = files["files"][0]["id"].as_str().unwrap().to_string();

    let output = komposer_bin(&sandbox)
        .args(["process-file", &handle, "not_a_real_operation", "mp4"])
        .output()
        .expect("failed to run komposer process-file");
    assert!(output.status.success(), "the binary itself should exit 0 on a validation failure");
    let body = stdout_json(&output);
    assert_eq!(body["success"], serde_json::json!(false));
    assert_eq!(body["error_kind"], serde_json::json!("ValidationError"));
}

#[test]
fn cli_process_file_rejects_malformed_handle() {
    let sandbox = sandbox();
    let output = komposer_bin(&sandbox)
        .args(["process-file", "not-a-handle", "trim", "mp4"])
        .output()
        .expect("failed to run komposer process-file");
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["success"], serde_json::json!(false));
}

#[test]
fn cli_batch_process_rejects_empty_operations_file() {
    let sandbox = sandbox();
    let ops_path = sandbox.temp_path.join("ops.json");
    std::fs::write(&ops_path, "[]").unwrap();

    let output = komposer_bin(&sandbox)
        .args(["batch-process", ops_path.to_str().unwrap()])
        .output()
        .expect("failed to run komposer batch-process");
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["success"], serde_json::json!(false));
    assert!(body["message"].as_str().unwrap().contains("at least one"));
}

#[test]
fn cli_batch_process_reports_failed_step_and_partial_outputs() {
    let sandbox = sandbox();
    std::fs::write(sandbox.source_path.join("clip.mp4"), b"fake media bytes").unwrap();

    let list_output = komposer_bin(&sandbox).arg("list-files").output().unwrap();
    let files = stdout_json(&list_output);
    let handle = files["files"][0]["id"].as_str().unwrap().to_string();

    let ops_path = sandbox.temp_path.join("ops.json");
    let ops = serde_json::json!([
        {
            "input_file_id": handle,
            "operation": "not_a_real_operation",
            "output_extension": "mp4",
        }
    ]);
    std::fs::write(&ops_path, serde_json::to_string(&ops).unwrap()).unwrap();

    let output = komposer_bin(&sandbox)
        .args(["batch-process", ops_path.to_str().unwrap()])
        .output()
        .expect("failed to run komposer batch-process");
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["success"], serde_json::json!(false));
    assert_eq!(body["failed_step"], serde_json::json!(0));
    assert_eq!(body["step_outputs"].as_array().unwrap().len(), 0);
}

#[test]
fn cli_cleanup_temp_files_on_empty_registry_removes_nothing() {
    let sandbox = sandbox();
    let output = komposer_bin(&sandbox)
        .arg("cleanup-temp-files")
        .output()
        .expect("failed to run komposer cleanup-temp-files");
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["success"], serde_json::json!(true));
    assert_eq!(body["removed"], serde_json::json!(0));
}

#[test]
fn cli_file_info_rejects_unknown_handle() {
    let sandbox = sandbox();
    let output = komposer_bin(&sandbox)
        .args(["file-info", "file_deadbeef"])
        .output()
        .expect("failed to run komposer file-info");
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["success"], serde_json::json!(false));
}

#[test]
fn cli_process_komposition_file_rejects_missing_source() {
    let sandbox = sandbox();
    let komposition_path = sandbox.temp_path.join("komposition.json");
    let doc = serde_json::json!({
        "bpm": 120.0,
        "beats_per_measure": 4,
        "segments": [
            {"segment_id": "seg1", "source_ref": "s1", "start_beat": 0.0, "end_beat": 4.0}
        ],
        "sources": [
            {"source_id": "s1", "url": "file://missing.mp4", "media_type": "video"}
        ]
    });
    std::fs::write(&komposition_path, serde_json::to_string(&doc).unwrap()).unwrap();

    let output = komposer_bin(&sandbox)
        .args(["process-komposition-file", komposition_path.to_str().unwrap()])
        .output()
        .expect("failed to run komposer process-komposition-file");
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["success"], serde_json::json!(false));
}
