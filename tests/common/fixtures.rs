//! Synthetic sandbox artifacts and a mocked sandbox API

use serde_json::{Value, json};
use std::io::Write;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bytes of the sample submitted in scenarios
pub const SAMPLE_BYTES: &[u8] = b"MZ\x90\x00 sample payload";

/// Report body served for every mocked task
pub fn report_body(task_id: u64) -> Value {
    json!({
        "info": {"id": task_id, "category": "file"},
        "target": {"file": {"name": "sample.exe"}},
        "signatures": [{"name": "creates_exe", "severity": 2}]
    })
}

/// Build a zip archive in memory containing the given files
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Build a tar archive with bzip2 compression in memory containing the given members
pub fn tar_bz2_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Dropped bundle with one plain file and one first-level zip holding two files
pub fn dropped_bundle() -> Vec<u8> {
    let inner = zip_bytes(&[
        ("dropped_1.exe", b"MZ dropped one"),
        ("dropped_2.bat", b"@echo off"),
    ]);
    tar_bz2_bytes(&[("notes.txt", b"written by sample"), ("5f3a9c.zip", &inner)])
}

/// Mount the submission endpoint answering with `task_id`
pub async fn mock_submission(server: &MockServer, task_id: u64) {
    Mock::given(method("POST"))
        .and(path("/tasks/create/file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": task_id})))
        .expect(1)
        .mount(server)
        .await;
}

/// Mount the task view endpoint so it answers each status once, in order
///
/// The last status keeps being served once the others are used up.
pub async fn mock_status_sequence(server: &MockServer, task_id: u64, statuses: &[&str]) {
    let route = format!("/tasks/view/{}", task_id);
    let Some((last, leading)) = statuses.split_last() else {
        return;
    };

    for status in leading {
        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"task": {"id": task_id, "status": status}})),
            )
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(route.as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"task": {"id": task_id, "status": last}})),
        )
        .mount(server)
        .await;
}

/// Mount report, memory and dropped endpoints for a finished task
pub async fn mock_artifacts(server: &MockServer, task_id: u64, dropped: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/tasks/report/{}", task_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(report_body(task_id)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/memory/list/{}", task_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dump_files": ["1337-0a1b2c3d.dmp", "1337-ffeeddcc.exe_", "2048-99aa.dmp"]
        })))
        .mount(server)
        .await;
    for pid in ["1337", "2048"] {
        Mock::given(method("GET"))
            .and(path(format!("/memory/get/{}/{}", task_id, pid)))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(format!("memory of {}", pid)),
            )
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/tasks/report/{}/dropped", task_id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(dropped))
        .mount(server)
        .await;
}
