use super::api::{task_id_from_submission, task_ids_from_listing};
use super::*;
use crate::config::RetryConfig;
use crate::types::{TaskId, TaskStatus};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_client(server: &MockServer) -> SandboxClient {
    let mut config = Config::new(format!("{}/", server.uri()));
    config.retry = RetryConfig::disabled();
    SandboxClient::new(config).unwrap()
}

// ---------------------------------------------------------------------------
// Construction and configuration
// ---------------------------------------------------------------------------

#[test]
fn test_new_normalizes_base_url() {
    let mut config = Config::new("http://sandbox:8090");
    config.base_url = "http://sandbox:8090/".to_string();
    let client = SandboxClient::new(config).unwrap();
    assert_eq!(client.url("/tasks/view/1"), "http://sandbox:8090/tasks/view/1");
}

#[test]
fn test_new_rejects_invalid_base_url() {
    let result = SandboxClient::new(Config::new("sandbox without scheme"));
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[test]
fn test_set_proxy_updates_config() {
    let mut client = SandboxClient::new(Config::new("http://sandbox:8090")).unwrap();
    client
        .set_proxy(
            Some("http://proxy:3128".to_string()),
            Some("http://proxy:3129".to_string()),
        )
        .unwrap();
    assert_eq!(
        client.config().proxy.http.as_deref(),
        Some("http://proxy:3128")
    );
    assert_eq!(
        client.config().proxy.https.as_deref(),
        Some("http://proxy:3129")
    );

    client.set_proxy(None, None).unwrap();
    assert!(client.config().proxy.is_empty());
}

#[test]
fn test_set_proxy_keeps_previous_settings_on_error() {
    let mut client = SandboxClient::new(Config::new("http://sandbox:8090")).unwrap();
    client
        .set_proxy(Some("http://proxy:3128".to_string()), None)
        .unwrap();

    let result = client.set_proxy(Some("not a proxy".to_string()), None);
    assert!(matches!(result, Err(Error::Config { .. })));
    assert_eq!(
        client.config().proxy.http.as_deref(),
        Some("http://proxy:3128")
    );
}

// ---------------------------------------------------------------------------
// get_json / get_stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_get_json_decodes_body_and_sends_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/list"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tasks": []})))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let value = client
        .get_json("/tasks/list", &[("limit", "10")])
        .await
        .unwrap();
    assert_eq!(value, json!({"tasks": []}));
}

#[tokio::test]
async fn test_get_json_non_200_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/view/9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = test_client(&server);
    match client.get_json("/tasks/view/9", &[]).await {
        Err(Error::Http { status, url }) => {
            assert_eq!(status, 404);
            assert!(url.ends_with("/tasks/view/9"));
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_json_invalid_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/view/9"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client.get_json("/tasks/view/9", &[]).await;
    assert!(matches!(result, Err(Error::Decode { .. })));
}

#[tokio::test]
async fn test_get_json_retries_gateway_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/machines/list/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/machines/list/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let mut config = Config::new(server.uri());
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    let client = SandboxClient::new(config).unwrap();

    let value = client.machines_list().await.unwrap();
    assert_eq!(value, json!({"data": []}));
}

#[tokio::test]
async fn test_get_stream_writes_body_to_disk() {
    let server = MockServer::start().await;
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/memory/get/3/2656"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let dir = tempdir().unwrap();
    let dest = dir.path().join("memory").join("2656.dmp");

    let stream = client.memory_dump(TaskId(3), "2656").await.unwrap();
    assert!(stream.url().ends_with("/memory/get/3/2656"));
    let written = stream.write_to(&dest).await.unwrap();

    assert_eq!(written, payload.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), payload);
}

#[tokio::test]
async fn test_get_stream_non_200_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/report/3/dropped"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client.dropped_files(TaskId(3)).await;
    assert!(matches!(result, Err(Error::Http { status: 500, .. })));
}

#[tokio::test]
async fn test_request_timeout_limits_json_but_not_streams() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/view/3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"task": {"status": "running"}}))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/report/3/dropped"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"slow bundle".to_vec())
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let mut config = Config::new(server.uri());
    config.retry = RetryConfig::disabled();
    config.request_timeout = Duration::from_millis(100);
    let client = SandboxClient::new(config).unwrap();

    let json = client.get_json("/tasks/view/3", &[]).await;
    assert!(matches!(&json, Err(Error::Network(e)) if e.is_timeout()), "{:?}", json);

    let dir = tempdir().unwrap();
    let dest = dir.path().join("dropped.tar.bz2");
    let stream = client.dropped_files(TaskId(3)).await.unwrap();
    stream.write_to(&dest).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"slow bundle");
}

// ---------------------------------------------------------------------------
// Endpoint bindings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_task_status_reads_nested_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/view/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"task": {"id": 42, "status": "running"}})),
        )
        .mount(&server)
        .await;

    let client = test_client(&server);
    let status = client.task_status(TaskId(42)).await.unwrap();
    assert_eq!(status, Some(TaskStatus::Running));
}

#[tokio::test]
async fn test_task_status_missing_field_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/view/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "busy"})))
        .mount(&server)
        .await;

    let client = test_client(&server);
    assert_eq!(client.task_status(TaskId(42)).await.unwrap(), None);
}

#[tokio::test]
async fn test_task_report_empty_document_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/report/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = test_client(&server);
    assert_eq!(client.task_report(TaskId(5)).await.unwrap(), None);
}

#[tokio::test]
async fn test_memory_dump_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/memory/list/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dump_files": ["2656-7e47a23408e3606e.dmp", "1024-aaaa.dmp"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/memory/list/6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": true})))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let files = client.memory_dump_list(TaskId(5)).await.unwrap().unwrap();
    assert_eq!(files, vec!["2656-7e47a23408e3606e.dmp", "1024-aaaa.dmp"]);
    assert_eq!(client.memory_dump_list(TaskId(6)).await.unwrap(), None);
}

#[tokio::test]
async fn test_create_file_task_sends_tags_and_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tasks/create/file"))
        .and(body_string_contains("windows7,x64"))
        .and(body_string_contains("name=\"options\""))
        .and(body_string_contains("MZ-sample-bytes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let sample = dir.path().join("sample.exe");
    std::fs::write(&sample, b"MZ-sample-bytes").unwrap();

    let client = test_client(&server);
    let tags = vec!["windows7".to_string(), "x64".to_string()];
    let task = client.create_file_task(&sample, &tags).await.unwrap();

    assert_eq!(task.task_id, TaskId(42));
    assert!(task.status.is_none());
    assert!(task.tags.contains("windows7"));
}

#[tokio::test]
async fn test_create_file_task_non_200_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tasks/create/file"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let sample = dir.path().join("sample.exe");
    std::fs::write(&sample, b"MZ").unwrap();

    let client = test_client(&server);
    let result = client.create_file_task(&sample, &[]).await;
    assert!(matches!(result, Err(Error::Http { status: 500, .. })));
}

#[tokio::test]
async fn test_task_ids_for_file_uses_md5() {
    let server = MockServer::start().await;
    let content = b"hello sandbox";
    let md5 = format!("{:x}", md5::compute(content));
    Mock::given(method("GET"))
        .and(path("/tasks/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tasks": [
                {"sample": {"md5": md5}, "guest": {"task_id": 11}},
                {"sample": {"md5": "0000"}, "guest": {"task_id": 12}},
                {"guest": {"task_id": 13}}
            ]
        })))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let sample = dir.path().join("sample.bin");
    std::fs::write(&sample, content).unwrap();

    let client = test_client(&server);
    let ids = client.task_ids_for_file(&sample).await.unwrap();
    assert_eq!(ids, vec![TaskId(11)]);
}

// ---------------------------------------------------------------------------
// Response interpretation
// ---------------------------------------------------------------------------

#[test]
fn test_task_ids_from_listing_falls_back_to_task_id_field() {
    let listing = json!({
        "tasks": [
            {"id": 7, "sample": {"md5": "ABCDEF"}},
            {"id": 8, "sample": {"md5": "abcdef"}, "guest": {"task_id": 9}}
        ]
    });
    assert_eq!(
        task_ids_from_listing(&listing, "abcdef"),
        vec![TaskId(7), TaskId(9)]
    );
    assert!(task_ids_from_listing(&json!({}), "abcdef").is_empty());
}

#[test]
fn test_submission_error_flag_is_reported() {
    let path = PathBuf::from("sample.exe");
    let response = json!({"error": true, "error_value": "File is empty"});
    match task_id_from_submission(&path, &response) {
        Err(Error::Submission { reason, .. }) => assert_eq!(reason, "File is empty"),
        other => panic!("expected submission error, got {other:?}"),
    }
}

#[test]
fn test_submission_false_error_flag_is_ignored() {
    let path = PathBuf::from("sample.exe");
    let response = json!({"error": false, "task_id": "17"});
    assert_eq!(
        task_id_from_submission(&path, &response).unwrap(),
        TaskId(17)
    );
}

#[test]
fn test_submission_empty_error_values_are_ignored() {
    let path = PathBuf::from("sample.exe");
    for error in [json!(""), json!(0), json!([]), json!(null)] {
        let response = json!({"error": error, "task_id": 21});
        assert_eq!(
            task_id_from_submission(&path, &response).unwrap(),
            TaskId(21),
            "error value {error} should not fail the submission"
        );
    }
}

#[test]
fn test_submission_non_empty_error_values_are_reported() {
    let path = PathBuf::from("sample.exe");
    for error in [json!("quota exceeded"), json!(1)] {
        let response = json!({"error": error, "task_id": 21});
        assert!(matches!(
            task_id_from_submission(&path, &response),
            Err(Error::Submission { .. })
        ));
    }
}

#[test]
fn test_submission_null_task_id_is_error() {
    let path = PathBuf::from("sample.exe");
    let response = json!({"task_id": null});
    assert!(matches!(
        task_id_from_submission(&path, &response),
        Err(Error::Submission { .. })
    ));
}
