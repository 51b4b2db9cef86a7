use std::sync::{Arc, Mutex};

use bundle_sync_core::contract::{ProgressHandler, Transport};
use bundle_sync_core::error::TransportError;
use bundle_sync_core::transport::HttpTransport;
use serde_json::json;
use tempfile::tempdir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_json_joins_path_and_sends_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/projects/p1/publishes/latest"))
        .and(query_param("language", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "x"}})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&format!("{}/api/v1", server.uri())).unwrap();
    let body = transport
        .get_json(
            "projects/p1/publishes/latest",
            vec![("language".into(), "en".into())],
        )
        .await
        .unwrap();

    assert_eq!(body["data"]["id"], "x");
}

#[tokio::test]
async fn get_json_reports_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&server.uri()).unwrap();
    let err = transport.get_json("missing", vec![]).await.unwrap_err();

    assert!(
        matches!(err, TransportError::Status { status: 404, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn get_json_rejects_non_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&server.uri()).unwrap();
    let err = transport.get_json("page", vec![]).await.unwrap_err();
    assert!(matches!(err, TransportError::Json(_)), "got {err:?}");
}

#[tokio::test]
async fn download_follows_redirect_and_reports_progress() {
    let server = MockServer::start().await;
    let payload = vec![7u8; 64 * 1024];
    Mock::given(method("GET"))
        .and(path("/latest.tar.gz"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/files/b.tar.gz", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/b.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let downloads = tempdir().unwrap();
    let transport = HttpTransport::new(&server.uri())
        .unwrap()
        .with_download_dir(downloads.path());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let progress: ProgressHandler = Arc::new(move |done, total| {
        recorded.lock().unwrap().push((done, total));
    });

    let url = Url::parse(&format!("{}/latest.tar.gz", server.uri())).unwrap();
    let file = transport.download_file(&url, Some(progress)).await.unwrap();

    assert!(file.starts_with(downloads.path()));
    assert_eq!(std::fs::read(&file).unwrap(), payload);
    let calls = calls.lock().unwrap();
    let last = *calls.last().expect("progress reported");
    assert_eq!(last, (payload.len() as u64, Some(payload.len() as u64)));

    let path = file.to_path_buf();
    drop(file);
    assert!(!path.exists());
}

#[tokio::test]
async fn download_error_status_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let downloads = tempdir().unwrap();
    let transport = HttpTransport::new(&server.uri())
        .unwrap()
        .with_download_dir(downloads.path());
    let url = Url::parse(&format!("{}/b.tar.gz", server.uri())).unwrap();

    let err = transport.download_file(&url, None).await.unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 500, .. }), "got {err:?}");
    assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
}

#[test]
fn invalid_base_url_is_rejected() {
    let err = HttpTransport::new("not a url").unwrap_err();
    assert!(matches!(err, TransportError::InvalidUrl(_)), "got {err:?}");
}
