//! User and knowledge-source services against a live mock backend.

use std::sync::{Arc, Mutex};

use noa_client::client::{ApiClient, ErrorKind, FilePart, ProgressCallback};
use noa_client::config::{ApiConfig, ClientConfig, SessionConfig, StoreKind};
use noa_client::services::{SourceService, UserService};
use noa_client::session::{FileStore, SessionStore};

mod common;

fn progress_recorder() -> (ProgressCallback, Arc<Mutex<Vec<u8>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ProgressCallback = Arc::new(move |pct| sink.lock().unwrap().push(pct));
    (callback, seen)
}

fn assert_progress_complete(values: &[u8]) {
    assert!(!values.is_empty(), "progress callback never fired");
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", values);
    assert_eq!(values.last(), Some(&100));
}

#[tokio::test]
async fn test_login_stores_session_and_whoami() {
    let backend = common::start_mock_backend().await;
    let (client, store) = backend.anonymous_client();
    let users = UserService::new(client);

    let login = users.login(common::USERNAME, common::PASSWORD).await.unwrap();
    assert_eq!(login.data.token_type, "bearer");

    let creds = store.credentials().unwrap();
    assert_eq!(creds.access_token, "access-1");
    assert_eq!(creds.refresh_token, "refresh-1");
    assert_eq!(creds.expires_at.as_deref(), Some("2030-01-01T00:00:00"));

    let me = users.current_user().await.unwrap();
    assert_eq!(me.data.email, common::USERNAME);
    assert_eq!(me.data.company, "Acme");
    assert_eq!(me.data.phone, "");
}

#[tokio::test]
async fn test_bad_credentials() {
    let backend = common::start_mock_backend().await;
    let (client, store) = backend.anonymous_client();
    let users = UserService::new(client);

    let err = users.login(common::USERNAME, "wrong").await.unwrap_err();

    assert_eq!(err.status, 401);
    assert_eq!(err.kind, ErrorKind::Client);
    assert_eq!(err.message, "Incorrect username or password");
    assert!(store.access_token().is_none());
    assert_eq!(backend.state.refresh_calls(), 0);
}

#[tokio::test]
async fn test_logout_clears_session() {
    let backend = common::start_mock_backend().await;
    let (client, store) = backend.logged_in_client();
    let mut events = client.events().subscribe();
    let users = UserService::new(client);

    users.logout().await.unwrap();

    assert!(store.credentials().is_none());
    assert_eq!(backend.state.logout_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_logout_survives_unreachable_backend() {
    let addr = common::dead_address().await;
    let backend = common::start_mock_backend().await;
    let (_, store) = backend.logged_in_client();
    let client = ApiClient::builder(ApiConfig {
        base_url: format!("http://{}/api/v1", addr),
        ..backend.api_config()
    })
    .store(store.clone())
    .build()
    .unwrap();

    UserService::new(client).logout().await.unwrap();

    assert!(store.access_token().is_none());
}

#[tokio::test]
async fn test_upload_reports_progress() {
    let backend = common::start_mock_backend().await;
    let (client, _store) = backend.logged_in_client();
    let sources = SourceService::new(client);
    let (callback, seen) = progress_recorder();

    let bytes = vec![7u8; 100 * 1024];
    let res = sources
        .upload(FilePart::new("faq.pdf", bytes).mime("application/pdf").on_progress(callback))
        .await
        .unwrap();

    assert_eq!(res.data["filename"], "faq.pdf");
    assert_eq!(res.data["size"], 100 * 1024);
    assert_progress_complete(&seen.lock().unwrap());
}

#[tokio::test]
async fn test_upload_is_replayed_after_refresh() {
    let backend = common::start_mock_backend().await;
    let (client, _store) = backend.logged_in_client();
    backend.state.expire_access_token();
    let sources = SourceService::new(client);
    let (callback, seen) = progress_recorder();

    let res = sources
        .upload(FilePart::new("notes.txt", vec![1u8; 40 * 1024]).on_progress(callback))
        .await
        .unwrap();

    assert_eq!(res.data["size"], 40 * 1024);
    assert_eq!(backend.state.refresh_calls(), 1);
    assert_eq!(backend.state.uploads.lock().unwrap().len(), 1);
    assert_progress_complete(&seen.lock().unwrap());
}

#[tokio::test]
async fn test_upload_of_unknown_length_reports_nothing() {
    let backend = common::start_mock_backend().await;
    let (client, _store) = backend.logged_in_client();
    let sources = SourceService::new(client);
    let (callback, seen) = progress_recorder();

    let res = sources
        .upload(
            FilePart::new("stream.bin", vec![0u8; 20 * 1024])
                .unknown_length()
                .on_progress(callback),
        )
        .await
        .unwrap();

    assert_eq!(res.data["size"], 20 * 1024);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_from_disk() {
    let backend = common::start_mock_backend().await;
    let (client, _store) = backend.logged_in_client();
    let sources = SourceService::new(client);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.csv");
    std::fs::write(&path, "sku,price\n1,10\n").unwrap();

    let res = sources.upload_file(&path, None).await.unwrap();
    assert_eq!(res.data["filename"], "catalog.csv");

    let err = sources
        .upload_file(&dir.path().join("missing.csv"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Client);
}

#[tokio::test]
async fn test_list_and_delete_files() {
    let backend = common::start_mock_backend().await;
    let (client, _store) = backend.logged_in_client();
    let sources = SourceService::new(client);

    let res = sources.list_files(Some("faq & pricing")).await.unwrap();
    assert_eq!(res.data["section"], "faq & pricing");

    let res = sources.list_files(None).await.unwrap();
    assert_eq!(res.data["section"], serde_json::Value::Null);

    sources.delete_file(42).await.unwrap();
}

#[tokio::test]
async fn test_file_store_session_survives_restart() {
    let backend = common::start_mock_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let session_path = dir.path().join("session.json");

    let config = ClientConfig {
        api: backend.api_config(),
        session: SessionConfig {
            store: StoreKind::File,
            path: Some(session_path.clone()),
        },
        ..ClientConfig::default()
    };

    let client = ApiClient::from_config(&config).unwrap();
    UserService::new(client).login(common::USERNAME, common::PASSWORD).await.unwrap();

    let reopened = FileStore::open(&session_path).unwrap();
    assert_eq!(reopened.access_token().as_deref(), Some("access-1"));

    let client = ApiClient::from_config(&config).unwrap();
    let me = UserService::new(client).current_user().await.unwrap();
    assert_eq!(me.status, 200);
}
