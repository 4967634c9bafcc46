//! Runs the real service on a loopback port and talks to it through the
//! typed client.

use std::time::Duration;

use tempfile::TempDir;
use url::Url;

use tailvol_daemon::http_server::api::client::{ApiClient, ApiError};
use tailvol_daemon::http_server::api::driver::{
    ActivateRequest, CreateRequest, ListRequest, MountRequest, PathRequest, RemoveRequest,
};
use tailvol_daemon::http_server::health::liveness::LivezRequest;
use tailvol_daemon::http_server::health::version::VersionRequest;
use tailvol_daemon::service_config::{Config, ConfigLayer};
use tailvol_daemon::{build_info, spawn_service, ShutdownHandle};

async fn start() -> (ShutdownHandle, ApiClient, TempDir) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let base = tempfile::tempdir().unwrap();
    let config = Config::resolve(ConfigLayer {
        listen: Some("127.0.0.1:0".into()),
        base: Some(base.path().to_path_buf()),
        stop_timeout_secs: Some(2),
        ..Default::default()
    })
    .unwrap();

    let handle = spawn_service(&config).await.unwrap();
    let remote = Url::parse(&format!("http://{}", handle.local_addr())).unwrap();
    let client = ApiClient::new(&remote).unwrap();
    (handle, client, base)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_endpoints() {
    let (handle, mut client, _base) = start().await;

    let livez = client.call(LivezRequest {}).await.unwrap();
    assert_eq!(livez.status, "ok");

    let version = client.call(VersionRequest {}).await.unwrap();
    assert_eq!(version, build_info());

    let activate = client.call(ActivateRequest {}).await.unwrap();
    assert_eq!(activate.implements, vec!["VolumeDriver"]);

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_calls_through_client() {
    let (handle, mut client, base) = start().await;

    client
        .call_driver(CreateRequest {
            name: "logs".into(),
            opts: None,
        })
        .await
        .unwrap();

    let path = client
        .call_driver(PathRequest {
            name: "logs".into(),
        })
        .await
        .unwrap();
    let expected = base.path().join("volumes").join("logs").join("_data");
    assert_eq!(path.mountpoint, expected.display().to_string());

    let list = client.call_driver(ListRequest {}).await.unwrap();
    assert_eq!(list.volumes.len(), 1);
    assert_eq!(list.volumes[0].name, "logs");

    let err = client
        .call_driver(MountRequest {
            name: "missing".into(),
            id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Driver(msg) if msg.contains("not found")));

    client
        .call_driver(RemoveRequest {
            name: "logs".into(),
        })
        .await
        .unwrap();
    assert!(!expected.exists());

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_over_http_and_shutdown_with_open_stream() {
    let (handle, mut client, _base) = start().await;

    client
        .call_driver(CreateRequest {
            name: "logs".into(),
            opts: None,
        })
        .await
        .unwrap();
    let volume = client
        .call_driver(PathRequest {
            name: "logs".into(),
        })
        .await
        .unwrap();

    let stream_url = client.base_url().join("/stream").unwrap();
    let mut response = client.http_client().get(stream_url).send().await.unwrap();
    assert!(response.status().is_success());

    let file = std::path::Path::new(&volume.mountpoint).join("app.log");
    std::fs::write(&file, "hello\n").unwrap();

    let mut received = String::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while !received.contains("\"line\":\"hello\"") {
            let chunk = response.chunk().await.unwrap().expect("stream ended early");
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("line never streamed");
    assert!(received.contains("data: "));
    assert!(received.contains("\"file\":\"app.log\""));

    // an open stream must not hold up shutdown
    tokio::time::timeout(Duration::from_secs(10), handle.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();
}
