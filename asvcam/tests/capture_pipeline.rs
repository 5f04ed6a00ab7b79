//! Integration tests for the capture and retrieval paths.
//!
//! These tests verify the complete flow including:
//! - capture cycle → CSV event log with fused position from a TCP service
//! - event log → replay → local mirror
//! - storage listing → retrieval walker → local mirror
//!
//! Run with: `cargo test --test capture_pipeline`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use asvcam::camera::CameraClient;
use asvcam::device::Device;
use asvcam::fetch::{FetchClient, FetchConfig};
use asvcam::http::{BoxFuture, HttpClient, HttpError};
use asvcam::position::PositionProvider;
use asvcam::recorder::{CsvEventRecorder, EventColumns};
use asvcam::replay::{read_event_log, replay};
use asvcam::retrieval::{RetrievalMode, RetrievalWalker, WalkerConfig};
use asvcam::scheduler::{CaptureScheduler, SchedulerConfig};

// ============================================================================
// Helper Functions
// ============================================================================

/// In-memory camera storage answering capture, listing and file requests.
#[derive(Default)]
struct FakeCameras {
    routes: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl FakeCameras {
    fn with(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(url.into(), body.into());
        self
    }

    fn requests_for(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.as_str() == url).count()
    }
}

impl HttpClient for FakeCameras {
    fn get<'a>(
        &'a self,
        url: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, HttpError>> {
        Box::pin(async move {
            self.requests.lock().push(url.to_string());
            self.routes.get(url).cloned().ok_or_else(|| HttpError::Status {
                url: url.to_string(),
                status: 404,
            })
        })
    }

    fn post<'a>(
        &'a self,
        url: &'a str,
        _headers: &'a [(&'a str, String)],
        _body: String,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, HttpError>> {
        self.get(url, timeout)
    }
}

fn capture_reply(set: &str) -> Vec<u8> {
    json!({
        "status": "complete",
        "raw_storage_path": {
            "1": format!("/files/{}/000/IMG_0000_1.tif", set),
            "2": format!("/files/{}/000/IMG_0000_2.tif", set),
        }
    })
    .to_string()
    .into_bytes()
}

/// Position service answering every connection with the same fix.
async fn position_service(reply: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut token = [0u8; 3];
            if socket.read_exact(&mut token).await.is_ok() && &token == b"GPS" {
                let _ = socket.write_all(reply.as_bytes()).await;
            }
        }
    });
    address
}

fn fetch_config(dir: &std::path::Path) -> FetchConfig {
    FetchConfig {
        output_dir: dir.to_path_buf(),
        fallback_url: None,
        min_image_size: 16,
        timeout: Duration::from_secs(5),
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A capture cycle lands in the event log and replay downloads those files.
#[tokio::test]
async fn test_capture_then_replay() {
    let dir = tempfile::tempdir().unwrap();
    let http = Arc::new(
        FakeCameras::default()
            .with("http://cam1.local/capture?block=true", capture_reply("SET0001"))
            .with("http://cam1.local/files/SET0001/000/IMG_0000_1.tif", vec![1u8; 64])
            .with("http://cam1.local/files/SET0001/000/IMG_0000_2.tif", vec![2u8; 64]),
    );

    let cam1 = Arc::new(CameraClient::new(
        Device::new("cam1", "http://cam1.local", 2),
        http.clone(),
        Duration::from_secs(4),
    ));
    // Not routed: the capture fails and only cam1 is recorded.
    let cam2 = Arc::new(CameraClient::new(
        Device::new("cam2", "http://cam2.local", 2),
        http.clone(),
        Duration::from_secs(4),
    ));

    let address = position_service(r#"{"lat": 45.4375, "lon": "12.3358"}"#).await;
    let position = Arc::new(PositionProvider::new(address, Duration::from_secs(2)));

    let log_path = dir.path().join("events.csv");
    let recorder = Arc::new(CsvEventRecorder::open(&log_path, EventColumns::default()).unwrap());

    let scheduler = CaptureScheduler::new(vec![cam1, cam2], recorder, SchedulerConfig::default())
        .with_position(position);
    let report = scheduler.run_cycle().await;

    assert_eq!(report.recorded, vec!["cam1"]);
    assert_eq!(report.skipped, vec!["cam2"]);
    assert!(report.fault.is_none());

    let rows = read_event_log(&log_path, EventColumns::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].device, "cam1");
    let position = rows[0].position.clone().unwrap();
    assert_eq!((position.lat.as_str(), position.lon.as_str()), ("45.4375", "12.3358"));
    assert_eq!(
        rows[0].image_paths,
        vec![
            "/files/SET0001/000/IMG_0000_1.tif",
            "/files/SET0001/000/IMG_0000_2.tif"
        ]
    );

    let mirror = dir.path().join("mirror");
    let fetch = Arc::new(FetchClient::new(
        Device::new("cam1", "http://cam1.local", 2),
        http.clone(),
        fetch_config(&mirror),
    ));
    let fetchers = HashMap::from([("cam1".to_string(), fetch)]);

    let replayed = replay(&rows, &fetchers).await;
    assert_eq!(replayed.downloaded, 2);
    assert_eq!(
        std::fs::read(mirror.join("cam1/SET0001/000/IMG_0000_2.tif")).unwrap(),
        vec![2u8; 64]
    );
}

/// Files already mirrored by a replay are not transferred again by a walk.
#[tokio::test]
async fn test_walk_after_replay_uses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let file_1 = "http://cam1.local/files/SET0001/000/IMG_0000_1.tif";
    let file_2 = "http://cam1.local/files/SET0001/000/IMG_0000_2.tif";
    let http = Arc::new(
        FakeCameras::default()
            .with(
                "http://cam1.local/files",
                json!({"directories": ["SET0001"], "files": []}).to_string(),
            )
            .with(
                "http://cam1.local/files/SET0001",
                json!({"directories": ["000"], "files": [{"name": "paramlog.dat"}]}).to_string(),
            )
            .with(
                "http://cam1.local/files/SET0001/000",
                json!({
                    "directories": [],
                    "files": [{"name": "IMG_0000_1.tif"}, {"name": "IMG_0000_2.tif"}]
                })
                .to_string(),
            )
            .with(file_1, vec![1u8; 64])
            .with(file_2, vec![2u8; 64]),
    );
    let fetch = Arc::new(FetchClient::new(
        Device::new("cam1", "http://cam1.local", 2),
        http.clone(),
        fetch_config(dir.path()),
    ));

    // Mirror one file up front, as a replay would.
    fetch.fetch("/files/SET0001/000/IMG_0000_1.tif").await.unwrap();

    let walker = RetrievalWalker::new(Arc::clone(&fetch), WalkerConfig::default());
    let report = walker.run(RetrievalMode::Download, None).await.unwrap();

    assert_eq!(report.cached, 1);
    assert_eq!(report.downloaded, 1);
    assert_eq!(http.requests_for(file_1), 1);
    assert_eq!(http.requests_for(file_2), 1);
    assert_eq!(http.requests_for("http://cam1.local/files/SET0001/paramlog.dat"), 0);
}
