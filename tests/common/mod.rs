#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notescribe_rs::config::{CloudConfig, Config, LocalConfig, WorkerConfig};
use notescribe_rs::{TranscriptionObserver, TranscriptionOutcome};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A request as seen by the canned server.
#[derive(Debug)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.header_values(name).into_iter().next()
    }

    /// Every value sent under `name`, in wire order.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.head
            .lines()
            .skip(1)
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| value.trim().to_string())
            })
            .collect()
    }
}

/// Serves exactly one HTTP response and hands back what it received.
pub struct CannedServer {
    pub url: String,
    request: oneshot::Receiver<CapturedRequest>,
}

impl CannedServer {
    pub async fn start(status: u16, body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let captured = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(captured);
        });

        Self {
            url: format!("http://{}/v1/audio/transcriptions", addr),
            request: rx,
        }
    }

    pub async fn request(self) -> CapturedRequest {
        tokio::time::timeout(Duration::from_secs(5), self.request)
            .await
            .expect("server saw no request")
            .expect("server task ended")
    }

    /// True if nothing connected within `wait`.
    pub async fn stayed_idle(self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.request).await.is_err()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> CapturedRequest {
    let mut data = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        let read = socket.read(&mut chunk).await.unwrap();
        assert!(read > 0, "client closed before sending headers");
        data.extend_from_slice(&chunk[..read]);
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while data.len() < header_end + content_length {
        let read = socket.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..read]);
    }

    CapturedRequest {
        head,
        body: data[header_end..].to_vec(),
    }
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub fn cloud_config(endpoint: &str) -> Config {
    Config {
        cloud: CloudConfig {
            enabled: true,
            api_key: " sk-test ".to_string(),
            model: "whisper-1".to_string(),
            endpoint: endpoint.to_string(),
        },
        ..Config::default()
    }
}

pub fn local_config(models_dir: &Path, workers: WorkerConfig) -> Config {
    Config {
        provider: notescribe_rs::ProviderKind::Local,
        local: LocalConfig {
            enabled: true,
            model_downloaded: true,
            models_dir: Some(models_dir.to_path_buf()),
            ..LocalConfig::default()
        },
        workers,
        ..Config::default()
    }
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingObserver {
    pub outcomes: Mutex<Vec<TranscriptionOutcome>>,
    notify: tokio::sync::Notify,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn taken(&self) -> Vec<TranscriptionOutcome> {
        self.outcomes.lock().unwrap().clone()
    }

    pub async fn wait(&self) -> TranscriptionOutcome {
        loop {
            let notified = self.notify.notified();
            if let Some(outcome) = self.outcomes.lock().unwrap().first().cloned() {
                return outcome;
            }
            tokio::time::timeout(Duration::from_secs(5), notified)
                .await
                .expect("observer was never notified");
        }
    }

    fn push(&self, outcome: TranscriptionOutcome) {
        self.outcomes.lock().unwrap().push(outcome);
        self.notify.notify_waiters();
    }
}

impl TranscriptionObserver for RecordingObserver {
    fn on_success(&self, text: String) {
        self.push(TranscriptionOutcome::Success(text));
    }

    fn on_empty(&self) {
        self.push(TranscriptionOutcome::Empty);
    }

    fn on_failed(&self, detail: String) {
        self.push(TranscriptionOutcome::Failed(detail));
    }

    fn on_rate_limited(&self) {
        self.push(TranscriptionOutcome::RateLimited);
    }
}
