//! Test doubles shared by the unit tests of this crate.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{Mutex, Notify},
};

use crate::{
    capture::{FRAME_MIME_TYPE, FrameCapture, FrameRequest},
    describe::DescriptionClient,
    error::{Result, ScribeError},
    surface::PlaybackSurface,
    types::{EncodedFrame, VideoMetadata},
};

/// In-memory surface that records what was done to it.
pub struct FakeSurface {
    pub source: PathBuf,
    pub metadata: Option<VideoMetadata>,
    /// Delivered by `wait_for_metadata` when `metadata` is still unset.
    pub pending_metadata: Option<VideoMetadata>,
    pub position: f64,
    pub muted: bool,
    pub playing: bool,
    pub seeks: Vec<f64>,
    pub releases: Arc<AtomicUsize>,
}

impl FakeSurface {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            source: PathBuf::from("fake.mp4"),
            metadata: Some(VideoMetadata {
                duration,
                width: 1280,
                height: 720,
            }),
            pending_metadata: None,
            position: 0.0,
            muted: false,
            playing: false,
            seeks: Vec::new(),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn loading(duration: f64) -> Self {
        let mut surface = Self::with_duration(duration);
        surface.pending_metadata = surface.metadata.take();
        surface
    }

    pub fn release_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

#[async_trait]
impl PlaybackSurface for FakeSurface {
    fn source(&self) -> &Path {
        &self.source
    }

    fn metadata(&self) -> Option<VideoMetadata> {
        self.metadata
    }

    async fn wait_for_metadata(&mut self) -> Result<VideoMetadata> {
        if let Some(metadata) = self.metadata {
            return Ok(metadata);
        }
        tokio::task::yield_now().await;
        let metadata = self
            .pending_metadata
            .take()
            .ok_or_else(|| ScribeError::Playback {
                reason: "metadata never arrived".to_string(),
            })?;
        self.metadata = Some(metadata);
        Ok(metadata)
    }

    fn position(&self) -> f64 {
        self.position
    }

    async fn seek(&mut self, position: f64) -> Result<()> {
        tokio::task::yield_now().await;
        self.position = position;
        self.seeks.push(position);
        Ok(())
    }

    fn muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn play(&mut self) -> Result<()> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&mut self) -> bool {
        self.playing
    }

    fn release(&mut self) {
        self.playing = false;
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Produces a tiny fixed payload per frame; optionally fails at one position.
#[derive(Default)]
pub struct FakeCapture {
    pub fail_at: Option<f64>,
}

#[async_trait]
impl FrameCapture for FakeCapture {
    async fn capture(&self, request: FrameRequest<'_>) -> Result<EncodedFrame> {
        if self.fail_at == Some(request.position) {
            return Err(ScribeError::RenderingUnavailable {
                position: request.position,
                reason: "no drawing context".to_string(),
            });
        }
        Ok(EncodedFrame {
            timestamp: request.position,
            mime_type: FRAME_MIME_TYPE,
            data: format!("frame-{}", request.position),
        })
    }
}

/// Describes frames from their payload and counts calls.
#[derive(Default)]
pub struct EchoDescriber {
    pub calls: AtomicUsize,
}

#[async_trait]
impl DescriptionClient for EchoDescriber {
    async fn describe_frame(&self, frame: &EncodedFrame) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("described {}", frame.data))
    }
}

/// Answers the first `answered` frames, then hangs until dropped and
/// signals `stalled` once it does.
pub struct StallingDescriber {
    pub answered: usize,
    pub calls: AtomicUsize,
    pub stalled: Arc<Notify>,
}

impl StallingDescriber {
    pub fn after(answered: usize) -> Self {
        Self {
            answered,
            calls: AtomicUsize::new(0),
            stalled: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl DescriptionClient for StallingDescriber {
    async fn describe_frame(&self, frame: &EncodedFrame) -> Result<String> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.answered {
            return Ok(format!("described {}", frame.data));
        }
        self.stalled.notify_one();
        std::future::pending().await
    }
}

pub struct StubResponse {
    status: u16,
    body: String,
}

impl StubResponse {
    pub fn ok(body: Value) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// Minimal HTTP/1.1 server answering one scripted response per connection.
pub struct HttpStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl HttpStub {
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

pub async fn spawn_http_stub(responses: Vec<StubResponse>) -> HttpStub {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let base_url = format!("http://{}", listener.local_addr().expect("stub address"));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let recorded = Arc::clone(&requests);
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(request) = read_request(&mut stream).await else {
                continue;
            };
            recorded.lock().await.push(request);

            let reply = format!(
                "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                response.status,
                response.body.len(),
                response.body
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    HttpStub { base_url, requests }
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}
