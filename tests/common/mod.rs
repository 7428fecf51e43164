//! Shared harness for HTTP-level tests: a router wired to a fake engine and a
//! throwaway scratch directory.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use transcoder::common::error::EngineError;
use transcoder::config::settings::AppConfig;
use transcoder::infrastructure::ffmpeg::engine::TranscodeEngine;
use transcoder::modules::transcode::events::EventSender;
use transcoder::modules::transcode::model::RenditionProfile;
use transcoder::state::AppState;

pub const BOUNDARY: &str = "transcoder-test-boundary";

/// Writes `fake_output(label)` for every rendition except those in `fail`.
#[derive(Default)]
pub struct FakeEngine {
    pub fail: Vec<&'static str>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TranscodeEngine for FakeEngine {
    async fn transcode(
        &self,
        _input: &Path,
        profile: &RenditionProfile,
        output: &Path,
        _events: &EventSender,
    ) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.contains(&profile.label.as_str()) {
            return Err(EngineError::Exit {
                code: Some(1),
                stderr: format!("Error while encoding {}", profile.label),
            });
        }

        tokio::fs::write(output, fake_output(&profile.label)).await?;
        Ok(())
    }
}

pub fn fake_output(label: &str) -> Vec<u8> {
    let mut bytes = b"\x00\x00\x00\x18ftypmp42".to_vec();
    for _ in 0..64 {
        bytes.extend_from_slice(label.as_bytes());
    }
    bytes
}

pub struct TestHarness {
    pub app: Router,
    pub state: AppState,
    pub engine: Arc<FakeEngine>,
    _dir: tempfile::TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_engine(FakeEngine::default(), AppConfig::default()).await
    }

    pub async fn with_engine(engine: FakeEngine, config: AppConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            scratch_dir: dir.path().join("scratch"),
            ..config
        };
        let engine = Arc::new(engine);

        let state = AppState::build(config, engine.clone()).await.unwrap();
        let app = transcoder::app::create_app(state.clone());

        Self {
            app,
            state,
            engine,
            _dir: dir,
        }
    }

    pub fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.state.workspace.root()).unwrap().count()
    }

    pub fn calls(&self) -> usize {
        self.engine.calls.load(Ordering::SeqCst)
    }
}

pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn video(data: &'a [u8]) -> Self {
        Self {
            name: "video",
            file_name: Some("clip.mp4"),
            content_type: Some("video/mp4"),
            data,
        }
    }

    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            file_name: None,
            content_type: None,
            data: value.as_bytes(),
        }
    }
}

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    part.name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name).as_bytes(),
            ),
        }
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}
