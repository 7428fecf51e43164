use crate::common::response::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Job-level failures. Rendition-level engine failures normally live inside a
/// `TranscodeOutcome`; they only surface here in single-stream mode.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("{0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Workspace {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Engine(String),

    #[error("{0}")]
    Assembly(String),
}

impl TranscodeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn workspace(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Workspace {
            context: context.into(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Workspace { .. } | Self::Engine(_) | Self::Assembly(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Validation(message) => ErrorBody::new(message),
            Self::Workspace { .. } => ErrorBody::new("Internal server error").details(self.to_string()),
            Self::Engine(message) => ErrorBody::new("Transcoding failed").details(message),
            Self::Assembly(message) => ErrorBody::new("Failed to assemble result").details(message),
        }
    }
}

impl IntoResponse for TranscodeError {
    fn into_response(self) -> Response {
        match &self {
            Self::Validation(_) => tracing::debug!("Rejected request: {}", self),
            _ => tracing::error!("Transcode request failed: {}", self),
        }
        (self.status_code(), Json(self.body())).into_response()
    }
}

/// Failure of a single external engine run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with {}: {stderr}", exit_label(*.code))]
    Exit { code: Option<i32>, stderr: String },

    #[error("ffmpeg timed out after {0:?}")]
    Timeout(Duration),

    #[error("ffmpeg produced no output at {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("I/O error while running ffmpeg: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}
