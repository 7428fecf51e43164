use super::events::{EventSender, TranscodeEvent};
use super::model::{RenditionProfile, TranscodeOutcome};
use crate::common::error::EngineError;
use crate::infrastructure::ffmpeg::engine::TranscodeEngine;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

/// Turns one engine run into exactly one `TranscodeOutcome`. Never retries and
/// never propagates an error to the caller.
#[derive(Clone)]
pub struct TranscodeInvoker {
    engine: Arc<dyn TranscodeEngine>,
}

impl TranscodeInvoker {
    pub fn new(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self { engine }
    }

    pub async fn invoke(
        &self,
        input: &Path,
        profile: &RenditionProfile,
        output: &Path,
        events: &EventSender,
    ) -> TranscodeOutcome {
        let label = profile.label.clone();

        let result = match self.engine.transcode(input, profile, output, events).await {
            Ok(()) => output_size(output).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(size) => {
                let _ = events.send(TranscodeEvent::Completed {
                    label: label.clone(),
                    size,
                });
                TranscodeOutcome::success(label, output.to_path_buf(), size)
            }
            Err(e) => {
                let error = e.to_string();
                let _ = events.send(TranscodeEvent::Failed {
                    label: label.clone(),
                    error: error.clone(),
                });
                TranscodeOutcome::failed(label, error)
            }
        }
    }
}

async fn output_size(output: &Path) -> Result<u64, EngineError> {
    match fs::metadata(output).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => Err(EngineError::EmptyOutput(output.to_path_buf())),
    }
}
