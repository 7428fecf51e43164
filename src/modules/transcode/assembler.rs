use super::dto::{BundleEntry, BundleResponse, MP4_CONTENT_TYPE};
use super::job::Job;
use super::model::{JobStatus, OutcomeStatus, TranscodeOutcome};
use crate::common::error::{TranscodeError, TranscodeResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::Stream;
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// A finished rendition ready to be streamed. The job, and with it every
/// scratch file, is released once the stream ends or is dropped.
pub struct SingleStream {
    pub label: String,
    pub size: u64,
    stream: ArtifactStream,
}

impl SingleStream {
    pub fn into_stream(self) -> ArtifactStream {
        self.stream
    }
}

/// File body that releases its job once the last chunk is sent. Dropping the
/// stream early falls back to the job's synchronous cleanup.
pub struct ArtifactStream {
    inner: ReaderStream<File>,
    job: Option<Job>,
    releasing: Option<BoxFuture<'static, ()>>,
}

impl Stream for ArtifactStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(release) = self.releasing.as_mut() {
            ready!(release.as_mut().poll(cx));
            self.releasing = None;
            return Poll::Ready(None);
        }

        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(None) = polled {
            if let Some(job) = self.job.take() {
                debug!("Stream for job {} fully consumed", job.token());
                let mut release = job.release().boxed();
                if release.as_mut().poll(cx).is_pending() {
                    self.releasing = Some(release);
                    return Poll::Pending;
                }
            }
        }
        polled
    }
}

/// Single-stream mode: the job must hold exactly one outcome.
pub async fn assemble_single(job: Job) -> TranscodeResult<SingleStream> {
    let first = job.outcomes().values().next().cloned();
    let Some(outcome) = first else {
        job.release().await;
        return Err(TranscodeError::validation("No resolution requested"));
    };

    let path = match (outcome.status, outcome.output.as_ref()) {
        (OutcomeStatus::Success, Some(path)) => path.clone(),
        (OutcomeStatus::InvalidLabel, _) => {
            job.release().await;
            return Err(TranscodeError::Validation(error_text(&outcome)));
        }
        _ => {
            job.release().await;
            return Err(TranscodeError::Engine(error_text(&outcome)));
        }
    };

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            job.release().await;
            return Err(TranscodeError::Assembly(format!(
                "cannot open {} output: {}",
                outcome.label, e
            )));
        }
    };

    Ok(SingleStream {
        label: outcome.label,
        size: outcome.size.unwrap_or_default(),
        stream: ArtifactStream {
            inner: ReaderStream::new(file),
            job: Some(job),
            releasing: None,
        },
    })
}

/// Bundle mode: reads every successful output into memory, so the response
/// is bounded by the total size of the renditions. Releases the job.
pub async fn assemble_bundle(job: Job) -> BundleResponse {
    let mut entries = BTreeMap::new();

    for (label, outcome) in job.outcomes() {
        entries.insert(label.clone(), encode_entry(outcome).await);
    }

    let encoded = entries.values().filter(|e| e.is_encoded()).count();
    let status = JobStatus::from_counts(encoded, entries.len() - encoded);

    job.release().await;

    BundleResponse { status, entries }
}

async fn encode_entry(outcome: &TranscodeOutcome) -> BundleEntry {
    let (OutcomeStatus::Success, Some(path)) = (outcome.status, outcome.output.as_ref()) else {
        return BundleEntry::error(error_text(outcome));
    };

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read back {} output: {}", outcome.label, e);
            return BundleEntry::error(format!("Failed to read transcoded output: {}", e));
        }
    };

    let size = bytes.len() as u64;
    if let Some(expected) = outcome.size {
        if expected != size {
            warn!(
                "Output for {} changed size after encoding ({} != {})",
                outcome.label, size, expected
            );
            return BundleEntry::error(format!(
                "Transcoded output size mismatch: expected {} bytes, read {}",
                expected, size
            ));
        }
    }

    BundleEntry::Encoded {
        data: STANDARD.encode(&bytes),
        size,
        content_type: MP4_CONTENT_TYPE.to_string(),
    }
}

fn error_text(outcome: &TranscodeOutcome) -> String {
    outcome
        .error
        .clone()
        .unwrap_or_else(|| format!("Transcoding failed for {}", outcome.label))
}
