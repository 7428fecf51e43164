use super::assembler::{self, SingleStream};
use super::dto::{BundleResponse, RenditionListResponse};
use super::job::Job;
use super::model::{normalize_labels, TranscodeRequest};
use crate::common::error::{TranscodeError, TranscodeResult};
use crate::state::AppState;
use bytes::Bytes;
use tracing::info;

pub const DEFAULT_RESOLUTION: &str = "720p";

pub struct TranscodeService;

impl TranscodeService {
    /// One rendition, streamed back. Unknown labels are rejected before any
    /// scratch file is written.
    pub async fn transcode_single(
        state: AppState,
        input: Bytes,
        label: &str,
    ) -> TranscodeResult<SingleStream> {
        if input.is_empty() {
            return Err(TranscodeError::validation("Uploaded video is empty"));
        }

        let labels = normalize_labels([label]);
        let Some(label) = labels.first() else {
            return Err(TranscodeError::validation("No resolution requested"));
        };
        if state.scheduler.table().lookup(label).is_none() {
            return Err(TranscodeError::validation(format!(
                "Unsupported resolution: {}. Supported: {}",
                label,
                state.scheduler.table().labels().join(", ")
            )));
        }

        let mut job = Job::new(state.workspace.clone());
        let input_path = job.materialize(&input).await?;
        info!("Saved input file to: {}", input_path.display());

        state
            .scheduler
            .run(&mut job, TranscodeRequest::new(input_path, labels))
            .await;

        assembler::assemble_single(job).await
    }

    /// Every requested rendition, returned as one keyed bundle. An empty label
    /// list means every configured rendition.
    pub async fn transcode_multi(
        state: AppState,
        input: Bytes,
        labels: Vec<String>,
    ) -> TranscodeResult<BundleResponse> {
        if input.is_empty() {
            return Err(TranscodeError::validation("Uploaded video is empty"));
        }

        let mut labels = normalize_labels(labels);
        if labels.is_empty() {
            labels = normalize_labels(state.scheduler.table().labels());
        }

        let mut job = Job::new(state.workspace.clone());
        let input_path = job.materialize(&input).await?;
        info!("Saved input file to: {}", input_path.display());

        state
            .scheduler
            .run(&mut job, TranscodeRequest::new(input_path, labels))
            .await;

        Ok(assembler::assemble_bundle(job).await)
    }

    pub fn renditions(state: &AppState) -> RenditionListResponse {
        RenditionListResponse {
            renditions: state.scheduler.table().profiles().to_vec(),
            max_concurrent_transcodes: state.scheduler.max_concurrency(),
        }
    }
}
