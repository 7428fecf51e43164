use super::model::{JobStatus, TranscodeOutcome, TranscodeRequest};
use crate::common::error::TranscodeResult;
use crate::infrastructure::storage::workspace::Workspace;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Work for a single client request. Owns every scratch path it allocates and
/// releases them when dropped, so no exit path can leak an artifact.
pub struct Job {
    token: String,
    workspace: Workspace,
    request: Option<TranscodeRequest>,
    outcomes: BTreeMap<String, TranscodeOutcome>,
    artifacts: Vec<PathBuf>,
}

impl Job {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            token: workspace.new_token(),
            workspace,
            request: None,
            outcomes: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn materialize(&mut self, bytes: &[u8]) -> TranscodeResult<PathBuf> {
        let path = self.workspace.materialize(&self.token, bytes).await?;
        self.artifacts.push(path.clone());
        Ok(path)
    }

    pub fn allocate_output(&mut self, label: &str) -> PathBuf {
        let path = self.workspace.allocate_output_path(&self.token, label);
        self.artifacts.push(path.clone());
        path
    }

    pub(crate) fn attach(&mut self, request: TranscodeRequest) -> &TranscodeRequest {
        self.request.insert(request)
    }

    /// Outcomes are write-once per label.
    pub(crate) fn record(&mut self, outcome: TranscodeOutcome) {
        self.outcomes.entry(outcome.label.clone()).or_insert(outcome);
    }

    pub fn outcomes(&self) -> &BTreeMap<String, TranscodeOutcome> {
        &self.outcomes
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::derive(self.outcomes.values())
    }

    /// Deletes every artifact. A path leaves the list only after its delete
    /// finished, so a cancelled release leaves the rest to `Drop`.
    pub async fn release(mut self) {
        let count = self.artifacts.len();
        while let Some(path) = self.artifacts.last().cloned() {
            self.workspace.release(&path).await;
            self.artifacts.pop();
        }
        debug!("Job {} released {} artifacts", self.token, count);
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if self.artifacts.is_empty() {
            return;
        }
        for path in self.artifacts.drain(..) {
            self.workspace.release_blocking(&path);
        }
        debug!("Job {} released its artifacts on drop", self.token);
    }
}
