use crate::config::settings::AppConfig;
use crate::infrastructure::ffmpeg::engine::TranscodeEngine;
use crate::infrastructure::storage::workspace::Workspace;
use crate::modules::transcode::invoker::TranscodeInvoker;
use crate::modules::transcode::profiles::RenditionTable;
use crate::modules::transcode::scheduler::JobScheduler;
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub workspace: Workspace,
    pub scheduler: JobScheduler,
}

impl AppState {
    pub fn new(config: AppConfig, workspace: Workspace, scheduler: JobScheduler) -> Self {
        Self {
            config,
            workspace,
            scheduler,
        }
    }

    /// Wires workspace, profile table and scheduler around `engine`.
    pub async fn build(config: AppConfig, engine: Arc<dyn TranscodeEngine>) -> anyhow::Result<Self> {
        let table = RenditionTable::from_config(config.rendition_profiles.as_deref())
            .context("invalid RENDITION_PROFILES")?;
        let workspace = Workspace::new(config.scratch_dir.clone()).await?;
        let scheduler = JobScheduler::new(
            table,
            TranscodeInvoker::new(engine),
            config.max_concurrent_transcodes,
        );

        Ok(Self::new(config, workspace, scheduler))
    }
}
