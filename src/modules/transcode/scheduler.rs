use super::events::{self, EventReceiver, TranscodeEvent};
use super::invoker::TranscodeInvoker;
use super::job::Job;
use super::model::{TranscodeOutcome, TranscodeRequest};
use super::profiles::RenditionTable;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Runs the renditions of a job with a process-wide cap on concurrent engine
/// invocations. Clones share the same permits.
#[derive(Clone)]
pub struct JobScheduler {
    table: RenditionTable,
    invoker: TranscodeInvoker,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    active: Arc<AtomicUsize>,
}

impl JobScheduler {
    pub fn new(table: RenditionTable, invoker: TranscodeInvoker, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            table,
            invoker,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn table(&self) -> &RenditionTable {
        &self.table
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn active_invocations(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Transcodes every requested rendition and waits for all of them. A failed
    /// rendition never cancels its siblings; unknown labels are recorded
    /// without taking a slot.
    pub async fn run<'j>(
        &self,
        job: &'j mut Job,
        request: TranscodeRequest,
    ) -> &'j BTreeMap<String, TranscodeOutcome> {
        let token = job.token().to_string();
        let request = job.attach(request);
        let input = request.input.clone();
        let labels = request.labels().to_vec();

        info!("Job {} requested renditions {:?}", token, labels);

        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();

        for label in labels {
            let Some(profile) = self.table.lookup(&label).cloned() else {
                warn!("Job {} requested unsupported rendition {}", token, label);
                job.record(TranscodeOutcome::invalid_label(label));
                continue;
            };

            let output = job.allocate_output(&label);
            let input = input.clone();
            let invoker = self.invoker.clone();
            let permits = Arc::clone(&self.permits);
            let active = Arc::clone(&self.active);
            let span = info_span!("transcode", job = %token, rendition = %label);

            let handle = tasks.spawn(
                async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return TranscodeOutcome::failed(
                                profile.label.clone(),
                                "transcode pool is shut down",
                            );
                        }
                    };
                    let _active = ActiveGuard::enter(active);

                    let (tx, rx) = events::channel();
                    let drain = tokio::spawn(log_events(rx).in_current_span());
                    let outcome = invoker.invoke(&input, &profile, &output, &tx).await;
                    drop(tx);
                    let _ = drain.await;

                    outcome
                }
                .instrument(span),
            );
            pending.insert(handle.id(), label);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    pending.remove(&id);
                    job.record(outcome);
                }
                Err(e) => {
                    let label = pending.remove(&e.id()).unwrap_or_default();
                    error!("Transcode task for {} aborted: {}", label, e);
                    job.record(TranscodeOutcome::failed(label, format!("transcode task aborted: {}", e)));
                }
            }
        }

        info!("Job {} finished with status {}", token, job.status().as_str());
        job.outcomes()
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn log_events(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            TranscodeEvent::Started { label, command } => {
                info!("Starting transcoding for {}: {}", label, command)
            }
            TranscodeEvent::Progress { label, progress } => match progress.percent {
                Some(percent) => debug!("Progress for {}: {:.1}%", label, percent),
                None => debug!("Progress for {}: {} ms encoded", label, progress.out_time_ms),
            },
            TranscodeEvent::Completed { label, size } => {
                info!("Transcoding finished for {} ({} bytes)", label, size)
            }
            TranscodeEvent::Failed { label, error } => {
                error!("Transcoding error for {}: {}", label, error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::EngineError;
    use crate::infrastructure::ffmpeg::engine::TranscodeEngine;
    use crate::infrastructure::storage::workspace::Workspace;
    use crate::modules::transcode::events::EventSender;
    use crate::modules::transcode::model::{JobStatus, OutcomeStatus, RenditionProfile};
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeEngine {
        fail: Vec<&'static str>,
        panic_on: Option<&'static str>,
        calls: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
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
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on == Some(profile.label.as_str()) {
                panic!("engine blew up");
            }
            if self.fail.contains(&profile.label.as_str()) {
                return Err(EngineError::Exit {
                    code: Some(1),
                    stderr: format!("cannot encode {}", profile.label),
                });
            }
            tokio::fs::write(output, profile.label.as_bytes()).await?;
            Ok(())
        }
    }

    async fn setup(engine: Arc<FakeEngine>, bound: usize) -> (tempfile::TempDir, Workspace, JobScheduler) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path()).await.unwrap();
        let scheduler = JobScheduler::new(RenditionTable::default(), TranscodeInvoker::new(engine), bound);
        (dir, ws, scheduler)
    }

    async fn run(ws: &Workspace, scheduler: &JobScheduler, labels: &[&str]) -> Job {
        let mut job = Job::new(ws.clone());
        let input = job.materialize(b"source").await.unwrap();
        scheduler.run(&mut job, TranscodeRequest::new(input, labels)).await;
        job
    }

    #[tokio::test]
    async fn one_outcome_per_distinct_label() {
        let engine = Arc::new(FakeEngine::default());
        let (_dir, ws, scheduler) = setup(engine.clone(), 2).await;

        let job = run(&ws, &scheduler, &["720p", "1080p", "720p", "bogus"]).await;

        let keys: Vec<&str> = job.outcomes().keys().map(String::as_str).collect();
        assert_eq!(keys, ["1080p", "720p", "bogus"]);
        assert_eq!(job.outcomes()["bogus"].status, OutcomeStatus::InvalidLabel);
        assert_eq!(job.outcomes()["720p"].size, Some(4));
        assert_eq!(job.status(), JobStatus::Partial);
        // invalid labels never reach the engine
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
        job.release().await;
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_bound() {
        let engine = Arc::new(FakeEngine::default());
        let (_dir, ws, scheduler) = setup(engine.clone(), 2).await;

        let job = run(&ws, &scheduler, &["360p", "480p", "720p", "1080p"]).await;

        assert_eq!(job.status(), JobStatus::Succeeded);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 4);
        assert_eq!(engine.peak.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.active_invocations(), 0);
        job.release().await;
    }

    #[tokio::test]
    async fn colliding_labels_write_separate_outputs() {
        let engine = Arc::new(FakeEngine::default());
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path()).await.unwrap();
        let table = RenditionTable::new(vec![
            RenditionProfile::new("hd.1", 640, 360, 800),
            RenditionProfile::new("hd_1", 1280, 720, 2800),
        ]);
        let scheduler = JobScheduler::new(table, TranscodeInvoker::new(engine), 2);

        let job = run(&ws, &scheduler, &["hd.1", "hd_1"]).await;

        let dotted = job.outcomes()["hd.1"].output.clone().unwrap();
        let underscored = job.outcomes()["hd_1"].output.clone().unwrap();
        assert_ne!(dotted, underscored);
        assert_eq!(std::fs::read(&dotted).unwrap(), b"hd.1");
        assert_eq!(std::fs::read(&underscored).unwrap(), b"hd_1");
        assert_eq!(job.status(), JobStatus::Succeeded);
        job.release().await;
        assert_eq!(ws.live_count(), 0);
    }

    #[tokio::test]
    async fn bound_is_shared_across_jobs() {
        let engine = Arc::new(FakeEngine::default());
        let (_dir, ws, scheduler) = setup(engine.clone(), 1).await;

        let (a, b) = tokio::join!(
            run(&ws, &scheduler, &["360p", "720p"]),
            run(&ws, &scheduler, &["480p", "1080p"]),
        );

        assert_eq!(engine.peak.load(Ordering::SeqCst), 1);
        assert_eq!(a.status(), JobStatus::Succeeded);
        assert_eq!(b.status(), JobStatus::Succeeded);
        a.release().await;
        b.release().await;
        assert_eq!(ws.live_count(), 0);
    }

    #[tokio::test]
    async fn failure_does_not_cancel_siblings() {
        let engine = Arc::new(FakeEngine {
            fail: vec!["1080p"],
            ..FakeEngine::default()
        });
        let (_dir, ws, scheduler) = setup(engine, 2).await;

        let job = run(&ws, &scheduler, &["720p", "1080p"]).await;

        assert!(job.outcomes()["720p"].is_success());
        let failed = &job.outcomes()["1080p"];
        assert_eq!(failed.status, OutcomeStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("cannot encode 1080p"));
        assert_eq!(job.status(), JobStatus::Partial);
        job.release().await;
    }

    #[tokio::test]
    async fn panicking_unit_becomes_failed_outcome() {
        let engine = Arc::new(FakeEngine {
            panic_on: Some("360p"),
            ..FakeEngine::default()
        });
        let (_dir, ws, scheduler) = setup(engine, 2).await;

        let job = run(&ws, &scheduler, &["360p", "720p"]).await;

        assert_eq!(job.outcomes().len(), 2);
        assert_eq!(job.outcomes()["360p"].status, OutcomeStatus::Failed);
        assert!(job.outcomes()["720p"].is_success());
        assert_eq!(scheduler.active_invocations(), 0);
        job.release().await;
    }

    #[tokio::test]
    async fn single_failure_is_failed_not_partial() {
        let engine = Arc::new(FakeEngine {
            fail: vec!["360p"],
            ..FakeEngine::default()
        });
        let (_dir, ws, scheduler) = setup(engine, 2).await;

        let job = run(&ws, &scheduler, &["360p"]).await;

        assert_eq!(job.status(), JobStatus::Failed);
        job.release().await;
    }
}
