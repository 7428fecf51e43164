use crate::common::error::{TranscodeError, TranscodeResult};
use dashmap::DashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Scratch storage for uploaded inputs and encoded outputs.
///
/// Every path handed out is registered as live until it is released, and the
/// sweeper never touches a live path. The sweep is still age-based and best
/// effort: files written by something other than this process are only
/// reclaimed once they are older than the configured max age.
#[derive(Clone)]
pub struct Workspace {
    root: PathBuf,
    live: Arc<DashSet<PathBuf>>,
    sequence: Arc<AtomicU64>,
}

impl Workspace {
    pub async fn new(root: impl Into<PathBuf>) -> TranscodeResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            TranscodeError::workspace(format!("Failed to create scratch dir {}", root.display()), e)
        })?;

        info!("✅ Scratch workspace ready at {}", root.display());

        Ok(Self {
            root,
            live: Arc::new(DashSet::new()),
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Token unique for the lifetime of the process: wall-clock millis, a
    /// sequence number and a random suffix.
    pub fn new_token(&self) -> String {
        let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}", millis, seq, &suffix[..8])
    }

    pub async fn materialize(&self, token: &str, bytes: &[u8]) -> TranscodeResult<PathBuf> {
        if bytes.is_empty() {
            return Err(TranscodeError::validation("Uploaded video is empty"));
        }

        let path = self.root.join(format!("input-{}.mp4", token));
        self.live.insert(path.clone());

        if let Err(e) = fs::write(&path, bytes).await {
            self.release(&path).await;
            return Err(TranscodeError::workspace("Failed to save uploaded video", e));
        }

        debug!("Saved {} byte input to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Output path for one rendition of a job. Labels that sanitize to the same
    /// name get a numeric suffix, so no two live outputs share a path.
    pub fn allocate_output_path(&self, token: &str, label: &str) -> PathBuf {
        let stem = format!("output-{}-{}", token, sanitize_label(label));
        let mut path = self.root.join(format!("{}.mp4", stem));
        let mut n = 1;
        while !self.live.insert(path.clone()) {
            path = self.root.join(format!("{}-{}.mp4", stem, n));
            n += 1;
        }
        path
    }

    /// Best-effort delete. A missing file is not an error; anything else is
    /// logged and swallowed.
    pub async fn release(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => debug!("Released {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clean up {}: {}", path.display(), e),
        }
        self.live.remove(path);
    }

    /// Synchronous variant for `Drop` impls.
    pub fn release_blocking(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Released {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clean up {}: {}", path.display(), e),
        }
        self.live.remove(path);
    }

    pub fn is_live(&self, path: &Path) -> bool {
        self.live.contains(path)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Deletes regular files older than `max_age` that no job currently owns.
    /// Returns the number of files removed.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Error during cleanup of {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error reading scratch dir entry: {}", e);
                    break;
                }
            };

            let path = entry.path();
            if self.is_live(&path) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Failed to stat {}: {}", path.display(), e);
                    continue;
                }
            };

            let age = match metadata.modified().map(|m| now.duration_since(m)) {
                Ok(Ok(age)) => age,
                _ => continue,
            };

            if age <= max_age {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    info!("Cleaned up old file: {}", path.display());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove old file {}: {}", path.display(), e),
            }
        }

        removed
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
