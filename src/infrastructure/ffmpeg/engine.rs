use crate::common::error::EngineError;
use crate::modules::transcode::events::{EngineProgress, EventSender, TranscodeEvent};
use crate::modules::transcode::model::RenditionProfile;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

const STDERR_TAIL_LINES: usize = 20;

/// External codec engine. One call is one process run for one rendition.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        profile: &RenditionProfile,
        output: &Path,
        events: &EventSender,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    program: String,
    timeout: Option<Duration>,
}

impl FfmpegEngine {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Resolved binary location, if it is on `PATH`.
    pub fn locate(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn transcode(
        &self,
        input: &Path,
        profile: &RenditionProfile,
        output: &Path,
        events: &EventSender,
    ) -> Result<(), EngineError> {
        let args = build_args(input, profile, output);
        let command_line = format!("{} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let _ = events.send(TranscodeEvent::Started {
            label: profile.label.clone(),
            command: command_line,
        });

        let duration_ms = Arc::new(AtomicU64::new(0));

        let stderr_task = child.stderr.take().map(|stderr| {
            let duration_ms = Arc::clone(&duration_ms);
            tokio::spawn(async move {
                let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(ms) = parse_duration_line(&line) {
                        duration_ms.store(ms, Ordering::Relaxed);
                    }
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        let progress_task = child.stdout.take().map(|stdout| {
            let duration_ms = Arc::clone(&duration_ms);
            let events = events.clone();
            let label = profile.label.clone();
            tokio::spawn(async move {
                let mut current = EngineProgress::default();
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if parse_progress_line(&line, &mut current) {
                        let total = duration_ms.load(Ordering::Relaxed);
                        if total > 0 {
                            let percent = current.out_time_ms as f64 * 100.0 / total as f64;
                            current.percent = Some(percent.clamp(0.0, 100.0));
                        }
                        let _ = events.send(TranscodeEvent::Progress {
                            label: label.clone(),
                            progress: current.clone(),
                        });
                    }
                }
            })
        });

        let status = match self.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(
                            "ffmpeg for {} timed out after {:?}, killing process",
                            profile.label, limit
                        );
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill ffmpeg: {}", e);
                        }
                        return Err(EngineError::Timeout(limit));
                    }
                }
            }
            None => child.wait().await?,
        };

        if let Some(task) = progress_task {
            let _ = task.await;
        }
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(EngineError::Exit {
                code: status.code(),
                stderr,
            });
        }

        debug!("ffmpeg finished {} -> {}", profile.label, output.display());
        Ok(())
    }
}

/// Arguments for one rendition. Codec settings come from the profile and are
/// never taken from the client.
pub fn build_args(input: &Path, profile: &RenditionProfile, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vf".to_string(),
        format!("scale={}:{}", profile.width, profile.height),
        "-c:v".to_string(),
        profile.video_codec.clone(),
        "-preset".to_string(),
        profile.preset.clone(),
        "-crf".to_string(),
        profile.crf.to_string(),
        "-b:v".to_string(),
        format!("{}k", profile.video_bitrate_kbps),
        "-maxrate".to_string(),
        format!("{}k", profile.max_rate_kbps),
        "-bufsize".to_string(),
        format!("{}k", profile.buffer_size_kbps),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        profile.audio_codec.clone(),
        "-b:a".to_string(),
        format!("{}k", profile.audio_bitrate_kbps),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// Parses `Duration: 00:01:02.50, start: ...` from the banner into milliseconds.
fn parse_duration_line(line: &str) -> Option<u64> {
    let rest = line.trim().strip_prefix("Duration:")?;
    let stamp = rest.split(',').next()?.trim();
    parse_timestamp_ms(stamp)
}

fn parse_timestamp_ms(stamp: &str) -> Option<u64> {
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(((hours * 3600.0 + minutes * 60.0 + seconds) * 1000.0).round() as u64)
}

/// Folds one `-progress` line into `current`. Returns true at the end of a block.
fn parse_progress_line(line: &str, current: &mut EngineProgress) -> bool {
    let Some((key, value)) = line.trim().split_once('=') else {
        return false;
    };

    match key {
        // ffmpeg reports out_time_ms in microseconds as well.
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<u64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "speed" => {
            current.speed = value.strip_suffix('x').and_then(|s| s.trim().parse().ok());
        }
        "progress" => return true,
        _ => {}
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::transcode::events;

    fn profile() -> RenditionProfile {
        RenditionProfile::new("360p", 640, 360, 800)
    }

    #[test]
    fn args_follow_profile() {
        let args = build_args(Path::new("/s/in.mp4"), &profile(), Path::new("/s/out.mp4"));

        let after = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(after("-i"), "/s/in.mp4");
        assert_eq!(after("-vf"), "scale=640:360");
        assert_eq!(after("-c:v"), "libx264");
        assert_eq!(after("-b:v"), "800k");
        assert_eq!(after("-progress"), "pipe:1");
        assert_eq!(args.last().unwrap(), "/s/out.mp4");
    }

    #[test]
    fn parses_banner_duration() {
        assert_eq!(
            parse_duration_line("  Duration: 00:01:02.50, start: 0.000000, bitrate: 1205 kb/s"),
            Some(62_500)
        );
        assert_eq!(parse_duration_line("Stream #0:0: Video: h264"), None);
        assert_eq!(parse_duration_line("  Duration: N/A, bitrate: N/A"), None);
    }

    #[test]
    fn parses_progress_blocks() {
        let mut current = EngineProgress::default();

        assert!(!parse_progress_line("frame=120", &mut current));
        assert!(!parse_progress_line("out_time_us=5000000", &mut current));
        assert!(!parse_progress_line("speed=1.5x", &mut current));
        assert!(parse_progress_line("progress=continue", &mut current));

        assert_eq!(current.out_time_ms, 5000);
        assert_eq!(current.speed, Some(1.5));

        parse_progress_line("speed=N/A", &mut current);
        assert_eq!(current.speed, None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let engine = FfmpegEngine::new("definitely-not-a-real-ffmpeg-binary", None);
        let (tx, _rx) = events::channel();

        let err = engine
            .transcode(Path::new("in.mp4"), &profile(), Path::new("out.mp4"), &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Spawn { .. }));
        assert!(engine.locate().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let engine = FfmpegEngine::new("false", Some(Duration::from_secs(10)));
        let (tx, mut rx) = events::channel();

        let err = engine
            .transcode(Path::new("in.mp4"), &profile(), Path::new("out.mp4"), &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Exit { code: Some(1), .. }));
        assert!(matches!(rx.recv().await, Some(TranscodeEvent::Started { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_process_is_killed_on_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hung-ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let limit = Duration::from_millis(200);
        let engine = FfmpegEngine::new(script.to_string_lossy(), Some(limit));
        let (tx, _rx) = events::channel();

        let started = std::time::Instant::now();
        let err = engine
            .transcode(Path::new("in.mp4"), &profile(), Path::new("out.mp4"), &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Timeout(d) if d == limit));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
