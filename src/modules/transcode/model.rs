use serde::Serialize;
use std::path::PathBuf;
use utoipa::ToSchema;

/// Encode parameters for one quality tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RenditionProfile {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Target video bitrate in kbit/s.
    pub video_bitrate_kbps: u32,
    pub max_rate_kbps: u32,
    pub buffer_size_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
}

impl RenditionProfile {
    /// Profile with the service's fixed codec policy (H.264 `fast`, CRF 22, AAC 128k).
    pub fn new(label: impl Into<String>, width: u32, height: u32, video_bitrate_kbps: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            video_bitrate_kbps,
            max_rate_kbps: video_bitrate_kbps + video_bitrate_kbps / 2,
            buffer_size_kbps: video_bitrate_kbps * 2,
            audio_bitrate_kbps: 128,
            video_codec: "libx264".to_string(),
            preset: "fast".to_string(),
            crf: 22,
            audio_codec: "aac".to_string(),
        }
    }
}

/// One input plus the distinct labels requested for it, in first-seen order.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    labels: Vec<String>,
}

impl TranscodeRequest {
    pub fn new<I, S>(input: PathBuf, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            input,
            labels: normalize_labels(labels),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Trims, drops empties and collapses duplicates, keeping the first occurrence.
pub fn normalize_labels<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let label = label.as_ref().trim();
        if !label.is_empty() && !out.iter().any(|l| l == label) {
            out.push(label.to_string());
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    InvalidLabel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutcome {
    pub label: String,
    pub status: OutcomeStatus,
    pub output: Option<PathBuf>,
    pub size: Option<u64>,
    pub error: Option<String>,
}

impl TranscodeOutcome {
    pub fn success(label: impl Into<String>, output: PathBuf, size: u64) -> Self {
        Self {
            label: label.into(),
            status: OutcomeStatus::Success,
            output: Some(output),
            size: Some(size),
            error: None,
        }
    }

    pub fn failed(label: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: OutcomeStatus::Failed,
            output: None,
            size: None,
            error: Some(error.into()),
        }
    }

    pub fn invalid_label(label: impl Into<String>) -> Self {
        let label = label.into();
        let error = format!("Unsupported resolution: {}", label);
        Self {
            label,
            status: OutcomeStatus::InvalidLabel,
            output: None,
            size: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Overall job status, always derived from the outcome set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Succeeded,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn derive<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a TranscodeOutcome>,
    {
        let (mut ok, mut not_ok) = (0usize, 0usize);
        for outcome in outcomes {
            if outcome.is_success() {
                ok += 1;
            } else {
                not_ok += 1;
            }
        }

        Self::from_counts(ok, not_ok)
    }

    pub fn from_counts(succeeded: usize, not_succeeded: usize) -> Self {
        match (succeeded, not_succeeded) {
            (0, _) => JobStatus::Failed,
            (_, 0) => JobStatus::Succeeded,
            _ => JobStatus::Partial,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Succeeded => "succeeded",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
        }
    }
}
