use super::model::{JobStatus, RenditionProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

pub const MP4_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Deserialize, IntoParams)]
pub struct SingleQuery {
    /// Target rendition label, defaults to `720p`.
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MultiQuery {
    /// Comma-separated rendition labels, e.g. `720p,1080p`.
    pub resolutions: Option<String>,
}

/// One key of a bundle response.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum BundleEntry {
    Encoded {
        /// Base64 (standard alphabet, padded) encoded MP4 bytes.
        data: String,
        size: u64,
        #[serde(rename = "type")]
        content_type: String,
    },
    Error {
        error: String,
    },
}

impl BundleEntry {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_encoded(&self) -> bool {
        matches!(self, Self::Encoded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleResponse {
    pub status: JobStatus,
    pub entries: BTreeMap<String, BundleEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RenditionListResponse {
    pub renditions: Vec<RenditionProfile>,
    pub max_concurrent_transcodes: usize,
}
