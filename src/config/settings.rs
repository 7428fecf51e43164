use crate::config::env::{self, EnvKey};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub scratch_dir: PathBuf,
    pub max_concurrent_transcodes: usize,
    pub max_upload_bytes: usize,
    pub sweep_interval_secs: u64,
    pub sweep_max_age_secs: u64,
    pub transcode_timeout_secs: u64,
    pub ffmpeg_bin: String,
    pub cors_origin: Option<String>,
    /// Raw `label=WIDTHxHEIGHT@KBPS` list; `None` keeps the built-in table.
    pub rendition_profiles: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 5000,
            scratch_dir: std::env::temp_dir().join("video-transcoder"),
            max_concurrent_transcodes: 2,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            sweep_interval_secs: 30 * 60,
            sweep_max_age_secs: 60 * 60,
            transcode_timeout_secs: 30 * 60,
            ffmpeg_bin: "ffmpeg".to_string(),
            cors_origin: None,
            rendition_profiles: None,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        let defaults = Self::default();

        Self {
            server_port: env::get_parsed(EnvKey::ServerPort, defaults.server_port),
            scratch_dir: env::get_opt(EnvKey::ScratchDir)
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            max_concurrent_transcodes: env::get_parsed(
                EnvKey::MaxConcurrentTranscodes,
                defaults.max_concurrent_transcodes,
            )
            .max(1),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, defaults.max_upload_bytes),
            sweep_interval_secs: env::get_parsed(EnvKey::SweepIntervalSecs, defaults.sweep_interval_secs)
                .max(1),
            sweep_max_age_secs: env::get_parsed(EnvKey::SweepMaxAgeSecs, defaults.sweep_max_age_secs),
            transcode_timeout_secs: env::get_parsed(
                EnvKey::TranscodeTimeoutSecs,
                defaults.transcode_timeout_secs,
            ),
            ffmpeg_bin: env::get_or(EnvKey::FfmpegBin, &defaults.ffmpeg_bin),
            cors_origin: env::get_opt(EnvKey::CorsOrigin),
            rendition_profiles: env::get_opt(EnvKey::RenditionProfiles),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_secs(self.sweep_max_age_secs)
    }

    /// Zero disables the per-invocation timeout.
    pub fn transcode_timeout(&self) -> Option<Duration> {
        (self.transcode_timeout_secs > 0).then(|| Duration::from_secs(self.transcode_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_policy() {
        let config = AppConfig::default();
        assert_eq!(config.server_port, 5000);
        assert_eq!(config.max_concurrent_transcodes, 2);
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1800));
        assert_eq!(config.sweep_max_age(), Duration::from_secs(3600));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config = AppConfig {
            transcode_timeout_secs: 0,
            ..AppConfig::default()
        };
        assert!(config.transcode_timeout().is_none());
    }
}
