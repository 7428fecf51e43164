use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    ScratchDir,
    MaxConcurrentTranscodes,
    MaxUploadBytes,
    SweepIntervalSecs,
    SweepMaxAgeSecs,
    TranscodeTimeoutSecs,
    FfmpegBin,
    CorsOrigin,
    RenditionProfiles,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::ScratchDir => "SCRATCH_DIR",
            EnvKey::MaxConcurrentTranscodes => "MAX_CONCURRENT_TRANSCODES",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::SweepIntervalSecs => "SWEEP_INTERVAL_SECS",
            EnvKey::SweepMaxAgeSecs => "SWEEP_MAX_AGE_SECS",
            EnvKey::TranscodeTimeoutSecs => "TRANSCODE_TIMEOUT_SECS",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::CorsOrigin => "CORS_ORIGIN",
            EnvKey::RenditionProfiles => "RENDITION_PROFILES",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    get(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
