use super::model::RenditionProfile;
use anyhow::{anyhow, bail, Result};
use std::sync::Arc;

/// Supported renditions, fixed at startup.
#[derive(Debug, Clone)]
pub struct RenditionTable {
    profiles: Arc<Vec<RenditionProfile>>,
}

impl Default for RenditionTable {
    fn default() -> Self {
        Self::new(vec![
            RenditionProfile::new("360p", 640, 360, 800),
            RenditionProfile::new("480p", 854, 480, 1400),
            RenditionProfile::new("720p", 1280, 720, 2800),
            RenditionProfile::new("1080p", 1920, 1080, 5000),
        ])
    }
}

impl RenditionTable {
    pub fn new(profiles: Vec<RenditionProfile>) -> Self {
        Self {
            profiles: Arc::new(profiles),
        }
    }

    /// Builds the table from an optional `label=WIDTHxHEIGHT@KBPS,...` string,
    /// falling back to the built-in tiers.
    pub fn from_config(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut profiles: Vec<RenditionProfile> = Vec::new();

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let profile = parse_entry(entry)?;
            if profiles.iter().any(|p| p.label == profile.label) {
                bail!("duplicate rendition label '{}'", profile.label);
            }
            profiles.push(profile);
        }

        if profiles.is_empty() {
            bail!("rendition profile list is empty");
        }

        Ok(Self::new(profiles))
    }

    pub fn lookup(&self, label: &str) -> Option<&RenditionProfile> {
        self.profiles.iter().find(|p| p.label == label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.label.as_str()).collect()
    }

    pub fn profiles(&self) -> &[RenditionProfile] {
        &self.profiles
    }
}

fn parse_entry(entry: &str) -> Result<RenditionProfile> {
    let err = || anyhow!("invalid rendition profile '{}', expected label=WIDTHxHEIGHT@KBPS", entry);

    let (label, shape) = entry.split_once('=').ok_or_else(err)?;
    let (size, bitrate) = shape.split_once('@').ok_or_else(err)?;
    let (width, height) = size.split_once('x').ok_or_else(err)?;

    let label = label.trim();
    if label.is_empty() {
        return Err(err());
    }
    // Labels end up in scratch file names.
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        bail!(
            "invalid rendition label '{}', only ASCII letters, digits, '-' and '_' are allowed",
            label
        );
    }

    let width: u32 = width.trim().parse().map_err(|_| err())?;
    let height: u32 = height.trim().parse().map_err(|_| err())?;
    let bitrate: u32 = bitrate
        .trim()
        .trim_end_matches(['k', 'K'])
        .parse()
        .map_err(|_| err())?;

    // libx264 with yuv420p needs even dimensions.
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 || bitrate == 0 {
        return Err(err());
    }

    Ok(RenditionProfile::new(label, width, height, bitrate))
}
