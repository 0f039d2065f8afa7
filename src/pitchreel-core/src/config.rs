//! Build configuration loaded from `scenes.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PitchError, Result};
use crate::manifest::sha256_file;
use crate::scene::{AudioSource, DEFAULT_VOICE, Scene};

/// Conventional configuration file name.
pub const CONFIG_FILE: &str = "scenes.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Paths that must exist (and optionally match a hash) before a build.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frozen_assets: Vec<FrozenAsset>,
    pub meta: MetaConfig,
    #[serde(default)]
    pub scenes: Vec<SceneEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

/// Build-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    #[serde(default = "default_project")]
    pub project: String,
    pub version: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_fade_frames")]
    pub fade_frames: u32,
    #[serde(default = "default_gap")]
    pub scene_gap_seconds: f64,
    #[serde(default)]
    pub volume_boost_db: f64,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    /// Where outputs are written; defaults to the configuration directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_seconds: u64,
    /// Voice for scenes generated from this configuration.
    #[serde(default = "default_voice")]
    pub voice: String,
}

/// One scene of the build, in playback order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneEntry {
    pub id: String,
    pub file: PathBuf,
    pub component: String,
    #[serde(rename = "fadeIn", default = "default_true")]
    pub fade_in: bool,
    #[serde(rename = "fadeOut", default = "default_true")]
    pub fade_out: bool,
}

/// A frozen asset, either a bare path or a path pinned to a SHA-256.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FrozenAsset {
    Path(PathBuf),
    Pinned { path: PathBuf, sha256: String },
}

impl FrozenAsset {
    pub fn path(&self) -> &Path {
        match self {
            FrozenAsset::Path(path) => path,
            FrozenAsset::Pinned { path, .. } => path,
        }
    }
}

/// Where the renderer project lives and how to update it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub renderer_dir: PathBuf,
    #[serde(default = "default_audio_dest")]
    pub audio_dir: PathBuf,
    #[serde(default = "default_timing_dest")]
    pub timing_file: PathBuf,
    #[serde(default = "default_root_component")]
    pub root_component: PathBuf,
    #[serde(default = "default_composition")]
    pub composition: String,
}

fn default_project() -> String {
    "pitch".to_string()
}

fn default_sample_rate() -> u32 {
    24000
}

fn default_fps() -> u32 {
    30
}

fn default_fade_frames() -> u32 {
    15
}

fn default_gap() -> f64 {
    0.8
}

fn default_bitrate() -> String {
    "192k".to_string()
}

fn default_tool_timeout() -> u64 {
    300
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_audio_dest() -> PathBuf {
    PathBuf::from("public/voiceover")
}

fn default_timing_dest() -> PathBuf {
    PathBuf::from("src/timing.json")
}

fn default_root_component() -> PathBuf {
    PathBuf::from("src/Root.tsx")
}

fn default_composition() -> String {
    "Main".to_string()
}

impl MetaConfig {
    /// Settings for a fresh project, with the usual defaults.
    pub fn new(project: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            version: version.into(),
            sample_rate: default_sample_rate(),
            fps: default_fps(),
            fade_frames: default_fade_frames(),
            scene_gap_seconds: default_gap(),
            volume_boost_db: 0.0,
            bitrate: default_bitrate(),
            output_dir: None,
            tool_timeout_seconds: default_tool_timeout(),
            voice: default_voice(),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds)
    }
}

impl BuildConfig {
    /// Assemble a configuration in memory. Relative paths resolve against `base_dir`.
    pub fn new(meta: MetaConfig, scenes: Vec<SceneEntry>, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let config = Self {
            frozen_assets: Vec::new(),
            meta,
            scenes,
            deploy: None,
            base_dir: base_dir.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PitchError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::from_str(&content, base_dir)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: BuildConfig = toml::from_str(content)
            .map_err(|e| PitchError::Config(format!("Failed to parse config: {}", e)))?;
        config.base_dir = base_dir.into();
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PitchError::Config(format!("Failed to serialize config: {}", e)))
    }

    fn validate(&self) -> Result<()> {
        let meta = &self.meta;
        if meta.version.is_empty()
            || !meta
                .version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(PitchError::Config(format!(
                "meta.version must be non-empty and contain only letters, digits, '.', '_' or '-' (got {:?})",
                meta.version
            )));
        }
        if meta.sample_rate == 0 {
            return Err(PitchError::Config("meta.sample_rate must be > 0".to_string()));
        }
        if meta.fps == 0 {
            return Err(PitchError::Config("meta.fps must be > 0".to_string()));
        }
        if !meta.scene_gap_seconds.is_finite() || meta.scene_gap_seconds < 0.0 {
            return Err(PitchError::Config(format!(
                "meta.scene_gap_seconds must be >= 0, got {}",
                meta.scene_gap_seconds
            )));
        }
        if !meta.volume_boost_db.is_finite() {
            return Err(PitchError::Config("meta.volume_boost_db must be finite".to_string()));
        }
        if meta.tool_timeout_seconds == 0 {
            return Err(PitchError::Config("meta.tool_timeout_seconds must be > 0".to_string()));
        }

        let mut seen = HashSet::new();
        for entry in &self.scenes {
            if !seen.insert(entry.id.as_str()) {
                return Err(PitchError::DuplicateSceneId(entry.id.clone()));
            }
        }
        self.scenes()?;

        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a configured path against the configuration directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        match &self.meta.output_dir {
            Some(dir) => self.resolve(dir),
            None => self.base_dir.clone(),
        }
    }

    /// `full_voiceover_<version>.mp3`
    pub fn voiceover_filename(&self) -> String {
        format!("full_voiceover_{}.mp3", self.meta.version)
    }

    /// Build the ordered scene list. Durations are left unmeasured.
    pub fn scenes(&self) -> Result<Vec<Scene>> {
        self.scenes
            .iter()
            .map(|entry| {
                Ok(Scene::new(entry.id.clone(), "")?
                    .with_audio_source(AudioSource::File(self.resolve(&entry.file)))
                    .with_component(entry.component.clone())
                    .with_fades(entry.fade_in, entry.fade_out)
                    .with_voice(self.meta.voice.clone()))
            })
            .collect()
    }

    /// Check every frozen asset exists and, when pinned, still has its hash.
    pub fn verify_frozen_assets(&self) -> Result<()> {
        for asset in &self.frozen_assets {
            let path = self.resolve(asset.path());
            if !path.is_file() {
                return Err(PitchError::FrozenAssetMissing(asset.path().to_path_buf()));
            }
            if let FrozenAsset::Pinned { sha256, .. } = asset {
                let actual = sha256_file(&path)?;
                if !actual.eq_ignore_ascii_case(sha256) {
                    return Err(PitchError::FrozenAssetModified {
                        path: asset.path().to_path_buf(),
                        expected: sha256.clone(),
                        actual,
                    });
                }
            }
            info!(asset = %asset.path().display(), "frozen asset verified");
        }
        Ok(())
    }
}
