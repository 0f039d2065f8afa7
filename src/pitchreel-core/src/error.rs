//! Error types for the build pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PitchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Frozen asset missing: {}", .0.display())]
    FrozenAssetMissing(PathBuf),

    #[error("Frozen asset modified: {} (expected sha256 {expected}, found {actual})", .path.display())]
    FrozenAssetModified {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Scene '{scene_id}': audio missing at {}", .path.display())]
    MissingAsset { scene_id: String, path: PathBuf },

    #[error("Scene '{scene_id}' has no measured duration; synthesize or load its audio first")]
    MissingDuration { scene_id: String },

    #[error("Scene '{scene_id}' already has a measured duration")]
    DurationAlreadyMeasured { scene_id: String },

    #[error("Cannot build a timeline from an empty scene list")]
    EmptyInput,

    #[error("Duplicate scene id: {0}")]
    DuplicateSceneId(String),

    #[error("Invalid scene '{scene_id}': {reason}")]
    InvalidScene { scene_id: String, reason: String },

    #[error("Scene '{scene_id}': {detail}")]
    AudioFormat { scene_id: String, detail: String },

    #[error("{tool} exited with {status}\n{stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("{tool} did not finish within {timeout:?}")]
    ExternalToolTimeout { tool: String, timeout: Duration },

    #[error("{tool} is not available: {detail}")]
    ExternalToolUnavailable { tool: String, detail: String },

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Unknown voice '{voice}'. Available voices:\n{available}")]
    UnknownVoice { voice: String, available: String },

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PitchError>;
