//! PitchReel Core Library
//!
//! Turns per-scene narration into a single voiceover track and a
//! frame-accurate timing table for the video renderer, with script checks,
//! synthesis, and an integrity manifest along the way.

pub mod assembler;
pub mod audio;
pub mod config;
pub mod error;
pub mod manifest;
pub mod phonemize;
pub mod pipeline;
pub mod scene;
pub mod script;
pub mod timeline;
pub mod tools;
pub mod tts;
pub mod validator;

pub use assembler::{AssemblySettings, AudioAssembler, ConcatPlan};
pub use config::{BuildConfig, CONFIG_FILE, DeployConfig, MetaConfig, SceneEntry};
pub use error::{PitchError, Result};
pub use manifest::{Manifest, generate_manifest};
pub use phonemize::EspeakPhonemizer;
pub use pipeline::{BuildEvent, BuildOptions, BuildPipeline, BuildReport, NarrateOptions, narrate};
pub use scene::{AudioSource, Scene};
pub use script::{DEFAULT_DELIMITER, parse_script};
pub use timeline::{FrameTimeline, Timeline, build_timeline};
pub use tools::{ProcessRunner, ToolPaths, ToolRunner};
pub use tts::{KokoroSynthesizer, SilenceSynthesizer, Synthesizer, VoiceCatalog};
pub use validator::{Issue, IssueKind, RequiredAction, analyze};
