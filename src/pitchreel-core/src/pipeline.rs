//! Build orchestration.
//!
//! Runs the stages of a build in order: frozen asset check, duration
//! measurement, timeline, voiceover assembly, timing artifacts, manifest,
//! and optionally deploy and render. Any failure stops the build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::assembler::{AssemblySettings, AudioAssembler};
use crate::audio;
use crate::config::{BuildConfig, CONFIG_FILE, DeployConfig, MetaConfig, SceneEntry};
use crate::error::{PitchError, Result};
use crate::manifest::generate_manifest;
use crate::scene::{AudioSource, Scene};
use crate::script::parse_script;
use crate::timeline::{FrameTimeline, build_timeline};
use crate::tools::{ToolInvocation, ToolPaths, ToolRunner};
use crate::tts::{Synthesizer, synthesize_scene};
use crate::validator::{self, Issue};

pub const TIMING_JSON: &str = "TIMING.json";
pub const TIMING_JS: &str = "TIMING.js";

/// Callback for build events.
pub type BuildCallback = Box<dyn Fn(BuildEvent) + Send + Sync>;

/// Events emitted during a build.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// A stage is starting.
    StageStart { name: String, detail: String },
    /// A scene's audio was measured.
    SceneMeasured { id: String, seconds: f64 },
    /// A scene was synthesized from script text.
    SceneSynthesized { id: String, path: PathBuf, seconds: f64 },
    /// The validator flagged something in a scene.
    ScriptIssue { scene_id: String, issue: Issue },
    /// A file was written.
    Artifact { label: String, path: PathBuf },
    /// The build has finished.
    BuildEnd { total_seconds: f64, total_frames: u64 },
}

/// Optional stages of a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub deploy: bool,
    pub render: bool,
}

impl BuildOptions {
    fn check(&self, config: &BuildConfig) -> Result<()> {
        if self.render && !self.deploy {
            return Err(PitchError::Usage("--render requires --deploy".to_string()));
        }
        if self.deploy && config.deploy.is_none() {
            return Err(PitchError::Config(
                "--deploy needs a [deploy] section in the configuration".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where a deploy put things.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployReport {
    pub audio: PathBuf,
    pub timing: PathBuf,
    pub root_component: PathBuf,
}

/// Everything a build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub voiceover: PathBuf,
    pub timing_json: PathBuf,
    pub timing_js: PathBuf,
    pub manifest: PathBuf,
    pub timeline: FrameTimeline,
    pub deployed: Option<DeployReport>,
    pub video: Option<PathBuf>,
}

/// Runs a build for one configuration.
pub struct BuildPipeline {
    config: BuildConfig,
    runner: Arc<dyn ToolRunner>,
    tools: ToolPaths,
    /// Event callback.
    callback: Option<BuildCallback>,
}

impl BuildPipeline {
    pub fn new(config: BuildConfig, runner: Arc<dyn ToolRunner>, tools: ToolPaths) -> Self {
        Self {
            config,
            runner,
            tools,
            callback: None,
        }
    }

    /// Set a callback for build events.
    pub fn with_callback(mut self, callback: BuildCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run the full build.
    pub async fn run(&self, options: BuildOptions) -> Result<BuildReport> {
        options.check(&self.config)?;
        let meta = &self.config.meta;

        self.stage("Frozen assets", format!("{} pinned", self.config.frozen_assets.len()));
        self.config.verify_frozen_assets()?;

        self.stage("Measuring", format!("{} scenes", self.config.scenes.len()));
        let mut scenes = self.config.scenes()?;
        for scene in &mut scenes {
            self.measure(scene)?;
        }

        let settings = AssemblySettings {
            sample_rate: meta.sample_rate,
            gap_seconds: meta.scene_gap_seconds,
            volume_boost_db: meta.volume_boost_db,
            bitrate: meta.bitrate.clone(),
        };
        let timeline = build_timeline(&scenes, settings.effective_gap_seconds())?;

        let output_dir = self.config.output_dir();
        std::fs::create_dir_all(&output_dir)?;

        self.stage(
            "Voiceover",
            format!("{:.2}s, gap {:.2}s", timeline.total_duration, timeline.gap_seconds),
        );
        let voiceover = output_dir.join(self.config.voiceover_filename());
        AudioAssembler::new(self.runner.clone(), &self.tools.ffmpeg)
            .assemble(&scenes, &settings, &voiceover)
            .await?;
        self.artifact("Voiceover", &voiceover);

        self.stage("Timing", format!("{} fps, {} fade frames", meta.fps, meta.fade_frames));
        let frames = FrameTimeline::from_timeline(&timeline, meta.fps, meta.fade_frames, &meta.version)?;
        debug!(drift = frames.drift_frames(), "frame drift at last scene");

        let timing_json = output_dir.join(TIMING_JSON);
        std::fs::write(&timing_json, frames.to_json()?)?;
        self.artifact("Timing JSON", &timing_json);

        let timing_js = output_dir.join(TIMING_JS);
        std::fs::write(&timing_js, frames.to_js(CONFIG_FILE)?)?;
        self.artifact("Timing JS", &timing_js);

        let manifest = generate_manifest(&output_dir)?.write_to(&output_dir)?;
        self.artifact("Manifest", &manifest);

        let deploy_config = self.config.deploy.as_ref().filter(|_| options.deploy);

        let deployed = match deploy_config {
            Some(deploy) => {
                self.stage("Deploy", deploy.renderer_dir.display().to_string());
                Some(self.deploy(deploy, &voiceover, &timing_json, &frames)?)
            }
            None => None,
        };

        let video = match deploy_config.filter(|_| options.render) {
            Some(deploy) => {
                self.stage("Render", deploy.composition.clone());
                Some(self.render(deploy).await?)
            }
            None => None,
        };

        self.emit_event(BuildEvent::BuildEnd {
            total_seconds: frames.total_duration_seconds,
            total_frames: frames.total_frames,
        });
        info!(
            version = %meta.version,
            seconds = frames.total_duration_seconds,
            frames = frames.total_frames,
            "build complete"
        );

        Ok(BuildReport {
            voiceover,
            timing_json,
            timing_js,
            manifest,
            timeline: frames,
            deployed,
            video,
        })
    }

    /// Measure a file-backed scene and record its duration.
    fn measure(&self, scene: &mut Scene) -> Result<()> {
        let path = match scene.audio_source() {
            Some(AudioSource::File(path)) => path.clone(),
            _ => {
                return Err(PitchError::MissingAsset {
                    scene_id: scene.id().to_string(),
                    path: PathBuf::from(format!("{}.wav", scene.id())),
                });
            }
        };
        if !path.is_file() {
            return Err(PitchError::MissingAsset {
                scene_id: scene.id().to_string(),
                path,
            });
        }

        let seconds = audio::measure_wav(&path)?.duration_seconds();
        scene.record_duration(seconds)?;
        self.emit_event(BuildEvent::SceneMeasured {
            id: scene.id().to_string(),
            seconds,
        });
        Ok(())
    }

    fn deploy(
        &self,
        deploy: &DeployConfig,
        voiceover: &Path,
        timing_json: &Path,
        frames: &FrameTimeline,
    ) -> Result<DeployReport> {
        let renderer = self.config.resolve(&deploy.renderer_dir);

        let audio = renderer
            .join(&deploy.audio_dir)
            .join(self.config.voiceover_filename());
        copy_into_place(voiceover, &audio)?;
        self.artifact("Renderer audio", &audio);

        let timing = renderer.join(&deploy.timing_file);
        copy_into_place(timing_json, &timing)?;
        self.artifact("Renderer timing", &timing);

        let root_component = renderer.join(&deploy.root_component);
        let source = std::fs::read_to_string(&root_component).map_err(|e| {
            PitchError::Config(format!("Failed to read {}: {}", root_component.display(), e))
        })?;
        let updated = update_root_duration(&source, frames).ok_or_else(|| {
            PitchError::Config(format!(
                "no durationInFrames={{...}} found in {}",
                root_component.display()
            ))
        })?;
        std::fs::write(&root_component, updated)?;
        self.artifact("Root duration", &root_component);

        Ok(DeployReport {
            audio,
            timing,
            root_component,
        })
    }

    async fn render(&self, deploy: &DeployConfig) -> Result<PathBuf> {
        let renderer = self.config.resolve(&deploy.renderer_dir);
        let target = format!("out/{}-{}.mp4", self.config.meta.project, self.config.meta.version);

        let invocation = ToolInvocation::new(&self.tools.npx)
            .args(["remotion", "render"])
            .arg(&deploy.composition)
            .arg(&target)
            .args(["--concurrency=1", "--timeout=60000"])
            .current_dir(&renderer);
        self.runner.run(&invocation).await?;

        let video = renderer.join(target);
        self.artifact("Video", &video);
        Ok(video)
    }

    fn stage(&self, name: &str, detail: String) {
        info!(stage = name, %detail, "stage started");
        self.emit_event(BuildEvent::StageStart {
            name: name.to_string(),
            detail,
        });
    }

    fn artifact(&self, label: &str, path: &Path) {
        info!(artifact = label, path = %path.display(), "written");
        self.emit_event(BuildEvent::Artifact {
            label: label.to_string(),
            path: path.to_path_buf(),
        });
    }

    fn emit_event(&self, event: BuildEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Point the first `durationInFrames={...}` at the timeline's total.
///
/// Returns `None` when the source has no such attribute.
pub fn update_root_duration(source: &str, frames: &FrameTimeline) -> Option<String> {
    let pattern = Regex::new(r"durationInFrames=\{[^}]*\}").ok()?;
    if !pattern.is_match(source) {
        return None;
    }
    let replacement = format!("durationInFrames={{{}}}", frames.total_frames);
    Some(pattern.replacen(source, 1, replacement.as_str()).into_owned())
}

fn copy_into_place(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to)?;
    Ok(())
}

/// Settings for turning a raw script into a buildable project.
#[derive(Debug, Clone)]
pub struct NarrateOptions {
    pub delimiter: String,
    /// Where scene clips and `scenes.toml` are written.
    pub out_dir: PathBuf,
    pub meta: MetaConfig,
}

/// Parse, check and synthesize a script, then write `scenes.toml` for it.
///
/// Validator findings are advisory: they are reported, never fatal. The
/// returned configuration is loaded back from the written file.
pub fn narrate(
    script: &str,
    options: &NarrateOptions,
    synth: &mut dyn Synthesizer,
    on_event: &dyn Fn(BuildEvent),
) -> Result<BuildConfig> {
    let voice = synth.catalog().resolve(&options.meta.voice)?.to_string();

    let scenes = parse_script(script, &options.delimiter)?;
    if scenes.is_empty() {
        return Err(PitchError::EmptyInput);
    }

    on_event(BuildEvent::StageStart {
        name: "Script check".to_string(),
        detail: format!("{} scenes", scenes.len()),
    });
    for scene in &scenes {
        if scene.text().trim().is_empty() {
            return Err(PitchError::InvalidScene {
                scene_id: scene.id().to_string(),
                reason: "no narration text".to_string(),
            });
        }
        for issue in validator::analyze(scene.text()) {
            warn!(scene = scene.id(), kind = %issue.kind.display_name(), text = %issue.matched_text, "script issue");
            on_event(BuildEvent::ScriptIssue {
                scene_id: scene.id().to_string(),
                issue,
            });
        }
    }

    on_event(BuildEvent::StageStart {
        name: "Synthesis".to_string(),
        detail: format!("{} via {}", voice, synth.name()),
    });
    std::fs::create_dir_all(&options.out_dir)?;

    let mut entries = Vec::with_capacity(scenes.len());
    for scene in scenes {
        let mut scene = scene.with_voice(voice.clone());
        let path = synthesize_scene(synth, &mut scene, &options.out_dir)?;
        on_event(BuildEvent::SceneSynthesized {
            id: scene.id().to_string(),
            path: path.clone(),
            seconds: scene.duration_seconds().unwrap_or_default(),
        });

        entries.push(SceneEntry {
            id: scene.id().to_string(),
            file: PathBuf::from(format!("{}.wav", scene.id())),
            component: component_name(scene.id()),
            fade_in: true,
            fade_out: true,
        });
    }

    let mut meta = options.meta.clone();
    meta.sample_rate = synth.sample_rate();
    meta.voice = voice;

    let config = BuildConfig::new(meta, entries, &options.out_dir)?;
    let config_path = options.out_dir.join(CONFIG_FILE);
    std::fs::write(&config_path, config.to_toml_string()?)?;
    on_event(BuildEvent::Artifact {
        label: "Configuration".to_string(),
        path: config_path.clone(),
    });

    BuildConfig::load(&config_path)
}

/// `hook` -> `HookScene`
fn component_name(id: &str) -> String {
    let mut name = String::with_capacity(id.len() + 5);
    let mut upper = true;
    for c in id.chars() {
        if c == '_' || c == '-' {
            upper = true;
        } else if upper {
            name.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name.push_str("Scene");
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fake::RecordingRunner;
    use crate::tts::SilenceSynthesizer;
    use std::sync::Mutex;

    const CONFIG: &str = r#"
[meta]
project = "lausd-pitch"
version = "v1.2"
fps = 30
fade_frames = 15
scene_gap_seconds = 0.5

[[scenes]]
id = "hook"
file = "hook.wav"
component = "HookScene"
fadeOut = true

[[scenes]]
id = "close"
file = "close.wav"
component = "CloseScene"
fadeOut = false

[deploy]
renderer_dir = "remotion"
"#;

    const ROOT_TSX: &str = r#"<Composition
  id="Main"
  component={Main}
  durationInFrames={Math.round(60.00 * 30)}
  fps={30}
/>
"#;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        audio::write_wav(dir.path().join("hook.wav"), &vec![0.0; 5 * 24000], 24000).unwrap();
        audio::write_wav(dir.path().join("close.wav"), &vec![0.0; 3 * 24000], 24000).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), CONFIG).unwrap();

        let remotion = dir.path().join("remotion/src");
        std::fs::create_dir_all(&remotion).unwrap();
        std::fs::write(remotion.join("Root.tsx"), ROOT_TSX).unwrap();
        dir
    }

    fn pipeline(dir: &Path, runner: Arc<RecordingRunner>) -> BuildPipeline {
        let config = BuildConfig::load(dir.join(CONFIG_FILE)).unwrap();
        BuildPipeline::new(config, runner, ToolPaths::default())
    }

    #[tokio::test]
    async fn test_build_end_to_end() {
        let dir = project();
        let runner = Arc::new(RecordingRunner::default());
        let report = pipeline(dir.path(), runner.clone())
            .run(BuildOptions::default())
            .await
            .unwrap();

        let timeline = &report.timeline;
        assert_eq!(timeline.total_duration_seconds, 8.5);
        assert_eq!(timeline.scenes[0].start_frame, 0);
        assert_eq!(timeline.scenes[0].duration_frames, 165);
        assert_eq!(timeline.scenes[1].start_frame, 165);
        assert_eq!(timeline.scenes[1].duration_frames, 90);
        assert_eq!(timeline.scenes[1].start_seconds, 5.5);

        assert_eq!(report.voiceover, dir.path().join("full_voiceover_v1.2.mp3"));
        assert!(report.voiceover.is_file());
        assert!(report.timing_js.is_file());
        assert!(report.deployed.is_none());
        assert!(report.video.is_none());

        // concat then encode
        assert_eq!(runner.calls().len(), 2);

        let manifest = std::fs::read_to_string(&report.manifest).unwrap();
        for name in ["TIMING.js", "TIMING.json", "close.wav", "full_voiceover_v1.2.mp3", "hook.wav", "scenes.toml"] {
            assert!(manifest.contains(name), "manifest missing {}", name);
        }
    }

    #[tokio::test]
    async fn test_build_is_repeatable() {
        let dir = project();
        let first = pipeline(dir.path(), Arc::new(RecordingRunner::default()))
            .run(BuildOptions::default())
            .await
            .unwrap();
        let json = std::fs::read_to_string(&first.timing_json).unwrap();
        let js = std::fs::read_to_string(&first.timing_js).unwrap();

        let second = pipeline(dir.path(), Arc::new(RecordingRunner::default()))
            .run(BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&second.timing_json).unwrap(), json);
        assert_eq!(std::fs::read_to_string(&second.timing_js).unwrap(), js);
    }

    #[tokio::test]
    async fn test_deploy_and_render() {
        let dir = project();
        let runner = Arc::new(RecordingRunner::default());
        let report = pipeline(dir.path(), runner.clone())
            .run(BuildOptions {
                deploy: true,
                render: true,
            })
            .await
            .unwrap();

        let deployed = report.deployed.unwrap();
        let renderer = dir.path().join("remotion");
        assert_eq!(deployed.audio, renderer.join("public/voiceover/full_voiceover_v1.2.mp3"));
        assert!(deployed.audio.is_file());
        assert_eq!(
            std::fs::read_to_string(&deployed.timing).unwrap(),
            std::fs::read_to_string(&report.timing_json).unwrap()
        );
        let root = std::fs::read_to_string(&deployed.root_component).unwrap();
        assert!(root.contains("durationInFrames={255}"));
        assert!(root.contains("fps={30}"));

        let calls = runner.calls();
        let render = calls.last().unwrap();
        assert_eq!(render.program, "npx");
        assert_eq!(render.cwd.as_deref(), Some(renderer.as_path()));
        assert_eq!(
            render.command_line(),
            "npx remotion render Main out/lausd-pitch-v1.2.mp4 --concurrency=1 --timeout=60000"
        );
        assert_eq!(report.video, Some(renderer.join("out/lausd-pitch-v1.2.mp4")));
    }

    #[tokio::test]
    async fn test_render_without_deploy_is_usage_error() {
        let dir = project();
        let runner = Arc::new(RecordingRunner::default());
        let result = pipeline(dir.path(), runner.clone())
            .run(BuildOptions {
                deploy: false,
                render: true,
            })
            .await;

        assert!(matches!(result, Err(PitchError::Usage(_))));
        assert!(runner.calls().is_empty());
        assert!(!dir.path().join(TIMING_JSON).exists());
    }

    #[tokio::test]
    async fn test_missing_clip_fails_before_tools() {
        let dir = project();
        std::fs::remove_file(dir.path().join("close.wav")).unwrap();
        let runner = Arc::new(RecordingRunner::default());

        let result = pipeline(dir.path(), runner.clone()).run(BuildOptions::default()).await;
        assert!(matches!(result, Err(PitchError::MissingAsset { ref scene_id, .. }) if scene_id == "close"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tool_failure_stops_build() {
        let dir = project();
        let runner = Arc::new(RecordingRunner::failing_on(1));

        let result = pipeline(dir.path(), runner).run(BuildOptions::default()).await;
        assert!(matches!(result, Err(PitchError::ExternalTool { .. })));
        assert!(!dir.path().join("full_voiceover_v1.2.mp3").exists());
        assert!(!dir.path().join(TIMING_JSON).exists());
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let dir = project();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        pipeline(dir.path(), Arc::new(RecordingRunner::default()))
            .with_callback(Box::new(move |event| {
                let tag = match event {
                    BuildEvent::StageStart { name, .. } => name,
                    BuildEvent::SceneMeasured { id, .. } => format!("measured:{}", id),
                    BuildEvent::BuildEnd { .. } => "end".to_string(),
                    _ => return,
                };
                sink.lock().unwrap().push(tag);
            }))
            .run(BuildOptions::default())
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Frozen assets", "Measuring", "measured:hook", "measured:close", "Voiceover", "Timing", "end"]
        );
    }

    #[test]
    fn test_update_root_duration() {
        let frames = FrameTimeline {
            version: "v1".to_string(),
            fps: 30,
            fade_frames: 15,
            gap_seconds: 0.5,
            total_duration_seconds: 8.5,
            total_frames: 255,
            scenes: Vec::new(),
        };

        let updated = update_root_duration(ROOT_TSX, &frames).unwrap();
        assert!(updated.contains("durationInFrames={255}"));
        assert!(!updated.contains("Math.round"));
        assert!(update_root_duration("<Composition />", &frames).is_none());
    }

    #[test]
    fn test_component_name() {
        assert_eq!(component_name("hook"), "HookScene");
        assert_eq!(component_name("the_close"), "TheCloseScene");
        assert_eq!(component_name("scene2"), "Scene2Scene");
    }

    #[tokio::test]
    async fn test_narrate_writes_rebuildable_project() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("narration");
        let script = "# Hook\nLAUSD partners with PowerSchool for $5 million in savings.\n---\n# Close\nLet's talk.";
        let options = NarrateOptions {
            delimiter: "---".to_string(),
            out_dir: out_dir.clone(),
            meta: MetaConfig::new("lausd-pitch", "v2"),
        };

        let issues = Mutex::new(0usize);
        let mut synth = SilenceSynthesizer::new(22050, 2.0);
        let config = narrate(script, &options, &mut synth, &|event| {
            if let BuildEvent::ScriptIssue { .. } = event {
                *issues.lock().unwrap() += 1;
            }
        })
        .unwrap();

        assert!(*issues.lock().unwrap() >= 4);
        assert_eq!(config.meta.sample_rate, 22050);
        assert_eq!(config.scenes.len(), 2);
        assert_eq!(config.scenes[0].component, "HookScene");
        assert!(out_dir.join("hook.wav").is_file());
        assert!(out_dir.join(CONFIG_FILE).is_file());

        let report = BuildPipeline::new(config, Arc::new(RecordingRunner::default()), ToolPaths::default())
            .run(BuildOptions::default())
            .await
            .unwrap();
        assert!((report.timeline.scenes[1].start_seconds - 2.8).abs() < 1e-9);
        assert_eq!(report.voiceover, out_dir.join("full_voiceover_v2.mp3"));
    }

    #[test]
    fn test_narrate_rejects_unknown_voice_and_empty_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = NarrateOptions {
            delimiter: "---".to_string(),
            out_dir: dir.path().to_path_buf(),
            meta: MetaConfig::new("p", "v1"),
        };
        let mut synth = SilenceSynthesizer::new(24000, 1.0);

        assert!(matches!(
            narrate("  ", &options, &mut synth, &|_| {}),
            Err(PitchError::EmptyInput)
        ));

        options.meta.voice = "nobody".to_string();
        assert!(matches!(
            narrate("Hello.", &options, &mut synth, &|_| {}),
            Err(PitchError::UnknownVoice { .. })
        ));
        assert!(!dir.path().join(CONFIG_FILE).exists());
    }
}
