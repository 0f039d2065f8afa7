//! Voiceover assembly.
//!
//! Scene clips are joined losslessly with one shared silence clip between
//! neighbours, then a single final ffmpeg pass applies gain and encodes the
//! distribution format. Working files live in a temporary directory next to
//! the output and are removed whether the assembly succeeds or not.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hound::WavSpec;
use tracing::{debug, info};

use crate::audio::{self, WavInfo};
use crate::error::{PitchError, Result};
use crate::scene::{AudioSource, Scene};
use crate::tools::{ToolInvocation, ToolRunner};

/// One entry in the concatenation plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Scene { scene_id: String, path: PathBuf },
    Gap,
}

/// Ordered scene clips with gaps between neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatPlan {
    pub segments: Vec<Segment>,
}

impl ConcatPlan {
    /// Interleave gaps between the given clips. No gap before the first or after the last.
    pub fn new(clips: Vec<(String, PathBuf)>) -> Self {
        let mut segments = Vec::with_capacity(clips.len() * 2);
        for (i, (scene_id, path)) in clips.into_iter().enumerate() {
            if i > 0 {
                segments.push(Segment::Gap);
            }
            segments.push(Segment::Scene { scene_id, path });
        }
        Self { segments }
    }

    pub fn gap_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Gap))
            .count()
    }

    /// Render as an ffmpeg concat demuxer list. Every gap points at the same file.
    pub fn to_concat_list(&self, silence: &Path) -> String {
        self.segments
            .iter()
            .map(|segment| {
                let path = match segment {
                    Segment::Scene { path, .. } => path.as_path(),
                    Segment::Gap => silence,
                };
                format!("file '{}'\n", escape_concat_path(path))
            })
            .collect()
    }
}

/// Quote a path for the concat demuxer's single-quoted syntax.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

/// Settings for one assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblySettings {
    pub sample_rate: u32,
    pub gap_seconds: f64,
    pub volume_boost_db: f64,
    /// Encoder bitrate, e.g. `192k`.
    pub bitrate: String,
}

impl AssemblySettings {
    /// Gap length in whole sample frames.
    pub fn gap_frames(&self) -> u32 {
        audio::frames_for(self.gap_seconds, self.sample_rate)
    }

    /// The gap as it will actually sound once rounded to whole samples.
    pub fn effective_gap_seconds(&self) -> f64 {
        self.gap_frames() as f64 / self.sample_rate as f64
    }
}

/// Builds the final voiceover through ffmpeg.
pub struct AudioAssembler {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: String,
}

impl AudioAssembler {
    pub fn new(runner: Arc<dyn ToolRunner>, ffmpeg: impl Into<String>) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Join `scenes` in order and encode the result to `output`.
    pub async fn assemble(
        &self,
        scenes: &[Scene],
        settings: &AssemblySettings,
        output: &Path,
    ) -> Result<PathBuf> {
        if scenes.is_empty() {
            return Err(PitchError::EmptyInput);
        }
        check_assets(scenes)?;

        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let workdir = tempfile::Builder::new()
            .prefix(".pitchreel-assemble-")
            .tempdir_in(parent)?;
        debug!(workdir = %workdir.path().display(), "assembling voiceover");

        let (plan, spec) = materialize(scenes, settings, workdir.path())?;

        let silence = workdir.path().join("silence_gap.wav");
        audio::write_silence(&silence, spec, settings.gap_frames())?;

        let list = workdir.path().join("concat.txt");
        std::fs::write(&list, plan.to_concat_list(&silence))?;

        let joined = workdir.path().join("joined.wav");
        let concat = ToolInvocation::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list)
            .args(["-c", "copy"])
            .arg(&joined);
        self.runner.run(&concat).await?;

        let extension = output
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp3".to_string());
        let encoded = workdir.path().join(format!("encoded.{}", extension));
        let encode = ToolInvocation::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(&joined)
            .arg("-af")
            .arg(format!("volume={}dB", settings.volume_boost_db))
            .arg("-b:a")
            .arg(&settings.bitrate)
            .arg(&encoded);
        self.runner.run(&encode).await?;

        std::fs::rename(&encoded, output)?;
        info!(
            output = %output.display(),
            scenes = scenes.len(),
            gaps = plan.gap_count(),
            "voiceover assembled"
        );

        Ok(output.to_path_buf())
    }
}

/// Every file-backed scene must exist before any tool runs.
fn check_assets(scenes: &[Scene]) -> Result<()> {
    for scene in scenes {
        match scene.audio_source() {
            Some(AudioSource::File(path)) if !path.is_file() => {
                return Err(PitchError::MissingAsset {
                    scene_id: scene.id().to_string(),
                    path: path.clone(),
                });
            }
            None => {
                return Err(PitchError::MissingAsset {
                    scene_id: scene.id().to_string(),
                    path: PathBuf::from(format!("{}.wav", scene.id())),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Resolve every scene to a WAV on disk and check they share one layout.
///
/// In-memory buffers are written into `workdir`.
fn materialize(
    scenes: &[Scene],
    settings: &AssemblySettings,
    workdir: &Path,
) -> Result<(ConcatPlan, WavSpec)> {
    let mut clips = Vec::with_capacity(scenes.len());
    let mut layout: Option<WavInfo> = None;

    for scene in scenes {
        let (path, info) = match scene.audio_source() {
            Some(AudioSource::File(path)) => (path.clone(), audio::measure_wav(path)?),
            Some(AudioSource::Buffer {
                samples,
                sample_rate,
            }) => {
                let path = workdir.join(format!("buffer_{}.wav", scene.id()));
                let info = audio::write_wav(&path, samples, *sample_rate)?;
                (path, info)
            }
            None => {
                return Err(PitchError::MissingAsset {
                    scene_id: scene.id().to_string(),
                    path: PathBuf::from(format!("{}.wav", scene.id())),
                });
            }
        };

        if info.spec.sample_rate != settings.sample_rate {
            return Err(PitchError::AudioFormat {
                scene_id: scene.id().to_string(),
                detail: format!(
                    "sample rate {} Hz does not match configured {} Hz",
                    info.spec.sample_rate, settings.sample_rate
                ),
            });
        }
        if let Some(first) = &layout {
            if first.spec != info.spec {
                return Err(PitchError::AudioFormat {
                    scene_id: scene.id().to_string(),
                    detail: format!(
                        "layout {:?} differs from the first scene's {:?}; stream copy needs identical clips",
                        info.spec, first.spec
                    ),
                });
            }
        } else {
            layout = Some(info);
        }

        clips.push((scene.id().to_string(), absolute(path)?));
    }

    let spec = layout.map(|l| l.spec).ok_or(PitchError::EmptyInput)?;
    Ok((ConcatPlan::new(clips), spec))
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fake::RecordingRunner;

    fn settings() -> AssemblySettings {
        AssemblySettings {
            sample_rate: 24000,
            gap_seconds: 0.5,
            volume_boost_db: 3.0,
            bitrate: "192k".to_string(),
        }
    }

    fn clip(dir: &Path, id: &str, seconds: f64) -> Scene {
        let path = dir.join(format!("{}.wav", id));
        audio::write_wav(&path, &vec![0.1; (seconds * 24000.0) as usize], 24000).unwrap();
        Scene::new(id, "")
            .unwrap()
            .with_audio_source(AudioSource::File(path))
    }

    fn leftover_workdirs(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with(".pitchreel-assemble-")
            })
            .count()
    }

    #[test]
    fn test_plan_has_no_trailing_gap() {
        let plan = ConcatPlan::new(vec![
            ("a".to_string(), PathBuf::from("/a.wav")),
            ("b".to_string(), PathBuf::from("/b.wav")),
            ("c".to_string(), PathBuf::from("/c.wav")),
        ]);

        assert_eq!(plan.segments.len(), 5);
        assert_eq!(plan.gap_count(), 2);
        assert!(matches!(plan.segments.first(), Some(Segment::Scene { .. })));
        assert!(matches!(plan.segments.last(), Some(Segment::Scene { .. })));
    }

    #[test]
    fn test_concat_list_reuses_one_silence_file() {
        let plan = ConcatPlan::new(vec![
            ("a".to_string(), PathBuf::from("/a.wav")),
            ("b".to_string(), PathBuf::from("/it's.wav")),
        ]);
        let list = plan.to_concat_list(Path::new("/tmp/gap.wav"));

        assert_eq!(
            list,
            "file '/a.wav'\nfile '/tmp/gap.wav'\nfile '/it'\\''s.wav'\n"
        );
    }

    #[test]
    fn test_effective_gap_is_sample_aligned() {
        let s = AssemblySettings {
            sample_rate: 22050,
            gap_seconds: 0.3333,
            ..settings()
        };
        assert_eq!(s.gap_frames(), 7349);
        assert!((s.effective_gap_seconds() - 7349.0 / 22050.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_assemble_runs_lossless_concat_then_encode() {
        let dir = tempfile::tempdir().unwrap();
        let scenes = vec![
            clip(dir.path(), "hook", 0.5),
            clip(dir.path(), "problem", 0.25),
            clip(dir.path(), "close", 0.25),
        ];
        let runner = Arc::new(RecordingRunner::default());
        let assembler = AudioAssembler::new(runner.clone(), "ffmpeg");
        let output = dir.path().join("full_voiceover_v1.mp3");

        let written = assembler
            .assemble(&scenes, &settings(), &output)
            .await
            .unwrap();
        assert_eq!(written, output);
        assert!(output.is_file());

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].args.iter().any(|a| a == "concat"));
        assert!(calls[0].args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(!calls[0].args.iter().any(|a| a == "-af"));
        assert!(calls[1].args.iter().any(|a| a == "volume=3dB"));
        assert!(calls[1].args.windows(2).any(|w| w[0] == "-b:a" && w[1] == "192k"));

        let list = &runner.inputs()[0];
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].ends_with("hook.wav'"));
        assert!(lines[2].ends_with("problem.wav'"));
        assert!(lines[4].ends_with("close.wav'"));
        assert_eq!(lines[1], lines[3]);
        assert!(lines[1].ends_with("silence_gap.wav'"));

        assert_eq!(leftover_workdirs(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_asset_is_reported_before_any_tool_runs() {
        let dir = tempfile::tempdir().unwrap();
        let scenes = vec![
            clip(dir.path(), "hook", 0.5),
            Scene::new("ghost", "")
                .unwrap()
                .with_audio_source(AudioSource::File(dir.path().join("ghost.wav"))),
        ];
        let runner = Arc::new(RecordingRunner::default());
        let assembler = AudioAssembler::new(runner.clone(), "ffmpeg");

        let err = assembler
            .assemble(&scenes, &settings(), &dir.path().join("out.mp3"))
            .await
            .unwrap_err();

        match err {
            PitchError::MissingAsset { scene_id, .. } => assert_eq!(scene_id, "ghost"),
            other => panic!("expected MissingAsset, got {:?}", other),
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_cleans_up_working_files() {
        let dir = tempfile::tempdir().unwrap();
        let scenes = vec![clip(dir.path(), "a", 0.25), clip(dir.path(), "b", 0.25)];
        let runner = Arc::new(RecordingRunner::failing_on(1));
        let assembler = AudioAssembler::new(runner.clone(), "ffmpeg");
        let output = dir.path().join("out.mp3");

        let err = assembler
            .assemble(&scenes, &settings(), &output)
            .await
            .unwrap_err();

        assert!(matches!(err, PitchError::ExternalTool { .. }));
        assert!(!output.exists());
        assert_eq!(leftover_workdirs(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_rejects_mismatched_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        let odd = dir.path().join("odd.wav");
        audio::write_wav(&odd, &[0.0; 100], 16000).unwrap();
        let scenes = vec![
            clip(dir.path(), "a", 0.25),
            Scene::new("odd", "")
                .unwrap()
                .with_audio_source(AudioSource::File(odd)),
        ];
        let runner = Arc::new(RecordingRunner::default());
        let assembler = AudioAssembler::new(runner.clone(), "ffmpeg");

        let err = assembler
            .assemble(&scenes, &settings(), &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, PitchError::AudioFormat { .. }));
        assert!(runner.calls().is_empty());
        assert_eq!(leftover_workdirs(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_buffer_sources_are_written_to_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let scenes = vec![
            Scene::new("mem", "")
                .unwrap()
                .with_audio_source(AudioSource::Buffer {
                    samples: vec![0.0; 2400].into(),
                    sample_rate: 24000,
                }),
            clip(dir.path(), "disk", 0.1),
        ];
        let runner = Arc::new(RecordingRunner::default());
        let assembler = AudioAssembler::new(runner.clone(), "ffmpeg");

        assembler
            .assemble(&scenes, &settings(), &dir.path().join("out.mp3"))
            .await
            .unwrap();

        let list = &runner.inputs()[0];
        assert!(list.lines().next().unwrap().contains("buffer_mem.wav"));
        assert_eq!(leftover_workdirs(dir.path()), 0);
    }
}
