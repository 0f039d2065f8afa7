//! Timeline construction and frame quantization.
//!
//! The timeline is derived from the measured scene durations on every build
//! and is the single source for both the audio gap layout and the renderer's
//! frame table.

use std::fmt::Write as _;

use serde::Serialize;

use crate::error::{PitchError, Result};
use crate::scene::Scene;

/// Seconds-based timing of one scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingEntry {
    pub scene_id: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub duration_seconds: f64,
    pub fade_in: bool,
    pub fade_out: bool,
    pub component: Option<String>,
}

/// Ordered scene timings plus the overall length.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub entries: Vec<TimingEntry>,
    pub gap_seconds: f64,
    /// End of the last scene. No trailing gap is counted.
    pub total_duration: f64,
}

/// Lay scenes end to end with `gap_seconds` of silence between neighbours.
pub fn build_timeline(scenes: &[Scene], gap_seconds: f64) -> Result<Timeline> {
    if scenes.is_empty() {
        return Err(PitchError::EmptyInput);
    }
    if !gap_seconds.is_finite() || gap_seconds < 0.0 {
        return Err(PitchError::Config(format!(
            "scene gap must be >= 0 seconds, got {}",
            gap_seconds
        )));
    }

    let mut entries = Vec::with_capacity(scenes.len());
    let mut cursor = 0.0;
    let last = scenes.len() - 1;

    for (i, scene) in scenes.iter().enumerate() {
        let duration = scene
            .duration_seconds()
            .ok_or_else(|| PitchError::MissingDuration {
                scene_id: scene.id().to_string(),
            })?;

        let start = cursor;
        let end = start + duration;
        entries.push(TimingEntry {
            scene_id: scene.id().to_string(),
            start_seconds: start,
            end_seconds: end,
            duration_seconds: duration,
            fade_in: scene.fade_in(),
            fade_out: scene.fade_out(),
            component: scene.component().map(str::to_string),
        });

        cursor = if i < last { end + gap_seconds } else { end };
    }

    Ok(Timeline {
        entries,
        gap_seconds,
        total_duration: cursor,
    })
}

/// Round half away from zero. Matches `Math.round` for the non-negative
/// values the renderer sees.
pub fn seconds_to_frames(seconds: f64, fps: u32) -> u64 {
    (seconds * fps as f64).round().max(0.0) as u64
}

/// Renderer-facing timing of one scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameEntry {
    pub id: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub duration_seconds: f64,
    pub start_frame: u64,
    /// `round(duration_seconds * fps)`, plus the fade allowance when `fade_out` is set.
    pub duration_frames: u64,
    pub fade_in: bool,
    pub fade_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl FrameEntry {
    /// Frames covered by the audio alone.
    pub fn audio_frames(&self, fade_frames: u32) -> u64 {
        if self.fade_out {
            self.duration_frames - fade_frames as u64
        } else {
            self.duration_frames
        }
    }
}

/// The timing document handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameTimeline {
    pub version: String,
    pub fps: u32,
    pub fade_frames: u32,
    pub gap_seconds: f64,
    pub total_duration_seconds: f64,
    pub total_frames: u64,
    pub scenes: Vec<FrameEntry>,
}

impl FrameTimeline {
    /// Quantize a timeline to frames.
    ///
    /// Starts are rounded from absolute seconds and lengths from each scene's
    /// own duration, so equal clips get equal frame counts and the last
    /// scene still ends within one frame of `total_frames`.
    pub fn from_timeline(
        timeline: &Timeline,
        fps: u32,
        fade_frames: u32,
        version: impl Into<String>,
    ) -> Result<Self> {
        if fps == 0 {
            return Err(PitchError::Config("fps must be > 0".to_string()));
        }

        let scenes = timeline
            .entries
            .iter()
            .map(|entry| {
                let fade = if entry.fade_out { fade_frames as u64 } else { 0 };

                FrameEntry {
                    id: entry.scene_id.clone(),
                    start_seconds: entry.start_seconds,
                    end_seconds: entry.end_seconds,
                    duration_seconds: entry.duration_seconds,
                    start_frame: seconds_to_frames(entry.start_seconds, fps),
                    duration_frames: seconds_to_frames(entry.duration_seconds, fps) + fade,
                    fade_in: entry.fade_in,
                    fade_out: entry.fade_out,
                    component: entry.component.clone(),
                }
            })
            .collect();

        Ok(Self {
            version: version.into(),
            fps,
            fade_frames,
            gap_seconds: timeline.gap_seconds,
            total_duration_seconds: timeline.total_duration,
            total_frames: seconds_to_frames(timeline.total_duration, fps),
            scenes,
        })
    }

    /// Signed frames between the last scene's quantized audio end and `total_frames`.
    pub fn drift_frames(&self) -> i64 {
        self.scenes
            .last()
            .map(|last| {
                (last.start_frame + last.audio_frames(self.fade_frames)) as i64
                    - self.total_frames as i64
            })
            .unwrap_or(0)
    }

    /// Pretty JSON, newline-terminated.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// JavaScript constants for the renderer project.
    pub fn to_js(&self, source_name: &str) -> Result<String> {
        let mut out = String::new();
        let fade_seconds = self.fade_frames as f64 / self.fps as f64;

        // Writing to a String cannot fail.
        let _ = writeln!(out, "// Auto-generated from {} ({})", source_name, self.version);
        let _ = writeln!(out, "// DO NOT EDIT MANUALLY - run `pitchreel build` to regenerate");
        let _ = writeln!(out, "// Total duration: {:.2} seconds", self.total_duration_seconds);
        out.push('\n');
        let _ = writeln!(out, "export const FPS = {};", self.fps);
        let _ = writeln!(
            out,
            "export const FADE_FRAMES = {}; // {:.1}s fade duration",
            self.fade_frames, fade_seconds
        );
        out.push('\n');
        out.push_str("export const SCENES = {\n");
        for scene in &self.scenes {
            let key = serde_json::to_string(&scene.id)?;
            let _ = writeln!(
                out,
                "  {}: {{start: {}, duration: {}}}, // {:.2}s - {:.2}s ({:.2}s)",
                key,
                scene.start_frame,
                scene.duration_frames,
                scene.start_seconds,
                scene.end_seconds,
                scene.duration_seconds
            );
        }
        out.push_str("};\n\n");
        let _ = writeln!(
            out,
            "export const TOTAL_FRAMES = {}; // {:.2}s at {}fps",
            self.total_frames, self.total_duration_seconds, self.fps
        );

        out.push('\n');
        out.push_str("// Sequence generation:\n");
        for scene in &self.scenes {
            let key = serde_json::to_string(&scene.id)?;
            let component = scene.component.as_deref().unwrap_or("Scene");
            let _ = writeln!(
                out,
                "// <Sequence from={{SCENES[{key}].start}} durationInFrames={{SCENES[{key}].duration}}>"
            );
            let _ = writeln!(
                out,
                "//   <SlideTransition durationInFrames={{SCENES[{key}].duration}} fadeIn={{{}}} fadeOut={{{}}}>",
                scene.fade_in, scene.fade_out
            );
            let _ = writeln!(out, "//     <{} />", component);
            out.push_str("//   </SlideTransition>\n");
            out.push_str("// </Sequence>\n");
        }

        Ok(out)
    }
}
