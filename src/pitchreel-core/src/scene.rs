//! Scene definitions.
//!
//! A scene is one narrated unit of the pitch. It owns a reference to its
//! audio, never the audio itself, plus the duration measured from that audio.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{PitchError, Result};

/// Voice used when neither the scene nor the configuration names one.
pub const DEFAULT_VOICE: &str = "af_sarah";

/// Where a scene's audio lives.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// A WAV file on disk.
    File(PathBuf),
    /// Shared mono samples held in memory. Library callers only; config and
    /// script builds always produce files.
    Buffer {
        samples: Arc<[f32]>,
        sample_rate: u32,
    },
}

/// One narrated unit of the pitch.
#[derive(Debug, Clone)]
pub struct Scene {
    id: String,
    text: String,
    phonetic_form: Option<String>,
    audio_source: Option<AudioSource>,
    duration_seconds: Option<f64>,
    voice_id: String,
    speed: f32,
    fade_in: bool,
    fade_out: bool,
    component: Option<String>,
}

impl Scene {
    /// Create a scene, rejecting ids that cannot double as a filename stem.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_id(&id)?;

        Ok(Self {
            id,
            text: text.into(),
            phonetic_form: None,
            audio_source: None,
            duration_seconds: None,
            voice_id: DEFAULT_VOICE.to_string(),
            speed: 1.0,
            fade_in: true,
            fade_out: true,
            component: None,
        })
    }

    /// Use a phonetic spelling for synthesis instead of the text.
    ///
    /// Only reachable through the library: the kokoro backend rejects
    /// phoneme input, so neither config nor script builds set one.
    pub fn with_phonetic_form(mut self, phonetic: impl Into<String>) -> Self {
        let phonetic = phonetic.into();
        self.phonetic_form = if phonetic.trim().is_empty() {
            None
        } else {
            Some(phonetic)
        };
        self
    }

    pub fn with_audio_source(mut self, source: AudioSource) -> Self {
        self.audio_source = Some(source);
        self
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    /// Set the synthesis speed. Must be positive and finite.
    pub fn with_speed(mut self, speed: f32) -> Result<Self> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PitchError::InvalidScene {
                scene_id: self.id,
                reason: format!("speed must be > 0, got {}", speed),
            });
        }
        self.speed = speed;
        Ok(self)
    }

    pub fn with_fades(mut self, fade_in: bool, fade_out: bool) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Record the duration measured from the scene's audio.
    ///
    /// A duration can be recorded once; a second call is an error.
    pub fn record_duration(&mut self, seconds: f64) -> Result<()> {
        if self.duration_seconds.is_some() {
            return Err(PitchError::DurationAlreadyMeasured {
                scene_id: self.id.clone(),
            });
        }
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(PitchError::InvalidScene {
                scene_id: self.id.clone(),
                reason: format!("measured duration must be >= 0, got {}", seconds),
            });
        }
        self.duration_seconds = Some(seconds);
        Ok(())
    }

    /// Point the scene at freshly generated audio and record its measured duration.
    pub fn attach_audio(&mut self, source: AudioSource, seconds: f64) -> Result<()> {
        self.record_duration(seconds)?;
        self.audio_source = Some(source);
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn phonetic_form(&self) -> Option<&str> {
        self.phonetic_form.as_deref()
    }

    pub fn audio_source(&self) -> Option<&AudioSource> {
        self.audio_source.as_ref()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_seconds
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn fade_in(&self) -> bool {
        self.fade_in
    }

    pub fn fade_out(&self) -> bool {
        self.fade_out
    }

    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }
}

/// Scene ids are used as filename stems and as keys in the timing output.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(PitchError::InvalidScene {
            scene_id: id.to_string(),
            reason: "id cannot be empty".to_string(),
        });
    }

    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(PitchError::InvalidScene {
            scene_id: id.to_string(),
            reason: format!("id may only contain ASCII letters, digits, '_' or '-' (found {:?})", bad),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scene_defaults() {
        let scene = Scene::new("hook", "Welcome.").unwrap();
        assert_eq!(scene.voice_id(), DEFAULT_VOICE);
        assert_eq!(scene.speed(), 1.0);
        assert!(scene.fade_in());
        assert!(scene.fade_out());
        assert!(scene.duration_seconds().is_none());
        assert!(scene.audio_source().is_none());
    }

    #[test]
    fn test_rejects_bad_ids() {
        assert!(matches!(
            Scene::new("", "x"),
            Err(PitchError::InvalidScene { .. })
        ));
        assert!(matches!(
            Scene::new("../etc", "x"),
            Err(PitchError::InvalidScene { .. })
        ));
        assert!(Scene::new("scene_01-b", "x").is_ok());
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        let scene = Scene::new("hook", "x").unwrap();
        assert!(scene.clone().with_speed(0.0).is_err());
        assert!(scene.clone().with_speed(f32::NAN).is_err());
        assert_eq!(scene.with_speed(1.05).unwrap().speed(), 1.05);
    }

    #[test]
    fn test_duration_is_recorded_once() {
        let mut scene = Scene::new("hook", "x").unwrap();
        scene.record_duration(5.0).unwrap();
        assert_eq!(scene.duration_seconds(), Some(5.0));

        let err = scene.record_duration(6.0).unwrap_err();
        assert!(matches!(err, PitchError::DurationAlreadyMeasured { .. }));
        assert_eq!(scene.duration_seconds(), Some(5.0));
    }

    #[test]
    fn test_rejects_negative_duration() {
        let mut scene = Scene::new("hook", "x").unwrap();
        assert!(scene.record_duration(-1.0).is_err());
        assert!(scene.duration_seconds().is_none());
    }

    #[test]
    fn test_blank_phonetic_form_is_ignored() {
        let scene = Scene::new("hook", "x").unwrap().with_phonetic_form("  ");
        assert!(scene.phonetic_form().is_none());
    }

}
