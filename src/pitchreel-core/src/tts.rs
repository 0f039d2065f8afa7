//! TTS module for scene narration.
//!
//! Synthesis goes through the [`Synthesizer`] capability. The production
//! backend wraps kokoro-tiny; [`SilenceSynthesizer`] returns fixed-length
//! silence so the rest of the pipeline can run without a model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kokoro_tiny::TtsEngine;
use tracing::{debug, info};

use crate::audio;
use crate::error::{PitchError, Result};
use crate::scene::{AudioSource, Scene};

/// Output rate of the kokoro model.
pub const KOKORO_SAMPLE_RATE: u32 = 24000;

/// Playback rate when none is given.
pub const DEFAULT_VOICE_SPEED: f32 = 1.0;

/// Pause inserted between phrases of a generated scene.
pub const PHRASE_PAUSE_SECONDS: f64 = 0.3;

/// Voices with a known narration character.
const KNOWN_VOICES: &[(&str, &str)] = &[
    ("af_sarah", "Professional, clear - general narration"),
    ("af_bella", "Warm, empathetic - problem/pain scenes"),
    ("af_heart", "Passionate, emotional - inspiring closes"),
    ("af_nova", "Energetic, modern - urgency, innovation"),
    ("af_sky", "Optimistic, bright - benefits, solutions"),
    ("am_adam", "Male, authoritative - executive content"),
    ("am_michael", "Male, conversational - friendly narration"),
];

/// What the backend should read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SynthesisInput<'a> {
    Text(&'a str),
    Phonemes(&'a str),
}

/// How long text is cut up for backends with a per-call limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPolicy {
    pub max_chars: usize,
    /// Silence between consecutive chunks.
    pub pause_seconds: f64,
}

impl Default for ChunkPolicy {
    /// Kokoro is reliable up to roughly 200 characters per call.
    fn default() -> Self {
        Self {
            max_chars: 200,
            pause_seconds: PHRASE_PAUSE_SECONDS,
        }
    }
}

impl ChunkPolicy {
    /// Pack whole sentences greedily into chunks of at most `max_chars`.
    ///
    /// A sentence longer than the limit is packed clause by clause, breaking
    /// after commas. A single clause over the limit is kept whole.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut packer = ChunkPacker {
            max_chars: self.max_chars,
            current: String::new(),
            chunks: Vec::new(),
        };

        let sentences = text
            .split_inclusive(['.', '!', '?', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty());
        for sentence in sentences {
            if sentence.len() <= self.max_chars {
                packer.push(sentence);
                continue;
            }
            packer.flush();
            for clause in sentence.split_inclusive(',').map(str::trim).filter(|c| !c.is_empty()) {
                packer.push(clause);
            }
        }

        packer.finish()
    }
}

struct ChunkPacker {
    max_chars: usize,
    current: String,
    chunks: Vec<String>,
}

impl ChunkPacker {
    fn push(&mut self, piece: &str) {
        if !self.current.is_empty() && self.current.len() + 1 + piece.len() > self.max_chars {
            self.flush();
        }
        if !self.current.is_empty() {
            self.current.push(' ');
        }
        self.current.push_str(piece);
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// One synthesis call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisRequest<'a> {
    pub input: SynthesisInput<'a>,
    pub voice_id: &'a str,
    pub speed: f32,
    pub chunking: ChunkPolicy,
}

impl<'a> SynthesisRequest<'a> {
    /// The request for a scene. A phonetic form takes precedence over the text.
    pub fn for_scene(scene: &'a Scene) -> Self {
        let input = match scene.phonetic_form() {
            Some(phonemes) => SynthesisInput::Phonemes(phonemes),
            None => SynthesisInput::Text(scene.text()),
        };
        Self {
            input,
            voice_id: scene.voice_id(),
            speed: scene.speed(),
            chunking: ChunkPolicy::default(),
        }
    }

    pub fn text(text: &'a str, voice_id: &'a str, speed: f32) -> Self {
        Self {
            input: SynthesisInput::Text(text),
            voice_id,
            speed,
            chunking: ChunkPolicy::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkPolicy) -> Self {
        self.chunking = chunking;
        self
    }
}

/// Mono samples produced by a synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Voices a synthesizer can use, loaded once when it is built.
///
/// Lookups fail fast: an unknown voice is an error listing what is available.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceCatalog {
    voices: BTreeMap<String, Option<String>>,
}

impl VoiceCatalog {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let voices = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let description = describe_voice(&name).map(str::to_string);
                (name, description)
            })
            .collect();
        Self { voices }
    }

    /// The curated narration voices.
    pub fn known() -> Self {
        Self::from_names(KNOWN_VOICES.iter().map(|(name, _)| *name))
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.voices.contains_key(voice)
    }

    /// Check a voice exists.
    pub fn resolve<'v>(&self, voice: &'v str) -> Result<&'v str> {
        if voice.is_empty() || !self.contains(voice) {
            return Err(PitchError::UnknownVoice {
                voice: voice.to_string(),
                available: self.format_available(),
            });
        }
        Ok(voice)
    }

    /// (name, description) pairs in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.voices
            .iter()
            .map(|(name, description)| (name.as_str(), description.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// English voices, one per line, for error messages.
    fn format_available(&self) -> String {
        self.voices
            .keys()
            .filter(|v| {
                v.starts_with("af_")
                    || v.starts_with("am_")
                    || v.starts_with("bf_")
                    || v.starts_with("bm_")
            })
            .map(|v| format!("  - {}", v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Narration blurb for a curated voice.
pub fn describe_voice(voice: &str) -> Option<&'static str> {
    KNOWN_VOICES
        .iter()
        .find(|(name, _)| *name == voice)
        .map(|(_, description)| *description)
}

/// A text-to-speech backend.
pub trait Synthesizer {
    fn name(&self) -> &str;

    fn sample_rate(&self) -> u32;

    fn catalog(&self) -> &VoiceCatalog;

    fn synthesize(&mut self, request: &SynthesisRequest<'_>) -> Result<SynthesizedAudio>;
}

/// Kokoro synthesizer via kokoro-tiny.
pub struct KokoroSynthesizer {
    engine: TtsEngine,
    catalog: VoiceCatalog,
}

impl KokoroSynthesizer {
    /// Initialize the TTS engine (downloads model on first run).
    pub async fn new() -> Result<Self> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| PitchError::ExternalToolUnavailable {
                tool: "kokoro".to_string(),
                detail: e.to_string(),
            })?;

        let catalog = VoiceCatalog::from_names(engine.voices());
        info!(voices = catalog.len(), "kokoro engine ready");

        Ok(Self { engine, catalog })
    }
}

impl Synthesizer for KokoroSynthesizer {
    fn name(&self) -> &str {
        "kokoro"
    }

    fn sample_rate(&self) -> u32 {
        KOKORO_SAMPLE_RATE
    }

    fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    fn synthesize(&mut self, request: &SynthesisRequest<'_>) -> Result<SynthesizedAudio> {
        let voice = self.catalog.resolve(request.voice_id)?;

        let text = match request.input {
            SynthesisInput::Text(text) => text,
            SynthesisInput::Phonemes(_) => {
                return Err(PitchError::Synthesis(
                    "the kokoro backend reads plain text only; remove the scene's phonetic form"
                        .to_string(),
                ));
            }
        };

        let pause = audio::frames_for(request.chunking.pause_seconds, KOKORO_SAMPLE_RATE) as usize;
        let mut samples = Vec::new();

        for (i, chunk) in request.chunking.split(text).iter().enumerate() {
            if i > 0 {
                samples.extend(std::iter::repeat_n(0.0, pause));
            }
            debug!(voice, chars = chunk.len(), "synthesizing chunk");
            let chunk_samples = self
                .engine
                .synthesize(chunk, Some(voice))
                .map_err(|e| PitchError::Synthesis(e.to_string()))?;
            samples.extend(chunk_samples);
        }

        Ok(SynthesizedAudio {
            samples: change_speed(&samples, request.speed),
            sample_rate: KOKORO_SAMPLE_RATE,
        })
    }
}

/// Returns the same length of silence for every request.
#[derive(Debug, Clone)]
pub struct SilenceSynthesizer {
    sample_rate: u32,
    seconds: f64,
    catalog: VoiceCatalog,
}

impl SilenceSynthesizer {
    pub fn new(sample_rate: u32, seconds: f64) -> Self {
        Self {
            sample_rate,
            seconds,
            catalog: VoiceCatalog::known(),
        }
    }
}

impl Synthesizer for SilenceSynthesizer {
    fn name(&self) -> &str {
        "silence"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    fn synthesize(&mut self, request: &SynthesisRequest<'_>) -> Result<SynthesizedAudio> {
        self.catalog.resolve(request.voice_id)?;
        Ok(SynthesizedAudio {
            samples: vec![0.0; audio::frames_for(self.seconds, self.sample_rate) as usize],
            sample_rate: self.sample_rate,
        })
    }
}

/// Synthesize a scene into `<out_dir>/<id>.wav` and record the measured duration.
pub fn synthesize_scene(
    synth: &mut dyn Synthesizer,
    scene: &mut Scene,
    out_dir: &Path,
) -> Result<PathBuf> {
    let audio = synth.synthesize(&SynthesisRequest::for_scene(scene))?;
    let path = out_dir.join(format!("{}.wav", scene.id()));
    write_scene_clip(scene, &path, &audio)?;
    Ok(path)
}

/// Synthesize `phrases` as one scene, with a short pause between phrases.
pub fn generate_scene(
    synth: &mut dyn Synthesizer,
    id: &str,
    phrases: &[String],
    voice: &str,
    speed: f32,
    out_dir: &Path,
) -> Result<Scene> {
    if phrases.iter().all(|p| p.trim().is_empty()) {
        return Err(PitchError::InvalidScene {
            scene_id: id.to_string(),
            reason: "no phrases to synthesize".to_string(),
        });
    }

    let mut scene = Scene::new(id, phrases.join(" "))?
        .with_voice(voice)
        .with_speed(speed)?;

    let mut combined = SynthesizedAudio {
        samples: Vec::new(),
        sample_rate: synth.sample_rate(),
    };
    let phrases: Vec<&String> = phrases.iter().filter(|p| !p.trim().is_empty()).collect();
    for (i, phrase) in phrases.iter().enumerate() {
        info!(scene = id, phrase = i + 1, total = phrases.len(), "synthesizing phrase");
        let audio = synth.synthesize(&SynthesisRequest::text(phrase, scene.voice_id(), scene.speed()))?;
        if i > 0 {
            let pause = audio::frames_for(PHRASE_PAUSE_SECONDS, audio.sample_rate) as usize;
            combined.samples.extend(std::iter::repeat_n(0.0, pause));
        }
        combined.sample_rate = audio.sample_rate;
        combined.samples.extend(audio.samples);
    }

    let path = out_dir.join(format!("{}.wav", id));
    write_scene_clip(&mut scene, &path, &combined)?;
    Ok(scene)
}

/// Write the clip, then measure it back from disk.
fn write_scene_clip(scene: &mut Scene, path: &Path, audio: &SynthesizedAudio) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    audio::write_wav(path, &audio.samples, audio.sample_rate)?;
    let measured = audio::measure_wav(path)?;
    scene.attach_audio(AudioSource::File(path.to_path_buf()), measured.duration_seconds())?;

    info!(
        scene = scene.id(),
        path = %path.display(),
        seconds = measured.duration_seconds(),
        "scene audio written"
    );
    Ok(())
}

/// Resample so playback runs `rate` times as fast, interpolating linearly
/// between neighbouring samples. Rates within 0.001 of 1 are left alone.
pub fn change_speed(samples: &[f32], rate: f32) -> Vec<f32> {
    if samples.is_empty() || (rate - 1.0).abs() < 1e-3 {
        return samples.to_vec();
    }

    let rate = rate as f64;
    let last = samples.len() - 1;
    let out_len = (samples.len() as f64 / rate) as usize;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * rate;
            let idx = (pos as usize).min(last);
            let next = (idx + 1).min(last);
            let t = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * t
        })
        .collect()
}
