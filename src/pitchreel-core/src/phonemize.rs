//! Text to IPA through espeak-ng.

use std::sync::Arc;

use tracing::debug;

use crate::error::{PitchError, Result};
use crate::tools::{ToolInvocation, ToolRunner};

/// espeak-ng voice used when none is given.
pub const DEFAULT_ESPEAK_VOICE: &str = "en-us";

pub struct EspeakPhonemizer {
    runner: Arc<dyn ToolRunner>,
    program: String,
    voice: String,
}

impl EspeakPhonemizer {
    pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            voice: DEFAULT_ESPEAK_VOICE.to_string(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// IPA for `text`, with espeak's line breaks folded into single spaces.
    ///
    /// The text goes in on stdin so a leading `-` is never read as an option.
    pub async fn phonemize(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PitchError::Usage("nothing to phonemize".to_string()));
        }

        let invocation = ToolInvocation::new(&self.program)
            .args(["-q", "--ipa", "-v"])
            .arg(&self.voice)
            .arg("--stdin")
            .stdin(text);
        debug!(command = %invocation.command_line(), "phonemizing");

        let output = self.runner.run(&invocation).await?;
        Ok(output.stdout.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}
