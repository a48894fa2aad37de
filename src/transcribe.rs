/// Transcription engine interface
///
/// The speech-to-text engine is an external capability: the detector only
/// needs to push raw PCM bytes in and pull a best-effort transcript out.
/// Engines are constructed by a `TranscriptionBackend` from a local model
/// directory, either in full-vocabulary mode or constrained to a phrase list.

use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Reserved transcript value meaning "no confident recognition"
pub const UNK_TOKEN: &str = "[unk]";

/// Fixed engine sample rate (16kHz mono, 16-bit little-endian PCM)
pub const ENGINE_SAMPLE_RATE: u32 = 16_000;

#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Model directory not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Invalid audio data: {0}")]
    InvalidAudio(String),
}

/// Vocabulary mode for a loaded engine
///
/// Constrained mode biases recognition toward the configured phrases, which
/// is faster and more accurate for short commands. Full-vocabulary mode
/// accepts free speech, needed when fuzzy rules match against arbitrary text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabularyMode {
    Full,
    Constrained(Vec<String>),
}

impl VocabularyMode {
    /// JSON grammar for the engine, or `None` in full-vocabulary mode
    ///
    /// The unknown token is always part of a constrained grammar so the
    /// engine has somewhere to put out-of-vocabulary speech.
    pub fn grammar_json(&self) -> Option<String> {
        match self {
            VocabularyMode::Full => None,
            VocabularyMode::Constrained(phrases) => {
                let mut grammar: Vec<&str> = phrases.iter().map(String::as_str).collect();
                grammar.push(UNK_TOKEN);
                Some(json!(grammar).to_string())
            }
        }
    }
}

/// Streaming speech-to-text engine bound to one language and vocabulary mode
#[cfg_attr(test, mockall::automock)]
pub trait TranscriptionEngine: Send {
    /// Feed raw 16kHz mono 16-bit PCM bytes
    fn accept(&mut self, audio: &[u8]) -> Result<(), TranscribeError>;

    /// Finalize the current utterance and return the transcript
    ///
    /// Returns an empty string (or [`UNK_TOKEN`]) when nothing was recognized.
    fn final_transcript(&mut self) -> Result<String, TranscribeError>;
}

/// Factory constructing engines from a local model directory
#[cfg_attr(test, mockall::automock)]
pub trait TranscriptionBackend: Send + Sync {
    fn load(
        &self,
        model_dir: &Path,
        vocabulary: &VocabularyMode,
    ) -> Result<Box<dyn TranscriptionEngine>, TranscribeError>;
}

/// Stand-in backend used when no real engine is linked
///
/// Always reports no recognition. Lets the service binary and examples run
/// without a speech model installed.
pub struct NullBackend;

impl TranscriptionBackend for NullBackend {
    fn load(
        &self,
        model_dir: &Path,
        _vocabulary: &VocabularyMode,
    ) -> Result<Box<dyn TranscriptionEngine>, TranscribeError> {
        if !model_dir.is_dir() {
            return Err(TranscribeError::ModelNotFound(model_dir.to_path_buf()));
        }
        warn!("Using null transcription backend: nothing will ever be recognized");
        Ok(Box::new(NullEngine))
    }
}

struct NullEngine;

impl TranscriptionEngine for NullEngine {
    fn accept(&mut self, _audio: &[u8]) -> Result<(), TranscribeError> {
        Ok(())
    }

    fn final_transcript(&mut self) -> Result<String, TranscribeError> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_vocabulary_has_no_grammar() {
        assert_eq!(VocabularyMode::Full.grammar_json(), None);
    }

    #[test]
    fn test_constrained_grammar_includes_unk() {
        let mode = VocabularyMode::Constrained(vec![
            "hey mycroft".to_string(),
            "hey computer".to_string(),
        ]);

        let grammar = mode.grammar_json().unwrap();
        let parsed: Vec<String> = serde_json::from_str(&grammar).unwrap();

        assert_eq!(parsed, vec!["hey mycroft", "hey computer", UNK_TOKEN]);
    }

    #[test]
    fn test_null_backend_requires_model_dir() {
        let missing = Path::new("/definitely/not/a/model/dir");
        let result = NullBackend.load(missing, &VocabularyMode::Full);

        assert!(matches!(result, Err(TranscribeError::ModelNotFound(_))));
    }

    #[test]
    fn test_null_engine_never_recognizes() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = NullBackend.load(dir.path(), &VocabularyMode::Full).unwrap();

        engine.accept(&[0u8; 640]).unwrap();
        assert_eq!(engine.final_transcript().unwrap(), "");
    }
}
