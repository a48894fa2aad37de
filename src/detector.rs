/// Detection loop and single-keyword detector
///
/// Orchestrates the core cycle: accumulate audio chunks in the ring buffer,
/// throttle transcript checks to a configured interval, pull a transcript
/// from the cached engine and evaluate it against the phrase-set. Per-tick
/// engine failures are absorbed so one bad chunk never stops detection.

use crate::audio_buffer::AudioRingBuffer;
use crate::lang::LanguageTag;
use crate::matching::{self, Rule, DEFAULT_THRESHOLD};
use crate::model_cache::{CacheError, EngineHandle, ModelCache};
use crate::transcribe::VocabularyMode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Seconds of audio represented by one delivered chunk
///
/// The host delivers chunks on a fixed cadence; the check throttle counts
/// chunk intervals rather than wall-clock time, so a stalled producer stalls
/// checks too.
pub const SECS_PER_CHUNK: f32 = 0.2;

/// Upper bound on the check interval, bounding latency and buffered audio
pub const MAX_TIME_BETWEEN_CHECKS: f32 = 3.0;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Model(#[from] CacheError),
}

/// Configuration for a single-keyword detector
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Hotword name; also the default phrase with `_`/`-` read as spaces
    pub hotword: String,

    /// Explicit phrase-set (synonyms); defaults to the hotword itself
    pub phrases: Option<Vec<String>>,

    /// Comparison rule applied to transcripts
    pub rule: Rule,

    /// Threshold for score-based rules (ignored by exact rules)
    pub threshold: f32,

    /// Seconds of delivered audio between transcript checks (clamped to 3s)
    pub time_between_checks: f32,

    /// Accept free speech instead of constraining the engine to the phrases
    pub full_vocabulary: bool,

    /// Language of the model used for transcription
    pub lang: LanguageTag,

    /// Log every transcript at info level
    pub debug: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            hotword: "hey mycroft".to_string(),
            phrases: None,
            rule: Rule::default(),
            threshold: DEFAULT_THRESHOLD,
            time_between_checks: 0.5,
            full_vocabulary: false,
            lang: LanguageTag::default(),
            debug: false,
        }
    }
}

impl DetectorConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.hotword.trim().is_empty() {
            return Err(DetectorError::InvalidConfig(
                "hotword must not be empty".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(DetectorError::InvalidConfig(
                "threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.time_between_checks <= 0.0 {
            return Err(DetectorError::InvalidConfig(
                "time_between_checks must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Phrase-set for matching; falls back to the hotword name with
    /// separators replaced by spaces
    pub fn phrase_set(&self) -> Vec<String> {
        match &self.phrases {
            Some(phrases) if !phrases.is_empty() => phrases.clone(),
            _ => vec![self.hotword.replace(['_', '-'], " ")],
        }
    }

    /// Vocabulary mode the engine should be loaded with
    pub fn vocabulary_mode(&self) -> VocabularyMode {
        if self.full_vocabulary {
            VocabularyMode::Full
        } else {
            VocabularyMode::Constrained(self.phrase_set())
        }
    }
}

/// Counts delivered chunk intervals and fires when the check interval is due
pub(crate) struct CheckThrottle {
    interval: f32,
    elapsed: f32,
}

impl CheckThrottle {
    /// Build a throttle, clamping the interval to [`MAX_TIME_BETWEEN_CHECKS`]
    pub(crate) fn new(interval: f32) -> Self {
        let clamped = interval.min(MAX_TIME_BETWEEN_CHECKS);
        if clamped < interval {
            warn!(
                "time_between_checks {}s clamped to {}s",
                interval, MAX_TIME_BETWEEN_CHECKS
            );
        }
        Self {
            interval: clamped,
            elapsed: 0.0,
        }
    }

    /// Advance by one chunk interval; true when a check is due
    pub(crate) fn tick(&mut self) -> bool {
        self.elapsed += SECS_PER_CHUNK;
        if self.elapsed < self.interval {
            return false;
        }
        self.elapsed = 0.0;
        true
    }

    pub(crate) fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

/// Run one transcription pass over a drained audio window
///
/// Engine failures are logged and reported as "no transcript"; the caller
/// treats that as a non-match and keeps the buffered audio for the next check.
pub(crate) async fn transcribe_window(engine: &EngineHandle, audio: &[u8]) -> Option<String> {
    let mut engine = engine.lock().await;

    if let Err(e) = engine.accept(audio) {
        warn!("Transcription engine rejected audio: {}", e);
        return None;
    }

    match engine.final_transcript() {
        Ok(transcript) => Some(transcript),
        Err(e) => {
            warn!("Transcription failed: {}", e);
            None
        }
    }
}

struct LoopState {
    throttle: CheckThrottle,
    chunks_received: u64,
    checks_run: u64,
    detections: u64,
}

/// Detector statistics
#[derive(Debug, Clone)]
pub struct DetectorStats {
    pub chunks_received: u64,
    pub checks_run: u64,
    pub detections: u64,
    pub buffered_bytes: usize,
    pub buffer_fill_percent: f32,
}

/// Wake-word detector for one phrase-set in one language
pub struct SingleKeywordDetector {
    config: DetectorConfig,
    phrases: Vec<String>,
    engine: EngineHandle,
    buffer: AudioRingBuffer,
    state: Mutex<LoopState>,
}

impl SingleKeywordDetector {
    /// Create a detector, loading its language model through the cache
    ///
    /// A missing model surfaces here as [`CacheError::ModelUnavailable`]; it
    /// is a configuration error, not something retried per tick.
    pub async fn new(config: DetectorConfig, cache: &ModelCache) -> Result<Self, DetectorError> {
        config.validate()?;

        info!("Initializing hotword detector '{}'", config.hotword);
        info!("Language: {}, rule: {:?}", config.lang, config.rule);

        let engine = cache
            .get_engine(&config.lang, &config.vocabulary_mode())
            .await?;

        let state = LoopState {
            throttle: CheckThrottle::new(config.time_between_checks),
            chunks_received: 0,
            checks_run: 0,
            detections: 0,
        };

        Ok(Self {
            phrases: config.phrase_set(),
            config,
            engine,
            buffer: AudioRingBuffer::new(),
            state: Mutex::new(state),
        })
    }

    /// Feed one audio chunk; true when the wake word was detected
    ///
    /// Most calls only accumulate audio. When the check interval is due the
    /// buffered audio is transcribed and matched; on a match the buffer is
    /// cleared, otherwise it keeps accumulating context for the next check.
    pub async fn found_wake_word(&self, chunk: &[u8]) -> bool {
        self.buffer.append(chunk);

        let mut state = self.state.lock().await;
        state.chunks_received += 1;

        if !state.throttle.tick() {
            return false;
        }
        state.checks_run += 1;
        drop(state);

        let audio = self.buffer.drain();
        if audio.is_empty() {
            return false;
        }

        let transcript = match transcribe_window(&self.engine, &audio).await {
            Some(t) => t,
            None => return false,
        };

        if self.config.debug {
            info!("TRANSCRIPT: {}", transcript);
        }

        if matching::evaluate(&transcript, &self.phrases, self.config.rule, self.config.threshold) {
            self.buffer.clear();
            let mut state = self.state.lock().await;
            state.detections += 1;
            info!("Hotword '{}' detected", self.config.hotword);
            return true;
        }

        debug!("No match; retaining {} buffered bytes", self.buffer.len());
        false
    }

    /// Current statistics
    pub async fn stats(&self) -> DetectorStats {
        let state = self.state.lock().await;
        DetectorStats {
            chunks_received: state.chunks_received,
            checks_run: state.checks_run,
            detections: state.detections,
            buffered_bytes: self.buffer.len(),
            buffer_fill_percent: self.buffer.len() as f32 / self.buffer.capacity() as f32 * 100.0,
        }
    }

    /// Drop buffered audio and restart the check cadence
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.buffer.clear();
        state.throttle.reset();
        state.chunks_received = 0;
        state.checks_run = 0;
        state.detections = 0;
        info!("Detector reset");
    }

    /// Configuration this detector was built with
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}
