/// Hotword detector library
///
/// Detects wake phrases by transcribing buffered audio through a pluggable
/// speech-to-text engine and matching the transcript against configured
/// phrase-sets. Supports a single hotword or many named keywords across
/// languages, with language models shared through a per-language cache.

pub mod audio_buffer;
pub mod detector;
pub mod lang;
pub mod matching;
pub mod model_cache;
pub mod multi;
pub mod transcribe;

// Re-export main types
pub use audio_buffer::{AudioRingBuffer, BUFFER_CAPACITY, SAMPLE_RATE};
pub use detector::{
    DetectorConfig, DetectorError, DetectorStats, SingleKeywordDetector, MAX_TIME_BETWEEN_CHECKS,
    SECS_PER_CHUNK,
};
pub use lang::LanguageTag;
pub use matching::{evaluate, Rule, DEFAULT_THRESHOLD};
pub use model_cache::{CacheError, EngineHandle, ModelCache, ModelSource, StaticModelSource};
pub use multi::{
    KeywordConfig, KeywordEntry, ListenerEvent, MultiDetectorConfig, MultiDetectorStats,
    MultiKeywordDetector,
};
pub use transcribe::{
    NullBackend, TranscribeError, TranscriptionBackend, TranscriptionEngine, VocabularyMode,
    ENGINE_SAMPLE_RATE, UNK_TOKEN,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
