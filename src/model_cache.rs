/// Per-language model cache
///
/// Owns one loaded transcription engine per language. Loading a model is
/// expensive (disk, possibly a download inside the source collaborator), so
/// each language is loaded at most once and shared between all detectors
/// using the same cache.

use crate::lang::LanguageTag;
use crate::transcribe::{TranscribeError, TranscriptionBackend, TranscriptionEngine, VocabularyMode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("No model available for language '{0}'")]
    ModelUnavailable(LanguageTag),

    #[error("Engine error: {0}")]
    Engine(#[from] TranscribeError),
}

/// Shared handle to a loaded engine
///
/// The engine itself is stateful across `accept`/`final_transcript`, so
/// callers serialize on the inner lock per utterance.
pub type EngineHandle = Arc<Mutex<Box<dyn TranscriptionEngine>>>;

/// Resolves a language to a local model directory
///
/// Implementations may download and unpack an archive as a side effect;
/// repeated calls for an already-resolved language must be cheap.
pub trait ModelSource: Send + Sync {
    fn resolve(&self, lang: &LanguageTag) -> Result<PathBuf, CacheError>;
}

/// Model source backed by an explicit language→path table
///
/// An optional fallback path serves every language not in the table, for
/// single-language setups configured with just `model_dir`.
#[derive(Debug, Default)]
pub struct StaticModelSource {
    paths: HashMap<LanguageTag, PathBuf>,
    fallback: Option<PathBuf>,
}

impl StaticModelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: HashMap::new(),
            fallback: Some(path.into()),
        }
    }

    pub fn insert(&mut self, lang: LanguageTag, path: impl Into<PathBuf>) {
        self.paths.insert(lang, path.into());
    }
}

impl ModelSource for StaticModelSource {
    fn resolve(&self, lang: &LanguageTag) -> Result<PathBuf, CacheError> {
        self.paths
            .get(lang)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| CacheError::ModelUnavailable(lang.clone()))
    }
}

/// Cache of loaded engines, keyed by normalized language tag
pub struct ModelCache {
    source: Box<dyn ModelSource>,
    backend: Box<dyn TranscriptionBackend>,
    engines: Mutex<HashMap<LanguageTag, EngineHandle>>,
}

impl ModelCache {
    pub fn new(source: Box<dyn ModelSource>, backend: Box<dyn TranscriptionBackend>) -> Self {
        Self {
            source,
            backend,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Get the engine for a language, loading it on first use
    ///
    /// The cache lock is held across the load, so concurrent first-use
    /// requests for the same language trigger exactly one load and all
    /// callers receive handles to the same engine. For an already-cached
    /// language the requested vocabulary mode is ignored; the first load
    /// wins.
    pub async fn get_engine(
        &self,
        lang: &LanguageTag,
        vocabulary: &VocabularyMode,
    ) -> Result<EngineHandle, CacheError> {
        let mut engines = self.engines.lock().await;

        if let Some(handle) = engines.get(lang) {
            debug!("Engine cache hit for language '{}'", lang);
            return Ok(Arc::clone(handle));
        }

        let model_dir = self.source.resolve(lang).map_err(|e| {
            error!("No model source for language '{}'", lang);
            e
        })?;

        info!("Loading model for language '{}' from {:?}", lang, model_dir);
        let engine = self.backend.load(&model_dir, vocabulary)?;

        let handle: EngineHandle = Arc::new(Mutex::new(engine));
        engines.insert(lang.clone(), Arc::clone(&handle));

        Ok(handle)
    }

    /// Release the engine for a language, if loaded; idempotent
    ///
    /// A later `get_engine` for the same language reloads from the source.
    pub async fn unload(&self, lang: &LanguageTag) {
        let mut engines = self.engines.lock().await;
        if engines.remove(lang).is_some() {
            info!("Unloaded model for language '{}'", lang);
        }
    }

    /// Languages with a currently loaded engine
    pub async fn loaded_languages(&self) -> Vec<LanguageTag> {
        let engines = self.engines.lock().await;
        engines.keys().cloned().collect()
    }
}
