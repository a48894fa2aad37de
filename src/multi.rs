/// Multi-keyword detector
///
/// Runs many named keywords, each with its own language, phrase-set, rule
/// and threshold, over one shared audio stream. Language models are shared
/// through the cache and each language is transcribed at most once per check
/// tick. Keywords flagged `wakeup` reactivate listening through the event
/// sink instead of reporting a full trigger.

use crate::audio_buffer::AudioRingBuffer;
use crate::detector::{transcribe_window, CheckThrottle, DetectorError};
use crate::lang::LanguageTag;
use crate::matching::{self, normalize, Rule, DEFAULT_THRESHOLD};
use crate::model_cache::{EngineHandle, ModelCache};
use crate::transcribe::{VocabularyMode, UNK_TOKEN};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Per-keyword configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Language whose model transcribes audio for this keyword
    pub lang: LanguageTag,

    /// Phrase-set; defaults to the keyword name with separators as spaces
    pub phrases: Option<Vec<String>>,

    pub rule: Rule,

    pub threshold: f32,

    /// Reactivates listening instead of triggering the assistant
    pub wakeup: bool,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            lang: LanguageTag::default(),
            phrases: None,
            rule: Rule::default(),
            threshold: DEFAULT_THRESHOLD,
            wakeup: false,
        }
    }
}

/// A named keyword; declaration order is evaluation order
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordEntry {
    pub name: String,
    #[serde(flatten)]
    pub config: KeywordConfig,
}

impl KeywordEntry {
    fn phrase_set(&self) -> Vec<String> {
        match &self.config.phrases {
            Some(phrases) if !phrases.is_empty() => phrases.clone(),
            _ => vec![self.name.replace(['_', '-'], " ")],
        }
    }
}

/// Configuration for the multi-keyword detector
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MultiDetectorConfig {
    /// Keywords in stable evaluation order
    pub keywords: Vec<KeywordEntry>,

    /// Seconds of delivered audio between transcript checks (clamped to 3s)
    pub time_between_checks: f32,

    /// Load every language's engine in full-vocabulary mode
    pub full_vocabulary: bool,

    /// Log every transcript at info level
    pub debug: bool,
}

impl Default for MultiDetectorConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            time_between_checks: 0.5,
            full_vocabulary: false,
            debug: false,
        }
    }
}

impl MultiDetectorConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.keywords.is_empty() {
            return Err(DetectorError::InvalidConfig(
                "at least one keyword is required".to_string(),
            ));
        }

        let mut seen = Vec::new();
        for entry in &self.keywords {
            if entry.name.trim().is_empty() {
                return Err(DetectorError::InvalidConfig(
                    "keyword names must not be empty".to_string(),
                ));
            }
            if seen.contains(&entry.name) {
                return Err(DetectorError::InvalidConfig(format!(
                    "duplicate keyword name '{}'",
                    entry.name
                )));
            }
            seen.push(entry.name.clone());

            if !(0.0..=1.0).contains(&entry.config.threshold) {
                return Err(DetectorError::InvalidConfig(format!(
                    "threshold for '{}' must be between 0.0 and 1.0",
                    entry.name
                )));
            }
        }

        if self.time_between_checks <= 0.0 {
            return Err(DetectorError::InvalidConfig(
                "time_between_checks must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Languages in first-appearance order, deduplicated
    fn languages(&self) -> Vec<LanguageTag> {
        let mut langs = Vec::new();
        for entry in &self.keywords {
            if !langs.contains(&entry.config.lang) {
                langs.push(entry.config.lang.clone());
            }
        }
        langs
    }

    /// Vocabulary mode for one language's engine: constrained to every
    /// phrase of every keyword in that language, unless full vocabulary is
    /// requested
    fn vocabulary_mode(&self, lang: &LanguageTag) -> VocabularyMode {
        if self.full_vocabulary {
            return VocabularyMode::Full;
        }

        let phrases: Vec<String> = self
            .keywords
            .iter()
            .filter(|entry| &entry.config.lang == lang)
            .flat_map(|entry| entry.phrase_set())
            .collect();
        VocabularyMode::Constrained(phrases)
    }
}

/// Event published toward the assistant's bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// A `wakeup`-flagged keyword matched: resume listening, no trigger
    ResumeListening { keyword: String },
}

struct PreparedKeyword {
    name: String,
    lang: LanguageTag,
    phrases: Vec<String>,
    rule: Rule,
    threshold: f32,
    wakeup: bool,
}

struct MultiLoopState {
    throttle: CheckThrottle,
    chunks_received: u64,
    checks_run: u64,
    detections: u64,
    wakeups: u64,
}

/// Multi-keyword detector statistics
#[derive(Debug, Clone)]
pub struct MultiDetectorStats {
    pub chunks_received: u64,
    pub checks_run: u64,
    pub detections: u64,
    pub wakeups: u64,
    pub buffered_bytes: usize,
}

/// Detector evaluating many keywords over one shared audio stream
pub struct MultiKeywordDetector {
    config: MultiDetectorConfig,
    keywords: Vec<PreparedKeyword>,
    engines: HashMap<LanguageTag, EngineHandle>,
    buffer: AudioRingBuffer,
    state: Mutex<MultiLoopState>,
    events: Option<UnboundedSender<ListenerEvent>>,
}

impl MultiKeywordDetector {
    /// Create a detector, loading one engine per configured language
    ///
    /// Every language must resolve to a model; a missing model is a fatal
    /// configuration error here rather than a per-tick failure.
    pub async fn new(
        config: MultiDetectorConfig,
        cache: &ModelCache,
        events: Option<UnboundedSender<ListenerEvent>>,
    ) -> Result<Self, DetectorError> {
        config.validate()?;

        info!("Initializing multi-keyword detector ({} keywords)", config.keywords.len());

        let mut engines = HashMap::new();
        for lang in config.languages() {
            let engine = cache.get_engine(&lang, &config.vocabulary_mode(&lang)).await?;
            engines.insert(lang, engine);
        }

        let keywords = config
            .keywords
            .iter()
            .map(|entry| PreparedKeyword {
                name: entry.name.clone(),
                lang: entry.config.lang.clone(),
                phrases: entry.phrase_set(),
                rule: entry.config.rule,
                threshold: entry.config.threshold,
                wakeup: entry.config.wakeup,
            })
            .collect();

        let state = MultiLoopState {
            throttle: CheckThrottle::new(config.time_between_checks),
            chunks_received: 0,
            checks_run: 0,
            detections: 0,
            wakeups: 0,
        };

        Ok(Self {
            config,
            keywords,
            engines,
            buffer: AudioRingBuffer::new(),
            state: Mutex::new(state),
            events,
        })
    }

    /// Feed one audio chunk; the name of the triggered keyword, if any
    ///
    /// On a due check, audio is transcribed at most once per language and
    /// keywords are evaluated in declaration order; the first match clears
    /// the buffer and short-circuits the rest. A `wakeup` keyword notifies
    /// the event sink and reports no trigger.
    pub async fn check(&self, chunk: &[u8]) -> Option<String> {
        self.buffer.append(chunk);

        let mut state = self.state.lock().await;
        state.chunks_received += 1;

        if !state.throttle.tick() {
            return None;
        }
        state.checks_run += 1;
        drop(state);

        let audio = self.buffer.drain();
        if audio.is_empty() {
            return None;
        }

        // One transcript per language per tick, fetched lazily
        let mut transcripts: HashMap<LanguageTag, Option<String>> = HashMap::new();

        for keyword in &self.keywords {
            if !transcripts.contains_key(&keyword.lang) {
                let engine = &self.engines[&keyword.lang];
                let transcript = transcribe_window(engine, &audio).await;
                if self.config.debug {
                    if let Some(t) = &transcript {
                        info!("TRANSCRIPT [{}]: {}", keyword.lang, t);
                    }
                }
                transcripts.insert(keyword.lang.clone(), transcript);
            }

            let transcript = match &transcripts[&keyword.lang] {
                Some(t) => t,
                None => continue,
            };

            // No information in this language's window
            let normalized = normalize(transcript);
            if normalized.is_empty() || normalized == UNK_TOKEN {
                continue;
            }

            if matching::evaluate(transcript, &keyword.phrases, keyword.rule, keyword.threshold) {
                self.buffer.clear();
                let mut state = self.state.lock().await;

                if keyword.wakeup {
                    state.wakeups += 1;
                    info!("Wakeup keyword '{}' matched, resuming listening", keyword.name);
                    self.emit(ListenerEvent::ResumeListening {
                        keyword: keyword.name.clone(),
                    });
                    return None;
                }

                state.detections += 1;
                info!("Keyword '{}' detected", keyword.name);
                return Some(keyword.name.clone());
            }

            debug!("Keyword '{}' did not match", keyword.name);
        }

        None
    }

    fn emit(&self, event: ListenerEvent) {
        if let Some(sender) = &self.events {
            if let Err(e) = sender.send(event) {
                error!("Failed to publish listener event: {}", e);
            }
        }
    }

    /// Current statistics
    pub async fn stats(&self) -> MultiDetectorStats {
        let state = self.state.lock().await;
        MultiDetectorStats {
            chunks_received: state.chunks_received,
            checks_run: state.checks_run,
            detections: state.detections,
            wakeups: state.wakeups,
            buffered_bytes: self.buffer.len(),
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
        state.wakeups = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_cache::StaticModelSource;
    use crate::transcribe::{MockTranscriptionBackend, MockTranscriptionEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Cache serving one scripted engine per language. Each engine always
    /// reports the same transcript and counts its transcription calls.
    fn multilang_cache(
        scripts: &[(&str, &str)],
    ) -> (ModelCache, HashMap<String, Arc<AtomicUsize>>) {
        let mut source = StaticModelSource::new();
        let mut counters = HashMap::new();
        let mut by_path: HashMap<String, (String, Arc<AtomicUsize>)> = HashMap::new();

        for (lang, transcript) in scripts {
            let path = format!("/models/{}", lang);
            let counter = Arc::new(AtomicUsize::new(0));
            counters.insert(lang.to_string(), Arc::clone(&counter));
            by_path.insert(path.clone(), (transcript.to_string(), counter));
            source.insert(LanguageTag::new(lang), path);
        }

        let mut backend = MockTranscriptionBackend::new();
        backend.expect_load().returning(move |dir, _| {
            let key = dir.to_string_lossy().to_string();
            let (transcript, counter) = by_path[&key].clone();

            let mut engine = MockTranscriptionEngine::new();
            engine.expect_accept().returning(|_| Ok(()));
            engine.expect_final_transcript().returning(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(transcript.clone())
            });
            Ok(Box::new(engine))
        });

        (ModelCache::new(Box::new(source), Box::new(backend)), counters)
    }

    fn keyword(name: &str, lang: &str, wakeup: bool) -> KeywordEntry {
        KeywordEntry {
            name: name.to_string(),
            config: KeywordConfig {
                lang: LanguageTag::new(lang),
                wakeup,
                ..Default::default()
            },
        }
    }

    fn config(keywords: Vec<KeywordEntry>) -> MultiDetectorConfig {
        MultiDetectorConfig {
            keywords,
            time_between_checks: 0.2,
            ..Default::default()
        }
    }

    fn chunk() -> Vec<u8> {
        vec![1u8; 6400]
    }

    #[tokio::test]
    async fn test_one_transcription_per_language_per_tick() {
        // Two keywords share English; neither matches the transcript
        let (cache, counters) = multilang_cache(&[("en", "something unrelated")]);
        let keywords = vec![
            keyword("hey mycroft", "en", false),
            keyword("hey computer", "en", false),
        ];
        let detector = MultiKeywordDetector::new(config(keywords), &cache, None)
            .await
            .unwrap();

        assert_eq!(detector.check(&chunk()).await, None);
        assert_eq!(counters["en"].load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_each_language_transcribed_once() {
        let (cache, counters) =
            multilang_cache(&[("en", "nothing here"), ("de", "auch nichts")]);
        let keywords = vec![
            keyword("hey mycroft", "en", false),
            keyword("hallo computer", "de", false),
            keyword("hey computer", "en", false),
        ];
        let detector = MultiKeywordDetector::new(config(keywords), &cache, None)
            .await
            .unwrap();

        assert_eq!(detector.check(&chunk()).await, None);
        assert_eq!(counters["en"].load(Ordering::SeqCst), 1);
        assert_eq!(counters["de"].load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_match_short_circuits_remaining_languages() {
        let (cache, counters) = multilang_cache(&[("en", "hey mycroft"), ("de", "hallo")]);
        let keywords = vec![
            keyword("hey mycroft", "en", false),
            keyword("hallo computer", "de", false),
        ];
        let detector = MultiKeywordDetector::new(config(keywords), &cache, None)
            .await
            .unwrap();

        assert_eq!(detector.check(&chunk()).await, Some("hey mycroft".to_string()));
        // The German engine was never consulted this tick
        assert_eq!(counters["de"].load(Ordering::SeqCst), 0);
        // Matched: buffer cleared
        assert_eq!(detector.stats().await.buffered_bytes, 0);
    }

    #[tokio::test]
    async fn test_declaration_order_decides_between_two_matches() {
        let (cache, _) = multilang_cache(&[("en", "hey mycroft and hey computer")]);
        let keywords = vec![
            keyword("hey computer", "en", false),
            keyword("hey mycroft", "en", false),
        ];
        let detector = MultiKeywordDetector::new(config(keywords), &cache, None)
            .await
            .unwrap();

        assert_eq!(detector.check(&chunk()).await, Some("hey computer".to_string()));
    }

    #[tokio::test]
    async fn test_wakeup_keyword_emits_event_but_no_trigger() {
        let (cache, _) = multilang_cache(&[("en", "wake up")]);
        let keywords = vec![
            keyword("wake up", "en", true),
            keyword("hey mycroft", "en", false),
        ];
        let (tx, mut rx) = mpsc::unbounded_channel();
        let detector = MultiKeywordDetector::new(config(keywords), &cache, Some(tx))
            .await
            .unwrap();

        assert_eq!(detector.check(&chunk()).await, None);

        assert_eq!(
            rx.try_recv().unwrap(),
            ListenerEvent::ResumeListening {
                keyword: "wake up".to_string()
            }
        );

        let stats = detector.stats().await;
        assert_eq!(stats.wakeups, 1);
        assert_eq!(stats.detections, 0);
        assert_eq!(stats.buffered_bytes, 0);
    }

    #[tokio::test]
    async fn test_unknown_transcript_skips_keyword() {
        let (cache, _) = multilang_cache(&[("en", UNK_TOKEN)]);
        let keywords = vec![keyword("hey mycroft", "en", false)];
        let detector = MultiKeywordDetector::new(config(keywords), &cache, None)
            .await
            .unwrap();

        assert_eq!(detector.check(&chunk()).await, None);
        // No match: audio retained for the next window
        assert_eq!(detector.stats().await.buffered_bytes, chunk().len());
    }

    #[tokio::test]
    async fn test_no_check_below_interval() {
        let (cache, counters) = multilang_cache(&[("en", "hey mycroft")]);
        let keywords = vec![keyword("hey mycroft", "en", false)];
        let mut cfg = config(keywords);
        cfg.time_between_checks = 1.0;
        let detector = MultiKeywordDetector::new(cfg, &cache, None).await.unwrap();

        for _ in 0..4 {
            assert_eq!(detector.check(&chunk()).await, None);
        }
        assert_eq!(counters["en"].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shared_language_loads_one_engine() {
        let (cache, _) = multilang_cache(&[("en", "irrelevant")]);
        let keywords = vec![
            keyword("hey mycroft", "en", false),
            keyword("hey computer", "en", false),
        ];
        MultiKeywordDetector::new(config(keywords), &cache, None)
            .await
            .unwrap();

        assert_eq!(cache.loaded_languages().await.len(), 1);
    }

    #[test]
    fn test_config_validation() {
        let empty = MultiDetectorConfig::default();
        assert!(empty.validate().is_err());

        let duplicate = config(vec![
            keyword("hey mycroft", "en", false),
            keyword("hey mycroft", "de", false),
        ]);
        assert!(duplicate.validate().is_err());

        let mut bad_threshold = config(vec![keyword("hey mycroft", "en", false)]);
        bad_threshold.keywords[0].config.threshold = 2.0;
        assert!(bad_threshold.validate().is_err());
    }

    #[test]
    fn test_vocabulary_groups_phrases_by_language() {
        let cfg = config(vec![
            keyword("hey_mycroft", "en", false),
            keyword("hallo-computer", "de", false),
            keyword("hey computer", "en", false),
        ]);

        match cfg.vocabulary_mode(&LanguageTag::new("en")) {
            VocabularyMode::Constrained(phrases) => {
                assert_eq!(phrases, vec!["hey mycroft", "hey computer"]);
            }
            VocabularyMode::Full => panic!("expected constrained mode"),
        }
    }

    #[test]
    fn test_config_deserializes_keyword_map_entries() {
        let json = r#"{
            "keywords": [
                {"name": "hey_mycroft", "lang": "en-US", "rule": "fuzzy", "threshold": 0.8},
                {"name": "acorda", "lang": "pt-PT", "wakeup": true}
            ],
            "time_between_checks": 1.2
        }"#;

        let cfg: MultiDetectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.keywords.len(), 2);
        assert_eq!(cfg.keywords[0].config.lang, LanguageTag::new("en"));
        assert_eq!(cfg.keywords[0].config.rule, Rule::Fuzzy);
        assert!(cfg.keywords[1].config.wakeup);
        assert_eq!(cfg.keywords[1].phrase_set(), vec!["acorda"]);
    }
}
