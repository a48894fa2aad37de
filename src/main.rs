/// Hotword detection service binary
///
/// Scans a WAV file for the configured hotword, feeding it through the
/// detector in 0.2s chunks the way a live microphone host would. The
/// transcription backend is the null stand-in unless a real engine is wired
/// in; swap `NullBackend` for your engine's `TranscriptionBackend` impl.

use anyhow::{bail, Context, Result};
use hotword_detector::{
    DetectorConfig, ModelCache, NullBackend, SingleKeywordDetector, StaticModelSource,
    ENGINE_SAMPLE_RATE, SECS_PER_CHUNK,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hotword_detector=debug".parse().unwrap()),
        )
        .init();

    info!("Starting hotword detection service v{}", hotword_detector::VERSION);

    if let Err(e) = run().await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let wav_path = match std::env::args().nth(1) {
        Some(path) => path,
        None => bail!("usage: hotword-service <audio.wav>"),
    };

    let config = load_config()?;
    info!("Hotword: '{}', rule: {:?}", config.hotword, config.rule);

    let model_dir = std::env::var("HOTWORD_MODEL_DIR").unwrap_or_else(|_| "models".to_string());
    let cache = ModelCache::new(
        Box::new(StaticModelSource::with_fallback(model_dir)),
        Box::new(NullBackend),
    );

    let detector = SingleKeywordDetector::new(config, &cache)
        .await
        .context("Failed to create detector")?;

    let audio = read_wav(&wav_path).context("Failed to read audio file")?;
    info!("Scanning {} ({} bytes of PCM)", wav_path, audio.len());

    // One chunk per 0.2s of audio, matching the live delivery cadence
    let chunk_bytes = (ENGINE_SAMPLE_RATE as f32 * SECS_PER_CHUNK) as usize * 2;
    let mut detections = 0u32;

    for chunk in audio.chunks(chunk_bytes) {
        if detector.found_wake_word(chunk).await {
            detections += 1;
            info!("Hotword detected at ~{:.1}s", offset_secs(&detector).await);
        }
    }

    let stats = detector.stats().await;
    info!(
        "Done: {} detections over {} checks ({} chunks)",
        detections, stats.checks_run, stats.chunks_received
    );

    Ok(())
}

async fn offset_secs(detector: &SingleKeywordDetector) -> f32 {
    detector.stats().await.chunks_received as f32 * SECS_PER_CHUNK
}

/// Load detector configuration from the environment
fn load_config() -> Result<DetectorConfig> {
    let mut config = DetectorConfig::default();

    if let Ok(phrase) = std::env::var("HOTWORD_PHRASE") {
        config.hotword = phrase;
    }

    if let Ok(rule) = std::env::var("HOTWORD_RULE") {
        config.rule = serde_json::from_value(serde_json::Value::String(rule))
            .context("Unrecognized HOTWORD_RULE")?;
    }

    if let Ok(threshold) = std::env::var("HOTWORD_THRESHOLD") {
        config.threshold = threshold.parse().context("Invalid HOTWORD_THRESHOLD")?;
    }

    if let Ok(lang) = std::env::var("HOTWORD_LANG") {
        config.lang = lang.as_str().into();
    }

    Ok(config)
}

/// Read a WAV file into raw 16kHz mono 16-bit little-endian PCM bytes
fn read_wav(path: &str) -> Result<Vec<u8>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_rate != ENGINE_SAMPLE_RATE {
        warn!(
            "Expected {}Hz audio, got {}Hz; results will be unreliable",
            ENGINE_SAMPLE_RATE, spec.sample_rate
        );
    }
    if spec.channels != 1 {
        warn!("Expected mono audio, got {} channels", spec.channels);
    }

    let mut bytes = Vec::new();
    for sample in reader.samples::<i16>() {
        let sample = sample.context("Malformed WAV sample")?;
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    Ok(bytes)
}
