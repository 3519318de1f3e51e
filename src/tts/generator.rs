use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{default_voice_for_language, SpeechCache, SpeechSynthesizer, SynthesisRequest};
use crate::error::{ExportError, Result};
use crate::ffmpeg::Ffmpeg;
use crate::model::Segment;
use crate::subtitle;

/// Artifacts produced (or reused) for one segment's narration.
#[derive(Debug, Clone)]
pub struct GeneratedSpeech {
    pub audio_path: PathBuf,
    pub subtitle_path: Option<PathBuf>,
    /// True when the result came from the cache without a network call.
    pub cached: bool,
}

/// Generates narration audio and subtitle timing, backed by the speech
/// cache. Constructed once and injected into the orchestrator.
pub struct SpeechGenerator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: Arc<SpeechCache>,
    ffmpeg: Ffmpeg,
    artifacts_dir: PathBuf,
    max_text_length: usize,
    /// Single-writer-per-fingerprint discipline: concurrent requests for
    /// the same fingerprint serialize here so generation happens at most
    /// once.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SpeechGenerator {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        cache: Arc<SpeechCache>,
        ffmpeg: Ffmpeg,
        artifacts_dir: PathBuf,
        max_text_length: usize,
    ) -> Self {
        Self {
            synthesizer,
            cache,
            ffmpeg,
            artifacts_dir,
            max_text_length,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Generate (or reuse) narration for a segment.
    ///
    /// A cache hit returns immediately with no network call. On a miss
    /// the provider is invoked, audio and SRT side-effect files are
    /// written, and the cache mapping is stored. Partial files from a
    /// failed attempt are deleted before the error propagates.
    pub async fn generate(&self, segment: &Segment) -> Result<GeneratedSpeech> {
        let text = segment.text.trim();
        if text.is_empty() {
            return Err(ExportError::Validation(format!(
                "Segment '{}' has no narration text",
                segment.name
            )));
        }
        if text.len() > self.max_text_length {
            return Err(ExportError::Validation(format!(
                "Segment '{}' narration is {} characters, exceeding the {} character limit",
                segment.name,
                text.len(),
                self.max_text_length
            )));
        }

        let voice = segment
            .voice
            .clone()
            .unwrap_or_else(|| default_voice_for_language(&segment.language).to_string());

        let fingerprint = SpeechCache::fingerprint(
            text,
            &voice,
            &segment.rate,
            &segment.volume,
            &segment.pitch,
        );

        // Serialize concurrent requests for the same fingerprint
        let key_lock = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(fingerprint.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = key_lock.lock().await;
        let result = self.generate_locked(segment, text, voice, &fingerprint).await;
        drop(guard);
        drop(key_lock);

        // Prune the serialization entry once no other request holds it
        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight
                .get(&fingerprint)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                in_flight.remove(&fingerprint);
            }
        }
        result
    }

    async fn generate_locked(
        &self,
        segment: &Segment,
        text: &str,
        voice: String,
        fingerprint: &str,
    ) -> Result<GeneratedSpeech> {
        if let Some(entry) = self.cache.lookup(fingerprint) {
            info!(
                "Using cached audio for segment '{}' ({})",
                segment.name,
                &fingerprint[..8]
            );
            return Ok(GeneratedSpeech {
                audio_path: entry.audio_path,
                subtitle_path: entry.subtitle_path,
                cached: true,
            });
        }

        debug!("Cache miss for segment '{}', synthesizing", segment.name);

        let request = SynthesisRequest {
            text: text.to_string(),
            voice,
            rate: segment.rate.clone(),
            volume: segment.volume.clone(),
            pitch: segment.pitch.clone(),
        };
        let output = self.synthesizer.synthesize(&request).await?;

        std::fs::create_dir_all(&self.artifacts_dir)?;
        let stem = file_stem(&segment.name, fingerprint);
        let audio_path = self.artifacts_dir.join(format!("{stem}.mp3"));
        let subtitle_path = self.artifacts_dir.join(format!("{stem}.srt"));

        let write_artifacts = || -> Result<()> {
            std::fs::write(&audio_path, &output.audio)?;

            let entries = if output.word_boundaries.is_empty() {
                warn!(
                    "No word boundaries for segment '{}', distributing timing evenly",
                    segment.name
                );
                let audio_duration = self.ffmpeg.media_duration(&audio_path).unwrap_or(10.0);
                subtitle::entries_from_plain_text(text, audio_duration)
            } else {
                subtitle::entries_from_word_boundaries(&output.word_boundaries)
            };
            std::fs::write(&subtitle_path, subtitle::format_srt(&entries))?;
            Ok(())
        };

        if let Err(e) = write_artifacts() {
            // No orphaned artifacts on failure
            let _ = std::fs::remove_file(&audio_path);
            let _ = std::fs::remove_file(&subtitle_path);
            return Err(e);
        }

        if let Err(e) =
            self.cache
                .store(fingerprint, audio_path.clone(), Some(subtitle_path.clone()))
        {
            // Artifacts without a mapping are unreachable; remove them
            let _ = std::fs::remove_file(&audio_path);
            let _ = std::fs::remove_file(&subtitle_path);
            return Err(e);
        }

        info!(
            "Generated audio for segment '{}': {}",
            segment.name,
            audio_path.display()
        );
        Ok(GeneratedSpeech {
            audio_path,
            subtitle_path: Some(subtitle_path),
            cached: false,
        })
    }

    pub fn cache(&self) -> &SpeechCache {
        &self.cache
    }

    #[cfg(test)]
    async fn in_flight_len(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

/// Filesystem-safe artifact stem: segment name with whitespace collapsed,
/// disambiguated by the fingerprint prefix.
fn file_stem(segment_name: &str, fingerprint: &str) -> String {
    let safe: String = segment_name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}_{}", &fingerprint[..8])
}
