use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;

/// One immutable cache entry mapping a fingerprint to generated artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub audio_path: PathBuf,
    pub subtitle_path: Option<PathBuf>,
}

/// Content-addressed cache for generated speech.
///
/// Equal (text, voice, rate, volume, pitch) inputs always resolve to the
/// same fingerprint, so an unchanged segment never pays a second network
/// call. The mapping is persisted as JSON; entries whose files vanished
/// from disk are purged on lookup rather than trusted.
pub struct SpeechCache {
    mapping_file: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SpeechCache {
    /// Open (or create) the cache under the given directory.
    pub fn open(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)?;
        let mapping_file = cache_dir.join("tts_cache.json");

        let entries = if mapping_file.exists() {
            match std::fs::read_to_string(&mapping_file) {
                Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                    warn!("Could not parse cache mapping, starting fresh: {e}");
                    HashMap::new()
                }),
                Err(e) => {
                    warn!("Could not read cache mapping, starting fresh: {e}");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            mapping_file,
            entries: Mutex::new(entries),
        })
    }

    /// Deterministic fingerprint over all generation parameters. Any one
    /// differing field yields a different fingerprint.
    pub fn fingerprint(text: &str, voice: &str, rate: &str, volume: &str, pitch: &str) -> String {
        let mut hasher = Sha256::new();
        for field in [text, voice, rate, volume, pitch] {
            hasher.update(field.as_bytes());
            hasher.update([0x1f]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Look up a fingerprint. An entry whose audio file is missing on
    /// disk is treated as a miss and removed (self-healing against
    /// partial deletion).
    pub fn lookup(&self, fingerprint: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        let entry = entries.get(fingerprint)?.clone();
        if !entry.audio_path.exists() {
            debug!("Purging stale cache entry: {}", &fingerprint[..8]);
            entries.remove(fingerprint);
            drop(entries);
            let _ = self.persist();
            return None;
        }

        let subtitle_path = entry
            .subtitle_path
            .filter(|p| p.exists());

        Some(CacheEntry {
            audio_path: entry.audio_path,
            subtitle_path,
        })
    }

    /// Store a mapping. Idempotent; last write for a fingerprint wins.
    pub fn store(
        &self,
        fingerprint: &str,
        audio_path: PathBuf,
        subtitle_path: Option<PathBuf>,
    ) -> Result<()> {
        {
            let mut entries = self.entries.lock().expect("cache lock poisoned");
            entries.insert(
                fingerprint.to_string(),
                CacheEntry {
                    audio_path,
                    subtitle_path,
                },
            );
        }
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self) -> Result<()> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        let contents = serde_json::to_string_pretty(&*entries)?;
        std::fs::write(&self.mapping_file, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = SpeechCache::fingerprint("hello", "en-US-AvaMultilingualNeural", "+0%", "+0%", "+0Hz");
        let b = SpeechCache::fingerprint("hello", "en-US-AvaMultilingualNeural", "+0%", "+0%", "+0Hz");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_differs_per_field() {
        let base = SpeechCache::fingerprint("hello", "voice", "+0%", "+0%", "+0Hz");
        assert_ne!(base, SpeechCache::fingerprint("hello!", "voice", "+0%", "+0%", "+0Hz"));
        assert_ne!(base, SpeechCache::fingerprint("hello", "other", "+0%", "+0%", "+0Hz"));
        assert_ne!(base, SpeechCache::fingerprint("hello", "voice", "+10%", "+0%", "+0Hz"));
        assert_ne!(base, SpeechCache::fingerprint("hello", "voice", "+0%", "-5%", "+0Hz"));
        assert_ne!(base, SpeechCache::fingerprint("hello", "voice", "+0%", "+0%", "+2Hz"));
    }

    #[test]
    fn test_fingerprint_fields_do_not_bleed() {
        // Separator prevents "ab"+"c" colliding with "a"+"bc"
        let a = SpeechCache::fingerprint("ab", "c", "+0%", "+0%", "+0Hz");
        let b = SpeechCache::fingerprint("a", "bc", "+0%", "+0%", "+0Hz");
        assert_ne!(a, b);
    }

    #[test]
    fn test_store_and_lookup() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("seg.mp3");
        let srt = dir.path().join("seg.srt");
        std::fs::write(&audio, b"mp3").unwrap();
        std::fs::write(&srt, "1\n").unwrap();

        let cache = SpeechCache::open(dir.path()).unwrap();
        cache
            .store("abc123", audio.clone(), Some(srt.clone()))
            .unwrap();

        let entry = cache.lookup("abc123").unwrap();
        assert_eq!(entry.audio_path, audio);
        assert_eq!(entry.subtitle_path, Some(srt));
        assert!(cache.lookup("missing").is_none());
    }

    #[test]
    fn test_lookup_self_heals_missing_audio() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("gone.mp3");
        std::fs::write(&audio, b"mp3").unwrap();

        let cache = SpeechCache::open(dir.path()).unwrap();
        cache.store("key", audio.clone(), None).unwrap();

        std::fs::remove_file(&audio).unwrap();
        assert!(cache.lookup("key").is_none());
        // Entry was purged, not just skipped
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_drops_missing_subtitle_but_keeps_audio() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("seg.mp3");
        std::fs::write(&audio, b"mp3").unwrap();

        let cache = SpeechCache::open(dir.path()).unwrap();
        cache
            .store("key", audio.clone(), Some(dir.path().join("never-written.srt")))
            .unwrap();

        let entry = cache.lookup("key").unwrap();
        assert_eq!(entry.audio_path, audio);
        assert!(entry.subtitle_path.is_none());
    }

    #[test]
    fn test_mapping_survives_reopen() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("seg.mp3");
        std::fs::write(&audio, b"mp3").unwrap();

        {
            let cache = SpeechCache::open(dir.path()).unwrap();
            cache.store("persisted", audio.clone(), None).unwrap();
        }

        let reopened = SpeechCache::open(dir.path()).unwrap();
        assert!(reopened.lookup("persisted").is_some());
    }

    #[test]
    fn test_corrupt_mapping_starts_fresh() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("tts_cache.json"), "{not json").unwrap();

        let cache = SpeechCache::open(dir.path()).unwrap();
        assert!(cache.is_empty());
    }
}
