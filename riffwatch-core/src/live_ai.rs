//! The live-AI flag and the tip generation it triggers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::RegenerationPolicy;
use crate::error::{Error, Result};
use crate::tips::{TipGenerator, TipStore};
use crate::types::NOT_AVAILABLE;

/// Owns the live-AI boolean.
///
/// Turning the flag on for an identified song runs the generator and merges
/// the result into the [`TipStore`]; turning it off does nothing else.
/// Toggles are serialized so two concurrent generate+merge rounds can never
/// interleave.
#[derive(Clone)]
pub struct LiveAiSwitch {
    enabled: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
    store: Arc<TipStore>,
    generator: Arc<dyn TipGenerator>,
    policy: RegenerationPolicy,
}

impl LiveAiSwitch {
    pub fn new(
        store: Arc<TipStore>,
        generator: Arc<dyn TipGenerator>,
        policy: RegenerationPolicy,
    ) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(Mutex::new(())),
            store,
            generator,
            policy,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the flag and return its new value.
    ///
    /// Generator and store failures are logged and leave the flag flipped;
    /// the snapshot then keeps showing default tips.
    pub async fn toggle(&self, song: &str, artist: &str) -> bool {
        let _gate = self.gate.lock().await;

        let enabled = !self.enabled.load(Ordering::SeqCst);
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, song = %song, "Live AI toggled");

        if enabled {
            if let Err(e) = self.refresh_tips(song, artist).await {
                tracing::warn!(song = %song, error = %e, "Tip generation failed");
            }
        }
        enabled
    }

    async fn refresh_tips(&self, song: &str, artist: &str) -> Result<()> {
        if song.is_empty() || song == NOT_AVAILABLE {
            tracing::debug!("No song identified, skipping tip generation");
            return Ok(());
        }

        if self.policy == RegenerationPolicy::Reuse {
            let store = Arc::clone(&self.store);
            let key = song.to_string();
            let cached = tokio::task::spawn_blocking(move || store.lookup(&key))
                .await
                .map_err(|e| Error::Persistence(format!("tip lookup task failed: {e}")))?;
            if cached.is_some() {
                tracing::debug!(song = %song, "Reusing stored tips");
                return Ok(());
            }
        }

        let entry = self.generator.generate(song, artist).await?;

        let store = Arc::clone(&self.store);
        let key = song.to_string();
        tokio::task::spawn_blocking(move || store.store(&key, entry))
            .await
            .map_err(|e| Error::Persistence(format!("tip store task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tips::GenerateFuture;
    use crate::types::TipEntry;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct CountingGenerator {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingGenerator {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TipGenerator for CountingGenerator {
        fn generate<'a>(&'a self, song: &'a str, artist: &'a str) -> GenerateFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(Error::Generator("provider down".to_string()));
                }
                Ok(TipEntry::new(format!("Theory for {song}"), "Trivia").with_artist(artist))
            })
        }
    }

    fn switch(
        dir: &TempDir,
        generator: Arc<CountingGenerator>,
        policy: RegenerationPolicy,
    ) -> (LiveAiSwitch, Arc<TipStore>) {
        let store = Arc::new(TipStore::open(dir.path().join("song_tips.json")));
        (
            LiveAiSwitch::new(Arc::clone(&store), generator, policy),
            store,
        )
    }

    #[tokio::test]
    async fn toggle_twice_restores_flag_and_off_never_generates() {
        let dir = TempDir::new().unwrap();
        let generator = CountingGenerator::new(false);
        let (switch, _) = switch(&dir, Arc::clone(&generator), RegenerationPolicy::Regenerate);

        assert!(!switch.is_enabled());
        assert!(switch.toggle("Crazy Train", "Ozzy Osbourne").await);
        assert_eq!(generator.calls(), 1);
        assert!(!switch.toggle("Crazy Train", "Ozzy Osbourne").await);
        assert_eq!(generator.calls(), 1);
        assert!(!switch.is_enabled());
    }

    #[tokio::test]
    async fn toggle_on_stores_generated_tips() {
        let dir = TempDir::new().unwrap();
        let generator = CountingGenerator::new(false);
        let (switch, store) = switch(&dir, generator, RegenerationPolicy::Reuse);

        switch.toggle("Crazy Train", "Ozzy Osbourne").await;

        let entry = store.lookup("Crazy Train").unwrap();
        assert_eq!(entry.theory, "Theory for Crazy Train");
        assert_eq!(entry.artist.as_deref(), Some("Ozzy Osbourne"));
    }

    #[tokio::test]
    async fn reuse_policy_skips_known_songs() {
        let dir = TempDir::new().unwrap();
        let generator = CountingGenerator::new(false);
        let (switch, _) = switch(&dir, Arc::clone(&generator), RegenerationPolicy::Reuse);

        switch.toggle("Crazy Train", "Ozzy").await;
        switch.toggle("Crazy Train", "Ozzy").await;
        switch.toggle("Crazy Train", "Ozzy").await;
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn regenerate_policy_always_calls_generator() {
        let dir = TempDir::new().unwrap();
        let generator = CountingGenerator::new(false);
        let (switch, _) = switch(&dir, Arc::clone(&generator), RegenerationPolicy::Regenerate);

        switch.toggle("Crazy Train", "Ozzy").await;
        switch.toggle("Crazy Train", "Ozzy").await;
        switch.toggle("Crazy Train", "Ozzy").await;
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn unidentified_song_skips_generator() {
        let dir = TempDir::new().unwrap();
        let generator = CountingGenerator::new(false);
        let (switch, store) = switch(&dir, Arc::clone(&generator), RegenerationPolicy::Regenerate);

        assert!(switch.toggle(NOT_AVAILABLE, NOT_AVAILABLE).await);
        assert_eq!(generator.calls(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn generator_failure_keeps_flag_and_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let generator = CountingGenerator::new(true);
        let (switch, store) = switch(&dir, Arc::clone(&generator), RegenerationPolicy::Reuse);

        assert!(switch.toggle("Crazy Train", "Ozzy").await);
        assert_eq!(generator.calls(), 1);
        assert!(store.lookup("Crazy Train").is_none());
    }
}
