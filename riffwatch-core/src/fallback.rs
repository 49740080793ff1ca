//! Last known-good snapshot.

use crate::types::Snapshot;

/// Holds the most recent snapshot in which a real song was identified.
///
/// Failed ticks and snapshots without a song identity never overwrite it.
#[derive(Debug, Default, Clone)]
pub struct FallbackCache {
    last_good: Option<Snapshot>,
}

impl FallbackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a snapshot; returns whether it replaced the cached one.
    pub fn update(&mut self, snapshot: Snapshot) -> bool {
        if !snapshot.is_identified() {
            return false;
        }
        self.last_good = Some(snapshot);
        true
    }

    /// The cached snapshot, or an all-default one before any identification.
    pub fn get(&self) -> Snapshot {
        self.last_good.clone().unwrap_or_default()
    }

    /// True once any song has been identified.
    pub fn has_identified(&self) -> bool {
        self.last_good.is_some()
    }
}
