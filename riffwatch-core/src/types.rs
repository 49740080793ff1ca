//! Core domain types for riffwatch
//!
//! These types form the canonical read model that normalizes whatever the
//! telemetry source happens to emit on a given day.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Snapshot** | One fully-defaulted reading of the current song and note stats |
//! | **History** | The last [`HISTORY_CAPACITY`] accuracy samples, oldest first |
//! | **Watermark** | Highest streak seen during this process lifetime; never decreases |
//! | **Tip** | A theory/trivia text pair attached to a song title |
//! | **ReadModel** | Everything a presentation consumer sees, published atomically |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Placeholder for any text field the source did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// Number of accuracy samples retained in [`History`].
pub const HISTORY_CAPACITY: usize = 10;

// ============================================
// Snapshot
// ============================================

/// Canonical telemetry record.
///
/// Every field has a default, so a consumer never sees a half-filled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub song: String,
    pub artist: String,
    pub album: String,
    /// Hit accuracy, clamped to `0.0..=100.0`
    pub accuracy: f64,
    pub current_streak: u32,
    /// Highest streak as reported by the source (may regress)
    pub highest_streak: u32,
    pub is_playing: bool,
    /// Seconds into the current song
    pub song_timer: f64,
    /// Song length in seconds
    pub song_length: f64,
    pub theory: String,
    pub trivia: String,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            song: NOT_AVAILABLE.to_string(),
            artist: NOT_AVAILABLE.to_string(),
            album: NOT_AVAILABLE.to_string(),
            accuracy: 0.0,
            current_streak: 0,
            highest_streak: 0,
            is_playing: false,
            song_timer: 0.0,
            song_length: 0.0,
            theory: NOT_AVAILABLE.to_string(),
            trivia: NOT_AVAILABLE.to_string(),
        }
    }
}

impl Snapshot {
    /// True when a real song was detected.
    pub fn is_identified(&self) -> bool {
        self.song != NOT_AVAILABLE
    }

    /// Copy of this snapshot carrying the given tip pair, or the defaults.
    pub fn with_tips(&self, tips: Option<&TipEntry>) -> Snapshot {
        let (theory, trivia) = match tips {
            Some(entry) => (entry.theory.clone(), entry.trivia.clone()),
            None => (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string()),
        };
        Snapshot {
            theory,
            trivia,
            ..self.clone()
        }
    }
}

// ============================================
// History
// ============================================

/// Rolling window of accuracy samples.
///
/// Index 0 is the oldest retained sample. When full, the oldest sample is
/// evicted before a new one is appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    samples: VecDeque<f64>,
}

impl History {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, sample: f64) {
        while self.samples.len() >= HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

// ============================================
// Tips
// ============================================

/// Advisory text attached to a song title in the tip store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipEntry {
    pub theory: String,
    pub trivia: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
}

impl TipEntry {
    pub fn new(theory: impl Into<String>, trivia: impl Into<String>) -> Self {
        Self {
            theory: theory.into(),
            trivia: trivia.into(),
            artist: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }
}

// ============================================
// Read model
// ============================================

/// Connection status shown to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Last tick produced a fresh, identified snapshot
    Connected,
    /// No song has been identified yet
    Waiting,
    /// A song was identified earlier but the latest tick failed
    Degraded,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Connected => "connected",
            Status::Waiting => "waiting",
            Status::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The externally published aggregate.
///
/// Produced only by the polling loop and swapped in whole; readers hold an
/// `Arc<ReadModel>` and never observe a partial update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadModel {
    pub snapshot: Snapshot,
    pub history: History,
    pub live_ai_enabled: bool,
    pub status: Status,
    /// Highest streak seen this session
    pub session_best_streak: u32,
    /// Publish counter, strictly increasing
    pub generation: u64,
    pub updated_at: DateTime<Utc>,
}

impl ReadModel {
    /// The model published before the first tick completes.
    pub fn initial() -> Self {
        Self {
            snapshot: Snapshot::default(),
            history: History::new(),
            live_ai_enabled: false,
            status: Status::Waiting,
            session_best_streak: 0,
            generation: 0,
            updated_at: Utc::now(),
        }
    }
}
