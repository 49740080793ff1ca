//! Snapshot normalizer
//!
//! Maps a telemetry payload of unknown shape onto a canonical [`Snapshot`].
//!
//! The source's schema has drifted over time, so every field is resolved
//! through an ordered list of [`Lookup`] rules; the first rule that yields a
//! usable value wins and a field with no match falls back to its default.
//!
//! Shapes handled:
//!
//! - nested: note stats under `memoryReadout.noteData`, song details under
//!   `songDetails` or `memoryReadout.songDetails`
//! - flat: `memoryReadout` members (`noteData`, `gameStage`, `songID`) at the
//!   top level
//! - inconsistent key casing (`songDetails`, `SongDetails`, `songdetails`)
//! - `null` details objects
//! - numbers sent as strings
//!
//! Only a payload that is not a JSON object at all is rejected.

use serde_json::{Map, Value};

use crate::config::PollingConfig;
use crate::error::NormalizeError;
use crate::types::{Snapshot, NOT_AVAILABLE};

/// Where a field value may be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// `songDetails.<key>` at the top level
    Details(&'static str),
    /// `memoryReadout.songDetails.<key>`
    ReadoutDetails(&'static str),
    /// `memoryReadout.<key>`, or `<key>` for flat payloads
    Readout(&'static str),
    /// `memoryReadout.noteData.<key>`, or `noteData.<key>` for flat payloads
    NoteData(&'static str),
    /// `memoryReadout.songID` with a known prefix stripped
    SongId,
    /// Plain top-level `<key>`
    Top(&'static str),
}

const SONG: &[Lookup] = &[
    Lookup::Details("songName"),
    Lookup::ReadoutDetails("songName"),
    Lookup::SongId,
];
const ARTIST: &[Lookup] = &[
    Lookup::Details("artistName"),
    Lookup::ReadoutDetails("artistName"),
    Lookup::Top("artist"),
];
const ALBUM: &[Lookup] = &[
    Lookup::Details("albumName"),
    Lookup::ReadoutDetails("albumName"),
    Lookup::Top("album"),
];
const SONG_LENGTH: &[Lookup] = &[
    Lookup::Details("songLength"),
    Lookup::ReadoutDetails("songLength"),
];
const ACCURACY: &[Lookup] = &[
    Lookup::NoteData("Accuracy"),
    Lookup::Top("hitrate"),
    Lookup::Top("accuracy"),
];
const CURRENT_STREAK: &[Lookup] = &[
    Lookup::NoteData("CurrentHitStreak"),
    Lookup::Top("streak"),
];
const HIGHEST_STREAK: &[Lookup] = &[
    Lookup::NoteData("HighestHitStreak"),
    Lookup::Top("highest_streak"),
];
const GAME_STAGE: &[Lookup] = &[Lookup::Readout("gameStage")];
const SONG_TIMER: &[Lookup] = &[Lookup::Readout("songTimer")];

/// Normalizes raw telemetry into [`Snapshot`]s.
#[derive(Debug, Clone)]
pub struct SnapshotNormalizer {
    playing_stage: String,
    song_id_prefixes: Vec<String>,
}

impl Default for SnapshotNormalizer {
    fn default() -> Self {
        Self::new(&PollingConfig::default())
    }
}

impl SnapshotNormalizer {
    pub fn new(config: &PollingConfig) -> Self {
        Self {
            playing_stage: config.playing_stage.clone(),
            song_id_prefixes: config.song_id_prefixes.clone(),
        }
    }

    /// Parse and normalize raw payload bytes.
    pub fn normalize(&self, bytes: &[u8]) -> Result<Snapshot, NormalizeError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| NormalizeError::Malformed(e.to_string()))?;
        self.normalize_value(&value)
    }

    /// Normalize an already-parsed payload.
    pub fn normalize_value(&self, value: &Value) -> Result<Snapshot, NormalizeError> {
        let Some(root) = value.as_object() else {
            return Err(NormalizeError::Malformed(format!(
                "expected a JSON object, found {}",
                kind_of(value)
            )));
        };

        let text = |rules: &[Lookup]| self.text(root, rules);
        let number = |rules: &[Lookup]| self.number(root, rules);

        Ok(Snapshot {
            song: text(SONG).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            artist: text(ARTIST).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            album: text(ALBUM).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            accuracy: number(ACCURACY).map_or(0.0, |v| v.clamp(0.0, 100.0)),
            current_streak: number(CURRENT_STREAK).map_or(0, to_count),
            highest_streak: number(HIGHEST_STREAK).map_or(0, to_count),
            is_playing: text(GAME_STAGE).is_some_and(|stage| stage == self.playing_stage),
            song_timer: number(SONG_TIMER).map_or(0.0, |v| v.max(0.0)),
            song_length: number(SONG_LENGTH).map_or(0.0, |v| v.max(0.0)),
            ..Snapshot::default()
        })
    }

    fn text(&self, root: &Map<String, Value>, rules: &[Lookup]) -> Option<String> {
        rules.iter().find_map(|rule| {
            let raw = as_text(resolve(root, *rule)?)?;
            match rule {
                Lookup::SongId => self.strip_song_id_prefix(&raw),
                _ => Some(raw),
            }
        })
    }

    fn number(&self, root: &Map<String, Value>, rules: &[Lookup]) -> Option<f64> {
        rules
            .iter()
            .find_map(|rule| resolve(root, *rule).and_then(as_number))
    }

    fn strip_song_id_prefix(&self, raw: &str) -> Option<String> {
        let stripped = self
            .song_id_prefixes
            .iter()
            .find_map(|prefix| raw.strip_prefix(prefix.as_str()))
            .unwrap_or(raw)
            .trim();
        (!stripped.is_empty()).then(|| stripped.to_string())
    }
}

/// Look up `key`, exact match first, then ASCII case-insensitive.
///
/// `null` counts as absent.
fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object
        .get(key)
        .filter(|v| !v.is_null())
        .or_else(|| {
            object
                .iter()
                .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_null())
                .map(|(_, v)| v)
        })
}

fn object<'a>(parent: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    field(parent, key).and_then(Value::as_object)
}

fn resolve<'a>(root: &'a Map<String, Value>, rule: Lookup) -> Option<&'a Value> {
    let readout = object(root, "memoryReadout");
    match rule {
        Lookup::Details(key) => field(object(root, "songDetails")?, key),
        Lookup::ReadoutDetails(key) => field(object(readout?, "songDetails")?, key),
        Lookup::Readout(key) => readout
            .and_then(|r| field(r, key))
            .or_else(|| field(root, key)),
        Lookup::NoteData(key) => readout
            .and_then(|r| object(r, "noteData"))
            .and_then(|n| field(n, key))
            .or_else(|| object(root, "noteData").and_then(|n| field(n, key))),
        Lookup::SongId => readout
            .and_then(|r| field(r, "songID"))
            .or_else(|| field(root, "songID")),
        Lookup::Top(key) => field(root, key),
    }
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Numbers pass through; numeric strings are parsed; anything else is absent.
fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn to_count(value: f64) -> u32 {
    if value <= 0.0 {
        0
    } else if value >= u32::MAX as f64 {
        u32::MAX
    } else {
        value as u32
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
