//! File-backed tip store.
//!
//! Layout: one JSON object, keys are exact song titles, values are
//! `{"theory": ..., "trivia": ..., "artist": ...}`. Older files stored theory
//! and trivia as arrays of lines; those are joined with newlines on load.
//!
//! Lookups are served from an in-memory mirror that is reloaded whenever the
//! file's modification time changes, so the polling tick never parses the
//! file unless someone actually wrote to it. [`TipStore::store`] re-reads the
//! file under a write gate, merges the one key, and replaces the file
//! atomically, so entries written by other processes are preserved.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::SystemTime;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::TipEntry;

#[derive(Debug, Default)]
struct Mirror {
    entries: HashMap<String, TipEntry>,
    stamp: Option<FileStamp>,
}

/// What the mirror knows about the file it was loaded from. The length is
/// compared too, since a same-tick rewrite can keep a coarse mtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

/// Persistent song title → [`TipEntry`] map.
#[derive(Debug)]
pub struct TipStore {
    path: PathBuf,
    mirror: RwLock<Mirror>,
    write_gate: Mutex<()>,
}

impl TipStore {
    /// Open the store at `path`.
    ///
    /// A missing file is an empty store. An unreadable file is logged and
    /// treated as empty until it becomes readable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self {
            path: path.into(),
            mirror: RwLock::new(Mirror::default()),
            write_gate: Mutex::new(()),
        };
        match store.reload() {
            Ok(count) => tracing::info!(path = %store.path.display(), entries = count, "Tip store opened"),
            Err(e) => tracing::warn!(path = %store.path.display(), error = %e, "Tip store unreadable, starting empty"),
        }
        store
    }

    /// Tips for `song`, or `None` if none were ever stored.
    ///
    /// Never fails: read errors are logged and treated as a miss.
    pub fn lookup(&self, song: &str) -> Option<TipEntry> {
        self.refresh_if_changed();
        self.mirror
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .get(song)
            .cloned()
    }

    /// Number of songs with stored tips.
    pub fn len(&self) -> usize {
        self.refresh_if_changed();
        self.mirror
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge one entry into the file.
    pub fn store(&self, song: &str, entry: TipEntry) -> Result<()> {
        let _gate = self
            .write_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut entries = read_entries(&self.path)?;
        entries.insert(song.to_string(), entry);
        write_entries(&self.path, &entries)?;

        let mut mirror = self
            .mirror
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        mirror.stamp = file_stamp(&self.path);
        mirror.entries = entries;

        tracing::info!(song = %song, path = %self.path.display(), "Stored tips");
        Ok(())
    }

    /// Re-read the file into memory, returning the entry count.
    pub fn reload(&self) -> Result<usize> {
        let stamp = file_stamp(&self.path);
        let entries = read_entries(&self.path)?;
        let count = entries.len();

        let mut mirror = self
            .mirror
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        mirror.entries = entries;
        mirror.stamp = stamp;
        Ok(count)
    }

    fn refresh_if_changed(&self) {
        let on_disk = file_stamp(&self.path);
        let cached = self
            .mirror
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .stamp;
        if on_disk == cached {
            return;
        }
        if let Err(e) = self.reload() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to reload tip store");
            // Remember the timestamp so a broken file is not re-parsed every tick
            self.mirror
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .stamp = on_disk;
        }
    }
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let metadata = std::fs::metadata(path).ok()?;
    Some(FileStamp {
        modified: metadata.modified().ok()?,
        len: metadata.len(),
    })
}

fn read_entries(path: &Path) -> Result<HashMap<String, TipEntry>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => {
            return Err(Error::Persistence(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let root: Map<String, Value> = serde_json::from_str(&content).map_err(|e| {
        Error::Persistence(format!("failed to parse {}: {}", path.display(), e))
    })?;

    let mut entries = HashMap::with_capacity(root.len());
    for (song, value) in root {
        match parse_entry(&value) {
            Some(entry) => {
                entries.insert(song, entry);
            }
            None => tracing::warn!(song = %song, "Skipping unreadable tip entry"),
        }
    }
    Ok(entries)
}

fn parse_entry(value: &Value) -> Option<TipEntry> {
    let object = value.as_object()?;
    Some(TipEntry {
        theory: join_text(object.get("theory")?)?,
        trivia: join_text(object.get("trivia")?)?,
        artist: object
            .get("artist")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// A string, or an array of strings joined with newlines.
fn join_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let lines: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            Some(lines.join("\n"))
        }
        _ => None,
    }
}

fn write_entries(path: &Path, entries: &HashMap<String, TipEntry>) -> Result<()> {
    let persist_err =
        |e: std::io::Error| Error::Persistence(format!("failed to write {}: {}", path.display(), e));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(persist_err)?;
    }

    // Sorted keys keep the file diff-friendly
    let sorted: BTreeMap<&String, &TipEntry> = entries.iter().collect();
    let json = serde_json::to_vec_pretty(&sorted)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, json).map_err(persist_err)?;
    std::fs::rename(&tmp, path).map_err(persist_err)?;
    Ok(())
}
