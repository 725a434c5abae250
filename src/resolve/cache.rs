//! Persistent concept cache
//!
//! Maps normalized surface forms to knowledge-base results, including
//! negative ("no match") results. The cache file is `{version, entries}`
//! JSON and is always replaced atomically: a temp file in the same
//! directory is written, synced, then renamed over the old file.

use super::kb::KbMatch;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CACHE_FORMAT_VERSION: u32 = 1;

/// One cached lookup result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// `None` for a cached "no match"
    pub canonical_id: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub resolved_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn positive(found: &KbMatch, resolved_at: DateTime<Utc>) -> Self {
        Self {
            canonical_id: Some(found.canonical_id.clone()),
            label: found.label.clone(),
            description: found.description.clone(),
            resolved_at,
        }
    }

    pub fn negative(resolved_at: DateTime<Utc>) -> Self {
        Self {
            canonical_id: None,
            label: String::new(),
            description: String::new(),
            resolved_at,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.canonical_id.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

/// A cache file that cannot be used. Never fatal: the cache starts empty.
#[derive(Debug, Error)]
pub enum CacheCorruptionError {
    #[error("unsupported cache format version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("cache file does not parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("cache file cannot be read: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors writing the cache file
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cannot replace cache file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Validity windows and flush cadence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachePolicy {
    /// `None` keeps negative entries forever
    pub negative_ttl: Option<Duration>,
    /// `None` keeps positive entries forever
    pub positive_ttl: Option<Duration>,
    /// Flush after this many new entries; 0 flushes only on explicit `flush`
    pub flush_every: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            negative_ttl: Some(Duration::from_secs(30 * 24 * 60 * 60)),
            positive_ttl: None,
            flush_every: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub positive: usize,
    pub negative: usize,
    /// Entries past their validity window (re-queried on next lookup)
    pub expired: usize,
}

/// Shared concept cache: concurrent map plus optional backing file.
pub struct ConceptCache {
    path: Option<PathBuf>,
    entries: DashMap<String, CacheEntry>,
    policy: CachePolicy,
    pending: AtomicUsize,
    flush_lock: Mutex<()>,
}

impl ConceptCache {
    /// A cache with no backing file
    pub fn in_memory(policy: CachePolicy) -> Self {
        Self {
            path: None,
            entries: DashMap::new(),
            policy,
            pending: AtomicUsize::new(0),
            flush_lock: Mutex::new(()),
        }
    }

    /// Open the cache file at `path`.
    ///
    /// A missing file yields an empty cache; a corrupt or foreign-version
    /// file is logged and also yields an empty cache (replaced on next flush).
    pub fn open(path: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        let path = path.into();
        let mut cache = Self::in_memory(policy);
        match Self::load(&path) {
            Ok(Some(entries)) => {
                info!("loaded {} cache entries from {}", entries.len(), path.display());
                cache.entries = entries.into_iter().collect();
            }
            Ok(None) => debug!("no cache file at {}, starting empty", path.display()),
            Err(e) => warn!("ignoring cache file {}: {}", path.display(), e),
        }
        cache.path = Some(path);
        cache
    }

    /// Read a cache file; `Ok(None)` when it does not exist.
    pub fn load(path: &Path) -> Result<Option<BTreeMap<String, CacheEntry>>, CacheCorruptionError> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        let file: CacheFile = serde_json::from_slice(&bytes)?;
        if file.version != CACHE_FORMAT_VERSION {
            return Err(CacheCorruptionError::Version {
                found: file.version,
                expected: CACHE_FORMAT_VERSION,
            });
        }
        Ok(Some(file.entries))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw entry, regardless of validity
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Entry that is still inside its validity window
    pub fn get_fresh(&self, key: &str) -> Option<CacheEntry> {
        self.get_fresh_at(key, Utc::now())
    }

    pub fn get_fresh_at(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        self.get(key).filter(|entry| self.is_fresh(entry, now))
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let ttl = if entry.is_negative() {
            self.policy.negative_ttl
        } else {
            self.policy.positive_ttl
        };
        let Some(ttl) = ttl else {
            return true;
        };
        match (now - entry.resolved_at).to_std() {
            Ok(age) => age < ttl,
            // resolved_at in the future (clock skew): treat as fresh
            Err(_) => true,
        }
    }

    /// Store an entry in memory. Nothing is written until a flush.
    pub fn insert(&self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(key.into(), entry);
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// True once `flush_every` entries are waiting to be written
    pub fn flush_due(&self) -> bool {
        self.path.is_some()
            && self.policy.flush_every > 0
            && self.pending.load(Ordering::SeqCst) >= self.policy.flush_every
    }

    /// Flush if still due once the flush lock is held; concurrent callers
    /// that lost the race find nothing pending and return.
    ///
    /// Blocking file IO: async callers go through `spawn_blocking`.
    pub fn flush_if_due(&self) -> Result<(), CacheError> {
        let _guard = self.flush_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.flush_due() {
            return Ok(());
        }
        self.write_entries()
    }

    /// Write every entry to the backing file, atomically.
    pub fn flush(&self) -> Result<(), CacheError> {
        let _guard = self.flush_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.write_entries()
    }

    /// Caller holds `flush_lock`
    fn write_entries(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let flushed = self.pending.swap(0, Ordering::SeqCst);

        let file = CacheFile {
            version: CACHE_FORMAT_VERSION,
            entries: self
                .entries
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };
        let result = write_atomically(path, &file);
        if result.is_err() {
            self.pending.fetch_add(flushed, Ordering::SeqCst);
        } else {
            debug!("flushed {} cache entries to {}", file.entries.len(), path.display());
        }
        result
    }

    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let mut stats = CacheStats::default();
        for entry in self.entries.iter() {
            stats.entries += 1;
            if entry.is_negative() {
                stats.negative += 1;
            } else {
                stats.positive += 1;
            }
            if !self.is_fresh(entry.value(), now) {
                stats.expired += 1;
            }
        }
        stats
    }
}

fn write_atomically(path: &Path, file: &CacheFile) -> Result<(), CacheError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let bytes = serde_json::to_vec_pretty(file)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
