use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use xxhash_rust::xxh3::xxh3_64;

/// `(filename, requested names)` with the names sorted and deduplicated, so
/// the order callers ask in does not matter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheKey {
  pub filename: String,
  pub only: Vec<String>,
}

impl CacheKey {
  pub fn new(filename: impl Into<String>, only: &[String]) -> Self {
    let mut only = only.to_vec();
    only.sort();
    only.dedup();
    CacheKey {
      filename: filename.into(),
      only,
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.filename, self.only.join(","))
  }
}

struct CacheEntry<V> {
  content_hash: u64,
  value: V,
}

struct CacheState<V> {
  entries: HashMap<CacheKey, CacheEntry<V>>,
  keys_by_file: HashMap<String, HashSet<CacheKey>>,
}

impl<V> Default for CacheState<V> {
  fn default() -> Self {
    CacheState {
      entries: HashMap::new(),
      keys_by_file: HashMap::new(),
    }
  }
}

/// Memoizes values derived from a source text.
///
/// Entries are compared by the hash of the source they were computed from, so
/// a changed file is a miss even when the key is the same. The cache is meant
/// to be constructed once per compilation and shared by reference; it has no
/// eviction besides [`EvaluationCache::clear`] and
/// [`EvaluationCache::clear_for_file`].
pub struct EvaluationCache<V> {
  state: Mutex<CacheState<V>>,
}

impl<V> Default for EvaluationCache<V> {
  fn default() -> Self {
    EvaluationCache {
      state: Mutex::new(CacheState::default()),
    }
  }
}

impl<V> fmt::Debug for EvaluationCache<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EvaluationCache")
      .field("entries", &self.len())
      .finish()
  }
}

impl<V: Clone> EvaluationCache<V> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn has(&self, key: &CacheKey, source: &str) -> bool {
    let content_hash = xxh3_64(source.as_bytes());
    let state = self.state.lock();
    state
      .entries
      .get(key)
      .is_some_and(|entry| entry.content_hash == content_hash)
  }

  pub fn get(&self, key: &CacheKey, source: &str) -> Option<V> {
    let content_hash = xxh3_64(source.as_bytes());
    let state = self.state.lock();
    match state.entries.get(key) {
      Some(entry) if entry.content_hash == content_hash => {
        tracing::trace!(%key, "Evaluation cache hit");
        Some(entry.value.clone())
      }
      Some(_) => {
        tracing::trace!(%key, "Evaluation cache miss, source changed");
        None
      }
      None => {
        tracing::trace!(%key, "Evaluation cache miss");
        None
      }
    }
  }

  pub fn set(&self, key: CacheKey, source: &str, value: V) {
    let content_hash = xxh3_64(source.as_bytes());
    let mut state = self.state.lock();
    state
      .keys_by_file
      .entry(key.filename.clone())
      .or_default()
      .insert(key.clone());
    state.entries.insert(
      key,
      CacheEntry {
        content_hash,
        value,
      },
    );
  }

  pub fn clear(&self) {
    let mut state = self.state.lock();
    state.entries.clear();
    state.keys_by_file.clear();
  }

  /// Drops every entry computed from `filename`. Returns how many went.
  pub fn clear_for_file(&self, filename: &str) -> usize {
    let mut state = self.state.lock();
    let Some(keys) = state.keys_by_file.remove(filename) else {
      return 0;
    };

    let mut removed = 0;
    for key in keys {
      if state.entries.remove(&key).is_some() {
        removed += 1;
      }
    }
    tracing::debug!(filename, removed, "Cleared evaluation cache for file");
    removed
  }
}

impl<V> EvaluationCache<V> {
  pub fn len(&self) -> usize {
    self.state.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
