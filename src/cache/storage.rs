//! JSON file-backed cache store.
//!
//! The whole document lives in memory behind one mutex and is rewritten to
//! disk after every mutation, while the lock is still held, so two flushes
//! can never interleave or persist a half-applied change.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use super::ttl::{ResourceType, TtlTable};

/// One cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
  data: serde_json::Value,
  /// Epoch seconds
  cached_at: i64,
  ttl_seconds: u64,
}

impl CacheEntry {
  fn is_fresh(&self, now: i64) -> bool {
    let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
    now.saturating_sub(self.cached_at) <= ttl
  }

  fn decode<T: DeserializeOwned>(&self) -> Result<Cached<T>> {
    let value =
      T::deserialize(&self.data).map_err(|e| eyre!("Failed to deserialize cached value: {}", e))?;
    let cached_at = DateTime::<Utc>::from_timestamp(self.cached_at, 0).unwrap_or_default();
    Ok(Cached { value, cached_at })
  }
}

/// Top-level structure persisted to disk: resource type -> cache key -> entry.
///
/// Buckets are keyed by name rather than [`ResourceType`] so a file written by
/// another version with extra buckets still loads.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
  #[serde(default)]
  entries: BTreeMap<String, BTreeMap<String, CacheEntry>>,
}

impl CacheDocument {
  fn entry(&self, resource: ResourceType, key: &str) -> Option<&CacheEntry> {
    self.entries.get(resource.as_str())?.get(key)
  }
}

/// A cached value together with the time it was written.
#[derive(Debug, Clone)]
pub struct Cached<T> {
  pub value: T,
  pub cached_at: DateTime<Utc>,
}

struct State {
  doc: CacheDocument,
  /// In-memory document differs from what is on disk
  dirty: bool,
}

/// Minimal projection of a cached project or task used for name lookups.
#[derive(Deserialize)]
struct NameRecord {
  id: u64,
  #[serde(default)]
  name: String,
  #[serde(default)]
  project_id: u64,
}

/// Persistent, bucketed key/value cache with per-type TTLs.
///
/// One `Store` owns the cache file for the lifetime of a command. Pending
/// state is flushed by [`Store::close`] and again on drop, so early returns
/// and panics don't lose writes.
pub struct Store {
  path: PathBuf,
  ttls: TtlTable,
  state: Mutex<State>,
}

impl Store {
  /// Open (or start) the cache file at `path` with the default TTL table.
  pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
    Self::open_with_ttls(path, TtlTable::default())
  }

  /// Open the cache file at `path` using the given TTL table.
  ///
  /// A missing file is a cold cache. A file that fails to parse is discarded
  /// and replaced by an empty document on the next flush.
  pub fn open_with_ttls(path: impl Into<PathBuf>, ttls: TtlTable) -> Result<Self> {
    let path = path.into();

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let (doc, dirty) = match std::fs::read(&path) {
      Ok(raw) if raw.is_empty() => (CacheDocument::default(), false),
      Ok(raw) => match serde_json::from_slice::<CacheDocument>(&raw) {
        Ok(doc) => (doc, false),
        Err(e) => {
          warn!("Cache file {} is corrupt, starting fresh: {}", path.display(), e);
          (CacheDocument::default(), true)
        }
      },
      Err(e) if e.kind() == ErrorKind::NotFound => (CacheDocument::default(), false),
      Err(e) => {
        return Err(eyre!(
          "Failed to read cache file {}: {}",
          path.display(),
          e
        ))
      }
    };

    Ok(Self {
      path,
      ttls,
      state: Mutex::new(State { doc, dirty }),
    })
  }

  /// Location of the backing file.
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Size of the backing file on disk, 0 if it has not been written yet.
  pub fn size_bytes(&self) -> u64 {
    std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
  }

  /// Flush any unwritten state to disk.
  pub fn close(&self) -> Result<()> {
    let mut state = self.lock()?;
    if state.dirty {
      persist(&self.path, &mut state)?;
    }
    Ok(())
  }

  /// Fresh cached value for `(resource, key)`, or `None` on a miss.
  ///
  /// Expired entries are a miss here; see [`Store::get_stale`].
  pub fn get<T: DeserializeOwned>(&self, resource: ResourceType, key: &str) -> Result<Option<Cached<T>>> {
    let state = self.lock()?;
    match state.doc.entry(resource, key) {
      Some(entry) if entry.is_fresh(now()) => entry.decode().map(Some),
      _ => Ok(None),
    }
  }

  /// Cached value for `(resource, key)` regardless of age.
  ///
  /// Only meant for serving data when the remote API can't be reached.
  pub fn get_stale<T: DeserializeOwned>(
    &self,
    resource: ResourceType,
    key: &str,
  ) -> Result<Option<Cached<T>>> {
    let state = self.lock()?;
    state
      .doc
      .entry(resource, key)
      .map(CacheEntry::decode)
      .transpose()
  }

  /// Store a value and write the document through to disk.
  ///
  /// Types with a zero TTL are never written.
  pub fn set<T: Serialize + ?Sized>(&self, resource: ResourceType, key: &str, value: &T) -> Result<()> {
    let ttl = self.ttls.ttl(resource);
    if ttl.is_zero() {
      trace!(%resource, key, "TTL is zero, not caching");
      return Ok(());
    }

    let data =
      serde_json::to_value(value).map_err(|e| eyre!("Failed to serialize {}: {}", resource, e))?;

    let mut state = self.lock()?;
    state
      .doc
      .entries
      .entry(resource.as_str().to_string())
      .or_default()
      .insert(
        key.to_string(),
        CacheEntry {
          data,
          cached_at: now(),
          ttl_seconds: ttl.as_secs(),
        },
      );
    state.dirty = true;
    persist(&self.path, &mut state)
  }

  /// Drop whole buckets. Other buckets are untouched.
  pub fn invalidate_type(&self, resources: &[ResourceType]) -> Result<()> {
    let mut state = self.lock()?;
    for resource in resources {
      state.doc.entries.remove(resource.as_str());
    }
    debug!(?resources, "Invalidated cache buckets");
    state.dirty = true;
    persist(&self.path, &mut state)
  }

  /// Drop every bucket.
  pub fn clear(&self) -> Result<()> {
    let mut state = self.lock()?;
    state.doc.entries.clear();
    state.dirty = true;
    persist(&self.path, &mut state)
  }

  /// Drop expired entries, and any bucket left empty. Returns how many
  /// entries were removed.
  pub fn prune(&self) -> Result<usize> {
    let now = now();
    let mut state = self.lock()?;

    let mut removed = 0;
    state.doc.entries.retain(|_, bucket| {
      let before = bucket.len();
      bucket.retain(|_, entry| entry.is_fresh(now));
      removed += before - bucket.len();
      !bucket.is_empty()
    });

    state.dirty = true;
    persist(&self.path, &mut state)?;
    Ok(removed)
  }

  /// Name index hook.
  ///
  /// The index is implicit in whatever projects and tasks are cached, so
  /// there is nothing to write; [`Store::lookup_name`] scans them directly.
  pub fn index_name(&self, resource: ResourceType, name_lower: &str, id: u64, parent_id: u64) {
    trace!(%resource, name_lower, id, parent_id, "Name indexed");
  }

  /// Resolve a name to an id from cached `project` or `task` entities.
  ///
  /// Matches case-insensitive substrings; tasks must also belong to
  /// `parent_id`. Entries are scanned regardless of age.
  pub fn lookup_name(&self, resource: ResourceType, name: &str, parent_id: u64) -> Result<Option<u64>> {
    if !matches!(resource, ResourceType::Project | ResourceType::Task) {
      return Ok(None);
    }

    let needle = name.to_lowercase();
    let state = self.lock()?;
    let Some(bucket) = state.doc.entries.get(resource.as_str()) else {
      return Ok(None);
    };

    let found = bucket
      .values()
      .filter_map(|entry| NameRecord::deserialize(&entry.data).ok())
      .filter(|record| resource != ResourceType::Task || record.project_id == parent_id)
      .find(|record| record.name.to_lowercase().contains(&needle))
      .map(|record| record.id);

    Ok(found)
  }

  /// Number of cached entries per bucket, expired or not.
  pub fn stats(&self) -> Result<BTreeMap<String, usize>> {
    let state = self.lock()?;
    Ok(
      state
        .doc
        .entries
        .iter()
        .map(|(name, bucket)| (name.clone(), bucket.len()))
        .collect(),
    )
  }

  fn lock(&self) -> Result<MutexGuard<'_, State>> {
    self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Age an entry by `secs` so expiry can be exercised without sleeping.
  #[cfg(test)]
  pub(crate) fn backdate(&self, resource: ResourceType, key: &str, secs: i64) {
    let mut state = self.state.lock().unwrap();
    if let Some(entry) = state
      .doc
      .entries
      .get_mut(resource.as_str())
      .and_then(|bucket| bucket.get_mut(key))
    {
      entry.cached_at -= secs;
    }
  }
}

impl Drop for Store {
  fn drop(&mut self) {
    let Ok(state) = self.state.get_mut() else {
      return;
    };
    if state.dirty {
      if let Err(e) = persist(&self.path, state) {
        warn!("Failed to flush cache on close: {}", e);
      }
    }
  }
}

/// Write the document to a sibling temp file and rename it into place.
fn persist(path: &Path, state: &mut State) -> Result<()> {
  let raw =
    serde_json::to_vec(&state.doc).map_err(|e| eyre!("Failed to serialize cache: {}", e))?;

  let tmp = path.with_extension("json.tmp");
  std::fs::write(&tmp, raw)
    .map_err(|e| eyre!("Failed to write cache file {}: {}", tmp.display(), e))?;
  std::fs::rename(&tmp, path)
    .map_err(|e| eyre!("Failed to replace cache file {}: {}", path.display(), e))?;

  state.dirty = false;
  Ok(())
}

fn now() -> i64 {
  Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  fn open_temp() -> (TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("cache.json")).unwrap();
    (dir, store)
  }

  fn get_value(store: &Store, resource: ResourceType, key: &str) -> Option<serde_json::Value> {
    store
      .get::<serde_json::Value>(resource, key)
      .unwrap()
      .map(|c| c.value)
  }

  fn get_stale_value(store: &Store, resource: ResourceType, key: &str) -> Option<serde_json::Value> {
    store
      .get_stale::<serde_json::Value>(resource, key)
      .unwrap()
      .map(|c| c.value)
  }

  #[test]
  fn test_set_then_get_returns_value() {
    let (_dir, store) = open_temp();
    let projects = vec!["Website".to_string(), "Mobile".to_string()];
    store.set(ResourceType::Projects, "all", &projects).unwrap();

    let cached = store.get::<Vec<String>>(ResourceType::Projects, "all").unwrap();
    assert_eq!(cached.map(|c| c.value), Some(projects));
  }

  #[test]
  fn test_miss_on_absent_key() {
    let (_dir, store) = open_temp();
    store.set(ResourceType::Projects, "all", &json!([])).unwrap();
    assert!(get_value(&store, ResourceType::Projects, "active=true").is_none());
    assert!(get_value(&store, ResourceType::Tasks, "all").is_none());
    assert!(get_stale_value(&store, ResourceType::Tasks, "all").is_none());
  }

  #[test]
  fn test_zero_ttl_is_never_written() {
    let (_dir, store) = open_temp();
    store
      .set(ResourceType::ActiveEntry, "1", &json!({"id": 7}))
      .unwrap();

    assert!(get_value(&store, ResourceType::ActiveEntry, "1").is_none());
    assert!(get_stale_value(&store, ResourceType::ActiveEntry, "1").is_none());
    assert!(store.stats().unwrap().is_empty());
    assert!(!store.path().exists());
  }

  #[test]
  fn test_expired_entry_only_served_stale() {
    let (_dir, store) = open_temp();
    store.set(ResourceType::Entries, "all", &json!([1, 2])).unwrap();
    store.backdate(ResourceType::Entries, "all", 301);

    assert!(get_value(&store, ResourceType::Entries, "all").is_none());
    assert_eq!(
      get_stale_value(&store, ResourceType::Entries, "all"),
      Some(json!([1, 2]))
    );
  }

  #[test]
  fn test_entry_at_exact_ttl_is_fresh() {
    let (_dir, store) = open_temp();
    store.set(ResourceType::Entries, "all", &json!([])).unwrap();
    // Leave a second of slack for the clock ticking during the test
    store.backdate(ResourceType::Entries, "all", 299);
    assert!(get_value(&store, ResourceType::Entries, "all").is_some());
  }

  #[test]
  fn test_huge_ttl_override_stays_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let ttls = TtlTable::with_overrides(&BTreeMap::from([(ResourceType::Projects, u64::MAX)]));
    let store = Store::open_with_ttls(dir.path().join("cache.json"), ttls).unwrap();

    store.set(ResourceType::Projects, "all", &json!([1])).unwrap();
    store.backdate(ResourceType::Projects, "all", 86_400 * 365);

    assert_eq!(
      get_value(&store, ResourceType::Projects, "all"),
      Some(json!([1]))
    );
  }

  #[test]
  fn test_invalidate_type_removes_only_named_buckets() {
    let (_dir, store) = open_temp();
    store.set(ResourceType::Projects, "all", &json!([1])).unwrap();
    store.set(ResourceType::Project, "1", &json!({"id": 1})).unwrap();
    store.set(ResourceType::Tasks, "all", &json!([2])).unwrap();

    store
      .invalidate_type(&[ResourceType::Projects, ResourceType::Project])
      .unwrap();

    assert!(get_stale_value(&store, ResourceType::Projects, "all").is_none());
    assert!(get_stale_value(&store, ResourceType::Project, "1").is_none());
    assert_eq!(get_value(&store, ResourceType::Tasks, "all"), Some(json!([2])));
  }

  #[test]
  fn test_prune_removes_exactly_expired_entries() {
    let (_dir, store) = open_temp();
    store.set(ResourceType::Entries, "old", &json!(1)).unwrap();
    store.set(ResourceType::Entries, "new", &json!(2)).unwrap();
    store.set(ResourceType::Entry, "9", &json!(3)).unwrap();
    store.set(ResourceType::Me, "me", &json!(4)).unwrap();
    store.backdate(ResourceType::Entries, "old", 600);
    store.backdate(ResourceType::Entry, "9", 600);

    let removed = store.prune().unwrap();

    assert_eq!(removed, 2);
    let stats = store.stats().unwrap();
    assert_eq!(stats.get("entries"), Some(&1));
    assert_eq!(stats.get("entry"), None);
    assert_eq!(stats.get("me"), Some(&1));
    assert_eq!(get_value(&store, ResourceType::Entries, "new"), Some(json!(2)));
  }

  #[test]
  fn test_clear_removes_everything() {
    let (_dir, store) = open_temp();
    store.set(ResourceType::Me, "me", &json!({"id": 1})).unwrap();
    store.set(ResourceType::Clients, "all", &json!([])).unwrap();
    store.clear().unwrap();
    assert!(store.stats().unwrap().is_empty());
  }

  #[test]
  fn test_writes_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.json");

    {
      let store = Store::open(&path).unwrap();
      store.set(ResourceType::Me, "me", &json!({"id": 42})).unwrap();
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(get_value(&store, ResourceType::Me, "me"), Some(json!({"id": 42})));
  }

  #[test]
  fn test_open_missing_file_is_cold_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a").join("b").join("cache.json");
    let store = Store::open(&path).unwrap();

    assert!(path.parent().unwrap().is_dir());
    assert!(store.stats().unwrap().is_empty());
    store.close().unwrap();
    assert!(!path.exists());
  }

  #[test]
  fn test_corrupt_file_resets_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, b"{not json").unwrap();

    let store = Store::open(&path).unwrap();
    assert!(store.stats().unwrap().is_empty());
    drop(store);

    let raw = std::fs::read_to_string(&path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc, json!({"entries": {}}));
  }

  #[test]
  fn test_persisted_format() {
    let (_dir, store) = open_temp();
    store.set(ResourceType::Tasks, "project=5", &json!([])).unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let entry = &doc["entries"]["tasks"]["project=5"];
    assert_eq!(entry["data"], json!([]));
    assert_eq!(entry["ttl_seconds"], json!(1800));
    assert!(entry["cached_at"].as_i64().unwrap() > 0);
  }

  #[test]
  fn test_lookup_task_name_requires_parent() {
    let (_dir, store) = open_temp();
    store
      .set(
        ResourceType::Task,
        "11",
        &json!({"id": 11, "name": "Design Homepage", "project_id": 5}),
      )
      .unwrap();
    store
      .set(
        ResourceType::Task,
        "12",
        &json!({"id": 12, "name": "Backend API", "project_id": 5}),
      )
      .unwrap();

    assert_eq!(store.lookup_name(ResourceType::Task, "design", 5).unwrap(), Some(11));
    assert_eq!(store.lookup_name(ResourceType::Task, "design", 6).unwrap(), None);
  }

  #[test]
  fn test_lookup_project_name_is_case_insensitive() {
    let (_dir, store) = open_temp();
    store
      .set(ResourceType::Project, "3", &json!({"id": 3, "name": "Client Website"}))
      .unwrap();

    assert_eq!(store.lookup_name(ResourceType::Project, "WEBSITE", 0).unwrap(), Some(3));
    assert_eq!(store.lookup_name(ResourceType::Project, "mobile", 0).unwrap(), None);
    assert_eq!(store.lookup_name(ResourceType::Projects, "website", 0).unwrap(), None);
  }

  #[test]
  fn test_stats_counts_expired_entries() {
    let (_dir, store) = open_temp();
    store.set(ResourceType::Project, "1", &json!({})).unwrap();
    store.set(ResourceType::Project, "2", &json!({})).unwrap();
    store.backdate(ResourceType::Project, "2", 10_000);

    assert_eq!(store.stats().unwrap().get("project"), Some(&2));
  }
}
