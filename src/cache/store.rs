//! Durable, size-bounded image storage
//!
//! Layout under the cache root:
//!
//! | File | Purpose |
//! |------|---------|
//! | `<key>.img` | image bytes |
//! | `<key>.<uuid>.tmp` | write in progress, removed on open once stale |
//! | `index.json` | sizes and access times, rewritten via temp + rename |
//!
//! The index file is rewritten in batches and on [`DiskStore::flush`]. An
//! index that lags behind the files is harmless: opening the store adopts
//! complete files it does not know about.
//!
//! An entry is indexed only while its `.img` file is complete on disk.
//! Writes land in a temp file, are synced, then renamed into place under
//! the index lock, so a crash can never leave a truncated file indexed.

use crate::cache::key::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DATA_EXT: &str = "img";
const TMP_EXT: &str = "tmp";
const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;

/// Inserts and removals tolerated before `put` rewrites the index file
const INDEX_PERSIST_EVERY: usize = 32;

/// Age after which a temp file is treated as an abandoned write
pub const DEFAULT_TMP_GRACE: Duration = Duration::from_secs(60);

/// Local disk failure, tagged with the key being stored or removed
#[derive(Error, Debug, Clone)]
#[error("Storage error for {key} while {op}: {source}")]
pub struct StorageError {
    pub key: CacheKey,
    pub op: &'static str,
    #[source]
    pub source: Arc<io::Error>,
}

impl StorageError {
    pub fn new(key: CacheKey, op: &'static str, source: io::Error) -> Self {
        Self {
            key,
            op,
            source: Arc::new(source),
        }
    }
}

/// Which entry to drop first when over budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently used first
    #[default]
    Lru,
    /// Largest entry first, least recently used among equal sizes
    LargestFirst,
}

/// Metadata for one stored image
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub byte_size: u64,
    pub last_access: DateTime<Utc>,
    pub storage_path: PathBuf,
    /// Logical access clock, strictly increasing across touches
    access_tick: u64,
    /// Insertion sequence, tie-breaker for equal ticks
    seq: u64,
}

/// Read-only cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub budget_bytes: u64,
    pub root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<IndexRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    key: CacheKey,
    byte_size: u64,
    last_access: DateTime<Utc>,
    access_tick: u64,
}

/// In-memory index; mutated only while holding the store's lock
#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<CacheKey, CacheEntry>,
    total_bytes: u64,
    next_tick: u64,
    next_seq: u64,
    /// Anything changed since the index file was last written
    dirty: bool,
    /// Inserts and removals since the index file was last written
    unsaved: usize,
}

impl IndexState {
    fn insert(&mut self, key: CacheKey, byte_size: u64, last_access: DateTime<Utc>, path: PathBuf) {
        let entry = CacheEntry {
            key: key.clone(),
            byte_size,
            last_access,
            storage_path: path,
            access_tick: self.next_tick,
            seq: self.next_seq,
        };
        self.next_tick += 1;
        self.next_seq += 1;

        if let Some(old) = self.entries.insert(key, entry) {
            self.total_bytes -= old.byte_size;
        }
        self.total_bytes += byte_size;
        self.dirty = true;
        self.unsaved += 1;
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.byte_size;
        self.dirty = true;
        self.unsaved += 1;
        Some(entry)
    }

    /// Remove `key` only if it is still the entry a reader saw
    fn remove_if_seq(&mut self, key: &CacheKey, seq: u64) -> Option<CacheEntry> {
        match self.entries.get(key) {
            Some(entry) if entry.seq == seq => self.remove(key),
            _ => None,
        }
    }

    fn touch(&mut self, key: &CacheKey, seq: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.seq == seq {
                entry.access_tick = self.next_tick;
                entry.last_access = Utc::now();
                self.next_tick += 1;
                self.dirty = true;
            }
        }
    }

    fn pick_victim(&self, policy: EvictionPolicy) -> Option<CacheKey> {
        let victim = match policy {
            EvictionPolicy::Lru => self.entries.values().min_by_key(|e| (e.access_tick, e.seq)),
            EvictionPolicy::LargestFirst => self
                .entries
                .values()
                .min_by_key(|e| (Reverse(e.byte_size), e.access_tick, e.seq)),
        };
        victim.map(|e| e.key.clone())
    }

    fn to_file(&self) -> IndexFile {
        let mut entries: Vec<IndexRecord> = self
            .entries
            .values()
            .map(|e| IndexRecord {
                key: e.key.clone(),
                byte_size: e.byte_size,
                last_access: e.last_access,
                access_tick: e.access_tick,
            })
            .collect();
        entries.sort_by_key(|r| r.access_tick);
        IndexFile {
            version: INDEX_VERSION,
            entries,
        }
    }
}

/// Disk-backed image store with a byte budget
pub struct DiskStore {
    root: PathBuf,
    budget_bytes: u64,
    policy: EvictionPolicy,
    state: Mutex<IndexState>,
}

impl DiskStore {
    /// Open (or create) a store rooted at `root`.
    ///
    /// Rebuilds the index from `index.json` and the files actually present:
    /// temp files older than [`DEFAULT_TMP_GRACE`] are deleted, index entries
    /// without a file are dropped, and complete files missing from the index
    /// are adopted.
    pub async fn open(
        root: impl Into<PathBuf>,
        budget_bytes: u64,
        policy: EvictionPolicy,
    ) -> io::Result<Self> {
        Self::open_with_tmp_grace(root, budget_bytes, policy, DEFAULT_TMP_GRACE).await
    }

    /// Open with a custom age for abandoned temp files. Younger temp files
    /// are left alone, they may belong to another process still writing.
    pub async fn open_with_tmp_grace(
        root: impl Into<PathBuf>,
        budget_bytes: u64,
        policy: EvictionPolicy,
        tmp_grace: Duration,
    ) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let scan = scan(&root, Some(tmp_grace)).await?;
        if scan.dropped > 0 || scan.adopted > 0 {
            info!(
                dropped = scan.dropped,
                adopted = scan.adopted,
                "Reconciled cache index with disk"
            );
        }
        info!(
            entries = scan.state.entries.len(),
            bytes = scan.state.total_bytes,
            root = %root.display(),
            "Opened image cache"
        );

        let store = Self {
            root,
            budget_bytes,
            policy,
            state: Mutex::new(scan.state),
        };

        {
            let mut state = store.state.lock().await;
            if let Err(e) = store.evict_locked(&mut state).await {
                warn!("Eviction on open failed: {}", e);
            }
            store.persist_locked(&mut state).await;
        }

        Ok(store)
    }

    /// Statistics for the store at `root` without opening it.
    ///
    /// Reconciles the index with the files present the same way `open`
    /// does, but creates, deletes, evicts and rewrites nothing. A missing
    /// root reads as an empty cache.
    pub async fn inspect(root: impl Into<PathBuf>, budget_bytes: u64) -> io::Result<CacheInfo> {
        let root = root.into();
        let state = match fs::metadata(&root).await {
            Ok(_) => scan(&root, None).await?.state,
            Err(e) if e.kind() == io::ErrorKind::NotFound => IndexState::default(),
            Err(e) => return Err(e),
        };

        Ok(CacheInfo {
            entry_count: state.entries.len(),
            total_bytes: state.total_bytes,
            budget_bytes,
            root,
        })
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configured byte budget
    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Read the bytes stored for `key`.
    ///
    /// A hit refreshes the entry's access time. An unreadable or
    /// mismatched file is treated as a miss and dropped from the index.
    pub async fn lookup(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let (path, seq, expected) = {
            let state = self.state.lock().await;
            let entry = state.entries.get(key)?;
            (entry.storage_path.clone(), entry.seq, entry.byte_size)
        };

        match fs::read(&path).await {
            Ok(bytes) if bytes.len() as u64 == expected => {
                self.state.lock().await.touch(key, seq);
                debug!(key = %key, bytes = bytes.len(), "Cache hit");
                Some(bytes)
            }
            Ok(bytes) => {
                warn!(key = %key, expected, actual = bytes.len(), "Cached file size changed, treating as miss");
                self.forget(key, seq).await;
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cached file unreadable, treating as miss");
                self.forget(key, seq).await;
                None
            }
        }
    }

    /// Drop an entry a reader found broken, unless it was replaced meanwhile
    async fn forget(&self, key: &CacheKey, seq: u64) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.remove_if_seq(key, seq) {
            if let Err(e) = fs::remove_file(&entry.storage_path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(key = %key, error = %e, "Could not remove broken cache file");
                }
            }
            self.persist_locked(&mut state).await;
        }
    }

    /// Store `bytes` under `key`, then evict until back under budget.
    ///
    /// On error nothing new is indexed. If the single new entry is larger
    /// than the whole budget it is evicted immediately.
    pub async fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), StorageError> {
        let final_path = data_path(&self.root, key);
        let tmp_path = self
            .root
            .join(format!("{}.{}.{}", key, Uuid::new_v4().simple(), TMP_EXT));

        if let Err(e) = write_synced(&tmp_path, bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::new(key.clone(), "writing", e));
        }

        let mut state = self.state.lock().await;

        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::new(key.clone(), "committing", e));
        }

        state.insert(key.clone(), bytes.len() as u64, Utc::now(), final_path);
        info!(
            key = %key,
            bytes = bytes.len(),
            total = state.total_bytes,
            budget = self.budget_bytes,
            "Stored image"
        );

        let evicted = self.evict_locked(&mut state).await;
        if state.unsaved >= INDEX_PERSIST_EVERY {
            self.persist_locked(&mut state).await;
        }

        match evicted {
            Ok(keys) if keys.contains(key) => {
                warn!(key = %key, bytes = bytes.len(), "Image larger than cache budget, not retained");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Evict entries until the total is within budget; returns evicted keys
    pub async fn evict_until_under_budget(&self) -> Result<Vec<CacheKey>, StorageError> {
        let mut state = self.state.lock().await;
        let evicted = self.evict_locked(&mut state).await;
        self.persist_locked(&mut state).await;
        evicted
    }

    async fn evict_locked(&self, state: &mut IndexState) -> Result<Vec<CacheKey>, StorageError> {
        let mut evicted = Vec::new();

        while state.total_bytes > self.budget_bytes {
            let Some(victim) = state.pick_victim(self.policy) else {
                break;
            };
            let path = data_path(&self.root, &victim);

            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::new(victim, "evicting", e)),
            }

            if let Some(entry) = state.remove(&victim) {
                info!(key = %victim, bytes = entry.byte_size, total = state.total_bytes, "Evicted image");
            }
            evicted.push(victim);
        }

        Ok(evicted)
    }

    /// Remove every entry and its file; returns the number removed
    pub async fn clear(&self) -> Result<usize, StorageError> {
        let mut state = self.state.lock().await;
        let keys: Vec<CacheKey> = state.entries.keys().cloned().collect();
        let mut removed = 0;

        for key in keys {
            let path = data_path(&self.root, &key);
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    self.persist_locked(&mut state).await;
                    return Err(StorageError::new(key, "clearing", e));
                }
            }
            state.remove(&key);
            removed += 1;
        }

        self.persist_locked(&mut state).await;
        info!(removed, "Cleared image cache");
        Ok(removed)
    }

    /// Whether `key` is currently indexed
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }

    /// Metadata for one entry, without touching its access time
    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().await.entries.get(key).cloned()
    }

    pub async fn info(&self) -> CacheInfo {
        let state = self.state.lock().await;
        CacheInfo {
            entry_count: state.entries.len(),
            total_bytes: state.total_bytes,
            budget_bytes: self.budget_bytes,
            root: self.root.clone(),
        }
    }

    /// Write the index file if anything changed since the last write
    pub async fn flush(&self) {
        let mut state = self.state.lock().await;
        self.persist_locked(&mut state).await;
    }

    /// Rewrite the index file if anything changed.
    ///
    /// Failure is logged, not returned: the data files stay authoritative
    /// and the next open re-adopts anything the index missed.
    async fn persist_locked(&self, state: &mut IndexState) {
        if !state.dirty {
            return;
        }

        let index = state.to_file();
        let result = async {
            let content = serde_json::to_vec(&index).map_err(io::Error::other)?;
            let tmp = self
                .root
                .join(format!("{}.{}.{}", INDEX_FILE, Uuid::new_v4().simple(), TMP_EXT));
            write_synced(&tmp, &content).await?;
            fs::rename(&tmp, self.root.join(INDEX_FILE)).await
        }
        .await;

        match result {
            Ok(()) => {
                state.dirty = false;
                state.unsaved = 0;
            }
            Err(e) => warn!("Failed to write cache index: {}", e),
        }
    }
}

/// The index reconciled with the files actually on disk
struct Scan {
    state: IndexState,
    dropped: usize,
    adopted: usize,
}

struct Restored {
    /// Persisted access tick; `None` for files the index did not know
    tick: Option<u64>,
    last_access: DateTime<Utc>,
    key: CacheKey,
    size: u64,
}

/// Rebuild the in-memory index from `index.json` and the directory.
///
/// With `tmp_grace` set, temp files at least that old are deleted. With
/// `None` the directory is only read.
async fn scan(root: &Path, tmp_grace: Option<Duration>) -> io::Result<Scan> {
    let recorded = load_index(root).await;
    let mut on_disk: HashMap<CacheKey, (u64, DateTime<Utc>)> = HashMap::new();

    let mut dir = fs::read_dir(root).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some(TMP_EXT) => {
                if let Some(grace) = tmp_grace {
                    remove_stale_tmp(&path, grace).await;
                }
            }
            Some(DATA_EXT) => {
                let Some(key) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| CacheKey::new(s).ok())
                else {
                    continue;
                };
                let metadata = entry.metadata().await?;
                let modified = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                on_disk.insert(key, (metadata.len(), modified));
            }
            _ => {}
        }
    }

    // Files are authoritative for size; the index only for recency
    let mut restored = Vec::new();
    let mut dropped = 0usize;
    for record in recorded {
        match on_disk.remove(&record.key) {
            Some((size, _)) => {
                if size != record.byte_size {
                    debug!(
                        key = %record.key,
                        recorded = record.byte_size,
                        actual = size,
                        "Index size stale, using size on disk"
                    );
                }
                restored.push(Restored {
                    tick: Some(record.access_tick),
                    last_access: record.last_access,
                    key: record.key,
                    size,
                });
            }
            None => dropped += 1,
        }
    }
    let adopted = on_disk.len();
    for (key, (size, modified)) in on_disk {
        restored.push(Restored {
            tick: None,
            last_access: modified,
            key,
            size,
        });
    }

    // Indexed entries by tick (wall clocks can step back), then adopted files by mtime
    restored.sort_by(|a, b| {
        (a.tick.is_none(), a.tick, a.last_access, &a.key)
            .cmp(&(b.tick.is_none(), b.tick, b.last_access, &b.key))
    });

    let mut state = IndexState::default();
    for r in restored {
        let path = data_path(root, &r.key);
        state.insert(r.key, r.size, r.last_access, path);
    }

    Ok(Scan {
        state,
        dropped,
        adopted,
    })
}

/// Delete a temp file once it is old enough to be an abandoned write
async fn remove_stale_tmp(path: &Path, grace: Duration) {
    let age = match fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default(),
        Err(_) => return,
    };
    if age < grace {
        debug!("Leaving recent temp file {}", path.display());
        return;
    }

    debug!("Removing interrupted write {}", path.display());
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn data_path(root: &Path, key: &CacheKey) -> PathBuf {
    root.join(format!("{}.{}", key, DATA_EXT))
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Load the sidecar index; a missing or unreadable index yields no records
async fn load_index(root: &Path) -> Vec<IndexRecord> {
    let path = root.join(INDEX_FILE);
    let content = match fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Failed to read cache index {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_slice::<IndexFile>(&content) {
        Ok(index) if index.version == INDEX_VERSION => index.entries,
        Ok(index) => {
            warn!(version = index.version, "Unsupported cache index version, rebuilding");
            Vec::new()
        }
        Err(e) => {
            warn!("Corrupt cache index {}, rebuilding: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name).unwrap()
    }

    async fn store(dir: &TempDir, budget: u64) -> DiskStore {
        DiskStore::open(dir.path(), budget, EvictionPolicy::Lru).await.unwrap()
    }

    async fn keys(store: &DiskStore) -> Vec<String> {
        let state = store.state.lock().await;
        let mut keys: Vec<String> = state.entries.keys().map(|k| k.to_string()).collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn put_then_lookup() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 10_000).await;

        store.put(&key("a"), b"alpha").await.unwrap();

        assert_eq!(store.lookup(&key("a")).await.unwrap(), b"alpha");
        assert!(dir.path().join("a.img").exists());
        assert_eq!(store.info().await.total_bytes, 5);
    }

    #[tokio::test]
    async fn lookup_miss_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 10_000).await;
        let before = store.info().await;

        assert!(store.lookup(&key("missing")).await.is_none());
        assert_eq!(store.info().await, before);
    }

    #[tokio::test]
    async fn evicts_oldest_when_over_budget() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1000).await;

        store.put(&key("a"), &[1u8; 400]).await.unwrap();
        store.put(&key("b"), &[2u8; 400]).await.unwrap();
        store.put(&key("c"), &[3u8; 400]).await.unwrap();

        assert_eq!(keys(&store).await, vec!["b", "c"]);
        assert_eq!(store.info().await.total_bytes, 800);
        assert!(!dir.path().join("a.img").exists());
    }

    #[tokio::test]
    async fn lookup_refreshes_recency() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1000).await;

        store.put(&key("a"), &[1u8; 400]).await.unwrap();
        store.put(&key("b"), &[2u8; 400]).await.unwrap();
        store.lookup(&key("a")).await.unwrap();
        store.put(&key("c"), &[3u8; 400]).await.unwrap();

        assert_eq!(keys(&store).await, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn eviction_order_follows_access_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 500).await;

        for name in ["a", "b", "c", "d", "e"] {
            store.put(&key(name), &[0u8; 100]).await.unwrap();
        }
        // Access order now: b, d, a, e, c (oldest first)
        for name in ["b", "d", "a", "e", "c"] {
            store.lookup(&key(name)).await.unwrap();
        }

        store.put(&key("f"), &[0u8; 250]).await.unwrap();

        // Needed 250 bytes back: b, d, a go in that order
        assert_eq!(keys(&store).await, vec!["c", "e", "f"]);
    }

    #[tokio::test]
    async fn budget_holds_after_every_put() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1000).await;

        for i in 0..40u64 {
            let size = 50 + (i * 37) % 300;
            store
                .put(&key(&format!("k{}", i)), &vec![0u8; size as usize])
                .await
                .unwrap();

            let state = store.state.lock().await;
            let summed: u64 = state.entries.values().map(|e| e.byte_size).sum();
            assert_eq!(summed, state.total_bytes);
            assert!(state.total_bytes <= 1000);
        }
    }

    #[tokio::test]
    async fn oversized_entry_is_not_retained() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100).await;

        store.put(&key("small"), &[0u8; 50]).await.unwrap();
        store.put(&key("huge"), &[0u8; 150]).await.unwrap();

        assert!(!store.contains(&key("huge")).await);
        assert_eq!(store.info().await.total_bytes, 0);
    }

    #[tokio::test]
    async fn overwrite_replaces_size() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 10_000).await;

        store.put(&key("a"), &[0u8; 300]).await.unwrap();
        store.put(&key("a"), &[1u8; 100]).await.unwrap();

        let info = store.info().await;
        assert_eq!(info.entry_count, 1);
        assert_eq!(info.total_bytes, 100);
        assert_eq!(store.lookup(&key("a")).await.unwrap(), vec![1u8; 100]);
    }

    #[tokio::test]
    async fn largest_first_policy() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path(), 800, EvictionPolicy::LargestFirst)
            .await
            .unwrap();

        store.put(&key("a"), &[0u8; 100]).await.unwrap();
        store.put(&key("b"), &[0u8; 500]).await.unwrap();
        store.put(&key("c"), &[0u8; 300]).await.unwrap();

        assert_eq!(keys(&store).await, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn reopen_restores_entries_and_recency() {
        let dir = TempDir::new().unwrap();
        {
            let store = store(&dir, 1000).await;
            store.put(&key("a"), &[1u8; 400]).await.unwrap();
            store.put(&key("b"), &[2u8; 400]).await.unwrap();
            store.lookup(&key("a")).await.unwrap();
            store.flush().await;
        }

        let store = store(&dir, 1000).await;
        assert_eq!(store.info().await.total_bytes, 800);
        let entry = store.entry(&key("a")).await.unwrap();
        assert_eq!(entry.byte_size, 400);
        assert_eq!(entry.storage_path, dir.path().join("a.img"));

        store.put(&key("c"), &[3u8; 400]).await.unwrap();
        assert_eq!(keys(&store).await, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn reopen_reconciles_with_disk() {
        let dir = TempDir::new().unwrap();
        {
            let store = store(&dir, 10_000).await;
            store.put(&key("kept"), b"kept").await.unwrap();
            store.put(&key("gone"), b"gone").await.unwrap();
        }
        std::fs::remove_file(dir.path().join("gone.img")).unwrap();
        std::fs::write(dir.path().join("orphan.img"), b"orphan!").unwrap();
        std::fs::write(dir.path().join("partial.0123abcd.tmp"), b"half").unwrap();

        let store =
            DiskStore::open_with_tmp_grace(dir.path(), 10_000, EvictionPolicy::Lru, Duration::ZERO)
                .await
                .unwrap();

        assert_eq!(keys(&store).await, vec!["kept", "orphan"]);
        assert_eq!(store.info().await.total_bytes, 4 + 7);
        assert!(!dir.path().join("partial.0123abcd.tmp").exists());
    }

    #[tokio::test]
    async fn open_leaves_recent_temp_files() {
        let dir = TempDir::new().unwrap();
        let writing = dir.path().join("busy.0123abcd.tmp");
        std::fs::write(&writing, b"still writing").unwrap();

        let store = store(&dir, 10_000).await;

        assert!(writing.exists());
        assert_eq!(store.info().await.entry_count, 0);
    }

    #[tokio::test]
    async fn inspect_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let tmp = dir.path().join("abc.0123abcd.tmp");
        let img = dir.path().join("abc.img");
        std::fs::write(&tmp, b"half").unwrap();
        std::fs::write(&img, [0u8; 2048]).unwrap();

        let info = DiskStore::inspect(dir.path(), 1024).await.unwrap();

        assert_eq!(info.entry_count, 1);
        assert_eq!(info.total_bytes, 2048);
        assert_eq!(info.budget_bytes, 1024);
        assert!(tmp.exists());
        assert!(img.exists());
        assert!(!dir.path().join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn inspect_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("never-created");

        let info = DiskStore::inspect(&root, 1024).await.unwrap();

        assert_eq!(info.entry_count, 0);
        assert_eq!(info.total_bytes, 0);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn index_writes_are_batched_until_flush() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 10_000).await;
        store.put(&key("a"), b"abc").await.unwrap();
        store.put(&key("b"), b"defg").await.unwrap();

        assert!(!dir.path().join(INDEX_FILE).exists());

        store.flush().await;
        let records = load_index(dir.path()).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, key("a"));
        assert_eq!(records[1].key, key("b"));
    }

    #[tokio::test]
    async fn index_is_written_after_enough_puts() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1_000_000).await;
        for i in 0..INDEX_PERSIST_EVERY {
            store.put(&key(&format!("k{}", i)), b"x").await.unwrap();
        }

        assert_eq!(load_index(dir.path()).await.len(), INDEX_PERSIST_EVERY);
    }

    fn write_index(dir: &TempDir, records: Vec<IndexRecord>) {
        let index = IndexFile {
            version: INDEX_VERSION,
            entries: records,
        };
        std::fs::write(dir.path().join(INDEX_FILE), serde_json::to_vec(&index).unwrap()).unwrap();
    }

    fn record(name: &str, size: u64, when: &str, tick: u64) -> IndexRecord {
        IndexRecord {
            key: key(name),
            byte_size: size,
            last_access: when.parse().unwrap(),
            access_tick: tick,
        }
    }

    #[tokio::test]
    async fn reopen_orders_by_tick_not_wall_clock() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.img"), [0u8; 400]).unwrap();
        std::fs::write(dir.path().join("b.img"), [0u8; 400]).unwrap();
        // b was used first even though the clock stepped forward in between
        write_index(
            &dir,
            vec![
                record("a", 400, "2020-01-01T00:00:00Z", 7),
                record("b", 400, "2030-01-01T00:00:00Z", 2),
            ],
        );

        let store = store(&dir, 500).await;

        assert_eq!(keys(&store).await, vec!["a"]);
    }

    #[tokio::test]
    async fn reopen_trusts_size_on_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.img"), b"12345").unwrap();
        write_index(&dir, vec![record("a", 3, "2024-05-01T00:00:00Z", 0)]);

        let store = store(&dir, 10_000).await;

        assert_eq!(store.entry(&key("a")).await.unwrap().byte_size, 5);
        assert_eq!(store.lookup(&key("a")).await.unwrap(), b"12345");
    }

    #[tokio::test]
    async fn reopen_with_smaller_budget_evicts() {
        let dir = TempDir::new().unwrap();
        {
            let store = store(&dir, 10_000).await;
            store.put(&key("a"), &[0u8; 400]).await.unwrap();
            store.put(&key("b"), &[0u8; 400]).await.unwrap();
        }

        let store = store(&dir, 500).await;
        assert_eq!(keys(&store).await, vec!["b"]);
    }

    #[tokio::test]
    async fn corrupt_index_is_rebuilt_from_files() {
        let dir = TempDir::new().unwrap();
        {
            let store = store(&dir, 10_000).await;
            store.put(&key("a"), b"abc").await.unwrap();
        }
        std::fs::write(dir.path().join(INDEX_FILE), b"{not json").unwrap();

        let store = store(&dir, 10_000).await;
        assert_eq!(store.lookup(&key("a")).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn missing_file_degrades_to_miss() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 10_000).await;
        store.put(&key("a"), b"abc").await.unwrap();

        std::fs::remove_file(dir.path().join("a.img")).unwrap();

        assert!(store.lookup(&key("a")).await.is_none());
        assert!(!store.contains(&key("a")).await);
        assert_eq!(store.info().await.total_bytes, 0);
    }

    #[tokio::test]
    async fn failed_write_is_not_indexed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("images");
        let store = DiskStore::open(&root, 10_000, EvictionPolicy::Lru).await.unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        let err = store.put(&key("a"), b"abc").await.unwrap_err();

        assert_eq!(err.key, key("a"));
        assert!(!store.contains(&key("a")).await);
        assert_eq!(store.info().await.total_bytes, 0);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 10_000).await;
        store.put(&key("a"), b"abc").await.unwrap();
        store.put(&key("b"), b"defg").await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);

        let info = store.info().await;
        assert_eq!(info.entry_count, 0);
        assert_eq!(info.total_bytes, 0);
        assert!(!dir.path().join("a.img").exists());
        assert!(!dir.path().join("b.img").exists());
    }

    #[test]
    fn policy_deserializes() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: EvictionPolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"largest_first\"").unwrap();
        assert_eq!(w.policy, EvictionPolicy::LargestFirst);
    }
}
