//! Directory-backed [`DurableStore`].
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   <collection>/        (name percent-encoded)
//!     meta.json          collection metadata
//!     wal.log            batches since the last snapshot
//!     data.qvr           snapshot of live records
//! ```
//!
//! The live state of a collection is the snapshot with the log replayed on
//! top. Compaction folds the log into a fresh snapshot and truncates it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::backend::IndexConfig;
use crate::error::Result;
use crate::storage::data_file::DataFile;
use crate::storage::wal::{SyncMode, Wal, WalEntry};
use crate::storage::{CollectionMeta, DurableStore};
use crate::vector::VectorRecord;

const META_FILE: &str = "meta.json";
const WAL_FILE: &str = "wal.log";
const DATA_FILE: &str = "data.qvr";

/// Tuning for [`FileStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStoreOptions {
    /// When WAL frames are synced to disk.
    pub sync_mode: SyncMode,
    /// Number of WAL frames that triggers automatic compaction. `0` disables it.
    pub compact_after: usize,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Immediate,
            compact_after: 1024,
        }
    }
}

impl FileStoreOptions {
    /// Sets the sync mode.
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Sets the compaction threshold.
    pub fn compact_after(mut self, frames: usize) -> Self {
        self.compact_after = frames;
        self
    }
}

/// Files of one open collection.
#[derive(Debug)]
struct CollectionFiles {
    dir: PathBuf,
    wal: Wal,
    data: DataFile,
}

/// Durable store keeping one directory per collection.
///
/// # Example
///
/// ```no_run
/// use quiver_core::{DurableStore, FileStore, IndexConfig, Metric};
///
/// let mut store = FileStore::open("./my_vectors").unwrap();
/// let config = IndexConfig::new("docs", 384, Metric::Cosine);
/// store.ensure_meta("docs", &config).unwrap();
/// let records = store.load_items("docs").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    options: FileStoreOptions,
    collections: HashMap<String, CollectionFiles>,
}

impl FileStore {
    /// Opens or creates a store rooted at `path` with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, FileStoreOptions::default())
    }

    /// Opens or creates a store rooted at `path`.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: FileStoreOptions) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            options,
            collections: HashMap::new(),
        })
    }

    /// Returns the root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory holding a collection's files.
    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        collection_dir(&self.root, collection)
    }

    /// Opens a collection's files on first use.
    fn files(&mut self, collection: &str) -> Result<&mut CollectionFiles> {
        match self.collections.entry(collection.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let dir = collection_dir(&self.root, collection);
                fs::create_dir_all(&dir)?;
                let (wal, pending) = Wal::open(dir.join(WAL_FILE), self.options.sync_mode)?;
                debug!(collection, pending = pending.len(), "Opened collection files");
                Ok(entry.insert(CollectionFiles {
                    data: DataFile::new(dir.join(DATA_FILE)),
                    dir,
                    wal,
                }))
            }
        }
    }

    /// Appends a batch, then compacts if the log has grown past the threshold.
    fn commit(&mut self, collection: &str, entry: WalEntry) -> Result<()> {
        let compact_after = self.options.compact_after;
        let files = self.files(collection)?;
        files.wal.append(&entry)?;

        if compact_after > 0 && files.wal.frames() >= compact_after {
            // The batch is already durable; a failed compaction only delays cleanup.
            if let Err(e) = compact_files(collection, files) {
                warn!(collection, error = %e, "Automatic compaction failed");
            }
        }
        Ok(())
    }
}

fn collection_dir(root: &Path, collection: &str) -> PathBuf {
    root.join(urlencoding::encode(collection).as_ref())
}

/// Snapshot with the log replayed on top.
fn materialize(files: &CollectionFiles) -> Result<Vec<VectorRecord>> {
    let mut live = LiveSet::from_records(files.data.read()?);
    for entry in Wal::read_all(files.wal.path())?.entries {
        live.apply(entry);
    }
    Ok(live.records)
}

fn compact_files(collection: &str, files: &mut CollectionFiles) -> Result<()> {
    files.wal.sync()?;
    let records = materialize(files)?;
    let folded = files.wal.frames();
    files.data.write(&records)?;
    files.wal.truncate()?;
    info!(
        collection,
        records = records.len(),
        frames = folded,
        "Compacted collection"
    );
    Ok(())
}

fn write_meta(dir: &Path, meta: &CollectionMeta) -> Result<()> {
    let path = dir.join(META_FILE);
    let tmp = dir.join("meta.json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(meta)?)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, &path)?;
    Ok(())
}

impl DurableStore for FileStore {
    fn ensure_meta(&mut self, collection: &str, config: &IndexConfig) -> Result<CollectionMeta> {
        let dir = self.files(collection)?.dir.clone();
        let path = dir.join(META_FILE);

        let meta = if path.exists() {
            let mut meta: CollectionMeta = serde_json::from_slice(&fs::read(&path)?)?;
            meta.check(collection, config)?;
            meta.touch();
            meta
        } else {
            info!(
                collection,
                dimension = config.dimension,
                metric = %config.metric,
                normalize = config.normalize,
                "Created collection"
            );
            CollectionMeta::new(config)
        };

        write_meta(&dir, &meta)?;
        Ok(meta)
    }

    fn load_items(&mut self, collection: &str) -> Result<Vec<VectorRecord>> {
        let files = self.files(collection)?;
        materialize(files)
    }

    fn persist_items(&mut self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        debug!(collection, count = records.len(), "Persisting records");
        self.commit(
            collection,
            WalEntry::Put {
                records: records.to_vec(),
            },
        )
    }

    fn remove_items(&mut self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        debug!(collection, count = ids.len(), "Removing records");
        self.commit(
            collection,
            WalEntry::Delete {
                ids: ids.to_vec(),
            },
        )
    }

    fn clear_items(&mut self, collection: &str) -> Result<()> {
        let files = self.files(collection)?;
        // The Clear frame is the commit point; compaction only reclaims space.
        files.wal.append(&WalEntry::Clear)?;
        if let Err(e) = compact_files(collection, files) {
            warn!(collection, error = %e, "Compaction after clear failed");
        }
        Ok(())
    }

    fn compact(&mut self, collection: &str) -> Result<()> {
        let files = self.files(collection)?;
        compact_files(collection, files)
    }

    fn close(&mut self) -> Result<()> {
        for (_, mut files) in self.collections.drain() {
            files.wal.sync()?;
        }
        Ok(())
    }
}

/// Live records in insertion order with an id index.
#[derive(Debug, Default)]
struct LiveSet {
    records: Vec<VectorRecord>,
    positions: HashMap<String, usize>,
}

impl LiveSet {
    fn from_records(records: Vec<VectorRecord>) -> Self {
        let mut live = Self::default();
        for record in records {
            live.put(record);
        }
        live
    }

    fn apply(&mut self, entry: WalEntry) {
        match entry {
            WalEntry::Put { records } => records.into_iter().for_each(|r| self.put(r)),
            WalEntry::Delete { ids } => ids.iter().for_each(|id| self.delete(id)),
            WalEntry::Clear => {
                self.records.clear();
                self.positions.clear();
            }
        }
    }

    fn put(&mut self, record: VectorRecord) {
        match self.positions.get(&record.id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn delete(&mut self, id: &str) {
        let Some(pos) = self.positions.remove(id) else {
            return;
        };
        self.records.swap_remove(pos);
        if let Some(moved) = self.records.get(pos) {
            self.positions.insert(moved.id.clone(), pos);
        }
    }
}
