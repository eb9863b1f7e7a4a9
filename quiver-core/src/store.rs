//! Store facade: option validation, backend selection and dispatch.
//!
//! A [`Store`] owns exactly one backend for one collection. Backends are
//! chosen through a [`BackendSelector`]: a registered name, an injected
//! factory, an injected instance, or `Auto` (persistent when a storage path
//! is configured, in-memory otherwise).

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::backend::{BackendKind, IndexConfig, IndexStats, ItemView, SearchHit, VectorBackend};
use crate::error::{Error, Result};
use crate::filter::{GetOptions, SearchOptions};
use crate::hybrid::{EngineFactory, FlatEngineFactory, HybridIndex};
use crate::index::BruteForceIndex;
use crate::persistent::PersistentIndex;
use crate::storage::{FileStoreOptions, SyncMode};
use crate::vector::{VectorInput, VectorItem};

/// Builds a backend for a validated collection config.
pub trait BackendFactory: Send + Sync {
    fn create(&self, config: IndexConfig, options: &StoreOptions) -> Result<Box<dyn VectorBackend>>;
}

impl<F> BackendFactory for F
where
    F: Fn(IndexConfig, &StoreOptions) -> Result<Box<dyn VectorBackend>> + Send + Sync,
{
    fn create(
        &self,
        config: IndexConfig,
        options: &StoreOptions,
    ) -> Result<Box<dyn VectorBackend>> {
        self(config, options)
    }
}

/// In-memory [`BruteForceIndex`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBackendFactory;

impl BackendFactory for MemoryBackendFactory {
    fn create(&self, config: IndexConfig, _: &StoreOptions) -> Result<Box<dyn VectorBackend>> {
        Ok(Box::new(BruteForceIndex::with_config(config)))
    }
}

/// [`PersistentIndex`] over a file store at `StoreOptions::storage_path`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistentBackendFactory;

impl BackendFactory for PersistentBackendFactory {
    fn create(
        &self,
        config: IndexConfig,
        options: &StoreOptions,
    ) -> Result<Box<dyn VectorBackend>> {
        let Some(path) = &options.storage_path else {
            return Err(Error::BackendUnavailable(
                "persistent backend requires a storage path".into(),
            ));
        };
        let store_options = FileStoreOptions::default().sync_mode(options.sync_mode);
        Ok(Box::new(PersistentIndex::open_path_with_options(
            config,
            path,
            store_options,
        )?))
    }
}

/// [`HybridIndex`] over engines built by an [`EngineFactory`].
#[derive(Clone)]
pub struct HybridBackendFactory {
    engine: Arc<dyn EngineFactory>,
}

impl HybridBackendFactory {
    pub fn new(engine: Arc<dyn EngineFactory>) -> Self {
        Self { engine }
    }
}

impl BackendFactory for HybridBackendFactory {
    fn create(&self, config: IndexConfig, _: &StoreOptions) -> Result<Box<dyn VectorBackend>> {
        Ok(Box::new(HybridIndex::open(config, Arc::clone(&self.engine))?))
    }
}

/// Named backend factories.
///
/// `Default` registers `memory`, `persistent` and `hybrid` (backed by
/// [`FlatEngineFactory`]).
#[derive(Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Creates a registry with no backends.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers (or replaces) a backend factory under `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: impl BackendFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registers a hybrid backend over a third-party engine.
    pub fn register_engine(&mut self, name: impl Into<String>, engine: Arc<dyn EngineFactory>) {
        self.register(name, HybridBackendFactory::new(engine));
    }

    /// Looks a backend up by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn BackendFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(BackendKind::Memory.as_str(), MemoryBackendFactory);
        registry.register(BackendKind::Persistent.as_str(), PersistentBackendFactory);
        registry.register_engine(BackendKind::Hybrid.as_str(), Arc::new(FlatEngineFactory));
        registry
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// How a store picks its backend.
#[derive(Default)]
pub enum BackendSelector {
    /// Persistent if a storage path is set, otherwise memory.
    #[default]
    Auto,
    /// A name looked up in the registry.
    Named(String),
    /// A caller-supplied factory.
    Factory(Arc<dyn BackendFactory>),
    /// A ready-made backend.
    Instance(Box<dyn VectorBackend>),
}

impl fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSelector::Auto => f.write_str("Auto"),
            BackendSelector::Named(name) => f.debug_tuple("Named").field(name).finish(),
            BackendSelector::Factory(_) => f.write_str("Factory(<fn>)"),
            BackendSelector::Instance(b) => f.debug_tuple("Instance").field(&b.stats()).finish(),
        }
    }
}

impl From<&str> for BackendSelector {
    /// `"auto"` (any case) or an empty string selects `Auto`.
    fn from(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("auto") {
            BackendSelector::Auto
        } else {
            BackendSelector::Named(name.to_string())
        }
    }
}

/// Options for opening a [`Store`].
#[derive(Debug)]
pub struct StoreOptions {
    /// Collection name.
    pub name: String,
    /// Required, positive.
    pub dimension: Option<usize>,
    /// `cosine`, `ip` or `l2`.
    pub metric: String,
    /// Defaults to true for cosine only.
    pub normalize: Option<bool>,
    pub backend: BackendSelector,
    /// Root directory for the persistent backend.
    pub storage_path: Option<PathBuf>,
    pub sync_mode: SyncMode,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            dimension: None,
            metric: "cosine".to_string(),
            normalize: None,
            backend: BackendSelector::Auto,
            storage_path: None,
            sync_mode: SyncMode::default(),
        }
    }
}

impl StoreOptions {
    /// Options for a collection of `dimension`-component vectors.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    /// Reads options from `QUIVER_*` environment variables.
    ///
    /// | Variable              | Field          |
    /// |-----------------------|----------------|
    /// | `QUIVER_COLLECTION`   | `name`         |
    /// | `QUIVER_DIMENSION`    | `dimension`    |
    /// | `QUIVER_METRIC`       | `metric`       |
    /// | `QUIVER_BACKEND`      | `backend`      |
    /// | `QUIVER_STORAGE_PATH` | `storage_path` |
    ///
    /// An unparsable dimension is treated as missing.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        if let Some(name) = lookup("QUIVER_COLLECTION") {
            options.name = name;
        }
        options.dimension = lookup("QUIVER_DIMENSION").and_then(|d| d.trim().parse().ok());
        if let Some(metric) = lookup("QUIVER_METRIC") {
            options.metric = metric;
        }
        if let Some(backend) = lookup("QUIVER_BACKEND") {
            options.backend = BackendSelector::from(backend.as_str());
        }
        options.storage_path = lookup("QUIVER_STORAGE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        options
    }

    /// Sets the collection name. Chainable.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the metric name. Chainable.
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    /// Overrides normalization. Chainable.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = Some(normalize);
        self
    }

    /// Selects a backend by registry name. Chainable.
    pub fn with_backend(mut self, name: &str) -> Self {
        self.backend = BackendSelector::from(name);
        self
    }

    /// Selects a caller-supplied factory. Chainable.
    pub fn with_factory(mut self, factory: impl BackendFactory + 'static) -> Self {
        self.backend = BackendSelector::Factory(Arc::new(factory));
        self
    }

    /// Uses a ready-made backend. Chainable.
    pub fn with_instance(mut self, backend: Box<dyn VectorBackend>) -> Self {
        self.backend = BackendSelector::Instance(backend);
        self
    }

    /// Sets the storage root for the persistent backend. Chainable.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Sets the WAL sync mode. Chainable.
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Validates dimension and metric.
    pub fn index_config(&self) -> Result<IndexConfig> {
        IndexConfig::from_parts(&self.name, self.dimension, &self.metric, self.normalize)
    }
}

/// A collection behind a read/write lock.
///
/// Queries share the lock; mutations take it exclusively, so one store may be
/// used from many threads.
///
/// # Example
///
/// ```
/// use quiver_core::{SearchOptions, Store, StoreOptions, VectorItem};
///
/// let store = Store::open(StoreOptions::new(3).with_metric("l2")).unwrap();
/// store.upsert(vec![
///     VectorItem::new("near", vec![0.1, 0.1, 0.0]),
///     VectorItem::new("far", vec![2.0, 2.0, 0.0]),
/// ]).unwrap();
///
/// let hits = store.search(vec![0.0f32, 0.0, 0.0], 1, &SearchOptions::new()).unwrap();
/// assert_eq!(hits[0].id, "near");
/// ```
pub struct Store {
    backend: RwLock<Box<dyn VectorBackend>>,
}

impl Store {
    /// Opens a store using the default registry.
    pub fn open(options: StoreOptions) -> Result<Self> {
        Self::open_with_registry(options, &BackendRegistry::default())
    }

    /// Validates options, resolves the backend and initializes it.
    pub fn open_with_registry(
        mut options: StoreOptions,
        registry: &BackendRegistry,
    ) -> Result<Self> {
        let config = options.index_config()?;
        let selector = std::mem::take(&mut options.backend);

        let backend = match selector {
            BackendSelector::Instance(backend) => {
                let stats = backend.stats();
                if stats.dimension != config.dimension {
                    return Err(Error::DimensionMismatch {
                        expected: config.dimension,
                        got: stats.dimension,
                    });
                }
                if stats.metric != config.metric || stats.normalize != config.normalize {
                    return Err(Error::ConfigMismatch {
                        collection: stats.name,
                        stored: format!("metric={} normalize={}", stats.metric, stats.normalize),
                        requested: format!(
                            "metric={} normalize={}",
                            config.metric, config.normalize
                        ),
                    });
                }
                backend
            }
            BackendSelector::Factory(factory) => factory.create(config, &options)?,
            BackendSelector::Named(name) => registry.get(&name)?.create(config, &options)?,
            BackendSelector::Auto => {
                let kind = if options.storage_path.is_some() {
                    BackendKind::Persistent
                } else {
                    BackendKind::Memory
                };
                debug!(backend = %kind, "Resolved automatic backend");
                registry.get(kind.as_str())?.create(config, &options)?
            }
        };

        let stats = backend.stats();
        info!(
            collection = %stats.name,
            backend = %stats.backend,
            size = stats.size,
            dimension = stats.dimension,
            metric = %stats.metric,
            "Opened store"
        );

        Ok(Self {
            backend: RwLock::new(backend),
        })
    }

    /// Inserts or replaces items. Returns the number processed.
    pub fn upsert(&self, items: Vec<VectorItem>) -> Result<usize> {
        self.backend.write().upsert(items)
    }

    /// Inserts or replaces one item.
    pub fn upsert_one(&self, item: VectorItem) -> Result<usize> {
        self.upsert(vec![item])
    }

    /// Removes items by id. Returns the number removed.
    pub fn remove<I, S>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = collect_ids(ids);
        self.backend.write().remove(&ids)
    }

    /// Looks items up by id; unknown ids are skipped.
    pub fn get<I, S>(&self, ids: I, options: GetOptions) -> Result<Vec<ItemView>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = collect_ids(ids);
        self.backend.read().get(&ids, options)
    }

    /// Top-`k` hits by descending score.
    pub fn search(
        &self,
        query: impl Into<VectorInput>,
        k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        self.backend.read().search(&query.into(), k, options)
    }

    pub fn count(&self) -> usize {
        self.backend.read().count()
    }

    pub fn clear(&self) -> Result<()> {
        self.backend.write().clear()
    }

    pub fn stats(&self) -> IndexStats {
        self.backend.read().stats()
    }

    /// Flushes and releases the backend.
    pub fn close(&self) -> Result<()> {
        self.backend.write().close()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("stats", &self.stats()).finish()
    }
}

fn collect_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Into::into).collect()
}

#[cfg(feature = "async")]
mod async_api {
    use super::*;
    use parking_lot::Mutex;
    use tokio::sync::OnceCell;

    /// Async wrapper around [`Store`].
    ///
    /// Construction does not initialize the backend. The first call starts
    /// initialization on the blocking pool; every call, including concurrent
    /// ones, waits on that same initialization before running. If it fails,
    /// every later call fails with the same message.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use quiver_core::{AsyncStore, SearchOptions, StoreOptions, VectorItem};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let store = AsyncStore::new(StoreOptions::new(3));
    ///     store.upsert(vec![VectorItem::new("a", vec![1.0, 0.0, 0.0])]).await.unwrap();
    ///     let hits = store.search(vec![1.0f32, 0.0, 0.0], 1, SearchOptions::new()).await.unwrap();
    ///     assert_eq!(hits[0].id, "a");
    /// }
    /// ```
    pub struct AsyncStore {
        pending: Mutex<Option<(StoreOptions, Arc<BackendRegistry>)>>,
        ready: OnceCell<Arc<Store>>,
        failure: Mutex<Option<String>>,
    }

    fn join_error(e: tokio::task::JoinError) -> Error {
        Error::Io(std::io::Error::other(format!("spawn_blocking failed: {}", e)))
    }

    impl AsyncStore {
        /// Wraps options for lazy initialization with the default registry.
        pub fn new(options: StoreOptions) -> Self {
            Self::with_registry(options, Arc::new(BackendRegistry::default()))
        }

        /// Wraps options for lazy initialization with a custom registry.
        pub fn with_registry(options: StoreOptions, registry: Arc<BackendRegistry>) -> Self {
            Self {
                pending: Mutex::new(Some((options, registry))),
                ready: OnceCell::new(),
                failure: Mutex::new(None),
            }
        }

        async fn store(&self) -> Result<Arc<Store>> {
            let store = self
                .ready
                .get_or_try_init(|| async {
                    if let Some(message) = self.failure.lock().clone() {
                        return Err(Error::BackendUnavailable(message));
                    }
                    let Some((options, registry)) = self.pending.lock().take() else {
                        return Err(Error::BackendUnavailable(
                            "store initialization did not complete".into(),
                        ));
                    };

                    let opened = tokio::task::spawn_blocking(move || {
                        Store::open_with_registry(options, &registry)
                    })
                    .await
                    .map_err(join_error)
                    .and_then(|r| r);

                    match opened {
                        Ok(store) => Ok(Arc::new(store)),
                        Err(e) => {
                            *self.failure.lock() = Some(e.to_string());
                            Err(e)
                        }
                    }
                })
                .await?;
            Ok(Arc::clone(store))
        }

        /// Waits for initialization.
        pub async fn ready(&self) -> Result<()> {
            self.store().await.map(|_| ())
        }

        pub async fn upsert(&self, items: Vec<VectorItem>) -> Result<usize> {
            let store = self.store().await?;
            tokio::task::spawn_blocking(move || store.upsert(items))
                .await
                .map_err(join_error)?
        }

        pub async fn remove(&self, ids: Vec<String>) -> Result<usize> {
            let store = self.store().await?;
            tokio::task::spawn_blocking(move || store.remove(ids))
                .await
                .map_err(join_error)?
        }

        pub async fn get(&self, ids: Vec<String>, options: GetOptions) -> Result<Vec<ItemView>> {
            let store = self.store().await?;
            tokio::task::spawn_blocking(move || store.get(ids, options))
                .await
                .map_err(join_error)?
        }

        pub async fn search(
            &self,
            query: impl Into<VectorInput>,
            k: usize,
            options: SearchOptions,
        ) -> Result<Vec<SearchHit>> {
            let store = self.store().await?;
            let query = query.into();
            tokio::task::spawn_blocking(move || store.search(query, k, &options))
                .await
                .map_err(join_error)?
        }

        pub async fn count(&self) -> Result<usize> {
            Ok(self.store().await?.count())
        }

        pub async fn clear(&self) -> Result<()> {
            let store = self.store().await?;
            tokio::task::spawn_blocking(move || store.clear())
                .await
                .map_err(join_error)?
        }

        pub async fn stats(&self) -> Result<IndexStats> {
            Ok(self.store().await?.stats())
        }

        pub async fn close(&self) -> Result<()> {
            let store = self.store().await?;
            tokio::task::spawn_blocking(move || store.close())
                .await
                .map_err(join_error)?
        }
    }

}

#[cfg(feature = "async")]
pub use async_api::AsyncStore;
