use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::ops::Index;
use std::sync::Arc;
use std::time::Duration;

use hoard_util::rtti::{self, TypeId};
use tracing::{debug, error, info, trace, warn};

use crate::bundle::{BundleLoader, NoBundles};
use crate::bundles::Bundles;
use crate::command::{new_command_channel, CommandReceiver};
use crate::loader::AssetLoaderObject;
use crate::loaders::AssetLoaders;
use crate::manifest::{BundleCatalog, EmptyCatalog};
use crate::record::{normalize_path, AssetInfo, AssetRecords, Status, Strategy};
use crate::shared::SharedData;
use crate::task::build_runtime;
use crate::{
    Asset, AssetLoader, AssetsConfig, Handle, Id, LoadError, Scene, Source, UntypedId,
};

type Callback = Box<dyn FnOnce(&mut Assets, Result<(), LoadError>) + Send>;

pub(crate) struct PendingCallback {
    pub target: UntypedId,
    callback: Callback,
}

/// Reference-counted asset registry.
///
/// Every load request returns a [`Handle`] that must be given back through
/// [`Assets::unload`]. A record is torn down once its last handle is gone,
/// it is not pinned and no fetch is in flight. Fetches run on a background
/// runtime; their results, and every completion callback, are applied on
/// the thread calling [`Assets::maintain`].
pub struct Assets {
    pub(crate) records: AssetRecords,
    pub(crate) bundles: Bundles,
    pub(crate) loaders: AssetLoaders,
    pub(crate) callbacks: VecDeque<PendingCallback>,
    pub(crate) pending: VecDeque<UntypedId>,
    pub(crate) shared: SharedData,
    pub(crate) config: AssetsConfig,
    command_receiver: CommandReceiver,
}

pub struct AssetsBuilder {
    config: AssetsConfig,
    source: Arc<dyn Source>,
    bundle_loader: Arc<dyn BundleLoader>,
    catalog: Arc<dyn BundleCatalog>,
}

impl AssetsBuilder {
    pub fn config(mut self, config: AssetsConfig) -> AssetsBuilder {
        self.config = config;
        self
    }

    pub fn bundles<L, C>(mut self, loader: L, catalog: C) -> AssetsBuilder
    where
        L: BundleLoader,
        C: BundleCatalog,
    {
        self.bundle_loader = Arc::new(loader);
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn build(self) -> Assets {
        rtti::register::<Scene>();

        let (commands, command_receiver) = new_command_channel();
        let shared = SharedData {
            commands,
            source: self.source,
            bundle_loader: self.bundle_loader,
            catalog: self.catalog,
            runtime: build_runtime(self.config.worker_threads),
        };

        debug!(config = ?self.config, "asset registry created");

        Assets {
            records: AssetRecords::default(),
            bundles: Bundles::default(),
            loaders: AssetLoaders::new(),
            callbacks: VecDeque::new(),
            pending: VecDeque::new(),
            shared,
            config: self.config,
            command_receiver,
        }
    }
}

impl Assets {
    pub fn new<S: Source>(source: S) -> Assets {
        Self::builder(source).build()
    }

    pub fn builder<S: Source>(source: S) -> AssetsBuilder {
        AssetsBuilder {
            config: AssetsConfig::default(),
            source: Arc::new(source),
            bundle_loader: Arc::new(NoBundles),
            catalog: Arc::new(EmptyCatalog),
        }
    }

    pub fn config(&self) -> &AssetsConfig {
        &self.config
    }

    pub fn add_loader<A, L>(&mut self, loader: L)
    where
        A: Asset,
        L: AssetLoader<A>,
    {
        self.loaders.ensure_registered::<A>();
        self.loaders.insert(AssetLoaderObject::new(loader));
    }

    /// Loads `path` on the calling thread.
    ///
    /// Fails with [`LoadError::Misuse`] if the record is being loaded
    /// asynchronously; the reference count is left as it was.
    pub fn load<A: Asset>(&mut self, path: &str) -> Result<Handle<A>, LoadError> {
        self.loaders.ensure_registered::<A>();
        let id = self.acquire(path, TypeId::of::<A>(), false)?;

        if let Err(error) = self.load_record_sync(id) {
            self.release(id);
            return Err(error);
        }

        Ok(Handle::new(Id::from_untyped(id)))
    }

    /// Requests `path` without blocking. `on_loaded` runs exactly once
    /// during a later [`Assets::maintain`], never inside this call.
    pub fn load_async<A, F>(&mut self, path: &str, on_loaded: F) -> Result<Handle<A>, LoadError>
    where
        A: Asset,
        F: FnOnce(&mut Assets, Result<Id<A>, LoadError>) + Send + 'static,
    {
        self.loaders.ensure_registered::<A>();
        let id = self.acquire(path, TypeId::of::<A>(), false)?;

        self.enqueue(
            id,
            Box::new(move |assets: &mut Assets, result: Result<(), LoadError>| {
                on_loaded(assets, result.map(|()| Id::from_untyped(id)));
            }),
        );

        Ok(Handle::new(Id::from_untyped(id)))
    }

    pub fn load_scene(&mut self, path: &str) -> Result<Handle<Scene>, LoadError> {
        let id = self.acquire(path, TypeId::of::<Scene>(), true)?;

        if let Err(error) = self.load_record_sync(id) {
            self.release(id);
            return Err(error);
        }

        Ok(Handle::new(Id::from_untyped(id)))
    }

    pub fn load_scene_async<F>(&mut self, path: &str, on_loaded: F) -> Result<Handle<Scene>, LoadError>
    where
        F: FnOnce(&mut Assets, Result<(), LoadError>) + Send + 'static,
    {
        let id = self.acquire(path, TypeId::of::<Scene>(), true)?;
        self.enqueue(id, Box::new(on_loaded));
        Ok(Handle::new(Id::from_untyped(id)))
    }

    /// Gives back one reference. The record goes away with its last
    /// reference unless it is pinned or still loading.
    pub fn unload<A: Asset>(&mut self, handle: Handle<A>) {
        self.release(handle.untyped_id());
    }

    pub fn set_pinned(&mut self, id: impl Into<UntypedId>, pinned: bool) {
        let id = id.into();
        let record = match self.records.get_mut(id) {
            Some(v) => v,
            None => return,
        };

        record.pinned = pinned;
        trace!(path = %record.path, pinned, "pin changed");

        if record.is_unloadable() {
            self.teardown(id);
        }
    }

    pub fn find<A: Asset>(&self, path: &str) -> Option<Id<A>> {
        self.records
            .find(&normalize_path(path), Some(TypeId::of::<A>()), false)
            .map(Id::from_untyped)
    }

    /// Like [`Assets::find`], but `ty` also matches registered subtypes.
    pub fn find_untyped(&self, path: &str, ty: Option<TypeId>) -> Option<UntypedId> {
        self.records.find(&normalize_path(path), ty, true)
    }

    /// Whether the record at `path` can be used right now.
    pub fn ready(&self, path: &str) -> Result<UntypedId, LoadError> {
        let path = normalize_path(path);
        let not_ready = |path: &Arc<str>| LoadError::NotReady { path: path.clone() };

        let id = self
            .records
            .find(&path, None, false)
            .ok_or_else(|| not_ready(&path))?;

        match self.records.get(id) {
            Some(record) if record.status == Status::Loaded => Ok(id),
            Some(record) if record.status == Status::Failed => record.result().map(|()| id),
            Some(record) => Err(not_ready(&record.path)),
            None => Err(not_ready(&path)),
        }
    }

    pub fn get<A: Asset>(&self, id: Id<A>) -> Option<&A> {
        let record = self.records.get(id.untyped())?;
        record.payload.as_deref()?.as_any().downcast_ref::<A>()
    }

    pub fn try_get<A: Asset>(&self, id: Id<A>) -> Result<&A, LoadError> {
        let record = match self.records.get(id.untyped()) {
            Some(v) => v,
            None => {
                return Err(LoadError::NotReady {
                    path: format!("{:?}", id).into(),
                })
            }
        };

        record.result()?;

        record
            .payload
            .as_deref()
            .and_then(|payload| payload.as_any().downcast_ref::<A>())
            .ok_or_else(|| LoadError::NotReady {
                path: record.path.clone(),
            })
    }

    /// [`Status::Unloaded`] for ids whose record is gone.
    pub fn status(&self, id: impl Into<UntypedId>) -> Status {
        self.records
            .get(id.into())
            .map_or(Status::Unloaded, |record| record.status)
    }

    pub fn info(&self, id: impl Into<UntypedId>) -> Option<AssetInfo> {
        let id = id.into();
        self.records.get(id).map(|record| record.info(id))
    }

    /// Every live record, oldest first.
    pub fn lingering(&self) -> Vec<AssetInfo> {
        self.records
            .iter()
            .map(|(id, record)| record.info(id))
            .collect()
    }

    pub fn log_lingering(&self) {
        let lingering = self.lingering();
        if lingering.is_empty() {
            return;
        }

        info!(count = lingering.len(), "assets still referenced");
        for asset in lingering {
            debug!(
                path = %asset.path,
                type_name = asset.type_name.unwrap_or("?"),
                status = ?asset.status,
                reference_count = asset.reference_count,
                pinned = asset.pinned,
                "lingering asset"
            );
        }
    }

    pub fn loading_count(&self) -> usize {
        self.records.loading_count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.len() == 0
    }

    /// Runs `command` during the next scheduling turn.
    pub fn defer<F>(&self, command: F)
    where
        F: FnOnce(&mut Assets) + Send + 'static,
    {
        self.shared.commands.closure(command);
    }

    /// One scheduling turn: applies the completions and deferred work queued
    /// before the call. Work queued during the turn waits for the next one.
    pub fn maintain(&mut self) {
        let count = self.command_receiver.len();
        for _ in 0..count {
            match self.command_receiver.try_recv() {
                Some(command) => command.execute(self),
                None => break,
            }
        }
    }

    /// Waits up to `timeout` for work, then runs a turn. Returns `false` if
    /// nothing arrived.
    pub fn maintain_blocking(&mut self, timeout: Duration) -> bool {
        match self.command_receiver.recv_timeout(timeout) {
            Some(command) => {
                command.execute(self);
                self.maintain();
                true
            }
            None => false,
        }
    }

    fn acquire(&mut self, path: &str, ty: TypeId, scene: bool) -> Result<UntypedId, LoadError> {
        let path = normalize_path(path);

        if let Some(id) = self.records.find(&path, Some(ty), false) {
            if let Some(record) = self.records.get_mut(id) {
                record.reference_count += 1;
                trace!(path = %record.path, reference_count = record.reference_count, "reference added");
            }
            return Ok(id);
        }

        let strategy = self.resolve_strategy(&path, scene)?;
        let id = self.records.insert(path.clone(), ty, strategy);
        if let Some(record) = self.records.get_mut(id) {
            record.reference_count = 1;
        }

        if let Strategy::Packed(bundle) = strategy {
            self.bundles.add_consumer(bundle, id);
        }

        trace!(path = %path, ?strategy, "record created");
        Ok(id)
    }

    fn resolve_strategy(&mut self, path: &Arc<str>, scene: bool) -> Result<Strategy, LoadError> {
        if let Some(bundle) = self.shared.catalog.find_bundle_for_path(path) {
            let bundle = self.bundles.get_or_create(&bundle, &*self.shared.catalog);
            return Ok(Strategy::Packed(bundle));
        }

        if !scene && self.shared.source.exists(path) {
            return Ok(Strategy::Loose);
        }

        if self.config.development {
            warn!(path = %path, "no metadata, using a placeholder");
            return Ok(Strategy::Dummy);
        }

        error!(path = %path, "no bundle or local asset matches");
        Err(LoadError::MissingMetadata { path: path.clone() })
    }

    fn enqueue(&mut self, target: UntypedId, callback: Callback) {
        self.callbacks.push_back(PendingCallback { target, callback });

        let status = match self.records.get(target) {
            Some(record) => record.status,
            None => return,
        };

        match status {
            Status::Unloaded => {
                if !self.pending.contains(&target) {
                    self.pending.push_back(target);
                }
                self.start_pending();
            }
            Status::Loading => {}
            Status::Loaded | Status::Failed => self.shared.commands.drain(),
        }
    }

    /// Starts queued records, oldest first, while under the concurrency cap.
    pub(crate) fn start_pending(&mut self) {
        let limit = self.config.max_concurrent_loads.max(1);

        while self.records.loading_count() < limit {
            let id = match self.pending.pop_front() {
                Some(v) => v,
                None => break,
            };

            self.start_asset(id);
        }
    }

    /// Delivers, in submission order, every queued callback whose target
    /// has settled. Callbacks waiting on pending targets stay queued.
    pub(crate) fn drain_callbacks(&mut self) {
        loop {
            let records = &self.records;
            let index = self.callbacks.iter().position(|entry| {
                records
                    .get(entry.target)
                    .map_or(false, |record| record.status.is_settled())
            });

            let entry = match index.and_then(|index| self.callbacks.remove(index)) {
                Some(v) => v,
                None => break,
            };

            let result = self
                .records
                .get(entry.target)
                .map_or(Ok(()), |record| record.result());

            trace!(target = ?entry.target, ok = result.is_ok(), "delivering callback");
            (entry.callback)(self, result);
        }
    }
}

impl Debug for Assets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assets")
            .field("records", &self.records.len())
            .field("bundles", &self.bundles.len())
            .field("callbacks", &self.callbacks.len())
            .field("pending", &self.pending.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Debug for AssetsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetsBuilder")
            .field("config", &self.config)
            .field("source", &self.source)
            .field("bundle_loader", &self.bundle_loader)
            .field("catalog", &self.catalog)
            .finish()
    }
}

impl<A: Asset> Index<Id<A>> for Assets {
    type Output = A;

    fn index(&self, id: Id<A>) -> &A {
        match self.get(id) {
            Some(v) => v,
            None => no_such_asset(id),
        }
    }
}

#[cold]
#[inline(never)]
fn no_such_asset<A>(id: Id<A>) -> ! {
    panic!("asset {:?} is not loaded", id);
}
