use std::fmt::{self, Debug};
use std::sync::Arc;

use hoard_util::ahash::AHashMap;
use hoard_util::eyre::eyre;
use hoard_util::rtti::TypeId;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use crate::bundles::Waiter;
use crate::command::FetchResult;
use crate::id::{BundleId, IdAllocator, UntypedId};
use crate::loader::AnyAsset;
use crate::task::{self, Task};
use crate::{Assets, LoadError, Scene};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

impl Status {
    pub fn is_settled(self) -> bool {
        matches!(self, Status::Loaded | Status::Failed)
    }
}

/// How a record produces its payload, fixed when the record is created.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Strategy {
    Loose,
    Packed(BundleId),
    Dummy,
}

pub(crate) struct AssetRecord {
    pub path: Arc<str>,
    pub ty: TypeId,
    pub status: Status,
    pub reference_count: usize,
    pub pinned: bool,
    pub payload: Option<Box<dyn AnyAsset>>,
    pub error: Option<LoadError>,
    pub strategy: Strategy,
}

impl AssetRecord {
    fn new(path: Arc<str>, ty: TypeId, strategy: Strategy) -> AssetRecord {
        AssetRecord {
            path,
            ty,
            status: Status::Unloaded,
            reference_count: 0,
            pinned: false,
            payload: None,
            error: None,
            strategy,
        }
    }

    pub fn is_unloadable(&self) -> bool {
        !self.pinned && self.reference_count == 0 && self.status != Status::Loading
    }

    pub fn result(&self) -> Result<(), LoadError> {
        match (&self.status, &self.error) {
            (Status::Failed, Some(error)) => Err(error.clone()),
            (Status::Failed, None) => Err(LoadError::fetch(&self.path, eyre!("unknown failure"))),
            _ => Ok(()),
        }
    }

    pub fn info(&self, id: UntypedId) -> AssetInfo {
        AssetInfo {
            id,
            path: self.path.clone(),
            type_name: self.ty.type_name(),
            status: self.status,
            reference_count: self.reference_count,
            pinned: self.pinned,
        }
    }
}

impl Debug for AssetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetRecord")
            .field("path", &self.path)
            .field("ty", &self.ty)
            .field("status", &self.status)
            .field("reference_count", &self.reference_count)
            .field("pinned", &self.pinned)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a live record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssetInfo {
    pub id: UntypedId,
    pub path: Arc<str>,
    pub type_name: Option<&'static str>,
    pub status: Status,
    pub reference_count: usize,
    pub pinned: bool,
}

pub(crate) fn normalize_path(path: &str) -> Arc<str> {
    path.replace('\\', "/").into()
}

/// Name of the entry holding `path` inside its bundle.
pub(crate) fn asset_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

#[derive(Debug, Default)]
pub(crate) struct AssetRecords {
    records: AHashMap<UntypedId, AssetRecord>,
    by_path: AHashMap<String, SmallVec<[UntypedId; 1]>>,
    ids: IdAllocator,
}

impl AssetRecords {
    pub fn insert(&mut self, path: Arc<str>, ty: TypeId, strategy: Strategy) -> UntypedId {
        let id = UntypedId(self.ids.alloc());
        self.by_path.entry(path.to_lowercase()).or_default().push(id);
        self.records.insert(id, AssetRecord::new(path, ty, strategy));
        id
    }

    pub fn remove(&mut self, id: UntypedId) -> Option<AssetRecord> {
        let record = self.records.remove(&id)?;
        let key = record.path.to_lowercase();

        if let Some(list) = self.by_path.get_mut(&key) {
            list.retain(|v| *v != id);
            if list.is_empty() {
                self.by_path.remove(&key);
            }
        }

        Some(record)
    }

    pub fn get(&self, id: UntypedId) -> Option<&AssetRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: UntypedId) -> Option<&mut AssetRecord> {
        self.records.get_mut(&id)
    }

    /// Case-insensitive path lookup; `subtypes` also accepts records whose
    /// type was registered as a subtype of `ty`.
    pub fn find(&self, path: &str, ty: Option<TypeId>, subtypes: bool) -> Option<UntypedId> {
        let list = self.by_path.get(&path.to_lowercase())?;
        list.iter().copied().find(|id| {
            let record = match self.records.get(id) {
                Some(v) => v,
                None => return false,
            };

            match ty {
                None => true,
                Some(ty) if subtypes => record.ty.is_subtype_of(ty),
                Some(ty) => record.ty == ty,
            }
        })
    }

    pub fn loading_count(&self) -> usize {
        self.records
            .values()
            .filter(|record| record.status == Status::Loading)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Records in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (UntypedId, &AssetRecord)> + '_ {
        let mut records: Vec<_> = self.records.iter().map(|(&id, r)| (id, r)).collect();
        records.sort_by_key(|(id, _)| *id);
        records.into_iter()
    }
}

fn no_loader(path: &Arc<str>, ty: TypeId) -> LoadError {
    LoadError::fetch(path, eyre!("no loader for {:?}", ty))
}

impl Assets {
    pub(crate) fn start_asset(&mut self, id: UntypedId) {
        let record = match self.records.get_mut(id) {
            Some(v) => v,
            None => return,
        };

        if record.status != Status::Unloaded {
            return;
        }

        record.status = Status::Loading;
        let (path, ty, strategy) = (record.path.clone(), record.ty, record.strategy);
        debug!(path = %path, ?strategy, "loading");

        match strategy {
            Strategy::Loose => match self.loaders.find(ty, &path) {
                Some(loader) => self.shared.spawn(Task::Loose {
                    id,
                    path,
                    source: self.shared.source.clone(),
                    loader,
                }),
                None => self.shared.commands.asset_fetched(id, Err(no_loader(&path, ty))),
            },

            Strategy::Packed(bundle) => self.request_bundle(bundle, Waiter::Asset(id)),

            // resolves on the next turn
            Strategy::Dummy => self.shared.commands.asset_fetched(id, Ok(None)),
        }
    }

    /// Second half of a packed load, run once the owning bundle is loaded.
    pub(crate) fn continue_packed(&mut self, id: UntypedId) {
        let record = match self.records.get(id) {
            Some(v) if v.status == Status::Loading => v,
            _ => return,
        };

        let bundle_id = match record.strategy {
            Strategy::Packed(v) => v,
            _ => return,
        };

        let bundle = match self.bundles.loaded(bundle_id) {
            Some(v) => v,
            None => {
                let error = LoadError::fetch(&record.path, eyre!("bundle is not loaded"));
                self.shared.commands.asset_fetched(id, Err(error));
                return;
            }
        };

        if bundle.is_streamed_scene() || record.ty == TypeId::of::<Scene>() {
            trace!(path = %record.path, "bundle ready, nothing to extract");
            self.shared.commands.asset_fetched(id, Ok(None));
            return;
        }

        let path = record.path.clone();
        let entry = Arc::from(asset_name(&path));

        match self.loaders.find(record.ty, &path) {
            Some(loader) => self.shared.spawn(Task::Extract {
                id,
                path,
                entry,
                bundle,
                loader,
            }),
            None => {
                let error = no_loader(&path, record.ty);
                self.shared.commands.asset_fetched(id, Err(error));
            }
        }
    }

    pub(crate) fn finish_asset(&mut self, id: UntypedId, result: FetchResult) {
        let record = match self.records.get_mut(id) {
            Some(v) => v,
            None => {
                trace!(?id, "fetch finished for a removed record");
                return;
            }
        };

        if record.status != Status::Loading {
            warn!(path = %record.path, status = ?record.status, "unexpected fetch completion");
            return;
        }

        let result = result.and_then(|payload| match payload {
            Some(payload) if payload.asset_type() != record.ty => Err(LoadError::fetch(
                &record.path,
                eyre!(
                    "mismatched types: expected {:?}, got {:?}",
                    record.ty,
                    payload.asset_type()
                ),
            )),
            payload => Ok(payload),
        });

        match result {
            Ok(payload) => {
                debug!(path = %record.path, "loaded");
                record.payload = payload;
                record.status = Status::Loaded;
            }
            Err(error) => {
                warn!(path = %record.path, %error, "load failed");
                record.error = Some(error);
                record.status = Status::Failed;
            }
        }

        self.drain_callbacks();

        // unloaded while in flight, and not picked up again by a callback
        if self.records.get(id).map_or(false, |record| record.is_unloadable()) {
            self.teardown(id);
        }

        self.start_pending();
    }

    pub(crate) fn teardown(&mut self, id: UntypedId) {
        let record = match self.records.remove(id) {
            Some(v) => v,
            None => return,
        };

        debug!(path = %record.path, "unloaded");

        if let Strategy::Packed(bundle) = record.strategy {
            self.bundles.remove_consumer(bundle, id);
        }

        self.callbacks.retain(|entry| entry.target != id);
        self.pending.retain(|&pending| pending != id);
    }

    pub(crate) fn release(&mut self, id: UntypedId) {
        let record = match self.records.get_mut(id) {
            Some(v) => v,
            None => {
                trace!(?id, "unload of a removed record");
                return;
            }
        };

        record.reference_count = record.reference_count.saturating_sub(1);

        let unloadable = record.is_unloadable();
        if !unloadable && record.reference_count == 0 && record.status == Status::Loading {
            debug!(path = %record.path, "unload deferred until the load completes");
        }

        if unloadable {
            self.teardown(id);
        }
    }

    pub(crate) fn load_record_sync(&mut self, id: UntypedId) -> Result<(), LoadError> {
        let record = match self.records.get(id) {
            Some(v) => v,
            None => return Ok(()),
        };

        match record.status {
            Status::Loaded => return Ok(()),
            Status::Failed => return record.result(),
            Status::Loading => {
                error!(path = %record.path, "cannot load synchronously while an asynchronous load is in flight");
                return Err(LoadError::Misuse {
                    path: record.path.clone(),
                });
            }
            Status::Unloaded => {}
        }

        let (path, ty, strategy) = (record.path.clone(), record.ty, record.strategy);
        debug!(path = %path, ?strategy, "loading synchronously");

        let result = match strategy {
            Strategy::Loose => self.fetch_loose_blocking(&path, ty),
            Strategy::Packed(bundle) => self.fetch_packed_blocking(bundle, &path, ty),
            Strategy::Dummy => Ok(None),
        };

        if let Err(error @ LoadError::Misuse { .. }) = result {
            return Err(error);
        }

        let record = match self.records.get_mut(id) {
            Some(v) => v,
            None => return result.map(drop),
        };

        let outcome = match result {
            Ok(payload) => {
                record.payload = payload;
                record.status = Status::Loaded;
                Ok(())
            }
            Err(error) => {
                warn!(path = %record.path, %error, "load failed");
                record.error = Some(error.clone());
                record.status = Status::Failed;
                Err(error)
            }
        };

        // callbacks queued while the record waited for a slot
        self.shared.commands.drain();
        outcome
    }

    fn fetch_loose_blocking(&self, path: &Arc<str>, ty: TypeId) -> FetchResult {
        let loader = self.loaders.find(ty, path).ok_or_else(|| no_loader(path, ty))?;
        let future = task::fetch_loose(path, &*self.shared.source, &loader);
        match self.shared.runtime.block_on(future) {
            Ok(asset) => Ok(Some(asset)),
            Err(error) => Err(LoadError::fetch(path, error)),
        }
    }

    fn fetch_packed_blocking(
        &mut self,
        bundle_id: BundleId,
        path: &Arc<str>,
        ty: TypeId,
    ) -> FetchResult {
        let bundle = self.load_bundle_sync(bundle_id)?;

        if bundle.is_streamed_scene() || ty == TypeId::of::<Scene>() {
            return Ok(None);
        }

        let loader = self.loaders.find(ty, path).ok_or_else(|| no_loader(path, ty))?;
        let future = task::extract(path, asset_name(path), &*bundle, &loader);
        match self.shared.runtime.block_on(future) {
            Ok(asset) => Ok(Some(asset)),
            Err(error) => Err(LoadError::fetch(path, error)),
        }
    }
}
