use std::fmt::{self, Debug};
use std::sync::Arc;

use hoard_util::ahash::{AHashMap, AHashSet};
use hoard_util::eyre::{eyre, Result};
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use crate::bundle::Bundle;
use crate::id::{BundleId, IdAllocator, UntypedId};
use crate::manifest::BundleCatalog;
use crate::record::Status;
use crate::task::Task;
use crate::{Assets, LoadError};

pub(crate) enum BundleState {
    Unloaded,
    AwaitingDependencies,
    Fetching,
    Loaded(Arc<dyn Bundle>),
    Failed(LoadError),
}

impl BundleState {
    pub fn status(&self) -> Status {
        match self {
            BundleState::Unloaded => Status::Unloaded,
            BundleState::AwaitingDependencies | BundleState::Fetching => Status::Loading,
            BundleState::Loaded(_) => Status::Loaded,
            BundleState::Failed(_) => Status::Failed,
        }
    }
}

impl Debug for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleState::Unloaded => f.write_str("Unloaded"),
            BundleState::AwaitingDependencies => f.write_str("AwaitingDependencies"),
            BundleState::Fetching => f.write_str("Fetching"),
            BundleState::Loaded(_) => f.write_str("Loaded"),
            BundleState::Failed(error) => write!(f, "Failed({})", error),
        }
    }
}

/// Something to notify once a bundle settles.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Waiter {
    Asset(UntypedId),
    Bundle(BundleId),
}

#[derive(Debug)]
pub(crate) struct BundleRecord {
    pub name: Arc<str>,
    pub state: BundleState,
    pub dependencies: SmallVec<[BundleId; 4]>,
    pub consumers: AHashSet<UntypedId>,
    waiters: SmallVec<[Waiter; 2]>,
}

/// Bundle records, one per name while anything consumes them.
#[derive(Debug, Default)]
pub(crate) struct Bundles {
    records: AHashMap<BundleId, BundleRecord>,
    by_name: AHashMap<Arc<str>, BundleId>,
    ids: IdAllocator,
}

impl Bundles {
    /// Returns the record for `name`, creating it and its dependency records
    /// on first use. Dependencies are resolved exactly once per record.
    pub fn get_or_create(&mut self, name: &Arc<str>, catalog: &dyn BundleCatalog) -> BundleId {
        let mut visiting = Vec::new();
        self.get_or_create_inner(name, catalog, &mut visiting)
    }

    fn get_or_create_inner(
        &mut self,
        name: &Arc<str>,
        catalog: &dyn BundleCatalog,
        visiting: &mut Vec<BundleId>,
    ) -> BundleId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }

        let id = BundleId(self.ids.alloc());
        trace!(bundle = %name, "creating bundle record");

        // registered before resolving so dependents find it
        self.by_name.insert(name.clone(), id);
        self.records.insert(
            id,
            BundleRecord {
                name: name.clone(),
                state: BundleState::Unloaded,
                dependencies: SmallVec::new(),
                consumers: AHashSet::default(),
                waiters: SmallVec::new(),
            },
        );

        visiting.push(id);

        let mut dependencies = SmallVec::<[BundleId; 4]>::new();
        for dependency in catalog.dependencies(name) {
            let dependency = self.get_or_create_inner(&dependency, catalog, visiting);

            if visiting.contains(&dependency) {
                warn!(bundle = %name, "ignoring cyclic bundle dependency");
                continue;
            }

            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }

        visiting.pop();

        if let Some(record) = self.records.get_mut(&id) {
            record.dependencies = dependencies;
        }

        id
    }

    /// Adds `consumer` to `id` and, only if it was not there yet, to every
    /// transitive dependency.
    pub fn add_consumer(&mut self, id: BundleId, consumer: UntypedId) {
        let record = match self.records.get_mut(&id) {
            Some(v) => v,
            None => return,
        };

        if !record.consumers.insert(consumer) {
            return;
        }

        let dependencies = record.dependencies.clone();
        for dependency in dependencies {
            self.add_consumer(dependency, consumer);
        }
    }

    /// Removes `consumer` from `id` and its dependencies, releasing every
    /// bundle left without consumers.
    pub fn remove_consumer(&mut self, id: BundleId, consumer: UntypedId) {
        let record = match self.records.get_mut(&id) {
            Some(v) => v,
            None => return,
        };

        record.consumers.remove(&consumer);
        let dependencies = record.dependencies.clone();

        if record.consumers.is_empty() {
            if let Some(record) = self.records.remove(&id) {
                self.by_name.remove(&record.name);
                debug!(bundle = %record.name, "bundle released");
            }
        }

        for dependency in dependencies {
            self.remove_consumer(dependency, consumer);
        }
    }

    pub fn get(&self, id: BundleId) -> Option<&BundleRecord> {
        self.records.get(&id)
    }

    pub fn find(&self, name: &str) -> Option<&BundleRecord> {
        let id = self.by_name.get(name)?;
        self.records.get(id)
    }

    pub fn loaded(&self, id: BundleId) -> Option<Arc<dyn Bundle>> {
        match &self.records.get(&id)?.state {
            BundleState::Loaded(bundle) => Some(bundle.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

fn released_bundle() -> LoadError {
    LoadError::bundle(&Arc::from("<released>"), eyre!("bundle record was released"))
}

impl Assets {
    pub(crate) fn request_bundle(&mut self, id: BundleId, waiter: Waiter) {
        let record = match self.bundles.records.get_mut(&id) {
            Some(v) => v,
            None => return self.notify_waiter(waiter, Err(released_bundle())),
        };

        match record.state {
            BundleState::Unloaded => {
                debug!(bundle = %record.name, "loading bundle");
                record.waiters.push(waiter);
                record.state = BundleState::AwaitingDependencies;

                let dependencies = record.dependencies.clone();
                for dependency in dependencies {
                    let loaded = matches!(
                        self.bundles.get(dependency).map(|v| &v.state),
                        Some(BundleState::Loaded(_))
                    );

                    if !loaded {
                        self.request_bundle(dependency, Waiter::Bundle(id));
                    }
                }

                self.resume_bundle(id);
            }

            BundleState::AwaitingDependencies | BundleState::Fetching => {
                record.waiters.push(waiter);
            }

            BundleState::Loaded(_) => self.notify_waiter(waiter, Ok(())),

            BundleState::Failed(ref error) => {
                let error = error.clone();
                self.notify_waiter(waiter, Err(error));
            }
        }
    }

    /// Re-checks the dependencies of a bundle waiting on them; starts the
    /// fetch once all are loaded.
    fn resume_bundle(&mut self, id: BundleId) {
        let record = match self.bundles.get(id) {
            Some(v) => v,
            None => return,
        };

        if !matches!(record.state, BundleState::AwaitingDependencies) {
            return;
        }

        let mut ready = true;
        for &dependency in &record.dependencies {
            match self.bundles.get(dependency).map(|v| &v.state) {
                Some(BundleState::Loaded(_)) => {}
                Some(BundleState::Failed(error)) => {
                    let error = error.clone();
                    return self.fail_bundle(id, error);
                }
                Some(_) => ready = false,
                None => return self.fail_bundle(id, released_bundle()),
            }
        }

        if !ready {
            return;
        }

        let name = record.name.clone();
        if let Some(record) = self.bundles.records.get_mut(&id) {
            record.state = BundleState::Fetching;
        }

        trace!(bundle = %name, "dependencies ready, fetching");
        self.shared.spawn(Task::Bundle {
            id,
            name,
            loader: self.shared.bundle_loader.clone(),
        });
    }

    pub(crate) fn finish_bundle(&mut self, id: BundleId, result: Result<Box<dyn Bundle>>) {
        let record = match self.bundles.records.get_mut(&id) {
            Some(v) => v,
            None => {
                trace!(?id, "fetch finished for a released bundle");
                return;
            }
        };

        if !matches!(record.state, BundleState::Fetching) {
            warn!(bundle = %record.name, state = ?record.state, "unexpected bundle completion");
            return;
        }

        match result {
            Ok(bundle) => {
                debug!(bundle = %record.name, "bundle loaded");
                record.state = BundleState::Loaded(Arc::from(bundle));

                let waiters = std::mem::take(&mut record.waiters);
                for waiter in waiters {
                    self.notify_waiter(waiter, Ok(()));
                }
            }
            Err(error) => {
                let error = LoadError::bundle(&record.name, error);
                self.fail_bundle(id, error);
            }
        }
    }

    fn fail_bundle(&mut self, id: BundleId, error: LoadError) {
        let record = match self.bundles.records.get_mut(&id) {
            Some(v) => v,
            None => return,
        };

        error!(bundle = %record.name, %error, "bundle failed");
        record.state = BundleState::Failed(error.clone());

        let waiters = std::mem::take(&mut record.waiters);
        for waiter in waiters {
            self.notify_waiter(waiter, Err(error.clone()));
        }
    }

    fn notify_waiter(&mut self, waiter: Waiter, result: Result<(), LoadError>) {
        match (waiter, result) {
            (Waiter::Bundle(parent), _) => self.resume_bundle(parent),
            (Waiter::Asset(asset), Ok(())) => self.continue_packed(asset),
            (Waiter::Asset(asset), Err(error)) => {
                self.shared.commands.asset_fetched(asset, Err(error));
            }
        }
    }

    /// Loads `id` and its dependencies on the calling thread.
    pub(crate) fn load_bundle_sync(&mut self, id: BundleId) -> Result<Arc<dyn Bundle>, LoadError> {
        let record = match self.bundles.get(id) {
            Some(v) => v,
            None => return Err(released_bundle()),
        };

        let name = record.name.clone();
        match &record.state {
            BundleState::Loaded(bundle) => return Ok(bundle.clone()),
            BundleState::Failed(error) => return Err(error.clone()),
            BundleState::AwaitingDependencies | BundleState::Fetching => {
                error!(bundle = %name, "cannot load synchronously while an asynchronous load is in flight");
                return Err(LoadError::Misuse { path: name });
            }
            BundleState::Unloaded => {}
        }

        let dependencies = record.dependencies.clone();
        for dependency in dependencies {
            match self.load_bundle_sync(dependency) {
                Ok(_) => {}
                Err(error @ LoadError::Misuse { .. }) => return Err(error),
                Err(error) => {
                    self.set_bundle_state(id, BundleState::Failed(error.clone()));
                    return Err(error);
                }
            }
        }

        debug!(bundle = %name, "loading bundle synchronously");
        match self.shared.bundle_loader.load(&name) {
            Ok(bundle) => {
                let bundle: Arc<dyn Bundle> = Arc::from(bundle);
                self.set_bundle_state(id, BundleState::Loaded(bundle.clone()));
                Ok(bundle)
            }
            Err(error) => {
                let error = LoadError::bundle(&name, error);
                error!(bundle = %name, %error, "bundle failed");
                self.set_bundle_state(id, BundleState::Failed(error.clone()));
                Err(error)
            }
        }
    }

    fn set_bundle_state(&mut self, id: BundleId, state: BundleState) {
        if let Some(record) = self.bundles.records.get_mut(&id) {
            record.state = state;
        }
    }

    /// Status of the bundle record named `name`, if one is alive.
    pub fn bundle_status(&self, name: &str) -> Option<Status> {
        self.bundles.find(name).map(|record| record.state.status())
    }

    /// Number of asset records keeping the bundle named `name` alive.
    pub fn bundle_consumer_count(&self, name: &str) -> usize {
        self.bundles
            .find(name)
            .map_or(0, |record| record.consumers.len())
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles.len()
    }
}
