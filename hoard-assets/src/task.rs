use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hoard_util::eyre::{Result, WrapErr};
use tokio::runtime::Runtime;
use tracing::{error, instrument, trace};

use crate::bundle::{Bundle, BundleLoader};
use crate::command::CommandSender;
use crate::id::{BundleId, UntypedId};
use crate::loader::{AnyAsset, AssetLoaderObject};
use crate::{LoadError, Source};

pub fn build_runtime(worker_threads: usize) -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .thread_name_fn(|| {
            static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
            let id = ATOMIC_ID.fetch_add(1, Ordering::SeqCst);
            format!("assets-{}", id)
        })
        .build()
        .expect("failed to create tokio runtime")
}

/// A fetch running off the owning thread. Its outcome comes back as a
/// command, so state only changes inside `Assets::maintain`.
pub enum Task {
    Loose {
        id: UntypedId,
        path: Arc<str>,
        source: Arc<dyn Source>,
        loader: AssetLoaderObject,
    },
    Extract {
        id: UntypedId,
        path: Arc<str>,
        entry: Arc<str>,
        bundle: Arc<dyn Bundle>,
        loader: AssetLoaderObject,
    },
    Bundle {
        id: BundleId,
        name: Arc<str>,
        loader: Arc<dyn BundleLoader>,
    },
}

impl Task {
    pub fn spawn(self, runtime: &Runtime, commands: &CommandSender) {
        let commands = commands.clone();
        runtime.spawn(self.execute(commands));
    }

    async fn execute(self, commands: CommandSender) {
        match self {
            Task::Loose {
                id,
                path,
                source,
                loader,
            } => {
                let result = fetch_loose(&path, &*source, &loader).await;
                commands.asset_fetched(id, into_fetch_result(&path, result));
            }

            Task::Extract {
                id,
                path,
                entry,
                bundle,
                loader,
            } => {
                let result = extract(&path, &entry, &*bundle, &loader).await;
                // the registry may release the bundle as soon as it sees the result
                drop(bundle);
                commands.asset_fetched(id, into_fetch_result(&path, result));
            }

            Task::Bundle { id, name, loader } => {
                let result = fetch_bundle(&name, &*loader).await;
                if let Err(error) = &result {
                    error!(?error);
                }
                commands.bundle_fetched(id, result);
            }
        }
    }
}

fn into_fetch_result(
    path: &Arc<str>,
    result: Result<Box<dyn AnyAsset>>,
) -> Result<Option<Box<dyn AnyAsset>>, LoadError> {
    match result {
        Ok(asset) => Ok(Some(asset)),
        Err(error) => {
            error!(?error);
            Err(LoadError::fetch(path, error))
        }
    }
}

#[instrument(skip_all, fields(path = %path))]
pub async fn fetch_loose(
    path: &str,
    source: &dyn Source,
    loader: &AssetLoaderObject,
) -> Result<Box<dyn AnyAsset>> {
    let bytes = source
        .read_bytes_async(path)
        .await
        .wrap_err_with(|| format!("cannot read {}", path))?;

    trace!(len = bytes.len(), loader_type = ?loader.ty(), "decoding");
    loader.load(path, bytes).await
}

#[instrument(skip_all, fields(path = %path, entry = %entry))]
pub async fn extract(
    path: &str,
    entry: &str,
    bundle: &dyn Bundle,
    loader: &AssetLoaderObject,
) -> Result<Box<dyn AnyAsset>> {
    let bytes = bundle
        .read_entry(entry)
        .wrap_err_with(|| format!("cannot extract {} from bundle", entry))?;

    trace!(len = bytes.len(), loader_type = ?loader.ty(), "decoding");
    loader.load(path, bytes).await
}

#[instrument(skip_all, fields(bundle = %name))]
async fn fetch_bundle(name: &str, loader: &dyn BundleLoader) -> Result<Box<dyn Bundle>> {
    let bundle = loader.load_async(name).await?;
    trace!("bundle fetched");
    Ok(bundle)
}
