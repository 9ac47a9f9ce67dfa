use std::sync::Arc;

use hoard_util::eyre::Report;
use thiserror::Error;

/// Why a load request did not produce an asset.
///
/// Collaborator failures are kept as shared [`Report`]s so the same error
/// can be handed to every caller waiting on one fetch.
#[derive(Clone, Debug, Error)]
pub enum LoadError {
    #[error("{path} is being loaded asynchronously and cannot be loaded synchronously")]
    Misuse { path: Arc<str> },

    #[error("no bundle or local asset matches {path}")]
    MissingMetadata { path: Arc<str> },

    #[error("{path} is not loaded yet")]
    NotReady { path: Arc<str> },

    #[error("bundle {bundle} failed to load: {reason:#}")]
    BundleFailed { bundle: Arc<str>, reason: Arc<Report> },

    #[error("failed to load {path}: {reason:#}")]
    Fetch { path: Arc<str>, reason: Arc<Report> },
}

impl LoadError {
    pub(crate) fn fetch(path: &Arc<str>, reason: Report) -> LoadError {
        LoadError::Fetch {
            path: path.clone(),
            reason: Arc::new(reason),
        }
    }

    pub(crate) fn bundle(bundle: &Arc<str>, reason: Report) -> LoadError {
        LoadError::BundleFailed {
            bundle: bundle.clone(),
            reason: Arc::new(reason),
        }
    }
}
