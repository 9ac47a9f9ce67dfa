mod assets;
mod bundle;
mod bundles;
mod command;
mod config;
mod error;
mod handle;
mod id;
mod loader;
mod loaders;
mod manifest;
mod record;
mod shared;
mod source;
mod task;

pub use hoard_util::rtti::TypeId;

pub use self::assets::{Assets, AssetsBuilder};
pub use self::bundle::{Bundle, BundleLoader, DirBundleLoader, NoBundles};
pub use self::config::AssetsConfig;
pub use self::error::LoadError;
pub use self::handle::Handle;
pub use self::id::{Id, UntypedId};
pub use self::loader::{AnyAsset, AssetLoader, JsonAssetLoader};
pub use self::loaders::LoaderRegistry;
pub use self::manifest::{BundleCatalog, BundleInfo, BundleNames, EmptyCatalog, Manifest};
pub use self::record::{AssetInfo, Status};
pub use self::source::{DirSource, MemorySource, Source};

pub trait Asset: Send + Sync + 'static {
    fn register_loaders(registry: &mut LoaderRegistry) {
        let _ = registry;
    }
}

/// Marker payload of a scene record. Scenes are streamed by their bundle;
/// a loaded scene record carries no data.
#[derive(Debug)]
pub struct Scene;

impl Asset for Scene {}
