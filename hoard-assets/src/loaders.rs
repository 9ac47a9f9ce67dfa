use hoard_util::ahash::{AHashMap, AHashSet};
use hoard_util::rtti::{self, TypeId};
use smallvec::SmallVec;

use crate::loader::AssetLoaderObject;
use crate::{Asset, AssetLoader};

#[derive(Debug, Default)]
pub struct AssetLoaders {
    loaders: AHashMap<TypeId, SmallVec<[AssetLoaderObject; 1]>>,
    initialized: AHashSet<TypeId>,
}

impl AssetLoaders {
    pub fn new() -> AssetLoaders {
        AssetLoaders::default()
    }

    /// Runs `A::register_loaders` the first time `A` is requested.
    pub fn ensure_registered<A: Asset>(&mut self) {
        if self.initialized.insert(TypeId::of::<A>()) {
            rtti::register::<A>();
            A::register_loaders(&mut LoaderRegistry { loaders: self });
        }
    }

    pub fn insert(&mut self, loader: AssetLoaderObject) {
        let list = self.loaders.entry(loader.asset_type()).or_default();
        list.retain(|v| v.ty() != loader.ty());
        list.push(loader);
    }

    /// The most recently added loader for `asset_type` accepting `path`.
    pub fn find(&self, asset_type: TypeId, path: &str) -> Option<AssetLoaderObject> {
        let list = self.loaders.get(&asset_type)?;
        list.iter().rev().find(|loader| loader.filter(path)).cloned()
    }
}

pub struct LoaderRegistry<'a> {
    loaders: &'a mut AssetLoaders,
}

impl LoaderRegistry<'_> {
    pub fn add<A: Asset, L: AssetLoader<A>>(&mut self, loader: L) {
        self.loaders.insert(AssetLoaderObject::new(loader));
    }
}
