use std::any::Any;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use hoard_util::eyre::{Result, WrapErr};
use hoard_util::rtti::{self, TypeId};
use serde::de::DeserializeOwned;

use crate::{Asset, LoaderRegistry};

/// Turns the bytes found at a path (loose file or bundle entry) into an asset.
#[async_trait]
pub trait AssetLoader<A: Asset>: Send + Sync + 'static {
    fn filter(&self, path: &str) -> bool {
        let _ = path;
        true
    }

    async fn load(&self, path: &str, bytes: Vec<u8>) -> Result<A>;
}

pub struct JsonAssetLoader<A>(PhantomData<fn() -> A>);

impl<A> JsonAssetLoader<A> {
    pub fn new() -> JsonAssetLoader<A> {
        JsonAssetLoader(PhantomData)
    }
}

impl<A> Default for JsonAssetLoader<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A> AssetLoader<A> for JsonAssetLoader<A>
where
    A: Asset + DeserializeOwned,
{
    fn filter(&self, path: &str) -> bool {
        path.ends_with(".json")
    }

    async fn load(&self, path: &str, data: Vec<u8>) -> Result<A> {
        serde_json::from_slice(&data).wrap_err_with(|| format!("invalid json in {}", path))
    }
}

struct TextLoader;

#[async_trait]
impl AssetLoader<String> for TextLoader {
    async fn load(&self, _path: &str, data: Vec<u8>) -> Result<String> {
        String::from_utf8(data).wrap_err("invalid utf-8")
    }
}

struct RawLoader;

#[async_trait]
impl AssetLoader<Vec<u8>> for RawLoader {
    async fn load(&self, _path: &str, data: Vec<u8>) -> Result<Vec<u8>> {
        Ok(data)
    }
}

impl Asset for String {
    fn register_loaders(registry: &mut LoaderRegistry) {
        registry.add(TextLoader);
    }
}

impl Asset for Vec<u8> {
    fn register_loaders(registry: &mut LoaderRegistry) {
        registry.add(RawLoader);
    }
}

/// Type-erased payload owned by an asset record.
pub trait AnyAsset: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    fn asset_type(&self) -> TypeId;
}

impl<T: Asset> AnyAsset for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn asset_type(&self) -> TypeId {
        TypeId::of::<T>()
    }
}

#[derive(Clone)]
pub struct AssetLoaderObject {
    ty: TypeId,
    asset_type: TypeId,
    loader: Arc<dyn DynAssetLoader>,
}

impl AssetLoaderObject {
    pub fn new<A, L>(loader: L) -> AssetLoaderObject
    where
        A: Asset,
        L: AssetLoader<A>,
    {
        rtti::register::<A>();
        rtti::register::<L>();

        AssetLoaderObject {
            ty: TypeId::of::<L>(),
            asset_type: TypeId::of::<A>(),
            loader: Arc::new((loader, PhantomData::<fn() -> A>)),
        }
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn asset_type(&self) -> TypeId {
        self.asset_type
    }

    pub fn filter(&self, path: &str) -> bool {
        self.loader.filter(path)
    }

    pub async fn load(&self, path: &str, bytes: Vec<u8>) -> Result<Box<dyn AnyAsset>> {
        self.loader.load(path, bytes).await
    }
}

impl Debug for AssetLoaderObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetLoaderObject")
            .field("ty", &self.ty)
            .field("asset_type", &self.asset_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
trait DynAssetLoader: Send + Sync {
    fn filter(&self, path: &str) -> bool;

    async fn load(&self, path: &str, bytes: Vec<u8>) -> Result<Box<dyn AnyAsset>>;
}

#[async_trait]
impl<A, L> DynAssetLoader for (L, PhantomData<fn() -> A>)
where
    L: AssetLoader<A>,
    A: Asset,
{
    fn filter(&self, path: &str) -> bool {
        AssetLoader::<A>::filter(&self.0, path)
    }

    async fn load(&self, path: &str, bytes: Vec<u8>) -> Result<Box<dyn AnyAsset>> {
        let asset = AssetLoader::<A>::load(&self.0, path, bytes).await?;
        Ok(Box::new(asset) as Box<dyn AnyAsset>)
    }
}
