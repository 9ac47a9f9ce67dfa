use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hoard_util::eyre::{bail, Result, WrapErr};

/// A loaded container. Dropping it releases whatever the loader holds.
pub trait Bundle: Send + Sync + Debug + 'static {
    /// Streamed scene bundles are complete once loaded; nothing is
    /// extracted from them.
    fn is_streamed_scene(&self) -> bool {
        false
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>>;
}

/// Opens bundles by name. How bytes are laid out is up to the implementor.
#[async_trait]
pub trait BundleLoader: Send + Sync + Debug + 'static {
    fn load(&self, name: &str) -> Result<Box<dyn Bundle>>;

    async fn load_async(&self, name: &str) -> Result<Box<dyn Bundle>> {
        self.load(name)
    }
}

#[async_trait]
impl<L: BundleLoader> BundleLoader for Arc<L> {
    fn load(&self, name: &str) -> Result<Box<dyn Bundle>> {
        (**self).load(name)
    }

    async fn load_async(&self, name: &str) -> Result<Box<dyn Bundle>> {
        (**self).load_async(name).await
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoBundles;

impl BundleLoader for NoBundles {
    fn load(&self, name: &str) -> Result<Box<dyn Bundle>> {
        bail!("no bundle loader configured for {}", name)
    }
}

/// Treats every directory under `root` as an unpacked bundle. A `.scene`
/// file inside marks a streamed scene bundle.
#[derive(Debug)]
pub struct DirBundleLoader {
    root: PathBuf,
}

impl DirBundleLoader {
    pub fn new(root: impl AsRef<Path>) -> Result<DirBundleLoader> {
        let root = root.as_ref();
        Ok(DirBundleLoader {
            root: root
                .canonicalize()
                .wrap_err_with(|| format!("cannot open {}", root.display()))?,
        })
    }
}

impl BundleLoader for DirBundleLoader {
    fn load(&self, name: &str) -> Result<Box<dyn Bundle>> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            bail!("bundle directory {} does not exist", dir.display());
        }

        let scene = dir.join(".scene").is_file();
        Ok(Box::new(DirBundle { dir, scene }))
    }
}

#[derive(Debug)]
struct DirBundle {
    dir: PathBuf,
    scene: bool,
}

impl Bundle for DirBundle {
    fn is_streamed_scene(&self) -> bool {
        self.scene
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        std::fs::read(&path).wrap_err_with(|| format!("cannot read {}", path.display()))
    }
}
