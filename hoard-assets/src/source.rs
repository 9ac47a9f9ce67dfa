use std::fmt::Debug;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hoard_util::ahash::AHashMap;
use hoard_util::eyre::{eyre, Result, WrapErr};
use hoard_util::parking_lot::RwLock;

/// Local storage for loose assets, addressed by normalized asset path.
#[async_trait]
pub trait Source: Send + Sync + Debug + 'static {
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>>;

    async fn read_bytes_async(&self, path: &str) -> Result<Vec<u8>> {
        self.read_bytes(path)
    }

    fn exists(&self, path: &str) -> bool;
}

#[async_trait]
impl<S: Source> Source for Arc<S> {
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read_bytes(path)
    }

    async fn read_bytes_async(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read_bytes_async(path).await
    }

    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }
}

#[derive(Debug)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl AsRef<Path>) -> Result<DirSource> {
        let root = root.as_ref();
        Ok(DirSource {
            root: root
                .canonicalize()
                .wrap_err_with(|| format!("cannot open {}", root.display()))?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Source for DirSource {
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let file_path = self.root.join(path);
        let mut file = File::open(&file_path)
            .wrap_err_with(|| format!("cannot open {}", file_path.display()))?;

        let meta = file.metadata().ok();
        let capacity = meta
            .and_then(|meta| usize::try_from(meta.len()).ok())
            .unwrap_or(0);

        let mut buf = Vec::with_capacity(capacity);
        file.read_to_end(&mut buf)
            .wrap_err_with(|| format!("cannot read {}", file_path.display()))?;

        Ok(buf)
    }

    fn exists(&self, path: &str) -> bool {
        self.root.join(path).is_file()
    }
}

/// Source backed by an in-memory map, useful for generated content.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: RwLock<AHashMap<String, Arc<[u8]>>>,
}

impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    pub fn with(self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> MemorySource {
        self.insert(path, data);
        self
    }

    pub fn insert(&self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        self.files.write().insert(path.into(), data.into());
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(path).is_some()
    }
}

impl Source for MemorySource {
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let files = self.files.read();
        let data = files.get(path).ok_or_else(|| eyre!("no such file: {}", path))?;
        Ok(data.to_vec())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }
}
