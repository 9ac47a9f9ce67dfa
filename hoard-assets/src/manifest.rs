use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use hoard_util::ahash::AHashMap;
use hoard_util::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Static description of one bundle.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct BundleInfo {
    pub name: String,
    #[serde(default)]
    pub crc: u32,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub file_size: u64,
}

pub type BundleNames = SmallVec<[Arc<str>; 4]>;

/// Answers which bundle holds a path and what each bundle depends on.
pub trait BundleCatalog: Send + Sync + Debug + 'static {
    fn dependencies(&self, bundle: &str) -> BundleNames;

    fn find_bundle_for_path(&self, path: &str) -> Option<Arc<str>>;
}

impl<C: BundleCatalog> BundleCatalog for Arc<C> {
    fn dependencies(&self, bundle: &str) -> BundleNames {
        (**self).dependencies(bundle)
    }

    fn find_bundle_for_path(&self, path: &str) -> Option<Arc<str>> {
        (**self).find_bundle_for_path(path)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyCatalog;

impl BundleCatalog for EmptyCatalog {
    fn dependencies(&self, _bundle: &str) -> BundleNames {
        BundleNames::new()
    }

    fn find_bundle_for_path(&self, _path: &str) -> Option<Arc<str>> {
        None
    }
}

#[derive(Deserialize, Serialize)]
struct ManifestFile {
    bundles: Vec<BundleInfo>,
}

#[derive(Clone, Debug, Default)]
pub struct Manifest {
    bundles: Vec<BundleInfo>,
    names: Vec<Arc<str>>,
    lowercase: Vec<String>,
    by_name: AHashMap<String, usize>,
}

impl Manifest {
    pub fn new() -> Manifest {
        Manifest::default()
    }

    pub fn from_bundles(bundles: impl IntoIterator<Item = BundleInfo>) -> Manifest {
        let mut manifest = Manifest::new();
        for info in bundles {
            manifest.insert(info);
        }
        manifest
    }

    pub fn from_json(data: &str) -> Result<Manifest> {
        let file: ManifestFile = serde_json::from_str(data).wrap_err("invalid bundle manifest")?;
        Ok(Manifest::from_bundles(file.bundles))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read {}", path.display()))?;
        Self::from_json(&data).wrap_err_with(|| format!("cannot parse {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        let file = ManifestFile {
            bundles: self.bundles.clone(),
        };
        serde_json::to_string_pretty(&file).wrap_err("cannot serialize bundle manifest")
    }

    /// Adds a bundle, replacing an earlier entry with the same name.
    pub fn insert(&mut self, info: BundleInfo) {
        let key = info.name.to_lowercase();
        let name = Arc::from(info.name.as_str());

        if let Some(&index) = self.by_name.get(&key) {
            self.bundles[index] = info;
            self.names[index] = name;
            return;
        }

        self.by_name.insert(key.clone(), self.bundles.len());
        self.bundles.push(info);
        self.names.push(name);
        self.lowercase.push(key);
    }

    pub fn get(&self, name: &str) -> Option<&BundleInfo> {
        let index = *self.by_name.get(&name.to_lowercase())?;
        self.bundles.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BundleInfo> + '_ {
        self.bundles.iter()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.bundles.iter().map(|info| info.file_size).sum()
    }

    fn find_index(&self, path: &str) -> Option<usize> {
        let lower = path.to_lowercase();

        if let Some(&index) = self.by_name.get(&lower) {
            return Some(index);
        }

        self.lowercase.iter().position(|name| lower.contains(name.as_str()))
    }
}

impl BundleCatalog for Manifest {
    fn dependencies(&self, bundle: &str) -> BundleNames {
        match self.get(bundle) {
            Some(info) => info
                .dependencies
                .iter()
                .map(|name| match self.by_name.get(&name.to_lowercase()) {
                    Some(&index) => self.names[index].clone(),
                    None => Arc::from(name.as_str()),
                })
                .collect(),
            None => BundleNames::new(),
        }
    }

    fn find_bundle_for_path(&self, path: &str) -> Option<Arc<str>> {
        self.find_index(path).map(|index| self.names[index].clone())
    }
}
