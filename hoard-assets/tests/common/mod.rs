#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hoard_assets::{
    Assets, AssetsConfig, Bundle, BundleCatalog, BundleInfo, BundleLoader, BundleNames, Manifest,
    MemorySource, Source,
};
use hoard_util::ahash::AHashMap;
use hoard_util::eyre::{bail, eyre, Result};
use hoard_util::parking_lot::Mutex;
use tokio::sync::Semaphore;

/// Gates keyed by name. A gated read waits until [`Gates::open`] is called
/// for its name, one permit per read.
#[derive(Debug, Default)]
pub struct Gates {
    gates: Mutex<AHashMap<String, Arc<Semaphore>>>,
}

impl Gates {
    pub fn close(&self, name: &str) {
        self.gates
            .lock()
            .insert(name.to_owned(), Arc::new(Semaphore::new(0)));
    }

    pub fn open(&self, name: &str) {
        if let Some(gate) = self.gates.lock().get(name) {
            gate.add_permits(1);
        }
    }

    async fn pass(&self, name: &str) -> Result<()> {
        let gate = self.gates.lock().get(name).cloned();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        Ok(())
    }
}

/// In-memory loose storage whose reads can be held back.
#[derive(Debug, Default)]
pub struct TestSource {
    files: MemorySource,
    pub gates: Gates,
    fetches: Mutex<Vec<String>>,
}

impl TestSource {
    pub fn new() -> Arc<TestSource> {
        Arc::new(TestSource::default())
    }

    pub fn file(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.files.insert(path, data);
    }

    pub fn fetches(&self, path: &str) -> usize {
        self.fetches.lock().iter().filter(|v| *v == path).count()
    }
}

#[async_trait]
impl Source for TestSource {
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        self.files.read_bytes(path)
    }

    async fn read_bytes_async(&self, path: &str) -> Result<Vec<u8>> {
        self.fetches.lock().push(path.to_owned());
        self.gates.pass(path).await?;
        self.read_bytes(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.files.exists(path)
    }
}

#[derive(Clone, Debug, Default)]
struct BundleSpec {
    entries: AHashMap<String, Vec<u8>>,
    scene: bool,
    fail: bool,
}

/// Bundle loader serving bundles described in memory. Records the order
/// fetches start in and the order bundles are dropped in.
#[derive(Debug, Default)]
pub struct TestBundles {
    specs: Mutex<AHashMap<String, BundleSpec>>,
    pub gates: Gates,
    fetch_log: Mutex<Vec<String>>,
    released: Arc<Mutex<Vec<String>>>,
}

impl TestBundles {
    pub fn new() -> Arc<TestBundles> {
        Arc::new(TestBundles::default())
    }

    pub fn bundle(&self, name: &str, entries: &[(&str, &str)]) {
        let entries = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect();

        self.specs.lock().insert(
            name.to_owned(),
            BundleSpec {
                entries,
                ..BundleSpec::default()
            },
        );
    }

    pub fn scene(&self, name: &str) {
        self.specs.lock().insert(
            name.to_owned(),
            BundleSpec {
                scene: true,
                ..BundleSpec::default()
            },
        );
    }

    pub fn failing(&self, name: &str) {
        self.specs.lock().insert(
            name.to_owned(),
            BundleSpec {
                fail: true,
                ..BundleSpec::default()
            },
        );
    }

    pub fn fetch_log(&self) -> Vec<String> {
        self.fetch_log.lock().clone()
    }

    pub fn fetches(&self, name: &str) -> usize {
        self.fetch_log.lock().iter().filter(|v| *v == name).count()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().clone()
    }

    fn open_bundle(&self, name: &str) -> Result<Box<dyn Bundle>> {
        let spec = match self.specs.lock().get(name) {
            Some(v) => v.clone(),
            None => bail!("unknown bundle {}", name),
        };

        if spec.fail {
            bail!("corrupt bundle {}", name);
        }

        Ok(Box::new(TestBundle {
            name: name.to_owned(),
            spec,
            released: self.released.clone(),
        }))
    }
}

#[async_trait]
impl BundleLoader for TestBundles {
    fn load(&self, name: &str) -> Result<Box<dyn Bundle>> {
        self.fetch_log.lock().push(name.to_owned());
        self.open_bundle(name)
    }

    async fn load_async(&self, name: &str) -> Result<Box<dyn Bundle>> {
        self.fetch_log.lock().push(name.to_owned());
        self.gates.pass(name).await?;
        self.open_bundle(name)
    }
}

#[derive(Debug)]
struct TestBundle {
    name: String,
    spec: BundleSpec,
    released: Arc<Mutex<Vec<String>>>,
}

impl Bundle for TestBundle {
    fn is_streamed_scene(&self) -> bool {
        self.spec.scene
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.spec
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| eyre!("{} has no entry {}", self.name, name))
    }
}

impl Drop for TestBundle {
    fn drop(&mut self) {
        self.released.lock().push(self.name.clone());
    }
}

/// Manifest wrapper counting dependency lookups per bundle.
#[derive(Debug, Default)]
pub struct CountingCatalog {
    manifest: Manifest,
    lookups: Mutex<AHashMap<String, usize>>,
}

impl CountingCatalog {
    pub fn new(manifest: Manifest) -> Arc<CountingCatalog> {
        Arc::new(CountingCatalog {
            manifest,
            lookups: Mutex::default(),
        })
    }

    pub fn lookups(&self, bundle: &str) -> usize {
        self.lookups.lock().get(bundle).copied().unwrap_or(0)
    }
}

impl BundleCatalog for CountingCatalog {
    fn dependencies(&self, bundle: &str) -> BundleNames {
        *self.lookups.lock().entry(bundle.to_owned()).or_default() += 1;
        self.manifest.dependencies(bundle)
    }

    fn find_bundle_for_path(&self, path: &str) -> Option<Arc<str>> {
        self.manifest.find_bundle_for_path(path)
    }
}

pub fn manifest(bundles: &[(&str, &[&str])]) -> Manifest {
    Manifest::from_bundles(bundles.iter().map(|(name, dependencies)| BundleInfo {
        name: name.to_string(),
        dependencies: dependencies.iter().map(|v| v.to_string()).collect(),
        ..BundleInfo::default()
    }))
}

pub fn config(max_concurrent_loads: usize, development: bool) -> AssetsConfig {
    AssetsConfig {
        max_concurrent_loads,
        worker_threads: 2,
        development,
    }
}

pub fn loose(source: &Arc<TestSource>, config: AssetsConfig) -> Assets {
    Assets::builder(source.clone()).config(config).build()
}

pub fn packed(
    source: &Arc<TestSource>,
    bundles: &Arc<TestBundles>,
    catalog: impl BundleCatalog,
    config: AssetsConfig,
) -> Assets {
    Assets::builder(source.clone())
        .config(config)
        .bundles(bundles.clone(), catalog)
        .build()
}

pub type Calls = Arc<Mutex<Vec<String>>>;

pub fn calls() -> Calls {
    Arc::default()
}

/// Callback recording `label` on success and `label:err` on failure.
pub fn record<T>(calls: &Calls, label: &str) -> impl FnOnce(&mut Assets, Result<T, hoard_assets::LoadError>) + Send + 'static {
    let calls = calls.clone();
    let label = label.to_owned();
    move |_, result| {
        let entry = match result {
            Ok(_) => label,
            Err(_) => format!("{}:err", label),
        };
        calls.lock().push(entry);
    }
}

/// Runs scheduling turns until `cond` holds.
pub fn pump_until(assets: &mut Assets, mut cond: impl FnMut(&Assets) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond(assets) {
        assert!(Instant::now() < deadline, "timed out waiting for the registry");
        assets.maintain_blocking(Duration::from_millis(20));
    }
}

/// Runs scheduling turns until nothing arrives for a while.
pub fn settle(assets: &mut Assets) {
    while assets.maintain_blocking(Duration::from_millis(100)) {}
}

/// Waits for a condition driven by worker threads alone.
pub fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for workers");
        std::thread::sleep(Duration::from_millis(5));
    }
}
