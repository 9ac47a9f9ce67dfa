mod latency;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hoard_assets::{
    Assets, AssetsConfig, DirBundleLoader, DirSource, Handle, LoadError, Manifest, Scene,
};
use hoard_util::eyre::{bail, Result, WrapErr};
use hoard_util::parking_lot::Mutex;
use tracing::{info, warn};

use self::latency::LatencyStats;

const SCENE_PREFIX: &str = "scene:";

enum Request {
    Asset(Handle<Vec<u8>>),
    Scene(Handle<Scene>),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let root = match args.next() {
        Some(v) => v,
        None => bail!("usage: hoard-main <root> [path | scene:path]..."),
    };

    let mut assets = open(Path::new(&root))?;
    let stats = Arc::new(Mutex::new(LatencyStats::new(64)));
    let failures = Arc::new(Mutex::new(0usize));

    let mut requests = Vec::new();
    for path in args {
        let start = Instant::now();
        let stats = stats.clone();
        let failures = failures.clone();

        let on_loaded = move |path: String, result: Result<(), LoadError>| {
            match result {
                Ok(()) => info!(%path, elapsed = ?start.elapsed(), "loaded"),
                Err(error) => {
                    warn!(%path, %error, "failed");
                    *failures.lock() += 1;
                }
            }
            stats.lock().add_sample(start.elapsed());
        };

        let request = if let Some(scene) = path.strip_prefix(SCENE_PREFIX) {
            let label = scene.to_owned();
            assets
                .load_scene_async(scene, move |_, result| on_loaded(label, result))
                .map(Request::Scene)
        } else {
            let label = path.clone();
            assets
                .load_async::<Vec<u8>, _>(&path, move |_, result| {
                    on_loaded(label, result.map(drop))
                })
                .map(Request::Asset)
        };

        match request {
            Ok(v) => requests.push(v),
            Err(error) => warn!(%error, "request rejected"),
        }
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    while stats.lock().total() < requests.len() {
        if Instant::now() > deadline {
            warn!("timed out waiting for loads");
            break;
        }
        assets.maintain_blocking(Duration::from_millis(100));
    }

    {
        let stats = stats.lock();
        info!(
            requested = requests.len(),
            completed = stats.total(),
            failed = *failures.lock(),
            mean = ?Duration::from_secs_f32(stats.mean()),
            max = ?Duration::from_secs_f32(stats.max()),
            "done"
        );
    }

    assets.log_lingering();

    for request in requests {
        match request {
            Request::Asset(handle) => assets.unload(handle),
            Request::Scene(handle) => assets.unload(handle),
        }
    }

    if !assets.is_empty() {
        warn!(count = assets.len(), "assets left after unloading every request");
        assets.log_lingering();
    }

    Ok(())
}

/// Builds a registry over `root`:
///
/// - `root/assets.json`: optional [`AssetsConfig`],
/// - `root/loose`: loose assets,
/// - `root/bundles`: one directory per bundle, described by
///   `root/bundles/manifest.json`.
fn open(root: &Path) -> Result<Assets> {
    let config_path = root.join("assets.json");
    let config = if config_path.is_file() {
        AssetsConfig::load(&config_path)?
    } else {
        AssetsConfig::default()
    };

    let source = DirSource::new(root.join("loose")).wrap_err("cannot open loose assets")?;
    let builder = Assets::builder(source).config(config);

    let bundles = root.join("bundles");
    let manifest_path = bundles.join("manifest.json");
    if !manifest_path.is_file() {
        return Ok(builder.build());
    }

    let manifest = Manifest::load(&manifest_path)?;
    info!(
        bundles = manifest.len(),
        total_size = manifest.total_size(),
        "bundle manifest loaded"
    );

    let loader = DirBundleLoader::new(&bundles)?;
    Ok(builder.bundles(loader, manifest).build())
}
