mod common;

use hoard_assets::{LoadError, Manifest, Status};

use common::*;

fn levels() -> Manifest {
    manifest(&[("levels", &["common"]), ("common", &[])])
}

fn level_bundles() -> std::sync::Arc<TestBundles> {
    let bundles = TestBundles::new();
    bundles.bundle("levels", &[("intro.txt", "intro"), ("outro.txt", "outro")]);
    bundles.bundle("common", &[("font.txt", "font")]);
    bundles
}

#[test]
fn test_dependencies_load_before_their_dependents() {
    let source = TestSource::new();
    let bundles = level_bundles();
    bundles.gates.close("common");
    let mut assets = packed(&source, &bundles, levels(), config(5, false));
    let calls = calls();

    let intro = assets
        .load_async::<String, _>("levels/intro.txt", record(&calls, "intro"))
        .unwrap();

    wait_for(|| bundles.fetches("common") == 1);
    settle(&mut assets);

    assert_eq!(bundles.fetch_log(), ["common"]);
    assert_eq!(assets.bundle_status("levels"), Some(Status::Loading));
    assert_eq!(assets.bundle_status("common"), Some(Status::Loading));
    assert!(calls.lock().is_empty());

    bundles.gates.open("common");
    pump_until(&mut assets, |_| !calls.lock().is_empty());

    assert_eq!(*calls.lock(), ["intro"]);
    assert_eq!(bundles.fetch_log(), ["common", "levels"]);
    assert_eq!(assets[intro.id()], "intro");
    assert_eq!(assets.bundle_status("levels"), Some(Status::Loaded));

    assets.unload(intro);
    assert_eq!(assets.bundle_status("levels"), None);
    assert_eq!(assets.bundle_status("common"), None);
}

#[test]
fn test_dependencies_completing_out_of_order() {
    let source = TestSource::new();
    let bundles = TestBundles::new();
    bundles.bundle("world", &[("map.txt", "map")]);
    bundles.bundle("terrain", &[]);
    bundles.bundle("props", &[]);
    bundles.gates.close("terrain");
    bundles.gates.close("props");

    let catalog = manifest(&[("world", &["terrain", "props"]), ("terrain", &[]), ("props", &[])]);
    let mut assets = packed(&source, &bundles, catalog, config(5, false));
    let calls = calls();

    let map = assets
        .load_async::<String, _>("world/map.txt", record(&calls, "map"))
        .unwrap();

    wait_for(|| bundles.fetch_log().len() == 2);

    bundles.gates.open("props");
    pump_until(&mut assets, |assets| {
        assets.bundle_status("props") == Some(Status::Loaded)
    });
    settle(&mut assets);

    assert_eq!(bundles.fetches("world"), 0);
    assert_eq!(assets.bundle_status("world"), Some(Status::Loading));

    bundles.gates.open("terrain");
    pump_until(&mut assets, |_| !calls.lock().is_empty());

    assert_eq!(*calls.lock(), ["map"]);
    assert_eq!(bundles.fetches("terrain"), 1);
    assert_eq!(bundles.fetches("props"), 1);
    assert_eq!(bundles.fetches("world"), 1);
    assert_eq!(bundles.fetch_log().last().map(String::as_str), Some("world"));

    assets.unload(map);
}

#[test]
fn test_bundle_records_are_shared() {
    let source = TestSource::new();
    let bundles = level_bundles();
    let catalog = CountingCatalog::new(levels());
    let mut assets = packed(&source, &bundles, catalog.clone(), config(5, false));
    let calls = calls();

    let intro = assets
        .load_async::<String, _>("levels/intro.txt", record(&calls, "intro"))
        .unwrap();
    let outro = assets
        .load_async::<String, _>("levels/outro.txt", record(&calls, "outro"))
        .unwrap();
    let font = assets.load_async::<String, _>("common/font.txt", record(&calls, "font"));
    let font = font.unwrap();

    pump_until(&mut assets, |_| calls.lock().len() == 3);

    assert_eq!(catalog.lookups("levels"), 1);
    assert_eq!(catalog.lookups("common"), 1);
    assert_eq!(bundles.fetches("levels"), 1);
    assert_eq!(bundles.fetches("common"), 1);
    assert_eq!(assets.bundle_count(), 2);
    assert_eq!(assets.bundle_consumer_count("levels"), 2);
    assert_eq!(assets.bundle_consumer_count("common"), 3);

    assert_eq!(assets[outro.id()], "outro");
    assert_eq!(assets[font.id()], "font");

    for handle in [intro, outro, font] {
        assets.unload(handle);
    }
    assert_eq!(assets.bundle_count(), 0);
}

#[test]
fn test_bundles_released_only_when_unreferenced() {
    let source = TestSource::new();
    let bundles = level_bundles();
    let mut assets = packed(&source, &bundles, levels(), config(5, false));

    let intro = assets.load::<String>("levels/intro.txt").unwrap();
    let outro = assets.load::<String>("levels/outro.txt").unwrap();
    assert_eq!(bundles.fetch_log(), ["common", "levels"]);

    assets.unload(intro);
    assert!(bundles.released().is_empty());
    assert_eq!(assets.bundle_consumer_count("levels"), 1);
    assert_eq!(assets.bundle_consumer_count("common"), 1);

    assets.unload(outro);
    assert_eq!(bundles.released(), ["levels", "common"]);
    assert_eq!(assets.bundle_status("levels"), None);
}

#[test]
fn test_dependency_kept_while_used_directly() {
    let source = TestSource::new();
    let bundles = level_bundles();
    let mut assets = packed(&source, &bundles, levels(), config(5, false));

    let intro = assets.load::<String>("levels/intro.txt").unwrap();
    let font = assets.load::<String>("common/font.txt").unwrap();

    assets.unload(intro);
    assert_eq!(bundles.released(), ["levels"]);
    assert_eq!(assets.bundle_status("common"), Some(Status::Loaded));
    assert_eq!(assets[font.id()], "font");

    assets.unload(font);
    assert_eq!(bundles.released(), ["levels", "common"]);
}

#[test]
fn test_dependency_failure_reaches_waiters() {
    let source = TestSource::new();
    let bundles = TestBundles::new();
    bundles.bundle("levels", &[("intro.txt", "intro")]);
    bundles.failing("common");
    let mut assets = packed(&source, &bundles, levels(), config(5, false));
    let errors = std::sync::Arc::new(hoard_util::parking_lot::Mutex::new(Vec::new()));

    let errors_copy = errors.clone();
    let intro = assets
        .load_async::<String, _>("levels/intro.txt", move |_, result| {
            errors_copy.lock().push(result.unwrap_err());
        })
        .unwrap();

    pump_until(&mut assets, |_| !errors.lock().is_empty());

    match &errors.lock()[0] {
        LoadError::BundleFailed { bundle, .. } => assert_eq!(&**bundle, "common"),
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(bundles.fetch_log(), ["common"]);
    assert_eq!(assets.status(intro.id()), Status::Failed);
    assert_eq!(assets.bundle_status("levels"), Some(Status::Failed));

    let error = assets.load::<String>("levels/intro.txt").unwrap_err();
    assert!(matches!(error, LoadError::BundleFailed { .. }));

    assets.unload(intro);
    assert!(assets.is_empty());
    assert_eq!(assets.bundle_count(), 0);
}

#[test]
fn test_sync_load_during_bundle_fetch_is_misuse() {
    let source = TestSource::new();
    let bundles = level_bundles();
    bundles.gates.close("common");
    let mut assets = packed(&source, &bundles, levels(), config(5, false));
    let calls = calls();

    let intro = assets
        .load_async::<String, _>("levels/intro.txt", record(&calls, "intro"))
        .unwrap();

    let error = assets.load::<String>("levels/outro.txt").unwrap_err();
    assert!(matches!(error, LoadError::Misuse { .. }));
    assert_eq!(assets.len(), 1);
    assert_eq!(assets.bundle_consumer_count("levels"), 1);

    bundles.gates.open("common");
    pump_until(&mut assets, |_| !calls.lock().is_empty());
    assert_eq!(*calls.lock(), ["intro"]);

    let outro = assets.load::<String>("levels/outro.txt").unwrap();
    assert_eq!(assets[outro.id()], "outro");
    assert_eq!(bundles.fetches("levels"), 1);

    assets.unload(intro);
    assets.unload(outro);
}

#[test]
fn test_missing_entry_fails_only_that_asset() {
    let source = TestSource::new();
    let bundles = level_bundles();
    let mut assets = packed(&source, &bundles, levels(), config(5, false));

    let error = assets.load::<String>("levels/credits.txt").unwrap_err();
    assert!(matches!(error, LoadError::Fetch { .. }));

    let intro = assets.load::<String>("levels/intro.txt").unwrap();
    assert_eq!(assets[intro.id()], "intro");
    assets.unload(intro);
}

#[test]
fn test_streamed_scene() {
    let source = TestSource::new();
    let bundles = TestBundles::new();
    bundles.scene("intro_scene");
    bundles.gates.close("intro_scene");
    let catalog = manifest(&[("intro_scene", &[])]);
    let mut assets = packed(&source, &bundles, catalog, config(5, false));
    let calls = calls();

    let scene = assets
        .load_scene_async("Scenes/Intro_Scene", record(&calls, "scene"))
        .unwrap();

    assert!(matches!(
        assets.ready("scenes/intro_scene"),
        Err(LoadError::NotReady { .. })
    ));

    bundles.gates.open("intro_scene");
    pump_until(&mut assets, |_| !calls.lock().is_empty());

    assert_eq!(*calls.lock(), ["scene"]);
    assert_eq!(assets.ready("Scenes/Intro_Scene").unwrap(), scene.untyped_id());
    assert!(matches!(assets.ready("scenes/outro"), Err(LoadError::NotReady { .. })));

    assets.unload(scene);
    assert_eq!(bundles.released(), ["intro_scene"]);
}

#[test]
fn test_scene_without_bundle() {
    let source = TestSource::new();
    source.file("scenes/menu", "not a scene");
    let bundles = TestBundles::new();

    let mut production = packed(&source, &bundles, Manifest::new(), config(5, false));
    let error = production.load_scene("scenes/menu").unwrap_err();
    assert!(matches!(error, LoadError::MissingMetadata { .. }));

    let mut development = packed(&source, &bundles, Manifest::new(), config(5, true));
    let scene = development.load_scene("scenes/menu").unwrap();
    assert_eq!(development.status(scene.id()), Status::Loaded);
    assert!(development.ready("scenes/menu").is_ok());
    assert_eq!(source.fetches("scenes/menu"), 0);
    development.unload(scene);
}
