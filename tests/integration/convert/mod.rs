//! Whole conversions: tar archives in, published images out.

use crate::integration::common::*;
use faktory::splitter::{self, Registry};
use faktory::{
    layer, merge, BlobStore, Converter, Error, LayoutStore, RuleSplitter, Source, StoreSource,
    TarSource,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn open_store(dir: &Path) -> Arc<LayoutStore> {
    Arc::new(LayoutStore::open(dir.join("store")).unwrap())
}

fn converter(base: &Path, token: &str, store: Arc<LayoutStore>) -> Converter {
    Converter::new(
        base.to_str().unwrap(),
        &TarSource::new(),
        splitter::from_token(token).unwrap(),
        Box::new(TarSource::new()),
        store,
    )
    .unwrap()
}

fn delta_paths(store: &LayoutStore, conversion: &faktory::Conversion) -> Vec<String> {
    let delta = layer::decode(store.get_blob(&conversion.delta).unwrap()).unwrap();
    delta
        .entries
        .iter()
        .map(|e| e.path.to_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_python_application_onto_runtime_base() {
    let dir = TempDir::new().unwrap();
    let base = runtime_base(dir.path());
    let app = python_app(dir.path());
    let store = open_store(dir.path());

    let converter = converter(&base, "python", store.clone());
    let conversion = converter.convert(app.to_str().unwrap(), "app:kontain").unwrap();

    // Base layers, untouched, then exactly one delta layer.
    let base_image = TarSource::new().resolve(base.to_str().unwrap()).unwrap();
    let manifest = store.get_manifest(&conversion.manifest).unwrap();
    let published: Vec<String> = manifest
        .layers()
        .iter()
        .map(|d| d.digest().to_string())
        .collect();
    let mut expected: Vec<String> = base_image
        .layers
        .iter()
        .map(|l| l.digest.to_string())
        .collect();
    expected.push(conversion.delta.to_string());
    assert_eq!(published, expected);

    assert_eq!(
        delta_paths(&store, &conversion),
        vec![
            "/app/main.py",
            "/app/requirements-installed/flask.py",
            "/app/requirements-installed/six.py",
        ]
    );
    assert!(conversion.conflicts.is_empty());

    // Launch parameters from the application, platform from the base.
    let image = StoreSource::new(store.clone()).resolve("app:kontain").unwrap();
    assert_eq!(
        image.config.entrypoint,
        Some(vec!["python3".to_string(), "/app/main.py".to_string()])
    );
    assert_eq!(image.config.working_dir.as_deref(), Some("/app"));
    assert_eq!(image.config.env["PYTHONUNBUFFERED"], "1");
    assert_eq!(image.config.platform.architecture, "arm64");
    assert_eq!(image.config.created.as_deref(), Some("2023-01-01T00:00:00Z"));

    // The runtime's stdlib replaces the one the application was built with.
    let view = merge(&image);
    let os = view.get(Path::new("/usr/lib/python3.9/os.py")).unwrap();
    assert_eq!(&os.content.as_ref().unwrap().data[..], b"# kontain os");
    assert!(view.contains(Path::new("/opt/kontain/bin/km")));
    assert!(view.contains(Path::new("/app/main.py")));
    assert!(!view.contains(Path::new("/app/scratch.txt")));
    assert!(!view.contains(Path::new("/usr/bin/python3")));
}

#[test]
fn test_delta_keeps_entry_metadata() {
    let dir = TempDir::new().unwrap();
    let store = open_store(dir.path());
    let conversion = converter(&runtime_base(dir.path()), "python", store.clone())
        .convert(python_app(dir.path()).to_str().unwrap(), "app:kontain")
        .unwrap();

    let delta = layer::decode(store.get_blob(&conversion.delta).unwrap()).unwrap();
    for entry in delta.entries.iter() {
        assert_eq!(entry.mtime, 1_672_531_200, "{}", entry.path.display());
        assert_eq!(entry.mode, 0o644);
    }
}

#[test]
fn test_conflicting_application_file_wins() {
    let dir = TempDir::new().unwrap();
    let base = write_image(
        dir.path(),
        "base-with-app:1",
        &ImageSpec::default(),
        &[layer(&[
            Entry::File("/opt/app/lib.so", "runtime build"),
            Entry::File("/opt/app/README", "same"),
        ])],
    );
    let app = write_image(
        dir.path(),
        "native-app:1",
        &ImageSpec::default(),
        &[layer(&[
            Entry::File("/opt/app/lib.so", "application build"),
            Entry::File("/opt/app/README", "same"),
        ])],
    );
    let store = open_store(dir.path());

    let conversion = converter(&base, "python", store.clone())
        .convert(app.to_str().unwrap(), "native-app:kontain")
        .unwrap();

    assert_eq!(conversion.conflicts, vec![PathBuf::from("/opt/app/lib.so")]);
    assert_eq!(conversion.application_paths, 2);

    let image = StoreSource::new(store).resolve("native-app:kontain").unwrap();
    let view = merge(&image);
    let lib = view.get(Path::new("/opt/app/lib.so")).unwrap();
    assert_eq!(&lib.content.as_ref().unwrap().data[..], b"application build");
}

#[test]
fn test_runtime_only_image_is_rejected() {
    let dir = TempDir::new().unwrap();
    let base = runtime_base(dir.path());
    let runtime_only = write_image(
        dir.path(),
        "python:3.9",
        &ImageSpec::default(),
        &[layer(&[
            // The empty directories every debian root filesystem ships.
            Entry::Dir("/bin"),
            Entry::Dir("/etc"),
            Entry::Dir("/home"),
            Entry::Dir("/opt"),
            Entry::Dir("/srv"),
            Entry::Dir("/usr"),
            Entry::Dir("/usr/bin"),
            Entry::File("/usr/bin/python3.9", "elf"),
            Entry::File("/etc/os-release", "debian"),
        ])],
    );
    let store = open_store(dir.path());
    let converter = converter(&base, "python", store.clone());

    let err = converter
        .convert(runtime_only.to_str().unwrap(), "python:kontain")
        .unwrap_err();
    assert!(matches!(err, Error::EmptyClassification { .. }));
    assert_eq!(store.get_tag("python:kontain").unwrap(), None);

    // An existing tag survives a failed conversion.
    let first = converter
        .convert(python_app(dir.path()).to_str().unwrap(), "python:kontain")
        .unwrap();
    assert!(converter
        .convert(runtime_only.to_str().unwrap(), "python:kontain")
        .is_err());
    assert_eq!(store.get_tag("python:kontain").unwrap(), Some(first.manifest));
}

#[test]
fn test_reconversion_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let base = runtime_base(dir.path());
    let app = python_app(dir.path());

    let first_store = Arc::new(LayoutStore::open(dir.path().join("first")).unwrap());
    let second_store = Arc::new(LayoutStore::open(dir.path().join("second")).unwrap());

    let first = converter(&base, "python", first_store.clone())
        .convert(app.to_str().unwrap(), "app:kontain")
        .unwrap();
    let second = converter(&base, "python", second_store.clone())
        .convert(app.to_str().unwrap(), "app:kontain")
        .unwrap();

    assert_eq!(first.manifest, second.manifest);
    assert_eq!(
        first_store.get_blob(&first.manifest).unwrap(),
        second_store.get_blob(&second.manifest).unwrap()
    );
}

#[test]
fn test_concurrent_conversions_to_one_tag() {
    let dir = TempDir::new().unwrap();
    let base = runtime_base(dir.path());
    let first_app = python_app(dir.path());
    let second_app = write_image(
        dir.path(),
        "app:2",
        &ImageSpec::default(),
        &[layer(&[Entry::File("/app/main.py", "print('v2')\n")])],
    );
    let store = open_store(dir.path());
    let converter = converter(&base, "python", store.clone());

    let (first, second) = std::thread::scope(|s| {
        let first = s.spawn(|| converter.convert(first_app.to_str().unwrap(), "app:race"));
        let second = s.spawn(|| converter.convert(second_app.to_str().unwrap(), "app:race"));
        (first.join().unwrap().unwrap(), second.join().unwrap().unwrap())
    });

    assert_ne!(first.manifest, second.manifest);
    let tag = store.get_tag("app:race").unwrap().unwrap();
    assert!(tag == first.manifest || tag == second.manifest);
    assert!(store.has_blob(&first.manifest).unwrap());
    assert!(store.has_blob(&second.manifest).unwrap());
}

#[test]
fn test_distinct_tags_do_not_interact() {
    let dir = TempDir::new().unwrap();
    let base = runtime_base(dir.path());
    let app = python_app(dir.path());
    let store = open_store(dir.path());
    let converter = &converter(&base, "python", store.clone());
    let app = app.to_str().unwrap();

    let tags = ["app:a", "app:b", "app:c", "other/app:a"];
    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = tags
            .iter()
            .map(|tag| s.spawn(move || converter.convert(app, tag)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });

    for (tag, conversion) in tags.iter().zip(&results) {
        assert_eq!(store.get_tag(tag).unwrap(), Some(conversion.manifest.clone()));
    }
}

#[test]
fn test_custom_rules_select_variant() {
    let dir = TempDir::new().unwrap();
    let rules_path = dir.path().join("node.json");
    std::fs::write(
        &rules_path,
        r#"{
            "token": "node",
            "base_paths": ["/usr", "/lib", "/etc"],
            "application_paths": ["/usr/src/app"]
        }"#,
    )
    .unwrap();

    let mut registry = Registry::builtin().unwrap();
    registry.register(RuleSplitter::from_file(&rules_path).unwrap());

    let base = runtime_base(dir.path());
    let app = write_image(
        dir.path(),
        "node-app:1",
        &ImageSpec {
            entrypoint: &["node", "index.js"],
            ..ImageSpec::default()
        },
        &[
            layer(&[Entry::File("/usr/local/lib/node_modules/npm/index.js", "npm")]),
            layer(&[Entry::File("/usr/src/app/index.js", "server()")]),
        ],
    );
    let store = open_store(dir.path());

    let converter = Converter::new(
        base.to_str().unwrap(),
        &TarSource::new(),
        registry.get("node").unwrap(),
        Box::new(TarSource::new()),
        store.clone(),
    )
    .unwrap();
    let conversion = converter.convert(app.to_str().unwrap(), "node-app:kontain").unwrap();

    assert_eq!(conversion.splitter, "node");
    assert_eq!(delta_paths(&store, &conversion), vec!["/usr/src/app/index.js"]);
}

#[test]
fn test_unknown_type_is_rejected() {
    assert!(matches!(
        splitter::from_token("ruby"),
        Err(Error::UnknownSplitter(token)) if token == "ruby"
    ));
}
