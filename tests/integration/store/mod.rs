//! The on-disk store as both destination and source.

use crate::integration::common::*;
use faktory::publish::publish;
use faktory::{
    merge, splitter, BlobStore, Converter, LayoutStore, Source, StoreSource, TarSource,
};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_base_resolved_from_store() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LayoutStore::open(dir.path().join("store")).unwrap());

    // Import the base into the store under a tag.
    let base_archive = runtime_base(dir.path());
    let base = TarSource::new()
        .resolve(base_archive.to_str().unwrap())
        .unwrap();
    publish(store.as_ref(), &base.layers, &base.oci_config, "runtime-base:latest").unwrap();

    let store_source = StoreSource::new(store.clone());
    let converter = Converter::new(
        "runtime-base:latest",
        &store_source,
        splitter::from_token("python").unwrap(),
        Box::new(TarSource::new()),
        store.clone(),
    )
    .unwrap();
    assert_eq!(converter.base().layers.len(), base.layers.len());

    let app = python_app(dir.path());
    let conversion = converter
        .convert(app.to_str().unwrap(), "registry.local:5000/team/app:kontain")
        .unwrap();

    // Base blobs were already present and are shared, not copied.
    let manifest = store.get_manifest(&conversion.manifest).unwrap();
    assert_eq!(manifest.layers().len(), base.layers.len() + 1);
    assert!(store
        .root()
        .join("refs/registry.local:5000/team/app/@kontain")
        .is_file());

    // A converted image can itself be converted again, onto the same base,
    // without changing what a container sees.
    let reconverted = Converter::new(
        "runtime-base:latest",
        &store_source,
        splitter::from_token("python").unwrap(),
        Box::new(StoreSource::new(store.clone())),
        store.clone(),
    )
    .unwrap()
    .convert("registry.local:5000/team/app:kontain", "app:again")
    .unwrap();
    assert!(reconverted.conflicts.is_empty());

    let resolve = |tag: &str| StoreSource::new(store.clone()).resolve(tag).unwrap();
    let first: Vec<_> = merge(&resolve("registry.local:5000/team/app:kontain"))
        .paths()
        .map(|p| p.to_path_buf())
        .collect();
    let again: Vec<_> = merge(&resolve("app:again"))
        .paths()
        .map(|p| p.to_path_buf())
        .collect();
    assert_eq!(first, again);
}

#[test]
fn test_store_layout_on_disk() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("store");
    let store = LayoutStore::open(&root).unwrap();

    let digest = store.put_blob(b"{}").unwrap();
    store.swap_tag("app:1", &digest).unwrap();

    assert_eq!(
        std::fs::read_to_string(root.join("oci-layout")).unwrap(),
        r#"{"imageLayoutVersion":"1.0.0"}"#
    );
    assert!(root.join("blobs/sha256").join(digest.hex()).is_file());
    assert_eq!(
        std::fs::read_to_string(root.join("refs/app/@1")).unwrap(),
        digest.to_string()
    );

    // No temporary files are left behind.
    let leftovers: Vec<_> = std::fs::read_dir(root.join("refs/app"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|name| name.to_string_lossy().starts_with(".tmp-"))
        .collect();
    assert!(leftovers.is_empty());
}
