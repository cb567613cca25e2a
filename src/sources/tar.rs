use super::{assemble, Source};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::layer;
use flate2::read::GzDecoder;
use oci_spec::image::ImageConfiguration;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar_rs as tar;

/// One entry of a `docker save` archive's `manifest.json`.
#[derive(Debug, Deserialize)]
struct ArchiveManifest {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Option<Vec<String>>,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

/// Tar implementation of the Source trait for `docker save` archives
#[derive(Debug, Default, Clone)]
pub struct TarSource;

impl TarSource {
    pub fn new() -> Self {
        Self
    }

    /// Reads the archive at `path`, reporting problems against `reference`.
    pub(crate) fn load(&self, path: &Path, reference: &str) -> Result<Image> {
        let fail = |e: std::io::Error| Error::resolution(reference, e);

        let mut reader = BufReader::new(File::open(path).map_err(fail)?);
        let mut magic_bytes = [0u8; 2];
        let compressed = match reader.read_exact(&mut magic_bytes) {
            Ok(()) => magic_bytes == [0x1f, 0x8b],
            Err(e) => return Err(fail(e)),
        };

        // Reopen the file since we consumed some bytes
        let file = File::open(path).map_err(fail)?;
        let stream: Box<dyn Read> = if compressed {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        read_archive(stream, reference)
    }
}

impl Source for TarSource {
    fn name(&self) -> &str {
        "tar"
    }

    fn resolve(&self, image_path: &str) -> Result<Image> {
        let path = Path::new(image_path);
        if !path.is_file() {
            return Err(Error::resolution(image_path, "not an image archive file"));
        }

        log::info!("Reading image archive {}", path.display());
        self.load(path, image_path)
    }
}

/// Reads every file of the archive into memory, keyed by relative path.
fn read_files(stream: impl Read) -> std::io::Result<HashMap<String, Vec<u8>>> {
    let mut archive = tar::Archive::new(stream);
    let mut files = HashMap::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path()?.to_string_lossy().into_owned();
        let path = path.trim_start_matches("./").to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        files.insert(path, data);
    }

    Ok(files)
}

fn read_archive(stream: impl Read, reference: &str) -> Result<Image> {
    let mut files = read_files(stream).map_err(|e| Error::resolution(reference, e))?;

    let manifest_bytes = files.get("manifest.json").ok_or_else(|| {
        Error::resolution(
            reference,
            "manifest.json not found; this does not appear to be a docker save archive",
        )
    })?;
    let manifests: Vec<ArchiveManifest> =
        serde_json::from_slice(manifest_bytes).map_err(|e| Error::resolution(reference, e))?;

    let manifest = match manifests.as_slice() {
        [] => return Err(Error::resolution(reference, "empty manifest.json")),
        [only] => only,
        [first, ..] => {
            log::warn!(
                "{} holds {} images, using the first ({})",
                reference,
                manifests.len(),
                first.repo_tags.iter().flatten().next().map(String::as_str).unwrap_or("untagged")
            );
            first
        }
    };

    let config_bytes = files
        .get(&manifest.config)
        .ok_or_else(|| Error::resolution(reference, format!("missing config {}", manifest.config)))?;
    let oci_config: ImageConfiguration =
        serde_json::from_slice(config_bytes).map_err(|e| Error::resolution(reference, e))?;

    let mut layers = Vec::with_capacity(manifest.layers.len());
    for layer_path in &manifest.layers {
        let blob = files
            .remove(layer_path)
            .ok_or_else(|| Error::resolution(reference, format!("missing layer {}", layer_path)))?;

        let layer = layer::decode(blob)?;
        if let Some(expected) = Digest::from_blob_path(layer_path) {
            if expected != layer.digest {
                return Err(Error::resolution(
                    reference,
                    format!("layer {} has digest {}", layer_path, layer.digest),
                ));
            }
        }
        log::debug!("Layer {} from {}", layer.digest.short(), layer_path);
        layers.push(layer);
    }

    assemble(reference, oci_config, layers)
}
