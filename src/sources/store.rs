use super::{assemble, Source};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::image::{Image, ImageRef, Reference};
use crate::layer;
use crate::store::{BlobStore, StoreError};
use oci_spec::image::ImageConfiguration;
use std::sync::Arc;

/// Reads images back out of a [`BlobStore`], by tag or by manifest digest.
#[derive(Clone)]
pub struct StoreSource {
    store: Arc<dyn BlobStore>,
}

impl StoreSource {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    fn manifest_digest(&self, image: &str) -> Result<Digest> {
        let parsed: ImageRef = image.parse()?;
        match parsed.reference() {
            Reference::Digest(digest) => Ok(digest.clone()),
            Reference::Tag(_) => self
                .store
                .get_tag(&parsed.to_string())
                .map_err(|e| Error::resolution(image, e))?
                .ok_or_else(|| Error::resolution(image, "tag not found in store")),
        }
    }
}

impl Source for StoreSource {
    fn name(&self) -> &str {
        "store"
    }

    fn resolve(&self, image: &str) -> Result<Image> {
        let fail = |e: StoreError| Error::resolution(image, e);

        let digest = self.manifest_digest(image)?;
        let manifest = self.store.get_manifest(&digest).map_err(fail)?;

        let config_digest: Digest = manifest
            .config()
            .digest()
            .to_string()
            .parse()
            .map_err(|e| Error::resolution(image, e))?;
        let config_bytes = self.store.get_blob(&config_digest).map_err(fail)?;
        let oci_config: ImageConfiguration =
            serde_json::from_slice(&config_bytes).map_err(|e| Error::resolution(image, e))?;

        let mut layers = Vec::with_capacity(manifest.layers().len());
        for descriptor in manifest.layers() {
            let layer_digest: Digest = descriptor
                .digest()
                .to_string()
                .parse()
                .map_err(|e| Error::resolution(image, e))?;
            let blob = self.store.get_blob(&layer_digest).map_err(fail)?;
            layers.push(layer::decode(blob)?);
        }

        log::debug!("{} is manifest {}", image, digest);
        assemble(image, oci_config, layers)
    }
}
