//! Two-phase publication of an image into a [`BlobStore`].
//!
//! Phase 1 writes every layer blob and the config blob. Phase 2 writes the
//! manifest blob and then swaps the tag. The tag is the only mutable state, so
//! a failure anywhere before the swap leaves it exactly as it was; blobs
//! written by a failed attempt are unreferenced and harmless.

use crate::digest::{canonical_json, Digest};
use crate::error::{Error, PublishPhase, Result};
use crate::image::Layer;
use crate::store::{BlobStore, StoreError};
use oci_spec::image::{Descriptor, ImageConfiguration, ImageManifest, ImageManifestBuilder, MediaType};
use std::str::FromStr;

fn failed(phase: PublishPhase, tag: &str) -> impl FnOnce(StoreError) -> Error + '_ {
    move |source| Error::Storage {
        phase,
        tag: tag.to_string(),
        source,
    }
}

fn descriptor(media_type: MediaType, digest: &Digest, size: u64) -> Result<Descriptor> {
    let digest = oci_spec::image::Digest::from_str(digest.as_str())?;
    Ok(Descriptor::new(media_type, size, digest))
}

/// The manifest for `layers` and a config blob of `config_size` bytes.
pub fn build_manifest(
    layers: &[Layer],
    config_digest: &Digest,
    config_size: u64,
) -> Result<ImageManifest> {
    let layers = layers
        .iter()
        .map(|layer| descriptor(layer.media_type.clone(), &layer.digest, layer.size()))
        .collect::<Result<Vec<_>>>()?;

    let mut manifest = ImageManifestBuilder::default()
        .schema_version(2u32)
        .config(descriptor(MediaType::ImageConfig, config_digest, config_size)?)
        .layers(layers)
        .build()?;
    manifest.set_media_type(Some(MediaType::ImageManifest));
    Ok(manifest)
}

/// Publishes `layers` and `config` under `tag` and returns the manifest digest.
pub fn publish(
    store: &dyn BlobStore,
    layers: &[Layer],
    config: &ImageConfiguration,
    tag: &str,
) -> Result<Digest> {
    // Phase 1: content.
    for layer in layers {
        if store
            .has_blob(&layer.digest)
            .map_err(failed(PublishPhase::Blobs, tag))?
        {
            log::debug!("Layer {} already present", layer.digest.short());
            continue;
        }

        let stored = store
            .put_blob(&layer.blob)
            .map_err(failed(PublishPhase::Blobs, tag))?;
        if stored != layer.digest {
            return Err(failed(PublishPhase::Blobs, tag)(StoreError::DigestMismatch {
                expected: layer.digest.clone(),
                actual: stored,
            }));
        }
    }

    let config_bytes =
        canonical_json(config).map_err(|e| failed(PublishPhase::Blobs, tag)(e.into()))?;
    let config_digest = store
        .put_blob(&config_bytes)
        .map_err(failed(PublishPhase::Blobs, tag))?;
    log::debug!("Stored config {}", config_digest.short());

    // Phase 2: manifest, then the tag.
    let manifest = build_manifest(layers, &config_digest, config_bytes.len() as u64)?;
    let manifest_digest = store
        .put_manifest(&manifest)
        .map_err(failed(PublishPhase::Manifest, tag))?;
    store
        .swap_tag(tag, &manifest_digest)
        .map_err(failed(PublishPhase::Tag, tag))?;

    log::info!("Published {} as {}", tag, manifest_digest);
    Ok(manifest_digest)
}
