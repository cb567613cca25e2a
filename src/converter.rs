//! Moving an application from the image it was built on onto another base.
//!
//! A [`Converter`] is bound to one base image, resolved and merged once at
//! construction. Each [`Converter::convert`] call then runs the pipeline for
//! one source image:
//!
//! 1. resolve the source image,
//! 2. merge its layers into a single view,
//! 3. classify the view with the configured [`Splitter`],
//! 4. build one delta layer from the application paths,
//! 5. compose the config (launch parameters from the source, platform from
//!    the base),
//! 6. publish base layers plus the delta under the result tag.
//!
//! The converter holds no mutable state, so one instance can serve concurrent
//! conversions from several threads.

use crate::config::Config;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::image::{FilesystemEntry, Image, ImageRef, Layer};
use crate::layer;
use crate::merge::{merge, MergedView};
use crate::publish::publish;
use crate::sources::Source;
use crate::splitter::Splitter;
use crate::store::BlobStore;
use log::{debug, info, warn};
use oci_spec::image::{History, ImageConfiguration};
use std::iter;
use std::path::PathBuf;
use std::sync::Arc;

/// One layer of a published image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedLayer {
    pub digest: Digest,
    pub size: u64,
    /// `false` for the delta layer.
    pub from_base: bool,
}

/// What a successful conversion produced.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub source: String,
    pub base: String,
    pub splitter: String,
    /// The tag that now points at `manifest`.
    pub tag: String,
    pub manifest: Digest,
    pub delta: Digest,
    pub layers: Vec<PublishedLayer>,
    pub application_paths: usize,
    pub conflicts: Vec<PathBuf>,
    pub config: Config,
}

pub struct Converter {
    base: Image,
    base_view: MergedView,
    splitter: Box<dyn Splitter>,
    source: Box<dyn Source>,
    store: Arc<dyn BlobStore>,
}

impl Converter {
    /// Resolves `base_ref` through `base_source` right away and caches its
    /// merged view for every later conversion.
    pub fn new(
        base_ref: &str,
        base_source: &dyn Source,
        splitter: Box<dyn Splitter>,
        source: Box<dyn Source>,
        store: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        info!("Resolving base image {} from {}", base_ref, base_source.name());
        let base = base_source.resolve(base_ref)?;
        let base_view = merge(&base);
        debug!(
            "Base {} has {} layers and {} paths",
            base_ref,
            base.layers.len(),
            base_view.len()
        );

        Ok(Self {
            base,
            base_view,
            splitter,
            source,
            store,
        })
    }

    pub fn base(&self) -> &Image {
        &self.base
    }

    pub fn base_view(&self) -> &MergedView {
        &self.base_view
    }

    pub fn splitter(&self) -> &dyn Splitter {
        self.splitter.as_ref()
    }

    /// Converts `source_ref` and publishes the result as `result_name`.
    ///
    /// On error the tag named by `result_name` is left as it was.
    pub fn convert(&self, source_ref: &str, result_name: &str) -> Result<Conversion> {
        let result: ImageRef = result_name.parse()?;
        if result.tag().is_none() {
            return Err(Error::InvalidReference(result_name.to_string()));
        }
        let tag = result.to_string();

        info!("Resolving {} from {}", source_ref, self.source.name());
        let image = self.source.resolve(source_ref)?;

        info!("Merging {} layers", image.layers.len());
        let view = merge(&image);

        info!(
            "Classifying {} paths with the {} splitter",
            view.len(),
            self.splitter.token()
        );
        let split = self.splitter.classify(&view, &self.base_view)?;
        for path in &split.conflicts {
            warn!(
                "{} also exists in {} with different content; keeping the application copy",
                path.display(),
                self.base.reference
            );
        }

        info!(
            "Building delta layer from {} application paths",
            split.application_paths.len()
        );
        let entries: Vec<FilesystemEntry> = split
            .application_paths
            .iter()
            .filter_map(|path| view.get(path))
            .cloned()
            .collect();
        let delta = layer::encode(&entries)?;
        debug!(
            "Delta layer {} ({} bytes, diff_id {})",
            delta.digest.short(),
            delta.size(),
            delta.diff_id.short()
        );

        let config = Config::for_application(&image.config, &self.base.config);
        let oci_config = self.compose_config(source_ref, &config, &delta);

        let layers: Vec<Layer> = self
            .base
            .layers
            .iter()
            .cloned()
            .chain(iter::once(delta.clone()))
            .collect();

        info!("Publishing {}", tag);
        let manifest = publish(self.store.as_ref(), &layers, &oci_config, &tag)?;

        Ok(Conversion {
            source: source_ref.to_string(),
            base: self.base.reference.clone(),
            splitter: self.splitter.token().to_string(),
            tag,
            manifest,
            delta: delta.digest.clone(),
            layers: layers
                .iter()
                .enumerate()
                .map(|(i, layer)| PublishedLayer {
                    digest: layer.digest.clone(),
                    size: layer.size(),
                    from_base: i < self.base.layers.len(),
                })
                .collect(),
            application_paths: split.application_paths.len(),
            conflicts: split.conflicts.into_iter().collect(),
            config,
        })
    }

    /// The base's configuration with the application's launch parameters,
    /// the delta appended to its rootfs and one history entry for it.
    fn compose_config(&self, source_ref: &str, config: &Config, delta: &Layer) -> ImageConfiguration {
        let mut oci_config = self.base.oci_config.clone();
        config.apply_to(&mut oci_config);

        let mut rootfs = oci_config.rootfs().clone();
        rootfs.set_diff_ids(
            self.base
                .layers
                .iter()
                .map(|layer| layer.diff_id.to_string())
                .chain(iter::once(delta.diff_id.to_string()))
                .collect(),
        );
        oci_config.set_rootfs(rootfs);

        let mut entry = History::default();
        entry.set_created(config.created.clone());
        entry.set_created_by(Some(format!(
            "faktory convert --type {} {}",
            self.splitter.token(),
            source_ref
        )));
        entry.set_comment(Some(format!("application content on {}", self.base.reference)));

        let mut history = oci_config.history().clone().unwrap_or_default();
        history.push(entry);
        oci_config.set_history(Some(history));

        oci_config
    }
}
