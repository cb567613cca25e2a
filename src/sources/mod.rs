//! Where images come from.
//!
//! A [`Source`] turns a user supplied name into a fully loaded [`Image`]. The
//! converter never cares which one it is talking to.

mod docker;
mod store;
mod tar;

pub use docker::DockerSource;
pub use store::StoreSource;
pub use tar::TarSource;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::image::{Image, Layer};
use oci_spec::image::ImageConfiguration;

pub trait Source: Send + Sync {
    /// Returns the name of the source for identification purposes
    fn name(&self) -> &str;

    /// Loads `image`, whose meaning depends on the source: an image name for
    /// docker and the store, a file path for tar.
    fn resolve(&self, image: &str) -> Result<Image>;
}

/// Assembles an [`Image`] and checks the layers against the config's rootfs.
fn assemble(reference: &str, oci_config: ImageConfiguration, layers: Vec<Layer>) -> Result<Image> {
    let diff_ids = oci_config.rootfs().diff_ids();
    if !diff_ids.is_empty() {
        let matches = diff_ids.len() == layers.len()
            && diff_ids
                .iter()
                .zip(&layers)
                .all(|(expected, layer)| expected == layer.diff_id.as_str());
        if !matches {
            return Err(Error::resolution(
                reference,
                "layer contents do not match the diff_ids in the image config",
            ));
        }
    }

    log::info!("Resolved {} ({} layers)", reference, layers.len());
    Ok(Image {
        reference: reference.to_string(),
        config: Config::from_oci(&oci_config),
        layers,
        oci_config,
    })
}
