//! Launch configuration of an image and how it is recomposed.
//!
//! [`Config`] is the subset of an OCI image configuration the engine reasons
//! about. It is read from an `oci_spec` [`ImageConfiguration`] and written back
//! into one when the converted image is published.

use oci_spec::image::ImageConfiguration;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub exposed_ports: BTreeSet<String>,
    pub volumes: BTreeSet<String>,
    pub platform: Platform,
    /// Build timestamp of the image, RFC 3339.
    pub created: Option<String>,
}

impl Config {
    pub fn from_oci(config: &ImageConfiguration) -> Self {
        let container = config.config().as_ref();

        let env = container
            .and_then(|c| c.env().as_ref())
            .map(|vars| vars.iter().map(|var| split_env(var)).collect())
            .unwrap_or_default();

        Config {
            entrypoint: container.and_then(|c| c.entrypoint().clone()),
            cmd: container.and_then(|c| c.cmd().clone()),
            env,
            working_dir: container
                .and_then(|c| c.working_dir().clone())
                .filter(|dir| !dir.is_empty()),
            user: container
                .and_then(|c| c.user().clone())
                .filter(|user| !user.is_empty()),
            labels: container
                .and_then(|c| c.labels().as_ref())
                .map(|labels| labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
            exposed_ports: container
                .and_then(|c| c.exposed_ports().as_ref())
                .map(|ports| ports.iter().cloned().collect())
                .unwrap_or_default(),
            volumes: container
                .and_then(|c| c.volumes().as_ref())
                .map(|volumes| volumes.iter().cloned().collect())
                .unwrap_or_default(),
            platform: Platform {
                os: config.os().to_string(),
                architecture: config.architecture().to_string(),
                variant: config.variant().clone(),
            },
            created: config.created().clone(),
        }
    }

    /// The configuration of a converted image.
    ///
    /// Everything that describes how the application is launched comes from
    /// `source`; the platform comes from `base`, whose runtime will execute it.
    pub fn for_application(source: &Config, base: &Config) -> Config {
        Config {
            platform: base.platform.clone(),
            ..source.clone()
        }
    }

    /// Environment in `NAME=value` form, sorted by name.
    pub fn env_list(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect()
    }

    /// Writes the launch parameters into `target`, leaving its platform,
    /// rootfs and history alone.
    pub fn apply_to(&self, target: &mut ImageConfiguration) {
        let mut container = target.config().clone().unwrap_or_default();

        container.set_entrypoint(self.entrypoint.clone());
        container.set_cmd(self.cmd.clone());
        container.set_env(non_empty(self.env_list()));
        container.set_working_dir(self.working_dir.clone());
        container.set_user(self.user.clone());
        container.set_labels(if self.labels.is_empty() {
            None
        } else {
            Some(self.labels.clone().into_iter().collect())
        });
        container.set_exposed_ports(non_empty(self.exposed_ports.iter().cloned().collect()));
        container.set_volumes(non_empty(self.volumes.iter().cloned().collect()));

        target.set_config(Some(container));
        target.set_created(self.created.clone());
    }
}

fn split_env(var: &str) -> (String, String) {
    match var.split_once('=') {
        Some((name, value)) => (name.to_string(), value.to_string()),
        None => (var.to_string(), String::new()),
    }
}

fn non_empty(items: Vec<String>) -> Option<Vec<String>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
