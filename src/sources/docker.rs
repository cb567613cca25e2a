use super::{Source, TarSource};
use crate::error::{Error, Result};
use crate::image::Image;
use std::ffi::OsStr;
use std::process::Command;
use tempfile::TempDir;

/// Docker implementation of the Source trait
#[derive(Debug, Clone)]
pub struct DockerSource {
    program: String,
}

impl Default for DockerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerSource {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }

    /// Uses another docker-compatible CLI, e.g. `podman`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run_command<I, S>(&self, image: &str, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| {
                Error::resolution(image, format!("failed to execute {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(Error::resolution(
                image,
                format!("{} command failed: {}", self.program, error.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Source for DockerSource {
    fn name(&self) -> &str {
        "docker"
    }

    fn resolve(&self, image_name: &str) -> Result<Image> {
        let temp_dir = TempDir::new().map_err(|e| Error::resolution(image_name, e))?;
        let tarball_path = temp_dir.path().join("image.tar");

        log::info!("Exporting {} image '{}' to tarball...", self.program, image_name);
        self.run_command(
            image_name,
            [OsStr::new("save"), OsStr::new("-o"), tarball_path.as_os_str(), OsStr::new(image_name)],
        )?;

        TarSource::new().load(&tarball_path, image_name)
    }
}
