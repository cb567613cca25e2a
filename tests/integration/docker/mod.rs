//! Docker integration tests
//!
//! Runs conversions against images exported with `docker save`. Needs a
//! working docker daemon, so only built with the `docker` feature.

#[cfg(all(test, feature = "docker"))]
mod tests {
    use crate::integration::common::*;
    use faktory::{splitter, Converter, DockerSource, Error, LayoutStore, Source, TarSource};
    use std::process::Command;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Test image that definitely doesn't exist
    const NONEXISTENT_IMAGE: &str = "this-image-definitely-does-not-exist:never";

    fn docker(args: &[&str]) {
        let status = Command::new("docker").args(args).status().unwrap();
        assert!(status.success(), "docker {:?} failed", args);
    }

    #[test]
    fn test_docker_source_name() {
        assert_eq!(DockerSource::new().name(), "docker");
    }

    #[test]
    fn test_nonexistent_image() {
        let err = DockerSource::new().resolve(NONEXISTENT_IMAGE).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn test_convert_loaded_image() {
        let dir = TempDir::new().unwrap();
        let app = python_app(dir.path());
        docker(&["load", "-i", app.to_str().unwrap()]);

        let store = Arc::new(LayoutStore::open(dir.path().join("store")).unwrap());
        let converter = Converter::new(
            runtime_base(dir.path()).to_str().unwrap(),
            &TarSource::new(),
            splitter::from_token("python").unwrap(),
            Box::new(DockerSource::new()),
            store,
        )
        .unwrap();

        let conversion = converter.convert("app:1", "app:kontain").unwrap();
        assert_eq!(conversion.application_paths, 3);
        assert_eq!(
            conversion.config.entrypoint,
            Some(vec!["python3".to_string(), "/app/main.py".to_string()])
        );
    }
}
