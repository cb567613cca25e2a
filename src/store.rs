//! Content-addressed blob storage plus mutable tags.
//!
//! [`BlobStore`] is the boundary the publisher writes through. [`LayoutStore`]
//! implements it on a local directory:
//!
//! ```text
//! <root>/oci-layout
//! <root>/blobs/sha256/<hex>         immutable, named by content
//! <root>/refs/<repository>/@<tag>   one manifest digest per tag
//! ```
//!
//! Every file is written to a temporary sibling first and renamed into place,
//! so readers only ever see complete blobs and whole tag values.

use crate::digest::{canonical_json, Digest};
use crate::image::{ImageRef, Reference};
use oci_spec::image::ImageManifest;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("blob {0} not found")]
    BlobNotFound(Digest),

    #[error("blob {expected} has digest {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },

    #[error("invalid tag '{0}'")]
    InvalidTag(String),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

type StoreResult<T> = std::result::Result<T, StoreError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub trait BlobStore: Send + Sync {
    /// Stores `data` under its digest. Storing an existing blob is a no-op.
    fn put_blob(&self, data: &[u8]) -> StoreResult<Digest>;

    fn has_blob(&self, digest: &Digest) -> StoreResult<bool>;

    fn get_blob(&self, digest: &Digest) -> StoreResult<Vec<u8>>;

    /// Stores the canonical JSON form of `manifest` as a blob.
    fn put_manifest(&self, manifest: &ImageManifest) -> StoreResult<Digest> {
        let bytes = canonical_json(manifest)?;
        self.put_blob(&bytes)
    }

    fn get_manifest(&self, digest: &Digest) -> StoreResult<ImageManifest> {
        let bytes = self.get_blob(digest)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Points `tag` at `manifest`, atomically replacing any previous value.
    fn swap_tag(&self, tag: &str, manifest: &Digest) -> StoreResult<()>;

    fn get_tag(&self, tag: &str) -> StoreResult<Option<Digest>>;
}

#[derive(Debug, Clone)]
pub struct LayoutStore {
    root: PathBuf,
}

const LAYOUT_MARKER: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

impl LayoutStore {
    /// Opens the store at `root`, creating its skeleton if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        let store = Self { root };

        for dir in [store.blob_dir(), store.root.join("refs")] {
            fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        }

        let marker = store.root.join("oci-layout");
        if !marker.exists() {
            write_atomic(&marker, LAYOUT_MARKER.as_bytes())?;
        }

        log::debug!("Opened store at {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_dir(&self) -> PathBuf {
        self.root.join("blobs").join("sha256")
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.blob_dir().join(digest.hex())
    }

    fn tag_path(&self, tag: &str) -> StoreResult<PathBuf> {
        let image: ImageRef = tag
            .parse()
            .map_err(|_| StoreError::InvalidTag(tag.to_string()))?;
        let name = match image.reference() {
            Reference::Tag(name) => name,
            Reference::Digest(_) => return Err(StoreError::InvalidTag(tag.to_string())),
        };

        let mut path = self.root.join("refs");
        for component in image.repository().split('/') {
            path.push(component);
        }
        path.push(format!("@{}", name));
        Ok(path)
    }
}

/// Writes `data` to a temporary file next to `path` and renames it over `path`.
fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let mut file = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)
        .map_err(io_error(dir))?;
    file.write_all(data).map_err(io_error(file.path()))?;
    file.as_file().sync_all().map_err(io_error(path))?;
    file.persist(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

impl BlobStore for LayoutStore {
    fn put_blob(&self, data: &[u8]) -> StoreResult<Digest> {
        let digest = Digest::of(data);
        let path = self.blob_path(&digest);
        if path.exists() {
            log::debug!("Blob {} already stored", digest.short());
            return Ok(digest);
        }

        write_atomic(&path, data)?;
        log::debug!("Stored blob {} ({} bytes)", digest.short(), data.len());
        Ok(digest)
    }

    fn has_blob(&self, digest: &Digest) -> StoreResult<bool> {
        Ok(self.blob_path(digest).exists())
    }

    fn get_blob(&self, digest: &Digest) -> StoreResult<Vec<u8>> {
        let path = self.blob_path(digest);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::BlobNotFound(digest.clone()))
            }
            Err(e) => return Err(io_error(&path)(e)),
        };

        let actual = Digest::of(&data);
        if &actual != digest {
            return Err(StoreError::DigestMismatch {
                expected: digest.clone(),
                actual,
            });
        }
        Ok(data)
    }

    fn swap_tag(&self, tag: &str, manifest: &Digest) -> StoreResult<()> {
        let path = self.tag_path(tag)?;
        write_atomic(&path, manifest.as_str().as_bytes())?;
        log::debug!("Tag {} -> {}", tag, manifest);
        Ok(())
    }

    fn get_tag(&self, tag: &str) -> StoreResult<Option<Digest>> {
        let path = self.tag_path(tag)?;
        let value = match fs::read_to_string(&path) {
            Ok(value) => value,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };

        value.trim().parse().map(Some).map_err(|e| StoreError::Io {
            path,
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })
    }
}
