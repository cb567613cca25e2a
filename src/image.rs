//! In-memory model of a resolved image.
//!
//! An [`Image`] is an ordered list of [`Layer`]s (oldest first) plus its
//! [`Config`]. Each layer keeps the blob it was read from, so it can be copied
//! into a store untouched, and the [`FilesystemEntry`] records parsed out of it.
//! Nothing here performs I/O; see [`crate::layer`] for the codec and
//! [`crate::sources`] for resolution.

use crate::config::Config;
use crate::digest::Digest;
use crate::error::{Error, Result};
use oci_spec::image::{ImageConfiguration, MediaType};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// A name plus tag or digest, e.g. `python:3.9` or `app@sha256:…`.
///
/// Names without a tag get `latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    repository: String,
    reference: Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Tag(String),
    Digest(Digest),
}

impl ImageRef {
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.reference {
            Reference::Tag(tag) => Some(tag),
            Reference::Digest(_) => None,
        }
    }

    fn valid_component(component: &str) -> bool {
        !component.is_empty()
            && component
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':'))
            && !component.starts_with(|c: char| c == '.' || c == '-')
    }

    fn valid_tag(tag: &str) -> bool {
        !tag.is_empty()
            && tag.len() <= 128
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !tag.starts_with(|c: char| c == '.' || c == '-')
    }
}

impl FromStr for ImageRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidReference(s.to_string());

        let (repository, reference) = if let Some((name, digest)) = s.split_once('@') {
            let digest = digest.parse::<Digest>().map_err(|_| invalid())?;
            (name, Reference::Digest(digest))
        } else {
            // A colon after the last slash separates the tag; earlier colons
            // belong to a registry port.
            let last_slash = s.rfind('/').map(|i| i + 1).unwrap_or(0);
            match s[last_slash..].rfind(':') {
                Some(i) => {
                    let split = last_slash + i;
                    (&s[..split], Reference::Tag(s[split + 1..].to_string()))
                }
                None => (s, Reference::Tag("latest".to_string())),
            }
        };

        if !repository.split('/').all(Self::valid_component) {
            return Err(invalid());
        }
        if let Reference::Tag(tag) = &reference {
            if !Self::valid_tag(tag) {
                return Err(invalid());
            }
        }

        Ok(ImageRef {
            repository: repository.to_string(),
            reference,
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Reference::Tag(tag) => write!(f, "{}:{}", self.repository, tag),
            Reference::Digest(digest) => write!(f, "{}@{}", self.repository, digest),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink { target: String },
    /// Deletes the path, and its subtree for directories, from earlier layers.
    Whiteout,
    /// Deletes the children of the directory from earlier layers but keeps
    /// the directory itself.
    OpaqueWhiteout,
}

impl EntryKind {
    pub fn is_whiteout(&self) -> bool {
        matches!(self, EntryKind::Whiteout | EntryKind::OpaqueWhiteout)
    }
}

/// File bytes shared between every view and layer that references them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub digest: Digest,
    pub data: Arc<[u8]>,
}

impl ContentRef {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            digest: Digest::of(&data),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemEntry {
    /// Absolute path inside the image, e.g. `/app/main.py`.
    pub path: PathBuf,
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
    pub uid: u64,
    pub gid: u64,
    pub mtime: u64,
    /// Present for regular files only.
    pub content: Option<ContentRef>,
}

impl FilesystemEntry {
    pub fn file(path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) -> Self {
        let content = ContentRef::new(data.into());
        Self {
            path: path.into(),
            kind: EntryKind::File,
            mode: 0o644,
            size: content.data.len() as u64,
            uid: 0,
            gid: 0,
            mtime: 0,
            content: Some(content),
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self::without_content(path, EntryKind::Dir, 0o755)
    }

    pub fn symlink(path: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self::without_content(
            path,
            EntryKind::Symlink {
                target: target.into(),
            },
            0o777,
        )
    }

    pub fn whiteout(path: impl Into<PathBuf>) -> Self {
        Self::without_content(path, EntryKind::Whiteout, 0)
    }

    pub fn opaque(path: impl Into<PathBuf>) -> Self {
        Self::without_content(path, EntryKind::OpaqueWhiteout, 0)
    }

    fn without_content(path: impl Into<PathBuf>, kind: EntryKind, mode: u32) -> Self {
        Self {
            path: path.into(),
            kind,
            mode,
            size: 0,
            uid: 0,
            gid: 0,
            mtime: 0,
            content: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Whether `other` holds the same thing at this path.
    ///
    /// Directories compare equal regardless of metadata; files compare by
    /// content digest and symlinks by target.
    pub fn same_content(&self, other: &FilesystemEntry) -> bool {
        match (&self.kind, &other.kind) {
            (EntryKind::Dir, EntryKind::Dir) => true,
            (EntryKind::File, EntryKind::File) => {
                self.content.as_ref().map(|c| &c.digest)
                    == other.content.as_ref().map(|c| &c.digest)
            }
            (EntryKind::Symlink { target: a }, EntryKind::Symlink { target: b }) => a == b,
            _ => false,
        }
    }
}

/// One content-addressed layer.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Digest of `blob`, as stored.
    pub digest: Digest,
    /// Digest of the uncompressed tar stream.
    pub diff_id: Digest,
    pub media_type: MediaType,
    pub blob: Arc<[u8]>,
    pub entries: Arc<[FilesystemEntry]>,
}

impl Layer {
    pub fn size(&self) -> u64 {
        self.blob.len() as u64
    }
}

/// A resolved image: ordered layers (oldest first) and configuration.
#[derive(Debug, Clone)]
pub struct Image {
    /// What the image was resolved from, for diagnostics.
    pub reference: String,
    pub layers: Vec<Layer>,
    pub config: Config,
    /// The full OCI configuration, kept so that fields the engine does not
    /// model (history, rootfs) survive recomposition.
    pub oci_config: ImageConfiguration,
}
