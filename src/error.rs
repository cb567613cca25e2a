//! Error types for the conversion engine.
//!
//! Every fallible library operation returns [`Result<T>`], an alias for
//! `Result<T, Error>`. The variants follow the phase that failed:
//!
//! - **Resolution**: [`Error::Resolution`], [`Error::InvalidReference`]
//! - **Classification**: [`Error::UnknownSplitter`], [`Error::InvalidRules`],
//!   [`Error::EmptyClassification`]
//! - **Layer codec**: [`Error::Layer`], [`Error::Oci`]
//! - **Publication**: [`Error::Storage`]
//!
//! No variant is retried inside the crate; the caller decides what to do.

use crate::store::StoreError;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by resolution failures; sources wrap whatever their
/// transport reports (I/O, JSON, a failed `docker save`).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The step of a publish that was running when the store failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPhase {
    /// Writing layer and config blobs.
    Blobs,
    /// Writing the manifest blob.
    Manifest,
    /// Swapping the tag to the new manifest.
    Tag,
}

impl fmt::Display for PublishPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishPhase::Blobs => "blobs",
            PublishPhase::Manifest => "manifest",
            PublishPhase::Tag => "tag",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot resolve image '{reference}': {source}")]
    Resolution {
        reference: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid image reference '{0}'")]
    InvalidReference(String),

    #[error("unknown splitter type '{0}'")]
    UnknownSplitter(String),

    #[error("invalid splitter rules in {origin}: {reason}")]
    InvalidRules { origin: String, reason: String },

    #[error(
        "splitter '{splitter}' found no application content in '{reference}'; \
         is this the right --type for the image?"
    )]
    EmptyClassification { reference: String, splitter: String },

    #[error("layer {context}: {source}")]
    Layer {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build OCI document: {0}")]
    Oci(#[from] oci_spec::OciSpecError),

    #[error("publishing '{tag}' failed while writing {phase}: {source}")]
    Storage {
        phase: PublishPhase,
        tag: String,
        #[source]
        source: StoreError,
    },
}

impl Error {
    pub fn resolution<E>(reference: &str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Resolution {
            reference: reference.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn layer(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Layer {
            context: context.into(),
            source,
        }
    }
}
