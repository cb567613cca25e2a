pub mod config;
pub mod converter;
pub mod digest;
pub mod error;
pub mod image;
pub mod layer;
pub mod merge;
pub mod notifier;
pub mod publish;
pub mod report;
pub mod sources;
pub mod splitter;
pub mod store;

// Re-exports for easy access
pub use config::{Config, Platform};
pub use converter::{Conversion, Converter, PublishedLayer};
pub use digest::Digest;
pub use error::{Error, PublishPhase, Result};
pub use image::{EntryKind, FilesystemEntry, Image, ImageRef, Layer};
pub use merge::{merge, MergedView};
pub use notifier::Notifier;
pub use sources::{DockerSource, Source, StoreSource, TarSource};
pub use splitter::{RuleSplitter, SplitResult, Splitter};
pub use store::{BlobStore, LayoutStore, StoreError};
