//! Flattening an ordered layer stack into the filesystem a container sees.

use crate::image::{EntryKind, FilesystemEntry, Image, Layer};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

/// The visible filesystem of an image, keyed by absolute path.
///
/// Paths sort so that a directory is immediately followed by its whole
/// subtree, which keeps whiteout handling a range operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedView {
    origin: String,
    entries: BTreeMap<PathBuf, FilesystemEntry>,
}

/// Merges every layer of `image`, oldest first.
pub fn merge(image: &Image) -> MergedView {
    let mut view = MergedView::from_layers(&image.layers);
    view.origin = image.reference.clone();
    view
}

impl MergedView {
    pub fn from_layers(layers: &[Layer]) -> Self {
        let mut view = MergedView::default();
        for layer in layers {
            view.apply(&layer.entries);
        }
        view
    }

    /// Applies one layer's entries on top of the view, in order.
    pub fn apply(&mut self, entries: &[FilesystemEntry]) {
        for entry in entries {
            match entry.kind {
                EntryKind::Whiteout => {
                    self.entries.remove(&entry.path);
                    self.remove_descendants(&entry.path);
                }
                EntryKind::OpaqueWhiteout => self.remove_descendants(&entry.path),
                _ => {
                    let keeps_children = entry.kind == EntryKind::Dir
                        && self
                            .entries
                            .get(&entry.path)
                            .is_some_and(|old| old.kind == EntryKind::Dir);
                    if !keeps_children {
                        self.remove_descendants(&entry.path);
                    }
                    self.entries.insert(entry.path.clone(), entry.clone());
                }
            }
        }
    }

    fn remove_descendants(&mut self, dir: &Path) {
        let doomed: Vec<PathBuf> = self
            .entries
            .range::<Path, _>((Bound::Excluded(dir), Bound::Unbounded))
            .map(|(path, _)| path)
            .take_while(|path| path.starts_with(dir))
            .cloned()
            .collect();
        for path in doomed {
            self.entries.remove(&path);
        }
    }

    /// The image the view was merged from, empty for bare layer stacks.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn get(&self, path: &Path) -> Option<&FilesystemEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FilesystemEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }
}
