//! Classification of a merged filesystem into application and runtime content.
//!
//! A [`Splitter`] knows where one runtime family installs itself. Everything in
//! the view that is not under one of those locations, plus anything under an
//! explicitly whitelisted application location, is application content. The
//! concrete tables are data (`rules/*.json`), see [`RuleSplitter`].

mod rules;

pub use rules::{RuleSplitter, SplitRules};

use crate::error::{Error, Result};
use crate::image::EntryKind;
use crate::merge::MergedView;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitResult {
    pub application_paths: BTreeSet<PathBuf>,
    /// Application paths the base also provides, with different content.
    /// The application copy is kept.
    pub conflicts: BTreeSet<PathBuf>,
}

pub trait Splitter: Send + Sync {
    /// Identifies the variant, e.g. `python`; matched against `--type`.
    fn token(&self) -> &str;

    fn is_application(&self, path: &Path) -> bool;

    /// Splits `view`, recording conflicts against `base`, the merged view of
    /// the image the application is being moved onto.
    ///
    /// Fails unless at least one application path is something other than a
    /// directory. Distribution root filesystems ship bare `/home` and `/srv`
    /// directories, which alone are not application content.
    fn classify(&self, view: &MergedView, base: &MergedView) -> Result<SplitResult> {
        let application_paths: BTreeSet<PathBuf> = view
            .paths()
            .filter(|path| self.is_application(path))
            .map(Path::to_path_buf)
            .collect();

        let has_content = application_paths
            .iter()
            .any(|path| view.get(path).is_some_and(|entry| entry.kind != EntryKind::Dir));
        if !has_content {
            return Err(Error::EmptyClassification {
                reference: view.origin().to_string(),
                splitter: self.token().to_string(),
            });
        }

        let conflicts = application_paths
            .iter()
            .filter(|path| match (view.get(path), base.get(path)) {
                (Some(ours), Some(theirs)) => !ours.same_content(theirs),
                _ => false,
            })
            .cloned()
            .collect();

        Ok(SplitResult {
            application_paths,
            conflicts,
        })
    }
}

/// The set of variants a token can select from.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    variants: Vec<RuleSplitter>,
}

impl Registry {
    /// The variants shipped with the crate.
    pub fn builtin() -> Result<Self> {
        let mut registry = Registry::default();
        for (origin, json) in rules::BUILTIN {
            registry.register(RuleSplitter::from_json(json, origin)?);
        }
        Ok(registry)
    }

    /// Adds a variant, replacing any with the same token.
    pub fn register(&mut self, splitter: RuleSplitter) {
        self.variants
            .retain(|v| !v.token().eq_ignore_ascii_case(splitter.token()));
        self.variants.push(splitter);
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.token()).collect()
    }

    pub fn get(&self, token: &str) -> Result<Box<dyn Splitter>> {
        self.variants
            .iter()
            .find(|v| v.token().eq_ignore_ascii_case(token))
            .map(|v| Box::new(v.clone()) as Box<dyn Splitter>)
            .ok_or_else(|| Error::UnknownSplitter(token.to_string()))
    }
}

/// Selects a built-in variant by token.
pub fn from_token(token: &str) -> Result<Box<dyn Splitter>> {
    Registry::builtin()?.get(token)
}
