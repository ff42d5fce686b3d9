//! Lazy discovery of candidate documents under a root.

use ignore::{Walk, WalkBuilder};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;

/// Options controlling which paths the scanner yields.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Allowed suffixes, compared case-sensitively, each with a leading dot.
    pub extensions: Vec<String>,
    /// Plain substring tested against the full path.
    pub excluded: Option<String>,
    pub follow_symlinks: bool,
    pub respect_gitignore: bool,
}

impl ScanOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excluded: config.excluded.clone(),
            follow_symlinks: config.follow_symlinks,
            respect_gitignore: config.respect_gitignore,
        }
    }

    /// Whether `path` passes the exclusion and extension filters.
    ///
    /// Paths that are not valid UTF-8 are never accepted: the stored path
    /// string is the document's identity and must round-trip to the file.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(shown) = path.to_str() else {
            tracing::debug!(path = %path.display(), "Skipped: path is not valid UTF-8");
            return false;
        };
        if let Some(excluded) = &self.excluded {
            if shown.contains(excluded.as_str()) {
                tracing::debug!(path = shown, "Excluded");
                return false;
            }
        }

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            tracing::debug!(path = shown, "Skipped: no extension");
            return false;
        };
        let matched = self.extensions.iter().any(|allowed| allowed.strip_prefix('.') == Some(ext));
        if !matched {
            tracing::debug!(path = shown, "Skipped: extension not allowed");
        }
        matched
    }
}

/// One-pass iterator over matching files in traversal order.
///
/// Any walk error is yielded as `Err`; callers are expected to stop there.
pub struct Scanner {
    walk: Walk,
    options: ScanOptions,
}

impl Scanner {
    /// Start a scan at `root`, which may be a file or a directory.
    #[must_use]
    pub fn new(root: &Path, options: ScanOptions) -> Self {
        let walk = WalkBuilder::new(root)
            .standard_filters(options.respect_gitignore)
            .follow_links(options.follow_symlinks)
            .build();
        Self { walk, options }
    }
}

impl Iterator for Scanner {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walk.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.into_path();
            if self.options.accepts(&path) {
                return Some(Ok(path));
            }
        }
    }
}

/// Convenience wrapper matching the scanner contract.
#[must_use]
pub fn scan(root: &Path, extensions: &[String], excluded: Option<&str>) -> Scanner {
    let options = ScanOptions {
        extensions: extensions.to_vec(),
        excluded: excluded.map(str::to_string),
        follow_symlinks: false,
        respect_gitignore: false,
    };
    Scanner::new(root, options)
}
