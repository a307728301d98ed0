use crate::{
    config::Config,
    error::{Error, Result},
    file::SourceFile,
};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Statistics collected during discovery.
#[derive(Debug, Default, Clone)]
struct ScanStats {
    visited_files: usize,
    matched_files: usize,
    excluded_files: usize,
    errors: usize,
}

/// Discovers source files under a root directory.
pub(crate) struct Scanner {
    root_dir: PathBuf,
    suffix: String,
    respect_ignore_files: bool,
    excludes: GlobSet,
}

impl Scanner {
    /// Creates a new scanner from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an exclude pattern is not a valid glob.
    pub(crate) fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            root_dir: config.root_dir.clone(),
            suffix: config.suffix.clone(),
            respect_ignore_files: config.respect_ignore_files,
            excludes: build_glob_set(&config.exclude_patterns)?,
        })
    }

    /// Creates a scanner with no excludes and no ignore-file filtering.
    pub(crate) fn plain(root_dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            suffix: suffix.into(),
            respect_ignore_files: false,
            excludes: GlobSet::empty(),
        }
    }

    /// Walks the root directory and returns every regular file whose name
    /// ends with the configured suffix.
    ///
    /// Traversal is sorted by file name within each directory. Symbolic links
    /// are not followed. An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory does not exist.
    pub(crate) fn discover(&self) -> Result<Vec<SourceFile>> {
        if !self.root_dir.is_dir() {
            return Err(Error::config(format!(
                "Root directory does not exist: {}",
                self.root_dir.display()
            )));
        }

        debug!("Starting scan of {}", self.root_dir.display());

        let mut builder = WalkBuilder::new(&self.root_dir);
        builder
            .standard_filters(self.respect_ignore_files)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b));

        let mut stats = ScanStats::default();
        let mut files = Vec::new();

        for result in builder.build() {
            match result {
                Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                    stats.visited_files += 1;
                    if let Some(file) = self.process_entry(&entry, &mut stats) {
                        files.push(file);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Walk error: {}", e);
                    stats.errors += 1;
                }
            }
        }

        debug!(
            "Scan complete: {} visited, {} matched, {} excluded, {} errors",
            stats.visited_files, stats.matched_files, stats.excluded_files, stats.errors
        );

        Ok(files)
    }

    fn process_entry(&self, entry: &DirEntry, stats: &mut ScanStats) -> Option<SourceFile> {
        let path = entry.path();

        let matches_suffix = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&self.suffix));
        if !matches_suffix {
            return None;
        }

        let relative = pathdiff::diff_paths(path, &self.root_dir)
            .unwrap_or_else(|| path.to_path_buf());

        if self.excludes.is_match(&relative) {
            trace!("Excluded by pattern: {}", relative.display());
            stats.excluded_files += 1;
            return None;
        }

        // Size is informational; a file vanishing here is caught at read time.
        let len = entry.metadata().map(|m| m.len()).unwrap_or(0);

        stats.matched_files += 1;
        trace!("Discovered: {}", path.display());

        Some(SourceFile::new(
            path.to_path_buf(),
            relative.to_string_lossy().to_string(),
            self.suffix.clone(),
            len,
        ))
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::config(format!("Invalid exclude pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("Invalid exclude patterns: {e}")))
}

/// Recursively finds every regular file under `root` whose name ends with `suffix`.
///
/// # Errors
///
/// Returns an error if `root` is not a directory.
pub fn discover(root: impl AsRef<Path>, suffix: &str) -> Result<Vec<PathBuf>> {
    Ok(Scanner::plain(root.as_ref(), suffix)
        .discover()?
        .into_iter()
        .map(|file| file.absolute_path)
        .collect())
}

/// Replaces every occurrence of `from` with `to` in the full path string.
///
/// A path without `from` (or an empty `from`) comes back unchanged.
#[must_use]
pub fn remap(path: &Path, from: &str, to: &str) -> PathBuf {
    if from.is_empty() {
        return path.to_path_buf();
    }
    let original = path.to_string_lossy();
    if !original.contains(from) {
        return path.to_path_buf();
    }
    PathBuf::from(original.replace(from, to))
}

/// Documentation path for a source file: [`remap`] plus an `.md` extension.
#[must_use]
pub fn output_path_for(path: &Path, from: &str, to: &str) -> PathBuf {
    remap(path, from, to).with_extension("md")
}
