//! Merges a documentation tree into one master document.

use crate::error::{Error, Result};
use crate::file::read_source;
use crate::scanner::Scanner;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MARKDOWN_FENCE: &str = "```markdown";
const FENCE: &str = "```";

/// Outcome of one aggregation pass.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateStats {
    /// Master document that was rebuilt
    pub master_path: PathBuf,

    /// Number of markdown files appended
    pub files_appended: usize,

    /// Bytes appended to the master document
    pub bytes_written: u64,

    /// Markdown files left out because they are not valid UTF-8
    pub files_skipped: Vec<PathBuf>,
}

/// Removes markdown code-fence markers and surrounding whitespace.
///
/// Applying it twice gives the same result as applying it once.
#[must_use]
pub fn remove_markdown_code_blocks(content: &str) -> String {
    let mut cleaned = content.to_string();
    // A marker can reappear once the text between two halves is removed
    // (e.g. "``" + "```" + "`"), so strip until nothing changes.
    loop {
        let next = cleaned.replace(MARKDOWN_FENCE, "").replace(FENCE, "");
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    cleaned.trim().to_string()
}

/// Builds the master document from every `.md` file under a folder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    relative_labels: bool,
}

impl Aggregator {
    /// Creates an aggregator labelling sections with the discovered paths.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            relative_labels: false,
        }
    }

    /// Labels sections relative to the source folder instead.
    #[must_use]
    pub const fn relative_labels(mut self, enabled: bool) -> Self {
        self.relative_labels = enabled;
        self
    }

    /// Empties `master_path`, then appends one section per markdown file
    /// found under `source_folder`.
    ///
    /// Whatever `master_path` held before is lost. Each section is appended
    /// with its own open/write/close, so the whole set is never held in memory.
    /// Files that are not valid UTF-8 are skipped and listed in
    /// [`AggregateStats::files_skipped`].
    ///
    /// # Errors
    ///
    /// Returns an error if the folder does not exist, or a file cannot be
    /// read or appended. The master document then holds only the sections
    /// appended before the failure.
    pub fn reset_and_rebuild(
        &self,
        source_folder: &Path,
        master_path: &Path,
    ) -> Result<AggregateStats> {
        if let Some(parent) = master_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::File::create(master_path).map_err(|e| Error::io(master_path, e))?;

        let master_identity = fs::canonicalize(master_path).ok();
        let files = Scanner::plain(source_folder, ".md").discover()?;
        info!(
            "Aggregating {} markdown files from {} into {}",
            files.len(),
            source_folder.display(),
            master_path.display()
        );

        let mut stats = AggregateStats {
            master_path: master_path.to_path_buf(),
            files_appended: 0,
            bytes_written: 0,
            files_skipped: Vec::new(),
        };

        for file in files {
            if master_identity.is_some()
                && fs::canonicalize(&file.absolute_path).ok() == master_identity
            {
                debug!("Skipping master document inside source folder");
                continue;
            }

            let content = match read_source(&file.absolute_path) {
                Ok(content) => content,
                Err(Error::InvalidUtf8 { path }) => {
                    warn!("Skipping {}: not valid UTF-8", path.display());
                    stats.files_skipped.push(path);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let label = if self.relative_labels {
                PathBuf::from(&file.relative_path)
            } else {
                file.absolute_path.clone()
            };

            let section = format!(
                "File Path: {}\n\n{}\n\n---\n\n",
                label.display(),
                remove_markdown_code_blocks(&content)
            );
            append_to_master(master_path, &section)?;

            stats.files_appended += 1;
            stats.bytes_written += section.len() as u64;
            debug!("Appended {}", label.display());
        }

        info!(
            "All markdown files have been processed and appended to {}",
            master_path.display()
        );
        Ok(stats)
    }
}

fn append_to_master(master_path: &Path, section: &str) -> Result<()> {
    let mut master = OpenOptions::new()
        .append(true)
        .open(master_path)
        .map_err(|e| Error::io(master_path, e))?;
    master
        .write_all(section.as_bytes())
        .map_err(|e| Error::io(master_path, e))
}

/// Rebuilds `master_path` from the markdown files under `source_folder`,
/// labelling each section with its discovered path.
///
/// # Errors
///
/// See [`Aggregator::reset_and_rebuild`].
pub fn aggregate(source_folder: &Path, master_path: &Path) -> Result<AggregateStats> {
    Aggregator::new().reset_and_rebuild(source_folder, master_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_remove_code_blocks() {
        assert_eq!(remove_markdown_code_blocks("```markdown\nHello\n```"), "Hello");
        assert_eq!(
            remove_markdown_code_blocks("  intro\n```rust\nfn f() {}\n```\n"),
            "intro\nrust\nfn f() {}"
        );
        assert_eq!(remove_markdown_code_blocks("plain"), "plain");
    }

    #[test]
    fn test_remove_code_blocks_is_idempotent() {
        for input in [
            "",
            "World",
            "```markdown\nHello\n```",
            "``````markdown",
            "``\n```\n`",
            "```mark```down",
            "  \n```markdown\n# T\n\n```python\nx\n```\n```  ",
        ] {
            let once = remove_markdown_code_blocks(input);
            assert_eq!(remove_markdown_code_blocks(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_aggregate_relative_labels_exact_output() {
        let temp = assert_fs::TempDir::new().unwrap();
        let docs = temp.child("docs");
        docs.child("x.md").write_str("```markdown\nHello\n```").unwrap();
        docs.child("y.md").write_str("World").unwrap();
        let master = temp.child("master.md");

        let stats = Aggregator::new()
            .relative_labels(true)
            .reset_and_rebuild(docs.path(), master.path())
            .unwrap();

        assert_eq!(stats.files_appended, 2);
        master.assert(
            "File Path: x.md\n\nHello\n\n---\n\nFile Path: y.md\n\nWorld\n\n---\n\n",
        );
    }

    #[test]
    fn test_aggregate_labels_with_discovered_path() {
        let temp = assert_fs::TempDir::new().unwrap();
        let docs = temp.child("docs");
        docs.child("sub/z.md").write_str("\n  Zed  \n").unwrap();
        let master = temp.path().join("master.md");

        aggregate(docs.path(), &master).unwrap();

        let expected = format!(
            "File Path: {}\n\nZed\n\n---\n\n",
            docs.path().join("sub").join("z.md").display()
        );
        assert_eq!(fs::read_to_string(&master).unwrap(), expected);
    }

    #[test]
    fn test_aggregate_truncates_previous_master() {
        let temp = assert_fs::TempDir::new().unwrap();
        let docs = temp.child("docs");
        docs.create_dir_all().unwrap();
        let master = temp.child("out/master.md");
        master.write_str("stale content").unwrap();

        let stats = aggregate(docs.path(), master.path()).unwrap();

        assert_eq!(stats.files_appended, 0);
        master.assert("");
    }

    #[test]
    fn test_aggregate_ignores_other_suffixes_and_master_itself() {
        let temp = assert_fs::TempDir::new().unwrap();
        let docs = temp.child("docs");
        docs.child("a.md").write_str("A").unwrap();
        docs.child("notes.txt").write_str("not markdown").unwrap();
        let master = docs.child("all.md");
        master.write_str("old").unwrap();

        let stats = Aggregator::new()
            .relative_labels(true)
            .reset_and_rebuild(docs.path(), master.path())
            .unwrap();

        assert_eq!(stats.files_appended, 1);
        master.assert("File Path: a.md\n\nA\n\n---\n\n");
    }

    #[test]
    fn test_aggregate_skips_non_utf8_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        let docs = temp.child("docs");
        docs.child("a.md").write_binary(&[0xff, 0xfe, 0x00, 0x80]).unwrap();
        docs.child("b.md").write_str("B").unwrap();
        let master = temp.child("master.md");

        let stats = Aggregator::new()
            .relative_labels(true)
            .reset_and_rebuild(docs.path(), master.path())
            .unwrap();

        assert_eq!(stats.files_appended, 1);
        assert_eq!(stats.files_skipped, vec![docs.path().join("a.md")]);
        master.assert("File Path: b.md\n\nB\n\n---\n\n");
    }

    #[test]
    fn test_aggregate_missing_folder() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = aggregate(&temp.path().join("missing"), &temp.path().join("m.md"));
        assert!(result.is_err());
    }
}
