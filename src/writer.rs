use crate::error::{Error, Result};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, info};

/// File name of the persisted batch summary.
pub(crate) const SUMMARY_FILE_NAME: &str = "summary.json";

/// Writes generated documents to disk.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Writer {
    backup_existing: bool,
}

impl Writer {
    /// Creates a writer; `backup_existing` keeps a timestamped copy of any
    /// file about to be overwritten.
    pub(crate) const fn new(backup_existing: bool) -> Self {
        Self { backup_existing }
    }

    /// Writes `content` to `path`, creating missing parent directories and
    /// replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or the write fails.
    pub(crate) fn write_document(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        if path.exists() && self.backup_existing {
            backup_file(path)?;
        }

        write_file_atomic(path, content)?;
        debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    /// Serializes `summary` as pretty JSON into `dir/summary.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary file cannot be written.
    pub(crate) fn write_summary<T: Serialize>(&self, dir: &Path, summary: &T) -> Result<PathBuf> {
        let summary_path = dir.join(SUMMARY_FILE_NAME);
        let json = serde_json::to_string_pretty(summary)?;
        self.write_document(&summary_path, &json)?;

        info!("Wrote summary to {}", summary_path.display());
        Ok(summary_path)
    }
}

/// Reads back a document written by [`Writer::write_document`].
///
/// # Errors
///
/// Returns an error if the file cannot be read as UTF-8.
pub fn read_document(path: &Path) -> Result<String> {
    crate::file::read_source(path)
}

/// Writes to a temporary sibling, syncs it, then renames over `path`.
///
/// An interrupted write never leaves a half-written document behind, and a
/// failed one removes its temporary file.
fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = temp_path_for(path);
    let result = write_and_rename(&temp_path, path, content);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_and_rename(temp_path: &Path, path: &Path, content: &str) -> Result<()> {
    let mut temp_file = fs::File::create(temp_path).map_err(|e| Error::io(temp_path, e))?;

    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| Error::io(temp_path, e))?;

    temp_file
        .sync_all()
        .map_err(|e| Error::io(temp_path, e))?;

    drop(temp_file);

    fs::rename(temp_path, path).map_err(|e| Error::io(path, e))?;

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Creates a timestamped backup of an existing file.
fn backup_file(path: &Path) -> Result<()> {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_nanos();

    let filename = path
        .file_name()
        .ok_or_else(|| Error::config("Invalid file path"))?
        .to_string_lossy();

    let backup_name = format!("{filename}.backup.{timestamp}");
    let backup_path = path.with_file_name(backup_name);

    fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

    debug!("Created backup: {}", backup_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_writer_creates_parent_directories() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("docs/deep/nested/a.md");

        Writer::default()
            .write_document(target.path(), "# A")
            .unwrap();

        target.assert("# A");
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.path().join("out/doc.md");
        let content = "# Title\n\nSome `code` and ünïcödé.\n";

        Writer::default().write_document(&target, content).unwrap();

        assert_eq!(read_document(&target).unwrap(), content);
    }

    #[test]
    fn test_writer_overwrites_and_leaves_no_temp_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("doc.md");
        target.write_str("old content").unwrap();

        Writer::default()
            .write_document(target.path(), "new")
            .unwrap();

        target.assert("new");
        assert!(!temp.child("doc.md.tmp").exists());
    }

    #[test]
    fn test_failed_write_removes_temp_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("doc.md");
        target.create_dir_all().unwrap();

        let err = Writer::default()
            .write_document(target.path(), "new")
            .unwrap_err();

        assert!(err.is_io());
        assert!(target.path().is_dir());
        assert!(!temp.child("doc.md.tmp").exists());
    }

    #[test]
    fn test_writer_creates_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("doc.md");
        target.write_str("old content").unwrap();

        Writer::new(true).write_document(target.path(), "new").unwrap();

        let entries: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();

        assert!(entries.iter().any(|name| name.starts_with("doc.md.backup.")));
    }

    #[test]
    fn test_writer_creates_summary() {
        let temp = assert_fs::TempDir::new().unwrap();

        let path = Writer::default()
            .write_summary(temp.path(), &serde_json::json!({"files_processed": 2}))
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["files_processed"], 2);
    }
}
