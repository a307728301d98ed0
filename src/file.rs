use crate::error::{Error, Result};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A source file found during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Path to the file as discovered (root joined with the relative path)
    pub absolute_path: PathBuf,

    /// Relative path from the root directory
    pub relative_path: String,

    /// Suffix the file was selected by
    pub suffix: String,

    /// Size in bytes at discovery time
    pub len: u64,
}

impl SourceFile {
    /// Creates a new source file record.
    #[must_use]
    pub fn new(
        absolute_path: PathBuf,
        relative_path: String,
        suffix: impl Into<String>,
        len: u64,
    ) -> Self {
        Self {
            absolute_path,
            relative_path,
            suffix: suffix.into(),
            len,
        }
    }

    /// Reads the file's current content.
    ///
    /// # Errors
    ///
    /// See [`read_source`].
    pub fn read(&self) -> Result<String> {
        read_source(&self.absolute_path)
    }
}

/// Reads a source file as UTF-8 text.
///
/// # Errors
///
/// - [`Error::SourceNotFound`] if the file no longer exists
/// - [`Error::InvalidUtf8`] if the content is not text
/// - [`Error::Io`] for any other read failure
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::source_not_found(path),
        ErrorKind::InvalidData => Error::invalid_utf8(path),
        _ => Error::io(path, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_read_source_text() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("main.py");
        file.write_str("print('hi')\n").unwrap();

        assert_eq!(read_source(file.path()).unwrap(), "print('hi')\n");
    }

    #[test]
    fn test_read_source_missing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = read_source(&temp.path().join("gone.py")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_read_source_binary() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("blob.py");
        file.write_binary(&[0xff, 0xfe, 0x00, 0x80]).unwrap();

        let err = read_source(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_source_file_read() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.py");
        file.write_str("x = 1").unwrap();

        let source = SourceFile::new(file.path().to_path_buf(), "a.py".to_string(), ".py", 5);
        assert_eq!(source.read().unwrap(), "x = 1");
    }
}
