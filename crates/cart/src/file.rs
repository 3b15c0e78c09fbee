//! Local cart storage in a JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tastetrove_core::CartLine;

use crate::ports::{LocalCartStorage, decode_lines, encode_lines};

/// Stores the cart as a JSON array in a single file.
///
/// Writes go to a sibling temporary file that is renamed into place, so a
/// crash mid-write leaves the previous cart intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LocalCartStorage for FileStorage {
    fn read(&self) -> Option<Vec<CartLine>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => decode_lines(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read local cart");
                None
            }
        }
    }

    fn write(&self, lines: &[CartLine]) {
        let Some(raw) = encode_lines(lines) else {
            return;
        };
        let temp = self.temp_path();
        let result = std::fs::write(&temp, raw).and_then(|()| std::fs::rename(&temp, &self.path));
        if let Err(e) = result {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to write local cart");
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to clear local cart");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tastetrove_core::ProductId;

    use super::*;

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("cart.json"));

        assert!(storage.read().is_none());

        let lines = vec![CartLine::new(ProductId::parse("harissa").unwrap(), 3)];
        storage.write(&lines);
        assert_eq!(storage.read(), Some(lines));
        assert!(!storage.temp_path().exists());

        storage.clear();
        assert!(!storage.path().exists());
        storage.clear();
    }

    #[test]
    fn test_file_storage_malformed_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.json");
        std::fs::write(&path, "{\"lines\": oops").unwrap();

        assert!(FileStorage::new(path).read().is_none());
    }
}
