//! Content-addressed storage for uploaded settlement files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::middleware::error_handling::{AppError, Result};
use crate::services::file_parser_service::sha256_hex;

#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the storage root.
    pub relative_path: String,
    pub sha256: String,
}

impl FileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self { base_path })
    }

    /// Writes `data` under `{folder}/{sha256}.{ext}`. Identical uploads share a file.
    pub fn save(&self, folder: &str, filename: &str, data: &[u8]) -> Result<StoredFile> {
        let sha256 = sha256_hex(data);
        let dir = self.base_path.join(sanitize_segment(folder));
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create directory: {}", e)))?;

        let name = match extension(filename) {
            Some(ext) => format!("{}.{}", sha256, ext),
            None => sha256.clone(),
        };
        let path = dir.join(&name);
        if !path.exists() {
            fs::write(&path, data)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to write file: {}", e)))?;
        }

        Ok(StoredFile {
            relative_path: format!("{}/{}", sanitize_segment(folder), name),
            sha256,
        })
    }

    pub fn read(&self, relative_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative_path)?;
        fs::read(&path).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to read file {}: {}", relative_path, e))
        })
    }

    /// Stored paths never leave the storage root.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(AppError::BadRequest("Invalid file path".to_string()));
        }
        Ok(self.base_path.join(relative))
    }
}

fn extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

fn sanitize_segment(segment: &str) -> String {
    let clean: String = segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if clean.is_empty() {
        "misc".to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (FileStorage, PathBuf) {
        let dir = std::env::temp_dir().join(format!("orderdesk-test-{}", uuid::Uuid::new_v4()));
        (FileStorage::new(&dir).unwrap(), dir)
    }

    #[test]
    fn test_save_and_read() {
        let (storage, dir) = temp_storage();
        let stored = storage.save("ripley", "Liquidación Marzo.XLSX", b"data").unwrap();
        assert_eq!(stored.sha256.len(), 64);
        assert_eq!(stored.relative_path, format!("ripley/{}.xlsx", stored.sha256));
        assert_eq!(storage.read(&stored.relative_path).unwrap(), b"data");

        let again = storage.save("ripley", "otra.xlsx", b"data").unwrap();
        assert_eq!(again.sha256, stored.sha256);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let (storage, dir) = temp_storage();
        assert!(matches!(storage.read("../etc/passwd"), Err(AppError::BadRequest(_))));
        assert!(matches!(storage.read("/etc/passwd"), Err(AppError::BadRequest(_))));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("mercado_libre"), "mercado_libre");
        assert_eq!(sanitize_segment("../.."), "misc");
    }
}
