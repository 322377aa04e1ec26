//! JSON file storage.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::document::Document;
use std::fs;
use std::path::{Path, PathBuf};

/// Stores each document as `<id>.json` under a base directory.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Open storage at `base_path`, creating the directory if needed.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::Io(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self { base_path })
    }

    /// Storage in the platform data directory, e.g.
    /// `~/.local/share/markboard/documents/` on Linux.
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine data directory".to_string()))?;
        Self::new(base.join("markboard").join("documents"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn document_path(&self, id: &str) -> PathBuf {
        let safe_id: String = id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.json", safe_id))
    }
}

impl Storage for FileStorage {
    fn save(&self, id: &str, document: &Document) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.document_path(id);
        let json = document
            .to_json()
            .map_err(|e| StorageError::Serialization(e.to_string()));
        Box::pin(async move {
            let json = json?;
            // Write beside the target and rename, so a crash never leaves half a document
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, json)
                .and_then(|()| fs::rename(&tmp, &path))
                .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
            log::debug!("Saved document to {}", path.display());
            Ok(())
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<Document>> {
        let path = self.document_path(id);
        let id = id.to_string();
        Box::pin(async move {
            if !path.exists() {
                return Err(StorageError::NotFound(id));
            }
            let json = fs::read_to_string(&path)
                .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
            Document::from_json(&json).map_err(|e| {
                StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
            })
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.document_path(id);
        Box::pin(async move {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        let base = self.base_path.clone();
        Box::pin(async move {
            let entries = fs::read_dir(&base)
                .map_err(|e| StorageError::Io(format!("Failed to read directory: {}", e)))?;
            let mut ids: Vec<String> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
                .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
                .collect();
            ids.sort();
            Ok(ids)
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let path = self.document_path(id);
        Box::pin(async move { Ok(path.exists()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{ParticipantId, Text};
    use kurbo::Point;
    use pollster::block_on;
    use tempfile::tempdir;

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        let mut doc = Document::with_participant(ParticipantId::from("alice"));
        doc.name = "Standup".to_string();
        doc.put(Text::new("t1", Point::new(4.0, 8.0), "agenda").into());

        block_on(storage.save("standup", &doc)).unwrap();
        let loaded = block_on(storage.load("standup")).unwrap();

        assert_eq!(loaded.name, "Standup");
        assert_eq!(loaded.shapes(), doc.shapes());
        assert_eq!(loaded.clock().now(), doc.clock().now());
    }

    #[test]
    fn test_not_found() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let result = block_on(storage.load("nonexistent"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_list_ignores_other_files() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let doc = Document::new();
        block_on(storage.save("doc2", &doc)).unwrap();
        block_on(storage.save("doc1", &doc)).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(block_on(storage.list()).unwrap(), vec!["doc1", "doc2"]);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        block_on(storage.save("doc", &Document::new())).unwrap();
        assert!(block_on(storage.exists("doc")).unwrap());

        block_on(storage.delete("doc")).unwrap();
        assert!(!block_on(storage.exists("doc")).unwrap());
    }

    #[test]
    fn test_ids_are_sanitized() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let doc = Document::new();
        block_on(storage.save("../escape:me", &doc)).unwrap();

        assert!(dir.path().join("___escape_me.json").exists());
        let loaded = block_on(storage.load("../escape:me")).unwrap();
        assert_eq!(loaded.id, doc.id);
    }
}
