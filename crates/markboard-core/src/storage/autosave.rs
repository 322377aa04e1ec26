//! Periodic saving of the open document.

use super::{Storage, StorageResult};
use crate::document::Document;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

/// Key under which the most recently saved document is also stored.
pub const LAST_DOCUMENT_KEY: &str = "__last_document__";

/// Saves a document when it has changed and the interval has elapsed.
///
/// Changes are detected from [`Document::revision`], so callers only need to
/// hand over the document; there is no dirty flag to forget.
pub struct AutoSaveManager<S: Storage> {
    storage: Arc<S>,
    interval: Duration,
    last_save: Option<Instant>,
    /// Document id and revision at the last save or load.
    saved: Option<(String, u64)>,
}

impl<S: Storage> AutoSaveManager<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            interval: Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS),
            last_save: None,
            saved: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Whether the document changed since it was last saved or loaded.
    pub fn is_dirty(&self, document: &Document) -> bool {
        match &self.saved {
            Some((id, revision)) => *id != document.id || *revision != document.revision(),
            None => document.revision() > 0,
        }
    }

    pub fn should_save(&self, document: &Document) -> bool {
        if !self.is_dirty(document) {
            return false;
        }
        self.last_save
            .is_none_or(|last| last.elapsed() >= self.interval)
    }

    /// Save if dirty and the interval has elapsed. Returns true if it saved.
    pub async fn maybe_save(&mut self, document: &Document) -> StorageResult<bool> {
        if !self.should_save(document) {
            return Ok(false);
        }
        self.save(document).await?;
        Ok(true)
    }

    /// Save now, under the document's id and as the last document.
    pub async fn save(&mut self, document: &Document) -> StorageResult<()> {
        self.storage.save(&document.id, document).await?;
        self.storage.save(LAST_DOCUMENT_KEY, document).await?;
        log::info!(
            "Autosaved document {} at revision {}",
            document.id,
            document.revision()
        );
        self.mark_saved(document);
        Ok(())
    }

    pub async fn load(&mut self, id: &str) -> StorageResult<Document> {
        let doc = self.storage.load(id).await?;
        self.mark_saved(&doc);
        Ok(doc)
    }

    /// Load the most recently saved document, if any.
    pub async fn load_last(&mut self) -> Option<Document> {
        match self.storage.load(LAST_DOCUMENT_KEY).await {
            Ok(doc) => {
                self.mark_saved(&doc);
                Some(doc)
            }
            Err(e) => {
                log::debug!("No last document to restore: {}", e);
                None
            }
        }
    }

    /// Saved document ids, without the last-document entry.
    pub async fn list_documents(&self) -> StorageResult<Vec<String>> {
        let mut ids = self.storage.list().await?;
        ids.retain(|id| id != LAST_DOCUMENT_KEY);
        Ok(ids)
    }

    fn mark_saved(&mut self, document: &Document) {
        self.saved = Some((document.id.clone(), document.revision()));
        self.last_save = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::Stroke;
    use crate::storage::MemoryStorage;
    use kurbo::Point;
    use pollster::block_on;

    fn stroke(id: &str) -> crate::shapes::Shape {
        Stroke::from_points(id, vec![Point::new(0.0, 0.0)]).into()
    }

    #[test]
    fn test_fresh_document_is_clean() {
        let manager = AutoSaveManager::new(Arc::new(MemoryStorage::new()));
        let doc = Document::new();
        assert!(!manager.is_dirty(&doc));
        assert!(!manager.should_save(&doc));
    }

    #[test]
    fn test_mutation_makes_dirty_and_save_cleans() {
        let mut manager = AutoSaveManager::new(Arc::new(MemoryStorage::new()));
        let mut doc = Document::new();
        doc.put(stroke("s1"));
        assert!(manager.should_save(&doc));

        assert!(block_on(manager.maybe_save(&doc)).unwrap());
        assert!(!manager.is_dirty(&doc));
        assert!(!block_on(manager.maybe_save(&doc)).unwrap());
    }

    #[test]
    fn test_interval_throttles_saves() {
        let mut manager =
            AutoSaveManager::new(Arc::new(MemoryStorage::new())).with_interval(Duration::from_secs(3600));
        let mut doc = Document::new();
        doc.put(stroke("s1"));
        block_on(manager.save(&doc)).unwrap();

        doc.put(stroke("s2"));
        assert!(manager.is_dirty(&doc));
        assert!(!manager.should_save(&doc));
    }

    #[test]
    fn test_load_last_restores_document() {
        let storage = Arc::new(MemoryStorage::new());
        let mut manager = AutoSaveManager::new(storage.clone());
        let mut doc = Document::new();
        doc.name = "Retro".to_string();
        doc.put(stroke("s1"));
        block_on(manager.save(&doc)).unwrap();

        let mut restored_by = AutoSaveManager::new(storage);
        let loaded = block_on(restored_by.load_last()).unwrap();
        assert_eq!(loaded.name, "Retro");
        assert!(!restored_by.is_dirty(&loaded));

        let ids = block_on(restored_by.list_documents()).unwrap();
        assert_eq!(ids, vec![doc.id.clone()]);
    }
}
