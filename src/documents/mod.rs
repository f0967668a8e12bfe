//! Course bodies, one document per course id, kept apart from the relational
//! store. The pipeline writes a document once every section of a course has
//! been generated; readers get `None` until then.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::store::operations::courses::CourseLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSubsection {
    pub index: u32,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSection {
    pub index: u32,
    pub title: String,
    pub subsections: Vec<DocumentSubsection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDocument {
    pub course_id: String,
    pub topic_id: String,
    pub title: String,
    pub description: String,
    pub level: CourseLevel,
    pub sections: Vec<DocumentSection>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("document backend error: {0}")]
    Backend(String),
    #[error("document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for DocumentStoreError {
    fn from(e: sled::Error) -> Self {
        DocumentStoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts or replaces the body for `doc.course_id`.
    async fn put(&self, doc: &CourseDocument) -> Result<(), DocumentStoreError>;

    async fn get(&self, course_id: &str) -> Result<Option<CourseDocument>, DocumentStoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, course_id: &str) -> Result<bool, DocumentStoreError>;

    async fn ping(&self) -> Result<(), DocumentStoreError>;
}

/// Documents in their own sled database.
pub struct SledDocumentStore {
    db: sled::Db,
    docs: sled::Tree,
}

const COURSE_DOCUMENTS_TREE: &str = "course_documents";

impl SledDocumentStore {
    pub fn open(path: &str) -> Result<Self, DocumentStoreError> {
        let db = sled::open(path)?;
        let docs = db.open_tree(COURSE_DOCUMENTS_TREE)?;
        Ok(Self { db, docs })
    }

    pub fn flush(&self) -> Result<(), DocumentStoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SledDocumentStore {
    async fn put(&self, doc: &CourseDocument) -> Result<(), DocumentStoreError> {
        let bytes = serde_json::to_vec(doc)?;
        self.docs.insert(doc.course_id.as_bytes(), bytes)?;
        Ok(())
    }

    async fn get(&self, course_id: &str) -> Result<Option<CourseDocument>, DocumentStoreError> {
        match self.docs.get(course_id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, course_id: &str) -> Result<bool, DocumentStoreError> {
        Ok(self.docs.remove(course_id.as_bytes())?.is_some())
    }

    async fn ping(&self) -> Result<(), DocumentStoreError> {
        self.db.size_on_disk()?;
        Ok(())
    }
}

/// Process-local store, used when no document path is configured and in tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<String, CourseDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, doc: &CourseDocument) -> Result<(), DocumentStoreError> {
        self.docs
            .write()
            .await
            .insert(doc.course_id.clone(), doc.clone());
        Ok(())
    }

    async fn get(&self, course_id: &str) -> Result<Option<CourseDocument>, DocumentStoreError> {
        Ok(self.docs.read().await.get(course_id).cloned())
    }

    async fn delete(&self, course_id: &str) -> Result<bool, DocumentStoreError> {
        Ok(self.docs.write().await.remove(course_id).is_some())
    }

    async fn ping(&self) -> Result<(), DocumentStoreError> {
        Ok(())
    }
}
