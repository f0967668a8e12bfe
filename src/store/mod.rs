pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

use crate::cache::ReadCache;

/// Cache capacity used by `Store::open`.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Relational side of the platform: one sled tree per table plus index trees.
/// Catalog reads go through a bounded cache that every catalog write invalidates.
pub struct Store {
    db: Db,
    pub users: sled::Tree,
    pub sessions: sled::Tree,
    pub password_reset_codes: sled::Tree,
    pub config_versions: sled::Tree,
    pub topics: sled::Tree,
    pub topic_preferences: sled::Tree,
    pub courses: sled::Tree,
    pub course_interactions: sled::Tree,
    pub section_quizzes: sled::Tree,
    pub quiz_progress: sled::Tree,
    // Secondary index trees
    pub courses_by_topic: sled::Tree,
    cache: ReadCache,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("db", &self.db)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    pub(crate) fn not_found(entity: &str, key: &str) -> Self {
        StoreError::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        Self::open_with_cache_capacity(sled_path, DEFAULT_CACHE_CAPACITY)
    }

    pub fn open_with_cache_capacity(
        sled_path: &str,
        cache_capacity: usize,
    ) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let users = db.open_tree(trees::USERS)?;
        let sessions = db.open_tree(trees::SESSIONS)?;
        let password_reset_codes = db.open_tree(trees::PASSWORD_RESET_CODES)?;
        let config_versions = db.open_tree(trees::CONFIG_VERSIONS)?;
        let topics = db.open_tree(trees::TOPICS)?;
        let topic_preferences = db.open_tree(trees::TOPIC_PREFERENCES)?;
        let courses = db.open_tree(trees::COURSES)?;
        let course_interactions = db.open_tree(trees::COURSE_INTERACTIONS)?;
        let section_quizzes = db.open_tree(trees::SECTION_QUIZZES)?;
        let quiz_progress = db.open_tree(trees::QUIZ_PROGRESS)?;
        let courses_by_topic = db.open_tree(trees::COURSES_BY_TOPIC)?;

        Ok(Self {
            db,
            users,
            sessions,
            password_reset_codes,
            config_versions,
            topics,
            topic_preferences,
            courses,
            course_interactions,
            section_quizzes,
            quiz_progress,
            courses_by_topic,
            cache: ReadCache::new(cache_capacity),
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Deserializes every value under `prefix` in `tree`.
    pub(crate) fn scan_values<T: DeserializeOwned>(
        tree: &sled::Tree,
        prefix: &str,
    ) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            out.push(Self::deserialize(&value)?);
        }
        Ok(out)
    }

    /// Applies `edit` to the record at `key` in one atomic step. A missing
    /// row is left missing and reported as `NotFound`.
    pub(crate) fn update_record<T: Serialize + DeserializeOwned>(
        tree: &sled::Tree,
        key: &str,
        entity: &str,
        id: &str,
        mut edit: impl FnMut(&mut T),
    ) -> Result<T, StoreError> {
        let mut failure = None;
        let updated = tree.update_and_fetch(key.as_bytes(), |old| {
            failure = None;
            let raw = old?;
            let mut record: T = match Self::deserialize(raw) {
                Ok(record) => record,
                Err(e) => {
                    failure = Some(e);
                    return Some(raw.to_vec());
                }
            };
            edit(&mut record);
            match Self::serialize(&record) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    failure = Some(e);
                    Some(raw.to_vec())
                }
            }
        })?;

        if let Some(e) = failure {
            return Err(e);
        }
        let raw = updated.ok_or_else(|| StoreError::not_found(entity, id))?;
        Self::deserialize(&raw)
    }

    /// Removes every key under `prefix` in `tree`, returning how many were removed.
    pub(crate) fn remove_prefix(tree: &sled::Tree, prefix: &str) -> Result<u64, StoreError> {
        let mut keys = Vec::new();
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            keys.push(k);
        }
        let count = keys.len() as u64;
        for key in keys {
            tree.remove(key)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use super::Store;

    pub fn temp_store(name: &str) -> (TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(name);
        let store = Store::open(path.to_str().expect("utf-8 path")).expect("open store");
        (dir, store)
    }
}
