use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Upper bound on sessions removed by one cleanup pass.
const MAX_CLEANUP_BATCH: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

fn map_tx_error(e: TransactionError<()>) -> StoreError {
    match e {
        TransactionError::Abort(()) => {
            StoreError::Sled(sled::Error::Unsupported("transaction aborted".into()))
        }
        TransactionError::Storage(se) => StoreError::Sled(se),
    }
}

impl Store {
    pub fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        let key = keys::session_key(&session.token_hash).into_bytes();
        let index_key =
            keys::session_user_index_key(&session.user_id, &session.token_hash).into_bytes();
        let session_bytes = Self::serialize(session)?;

        self.sessions
            .transaction(move |tx| {
                tx.insert(key.as_slice(), session_bytes.as_slice())?;
                tx.insert(index_key.as_slice(), &[] as &[u8])?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    /// Returns the session unless it is expired or revoked. Expired rows are
    /// left for the cleanup worker.
    pub fn get_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        let key = keys::session_key(token_hash);
        let Some(raw) = self.sessions.get(key.as_bytes())? else {
            return Ok(None);
        };

        let session = Self::deserialize::<Session>(&raw)?;
        if session.revoked || session.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<(), StoreError> {
        let key = keys::session_key(token_hash).into_bytes();
        let index_key = self
            .sessions
            .get(&key)?
            .and_then(|raw| Self::deserialize::<Session>(&raw).ok())
            .map(|session| keys::session_user_index_key(&session.user_id, token_hash).into_bytes());

        self.sessions
            .transaction(move |tx| {
                if let Some(idx) = &index_key {
                    tx.remove(idx.as_slice())?;
                }
                tx.remove(key.as_slice())?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    fn user_session_hashes(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = keys::session_user_index_prefix(user_id);
        let mut hashes = Vec::new();
        for item in self.sessions.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            match std::str::from_utf8(&k) {
                Ok(key) => {
                    if let Some(hash) = key.rsplit(':').next() {
                        hashes.push(hash.to_string());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Skipping session index key with invalid UTF-8"),
            }
        }
        Ok(hashes)
    }

    pub fn delete_user_sessions(&self, user_id: &str) -> Result<u32, StoreError> {
        let hashes = self.user_session_hashes(user_id)?;
        let count = hashes.len() as u32;
        for hash in hashes {
            self.delete_session(&hash)?;
        }
        Ok(count)
    }

    /// Drops the oldest sessions so that at most `max_sessions` remain.
    pub fn cleanup_oldest_user_sessions(
        &self,
        user_id: &str,
        max_sessions: usize,
    ) -> Result<(), StoreError> {
        let mut sessions: Vec<(String, DateTime<Utc>)> = Vec::new();
        for hash in self.user_session_hashes(user_id)? {
            if let Some(raw) = self.sessions.get(keys::session_key(&hash).as_bytes())? {
                if let Ok(session) = Self::deserialize::<Session>(&raw) {
                    sessions.push((hash, session.created_at));
                }
            }
        }

        if sessions.len() <= max_sessions {
            return Ok(());
        }

        sessions.sort_by_key(|(_, created_at)| *created_at);
        let to_remove = sessions.len() - max_sessions;
        for (hash, _) in sessions.into_iter().take(to_remove) {
            self.delete_session(&hash)?;
        }
        Ok(())
    }

    /// Removes up to one batch of expired or revoked sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<u32, StoreError> {
        let now = Utc::now();
        let mut expired = Vec::new();
        for item in self.sessions.iter() {
            let (k, v) = item?;
            if k.starts_with(b"user:") {
                continue;
            }
            let session: Session = Self::deserialize(&v)?;
            if session.revoked || session.expires_at <= now {
                expired.push(session.token_hash);
                if expired.len() >= MAX_CLEANUP_BATCH {
                    break;
                }
            }
        }

        let count = expired.len() as u32;
        for token_hash in expired {
            self.delete_session(&token_hash)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::test_support::temp_store;

    fn sample_session(token_hash: &str, user_id: &str, expires_in_hours: i64) -> Session {
        Session {
            token_hash: token_hash.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(expires_in_hours),
            revoked: false,
        }
    }

    #[test]
    fn create_and_get_session() {
        let (_dir, store) = temp_store("sessions-db");
        store.create_session(&sample_session("h1", "u1", 1)).unwrap();

        let got = store.get_session("h1").unwrap().unwrap();
        assert_eq!(got.user_id, "u1");
    }

    #[test]
    fn cleanup_expired() {
        let (_dir, store) = temp_store("sessions-db2");
        store
            .create_session(&sample_session("h_expired", "u1", -1))
            .unwrap();
        store
            .create_session(&sample_session("h_alive", "u1", 1))
            .unwrap();

        let cleaned = store.cleanup_expired_sessions().unwrap();
        assert_eq!(cleaned, 1);
        assert!(store.get_session("h_expired").unwrap().is_none());
        assert!(store.get_session("h_alive").unwrap().is_some());
    }

    #[test]
    fn oldest_sessions_are_evicted() {
        let (_dir, store) = temp_store("sessions-db3");
        for i in 0..4 {
            let mut s = sample_session(&format!("h{i}"), "u1", 1);
            s.created_at = Utc::now() - Duration::minutes(10 - i);
            store.create_session(&s).unwrap();
        }

        store.cleanup_oldest_user_sessions("u1", 2).unwrap();
        assert!(store.get_session("h0").unwrap().is_none());
        assert!(store.get_session("h1").unwrap().is_none());
        assert!(store.get_session("h3").unwrap().is_some());
        assert_eq!(store.delete_user_sessions("u1").unwrap(), 2);
    }
}
