use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTopicPreference {
    pub user_id: String,
    pub topic_id: String,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Adds interests, skipping ones the user already has. Every topic must
    /// exist; nothing is written if one is missing. Returns the number added.
    pub fn add_topic_preferences(
        &self,
        user_id: &str,
        topic_ids: &[String],
    ) -> Result<u32, StoreError> {
        for topic_id in topic_ids {
            if self.get_topic(topic_id)?.is_none() {
                return Err(StoreError::not_found("topic", topic_id));
            }
        }

        let mut added = 0u32;
        for topic_id in topic_ids {
            let pref = UserTopicPreference {
                user_id: user_id.to_string(),
                topic_id: topic_id.clone(),
                created_at: Utc::now(),
            };
            let res = self.topic_preferences.compare_and_swap(
                keys::topic_preference_key(user_id, topic_id).as_bytes(),
                None::<&[u8]>,
                Some(Self::serialize(&pref)?),
            )?;
            if res.is_ok() {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn list_topic_preferences(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserTopicPreference>, StoreError> {
        Self::scan_values(
            &self.topic_preferences,
            &keys::topic_preference_prefix(user_id),
        )
    }

    pub fn interest_topic_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list_topic_preferences(user_id)?
            .into_iter()
            .map(|p| p.topic_id)
            .collect())
    }

    pub(crate) fn remove_topic_preferences_for_topic(
        &self,
        topic_id: &str,
    ) -> Result<u64, StoreError> {
        let mut doomed = Vec::new();
        for item in self.topic_preferences.iter() {
            let (k, v) = item?;
            let pref: UserTopicPreference = Self::deserialize(&v)?;
            if pref.topic_id == topic_id {
                doomed.push(k);
            }
        }
        let count = doomed.len() as u64;
        for key in doomed {
            self.topic_preferences.remove(key)?;
        }
        Ok(count)
    }
}
