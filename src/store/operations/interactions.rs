use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_COURSE_PROGRESS;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseInteraction {
    pub user_id: String,
    pub course_id: String,
    pub course_progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CourseInteraction {
    fn new(user_id: &str, course_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            course_progress: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.course_progress >= MAX_COURSE_PROGRESS
    }
}

impl Store {
    /// Idempotent. The flag is true when this call created the record.
    pub fn enroll(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<(CourseInteraction, bool), StoreError> {
        if self.get_course(course_id)?.is_none() {
            return Err(StoreError::not_found("course", course_id));
        }

        let key = keys::interaction_key(user_id, course_id);
        let fresh = CourseInteraction::new(user_id, course_id);
        let swapped = self.course_interactions.compare_and_swap(
            key.as_bytes(),
            None::<&[u8]>,
            Some(Self::serialize(&fresh)?),
        )?;
        match swapped {
            Ok(()) => Ok((fresh, true)),
            Err(current) => {
                let existing = match current.current {
                    Some(raw) => Self::deserialize(&raw)?,
                    None => fresh,
                };
                Ok((existing, false))
            }
        }
    }

    pub fn get_interaction(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<CourseInteraction>, StoreError> {
        match self
            .course_interactions
            .get(keys::interaction_key(user_id, course_id).as_bytes())?
        {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Records progress, creating the interaction if needed. Progress only
    /// moves forward; a lower value leaves the stored one in place.
    pub fn update_progress(
        &self,
        user_id: &str,
        course_id: &str,
        progress: u8,
    ) -> Result<CourseInteraction, StoreError> {
        if progress > MAX_COURSE_PROGRESS {
            return Err(StoreError::Validation(format!(
                "progress must be between 0 and {MAX_COURSE_PROGRESS}"
            )));
        }
        if self.get_course(course_id)?.is_none() {
            return Err(StoreError::not_found("course", course_id));
        }

        let key = keys::interaction_key(user_id, course_id);
        let mut decode_error = None;
        let updated = self
            .course_interactions
            .update_and_fetch(key.as_bytes(), |old| {
                let mut interaction = match old.map(Self::deserialize::<CourseInteraction>) {
                    Some(Ok(existing)) => existing,
                    Some(Err(e)) => {
                        decode_error = Some(e);
                        return old.map(|raw| raw.to_vec());
                    }
                    None => CourseInteraction::new(user_id, course_id),
                };
                if progress > interaction.course_progress {
                    interaction.course_progress = progress;
                    interaction.updated_at = Utc::now();
                }
                serde_json::to_vec(&interaction).ok()
            })?;

        if let Some(e) = decode_error {
            return Err(e);
        }
        let raw = updated.ok_or_else(|| StoreError::not_found("course_interaction", &key))?;
        Self::deserialize(&raw)
    }

    pub fn list_user_interactions(
        &self,
        user_id: &str,
    ) -> Result<Vec<CourseInteraction>, StoreError> {
        Self::scan_values(
            &self.course_interactions,
            &keys::interaction_prefix(user_id),
        )
    }

    /// Progress below 100, most recently touched first.
    pub fn list_in_progress(&self, user_id: &str) -> Result<Vec<CourseInteraction>, StoreError> {
        let mut rows: Vec<_> = self
            .list_user_interactions(user_id)?
            .into_iter()
            .filter(|i| !i.is_completed())
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    pub fn list_completed(&self, user_id: &str) -> Result<Vec<CourseInteraction>, StoreError> {
        let mut rows: Vec<_> = self
            .list_user_interactions(user_id)?
            .into_iter()
            .filter(CourseInteraction::is_completed)
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    pub(crate) fn all_interactions(&self) -> Result<Vec<CourseInteraction>, StoreError> {
        Self::scan_values(&self.course_interactions, "")
    }

    pub(crate) fn remove_interactions_for_course(&self, course_id: &str) -> Result<u64, StoreError> {
        let mut doomed = Vec::new();
        for item in self.course_interactions.iter() {
            let (k, v) = item?;
            let interaction: CourseInteraction = Self::deserialize(&v)?;
            if interaction.course_id == course_id {
                doomed.push(k);
            }
        }
        let count = doomed.len() as u64;
        for key in doomed {
            self.course_interactions.remove(key)?;
        }
        Ok(count)
    }
}
