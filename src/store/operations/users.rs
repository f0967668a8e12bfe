use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Counts of rows removed by `delete_user`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UserDeletion {
    pub sessions: u32,
    pub preferences: u64,
    pub interactions: u64,
    pub quiz_progress: u64,
    pub reset_codes: u64,
}

impl Store {
    pub fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let email_key = keys::user_email_index_key(&user.email);

        // Claim the email first so two concurrent registrations cannot both win.
        let cas_result = self
            .users
            .compare_and_swap(
                email_key.as_bytes(),
                None::<&[u8]>,
                Some(user.id.as_bytes().to_vec()),
            )
            .map_err(StoreError::Sled)?;

        if cas_result.is_err() {
            return Err(StoreError::Conflict {
                entity: "user_email".to_string(),
                key: user.email.clone(),
            });
        }

        let user_bytes = Self::serialize(user)?;
        if let Err(e) = self.users.insert(keys::user_key(&user.id).as_bytes(), user_bytes) {
            let _ = self.users.remove(email_key.as_bytes());
            return Err(StoreError::Sled(e));
        }

        Ok(())
    }

    pub fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let key = keys::user_key(user_id);
        match self.users.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let index_key = keys::user_email_index_key(email);
        let Some(user_id_raw) = self.users.get(index_key.as_bytes())? else {
            return Ok(None);
        };
        let user_id = match String::from_utf8(user_id_raw.to_vec()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid UTF-8 in user email index");
                return Ok(None);
            }
        };
        self.get_user_by_id(&user_id)
    }

    pub fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let existing = self
            .get_user_by_id(&user.id)?
            .ok_or_else(|| StoreError::not_found("user", &user.id))?;

        let user_bytes = Self::serialize(user)?;
        let user_key = keys::user_key(&user.id);

        if existing.email.to_lowercase() == user.email.to_lowercase() {
            self.users.insert(user_key.as_bytes(), user_bytes)?;
            return Ok(());
        }

        let old_email_key = keys::user_email_index_key(&existing.email);
        let new_email_key = keys::user_email_index_key(&user.email);
        let uid_bytes = user.id.as_bytes().to_vec();
        self.users
            .transaction(move |tx| {
                if let Some(owner) = tx.get(new_email_key.as_bytes())? {
                    if owner.as_ref() != uid_bytes.as_slice() {
                        return sled::transaction::abort(());
                    }
                }
                tx.remove(old_email_key.as_bytes())?;
                tx.insert(new_email_key.as_bytes(), uid_bytes.as_slice())?;
                tx.insert(user_key.as_bytes(), user_bytes.as_slice())?;
                Ok(())
            })
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Abort(()) => StoreError::Conflict {
                    entity: "user_email".to_string(),
                    key: user.email.clone(),
                },
                TransactionError::Storage(se) => StoreError::Sled(se),
            })
    }

    pub fn set_user_active(&self, user_id: &str, is_active: bool) -> Result<User, StoreError> {
        let mut user = self
            .get_user_by_id(user_id)?
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        user.is_active = is_active;
        user.updated_at = Utc::now();
        self.update_user(&user)?;
        Ok(user)
    }

    /// Newest first.
    pub fn list_users(&self, limit: usize, offset: usize) -> Result<(Vec<User>, u64), StoreError> {
        let mut users = self.all_users()?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = users.len() as u64;
        Ok((users.into_iter().skip(offset).take(limit).collect(), total))
    }

    pub(crate) fn all_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users = Vec::new();
        for item in self.users.iter() {
            let (key, value) = item?;
            if key.starts_with(b"email:") {
                continue;
            }
            users.push(Self::deserialize::<User>(&value)?);
        }
        Ok(users)
    }

    pub fn count_users(&self) -> Result<u64, StoreError> {
        let mut count = 0u64;
        for item in self.users.iter() {
            let (key, _) = item?;
            if !key.starts_with(b"email:") {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn any_admin_exists(&self) -> Result<bool, StoreError> {
        Ok(self.all_users()?.iter().any(User::is_admin))
    }

    /// Removes the user and everything they own except authored topics.
    pub fn delete_user(&self, user_id: &str) -> Result<UserDeletion, StoreError> {
        let user = self
            .get_user_by_id(user_id)?
            .ok_or_else(|| StoreError::not_found("user", user_id))?;

        let deletion = UserDeletion {
            sessions: self.delete_user_sessions(user_id)?,
            preferences: Self::remove_prefix(
                &self.topic_preferences,
                &keys::topic_preference_prefix(user_id),
            )?,
            interactions: Self::remove_prefix(
                &self.course_interactions,
                &keys::interaction_prefix(user_id),
            )?,
            quiz_progress: Self::remove_prefix(
                &self.quiz_progress,
                &keys::quiz_progress_user_prefix(user_id),
            )?,
            reset_codes: Self::remove_prefix(
                &self.password_reset_codes,
                &keys::reset_code_prefix(user_id),
            )?,
        };

        self.users
            .remove(keys::user_email_index_key(&user.email).as_bytes())?;
        self.users.remove(keys::user_key(user_id).as_bytes())?;

        tracing::info!(user_id, ?deletion, "User deleted");
        Ok(deletion)
    }
}
