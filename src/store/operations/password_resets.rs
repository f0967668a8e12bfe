use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_RESET_CODE_ATTEMPTS;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetCodeStatus {
    Pending,
    Accepted,
    /// Too many wrong guesses; the code can no longer be redeemed.
    Locked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetCode {
    pub id: String,
    pub user_id: String,
    pub code_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ResetCodeStatus,
    #[serde(default)]
    pub failed_attempts: u32,
}

/// Outcome of checking a submitted code against the user's pending one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetAttempt {
    Accepted,
    Expired,
    /// Wrong code. The pending code locks once `remaining` reaches zero.
    Rejected { remaining: u32 },
    NoPendingCode,
}

impl PasswordResetCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    fn redeem(&mut self, code_hash: &str, now: DateTime<Utc>) -> ResetAttempt {
        if self.status != ResetCodeStatus::Pending {
            return ResetAttempt::NoPendingCode;
        }
        if self.code_hash != code_hash {
            self.failed_attempts += 1;
            if self.failed_attempts >= MAX_RESET_CODE_ATTEMPTS {
                self.status = ResetCodeStatus::Locked;
            }
            return ResetAttempt::Rejected {
                remaining: MAX_RESET_CODE_ATTEMPTS.saturating_sub(self.failed_attempts),
            };
        }
        if self.is_expired(now) {
            return ResetAttempt::Expired;
        }
        self.status = ResetCodeStatus::Accepted;
        ResetAttempt::Accepted
    }
}

impl Store {
    /// Stores `code` as the user's only pending reset code. Returns how many
    /// older pending codes were dropped.
    pub fn replace_pending_reset_code(&self, code: &PasswordResetCode) -> Result<u32, StoreError> {
        let mut replaced = 0u32;
        for existing in self.list_reset_codes(&code.user_id)? {
            if existing.status == ResetCodeStatus::Pending {
                self.password_reset_codes
                    .remove(keys::reset_code_key(&existing.user_id, &existing.id).as_bytes())?;
                replaced += 1;
            }
        }

        self.password_reset_codes.insert(
            keys::reset_code_key(&code.user_id, &code.id).as_bytes(),
            Self::serialize(code)?,
        )?;
        Ok(replaced)
    }

    pub fn list_reset_codes(&self, user_id: &str) -> Result<Vec<PasswordResetCode>, StoreError> {
        Self::scan_values(&self.password_reset_codes, &keys::reset_code_prefix(user_id))
    }

    /// Checks `code_hash` against the user's pending code and records the
    /// outcome in one atomic step: a match accepts the code, a miss counts
    /// against it. A code is redeemable at most once.
    pub fn redeem_reset_code(
        &self,
        user_id: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<ResetAttempt, StoreError> {
        let pending = self
            .list_reset_codes(user_id)?
            .into_iter()
            .filter(|c| c.status == ResetCodeStatus::Pending)
            .max_by_key(|c| c.created_at);
        let Some(pending) = pending else {
            return Ok(ResetAttempt::NoPendingCode);
        };

        let mut attempt = ResetAttempt::NoPendingCode;
        let stored = Self::update_record(
            &self.password_reset_codes,
            &keys::reset_code_key(user_id, &pending.id),
            "reset_code",
            &pending.id,
            |code: &mut PasswordResetCode| attempt = code.redeem(code_hash, now),
        );
        match stored {
            Ok(code) => {
                let locked_now = code.status == ResetCodeStatus::Locked
                    && matches!(attempt, ResetAttempt::Rejected { .. });
                if locked_now {
                    tracing::warn!(user_id, code_id = %code.id, "Reset code locked after too many attempts");
                }
                Ok(attempt)
            }
            // Replaced by a newer code in the meantime.
            Err(StoreError::NotFound { .. }) => Ok(ResetAttempt::NoPendingCode),
            Err(e) => Err(e),
        }
    }

    /// Removes every code past its expiry, whatever its status.
    pub fn cleanup_expired_reset_codes(&self) -> Result<u32, StoreError> {
        let now = Utc::now();
        let mut expired_keys = Vec::new();
        for item in self.password_reset_codes.iter() {
            let (k, v) = item?;
            match Self::deserialize::<PasswordResetCode>(&v) {
                Ok(code) if code.is_expired(now) => expired_keys.push(k),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable reset code"),
            }
        }

        let count = expired_keys.len() as u32;
        for key in expired_keys {
            self.password_reset_codes.remove(key)?;
        }
        Ok(count)
    }
}
