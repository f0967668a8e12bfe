use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{request::Parts, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{MAX_SESSIONS_PER_USER, RESET_CODE_DIGITS};
use crate::response::AppError;
use crate::state::AppState;
use crate::store::operations::sessions::Session;
use crate::store::operations::users::UserRole;

const TOKEN_TYPE_USER: &str = "user";

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|v| v.to_string())
        .map_err(|e| AppError::internal(&format!("password hash failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::internal(&format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Verified against when the email is unknown so both login paths cost one
/// argon2 run.
pub fn dummy_password_hash() -> &'static str {
    "$argon2id$v=19$m=19456,t=2,p=1$ZHVtbXlzYWx0ZHVtbXk$YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXoxMjM0NTY"
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Zero-padded numeric code, `RESET_CODE_DIGITS` long.
pub fn generate_reset_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let upper = 10u32.pow(RESET_CODE_DIGITS);
    format!(
        "{:0width$}",
        rng.gen_range(0..upper),
        width = RESET_CODE_DIGITS as usize
    )
}

/// Reset codes are short, so the hash is salted with the owner's id.
pub fn hash_reset_code(user_id: &str, code: &str) -> String {
    hash_token(&format!("{user_id}:{}", code.trim()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
}

pub fn sign_jwt_for_user(
    user_id: &str,
    secret: &str,
    expires_in_hours: u64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expires_in_hours as i64);
    let claims = Claims {
        sub: user_id.to_string(),
        token_type: TOKEN_TYPE_USER.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(&format!("jwt sign failed: {e}")))
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.algorithms = vec![Algorithm::HS256];

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::unauthorized("Invalid or expired token"))
}

/// Signs a token for `user_id` and records its session, evicting the
/// oldest sessions past the per-user cap.
pub fn issue_session_token(user_id: &str, state: &AppState) -> Result<String, AppError> {
    if let Err(e) = state
        .store()
        .cleanup_oldest_user_sessions(user_id, MAX_SESSIONS_PER_USER)
    {
        tracing::warn!(user_id, error = %e, "Failed to evict old sessions");
    }

    let hours = state.config().jwt_expires_in_hours;
    let token = sign_jwt_for_user(user_id, &state.config().jwt_secret, hours)?;
    let now = Utc::now();
    state.store().create_session(&Session {
        token_hash: hash_token(&token),
        user_id: user_id.to_string(),
        created_at: now,
        expires_at: now + Duration::hours(hours as i64),
        revoked: false,
    })?;
    Ok(token)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth_header| auth_header.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

fn extract_cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookie| {
            cookie.split(';').find_map(|part| {
                part.trim()
                    .strip_prefix(&format!("{cookie_name}="))
                    .map(str::to_string)
            })
        })
}

pub fn extract_token_from_headers(headers: &HeaderMap) -> Result<String, AppError> {
    extract_bearer_token(headers)
        .or_else(|| extract_cookie_token(headers, "token"))
        .ok_or_else(|| AppError::unauthorized("Missing bearer token"))
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// An authenticated user whose role is `admin`.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user_id: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = extract_token_from_headers(&parts.headers)?;
        let claims = verify_jwt(&token, &app_state.config().jwt_secret)?;

        if claims.token_type != TOKEN_TYPE_USER {
            return Err(AppError::unauthorized("Invalid token type"));
        }

        let session = app_state
            .store()
            .get_session(&hash_token(&token))?
            .ok_or_else(|| AppError::unauthorized("Session not found or expired"))?;

        if session.user_id != claims.sub {
            return Err(AppError::unauthorized("Session mismatch"));
        }

        let user = app_state
            .store()
            .get_user_by_id(&claims.sub)?
            .ok_or_else(|| AppError::unauthorized("User not found"))?;

        if !user.is_active {
            return Err(AppError::forbidden("Account is deactivated"));
        }

        Ok(AuthUser {
            user_id: user.id,
            role: user.role,
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::forbidden("Admin access required"));
        }
        Ok(AdminUser {
            user_id: user.user_id,
        })
    }
}
