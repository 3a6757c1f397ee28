//! Authentication service for login, token issuing and credential checks

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{default_permissions, Role};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::WarehouseStore;
use crate::AppState;

/// Checks a plaintext password against a stored hash
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, password: &str, password_hash: &str) -> AppResult<bool>;
}

/// bcrypt password verification
#[derive(Debug, Default, Clone, Copy)]
pub struct BcryptVerifier;

impl CredentialVerifier for BcryptVerifier {
    fn verify(&self, password: &str, password_hash: &str) -> AppResult<bool> {
        bcrypt::verify(password, password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub role: Role,
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Access token returned by login
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user_id: Uuid,
    pub role: Role,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn WarehouseStore>,
    verifier: Arc<dyn CredentialVerifier>,
    jwt_secret: String,
    access_token_expiry: i64,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            verifier: state.verifier.clone(),
            jwt_secret: state.config.jwt.secret.clone(),
            access_token_expiry: state.config.jwt.access_token_expiry,
        }
    }

    /// Authenticate user with email and password
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthTokens> {
        let user = self
            .store
            .find_user_by_email(email.trim())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active {
            tracing::info!(user_id = %user.id, "Login attempt for disabled account");
            return Err(AppError::InvalidCredentials);
        }

        if !self.verifier.verify(password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        let access_token = self.issue_token(user.id, user.role)?;
        tracing::info!(user_id = %user.id, role = user.role.as_str(), "User logged in");

        Ok(AuthTokens {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
            user_id: user.id,
            role: user.role,
        })
    }

    /// Sign an access token carrying the role's permissions
    pub fn issue_token(&self, user_id: Uuid, role: Role) -> AppResult<String> {
        issue_token(&self.jwt_secret, self.access_token_expiry, user_id, role)
    }

    /// Validate access token and return claims
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        validate_token(&self.jwt_secret, token)
    }
}

pub(crate) fn issue_token(secret: &str, expiry_seconds: i64, user_id: Uuid, role: Role) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        permissions: default_permissions(role),
        exp: (now + Duration::seconds(expiry_seconds)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

pub(crate) fn validate_token(secret: &str, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })
}
