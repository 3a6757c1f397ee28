//! Error handling for the warehouse engine
//!
//! Provides consistent error responses in English and Russian

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Re-authentication for a privileged action failed. Never says
    /// anything about the entities involved.
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Re-authentication required")]
    ReauthenticationRequired,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_ru: String,
    },

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_ru: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Quantity {current} cannot change by {delta}")]
    InvalidQuantity { current: i32, delta: i32 },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>, message_ru: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
            message_ru: message_ru.into(),
        }
    }

    pub fn conflict(resource: &str, message: impl Into<String>, message_ru: impl Into<String>) -> Self {
        AppError::Conflict {
            resource: resource.to_string(),
            message: message.into(),
            message_ru: message_ru.into(),
        }
    }

    /// Storage failure that rolled back the whole transaction and is safe
    /// to run again (serialization failure, deadlock)
    pub fn is_retryable_conflict(&self) -> bool {
        match self {
            AppError::DatabaseError(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }

    /// Connection-level failure worth one more attempt for a read
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Protocol(_)
            )
        )
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => AppError::Validation {
                message_ru: format!("Некорректное значение поля {}", field),
                field,
                message,
            },
            DomainError::InvalidQuantity { current, delta } => {
                AppError::InvalidQuantity { current, delta }
            }
            e @ DomainError::InvalidStateTransition { .. } => {
                AppError::InvalidStateTransition(e.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("input".to_string(), "Invalid input".to_string()));
        AppError::Validation {
            message_ru: format!("Некорректное значение поля {}", field),
            field,
            message,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_ru: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    fn new(code: &str, message_en: impl Into<String>, message_ru: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_ru: message_ru.into(),
            field: None,
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(
                    "INVALID_CREDENTIALS",
                    "Invalid email or password",
                    "Неверный email или пароль",
                ),
            ),
            AppError::AuthenticationFailed => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(
                    "AUTHENTICATION_FAILED",
                    "Password confirmation failed",
                    "Неверный пароль",
                ),
            ),
            AppError::ReauthenticationRequired => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "REAUTHENTICATION_REQUIRED",
                    "This action requires an administrator password",
                    "Для этого действия требуется пароль администратора",
                ),
            ),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("TOKEN_EXPIRED", "Token has expired", "Срок действия токена истек"),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", "Invalid token", "Недействительный токен"),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                    "Недостаточно прав для выполнения действия",
                ),
            ),
            AppError::Validation {
                field,
                message,
                message_ru,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_ru.clone())
                    .with_field(field),
            ),
            AppError::Conflict {
                resource,
                message,
                message_ru,
            } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone(), message_ru.clone())
                    .with_field(resource),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "NOT_FOUND",
                    format!("{} not found", resource),
                    format!("{}: не найдено", resource),
                ),
            ),
            AppError::InvalidQuantity { current, delta } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INVALID_QUANTITY",
                    format!(
                        "Changing stock of {} by {} would make it negative",
                        current, delta
                    ),
                    format!(
                        "Остаток {} нельзя изменить на {}: он станет отрицательным",
                        current, delta
                    ),
                )
                .with_field("delta"),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INVALID_STATE_TRANSITION",
                    msg.clone(),
                    format!("Недопустимое изменение статуса: {}", msg),
                ),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new(
                    "STORAGE_ERROR",
                    "The warehouse is temporarily unavailable, please try again",
                    "Склад временно недоступен, попробуйте еще раз",
                ),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred",
                    "Внутренняя ошибка сервера",
                ),
            ),
        };

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
