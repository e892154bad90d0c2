//! Unified error types for Agendamed.

use thiserror::Error;

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or out-of-policy input. Always client-correctable.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced appointment, doctor, or blocked date does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authenticated but unauthorized actor.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Slot already booked, date already blocked, date not blocked on cancel.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Mailer error: {0}")]
    Mailer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    /// HTTP status the out-of-scope transport layer should map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Config(_) => 400,
            Self::NotFound(_) => 404,
            Self::Forbidden(_) => 403,
            Self::Conflict(_) => 409,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::Conflict("This time slot is already booked".into());
        assert!(err.to_string().contains("already booked"));
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(AppError::validation("x"), AppError::Validation(_)));
        assert!(matches!(AppError::not_found("x"), AppError::NotFound(_)));
        assert!(matches!(AppError::forbidden("x"), AppError::Forbidden(_)));
        assert!(matches!(AppError::conflict("x"), AppError::Conflict(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::validation("x").status_code(), 400);
        assert_eq!(AppError::not_found("x").status_code(), 404);
        assert_eq!(AppError::forbidden("x").status_code(), 403);
        assert_eq!(AppError::conflict("x").status_code(), 409);
        assert_eq!(AppError::database("x").status_code(), 500);
        assert_eq!(AppError::queue("x").status_code(), 500);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AppError = io_err.into();
        assert!(matches!(err, AppError::Io(_)));
        assert_eq!(err.status_code(), 500);
    }
}
