// ⚠️ Error Types - One error enum for the whole library
//
// Every failure is terminal for the operation that raised it: no retries,
// no partial results. Binaries wrap these in anyhow at the top level.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    /// Query or mutation against the data store failed
    #[error("Database error: {0}")]
    Database(String),

    /// Input rejected before any mutation was attempted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing, malformed, forged or expired admin token
    #[error("{0}")]
    Unauthorized(String),

    /// Valid token, but the role may not perform the operation
    #[error("{0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Spreadsheet/report generation failed
    #[error("Export error: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Encoding a result as JSON failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AdminError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AdminError::Database(_) => 500,
            AdminError::Validation(_) => 422,
            AdminError::Unauthorized(_) => 401,
            AdminError::Forbidden(_) => 403,
            AdminError::BadRequest(_) => 400,
            AdminError::NotFound(_) => 404,
            AdminError::Export(_) => 500,
            AdminError::Config(_) => 500,
            AdminError::Serialization(_) => 500,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AdminError::Validation(message.into())
    }

    /// Message without the category prefix, for JSON error bodies
    pub fn message(&self) -> &str {
        match self {
            AdminError::Database(m)
            | AdminError::Validation(m)
            | AdminError::Unauthorized(m)
            | AdminError::Forbidden(m)
            | AdminError::BadRequest(m)
            | AdminError::NotFound(m)
            | AdminError::Export(m)
            | AdminError::Config(m)
            | AdminError::Serialization(m) => m,
        }
    }
}

impl From<rusqlite::Error> for AdminError {
    fn from(err: rusqlite::Error) -> Self {
        AdminError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        AdminError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for AdminError {
    fn from(err: csv::Error) -> Self {
        AdminError::Export(err.to_string())
    }
}

impl From<std::io::Error> for AdminError {
    fn from(err: std::io::Error) -> Self {
        AdminError::Export(err.to_string())
    }
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AdminError::Unauthorized("Admin token expired".into()).status_code(), 401);
        assert_eq!(AdminError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(AdminError::Database("x".into()).status_code(), 500);
        assert_eq!(AdminError::validation("Title is required").status_code(), 422);
        assert_eq!(AdminError::Forbidden("Super admin access required".into()).status_code(), 403);
    }

    #[test]
    fn test_unauthorized_message_is_bare() {
        let err = AdminError::Unauthorized("Invalid admin token".into());
        assert_eq!(err.to_string(), "Invalid admin token");
    }

    #[test]
    fn test_rusqlite_error_maps_to_database() {
        let err: AdminError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, AdminError::Database(_)));
    }

    #[test]
    fn test_json_encoding_error_is_server_side() {
        let bad_key: std::collections::HashMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        let err: AdminError = serde_json::to_value(&bad_key).unwrap_err().into();
        assert!(matches!(err, AdminError::Serialization(_)));
        assert_eq!(err.status_code(), 500);
    }
}
