//! Error types for tenant schema management.
//!
//! Domain failures (naming, existence) are distinct variants so callers can
//! match on them; driver failures keep their PostgreSQL details.

use std::process::ExitStatus;

use thiserror::Error;

/// SQLSTATE for `invalid_schema_name` ("schema ... does not exist").
const SQLSTATE_INVALID_SCHEMA_NAME: &str = "3F000";

/// SQLSTATE for `undefined_table` ("relation ... does not exist").
const SQLSTATE_UNDEFINED_TABLE: &str = "42P01";

/// Main error type for strata.
#[derive(Debug, Error)]
pub enum StrataError {
    /// The candidate schema name does not match the identifier grammar.
    #[error("Invalid schema name \"{name}\": {reason}")]
    InvalidSchemaName {
        /// The rejected input.
        name: String,
        /// Which rule was violated.
        reason: String,
    },

    /// The candidate schema name collides with a reserved identifier.
    #[error("The schema name \"{name}\" is reserved")]
    ReservedName {
        /// The rejected input.
        name: String,
    },

    /// A schema with this name already exists.
    #[error("The schema \"{name}\" already exists")]
    SchemaExists {
        /// Suffixed schema name.
        name: String,
    },

    /// One or more schemas could not be found.
    #[error("The schema \"{name}\" cannot be found")]
    SchemaNotFound {
        /// Schema name or search path that was looked up.
        name: String,
        /// Driver error that signalled the absence, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A required argument was missing or malformed.
    #[error("{message}")]
    Argument {
        /// Human-readable error message.
        message: String,
    },

    /// An external client process exited unsuccessfully.
    #[error("Command `{program}` failed: {status}")]
    CommandFailed {
        /// Binary that failed (e.g. "pg_dump").
        program: String,
        /// Exit status as reported by the OS.
        status: ExitStatus,
    },

    /// Query execution error with PostgreSQL-specific details.
    #[error("{message}")]
    Query {
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// Position in query (1-indexed).
        position: Option<usize>,
        /// PostgreSQL error code (e.g., "42P01").
        code: Option<String>,
    },

    /// Database connection failed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// I/O error while spawning or feeding an external process, or reading files.
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable error message.
        message: String,
        /// Underlying error source.
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

impl StrataError {
    // ========== Constructors ==========

    /// Create an invalid schema name error.
    pub fn invalid_schema_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchemaName { name: name.into(), reason: reason.into() }
    }

    /// Create a reserved name error.
    pub fn reserved_name(name: impl Into<String>) -> Self {
        Self::ReservedName { name: name.into() }
    }

    /// Create a schema exists error.
    pub fn schema_exists(name: impl Into<String>) -> Self {
        Self::SchemaExists { name: name.into() }
    }

    /// Create a schema not found error.
    pub fn schema_not_found(name: impl Into<String>) -> Self {
        Self::SchemaNotFound { name: name.into(), source: None }
    }

    /// Create a schema not found error wrapping the driver error that caused it.
    pub fn schema_not_found_with_source(name: impl Into<String>, source: StrataError) -> Self {
        Self::SchemaNotFound { name: name.into(), source: Some(Box::new(source)) }
    }

    /// Create an argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument { message: message.into() }
    }

    /// Create a command failed error.
    pub fn command_failed(program: impl Into<String>, status: ExitStatus) -> Self {
        Self::CommandFailed { program: program.into(), status }
    }

    /// Create a new query error with full PostgreSQL details.
    pub fn query(
        message: impl Into<String>,
        detail: Option<String>,
        hint: Option<String>,
        position: Option<usize>,
        code: Option<String>,
    ) -> Self {
        Self::Query { message: message.into(), detail, hint, position, code }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an I/O error with context.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { message: message.into(), source }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    // ========== Methods ==========

    /// Check if this is a driver error saying a schema or relation does not exist.
    pub fn is_missing_relation(&self) -> bool {
        match self {
            Self::Query { code: Some(code), .. } => {
                code == SQLSTATE_INVALID_SCHEMA_NAME || code == SQLSTATE_UNDEFINED_TABLE
            }
            Self::Query { message, code: None, .. } => message.contains("does not exist"),
            _ => false,
        }
    }

    /// Check if this error means the schema was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SchemaNotFound { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidSchemaName { .. } | Self::ReservedName { .. } => "Schema name",
            Self::SchemaExists { .. } | Self::SchemaNotFound { .. } => "Schema",
            Self::Argument { .. } => "Argument",
            Self::CommandFailed { .. } => "Command",
            Self::Query { .. } => "Query",
            Self::Connection { .. } => "Connection",
            Self::Config { .. } => "Config",
            Self::Io { .. } => "I/O",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the caller.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::InvalidSchemaName { .. } => {
                Some("Use letters, digits and underscores, starting with a letter or underscore")
            }
            Self::ReservedName { .. } => Some("Pick another name or pass force to override"),
            Self::SchemaNotFound { .. } => Some("Create the schema before switching to it"),
            Self::CommandFailed { .. } => {
                Some("The target schema may be empty or incomplete; drop it before retrying")
            }
            Self::Query { hint, .. } => hint.as_deref(),
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::Internal { .. } => Some("Please report this issue"),
            _ => None,
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to StrataError.
impl From<tokio_postgres::Error> for StrataError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code();

            // Connection exceptions (08xxx)
            if code.starts_with("08") {
                return StrataError::Connection {
                    message: db_err.message().to_string(),
                    source: Some(Box::new(err)),
                };
            }

            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });

            return StrataError::Query {
                message: db_err.message().to_string(),
                detail: db_err.detail().map(String::from),
                hint: db_err.hint().map(String::from),
                position,
                code: Some(code.to_string()),
            };
        }

        if err.is_closed() {
            return StrataError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        StrataError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from std::io::Error to StrataError.
impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        StrataError::Io { message: err.to_string(), source: err }
    }
}

/// Convert from serde_json::Error to StrataError.
impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Config { message: format!("JSON error: {err}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_relation_by_code() {
        let err = StrataError::query(
            "schema \"acme\" does not exist",
            None,
            None,
            None,
            Some("3F000".into()),
        );
        assert!(err.is_missing_relation());

        let err = StrataError::query(
            "relation \"users\" does not exist",
            None,
            None,
            Some(15),
            Some("42P01".into()),
        );
        assert!(err.is_missing_relation());

        let err = StrataError::query("permission denied", None, None, None, Some("42501".into()));
        assert!(!err.is_missing_relation());
    }

    #[test]
    fn test_missing_relation_by_message() {
        let err = StrataError::query("relation \"users\" does not exist", None, None, None, None);
        assert!(err.is_missing_relation());
        assert!(!StrataError::schema_not_found("acme").is_missing_relation());
    }

    #[test]
    fn test_category_and_hint() {
        let err = StrataError::schema_not_found("acme");
        assert_eq!(err.category(), "Schema");
        assert!(err.hint().is_some());
        assert!(err.is_not_found());

        let err = StrataError::argument("database must be supplied");
        assert_eq!(err.to_string(), "database must be supplied");
        assert_eq!(err.hint(), None);
    }
}
