//! Validated schema identifiers.

use serde::Serialize;
use std::fmt;

use crate::error::StrataError;

/// Longest identifier PostgreSQL keeps without truncation (NAMEDATALEN - 1).
pub const MAX_SCHEMA_NAME_LEN: usize = 63;

/// Names that can never be used for a tenant schema.
const RESERVED_NAMES: &[&str] = &["public", "information_schema"];

/// Prefix PostgreSQL reserves for system schemas.
const RESERVED_PREFIX: &str = "pg_";

/// A tenant schema name that has passed validation.
///
/// Names are trimmed and folded to lowercase, which is what PostgreSQL does
/// to unquoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SchemaName(String);

impl SchemaName {
    /// Validate the identifier grammar.
    ///
    /// Accepts ASCII letters, digits and underscores, starting with a letter or
    /// underscore, at most [`MAX_SCHEMA_NAME_LEN`] bytes.
    pub fn validate_format(raw: &str) -> Result<Self, StrataError> {
        let name = normalize(raw);

        if name.is_empty() {
            return Err(StrataError::invalid_schema_name(raw, "name must not be empty"));
        }
        if name.len() > MAX_SCHEMA_NAME_LEN {
            return Err(StrataError::invalid_schema_name(
                raw,
                format!("name must be at most {MAX_SCHEMA_NAME_LEN} characters"),
            ));
        }
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(StrataError::invalid_schema_name(raw, "name must not start with a digit"));
        }
        if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            return Err(StrataError::invalid_schema_name(
                raw,
                format!("character '{bad}' is not allowed"),
            ));
        }

        Ok(Self(name))
    }

    /// Reject names that collide with reserved identifiers.
    ///
    /// The configured suffix is stripped first, so `pg_foo_staging` is rejected
    /// just like `pg_foo`.
    pub fn validate_reserved(raw: &str, suffix: Option<&str>) -> Result<Self, StrataError> {
        let name = normalize(raw);
        let bare = match suffix.filter(|s| !s.is_empty()) {
            Some(suffix) => name.strip_suffix(&suffix.to_lowercase()).unwrap_or(&name),
            None => &name,
        };

        if is_reserved(bare) {
            return Err(StrataError::reserved_name(raw));
        }

        Ok(Self(name))
    }

    /// Full validation: format always, reserved words unless `force` is set.
    pub fn parse(raw: &str, suffix: Option<&str>, force: bool) -> Result<Self, StrataError> {
        let name = Self::validate_format(raw)?;
        if !force {
            Self::validate_reserved(name.as_str(), suffix)?;
        }
        Ok(name)
    }

    /// Borrow the normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SchemaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check whether a (suffix-stripped) name is reserved.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name) || name.starts_with(RESERVED_PREFIX)
}

/// Check whether a name belongs to PostgreSQL itself.
pub fn is_native_schema(name: &str) -> bool {
    name == "information_schema" || name.starts_with(RESERVED_PREFIX)
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}
