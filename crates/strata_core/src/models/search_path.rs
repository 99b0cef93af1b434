//! Search path value type.

use std::fmt;

/// An ordered, duplicate-free list of schema names.
///
/// Rendered comma-joined without spaces, which is the form both PostgreSQL
/// and the schema registry accept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    components: Vec<String>,
}

impl SearchPath {
    /// Create an empty search path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated path. Components are trimmed; blanks and
    /// repeats are dropped, keeping the first occurrence.
    pub fn parse(path: &str) -> Self {
        let mut search_path = Self::new();
        for component in split_components(path) {
            search_path.push(component);
        }
        search_path
    }

    /// Append a component unless it is blank or already present.
    pub fn push(&mut self, component: impl Into<String>) {
        let component = component.into();
        let trimmed = component.trim();
        if trimmed.is_empty() || self.contains(trimmed) {
            return;
        }
        self.components.push(trimmed.to_string());
    }

    /// Append every component of another path not already present.
    pub fn extend<I, S>(&mut self, components: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for component in components {
            self.push(component);
        }
    }

    /// Check whether a component is present.
    pub fn contains(&self, component: &str) -> bool {
        self.components.iter().any(|c| c == component)
    }

    /// The components in order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if the path has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join(","))
    }
}

impl From<SearchPath> for Vec<String> {
    fn from(path: SearchPath) -> Self {
        path.components
    }
}

/// Split a comma-separated path into trimmed, non-empty components.
pub fn split_components(path: &str) -> impl Iterator<Item = &str> {
    path.split(',').map(str::trim).filter(|c| !c.is_empty())
}
