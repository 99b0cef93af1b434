//! Environment suffixes on schema names.
//!
//! Several deployments can share one cluster by appending a per-environment
//! suffix to every tenant schema (`acme` becomes `acme_staging`). Both
//! directions work per comma component, so whole search paths can be passed.

use crate::models::schema_name::is_native_schema;
use crate::models::search_path::split_components;
use crate::models::TenancyConfig;

/// Adds and strips the configured suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Suffixifier<'a> {
    suffix: Option<&'a str>,
}

impl<'a> Suffixifier<'a> {
    /// Create a suffixifier for an explicit suffix.
    pub fn new(suffix: Option<&'a str>) -> Self {
        Self { suffix: suffix.filter(|s| !s.is_empty()) }
    }

    /// Create a suffixifier from the configuration.
    pub fn from_config(config: &'a TenancyConfig) -> Self {
        Self::new(config.suffix())
    }

    /// The active suffix.
    pub fn suffix(&self) -> Option<&'a str> {
        self.suffix
    }

    /// Append the suffix to every component that should carry it.
    ///
    /// Idempotent: components already ending with the suffix are left alone.
    pub fn suffixify(&self, path: &str) -> String {
        let Some(suffix) = self.suffix else {
            return path.to_string();
        };
        if !path.contains(',') {
            return suffixify_one(path.trim(), suffix);
        }
        split_components(path).map(|c| suffixify_one(c, suffix)).collect::<Vec<_>>().join(",")
    }

    /// Strip a trailing suffix from every component that carries it.
    pub fn unsuffixify(&self, path: &str) -> String {
        let Some(suffix) = self.suffix else {
            return path.to_string();
        };
        if !path.contains(',') {
            return unsuffixify_one(path.trim(), suffix).to_string();
        }
        split_components(path).map(|c| unsuffixify_one(c, suffix)).collect::<Vec<_>>().join(",")
    }
}

fn suffixify_one(name: &str, suffix: &str) -> String {
    if name.is_empty() || name == "public" || is_user_schema(name) || is_native_schema(name) {
        return name.to_string();
    }
    if name.ends_with(suffix) {
        return name.to_string();
    }
    format!("{name}{suffix}")
}

fn unsuffixify_one<'n>(name: &'n str, suffix: &str) -> &'n str {
    name.strip_suffix(suffix).filter(|bare| !bare.is_empty()).unwrap_or(name)
}

/// The `$user` pseudo-schema, quoted or bare.
pub fn is_user_schema(name: &str) -> bool {
    name == "$user" || name == "\"$user\""
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUFFIX: Option<&str> = Some("_staging");

    #[test]
    fn test_without_suffix_is_identity() {
        let s = Suffixifier::new(None);
        assert_eq!(s.suffixify("acme"), "acme");
        assert_eq!(s.unsuffixify("acme_staging"), "acme_staging");
        assert_eq!(Suffixifier::new(Some("")).suffixify("acme"), "acme");
    }

    #[test]
    fn test_suffixify_single() {
        let s = Suffixifier::new(SUFFIX);
        assert_eq!(s.suffixify("acme"), "acme_staging");
        assert_eq!(s.suffixify("acme_staging"), "acme_staging");
        assert_eq!(s.suffixify("public"), "public");
        assert_eq!(s.suffixify(""), "");
        assert_eq!(s.suffixify("\"$user\""), "\"$user\"");
        assert_eq!(s.suffixify("pg_catalog"), "pg_catalog");
    }

    #[test]
    fn test_suffixify_path() {
        let s = Suffixifier::new(SUFFIX);
        assert_eq!(s.suffixify("acme, hstore,public"), "acme_staging,hstore_staging,public");
        assert_eq!(s.suffixify("\"$user\",public"), "\"$user\",public");
    }

    #[test]
    fn test_unsuffixify() {
        let s = Suffixifier::new(SUFFIX);
        assert_eq!(s.unsuffixify("acme_staging"), "acme");
        assert_eq!(s.unsuffixify("acme"), "acme");
        assert_eq!(s.unsuffixify("acme_staging,public"), "acme,public");
        // a name that is only the suffix is left alone
        assert_eq!(s.unsuffixify("_staging"), "_staging");
    }

    #[test]
    fn test_round_trip() {
        let s = Suffixifier::new(SUFFIX);
        for name in ["acme", "beta_corp", "t1", "acme,beta"] {
            assert_eq!(s.unsuffixify(&s.suffixify(name)), name);
            assert_eq!(s.suffixify(&s.unsuffixify(name)), s.suffixify(name));
        }
    }
}
