//! Container options.
//!
//! Options are fixed when the container is built. They can be set in code,
//! read from prefixed environment variables, or, with the `config` feature,
//! deserialized from JSON.

use std::env;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::analyzer::DEFAULT_CACHE_CAPACITY;
use crate::error::{DiError, DiResult};
use crate::generics::AmbiguityPolicy;
use crate::scopes::{ScopeHierarchy, DEFAULT_HIERARCHY};

/// Default maximum resolution depth.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Tunables of a container.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{AmbiguityPolicy, ContainerOptions};
///
/// let options = ContainerOptions::default()
///     .with_max_depth(64)
///     .with_generic_ambiguity(AmbiguityPolicy::FirstRegistered)
///     .with_extra_scope("tenant");
///
/// assert_eq!(options.max_depth, 64);
/// assert!(options.scope_hierarchy().is_valid("tenant"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerOptions {
    /// Longest chain of nested resolutions before failing
    pub max_depth: usize,
    /// Number of analyzer decisions kept, FIFO evicted
    pub analyzer_cache_capacity: usize,
    pub generic_ambiguity: AmbiguityPolicy,
    /// Replace an existing registration instead of failing
    pub allow_override: bool,
    /// Scope names ordered from longest-lived to shortest-lived
    pub scope_hierarchy: Vec<String>,
    /// Additional accepted scope names, outside the ordering
    pub extra_scopes: Vec<String>,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        ContainerOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            analyzer_cache_capacity: DEFAULT_CACHE_CAPACITY,
            generic_ambiguity: AmbiguityPolicy::Error,
            allow_override: false,
            scope_hierarchy: DEFAULT_HIERARCHY.iter().map(|s| s.to_string()).collect(),
            extra_scopes: Vec::new(),
        }
    }
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_analyzer_cache_capacity(mut self, capacity: usize) -> Self {
        self.analyzer_cache_capacity = capacity;
        self
    }

    pub fn with_generic_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.generic_ambiguity = policy;
        self
    }

    pub fn with_allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    pub fn with_scope_hierarchy<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope_hierarchy = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra_scope(mut self, name: impl Into<String>) -> Self {
        self.extra_scopes.push(name.into());
        self
    }

    /// The hierarchy described by these options.
    pub fn scope_hierarchy(&self) -> ScopeHierarchy {
        let mut hierarchy = ScopeHierarchy::new(self.scope_hierarchy.iter().cloned());
        for scope in &self.extra_scopes {
            hierarchy.register_scope(scope.clone());
        }
        hierarchy
    }

    /// Checks the options for values the container cannot work with.
    pub fn validate(&self) -> DiResult<()> {
        if self.max_depth == 0 {
            return Err(DiError::configuration("max_depth must be at least 1"));
        }
        if self.scope_hierarchy.is_empty() {
            return Err(DiError::configuration("scope hierarchy must not be empty"));
        }
        let mut seen = std::collections::HashSet::new();
        for scope in &self.scope_hierarchy {
            if !seen.insert(scope.as_str()) {
                return Err(DiError::configuration(format!(
                    "scope '{}' appears twice in the hierarchy",
                    scope
                )));
            }
        }
        Ok(())
    }

    /// Overlays values from `<PREFIX>_MAX_DEPTH`, `<PREFIX>_ANALYZER_CACHE_CAPACITY`,
    /// `<PREFIX>_ALLOW_OVERRIDE`, `<PREFIX>_GENERIC_AMBIGUITY` (`error` or
    /// `first_registered`) and `<PREFIX>_EXTRA_SCOPES` (comma separated).
    ///
    /// Unset variables keep their defaults; malformed ones are a configuration error.
    pub fn from_env(prefix: &str) -> DiResult<Self> {
        let var = |name: &str| env::var(format!("{}_{}", prefix.to_uppercase(), name)).ok();
        let mut options = Self::default();
        if let Some(raw) = var("MAX_DEPTH") {
            options.max_depth = parse_number("MAX_DEPTH", &raw)?;
        }
        if let Some(raw) = var("ANALYZER_CACHE_CAPACITY") {
            options.analyzer_cache_capacity = parse_number("ANALYZER_CACHE_CAPACITY", &raw)?;
        }
        if let Some(raw) = var("ALLOW_OVERRIDE") {
            options.allow_override = matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }
        if let Some(raw) = var("GENERIC_AMBIGUITY") {
            options.generic_ambiguity = match raw.to_lowercase().as_str() {
                "error" => AmbiguityPolicy::Error,
                "first_registered" => AmbiguityPolicy::FirstRegistered,
                other => {
                    return Err(DiError::configuration(format!(
                        "GENERIC_AMBIGUITY must be 'error' or 'first_registered', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(raw) = var("EXTRA_SCOPES") {
            options
                .extra_scopes
                .extend(raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
        }
        tracing::debug!(prefix, ?options, "container options loaded from environment");
        options.validate()?;
        Ok(options)
    }

    /// Parses options from JSON; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> DiResult<Self> {
        let options: ContainerOptions = serde_json::from_str(json)
            .map_err(|e| DiError::configuration(format!("invalid container options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    #[cfg(feature = "config")]
    pub fn to_json_string(&self) -> DiResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DiError::configuration(format!("cannot serialize container options: {}", e)))
    }
}

fn parse_number(name: &str, raw: &str) -> DiResult<usize> {
    raw.trim()
        .parse()
        .map_err(|_| DiError::configuration(format!("{} must be a non-negative integer, got '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_documented_values() {
        let options = ContainerOptions::default();
        assert_eq!(options.max_depth, 1024);
        assert_eq!(options.analyzer_cache_capacity, 1000);
        assert_eq!(options.generic_ambiguity, AmbiguityPolicy::Error);
        assert!(!options.allow_override);
        assert_eq!(options.scope_hierarchy, ["singleton", "session", "request", "default", "transient"]);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn duplicate_scope_is_rejected() {
        let options = ContainerOptions::default().with_scope_hierarchy(["singleton", "request", "request"]);
        assert!(options.validate().unwrap_err().is_configuration_error());
    }

    #[test]
    #[serial]
    fn environment_overlays_defaults() {
        env::set_var("IOCTEST_MAX_DEPTH", "32");
        env::set_var("IOCTEST_GENERIC_AMBIGUITY", "first_registered");
        env::set_var("IOCTEST_EXTRA_SCOPES", "tenant, job");
        let options = ContainerOptions::from_env("ioctest").unwrap();
        env::remove_var("IOCTEST_MAX_DEPTH");
        env::remove_var("IOCTEST_GENERIC_AMBIGUITY");
        env::remove_var("IOCTEST_EXTRA_SCOPES");

        assert_eq!(options.max_depth, 32);
        assert_eq!(options.generic_ambiguity, AmbiguityPolicy::FirstRegistered);
        assert_eq!(options.extra_scopes, ["tenant", "job"]);
        assert!(options.scope_hierarchy().is_valid("job"));
    }

    #[test]
    #[serial]
    fn malformed_environment_value_fails() {
        env::set_var("IOCBAD_MAX_DEPTH", "deep");
        let err = ContainerOptions::from_env("iocbad").unwrap_err();
        env::remove_var("IOCBAD_MAX_DEPTH");
        assert!(err.is_configuration_error());
    }

    #[cfg(feature = "config")]
    #[test]
    fn json_fills_missing_fields() {
        let options = ContainerOptions::from_json_str(r#"{"max_depth": 8, "generic_ambiguity": "first_registered"}"#)
            .unwrap();
        assert_eq!(options.max_depth, 8);
        assert_eq!(options.generic_ambiguity, AmbiguityPolicy::FirstRegistered);
        assert_eq!(options.analyzer_cache_capacity, 1000);
    }
}
