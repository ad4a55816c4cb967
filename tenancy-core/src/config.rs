//! # Tenancy configuration
//!
//! A string key/value store in the style of Feathers' `app.set()` /
//! `app.get()`, plus the typed [`TenancyOptions`] read out of it.
//!
//! ```rust
//! use tenancy_core::{IsolationStrategy, TenancyConfig};
//!
//! let mut config = TenancyConfig::new();
//! config.set("isolation.strategy", "domain");
//! config.set("shared.collections", "media, pages");
//!
//! let options = config.options().unwrap();
//! assert_eq!(options.isolation_strategy, IsolationStrategy::Domain);
//! assert_eq!(options.shared_collections, vec!["media", "pages"]);
//! ```
//!
//! ## Environment overrides
//! [`TenancyConfig::from_env`] strips a prefix and maps `__` to `.`:
//!
//! ```bash
//! export TENANCY__ISOLATION__STRATEGY=path   # isolation.strategy
//! export TENANCY__TREE__MAX_DEPTH=16         # tree.max_depth
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{TenancyError, TenancyResult};

#[derive(Debug, Clone, Default)]
pub struct TenancyConfig {
    values: HashMap<String, String>,
}

impl TenancyConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Collect every `<prefix>SECTION__KEY` variable as `section.key`.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(std::env::vars(), prefix)
    }

    pub fn from_vars<I>(vars: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::new();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                config.set(stripped.to_lowercase().replace("__", "."), value);
            }
        }
        config
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    /// Comma separated list, blanks dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Typed tenancy options. Unset keys take their defaults.
    pub fn options(&self) -> TenancyResult<TenancyOptions> {
        let defaults = TenancyOptions::default();

        let isolation_strategy = match self.get("isolation.strategy") {
            Some(raw) => raw.parse()?,
            None => defaults.isolation_strategy,
        };
        let max_tree_depth = match self.get("tree.max_depth") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                TenancyError::bad_request(format!("tree.max_depth must be a positive integer, got '{raw}'"))
                    .into_anyhow()
            })?,
            None => defaults.max_tree_depth,
        };

        Ok(TenancyOptions {
            isolation_strategy,
            tenant_collection: self
                .get("tenant.collection")
                .map(String::from)
                .unwrap_or(defaults.tenant_collection),
            shared_collections: self.get_list("shared.collections"),
            shared_globals: self.get_list("shared.globals"),
            admin_route: self
                .get("routes.admin")
                .map(String::from)
                .unwrap_or(defaults.admin_route),
            api_route: self
                .get("routes.api")
                .map(String::from)
                .unwrap_or(defaults.api_route),
            server_url: self
                .get("server.url")
                .map(String::from)
                .unwrap_or(defaults.server_url),
            max_tree_depth,
        })
    }
}

/// How an inbound request is bound to a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationStrategy {
    /// `/{tenantSlug}/...` prefix.
    #[default]
    Path,
    /// The request hostname.
    Domain,
    /// The authenticated user's tenant; nothing is bound per request.
    User,
}

impl IsolationStrategy {
    /// Path and domain bind a tenant per request and scope by the tenant tree.
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, IsolationStrategy::Path | IsolationStrategy::Domain)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationStrategy::Path => "path",
            IsolationStrategy::Domain => "domain",
            IsolationStrategy::User => "user",
        }
    }
}

impl fmt::Display for IsolationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "path" => Ok(IsolationStrategy::Path),
            "domain" => Ok(IsolationStrategy::Domain),
            "user" => Ok(IsolationStrategy::User),
            other => Err(TenancyError::bad_request(format!(
                "Unknown isolation strategy '{other}' (expected path, domain or user)"
            ))
            .into_anyhow()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TenancyOptions {
    pub isolation_strategy: IsolationStrategy,
    pub tenant_collection: String,
    /// Collections left out of tenant scoping.
    pub shared_collections: Vec<String>,
    /// Globals left as true singletons.
    pub shared_globals: Vec<String>,
    pub admin_route: String,
    pub api_route: String,
    /// Prefix for rewritten upload URLs.
    pub server_url: String,
    /// Upper bound on tenant tree levels walked by the authorized set resolver.
    pub max_tree_depth: usize,
}

impl Default for TenancyOptions {
    fn default() -> Self {
        Self {
            isolation_strategy: IsolationStrategy::Path,
            tenant_collection: "tenants".to_string(),
            shared_collections: Vec::new(),
            shared_globals: Vec::new(),
            admin_route: "/admin".to_string(),
            api_route: "/api".to_string(),
            server_url: String::new(),
            max_tree_depth: 64,
        }
    }
}

impl TenancyOptions {
    pub fn new(isolation_strategy: IsolationStrategy) -> Self {
        Self {
            isolation_strategy,
            ..Self::default()
        }
    }

    pub fn is_shared_collection(&self, slug: &str) -> bool {
        self.shared_collections.iter().any(|s| s == slug)
    }

    pub fn is_shared_global(&self, slug: &str) -> bool {
        self.shared_globals.iter().any(|s| s == slug)
    }

    pub fn validate(&self) -> TenancyResult<()> {
        if self.tenant_collection.trim().is_empty() {
            crate::bail_tenancy!(bad_request, "tenant collection must not be empty");
        }
        if self.is_shared_collection(&self.tenant_collection) {
            crate::bail_tenancy!(
                bad_request,
                "tenant collection '{}' cannot be shared",
                self.tenant_collection
            );
        }
        if !self.admin_route.starts_with('/') || self.admin_route.len() < 2 {
            crate::bail_tenancy!(
                bad_request,
                "admin route must be an absolute path, got '{}'",
                self.admin_route
            );
        }
        if !self.api_route.starts_with('/') {
            crate::bail_tenancy!(bad_request, "api route must start with '/', got '{}'", self.api_route);
        }
        if self.max_tree_depth == 0 {
            crate::bail_tenancy!(bad_request, "tree.max_depth must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_are_lowercased_and_dotted() {
        let vars = vec![
            ("TENANCY__ISOLATION__STRATEGY".to_string(), "user".to_string()),
            ("TENANCY__TENANT__COLLECTION".to_string(), "orgs".to_string()),
            ("OTHER__VALUE".to_string(), "x".to_string()),
        ];
        let config = TenancyConfig::from_vars(vars, "TENANCY__");
        assert_eq!(config.get("isolation.strategy"), Some("user"));
        assert!(!config.has("other.value"));

        let options = config.options().unwrap();
        assert_eq!(options.isolation_strategy, IsolationStrategy::User);
        assert_eq!(options.tenant_collection, "orgs");
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let mut config = TenancyConfig::new();
        config.set("isolation.strategy", "subdomain");
        assert!(config.options().is_err());
    }

    #[test]
    fn shared_tenant_collection_fails_validation() {
        let options = TenancyOptions {
            shared_collections: vec!["tenants".into()],
            ..TenancyOptions::default()
        };
        assert!(options.validate().is_err());
        assert!(TenancyOptions::default().validate().is_ok());
    }
}
