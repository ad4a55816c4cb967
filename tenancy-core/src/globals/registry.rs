use std::collections::HashMap;

use super::GlobalConfig;

/// Names a global is known by outside the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalNames {
    /// Hidden per-tenant collection, `<slug>Globals`.
    pub collection: String,
    /// Top-level GraphQL query field for the global.
    pub type_name: String,
}

/// Global slug -> names, built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct GlobalRegistry {
    names: HashMap<String, GlobalNames>,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_globals<'a, I>(globals: I) -> Self
    where
        I: IntoIterator<Item = &'a GlobalConfig>,
    {
        let mut registry = Self::new();
        for global in globals {
            registry.register(global);
        }
        registry
    }

    pub fn register(&mut self, global: &GlobalConfig) {
        let names = GlobalNames {
            collection: global.collection_slug(),
            type_name: global
                .graphql_name
                .clone()
                .unwrap_or_else(|| pascal_case(&global.slug)),
        };
        self.names.insert(global.slug.clone(), names);
    }

    pub fn get(&self, slug: &str) -> Option<&GlobalNames> {
        self.names.get(slug)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// `site-settings` / `site_settings` / `siteSettings` -> `SiteSettings`.
pub fn pascal_case(slug: &str) -> String {
    slug.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
