//! Secret and config records plus the default-context merge

use super::DEFAULT_CONTEXT_NAME;

/// Anything owned by a context and addressed by name
pub trait Entry {
    fn name(&self) -> &str;
    fn origin_context(&self) -> &str;
}

/// An encrypted secret, base64 encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub encoded_value: String,
    pub origin_context: String,
}

impl Secret {
    pub fn new(
        name: impl Into<String>,
        encoded_value: impl Into<String>,
        origin_context: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            encoded_value: encoded_value.into(),
            origin_context: origin_context.into(),
        }
    }
}

impl Entry for Secret {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin_context(&self) -> &str {
        &self.origin_context
    }
}

/// A plain config value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub name: String,
    pub value: String,
    pub origin_context: String,
}

impl Config {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        origin_context: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            origin_context: origin_context.into(),
        }
    }
}

impl Entry for Config {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin_context(&self) -> &str {
        &self.origin_context
    }
}

/// Entries declared by `context`, in insertion order
pub(crate) fn by_context<'a, T: Entry>(items: &'a [T], context: &str) -> Vec<&'a T> {
    items
        .iter()
        .filter(|item| item.origin_context() == context)
        .collect()
}

/// Entries of `selected` followed by every default entry it does not shadow.
///
/// Matching is by exact name. Order follows insertion, never alphabetical.
pub(crate) fn merged<'a, T: Entry>(items: &'a [T], selected: &str) -> Vec<&'a T> {
    let defaults = by_context(items, DEFAULT_CONTEXT_NAME);
    if selected == DEFAULT_CONTEXT_NAME {
        return defaults;
    }

    let mut result = by_context(items, selected);
    let inherited: Vec<&T> = defaults
        .into_iter()
        .filter(|item| !result.iter().any(|own| own.name() == item.name()))
        .collect();
    result.extend(inherited);
    result
}

/// Entries sorted by name for listings
pub(crate) fn sorted<'a, T: Entry>(mut items: Vec<&'a T>) -> Vec<&'a T> {
    items.sort_by(|a, b| a.name().cmp(b.name()));
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> Vec<Config> {
        vec![
            Config::new("zeta", "default-z", "default"),
            Config::new("alpha", "default-a", "default"),
            Config::new("alpha", "prod-a", "prod"),
            Config::new("zeta", "staging-z", "staging"),
        ]
    }

    #[test]
    fn test_merge_default_is_default_items() {
        let items = configs();
        let merged = merged(&items, "default");
        let values: Vec<&str> = merged.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["default-z", "default-a"]);
    }

    #[test]
    fn test_merge_override_shadows_default() {
        let items = configs();
        let merged = merged(&items, "prod");
        let values: Vec<&str> = merged.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["prod-a", "default-z"]);
    }

    #[test]
    fn test_merge_unknown_context_is_defaults() {
        let items = configs();
        assert_eq!(merged(&items, "qa").len(), 2);
    }

    #[test]
    fn test_merge_is_case_sensitive() {
        let items = vec![
            Config::new("key", "default", "default"),
            Config::new("KEY", "prod", "prod"),
        ];
        let merged = merged(&items, "prod");
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_sorted_listing() {
        let items = configs();
        let listing = sorted(by_context(&items, "default"));
        let names: Vec<&str> = listing.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
