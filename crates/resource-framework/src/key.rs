//! # Resource Keys
//!
//! Every operation on a [`CachedMapResource`](crate::CachedMapResource) is addressed
//! by a [`ResourceKey`]. A key is one of four closed variants:
//!
//! - **Flat**: a single concrete key identifying one cache entry.
//! - **List**: an ordered list of concrete keys. Order matters for correlating
//!   results, not for identity.
//! - **Alias**: a named, parametrized stand-in for one concrete key.
//! - **ListAlias**: a named, parametrized stand-in for a key list.
//!
//! Aliases carry no resolution logic of their own. They are resolved through the
//! owning resource's [`ResourceAliases`](crate::ResourceAliases) registry.
//!
//! ```rust
//! use resource_framework::{AliasFactory, KeyKind, ResourceKey};
//!
//! const PROJECT_USERS: AliasFactory = AliasFactory::list("users/project");
//!
//! let key: ResourceKey<u32> = PROJECT_USERS.key_with([("project", "demo")]);
//! assert_eq!(key.kind(), KeyKind::ListAlias);
//! assert_eq!(key.to_string(), "users/project(project=demo)");
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};

/// Ordered alias parameters. Ordering keeps the string form stable.
pub type AliasOptions = BTreeMap<String, String>;

/// Id of the built-in offset pagination alias.
pub const OFFSET_PAGE_ALIAS_ID: &str = "@resource/offset-page";

/// Discriminant of a [`ResourceKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Flat,
    List,
    Alias,
    ListAlias,
}

/// A named, parametrized reference to one or more concrete keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAlias {
    id: String,
    options: AliasOptions,
    parent: Option<Box<ResourceAlias>>,
}

impl ResourceAlias {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            options: AliasOptions::new(),
            parent: None,
        }
    }

    /// Adds (or replaces) a parameter.
    pub fn with_option(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.options.insert(name.into(), value.to_string());
        self
    }

    /// Chains this alias below `parent`.
    pub fn with_parent(mut self, parent: ResourceAlias) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Creates an offset page over the list-alias `parent`.
    pub fn offset_page(parent: ResourceAlias, offset: usize, limit: usize) -> Self {
        ResourceAlias::new(OFFSET_PAGE_ALIAS_ID)
            .with_option("offset", offset)
            .with_option("limit", limit)
            .with_parent(parent)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &AliasOptions {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn parent(&self) -> Option<&ResourceAlias> {
        self.parent.as_deref()
    }

    /// Returns `true` if this alias was produced by `factory`.
    pub fn is(&self, factory: &AliasFactory) -> bool {
        self.id == factory.id()
    }

    pub fn is_offset_page(&self) -> bool {
        self.id == OFFSET_PAGE_ALIAS_ID
    }

    /// `(offset, limit)` of an offset page alias.
    pub fn page(&self) -> Option<(usize, usize)> {
        if !self.is_offset_page() {
            return None;
        }
        let offset = self.option("offset")?.parse().ok()?;
        let limit = self.option("limit")?.parse().ok()?;
        Some((offset, limit))
    }
}

impl Display for ResourceAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        }
        f.write_str(&self.id)?;
        if !self.options.is_empty() {
            let params: Vec<String> = self
                .options
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            write!(f, "({})", params.join(","))?;
        }
        Ok(())
    }
}

/// Creates aliases with a fixed id and kind.
///
/// Factories are `const`-constructible so resources can expose them as
/// associated constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasFactory {
    id: &'static str,
    list: bool,
}

impl AliasFactory {
    /// A factory for aliases that stand for a single key.
    pub const fn single(id: &'static str) -> Self {
        Self { id, list: false }
    }

    /// A factory for aliases that stand for a key list.
    pub const fn list(id: &'static str) -> Self {
        Self { id, list: true }
    }

    pub const fn id(&self) -> &'static str {
        self.id
    }

    pub const fn is_list(&self) -> bool {
        self.list
    }

    pub fn alias(&self) -> ResourceAlias {
        ResourceAlias::new(self.id)
    }

    pub fn alias_with<N, V, I>(&self, options: I) -> ResourceAlias
    where
        N: Into<String>,
        V: ToString,
        I: IntoIterator<Item = (N, V)>,
    {
        options
            .into_iter()
            .fold(self.alias(), |alias, (name, value)| alias.with_option(name, value))
    }

    /// A key for this alias without parameters.
    pub fn key<K>(&self) -> ResourceKey<K> {
        self.wrap(self.alias())
    }

    /// A key for this alias with parameters.
    pub fn key_with<K, N, V, I>(&self, options: I) -> ResourceKey<K>
    where
        N: Into<String>,
        V: ToString,
        I: IntoIterator<Item = (N, V)>,
    {
        self.wrap(self.alias_with(options))
    }

    fn wrap<K>(&self, alias: ResourceAlias) -> ResourceKey<K> {
        if self.list {
            ResourceKey::ListAlias(alias)
        } else {
            ResourceKey::Alias(alias)
        }
    }
}

/// A key addressing one or more resource entries.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKey<K> {
    Flat(K),
    List(Vec<K>),
    Alias(ResourceAlias),
    ListAlias(ResourceAlias),
}

impl<K> ResourceKey<K> {
    pub fn flat(key: K) -> Self {
        ResourceKey::Flat(key)
    }

    pub fn list(keys: impl IntoIterator<Item = K>) -> Self {
        ResourceKey::List(keys.into_iter().collect())
    }

    /// An offset page over a list-alias key. Returns `None` for other key kinds.
    pub fn offset_page(parent: &ResourceKey<K>, offset: usize, limit: usize) -> Option<Self> {
        match parent {
            ResourceKey::ListAlias(alias) => Some(ResourceKey::ListAlias(
                ResourceAlias::offset_page(alias.clone(), offset, limit),
            )),
            _ => None,
        }
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            ResourceKey::Flat(_) => KeyKind::Flat,
            ResourceKey::List(_) => KeyKind::List,
            ResourceKey::Alias(_) => KeyKind::Alias,
            ResourceKey::ListAlias(_) => KeyKind::ListAlias,
        }
    }

    pub fn is_alias(&self) -> bool {
        self.as_alias().is_some()
    }

    /// `true` for key lists and list-aliases.
    pub fn is_list(&self) -> bool {
        matches!(self, ResourceKey::List(_) | ResourceKey::ListAlias(_))
    }

    pub fn as_alias(&self) -> Option<&ResourceAlias> {
        match self {
            ResourceKey::Alias(alias) | ResourceKey::ListAlias(alias) => Some(alias),
            ResourceKey::Flat(_) | ResourceKey::List(_) => None,
        }
    }

    /// Concrete keys of a flat key or key list. Aliases yield `None`.
    pub fn concrete_keys(&self) -> Option<Vec<&K>> {
        match self {
            ResourceKey::Flat(key) => Some(vec![key]),
            ResourceKey::List(keys) => Some(keys.iter().collect()),
            ResourceKey::Alias(_) | ResourceKey::ListAlias(_) => None,
        }
    }
}

impl<K> From<Vec<K>> for ResourceKey<K> {
    fn from(keys: Vec<K>) -> Self {
        ResourceKey::List(keys)
    }
}

impl<K: Debug> Display for ResourceKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Flat(key) => write!(f, "{:?}", key),
            ResourceKey::List(keys) => write!(f, "{:?}", keys),
            ResourceKey::Alias(alias) | ResourceKey::ListAlias(alias) => write!(f, "{}", alias),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: AliasFactory = AliasFactory::list("all");
    const BY_NAME: AliasFactory = AliasFactory::single("by-name");

    #[test]
    fn test_factories_produce_tagged_keys() {
        let all: ResourceKey<u32> = ALL.key();
        let named: ResourceKey<u32> = BY_NAME.key_with([("name", "alice")]);

        assert_eq!(all.kind(), KeyKind::ListAlias);
        assert!(all.is_list());
        assert_eq!(named.kind(), KeyKind::Alias);
        assert!(!named.is_list());
        assert!(named.as_alias().unwrap().is(&BY_NAME));
        assert_eq!(named.as_alias().unwrap().option("name"), Some("alice"));
    }

    #[test]
    fn test_alias_display_includes_parent_and_sorted_options() {
        let alias = ALL.alias_with([("b", 2), ("a", 1)]);
        assert_eq!(alias.to_string(), "all(a=1,b=2)");

        let page = ResourceAlias::offset_page(ALL.alias(), 10, 5);
        assert_eq!(page.to_string(), "all/@resource/offset-page(limit=5,offset=10)");
        assert_eq!(page.page(), Some((10, 5)));
        assert_eq!(page.parent(), Some(&ALL.alias()));
    }

    #[test]
    fn test_offset_page_only_wraps_list_aliases() {
        let flat = ResourceKey::flat(1u32);
        assert!(ResourceKey::offset_page(&flat, 0, 10).is_none());

        let page = ResourceKey::offset_page(&ALL.key::<u32>(), 0, 10).unwrap();
        assert_eq!(page.kind(), KeyKind::ListAlias);
        assert!(page.as_alias().unwrap().is_offset_page());
    }

    #[test]
    fn test_concrete_keys() {
        assert_eq!(ResourceKey::flat(1).concrete_keys(), Some(vec![&1]));
        assert_eq!(ResourceKey::list([1, 2]).concrete_keys(), Some(vec![&1, &2]));
        assert_eq!(ALL.key::<i32>().concrete_keys(), None);
    }
}
