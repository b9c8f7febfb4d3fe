// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Routing table from resource type to fetch constructor. See [`FetchRouter`].

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{FetchFn, KeyParseError, ResourceKey, ResourceSpec, SelectorKind};

type FetchConstructor<V> = Arc<dyn Fn(&ResourceSpec) -> FetchFn<V> + Send + Sync>;

/// A resolved resource: the key that identifies its loop, and the fetch function that
/// drives it. Produced once per lookup by [`FetchRouter::resolve()`].
pub struct Route<V> {
    pub key: ResourceKey,
    pub spec: ResourceSpec,
    pub fetch: FetchFn<V>,
}

impl<V> Clone for Route<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            spec: self.spec.clone(),
            fetch: self.fetch.clone(),
        }
    }
}

impl<V> std::fmt::Debug for Route<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("key", &self.key)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum RouteError {
    #[error("No fetch is registered for resource type {kind:?} ({selector:?})")]
    #[diagnostic(
        code(r3bl_data_source::route::unknown_resource),
        help("Register one with `FetchRouter::register_all()` or `register_one()`")
    )]
    UnknownResource { kind: String, selector: SelectorKind },

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidKey(#[from] KeyParseError),
}

/// Maps `(resource type, selector)` to a constructor that builds the [`FetchFn`] for a
/// concrete [`ResourceSpec`].
///
/// - A `*` selector routes to the "find all in datacenter" constructor, which also
///   receives the filter through the [`ResourceSpec`].
/// - A slug routes to the "find one" constructor.
///
/// ```
/// # use r3bl_data_source::{FetchRouter, ResourceSpec, TickingBackend};
/// let backend = TickingBackend::default();
/// let mut router = FetchRouter::<Vec<String>>::default();
/// router.register_all("service", move |_spec| backend.fetch_fn());
///
/// let route = router.resolve_key("dc1/service/*").unwrap();
/// assert_eq!(route.key.as_str(), "dc1/service/*");
/// assert!(router.resolve(&ResourceSpec::one("dc1", "service", "web")).is_err());
/// ```
pub struct FetchRouter<V> {
    routes: FxHashMap<(String, SelectorKind), FetchConstructor<V>>,
}

impl<V> Default for FetchRouter<V> {
    fn default() -> Self {
        Self {
            routes: FxHashMap::default(),
        }
    }
}

impl<V> std::fmt::Debug for FetchRouter<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<_> = self.routes.keys().collect();
        routes.sort_by(|a, b| a.0.cmp(&b.0));
        f.debug_struct("FetchRouter")
            .field("routes", &routes)
            .finish()
    }
}

impl<V> FetchRouter<V> {
    /// Registers the "find all in datacenter" constructor for `kind`.
    pub fn register_all(
        &mut self,
        kind: impl Into<String>,
        constructor: impl Fn(&ResourceSpec) -> FetchFn<V> + Send + Sync + 'static,
    ) -> &mut Self {
        self.register(kind.into(), SelectorKind::All, Arc::new(constructor))
    }

    /// Registers the "find one by slug" constructor for `kind`.
    pub fn register_one(
        &mut self,
        kind: impl Into<String>,
        constructor: impl Fn(&ResourceSpec) -> FetchFn<V> + Send + Sync + 'static,
    ) -> &mut Self {
        self.register(kind.into(), SelectorKind::One, Arc::new(constructor))
    }

    fn register(
        &mut self,
        kind: String,
        selector: SelectorKind,
        constructor: FetchConstructor<V>,
    ) -> &mut Self {
        if self.routes.insert((kind.clone(), selector), constructor).is_some() {
            tracing::debug!(message = "Replaced fetch route", kind = %kind, selector = ?selector);
        }
        self
    }

    /// # Errors
    ///
    /// [`RouteError::UnknownResource`] if nothing is registered for the resource
    /// type and selector.
    pub fn resolve(&self, spec: &ResourceSpec) -> Result<Route<V>, RouteError> {
        let selector = spec.selector.kind();
        let constructor = self.routes.get(&(spec.kind.clone(), selector)).ok_or_else(|| {
            RouteError::UnknownResource {
                kind: spec.kind.clone(),
                selector,
            }
        })?;

        Ok(Route {
            key: spec.to_key(),
            spec: spec.clone(),
            fetch: constructor(spec),
        })
    }

    /// Parses `key` and resolves it.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidKey`] if `key` can't be parsed, otherwise see
    /// [`Self::resolve()`].
    pub fn resolve_key(&self, key: &str) -> Result<Route<V>, RouteError> {
        let spec: ResourceSpec = key.parse()?;
        self.resolve(&spec)
    }

    #[must_use]
    pub fn len(&self) -> usize { self.routes.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.routes.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cursor, FetchError, Fetched, Selector, fetch_fn};
    use pretty_assertions::assert_eq;

    /// Each constructor echoes what it was given, so tests can see which one ran.
    fn router() -> FetchRouter<String> {
        let mut router = FetchRouter::default();
        router
            .register_all("service", |spec: &ResourceSpec| {
                let label = format!(
                    "all {} in {} where {:?}",
                    spec.kind, spec.datacenter, spec.filter
                );
                fetch_fn(move |_: Cursor| {
                    let value = label.clone();
                    async move { Ok::<_, FetchError>(Fetched { value, cursor: Cursor(1) }) }
                })
            })
            .register_one("service", |spec: &ResourceSpec| {
                let slug = match &spec.selector {
                    Selector::One(slug) => slug.clone(),
                    Selector::All => String::new(),
                };
                fetch_fn(move |_: Cursor| {
                    let value = format!("one {slug}");
                    async move { Ok::<_, FetchError>(Fetched { value, cursor: Cursor(1) }) }
                })
            });
        router
    }

    #[tokio::test]
    async fn test_wildcard_routes_to_find_all_with_filter() {
        let route = router()
            .resolve(&ResourceSpec::all("dc1", "service").with_filter("Tags contains web"))
            .unwrap();
        assert_eq!(route.key.as_str(), "dc1/service/*?filter=Tags contains web");

        let fetched = (route.fetch)(Cursor::NONE).await.unwrap();
        assert_eq!(
            fetched.value,
            r#"all service in dc1 where Some("Tags contains web")"#
        );
    }

    #[tokio::test]
    async fn test_slug_routes_to_find_one() {
        let route = router().resolve_key("dc1/service/web").unwrap();
        assert_eq!(route.key.as_str(), "dc1/service/web");
        assert_eq!((route.fetch)(Cursor::NONE).await.unwrap().value, "one web");
    }

    #[test]
    fn test_unknown_resource() {
        assert_eq!(
            router().resolve(&ResourceSpec::all("dc1", "node")).unwrap_err(),
            RouteError::UnknownResource {
                kind: "node".to_string(),
                selector: SelectorKind::All,
            }
        );
    }

    #[test]
    fn test_invalid_key() {
        assert!(matches!(
            router().resolve_key("dc1"),
            Err(RouteError::InvalidKey(_))
        ));
    }
}
