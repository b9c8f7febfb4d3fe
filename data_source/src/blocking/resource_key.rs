// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Resource identity. A [`ResourceKey`] is the opaque string that deduplicates observers,
//! and a [`ResourceSpec`] is its structured form:
//!
//! ```text
//! {datacenter}/{kind}/{slug or *}?filter={expr}
//!     dc1     /service/   *      ?filter=Tags contains "web"
//! ```
//!
//! Two keys are the same resource if and only if their strings are equal, so keys must
//! be built deterministically. Build them through [`ResourceSpec::to_key()`] rather than
//! by hand.

use std::{borrow::Borrow,
          fmt::{self, Display},
          str::FromStr};

pub const FILTER_SEPARATOR: &str = "?filter=";
pub const WILDCARD_SLUG: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }

    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }

    /// # Errors
    ///
    /// Returns an error if the key doesn't follow the `{dc}/{kind}/{slug}` format.
    pub fn to_spec(&self) -> Result<ResourceSpec, KeyParseError> { self.0.parse() }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str { &self.0 }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str { &self.0 }
}

impl From<&str> for ResourceKey {
    fn from(value: &str) -> Self { Self(value.to_string()) }
}

impl From<String> for ResourceKey {
    fn from(value: String) -> Self { Self(value) }
}

impl From<&ResourceKey> for ResourceKey {
    fn from(value: &ResourceKey) -> Self { value.clone() }
}

impl From<&ResourceSpec> for ResourceKey {
    fn from(value: &ResourceSpec) -> Self { value.to_key() }
}

/// Which items of a resource kind are selected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Every item of the kind in the datacenter (`*`).
    All,
    /// One item, by slug.
    One(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    All,
    One,
}

impl Selector {
    #[must_use]
    pub fn kind(&self) -> SelectorKind {
        match self {
            Selector::All => SelectorKind::All,
            Selector::One(_) => SelectorKind::One,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceSpec {
    pub datacenter: String,
    pub kind: String,
    pub selector: Selector,
    pub filter: Option<String>,
}

impl ResourceSpec {
    pub fn all(datacenter: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            datacenter: datacenter.into(),
            kind: kind.into(),
            selector: Selector::All,
            filter: None,
        }
    }

    pub fn one(
        datacenter: impl Into<String>,
        kind: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        Self {
            datacenter: datacenter.into(),
            kind: kind.into(),
            selector: Selector::One(slug.into()),
            filter: None,
        }
    }

    /// An empty filter is the same as no filter, so both produce the same key.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.filter = (!filter.is_empty()).then_some(filter);
        self
    }

    #[must_use]
    pub fn to_key(&self) -> ResourceKey { ResourceKey(self.to_string()) }
}

impl Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match &self.selector {
            Selector::All => WILDCARD_SLUG,
            Selector::One(slug) => slug.as_str(),
        };
        write!(f, "{}/{}/{slug}", self.datacenter, self.kind)?;
        if let Some(filter) = self.filter.as_deref().filter(|it| !it.is_empty()) {
            write!(f, "{FILTER_SEPARATOR}{filter}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum KeyParseError {
    #[error("Resource key {key:?} has {found} path segments, expected 2 or 3")]
    #[diagnostic(
        code(r3bl_data_source::key::segment_count),
        help("Use the `{{datacenter}}/{{kind}}/{{slug or *}}` format")
    )]
    SegmentCount { key: String, found: usize },

    #[error("Resource key {key:?} has an empty {which} segment")]
    #[diagnostic(code(r3bl_data_source::key::empty_segment))]
    EmptySegment { key: String, which: &'static str },
}

impl FromStr for ResourceSpec {
    type Err = KeyParseError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let (path, filter) = match key.split_once(FILTER_SEPARATOR) {
            Some((path, filter)) => (path, Some(filter)),
            None => (key, None),
        };

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let (datacenter, kind, slug) = match segments.as_slice() {
            [datacenter, kind] => (*datacenter, *kind, WILDCARD_SLUG),
            [datacenter, kind, slug] => (*datacenter, *kind, *slug),
            _ => {
                return Err(KeyParseError::SegmentCount {
                    key: key.to_string(),
                    found: segments.len(),
                });
            }
        };

        for (which, segment) in [("datacenter", datacenter), ("kind", kind), ("slug", slug)] {
            if segment.is_empty() {
                return Err(KeyParseError::EmptySegment {
                    key: key.to_string(),
                    which,
                });
            }
        }

        let selector = if slug == WILDCARD_SLUG {
            Selector::All
        } else {
            Selector::One(slug.to_string())
        };

        Ok(ResourceSpec {
            datacenter: datacenter.to_string(),
            kind: kind.to_string(),
            selector,
            filter: filter.filter(|it| !it.is_empty()).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_spec_to_key_is_deterministic() {
        let spec = ResourceSpec::all("dc1", "service").with_filter("Kind == web");
        assert_eq!(spec.to_key().as_str(), "dc1/service/*?filter=Kind == web");
        assert_eq!(spec.to_key(), spec.clone().to_key());
    }

    #[test]
    fn test_empty_filter_is_no_filter() {
        assert_eq!(
            ResourceSpec::all("dc1", "node").with_filter("").to_key(),
            ResourceSpec::all("dc1", "node").to_key()
        );
    }

    #[test_case("dc1/service/*", ResourceSpec::all("dc1", "service") ; "wildcard")]
    #[test_case("/dc1/service/*", ResourceSpec::all("dc1", "service") ; "leading slash")]
    #[test_case("dc1/service", ResourceSpec::all("dc1", "service") ; "no slug")]
    #[test_case("dc1/session/node-1", ResourceSpec::one("dc1", "session", "node-1") ; "slug")]
    #[test_case(
        "dc1/node/*?filter=Meta.env == prod",
        ResourceSpec::all("dc1", "node").with_filter("Meta.env == prod") ;
        "filter"
    )]
    fn test_parse(key: &str, expected: ResourceSpec) {
        assert_eq!(key.parse::<ResourceSpec>().unwrap(), expected);
    }

    #[test]
    fn test_parse_round_trips_through_key() {
        let spec = ResourceSpec::one("dc2", "service", "web").with_filter("x");
        assert_eq!(spec.to_key().to_spec().unwrap(), spec);
    }

    #[test_case("dc1" ; "one segment")]
    #[test_case("dc1/a/b/c" ; "four segments")]
    fn test_parse_wrong_segment_count(key: &str) {
        assert!(matches!(
            key.parse::<ResourceSpec>(),
            Err(KeyParseError::SegmentCount { .. })
        ));
    }

    #[test]
    fn test_parse_empty_segment() {
        assert_eq!(
            "dc1//*".parse::<ResourceSpec>(),
            Err(KeyParseError::EmptySegment {
                key: "dc1//*".to_string(),
                which: "kind",
            })
        );
    }
}
