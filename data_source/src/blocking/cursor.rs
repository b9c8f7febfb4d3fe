// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::{fmt::{self, Display},
          future::Future,
          sync::Arc};

use futures_util::{FutureExt, future::BoxFuture};
use serde::{Deserialize, Serialize};

use super::FetchError;

/// The last server-side version a loop has observed for a resource (the blocking
/// "index"). `0` means there is no prior state and the next fetch must not block.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Cursor(pub u64);

impl Cursor {
    pub const NONE: Cursor = Cursor(0);

    #[must_use]
    pub fn is_none(self) -> bool { self.0 == 0 }

    /// Cursors never move backwards: a server response carrying an older index keeps the
    /// current one.
    #[must_use]
    pub fn advance(self, next: Cursor) -> Cursor { self.max(next) }

    /// Adds the `index=<cursor>` query parameter to `url`, or returns `url` unchanged
    /// when there is no cursor yet.
    #[must_use]
    pub fn append_to_url(self, url: &str) -> String {
        if self.is_none() {
            return url.to_string();
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}index={}", self.0)
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<u64> for Cursor {
    fn from(value: u64) -> Self { Cursor(value) }
}

/// A successful fetch: the payload and the cursor the server associated with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<V> {
    pub value: V,
    pub cursor: Cursor,
}

pub type FetchFuture<V> = BoxFuture<'static, Result<Fetched<V>, FetchError>>;

/// Resource specific function that performs one blocking request given the last known
/// cursor. It is called again with the advanced cursor after every success.
pub type FetchFn<V> = Arc<dyn Fn(Cursor) -> FetchFuture<V> + Send + Sync>;

/// Wraps an async closure into a [`FetchFn`].
pub fn fetch_fn<V, F, Fut>(fetch: F) -> FetchFn<V>
where
    F: Fn(Cursor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Fetched<V>, FetchError>> + Send + 'static,
{
    Arc::new(move |cursor| fetch(cursor).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_advance_never_regresses() {
        assert_eq!(Cursor(5).advance(Cursor(7)), Cursor(7));
        assert_eq!(Cursor(7).advance(Cursor(5)), Cursor(7));
        assert_eq!(Cursor::NONE.advance(Cursor::NONE), Cursor::NONE);
    }

    #[test_case(0, "/v1/catalog/services", "/v1/catalog/services" ; "no cursor")]
    #[test_case(12, "/v1/catalog/services", "/v1/catalog/services?index=12" ; "first param")]
    #[test_case(12, "/v1/catalog/services?dc=dc1", "/v1/catalog/services?dc=dc1&index=12" ; "extra param")]
    fn test_append_to_url(cursor: u64, url: &str, expected: &str) {
        assert_eq!(Cursor(cursor).append_to_url(url), expected);
    }

    #[tokio::test]
    async fn test_fetch_fn_passes_cursor_through() {
        let fetch = fetch_fn(|cursor: Cursor| async move {
            Ok::<_, FetchError>(Fetched {
                value: cursor.0 * 2,
                cursor: Cursor(cursor.0 + 1),
            })
        });

        let fetched = fetch(Cursor(21)).await.unwrap();
        assert_eq!(fetched, Fetched { value: 42, cursor: Cursor(22) });
    }
}
