//! Cache Configuration Module
//!
//! Per-operation caching policy: key namespace, TTL and key derivation.

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

/// Separates the operation name from the derived argument key.
pub const NAMESPACE_SEPARATOR: char = ':';

// == Cache Config ==
/// Caching policy owned by one operation.
///
/// `A` is the argument type the key is derived from and `V` the cached
/// value type. The key function is a plain `fn` so it cannot close over
/// mutable state; derived keys are always prefixed with the operation name,
/// so configurations sharing a store never collide.
pub struct CacheConfig<A: ?Sized, V> {
    name: &'static str,
    ttl: Duration,
    key_fn: fn(&A) -> String,
    _value: PhantomData<fn() -> V>,
}

impl<A: ?Sized, V> CacheConfig<A, V> {
    /// Creates a configuration.
    ///
    /// `name` must be non-empty and must not contain `:`.
    pub fn new(name: &'static str, ttl: Duration, key_fn: fn(&A) -> String) -> Self {
        debug_assert!(
            !name.is_empty() && !name.contains(NAMESPACE_SEPARATOR),
            "invalid cache namespace {:?}",
            name
        );
        Self {
            name,
            ttl,
            key_fn,
            _value: PhantomData,
        }
    }

    /// Derives the physical key for `args`.
    pub fn key(&self, args: &A) -> String {
        format!("{}{}{}", self.name, NAMESPACE_SEPARATOR, (self.key_fn)(args))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<A: ?Sized, V> Clone for CacheConfig<A, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ?Sized, V> Copy for CacheConfig<A, V> {}

impl<A: ?Sized, V> fmt::Debug for CacheConfig<A, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .finish()
    }
}

// == Key Helpers ==
/// Joins argument parts into one key segment.
///
/// `\` and `:` inside parts are escaped, so `["a:b", "c"]` and
/// `["a", "b:c"]` derive different keys.
pub fn join_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut key = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            key.push(NAMESPACE_SEPARATOR);
        }
        for c in part.as_ref().chars() {
            if c == '\\' || c == NAMESPACE_SEPARATOR {
                key.push('\\');
            }
            key.push(c);
        }
    }
    key
}
