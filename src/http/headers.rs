//! HTTP header map with case-insensitive name lookup.
//!
//! HTTP headers are order-preserving and case-insensitive per [RFC 9110 §5].

/// A case-insensitive, multi-value HTTP header map.
///
/// Preserves insertion order and allows multiple values per header name,
/// matching the semantics of HTTP/1.1 header fields (RFC 9110 §5.3).
///
/// # Examples
///
/// ```
/// use caching_proxy::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Set-Cookie", "a=1");
/// headers.insert("Set-Cookie", "b=2");
/// headers.set("set-cookie", "c=3");
///
/// let all: Vec<_> = headers.get_all("SET-COOKIE").collect();
/// assert_eq!(all, vec!["c=3"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every existing value for `name` with a single new value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over all values for the given header name (case-insensitive).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries with the given header name (case-insensitive).
    ///
    /// Returns `true` if any entries were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every entry of `other` onto `self`, overwriting names already present.
    ///
    /// Multi-valued names in `other` keep all of their values.
    pub fn overwrite_from(&mut self, other: &Headers) {
        for (name, _) in other.iter() {
            self.remove(name);
        }
        self.inner.extend(other.inner.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn multi_value() {
        let mut h = Headers::new();
        h.insert("Set-Cookie", "a=1");
        h.insert("Set-Cookie", "b=2");
        let vals: Vec<_> = h.get_all("set-cookie").collect();
        assert_eq!(vals, vec!["a=1", "b=2"]);
    }

    #[test]
    fn remove() {
        let mut h = Headers::new();
        h.insert("X-Foo", "bar");
        h.insert("X-Foo", "baz");
        assert!(h.remove("x-foo"));
        assert!(h.is_empty());
        assert!(!h.remove("x-foo")); // already gone
    }

    #[test]
    fn set_replaces_all_values() {
        let mut h = Headers::new();
        h.insert("X-Cache", "HIT");
        h.insert("x-cache", "HIT");
        h.set("X-Cache", "MISS");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("x-cache"), Some("MISS"));
    }

    #[test]
    fn overwrite_from_keeps_multi_values() {
        let mut target = Headers::new();
        target.insert("Content-Type", "text/plain");
        target.insert("X-Keep", "yes");

        let mut origin = Headers::new();
        origin.insert("content-type", "application/json");
        origin.insert("set-cookie", "a=1");
        origin.insert("set-cookie", "b=2");

        target.overwrite_from(&origin);
        assert_eq!(target.get("Content-Type"), Some("application/json"));
        assert_eq!(target.get_all("content-type").count(), 1);
        assert_eq!(target.get_all("set-cookie").count(), 2);
        assert_eq!(target.get("x-keep"), Some("yes"));
    }
}
