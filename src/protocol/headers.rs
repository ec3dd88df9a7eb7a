//! The request header table.
//!
//! Headers are kept in insertion order with lower-cased names. A repeated
//! name does not create a second entry: the new value is appended to the
//! existing one, separated by a single space. Continuation (folded) lines
//! are handled by the reader in [`crate::codec::read_header_table`].

/// Ordered map of lower-cased header name to pre-joined value.
///
/// Built once per request and treated as immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct HeaderTable {
    entries: Vec<(String, String)>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a header by name. `name` must already be lower-case.
    pub fn get(&self, name: &str) -> Option<&str> {
        debug_assert_eq!(name, name.to_ascii_lowercase());
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Inserts a header, merging into an existing entry on a repeated name.
    pub fn insert(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let value = value.trim_start();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => {
                existing.push(' ');
                existing.push_str(value);
            }
            None => self.entries.push((name, value.to_string())),
        }
    }

    /// Appends folded continuation text to the most recently inserted header.
    ///
    /// Returns the new length of that value, or `None` when no header has
    /// been inserted yet (a bare continuation line is dropped).
    pub fn fold_into_last(&mut self, continuation: &str) -> Option<usize> {
        let (_, value) = self.entries.last_mut()?;
        value.push(' ');
        value.push_str(continuation.trim());
        Some(value.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Content-Length parsed as u64, if present and well-formed.
    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length").and_then(|v| v.trim().parse::<u64>().ok())
    }

    /// True when the client asked to keep the connection open.
    pub fn wants_keep_alive(&self) -> bool {
        self.get("connection")
            .map(|v| v.to_ascii_lowercase().contains("keep-alive"))
            .unwrap_or(false)
    }

    /// Host header value lower-cased with any `:port` suffix stripped.
    pub fn virtual_host(&self) -> Option<String> {
        let host = self.get("host")?;
        let host = host.split(':').next().unwrap_or(host);
        Some(host.trim().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_lower_cased() {
        let mut table = HeaderTable::new();
        table.insert("X-Foo", "bar");
        assert_eq!(table.get("x-foo"), Some("bar"));
    }

    #[test]
    fn repeated_header_merges_with_space() {
        let mut table = HeaderTable::new();
        table.insert("X-Foo", "1");
        table.insert("x-foo", "2");
        assert_eq!(table.get("x-foo"), Some("1 2"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn fold_appends_to_last() {
        let mut table = HeaderTable::new();
        table.insert("X-Foo", "a");
        table.fold_into_last("b");
        assert_eq!(table.get("x-foo"), Some("a b"));
    }

    #[test]
    fn fold_without_previous_header_is_dropped() {
        let mut table = HeaderTable::new();
        assert_eq!(table.fold_into_last("orphan"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn virtual_host_strips_port() {
        let mut table = HeaderTable::new();
        table.insert("Host", "Example.COM:8080");
        assert_eq!(table.virtual_host(), Some("example.com".to_string()));
    }

    #[test]
    fn keep_alive_detection() {
        let mut table = HeaderTable::new();
        table.insert("Connection", "Keep-Alive");
        assert!(table.wants_keep_alive());
    }
}
