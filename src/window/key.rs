//! Counter key generation and parsing.

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "windowgate";

/// Key identifying a window counter in the backing store.
///
/// Renders as `{prefix}:fixed_window:{resource}:counter`, so limiters that
/// share a store never collide as long as their prefixes or resources differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Namespace shared by all limiters of one application
    pub prefix: String,
    /// Identifier of the resource being limited
    pub resource: String,
}

impl CounterKey {
    /// Create a key under the default prefix.
    pub fn new(resource: &str) -> Self {
        Self::with_prefix(DEFAULT_PREFIX, resource)
    }

    /// Create a key under a custom prefix.
    pub fn with_prefix(prefix: &str, resource: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            resource: resource.to_string(),
        }
    }

    /// Convert to the store key string.
    pub fn to_store_key(&self) -> String {
        format!("{}:fixed_window:{}:counter", self.prefix, self.resource)
    }

    /// Parse from a store key string.
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_suffix(":counter")?;

        // Resources may contain ':' themselves, so split on the first marker
        let marker = rest.find(":fixed_window:")?;
        let prefix = &rest[..marker];
        let resource = &rest[marker + ":fixed_window:".len()..];

        if prefix.is_empty() || resource.is_empty() {
            return None;
        }

        Some(Self::with_prefix(prefix, resource))
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_key_format() {
        let key = CounterKey::new("user:42");
        assert_eq!(key.to_store_key(), "windowgate:fixed_window:user:42:counter");
    }

    #[test]
    fn test_counter_key_parse() {
        let key = CounterKey::with_prefix("api", "tenant:a:uploads");
        let parsed = CounterKey::parse(&key.to_store_key()).unwrap();

        assert_eq!(parsed, key);
    }

    #[test]
    fn test_counter_key_parse_rejects_foreign_keys() {
        assert!(CounterKey::parse("session:abc").is_none());
        assert!(CounterKey::parse("api:fixed_window::counter").is_none());
        assert!(CounterKey::parse(":fixed_window:x:counter").is_none());
    }

    #[test]
    fn test_prefixes_keep_keys_apart() {
        let a = CounterKey::with_prefix("one", "login");
        let b = CounterKey::with_prefix("two", "login");

        assert_ne!(a.to_store_key(), b.to_store_key());
    }
}
