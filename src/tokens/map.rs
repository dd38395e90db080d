//! Ordered key to token mapping.

/// Mapping from token key to token value.
///
/// Entries keep the order in which they were inserted. [`TokenMap::resolve`]
/// walks that order, so the first inserted key contained in a tag wins when
/// several keys match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenMap {
    entries: Vec<(String, String)>,
}

impl TokenMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `token` under `key`.
    ///
    /// Re-inserting an existing key replaces its token in place and returns
    /// the previous value; the key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, token: impl Into<String>) -> Option<String> {
        let key = key.into();
        let token = token.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, token)),
            None => {
                self.entries.push((key, token));
                None
            }
        }
    }

    /// Look up the token stored under exactly `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, token)| token.as_str())
    }

    /// Return the token of the first key that occurs anywhere in `tag`.
    pub fn resolve(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| tag.contains(key.as_str()))
            .map(|(_, token)| token.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, token)` pairs in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, token)| (key.as_str(), token.as_str()))
    }

    /// Iterate over keys in resolution order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

impl<K, V> FromIterator<(K, V)> for TokenMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, token) in iter {
            map.insert(key, token);
        }
        map
    }
}
