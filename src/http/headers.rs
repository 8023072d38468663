/// Ordered header multimap. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, k: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(k))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, k: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(name, _)| name.eq_ignore_ascii_case(k))
            .map(|(_, v)| v.as_str())
    }

    pub fn add(&mut self, k: impl Into<String>, v: impl Into<String>) {
        self.entries.push((k.into(), v.into()));
    }

    /// Replaces every value stored under `k`.
    pub fn set(&mut self, k: impl Into<String>, v: impl Into<String>) {
        let k = k.into();
        self.remove(&k);
        self.entries.push((k, v.into()));
    }

    pub fn remove(&mut self, k: &str) {
        self.entries.retain(|(name, _)| !name.eq_ignore_ascii_case(k));
    }

    pub fn contains(&self, k: &str) -> bool {
        self.get(k).is_some()
    }

    /// Whether any comma-separated token under `k` equals `token`, ignoring case.
    pub fn contains_token(&self, k: &str, token: &str) -> bool {
        self.get_all(k)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Headers {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
