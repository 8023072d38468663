use std::collections::HashMap;

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use url::form_urlencoded;

static HEADER_PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#";\s*(?P<key>[^=;\s]+)\s*=\s*(?:"(?P<quoted>(?:[^"\\]|\\.)*)"|(?P<token>[^;\s]*))"#)
        .unwrap()
});

/// A header value split into its leading token and `key=value` parameters,
/// e.g. `multipart/form-data; boundary=X`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeaderValue {
    pub value: String,
    params: Vec<(String, String)>,
}

impl HeaderValue {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

pub(crate) fn parse_header_value(header: &str) -> HeaderValue {
    let (value, rest) = match header.find(';') {
        Some(idx) => header.split_at(idx),
        None => (header, ""),
    };

    let params = HEADER_PARAM_RE
        .captures_iter(rest)
        .map(|cap| {
            let value = match cap.name("quoted") {
                Some(q) => q.as_str().replace("\\\"", "\"").replace("\\\\", "\\"),
                None => cap.name("token").map(|t| t.as_str()).unwrap_or("").to_string(),
            };
            (cap["key"].to_string(), value)
        })
        .collect();

    HeaderValue {
        value: value.trim().to_ascii_lowercase(),
        params,
    }
}

/// Query parameters in arrival order; a repeated key keeps every value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    keys: Vec<String>,
    values: HashMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        let mut params = QueryParams::default();
        for (k, v) in form_urlencoded::parse(query.as_bytes()) {
            params.push(k.into_owned(), v.into_owned());
        }
        params
    }

    fn push(&mut self, k: String, v: String) {
        match self.values.get_mut(&k) {
            Some(values) => values.push(v),
            None => {
                self.keys.push(k.clone());
                self.values.insert(k, vec![v]);
            }
        }
    }

    pub fn get(&self, k: &str) -> Option<&str> {
        self.values.get(k).and_then(|v| v.first()).map(|v| v.as_str())
    }

    pub fn get_all(&self, k: &str) -> &[String] {
        self.values.get(k).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Splits a request target into its percent-decoded path and query parameters.
/// Absolute-form targets (`http://host/p?q`) are reduced to their path.
pub(crate) fn parse_target(target: &str) -> (String, QueryParams) {
    let target = target.split_once('#').map(|(t, _)| t).unwrap_or(target);

    let origin = match target.find("://") {
        Some(idx) => {
            let after_scheme = &target[idx + 3..];
            match after_scheme.find(['/', '?']) {
                Some(slash) => &after_scheme[slash..],
                None => "/",
            }
        }
        None => target,
    };

    let (raw_path, query) = match origin.split_once('?') {
        Some((p, q)) => (p, q),
        None => (origin, ""),
    };

    let path = percent_decode_str(raw_path).decode_utf8_lossy().into_owned();
    let path = if path.is_empty() { "/".to_string() } else { path };

    (path, QueryParams::parse(query))
}
