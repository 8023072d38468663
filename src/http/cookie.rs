use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
        }
    }

    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];

        if let Some(ref path) = self.path {
            parts.push(format!("Path={}", path));
        }
        if let Some(ref domain) = self.domain {
            parts.push(format!("Domain={}", domain));
        }

        parts.join("; ")
    }
}

/// Request cookies, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSet {
    cookies: BTreeMap<String, Cookie>,
}

impl CookieSet {
    /// Decodes a `Cookie` header. `$Path` and `$Domain` attach to the cookie
    /// before them; `$Version` and other `$` attributes are dropped.
    pub fn parse(header: &str) -> Self {
        let mut cookies: BTreeMap<String, Cookie> = BTreeMap::new();
        let mut last: Option<String> = None;

        for part in header.split([';', ',']) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, value) = match part.split_once('=') {
                Some((n, v)) => (n.trim(), unquote(v.trim())),
                None => (part, ""),
            };
            if name.is_empty() {
                continue;
            }

            if let Some(attr) = name.strip_prefix('$') {
                let Some(cookie) = last.as_ref().and_then(|n| cookies.get_mut(n)) else {
                    continue;
                };
                if attr.eq_ignore_ascii_case("path") {
                    cookie.path = Some(value.to_string());
                } else if attr.eq_ignore_ascii_case("domain") {
                    cookie.domain = Some(value.to_string());
                }
                continue;
            }

            cookies.insert(name.to_string(), Cookie::new(name, value));
            last = Some(name.to_string());
        }

        CookieSet { cookies }
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    pub fn get_value(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|c| c.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.values()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn unquote(v: &str) -> &str {
    v.strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(v)
}
