use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Context, anyhow, bail};
use bytes::Bytes;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::http::cookie::CookieSet;
use crate::http::decoder::FieldUnit;
use crate::http::decoder::storage::FileUpload;
use crate::http::headers::Headers;
use crate::http::method::Method;
use crate::http::parse::{QueryParams, parse_target};
use crate::http::version::Version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: Headers,
}

impl RequestHead {
    pub fn new(method: Method, target: impl Into<String>, version: Version) -> Self {
        RequestHead {
            method,
            target: target.into(),
            version,
            headers: Headers::new(),
        }
    }

    pub fn header(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.headers.add(k, v);
        self
    }

    /// Parses a raw head block: the request line and header lines, up to and
    /// optionally including the blank line.
    pub fn parse(raw: &[u8]) -> anyhow::Result<RequestHead> {
        let text = std::str::from_utf8(raw).context("Request head is not UTF-8")?;
        let mut lines = text.split("\r\n");

        let first_line = lines.next().unwrap_or("").trim_ascii();
        let first_line_parts: Vec<&str> = first_line.split(' ').collect();

        let (method, target, version) = match first_line_parts[..] {
            [method_raw, target, version] => (
                Method::from_str(method_raw).context("Unknown HTTP method")?,
                target,
                Version::from_str(version).context("Unsupported HTTP version")?,
            ),
            _ => bail!("Bad start-line"),
        };

        let mut head = RequestHead::new(method, target, version);
        for line in lines {
            if line.trim_ascii().is_empty() {
                break;
            }
            let (k, v) = line
                .split_once(':')
                .ok_or(anyhow!("Invalid header: {}", line))?;
            head.headers.add(k.trim_ascii(), v.trim_ascii());
        }

        Ok(head)
    }
}

#[derive(Debug)]
pub enum AttributeValue {
    Text(String),
    File(FileUpload),
    Internal(Bytes),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileUpload> {
        match self {
            AttributeValue::File(f) => Some(f),
            _ => None,
        }
    }

    /// Raw value of a text or internal attribute.
    pub fn get(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Text(s) => Some(s.as_bytes()),
            AttributeValue::Internal(b) => Some(&b[..]),
            AttributeValue::File(_) => None,
        }
    }
}

/// A request assembled from its head and (decoded) body.
#[derive(Debug)]
pub struct LogicalRequest {
    method: Method,
    version: Version,
    uri: String,
    path: String,
    query: QueryParams,
    headers: Headers,
    cookies: OnceCell<CookieSet>,
    attributes: HashMap<String, AttributeValue>,
    diagnostics: String,
}

impl LogicalRequest {
    pub fn from_head(head: RequestHead) -> LogicalRequest {
        let (path, query) = parse_target(&head.target);
        LogicalRequest {
            method: head.method,
            version: head.version,
            uri: head.target,
            path,
            query,
            headers: head.headers,
            cookies: OnceCell::new(),
            attributes: HashMap::new(),
            diagnostics: String::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn get_header(&self, k: &str) -> Option<&str> {
        self.headers.get(k)
    }

    /// Cookies from the `Cookie` header, decoded on first access.
    pub fn cookies(&self) -> &CookieSet {
        self.cookies.get_or_init(|| match self.headers.get("cookie") {
            Some(value) => CookieSet::parse(value),
            None => CookieSet::default(),
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn diagnostics(&self) -> &str {
        &self.diagnostics
    }

    pub fn expects_continue(&self) -> bool {
        self.version >= Version::HTTP_1_1
            && self
                .headers
                .get("expect")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
    }

    pub fn is_chunked(&self) -> bool {
        self.headers.contains_token("transfer-encoding", "chunked")
    }

    // Last write wins.
    pub(crate) fn merge_field(&mut self, unit: FieldUnit) {
        let (name, value) = match unit {
            FieldUnit::Attribute { name, value } => (name, AttributeValue::Text(value)),
            FieldUnit::File(upload) => (upload.name().to_string(), AttributeValue::File(upload)),
            FieldUnit::Internal { name, value } => (name, AttributeValue::Internal(value)),
            FieldUnit::Unsupported { name, content_type } => {
                debug!(field = %name, %content_type, "ignoring unsupported field");
                return;
            }
        };
        self.attributes.insert(name, value);
    }

    pub(crate) fn note(&mut self, text: &str) {
        self.diagnostics.push_str(text);
    }
}
