use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::http::config::Config;
use crate::http::error::{Error, ProtocolError, Result, UsageError};
use crate::http::headers::Headers;
use crate::http::parse::parse_header_value;
use multipart::MultipartParser;
use storage::{DiskStore, FileUpload};
use urlencoded::UrlEncodedParser;

pub mod multipart;
pub mod storage;
pub mod urlencoded;

/// Name of the HTML form control that reports the submission charset.
pub const CHARSET_FIELD: &str = "_charset_";

#[derive(Debug)]
pub enum FieldUnit {
    Attribute { name: String, value: String },
    File(FileUpload),
    /// Control attribute such as `_charset_`; raw value.
    Internal { name: String, value: Bytes },
    /// A `multipart/mixed` part nested inside another mixed part.
    Unsupported { name: String, content_type: String },
}

impl FieldUnit {
    pub fn name(&self) -> &str {
        match self {
            FieldUnit::Attribute { name, .. }
            | FieldUnit::Internal { name, .. }
            | FieldUnit::Unsupported { name, .. } => name,
            FieldUnit::File(upload) => upload.name(),
        }
    }

    /// Text field, or an internal one for names the framework reserves.
    pub(crate) fn text(name: String, value: String) -> FieldUnit {
        if name == CHARSET_FIELD {
            FieldUnit::Internal {
                name,
                value: Bytes::from(value),
            }
        } else {
            FieldUnit::Attribute { name, value }
        }
    }
}

#[derive(Debug)]
enum Kind {
    Multipart(MultipartParser),
    UrlEncoded(UrlEncodedParser),
}

#[derive(Debug)]
pub struct BodyDecoder {
    kind: Kind,
    ready: VecDeque<FieldUnit>,
    store: Arc<DiskStore>,
    destroyed: bool,
}

impl BodyDecoder {
    /// Picks a decoder from the request's `Content-Type`: multipart for
    /// `multipart/form-data`, urlencoded for everything else.
    pub fn new(
        headers: &Headers,
        config: &Config,
        store: Arc<DiskStore>,
    ) -> std::result::Result<BodyDecoder, ProtocolError> {
        let content_type = headers.get("content-type").map(parse_header_value);

        let kind = match content_type {
            Some(ct) if ct.value == "multipart/form-data" => {
                let boundary = ct
                    .param("boundary")
                    .ok_or(ProtocolError::MalformedBody("Needs a boundary value".to_string()))?;
                validate_boundary(boundary).map_err(ProtocolError::MalformedBody)?;
                Kind::Multipart(MultipartParser::new(boundary, config))
            }
            _ => Kind::UrlEncoded(UrlEncodedParser::new()),
        };

        Ok(BodyDecoder {
            kind,
            ready: VecDeque::new(),
            store,
            destroyed: false,
        })
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.kind, Kind::Multipart(_))
    }

    pub fn offer(&mut self, chunk: &[u8]) -> Result<()> {
        self.ensure_alive()?;
        match &mut self.kind {
            Kind::Multipart(p) => p.feed(chunk, &mut self.ready, &self.store)?,
            Kind::UrlEncoded(p) => p.feed(chunk, &mut self.ready),
        }
        Ok(())
    }

    /// The terminal chunk has been offered.
    pub fn finish(&mut self) -> Result<()> {
        self.ensure_alive()?;
        match &mut self.kind {
            Kind::Multipart(p) => p.finish()?,
            Kind::UrlEncoded(p) => p.finish(&mut self.ready),
        }
        Ok(())
    }

    /// `Err(EndOfDataEarly)` once the body is fully decoded and drained.
    pub fn has_next(&self) -> Result<bool> {
        self.ensure_alive()?;
        if !self.ready.is_empty() {
            return Ok(true);
        }
        if self.is_done() {
            return Err(ProtocolError::EndOfDataEarly.into());
        }
        Ok(false)
    }

    pub fn next(&mut self) -> Result<FieldUnit> {
        self.ensure_alive()?;
        self.ready
            .pop_front()
            .ok_or(Error::Usage(UsageError::IteratorMisuse))
    }

    /// Drops buffered bytes and undrained fields, deleting their temp files.
    pub fn destroy(&mut self) {
        if self.destroyed {
            debug!("decoder already destroyed");
            return;
        }
        self.destroyed = true;
        self.ready.clear();
        match &mut self.kind {
            Kind::Multipart(p) => p.release(),
            Kind::UrlEncoded(p) => p.release(),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn is_done(&self) -> bool {
        match &self.kind {
            Kind::Multipart(p) => p.is_done(),
            Kind::UrlEncoded(p) => p.is_done(),
        }
    }

    fn ensure_alive(&self) -> std::result::Result<(), UsageError> {
        if self.destroyed {
            Err(UsageError::Destroyed)
        } else {
            Ok(())
        }
    }
}

/// RFC 2046: 1 to 70 characters from a restricted set, not ending in a space.
pub(crate) fn validate_boundary(boundary: &str) -> std::result::Result<(), String> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c);

    if boundary.is_empty() || boundary.len() > 70 {
        return Err(format!(
            "boundary must be 1 to 70 characters, got {}",
            boundary.len()
        ));
    }
    if !boundary.chars().all(allowed) || boundary.ends_with(' ') {
        return Err(format!("invalid boundary: {:?}", boundary));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(content_type: &str) -> std::result::Result<BodyDecoder, ProtocolError> {
        let headers: Headers = [("Content-Type", content_type)].into_iter().collect();
        BodyDecoder::new(&headers, &Config::default(), Arc::new(DiskStore::new(None)))
    }

    fn drain(d: &mut BodyDecoder) -> Vec<FieldUnit> {
        let mut units = Vec::new();
        while let Ok(true) = d.has_next() {
            units.push(d.next().unwrap());
        }
        units
    }

    #[test]
    fn rejects_bad_boundaries() {
        assert!(matches!(
            decoder("multipart/form-data"),
            Err(ProtocolError::MalformedBody(_))
        ));
        assert!(decoder("multipart/form-data; boundary=").is_err());
        assert!(decoder("multipart/form-data; boundary=bad{char}").is_err());
        assert!(decoder(&format!("multipart/form-data; boundary={}", "x".repeat(71))).is_err());
        assert!(decoder("multipart/form-data; boundary=\"ok boundary\"").is_ok());
    }

    #[test]
    fn non_multipart_types_use_urlencoded() {
        assert!(!decoder("application/x-www-form-urlencoded").unwrap().is_multipart());
        assert!(!decoder("text/plain").unwrap().is_multipart());
        assert!(!decoder("multipart/mixed; boundary=X").unwrap().is_multipart());
        assert!(decoder("multipart/form-data; boundary=X").unwrap().is_multipart());
    }

    #[test]
    fn next_without_field_is_misuse() {
        let mut d = decoder("application/x-www-form-urlencoded").unwrap();
        assert!(!d.has_next().unwrap());
        assert!(matches!(
            d.next(),
            Err(Error::Usage(UsageError::IteratorMisuse))
        ));
    }

    #[test]
    fn signals_end_of_data_after_drain() {
        let mut d = decoder("application/x-www-form-urlencoded").unwrap();
        d.offer(b"a=1&_charset_=UTF-8").unwrap();
        d.finish().unwrap();

        let units = drain(&mut d);
        assert_eq!(units.len(), 2);
        assert!(matches!(&units[0], FieldUnit::Attribute { name, value } if name == "a" && value == "1"));
        assert!(matches!(&units[1], FieldUnit::Internal { value, .. } if &value[..] == b"UTF-8"));
        assert!(matches!(
            d.has_next(),
            Err(Error::Protocol(ProtocolError::EndOfDataEarly))
        ));
    }

    #[test]
    fn destroyed_decoder_rejects_use() {
        let mut d = decoder("multipart/form-data; boundary=X").unwrap();
        d.offer(b"--X\r\n").unwrap();
        d.destroy();
        d.destroy();

        assert!(d.is_destroyed());
        assert!(matches!(d.offer(b"more"), Err(Error::Usage(UsageError::Destroyed))));
        assert!(matches!(d.has_next(), Err(Error::Usage(UsageError::Destroyed))));
        assert!(matches!(d.next(), Err(Error::Usage(UsageError::Destroyed))));
    }
}
