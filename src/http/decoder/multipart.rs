//! `multipart/form-data` state machine.
//!
//! The parser only keeps what it cannot classify yet: an incomplete part
//! header block or a tail that may be the start of a delimiter. Everything
//! else is moved into the current part as soon as it arrives.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use memchr::memmem::{self, Finder};
use tracing::debug;

use super::storage::{DiskStore, FileUpload, UploadSink};
use super::{FieldUnit, validate_boundary};
use crate::http::config::Config;
use crate::http::error::{Error, ProtocolError};
use crate::http::parse::parse_header_value;

/// Transport padding tolerated between a delimiter and its line break.
const MAX_PADDING: usize = 256;

#[derive(Debug)]
enum State {
    Preamble,
    /// Right after a delimiter: either `--` (close) or a line break.
    Delimiter,
    Headers,
    Body(Part),
    Epilogue,
}

#[derive(Debug)]
enum Part {
    Attribute { name: String, value: BytesMut },
    File {
        name: String,
        filename: String,
        content_type: Option<String>,
        sink: UploadSink,
    },
    /// `multipart/mixed` field; its parts come out as files of this field.
    Mixed(Box<MultipartParser>),
    Skipped { name: String, content_type: String },
}

impl Part {
    fn write(
        &mut self,
        data: &[u8],
        out: &mut VecDeque<FieldUnit>,
        store: &DiskStore,
    ) -> Result<(), Error> {
        match self {
            Part::Attribute { value, .. } => value.extend_from_slice(data),
            Part::File { sink, .. } => sink.write(data, store)?,
            Part::Mixed(inner) => inner.feed(data, out, store)?,
            Part::Skipped { .. } => {}
        }
        Ok(())
    }

    fn finish(self, out: &mut VecDeque<FieldUnit>) -> Result<(), Error> {
        let unit = match self {
            Part::Attribute { name, value } => {
                FieldUnit::text(name, String::from_utf8_lossy(&value).into_owned())
            }
            Part::File {
                name,
                filename,
                content_type,
                sink,
            } => {
                let (data, len) = sink.finish()?;
                FieldUnit::File(FileUpload {
                    name,
                    filename,
                    content_type,
                    len,
                    data,
                })
            }
            Part::Mixed(mut inner) => {
                inner.finish()?;
                return Ok(());
            }
            Part::Skipped { name, content_type } => FieldUnit::Unsupported { name, content_type },
        };
        out.push_back(unit);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct MultipartParser {
    state: State,
    buf: BytesMut,
    /// `\r\n--boundary`
    delimiter: Finder<'static>,
    /// Outer field name when parsing a nested `multipart/mixed` body.
    mixed_field: Option<String>,
    received: bool,
    memory_threshold: usize,
    max_header_bytes: usize,
}

impl MultipartParser {
    pub fn new(boundary: &str, config: &Config) -> Self {
        Self::with_field(boundary, None, config.memory_threshold, config.max_part_header_bytes)
    }

    fn with_field(
        boundary: &str,
        mixed_field: Option<String>,
        memory_threshold: usize,
        max_header_bytes: usize,
    ) -> Self {
        let delimiter = format!("\r\n--{}", boundary);

        // A body may open with the delimiter itself; the seeded line break
        // lets the preamble search treat that like any other delimiter.
        let mut buf = BytesMut::with_capacity(delimiter.len());
        buf.extend_from_slice(b"\r\n");

        MultipartParser {
            state: State::Preamble,
            buf,
            delimiter: Finder::new(delimiter.as_bytes()).into_owned(),
            mixed_field,
            received: false,
            memory_threshold,
            max_header_bytes,
        }
    }

    pub fn feed(
        &mut self,
        data: &[u8],
        out: &mut VecDeque<FieldUnit>,
        store: &DiskStore,
    ) -> Result<(), Error> {
        if self.is_done() {
            return Ok(());
        }
        self.received |= !data.is_empty();
        self.buf.extend_from_slice(data);
        while self.step(out, store)? {}
        Ok(())
    }

    /// The body is over. Only a closed multipart, or an empty body, is complete.
    pub fn finish(&mut self) -> Result<(), ProtocolError> {
        match self.state {
            State::Epilogue => Ok(()),
            State::Preamble if !self.received => {
                debug!("empty multipart body");
                self.state = State::Epilogue;
                Ok(())
            }
            State::Preamble => Err(ProtocolError::ChunkDecodeFailure(
                "no multipart delimiter found".to_string(),
            )),
            _ => Err(ProtocolError::ChunkDecodeFailure(
                "body ended before the closing delimiter".to_string(),
            )),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Epilogue)
    }

    /// Drops buffered bytes and the part in progress.
    pub fn release(&mut self) {
        self.buf = BytesMut::new();
        self.state = State::Epilogue;
    }

    fn step(&mut self, out: &mut VecDeque<FieldUnit>, store: &DiskStore) -> Result<bool, Error> {
        match self.state {
            State::Preamble => Ok(self.skip_preamble()),
            State::Delimiter => Ok(self.after_delimiter()?),
            State::Headers => Ok(self.read_headers()?),
            State::Body(_) => self.read_body(out, store),
            State::Epilogue => {
                self.buf.clear();
                Ok(false)
            }
        }
    }

    fn skip_preamble(&mut self) -> bool {
        let needle_len = self.delimiter.needle().len();
        match self.delimiter.find(&self.buf) {
            Some(i) => {
                self.buf.advance(i + needle_len);
                self.state = State::Delimiter;
                true
            }
            None => {
                let keep = needle_len - 1;
                if self.buf.len() > keep {
                    let skip = self.buf.len() - keep;
                    self.buf.advance(skip);
                }
                false
            }
        }
    }

    fn after_delimiter(&mut self) -> Result<bool, ProtocolError> {
        if self.buf.len() < 2 {
            return Ok(false);
        }
        if self.buf.starts_with(b"--") {
            self.buf.clear();
            self.state = State::Epilogue;
            return Ok(false);
        }

        let padding = self
            .buf
            .iter()
            .take_while(|b| **b == b' ' || **b == b'\t')
            .count();
        let rest = &self.buf[padding..];

        if rest.starts_with(b"\r\n") {
            self.buf.advance(padding + 2);
            self.state = State::Headers;
            return Ok(true);
        }
        if rest.is_empty() || rest == b"\r" {
            if padding > MAX_PADDING {
                return Err(ProtocolError::ChunkDecodeFailure(
                    "too much padding after delimiter".to_string(),
                ));
            }
            return Ok(false);
        }
        Err(ProtocolError::ChunkDecodeFailure(
            "unexpected bytes after delimiter".to_string(),
        ))
    }

    fn read_headers(&mut self) -> Result<bool, ProtocolError> {
        let end = if self.buf.starts_with(b"\r\n") {
            Some(0)
        } else {
            memmem::find(&self.buf, b"\r\n\r\n").map(|i| i + 2)
        };

        let Some(end) = end else {
            if self.buf.len() > self.max_header_bytes {
                return Err(ProtocolError::ChunkDecodeFailure(format!(
                    "part headers exceed {} bytes",
                    self.max_header_bytes
                )));
            }
            return Ok(false);
        };
        if end > self.max_header_bytes {
            return Err(ProtocolError::ChunkDecodeFailure(format!(
                "part headers exceed {} bytes",
                self.max_header_bytes
            )));
        }

        let block = self.buf.split_to(end);
        self.buf.advance(2);
        let part = self.open_part(&block)?;
        self.state = State::Body(part);
        Ok(true)
    }

    fn open_part(&self, block: &[u8]) -> Result<Part, ProtocolError> {
        let text = String::from_utf8_lossy(block);
        let mut disposition = None;
        let mut content_type = None;

        for line in text.split("\r\n").filter(|l| !l.is_empty()) {
            let (k, v) = line.split_once(':').ok_or_else(|| {
                ProtocolError::ChunkDecodeFailure(format!("invalid part header: {}", line))
            })?;
            let k = k.trim();
            if k.eq_ignore_ascii_case("content-disposition") {
                disposition = Some(parse_header_value(v.trim()));
            } else if k.eq_ignore_ascii_case("content-type") {
                content_type = Some(v.trim().to_string());
            }
        }

        let filename = disposition
            .as_ref()
            .and_then(|d| d.param("filename"))
            .map(str::to_string);
        let nested = content_type
            .as_deref()
            .map(parse_header_value)
            .filter(|ct| ct.value == "multipart/mixed");

        // Inside a mixed body every part is a file of the enclosing field.
        if let Some(field) = &self.mixed_field {
            if nested.is_some() {
                debug!(field = %field, "skipping multipart/mixed inside multipart/mixed");
                return Ok(Part::Skipped {
                    name: field.clone(),
                    content_type: content_type.unwrap_or_default(),
                });
            }
            return Ok(Part::File {
                name: field.clone(),
                filename: filename.unwrap_or_default(),
                content_type,
                sink: UploadSink::new(self.memory_threshold),
            });
        }

        let name = disposition
            .ok_or(ProtocolError::ChunkDecodeFailure(
                "part without Content-Disposition".to_string(),
            ))?
            .param("name")
            .ok_or(ProtocolError::ChunkDecodeFailure(
                "Content-Disposition without name".to_string(),
            ))?
            .to_string();

        if let Some(ct) = nested {
            let boundary = ct.param("boundary").ok_or_else(|| {
                ProtocolError::ChunkDecodeFailure(format!("multipart/mixed field {} without boundary", name))
            })?;
            validate_boundary(boundary).map_err(ProtocolError::ChunkDecodeFailure)?;
            debug!(field = %name, "opening nested multipart/mixed");
            return Ok(Part::Mixed(Box::new(MultipartParser::with_field(
                boundary,
                Some(name),
                self.memory_threshold,
                self.max_header_bytes,
            ))));
        }

        Ok(match filename {
            Some(filename) => Part::File {
                name,
                filename,
                content_type,
                sink: UploadSink::new(self.memory_threshold),
            },
            None => Part::Attribute {
                name,
                value: BytesMut::new(),
            },
        })
    }

    fn read_body(&mut self, out: &mut VecDeque<FieldUnit>, store: &DiskStore) -> Result<bool, Error> {
        let needle_len = self.delimiter.needle().len();
        let found = self.delimiter.find(&self.buf);
        let end = found.unwrap_or_else(|| self.buf.len().saturating_sub(needle_len - 1));

        if end > 0 {
            if let State::Body(part) = &mut self.state {
                part.write(&self.buf[..end], out, store)?;
            }
            self.buf.advance(end);
        }

        if found.is_none() {
            return Ok(false);
        }
        self.buf.advance(needle_len);
        if let State::Body(part) = std::mem::replace(&mut self.state, State::Delimiter) {
            part.finish(out)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::decoder::CHARSET_FIELD;

    fn parser(threshold: usize) -> MultipartParser {
        MultipartParser::new("XyZ", &Config::default().memory_threshold(threshold))
    }

    fn feed_all(p: &mut MultipartParser, chunks: &[&[u8]]) -> Result<Vec<FieldUnit>, Error> {
        let store = DiskStore::new(None);
        let mut out = VecDeque::new();
        for c in chunks {
            p.feed(c, &mut out, &store)?;
        }
        Ok(out.into_iter().collect())
    }

    fn is_decode_failure(r: &Result<Vec<FieldUnit>, Error>) -> bool {
        matches!(r, Err(Error::Protocol(ProtocolError::ChunkDecodeFailure(_))))
    }

    fn file(unit: &FieldUnit) -> &FileUpload {
        match unit {
            FieldUnit::File(f) => f,
            other => panic!("unexpected unit {:?}", other),
        }
    }

    const BODY: &[u8] = b"preamble\r\n--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
hello world\r\n--XyZ  \r\n\
Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
line one\r\nline two\r\n--XyZ--\r\nepilogue";

    const MIXED: &[u8] = b"--AaB03x\r\n\
Content-Disposition: form-data; name=\"submit-name\"\r\n\r\n\
Larry\r\n\
--AaB03x\r\n\
Content-Disposition: form-data; name=\"files\"\r\n\
Content-Type: multipart/mixed; boundary=BbC04y\r\n\r\n\
--BbC04y\r\n\
Content-Disposition: file; filename=\"file1.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
... contents of file1.txt ...\r\n\
--BbC04y\r\n\
Content-Disposition: file; filename=\"file2.gif\"\r\n\
Content-Type: image/gif\r\n\
Content-Transfer-Encoding: binary\r\n\r\n\
...contents of file2.gif...\r\n\
--BbC04y--\r\n\
--AaB03x--\r\n";

    #[test]
    fn decodes_whole_body() {
        let mut p = parser(1024);
        let units = feed_all(&mut p, &[BODY]).unwrap();

        assert_eq!(units.len(), 2);
        assert!(matches!(&units[0], FieldUnit::Attribute { name, value } if name == "title" && value == "hello world"));
        let f = file(&units[1]);
        assert_eq!(f.name(), "doc");
        assert_eq!(f.filename(), "a.txt");
        assert_eq!(f.content_type(), Some("text/plain"));
        assert!(f.is_in_memory());
        assert_eq!(&f.bytes().unwrap()[..], b"line one\r\nline two");
        assert!(p.is_done());
        assert!(p.finish().is_ok());
    }

    #[test]
    fn decodes_byte_by_byte() {
        let mut p = parser(4);
        let chunks: Vec<&[u8]> = BODY.chunks(1).collect();
        let units = feed_all(&mut p, &chunks).unwrap();

        assert_eq!(units.len(), 2);
        let f = file(&units[1]);
        assert!(!f.is_in_memory());
        assert_eq!(f.len(), 18);
        assert_eq!(&f.bytes().unwrap()[..], b"line one\r\nline two");
    }

    #[test]
    fn body_may_start_with_delimiter() {
        let mut p = parser(1024);
        let body = b"--XyZ\r\nContent-Disposition: form-data; name=\"_charset_\"\r\n\r\nUTF-8\r\n--XyZ--";
        let units = feed_all(&mut p, &[body]).unwrap();
        assert!(matches!(&units[0], FieldUnit::Internal { name, .. } if name == CHARSET_FIELD));
    }

    #[test]
    fn nested_mixed_files_belong_to_outer_field() {
        for chunk_size in [MIXED.len(), 7, 1] {
            let mut p = MultipartParser::new("AaB03x", &Config::default());
            let chunks: Vec<&[u8]> = MIXED.chunks(chunk_size).collect();
            let units = feed_all(&mut p, &chunks).unwrap();

            assert_eq!(units.len(), 3, "chunk size {}", chunk_size);
            assert!(matches!(&units[0], FieldUnit::Attribute { name, value } if name == "submit-name" && value == "Larry"));

            let first = file(&units[1]);
            assert_eq!(first.name(), "files");
            assert_eq!(first.filename(), "file1.txt");
            assert_eq!(first.content_type(), Some("text/plain"));
            assert_eq!(&first.bytes().unwrap()[..], b"... contents of file1.txt ...");

            let second = file(&units[2]);
            assert_eq!(second.name(), "files");
            assert_eq!(second.filename(), "file2.gif");
            assert_eq!(second.len(), 27);
            assert!(p.is_done());
        }
    }

    #[test]
    fn mixed_inside_mixed_is_unsupported() {
        let mut p = parser(1024);
        let body = b"--XyZ\r\nContent-Disposition: form-data; name=\"files\"\r\n\
Content-Type: multipart/mixed; boundary=in\r\n\r\n\
--in\r\nContent-Type: multipart/mixed; boundary=deeper\r\n\r\n--deeper--\r\n--in--\r\n--XyZ--";
        let units = feed_all(&mut p, &[body]).unwrap();
        assert!(matches!(&units[0], FieldUnit::Unsupported { name, .. } if name == "files"));
    }

    #[test]
    fn mixed_without_boundary_fails() {
        let mut p = parser(1024);
        let body = b"--XyZ\r\nContent-Disposition: form-data; name=\"files\"\r\n\
Content-Type: multipart/mixed\r\n\r\n";
        assert!(is_decode_failure(&feed_all(&mut p, &[body])));
    }

    #[test]
    fn unterminated_mixed_fails_at_outer_delimiter() {
        let mut p = parser(1024);
        let body = b"--XyZ\r\nContent-Disposition: form-data; name=\"files\"\r\n\
Content-Type: multipart/mixed; boundary=in\r\n\r\n\
--in\r\nContent-Disposition: file; filename=\"a\"\r\n\r\ncut short\r\n--XyZ--";
        assert!(is_decode_failure(&feed_all(&mut p, &[body])));
    }

    #[test]
    fn missing_name_fails() {
        let mut p = parser(1024);
        let body = b"--XyZ\r\nContent-Disposition: form-data\r\n\r\nx\r\n--XyZ--";
        assert!(is_decode_failure(&feed_all(&mut p, &[body])));
    }

    #[test]
    fn garbage_after_delimiter_fails() {
        let mut p = parser(1024);
        assert!(feed_all(&mut p, &[b"--XyZ!!\r\n"]).is_err());
    }

    #[test]
    fn body_without_delimiter_fails_on_finish() {
        let mut p = parser(1024);
        feed_all(&mut p, &[b"this is not multipart at all"]).unwrap();
        assert!(matches!(p.finish(), Err(ProtocolError::ChunkDecodeFailure(_))));

        let mut empty = parser(1024);
        feed_all(&mut empty, &[b""]).unwrap();
        assert!(empty.finish().is_ok());
        assert!(empty.is_done());
    }

    #[test]
    fn truncated_body_fails_on_finish() {
        let mut p = parser(1024);
        feed_all(&mut p, &[b"--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\npartial"]).unwrap();
        assert!(matches!(p.finish(), Err(ProtocolError::ChunkDecodeFailure(_))));
    }

    #[test]
    fn oversized_headers_fail() {
        let mut p = MultipartParser::new(
            "XyZ",
            &Config {
                max_part_header_bytes: 16,
                ..Config::default()
            },
        );
        let err = feed_all(&mut p, &[b"--XyZ\r\nContent-Disposition: form-data; name=\"long\"\r\n"]);
        assert!(is_decode_failure(&err));
    }

    #[test]
    fn unwritable_spill_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(Some(dir.path().join("missing")));
        let mut p = parser(2);
        let mut out = VecDeque::new();

        let body = b"--XyZ\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a\"\r\n\r\nmore than two bytes";
        assert!(matches!(p.feed(body, &mut out, &store), Err(Error::Io(_))));
    }
}
