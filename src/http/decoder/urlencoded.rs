use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use memchr::memchr;
use url::form_urlencoded;

use super::FieldUnit;

/// Streams `application/x-www-form-urlencoded` pairs; a pair is emitted as soon
/// as its terminating `&` arrives, the last one on `finish`.
#[derive(Debug, Default)]
pub(crate) struct UrlEncodedParser {
    buf: BytesMut,
    done: bool,
}

impl UrlEncodedParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8], out: &mut VecDeque<FieldUnit>) {
        if self.done {
            return;
        }
        self.buf.extend_from_slice(data);
        while let Some(i) = memchr(b'&', &self.buf) {
            let pair = self.buf.split_to(i);
            self.buf.advance(1);
            emit(&pair, out);
        }
    }

    pub fn finish(&mut self, out: &mut VecDeque<FieldUnit>) {
        if self.done {
            return;
        }
        let rest = self.buf.split();
        emit(&rest, out);
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn release(&mut self) {
        self.buf = BytesMut::new();
        self.done = true;
    }
}

fn emit(pair: &[u8], out: &mut VecDeque<FieldUnit>) {
    for (k, v) in form_urlencoded::parse(pair) {
        if k.is_empty() {
            continue;
        }
        out.push_back(FieldUnit::text(k.into_owned(), v.into_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(out: &VecDeque<FieldUnit>) -> Vec<(String, String)> {
        out.iter()
            .filter_map(|u| match u {
                FieldUnit::Attribute { name, value } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn pairs_split_across_chunks() {
        let mut p = UrlEncodedParser::new();
        let mut out = VecDeque::new();

        p.feed(b"na", &mut out);
        assert!(out.is_empty());
        p.feed(b"me=J%C3%B6rg+M&ci", &mut out);
        assert_eq!(pairs(&out), vec![("name".to_string(), "Jörg M".to_string())]);

        p.feed(b"ty=Ber", &mut out);
        p.finish(&mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(pairs(&out)[1], ("city".to_string(), "Ber".to_string()));
        assert!(p.is_done());
    }

    #[test]
    fn empty_names_and_segments_are_dropped() {
        let mut p = UrlEncodedParser::new();
        let mut out = VecDeque::new();
        p.feed(b"&&=orphan&flag", &mut out);
        p.finish(&mut out);

        assert_eq!(pairs(&out), vec![("flag".to_string(), String::new())]);
    }
}
