use bytes::Bytes;

use crate::http::error::Rejection;
use crate::http::headers::Headers;
use crate::http::method::Method;
use crate::http::request::LogicalRequest;
use crate::http::status::Status;
use crate::http::version::Version;

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=UTF-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub headers: Headers,
    pub content: Option<Vec<u8>>,
    pub keep_alive: bool,
    pub should_close: bool,
}

impl Response {
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(serialize_response(self))
    }
}

/// Standard persistence: HTTP/1.1+ unless `Connection: close`, older versions
/// only with `Connection: keep-alive`.
pub fn is_keep_alive(request: &LogicalRequest) -> bool {
    let headers = request.headers();
    if headers.contains_token("connection", "close") {
        return false;
    }
    request.version().keep_alive_default() || headers.contains_token("connection", "keep-alive")
}

/// `Connection: close`, or HTTP/1.0 without `Connection: keep-alive`.
/// Disagrees with [`is_keep_alive`] for versions other than 1.0 and 1.1.
pub fn should_close(request: &LogicalRequest) -> bool {
    let headers = request.headers();
    headers.contains_token("connection", "close")
        || (request.version() == Version::HTTP_1_0
            && !headers.contains_token("connection", "keep-alive"))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseWriter;

impl ResponseWriter {
    pub fn new() -> Self {
        ResponseWriter
    }

    pub fn draft(&self, request: &LogicalRequest, status: Status, body: &str) -> Response {
        let content = body.as_bytes().to_vec();
        let keep_alive = is_keep_alive(request);
        let should_close = should_close(request);

        let mut headers = Headers::new();
        headers.set("Content-Type", TEXT_PLAIN_UTF8);
        if keep_alive {
            headers.set("Connection", "keep-alive");
        }
        // A closing response is delimited by the close itself.
        if !should_close {
            headers.set("Content-Length", content.len().to_string());
        }
        for cookie in request.cookies().iter() {
            headers.add("Set-Cookie", cookie.to_header_value());
        }

        // HEAD gets the headers a GET would, without the content.
        let content = (request.method() != Method::HEAD).then_some(content);

        Response {
            status,
            headers,
            content,
            keep_alive,
            should_close,
        }
    }

    /// `200 OK` with `body`; the flag says whether to close after flushing.
    pub fn write(&self, request: &LogicalRequest, body: &str) -> (Bytes, bool) {
        let response = self.draft(request, Status::OK, body);
        (response.to_bytes(), response.should_close)
    }

    /// `400 Bad Request` carrying the diagnostic. The connection always closes.
    pub fn write_rejection(&self, rejection: &Rejection, prefix: &str) -> Bytes {
        let body = format!("{}{}", prefix, rejection.error);
        let mut response = self.draft(&rejection.request, Status::BAD_REQUEST, &body);
        response.keep_alive = false;
        response.should_close = true;
        response.headers.set("Connection", "close");
        response.headers.remove("Content-Length");
        response.to_bytes()
    }

    /// Interim `100 Continue`.
    pub fn continue_response(&self) -> Bytes {
        Bytes::from(serialize_response(&Response {
            status: Status::CONTINUE,
            headers: Headers::new(),
            content: None,
            keep_alive: true,
            should_close: false,
        }))
    }
}

pub fn serialize_response(response: &Response) -> Vec<u8> {
    let content_len = response.content.as_ref().map(|c| c.len()).unwrap_or(0);
    let mut resp_bytes = Vec::with_capacity(content_len + response.headers.len() * 32);

    resp_bytes.extend(
        format!(
            "HTTP/1.1 {} {}\r\n",
            response.status.code_num, response.status.message
        )
        .as_bytes(),
    );

    for (key, value) in response.headers.iter() {
        resp_bytes.extend(format!("{}: {}\r\n", key, value).as_bytes());
    }
    resp_bytes.extend("\r\n".as_bytes());

    if let Some(c) = &response.content {
        resp_bytes.extend(c);
    }

    resp_bytes
}
