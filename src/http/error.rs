use thiserror::Error;

use crate::http::request::LogicalRequest;

pub type Result<T> = std::result::Result<T, Error>;

/// Wire-level problems with a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Content type or boundary cannot be decoded; raised before any body byte is read.
    #[error("malformed body: {0}")]
    MalformedBody(String),

    /// A body chunk failed to decode mid-stream.
    #[error("chunk decode failure: {0}")]
    ChunkDecodeFailure(String),

    /// The decoder has seen the end of its data but the terminal chunk has not arrived.
    /// Recoverable.
    #[error("end of data reached before the terminal chunk")]
    EndOfDataEarly,

    /// A start line arrived while another request was still in flight.
    #[error("start line received while a request is in flight")]
    UnexpectedStartLine,
}

impl ProtocolError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::EndOfDataEarly)
    }
}

/// The caller broke an API contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("next() called while has_next() is false")]
    IteratorMisuse,

    #[error("decoder used after destroy()")]
    Destroyed,

    #[error("no completed request to hand out")]
    NotComplete,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fatal protocol error together with the request it aborted, so the caller
/// can still answer that request before closing the connection.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejection {
    #[source]
    pub error: ProtocolError,
    pub request: Box<LogicalRequest>,
}

impl Rejection {
    pub(crate) fn new(error: ProtocolError, request: LogicalRequest) -> Self {
        Rejection {
            error,
            request: Box::new(request),
        }
    }
}
