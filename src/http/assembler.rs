use std::sync::Arc;

use tracing::{debug, error};

use crate::http::config::Config;
use crate::http::decoder::BodyDecoder;
use crate::http::decoder::storage::DiskStore;
use crate::http::error::{Error, ProtocolError, Rejection, UsageError};
use crate::http::request::{LogicalRequest, RequestHead};

pub const END_OF_DATA_NOTE: &str = "\r\n\r\nEND OF CONTENT CHUNK BY CHUNK\r\n\r\n";

pub const FAVICON_PATH: &str = "/favicon.ico";

#[derive(Debug)]
struct InFlight {
    request: LogicalRequest,
    decoder: BodyDecoder,
    reading_chunks: bool,
    end_of_data_noted: bool,
}

impl InFlight {
    fn feed(&mut self, chunk: &[u8], is_last: bool) -> Result<(), Error> {
        self.decoder.offer(chunk)?;
        if is_last {
            self.decoder.finish()?;
        }
        self.drain()
    }

    fn drain(&mut self) -> Result<(), Error> {
        loop {
            match self.decoder.has_next() {
                Ok(true) => {
                    let unit = self.decoder.next()?;
                    self.request.merge_field(unit);
                }
                Ok(false) => return Ok(()),
                Err(Error::Protocol(p)) if !p.is_fatal() => {
                    if !self.end_of_data_noted {
                        debug!(path = %self.request.path(), "decoder reached end of data");
                        self.request.note(END_OF_DATA_NOTE);
                        self.end_of_data_noted = true;
                    }
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn into_request(mut self) -> LogicalRequest {
        self.decoder.destroy();
        self.request
    }
}

#[derive(Debug, Default)]
pub struct ConnectionState {
    in_flight: Option<InFlight>,
    completed: Option<LogicalRequest>,
    /// Body chunks of a skipped or bodyless request are dropped until the terminal one.
    discarding: bool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_request(&self) -> Option<&LogicalRequest> {
        self.in_flight.as_ref().map(|f| &f.request)
    }

    pub fn has_decoder(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_reading_chunks(&self) -> bool {
        self.in_flight.as_ref().is_some_and(|f| f.reading_chunks)
    }

    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.completed.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    /// `/favicon.ico`: no response at all.
    Skip,
    /// No body expected; the request can be taken with `on_request_complete`.
    Ready,
    AwaitingBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartLine {
    /// The client waits for `100 Continue` before sending its body.
    pub expect_continue: bool,
    pub started: Started,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Discarded,
    Pending,
    /// Terminal chunk processed; the request can be taken with `on_request_complete`.
    Complete,
}

pub struct Assembler {
    config: Config,
    store: Arc<DiskStore>,
}

impl Assembler {
    pub fn new(config: Config) -> Assembler {
        let store = Arc::new(DiskStore::new(config.temp_dir.clone()));
        Assembler { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn on_start_line(
        &self,
        conn: &mut ConnectionState,
        head: RequestHead,
    ) -> Result<StartLine, Rejection> {
        let request = LogicalRequest::from_head(head);

        if !conn.is_idle() {
            error!(method = %request.method(), path = %request.path(), "start line while a request is in flight");
            self.abort(conn);
            return Err(Rejection::new(ProtocolError::UnexpectedStartLine, request));
        }
        conn.discarding = false;

        let expect_continue = request.expects_continue();
        debug!(method = %request.method(), path = %request.path(), expect_continue, "request started");

        if request.path() == FAVICON_PATH {
            conn.discarding = true;
            return Ok(StartLine {
                expect_continue,
                started: Started::Skip,
            });
        }

        if !request.method().admits_body() {
            conn.completed = Some(request);
            conn.discarding = true;
            return Ok(StartLine {
                expect_continue,
                started: Started::Ready,
            });
        }

        let decoder = match BodyDecoder::new(request.headers(), &self.config, Arc::clone(&self.store)) {
            Ok(d) => d,
            Err(e) => {
                error!(path = %request.path(), error = %e, "cannot decode request body");
                return Err(Rejection::new(e, request));
            }
        };

        conn.in_flight = Some(InFlight {
            reading_chunks: request.is_chunked(),
            request,
            decoder,
            end_of_data_noted: false,
        });

        Ok(StartLine {
            expect_continue,
            started: Started::AwaitingBody,
        })
    }

    pub fn on_body_chunk(
        &self,
        conn: &mut ConnectionState,
        chunk: &[u8],
        is_last: bool,
    ) -> Result<ChunkOutcome, Rejection> {
        let Some(mut flight) = conn.in_flight.take() else {
            if is_last {
                conn.discarding = false;
            }
            return Ok(ChunkOutcome::Discarded);
        };

        match flight.feed(chunk, is_last) {
            Err(e) => {
                let error = match e {
                    Error::Protocol(p) => p,
                    other => ProtocolError::ChunkDecodeFailure(other.to_string()),
                };
                error!(path = %flight.request.path(), error = %error, "aborting request body");
                Err(Rejection::new(error, flight.into_request()))
            }
            Ok(()) if is_last => {
                conn.completed = Some(flight.into_request());
                Ok(ChunkOutcome::Complete)
            }
            Ok(()) => {
                conn.in_flight = Some(flight);
                Ok(ChunkOutcome::Pending)
            }
        }
    }

    pub fn on_request_complete(
        &self,
        conn: &mut ConnectionState,
    ) -> Result<LogicalRequest, UsageError> {
        conn.completed.take().ok_or(UsageError::NotComplete)
    }

    /// Releases the body decoder and forgets everything about the current
    /// request. Meant for connection-closed and idle-timeout events.
    pub fn abort(&self, conn: &mut ConnectionState) {
        if let Some(flight) = conn.in_flight.take() {
            debug!(path = %flight.request.path(), "aborting in-flight request");
            drop(flight.into_request());
        }
        conn.completed = None;
        conn.discarding = false;
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Assembler::new(Config::default())
    }
}
