use bytes::Bytes;
use tracing::warn;

use crate::http::assembler::{Assembler, ChunkOutcome, ConnectionState, Started};
use crate::http::error::Rejection;
use crate::http::handler::HandlerFunc;
use crate::http::request::RequestHead;
use crate::http::response::ResponseWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Head(RequestHead),
    Chunk { data: Bytes, last: bool },
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Interim(Bytes),
    /// Final response. With `close_after_flush`, close the connection once
    /// these bytes are flushed, never before.
    Response { bytes: Bytes, close_after_flush: bool },
}

pub struct Exchange {
    assembler: Assembler,
    writer: ResponseWriter,
    handler: HandlerFunc,
}

impl Exchange {
    pub fn new(assembler: Assembler, handler: HandlerFunc) -> Exchange {
        Exchange {
            assembler,
            writer: ResponseWriter::new(),
            handler,
        }
    }

    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    pub fn handle(&self, conn: &mut ConnectionState, event: InboundEvent) -> Vec<Outbound> {
        let mut out = Vec::new();

        match event {
            InboundEvent::Head(head) => match self.assembler.on_start_line(conn, head) {
                Ok(start) => {
                    if start.expect_continue {
                        out.push(Outbound::Interim(self.writer.continue_response()));
                    }
                    if start.started == Started::Ready {
                        out.extend(self.respond(conn));
                    }
                }
                Err(rejection) => out.push(self.reject(&rejection)),
            },
            InboundEvent::Chunk { data, last } => {
                match self.assembler.on_body_chunk(conn, &data, last) {
                    Ok(ChunkOutcome::Complete) => out.extend(self.respond(conn)),
                    Ok(ChunkOutcome::Pending | ChunkOutcome::Discarded) => {}
                    Err(rejection) => out.push(self.reject(&rejection)),
                }
            }
            InboundEvent::Closed => self.assembler.abort(conn),
        }

        out
    }

    fn respond(&self, conn: &mut ConnectionState) -> Option<Outbound> {
        let request = match self.assembler.on_request_complete(conn) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "nothing to respond to");
                return None;
            }
        };

        let body = format!("{}{}", request.diagnostics(), (self.handler)(&request));
        let (bytes, close_after_flush) = self.writer.write(&request, &body);
        Some(Outbound::Response {
            bytes,
            close_after_flush,
        })
    }

    fn reject(&self, rejection: &Rejection) -> Outbound {
        Outbound::Response {
            bytes: self
                .writer
                .write_rejection(rejection, rejection.request.diagnostics()),
            close_after_flush: true,
        }
    }
}
