//! Sans-IO HTTP/1.x request assembly.
//!
//! A transport feeds request heads and body chunks into an
//! [`http::Assembler`] (directly, or through an [`http::Exchange`] that also
//! runs the application handler) and writes back the bytes produced by
//! [`http::ResponseWriter`]. Form and multipart bodies are decoded while they
//! stream in; large file uploads go to temp files.

#![forbid(unsafe_code)]

pub mod http;

pub use http::{
    Assembler, Config, ConnectionState, Exchange, InboundEvent, LogicalRequest, Outbound,
    RequestHead, ResponseWriter,
};
