pub mod assembler;
pub mod config;
pub mod cookie;
pub mod decoder;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod headers;
pub mod method;
pub mod parse;
pub mod request;
pub mod response;
pub mod status;
pub mod version;

pub use assembler::{Assembler, ChunkOutcome, ConnectionState, StartLine, Started};
pub use config::Config;
pub use error::{Error, ProtocolError, Rejection, Result, UsageError};
pub use exchange::{Exchange, InboundEvent, Outbound};
pub use request::{AttributeValue, LogicalRequest, RequestHead};
pub use response::{Response, ResponseWriter};
