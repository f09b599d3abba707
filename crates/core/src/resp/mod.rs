//! RESP wire protocol: the reply taxonomy and the incremental stream parser.

pub mod parser;
pub mod reply;

pub use parser::RespParser;
pub use reply::Reply;

use thiserror::Error;

/// Parser-side failures. Protocol errors are per-frame: the parser resets its
/// state and the stream keeps going. I/O errors terminate the stream.
#[derive(Debug, Error)]
pub enum RespError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RespError {
    pub fn is_protocol(&self) -> bool {
        matches!(self, RespError::Protocol(_))
    }
}
