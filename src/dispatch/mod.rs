//! Dispatch module - the protocol state machine
//!
//! One TCP connection carries exactly one request and one reply, then the
//! server closes it. The listener performs a single bounded read per
//! connection, decodes one packet, dispatches by opcode to a handler that
//! mutates the registry and/or queues, and replies with a packet group.
//!
//! The accept loop is sequential: a connection is handled to completion
//! before the next accept. That single-writer discipline is what makes
//! queue append and drain safe without locks; anything that parallelizes
//! connection handling must add per-entity mutual exclusion first.

mod handler;
mod listener;
mod request;

pub use handler::*;
pub use listener::*;
pub use request::*;

use thiserror::Error;

use crate::protocol::CodecError;

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    #[error("malformed tick rate: {0:?}")]
    BadTickRate(String),

    #[error("malformed player record")]
    BadPlayerRecord,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
