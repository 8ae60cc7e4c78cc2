//! Protocol module - Defines the coordinator wire protocol
//!
//! The protocol uses a compact binary format over one-shot TCP connections:
//! - 1 opcode byte selecting the request's meaning and payload shape
//! - a fixed, opcode-specific field sequence (no generic schema)
//! - replies framed as a count-prefixed group of length-prefixed packets
//!
//! Multi-byte integers are little-endian; signed forms are stored with an
//! additive bias. Strings are length-prefixed Latin-1, one byte per
//! character.

mod codec;
mod packet;

pub use codec::*;
pub use packet::*;

/// Default listen port for the coordinator.
pub const DEFAULT_PORT: u16 = 127;

/// A request must fit in a single read of this many bytes. This is a wire
/// protocol limit, not a tunable: peers never segment a request across
/// multiple writes.
pub const MAX_REQUEST_SIZE: usize = 1024;

/// Request and command opcodes.
///
/// `WORKER_CREATED` doubles as the client-initiated list-workers query: the
/// byte is the same on the wire, the direction disambiguates.
pub mod opcode {
    /// Register a worker or flip a known one to RUNNING.
    pub const REGISTER: u8 = 0x01;
    /// Operator alert with a severity byte.
    pub const ALERT: u8 = 0xA0;
    /// Append a line to a worker's log buffer.
    pub const LOG_APPEND: u8 = 0xA1;
    /// Internal error report, surfaced to the operator.
    pub const INTERNAL_ERROR: u8 = 0xA2;
    /// Remove a worker from the registry.
    pub const DEREGISTER: u8 = 0xAE;
    /// Outbound command: terminate the receiving entity.
    pub const TERMINATE: u8 = 0xAF;
    /// Outbound command: kick a player from a worker.
    pub const KICK_PLAYER: u8 = 0xB0;
    /// Error reply: referenced worker is not registered.
    pub const SERVER_NOT_FOUND: u8 = 0xC4;
    /// Proxy drains its outbound queue.
    pub const PROXY_POLL: u8 = 0xE0;
    /// Proxy finished starting up.
    pub const PROXY_READY: u8 = 0xE1;
    /// Outbound command to the proxy: a worker was created. Same byte as
    /// the list-workers request below.
    pub const WORKER_CREATED: u8 = 0xE2;
    /// Client-initiated query for the worker list.
    pub const LIST_WORKERS: u8 = 0xE2;
    /// Outbound command to the proxy: a worker was removed.
    pub const WORKER_REMOVED: u8 = 0xE3;
    /// Reply to `LIST_WORKERS`.
    pub const WORKER_LIST: u8 = 0xE4;
    /// Relay a message between two peers through the proxy.
    pub const RELAY: u8 = 0xE9;
    /// Worker heartbeat/stats poll; drains the worker's outbound queue.
    pub const STATS: u8 = 0xF0;
}

/// Single-byte status replies.
pub mod status {
    pub const NULL: u8 = 0x00;
    pub const OK: u8 = 0x01;
    pub const JSON: u8 = 0x02;
    pub const NO_AUTH: u8 = 0x10;
    pub const NO_PERM: u8 = 0x11;
    pub const INTERNAL_ERR: u8 = 0xA0;
}
