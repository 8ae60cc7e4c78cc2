//! Decoded request structs - one per opcode, fields in wire order
//!
//! Decoding is purely wire-level; nothing here touches the registry. Each
//! opcode implies a fixed field sequence, so a request either decodes in
//! full or fails with the offset that broke it.

use super::{DispatchError, DispatchResult};
use crate::fleet::{LogLevel, Player};
use crate::protocol::{opcode, RamClass, Reader};

/// Register a worker, or flip a known one to RUNNING.
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub ram: RamClass,
    pub template: String,
    pub id: String,
    pub name: String,
    pub server_type: String,
    pub port: u16,
}

/// Internal error report, surfaced to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalError {
    pub ram: RamClass,
    pub id: String,
    pub message: String,
}

/// Leveled operator alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub ram: RamClass,
    pub id: String,
    pub level: LogLevel,
    pub message: String,
}

/// Append a line to a worker's log buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct LogAppend {
    pub ram: RamClass,
    pub id: String,
    pub level: LogLevel,
    pub message: String,
}

/// Remove a worker from the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Deregister {
    pub ram: RamClass,
    pub id: String,
}

/// Worker heartbeat: stats update plus outbound-queue poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub ram: RamClass,
    pub id: String,
    pub name: String,
    pub tps: f64,
    pub ram_used_mb: u64,
    pub players: Vec<Player>,
}

/// Relay a message from one peer to another through the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct Relay {
    pub from: (RamClass, String),
    pub to: (RamClass, String),
    pub message: String,
}

/// Proxy drains its outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyPoll {
    /// Reported for bookkeeping; the coordinator ignores it.
    pub player_count: u16,
}

/// Query the registry for the worker list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListWorkers {
    /// Requester name, echoed back in the reply.
    pub name: String,
}

/// A fully decoded inbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Register(Register),
    InternalError(InternalError),
    Alert(Alert),
    LogAppend(LogAppend),
    Deregister(Deregister),
    Stats(Stats),
    Relay(Relay),
    ProxyPoll(ProxyPoll),
    ProxyReady,
    ListWorkers(ListWorkers),
}

impl Request {
    pub fn decode(data: &[u8]) -> DispatchResult<Self> {
        let mut r = Reader::new(data);
        let op = r.read_byte()?;
        match op {
            opcode::REGISTER => Ok(Request::Register(Register {
                ram: r.read_server_code()?,
                template: r.read_string()?,
                id: r.read_string()?,
                name: r.read_string()?,
                server_type: r.read_string()?,
                port: r.read_short()?,
            })),
            opcode::INTERNAL_ERROR => Ok(Request::InternalError(InternalError {
                ram: r.read_server_code()?,
                id: r.read_string()?,
                message: r.read_string()?,
            })),
            opcode::ALERT => Ok(Request::Alert(Alert {
                ram: r.read_server_code()?,
                id: r.read_string()?,
                level: LogLevel::from_byte(r.read_byte()?),
                message: r.read_string()?,
            })),
            opcode::LOG_APPEND => Ok(Request::LogAppend(LogAppend {
                ram: r.read_server_code()?,
                id: r.read_string()?,
                level: LogLevel::from_byte(r.read_byte()?),
                message: r.read_string()?,
            })),
            opcode::DEREGISTER => Ok(Request::Deregister(Deregister {
                ram: r.read_server_code()?,
                id: r.read_string()?,
            })),
            opcode::STATS => {
                let ram = r.read_server_code()?;
                let id = r.read_string()?;
                let name = r.read_string()?;
                let tps_raw = r.read_string()?;
                let tps = tps_raw
                    .parse()
                    .map_err(|_| DispatchError::BadTickRate(tps_raw))?;
                let ram_used_mb = r.read_long()?;
                let players = r
                    .read_typed_array()?
                    .iter()
                    .map(|value| Player::from_value(value).ok_or(DispatchError::BadPlayerRecord))
                    .collect::<DispatchResult<Vec<_>>>()?;
                Ok(Request::Stats(Stats {
                    ram,
                    id,
                    name,
                    tps,
                    ram_used_mb,
                    players,
                }))
            }
            opcode::RELAY => Ok(Request::Relay(Relay {
                from: (r.read_server_code()?, r.read_string()?),
                to: (r.read_server_code()?, r.read_string()?),
                message: r.read_string()?,
            })),
            opcode::PROXY_POLL => Ok(Request::ProxyPoll(ProxyPoll {
                player_count: r.read_short()?,
            })),
            opcode::PROXY_READY => Ok(Request::ProxyReady),
            opcode::LIST_WORKERS => Ok(Request::ListWorkers(ListWorkers {
                name: r.read_string()?,
            })),
            other => Err(DispatchError::UnknownOpcode(other)),
        }
    }
}
