//! Fleetnet - control plane for an ephemeral game-server fleet
//!
//! Coordinates a fleet of short-lived game-server worker processes and a
//! single front-end routing proxy over a compact binary protocol carried on
//! one-shot TCP connections. Commands destined for a peer are queued and
//! delivered the next time that peer polls; nothing is pushed out-of-band.

pub mod config;
pub mod dispatch;
pub mod fleet;
pub mod materialize;
pub mod notify;
pub mod ports;
pub mod process;
pub mod protocol;
