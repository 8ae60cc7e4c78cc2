//! Opcode handlers
//!
//! Handlers receive a decoded request, mutate the registry, and return an
//! [`Outcome`]: the reply plus the side effects to apply once the reply is
//! actually on the wire. Deferring the effects is what gives queued
//! commands their at-least-once guarantee: a failed write leaves the
//! drained queue intact for the peer's next poll.

use std::sync::Arc;
use std::time::SystemTime;

use super::request::*;
use super::DispatchResult;
use crate::fleet::{LogEntry, LogLevel, Registry, Worker, WorkerOptions, WorkerStatus};
use crate::notify::NotificationSink;
use crate::ports::PortAllocator;
use crate::protocol::{opcode, status, CodecResult, Packet, PacketGroup};

/// Reply body for one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A count-framed packet group.
    Group(PacketGroup),
    /// A single raw status byte.
    Status(u8),
}

impl Reply {
    pub fn empty() -> Self {
        Reply::Group(PacketGroup::empty())
    }

    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        match self {
            Reply::Group(group) => group.encode(),
            Reply::Status(byte) => Ok(vec![*byte]),
        }
    }
}

/// Whose outbound queue a deferred clear applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueTarget {
    Worker(String),
    Proxy,
}

/// Side effects applied only after the reply write succeeds.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Effects {
    /// Command packets to append to the proxy's outbound queue.
    pub proxy_commands: Vec<Packet>,
    /// Queue whose delivered contents may now be dropped.
    pub clear: Option<QueueTarget>,
}

/// The result of handling one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub reply: Reply,
    pub effects: Effects,
}

impl Outcome {
    /// The default empty-group acknowledgment.
    pub fn ack() -> Self {
        Self {
            reply: Reply::empty(),
            effects: Effects::default(),
        }
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            effects: Effects::default(),
        }
    }
}

/// Owns the registry and routes decoded requests to their handlers.
pub struct Dispatcher {
    registry: Registry,
    allocator: PortAllocator,
    notifier: Arc<dyn NotificationSink>,
}

impl Dispatcher {
    pub fn new(
        registry: Registry,
        allocator: PortAllocator,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            registry,
            allocator,
            notifier,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Decode and handle one raw request. Failures never propagate: they
    /// are logged with the offending bytes and answered with the default
    /// empty-group acknowledgment.
    pub fn dispatch(&mut self, raw: &[u8]) -> Outcome {
        match self.try_dispatch(raw) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("invalid request {:02x?}: {}", raw, err);
                Outcome::ack()
            }
        }
    }

    /// Apply the deferred side effects of a successfully delivered reply.
    pub fn commit(&mut self, effects: Effects) {
        for command in effects.proxy_commands {
            self.registry.enqueue_proxy(command);
        }
        match effects.clear {
            Some(QueueTarget::Worker(id)) => {
                self.registry.drain(&id);
            }
            Some(QueueTarget::Proxy) => {
                self.registry.drain_proxy();
            }
            None => {}
        }
    }

    fn try_dispatch(&mut self, raw: &[u8]) -> DispatchResult<Outcome> {
        match Request::decode(raw)? {
            Request::Register(req) => self.register(req),
            Request::InternalError(req) => Ok(self.internal_error(req)),
            Request::Alert(req) => Ok(self.alert(req)),
            Request::LogAppend(req) => Ok(self.log_append(req)),
            Request::Deregister(req) => self.deregister(req),
            Request::Stats(req) => self.stats(req),
            Request::Relay(req) => self.relay(req),
            Request::ProxyPoll(req) => Ok(self.proxy_poll(req)),
            Request::ProxyReady => Ok(self.proxy_ready()),
            Request::ListWorkers(req) => self.list_workers(req),
        }
    }

    /// 0x01: a known id is a start-up completion, an unknown id is a
    /// worker the coordinator has never provisioned and therefore trusts
    /// less. Either way the proxy learns about the worker on its next
    /// poll.
    fn register(&mut self, req: Register) -> DispatchResult<Outcome> {
        match self.registry.find_mut(&req.id) {
            Some(worker) => {
                tracing::info!("worker {} registered, now RUNNING", worker.full_id());
                worker.status = WorkerStatus::Running;
            }
            None => {
                let mut worker = Worker::new(
                    &req.template,
                    req.ram,
                    WorkerOptions {
                        id: Some(req.id.clone()),
                        name: Some(req.name.clone()),
                        server_type: Some(req.server_type.clone()),
                        attitude: Some("Unverified: created via registration".to_string()),
                        ..Default::default()
                    },
                );
                tracing::warn!(
                    "unknown worker {} registered itself, added as unverified",
                    worker.full_id()
                );
                self.registry.register(worker);
            }
        }

        let mut command = Packet::new(opcode::WORKER_CREATED);
        command.write_server_code(req.ram);
        command.write_string(&req.id)?;
        command.write_short(req.port);
        // Only the "verify" type carries defined verification semantics;
        // every type currently maps to the zero pair.
        let (code, flag) = (0x00u8, 0u16);
        command.write_byte(code);
        command.write_short(flag);

        Ok(Outcome {
            reply: Reply::empty(),
            effects: Effects {
                proxy_commands: vec![command],
                clear: None,
            },
        })
    }

    /// 0xA2: surface an internal error report.
    fn internal_error(&mut self, req: InternalError) -> Outcome {
        let full_id = format!("{}{}", req.ram.letter(), req.id);
        self.notifier.notify(
            LogLevel::Error,
            &format!("[{}] Broadcast System", full_id),
            &format!(
                "An internal error occurred on server [{}]:\n\n{}",
                full_id, req.message
            ),
        );
        Outcome::with_reply(Reply::Status(status::OK))
    }

    /// 0xA0: surface a leveled alert.
    fn alert(&mut self, req: Alert) -> Outcome {
        let full_id = format!("{}{}", req.ram.letter(), req.id);
        self.notifier
            .notify(req.level, &format!("[{}] Alert", full_id), &req.message);
        Outcome::ack()
    }

    /// 0xA1: append to the worker's log buffer; unknown ids are ignored.
    fn log_append(&mut self, req: LogAppend) -> Outcome {
        if let Some(worker) = self.registry.find_mut(&req.id) {
            worker.logs.push(LogEntry::now(req.level, req.message));
        }
        Outcome::ack()
    }

    /// 0xAE: stop and remove the worker. The removal command is queued for
    /// the proxy even when the id is unknown; only the registry removal is
    /// guarded.
    fn deregister(&mut self, req: Deregister) -> DispatchResult<Outcome> {
        if let Some(mut worker) = self.registry.unregister(&req.id) {
            worker.status = WorkerStatus::Stopped;
            let full_id = worker.full_id();
            tracing::info!("worker {} deregistered", full_id);
            if let Err(err) = self.allocator.release(&full_id) {
                tracing::warn!("failed to release port for {}: {}", full_id, err);
            }
        }

        let mut command = Packet::new(opcode::WORKER_REMOVED);
        command.write_server_code(req.ram);
        command.write_string(&req.id)?;

        Ok(Outcome {
            reply: Reply::empty(),
            effects: Effects {
                proxy_commands: vec![command],
                clear: None,
            },
        })
    }

    /// 0xF0: stats update plus queue poll. The only opcode with a
    /// dedicated error reply.
    fn stats(&mut self, req: Stats) -> DispatchResult<Outcome> {
        let Some(worker) = self.registry.find_mut(&req.id) else {
            let mut error = Packet::new(opcode::SERVER_NOT_FOUND);
            error.write_string("Server Not Found!")?;
            return Ok(Outcome::with_reply(Reply::Group(PacketGroup::new(vec![
                error,
            ]))));
        };

        worker.name = req.name;
        worker.players = req.players;
        worker.ram_used_mb = req.ram_used_mb;
        worker.tps = req.tps;
        worker.last_ping = SystemTime::now();

        let group = PacketGroup::new(worker.queued().to_vec());
        Ok(Outcome {
            reply: Reply::Group(group),
            effects: Effects {
                proxy_commands: Vec::new(),
                clear: Some(QueueTarget::Worker(req.id)),
            },
        })
    }

    /// 0xE9: re-encode the relay as a command addressed by the second
    /// peer's full id and queue it for the proxy.
    fn relay(&mut self, req: Relay) -> DispatchResult<Outcome> {
        let (to_class, to_id) = &req.to;
        let mut command = Packet::new(opcode::RELAY);
        command.write_string(&format!("{}{}", to_class.letter(), to_id))?;
        command.write_string(&req.message)?;

        Ok(Outcome {
            reply: Reply::empty(),
            effects: Effects {
                proxy_commands: vec![command],
                clear: None,
            },
        })
    }

    /// 0xE0: the proxy drains its queue.
    fn proxy_poll(&mut self, _req: ProxyPoll) -> Outcome {
        let group = PacketGroup::new(self.registry.proxy().queued().to_vec());
        Outcome {
            reply: Reply::Group(group),
            effects: Effects {
                proxy_commands: Vec::new(),
                clear: Some(QueueTarget::Proxy),
            },
        }
    }

    /// 0xE1: the proxy finished starting up.
    fn proxy_ready(&mut self) -> Outcome {
        tracing::info!("proxy is ready");
        self.notifier
            .notify(LogLevel::Info, "[proxy] Alert", "Proxy is ready!");
        Outcome::ack()
    }

    /// 0xE2: worker list snapshot, echoing the requester name.
    fn list_workers(&mut self, req: ListWorkers) -> DispatchResult<Outcome> {
        let mut reply = Packet::new(opcode::WORKER_LIST);
        reply.write_string(&req.name)?;
        reply.write_short(self.registry.len() as u16);
        for worker in self.registry.workers() {
            reply.write_string(&worker.full_id())?;
            reply.write_string(&worker.name)?;
            reply.write_short(worker.players.len() as u16);
            reply.write_short(worker.max_players);
            reply.write_string(&worker.server_type)?;
        }
        Ok(Outcome::with_reply(Reply::Group(PacketGroup::new(vec![
            reply,
        ]))))
    }
}
