//! Worker entity - one per managed game-server instance
//!
//! A worker is constructed in `Hibernating`, enters `Loading` when its
//! process spawns, and is flipped to `Running` by the first registration
//! referencing its id. Deregistration stops it and removes it from the
//! registry, at which point its port entry becomes reusable.

use std::path::Path;
use std::time::SystemTime;

use rand::Rng;

use super::{FleetError, FleetResult, LogLevel, WorkerStatus};
use crate::materialize::TemplateMaterializer;
use crate::ports::PortAllocator;
use crate::process::ServerProcess;
use crate::protocol::{opcode, CodecResult, Packet, RamClass, Value};

/// Default world template for new workers.
pub const DEFAULT_WORLD: &str = "_world_test1";

/// Default player capacity for new workers.
pub const DEFAULT_MAX_PLAYERS: u16 = 20;

const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Short random alphanumeric worker id.
pub fn generate_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())]))
        .collect()
}

/// One player currently connected to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub rank: String,
    pub uuid: String,
    pub moderator: bool,
}

impl Player {
    /// A player arrives on the wire as a mixed array of
    /// `[name, rank, uuid, moderator]`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::List(fields) = value else {
            return None;
        };
        match fields.as_slice() {
            [Value::Str(name), Value::Str(rank), Value::Str(uuid), Value::Bool(moderator)] => {
                Some(Player {
                    name: name.clone(),
                    rank: rank.clone(),
                    uuid: uuid.clone(),
                    moderator: *moderator,
                })
            }
            _ => None,
        }
    }
}

/// One line of a worker's log buffer.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub time: SystemTime,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            time: SystemTime::now(),
            level,
            message: message.into(),
        }
    }
}

/// Optional overrides for worker construction; unset fields are generated.
#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    pub id: Option<String>,
    pub name: Option<String>,
    pub server_type: Option<String>,
    pub max_players: Option<u16>,
    pub attitude: Option<String>,
}

/// An ephemeral game-server instance managed by the coordinator.
#[derive(Debug)]
pub struct Worker {
    /// Short random alphanumeric token, unique in the registry.
    pub id: String,
    pub ram: RamClass,
    /// Template this worker was created from.
    pub version: String,
    pub server_type: String,
    pub name: String,
    pub world: String,
    pub status: WorkerStatus,
    pub players: Vec<Player>,
    pub max_players: u16,
    pub ram_used_mb: u64,
    pub tps: f64,
    pub last_ping: SystemTime,
    /// Assigned by the allocator when the worker is provisioned.
    pub port: Option<u16>,
    /// Free-form trust annotation shown on the operator surface.
    pub attitude: String,
    pub logs: Vec<LogEntry>,
    pub(crate) outbound: Vec<Packet>,
    process: Option<ServerProcess>,
}

impl Worker {
    pub fn new(template: &str, ram: RamClass, opts: WorkerOptions) -> Self {
        let id = opts.id.unwrap_or_else(|| generate_id(4));
        let server_type = opts.server_type.unwrap_or_else(|| "unknown".to_string());
        let name = opts.name.unwrap_or_else(|| {
            format!("{}_{}_{}_{}:unknown", ram.letter(), id, template, server_type)
        });

        Self {
            id,
            ram,
            version: template.to_string(),
            server_type,
            name,
            world: DEFAULT_WORLD.to_string(),
            status: WorkerStatus::Hibernating,
            players: Vec::new(),
            max_players: opts.max_players.unwrap_or(DEFAULT_MAX_PLAYERS),
            ram_used_mb: 0,
            tps: 0.0,
            last_ping: SystemTime::now(),
            port: None,
            attitude: opts.attitude.unwrap_or_else(|| "Normal".to_string()),
            logs: Vec::new(),
            outbound: Vec::new(),
            process: None,
        }
    }

    /// Create a worker and materialize its on-disk instance: allocate a
    /// port under the worker's full id, copy the template and world, and
    /// populate the instance property file. Failures propagate to the
    /// caller; no partial worker is returned.
    pub fn provision(
        template: &str,
        ram: RamClass,
        opts: WorkerOptions,
        allocator: &PortAllocator,
        materializer: &dyn TemplateMaterializer,
    ) -> FleetResult<Self> {
        let mut worker = Self::new(template, ram, opts);
        let full_id = worker.full_id();

        let port = allocator.allocate(&full_id)?;
        worker.port = Some(port);

        let mut props = materializer.materialize(template, &worker.world, &full_id)?;
        props.set("server-port", port);
        props.set("max-players", worker.max_players);
        props.set("sid", &worker.id);
        props.set("rid", worker.ram.letter());
        props.set("version", &worker.version);
        props.set("type", &worker.server_type);
        props.set("name", &worker.name);
        props.save()?;

        Ok(worker)
    }

    /// RAM-class letter concatenated with the short id; the unique external
    /// key for this worker.
    pub fn full_id(&self) -> String {
        format!("{}{}", self.ram.letter(), self.id)
    }

    /// Human-readable `current/max (moderators)` player summary.
    pub fn format_players(&self) -> String {
        let moderators = self.players.iter().filter(|p| p.moderator).count();
        format!("{}/{} ({})", self.players.len(), self.max_players, moderators)
    }

    /// Spawn the worker process in its running directory and enter
    /// `Loading`. The first registration for this id completes the start.
    pub fn start_up(&mut self, command: &str, running_dir: &Path) -> FleetResult<()> {
        let dir = running_dir.join(self.full_id());
        self.process = Some(ServerProcess::spawn(command, &dir)?);
        self.status = WorkerStatus::Loading;
        Ok(())
    }

    /// Write a command line to the process and return the current contents
    /// of its log. The log is a synchronous read-back of the whole file;
    /// it is not correlated with this particular command.
    pub async fn send_command(&mut self, command: &str) -> FleetResult<String> {
        if self.status != WorkerStatus::Running {
            return Err(FleetError::NotRunning {
                operation: "send_command",
                status: self.status,
            });
        }
        let process = self.process.as_mut().ok_or(FleetError::NoProcess)?;
        process.write_line(command).await?;
        Ok(process.read_log()?)
    }

    /// Queue a terminate command for delivery on the worker's next poll.
    pub fn shutdown(&mut self) {
        self.outbound.push(Packet::new(opcode::TERMINATE));
    }

    /// Queue a player kick for delivery on the worker's next poll.
    pub fn kick_player(&mut self, player: &str, reason: &str) -> CodecResult<()> {
        let mut packet = Packet::new(opcode::KICK_PLAYER);
        packet.write_string(player)?;
        packet.write_string(reason)?;
        self.outbound.push(packet);
        Ok(())
    }

    pub fn queued(&self) -> &[Packet] {
        &self.outbound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_worker_defaults() {
        let worker = Worker::new("standard-1.8.8", RamClass::Small, WorkerOptions::default());
        assert_eq!(worker.status, WorkerStatus::Hibernating);
        assert_eq!(worker.id.len(), 4);
        assert_eq!(worker.max_players, DEFAULT_MAX_PLAYERS);
        assert_eq!(worker.server_type, "unknown");
        assert_eq!(worker.attitude, "Normal");
        assert_eq!(worker.port, None);
        assert!(worker.name.contains(&worker.id));
    }

    #[test]
    fn test_full_id() {
        let worker = Worker::new(
            "standard-1.8.8",
            RamClass::Gigantic,
            WorkerOptions {
                id: Some("abcd".into()),
                ..Default::default()
            },
        );
        assert_eq!(worker.full_id(), "Gabcd");
    }

    #[test]
    fn test_format_players() {
        let mut worker = Worker::new("standard-1.8.8", RamClass::Small, WorkerOptions::default());
        worker.players = vec![
            Player {
                name: "alice".into(),
                rank: "admin".into(),
                uuid: "u1".into(),
                moderator: true,
            },
            Player {
                name: "bob".into(),
                rank: "member".into(),
                uuid: "u2".into(),
                moderator: false,
            },
        ];
        assert_eq!(worker.format_players(), "2/20 (1)");
    }

    #[test]
    fn test_player_from_value() {
        let value = Value::List(vec![
            Value::Str("alice".into()),
            Value::Str("admin".into()),
            Value::Str("uuid-1".into()),
            Value::Bool(true),
        ]);
        let player = Player::from_value(&value).unwrap();
        assert_eq!(player.name, "alice");
        assert!(player.moderator);

        assert!(Player::from_value(&Value::Str("not a player".into())).is_none());
        assert!(Player::from_value(&Value::List(vec![Value::Bool(true)])).is_none());
    }

    #[tokio::test]
    async fn test_send_command_requires_running() {
        let mut worker = Worker::new("standard-1.8.8", RamClass::Small, WorkerOptions::default());
        let err = worker.send_command("say hi").await.unwrap_err();
        assert!(matches!(
            err,
            FleetError::NotRunning {
                operation: "send_command",
                status: WorkerStatus::Hibernating,
            }
        ));
    }

    #[test]
    fn test_shutdown_queues_terminate() {
        let mut worker = Worker::new("standard-1.8.8", RamClass::Small, WorkerOptions::default());
        worker.shutdown();
        assert_eq!(worker.queued().len(), 1);
        assert_eq!(worker.queued()[0].opcode(), Some(opcode::TERMINATE));
    }

    #[test]
    fn test_kick_player_queues_packet() {
        let mut worker = Worker::new("standard-1.8.8", RamClass::Small, WorkerOptions::default());
        worker.kick_player("alice", "You are kicked!").unwrap();
        assert_eq!(worker.queued().len(), 1);
        assert_eq!(worker.queued()[0].opcode(), Some(opcode::KICK_PLAYER));
    }

    #[test]
    fn test_generated_ids_are_alphanumeric() {
        for _ in 0..32 {
            let id = generate_id(4);
            assert_eq!(id.len(), 4);
            assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }
}
