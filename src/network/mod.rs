//! Network Layer
//!
//! WebSocket server, handshakes, the turn scheduler and fan-out.
//! Everything with a clock or a socket lives here; rules stay in `game/`.
//!
//! ## Module Structure
//!
//! - `protocol`: Wire messages for bots, controllers and observers
//! - `auth`: Secret checks and handshake errors
//! - `connection`: Bounded per-socket outboxes and writer tasks
//! - `broadcast`: Per-recipient tick building and fan-out
//! - `scheduler`: The battle-owning turn loop
//! - `server`: Accept loop and connection lifecycle

pub mod protocol;
pub mod auth;
pub mod connection;
pub mod broadcast;
pub mod scheduler;
pub mod server;

pub use auth::{HandshakeError, SecretSet};
pub use connection::{ConnectionHandle, ConnectionId, DeliveryError};
pub use protocol::{BotDetails, ClientMessage, ErrorCode, ServerMessage};
pub use scheduler::{Command, PeerRole, Scheduler, SchedulerInput};
pub use server::{GameServer, GameServerError, PortSetting, ServerConfig};
