//! WebSocket Game Server
//!
//! Accepts sockets, runs the handshake, and bridges each connection to the
//! turn scheduler. One reader and one writer task per socket; the scheduler
//! runs as its own task and owns the battle.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::network::auth::{check_game_types, HandshakeError, SecretSet};
use crate::network::connection::{run_writer, ConnectionHandle, ConnectionId};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerHandshake, ServerMessage};
use crate::network::scheduler::{Command, PeerRole, Scheduler, SchedulerInput};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7654;

/// Game types offered when none are configured.
pub const DEFAULT_GAME_TYPES: [&str; 3] = ["classic", "melee", "1v1"];

/// Port to listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSetting {
    Fixed(u16),
    /// Let the OS pick a free port and announce it on stdout
    Inherit,
}

impl PortSetting {
    fn bind_port(self) -> u16 {
        match self {
            Self::Fixed(port) => port,
            Self::Inherit => 0,
        }
    }
}

impl FromStr for PortSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("inherit") {
            return Ok(Self::Inherit);
        }
        s.parse::<u16>()
            .map(Self::Fixed)
            .map_err(|_| format!("expected a port number or \"inherit\", got {s:?}"))
    }
}

impl fmt::Display for PortSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(port) => write!(f, "{port}"),
            Self::Inherit => f.write_str("inherit"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: PortSetting,
    /// Game types this server offers, first is the default.
    pub game_types: Vec<String>,
    /// Secrets accepted from controllers. Empty means open.
    pub controller_secrets: SecretSet,
    /// Secrets accepted from bots. Empty means open.
    pub bot_secrets: SecretSet,
    /// Initial turns per second (-1 unlimited, 0 held).
    pub tps: i32,
    /// Honour bots' requested start positions.
    pub initial_positions_enabled: bool,
    /// Maximum concurrent sockets.
    pub max_connections: usize,
    /// Per-connection outbox capacity, in messages.
    pub outbox_capacity: usize,
    /// Time allowed for the first message.
    pub handshake_timeout: Duration,
    /// Stdin line that stops the server.
    pub quit_token: String,
    /// Server name in the handshake.
    pub name: String,
    /// Server version string.
    pub version: String,
    /// Game variant in the handshake.
    pub variant: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: PortSetting::Fixed(DEFAULT_PORT),
            game_types: DEFAULT_GAME_TYPES.iter().map(|t| t.to_string()).collect(),
            controller_secrets: SecretSet::default(),
            bot_secrets: SecretSet::default(),
            tps: 30,
            initial_positions_enabled: false,
            max_connections: 256,
            outbox_capacity: 256,
            handshake_timeout: Duration::from_secs(10),
            quit_token: "q".to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            variant: "Tank Battle".to_string(),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind or accept.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// WebSocket upgrade did not finish in time.
    #[error("WebSocket upgrade timed out")]
    UpgradeTimeout,

    /// Scheduler task is gone.
    #[error("scheduler stopped")]
    SchedulerStopped,
}

/// The game server.
pub struct GameServer {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    shutdown_tx: broadcast::Sender<()>,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
}

/// Decrements the live connection count when a connection task ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GameServer {
    /// Bind the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, GameServerError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port.bind_port())).await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config: Arc::new(config),
            listener,
            shutdown_tx,
            next_id: AtomicU64::new(1),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0 / inherit).
    pub fn local_addr(&self) -> Result<SocketAddr, GameServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run until [`GameServer::shutdown`] is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        info!("Game server listening on {}", self.local_addr()?);

        let (inbox_tx, inbox_rx) = mpsc::channel(1024);
        let scheduler = Scheduler::new(self.config.clone(), inbox_rx, self.shutdown_tx.subscribe());
        let scheduler_handle = tokio::spawn(scheduler.run());

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            self.active.fetch_add(1, Ordering::SeqCst);
                            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                            debug!(conn = id, "New connection from {}", addr);
                            self.handle_connection(stream, addr, id, inbox_tx.clone());
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(inbox_tx);
        if let Err(e) = scheduler_handle.await {
            error!("Scheduler task failed: {}", e);
        }
        info!("Game server stopped");
        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, id: ConnectionId, inbox: mpsc::Sender<SchedulerInput>) {
        let config = self.config.clone();
        let guard = ActiveGuard(self.active.clone());

        tokio::spawn(async move {
            let _guard = guard;
            match serve_connection(stream, addr, id, config, inbox).await {
                Ok(()) => debug!(conn = id, "Connection {} closed", addr),
                Err(e) => debug!(conn = id, "Connection {} ended: {}", addr, e),
            }
        });
    }

    /// Signal shutdown: the current turn finishes, the battle is aborted,
    /// and every connection is closed.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Live connections, including those still handshaking.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

// =============================================================================
// CONNECTION LIFECYCLE
// =============================================================================

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: ConnectionId,
    config: Arc<ServerConfig>,
    inbox: mpsc::Sender<SchedulerInput>,
) -> Result<(), GameServerError> {
    let ws = timeout(config.handshake_timeout, accept_async(stream))
        .await
        .map_err(|_| GameServerError::UpgradeTimeout)??;
    let (sink, mut source) = ws.split();

    let (handle, rx, kill) = ConnectionHandle::new(id, addr, config.outbox_capacity);
    let writer = tokio::spawn(run_writer(sink, rx, kill, id));

    let role = match timeout(config.handshake_timeout, read_first_message(&mut source)).await {
        Ok(Ok(message)) => authenticate(&config, message),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(HandshakeError::Timeout),
    };
    let role = match role {
        Ok(role) => role,
        Err(e) => {
            warn!(conn = id, "Handshake from {} rejected: {}", addr, e);
            handle.close(e.to_string());
            drop(handle);
            let _ = writer.await;
            return Ok(());
        }
    };

    let _ = handle.send(&ServerMessage::ServerHandshake(ServerHandshake {
        session_id: Uuid::new_v4().to_string(),
        name: config.name.clone(),
        version: config.version.clone(),
        variant: config.variant.clone(),
        game_types: config.game_types.clone(),
    }));

    if inbox
        .send(SchedulerInput::Joined { handle: handle.clone(), role: role.clone() })
        .await
        .is_err()
    {
        handle.close("server shutting down");
        drop(handle);
        let _ = writer.await;
        return Err(GameServerError::SchedulerStopped);
    }

    loop {
        tokio::select! {
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if !route(&role, &handle, &text, &inbox).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn = id, "Read failed: {}", e);
                    break;
                }
            },
            _ = handle.closed() => break,
        }
    }

    let _ = inbox.send(SchedulerInput::Left { id }).await;
    drop(handle);
    let _ = writer.await;
    Ok(())
}

/// Wait for the first text frame and parse it.
async fn read_first_message<S>(source: &mut S) -> Result<ClientMessage, HandshakeError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => {
                return ClientMessage::from_json(&text).map_err(|e| HandshakeError::Malformed(e.to_string()));
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return Err(HandshakeError::Closed),
            Some(Ok(_)) => {}
        }
    }
}

/// Decide the role from the first message and check its credentials.
pub fn authenticate(config: &ServerConfig, message: ClientMessage) -> Result<PeerRole, HandshakeError> {
    match message {
        ClientMessage::BotHandshake(hs) => {
            config.bot_secrets.verify(hs.secret.as_deref())?;
            check_game_types(&hs.details.game_types, &config.game_types)?;
            Ok(PeerRole::Bot(hs.details))
        }
        ClientMessage::ControllerHandshake(hs) => {
            config.controller_secrets.verify(hs.secret.as_deref())?;
            Ok(PeerRole::Controller(hs))
        }
        ClientMessage::ObserverHandshake(hs) => Ok(PeerRole::Observer(hs)),
        other => Err(HandshakeError::UnexpectedMessage(other.kind().to_string())),
    }
}

/// Forward one message to the scheduler. Returns false once the scheduler
/// is gone.
async fn route(role: &PeerRole, handle: &ConnectionHandle, text: &str, inbox: &mpsc::Sender<SchedulerInput>) -> bool {
    let id = handle.id;
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(conn = id, "Invalid message: {}", e);
            if !matches!(role, PeerRole::Bot(_)) {
                let _ = handle.send(&ServerMessage::rejected(ErrorCode::MalformedMessage, e.to_string()));
            }
            return true;
        }
    };

    let input = match (role, message) {
        (PeerRole::Bot(_), ClientMessage::BotReady) => SchedulerInput::Ready { id },
        (PeerRole::Bot(_), ClientMessage::BotIntent(update)) => SchedulerInput::Intent { id, update },
        (PeerRole::Bot(_), other) => {
            debug!(conn = id, kind = other.kind(), "Ignoring bot message");
            return true;
        }
        (PeerRole::Controller(_), message) => {
            let kind = message.kind();
            match Command::from_message(message) {
                Some(command) => SchedulerInput::Command { id, command },
                None => {
                    let _ = handle.send(&ServerMessage::rejected(
                        ErrorCode::NotAllowed,
                        format!("{kind} is not a controller command"),
                    ));
                    return true;
                }
            }
        }
        (PeerRole::Observer(_), message) => {
            if !message.is_handshake() {
                let _ = handle.send(&ServerMessage::rejected(
                    ErrorCode::NotAllowed,
                    format!("observers cannot send {}", message.kind()),
                ));
            }
            return true;
        }
    };
    inbox.send(input).await.is_ok()
}
