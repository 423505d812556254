//! Turn Scheduler
//!
//! A single task owns the battle. Connection tasks feed it through one
//! `mpsc` inbox; it never awaits a socket. Each turn it collects intents
//! until every alive bot has answered or the turn timeout runs out, waits
//! out the TPS period, applies the rules, and broadcasts the result.
//!
//! Controller commands that arrive while a turn is being collected are
//! queued and applied at the next turn boundary.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::core::rng::DeterministicRng;
use crate::game::intent::{BotIntent, BotIntentUpdate};
use crate::game::score::{BotResults, ScoreTracker};
use crate::game::setup::{GameSetup, GameSetupRequest};
use crate::game::state::{BotId, GameState, RoundEntry};
use crate::game::turn::run_turn;
use crate::network::broadcast::{bot_ticks, deliver, encode, fan_out, observer_tick};
use crate::network::connection::{ConnectionHandle, ConnectionId, OVERFLOW_REASON};
use crate::network::protocol::{
    BotAddress, BotDetails, BotInfo, ClientMessage, ErrorCode, Participant, PeerHandshake, ServerMessage,
};
use crate::network::server::ServerConfig;

/// TPS value meaning "as fast as bots answer".
pub const TPS_UNLIMITED: i32 = -1;

/// Who is on the other end of a connection.
#[derive(Debug, Clone)]
pub enum PeerRole {
    Bot(BotDetails),
    Controller(PeerHandshake),
    Observer(PeerHandshake),
}

/// Controller commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartGame {
        setup: Option<GameSetupRequest>,
        bots: Vec<BotAddress>,
    },
    StopGame,
    PauseGame,
    ResumeGame,
    NextTurn,
    RestartGame,
    ChangeTps(i32),
}

impl Command {
    /// Extract a command from a controller message.
    pub fn from_message(message: ClientMessage) -> Option<Self> {
        match message {
            ClientMessage::StartGame { game_setup, bot_addresses } => Some(Self::StartGame {
                setup: game_setup,
                bots: bot_addresses,
            }),
            ClientMessage::StopGame => Some(Self::StopGame),
            ClientMessage::PauseGame => Some(Self::PauseGame),
            ClientMessage::ResumeGame => Some(Self::ResumeGame),
            ClientMessage::NextTurn => Some(Self::NextTurn),
            ClientMessage::RestartGame => Some(Self::RestartGame),
            ClientMessage::ChangeTps { tps } => Some(Self::ChangeTps(tps)),
            _ => None,
        }
    }
}

/// Everything the scheduler hears from connection tasks.
#[derive(Debug)]
pub enum SchedulerInput {
    /// Handshake succeeded
    Joined { handle: ConnectionHandle, role: PeerRole },
    /// Socket closed
    Left { id: ConnectionId },
    /// Bot is ready for the game it was invited to
    Ready { id: ConnectionId },
    /// Bot intent for the turn being collected
    Intent { id: ConnectionId, update: BotIntentUpdate },
    /// Controller command
    Command { id: ConnectionId, command: Command },
}

// =============================================================================
// BATTLE STATE
// =============================================================================

struct ConnectedBot {
    handle: ConnectionHandle,
    details: BotDetails,
}

/// A bot taking part in the battle.
struct Seat {
    conn: ConnectionId,
    details: BotDetails,
}

enum Phase {
    /// Waiting for named bots to connect and every participant's `BotReady`
    AwaitingReady {
        deadline: Instant,
        pending: BTreeSet<BotId>,
        unresolved: Vec<BotAddress>,
    },
    /// Rounds in progress
    Running,
}

struct Battle {
    setup: GameSetup,
    phase: Phase,
    seats: BTreeMap<BotId, Seat>,
    by_conn: BTreeMap<ConnectionId, BotId>,
    state: GameState,
    scores: ScoreTracker,
    rng: DeterministicRng,
    /// Standing intents
    intents: BTreeMap<BotId, BotIntent>,
    /// Bots that answered during the current collection
    received: BTreeSet<BotId>,
    /// Participants whose connection is gone
    departed: BTreeSet<BotId>,
    paused: bool,
    /// Run exactly one turn while held
    step: bool,
    /// The next turn opens a round and is applied without collecting
    round_opening: bool,
    turn_started: Instant,
}

impl Battle {
    fn new(
        setup: GameSetup,
        seats: BTreeMap<BotId, Seat>,
        ready_deadline: Instant,
        unresolved: Vec<BotAddress>,
    ) -> Self {
        let seed = Uuid::new_v4();
        info!(seed = %seed, "Battle seed");

        let by_conn = seats.iter().map(|(id, seat)| (seat.conn, *id)).collect();
        let scores = ScoreTracker::new(seats.iter().map(|(id, seat)| (*id, seat.details.team_id)));
        Self {
            state: GameState::new(setup.clone()),
            phase: Phase::AwaitingReady {
                deadline: ready_deadline,
                pending: seats.keys().copied().collect(),
                unresolved,
            },
            setup,
            by_conn,
            seats,
            scores,
            rng: DeterministicRng::from_id_bytes(seed.as_bytes()),
            intents: BTreeMap::new(),
            received: BTreeSet::new(),
            departed: BTreeSet::new(),
            paused: false,
            step: false,
            round_opening: true,
            turn_started: Instant::now(),
        }
    }

    fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running)
    }

    /// Some named bots have not connected yet.
    fn awaiting_arrivals(&self) -> bool {
        matches!(&self.phase, Phase::AwaitingReady { unresolved, .. } if !unresolved.is_empty())
    }

    /// Seat a bot that connected after `StartGame`; it takes the next free id.
    fn seat(&mut self, conn: ConnectionId, details: BotDetails) -> BotId {
        let id = BotId(self.seats.keys().next_back().map_or(0, |last| last.0) + 1);
        self.seats.insert(id, Seat { conn, details });
        self.by_conn.insert(conn, id);
        if let Phase::AwaitingReady { pending, .. } = &mut self.phase {
            pending.insert(id);
        }
        self.scores = ScoreTracker::new(self.seats.iter().map(|(id, seat)| (*id, seat.details.team_id)));
        id
    }

    fn teammates(&self, id: BotId) -> Vec<BotId> {
        let team = self.seats.get(&id).and_then(|s| s.details.team_id);
        match team {
            None => Vec::new(),
            Some(team) => self
                .seats
                .iter()
                .filter(|(other, seat)| **other != id && seat.details.team_id == Some(team))
                .map(|(other, _)| *other)
                .collect(),
        }
    }

    fn participants(&self) -> Vec<Participant> {
        self.seats
            .iter()
            .map(|(id, seat)| Participant { id: *id, details: seat.details.clone() })
            .collect()
    }

    /// Every alive, connected bot has answered this turn.
    fn all_received(&self) -> bool {
        self.state
            .bots
            .keys()
            .all(|id| self.received.contains(id) || self.departed.contains(id))
    }

    fn turn_timeout(&self) -> Duration {
        Duration::from_micros(self.setup.turn_timeout)
    }
}

fn row_for(results: &[BotResults], id: BotId) -> Option<BotResults> {
    results.iter().find(|r| r.id == id).cloned()
}

fn address_matches(addr: &SocketAddr, target: &BotAddress) -> bool {
    if addr.port() != target.port {
        return false;
    }
    match target.host.parse::<IpAddr>() {
        Ok(ip) => ip == addr.ip(),
        Err(_) => target.host.eq_ignore_ascii_case("localhost") && addr.ip().is_loopback(),
    }
}

async fn sleep_until_or_never(wake: Option<Instant>) {
    match wake {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// The battle-owning task.
pub struct Scheduler {
    config: Arc<ServerConfig>,
    inbox: mpsc::Receiver<SchedulerInput>,
    shutdown: broadcast::Receiver<()>,
    bots: BTreeMap<ConnectionId, ConnectedBot>,
    controllers: BTreeMap<ConnectionId, ConnectionHandle>,
    observers: BTreeMap<ConnectionId, ConnectionHandle>,
    tps: i32,
    battle: Option<Battle>,
    pending: VecDeque<(ConnectionId, Command)>,
}

impl Scheduler {
    pub fn new(config: Arc<ServerConfig>, inbox: mpsc::Receiver<SchedulerInput>, shutdown: broadcast::Receiver<()>) -> Self {
        let tps = config.tps;
        Self {
            config,
            inbox,
            shutdown,
            bots: BTreeMap::new(),
            controllers: BTreeMap::new(),
            observers: BTreeMap::new(),
            tps,
            battle: None,
            pending: VecDeque::new(),
        }
    }

    /// Run until shutdown or until every sender of the inbox is gone.
    #[instrument(skip(self), name = "scheduler")]
    pub async fn run(mut self) {
        info!(tps = self.tps, "Scheduler started");
        loop {
            let wake = self.next_wake();
            tokio::select! {
                input = self.inbox.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
                _ = sleep_until_or_never(wake) => self.on_wake(),
                _ = self.shutdown.recv() => {
                    self.shut_down();
                    break;
                }
            }
            self.drain_commands();
        }
        info!("Scheduler stopped");
    }

    fn held(&self) -> bool {
        self.tps == 0 || self.battle.as_ref().map(|b| b.paused).unwrap_or(false)
    }

    /// Commands may be applied right away: nothing is being collected.
    fn at_boundary(&self) -> bool {
        match &self.battle {
            None => true,
            Some(battle) => !battle.is_running() || (self.held() && !battle.step),
        }
    }

    /// When the scheduler must act next without new input.
    fn next_wake(&self) -> Option<Instant> {
        let battle = self.battle.as_ref()?;
        match &battle.phase {
            Phase::AwaitingReady { deadline, .. } => Some(*deadline),
            Phase::Running => {
                if self.held() && !battle.step {
                    return None;
                }
                if battle.round_opening {
                    return Some(battle.turn_started);
                }
                let collected = if battle.all_received() {
                    battle.turn_started
                } else {
                    battle.turn_started + battle.turn_timeout()
                };
                let paced = if self.tps > 0 {
                    battle.turn_started + Duration::from_secs_f64(1.0 / self.tps as f64)
                } else {
                    battle.turn_started
                };
                Some(collected.max(paced))
            }
        }
    }

    fn on_wake(&mut self) {
        let (running, ready_expired) = match &self.battle {
            None => return,
            Some(battle) => match &battle.phase {
                Phase::AwaitingReady { deadline, pending, unresolved } => {
                    let expired = Instant::now() >= *deadline;
                    if expired {
                        warn!(missing = pending.len(), absent = unresolved.len(), "Bots not ready in time");
                    }
                    (false, expired)
                }
                Phase::Running => (true, false),
            },
        };

        if ready_expired {
            self.abort_game("ready timeout");
            return;
        }
        if !running {
            return;
        }

        // Turn boundary: queued commands go first
        while let Some((from, command)) = self.pending.pop_front() {
            self.apply_command(from, command);
        }
        if self.turn_due() {
            self.apply_turn();
        }
    }

    /// A running battle that is not held, or is single-stepping.
    fn turn_due(&self) -> bool {
        match &self.battle {
            Some(b) => b.is_running() && (!self.held() || b.step),
            None => false,
        }
    }

    fn drain_commands(&mut self) {
        while self.at_boundary() {
            let Some((from, command)) = self.pending.pop_front() else {
                break;
            };
            self.apply_command(from, command);
        }
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    fn handle_input(&mut self, input: SchedulerInput) {
        match input {
            SchedulerInput::Joined { handle, role } => self.on_joined(handle, role),
            SchedulerInput::Left { id } => self.on_left(id),
            SchedulerInput::Ready { id } => self.on_ready(id),
            SchedulerInput::Intent { id, update } => self.on_intent(id, update),
            SchedulerInput::Command { id, command } => {
                if self.at_boundary() {
                    self.apply_command(id, command);
                } else {
                    debug!(conn = id, ?command, "Command queued for turn boundary");
                    self.pending.push_back((id, command));
                }
            }
        }
    }

    fn on_joined(&mut self, handle: ConnectionHandle, role: PeerRole) {
        match role {
            PeerRole::Bot(details) => {
                info!(conn = handle.id, name = %details.name, version = %details.version, "Bot joined");
                let conn = handle.id;
                self.bots.insert(conn, ConnectedBot { handle, details });
                self.send_bot_list();
                self.seat_arrival(conn);
            }
            PeerRole::Controller(peer) => {
                info!(conn = handle.id, name = %peer.name, "Controller joined");
                if self.greet_viewer(&handle) {
                    self.controllers.insert(handle.id, handle);
                }
            }
            PeerRole::Observer(peer) => {
                info!(conn = handle.id, name = %peer.name, "Observer joined");
                if self.greet_viewer(&handle) {
                    self.observers.insert(handle.id, handle);
                }
            }
        }
    }

    /// Bot list, plus the setup when a battle is already under way.
    fn greet_viewer(&self, handle: &ConnectionHandle) -> bool {
        let mut delivered = deliver(handle, &self.bot_list()).is_ok();
        if let Some(battle) = self.battle.as_ref().filter(|b| b.is_running()) {
            delivered = delivered
                && deliver(
                    handle,
                    &ServerMessage::GameStartedEventForObserver {
                        game_setup: battle.setup.clone(),
                        participants: battle.participants(),
                    },
                )
                .is_ok();
        }
        if !delivered {
            handle.close(OVERFLOW_REASON);
        }
        delivered
    }

    /// A bot named in `StartGame` that has only now completed its handshake.
    fn seat_arrival(&mut self, conn: ConnectionId) {
        let Some(bot) = self.bots.get(&conn) else {
            return;
        };
        let addr = bot.handle.addr;
        let details = bot.details.clone();
        let Some(battle) = self.battle.as_mut() else {
            return;
        };
        let Phase::AwaitingReady { unresolved, .. } = &mut battle.phase else {
            return;
        };
        let Some(index) = unresolved.iter().position(|address| address_matches(&addr, address)) else {
            return;
        };
        unresolved.remove(index);

        let id = battle.seat(conn, details);
        info!(conn, bot = id.0, "Selected bot arrived");
        let invitation = ServerMessage::GameStartedEventForBot {
            my_id: id,
            teammate_ids: battle.teammates(id),
            game_setup: battle.setup.clone(),
        };
        self.send_bot(conn, &invitation);
    }

    fn on_left(&mut self, id: ConnectionId) {
        if self.controllers.remove(&id).is_some() {
            info!(conn = id, "Controller left");
            self.pending.retain(|(from, _)| *from != id);
            return;
        }
        if self.observers.remove(&id).is_some() {
            info!(conn = id, "Observer left");
            return;
        }
        if self.bots.remove(&id).is_none() {
            return;
        }
        info!(conn = id, "Bot left");
        self.send_bot_list();
        self.bot_departed(id);
    }

    /// A participant's connection is gone: it dies on the next turn.
    fn bot_departed(&mut self, conn: ConnectionId) {
        let Some(battle) = self.battle.as_mut() else {
            return;
        };
        let Some(bot_id) = battle.by_conn.get(&conn).copied() else {
            return;
        };
        battle.departed.insert(bot_id);
        let everyone_gone =
            !battle.awaiting_arrivals() && battle.seats.keys().all(|id| battle.departed.contains(id));

        if let Phase::AwaitingReady { pending, .. } = &mut battle.phase {
            pending.remove(&bot_id);
        }
        if everyone_gone {
            self.abort_game("all participants left");
        } else {
            self.maybe_begin();
        }
    }

    fn on_ready(&mut self, conn: ConnectionId) {
        let Some(battle) = self.battle.as_mut() else {
            debug!(conn, "BotReady with no game");
            return;
        };
        let Some(bot_id) = battle.by_conn.get(&conn).copied() else {
            return;
        };
        if let Phase::AwaitingReady { pending, .. } = &mut battle.phase {
            pending.remove(&bot_id);
        }
        self.maybe_begin();
    }

    fn on_intent(&mut self, conn: ConnectionId, update: BotIntentUpdate) {
        let Some(battle) = self.battle.as_mut() else {
            return;
        };
        if !battle.is_running() {
            return;
        }
        let Some(bot_id) = battle.by_conn.get(&conn).copied() else {
            return;
        };
        if !battle.state.bots.contains_key(&bot_id) {
            return;
        }
        battle.intents.entry(bot_id).or_default().merge(&update);
        battle.received.insert(bot_id);
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    fn apply_command(&mut self, from: ConnectionId, command: Command) {
        debug!(conn = from, ?command, "Applying command");
        match command {
            Command::StartGame { setup, bots } => self.start_game(from, setup, bots),
            Command::StopGame => {
                if self.battle.is_none() {
                    self.reject(from, ErrorCode::NoGameRunning, "no game to stop");
                } else {
                    info!("Game stopped by controller");
                    if self.turn_due() {
                        self.apply_turn();
                    }
                    self.abort_game("stopped");
                }
            }
            Command::PauseGame => match self.battle.as_mut() {
                None => self.reject(from, ErrorCode::NoGameRunning, "no game to pause"),
                Some(battle) => {
                    if !battle.paused {
                        battle.paused = true;
                        battle.step = false;
                        info!("Game paused");
                        self.send_viewers(&ServerMessage::GamePausedEventForObserver);
                    }
                }
            },
            Command::ResumeGame => match self.battle.as_mut() {
                None => self.reject(from, ErrorCode::NoGameRunning, "no game to resume"),
                Some(battle) => {
                    if battle.paused {
                        battle.paused = false;
                        info!("Game resumed");
                        self.send_viewers(&ServerMessage::GameResumedEventForObserver);
                    }
                }
            },
            Command::NextTurn => {
                let held = self.held();
                match self.battle.as_mut() {
                    Some(battle) if battle.is_running() => {
                        if held {
                            battle.step = true;
                        }
                    }
                    _ => self.reject(from, ErrorCode::NoGameRunning, "no running game"),
                }
            }
            Command::RestartGame => match self.battle.as_mut() {
                Some(battle) if battle.is_running() => {
                    info!("Game restarted");
                    battle.state = GameState::new(battle.setup.clone());
                    battle.scores =
                        ScoreTracker::new(battle.seats.iter().map(|(id, seat)| (*id, seat.details.team_id)));
                    battle.step = false;
                    self.start_round();
                }
                _ => self.reject(from, ErrorCode::NoGameRunning, "no running game"),
            },
            Command::ChangeTps(tps) => {
                if tps < TPS_UNLIMITED {
                    self.reject(from, ErrorCode::InvalidSetup, format!("invalid tps {tps}"));
                } else {
                    self.set_tps(tps);
                }
            }
        }
    }

    fn set_tps(&mut self, tps: i32) {
        if tps == self.tps {
            return;
        }
        info!(from = self.tps, to = tps, "TPS changed");
        self.tps = tps;
        self.send_viewers(&ServerMessage::TpsChangedEvent { tps });
    }

    fn reject(&mut self, to: ConnectionId, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        warn!(conn = to, ?code, "Command rejected: {}", message);
        let failed = match self.controllers.get(&to) {
            Some(handle) => deliver(handle, &ServerMessage::rejected(code, message)).is_err(),
            None => false,
        };
        if failed {
            self.drop_viewers(vec![to]);
        }
    }

    fn start_game(&mut self, from: ConnectionId, request: Option<GameSetupRequest>, mut addresses: Vec<BotAddress>) {
        if self.battle.is_some() {
            self.reject(from, ErrorCode::GameInProgress, "a game is already running");
            return;
        }

        addresses.sort();
        addresses.dedup();
        let mut selected: BTreeSet<ConnectionId> = BTreeSet::new();
        let mut unresolved: Vec<BotAddress> = Vec::new();
        if addresses.is_empty() {
            selected.extend(self.bots.keys().copied());
        }
        for address in addresses {
            match self.bots.values().find(|b| address_matches(&b.handle.addr, &address)) {
                Some(bot) => {
                    selected.insert(bot.handle.id);
                }
                None => unresolved.push(address),
            }
        }
        if selected.is_empty() && unresolved.is_empty() {
            self.reject(from, ErrorCode::InvalidSetup, "no bots to start a game with");
            return;
        }

        let setup = match GameSetup::from_request(
            request.as_ref(),
            &self.config.game_types,
            self.config.initial_positions_enabled,
            (selected.len() + unresolved.len()) as u32,
        ) {
            Ok(setup) => setup,
            Err(e) => {
                self.reject(from, ErrorCode::InvalidSetup, e.to_string());
                return;
            }
        };

        let seats: BTreeMap<BotId, Seat> = selected
            .iter()
            .zip(1u32..)
            .filter_map(|(conn, n)| {
                let bot = self.bots.get(conn)?;
                Some((BotId(n), Seat { conn: *conn, details: bot.details.clone() }))
            })
            .collect();

        info!(
            game_type = %setup.game_type,
            participants = seats.len(),
            absent = unresolved.len(),
            rounds = setup.number_of_rounds,
            "Starting game"
        );

        let deadline = Instant::now() + Duration::from_micros(setup.ready_timeout);
        let battle = Battle::new(setup, seats, deadline, unresolved);
        let invitations: Vec<(ConnectionId, ServerMessage)> = battle
            .seats
            .iter()
            .map(|(id, seat)| {
                let message = ServerMessage::GameStartedEventForBot {
                    my_id: *id,
                    teammate_ids: battle.teammates(*id),
                    game_setup: battle.setup.clone(),
                };
                (seat.conn, message)
            })
            .collect();
        self.battle = Some(battle);

        if let Some(tps) = request.as_ref().and_then(|r| r.default_turns_per_second) {
            self.set_tps(tps);
        }
        for (conn, message) in invitations {
            self.send_bot(conn, &message);
        }
    }

    /// Start the first round once nobody is left to wait for.
    fn maybe_begin(&mut self) {
        let Some(battle) = self.battle.as_mut() else {
            return;
        };
        let Phase::AwaitingReady { pending, unresolved, .. } = &battle.phase else {
            return;
        };
        if !pending.is_empty() || !unresolved.is_empty() {
            return;
        }
        battle.phase = Phase::Running;
        info!("All participants ready");
        let started = ServerMessage::GameStartedEventForObserver {
            game_setup: battle.setup.clone(),
            participants: battle.participants(),
        };
        self.send_viewers(&started);
        self.start_round();
    }

    // =========================================================================
    // ROUNDS AND TURNS
    // =========================================================================

    fn start_round(&mut self) {
        let Some(battle) = self.battle.as_mut() else {
            return;
        };
        let entries: Vec<RoundEntry> = battle
            .seats
            .iter()
            .map(|(id, seat)| RoundEntry {
                id: *id,
                team_id: seat.details.team_id,
                initial_position: seat.details.initial_position,
            })
            .collect();
        battle.state.start_round(&mut battle.rng, &entries);
        battle.scores.start_round();
        battle.intents = battle.seats.keys().map(|id| (*id, BotIntent::default())).collect();
        battle.received.clear();
        battle.round_opening = true;
        battle.turn_started = Instant::now();

        let round_number = battle.state.round;
        info!(round = round_number, "Round started");
        self.send_everyone(&ServerMessage::RoundStartedEvent { round_number });
    }

    fn apply_turn(&mut self) {
        let Some(mut battle) = self.battle.take() else {
            return;
        };

        let disconnected: BTreeSet<BotId> = battle
            .departed
            .iter()
            .filter(|id| battle.state.bots.contains_key(*id))
            .copied()
            .collect();
        let skipped: BTreeSet<BotId> = if battle.round_opening {
            BTreeSet::new()
        } else {
            battle
                .state
                .bots
                .keys()
                .filter(|id| !battle.received.contains(*id))
                .copied()
                .collect()
        };

        let result = match run_turn(&mut battle.state, &battle.intents, &skipped, &disconnected) {
            Ok(result) => result,
            Err(e) => {
                error!(round = battle.state.round, turn = battle.state.turn, "Aborting game: {}", e);
                self.battle = Some(battle);
                self.abort_game("internal error");
                return;
            }
        };
        debug!(
            round = battle.state.round,
            turn = battle.state.turn,
            events = result.events.len(),
            skipped = skipped.len(),
            "Turn applied"
        );

        battle.scores.record_turn(&result.events);

        // Bot ticks; a bot whose outbox overflows is treated as gone
        let mut overflowed = Vec::new();
        for (bot_id, message) in bot_ticks(&battle.state, &result.deaths, &result.events) {
            if battle.departed.contains(&bot_id) {
                continue;
            }
            let Some(seat) = battle.seats.get(&bot_id) else {
                continue;
            };
            let delivered = match self.bots.get(&seat.conn) {
                Some(bot) => deliver(&bot.handle, &message).is_ok(),
                None => false,
            };
            if !delivered {
                battle.departed.insert(bot_id);
                overflowed.push(seat.conn);
            }
        }

        if let Some(text) = encode(&observer_tick(&battle.state, &result.deaths, &result.events)) {
            self.fan_out_viewers(&text);
        }

        for intent in battle.intents.values_mut() {
            intent.clear_transient();
        }
        battle.received.clear();
        battle.round_opening = false;
        battle.step = false;
        battle.turn_started = Instant::now();

        let all_gone = battle.seats.keys().all(|id| battle.departed.contains(id));
        self.battle = Some(battle);
        for conn in overflowed {
            self.drop_bot(conn);
        }

        if result.round_ended {
            self.finish_round();
        } else if all_gone {
            self.abort_game("all participants left");
        }
    }

    fn finish_round(&mut self) {
        let Some(battle) = self.battle.as_mut() else {
            return;
        };
        let results = battle.scores.finish_round();
        let round_number = battle.state.round;
        let turn_number = battle.state.turn;
        let game_over = round_number >= battle.setup.number_of_rounds;
        let seats: Vec<(BotId, ConnectionId)> = battle.seats.iter().map(|(id, seat)| (*id, seat.conn)).collect();
        info!(round = round_number, turns = turn_number, "Round ended");

        for (id, conn) in &seats {
            if let Some(row) = row_for(&results, *id) {
                self.send_bot(*conn, &ServerMessage::RoundEndedEventForBot { round_number, turn_number, results: row });
            }
        }
        self.send_viewers(&ServerMessage::RoundEndedEventForObserver { round_number, turn_number, results });

        if !game_over {
            self.start_round();
            return;
        }

        let Some(battle) = self.battle.take() else {
            return;
        };
        let number_of_rounds = battle.setup.number_of_rounds;
        let totals = battle.scores.game_results();
        for (id, conn) in &seats {
            if let Some(row) = row_for(&totals, *id) {
                self.send_bot(*conn, &ServerMessage::GameEndedEventForBot { number_of_rounds, results: row });
            }
        }
        self.send_viewers(&ServerMessage::GameEndedEventForObserver { number_of_rounds, results: totals });
        info!(rounds = number_of_rounds, "Game ended");
    }

    fn abort_game(&mut self, reason: &str) {
        let Some(battle) = self.battle.take() else {
            return;
        };
        warn!(reason, round = battle.state.round, turn = battle.state.turn, "Game aborted");
        let aborted = ServerMessage::GameAbortedEvent;
        for seat in battle.seats.values() {
            self.send_bot(seat.conn, &aborted);
        }
        self.send_viewers(&aborted);
    }

    /// Finish the turn being collected, abort the battle, close everything.
    fn shut_down(&mut self) {
        info!("Scheduler shutting down");
        if self.turn_due() {
            self.apply_turn();
        }
        self.abort_game("server shutting down");

        for handle in self
            .bots
            .values()
            .map(|b| &b.handle)
            .chain(self.controllers.values())
            .chain(self.observers.values())
        {
            handle.close("server shutting down");
        }
    }

    // =========================================================================
    // FAN-OUT
    // =========================================================================

    fn bot_list(&self) -> ServerMessage {
        ServerMessage::BotListUpdate {
            bots: self
                .bots
                .values()
                .map(|b| BotInfo {
                    host: b.handle.addr.ip().to_string(),
                    port: b.handle.addr.port(),
                    details: b.details.clone(),
                })
                .collect(),
        }
    }

    fn send_bot_list(&mut self) {
        let list = self.bot_list();
        self.send_viewers(&list);
    }

    /// Controllers and observers.
    fn send_viewers(&mut self, message: &ServerMessage) {
        if let Some(text) = encode(message) {
            self.fan_out_viewers(&text);
        }
    }

    fn fan_out_viewers(&mut self, text: &Arc<str>) {
        let failed = fan_out(self.controllers.values().chain(self.observers.values()), text);
        self.drop_viewers(failed);
    }

    /// Viewers and the battle's participants.
    fn send_everyone(&mut self, message: &ServerMessage) {
        let Some(text) = encode(message) else {
            return;
        };
        let conns: Vec<ConnectionId> = self
            .battle
            .as_ref()
            .map(|battle| battle.seats.values().map(|seat| seat.conn).collect())
            .unwrap_or_default();
        let failed = fan_out(conns.iter().filter_map(|conn| self.bots.get(conn)).map(|b| &b.handle), &text);
        for conn in failed {
            self.drop_bot(conn);
        }
        self.fan_out_viewers(&text);
    }

    /// Send to one bot; a bot that cannot take it is dropped.
    fn send_bot(&mut self, conn: ConnectionId, message: &ServerMessage) {
        let failed = match self.bots.get(&conn) {
            Some(bot) => deliver(&bot.handle, message).is_err(),
            None => false,
        };
        if failed {
            self.drop_bot(conn);
        }
    }

    /// Close a bot that fell behind and treat it as disconnected.
    fn drop_bot(&mut self, conn: ConnectionId) {
        let Some(bot) = self.bots.remove(&conn) else {
            return;
        };
        warn!(conn, addr = %bot.handle.addr, "Dropping bot that cannot keep up");
        bot.handle.close(OVERFLOW_REASON);
        self.send_bot_list();
        self.bot_departed(conn);
    }

    /// Forget viewers whose delivery failed and close them.
    fn drop_viewers(&mut self, failed: Vec<ConnectionId>) {
        for id in failed {
            let handle = match self.controllers.remove(&id) {
                Some(handle) => {
                    self.pending.retain(|(from, _)| *from != id);
                    Some(handle)
                }
                None => self.observers.remove(&id),
            };
            if let Some(handle) = handle {
                warn!(conn = id, addr = %handle.addr, "Dropping viewer that cannot keep up");
                handle.close(OVERFLOW_REASON);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::connection::Outbound;
    use serde_json::Value;

    struct Peer {
        handle: ConnectionHandle,
        rx: mpsc::Receiver<Outbound>,
    }

    impl Peer {
        fn new(id: ConnectionId) -> Self {
            let (peer, _kill) = Self::with_capacity(id, 1024);
            peer
        }

        fn with_capacity(id: ConnectionId, capacity: usize) -> (Self, Arc<tokio::sync::Notify>) {
            let addr: SocketAddr = format!("127.0.0.1:{}", 5000 + id).parse().unwrap();
            let (handle, rx, kill) = ConnectionHandle::new(id, addr, capacity);
            (Self { handle, rx }, kill)
        }

        async fn next(&mut self) -> Value {
            let deadline = std::time::Duration::from_secs(5);
            loop {
                let item = tokio::time::timeout(deadline, self.rx.recv())
                    .await
                    .expect("timed out waiting for a message")
                    .expect("outbox open");
                if let Outbound::Message(text) = item {
                    return serde_json::from_str(&text).unwrap();
                }
            }
        }

        /// Next message of the given type, skipping others.
        async fn expect(&mut self, kind: &str) -> Value {
            loop {
                let value = self.next().await;
                if value["type"] == kind {
                    return value;
                }
            }
        }

        /// Read up to the given type, collecting observer tick turns on the way.
        async fn ticks_until(&mut self, kind: &str) -> Vec<u64> {
            let mut turns = Vec::new();
            loop {
                let value = self.next().await;
                if value["type"] == "TickEventForObserver" {
                    turns.push(value["turnNumber"].as_u64().unwrap());
                }
                if value["type"] == kind {
                    return turns;
                }
            }
        }

        fn drain_types(&mut self) -> Vec<String> {
            let mut types = Vec::new();
            while let Ok(Outbound::Message(text)) = self.rx.try_recv() {
                let value: Value = serde_json::from_str(&text).unwrap();
                types.push(value["type"].as_str().unwrap_or_default().to_string());
            }
            types
        }
    }

    fn config(tps: i32) -> Arc<ServerConfig> {
        Arc::new(ServerConfig { tps, ..ServerConfig::default() })
    }

    fn bot_details(name: &str) -> BotDetails {
        BotDetails { name: name.into(), version: "1.0".into(), ..Default::default() }
    }

    fn spawn(tps: i32) -> (mpsc::Sender<SchedulerInput>, broadcast::Sender<()>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(Scheduler::new(config(tps), rx, shutdown_rx).run());
        (tx, shutdown_tx, task)
    }

    async fn join(tx: &mpsc::Sender<SchedulerInput>, peer: &Peer, role: PeerRole) {
        tx.send(SchedulerInput::Joined { handle: peer.handle.clone(), role }).await.unwrap();
    }

    fn quick_setup(rounds: u32, inactivity: u32) -> GameSetupRequest {
        GameSetupRequest {
            game_type: Some("classic".into()),
            number_of_rounds: Some(rounds),
            max_inactivity_turns: Some(inactivity),
            turn_timeout: Some(2_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_command_from_message() {
        assert_eq!(Command::from_message(ClientMessage::ChangeTps { tps: 5 }), Some(Command::ChangeTps(5)));
        assert_eq!(Command::from_message(ClientMessage::BotReady), None);
    }

    #[test]
    fn test_address_matching() {
        let addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        assert!(address_matches(&addr, &BotAddress { host: "127.0.0.1".into(), port: 5001 }));
        assert!(address_matches(&addr, &BotAddress { host: "localhost".into(), port: 5001 }));
        assert!(!address_matches(&addr, &BotAddress { host: "127.0.0.1".into(), port: 5002 }));
        assert!(!address_matches(&addr, &BotAddress { host: "10.0.0.1".into(), port: 5001 }));
    }

    #[tokio::test]
    async fn test_invalid_setup_rejected() {
        let (tx, _shutdown, _task) = spawn(TPS_UNLIMITED);
        let mut controller = Peer::new(1);
        let bot = Peer::new(2);
        join(&tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;
        join(&tx, &bot, PeerRole::Bot(bot_details("Lonely"))).await;

        // classic needs two participants
        tx.send(SchedulerInput::Command {
            id: 1,
            command: Command::StartGame { setup: Some(quick_setup(1, 3)), bots: vec![] },
        })
        .await
        .unwrap();

        let rejected = controller.expect("CommandRejected").await;
        assert_eq!(rejected["code"], "invalid_setup");
    }

    #[tokio::test]
    async fn test_start_without_bots_rejected() {
        let (tx, _shutdown, _task) = spawn(TPS_UNLIMITED);
        let mut controller = Peer::new(1);
        join(&tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;
        tx.send(SchedulerInput::Command { id: 1, command: Command::StartGame { setup: None, bots: vec![] } })
            .await
            .unwrap();
        let rejected = controller.expect("CommandRejected").await;
        assert_eq!(rejected["code"], "invalid_setup");
    }

    #[tokio::test]
    async fn test_named_bot_joins_after_start() {
        let (tx, _shutdown, _task) = spawn(TPS_UNLIMITED);
        let mut controller = Peer::new(1);
        let mut a = Peer::new(2);
        let mut b = Peer::new(3);
        join(&tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;
        join(&tx, &a, PeerRole::Bot(bot_details("A"))).await;

        tx.send(SchedulerInput::Command {
            id: 1,
            command: Command::StartGame {
                setup: Some(quick_setup(1, 450)),
                bots: vec![
                    BotAddress { host: "127.0.0.1".into(), port: 5002 },
                    BotAddress { host: "127.0.0.1".into(), port: 5003 },
                ],
            },
        })
        .await
        .unwrap();
        let invited = a.expect("GameStartedEventForBot").await;
        assert_eq!(invited["myId"], 1);

        // B shows up only now and is still seated
        join(&tx, &b, PeerRole::Bot(bot_details("B"))).await;
        let invited = b.expect("GameStartedEventForBot").await;
        assert_eq!(invited["myId"], 2);

        tx.send(SchedulerInput::Ready { id: 2 }).await.unwrap();
        tx.send(SchedulerInput::Ready { id: 3 }).await.unwrap();
        let started = controller.expect("GameStartedEventForObserver").await;
        assert_eq!(started["participants"].as_array().unwrap().len(), 2);
        controller.expect("RoundStartedEvent").await;
        assert!(!controller.drain_types().contains(&"CommandRejected".to_string()));
    }

    #[tokio::test]
    async fn test_slow_viewer_dropped() {
        let (tx, _shutdown, _task) = spawn(TPS_UNLIMITED);
        let (mut slow, kill) = Peer::with_capacity(1, 2);
        let mut controller = Peer::new(5);
        join(&tx, &slow, PeerRole::Observer(PeerHandshake::default())).await;
        join(&tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;

        // Greeting plus one update fill the slow outbox; the next overflows it
        let bots: Vec<Peer> = (2..=4).map(Peer::new).collect();
        join(&tx, &bots[0], PeerRole::Bot(bot_details("A"))).await;
        join(&tx, &bots[1], PeerRole::Bot(bot_details("B"))).await;
        loop {
            let update = controller.expect("BotListUpdate").await;
            if update["bots"].as_array().unwrap().len() == 2 {
                break;
            }
        }
        tokio::time::timeout(std::time::Duration::from_secs(1), kill.notified())
            .await
            .expect("slow viewer cut off");
        assert_eq!(slow.drain_types(), vec!["BotListUpdate", "BotListUpdate"]);

        // No longer registered: later updates skip it entirely
        join(&tx, &bots[2], PeerRole::Bot(bot_details("C"))).await;
        loop {
            let update = controller.expect("BotListUpdate").await;
            if update["bots"].as_array().unwrap().len() == 3 {
                break;
            }
        }
        assert!(slow.drain_types().is_empty());
    }

    #[tokio::test]
    async fn test_full_game_with_silent_bots() {
        let (tx, _shutdown, _task) = spawn(TPS_UNLIMITED);
        let mut observer = Peer::new(1);
        let mut a = Peer::new(2);
        let mut b = Peer::new(3);
        join(&tx, &observer, PeerRole::Observer(PeerHandshake::default())).await;
        join(&tx, &a, PeerRole::Bot(bot_details("A"))).await;
        join(&tx, &b, PeerRole::Bot(bot_details("B"))).await;

        let controller = Peer::new(4);
        join(&tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;
        tx.send(SchedulerInput::Command {
            id: 4,
            command: Command::StartGame { setup: Some(quick_setup(1, 3)), bots: vec![] },
        })
        .await
        .unwrap();

        let started = a.expect("GameStartedEventForBot").await;
        assert_eq!(started["myId"], 1);
        b.expect("GameStartedEventForBot").await;
        tx.send(SchedulerInput::Ready { id: 2 }).await.unwrap();
        tx.send(SchedulerInput::Ready { id: 3 }).await.unwrap();

        observer.expect("RoundStartedEvent").await;
        let skips = |tick: &Value| -> Vec<Value> {
            tick["events"]
                .as_array()
                .unwrap()
                .iter()
                .filter(|e| e["type"] == "SkippedTurnEvent")
                .cloned()
                .collect()
        };

        // The opening turn is not collected, so nobody skips it
        let first = a.expect("TickEventForBot").await;
        assert_eq!(first["turnNumber"], 1);
        assert!(skips(&first).is_empty());

        // Nobody answers: turn 2 carries a skip for the receiving bot only
        let second = a.expect("TickEventForBot").await;
        assert_eq!(second["turnNumber"], 2);
        let skipped = skips(&second);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0]["botId"], 1);

        let round_end = observer.expect("RoundEndedEventForObserver").await;
        assert_eq!(round_end["turnNumber"], 3);
        let ended = observer.expect("GameEndedEventForObserver").await;
        assert_eq!(ended["numberOfRounds"], 1);
        assert_eq!(ended["results"].as_array().unwrap().len(), 2);
        a.expect("GameEndedEventForBot").await;
    }

    #[tokio::test]
    async fn test_intents_release_turn_early() {
        let (tx, _shutdown, _task) = spawn(TPS_UNLIMITED);
        let mut observer = Peer::new(1);
        let mut a = Peer::new(2);
        let mut b = Peer::new(3);
        join(&tx, &observer, PeerRole::Observer(PeerHandshake::default())).await;
        join(&tx, &a, PeerRole::Bot(bot_details("A"))).await;
        join(&tx, &b, PeerRole::Bot(bot_details("B"))).await;

        let mut setup = quick_setup(1, 450);
        setup.turn_timeout = Some(5_000_000);
        tx.send(SchedulerInput::Command { id: 1, command: Command::StartGame { setup: Some(setup), bots: vec![] } })
            .await
            .unwrap();
        tx.send(SchedulerInput::Ready { id: 2 }).await.unwrap();
        tx.send(SchedulerInput::Ready { id: 3 }).await.unwrap();

        a.expect("TickEventForBot").await;
        b.expect("TickEventForBot").await;
        let update = BotIntentUpdate { target_speed: Some(4.0), ..Default::default() };
        tx.send(SchedulerInput::Intent { id: 2, update: update.clone() }).await.unwrap();
        tx.send(SchedulerInput::Intent { id: 3, update }).await.unwrap();

        // Far sooner than the five second timeout
        let tick = tokio::time::timeout(std::time::Duration::from_secs(2), a.expect("TickEventForBot"))
            .await
            .expect("turn released by intents");
        assert_eq!(tick["turnNumber"], 2);
        assert_eq!(tick["botState"]["speed"], 1.0);
        observer.expect("TickEventForObserver").await;
    }

    #[tokio::test]
    async fn test_held_game_steps_one_turn() {
        let (tx, _shutdown, _task) = spawn(0);
        let mut observer = Peer::new(1);
        let mut a = Peer::new(2);
        let b = Peer::new(3);
        join(&tx, &observer, PeerRole::Controller(PeerHandshake::default())).await;
        join(&tx, &a, PeerRole::Bot(bot_details("A"))).await;
        join(&tx, &b, PeerRole::Bot(bot_details("B"))).await;

        tx.send(SchedulerInput::Command {
            id: 1,
            command: Command::StartGame { setup: Some(quick_setup(1, 450)), bots: vec![] },
        })
        .await
        .unwrap();
        tx.send(SchedulerInput::Ready { id: 2 }).await.unwrap();
        tx.send(SchedulerInput::Ready { id: 3 }).await.unwrap();
        observer.expect("RoundStartedEvent").await;

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!a.drain_types().contains(&"TickEventForBot".to_string()));

        tx.send(SchedulerInput::Command { id: 1, command: Command::NextTurn }).await.unwrap();
        let tick = observer.expect("TickEventForObserver").await;
        assert_eq!(tick["turnNumber"], 1);
        assert_eq!(tick["stateHash"].as_str().unwrap().len(), 64);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!observer.drain_types().contains(&"TickEventForObserver".to_string()));

        tx.send(SchedulerInput::Command { id: 1, command: Command::ChangeTps(-1) }).await.unwrap();
        let changed = observer.expect("TpsChangedEvent").await;
        assert_eq!(changed["tps"], -1);
        let tick = observer.expect("TickEventForObserver").await;
        assert_eq!(tick["turnNumber"], 2);
    }

    /// Controller plus two silent bots in a running single-round game.
    async fn running_game(tx: &mpsc::Sender<SchedulerInput>) -> (Peer, Peer, Peer) {
        let mut controller = Peer::new(1);
        let a = Peer::new(2);
        let b = Peer::new(3);
        join(tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;
        join(tx, &a, PeerRole::Bot(bot_details("A"))).await;
        join(tx, &b, PeerRole::Bot(bot_details("B"))).await;
        tx.send(SchedulerInput::Command {
            id: 1,
            command: Command::StartGame { setup: Some(quick_setup(1, 450)), bots: vec![] },
        })
        .await
        .unwrap();
        tx.send(SchedulerInput::Ready { id: 2 }).await.unwrap();
        tx.send(SchedulerInput::Ready { id: 3 }).await.unwrap();
        controller.expect("RoundStartedEvent").await;
        (controller, a, b)
    }

    #[tokio::test]
    async fn test_tps_zero_mid_game_holds_turns() {
        let (tx, _shutdown, _task) = spawn(20);
        let (mut controller, _a, _b) = running_game(&tx).await;
        let mut last = controller.expect("TickEventForObserver").await["turnNumber"].as_u64().unwrap();

        tx.send(SchedulerInput::Command { id: 1, command: Command::ChangeTps(0) }).await.unwrap();
        if let Some(turn) = controller.ticks_until("TpsChangedEvent").await.last() {
            last = *turn;
        }

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!controller.drain_types().contains(&"TickEventForObserver".to_string()));

        tx.send(SchedulerInput::Command { id: 1, command: Command::ChangeTps(20) }).await.unwrap();
        controller.expect("TpsChangedEvent").await;
        let tick = controller.expect("TickEventForObserver").await;
        assert_eq!(tick["roundNumber"], 1);
        assert_eq!(tick["turnNumber"], last + 1);
    }

    #[tokio::test]
    async fn test_pause_and_resume_keep_turn_sequence() {
        let (tx, _shutdown, _task) = spawn(20);
        let (mut controller, _a, _b) = running_game(&tx).await;
        let mut last = controller.expect("TickEventForObserver").await["turnNumber"].as_u64().unwrap();

        tx.send(SchedulerInput::Command { id: 1, command: Command::PauseGame }).await.unwrap();
        if let Some(turn) = controller.ticks_until("GamePausedEventForObserver").await.last() {
            last = *turn;
        }

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!controller.drain_types().contains(&"TickEventForObserver".to_string()));

        tx.send(SchedulerInput::Command { id: 1, command: Command::ResumeGame }).await.unwrap();
        controller.expect("GameResumedEventForObserver").await;
        let tick = controller.expect("TickEventForObserver").await;
        assert_eq!(tick["roundNumber"], 1);
        assert_eq!(tick["turnNumber"], last + 1);
    }

    #[tokio::test]
    async fn test_stop_finishes_current_turn() {
        let (tx, _shutdown, _task) = spawn(20);
        let (mut controller, _a, _b) = running_game(&tx).await;
        let opening = controller.expect("TickEventForObserver").await;
        assert_eq!(opening["turnNumber"], 1);

        tx.send(SchedulerInput::Command { id: 1, command: Command::StopGame }).await.unwrap();
        assert_eq!(controller.ticks_until("GameAbortedEvent").await, vec![2]);
    }

    #[tokio::test]
    async fn test_restart_then_stop() {
        let (tx, _shutdown, _task) = spawn(0);
        let mut controller = Peer::new(1);
        let mut a = Peer::new(2);
        let b = Peer::new(3);
        join(&tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;
        join(&tx, &a, PeerRole::Bot(bot_details("A"))).await;
        join(&tx, &b, PeerRole::Bot(bot_details("B"))).await;

        tx.send(SchedulerInput::Command {
            id: 1,
            command: Command::StartGame { setup: Some(quick_setup(3, 450)), bots: vec![] },
        })
        .await
        .unwrap();
        tx.send(SchedulerInput::Ready { id: 2 }).await.unwrap();
        tx.send(SchedulerInput::Ready { id: 3 }).await.unwrap();
        let started = controller.expect("RoundStartedEvent").await;
        assert_eq!(started["roundNumber"], 1);

        tx.send(SchedulerInput::Command { id: 1, command: Command::NextTurn }).await.unwrap();
        controller.expect("TickEventForObserver").await;

        tx.send(SchedulerInput::Command { id: 1, command: Command::RestartGame }).await.unwrap();
        let restarted = controller.expect("RoundStartedEvent").await;
        assert_eq!(restarted["roundNumber"], 1);

        tx.send(SchedulerInput::Command { id: 1, command: Command::StopGame }).await.unwrap();
        controller.expect("GameAbortedEvent").await;
        a.expect("GameAbortedEvent").await;

        tx.send(SchedulerInput::Command { id: 1, command: Command::StopGame }).await.unwrap();
        let rejected = controller.expect("CommandRejected").await;
        assert_eq!(rejected["code"], "no_game_running");

        tx.send(SchedulerInput::Command { id: 1, command: Command::RestartGame }).await.unwrap();
        let rejected = controller.expect("CommandRejected").await;
        assert_eq!(rejected["code"], "no_game_running");
    }

    #[tokio::test]
    async fn test_ready_timeout_aborts() {
        let (tx, _shutdown, _task) = spawn(TPS_UNLIMITED);
        let mut controller = Peer::new(1);
        let mut a = Peer::new(2);
        let b = Peer::new(3);
        join(&tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;
        join(&tx, &a, PeerRole::Bot(bot_details("A"))).await;
        join(&tx, &b, PeerRole::Bot(bot_details("B"))).await;

        let mut setup = quick_setup(1, 3);
        setup.ready_timeout = Some(50_000);
        tx.send(SchedulerInput::Command { id: 1, command: Command::StartGame { setup: Some(setup), bots: vec![] } })
            .await
            .unwrap();
        tx.send(SchedulerInput::Ready { id: 2 }).await.unwrap();

        controller.expect("GameAbortedEvent").await;
        a.expect("GameAbortedEvent").await;
    }

    #[tokio::test]
    async fn test_disconnected_bot_dies_next_turn() {
        let (tx, _shutdown, _task) = spawn(0);
        let mut controller = Peer::new(1);
        let a = Peer::new(2);
        let b = Peer::new(3);
        let c = Peer::new(4);
        join(&tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;
        join(&tx, &a, PeerRole::Bot(bot_details("A"))).await;
        join(&tx, &b, PeerRole::Bot(bot_details("B"))).await;
        join(&tx, &c, PeerRole::Bot(bot_details("C"))).await;

        tx.send(SchedulerInput::Command {
            id: 1,
            command: Command::StartGame { setup: Some(quick_setup(1, 450)), bots: vec![] },
        })
        .await
        .unwrap();
        for id in 2..=4 {
            tx.send(SchedulerInput::Ready { id }).await.unwrap();
        }
        controller.expect("RoundStartedEvent").await;

        tx.send(SchedulerInput::Left { id: 3 }).await.unwrap();
        tx.send(SchedulerInput::Command { id: 1, command: Command::NextTurn }).await.unwrap();

        let tick = controller.expect("TickEventForObserver").await;
        let deaths: Vec<&Value> = tick["events"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["type"] == "BotDeathEvent")
            .collect();
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0]["victimId"], 2);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_running_game() {
        let (tx, shutdown, task) = spawn(0);
        let mut controller = Peer::new(1);
        let a = Peer::new(2);
        let b = Peer::new(3);
        join(&tx, &controller, PeerRole::Controller(PeerHandshake::default())).await;
        join(&tx, &a, PeerRole::Bot(bot_details("A"))).await;
        join(&tx, &b, PeerRole::Bot(bot_details("B"))).await;
        tx.send(SchedulerInput::Command {
            id: 1,
            command: Command::StartGame { setup: Some(quick_setup(1, 450)), bots: vec![] },
        })
        .await
        .unwrap();
        tx.send(SchedulerInput::Ready { id: 2 }).await.unwrap();
        tx.send(SchedulerInput::Ready { id: 3 }).await.unwrap();
        controller.expect("RoundStartedEvent").await;

        shutdown.send(()).unwrap();
        controller.expect("GameAbortedEvent").await;
        task.await.unwrap();
        assert!(matches!(controller.rx.recv().await, Some(Outbound::Close { .. })));
    }
}
