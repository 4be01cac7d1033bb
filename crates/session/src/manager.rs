//! Host-authoritative session lifecycle.
//!
//! Connection-open is not game-level join: a guest's connection sits in
//! `PendingApproval` until the host approves it (or the room has auto-join).
//! The manager owns the roster and rebroadcasts `ROOM_SYNC` on every
//! membership change; transport failures are classified and surfaced as
//! events, never panics.

use std::collections::{HashMap, VecDeque};

use tracing::{info, warn};
use world::PlayerId;

use crate::protocol::{self, Message, RosterEntry};
use crate::transport::{ConnId, Transport, TransportError, TransportEvent};

/// Ticks a kicked connection stays open so the `KICKED` line can flush.
const KICK_GRACE_TICKS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

/// User-facing failure classification. The raw error stays in the log line;
/// the UI only ever sees one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    IncompatibleEnvironment,
    PeerUnreachable,
    Network,
}

impl ErrorKind {
    pub fn classify(error: &TransportError) -> Self {
        match error {
            TransportError::Bind(_) => ErrorKind::IncompatibleEnvironment,
            TransportError::Connect { .. } => ErrorKind::PeerUnreachable,
            TransportError::InvalidAddress(_) => ErrorKind::PeerUnreachable,
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::IncompatibleEnvironment => {
                "this environment cannot open a peer endpoint"
            }
            ErrorKind::PeerUnreachable => "the room's host could not be reached",
            ErrorKind::Network => "a network error interrupted the session",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected(PlayerId),
    Error { kind: ErrorKind, detail: String },
    JoinRequested { peer: PlayerId, name: String },
    PlayerJoined { peer: PlayerId, name: String },
    PlayerLeft { peer: PlayerId },
    Approved,
    Rejected { reason: Option<String> },
    Kicked,
    Message { from: PlayerId, message: Message },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnPhase {
    /// Transport-level open seen, no game-level handshake yet.
    Connecting,
    /// Guest side: JOIN_REQUEST sent, waiting on the host.
    AwaitingApproval,
    /// Host side: JOIN_REQUEST received, waiting on local approval.
    PendingApproval,
    Active,
}

struct PeerConn {
    phase: ConnPhase,
    peer: Option<PlayerId>,
    name: String,
}

pub struct SessionManager {
    transport: Box<dyn Transport>,
    role: Role,
    local_name: String,
    auto_join: bool,
    max_players: usize,
    conns: HashMap<ConnId, PeerConn>,
    kick_grace: Vec<(ConnId, u32)>,
    roster: Vec<RosterEntry>,
    events: VecDeque<SessionEvent>,
    /// Guest's single connection to the host.
    host_conn: Option<ConnId>,
    seed: Option<String>,
}

impl SessionManager {
    pub fn new(transport: Box<dyn Transport>, local_name: &str) -> Self {
        Self {
            transport,
            role: Role::Guest,
            local_name: local_name.to_string(),
            auto_join: false,
            max_players: 4,
            conns: HashMap::new(),
            kick_grace: Vec::new(),
            roster: Vec::new(),
            events: VecDeque::new(),
            host_conn: None,
            seed: None,
        }
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.transport.local_id().cloned()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    pub fn set_auto_join(&mut self, auto_join: bool) {
        self.auto_join = auto_join;
    }

    pub fn set_max_players(&mut self, max_players: usize) {
        self.max_players = max_players.max(1);
    }

    pub fn set_seed(&mut self, seed: &str) {
        self.seed = Some(seed.to_string());
    }

    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    /// Connected-player count including the local player.
    pub fn player_count(&self) -> usize {
        1 + self
            .conns
            .values()
            .filter(|c| c.phase == ConnPhase::Active)
            .count()
    }

    pub fn pending_requests(&self) -> Vec<(PlayerId, String)> {
        self.conns
            .values()
            .filter(|c| c.phase == ConnPhase::PendingApproval)
            .filter_map(|c| c.peer.clone().map(|peer| (peer, c.name.clone())))
            .collect()
    }

    /// Confirms the local endpoint is reachable. Emits `Connected` with the
    /// public identifier, or a classified `Error`.
    pub fn init(&mut self) {
        match self.transport.local_id().cloned() {
            Some(id) => {
                info!(peer = %id, "session_endpoint_ready");
                self.events.push_back(SessionEvent::Connected(id));
            }
            None => self.push_error(ErrorKind::IncompatibleEnvironment, "no local endpoint"),
        }
    }

    /// Marks this peer as the room's host. Heartbeat publication is paced by
    /// the caller; see `directory`.
    pub fn host(&mut self) {
        self.role = Role::Host;
        self.rebuild_roster();
        info!(name = %self.local_name, "session_hosting");
    }

    /// Two-phase join: open the connection now, send `JOIN_REQUEST` when the
    /// transport reports the open event.
    pub fn join(&mut self, target: &PlayerId) {
        self.role = Role::Guest;
        match self.transport.connect(target) {
            Ok(conn) => {
                self.conns.insert(
                    conn,
                    PeerConn {
                        phase: ConnPhase::Connecting,
                        peer: Some(target.clone()),
                        name: String::new(),
                    },
                );
                self.host_conn = Some(conn);
            }
            Err(error) => {
                let kind = ErrorKind::classify(&error);
                self.push_error(kind, &error.to_string());
            }
        }
    }

    pub fn approve_join(&mut self, peer: &PlayerId) {
        let Some(conn) = self.conn_for_peer(peer, ConnPhase::PendingApproval) else {
            warn!(%peer, "approve_join_no_pending_request");
            return;
        };
        self.activate_guest(conn);
    }

    pub fn reject_join(&mut self, peer: &PlayerId, reason: Option<&str>) {
        let Some(conn) = self.conn_for_peer(peer, ConnPhase::PendingApproval) else {
            return;
        };
        self.send_message(
            conn,
            &Message::JoinRejected {
                reason: reason.map(ToString::to_string),
            },
        );
        self.conns.remove(&conn);
        self.kick_grace.push((conn, KICK_GRACE_TICKS));
        info!(%peer, "join_rejected");
    }

    /// Sends `KICKED`, then closes after a short grace so the message can
    /// flush. The roster updates immediately.
    pub fn kick(&mut self, peer: &PlayerId) {
        let Some(conn) = self.conn_for_peer(peer, ConnPhase::Active) else {
            return;
        };
        self.send_message(conn, &Message::Kicked);
        self.conns.remove(&conn);
        self.kick_grace.push((conn, KICK_GRACE_TICKS));
        self.events
            .push_back(SessionEvent::PlayerLeft { peer: peer.clone() });
        info!(%peer, "player_kicked");
        self.rebuild_roster();
        self.broadcast_roster();
    }

    /// Best-effort fan-out to every active connection.
    pub fn broadcast(&mut self, message: &Message) {
        let Some(line) = protocol::encode(message) else {
            return;
        };
        let targets: Vec<ConnId> = self
            .conns
            .iter()
            .filter(|(_, c)| c.phase == ConnPhase::Active)
            .map(|(&id, _)| id)
            .collect();
        for conn in targets {
            self.transport.send(conn, &line);
        }
    }

    /// Star-topology relay: the host re-broadcasts a guest's message to every
    /// other active connection. Guests have no relay duty.
    pub fn relay(&mut self, message: &Message, from: &PlayerId) {
        if self.role != Role::Host {
            return;
        }
        let Some(line) = protocol::encode(message) else {
            return;
        };
        let targets: Vec<ConnId> = self
            .conns
            .iter()
            .filter(|(_, c)| c.phase == ConnPhase::Active && c.peer.as_ref() != Some(from))
            .map(|(&id, _)| id)
            .collect();
        for conn in targets {
            self.transport.send(conn, &line);
        }
    }

    pub fn send_to(&mut self, peer: &PlayerId, message: &Message) {
        if let Some(conn) = self.conn_for_peer(peer, ConnPhase::Active) {
            self.send_message(conn, message);
        }
    }

    /// One pump of the network side: transport events in, session events out.
    /// Call once per simulation tick, then drain events at the tick boundary.
    pub fn tick(&mut self) {
        let mut transport_events = Vec::new();
        self.transport.poll(&mut transport_events);
        for event in transport_events {
            match event {
                TransportEvent::Opened { conn, peer } => self.on_opened(conn, peer),
                TransportEvent::Data { conn, line } => self.on_data(conn, &line),
                TransportEvent::Closed { conn } => self.on_closed(conn),
            }
        }

        let mut still_waiting = Vec::new();
        for (conn, ticks_left) in self.kick_grace.drain(..) {
            if ticks_left == 0 {
                self.transport.close(conn);
            } else {
                still_waiting.push((conn, ticks_left - 1));
            }
        }
        self.kick_grace = still_waiting;
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    fn on_opened(&mut self, conn: ConnId, peer: Option<PlayerId>) {
        if self.host_conn == Some(conn) {
            // Guest side: the transport connection is up; ask to join.
            let id = self.local_id().unwrap_or_else(|| PlayerId(String::new()));
            let name = self.local_name.clone();
            self.send_message(conn, &Message::JoinRequest { id, name });
            if let Some(state) = self.conns.get_mut(&conn) {
                state.phase = ConnPhase::AwaitingApproval;
            }
            return;
        }
        // Host side: inbound connection, identity arrives with JOIN_REQUEST.
        self.conns.entry(conn).or_insert(PeerConn {
            phase: ConnPhase::Connecting,
            peer,
            name: String::new(),
        });
    }

    fn on_data(&mut self, conn: ConnId, line: &str) {
        let Some(message) = protocol::decode(line) else {
            return;
        };
        match message {
            Message::JoinRequest { id, name } => self.on_join_request(conn, id, name),
            Message::JoinApproved => {
                if self.host_conn == Some(conn) {
                    if let Some(state) = self.conns.get_mut(&conn) {
                        state.phase = ConnPhase::Active;
                    }
                    self.events.push_back(SessionEvent::Approved);
                }
            }
            Message::JoinRejected { reason } => {
                if self.host_conn == Some(conn) {
                    self.events.push_back(SessionEvent::Rejected { reason });
                    self.close_own(conn);
                }
            }
            Message::Kicked => {
                if self.host_conn == Some(conn) {
                    self.events.push_back(SessionEvent::Kicked);
                    self.close_own(conn);
                }
            }
            Message::RoomSync { players } => {
                // Full replacement, never a merge.
                self.roster = players.clone();
                if let Some(from) = self.peer_of(conn) {
                    self.events.push_back(SessionEvent::Message {
                        from,
                        message: Message::RoomSync { players },
                    });
                }
            }
            other => {
                let Some(from) = self.peer_of(conn) else {
                    // Not an approved participant; drop gameplay traffic.
                    return;
                };
                if self
                    .conns
                    .get(&conn)
                    .map_or(true, |c| c.phase != ConnPhase::Active)
                {
                    return;
                }
                self.events.push_back(SessionEvent::Message {
                    from,
                    message: other,
                });
            }
        }
    }

    fn on_join_request(&mut self, conn: ConnId, id: PlayerId, name: String) {
        if self.role != Role::Host {
            return;
        }
        {
            let Some(state) = self.conns.get_mut(&conn) else {
                return;
            };
            state.peer = Some(id.clone());
            state.name = name.clone();
        }

        if self.player_count() >= self.max_players {
            self.reject_conn(conn, "room is full");
            return;
        }
        if self.auto_join {
            self.activate_guest(conn);
        } else {
            if let Some(state) = self.conns.get_mut(&conn) {
                state.phase = ConnPhase::PendingApproval;
            }
            self.events
                .push_back(SessionEvent::JoinRequested { peer: id, name });
        }
    }

    fn on_closed(&mut self, conn: ConnId) {
        let Some(state) = self.conns.remove(&conn) else {
            return;
        };
        // Removing the connection up front guarantees exactly one
        // PlayerLeft no matter which side initiated the close.
        match state.phase {
            ConnPhase::Active => {
                if let Some(peer) = state.peer {
                    self.events.push_back(SessionEvent::PlayerLeft { peer });
                }
                if self.role == Role::Host {
                    self.rebuild_roster();
                    self.broadcast_roster();
                }
            }
            ConnPhase::PendingApproval => {
                // A vanished requester leaves the pending queue silently.
                info!(conn = conn.0, "pending_join_dequeued_on_close");
            }
            ConnPhase::Connecting | ConnPhase::AwaitingApproval => {
                if self.host_conn == Some(conn) {
                    self.push_error(ErrorKind::PeerUnreachable, "connection closed during join");
                }
            }
        }
        if self.host_conn == Some(conn) {
            self.host_conn = None;
        }
    }

    fn activate_guest(&mut self, conn: ConnId) {
        let (peer, name) = match self.conns.get_mut(&conn) {
            Some(state) => {
                state.phase = ConnPhase::Active;
                (state.peer.clone(), state.name.clone())
            }
            None => return,
        };
        self.send_message(conn, &Message::JoinApproved);
        if let Some(seed) = self.seed.clone() {
            self.send_message(conn, &Message::SyncSeed { seed });
        }
        if let Some(peer) = peer {
            self.events.push_back(SessionEvent::PlayerJoined {
                peer: peer.clone(),
                name,
            });
            info!(%peer, "player_joined");
        }
        self.rebuild_roster();
        self.broadcast_roster();
    }

    fn reject_conn(&mut self, conn: ConnId, reason: &str) {
        self.send_message(
            conn,
            &Message::JoinRejected {
                reason: Some(reason.to_string()),
            },
        );
        self.conns.remove(&conn);
        self.kick_grace.push((conn, KICK_GRACE_TICKS));
    }

    fn rebuild_roster(&mut self) {
        if self.role != Role::Host {
            return;
        }
        let mut roster = Vec::new();
        if let Some(id) = self.local_id() {
            roster.push(RosterEntry {
                id,
                name: self.local_name.clone(),
            });
        }
        for state in self.conns.values() {
            if state.phase == ConnPhase::Active {
                if let Some(peer) = &state.peer {
                    roster.push(RosterEntry {
                        id: peer.clone(),
                        name: state.name.clone(),
                    });
                }
            }
        }
        if roster.len() > 2 {
            roster[1..].sort_by(|a, b| a.id.cmp(&b.id));
        }
        self.roster = roster;
    }

    fn broadcast_roster(&mut self) {
        if self.role != Role::Host {
            return;
        }
        let players = self.roster.clone();
        self.broadcast(&Message::RoomSync { players });
    }

    fn send_message(&mut self, conn: ConnId, message: &Message) {
        if let Some(line) = protocol::encode(message) {
            self.transport.send(conn, &line);
        }
    }

    fn close_own(&mut self, conn: ConnId) {
        self.transport.close(conn);
        self.conns.remove(&conn);
        if self.host_conn == Some(conn) {
            self.host_conn = None;
        }
    }

    fn conn_for_peer(&self, peer: &PlayerId, phase: ConnPhase) -> Option<ConnId> {
        self.conns
            .iter()
            .find(|(_, c)| c.phase == phase && c.peer.as_ref() == Some(peer))
            .map(|(&id, _)| id)
    }

    fn peer_of(&self, conn: ConnId) -> Option<PlayerId> {
        self.conns.get(&conn).and_then(|c| c.peer.clone())
    }

    fn push_error(&mut self, kind: ErrorKind, detail: &str) {
        warn!(?kind, detail, "session_error");
        self.events.push_back(SessionEvent::Error {
            kind,
            detail: detail.to_string(),
        });
    }
}
