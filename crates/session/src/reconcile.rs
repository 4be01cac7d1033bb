//! Folds incoming peer messages into local simulation state.
//!
//! Delivery is best-effort: messages arrive unordered across connections,
//! duplicated by the host relay, and sometimes not at all. Every handler is
//! therefore written as an idempotent command (pickups are a one-way flag,
//! the train never moves backward, rosters are replaced wholesale) so that
//! replaying any suffix of the message history converges to the same state.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};
use world::{
    string_to_seed, PlayerId, RemotePlayer, SimulationState, Vec2, WallKind, WorldGenerator,
};

use crate::manager::SessionManager;
use crate::protocol::{Message, NetRate, RosterEntry, TrainSync};

/// Where the world rebuilds when a seed arrives outside a run.
const DEFAULT_CHECKPOINT: Vec2 = Vec2 { x: 0.0, y: 400.0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Menu,
    Lobby,
    Playing,
}

pub struct Reconciler {
    local_id: PlayerId,
    phase: Phase,
    seed: Option<String>,
    ready: BTreeMap<PlayerId, bool>,
    deaths: BTreeSet<PlayerId>,
    net_rate: NetRate,
    tick: u64,
}

impl Reconciler {
    pub fn new(local_id: PlayerId) -> Self {
        Self {
            local_id,
            phase: Phase::Menu,
            seed: None,
            ready: BTreeMap::new(),
            deaths: BTreeSet::new(),
            net_rate: NetRate::default(),
            tick: 0,
        }
    }

    pub fn local_id(&self) -> &PlayerId {
        &self.local_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    pub fn net_rate(&self) -> NetRate {
        self.net_rate
    }

    pub fn set_net_rate(&mut self, rate: NetRate) {
        self.net_rate = rate;
    }

    pub fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Host: fold a ready-state change and return whether the map changed
    /// (a change is what triggers a `READY_STATE_SYNC` broadcast).
    pub fn set_ready(&mut self, id: PlayerId, is_ready: bool) -> bool {
        self.ready.insert(id, is_ready) != Some(is_ready)
    }

    pub fn ready_map(&self) -> &BTreeMap<PlayerId, bool> {
        &self.ready
    }

    /// Start is gated on every roster entry being marked ready.
    pub fn all_ready(&self, roster: &[RosterEntry]) -> bool {
        !roster.is_empty()
            && roster
                .iter()
                .all(|entry| self.ready.get(&entry.id).copied().unwrap_or(false))
    }

    pub fn record_death(&mut self, id: PlayerId) {
        self.deaths.insert(id);
    }

    /// Drops a departed player from the ready and death rosters.
    pub fn forget(&mut self, id: &PlayerId) {
        self.ready.remove(id);
        self.deaths.remove(id);
    }

    pub fn death_count(&self) -> usize {
        self.deaths.len()
    }

    /// Host arbitration: the run ends when every participant is dead.
    pub fn all_players_dead(&self, party_size: usize) -> bool {
        party_size > 0 && self.deaths.len() >= party_size
    }

    pub fn make_player_state(&self, state: &SimulationState) -> Message {
        let p = &state.player;
        Message::PlayerState {
            id: self.local_id.clone(),
            pos: p.pos,
            angle: p.angle,
            health: p.health,
            cargo_pos: p.cargo_pos,
            cargo_angle: p.cargo_angle,
            thrust_power: p.thrust,
        }
    }

    pub fn make_sync_env(&self, state: &SimulationState, gen: &WorldGenerator) -> Message {
        Message::SyncEnv {
            train: TrainSync {
                x: state.train.x,
                speed: state.train.speed,
            },
            next_gen_x: gen.cursor(),
            map_gen_start_x: gen.origin(),
            net_rate: Some(self.net_rate),
        }
    }

    /// Adopts a seed locally (host path; guests get theirs via `SYNC_SEED`).
    pub fn adopt_seed(
        &mut self,
        seed: &str,
        state: &mut SimulationState,
        gen: &mut WorldGenerator,
    ) {
        self.seed = Some(seed.to_string());
        gen.init_world(state, DEFAULT_CHECKPOINT, string_to_seed(seed));
        if self.phase != Phase::Playing {
            self.phase = Phase::Lobby;
        }
    }

    /// Session-wide transitions fire here both for received messages and for
    /// the host's own loop; the host self-dispatches before broadcasting so
    /// its local state machine and its peers see the same sequence.
    pub fn apply_transition(
        &mut self,
        message: &Message,
        state: &mut SimulationState,
        gen: &mut WorldGenerator,
    ) {
        match message {
            Message::GameStart => {
                self.deaths.clear();
                state.revive_local_player();
                // Spawn on the last delivery pad, rebuilding it if the train
                // already ran it over.
                let respawn_x = state.last_delivery_wall_x;
                let pad = match state.walls.iter().find(|w| {
                    w.kind == WallKind::Checkpoint && (w.x - respawn_x).abs() < 1.0
                }) {
                    Some(wall) => Vec2::new(wall.x, wall.y),
                    None => state.regenerate_checkpoint(respawn_x, DEFAULT_CHECKPOINT.y),
                };
                state.player.pos = Vec2::new(pad.x + 80.0, pad.y - 30.0);
                self.phase = Phase::Playing;
                info!("game_started");
            }
            Message::GameRestart => {
                self.deaths.clear();
                for flag in self.ready.values_mut() {
                    *flag = false;
                }
                self.phase = Phase::Lobby;
                info!("game_returned_to_lobby");
            }
            Message::GlobalRestart => {
                self.deaths.clear();
                state.revive_local_player();
                if let Some(seed) = self.seed.clone() {
                    gen.init_world(state, DEFAULT_CHECKPOINT, string_to_seed(&seed));
                }
                self.phase = Phase::Playing;
                info!("world_fully_restarted");
            }
            _ => {}
        }
    }

    /// Folds one incoming message. Handshake traffic never reaches here; the
    /// session manager consumes it.
    pub fn handle(
        &mut self,
        from: &PlayerId,
        message: Message,
        state: &mut SimulationState,
        gen: &mut WorldGenerator,
        manager: &mut SessionManager,
    ) {
        match message {
            Message::PlayerState {
                ref id,
                pos,
                angle,
                health,
                cargo_pos,
                cargo_angle,
                thrust_power,
            } => {
                if manager.is_host() {
                    manager.relay(&message, from);
                }
                if *id == self.local_id {
                    // Relayed echo of our own state.
                    return;
                }
                let tick = self.tick;
                let entry = state
                    .remote_players
                    .entry(id.clone())
                    .or_insert_with(|| RemotePlayer {
                        id: id.clone(),
                        pos,
                        angle,
                        health,
                        cargo_pos,
                        cargo_angle,
                        thrust_power,
                        alive: true,
                        target_pos: pos,
                        target_angle: angle,
                        last_update_tick: tick,
                    });
                entry.target_pos = pos;
                entry.target_angle = angle;
                entry.health = health;
                entry.cargo_pos = cargo_pos;
                entry.cargo_angle = cargo_angle;
                entry.thrust_power = thrust_power;
                entry.last_update_tick = tick;
            }
            Message::PlayerDeath { ref id } => {
                if manager.is_host() {
                    manager.relay(&message, from);
                }
                if *id == self.local_id {
                    return;
                }
                self.deaths.insert(id.clone());
                if let Some(remote) = state.remote_players.get_mut(id) {
                    remote.alive = false;
                }
            }
            Message::PickupCollect { pickup_type, x, y } => {
                if manager.is_host() {
                    manager.relay(&message, from);
                }
                let applied = state.apply_pickup_collect(pickup_type, x, y);
                if !applied {
                    debug!(?pickup_type, x, y, "pickup_collect_no_match");
                }
            }
            Message::SyncEnv {
                train,
                next_gen_x,
                map_gen_start_x,
                net_rate,
            } => {
                if manager.is_host() {
                    // The host is the authority; its own replica never yields.
                    return;
                }
                if let Some(rate) = net_rate {
                    self.net_rate = rate;
                }
                state.sync_train_remote(train.x, train.speed);
                if gen.needs_hard_resync(map_gen_start_x, next_gen_x) {
                    let seed = gen.seed();
                    gen.hard_resync(state, seed, map_gen_start_x, next_gen_x);
                } else {
                    gen.fast_forward(state, next_gen_x);
                }
            }
            Message::SyncSeed { seed } => {
                self.seed = Some(seed.clone());
                gen.init_world(state, DEFAULT_CHECKPOINT, string_to_seed(&seed));
                if self.phase != Phase::Playing {
                    self.phase = Phase::Lobby;
                }
                info!(%seed, "seed_adopted");
            }
            Message::GameStart | Message::GameRestart | Message::GlobalRestart => {
                self.apply_transition(&message, state, gen);
            }
            Message::PlayerReady { id } => {
                if manager.is_host() && self.set_ready(id, true) {
                    let ready = self.ready.clone();
                    manager.broadcast(&Message::ReadyStateSync { ready });
                }
            }
            Message::PlayerUnready { id } => {
                if manager.is_host() && self.set_ready(id, false) {
                    let ready = self.ready.clone();
                    manager.broadcast(&Message::ReadyStateSync { ready });
                }
            }
            Message::ReadyStateSync { ready } => {
                if !manager.is_host() {
                    // Host is the single source of truth; replace, don't merge.
                    self.ready = ready;
                }
            }
            Message::RoomSync { players } => {
                // The manager already replaced the roster; drop simulation
                // residue of departed peers.
                state
                    .remote_players
                    .retain(|id, _| players.iter().any(|p| &p.id == id));
                self.ready.retain(|id, _| players.iter().any(|p| &p.id == id));
            }
            Message::JoinRequest { .. }
            | Message::JoinApproved
            | Message::JoinRejected { .. }
            | Message::Kicked => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SessionEvent;
    use crate::transport::MemoryHub;
    use world::{Pickup, PickupKind};

    struct Peer {
        manager: SessionManager,
        reconciler: Reconciler,
        state: SimulationState,
        gen: WorldGenerator,
    }

    impl Peer {
        fn new(hub: &MemoryHub, id: &str, name: &str) -> Self {
            let manager = SessionManager::new(Box::new(hub.endpoint(id)), name);
            Self {
                manager,
                reconciler: Reconciler::new(PlayerId(id.to_string())),
                state: SimulationState::new(),
                gen: WorldGenerator::new(0, 0.0),
            }
        }

        fn pump(&mut self) {
            self.manager.tick();
            for event in self.manager.drain_events() {
                if let SessionEvent::Message { from, message } = event {
                    self.reconciler.handle(
                        &from,
                        message,
                        &mut self.state,
                        &mut self.gen,
                        &mut self.manager,
                    );
                }
            }
        }
    }

    fn connected_trio() -> (Peer, Peer, Peer) {
        let hub = MemoryHub::new();
        let mut host = Peer::new(&hub, "host", "alice");
        host.manager.set_auto_join(true);
        host.manager.init();
        host.manager.host();
        let mut guest_a = Peer::new(&hub, "a", "ann");
        guest_a.manager.init();
        guest_a.manager.join(&PlayerId("host".into()));
        let mut guest_b = Peer::new(&hub, "b", "ben");
        guest_b.manager.init();
        guest_b.manager.join(&PlayerId("host".into()));
        for _ in 0..6 {
            host.pump();
            guest_a.pump();
            guest_b.pump();
        }
        (host, guest_a, guest_b)
    }

    #[test]
    fn host_relays_player_state_to_other_guests() {
        let (mut host, mut guest_a, mut guest_b) = connected_trio();

        let sample = guest_a.reconciler.make_player_state(&guest_a.state);
        guest_a.manager.broadcast(&sample);
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
            guest_b.pump();
        }

        assert!(host.state.remote_players.contains_key(&PlayerId("a".into())));
        // Two hops: a -> host -> b.
        assert!(guest_b
            .state
            .remote_players
            .contains_key(&PlayerId("a".into())));
        // The sender never applies its own echo.
        assert!(!guest_a
            .state
            .remote_players
            .contains_key(&PlayerId("a".into())));
    }

    #[test]
    fn player_state_updates_interpolation_targets_only() {
        let (mut host, mut guest_a, mut guest_b) = connected_trio();
        let _ = &mut guest_b;

        guest_a.state.player.pos = Vec2::new(100.0, 100.0);
        let first = guest_a.reconciler.make_player_state(&guest_a.state);
        guest_a.manager.broadcast(&first);
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
        }
        guest_a.state.player.pos = Vec2::new(900.0, 100.0);
        let second = guest_a.reconciler.make_player_state(&guest_a.state);
        guest_a.manager.broadcast(&second);
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
        }

        let remote = host.state.remote_players.get(&PlayerId("a".into())).unwrap();
        // Target jumped, the rendered position interpolates later.
        assert_eq!(remote.target_pos.x, 900.0);
        assert_eq!(remote.pos.x, 100.0);
    }

    #[test]
    fn pickup_collect_is_applied_once_across_duplicates() {
        let (mut host, mut guest_a, mut guest_b) = connected_trio();
        for peer in [&mut host, &mut guest_a, &mut guest_b] {
            peer.state
                .pickups
                .push(Pickup::new(PickupKind::Coin, Vec2::new(500.0, 300.0)));
        }

        let collect = Message::PickupCollect {
            pickup_type: PickupKind::Coin,
            x: 505.0,
            y: 298.0,
        };
        // Optimistic local apply, then broadcast, then a duplicate broadcast.
        assert!(guest_a
            .state
            .apply_pickup_collect(PickupKind::Coin, 505.0, 298.0));
        guest_a.manager.broadcast(&collect);
        guest_a.manager.broadcast(&collect);
        for _ in 0..6 {
            host.pump();
            guest_a.pump();
            guest_b.pump();
        }

        for peer in [&host, &guest_a, &guest_b] {
            let collected: Vec<_> = peer.state.pickups.iter().filter(|p| p.collected).collect();
            assert_eq!(collected.len(), 1);
        }
    }

    #[test]
    fn sync_env_fast_forwards_lagging_guest() {
        let (mut host, mut guest_a, _guest_b) = connected_trio();
        host.gen.init_world(&mut host.state, Vec2::new(0.0, 400.0), 42);
        guest_a
            .gen
            .init_world(&mut guest_a.state, Vec2::new(0.0, 400.0), 42);
        for _ in 0..9 {
            host.gen.generate_chunk(&mut host.state);
        }

        let sync = host.reconciler.make_sync_env(&host.state, &host.gen);
        host.manager.broadcast(&sync);
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
        }

        assert_eq!(guest_a.gen.cursor(), host.gen.cursor());
        assert_eq!(guest_a.state.walls, host.state.walls);
    }

    #[test]
    fn sync_env_origin_mismatch_triggers_hard_resync() {
        let (mut host, mut guest_a, _guest_b) = connected_trio();
        host.gen.init_world(&mut host.state, Vec2::new(0.0, 400.0), 42);
        // Guest bootstrapped from a different origin with the same seed.
        guest_a
            .gen
            .init_world(&mut guest_a.state, Vec2::new(640.0, 400.0), 42);
        for _ in 0..4 {
            host.gen.generate_chunk(&mut host.state);
        }

        let sync = host.reconciler.make_sync_env(&host.state, &host.gen);
        host.manager.broadcast(&sync);
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
        }

        assert_eq!(guest_a.gen.origin(), host.gen.origin());
        assert_eq!(guest_a.gen.cursor(), host.gen.cursor());
        assert_eq!(guest_a.state.walls, host.state.walls);
    }

    #[test]
    fn sync_env_adopts_host_net_rate() {
        let (mut host, mut guest_a, _guest_b) = connected_trio();
        host.reconciler.set_net_rate(NetRate::High);
        let sync = host.reconciler.make_sync_env(&host.state, &host.gen);
        host.manager.broadcast(&sync);
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
        }
        assert_eq!(guest_a.reconciler.net_rate(), NetRate::High);
    }

    #[test]
    fn sync_seed_resets_world_and_enters_lobby() {
        let (mut host, mut guest_a, _guest_b) = connected_trio();
        host.manager.set_seed("ABC123");
        host.manager.broadcast(&Message::SyncSeed {
            seed: "ABC123".into(),
        });
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
        }

        assert_eq!(guest_a.reconciler.seed(), Some("ABC123"));
        assert_eq!(guest_a.reconciler.phase(), Phase::Lobby);
        assert_eq!(guest_a.gen.seed(), string_to_seed("ABC123"));
        assert!(!guest_a.state.walls.is_empty());
    }

    #[test]
    fn ready_flow_gates_start() {
        let (mut host, mut guest_a, mut guest_b) = connected_trio();

        guest_a.manager.broadcast(&Message::PlayerReady {
            id: PlayerId("a".into()),
        });
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
            guest_b.pump();
        }
        let roster = host.manager.roster().to_vec();
        assert!(!host.reconciler.all_ready(&roster));
        // The host's READY_STATE_SYNC reached the guests.
        assert_eq!(
            guest_b.reconciler.ready_map().get(&PlayerId("a".into())),
            Some(&true)
        );

        host.reconciler.set_ready(PlayerId("host".into()), true);
        guest_b.manager.broadcast(&Message::PlayerReady {
            id: PlayerId("b".into()),
        });
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
            guest_b.pump();
        }
        assert!(host.reconciler.all_ready(&roster));
    }

    #[test]
    fn death_roster_drives_all_dead_determination() {
        let (mut host, mut guest_a, mut guest_b) = connected_trio();
        let party_size = host.manager.roster().len();
        assert_eq!(party_size, 3);

        host.reconciler.record_death(PlayerId("host".into()));
        guest_a.manager.broadcast(&Message::PlayerDeath {
            id: PlayerId("a".into()),
        });
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
            guest_b.pump();
        }
        assert!(!host.reconciler.all_players_dead(party_size));

        guest_b.manager.broadcast(&Message::PlayerDeath {
            id: PlayerId("b".into()),
        });
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
            guest_b.pump();
        }
        assert!(host.reconciler.all_players_dead(party_size));
        // Death relayed two hops: b -> host -> a.
        assert_eq!(host.reconciler.death_count(), 3);
        assert!(guest_a
            .state
            .remote_players
            .get(&PlayerId("b".into()))
            .map_or(true, |remote| !remote.alive));
    }

    #[test]
    fn transitions_apply_on_guests_and_self_dispatch() {
        let (mut host, mut guest_a, _guest_b) = connected_trio();
        host.reconciler
            .adopt_seed("ABC123", &mut host.state, &mut host.gen);
        assert_eq!(host.reconciler.phase(), Phase::Lobby);

        // Host self-dispatches before broadcasting.
        host.reconciler
            .apply_transition(&Message::GameStart, &mut host.state, &mut host.gen);
        host.manager.broadcast(&Message::GameStart);
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
        }
        assert_eq!(host.reconciler.phase(), Phase::Playing);
        assert_eq!(guest_a.reconciler.phase(), Phase::Playing);

        host.reconciler
            .apply_transition(&Message::GameRestart, &mut host.state, &mut host.gen);
        host.manager.broadcast(&Message::GameRestart);
        for _ in 0..4 {
            host.pump();
            guest_a.pump();
        }
        assert_eq!(guest_a.reconciler.phase(), Phase::Lobby);
        assert!(guest_a
            .reconciler
            .ready_map()
            .values()
            .all(|ready| !ready));
    }
}
