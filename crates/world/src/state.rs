use std::collections::HashMap;

use crate::types::{
    GasZone, Pickup, PickupKind, PlayerId, RemotePlayer, Train, Tutel, Vec2, Wall, WallKind,
};

/// Remote train samples further than this from the local replica snap hard;
/// anything closer is smoothed.
pub const TRAIN_SNAP_DELTA: f32 = 500.0;
const TRAIN_SMOOTHING: f32 = 0.15;

const PICKUP_EXACT_RADIUS: f32 = 50.0;
const PICKUP_FALLBACK_RADIUS: f32 = 100.0;
pub const PRUNE_DISTANCE: f32 = 2_400.0;

const GRAVITY: f32 = 900.0;
const MAX_THRUST_ACCEL: f32 = 1_600.0;
const GROUND_Y: f32 = 560.0;
const PLAYER_HALF_SIZE: f32 = 18.0;
const GAS_DAMAGE_PER_SECOND: f32 = 35.0;
const TUTEL_TOUCH_RADIUS: f32 = 30.0;
const REMOTE_LERP_RATE: f32 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerInput {
    /// Thrust strength in [0, 1].
    pub thrust: f32,
    /// Turn rate in [-1, 1].
    pub turn: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalPlayer {
    pub pos: Vec2,
    pub vel: Vec2,
    pub angle: f32,
    pub health: f32,
    pub cargo_pos: Vec2,
    pub cargo_angle: f32,
    pub thrust: f32,
    pub alive: bool,
}

impl Default for LocalPlayer {
    fn default() -> Self {
        Self {
            pos: Vec2::new(0.0, GROUND_Y - PLAYER_HALF_SIZE),
            vel: Vec2::ZERO,
            angle: 0.0,
            health: 100.0,
            cargo_pos: Vec2::new(0.0, GROUND_Y),
            cargo_angle: 0.0,
            thrust: 0.0,
            alive: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectEvent {
    pub kind: PickupKind,
    pub pos: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepEvent {
    Collected(CollectEvent),
    Died,
}

/// The per-peer mutable world. Mutated by the local physics step and by
/// reconciled peer messages; all mutation happens at tick boundaries.
#[derive(Debug, Clone, Default)]
pub struct SimulationState {
    pub walls: Vec<Wall>,
    pub pickups: Vec<Pickup>,
    pub tutels: Vec<Tutel>,
    pub gas_zones: Vec<GasZone>,
    pub train: Train,
    pub player: LocalPlayer,
    pub remote_players: HashMap<PlayerId, RemotePlayer>,
    pub last_delivery_wall_x: f32,
    pub elapsed_seconds: f32,
    destroyed_checkpoint_ys: HashMap<i64, f32>,
}

impl SimulationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wipes generated geometry and entities. The train keeps its live
    /// position so a hard resync does not teleport the shared hazard.
    pub fn clear_generated(&mut self) {
        self.walls.clear();
        self.pickups.clear();
        self.tutels.clear();
        self.gas_zones.clear();
        self.destroyed_checkpoint_ys.clear();
    }

    /// Marks the pickup at (`x`, `y`) collected. Exact match within 50 units,
    /// falling back to the nearest un-collected pickup of the same kind
    /// within 100 units (tolerates drift between independently simulating
    /// peers). Returns false without touching anything when nothing matches;
    /// never spawns entities, so replays and duplicates are no-ops.
    pub fn apply_pickup_collect(&mut self, kind: PickupKind, x: f32, y: f32) -> bool {
        let target = Vec2::new(x, y);
        let exact = self.pickups.iter_mut().find(|p| {
            p.kind == kind && !p.collected && p.pos.distance_sq(target) <= PICKUP_EXACT_RADIUS * PICKUP_EXACT_RADIUS
        });
        if let Some(pickup) = exact {
            pickup.collected = true;
            return true;
        }

        let mut best: Option<(usize, f32)> = None;
        for (index, pickup) in self.pickups.iter().enumerate() {
            if pickup.kind != kind || pickup.collected {
                continue;
            }
            let dist_sq = pickup.pos.distance_sq(target);
            if dist_sq <= PICKUP_FALLBACK_RADIUS * PICKUP_FALLBACK_RADIUS
                && best.map_or(true, |(_, d)| dist_sq < d)
            {
                best = Some((index, dist_sq));
            }
        }
        match best {
            Some((index, _)) => {
                self.pickups[index].collected = true;
                true
            }
            None => false,
        }
    }

    pub fn integrate_train(&mut self, dt: f32) {
        self.train.x += self.train.speed * dt;
    }

    /// Folds a host train sample into the local replica. Large deltas snap,
    /// small ones smooth. The clamp keeps `x` monotonic: a stale or reordered
    /// sample must never pull the train backward.
    pub fn sync_train_remote(&mut self, x: f32, speed: f32) {
        let delta = x - self.train.x;
        let candidate = if delta.abs() > TRAIN_SNAP_DELTA {
            x
        } else {
            self.train.x + delta * TRAIN_SMOOTHING
        };
        self.train.x = candidate.max(self.train.x);
        self.train.speed = speed;
    }

    /// Removes checkpoint walls the train has passed, remembering their y so
    /// a respawning player can get an approximate pad back.
    pub fn destroy_passed_checkpoints(&mut self) {
        let edge = self.train.leading_edge();
        let destroyed = &mut self.destroyed_checkpoint_ys;
        self.walls.retain(|wall| {
            if wall.kind == WallKind::Checkpoint && wall.x < edge {
                destroyed.insert(wall.x as i64, wall.y);
                false
            } else {
                true
            }
        });
    }

    /// Re-places a checkpoint pad destroyed by the train, with best-effort y.
    pub fn regenerate_checkpoint(&mut self, x: f32, fallback_y: f32) -> Vec2 {
        let y = self
            .destroyed_checkpoint_ys
            .get(&(x as i64))
            .copied()
            .unwrap_or(fallback_y);
        self.walls
            .push(Wall::fixed(x, y, 160.0, 20.0, WallKind::Checkpoint));
        Vec2::new(x, y)
    }

    pub fn revive_local_player(&mut self) {
        self.player = LocalPlayer::default();
    }

    /// Drops everything entirely behind `protected_x - PRUNE_DISTANCE`.
    /// Tutels are exempt: they persist and keep chasing.
    pub fn prune(&mut self, protected_x: f32) {
        let line = protected_x - PRUNE_DISTANCE;
        self.walls.retain(|w| w.right_edge() >= line);
        self.pickups.retain(|p| p.pos.x >= line);
        self.gas_zones.retain(|g| g.x + g.w >= line);
    }

    pub fn frontier_wall_x(&self) -> f32 {
        self.walls
            .iter()
            .map(|w| w.x)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// One local physics tick. Returns the events the netplay layer turns
    /// into broadcasts (optimistic pickup collects, local death).
    pub fn step(&mut self, dt: f32, input: PlayerInput) -> Vec<StepEvent> {
        self.elapsed_seconds += dt;
        let mut events = Vec::new();

        self.integrate_train(dt);
        self.destroy_passed_checkpoints();
        self.oscillate_moving_walls();
        self.chase_with_tutels(dt);
        self.interpolate_remote_players(dt);

        if !self.player.alive {
            return events;
        }

        self.player.thrust = input.thrust.clamp(0.0, 1.0);
        self.player.angle += input.turn.clamp(-1.0, 1.0) * 3.0 * dt;
        let accel = self.player.thrust * MAX_THRUST_ACCEL;
        self.player.vel.x += self.player.angle.sin() * accel * dt;
        self.player.vel.y += (GRAVITY - self.player.angle.cos() * accel) * dt;
        self.player.pos.x += self.player.vel.x * dt;
        self.player.pos.y += self.player.vel.y * dt;
        if self.player.pos.y > GROUND_Y - PLAYER_HALF_SIZE {
            self.player.pos.y = GROUND_Y - PLAYER_HALF_SIZE;
            self.player.vel.y = 0.0;
        }
        self.land_on_walls();
        // Cargo trails underneath the player on a short tether.
        self.player.cargo_pos = Vec2::new(self.player.pos.x, self.player.pos.y + 42.0);
        self.player.cargo_angle = self.player.angle * 0.5;

        for pickup in &mut self.pickups {
            if !pickup.collected
                && pickup.pos.distance_sq(self.player.pos)
                    <= PICKUP_EXACT_RADIUS * PICKUP_EXACT_RADIUS
            {
                pickup.collected = true;
                events.push(StepEvent::Collected(CollectEvent {
                    kind: pickup.kind,
                    pos: pickup.pos,
                }));
            }
        }

        self.apply_damage(dt);
        if self.player.health <= 0.0 && self.player.alive {
            self.player.alive = false;
            events.push(StepEvent::Died);
        }
        events
    }

    fn apply_damage(&mut self, dt: f32) {
        let p = self.player.pos;
        if p.x >= self.train.x
            && p.x <= self.train.leading_edge()
            && p.y >= self.train.y
            && p.y <= self.train.y + self.train.h
        {
            self.player.health = 0.0;
            return;
        }
        for zone in &self.gas_zones {
            if p.x >= zone.x && p.x <= zone.x + zone.w && p.y >= zone.y && p.y <= zone.y + zone.h {
                self.player.health -= GAS_DAMAGE_PER_SECOND * dt;
            }
        }
        for tutel in &self.tutels {
            if tutel.pos.distance_sq(p) <= TUTEL_TOUCH_RADIUS * TUTEL_TOUCH_RADIUS {
                self.player.health -= GAS_DAMAGE_PER_SECOND * 2.0 * dt;
            }
        }
        for wall in &self.walls {
            if wall.kind == WallKind::Hazard
                && p.x >= wall.x
                && p.x <= wall.right_edge()
                && p.y >= wall.y
                && p.y <= wall.y + wall.h
            {
                self.player.health -= GAS_DAMAGE_PER_SECOND * dt;
            }
        }
    }

    fn land_on_walls(&mut self) {
        let p = &mut self.player;
        if p.vel.y <= 0.0 {
            return;
        }
        for wall in &self.walls {
            if wall.kind == WallKind::Hazard {
                continue;
            }
            let top = wall.y;
            if p.pos.x >= wall.x
                && p.pos.x <= wall.right_edge()
                && p.pos.y + PLAYER_HALF_SIZE >= top
                && p.pos.y + PLAYER_HALF_SIZE <= top + wall.h.min(24.0)
            {
                p.pos.y = top - PLAYER_HALF_SIZE;
                p.vel.y = 0.0;
                if wall.kind == WallKind::Checkpoint {
                    self.last_delivery_wall_x = wall.x;
                }
                return;
            }
        }
    }

    fn oscillate_moving_walls(&mut self) {
        let t = self.elapsed_seconds;
        for wall in &mut self.walls {
            if let Some(config) = wall.move_config {
                wall.y = config.origin_y + (t * config.speed + config.phase).sin() * config.amplitude;
            }
        }
    }

    fn chase_with_tutels(&mut self, dt: f32) {
        let target = self.player.pos;
        for tutel in &mut self.tutels {
            let dx = target.x - tutel.pos.x;
            let dy = target.y - tutel.pos.y;
            let len = (dx * dx + dy * dy).sqrt().max(1.0);
            tutel.vel = Vec2::new(dx / len * tutel.speed, dy / len * tutel.speed);
            tutel.pos.x += tutel.vel.x * dt;
            tutel.pos.y += tutel.vel.y * dt;
        }
    }

    fn interpolate_remote_players(&mut self, dt: f32) {
        let blend = (REMOTE_LERP_RATE * dt).min(1.0);
        for remote in self.remote_players.values_mut() {
            remote.pos.x += (remote.target_pos.x - remote.pos.x) * blend;
            remote.pos.y += (remote.target_pos.y - remote.pos.y) * blend;
            remote.angle += (remote.target_angle - remote.angle) * blend;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin_at(x: f32, y: f32) -> Pickup {
        Pickup::new(PickupKind::Coin, Vec2::new(x, y))
    }

    #[test]
    fn pickup_collect_exact_match_then_noop() {
        let mut state = SimulationState::new();
        state.pickups.push(coin_at(505.0, 298.0));

        assert!(state.apply_pickup_collect(PickupKind::Coin, 500.0, 300.0));
        assert!(state.pickups[0].collected);
        // Second identical message is a no-op against the already-collected coin.
        assert!(!state.apply_pickup_collect(PickupKind::Coin, 500.0, 300.0));
        assert!(state.pickups[0].collected);
    }

    #[test]
    fn pickup_collect_falls_back_to_nearest_within_100() {
        let mut state = SimulationState::new();
        state.pickups.push(coin_at(500.0, 300.0));
        state.pickups.push(coin_at(570.0, 300.0));

        // 80 units from the first coin, 150 from the grid-exact window.
        assert!(state.apply_pickup_collect(PickupKind::Coin, 420.0, 300.0));
        assert!(state.pickups[0].collected);
        assert!(!state.pickups[1].collected);
    }

    #[test]
    fn pickup_collect_misses_are_noops() {
        let mut state = SimulationState::new();
        state.pickups.push(coin_at(500.0, 300.0));

        assert!(!state.apply_pickup_collect(PickupKind::Coin, 900.0, 900.0));
        assert!(!state.apply_pickup_collect(PickupKind::UrgentOrder, 500.0, 300.0));
        assert!(!state.pickups[0].collected);
        assert_eq!(state.pickups.len(), 1);
    }

    #[test]
    fn train_smooths_small_deltas() {
        let mut state = SimulationState::new();
        state.train.x = 4_990.0;

        state.sync_train_remote(5_000.0, 3.0);
        assert!(state.train.x > 4_990.0 && state.train.x < 5_000.0);
        assert_eq!(state.train.speed, 3.0);
    }

    #[test]
    fn train_snaps_large_deltas() {
        let mut state = SimulationState::new();
        state.train.x = 1_000.0;

        state.sync_train_remote(5_000.0, 3.0);
        assert_eq!(state.train.x, 5_000.0);
    }

    #[test]
    fn train_never_moves_backward() {
        let mut state = SimulationState::new();
        state.train.x = 5_000.0;

        state.sync_train_remote(4_990.0, 3.0);
        assert_eq!(state.train.x, 5_000.0);
        state.sync_train_remote(1_000.0, 3.0);
        assert_eq!(state.train.x, 5_000.0);

        let mut last = state.train.x;
        for sample in [5_010.0, 4_800.0, 5_020.0, 200.0, 9_999.0] {
            state.sync_train_remote(sample, 3.0);
            state.integrate_train(1.0 / 60.0);
            assert!(state.train.x >= last);
            last = state.train.x;
        }
    }

    #[test]
    fn prune_keeps_tutels_and_protected_content() {
        let mut state = SimulationState::new();
        state
            .walls
            .push(Wall::fixed(0.0, 500.0, 100.0, 20.0, WallKind::Structural));
        state
            .walls
            .push(Wall::fixed(6_000.0, 500.0, 100.0, 20.0, WallKind::Structural));
        state.pickups.push(coin_at(10.0, 10.0));
        state.tutels.push(Tutel {
            pos: Vec2::new(-5_000.0, 0.0),
            vel: Vec2::ZERO,
            speed: 60.0,
        });

        state.prune(6_000.0);
        assert_eq!(state.walls.len(), 1);
        assert_eq!(state.walls[0].x, 6_000.0);
        assert!(state.pickups.is_empty());
        assert_eq!(state.tutels.len(), 1);
    }

    #[test]
    fn checkpoint_walls_destroyed_behind_train_and_regenerable() {
        let mut state = SimulationState::new();
        state
            .walls
            .push(Wall::fixed(3_200.0, 310.0, 160.0, 20.0, WallKind::Checkpoint));
        state.train.x = 3_000.0;
        state.train.w = 900.0;

        state.destroy_passed_checkpoints();
        assert!(state.walls.is_empty());

        let pos = state.regenerate_checkpoint(3_200.0, 400.0);
        assert_eq!(pos.y, 310.0);
        assert_eq!(state.walls.len(), 1);
    }

    #[test]
    fn step_collects_pickup_under_player() {
        let mut state = SimulationState::new();
        let pos = state.player.pos;
        state.pickups.push(coin_at(pos.x + 10.0, pos.y));

        let events = state.step(1.0 / 60.0, PlayerInput::default());
        assert!(events
            .iter()
            .any(|e| matches!(e, StepEvent::Collected(c) if c.kind == PickupKind::Coin)));
        assert!(state.pickups[0].collected);
    }

    #[test]
    fn train_collision_kills_player_once() {
        let mut state = SimulationState::new();
        state.train = Train {
            x: state.player.pos.x - 100.0,
            y: state.player.pos.y - 100.0,
            w: 400.0,
            h: 400.0,
            speed: 0.0,
        };

        let events = state.step(1.0 / 60.0, PlayerInput::default());
        assert!(events.contains(&StepEvent::Died));
        assert!(!state.player.alive);

        let events = state.step(1.0 / 60.0, PlayerInput::default());
        assert!(events.is_empty());
    }
}
