//! Deterministic chunked world generation.
//!
//! Every peer runs its own generator over its own RNG stream. Two generators
//! seeded identically and advanced from the same origin emit bit-identical
//! chunks, which is the whole basis of multiplayer world agreement: the host
//! only ever broadcasts its cursor, never geometry.

use tracing::{debug, info};

use crate::rng::SeededRng;
use crate::state::SimulationState;
use crate::types::{
    BiomeId, GasZone, MoveConfig, Pickup, PickupKind, Tutel, Vec2, Wall, WallKind, BIOME_COUNT,
};

pub const CHUNK_SIZE: f32 = 1_200.0;
pub const CHECKPOINT_INTERVAL: f32 = 3_000.0;
pub const FAST_FORWARD_MAX_STEPS: u32 = 2_000;

/// A peer whose cursor is this far ahead of the host's has outrun the
/// authority and must rebuild.
const AHEAD_RESYNC_DELTA: f32 = 2_000.0;

const GENERATION_ORIGIN_OFFSET: f32 = 400.0;
const CHECKPOINT_PAD_OFFSET: f32 = 200.0;
const CHECKPOINT_PAD_WIDTH: f32 = 160.0;
const CHECKPOINT_PAD_HEIGHT: f32 = 20.0;
const BIOME_REDRAW_ATTEMPTS: u32 = 10;
const URGENT_ORDER_CHANCE: f32 = 0.2;
const BOOTSTRAP_CHUNKS: u32 = 3;

pub struct WorldGenerator {
    rng: SeededRng,
    seed: u32,
    next_gen_x: f32,
    next_checkpoint_x: f32,
    last_biome: Option<BiomeId>,
    map_gen_start_x: f32,
}

impl WorldGenerator {
    pub fn new(seed: u32, origin_x: f32) -> Self {
        Self {
            rng: SeededRng::new(seed),
            seed,
            next_gen_x: origin_x,
            next_checkpoint_x: origin_x + CHECKPOINT_INTERVAL,
            last_biome: None,
            map_gen_start_x: origin_x,
        }
    }

    pub fn cursor(&self) -> f32 {
        self.next_gen_x
    }

    pub fn origin(&self) -> f32 {
        self.map_gen_start_x
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Resets the world around `checkpoint_pos` and pre-populates the
    /// frontier. The generation origin is recorded 400 units past the
    /// checkpoint; every RNG draw from here on is a pure function of that
    /// origin and the seed.
    pub fn init_world(&mut self, state: &mut SimulationState, checkpoint_pos: Vec2, seed: u32) {
        state.clear_generated();
        self.rng = SeededRng::new(seed);
        self.seed = seed;
        self.map_gen_start_x = checkpoint_pos.x + GENERATION_ORIGIN_OFFSET;
        self.next_gen_x = self.map_gen_start_x;
        self.next_checkpoint_x = self.map_gen_start_x + CHECKPOINT_INTERVAL;
        self.last_biome = None;

        // Safe zone: a solid floor strip around the spawn checkpoint.
        state.walls.push(Wall::fixed(
            checkpoint_pos.x - GENERATION_ORIGIN_OFFSET,
            540.0,
            GENERATION_ORIGIN_OFFSET * 2.0,
            40.0,
            WallKind::Structural,
        ));
        state.walls.push(Wall::fixed(
            checkpoint_pos.x,
            checkpoint_pos.y,
            CHECKPOINT_PAD_WIDTH,
            CHECKPOINT_PAD_HEIGHT,
            WallKind::Checkpoint,
        ));
        state.last_delivery_wall_x = checkpoint_pos.x;

        for _ in 0..BOOTSTRAP_CHUNKS {
            self.generate_chunk(state);
        }
        info!(
            seed,
            origin = self.map_gen_start_x,
            cursor = self.next_gen_x,
            "world_initialized"
        );
    }

    /// Advances the world by one chunk and returns the new cursor.
    ///
    /// A chunk that crosses the checkpoint threshold places only the pad and
    /// returns early; biome content resumes on the next chunk.
    pub fn generate_chunk(&mut self, state: &mut SimulationState) -> f32 {
        let chunk_start = self.next_gen_x;

        if chunk_start >= self.next_checkpoint_x {
            let pad_y = self.rng.next_range(240.0, 480.0);
            state.walls.push(Wall::fixed(
                chunk_start + CHECKPOINT_PAD_OFFSET,
                pad_y,
                CHECKPOINT_PAD_WIDTH,
                CHECKPOINT_PAD_HEIGHT,
                WallKind::Checkpoint,
            ));
            self.next_checkpoint_x += CHECKPOINT_INTERVAL + self.rng.next() * 500.0;
            self.last_biome = None;
            self.next_gen_x += CHUNK_SIZE;
            return self.next_gen_x;
        }

        let biome = self.draw_biome();
        self.last_biome = Some(biome);
        let difficulty = difficulty_for_cursor(chunk_start);

        // One draw, always consumed, so draw parity per cursor is independent
        // of whether the order fires.
        let urgent_roll = self.rng.next();
        if urgent_roll < URGENT_ORDER_CHANCE {
            let x = chunk_start + self.rng.next() * CHUNK_SIZE;
            let y = self.rng.next_range(200.0, 460.0);
            state
                .pickups
                .push(Pickup::new(PickupKind::UrgentOrder, Vec2::new(x, y)));
        }

        match biome {
            BiomeId::ROOFTOPS => self.fill_rooftops(state, chunk_start, difficulty),
            BiomeId::SCAFFOLDS => self.fill_scaffolds(state, chunk_start, difficulty),
            BiomeId::GASWORKS => self.fill_gasworks(state, chunk_start, difficulty),
            _ => self.fill_junkyard(state, chunk_start, difficulty),
        }

        self.next_gen_x += CHUNK_SIZE;
        self.next_gen_x
    }

    /// Biome id in [0, 4), redrawn on immediate repeats. Bounded attempts so
    /// worst-case RNG consumption per chunk stays finite; after ten failed
    /// redraws the repeat is accepted.
    fn draw_biome(&mut self) -> BiomeId {
        let mut biome = BiomeId(self.rng.next_int(BIOME_COUNT) as u8);
        for _ in 0..BIOME_REDRAW_ATTEMPTS {
            if Some(biome) != self.last_biome {
                break;
            }
            biome = BiomeId(self.rng.next_int(BIOME_COUNT) as u8);
        }
        biome
    }

    /// Generates forward until the cursor reaches `host_cursor`, capped so a
    /// corrupt cursor can never wedge the loop. Returns the step count.
    pub fn fast_forward(&mut self, state: &mut SimulationState, host_cursor: f32) -> u32 {
        let mut steps = 0;
        while self.next_gen_x < host_cursor && steps < FAST_FORWARD_MAX_STEPS {
            self.generate_chunk(state);
            steps += 1;
        }
        if steps > 0 {
            debug!(steps, cursor = self.next_gen_x, "generation_fast_forwarded");
        }
        steps
    }

    /// A divergent generation origin invalidates every RNG draw made since
    /// `init_world`, so origin mismatch is the resync trigger. A cursor far
    /// ahead of the host means this peer generated past the authority and
    /// must also rebuild. Lagging behind is not divergence; it is handled by
    /// `fast_forward` alone.
    pub fn needs_hard_resync(&self, host_origin: f32, host_cursor: f32) -> bool {
        (self.map_gen_start_x - host_origin).abs() > f32::EPSILON
            || self.next_gen_x > host_cursor + AHEAD_RESYNC_DELTA
    }

    /// Convergence-after-divergence: wipe everything generated (the train
    /// keeps its live position), replay the initial bootstrap from the host's
    /// origin, then fast-forward to the host's cursor. Costs a visible pop.
    pub fn hard_resync(
        &mut self,
        state: &mut SimulationState,
        seed: u32,
        host_origin: f32,
        host_cursor: f32,
    ) {
        info!(
            local_origin = self.map_gen_start_x,
            host_origin, host_cursor, "world_hard_resync"
        );
        let checkpoint = Vec2::new(host_origin - GENERATION_ORIGIN_OFFSET, 400.0);
        self.init_world(state, checkpoint, seed);
        self.fast_forward(state, host_cursor);
    }

    fn fill_rooftops(&mut self, state: &mut SimulationState, start: f32, difficulty: u32) {
        let roof_count = 3 + difficulty;
        for _ in 0..roof_count {
            let x = start + self.rng.next() * (CHUNK_SIZE - 260.0);
            let y = self.rng.next_range(260.0, 520.0);
            let w = self.rng.next_range(140.0, 280.0);
            state.walls.push(Wall::fixed(x, y, w, 18.0, WallKind::Structural));
            let coins = 2 + self.rng.next_int(3);
            for i in 0..coins {
                state.pickups.push(Pickup::new(
                    PickupKind::Coin,
                    Vec2::new(x + 30.0 + i as f32 * 36.0, y - 40.0),
                ));
            }
        }
        if self.rng.next_bool(0.15) {
            let x = start + self.rng.next() * CHUNK_SIZE;
            let y = self.rng.next_range(200.0, 480.0);
            state
                .pickups
                .push(Pickup::new(PickupKind::PowerUp, Vec2::new(x, y)));
        }
    }

    fn fill_scaffolds(&mut self, state: &mut SimulationState, start: f32, difficulty: u32) {
        let beam_count = 2 + difficulty;
        for _ in 0..beam_count {
            let x = start + self.rng.next() * (CHUNK_SIZE - 200.0);
            let origin_y = self.rng.next_range(220.0, 460.0);
            let amplitude = self.rng.next_range(40.0, 90.0 + 10.0 * difficulty as f32);
            let speed = self.rng.next_range(0.6, 1.4);
            let phase = self.rng.next() * std::f32::consts::TAU;
            state.walls.push(Wall {
                x,
                y: origin_y,
                w: 180.0,
                h: 16.0,
                kind: WallKind::Moving,
                move_config: Some(MoveConfig {
                    origin_y,
                    amplitude,
                    speed,
                    phase,
                }),
            });
            state.pickups.push(Pickup::new(
                PickupKind::Coin,
                Vec2::new(x + 90.0, origin_y - 50.0),
            ));
        }
    }

    fn fill_gasworks(&mut self, state: &mut SimulationState, start: f32, difficulty: u32) {
        let zone_count = 1 + difficulty / 2;
        for _ in 0..zone_count {
            let x = start + self.rng.next() * (CHUNK_SIZE - 320.0);
            let y = self.rng.next_range(180.0, 420.0);
            let w = self.rng.next_range(200.0, 320.0);
            let h = self.rng.next_range(90.0, 160.0);
            state.gas_zones.push(GasZone { x, y, w, h });
        }
        let pipe_count = 2 + difficulty;
        for _ in 0..pipe_count {
            let x = start + self.rng.next() * (CHUNK_SIZE - 120.0);
            let y = self.rng.next_range(240.0, 520.0);
            state.walls.push(Wall::fixed(x, y, 120.0, 18.0, WallKind::Structural));
        }
        if self.rng.next_bool(0.25) {
            let x = start + self.rng.next() * CHUNK_SIZE;
            state
                .pickups
                .push(Pickup::new(PickupKind::Coin, Vec2::new(x, 160.0)));
        }
    }

    fn fill_junkyard(&mut self, state: &mut SimulationState, start: f32, difficulty: u32) {
        let pile_count = 3 + difficulty;
        for _ in 0..pile_count {
            let x = start + self.rng.next() * (CHUNK_SIZE - 160.0);
            let y = self.rng.next_range(300.0, 540.0);
            let hazardous = self.rng.next_bool(0.4);
            let kind = if hazardous {
                WallKind::Hazard
            } else {
                WallKind::Structural
            };
            state.walls.push(Wall::fixed(x, y, 150.0, 22.0, kind));
        }
        let tutel_chance = 0.1 + 0.02 * difficulty as f32;
        if self.rng.next_bool(tutel_chance) {
            let x = start + self.rng.next() * CHUNK_SIZE;
            state.tutels.push(Tutel {
                pos: Vec2::new(x, 520.0),
                vel: Vec2::ZERO,
                speed: 50.0 + 8.0 * difficulty as f32,
            });
        }
    }
}

/// Deterministic function of the cursor alone. Wall-clock time or player
/// behavior must never leak in here.
pub fn difficulty_for_cursor(cursor_x: f32) -> u32 {
    let tier = 1 + (cursor_x.max(0.0) / 5_000.0) as u32;
    tier.min(5)
}
