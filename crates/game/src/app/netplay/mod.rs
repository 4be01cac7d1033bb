//! Fixed-tick headless game loop.
//!
//! One `GameLoop` owns the session, the reconciler and the simulation for
//! this peer. Network events queue inside the session manager and are folded
//! only at tick boundaries; nothing mutates `SimulationState` mid-tick.

use std::process::ExitCode;

use session::leaderboard::{self, LeaderboardEntry};
use session::{
    HeartbeatWorker, Message, Phase, Reconciler, RoomInfo, SessionEvent, SessionManager,
    HEARTBEAT_INTERVAL_TICKS,
};
use tracing::{debug, info, warn};
use world::gen::difficulty_for_cursor;
use world::{
    PlayerId, PlayerInput, SimulationState, StepEvent, WorldGenerator, CHUNK_SIZE,
};

use super::config::GameConfig;

pub(crate) const TICK_DT: f32 = 1.0 / 60.0;

const SYNC_ENV_INTERVAL_TICKS: u64 = 30;
const READY_SYNC_INTERVAL_TICKS: u64 = 60;
const PRUNE_INTERVAL_TICKS: u64 = 120;
const GENERATE_AHEAD: f32 = CHUNK_SIZE * 2.0;
const MAX_CHUNKS_PER_TICK: u32 = 4;
const TRAIN_COMFORT_GAP: f32 = 900.0;
const TRAIN_CATCHUP_RATE: f32 = 0.25;
const TRAIN_MIN_SPEED: f32 = 60.0;
const TRAIN_MAX_SPEED: f32 = 480.0;

pub(crate) struct GameLoop {
    manager: SessionManager,
    reconciler: Reconciler,
    state: SimulationState,
    gen: WorldGenerator,
    config: GameConfig,
    heartbeat: Option<HeartbeatWorker>,
    auto_readied: bool,
    exit: Option<ExitCode>,
}

include!("wiring.rs");
include!("ticker.rs");
include!("host_duties.rs");
