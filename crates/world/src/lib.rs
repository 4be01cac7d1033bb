pub mod gen;
pub mod rng;
pub mod state;
pub mod types;

pub use gen::{WorldGenerator, CHECKPOINT_INTERVAL, CHUNK_SIZE, FAST_FORWARD_MAX_STEPS};
pub use rng::{string_to_seed, SeededRng};
pub use state::{CollectEvent, PlayerInput, SimulationState, StepEvent, TRAIN_SNAP_DELTA};
pub use types::{
    BiomeId, GasZone, MoveConfig, Pickup, PickupKind, PlayerId, RemotePlayer, Train, Tutel, Vec2,
    Wall, WallKind,
};
