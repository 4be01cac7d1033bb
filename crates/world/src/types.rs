use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }
}

/// Stable public identifier of a participant, as handed out by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallKind {
    Structural,
    Hazard,
    Moving,
    Checkpoint,
}

/// Vertical oscillation parameters for `WallKind::Moving` walls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveConfig {
    pub origin_y: f32,
    pub amplitude: f32,
    pub speed: f32,
    pub phase: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub kind: WallKind,
    pub move_config: Option<MoveConfig>,
}

impl Wall {
    pub fn fixed(x: f32, y: f32, w: f32, h: f32, kind: WallKind) -> Self {
        Self {
            x,
            y,
            w,
            h,
            kind,
            move_config: None,
        }
    }

    pub fn right_edge(&self) -> f32 {
        self.x + self.w
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickupKind {
    Coin,
    UrgentOrder,
    PowerUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub kind: PickupKind,
    pub pos: Vec2,
    /// One-way flag. Once set it never reverts, which is what makes relayed
    /// collect messages idempotent.
    pub collected: bool,
}

impl Pickup {
    pub fn new(kind: PickupKind, pos: Vec2) -> Self {
        Self {
            kind,
            pos,
            collected: false,
        }
    }
}

/// Chaser entity. Persists forever: pruning skips tutels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tutel {
    pub pos: Vec2,
    pub vel: Vec2,
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasZone {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// The pursuing train. Singleton, host-authoritative speed, `x` never
/// decreases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Train {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub speed: f32,
}

impl Train {
    pub fn leading_edge(&self) -> f32 {
        self.x + self.w
    }
}

impl Default for Train {
    fn default() -> Self {
        Self {
            x: -2_000.0,
            y: 420.0,
            w: 900.0,
            h: 180.0,
            speed: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiomeId(pub u8);

pub const BIOME_COUNT: u32 = 4;

impl BiomeId {
    pub const ROOFTOPS: BiomeId = BiomeId(0);
    pub const SCAFFOLDS: BiomeId = BiomeId(1);
    pub const GASWORKS: BiomeId = BiomeId(2);
    pub const JUNKYARD: BiomeId = BiomeId(3);
}

/// Last-known and interpolation-target state of a remote participant.
///
/// `target_*` fields drive client-side interpolation toward the newest
/// sample instead of teleporting on every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePlayer {
    pub id: PlayerId,
    pub pos: Vec2,
    pub angle: f32,
    pub health: f32,
    pub cargo_pos: Vec2,
    pub cargo_angle: f32,
    pub thrust_power: f32,
    pub alive: bool,
    pub target_pos: Vec2,
    pub target_angle: f32,
    pub last_update_tick: u64,
}
