//! Wire message schema.
//!
//! Every message is a JSON object with a mandatory `"type"` tag. The
//! transport guarantees ordering per connection only; delivery across
//! connections interleaves arbitrarily and messages may be relayed more than
//! once, so every handler downstream of `decode` must tolerate reordering
//! and duplication. Unknown types and unknown fields are dropped silently to
//! stay compatible with newer peers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use world::{PickupKind, PlayerId, Vec2};

/// Outbound `PLAYER_STATE` throttle tier, host-selected and shared with all
/// peers via `SYNC_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetRate {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

impl NetRate {
    /// Ticks between `PLAYER_STATE` broadcasts.
    pub fn ticks_per_broadcast(self) -> u64 {
        match self {
            NetRate::Low => 6,
            NetRate::Medium => 3,
            NetRate::High => 2,
        }
    }
}

impl Default for NetRate {
    fn default() -> Self {
        NetRate::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainSync {
    pub x: f32,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "PLAYER_STATE", rename_all = "camelCase")]
    PlayerState {
        id: PlayerId,
        pos: Vec2,
        angle: f32,
        health: f32,
        cargo_pos: Vec2,
        cargo_angle: f32,
        thrust_power: f32,
    },
    #[serde(rename = "PLAYER_DEATH")]
    PlayerDeath { id: PlayerId },
    #[serde(rename = "PICKUP_COLLECT", rename_all = "camelCase")]
    PickupCollect {
        pickup_type: PickupKind,
        x: f32,
        y: f32,
    },
    #[serde(rename = "SYNC_ENV", rename_all = "camelCase")]
    SyncEnv {
        train: TrainSync,
        next_gen_x: f32,
        map_gen_start_x: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        net_rate: Option<NetRate>,
    },
    #[serde(rename = "SYNC_SEED")]
    SyncSeed { seed: String },
    #[serde(rename = "GAME_START")]
    GameStart,
    #[serde(rename = "GAME_RESTART")]
    GameRestart,
    #[serde(rename = "GLOBAL_RESTART")]
    GlobalRestart,
    #[serde(rename = "JOIN_REQUEST")]
    JoinRequest { id: PlayerId, name: String },
    #[serde(rename = "JOIN_APPROVED")]
    JoinApproved,
    #[serde(rename = "JOIN_REJECTED")]
    JoinRejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "KICKED")]
    Kicked,
    #[serde(rename = "PLAYER_READY")]
    PlayerReady { id: PlayerId },
    #[serde(rename = "PLAYER_UNREADY")]
    PlayerUnready { id: PlayerId },
    #[serde(rename = "READY_STATE_SYNC")]
    ReadyStateSync { ready: BTreeMap<PlayerId, bool> },
    #[serde(rename = "ROOM_SYNC")]
    RoomSync { players: Vec<RosterEntry> },
}

/// Serializes a message to its wire line. Returns `None` (with a log line)
/// instead of erroring: an unencodable message is a bug, not a reason to
/// tear down the session.
pub fn encode(message: &Message) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(line) => Some(line),
        Err(error) => {
            debug!(%error, "message_encode_failed");
            None
        }
    }
}

/// Parses a wire line. Malformed JSON and unknown `"type"` tags yield `None`;
/// the reconciliation loop must never crash on peer-submitted bytes.
pub fn decode(line: &str) -> Option<Message> {
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(error) => {
            debug!(%error, "message_decode_dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_are_screaming_snake() {
        let line = encode(&Message::GameStart).expect("encode");
        assert_eq!(line, r#"{"type":"GAME_START"}"#);

        let line = encode(&Message::PickupCollect {
            pickup_type: PickupKind::Coin,
            x: 500.0,
            y: 300.0,
        })
        .expect("encode");
        assert!(line.contains(r#""type":"PICKUP_COLLECT""#));
        assert!(line.contains(r#""pickupType":"COIN""#));
    }

    #[test]
    fn sync_env_uses_camel_case_fields() {
        let line = encode(&Message::SyncEnv {
            train: TrainSync { x: 5_000.0, speed: 3.0 },
            next_gen_x: 9_999.0,
            map_gen_start_x: 600.0,
            net_rate: None,
        })
        .expect("encode");
        assert!(line.contains(r#""nextGenX":9999.0"#));
        assert!(line.contains(r#""mapGenStartX":600.0"#));
        assert!(!line.contains("netRate"));

        let decoded = decode(&line).expect("decode");
        assert!(matches!(
            decoded,
            Message::SyncEnv { next_gen_x, .. } if next_gen_x == 9_999.0
        ));
    }

    #[test]
    fn unknown_type_is_dropped() {
        assert_eq!(decode(r#"{"type":"SHINY_NEW_THING","x":1}"#), None);
        assert_eq!(decode("not json at all"), None);
        assert_eq!(decode(r#"{"no_type_field":true}"#), None);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let decoded = decode(r#"{"type":"PLAYER_DEATH","id":"peer-a","protocolVersion":7}"#);
        assert_eq!(
            decoded,
            Some(Message::PlayerDeath {
                id: PlayerId("peer-a".to_string())
            })
        );
    }

    #[test]
    fn ready_map_round_trips() {
        let mut ready = BTreeMap::new();
        ready.insert(PlayerId("a".into()), true);
        ready.insert(PlayerId("b".into()), false);
        let line = encode(&Message::ReadyStateSync { ready: ready.clone() }).expect("encode");
        assert_eq!(decode(&line), Some(Message::ReadyStateSync { ready }));
    }
}
