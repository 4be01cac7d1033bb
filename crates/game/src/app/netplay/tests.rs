use session::MemoryHub;
use world::{Train, WallKind};

use super::*;

fn test_config(seed: Option<&str>) -> GameConfig {
    GameConfig {
        seed: seed.map(str::to_string),
        ..GameConfig::default()
    }
}

fn make_pair(hub: &MemoryHub, seed: &str) -> (GameLoop, GameLoop) {
    let host_manager =
        SessionManager::new(Box::new(hub.endpoint("host")), "alice");
    let guest_manager =
        SessionManager::new(Box::new(hub.endpoint("guest")), "bob");
    let mut host = GameLoop::new(host_manager, test_config(Some(seed)));
    let mut guest = GameLoop::new(guest_manager, test_config(None));
    host.host();
    guest.join(&PlayerId("host".to_string()));
    (host, guest)
}

fn pump(host: &mut GameLoop, guest: &mut GameLoop, ticks: u32) {
    for _ in 0..ticks {
        host.tick(PlayerInput::default());
        guest.tick(PlayerInput::default());
    }
}

#[test]
fn solo_host_waits_in_the_lobby() {
    let hub = MemoryHub::new();
    let manager = SessionManager::new(Box::new(hub.endpoint("host")), "alice");
    let mut host = GameLoop::new(manager, test_config(Some("ABC123")));
    host.host();
    for _ in 0..10 {
        host.tick(PlayerInput::default());
    }
    assert_eq!(host.reconciler.phase(), Phase::Lobby);
}

#[test]
fn guest_adopts_seed_and_both_reach_playing() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = make_pair(&hub, "ABC123");
    pump(&mut host, &mut guest, 10);

    assert_eq!(guest.reconciler.seed(), Some("ABC123"));
    assert_eq!(host.reconciler.phase(), Phase::Playing);
    assert_eq!(guest.reconciler.phase(), Phase::Playing);
    // Identical seeds generate identical geometry on both sides.
    assert_eq!(host.state.walls.len(), guest.state.walls.len());
}

#[test]
fn guest_train_speed_converges_on_the_host_rate() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = make_pair(&hub, "ABC123");
    pump(&mut host, &mut guest, 10);
    assert_eq!(host.reconciler.phase(), Phase::Playing);

    guest.state.train = Train {
        speed: 999.0,
        ..guest.state.train
    };
    // Long enough for at least one SYNC_ENV to land. The host keeps
    // re-pacing every tick, so the guest tracks within a few units.
    pump(&mut host, &mut guest, SYNC_ENV_INTERVAL_TICKS as u32 + 5);
    assert!(guest.state.train.speed < 999.0);
    assert!((guest.state.train.speed - host.state.train.speed).abs() < 10.0);
}

#[test]
fn train_never_moves_backward_under_sync() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = make_pair(&hub, "ABC123");
    pump(&mut host, &mut guest, 10);

    // Guest train running well ahead of the host's.
    guest.state.train.x = host.state.train.x + 300.0;
    let before = guest.state.train.x;
    pump(&mut host, &mut guest, SYNC_ENV_INTERVAL_TICKS as u32 + 5);
    assert!(guest.state.train.x >= before);
}

#[test]
fn train_advances_exactly_one_integration_per_tick() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = make_pair(&hub, "ABC123");
    pump(&mut host, &mut guest, 10);
    assert_eq!(guest.reconciler.phase(), Phase::Playing);

    // Guests run the published rate untouched, so one tick moves the
    // hazard by speed * dt and nothing more.
    guest.state.train.speed = 240.0;
    let before = guest.state.train.x;
    guest.tick(PlayerInput::default());
    let delta = guest.state.train.x - before;
    assert!((delta - 240.0 * TICK_DT).abs() < 1e-3);
}

#[test]
fn active_delivery_pad_survives_pruning() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = make_pair(&hub, "ABC123");
    pump(&mut host, &mut guest, 10);
    assert_eq!(host.reconciler.phase(), Phase::Playing);

    // Fly far past the delivery pad, then cross a prune boundary.
    host.state.player.pos.x = 20_000.0;
    for _ in 0..PRUNE_INTERVAL_TICKS as u32 {
        host.tick(PlayerInput::default());
    }

    let pad_x = host.state.last_delivery_wall_x;
    assert!(host
        .state
        .walls
        .iter()
        .any(|w| w.kind == WallKind::Checkpoint && w.x == pad_x));
}

#[test]
fn all_dead_sends_everyone_back_to_the_lobby() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = make_pair(&hub, "ABC123");
    pump(&mut host, &mut guest, 10);
    assert_eq!(host.reconciler.phase(), Phase::Playing);

    host.reconciler.record_death(PlayerId("host".to_string()));
    host.reconciler.record_death(PlayerId("guest".to_string()));
    host.tick(PlayerInput::default());
    guest.tick(PlayerInput::default());

    assert_eq!(guest.reconciler.phase(), Phase::Lobby);
    assert_eq!(host.reconciler.death_count(), 0);
}

#[test]
fn train_pace_tracks_the_slowest_living_player() {
    let mut state = SimulationState::new();
    state.player.pos.x = 20_000.0;
    assert_eq!(host_train_speed(&state), TRAIN_MAX_SPEED);

    state.player.pos.x = state.train.leading_edge() + TRAIN_COMFORT_GAP;
    assert_eq!(host_train_speed(&state), TRAIN_MIN_SPEED);

    state.player.alive = false;
    assert_eq!(host_train_speed(&state), TRAIN_MIN_SPEED);
}
