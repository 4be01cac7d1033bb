use std::process::ExitCode;
use std::time::{Duration, Instant};

use session::{SessionManager, TcpTransport};
use tracing::error;
use world::PlayerId;

use super::bootstrap::AppWiring;
use super::netplay::{GameLoop, TICK_DT};

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let transport = match TcpTransport::bind(app.config.listen_port) {
        Ok(transport) => transport,
        Err(err) => {
            error!(error = %err, port = app.config.listen_port, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    let manager = SessionManager::new(Box::new(transport), &app.config.player_name);
    let join_target = app.config.join.clone().map(PlayerId);
    let mut game = GameLoop::new(manager, app.config);
    match join_target {
        Some(target) => game.join(&target),
        None => game.host(),
    }

    let tick = Duration::from_secs_f32(TICK_DT);
    loop {
        let started = Instant::now();
        game.tick(game.read_local_input());
        if let Some(code) = game.exit_requested() {
            return code;
        }
        let elapsed = started.elapsed();
        if elapsed < tick {
            std::thread::sleep(tick - elapsed);
        }
    }
}
