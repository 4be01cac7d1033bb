use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::{ConfigError, GameConfig, DEFAULT_CONFIG_FILE};

pub(crate) struct AppWiring {
    pub(crate) config: GameConfig,
}

pub(crate) fn build_app() -> Result<AppWiring, ConfigError> {
    init_tracing();
    info!("=== Railrush Startup ===");

    let path = config_path_from_args();
    let config = GameConfig::load(&path)?;
    info!(
        player = %config.player_name,
        port = config.listen_port,
        joining = config.join.is_some(),
        "config_loaded"
    );

    Ok(AppWiring { config })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn config_path_from_args() -> PathBuf {
    std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}
