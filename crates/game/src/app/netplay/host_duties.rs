impl GameLoop {
    fn host_periodic(&mut self, tick: u64) {
        if self.reconciler.phase() == Phase::Playing && tick % SYNC_ENV_INTERVAL_TICKS == 0 {
            let message = self.reconciler.make_sync_env(&self.state, &self.gen);
            self.manager.broadcast(&message);
        }
        if self.reconciler.phase() == Phase::Lobby && tick % READY_SYNC_INTERVAL_TICKS == 0 {
            self.broadcast_ready_state();
        }
        if self.reconciler.phase() == Phase::Playing
            && self
                .reconciler
                .all_players_dead(self.manager.player_count())
        {
            self.submit_run_score();
            let restart = Message::GameRestart;
            self.reconciler
                .apply_transition(&restart, &mut self.state, &mut self.gen);
            self.manager.broadcast(&restart);
        }
        if tick % HEARTBEAT_INTERVAL_TICKS == 0 {
            self.publish_heartbeat();
        }
    }

    fn broadcast_ready_state(&mut self) {
        let ready = self.reconciler.ready_map().clone();
        self.manager.broadcast(&Message::ReadyStateSync { ready });
    }

    /// Fire-and-forget score submission at the end of a run. Shares the
    /// directory service base URL; failures are logged on the worker thread.
    fn submit_run_score(&self) {
        let Some(url) = self.config.directory_url.clone() else {
            return;
        };
        let distance = self.state.player.pos.x.max(0.0) as u32;
        let entry = LeaderboardEntry {
            name: self.config.player_name.clone(),
            distance,
            time: self.state.elapsed_seconds as u32,
            date: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs().to_string())
                .unwrap_or_default(),
            persona: "courier".to_string(),
            difficulty: difficulty_for_cursor(distance as f32),
            is_mobile: false,
            seed: self.reconciler.seed().unwrap_or_default().to_string(),
        };
        let spawned = std::thread::Builder::new()
            .name("score-submit".to_string())
            .spawn(move || {
                if let Err(error) = leaderboard::submit(&url, &entry) {
                    warn!(%error, "score_submit_failed");
                }
            });
        if spawned.is_err() {
            warn!("score_submit_spawn_failed");
        }
    }

    fn publish_heartbeat(&mut self) {
        let Some(worker) = &self.heartbeat else {
            return;
        };
        let id = self
            .reconciler
            .local_id()
            .to_string();
        worker.publish(RoomInfo {
            id,
            name: format!("{}'s run", self.config.player_name),
            players: self.manager.player_count(),
            max_players: self.config.max_players,
        });
    }
}

/// The train paces itself off the slowest living player: far behind it
/// hurries, close on someone's heels it eases off. Host-only; guests take
/// the speed from `SYNC_ENV`.
fn host_train_speed(state: &SimulationState) -> f32 {
    let mut slowest: Option<f32> = None;
    if state.player.alive {
        slowest = Some(state.player.pos.x);
    }
    for remote in state.remote_players.values() {
        if remote.alive {
            slowest = Some(match slowest {
                Some(x) => x.min(remote.pos.x),
                None => remote.pos.x,
            });
        }
    }
    let Some(slowest_x) = slowest else {
        return TRAIN_MIN_SPEED;
    };
    let gap = slowest_x - state.train.leading_edge() - TRAIN_COMFORT_GAP;
    (gap * TRAIN_CATCHUP_RATE).clamp(TRAIN_MIN_SPEED, TRAIN_MAX_SPEED)
}
