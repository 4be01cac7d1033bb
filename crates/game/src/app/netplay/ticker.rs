impl GameLoop {
    /// One fixed-rate tick. Session events drain first so the physics step
    /// below always runs against the reconciled state.
    pub(crate) fn tick(&mut self, input: PlayerInput) {
        self.manager.tick();
        for event in self.manager.drain_events() {
            self.fold_session_event(event);
        }

        match self.reconciler.phase() {
            Phase::Menu => {}
            Phase::Lobby => self.tick_lobby(),
            Phase::Playing => self.tick_playing(input),
        }

        let tick = self.reconciler.advance_tick();
        if self.manager.is_host() {
            self.host_periodic(tick);
        }
        if tick % self.reconciler.net_rate().ticks_per_broadcast() == 0
            && self.reconciler.phase() == Phase::Playing
        {
            let message = self.reconciler.make_player_state(&self.state);
            self.manager.broadcast(&message);
        }
        if tick % PRUNE_INTERVAL_TICKS == 0 {
            // The current delivery pad must survive even when the player has
            // flown far past it; a respawn still lands there.
            let protected_x = self.state.player.pos.x.min(self.state.last_delivery_wall_x);
            self.state.prune(protected_x);
        }
    }

    fn fold_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected(id) => {
                debug!(peer = %id, "endpoint_confirmed");
            }
            SessionEvent::Error { kind, detail } => {
                warn!(%detail, "{}", kind.user_message());
                if !self.manager.is_host() {
                    self.exit = Some(ExitCode::FAILURE);
                }
            }
            SessionEvent::JoinRequested { peer, name } => {
                // Manual-approval rooms hold the request until an operator
                // decides; see `SessionManager::approve_join`.
                info!(%peer, %name, "join_awaiting_approval");
            }
            SessionEvent::PlayerJoined { peer, name } => {
                info!(%peer, %name, "player_joined");
                // The seed itself rides along with the approval; only the
                // current ready map still needs to reach the newcomer.
                if self.manager.is_host() {
                    let ready = self.reconciler.ready_map().clone();
                    self.manager
                        .send_to(&peer, &Message::ReadyStateSync { ready });
                }
            }
            SessionEvent::PlayerLeft { peer } => {
                info!(%peer, "player_left");
                self.state.remote_players.remove(&peer);
                self.reconciler.forget(&peer);
            }
            SessionEvent::Approved => {
                info!("join_approved");
            }
            SessionEvent::Rejected { reason } => {
                let reason = reason.unwrap_or_else(|| "no reason given".to_string());
                warn!(%reason, "join_rejected");
                self.exit = Some(ExitCode::FAILURE);
            }
            SessionEvent::Kicked => {
                info!("kicked_from_room");
                self.exit = Some(ExitCode::SUCCESS);
            }
            SessionEvent::Message { from, message } => {
                self.reconciler.handle(
                    &from,
                    message,
                    &mut self.state,
                    &mut self.gen,
                    &mut self.manager,
                );
            }
        }
    }

    fn tick_lobby(&mut self) {
        if !self.auto_readied {
            self.auto_readied = true;
            self.set_local_ready(true);
        }
        // Solo rooms idle in the lobby until someone joins.
        if self.manager.is_host()
            && self.manager.roster().len() >= 2
            && self.reconciler.all_ready(self.manager.roster())
        {
            let start = Message::GameStart;
            self.reconciler
                .apply_transition(&start, &mut self.state, &mut self.gen);
            self.manager.broadcast(&start);
        }
    }

    fn tick_playing(&mut self, input: PlayerInput) {
        // Re-arm the lobby auto-ready for the next round.
        self.auto_readied = false;
        // The host re-paces the hazard before the step integrates it; guests
        // keep whatever SYNC_ENV last told them.
        if self.manager.is_host() {
            self.state.train.speed = host_train_speed(&self.state);
        }
        let alive_before = self.state.player.alive;
        let events = self.state.step(TICK_DT, input);
        for event in events {
            match event {
                StepEvent::Collected(collect) => {
                    let message = Message::PickupCollect {
                        pickup_type: collect.kind,
                        x: collect.pos.x,
                        y: collect.pos.y,
                    };
                    self.manager.broadcast(&message);
                }
                StepEvent::Died => {
                    if alive_before {
                        let id = self.reconciler.local_id().clone();
                        self.reconciler.record_death(id.clone());
                        self.manager.broadcast(&Message::PlayerDeath { id });
                    }
                }
            }
        }

        for _ in 0..MAX_CHUNKS_PER_TICK {
            if self.state.player.pos.x + GENERATE_AHEAD <= self.gen.cursor() {
                break;
            }
            self.gen.generate_chunk(&mut self.state);
        }
    }
}
