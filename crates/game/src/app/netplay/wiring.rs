impl GameLoop {
    pub(crate) fn new(mut manager: SessionManager, config: GameConfig) -> Self {
        manager.init();
        manager.set_auto_join(config.auto_join);
        manager.set_max_players(config.max_players);
        let local_id = manager
            .local_id()
            .unwrap_or_else(|| PlayerId("unbound".to_string()));
        let mut reconciler = Reconciler::new(local_id);
        reconciler.set_net_rate(config.net_rate);
        Self {
            manager,
            reconciler,
            state: SimulationState::new(),
            gen: WorldGenerator::new(0, 0.0),
            config,
            heartbeat: None,
            auto_readied: false,
            exit: None,
        }
    }

    pub(crate) fn host(&mut self) {
        self.manager.host();
        let seed = self
            .config
            .seed
            .clone()
            .unwrap_or_else(Self::generate_seed);
        self.manager.set_seed(&seed);
        self.reconciler
            .adopt_seed(&seed, &mut self.state, &mut self.gen);
        self.heartbeat = self
            .config
            .directory_url
            .as_deref()
            .map(HeartbeatWorker::spawn);
        info!(%seed, "room_opened");
    }

    pub(crate) fn join(&mut self, target: &PlayerId) {
        self.manager.join(target);
    }

    pub(crate) fn exit_requested(&self) -> Option<ExitCode> {
        self.exit
    }

    /// Headless nodes idle; an input frontend replaces this.
    pub(crate) fn read_local_input(&self) -> PlayerInput {
        PlayerInput::default()
    }

    pub(crate) fn set_local_ready(&mut self, is_ready: bool) {
        let local = self.reconciler.local_id().clone();
        if !self.reconciler.set_ready(local.clone(), is_ready) {
            return;
        }
        if self.manager.is_host() {
            self.broadcast_ready_state();
        } else {
            let message = if is_ready {
                Message::PlayerReady { id: local }
            } else {
                Message::PlayerUnready { id: local }
            };
            self.manager.broadcast(&message);
        }
    }

    fn generate_seed() -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        format!("{nanos:08X}")
    }
}
