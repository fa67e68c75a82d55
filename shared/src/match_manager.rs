//! Match lifecycle state machine, run identically by every participant.
//!
//! Roster-driven transitions (Waiting <-> Ready) are derived locally on every
//! tick. Everything else moves only when a directive is received over the
//! session, including directives this participant broadcast itself. The
//! coordinator is the only replica that runs the countdown, computes the final
//! score and turns restart requests into restart orders.

use crate::config::MatchConfig;
use crate::error::ActionError;
use crate::ledger::TrashLedger;
use crate::placement::{Placement, PlacementSolver};
use crate::protocol::Directive;
use crate::registry::TrashRegistry;
use crate::session::{RosterChange, Session, SessionView};
use crate::timers::{Countdown, CountdownEvent, Cooldown};
use crate::types::{
    MatchState, Participant, ParticipantId, Role, ScoreSnapshot, TrashId, TrashItem, TrashKind,
    Vec3, Winner,
};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};

/// Notifications for the presentation layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchEvent {
    StateChanged { from: MatchState, to: MatchState },
    CountdownNumber(u32),
    /// Live scores while playing, or zeroes after a restart
    ScoreChanged { cleaner: i32, polluter: i32 },
    InputEnabled(bool),
    MatchFinished { snapshot: ScoreSnapshot, winner: Winner },
}

pub type MatchListener = Box<dyn FnMut(&MatchEvent) + Send>;

/// How a spawn was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpawnTrigger {
    /// Random spot near an anchor
    Key,
    /// Explicit target point
    Click,
}

pub struct MatchManager<S: Session> {
    config: MatchConfig,
    session: S,
    ledger: TrashLedger,
    registry: TrashRegistry,
    placement: PlacementSolver,
    countdown: Countdown,
    spawn_cooldown: Cooldown,
    grab_cooldown: Cooldown,

    state: MatchState,
    time_remaining: f32,
    initial_cleaner_trash: i32,
    live_scores: ScoreSnapshot,
    snapshot: Option<ScoreSnapshot>,
    input_enabled: bool,

    start_requested: bool,
    start_sent: bool,
    result_sent: bool,
    scene_seeded: bool,
    // Spawns broadcast but not yet echoed back, kept for placement
    pending_spawns: HashMap<TrashId, Vec3>,
    // Ids are never reused, so late spawns from these owners are dropped
    departed: HashSet<ParticipantId>,

    listeners: Vec<MatchListener>,
    rng: StdRng,
}

impl<S: Session> MatchManager<S> {
    pub fn new(config: MatchConfig, session: S) -> Self {
        Self::with_rng(config, session, StdRng::from_entropy())
    }

    /// Same as `new` but with a caller-provided random source
    pub fn with_rng(config: MatchConfig, session: S, rng: StdRng) -> Self {
        Self {
            ledger: TrashLedger::new(config.target_trash),
            registry: TrashRegistry::new(),
            placement: PlacementSolver::new(config.placement.clone()),
            countdown: Countdown::new(config.countdown_seconds),
            spawn_cooldown: Cooldown::new(config.spawn_cooldown),
            grab_cooldown: Cooldown::new(config.grab_cooldown),
            state: MatchState::WaitingForPlayers,
            time_remaining: config.match_duration,
            initial_cleaner_trash: 0,
            live_scores: ScoreSnapshot::new(0, 0),
            snapshot: None,
            input_enabled: false,
            start_requested: false,
            start_sent: false,
            result_sent: false,
            scene_seeded: false,
            pending_spawns: HashMap::new(),
            departed: HashSet::new(),
            listeners: Vec::new(),
            config,
            session,
            rng,
        }
    }

    pub fn subscribe(&mut self, listener: MatchListener) {
        self.listeners.push(listener);
    }

    pub fn current_state(&self) -> MatchState {
        self.state
    }

    pub fn time_remaining(&self) -> f32 {
        self.time_remaining
    }

    pub fn is_match_active(&self) -> bool {
        self.state == MatchState::Playing
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Final result as received from the coordinator
    pub fn score_snapshot(&self) -> Option<ScoreSnapshot> {
        self.snapshot
    }

    pub fn winner(&self) -> Option<Winner> {
        self.snapshot.map(|snapshot| snapshot.winner())
    }

    pub fn live_scores(&self) -> ScoreSnapshot {
        self.live_scores
    }

    pub fn initial_cleaner_trash(&self) -> i32 {
        self.initial_cleaner_trash
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn ledger(&self) -> &TrashLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut TrashLedger {
        &mut self.ledger
    }

    pub fn registry(&self) -> &TrashRegistry {
        &self.registry
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn spawn_cooldown(&self) -> &Cooldown {
        &self.spawn_cooldown
    }

    pub fn grab_cooldown(&self) -> &Cooldown {
        &self.grab_cooldown
    }

    /// Advances timers by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        self.spawn_cooldown.advance(dt);
        self.grab_cooldown.advance(dt);

        match self.state {
            MatchState::WaitingForPlayers | MatchState::ReadyToStart => {
                self.evaluate_roster();
            }
            MatchState::Countdown => {
                if self.session.is_coordinator() {
                    for event in self.countdown.advance(dt) {
                        self.broadcast_countdown(event);
                    }
                }
            }
            MatchState::Playing => {
                if self.time_remaining > 0.0 {
                    self.time_remaining = (self.time_remaining - dt).max(0.0);
                }
                self.update_live_scores();

                if self.time_remaining <= 0.0 {
                    if self.input_enabled {
                        info!("Match time is up, controls disabled");
                        self.set_input_enabled(false);
                    }
                    if self.session.is_coordinator() && !self.result_sent {
                        self.finish_as_coordinator();
                    }
                }
            }
            MatchState::Finished => {}
        }
    }

    /// Reacts to a roster update delivered by the session transport
    pub fn on_roster_changed(&mut self, change: &RosterChange) {
        for participant in &change.joined {
            info!(
                "{} joined as {} ({} present)",
                participant.name, participant.role, change.size
            );
        }
        for participant in &change.left {
            info!(
                "{} ({}) left ({} present)",
                participant.name, participant.role, change.size
            );
            self.drop_items_of(participant.id);
        }

        self.evaluate_roster();

        if !change.left.is_empty()
            && change.size < self.config.required_players
            && matches!(self.state, MatchState::Countdown | MatchState::Playing)
        {
            warn!(
                "Only {} participant(s) left during {}, continuing",
                change.size, self.state
            );
        }

        if change.became_coordinator {
            self.take_over_as_coordinator();
        }
    }

    /// Asks everyone to begin the countdown. Only accepted once per match,
    /// from ReadyToStart with enough participants present.
    pub fn request_start(&mut self) -> bool {
        if self.state != MatchState::ReadyToStart {
            debug!("Start request ignored in {}", self.state);
            return false;
        }
        if self.session.roster_size() < self.config.required_players {
            debug!("Start request ignored, not enough participants");
            return false;
        }
        if self.start_requested {
            debug!("Start already requested");
            return false;
        }

        self.start_requested = true;
        info!("Requesting match start");
        self.session.broadcast(Directive::StartRequested);
        true
    }

    /// Asks the coordinator to reset the match. Only accepted after a match
    /// has finished.
    pub fn request_restart(&mut self) -> bool {
        if self.state != MatchState::Finished {
            debug!("Restart request ignored in {}", self.state);
            return false;
        }

        info!("Requesting restart from coordinator");
        self.session.send_to_coordinator(Directive::RequestRestart);
        true
    }

    /// Applies a directive received from the session, `from` being its sender
    pub fn handle_directive(&mut self, from: ParticipantId, directive: Directive) {
        match directive {
            Directive::StartRequested => self.on_start_requested(from),
            Directive::CountdownTick { remaining } => {
                if self.state == MatchState::Countdown {
                    info!("Countdown: {}", remaining);
                    self.emit(MatchEvent::CountdownNumber(remaining));
                } else {
                    debug!("Ignoring countdown tick {} in {}", remaining, self.state);
                }
            }
            Directive::StartMatch => self.on_start_match(),
            Directive::MatchResult { snapshot } => self.on_match_result(snapshot),
            Directive::RequestRestart => {
                if self.session.is_coordinator() {
                    info!("Participant {} requested a restart", from);
                    self.session.broadcast(Directive::ExecuteRestart);
                } else {
                    warn!(
                        "Restart request from {} reached a non-coordinator, ignoring",
                        from
                    );
                }
            }
            Directive::ExecuteRestart => self.execute_restart(),
            Directive::TrashSpawned { item } => self.on_trash_spawned(item),
            Directive::TrashCollected { id } => self.on_trash_collected(from, id),
            Directive::TrashDestroyed { id } => {
                if self.registry.remove(&id).is_some() {
                    debug!("Trash {} destroyed", id);
                }
            }
        }

        if self.state == MatchState::Playing {
            self.update_live_scores();
        }
    }

    /// Resets this replica after the coordinator ordered a restart.
    /// Safe to run in any state, including WaitingForPlayers.
    pub fn execute_restart(&mut self) {
        info!("Executing restart");

        let local = self.session.local_id();
        for id in self.registry.owned_by(local) {
            self.registry.remove(&id);
            self.session.broadcast(Directive::TrashDestroyed { id });
        }
        self.pending_spawns.clear();

        self.countdown.cancel();
        self.spawn_cooldown.reset();
        self.grab_cooldown.reset();
        self.time_remaining = self.config.match_duration;
        self.initial_cleaner_trash = 0;
        self.snapshot = None;
        self.start_requested = false;
        self.start_sent = false;
        self.result_sent = false;
        self.scene_seeded = false;

        self.ledger.reset();
        self.ledger.reset_spawned();

        if self.input_enabled {
            self.set_input_enabled(false);
        }
        self.set_state(MatchState::WaitingForPlayers);

        self.live_scores = ScoreSnapshot::new(0, 0);
        self.emit(MatchEvent::ScoreChanged {
            cleaner: 0,
            polluter: 0,
        });

        self.evaluate_roster();

        if self.session.is_coordinator() && self.config.scene_trash_count > 0 {
            self.seed_scene_trash();
        }
    }

    /// Cleaner score is what was collected since the match started, polluter
    /// score is how many polluter items are still alive
    pub fn compute_score_snapshot(&self) -> ScoreSnapshot {
        ScoreSnapshot::new(
            self.ledger.get() - self.initial_cleaner_trash,
            self.registry.count_alive(Role::Polluter) as i32,
        )
    }

    /// Spawns trash at a random spot around `anchor`
    pub fn spawn_near(&mut self, anchor: Vec3) -> Result<(TrashId, Placement), ActionError> {
        self.check_spawn_allowed(SpawnTrigger::Key)?;

        let angle: f32 = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance: f32 = self.rng.gen_range(0.0..=self.config.spawn_radius);
        let height: f32 = self
            .rng
            .gen_range(self.config.min_spawn_height..=self.config.max_spawn_height);
        let desired = Vec3::new(
            anchor.x + angle.cos() * distance,
            anchor.y + height,
            anchor.z + angle.sin() * distance,
        );

        Ok(self.spawn_polluter_item(desired))
    }

    /// Spawns trash at an explicit point. Always subject to the cooldown.
    pub fn spawn_at(&mut self, point: Vec3) -> Result<(TrashId, Placement), ActionError> {
        self.check_spawn_allowed(SpawnTrigger::Click)?;
        Ok(self.spawn_polluter_item(point))
    }

    /// Grabs the closest item within reach of `from`
    pub fn collect_nearest(&mut self, from: Vec3) -> Result<TrashId, ActionError> {
        self.check_action_allowed(Role::Cleaner)?;
        if !self.grab_cooldown.is_ready() {
            return Err(ActionError::CoolingDown {
                remaining: self.grab_cooldown.remaining(),
            });
        }

        let grab_distance = self.config.grab_distance;
        let id = self
            .registry
            .nearest_within(from, grab_distance)
            .map(|item| item.id)
            .ok_or(ActionError::NothingInReach {
                distance: grab_distance,
            })?;

        debug!("Grabbing trash {}", id);
        self.grab_cooldown.trigger();
        self.session.broadcast(Directive::TrashCollected { id });
        Ok(id)
    }

    /// Coordinator only: places the configured number of collectibles around
    /// the arena. Returns how many were broadcast.
    pub fn seed_scene_trash(&mut self) -> usize {
        if !self.session.is_coordinator() {
            debug!("Only the coordinator seeds scene trash");
            return 0;
        }

        let count = self.config.scene_trash_count;
        for _ in 0..count {
            let angle: f32 = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let distance: f32 = self.rng.gen_range(0.0..=self.config.arena_radius);
            let height: f32 = self
                .rng
                .gen_range(self.config.min_spawn_height..=self.config.max_spawn_height);
            let desired = Vec3::new(angle.cos() * distance, height, angle.sin() * distance);
            self.spawn_item(desired, Role::Cleaner);
        }

        self.scene_seeded = true;
        info!("Seeded {} scene collectibles", count);
        count
    }

    fn evaluate_roster(&mut self) {
        let size = self.session.roster_size();
        let required = self.config.required_players;

        match self.state {
            MatchState::WaitingForPlayers if size >= required => {
                self.set_state(MatchState::ReadyToStart);
            }
            MatchState::ReadyToStart if size < required => {
                self.start_requested = false;
                self.set_state(MatchState::WaitingForPlayers);
            }
            _ => {}
        }
    }

    fn take_over_as_coordinator(&mut self) {
        info!("This participant is now the coordinator");

        match self.state {
            MatchState::Countdown if !self.countdown.is_running() && !self.start_sent => {
                info!("Resuming countdown after coordinator hand-over");
                let event = self.countdown.start();
                self.broadcast_countdown(event);
            }
            MatchState::Playing if self.time_remaining <= 0.0 && !self.result_sent => {
                info!("Match already over, publishing result after hand-over");
                self.finish_as_coordinator();
            }
            MatchState::WaitingForPlayers | MatchState::ReadyToStart
                if !self.scene_seeded && self.config.scene_trash_count > 0 =>
            {
                self.seed_scene_trash();
            }
            _ => {}
        }
    }

    fn on_start_requested(&mut self, from: ParticipantId) {
        if self.state == MatchState::WaitingForPlayers {
            self.evaluate_roster();
        }
        if self.state != MatchState::ReadyToStart {
            debug!(
                "Ignoring start request from {} in {}",
                from, self.state
            );
            return;
        }

        info!("Participant {} started the match", from);
        self.start_requested = true;
        self.set_state(MatchState::Countdown);

        if self.session.is_coordinator() {
            let event = self.countdown.start();
            self.broadcast_countdown(event);
        }
    }

    fn broadcast_countdown(&mut self, event: CountdownEvent) {
        match event {
            CountdownEvent::Number(remaining) => {
                self.session
                    .broadcast(Directive::CountdownTick { remaining });
            }
            CountdownEvent::Finished => {
                info!("Countdown complete, starting match");
                self.start_sent = true;
                self.session.broadcast(Directive::StartMatch);
            }
        }
    }

    fn on_start_match(&mut self) {
        if self.state != MatchState::Countdown {
            debug!("Ignoring start-match directive in {}", self.state);
            return;
        }

        self.countdown.cancel();
        self.time_remaining = self.config.match_duration;
        self.initial_cleaner_trash = self.ledger.get();
        self.snapshot = None;
        self.result_sent = false;
        self.live_scores = ScoreSnapshot::new(0, 0);

        info!(
            "Match started: {:.0}s on the clock, baseline {} collected",
            self.time_remaining, self.initial_cleaner_trash
        );
        self.set_state(MatchState::Playing);
        self.emit(MatchEvent::ScoreChanged {
            cleaner: 0,
            polluter: 0,
        });
        self.set_input_enabled(true);
    }

    fn finish_as_coordinator(&mut self) {
        let snapshot = self.compute_score_snapshot();
        self.result_sent = true;
        info!(
            "Final score computed: cleaner {} vs polluter {}",
            snapshot.cleaner_score, snapshot.polluter_score
        );
        self.session.broadcast(Directive::MatchResult { snapshot });
    }

    fn on_match_result(&mut self, snapshot: ScoreSnapshot) {
        match self.state {
            MatchState::Playing => {}
            MatchState::Finished => {
                debug!("Already finished, ignoring duplicate result");
                return;
            }
            other => {
                warn!("Ignoring match result received in {}", other);
                return;
            }
        }

        self.snapshot = Some(snapshot);
        self.time_remaining = 0.0;
        if self.input_enabled {
            self.set_input_enabled(false);
        }
        self.set_state(MatchState::Finished);

        let winner = snapshot.winner();
        info!(
            "Match finished: cleaner {} vs polluter {}, winner {:?}",
            snapshot.cleaner_score, snapshot.polluter_score, winner
        );
        self.emit(MatchEvent::MatchFinished { snapshot, winner });
    }

    /// Nobody is left to destroy a departed participant's items on restart,
    /// so every replica drops them as soon as the roster says they are gone
    fn drop_items_of(&mut self, owner: ParticipantId) {
        self.departed.insert(owner);
        let owned = self.registry.owned_by(owner);
        if owned.is_empty() {
            return;
        }
        for id in &owned {
            self.registry.remove(id);
        }
        info!("Removed {} item(s) left behind by {}", owned.len(), owner);
    }

    fn on_trash_spawned(&mut self, item: TrashItem) {
        self.pending_spawns.remove(&item.id);

        if self.departed.contains(&item.id.owner) {
            debug!("Trash {} belongs to a departed participant, ignoring", item.id);
            return;
        }

        let id = item.id;
        let role = item.owner_role;
        if !self.registry.insert(item) {
            debug!("Trash {} already known or removed, ignoring spawn", id);
            return;
        }

        match role {
            Role::Polluter => self.ledger.increment_spawned(),
            Role::Cleaner => self.scene_seeded = true,
        }
        debug!("Trash {} spawned ({} alive)", id, self.registry.len());
    }

    fn on_trash_collected(&mut self, from: ParticipantId, id: TrashId) {
        match self.registry.remove(&id) {
            Some(item) => {
                debug!("Trash {} collected by {}", id, from);
                self.ledger.add(item.points);
            }
            None => debug!("Trash {} already gone, ignoring collection", id),
        }
    }

    fn check_action_allowed(&self, role: Role) -> Result<(), ActionError> {
        if self.session.local_role() != role {
            return Err(ActionError::WrongRole { expected: role });
        }
        if self.state != MatchState::Playing {
            return Err(ActionError::MatchNotActive(self.state));
        }
        if !self.input_enabled {
            return Err(ActionError::InputDisabled);
        }
        Ok(())
    }

    fn check_spawn_allowed(&self, trigger: SpawnTrigger) -> Result<(), ActionError> {
        self.check_action_allowed(Role::Polluter)?;

        let bypass =
            trigger == SpawnTrigger::Key && self.config.allow_key_spawn_during_cooldown;
        if !bypass && !self.spawn_cooldown.is_ready() {
            return Err(ActionError::CoolingDown {
                remaining: self.spawn_cooldown.remaining(),
            });
        }
        Ok(())
    }

    fn spawn_polluter_item(&mut self, desired: Vec3) -> (TrashId, Placement) {
        let spawned = self.spawn_item(desired, Role::Polluter);
        self.spawn_cooldown.trigger();
        spawned
    }

    fn spawn_item(&mut self, desired: Vec3, role: Role) -> (TrashId, Placement) {
        let search = self.placement.config().fallback_distance();
        let mut occupied = self.registry.positions_near(desired, search);
        occupied.extend(
            self.pending_spawns
                .values()
                .filter(|position| position.distance(&desired) <= search),
        );

        let placement = self
            .placement
            .find_position(desired, &occupied, &mut self.rng);
        if placement.is_fallback() {
            warn!(
                "Trash placed at unvalidated fallback {} (desired {})",
                placement.position(),
                desired
            );
        }

        let id = self.registry.allocate_id(self.session.local_id());
        let kind = TrashKind::ALL[self.rng.gen_range(0..TrashKind::ALL.len())];
        let item = TrashItem {
            id,
            kind,
            owner_role: role,
            position: placement.position(),
            rotation: self.rng.gen_range(0.0..360.0),
            points: 1,
        };

        debug!("Spawning {:?} {} at {}", kind, id, item.position);
        self.pending_spawns.insert(id, item.position);
        self.session.broadcast(Directive::TrashSpawned { item });
        (id, placement)
    }

    fn update_live_scores(&mut self) {
        let scores = ScoreSnapshot::new(
            self.ledger.get() - self.initial_cleaner_trash,
            self.ledger.spawned_count(),
        );
        if scores != self.live_scores {
            self.live_scores = scores;
            self.emit(MatchEvent::ScoreChanged {
                cleaner: scores.cleaner_score,
                polluter: scores.polluter_score,
            });
        }
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
        self.emit(MatchEvent::InputEnabled(enabled));
    }

    fn set_state(&mut self, to: MatchState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!("Match state {} -> {}", from, to);
        self.state = to;
        self.emit(MatchEvent::StateChanged { from, to });
    }

    fn emit(&mut self, event: MatchEvent) {
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }
}

impl MatchManager<SessionView> {
    /// Applies the relay's roster to the session view and reacts to it
    pub fn apply_roster(
        &mut self,
        members: Vec<Participant>,
        coordinator: ParticipantId,
    ) -> RosterChange {
        let change = self.session.apply_roster(members, coordinator);
        if !change.is_empty() {
            self.on_roster_changed(&change);
        }
        change
    }
}

impl<S: Session + std::fmt::Debug> std::fmt::Debug for MatchManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchManager")
            .field("state", &self.state)
            .field("time_remaining", &self.time_remaining)
            .field("session", &self.session)
            .field("ledger", &self.ledger)
            .field("alive", &self.registry.len())
            .field("snapshot", &self.snapshot)
            .finish()
    }
}
