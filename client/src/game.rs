//! Participant-side game state: the match core replica plus the local avatar

use crate::input::{Command, InputManager, HELP};
use crate::sensor::PoseData;
use log::{debug, info, warn};
use shared::{
    format_time, ActionError, MatchConfig, MatchManager, Participant, ParticipantId, Role,
    SessionView, Vec3,
};

/// Gesture movement tuning
#[derive(Debug, Clone, PartialEq)]
pub struct MovementSettings {
    pub move_speed: f32,
    /// Degrees per second
    pub rotation_speed: f32,
    pub forward_multiplier: f32,
    pub backward_multiplier: f32,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            move_speed: 8.0,
            rotation_speed: 10.0,
            forward_multiplier: 2.0,
            backward_multiplier: 0.8,
        }
    }
}

/// Where this participant is in the play space. For the Cleaner it is the
/// diver, for the Polluter the focus of the top-down view.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Avatar {
    pub position: Vec3,
    /// Yaw in degrees, clockwise seen from above, 0 facing +Z
    pub heading: f32,
}

impl Avatar {
    pub fn forward(&self) -> Vec3 {
        let yaw = self.heading.to_radians();
        Vec3::new(yaw.sin(), 0.0, yaw.cos())
    }

    pub fn turn(&mut self, degrees: f32) {
        self.heading = (self.heading + degrees).rem_euclid(360.0);
    }

    pub fn advance(&mut self, distance: f32) {
        self.position = self.position + self.forward() * distance;
    }

    /// Integrates one tick of gesture movement
    pub fn apply_pose(&mut self, pose: &PoseData, settings: &MovementSettings, dt: f32) {
        let turn = pose.turn_intent();
        if turn != 0.0 {
            self.turn(turn * settings.rotation_speed * dt);
        }
        if pose.both_hands_up {
            self.advance(settings.move_speed * settings.forward_multiplier * dt);
        }
        if pose.palms_together_praying {
            self.advance(-settings.move_speed * settings.backward_multiplier * dt);
        }
    }
}

/// What the owning loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

pub struct ClientGame {
    pub manager: MatchManager<SessionView>,
    pub avatar: Avatar,
    movement: MovementSettings,
    input: InputManager,
}

impl ClientGame {
    pub fn new(config: MatchConfig, session: SessionView) -> Self {
        Self {
            manager: MatchManager::new(config, session),
            avatar: Avatar::default(),
            movement: MovementSettings::default(),
            input: InputManager::new(),
        }
    }

    /// Game for a participant that has not been admitted by the relay yet
    pub fn connecting(config: MatchConfig, name: &str) -> Self {
        let placeholder = Participant::new(0, name, Role::Cleaner);
        Self::new(config, SessionView::new(placeholder))
    }

    pub fn local(&self) -> &Participant {
        self.manager.session().local()
    }

    pub fn role(&self) -> Role {
        self.local().role
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local().id
    }

    /// Replaces the match replica once the relay has admitted us
    pub fn admit(&mut self, participant: Participant) {
        info!(
            "Admitted as participant {} ({})",
            participant.id, participant.role
        );
        let config = self.manager.config().clone();
        self.manager = MatchManager::new(config, SessionView::new(participant));
    }

    /// One fixed-rate tick: gestures first, then match timers
    pub fn update(&mut self, pose: &PoseData, dt: f32) {
        let actions = self.input.update(pose);
        if actions.highlight_toggled {
            info!(
                "Highlight mode {}",
                if self.input.highlight_active() { "on" } else { "off" }
            );
        }

        if self.role() == Role::Cleaner && self.manager.input_enabled() {
            self.avatar.apply_pose(pose, &self.movement, dt);

            if actions.grab {
                match self.manager.collect_nearest(self.avatar.position) {
                    Ok(id) => info!("Grabbed trash {}", id),
                    Err(ActionError::CoolingDown { .. }) => {}
                    Err(e) => debug!("Grab: {}", e),
                }
            }
        }

        self.manager.tick(dt);
    }

    pub fn execute(&mut self, command: Command) -> CommandOutcome {
        match command {
            Command::Start => {
                if !self.manager.request_start() {
                    warn!(
                        "Cannot start now ({}, {} present)",
                        self.manager.current_state(),
                        self.manager.session().roster().len()
                    );
                }
            }
            Command::Restart => {
                if !self.manager.request_restart() {
                    warn!("Restart is only available once the match has finished");
                }
            }
            Command::Spawn(target) => {
                let result = match target {
                    Some(point) => self.manager.spawn_at(point),
                    None => self.manager.spawn_near(self.avatar.position),
                };
                match result {
                    Ok((id, placement)) => {
                        info!("Spawned trash {} at {}", id, placement.position())
                    }
                    Err(e) => warn!("Cannot spawn: {}", e),
                }
            }
            Command::Grab => match self.manager.collect_nearest(self.avatar.position) {
                Ok(id) => info!("Grabbed trash {}", id),
                Err(e) => warn!("Cannot grab: {}", e),
            },
            Command::Turn(degrees) => {
                self.avatar.turn(degrees);
                info!("Heading {:.0}°", self.avatar.heading);
            }
            Command::Move(distance) => {
                if self.role() == Role::Cleaner && !self.manager.input_enabled() {
                    warn!("Controls are disabled");
                } else {
                    self.avatar.advance(distance);
                    info!("Position {}", self.avatar.position);
                }
            }
            Command::Status => info!("{}", self.status_line()),
            Command::Help => info!("{}", HELP),
            Command::Quit => return CommandOutcome::Quit,
        }
        CommandOutcome::Continue
    }

    /// Readiness of this role's action, e.g. "grab ready" or "spawn 40%"
    pub fn cooldown_label(&self) -> String {
        let (action, cooldown) = match self.role() {
            Role::Cleaner => ("grab", self.manager.grab_cooldown()),
            Role::Polluter => ("spawn", self.manager.spawn_cooldown()),
        };
        if cooldown.is_ready() {
            format!("{} ready", action)
        } else {
            format!("{} {:.0}%", action, cooldown.progress() * 100.0)
        }
    }

    pub fn status_line(&self) -> String {
        let scores = self.manager.live_scores();
        let ledger = self.manager.ledger();
        format!(
            "{} | {} | {} | cleaner {} vs polluter {} | collected {}/{} ({} pts) | {} items alive | {} | at {}",
            self.local().role,
            self.manager.current_state(),
            format_time(self.manager.time_remaining()),
            scores.cleaner_score,
            scores.polluter_score,
            ledger.get(),
            ledger.target(),
            ledger.total_points(),
            self.manager.registry().len(),
            self.cooldown_label(),
            self.avatar.position
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Directive, MatchState, Session};

    fn offline(role: Role) -> ClientGame {
        let local = Participant::new(1, "solo", role);
        ClientGame::new(MatchConfig::default(), SessionView::offline(local))
    }

    #[test]
    fn test_avatar_forward_and_turn() {
        let mut avatar = Avatar::default();
        avatar.advance(2.0);
        assert_approx_eq!(avatar.position.z, 2.0);

        avatar.turn(90.0);
        avatar.advance(1.0);
        assert_approx_eq!(avatar.position.x, 1.0, 1e-5);

        avatar.turn(-180.0);
        assert_approx_eq!(avatar.heading, 270.0);
    }

    #[test]
    fn test_pose_movement_speeds() {
        let settings = MovementSettings::default();
        let mut avatar = Avatar::default();

        let forward = PoseData {
            both_hands_up: true,
            ..PoseData::default()
        };
        avatar.apply_pose(&forward, &settings, 0.5);
        assert_approx_eq!(avatar.position.z, 8.0);

        let backward = PoseData {
            palms_together_praying: true,
            ..PoseData::default()
        };
        avatar.apply_pose(&backward, &settings, 0.5);
        assert_approx_eq!(avatar.position.z, 8.0 - 3.2);

        let turn_right = PoseData {
            right_hand_up: true,
            ..PoseData::default()
        };
        avatar.apply_pose(&turn_right, &settings, 1.0);
        assert_approx_eq!(avatar.heading, 10.0);
    }

    #[test]
    fn test_cleaner_does_not_move_before_match() {
        let mut game = offline(Role::Cleaner);
        let forward = PoseData {
            both_hands_up: true,
            ..PoseData::default()
        };
        game.update(&forward, 1.0);
        assert_eq!(game.avatar.position, Vec3::ZERO);
    }

    #[test]
    fn test_quit_command() {
        let mut game = offline(Role::Polluter);
        assert_eq!(game.execute(Command::Status), CommandOutcome::Continue);
        assert_eq!(game.execute(Command::Quit), CommandOutcome::Quit);
    }

    #[test]
    fn test_spawn_cooldown_in_status() {
        let mut game = offline(Role::Polluter);
        let local = game.local().clone();
        game.manager
            .apply_roster(vec![Participant::new(2, "c", Role::Cleaner), local], 2);
        game.manager.handle_directive(2, Directive::StartRequested);
        game.manager.handle_directive(2, Directive::StartMatch);
        assert!(game.status_line().contains("| spawn ready |"));

        game.manager.spawn_near(Vec3::ZERO).unwrap();
        assert_eq!(game.cooldown_label(), "spawn 0%");
    }

    #[test]
    fn test_admit_replaces_identity() {
        let mut game = ClientGame::connecting(MatchConfig::default(), "diver");
        assert_eq!(game.local_id(), 0);

        game.admit(Participant::new(7, "diver", Role::Polluter));
        assert_eq!(game.local_id(), 7);
        assert_eq!(game.role(), Role::Polluter);
        assert!(!game.manager.session().is_coordinator());
    }

    #[test]
    fn test_pose_grab_collects_during_match() {
        let mut game = offline(Role::Cleaner);
        let local = game.local().clone();
        game.manager
            .apply_roster(vec![local, Participant::new(2, "p", Role::Polluter)], 1);
        game.manager.handle_directive(1, Directive::StartRequested);
        game.manager.handle_directive(1, Directive::StartMatch);
        assert_eq!(game.manager.current_state(), MatchState::Playing);

        let item = shared::TrashItem {
            id: shared::TrashId { owner: 2, seq: 1 },
            kind: shared::TrashKind::Crate,
            owner_role: Role::Polluter,
            position: Vec3::new(0.0, 0.0, 2.0),
            rotation: 0.0,
            points: 1,
        };
        game.manager
            .handle_directive(2, Directive::TrashSpawned { item });
        game.manager.session_mut().drain_outgoing();

        assert_eq!(game.cooldown_label(), "grab ready");
        let grab = PoseData {
            grab: true,
            ..PoseData::default()
        };
        game.update(&grab, 1.0 / 60.0);
        assert_ne!(game.cooldown_label(), "grab ready");
        assert!(game.status_line().contains("| grab "));

        let outgoing = game.manager.session_mut().drain_outgoing();
        assert!(outgoing.iter().any(|o| matches!(
            o.directive,
            Directive::TrashCollected { .. }
        )));
    }
}
