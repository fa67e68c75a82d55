//! Operator commands and gesture edge detection

use crate::sensor::PoseData;
use shared::Vec3;
use std::str::FromStr;
use thiserror::Error;

/// A line typed by the operator
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Restart,
    /// Random spot near the anchor, or an explicit point
    Spawn(Option<Vec3>),
    Grab,
    /// Turn the avatar by this many degrees
    Turn(f32),
    /// Move the avatar forward (negative for backward) by this distance
    Move(f32),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', type 'help' for a list")]
    Unknown(String),
    #[error("'{0}' expects {1}")]
    WrongArity(&'static str, &'static str),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
}

pub const HELP: &str = "commands: start | restart | spawn [x y z] | grab | turn <deg> | move <dist> | status | help | quit";

fn number(token: &str) -> Result<f32, InputError> {
    token
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| InputError::InvalidNumber(token.to_string()))
}

impl FromStr for Command {
    type Err = InputError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or(InputError::Empty)?.to_ascii_lowercase();
        let args: Vec<&str> = tokens.collect();

        match (name.as_str(), args.as_slice()) {
            ("start", []) => Ok(Command::Start),
            ("restart" | "r", []) => Ok(Command::Restart),
            ("spawn" | "e", []) => Ok(Command::Spawn(None)),
            ("spawn" | "e", [x, y, z]) => Ok(Command::Spawn(Some(Vec3::new(
                number(x)?,
                number(y)?,
                number(z)?,
            )))),
            ("spawn" | "e", _) => Err(InputError::WrongArity("spawn", "no arguments or x y z")),
            ("grab" | "g", []) => Ok(Command::Grab),
            ("turn", [degrees]) => Ok(Command::Turn(number(degrees)?)),
            ("turn", _) => Err(InputError::WrongArity("turn", "an angle in degrees")),
            ("move", [distance]) => Ok(Command::Move(number(distance)?)),
            ("move", _) => Err(InputError::WrongArity("move", "a distance")),
            ("status" | "s", []) => Ok(Command::Status),
            ("help" | "?", []) => Ok(Command::Help),
            ("quit" | "exit" | "q", []) => Ok(Command::Quit),
            (other, _) => Err(InputError::Unknown(other.to_string())),
        }
    }
}

/// Discrete actions derived from a pose sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoseActions {
    /// Grab is held; the grab cooldown throttles repeats
    pub grab: bool,
    /// Highlight was just switched on or off
    pub highlight_toggled: bool,
}

/// Tracks the previous pose for edge detection
#[derive(Debug, Default)]
pub struct InputManager {
    prev_highlight: bool,
    highlight_active: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, pose: &PoseData) -> PoseActions {
        let highlight = pose.highlight_triggered();
        let toggled = highlight && !self.prev_highlight;
        self.prev_highlight = highlight;

        if toggled {
            self.highlight_active = !self.highlight_active;
        }

        PoseActions {
            grab: pose.grab_triggered(),
            highlight_toggled: toggled,
        }
    }

    pub fn highlight_active(&self) -> bool {
        self.highlight_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!("start".parse::<Command>(), Ok(Command::Start));
        assert_eq!("  RESTART ".parse::<Command>(), Ok(Command::Restart));
        assert_eq!("g".parse::<Command>(), Ok(Command::Grab));
        assert_eq!("quit".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_spawn_variants() {
        assert_eq!("spawn".parse::<Command>(), Ok(Command::Spawn(None)));
        assert_eq!(
            "spawn 1 2.5 -3".parse::<Command>(),
            Ok(Command::Spawn(Some(Vec3::new(1.0, 2.5, -3.0))))
        );
        assert!(matches!(
            "spawn 1 2".parse::<Command>(),
            Err(InputError::WrongArity("spawn", _))
        ));
        assert_eq!(
            "spawn 1 x 3".parse::<Command>(),
            Err(InputError::InvalidNumber("x".to_string()))
        );
    }

    #[test]
    fn test_avatar_commands() {
        assert_eq!("turn -90".parse::<Command>(), Ok(Command::Turn(-90.0)));
        assert_eq!("move 4".parse::<Command>(), Ok(Command::Move(4.0)));
        assert_eq!(
            "move inf".parse::<Command>(),
            Err(InputError::InvalidNumber("inf".to_string()))
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!("".parse::<Command>(), Err(InputError::Empty));
        assert_eq!(
            "dance".parse::<Command>(),
            Err(InputError::Unknown("dance".to_string()))
        );
        assert_eq!(
            "start now".parse::<Command>(),
            Err(InputError::Unknown("start".to_string()))
        );
    }

    #[test]
    fn test_highlight_toggles_on_rising_edge() {
        let mut input = InputManager::new();
        let up = PoseData {
            thumbs_up: true,
            ..PoseData::default()
        };
        let down = PoseData::default();

        assert!(input.update(&up).highlight_toggled);
        assert!(!input.update(&up).highlight_toggled);
        assert!(input.highlight_active());

        assert!(!input.update(&down).highlight_toggled);
        assert!(input.update(&up).highlight_toggled);
        assert!(!input.highlight_active());
    }

    #[test]
    fn test_grab_is_level_triggered() {
        let mut input = InputManager::new();
        let grab = PoseData {
            phone_grab: true,
            ..PoseData::default()
        };
        assert!(input.update(&grab).grab);
        assert!(input.update(&grab).grab);
        assert!(!input.update(&PoseData::default()).grab);
    }
}
