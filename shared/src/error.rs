use crate::types::{MatchState, Role};
use thiserror::Error;

/// Rejected configuration values
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("match duration must be positive, got {0}")]
    InvalidMatchDuration(f32),
    #[error("at least 2 players are required to start a match, got {0}")]
    InvalidRequiredPlayers(usize),
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f32 },
    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f32 },
    #[error("spawn height range is inverted: min {min} > max {max}")]
    InvertedHeightRange { min: f32, max: f32 },
    #[error("a placement ring needs at least one point")]
    EmptyRing,
    #[error("failed to read config file: {0}")]
    Io(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

/// A local player action that the match core refused
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("match is not active (state {0})")]
    MatchNotActive(MatchState),
    #[error("controls are disabled")]
    InputDisabled,
    #[error("only the {expected} can do that")]
    WrongRole { expected: Role },
    #[error("cooling down, {remaining:.1}s left")]
    CoolingDown { remaining: f32 },
    #[error("no trash within {distance} units")]
    NothingInReach { distance: f32 },
}

/// Wire encoding failures
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode packet: {0}")]
    Encode(bincode::Error),
    #[error("failed to decode packet: {0}")]
    Decode(bincode::Error),
    #[error("packet of {0} bytes exceeds the datagram limit")]
    TooLarge(usize),
}
