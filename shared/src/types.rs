//! Data model shared by every participant replica

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Opaque participant identifier assigned by the session relay
pub type ParticipantId = u32;

/// The asymmetric role a participant plays, fixed at join time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Collects trash from a first-person view
    Cleaner,
    /// Spawns trash from a top-down view
    Polluter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Cleaner => write!(f, "Cleaner"),
            Role::Polluter => write!(f, "Polluter"),
        }
    }
}

/// A connected participant as published in the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: Role,
}

impl Participant {
    pub fn new(id: ParticipantId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            role,
        }
    }
}

/// Shared match phase. Advances Waiting -> Ready -> Countdown -> Playing ->
/// Finished and back to Waiting on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchState {
    WaitingForPlayers,
    ReadyToStart,
    Countdown,
    Playing,
    Finished,
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchState::WaitingForPlayers => "WaitingForPlayers",
            MatchState::ReadyToStart => "ReadyToStart",
            MatchState::Countdown => "Countdown",
            MatchState::Playing => "Playing",
            MatchState::Finished => "Finished",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a finished match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Cleaner,
    Polluter,
    Tie,
}

/// Final score pair, computed once by the coordinator and treated as ground
/// truth by every participant after broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    /// Items collected during the match window
    pub cleaner_score: i32,
    /// Polluter-spawned items still alive when time ran out
    pub polluter_score: i32,
}

impl ScoreSnapshot {
    pub fn new(cleaner_score: i32, polluter_score: i32) -> Self {
        Self {
            cleaner_score,
            polluter_score,
        }
    }

    pub fn winner(&self) -> Winner {
        if self.cleaner_score > self.polluter_score {
            Winner::Cleaner
        } else if self.polluter_score > self.cleaner_score {
            Winner::Polluter
        } else {
            Winner::Tie
        }
    }
}

/// Point in the shared 3D play space. Y is up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        (*self - *other).length()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Network-wide handle of a trash item: the instantiating participant plus a
/// per-participant sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrashId {
    pub owner: ParticipantId,
    pub seq: u32,
}

impl fmt::Display for TrashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.seq)
    }
}

/// Visual variant of a trash item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrashKind {
    Barrel,
    Crate,
    TreasureChest,
}

impl TrashKind {
    pub const ALL: [TrashKind; 3] = [TrashKind::Barrel, TrashKind::Crate, TrashKind::TreasureChest];
}

/// A replicated trash item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrashItem {
    pub id: TrashId,
    pub kind: TrashKind,
    /// Role the item counts for when scoring
    pub owner_role: Role,
    pub position: Vec3,
    /// Yaw in degrees
    pub rotation: f32,
    /// Ledger increment when collected
    pub points: i32,
}

/// Formats seconds as MM:SS, clamping negatives to zero
pub fn format_time(seconds: f32) -> String {
    let total = seconds.max(0.0).floor() as u32;
    format!("{:02}:{:02}", total / 60, total % 60)
}
