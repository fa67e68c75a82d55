//! Wire protocol between participants and the session relay

use crate::error::ProtocolError;
use crate::types::{Participant, ParticipantId, Role, ScoreSnapshot, TrashId, TrashItem};
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Bumped whenever `Packet` or `Directive` change shape
pub const PROTOCOL_VERSION: u32 = 1;

/// Receive buffer size on both ends
pub const MAX_PACKET_SIZE: usize = 2048;

/// Application-level message carried over the reliable ordered channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    /// Someone asked to begin the countdown
    StartRequested,
    /// Coordinator countdown number, 0 means "go"
    CountdownTick { remaining: u32 },
    /// Coordinator says the match window opens now
    StartMatch,
    /// Final score computed by the coordinator
    MatchResult { snapshot: ScoreSnapshot },
    /// Directed to the coordinator only
    RequestRestart,
    /// Coordinator tells everyone to reset
    ExecuteRestart,
    TrashSpawned { item: TrashItem },
    TrashCollected { id: TrashId },
    TrashDestroyed { id: TrashId },
}

/// Who a participant-originated directive goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    /// Every participant, sender included
    Broadcast,
    /// Current coordinator only
    Coordinator,
}

/// A directive queued by a participant for the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outgoing {
    pub route: Route,
    pub directive: Directive,
}

/// A directive relayed to one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub from: ParticipantId,
    pub directive: Directive,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Participant -> relay
    Connect {
        client_version: u32,
        name: String,
    },
    Send {
        seq: u32,
        route: Route,
        directive: Directive,
    },
    Heartbeat {
        timestamp: u64,
    },
    Disconnect,

    // Relay -> participant
    Connected {
        participant_id: ParticipantId,
        role: Role,
    },
    Roster {
        members: Vec<Participant>,
        coordinator: ParticipantId,
    },
    Deliver {
        seq: u32,
        from: ParticipantId,
        directive: Directive,
    },
    Disconnected {
        reason: String,
    },

    // Both directions
    Ack {
        seq: u32,
    },
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let data = serialize(packet).map_err(ProtocolError::Encode)?;
    if data.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }
    Ok(data)
}

pub fn decode(data: &[u8]) -> Result<Packet, ProtocolError> {
    deserialize(data).map_err(ProtocolError::Decode)
}
