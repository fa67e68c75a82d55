//! Boundary between the match core and the session transport
//!
//! The core only needs to know who it is, how many participants are present,
//! whether it is the coordinator, and how to emit directives. `SessionView` is
//! the sans-IO implementation: it mirrors the relay's roster and queues
//! outgoing directives for the owning loop to flush onto the wire.

use crate::protocol::{Directive, Outgoing, Route};
use crate::types::{Participant, ParticipantId, Role};
use std::collections::VecDeque;

pub trait Session {
    fn local_id(&self) -> ParticipantId;
    fn local_role(&self) -> Role;
    fn roster_size(&self) -> usize;
    fn is_coordinator(&self) -> bool;
    /// Reliable ordered delivery to every participant, the sender included
    fn broadcast(&mut self, directive: Directive);
    /// Reliable ordered delivery to the current coordinator only
    fn send_to_coordinator(&mut self, directive: Directive);
}

/// Result of applying a roster update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterChange {
    pub previous_size: usize,
    pub size: usize,
    pub joined: Vec<Participant>,
    pub left: Vec<Participant>,
    /// This participant was not coordinator before and is now
    pub became_coordinator: bool,
}

impl RosterChange {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty() && !self.became_coordinator
    }
}

#[derive(Debug, Clone)]
pub struct SessionView {
    local: Participant,
    roster: Vec<Participant>,
    coordinator: Option<ParticipantId>,
    outbox: VecDeque<Outgoing>,
}

impl SessionView {
    /// View of a freshly joined participant, before the first roster arrives
    pub fn new(local: Participant) -> Self {
        Self {
            roster: vec![local.clone()],
            local,
            coordinator: None,
            outbox: VecDeque::new(),
        }
    }

    /// View of a participant playing without a relay; it coordinates itself
    pub fn offline(local: Participant) -> Self {
        let mut view = Self::new(local);
        view.coordinator = Some(view.local.id);
        view
    }

    pub fn local(&self) -> &Participant {
        &self.local
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn coordinator(&self) -> Option<ParticipantId> {
        self.coordinator
    }

    /// Replaces the roster with the relay's authoritative one.
    /// Applying the same roster twice yields an empty change.
    pub fn apply_roster(
        &mut self,
        members: Vec<Participant>,
        coordinator: ParticipantId,
    ) -> RosterChange {
        let was_coordinator = self.is_coordinator();
        let previous_size = self.roster.len();

        let joined = members
            .iter()
            .filter(|m| !self.roster.iter().any(|r| r.id == m.id))
            .cloned()
            .collect();
        let left = self
            .roster
            .iter()
            .filter(|r| !members.iter().any(|m| m.id == r.id))
            .cloned()
            .collect();

        self.roster = members;
        self.coordinator = Some(coordinator);

        RosterChange {
            previous_size,
            size: self.roster.len(),
            joined,
            left,
            became_coordinator: !was_coordinator && self.is_coordinator(),
        }
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        self.outbox.drain(..).collect()
    }
}

impl Session for SessionView {
    fn local_id(&self) -> ParticipantId {
        self.local.id
    }

    fn local_role(&self) -> Role {
        self.local.role
    }

    fn roster_size(&self) -> usize {
        self.roster.len()
    }

    fn is_coordinator(&self) -> bool {
        self.coordinator == Some(self.local.id)
    }

    fn broadcast(&mut self, directive: Directive) {
        self.outbox.push_back(Outgoing {
            route: Route::Broadcast,
            directive,
        });
    }

    fn send_to_coordinator(&mut self, directive: Directive) {
        self.outbox.push_back(Outgoing {
            route: Route::Coordinator,
            directive,
        });
    }
}
