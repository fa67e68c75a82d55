//! Room membership and per-participant reliable links for the session relay
//!
//! This module owns everything the relay knows about connected participants:
//! - Join order, which decides the coordinator (earliest joined wins)
//! - Role assignment at join time
//! - One reliable ordered link per participant in each direction
//! - Liveness tracking and timeout cleanup
//!
//! It never interprets directives. Routing only looks at the `Route` a
//! participant attached to each one.

use log::{debug, info, warn};
use shared::{
    Delivery, Directive, Packet, Participant, ParticipantId, ReliableReceiver, ReliableSender,
    Role, Route,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected participant and its link state
#[derive(Debug)]
pub struct Client {
    /// Unique participant identifier, also the join order
    pub id: ParticipantId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    pub name: String,
    pub role: Role,
    /// Last time we received any packet from this participant
    pub last_seen: Instant,
    /// Directives relayed to this participant, awaiting ack
    outbound: ReliableSender<Delivery>,
    /// Directives sent by this participant, released in order
    inbound: ReliableReceiver<(Route, Directive)>,
}

impl Client {
    pub fn new(
        id: ParticipantId,
        addr: SocketAddr,
        name: String,
        role: Role,
        resend_after: Duration,
    ) -> Self {
        Self {
            id,
            addr,
            name,
            role,
            last_seen: Instant::now(),
            outbound: ReliableSender::new(resend_after),
            inbound: ReliableReceiver::new(),
        }
    }

    /// Checks if the participant has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    pub fn participant(&self) -> Participant {
        Participant::new(self.id, self.name.clone(), self.role)
    }

    /// Deliveries sent but not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.outbound.in_flight()
    }
}

/// Tracks the room and turns participant directives into addressed packets
pub struct ClientManager {
    clients: HashMap<ParticipantId, Client>,
    next_client_id: ParticipantId,
    max_clients: usize,
    timeout: Duration,
    resend_after: Duration,
}

impl ClientManager {
    /// Creates an empty room. Participant IDs start from 1 and only grow,
    /// so a lower ID always means an earlier join.
    pub fn new(max_clients: usize, timeout: Duration, resend_after: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
            resend_after,
        }
    }

    /// Admits a participant and assigns its role.
    ///
    /// Returns None when the room is full.
    pub fn add_client(&mut self, addr: SocketAddr, name: &str) -> Option<(ParticipantId, Role)> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let role = self.free_role();
        let name = if name.trim().is_empty() {
            format!("Player{}", client_id)
        } else {
            name.trim().to_string()
        };

        info!(
            "Participant {} ({}) joined from {} as {}",
            client_id, name, addr, role
        );
        self.clients.insert(
            client_id,
            Client::new(client_id, addr, name, role, self.resend_after),
        );

        Some((client_id, role))
    }

    /// Identity already admitted from `addr`, refreshing its liveness
    pub fn rejoin(&mut self, addr: SocketAddr) -> Option<(ParticipantId, Role)> {
        let client = self.clients.values_mut().find(|c| c.addr == addr)?;
        client.last_seen = Instant::now();
        Some((client.id, client.role))
    }

    /// First role nobody holds, or the least held one in a larger room
    fn free_role(&self) -> Role {
        let held = |role: Role| self.clients.values().filter(|c| c.role == role).count();
        let cleaners = held(Role::Cleaner);
        let polluters = held(Role::Polluter);
        if cleaners <= polluters {
            Role::Cleaner
        } else {
            Role::Polluter
        }
    }

    pub fn remove_client(&mut self, client_id: &ParticipantId) -> Option<Client> {
        let removed = self.clients.remove(client_id);
        if let Some(client) = &removed {
            info!("Participant {} ({}) left", client.id, client.name);
        }
        removed
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ParticipantId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Refreshes liveness for the participant at `addr`
    pub fn touch(&mut self, addr: SocketAddr) -> Option<ParticipantId> {
        let client = self.clients.values_mut().find(|c| c.addr == addr)?;
        client.last_seen = Instant::now();
        Some(client.id)
    }

    /// The earliest-joined participant still connected
    pub fn coordinator(&self) -> Option<ParticipantId> {
        self.clients.keys().min().copied()
    }

    /// Current members in join order
    pub fn roster(&self) -> Vec<Participant> {
        let mut members: Vec<Participant> =
            self.clients.values().map(Client::participant).collect();
        members.sort_by_key(|p| p.id);
        members
    }

    /// Roster packet for everyone, if anyone is connected
    pub fn roster_packet(&self) -> Option<Packet> {
        let coordinator = self.coordinator()?;
        Some(Packet::Roster {
            members: self.roster(),
            coordinator,
        })
    }

    /// Accepts a `Send` from `from` and returns every packet the relay must
    /// transmit as a result: releases are routed in order, duplicates and
    /// early arrivals produce nothing yet.
    pub fn accept_send(
        &mut self,
        from: ParticipantId,
        seq: u32,
        route: Route,
        directive: Directive,
        now: Instant,
    ) -> Vec<(SocketAddr, Packet)> {
        let released = match self.clients.get_mut(&from) {
            Some(client) => client.inbound.receive(seq, (route, directive)),
            None => {
                warn!("Send from unknown participant {}", from);
                return Vec::new();
            }
        };

        let mut packets = Vec::new();
        for (route, directive) in released {
            packets.extend(self.route(from, route, directive, now));
        }
        packets
    }

    /// Sequences `directive` onto the outbound link of every recipient
    pub fn route(
        &mut self,
        from: ParticipantId,
        route: Route,
        directive: Directive,
        now: Instant,
    ) -> Vec<(SocketAddr, Packet)> {
        let recipients: Vec<ParticipantId> = match route {
            Route::Broadcast => {
                let mut ids: Vec<ParticipantId> = self.clients.keys().copied().collect();
                ids.sort_unstable();
                ids
            }
            Route::Coordinator => self.coordinator().into_iter().collect(),
        };

        debug!(
            "Relaying {:?} from {} to {:?}",
            directive, from, recipients
        );

        let mut packets = Vec::with_capacity(recipients.len());
        for id in recipients {
            if let Some(client) = self.clients.get_mut(&id) {
                let delivery = Delivery {
                    from,
                    directive: directive.clone(),
                };
                let seq = client.outbound.push(delivery, now);
                packets.push((
                    client.addr,
                    Packet::Deliver {
                        seq,
                        from,
                        directive: directive.clone(),
                    },
                ));
            }
        }
        packets
    }

    /// Returns true if the delivery was outstanding
    pub fn ack_delivery(&mut self, client_id: ParticipantId, seq: u32) -> bool {
        self.clients
            .get_mut(&client_id)
            .map(|client| client.outbound.ack(seq))
            .unwrap_or(false)
    }

    /// Deliveries that went unacknowledged for too long
    pub fn due_resends(&mut self, now: Instant) -> Vec<(SocketAddr, Packet)> {
        let mut packets = Vec::new();
        for client in self.clients.values_mut() {
            for (seq, delivery) in client.outbound.due_for_resend(now) {
                packets.push((
                    client.addr,
                    Packet::Deliver {
                        seq,
                        from: delivery.from,
                        directive: delivery.directive,
                    },
                ));
            }
        }
        packets
    }

    /// Removes participants that went silent and returns their IDs
    pub fn check_timeouts(&mut self) -> Vec<ParticipantId> {
        let timeout = self.timeout;
        let timed_out: Vec<ParticipantId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            warn!("Participant {} timed out", client_id);
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(ParticipantId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn get(&self, client_id: &ParticipantId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
