//! Relay network layer: UDP I/O tasks plus the main event loop
//!
//! The relay runs a few concurrent tasks that talk over channels:
//! - A receiver task that decodes datagrams and forwards them to the loop
//! - A sender task that writes queued packets to the socket
//! - A timeout checker that drops silent participants
//!
//! The main loop owns all routing decisions, so packets from one participant
//! are relayed to everybody in a single global order.

use crate::client_manager::ClientManager;
use log::{debug, error, info, warn};
use shared::{
    decode, encode, Packet, CLIENT_TIMEOUT_SECS, MAX_PACKET_SIZE, PROTOCOL_VERSION,
    RESEND_INTERVAL_MS,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Events delivered to the main loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Packets queued for the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet },
}

/// Relay tunables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How often resends and roster publication are checked
    pub tick_duration: Duration,
    /// Room capacity
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub resend_interval: Duration,
    /// Roster is re-published at least this often
    pub roster_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(16),
            max_clients: 2,
            client_timeout: Duration::from_secs(CLIENT_TIMEOUT_SECS),
            resend_interval: Duration::from_millis(RESEND_INTERVAL_MS),
            roster_interval: Duration::from_secs(1),
        }
    }
}

/// Stops a running relay from another task
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Relay already stopped");
        }
    }
}

pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let clients = ClientManager::new(
            config.max_clients,
            config.client_timeout,
            config.resend_interval,
        );

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(clients)),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns the task that receives and decodes incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Main loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that writes queued packets to the socket
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to participant {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns the task that drops participants that went silent
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if server_tx
                        .send(ServerMessage::ClientTimeout { client_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn publish_roster(&self) {
        let packet = {
            let clients = self.clients.read().await;
            clients.roster_packet()
        };
        if let Some(packet) = packet {
            self.broadcast_packet(packet);
        }
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                name,
            } => {
                info!(
                    "Participant connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Refusing {}: protocol {} != {}",
                        addr, client_version, PROTOCOL_VERSION
                    );
                    let reason = format!(
                        "Protocol version mismatch (relay speaks {})",
                        PROTOCOL_VERSION
                    );
                    self.send_packet(Packet::Disconnected { reason }, addr);
                    return;
                }

                let (joined, repeated) = {
                    let mut clients = self.clients.write().await;
                    // The Connected reply may have been lost; keep the session
                    match clients.rejoin(addr) {
                        Some(existing) => (Some(existing), true),
                        None => (clients.add_client(addr, &name), false),
                    }
                };
                if repeated {
                    debug!("Repeated connect from {}, resending its identity", addr);
                }

                match joined {
                    Some((participant_id, role)) => {
                        self.send_packet(
                            Packet::Connected {
                                participant_id,
                                role,
                            },
                            addr,
                        );
                    }
                    None => {
                        self.send_packet(
                            Packet::Disconnected {
                                reason: "Room full".to_string(),
                            },
                            addr,
                        );
                    }
                }
                self.publish_roster().await;
            }

            Packet::Send {
                seq,
                route,
                directive,
            } => {
                let packets = {
                    let mut clients = self.clients.write().await;
                    match clients.touch(addr) {
                        Some(client_id) => {
                            self.send_packet(Packet::Ack { seq }, addr);
                            clients.accept_send(client_id, seq, route, directive, Instant::now())
                        }
                        None => {
                            debug!("Send from unknown address {}", addr);
                            Vec::new()
                        }
                    }
                };

                for (to, packet) in packets {
                    self.send_packet(packet, to);
                }
            }

            Packet::Ack { seq } => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.touch(addr) {
                    clients.ack_delivery(client_id, seq);
                }
            }

            Packet::Heartbeat { timestamp } => {
                let known = {
                    let mut clients = self.clients.write().await;
                    clients.touch(addr).is_some()
                };
                if known {
                    self.send_packet(Packet::Heartbeat { timestamp }, addr);
                }
            }

            Packet::Disconnect => {
                let removed = {
                    let mut clients = self.clients.write().await;
                    match clients.find_client_by_addr(addr) {
                        Some(client_id) => clients.remove_client(&client_id).is_some(),
                        None => false,
                    }
                };
                if removed {
                    self.publish_roster().await;
                }
            }

            _ => {
                warn!("Unexpected packet type from {}", addr);
            }
        }
    }

    async fn resend_unacked(&self) {
        let packets = {
            let mut clients = self.clients.write().await;
            clients.due_resends(Instant::now())
        };
        if !packets.is_empty() {
            debug!("Resending {} unacknowledged deliveries", packets.len());
        }
        for (addr, packet) in packets {
            self.send_packet(packet, addr);
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.config.tick_duration);
        let mut last_roster = Instant::now();

        info!("Relay started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Participant {} dropped, publishing new roster", client_id);
                            self.publish_roster().await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Relay shutting down");
                            self.broadcast_packet(Packet::Disconnected {
                                reason: "Relay shutting down".to_string(),
                            });
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.resend_unacked().await;

                    if last_roster.elapsed() >= self.config.roster_interval {
                        last_roster = Instant::now();
                        self.publish_roster().await;
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Directive, Role, Route};

    async fn start_relay() -> (SocketAddr, ServerHandle) {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        tokio::spawn(async move {
            server.run().await.unwrap();
        });
        (addr, handle)
    }

    async fn send(socket: &UdpSocket, packet: Packet, to: SocketAddr) {
        socket.send_to(&encode(&packet).unwrap(), to).await.unwrap();
    }

    /// Receives until `pick` accepts a packet, skipping everything else
    async fn recv_until<T>(socket: &UdpSocket, mut pick: impl FnMut(Packet) -> Option<T>) -> T {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let (len, _) = socket.recv_from(&mut buffer).await.unwrap();
                if let Some(found) = pick(decode(&buffer[..len]).unwrap()) {
                    return found;
                }
            }
        })
        .await
        .expect("timed out waiting for packet")
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_clients, 2);
        assert_eq!(config.client_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();

        tx.send(ServerMessage::PacketReceived {
            packet: Packet::Disconnect,
            addr,
        })
        .unwrap();

        match rx.try_recv().unwrap() {
            ServerMessage::PacketReceived { packet, addr: a } => {
                assert_eq!(a, addr);
                assert_eq!(packet, Packet::Disconnect);
            }
            other => panic!("Unexpected message type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_assigns_role() {
        let (relay, handle) = start_relay().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(
            &socket,
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: "diver".to_string(),
            },
            relay,
        )
        .await;

        let (id, role) = recv_until(&socket, |p| match p {
            Packet::Connected {
                participant_id,
                role,
            } => Some((participant_id, role)),
            _ => None,
        })
        .await;
        assert_eq!(id, 1);
        assert_eq!(role, Role::Cleaner);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_version_mismatch_is_refused() {
        let (relay, handle) = start_relay().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(
            &socket,
            Packet::Connect {
                client_version: PROTOCOL_VERSION + 1,
                name: "old".to_string(),
            },
            relay,
        )
        .await;

        let reason = recv_until(&socket, |p| match p {
            Packet::Disconnected { reason } => Some(reason),
            _ => None,
        })
        .await;
        assert!(reason.contains("version"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_broadcast_is_echoed_and_acked() {
        let (relay, handle) = start_relay().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(
            &socket,
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: "solo".to_string(),
            },
            relay,
        )
        .await;
        recv_until(&socket, |p| matches!(p, Packet::Connected { .. }).then_some(())).await;

        send(
            &socket,
            Packet::Send {
                seq: 1,
                route: Route::Broadcast,
                directive: Directive::StartRequested,
            },
            relay,
        )
        .await;

        let acked = recv_until(&socket, |p| match p {
            Packet::Ack { seq } => Some(seq),
            _ => None,
        })
        .await;
        assert_eq!(acked, 1);

        let (seq, from, directive) = recv_until(&socket, |p| match p {
            Packet::Deliver {
                seq,
                from,
                directive,
            } => Some((seq, from, directive)),
            _ => None,
        })
        .await;
        assert_eq!(seq, 1);
        assert_eq!(from, 1);
        assert_eq!(directive, Directive::StartRequested);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_repeated_connect_keeps_identity() {
        let (relay, handle) = start_relay().await;
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let connect = |name: &str| Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: name.to_string(),
        };
        let connected = |p: Packet| match p {
            Packet::Connected {
                participant_id,
                role,
            } => Some((participant_id, role)),
            _ => None,
        };

        send(&first, connect("diver"), relay).await;
        assert_eq!(recv_until(&first, connected).await, (1, Role::Cleaner));
        send(&second, connect("tanker"), relay).await;
        assert_eq!(recv_until(&second, connected).await, (2, Role::Polluter));

        send(&first, connect("diver"), relay).await;
        assert_eq!(recv_until(&first, connected).await, (1, Role::Cleaner));

        send(
            &first,
            Packet::Send {
                seq: 1,
                route: Route::Broadcast,
                directive: Directive::StartRequested,
            },
            relay,
        )
        .await;
        let from = recv_until(&second, |p| match p {
            Packet::Deliver { from, .. } => Some(from),
            _ => None,
        })
        .await;
        assert_eq!(from, 1);

        handle.shutdown();
    }
}
