use crate::game::{ClientGame, CommandOutcome};
use crate::hud::{self, PingStats, TimerDisplay};
use crate::input::Command;
use crate::sensor::PoseData;
use log::{debug, error, info, warn};
use shared::{
    decode, encode, Delivery, Directive, MatchConfig, Packet, Participant, ReliableReceiver,
    ReliableSender, Role, Route, SessionView, MAX_PACKET_SIZE, PROTOCOL_VERSION,
    RESEND_INTERVAL_MS,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep};

/// Remaining seconds below which every timer change is shown at info level
const FINAL_SECONDS: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub server: String,
    pub name: String,
    /// Simulated one-way latency is half of this
    pub fake_ping_ms: u64,
    pub tick_duration: Duration,
    pub resend_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", shared::DEFAULT_SERVER_PORT),
            name: String::new(),
            fake_ping_ms: 0,
            tick_duration: Duration::from_millis(16),
            resend_interval: Duration::from_millis(RESEND_INTERVAL_MS),
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

/// Connection to the session relay
struct RelayLink {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connected: bool,
    outbound: ReliableSender<(Route, Directive)>,
    inbound: ReliableReceiver<Delivery>,
}

pub struct Client {
    /// `None` when playing offline
    link: Option<RelayLink>,
    name: String,
    game: ClientGame,
    pose: watch::Receiver<PoseData>,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    running: bool,

    ping: PingStats,
    timer: TimerDisplay,
    fake_ping_ms: u64,
    tick_duration: Duration,
    resend_interval: Duration,
    heartbeat_interval: Duration,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

impl Client {
    pub async fn connect(
        settings: ClientSettings,
        config: MatchConfig,
        pose: watch::Receiver<PoseData>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = settings.server.parse()?;

        let link = RelayLink {
            socket,
            server_addr,
            connected: false,
            outbound: ReliableSender::new(settings.resend_interval),
            inbound: ReliableReceiver::new(),
        };

        Ok(Self {
            link: Some(link),
            game: ClientGame::connecting(config, &settings.name),
            name: settings.name,
            pose,
            commands,
            commands_open: true,
            running: true,
            ping: PingStats::default(),
            timer: TimerDisplay::new(),
            fake_ping_ms: settings.fake_ping_ms,
            tick_duration: settings.tick_duration,
            resend_interval: settings.resend_interval,
            heartbeat_interval: settings.heartbeat_interval,
        })
    }

    /// Practice match without a relay. The local participant coordinates
    /// itself against an idle partner holding the other role.
    pub fn offline(
        settings: ClientSettings,
        config: MatchConfig,
        role: Role,
        pose: watch::Receiver<PoseData>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let local = Participant::new(1, settings.name.clone(), role);
        let partner_role = match role {
            Role::Cleaner => Role::Polluter,
            Role::Polluter => Role::Cleaner,
        };
        let partner = Participant::new(2, "practice partner", partner_role);

        let mut game = ClientGame::new(config, SessionView::offline(local.clone()));
        game.manager.subscribe(hud::listener(role));
        game.manager.apply_roster(vec![local, partner], 1);

        Self {
            link: None,
            game,
            name: settings.name,
            pose,
            commands,
            commands_open: true,
            running: true,
            ping: PingStats::default(),
            timer: TimerDisplay::new(),
            fake_ping_ms: 0,
            tick_duration: settings.tick_duration,
            resend_interval: settings.resend_interval,
            heartbeat_interval: settings.heartbeat_interval,
        }
    }

    pub fn game(&self) -> &ClientGame {
        &self.game
    }

    pub fn is_connected(&self) -> bool {
        self.link.as_ref().map_or(true, |link| link.connected)
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let Some(link) = &self.link else {
            return Ok(());
        };

        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = encode(packet)?;
        link.socket.send_to(&data, link.server_addr).await?;
        Ok(())
    }

    async fn send_connect(&self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to relay as '{}'...", self.name);
        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: self.name.clone(),
        })
        .await
    }

    async fn handle_packet(&mut self, packet: Packet, receive_time: Instant) {
        match packet {
            Packet::Connected {
                participant_id,
                role,
            } => {
                let Some(link) = self.link.as_mut() else {
                    return;
                };
                if link.connected {
                    debug!("Duplicate Connected ignored");
                    return;
                }
                link.connected = true;
                self.game
                    .admit(Participant::new(participant_id, self.name.clone(), role));
                self.game.manager.subscribe(hud::listener(role));
                info!("You are the {}", role);
            }

            Packet::Roster {
                members,
                coordinator,
            } => {
                if !self.is_connected() {
                    return;
                }
                let change = self.game.manager.apply_roster(members, coordinator);
                if !change.is_empty() {
                    info!(
                        "Players: {}/{}",
                        change.size,
                        self.game.manager.config().required_players
                    );
                }
            }

            Packet::Deliver {
                seq,
                from,
                directive,
            } => {
                if let Err(e) = self.send_packet(&Packet::Ack { seq }).await {
                    error!("Error sending ack: {}", e);
                }
                let Some(link) = self.link.as_mut() else {
                    return;
                };
                for delivery in link.inbound.receive(seq, Delivery { from, directive }) {
                    self.game
                        .manager
                        .handle_directive(delivery.from, delivery.directive);
                }
            }

            Packet::Ack { seq } => {
                if let Some(link) = self.link.as_mut() {
                    link.outbound.ack(seq);
                }
            }

            Packet::Heartbeat { timestamp } => {
                let rtt = now_millis().saturating_sub(timestamp);
                self.ping.record(rtt as f32, receive_time);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                if let Some(link) = self.link.as_mut() {
                    link.connected = false;
                }
                self.running = false;
            }

            other => {
                warn!("Unexpected packet type: {:?}", other);
            }
        }
    }

    /// Sends queued directives to the relay, or loops them back offline
    async fn flush_outgoing(&mut self) {
        if !self.is_connected() {
            return;
        }

        if self.link.is_none() {
            let local_id = self.game.local_id();
            loop {
                let outgoing = self.game.manager.session_mut().drain_outgoing();
                if outgoing.is_empty() {
                    break;
                }
                for item in outgoing {
                    self.game.manager.handle_directive(local_id, item.directive);
                }
            }
            return;
        }

        let outgoing = self.game.manager.session_mut().drain_outgoing();
        let now = Instant::now();
        for item in outgoing {
            let seq = match self.link.as_mut() {
                Some(link) => link
                    .outbound
                    .push((item.route, item.directive.clone()), now),
                None => return,
            };
            let packet = Packet::Send {
                seq,
                route: item.route,
                directive: item.directive,
            };
            if let Err(e) = self.send_packet(&packet).await {
                error!("Error sending directive: {}", e);
            }
        }
    }

    async fn resend_unacked(&mut self) {
        let due = match self.link.as_mut() {
            Some(link) if link.connected => link.outbound.due_for_resend(Instant::now()),
            _ => return,
        };
        for (seq, (route, directive)) in due {
            debug!("Resending directive {}", seq);
            let packet = Packet::Send {
                seq,
                route,
                directive,
            };
            if let Err(e) = self.send_packet(&packet).await {
                error!("Error resending directive: {}", e);
            }
        }
    }

    async fn heartbeat(&mut self) {
        let result = match &self.link {
            None => return,
            Some(link) if !link.connected => self.send_connect().await,
            Some(_) => {
                self.send_packet(&Packet::Heartbeat {
                    timestamp: now_millis(),
                })
                .await
            }
        };
        if let Err(e) = result {
            error!("Error sending heartbeat: {}", e);
        }
    }

    async fn tick(&mut self, dt: f32) {
        let pose = *self.pose.borrow();
        self.game.update(&pose, dt);
        self.flush_outgoing().await;

        let remaining = self.game.manager.time_remaining();
        if let Some(text) = self.timer.update(self.game.manager.current_state(), remaining) {
            if remaining <= FINAL_SECONDS {
                info!("Time {}", text);
            } else {
                debug!("Time {}", text);
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        if command == Command::Status {
            let link = match self.link.as_ref() {
                Some(link) => {
                    hud::link_summary(link.outbound.in_flight(), link.outbound.max_attempts())
                }
                None => "offline".to_string(),
            };
            info!("{} | {} | {}", self.game.status_line(), self.ping.summary(), link);
            return;
        }
        if self.game.execute(command) == CommandOutcome::Quit {
            self.running = false;
        }
        self.flush_outgoing().await;
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.link.is_some() {
            self.send_connect().await?;
        } else {
            info!("Playing offline as the {}", self.game.role());
        }

        let mut tick_interval = interval(self.tick_duration);
        let mut resend_interval = interval(self.resend_interval);
        let mut heartbeat_interval = interval(self.heartbeat_interval);
        heartbeat_interval.tick().await;

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let mut last_tick = Instant::now();

        while self.running {
            tokio::select! {
                result = recv_from(self.link.as_ref(), &mut buffer) => {
                    let receive_time = Instant::now();
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match decode(&buffer[..len]) {
                                Ok(packet) => self.handle_packet(packet, receive_time).await,
                                Err(e) => debug!("Dropping undecodable packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;
                    self.tick(dt).await;
                },

                _ = resend_interval.tick() => {
                    self.resend_unacked().await;
                },

                _ = heartbeat_interval.tick() => {
                    self.heartbeat().await;
                },

                command = self.commands.recv(), if self.commands_open => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!("Command input closed");
                            self.commands_open = false;
                        }
                    }
                },
            }
        }

        if self.link.as_ref().map_or(false, |link| link.connected) {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

async fn recv_from(
    link: Option<&RelayLink>,
    buffer: &mut [u8],
) -> std::io::Result<(usize, SocketAddr)> {
    match link {
        Some(link) => link.socket.recv_from(buffer).await,
        None => std::future::pending().await,
    }
}

/// Reads operator commands from stdin on a background task
pub fn spawn_command_reader() -> mpsc::UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(command) => {
                            if tx.send(command).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("{}", e),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Error reading command: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MatchState;

    fn offline_client(role: Role) -> (Client, mpsc::UnboundedSender<Command>) {
        let (_pose_tx, pose_rx) = watch::channel(PoseData::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = ClientSettings {
            name: "solo".to_string(),
            ..ClientSettings::default()
        };
        let config = MatchConfig {
            countdown_seconds: 1,
            match_duration: 2.0,
            ..MatchConfig::default()
        };
        (Client::offline(settings, config, role, pose_rx, rx), tx)
    }

    #[test]
    fn test_default_settings() {
        let settings = ClientSettings::default();
        assert_eq!(settings.server, "127.0.0.1:8080");
        assert_eq!(settings.resend_interval, Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_offline_practice_is_ready() {
        let (client, _tx) = offline_client(Role::Polluter);
        assert!(client.is_connected());
        assert_eq!(client.game().manager.current_state(), MatchState::ReadyToStart);
    }

    #[tokio::test]
    async fn test_offline_match_runs_to_finish() {
        let (mut client, _tx) = offline_client(Role::Polluter);

        client.handle_command(Command::Start).await;
        assert_eq!(client.game().manager.current_state(), MatchState::Countdown);

        for _ in 0..40 {
            if client.game().manager.current_state() == MatchState::Playing {
                break;
            }
            client.tick(0.1).await;
        }
        assert_eq!(client.game().manager.current_state(), MatchState::Playing);

        client.handle_command(Command::Spawn(None)).await;
        assert_eq!(client.game().manager.live_scores().polluter_score, 1);

        for _ in 0..20 {
            client.tick(0.25).await;
        }
        assert_eq!(client.game().manager.current_state(), MatchState::Finished);
        let snapshot = client.game().manager.score_snapshot().unwrap();
        assert_eq!(snapshot.polluter_score, 1);
        assert_eq!(snapshot.cleaner_score, 0);
    }

    #[tokio::test]
    async fn test_quit_stops_run_loop() {
        let (mut client, tx) = offline_client(Role::Cleaner);
        tx.send(Command::Quit).unwrap();
        tokio::time::timeout(Duration::from_secs(2), client.run())
            .await
            .expect("run loop did not stop")
            .unwrap();
    }
}
