//! Integration tests across the match core, the participant and the relay
//!
//! In-memory scenarios drive several participant replicas through a relay
//! stand-in; the network tests run the real UDP relay on localhost.

use client::game::ClientGame;
use client::input::Command;
use client::network::{Client, ClientSettings};
use client::sensor::PoseData;
use server::{Server, ServerConfig, ServerHandle};
use shared::{
    decode, encode, MatchConfig, MatchState, Packet, Participant, Role, Route, Session,
    SessionView, Winner, MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

const DT: f32 = 1.0 / 60.0;

// HELPER FUNCTIONS

fn cleaner() -> Participant {
    Participant::new(1, "diver", Role::Cleaner)
}

fn polluter() -> Participant {
    Participant::new(2, "tanker", Role::Polluter)
}

fn short_match() -> MatchConfig {
    MatchConfig {
        match_duration: 30.0,
        ..MatchConfig::default()
    }
}

/// Cleaner and polluter replicas with the full roster, cleaner coordinating
fn room(config: MatchConfig) -> Vec<ClientGame> {
    let mut games = vec![
        ClientGame::new(config.clone(), SessionView::new(cleaner())),
        ClientGame::new(config, SessionView::new(polluter())),
    ];
    for game in games.iter_mut() {
        game.manager.apply_roster(vec![cleaner(), polluter()], 1);
    }
    games
}

/// Routes queued directives between replicas the way the relay does
fn pump(games: &mut [ClientGame]) {
    loop {
        let mut deliveries = Vec::new();
        for game in games.iter_mut() {
            let from = game.local_id();
            for outgoing in game.manager.session_mut().drain_outgoing() {
                deliveries.push((from, outgoing));
            }
        }
        if deliveries.is_empty() {
            return;
        }

        for (from, outgoing) in deliveries {
            for game in games.iter_mut() {
                let deliver = match outgoing.route {
                    Route::Broadcast => true,
                    Route::Coordinator => game.manager.session().is_coordinator(),
                };
                if deliver {
                    game.manager.handle_directive(from, outgoing.directive.clone());
                }
            }
        }
    }
}

fn run_for(games: &mut [ClientGame], seconds: f32) {
    let steps = (seconds / DT).round() as usize;
    let pose = PoseData::default();
    for _ in 0..steps {
        for game in games.iter_mut() {
            game.update(&pose, DT);
        }
        pump(games);
    }
}

fn start(games: &mut [ClientGame]) {
    games[1].execute(Command::Start);
    pump(games);
    run_for(games, 3.5);
    for game in games.iter() {
        assert_eq!(game.manager.current_state(), MatchState::Playing);
    }
}

fn states(games: &[ClientGame]) -> Vec<MatchState> {
    games.iter().map(|g| g.manager.current_state()).collect()
}

/// MATCH LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Seven spawns, five collected: the cleaner wins 5 to 2 on every replica
    #[test]
    fn test_full_match_cleaner_wins() {
        let mut games = room(short_match());
        start(&mut games);

        for _ in 0..7 {
            games[1].execute(Command::Spawn(None));
            pump(&mut games);
        }
        assert_eq!(games[0].manager.registry().count_alive(Role::Polluter), 7);
        assert_eq!(games[1].manager.live_scores().polluter_score, 7);

        for _ in 0..5 {
            let target = games[0]
                .manager
                .registry()
                .items()
                .next()
                .map(|item| item.position)
                .unwrap();
            games[0].avatar.position = target;
            games[0].execute(Command::Grab);
            pump(&mut games);
            run_for(&mut games, 1.1);
        }
        assert_eq!(games[1].manager.live_scores().cleaner_score, 5);

        run_for(&mut games, 30.0);

        for game in games.iter() {
            assert_eq!(game.manager.current_state(), MatchState::Finished);
            let snapshot = game.manager.score_snapshot().unwrap();
            assert_eq!(snapshot.cleaner_score, 5);
            assert_eq!(snapshot.polluter_score, 2);
            assert_eq!(game.manager.winner(), Some(Winner::Cleaner));
            assert!(!game.manager.input_enabled());
        }
    }

    #[test]
    fn test_empty_match_is_a_tie() {
        let mut games = room(short_match());
        start(&mut games);
        run_for(&mut games, 31.0);

        for game in games.iter() {
            assert_eq!(game.manager.winner(), Some(Winner::Tie));
        }
    }

    #[test]
    fn test_restart_clears_both_replicas() {
        let mut games = room(short_match());
        start(&mut games);
        games[1].execute(Command::Spawn(None));
        games[1].execute(Command::Spawn(None));
        pump(&mut games);
        run_for(&mut games, 31.0);
        assert_eq!(states(&games), vec![MatchState::Finished; 2]);

        // The polluter asks, the coordinator orders
        games[1].execute(Command::Restart);
        pump(&mut games);

        for game in games.iter() {
            assert_eq!(game.manager.current_state(), MatchState::ReadyToStart);
            assert!(game.manager.registry().is_empty());
            assert_eq!(game.manager.ledger().get(), 0);
            assert_eq!(game.manager.score_snapshot(), None);
        }

        start(&mut games);
        assert_eq!(games[0].manager.live_scores().polluter_score, 0);
    }

    #[test]
    fn test_restart_ignored_while_playing() {
        let mut games = room(short_match());
        start(&mut games);
        games[0].execute(Command::Restart);
        pump(&mut games);
        assert_eq!(states(&games), vec![MatchState::Playing; 2]);
    }

    #[test]
    fn test_cleaner_controls_locked_outside_match() {
        let mut games = room(short_match());
        let forward = PoseData {
            both_hands_up: true,
            ..PoseData::default()
        };
        games[0].update(&forward, 1.0);
        assert_eq!(games[0].avatar.position, shared::Vec3::ZERO);

        start(&mut games);
        games[0].update(&forward, 0.5);
        assert!(games[0].avatar.position.z > 0.0);
    }

    /// The coordinator leaves mid-countdown; the polluter takes over and the
    /// match still starts
    #[test]
    fn test_coordinator_handover_during_countdown() {
        let mut games = room(short_match());
        games[1].execute(Command::Start);
        pump(&mut games);
        assert_eq!(states(&games), vec![MatchState::Countdown; 2]);

        let mut survivor = games.split_off(1);
        survivor[0].manager.apply_roster(vec![polluter()], 2);
        assert!(survivor[0].manager.session().is_coordinator());

        run_for(&mut survivor, 4.0);
        assert_eq!(survivor[0].manager.current_state(), MatchState::Playing);
    }

    #[test]
    fn test_coordinator_handover_after_time_up() {
        let mut games = room(short_match());
        start(&mut games);

        // The cleaner vanishes right before the clock runs out
        let mut survivor = games.split_off(1);
        run_for(&mut survivor, 31.0);
        assert_eq!(survivor[0].manager.current_state(), MatchState::Playing);

        survivor[0].manager.apply_roster(vec![polluter()], 2);
        pump(&mut survivor);
        assert_eq!(survivor[0].manager.current_state(), MatchState::Finished);
        assert_eq!(survivor[0].manager.winner(), Some(Winner::Tie));
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;
    use shared::{Directive, ScoreSnapshot};

    #[test]
    fn test_result_packet_fits_in_one_datagram() {
        let packet = Packet::Deliver {
            seq: u32::MAX,
            from: 1,
            directive: Directive::MatchResult {
                snapshot: ScoreSnapshot::new(10, 10),
            },
        };
        let data = tokio_test::assert_ok!(encode(&packet));
        assert!(data.len() <= MAX_PACKET_SIZE);
        assert_eq!(tokio_test::assert_ok!(decode(&data)), packet);
    }

    #[test]
    fn test_garbage_is_rejected() {
        tokio_test::assert_err!(decode(&[0xff; 7]));
    }
}

/// RELAY INTEGRATION TESTS
mod relay_tests {
    use super::*;

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

    async fn recv_until<T>(socket: &UdpSocket, mut pick: impl FnMut(Packet) -> Option<T>) -> T {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        tokio::time::timeout(Duration::from_secs(3), async {
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

    async fn join(relay: SocketAddr, name: &str) -> (UdpSocket, u32, Role) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send(
            &socket,
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: name.to_string(),
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
        (socket, id, role)
    }

    #[tokio::test]
    async fn test_roles_and_room_capacity() {
        let (relay, handle) = start_relay().await;

        let (_a, _, role_a) = join(relay, "a").await;
        let (_b, _, role_b) = join(relay, "b").await;
        assert_eq!(role_a, Role::Cleaner);
        assert_eq!(role_b, Role::Polluter);

        let late = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send(
            &late,
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: "c".to_string(),
            },
            relay,
        )
        .await;
        let reason = recv_until(&late, |p| match p {
            Packet::Disconnected { reason } => Some(reason),
            _ => None,
        })
        .await;
        assert!(reason.contains("full"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_coordinator_reelected_on_leave() {
        let (relay, handle) = start_relay().await;

        let (first, first_id, _) = join(relay, "first").await;
        let (second, second_id, _) = join(relay, "second").await;

        let coordinator = recv_until(&second, |p| match p {
            Packet::Roster {
                members,
                coordinator,
            } if members.len() == 2 => Some(coordinator),
            _ => None,
        })
        .await;
        assert_eq!(coordinator, first_id);

        send(&first, Packet::Disconnect, relay).await;

        let coordinator = recv_until(&second, |p| match p {
            Packet::Roster {
                members,
                coordinator,
            } if members.len() == 1 => Some(coordinator),
            _ => None,
        })
        .await;
        assert_eq!(coordinator, second_id);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_coordinator_route_reaches_only_coordinator() {
        let (relay, handle) = start_relay().await;
        let (first, first_id, _) = join(relay, "first").await;
        let (second, _, _) = join(relay, "second").await;

        send(
            &second,
            Packet::Send {
                seq: 1,
                route: Route::Coordinator,
                directive: shared::Directive::RequestRestart,
            },
            relay,
        )
        .await;

        let (from, directive) = recv_until(&first, |p| match p {
            Packet::Deliver {
                from, directive, ..
            } => Some((from, directive)),
            _ => None,
        })
        .await;
        assert_ne!(from, first_id);
        assert_eq!(directive, shared::Directive::RequestRestart);

        // The sender only sees its ack
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let quiet = tokio::time::timeout(Duration::from_millis(300), async {
            loop {
                let (len, _) = second.recv_from(&mut buffer).await.unwrap();
                if let Ok(Packet::Deliver { .. }) = decode(&buffer[..len]) {
                    return;
                }
            }
        })
        .await;
        assert!(quiet.is_err());

        handle.shutdown();
    }

    async fn participant(
        relay: SocketAddr,
        name: &str,
        config: MatchConfig,
    ) -> (Client, mpsc::UnboundedSender<Command>) {
        let (_pose_tx, pose_rx) = watch::channel(PoseData::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = ClientSettings {
            server: relay.to_string(),
            name: name.to_string(),
            ..ClientSettings::default()
        };
        let client = Client::connect(settings, config, pose_rx, rx).await.unwrap();
        (client, tx)
    }

    /// Two participant processes play a short match through the real relay
    #[tokio::test]
    async fn test_match_over_udp_relay() {
        let (relay, handle) = start_relay().await;
        let config = MatchConfig {
            countdown_seconds: 1,
            match_duration: 2.0,
            ..MatchConfig::default()
        };

        let (mut diver, diver_tx) = participant(relay, "diver", config.clone()).await;
        sleep(Duration::from_millis(100)).await;
        let (mut tanker, tanker_tx) = participant(relay, "tanker", config).await;

        let script = async {
            sleep(Duration::from_millis(500)).await;
            tanker_tx.send(Command::Start).unwrap();
            sleep(Duration::from_millis(2000)).await;
            tanker_tx.send(Command::Spawn(None)).unwrap();
            tanker_tx.send(Command::Spawn(None)).unwrap();
            sleep(Duration::from_millis(2500)).await;
            diver_tx.send(Command::Quit).unwrap();
            tanker_tx.send(Command::Quit).unwrap();
        };

        let (diver_result, tanker_result, _) = tokio::join!(diver.run(), tanker.run(), script);
        assert!(diver_result.is_ok());
        assert!(tanker_result.is_ok());

        for client in [&diver, &tanker] {
            let manager = &client.game().manager;
            assert_eq!(manager.current_state(), MatchState::Finished);
            let snapshot = manager.score_snapshot().unwrap();
            assert_eq!(snapshot.cleaner_score, 0);
            assert_eq!(snapshot.polluter_score, 2);
            assert_eq!(manager.winner(), Some(Winner::Polluter));
        }
        assert_eq!(diver.game().role(), Role::Cleaner);
        assert_eq!(tanker.game().role(), Role::Polluter);

        handle.shutdown();
    }
}
