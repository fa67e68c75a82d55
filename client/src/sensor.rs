//! Phone/gesture sensor ingestion
//!
//! The tracker (hand tracking script or phone app) sends one JSON record per
//! UDP datagram. A background thread decodes them and publishes the newest one
//! through a `watch` channel; the tick loop only ever reads the latest value.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;

/// How long a blocking receive waits before checking the shutdown flag
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// One decoded gesture sample. Missing fields read as false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PoseData {
    pub right_hand_up: bool,
    pub left_hand_up: bool,
    pub both_hands_up: bool,
    pub palms_together_praying: bool,
    /// Closed fist
    pub grab: bool,
    pub thumbs_up: bool,
    /// Touch button alternative to `grab`
    pub phone_grab: bool,
    /// Touch button alternative to `thumbs_up`
    pub phone_highlight: bool,
}

impl PoseData {
    pub fn grab_triggered(&self) -> bool {
        self.grab || self.phone_grab
    }

    pub fn highlight_triggered(&self) -> bool {
        self.thumbs_up || self.phone_highlight
    }

    /// -1 to turn left, 1 to turn right, 0 when both or neither hand is up
    pub fn turn_intent(&self) -> f32 {
        match (self.left_hand_up, self.right_hand_up) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

pub fn decode_pose(data: &[u8]) -> Result<PoseData, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Background UDP listener feeding the latest pose into a watch channel
pub struct SensorListener {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SensorListener {
    /// Binds `addr` and starts the receive thread
    pub fn spawn(addr: &str, latest: watch::Sender<PoseData>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(RECEIVE_TIMEOUT))?;
        let local_addr = socket.local_addr()?;
        info!("Listening for sensor data on {}", local_addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let thread = std::thread::Builder::new()
            .name("sensor-rx".to_string())
            .spawn(move || receive_loop(socket, latest, flag))?;

        Ok(Self {
            local_addr,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals the thread and waits for it to exit
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Sensor thread panicked");
            }
        }
    }
}

impl Drop for SensorListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(socket: UdpSocket, latest: watch::Sender<PoseData>, shutdown: Arc<AtomicBool>) {
    let mut buffer = [0u8; 1024];

    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buffer) {
            Ok((len, from)) => match decode_pose(&buffer[..len]) {
                Ok(pose) => {
                    latest.send_replace(pose);
                }
                Err(e) => debug!("Malformed sensor datagram from {}: {}", from, e),
            },
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => {
                warn!("Sensor socket error: {}", e);
                std::thread::sleep(RECEIVE_TIMEOUT);
            }
        }
    }

    debug!("Sensor thread stopped");
}
