//! Replicated match core for Clean Ocean.
//!
//! Every participant runs the same `MatchManager` against its own replica of
//! the trash ledger and registry. The relay only moves directives around; it
//! never interprets them.

pub mod config;
pub mod error;
pub mod ledger;
pub mod match_manager;
pub mod placement;
pub mod protocol;
pub mod registry;
pub mod reliable;
pub mod session;
pub mod timers;
pub mod types;

pub use config::{MatchConfig, PlacementConfig};
pub use error::{ActionError, ConfigError, ProtocolError};
pub use ledger::{LedgerEvent, TrashLedger, POINTS_PER_ITEM};
pub use match_manager::{MatchEvent, MatchListener, MatchManager};
pub use placement::{Placement, PlacementSolver};
pub use protocol::{decode, encode, Delivery, Directive, Outgoing, Packet, Route};
pub use protocol::{MAX_PACKET_SIZE, PROTOCOL_VERSION};
pub use registry::TrashRegistry;
pub use reliable::{ReliableReceiver, ReliableSender};
pub use session::{RosterChange, Session, SessionView};
pub use timers::{Cooldown, Countdown, CountdownEvent};
pub use types::*;

/// Default relay port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default port the phone sensor app sends pose datagrams to
pub const DEFAULT_SENSOR_PORT: u16 = 5005;

/// Seconds without any packet before a participant is dropped
pub const CLIENT_TIMEOUT_SECS: u64 = 5;

/// Milliseconds before an unacknowledged directive is sent again
pub const RESEND_INTERVAL_MS: u64 = 200;
