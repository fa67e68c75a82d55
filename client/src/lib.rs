//! # Clean Ocean participant
//!
//! A headless participant process. It connects to the session relay, keeps a
//! replica of the match core in sync through relayed directives, and drives
//! that replica from a fixed-rate tick.
//!
//! ## Modules
//!
//! - `game`: the match replica plus the local avatar, and the effect of each
//!   operator command on them
//! - `hud`: log presentation of match events, the MM:SS timer and ping stats
//! - `input`: operator command parsing and gesture edge detection
//! - `network`: relay link, reliable directive flushing and the main loop
//! - `sensor`: background thread ingesting phone/gesture pose datagrams
//!
//! ## Data flow
//!
//! ```text
//! sensor thread --watch--> tick --> ClientGame --outbox--> relay
//! stdin task  --mpsc----> command --^            <--Deliver--
//! ```
//!
//! Every directive, including the participant's own, is applied when the relay
//! delivers it back, so all replicas see the same order of events.

pub mod game;
pub mod hud;
pub mod input;
pub mod network;
pub mod sensor;
