//! # Session Relay
//!
//! UDP room server that sits between Clean Ocean participants. It is the
//! session transport the match core relies on:
//!
//! - assigns participant ids and roles (`Cleaner` first, then `Polluter`)
//! - elects the coordinator as the earliest-joined participant still present
//!   and re-elects when it leaves or times out
//! - publishes the roster on every change and periodically
//! - relays directives over a reliable ordered link per participant, either
//!   to everyone (sender included) or to the coordinator only
//!
//! The relay never looks inside a directive. All match logic runs on the
//! participants.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;

pub use network::{Server, ServerConfig, ServerHandle};
