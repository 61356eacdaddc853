//! # Room Coordination Server Library
//!
//! Authoritative server for a small multiplayer party game: clients
//! create or join short-lived rooms identified by a code, the host
//! triggers a shared game start, and players exchange per-round phrase
//! submissions that are broadcast back to everyone in the room.
//!
//! ## Architecture
//!
//! All room state is owned by a single coordinator task fed by one
//! event channel. The transport layer (one TCP connection per client,
//! length-prefixed bincode frames) only relays events in and packets
//! out; it never touches room state. This gives single-threaded
//! event-loop semantics: operations on a room are totally ordered as
//! received, and every broadcast reflects one consistent snapshot.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! The room registry and per-room rules: membership in join order with
//! no duplicate connections, host assignment and migration, the
//! monotonic lobby -> started transition, and phrase collection.
//! Empty rooms are deleted immediately.
//!
//! ### Coordinator Module (`coordinator`)
//! Event dispatch, boundary validation, the broadcast dispatcher and
//! the disconnect reconciler. Failures are reported only to the
//! offending connection as `RoomError` packets.
//!
//! ### Network Module (`network`)
//! TCP accept loop, connection id allocation, and the per-connection
//! reader/writer tasks bridging sockets to the coordinator channel.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod network;
pub mod registry;
