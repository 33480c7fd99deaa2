//! # Chess Session Server Library
//!
//! This library provides the authoritative session layer for real-time
//! two-player chess. It creates game rooms, pairs anonymous players, decides
//! whose turn it is, forwards moves to a rules engine and fans the resulting
//! state out to both players.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! A session moves from `awaiting-opponent` to `active` to `completed`.
//! Players create a session and share its short code, or ask for a match and
//! get paired in arrival order. A completed game can be rematched with the
//! colours swapped; the old session is discarded and its id never comes
//! back.
//!
//! ### Turn Authority
//! The server never trusts a client about the game. A move is applied only
//! if the sender sits in the seat that holds the turn and the position
//! authority accepts it. Everything else is dropped without a reply.
//!
//! ### Reconnection
//! Seats belong to user identities, not connections. A dropped connection
//! keeps its seat, and the same user can take it back from a new
//! connection with `resume-session`. Sessions nobody returns to are
//! discarded after a configurable timeout.
//!
//! ## Architecture Design
//!
//! ### Per-Session Serialization
//! Every session sits behind its own async mutex. Moves, joins and rematches
//! of one session run one at a time while different sessions proceed in
//! parallel. Broadcasts are queued while the session lock is held, so both
//! players observe updates in the order they were applied.
//!
//! ### WebSocket Transport
//! Clients speak JSON over text frames or bincode over binary frames. The
//! server answers in whichever encoding the client used last.
//!
//! ### Write-Behind Persistence
//! Session creation and final results go to a bounded queue drained by a
//! single worker. Storage is slow and fallible; gameplay never waits for it.
//!
//! ## Module Organization
//!
//! ### Session Manager (`manager`)
//! Dispatches client messages and implements every session operation:
//! create, join, find-match, submit-move, rematch, resume and disconnect.
//!
//! ### Session Model and Store (`session`, `store`)
//! The session record with its seats, position, history and ply counter, and
//! the injectable store holding all live sessions.
//!
//! ### Matchmaking (`matchmaking`)
//! FIFO queue that pairs the two oldest tickets of different users.
//!
//! ### Connection Registry (`registry`)
//! Maps connection ids to user identities and to the single session each
//! connection belongs to.
//!
//! ### Routing (`router`)
//! Session rooms and per-connection outboxes with best effort delivery.
//!
//! ### Position Authority (`authority`)
//! The rules engine boundary, implemented for chess with `shakmaty`.
//!
//! ### Persistence (`persistence`)
//! Gateway trait, log and JSON-lines sinks and the write-behind worker.
//!
//! ### Network (`network`)
//! WebSocket listener, per-connection reader and writer tasks and the
//! abandoned-session reaper.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:3000".parse()?,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Runs until Ctrl+C, then drains pending game records
//!     Server::bind(config).await?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod authority;
pub mod config;
pub mod error;
pub mod manager;
pub mod matchmaking;
pub mod network;
pub mod persistence;
pub mod registry;
pub mod router;
pub mod session;
pub mod store;
