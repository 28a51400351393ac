//! # Oh My Chess Client
//!
//! Session synchronization for two-player chess played against a contract
//! backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    OH MY CHESS CLIENT                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Pure primitives                           │
//! │  ├── address.rs  - SS58 / hex address normalization          │
//! │  └── envelope.rs - Two-layer result envelope                 │
//! │                                                              │
//! │  game/           - Session model (pure)                      │
//! │  ├── board.rs    - Pieces, cells, locations, moves           │
//! │  ├── session.rs  - Session record, role / turn / status      │
//! │  ├── notation.rs - Board notation for rendering              │
//! │  └── preview.rs  - Local legality and optimistic projection  │
//! │                                                              │
//! │  network/        - Backend access (async)                    │
//! │  ├── protocol.rs - Contract call messages                    │
//! │  ├── backend.rs  - Backend traits, WebSocket transport       │
//! │  ├── memory.rs   - In-process backend                        │
//! │  ├── client.rs   - Session Client                            │
//! │  └── sync.rs     - Identity state machine and polling        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Source of Truth
//!
//! The backend owns every session. Nothing in this crate mutates a session
//! locally except to build a projection for display, and any projection is
//! replaced by the next snapshot the backend returns.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::address::{normalize, Address, AddressError};
pub use crate::core::envelope::{unwrap, Envelope, EnvelopeError};
pub use crate::game::board::{ChessLocation, ChessMove, Player};
pub use crate::game::session::{GameSession, GameStatus, SessionId};
pub use crate::network::client::{ClientError, SessionClient};
pub use crate::network::sync::{GameSync, SyncConfig, SyncError, SyncEvent, SyncState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default refetch period of the selected session, in milliseconds.
pub const POLL_INTERVAL_MS: u64 = 4_000;
