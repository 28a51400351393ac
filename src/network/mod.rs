//! Network Layer
//!
//! Everything that talks to the contract backend, and the cached,
//! identity-keyed view the UI reads from.
//!
//! ## Module Structure
//!
//! - `protocol`: Wire messages for contract calls
//! - `backend`: Backend traits and the WebSocket transport
//! - `memory`: In-process backend
//! - `client`: Session Client, one per `(network, signer)`
//! - `sync`: Identity state machine, polling, optimistic overlay

pub mod protocol;
pub mod backend;
pub mod memory;
pub mod client;
pub mod sync;

pub use protocol::{CallRequest, CallResponse, ContractCall, MAX_TRACKED_SESSIONS};
pub use backend::{BackendConnector, BackendError, ChessBackend, ClientConfig, WsBackend, WsConnector};
pub use memory::{MemoryBackend, MemoryConnector, MemoryStore};
pub use client::{ClientError, ClientId, SessionClient};
pub use sync::{GameSync, SessionView, SyncConfig, SyncError, SyncEvent, SyncState};
