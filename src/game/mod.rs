//! Game Session Model
//!
//! Pure functions over remote session snapshots. No I/O, no hidden state.
//!
//! ## Module Structure
//!
//! - `board`: Pieces, cells, board storage, locations, moves
//! - `session`: Session record, role / turn / status derivations
//! - `notation`: Board notation for the rendering widget
//! - `preview`: Local legality feedback and optimistic projection

pub mod board;
pub mod session;
pub mod notation;
pub mod preview;

// Re-export key types
pub use board::{Board, ChessCell, ChessLocation, ChessMove, LocationError, Piece, Player};
pub use session::{
    board_orientation, is_callers_turn, resolve_role, status_message, view_role,
    GameSession, GameStatus, ModelError, PlayersAddresses, SessionId,
};
pub use notation::{to_board_notation, EMPTY_BOARD_NOTATION};
pub use preview::{apply_move, is_legal_move, legal_destinations, preview_move, PreviewError, Projection};
