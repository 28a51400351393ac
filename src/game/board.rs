//! Board Definitions
//!
//! Storage order follows the contract: `board[row][column]`, row 0 is
//! rank 1 (White's back rank), column 0 is the a-file.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Board side length.
pub const BOARD_SIZE: usize = 8;

// =============================================================================
// PLAYER / PIECE
// =============================================================================

/// A side of the board, also used for whose turn it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    /// Moves first.
    White,
    /// Moves second.
    Black,
}

impl Player {
    /// The other side.
    pub fn opponent(self) -> Self {
        match self {
            Player::White => Player::Black,
            Player::Black => Player::White,
        }
    }

    /// Active-color token used in board notation.
    pub fn notation_token(self) -> char {
        match self {
            Player::White => 'w',
            Player::Black => 'b',
        }
    }
}

/// Piece kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Piece {
    /// Pawn.
    Pawn,
    /// Knight.
    Knight,
    /// Bishop.
    Bishop,
    /// Rook.
    Rook,
    /// Queen.
    Queen,
    /// King.
    King,
}

impl Piece {
    /// Uppercase notation letter.
    pub fn letter(self) -> char {
        match self {
            Piece::Pawn => 'P',
            Piece::Knight => 'N',
            Piece::Bishop => 'B',
            Piece::Rook => 'R',
            Piece::Queen => 'Q',
            Piece::King => 'K',
        }
    }
}

/// An occupied square.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChessCell {
    /// Piece on the square.
    pub piece: Piece,
    /// Side owning the piece.
    #[serde(rename = "player")]
    pub owner: Player,
}

impl ChessCell {
    /// Create a cell.
    pub const fn new(piece: Piece, owner: Player) -> Self {
        Self { piece, owner }
    }

    /// Notation letter: uppercase for White, lowercase for Black.
    pub fn notation_letter(&self) -> char {
        match self.owner {
            Player::White => self.piece.letter(),
            Player::Black => self.piece.letter().to_ascii_lowercase(),
        }
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// 8×8 board in storage order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board(pub [[Option<ChessCell>; BOARD_SIZE]; BOARD_SIZE]);

impl Board {
    /// Board with no pieces.
    pub fn empty() -> Self {
        Self([[None; BOARD_SIZE]; BOARD_SIZE])
    }

    /// Standard starting position.
    pub fn initial() -> Self {
        const BACK_RANK: [Piece; BOARD_SIZE] = [
            Piece::Rook,
            Piece::Knight,
            Piece::Bishop,
            Piece::Queen,
            Piece::King,
            Piece::Bishop,
            Piece::Knight,
            Piece::Rook,
        ];

        let mut board = Self::empty();
        for (column, piece) in BACK_RANK.iter().enumerate() {
            board.0[0][column] = Some(ChessCell::new(*piece, Player::White));
            board.0[1][column] = Some(ChessCell::new(Piece::Pawn, Player::White));
            board.0[6][column] = Some(ChessCell::new(Piece::Pawn, Player::Black));
            board.0[7][column] = Some(ChessCell::new(*piece, Player::Black));
        }
        board
    }

    /// Cell at a location.
    pub fn get(&self, at: ChessLocation) -> Option<ChessCell> {
        self.0[at.row as usize][at.column as usize]
    }

    /// Replace the cell at a location.
    pub fn set(&mut self, at: ChessLocation, cell: Option<ChessCell>) {
        self.0[at.row as usize][at.column as usize] = cell;
    }

    /// Rows in storage order (rank 1 first).
    pub fn rows(&self) -> &[[Option<ChessCell>; BOARD_SIZE]; BOARD_SIZE] {
        &self.0
    }

    /// Number of occupied squares.
    pub fn piece_count(&self) -> usize {
        self.0.iter().flatten().filter(|c| c.is_some()).count()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// LOCATIONS AND MOVES
// =============================================================================

/// Location errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Row or column outside 0..=7.
    #[error("location ({row}, {column}) is off the board")]
    OutOfBounds {
        /// Requested row.
        row: u8,
        /// Requested column.
        column: u8,
    },
    /// Not an algebraic square like `e2`.
    #[error("invalid square: {0}")]
    InvalidSquare(String),
}

/// A square, `(row, column)` with row 0 = rank 1.
///
/// Serialized as a `[row, column]` pair, which is what the contract expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "(u8, u8)", try_from = "(u8, u8)")]
pub struct ChessLocation {
    row: u8,
    column: u8,
}

impl ChessLocation {
    /// Create a location, validating bounds.
    pub fn new(row: u8, column: u8) -> Result<Self, LocationError> {
        if (row as usize) < BOARD_SIZE && (column as usize) < BOARD_SIZE {
            Ok(Self { row, column })
        } else {
            Err(LocationError::OutOfBounds { row, column })
        }
    }

    /// Parse an algebraic square (`a1`..`h8`).
    pub fn from_square(square: &str) -> Result<Self, LocationError> {
        let invalid = || LocationError::InvalidSquare(square.to_string());
        let bytes = square.as_bytes();
        if bytes.len() != 2 {
            return Err(invalid());
        }
        let file = bytes[0].to_ascii_lowercase();
        let rank = bytes[1];
        if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
            return Err(invalid());
        }
        Self::new(rank - b'1', file - b'a')
    }

    /// Algebraic square name.
    pub fn to_square(&self) -> String {
        format!("{}{}", (b'a' + self.column) as char, self.row + 1)
    }

    /// Row (rank index, 0 = rank 1).
    pub fn row(&self) -> u8 {
        self.row
    }

    /// Column (file index, 0 = a-file).
    pub fn column(&self) -> u8 {
        self.column
    }
}

impl From<ChessLocation> for (u8, u8) {
    fn from(loc: ChessLocation) -> Self {
        (loc.row, loc.column)
    }
}

impl TryFrom<(u8, u8)> for ChessLocation {
    type Error = LocationError;

    fn try_from((row, column): (u8, u8)) -> Result<Self, Self::Error> {
        Self::new(row, column)
    }
}

/// A move request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChessMove {
    /// Source square.
    pub from: ChessLocation,
    /// Destination square.
    pub to: ChessLocation,
}

impl ChessMove {
    /// Create a move.
    pub const fn new(from: ChessLocation, to: ChessLocation) -> Self {
        Self { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initial_board_layout() {
        let board = Board::initial();
        assert_eq!(board.piece_count(), 32);
        let e1 = ChessLocation::from_square("e1").unwrap();
        assert_eq!(board.get(e1), Some(ChessCell::new(Piece::King, Player::White)));
        let d8 = ChessLocation::from_square("d8").unwrap();
        assert_eq!(board.get(d8), Some(ChessCell::new(Piece::Queen, Player::Black)));
        assert_eq!(board.get(ChessLocation::new(3, 3).unwrap()), None);
    }

    #[test]
    fn test_location_bounds() {
        assert!(ChessLocation::new(7, 7).is_ok());
        assert_eq!(
            ChessLocation::new(8, 0),
            Err(LocationError::OutOfBounds { row: 8, column: 0 })
        );
    }

    #[test]
    fn test_square_conversion() {
        let e2 = ChessLocation::from_square("e2").unwrap();
        assert_eq!((e2.row(), e2.column()), (1, 4));
        assert_eq!(e2.to_square(), "e2");
        assert_eq!(ChessLocation::from_square("H8").unwrap().to_square(), "h8");
        assert!(ChessLocation::from_square("i1").is_err());
        assert!(ChessLocation::from_square("a9").is_err());
        assert!(ChessLocation::from_square("e").is_err());
    }

    #[test]
    fn test_move_wire_shape() {
        let mv = ChessMove::new(
            ChessLocation::from_square("e2").unwrap(),
            ChessLocation::from_square("e4").unwrap(),
        );
        assert_eq!(serde_json::to_value(mv).unwrap(), json!({"from": [1, 4], "to": [3, 4]}));

        let bad: Result<ChessMove, _> = serde_json::from_value(json!({"from": [9, 0], "to": [0, 0]}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_cell_wire_shape() {
        let cell = ChessCell::new(Piece::Knight, Player::Black);
        assert_eq!(
            serde_json::to_value(cell).unwrap(),
            json!({"piece": "Knight", "player": "Black"})
        );
        assert_eq!(cell.notation_letter(), 'n');
    }

    #[test]
    fn test_player_opponent() {
        assert_eq!(Player::White.opponent(), Player::Black);
        assert_eq!(Player::Black.opponent().notation_token(), 'w');
    }
}
