//! Board Notation
//!
//! Projects a session into the FEN-style string the board widget consumes.
//! Castling rights, en passant and clocks are not tracked by the backend, so
//! those fields are constant.

use crate::game::board::Board;
use crate::game::session::GameSession;

/// Fields appended after the active color.
const FIXED_TRAILER: &str = "- - 0 1";

/// Notation for a board with no pieces, White to move.
pub const EMPTY_BOARD_NOTATION: &str = "8/8/8/8/8/8/8/8 w - - 0 1";

/// Serialize a session: ranks 8..1, empty runs collapsed to digits.
pub fn to_board_notation(session: &GameSession) -> String {
    format!(
        "{} {} {}",
        placement(&session.board),
        session.turn.notation_token(),
        FIXED_TRAILER
    )
}

/// Piece placement field only.
pub fn placement(board: &Board) -> String {
    board
        .rows()
        .iter()
        .rev()
        .map(|row| {
            let mut rank = String::with_capacity(8);
            let mut empty = 0u8;
            for cell in row {
                match cell {
                    Some(cell) => {
                        if empty > 0 {
                            rank.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        rank.push(cell.notation_letter());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                rank.push((b'0' + empty) as char);
            }
            rank
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{ChessCell, ChessLocation, Piece, Player};
    use crate::game::session::PlayersAddresses;

    fn session_with(board: Board, turn: Player) -> GameSession {
        GameSession {
            board,
            turn,
            players: PlayersAddresses::default(),
            status: crate::game::session::GameStatus::Ongoing,
        }
    }

    #[test]
    fn test_empty_board() {
        let session = session_with(Board::empty(), Player::White);
        assert_eq!(to_board_notation(&session), EMPTY_BOARD_NOTATION);
    }

    #[test]
    fn test_initial_position() {
        let session = session_with(Board::initial(), Player::White);
        assert_eq!(
            to_board_notation(&session),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w - - 0 1"
        );
    }

    #[test]
    fn test_active_color_token() {
        let session = session_with(Board::initial(), Player::Black);
        let notation = to_board_notation(&session);
        assert_eq!(notation.split(' ').nth(1), Some("b"));
    }

    #[test]
    fn test_run_length_within_rank() {
        let mut board = Board::empty();
        board.set(
            ChessLocation::from_square("c4").unwrap(),
            Some(ChessCell::new(Piece::Knight, Player::Black)),
        );
        board.set(
            ChessLocation::from_square("h4").unwrap(),
            Some(ChessCell::new(Piece::Rook, Player::White)),
        );
        assert_eq!(placement(&board), "8/8/8/8/2n4R/8/8/8");
    }
}
