//! Optimistic Move Preview
//!
//! Local legality feedback for a pending move, plus the board the move would
//! produce. Legality comes from `shakmaty` and only drives the UI; the
//! backend has the final say and its next snapshot replaces any projection
//! built here.

use shakmaty::{fen::Fen, CastlingMode, Chess, File, Move, Position, Rank, Role, Square};
use thiserror::Error;

use crate::game::board::{ChessCell, ChessLocation, ChessMove, Piece, BOARD_SIZE};
use crate::game::notation::to_board_notation;
use crate::game::session::{is_callers_turn, GameSession};

/// Why a move could not be previewed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreviewError {
    /// Board could not be loaded into the rules library.
    #[error("position not playable locally: {0}")]
    InvalidPosition(String),

    /// No legal move between these squares.
    #[error("illegal move {from} -> {to}")]
    IllegalMove {
        /// Source square.
        from: String,
        /// Destination square.
        to: String,
    },

    /// Caller is not the side to move (or not seated).
    #[error("not your turn")]
    NotYourTurn,

    /// Session already finished.
    #[error("game is already over")]
    GameOver,
}

/// Board state the UI may show until the next authoritative snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    /// The move that produced it.
    pub chess_move: ChessMove,
    /// Session with the move applied and the turn passed.
    pub session: GameSession,
    /// Notation of `session`.
    pub notation: String,
}

fn to_square(loc: ChessLocation) -> Square {
    Square::from_coords(File::new(loc.column() as u32), Rank::new(loc.row() as u32))
}

fn load_position(session: &GameSession) -> Result<Chess, PreviewError> {
    let fen: Fen = to_board_notation(session)
        .parse()
        .map_err(|e| PreviewError::InvalidPosition(format!("{e}")))?;
    fen.into_position(CastlingMode::Standard)
        .map_err(|e| PreviewError::InvalidPosition(format!("{e}")))
}

/// Find the legal move between two squares, preferring queen promotion.
fn find_move(position: &Chess, chess_move: ChessMove) -> Option<Move> {
    let from = to_square(chess_move.from);
    let to = to_square(chess_move.to);
    let mut candidates = position
        .legal_moves()
        .into_iter()
        .filter(|m| m.from() == Some(from) && m.to() == to);

    let first = candidates.next()?;
    if first.promotion().is_none() {
        return Some(first);
    }
    std::iter::once(first)
        .chain(candidates)
        .find(|m| m.promotion() == Some(Role::Queen))
}

/// True when the rules library accepts the move in this position.
pub fn is_legal_move(session: &GameSession, chess_move: ChessMove) -> bool {
    load_position(session)
        .map(|pos| find_move(&pos, chess_move).is_some())
        .unwrap_or(false)
}

/// Squares the piece on `from` may legally move to.
pub fn legal_destinations(session: &GameSession, from: ChessLocation) -> Vec<ChessLocation> {
    let Ok(position) = load_position(session) else {
        return Vec::new();
    };
    let from = to_square(from);

    let mut destinations: Vec<ChessLocation> = position
        .legal_moves()
        .iter()
        .filter(|m| m.from() == Some(from))
        .filter_map(|m| {
            let to = m.to();
            ChessLocation::new(to.rank() as u8, to.file() as u8).ok()
        })
        .collect();
    destinations.dedup();
    destinations
}

/// Apply a move the way the contract does: lift the piece, drop it on the
/// target, promote pawns reaching the last rank to a queen, pass the turn.
///
/// No legality check; status is left as it was.
pub fn apply_move(session: &GameSession, chess_move: ChessMove) -> GameSession {
    let mut next = session.clone();
    let moving = next.board.get(chess_move.from);
    next.board.set(chess_move.from, None);

    let last_rank = chess_move.to.row() == 0 || chess_move.to.row() as usize == BOARD_SIZE - 1;
    let landed = match moving {
        Some(cell) if cell.piece == Piece::Pawn && last_rank => {
            Some(ChessCell::new(Piece::Queen, cell.owner))
        }
        other => other,
    };
    next.board.set(chess_move.to, landed);
    next.turn = session.turn.opponent();
    next
}

/// Check a move locally and build the projection the UI may display.
pub fn preview_move(
    session: &GameSession,
    account: Option<&str>,
    chess_move: ChessMove,
) -> Result<Projection, PreviewError> {
    if session.status.is_over() {
        return Err(PreviewError::GameOver);
    }
    if !is_callers_turn(session, account) {
        return Err(PreviewError::NotYourTurn);
    }

    let position = load_position(session)?;
    if find_move(&position, chess_move).is_none() {
        return Err(PreviewError::IllegalMove {
            from: chess_move.from.to_square(),
            to: chess_move.to.to_square(),
        });
    }

    let projected = apply_move(session, chess_move);
    Ok(Projection {
        chess_move,
        notation: to_board_notation(&projected),
        session: projected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{Board, Player};
    use crate::game::session::{GameStatus, PlayersAddresses};

    const ALICE_SS58: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const ALICE_HEX: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const BOB_SS58: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
    const BOB_HEX: &str = "0x8eaf04151687736326c9fea17e25fc5287613693c912909cb226aa4794f26a48";

    fn full_session() -> GameSession {
        GameSession::new(PlayersAddresses {
            white: Some(ALICE_HEX.into()),
            black: Some(BOB_HEX.into()),
        })
    }

    fn mv(from: &str, to: &str) -> ChessMove {
        ChessMove::new(
            ChessLocation::from_square(from).unwrap(),
            ChessLocation::from_square(to).unwrap(),
        )
    }

    #[test]
    fn test_preview_opening_move() {
        let session = full_session();
        let projection = preview_move(&session, Some(ALICE_SS58), mv("e2", "e4")).unwrap();
        assert_eq!(
            projection.notation,
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b - - 0 1"
        );
        assert_eq!(projection.session.turn, Player::Black);
        // the authoritative snapshot is untouched
        assert_eq!(session.turn, Player::White);
    }

    #[test]
    fn test_preview_rejects_illegal_move() {
        let session = full_session();
        let err = preview_move(&session, Some(ALICE_SS58), mv("e2", "e5")).unwrap_err();
        assert_eq!(
            err,
            PreviewError::IllegalMove { from: "e2".into(), to: "e5".into() }
        );
    }

    #[test]
    fn test_preview_rejects_wrong_turn() {
        let session = full_session();
        let err = preview_move(&session, Some(BOB_SS58), mv("e7", "e5")).unwrap_err();
        assert_eq!(err, PreviewError::NotYourTurn);
        assert_eq!(
            preview_move(&session, None, mv("e2", "e4")).unwrap_err(),
            PreviewError::NotYourTurn
        );
    }

    #[test]
    fn test_preview_rejects_finished_game() {
        let mut session = full_session();
        session.status = GameStatus::Draw;
        let err = preview_move(&session, Some(ALICE_SS58), mv("e2", "e4")).unwrap_err();
        assert_eq!(err, PreviewError::GameOver);
    }

    #[test]
    fn test_empty_board_not_playable() {
        let mut session = full_session();
        session.board = Board::empty();
        assert!(matches!(
            preview_move(&session, Some(ALICE_SS58), mv("e2", "e4")),
            Err(PreviewError::InvalidPosition(_))
        ));
        assert!(!is_legal_move(&session, mv("e2", "e4")));
    }

    #[test]
    fn test_pawn_promotes_to_queen() {
        let mut session = full_session();
        let mut board = Board::empty();
        board.set(
            ChessLocation::from_square("e1").unwrap(),
            Some(ChessCell::new(Piece::King, Player::White)),
        );
        board.set(
            ChessLocation::from_square("a8").unwrap(),
            Some(ChessCell::new(Piece::King, Player::Black)),
        );
        board.set(
            ChessLocation::from_square("h7").unwrap(),
            Some(ChessCell::new(Piece::Pawn, Player::White)),
        );
        session.board = board;

        let projection = preview_move(&session, Some(ALICE_SS58), mv("h7", "h8")).unwrap();
        assert_eq!(
            projection.session.board.get(ChessLocation::from_square("h8").unwrap()),
            Some(ChessCell::new(Piece::Queen, Player::White))
        );
        assert_eq!(
            projection.session.board.get(ChessLocation::from_square("h7").unwrap()),
            None
        );
    }

    #[test]
    fn test_legal_destinations() {
        let session = full_session();
        let mut knight = legal_destinations(&session, ChessLocation::from_square("g1").unwrap())
            .iter()
            .map(|l| l.to_square())
            .collect::<Vec<_>>();
        knight.sort();
        assert_eq!(knight, vec!["f3".to_string(), "h3".to_string()]);

        assert!(legal_destinations(&session, ChessLocation::from_square("e8").unwrap()).is_empty());
    }
}
