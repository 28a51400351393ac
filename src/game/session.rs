//! Game Session Model
//!
//! The remote session record and the pure derivations the UI needs from it:
//! which seat the caller occupies, whether it is their move, and what to
//! tell them about the game. Nothing here performs I/O or keeps state.
//!
//! Derivations used for rendering never fail. They degrade to an "unknown"
//! answer when the caller is missing, malformed, or not seated.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::address::{normalize, AddressError};
use crate::game::board::{Board, Player};

// =============================================================================
// SESSION IDENTIFIER
// =============================================================================

/// Opaque session handle issued by the backend.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a backend-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// SESSION RECORD
// =============================================================================

/// Game status as reported by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    /// Moves are accepted.
    Ongoing,
    /// White delivered checkmate.
    #[serde(rename = "WonByPlayerWhite", alias = "WonByWhite")]
    WonByWhite,
    /// Black delivered checkmate.
    #[serde(rename = "WonByPlayerBlack", alias = "WonByBlack")]
    WonByBlack,
    /// No legal move, not in check.
    Stalemate,
    /// Drawn.
    Draw,
}

impl GameStatus {
    /// The backend rejects further moves once this is true.
    pub fn is_over(self) -> bool {
        self != GameStatus::Ongoing
    }

    /// Winning side, if any.
    pub fn winner(self) -> Option<Player> {
        match self {
            GameStatus::WonByWhite => Some(Player::White),
            GameStatus::WonByBlack => Some(Player::Black),
            _ => None,
        }
    }
}

/// Seat assignments. `None` (or an empty string) means the seat is open.
///
/// Addresses are kept exactly as the backend sent them and only ever
/// compared after normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersAddresses {
    /// White seat.
    #[serde(default)]
    pub white: Option<String>,
    /// Black seat.
    #[serde(default)]
    pub black: Option<String>,
}

impl PlayersAddresses {
    /// Raw address in a seat, if filled.
    pub fn seat(&self, side: Player) -> Option<&str> {
        let raw = match side {
            Player::White => self.white.as_deref(),
            Player::Black => self.black.as_deref(),
        };
        raw.filter(|s| !s.trim().is_empty())
    }

    /// Both seats filled.
    pub fn is_full(&self) -> bool {
        self.seat(Player::White).is_some() && self.seat(Player::Black).is_some()
    }
}

/// One authoritative snapshot of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    /// Board in storage order.
    pub board: Board,
    /// Side to move.
    pub turn: Player,
    /// Seat assignments.
    pub players: PlayersAddresses,
    /// Game status.
    pub status: GameStatus,
}

impl GameSession {
    /// A freshly created session: start position, White to move.
    pub fn new(players: PlayersAddresses) -> Self {
        Self {
            board: Board::initial(),
            turn: Player::White,
            players,
            status: GameStatus::Ongoing,
        }
    }
}

// =============================================================================
// DERIVATIONS
// =============================================================================

/// Role derivation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Caller does not occupy either seat.
    #[error("account is not a participant in this session")]
    NotAParticipant,

    /// Caller address could not be decoded.
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
}

/// Which seat `account` occupies.
///
/// Fails with [`ModelError::NotAParticipant`] when neither seat matches,
/// including when the matching seat would be an open one.
pub fn resolve_role(session: &GameSession, account: &str) -> Result<Player, ModelError> {
    let caller = normalize(account)?;

    [Player::White, Player::Black]
        .into_iter()
        .find(|side| {
            session
                .players
                .seat(*side)
                .and_then(|seat| normalize(seat).ok())
                .is_some_and(|seat| seat == caller)
        })
        .ok_or(ModelError::NotAParticipant)
}

/// Non-failing role lookup for rendering.
pub fn view_role(session: &GameSession, account: Option<&str>) -> Option<Player> {
    account.and_then(|a| resolve_role(session, a).ok())
}

/// Side the board should be drawn from. Spectators see White's side.
pub fn board_orientation(session: &GameSession, account: Option<&str>) -> Player {
    view_role(session, account).unwrap_or(Player::White)
}

/// True only when both seats are filled, the caller holds one of them, and
/// that seat is the side to move.
pub fn is_callers_turn(session: &GameSession, account: Option<&str>) -> bool {
    if !session.players.is_full() {
        return false;
    }
    view_role(session, account) == Some(session.turn)
}

/// User-facing status line.
///
/// Until both seats are filled the game cannot progress, so every status
/// reads as waiting. Wins are framed from the viewer's side when known.
pub fn status_message(session: &GameSession, role: Option<Player>) -> &'static str {
    if !session.players.is_full() {
        return "Waiting for an opponent to join";
    }

    match (session.status, role) {
        (GameStatus::Ongoing, _) => "Game in progress",
        (GameStatus::Stalemate, _) => "Stalemate",
        (GameStatus::Draw, _) => "Draw",
        (status, Some(role)) if status.winner() == Some(role) => "You won!",
        (_, Some(_)) => "You lost",
        (GameStatus::WonByWhite, None) => "White won",
        (GameStatus::WonByBlack, None) => "Black won",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::Address;
    use proptest::prelude::*;
    use serde_json::json;

    const ALICE_SS58: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const ALICE_HEX: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const BOB_SS58: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
    const BOB_HEX: &str = "0x8eaf04151687736326c9fea17e25fc5287613693c912909cb226aa4794f26a48";

    fn seated(white: Option<&str>, black: Option<&str>) -> GameSession {
        GameSession::new(PlayersAddresses {
            white: white.map(String::from),
            black: black.map(String::from),
        })
    }

    #[test]
    fn test_resolve_role_across_encodings() {
        // record carries hex, wallet hands out ss58
        let session = seated(Some(ALICE_HEX), Some(BOB_HEX));
        assert_eq!(resolve_role(&session, ALICE_SS58), Ok(Player::White));
        assert_eq!(resolve_role(&session, BOB_SS58), Ok(Player::Black));
    }

    #[test]
    fn test_resolve_role_rejects_outsider() {
        let session = seated(Some(ALICE_HEX), None);
        assert_eq!(resolve_role(&session, BOB_SS58), Err(ModelError::NotAParticipant));

        let session = seated(None, Some(""));
        assert_eq!(resolve_role(&session, ALICE_SS58), Err(ModelError::NotAParticipant));
    }

    #[test]
    fn test_resolve_role_invalid_caller() {
        let session = seated(Some(ALICE_HEX), Some(BOB_HEX));
        assert!(matches!(
            resolve_role(&session, "nonsense"),
            Err(ModelError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_turn_requires_both_seats() {
        let session = seated(Some(ALICE_HEX), None);
        assert!(!is_callers_turn(&session, Some(ALICE_SS58)));
        assert_eq!(
            status_message(&session, view_role(&session, Some(ALICE_SS58))),
            "Waiting for an opponent to join"
        );
    }

    #[test]
    fn test_turn_follows_session_turn() {
        let mut session = seated(Some(ALICE_HEX), Some(BOB_HEX));
        assert!(is_callers_turn(&session, Some(ALICE_SS58)));
        assert!(!is_callers_turn(&session, Some(BOB_SS58)));

        session.turn = Player::Black;
        assert!(!is_callers_turn(&session, Some(ALICE_SS58)));
        assert!(is_callers_turn(&session, Some(BOB_SS58)));
    }

    #[test]
    fn test_turn_degrades_without_account() {
        let session = seated(Some(ALICE_HEX), Some(BOB_HEX));
        assert!(!is_callers_turn(&session, None));
        assert!(!is_callers_turn(&session, Some("garbage")));
        assert_eq!(view_role(&session, None), None);
        assert_eq!(board_orientation(&session, Some(BOB_SS58)), Player::Black);
        assert_eq!(board_orientation(&session, None), Player::White);
    }

    #[test]
    fn test_status_messages() {
        let mut session = seated(Some(ALICE_HEX), Some(BOB_HEX));
        assert_eq!(status_message(&session, Some(Player::White)), "Game in progress");

        session.status = GameStatus::WonByWhite;
        assert_eq!(status_message(&session, Some(Player::White)), "You won!");
        assert_eq!(status_message(&session, Some(Player::Black)), "You lost");
        assert_eq!(status_message(&session, None), "White won");

        session.status = GameStatus::WonByBlack;
        assert_eq!(status_message(&session, Some(Player::Black)), "You won!");
        assert_eq!(status_message(&session, None), "Black won");

        session.status = GameStatus::Stalemate;
        assert_eq!(status_message(&session, Some(Player::Black)), "Stalemate");
        session.status = GameStatus::Draw;
        assert_eq!(status_message(&session, None), "Draw");
    }

    #[test]
    fn test_empty_seats_always_waiting() {
        for status in [
            GameStatus::Ongoing,
            GameStatus::WonByWhite,
            GameStatus::WonByBlack,
            GameStatus::Stalemate,
            GameStatus::Draw,
        ] {
            let mut session = seated(None, None);
            session.status = status;
            assert_eq!(status_message(&session, None), "Waiting for an opponent to join");
            assert!(!is_callers_turn(&session, Some(ALICE_SS58)));
        }
    }

    #[test]
    fn test_session_wire_format() {
        let raw = json!({
            "board": Board::empty(),
            "turn": "Black",
            "players": {"white": ALICE_HEX, "black": null},
            "status": "WonByPlayerWhite",
        });
        let session: GameSession = serde_json::from_value(raw).unwrap();
        assert_eq!(session.turn, Player::Black);
        assert_eq!(session.status, GameStatus::WonByWhite);
        assert_eq!(session.players.seat(Player::Black), None);

        let alias: GameStatus = serde_json::from_value(json!("WonByBlack")).unwrap();
        assert_eq!(alias, GameStatus::WonByBlack);
    }

    proptest! {
        #[test]
        fn prop_exactly_one_seat_to_move(
            white in prop::array::uniform32(any::<u8>()),
            black in prop::array::uniform32(any::<u8>()),
            black_to_move in any::<bool>(),
        ) {
            prop_assume!(white != black);
            let white = Address::new(white);
            let black = Address::new(black);
            let mut session = seated(Some(&white.to_hex()), Some(&black.to_hex()));
            session.turn = if black_to_move { Player::Black } else { Player::White };

            let w = is_callers_turn(&session, Some(&white.canonical()));
            let b = is_callers_turn(&session, Some(&black.canonical()));
            prop_assert!(w ^ b);
            prop_assert_eq!(b, black_to_move);
        }
    }
}
