//! In-Memory Backend
//!
//! An in-process stand-in for the contract, shared by any number of signer
//! handles. It reproduces the seat, turn and ownership rules the contract
//! enforces, rejects finished games, and tracks sessions per player. Move
//! legality and game-end detection go through `shakmaty`.
//!
//! Faults can be injected to exercise transport failures, and reads and
//! moves can be delayed to exercise stale responses and pending moves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shakmaty::{fen::Fen, CastlingMode, Chess, Position};
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::address::Address;
use crate::core::envelope::Envelope;
use crate::game::board::{ChessMove, Player};
use crate::game::notation::to_board_notation;
use crate::game::preview::{apply_move, is_legal_move};
use crate::game::session::{GameSession, GameStatus, PlayersAddresses, SessionId};
use crate::network::backend::{BackendConnector, BackendError, ChessBackend};
use crate::network::protocol::MAX_TRACKED_SESSIONS;

/// Contract rejection reasons, spelled as the contract spells them.
pub mod reject {
    /// Unknown session id.
    pub const NOT_FOUND: &str = "NoElementFoundInDB";
    /// Caller already seated in the session.
    pub const ALREADY_IN_SESSION: &str = "AlreadyInThisGameSession";
    /// Both seats taken.
    pub const SESSION_FULL: &str = "ThisSessionContainsAlreadyTwoPlayers";
    /// Opponent address equals the caller.
    pub const WRONG_OPPONENT: &str = "WrongPlayerAddressArgument";
    /// Move on a session with an open seat.
    pub const NEEDS_SECOND_PLAYER: &str = "SessionNeedsSecondPlayer";
    /// Move on a finished session.
    pub const GAME_OVER: &str = "GameSessionIsOver";
    /// Caller not seated.
    pub const NOT_IN_SESSION: &str = "NotInThisGameSession";
    /// Caller seated but not to move.
    pub const NOT_YOUR_TURN: &str = "NotYourTurn";
    /// Source square empty.
    pub const NO_PIECE: &str = "NoPieceBoardChessFrom";
    /// Source piece belongs to the opponent.
    pub const NOT_YOUR_PIECE: &str = "PieceSelectedIsNotYours";
    /// Target square holds an own piece.
    pub const OWN_PIECE_ON_TARGET: &str = "ToIsOccupiedByOneOfYourPiece";
    /// Move breaks piece movement rules or leaves the king in check.
    pub const INVALID_MOVE: &str = "NonValidMove";
}

/// Injected behaviour for upcoming calls.
#[derive(Debug, Default)]
struct Faults {
    /// Number of upcoming calls that fail at the outer layer.
    fail_next: usize,
    /// Message for injected failures.
    message: String,
    /// Delay applied to `get_session` calls.
    fetch_delay: Option<Duration>,
    /// Delay applied to `make_move` calls before the move is judged.
    move_delay: Option<Duration>,
}

/// State shared by all handles.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<BTreeMap<SessionId, GameSession>>,
    tracks: RwLock<BTreeMap<Address, Vec<SessionId>>>,
    faults: RwLock<Faults>,
    calls: RwLock<BTreeMap<&'static str, usize>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Handle bound to `signer`.
    pub fn backend(self: &Arc<Self>, signer: Address) -> MemoryBackend {
        MemoryBackend { store: self.clone(), signer }
    }

    /// Make the next `count` calls fail at the outer layer.
    pub async fn fail_next_calls(&self, count: usize, message: impl Into<String>) {
        let mut faults = self.faults.write().await;
        faults.fail_next = count;
        faults.message = message.into();
    }

    /// Delay every `get_session` call.
    pub async fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.faults.write().await.fetch_delay = delay;
    }

    /// Delay every `make_move` call.
    pub async fn set_move_delay(&self, delay: Option<Duration>) {
        self.faults.write().await.move_delay = delay;
    }

    /// Number of calls of any method so far.
    pub async fn total_calls(&self) -> usize {
        self.calls.read().await.values().sum()
    }

    /// Number of calls to `method` so far.
    pub async fn call_count(&self, method: &str) -> usize {
        self.calls.read().await.get(method).copied().unwrap_or(0)
    }

    /// Read a session directly, bypassing the call log.
    pub async fn peek(&self, id: &SessionId) -> Option<GameSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Overwrite a session directly.
    pub async fn put(&self, id: SessionId, session: GameSession) {
        self.sessions.write().await.insert(id, session);
    }

    async fn enter(&self, method: &'static str) -> Result<(), String> {
        *self.calls.write().await.entry(method).or_default() += 1;
        let mut faults = self.faults.write().await;
        if faults.fail_next > 0 {
            faults.fail_next -= 1;
            return Err(faults.message.clone());
        }
        Ok(())
    }

    async fn track(&self, player: Address, id: &SessionId) {
        let mut tracks = self.tracks.write().await;
        let sessions = tracks.entry(player).or_default();
        if !sessions.contains(id) {
            sessions.push(id.clone());
        }
    }
}

/// A [`ChessBackend`] bound to one signer.
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    signer: Address,
}

impl MemoryBackend {
    /// Shared store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn seated_as(&self, session: &GameSession) -> Option<Player> {
        [Player::White, Player::Black].into_iter().find(|side| {
            session
                .players
                .seat(*side)
                .and_then(|s| s.parse::<Address>().ok())
                .is_some_and(|a| a == self.signer)
        })
    }
}

/// Check a move against the contract's rules; on success return the
/// session after the move.
fn play(session: &GameSession, seat: Option<Player>, mv: ChessMove) -> Result<GameSession, &'static str> {
    if !session.players.is_full() {
        return Err(reject::NEEDS_SECOND_PLAYER);
    }
    if session.status.is_over() {
        return Err(reject::GAME_OVER);
    }
    let Some(seat) = seat else {
        return Err(reject::NOT_IN_SESSION);
    };
    if seat != session.turn {
        return Err(reject::NOT_YOUR_TURN);
    }

    let moving = session.board.get(mv.from).ok_or(reject::NO_PIECE)?;
    if moving.owner != session.turn {
        return Err(reject::NOT_YOUR_PIECE);
    }
    if session.board.get(mv.to).is_some_and(|c| c.owner == moving.owner) {
        return Err(reject::OWN_PIECE_ON_TARGET);
    }
    if !is_legal_move(session, mv) {
        return Err(reject::INVALID_MOVE);
    }

    let mut next = apply_move(session, mv);
    next.status = status_after(&next, session.turn);
    // a won game stays on the winner's turn
    if next.status.winner().is_some() {
        next.turn = session.turn;
    }
    Ok(next)
}

fn status_after(next: &GameSession, mover: Player) -> GameStatus {
    let position: Option<Chess> = to_board_notation(next)
        .parse::<Fen>()
        .ok()
        .and_then(|fen| fen.into_position(CastlingMode::Standard).ok());

    match position {
        Some(pos) if pos.is_checkmate() => match mover {
            Player::White => GameStatus::WonByWhite,
            Player::Black => GameStatus::WonByBlack,
        },
        Some(pos) if pos.is_stalemate() => GameStatus::Stalemate,
        Some(pos) if pos.is_insufficient_material() => GameStatus::Draw,
        _ => GameStatus::Ongoing,
    }
}

#[async_trait]
impl ChessBackend for MemoryBackend {
    async fn list_sessions(&self) -> Envelope<Vec<SessionId>> {
        if let Err(e) = self.store.enter("list_sessions").await {
            return Envelope::failed(e);
        }
        let tracks = self.store.tracks.read().await;
        let sessions: Vec<SessionId> = tracks
            .get(&self.signer)
            .map(|s| s.iter().take(MAX_TRACKED_SESSIONS).cloned().collect())
            .unwrap_or_default();
        Envelope::success(sessions)
    }

    async fn create_session(
        &self,
        player: Option<Player>,
        opponent: Option<Address>,
    ) -> Envelope<SessionId> {
        if let Err(e) = self.store.enter("create_session").await {
            return Envelope::failed(e);
        }
        if opponent == Some(self.signer) {
            return Envelope::rejected(reject::WRONG_OPPONENT);
        }

        let me = Some(self.signer.to_hex());
        let other = opponent.map(|a| a.to_hex());
        let players = match player.unwrap_or(Player::White) {
            Player::White => PlayersAddresses { white: me, black: other },
            Player::Black => PlayersAddresses { white: other, black: me },
        };

        let n = self.store.next_id.fetch_add(1, Ordering::SeqCst);
        let id = SessionId::new(format!("{:024x}", n + 1));
        self.store
            .sessions
            .write()
            .await
            .insert(id.clone(), GameSession::new(players));

        self.store.track(self.signer, &id).await;
        if let Some(opponent) = opponent {
            self.store.track(opponent, &id).await;
        }
        debug!("memory backend created session {}", id);
        Envelope::success(id)
    }

    async fn join_session(&self, session_id: &SessionId) -> Envelope<()> {
        if let Err(e) = self.store.enter("join_session").await {
            return Envelope::failed(e);
        }
        let mut sessions = self.store.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return Envelope::rejected(reject::NOT_FOUND);
        };
        if self.seated_as(session).is_some() {
            return Envelope::rejected(reject::ALREADY_IN_SESSION);
        }

        let me = Some(self.signer.to_hex());
        let white_open = session.players.seat(Player::White).is_none();
        let black_open = session.players.seat(Player::Black).is_none();
        match (white_open, black_open) {
            (true, false) => session.players.white = me,
            (false, true) => session.players.black = me,
            _ => return Envelope::rejected(reject::SESSION_FULL),
        }
        drop(sessions);

        self.store.track(self.signer, session_id).await;
        Envelope::success(())
    }

    async fn get_session(&self, session_id: &SessionId) -> Envelope<GameSession> {
        if let Err(e) = self.store.enter("get_session").await {
            return Envelope::failed(e);
        }
        let delay = self.store.faults.read().await.fetch_delay;
        // snapshot before sleeping so a delayed answer is genuinely stale
        let snapshot = self.store.sessions.read().await.get(session_id).cloned();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match snapshot {
            Some(session) => Envelope::success(session),
            None => Envelope::rejected(reject::NOT_FOUND),
        }
    }

    async fn make_move(&self, chess_move: ChessMove, session_id: &SessionId) -> Envelope<()> {
        if let Err(e) = self.store.enter("make_move").await {
            return Envelope::failed(e);
        }
        let delay = self.store.faults.read().await.move_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut sessions = self.store.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return Envelope::rejected(reject::NOT_FOUND);
        };

        match play(session, self.seated_as(session), chess_move) {
            Ok(next) => {
                *session = next;
                Envelope::success(())
            }
            Err(reason) => Envelope::rejected(reason),
        }
    }
}

/// Connector handing out [`MemoryBackend`] handles.
///
/// Every network URL maps to its own store so that switching networks
/// really switches state. An optional delay simulates slow connection setup.
#[derive(Default)]
pub struct MemoryConnector {
    networks: RwLock<BTreeMap<String, Arc<MemoryStore>>>,
    connect_delay: RwLock<Option<Duration>>,
}

impl MemoryConnector {
    /// Create a connector with no networks yet.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store backing `network_url` (created on first use).
    pub async fn store(&self, network_url: &str) -> Arc<MemoryStore> {
        self.networks
            .write()
            .await
            .entry(network_url.to_string())
            .or_insert_with(MemoryStore::new)
            .clone()
    }

    /// Delay every subsequent `connect`.
    pub async fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.connect_delay.write().await = delay;
    }
}

#[async_trait]
impl BackendConnector for MemoryConnector {
    async fn connect(
        &self,
        network_url: &str,
        signer: Address,
    ) -> Result<Arc<dyn ChessBackend>, BackendError> {
        let delay = *self.connect_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !network_url.starts_with("mem://") {
            return Err(BackendError::Connect(format!("unsupported url {network_url}")));
        }
        let store = self.store(network_url).await;
        Ok(Arc::new(store.backend(signer)))
    }
}
