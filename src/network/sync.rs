//! Synchronization Hook
//!
//! Keeps a cached view of remote sessions for the identity the UI has
//! selected, and reconciles it with the backend.
//!
//! ## Identity
//!
//! ```text
//! Uninitialized ──set_identity──► (pending) ──connected──► Ready(client_id)
//!       ▲                                                        │
//!       └────────────── identity changed / cleared ──────────────┘
//! ```
//!
//! Every identity change bumps a generation counter. Any response (client
//! construction, list fetch, session fetch) issued under an older
//! generation is dropped on arrival.
//!
//! ## Queries
//!
//! - Session list: fetched on `Ready`, refetched after invalidation.
//! - Selected session: polled every [`SyncConfig::poll_interval`].
//!
//! ## Optimistic moves
//!
//! Two slots per selected session: the last authoritative snapshot and a
//! pending projection. An authoritative snapshot always replaces the
//! projection; a failed move simply drops it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::core::address::Address;
use crate::game::board::{ChessLocation, ChessMove, Player};
use crate::game::notation::to_board_notation;
use crate::game::preview::{preview_move, Projection};
use crate::game::session::{
    board_orientation, is_callers_turn, status_message, view_role, GameSession, SessionId,
};
use crate::network::backend::BackendConnector;
use crate::network::client::{ClientError, ClientId, SessionClient};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Synchronization configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Refetch period of the selected session.
    pub poll_interval: Duration,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(crate::POLL_INTERVAL_MS),
            event_capacity: 64,
        }
    }
}

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// Identity state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No usable client; queries and mutations are disabled.
    Uninitialized,
    /// A client exists for this identity.
    Ready(ClientId),
}

/// Synchronization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No client for the current identity. Nothing was sent.
    #[error("no client for the current identity")]
    NotReady,

    /// The operation needs a selected session.
    #[error("no session selected")]
    NoSessionSelected,

    /// The backend call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The identity or selection changed while the call was in flight;
    /// its result was discarded.
    #[error("superseded by a newer identity or selection")]
    Superseded,
}

/// Notifications for the UI.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// Identity state changed.
    IdentityChanged(SyncState),
    /// The cached session list was replaced.
    SessionsUpdated(Vec<SessionId>),
    /// The selected session's view changed.
    SessionUpdated(SessionId),
    /// A query failed; the cache was kept.
    QueryFailed {
        /// Operation name.
        query: &'static str,
        /// Failure.
        error: ClientError,
    },
    /// A mutation failed; the cache was kept.
    MutationFailed {
        /// Operation name.
        mutation: &'static str,
        /// Failure.
        error: ClientError,
    },
}

/// What the UI renders for the selected session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionView {
    /// Selected session.
    pub session_id: SessionId,
    /// Session to display: the projection if one is pending, else the snapshot.
    pub session: GameSession,
    /// Last authoritative snapshot.
    pub authoritative: GameSession,
    /// Move behind the displayed projection, if any.
    pub pending_move: Option<ChessMove>,
    /// Board notation of `session`.
    pub notation: String,
    /// Caller's seat, if seated.
    pub role: Option<Player>,
    /// Side to draw at the bottom.
    pub orientation: Player,
    /// Whether the caller may move now.
    pub callers_turn: bool,
    /// Human-readable status.
    pub status_message: &'static str,
    /// When the snapshot arrived.
    pub fetched_at: DateTime<Utc>,
    /// Whether the snapshot has been invalidated since.
    pub stale: bool,
}

// =============================================================================
// SHARED STATE
// =============================================================================

#[derive(Clone, Debug)]
struct Cached<T> {
    value: T,
    fetched_at: DateTime<Utc>,
    stale: bool,
}

impl<T> Cached<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
            stale: false,
        }
    }
}

#[derive(Default)]
struct Inner {
    generation: u64,
    pending: Option<ClientId>,
    client: Option<Arc<SessionClient>>,
    sessions: Option<Cached<Vec<SessionId>>>,
    selected: Option<SessionId>,
    session: Option<Cached<GameSession>>,
    optimistic: Option<Projection>,
    poller: Option<JoinHandle<()>>,
}

impl Inner {
    fn ready(&self) -> Result<(Arc<SessionClient>, u64), SyncError> {
        self.client
            .clone()
            .map(|c| (c, self.generation))
            .ok_or(SyncError::NotReady)
    }

    fn state(&self) -> SyncState {
        match &self.client {
            Some(client) => SyncState::Ready(client.client_id().clone()),
            None => SyncState::Uninitialized,
        }
    }

    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }

    /// Drop everything keyed by the current identity and invalidate
    /// in-flight work.
    fn teardown(&mut self) {
        self.stop_polling();
        self.generation += 1;
        self.pending = None;
        self.client = None;
        self.sessions = None;
        self.selected = None;
        self.session = None;
        self.optimistic = None;
    }

    fn account(&self) -> Option<String> {
        self.client.as_ref().map(|c| c.signer().canonical())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

struct Shared {
    config: SyncConfig,
    inner: RwLock<Inner>,
    events: broadcast::Sender<SyncEvent>,
}

impl Shared {
    fn emit(&self, event: SyncEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn start_polling(self: &Arc<Self>, inner: &mut Inner, id: SessionId) {
        inner.stop_polling();
        debug!("polling {} every {:?}", id, self.config.poll_interval);
        inner.poller = Some(spawn_poller(
            Arc::downgrade(self),
            id,
            self.config.poll_interval,
        ));
    }

    async fn reset(&self) {
        let mut inner = self.inner.write().await;
        let was_active = inner.client.is_some() || inner.pending.is_some();
        inner.teardown();
        drop(inner);
        if was_active {
            info!("identity cleared");
            self.emit(SyncEvent::IdentityChanged(SyncState::Uninitialized));
        }
    }

    async fn refresh_sessions(&self) -> Result<Vec<SessionId>, SyncError> {
        let (client, generation) = self.inner.read().await.ready()?;
        let result = client.list_sessions().await;

        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            debug!("dropping session list for superseded {}", client.client_id());
            return Err(SyncError::Superseded);
        }
        match result {
            Ok(sessions) => {
                inner.sessions = Some(Cached::new(sessions.clone()));
                drop(inner);
                self.emit(SyncEvent::SessionsUpdated(sessions.clone()));
                Ok(sessions)
            }
            Err(error) => {
                drop(inner);
                warn!("session list failed: {}", error);
                self.emit(SyncEvent::QueryFailed {
                    query: "list_sessions",
                    error: error.clone(),
                });
                Err(error.into())
            }
        }
    }

    async fn fetch_session(&self, id: &SessionId) -> Result<GameSession, SyncError> {
        let (client, generation) = {
            let inner = self.inner.read().await;
            let ready = inner.ready()?;
            if inner.selected.as_ref() != Some(id) {
                return Err(SyncError::NoSessionSelected);
            }
            ready
        };
        let result = client.fetch_session(id).await;

        let mut inner = self.inner.write().await;
        if inner.generation != generation || inner.selected.as_ref() != Some(id) {
            debug!("dropping stale snapshot of {} for {}", id, client.client_id());
            return Err(SyncError::Superseded);
        }
        match result {
            Ok(session) => {
                inner.session = Some(Cached::new(session.clone()));
                if inner.optimistic.take().is_some() {
                    debug!("snapshot of {} replaced pending projection", id);
                }
                drop(inner);
                self.emit(SyncEvent::SessionUpdated(id.clone()));
                Ok(session)
            }
            Err(error) => {
                drop(inner);
                warn!("fetch of {} failed: {}", id, error);
                self.emit(SyncEvent::QueryFailed {
                    query: "fetch_session",
                    error: error.clone(),
                });
                Err(error.into())
            }
        }
    }

    async fn invalidate_sessions(&self, generation: u64) {
        {
            let mut inner = self.inner.write().await;
            if inner.generation != generation {
                return;
            }
            if let Some(cached) = inner.sessions.as_mut() {
                cached.stale = true;
            }
        }
        if let Err(e) = self.refresh_sessions().await {
            debug!("refetch after invalidation failed: {}", e);
        }
    }

    async fn invalidate_session(&self, generation: u64, id: &SessionId) {
        {
            let mut inner = self.inner.write().await;
            if inner.generation != generation || inner.selected.as_ref() != Some(id) {
                return;
            }
            if let Some(cached) = inner.session.as_mut() {
                cached.stale = true;
            }
        }
        if let Err(e) = self.fetch_session(id).await {
            debug!("refetch of {} after invalidation failed: {}", id, e);
        }
    }

    async fn project(&self, generation: u64, id: &SessionId, chess_move: ChessMove) {
        let mut inner = self.inner.write().await;
        if inner.generation != generation || inner.selected.as_ref() != Some(id) {
            return;
        }
        let Some(cached) = inner.session.as_ref() else {
            return;
        };
        let account = inner.account();
        match preview_move(&cached.value, account.as_deref(), chess_move) {
            Ok(projection) => {
                inner.optimistic = Some(projection);
                drop(inner);
                self.emit(SyncEvent::SessionUpdated(id.clone()));
            }
            Err(e) => debug!("no projection for {}: {}", id, e),
        }
    }

    async fn abandon_projection(&self, generation: u64, id: &SessionId, chess_move: ChessMove) {
        let mut inner = self.inner.write().await;
        if inner.generation != generation || inner.selected.as_ref() != Some(id) {
            return;
        }
        if inner
            .optimistic
            .as_ref()
            .is_some_and(|p| p.chess_move == chess_move)
        {
            inner.optimistic = None;
            drop(inner);
            self.emit(SyncEvent::SessionUpdated(id.clone()));
        }
    }

    fn mutation_failed(&self, mutation: &'static str, error: ClientError) -> SyncError {
        warn!("{} failed: {}", mutation, error);
        self.emit(SyncEvent::MutationFailed {
            mutation,
            error: error.clone(),
        });
        error.into()
    }
}

fn spawn_poller(shared: Weak<Shared>, id: SessionId, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            match shared.fetch_session(&id).await {
                Ok(_) | Err(SyncError::Client(_)) => {}
                Err(e) => {
                    debug!("polling of {} stopped: {}", id, e);
                    break;
                }
            }
        }
    })
}

// =============================================================================
// GAME SYNC
// =============================================================================

/// Cached, polled view of the backend for the selected identity.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct GameSync {
    connector: Arc<dyn BackendConnector>,
    shared: Arc<Shared>,
}

impl GameSync {
    /// Create an uninitialized hook.
    pub fn new(connector: Arc<dyn BackendConnector>, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            connector,
            shared: Arc::new(Shared {
                config,
                inner: RwLock::new(Inner::default()),
                events,
            }),
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Current identity state.
    pub async fn state(&self) -> SyncState {
        self.shared.inner.read().await.state()
    }

    /// Select the identity to sync for; `None` clears it.
    ///
    /// The same identity in any address encoding is a no-op, and so is a
    /// repeat while its client is still being constructed. A construction
    /// overtaken by a newer identity returns [`SyncError::Superseded`].
    #[instrument(skip(self))]
    pub async fn set_identity(
        &self,
        network_url: &str,
        account: Option<&str>,
    ) -> Result<SyncState, SyncError> {
        let signer = match account.map(str::parse::<Address>).transpose() {
            Ok(Some(signer)) => signer,
            Ok(None) => {
                self.shared.reset().await;
                return Ok(SyncState::Uninitialized);
            }
            Err(e) => {
                self.shared.reset().await;
                return Err(ClientError::from(e).into());
            }
        };
        let client_id = ClientId::new(network_url, &signer);

        let generation = {
            let mut inner = self.shared.inner.write().await;
            if inner
                .client
                .as_ref()
                .is_some_and(|c| c.client_id() == &client_id)
            {
                return Ok(SyncState::Ready(client_id));
            }
            if inner.pending.as_ref() == Some(&client_id) {
                debug!("client for {} already pending", client_id);
                return Ok(SyncState::Uninitialized);
            }
            inner.teardown();
            inner.pending = Some(client_id.clone());
            inner.generation
        };
        self.shared
            .emit(SyncEvent::IdentityChanged(SyncState::Uninitialized));
        info!("connecting as {}", client_id);

        let connected = self.connector.connect(network_url, signer).await;

        {
            let mut inner = self.shared.inner.write().await;
            if inner.generation != generation {
                debug!("discarding superseded client for {}", client_id);
                return Err(SyncError::Superseded);
            }
            inner.pending = None;
            let backend = match connected {
                Ok(backend) => backend,
                Err(e) => {
                    warn!("connect as {} failed: {}", client_id, e);
                    return Err(ClientError::Connect(e.to_string()).into());
                }
            };
            inner.client = Some(Arc::new(SessionClient::new(backend, network_url, signer)));
            if let Some(id) = inner.selected.clone() {
                self.shared.start_polling(&mut inner, id);
            }
        }
        info!("ready as {}", client_id);
        self.shared
            .emit(SyncEvent::IdentityChanged(SyncState::Ready(client_id.clone())));

        if let Err(e) = self.shared.refresh_sessions().await {
            debug!("initial session list failed: {}", e);
        }
        Ok(SyncState::Ready(client_id))
    }

    // ===== QUERIES =====

    /// Cached session list, if fetched.
    pub async fn sessions(&self) -> Option<Vec<SessionId>> {
        self.shared
            .inner
            .read()
            .await
            .sessions
            .as_ref()
            .map(|c| c.value.clone())
    }

    /// Refetch the session list now.
    pub async fn refresh_sessions(&self) -> Result<Vec<SessionId>, SyncError> {
        self.shared.refresh_sessions().await
    }

    /// Currently selected session.
    pub async fn selected(&self) -> Option<SessionId> {
        self.shared.inner.read().await.selected.clone()
    }

    /// Select a session to poll, or `None` to stop polling.
    ///
    /// Responses still in flight for the previous selection are dropped.
    pub async fn select_session(&self, id: Option<SessionId>) {
        let mut inner = self.shared.inner.write().await;
        if inner.selected == id {
            return;
        }
        inner.stop_polling();
        inner.session = None;
        inner.optimistic = None;
        inner.selected = id.clone();

        match id {
            Some(id) if inner.client.is_some() => self.shared.start_polling(&mut inner, id),
            Some(id) => debug!("selected {} before ready; polling deferred", id),
            None => debug!("selection cleared"),
        }
    }

    /// Refetch the selected session now.
    pub async fn refresh_session(&self) -> Result<GameSession, SyncError> {
        let id = {
            let inner = self.shared.inner.read().await;
            inner.ready()?;
            inner.selected.clone().ok_or(SyncError::NoSessionSelected)?
        };
        self.shared.fetch_session(&id).await
    }

    /// Render model of the selected session, once a snapshot has arrived.
    pub async fn session_view(&self) -> Option<SessionView> {
        let inner = self.shared.inner.read().await;
        let session_id = inner.selected.clone()?;
        let cached = inner.session.as_ref()?;
        let account = inner.account();
        let account = account.as_deref();

        let (session, pending_move, notation) = match &inner.optimistic {
            Some(p) => (p.session.clone(), Some(p.chess_move), p.notation.clone()),
            None => (cached.value.clone(), None, to_board_notation(&cached.value)),
        };
        let role = view_role(&session, account);

        Some(SessionView {
            session_id,
            notation,
            role,
            orientation: board_orientation(&session, account),
            callers_turn: is_callers_turn(&session, account),
            status_message: status_message(&session, role),
            authoritative: cached.value.clone(),
            pending_move,
            fetched_at: cached.fetched_at,
            stale: cached.stale,
            session,
        })
    }

    // ===== MUTATIONS =====

    /// Create a session and refresh the list.
    pub async fn create_session(
        &self,
        role: Option<Player>,
        opponent: Option<&str>,
    ) -> Result<SessionId, SyncError> {
        let (client, generation) = self.shared.inner.read().await.ready()?;
        match client.create_session(role, opponent).await {
            Ok(id) => {
                self.shared.invalidate_sessions(generation).await;
                Ok(id)
            }
            Err(error) => Err(self.shared.mutation_failed("create_session", error)),
        }
    }

    /// Join a session and refresh the list and, if selected, the session.
    pub async fn join_session(&self, id: &SessionId) -> Result<(), SyncError> {
        let (client, generation) = self.shared.inner.read().await.ready()?;
        match client.join_session(id).await {
            Ok(()) => {
                self.shared.invalidate_sessions(generation).await;
                self.shared.invalidate_session(generation, id).await;
                Ok(())
            }
            Err(error) => Err(self.shared.mutation_failed("join_session", error)),
        }
    }

    /// Submit a move.
    ///
    /// If `id` is selected and the move passes local checks, its projection
    /// is displayed until the next snapshot. The call is sent either way.
    pub async fn submit_move(
        &self,
        id: &SessionId,
        from: ChessLocation,
        to: ChessLocation,
    ) -> Result<(), SyncError> {
        let (client, generation) = self.shared.inner.read().await.ready()?;
        let chess_move = ChessMove::new(from, to);
        self.shared.project(generation, id, chess_move).await;

        match client.submit_move(id, from, to).await {
            Ok(()) => {
                self.shared.invalidate_session(generation, id).await;
                Ok(())
            }
            Err(error) => {
                self.shared.abandon_projection(generation, id, chess_move).await;
                Err(self.shared.mutation_failed("submit_move", error))
            }
        }
    }
}
