//! Session Client
//!
//! One backend connection bound to one signing identity. Each operation
//! sends a single contract call and hands the raw envelope to
//! [`unwrap`](crate::core::envelope::unwrap); nothing is retried here.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::address::{Address, AddressError};
use crate::core::envelope::{unwrap, EnvelopeError};
use crate::game::board::{ChessLocation, ChessMove, Player};
use crate::game::session::{GameSession, SessionId};
use crate::network::backend::{BackendConnector, ChessBackend};

/// Cache partition key: network URL plus canonical signer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Build the key for an identity.
    pub fn new(network_url: &str, signer: &Address) -> Self {
        Self(format!("{}-{}", network_url, signer.canonical()))
    }

    /// Key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The call failed or was rejected.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// An address argument could not be decoded.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// No backend could be opened for the identity.
    #[error("failed to connect: {0}")]
    Connect(String),
}

impl ClientError {
    /// Outer-layer failure: contract state unknown, safe to try again later.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Envelope(e) if e.is_transport())
    }

    /// Inner-layer failure: the contract said no.
    pub fn is_application(&self) -> bool {
        matches!(self, ClientError::Envelope(e) if e.is_application())
    }
}

/// Contract operations for one `(network, signer)` identity.
pub struct SessionClient {
    backend: Arc<dyn ChessBackend>,
    network_url: String,
    signer: Address,
    client_id: ClientId,
}

impl fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient")
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl SessionClient {
    /// Bind an already connected backend to `signer`.
    pub fn new(backend: Arc<dyn ChessBackend>, network_url: &str, signer: Address) -> Self {
        Self {
            backend,
            network_url: network_url.to_string(),
            client_id: ClientId::new(network_url, &signer),
            signer,
        }
    }

    /// Normalize `account`, open a backend through `connector`, bind both.
    pub async fn connect(
        connector: &dyn BackendConnector,
        network_url: &str,
        account: &str,
    ) -> Result<Self, ClientError> {
        let signer: Address = account.parse()?;
        let backend = connector
            .connect(network_url, signer)
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        Ok(Self::new(backend, network_url, signer))
    }

    /// Cache partition key for this identity.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Signing account.
    pub fn signer(&self) -> &Address {
        &self.signer
    }

    /// Network this client talks to.
    pub fn network_url(&self) -> &str {
        &self.network_url
    }

    /// Sessions the signer takes part in.
    #[instrument(skip(self), fields(client = %self.client_id))]
    pub async fn list_sessions(&self) -> Result<Vec<SessionId>, ClientError> {
        let sessions = unwrap(self.backend.list_sessions().await)?;
        debug!("listed {} sessions", sessions.len());
        Ok(sessions)
    }

    /// Start a session. `role` and `opponent` are hints the contract may use.
    #[instrument(skip(self), fields(client = %self.client_id))]
    pub async fn create_session(
        &self,
        role: Option<Player>,
        opponent: Option<&str>,
    ) -> Result<SessionId, ClientError> {
        let opponent = opponent.map(str::parse::<Address>).transpose()?;
        let id = unwrap(self.backend.create_session(role, opponent).await)?;
        debug!("created session {}", id);
        Ok(id)
    }

    /// Take the open seat of `id`.
    #[instrument(skip(self), fields(client = %self.client_id))]
    pub async fn join_session(&self, id: &SessionId) -> Result<(), ClientError> {
        unwrap(self.backend.join_session(id).await)?;
        debug!("joined session {}", id);
        Ok(())
    }

    /// One authoritative snapshot of `id`.
    #[instrument(skip(self), fields(client = %self.client_id))]
    pub async fn fetch_session(&self, id: &SessionId) -> Result<GameSession, ClientError> {
        Ok(unwrap(self.backend.get_session(id).await)?)
    }

    /// Submit a move. The contract judges legality.
    #[instrument(skip(self), fields(client = %self.client_id))]
    pub async fn submit_move(
        &self,
        id: &SessionId,
        from: ChessLocation,
        to: ChessLocation,
    ) -> Result<(), ClientError> {
        unwrap(self.backend.make_move(ChessMove::new(from, to), id).await)?;
        debug!("move {} -> {} accepted in {}", from.to_square(), to.to_square(), id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::session::GameStatus;
    use crate::network::memory::{reject, MemoryConnector, MemoryStore};

    const ALICE_SS58: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const ALICE_HEX: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const BOB_SS58: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

    fn sq(s: &str) -> ChessLocation {
        ChessLocation::from_square(s).unwrap()
    }

    fn client(store: &Arc<MemoryStore>, account: &str) -> SessionClient {
        let signer: Address = account.parse().unwrap();
        SessionClient::new(Arc::new(store.backend(signer)), "mem://local", signer)
    }

    #[test]
    fn test_client_id_is_encoding_agnostic() {
        let store = MemoryStore::new();
        let a = client(&store, ALICE_SS58);
        let b = client(&store, ALICE_HEX);
        assert_eq!(a.client_id(), b.client_id());
        assert_eq!(a.client_id().as_str(), format!("mem://local-{ALICE_SS58}"));
    }

    #[tokio::test]
    async fn test_full_flow() {
        let store = MemoryStore::new();
        let alice = client(&store, ALICE_SS58);
        let bob = client(&store, BOB_SS58);

        let id = alice.create_session(Some(Player::White), None).await.unwrap();
        bob.join_session(&id).await.unwrap();
        alice.submit_move(&id, sq("e2"), sq("e4")).await.unwrap();

        let session = bob.fetch_session(&id).await.unwrap();
        assert_eq!(session.turn, Player::Black);
        assert_eq!(bob.list_sessions().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_opponent_hint_accepts_any_encoding() {
        let store = MemoryStore::new();
        let alice = client(&store, ALICE_SS58);
        let id = alice
            .create_session(Some(Player::Black), Some(BOB_SS58))
            .await
            .unwrap();
        let session = alice.fetch_session(&id).await.unwrap();
        assert!(session.players.is_full());

        let err = alice.create_session(None, Some("bogus")).await.unwrap_err();
        assert!(matches!(err, ClientError::Address(_)));
        // rejected before any call
        assert_eq!(store.call_count("create_session").await, 1);
    }

    #[tokio::test]
    async fn test_finished_game_still_calls_backend() {
        let store = MemoryStore::new();
        let alice = client(&store, ALICE_SS58);
        let id = alice.create_session(None, Some(BOB_SS58)).await.unwrap();

        let mut finished = store.peek(&id).await.unwrap();
        finished.status = GameStatus::Draw;
        store.put(id.clone(), finished.clone()).await;

        let err = alice.submit_move(&id, sq("e2"), sq("e4")).await.unwrap_err();
        assert!(err.is_application());
        assert_eq!(err, ClientError::Envelope(EnvelopeError::InnerApplication(reject::GAME_OVER.into())));
        assert_eq!(store.call_count("make_move").await, 1);
        assert_eq!(store.peek(&id).await.unwrap(), finished);
    }

    #[tokio::test]
    async fn test_transport_failure_not_retried() {
        let store = MemoryStore::new();
        let alice = client(&store, ALICE_SS58);
        store.fail_next_calls(1, "connection reset").await;

        let err = alice.create_session(None, None).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(store.call_count("create_session").await, 1);
        assert!(alice.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_through_connector() {
        let connector = MemoryConnector::new();
        let alice = SessionClient::connect(connector.as_ref(), "mem://local", ALICE_HEX)
            .await
            .unwrap();
        assert_eq!(alice.signer().canonical(), ALICE_SS58);
        assert_eq!(alice.network_url(), "mem://local");

        let err = SessionClient::connect(connector.as_ref(), "mem://local", "???")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Address(_)));

        let err = SessionClient::connect(connector.as_ref(), "ws://elsewhere", ALICE_HEX)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Connect(_)));
    }
}
