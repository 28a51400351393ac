//! Contract Backend
//!
//! The seam between the session client and whatever executes contract
//! calls. Implementations never return a Rust error for a failed call:
//! transport faults are folded into the outer layer of the envelope so that
//! every outcome passes through [`crate::core::envelope::unwrap`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::address::Address;
use crate::core::envelope::{decode_envelope, Envelope};
use crate::game::board::{ChessMove, Player};
use crate::game::session::{GameSession, SessionId};
use crate::network::protocol::{CallRequest, CallResponse, ContractCall};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Backend connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the contract gateway.
    pub network_url: String,
    /// Deployed contract id.
    pub contract_id: String,
    /// How long to wait for a single call.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network_url: "ws://127.0.0.1:9944".to_string(),
            contract_id: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            network_url: std::env::var("OH_MY_CHESS_RPC_URL").unwrap_or(defaults.network_url),
            contract_id: std::env::var("OH_MY_CHESS_CONTRACT_ID").unwrap_or(defaults.contract_id),
            request_timeout: std::env::var("OH_MY_CHESS_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

/// Errors establishing a backend connection.
#[derive(Debug, Error)]
pub enum BackendError {
    /// WebSocket connect/handshake failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection refused for another reason.
    #[error("connection failed: {0}")]
    Connect(String),
}

// =============================================================================
// TRAITS
// =============================================================================

/// Raw contract calls, bound to one signing identity.
#[async_trait]
pub trait ChessBackend: Send + Sync {
    /// Sessions tracked for the signer.
    async fn list_sessions(&self) -> Envelope<Vec<SessionId>>;

    /// Start a session, optionally choosing a seat and pre-seating an opponent.
    async fn create_session(
        &self,
        player: Option<Player>,
        opponent: Option<Address>,
    ) -> Envelope<SessionId>;

    /// Take the open seat.
    async fn join_session(&self, session_id: &SessionId) -> Envelope<()>;

    /// One authoritative snapshot.
    async fn get_session(&self, session_id: &SessionId) -> Envelope<GameSession>;

    /// Submit a move.
    async fn make_move(&self, chess_move: ChessMove, session_id: &SessionId) -> Envelope<()>;
}

/// Builds a backend for a `(network, signer)` pair.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Open a connection bound to `signer`.
    async fn connect(
        &self,
        network_url: &str,
        signer: Address,
    ) -> Result<Arc<dyn ChessBackend>, BackendError>;
}

// =============================================================================
// WEBSOCKET BACKEND
// =============================================================================

/// In-flight calls by correlation id.
#[derive(Default)]
struct Pending {
    /// Set once the reader has stopped; no answer can arrive after that.
    closed: bool,
    calls: HashMap<Uuid, oneshot::Sender<Value>>,
}

type PendingCalls = Arc<Mutex<Pending>>;

/// JSON-over-WebSocket contract gateway client.
pub struct WsBackend {
    signer: Address,
    contract_id: String,
    request_timeout: Duration,
    outgoing: mpsc::Sender<String>,
    pending: PendingCalls,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsBackend {
    /// Connect to `network_url` and spawn the reader/writer tasks.
    pub async fn connect(
        network_url: &str,
        config: &ClientConfig,
        signer: Address,
    ) -> Result<Self, BackendError> {
        info!("Connecting to {}...", network_url);
        let (ws_stream, _) = connect_async(network_url).await?;
        info!("WebSocket connected to {}", network_url);

        let (mut write, mut read) = ws_stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(64);
        let pending: PendingCalls = Arc::new(Mutex::new(Pending::default()));

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let response = match CallResponse::from_json(&text) {
                            Ok(r) => r,
                            Err(e) => {
                                warn!("Failed to parse gateway message: {} - {}", e, text);
                                continue;
                            }
                        };
                        let waiter = reader_pending.lock().await.calls.remove(&response.id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(response.result);
                            }
                            None => debug!("Dropping response for unknown call {}", response.id),
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Gateway closed connection");
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            // wake every waiter; their calls fail as transport errors
            let mut pending = reader_pending.lock().await;
            pending.closed = true;
            pending.calls.clear();
            drop(pending);
            debug!("Reader task ended");
        });

        let writer = tokio::spawn(async move {
            while let Some(json) = outgoing_rx.recv().await {
                if let Err(e) = write.send(Message::Text(json)).await {
                    error!("Failed to send message: {}", e);
                    break;
                }
            }
            debug!("Writer loop ended");
        });

        Ok(Self {
            signer,
            contract_id: config.contract_id.clone(),
            request_timeout: config.request_timeout,
            outgoing,
            pending,
            reader,
            writer,
        })
    }

    /// Send one call and decode its envelope.
    async fn call<T: DeserializeOwned>(&self, call: ContractCall) -> Envelope<T> {
        let method = call.method();
        let request = CallRequest {
            id: Uuid::new_v4(),
            contract_id: self.contract_id.clone(),
            signer: self.signer.canonical(),
            call,
        };

        let json = match request.to_json() {
            Ok(j) => j,
            Err(e) => return Envelope::failed(format!("failed to encode {method}: {e}")),
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Envelope::failed("connection closed");
            }
            pending.calls.insert(request.id, tx);
        }

        if self.outgoing.send(json).await.is_err() {
            self.pending.lock().await.calls.remove(&request.id);
            return Envelope::failed("connection closed");
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(raw)) => decode_envelope(raw),
            Ok(Err(_)) => Envelope::failed("connection closed"),
            Err(_) => {
                self.pending.lock().await.calls.remove(&request.id);
                warn!("{} timed out after {:?}", method, self.request_timeout);
                Envelope::failed(format!("{method} timed out"))
            }
        }
    }
}

impl Drop for WsBackend {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[async_trait]
impl ChessBackend for WsBackend {
    async fn list_sessions(&self) -> Envelope<Vec<SessionId>> {
        // the contract answers with fixed slots padded by nulls
        self.call::<Vec<Option<SessionId>>>(ContractCall::ListSessions)
            .await
            .map(|slots| slots.into_iter().flatten().collect())
    }

    async fn create_session(
        &self,
        player: Option<Player>,
        opponent: Option<Address>,
    ) -> Envelope<SessionId> {
        self.call(ContractCall::CreateSession {
            player,
            second_player_address: opponent.map(|a| a.to_hex()),
        })
        .await
    }

    async fn join_session(&self, session_id: &SessionId) -> Envelope<()> {
        self.call(ContractCall::JoinSession { session_id: session_id.clone() })
            .await
    }

    async fn get_session(&self, session_id: &SessionId) -> Envelope<GameSession> {
        self.call(ContractCall::GetSession { session_id: session_id.clone() })
            .await
    }

    async fn make_move(&self, chess_move: ChessMove, session_id: &SessionId) -> Envelope<()> {
        self.call(ContractCall::MakeMove {
            chess_move,
            session_id: session_id.clone(),
        })
        .await
    }
}

/// Connector opening a [`WsBackend`] per identity.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: ClientConfig,
}

impl WsConnector {
    /// Create a connector.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BackendConnector for WsConnector {
    async fn connect(
        &self,
        network_url: &str,
        signer: Address,
    ) -> Result<Arc<dyn ChessBackend>, BackendError> {
        let backend = WsBackend::connect(network_url, &self.config, signer).await?;
        Ok(Arc::new(backend))
    }
}
