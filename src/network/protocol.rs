//! Protocol Messages
//!
//! Wire format for contract calls relayed over WebSocket. Every call is a
//! JSON request tagged with a correlation id; every answer carries the same
//! id and a raw result envelope (see [`crate::core::envelope`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::board::{ChessMove, Player};
use crate::game::session::SessionId;

/// Number of session slots the contract returns for a player.
pub const MAX_TRACKED_SESSIONS: usize = 10;

// =============================================================================
// CLIENT -> BACKEND
// =============================================================================

/// A contract message and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum ContractCall {
    /// Sessions tracked for the signer.
    ListSessions,

    /// Start a new session.
    CreateSession {
        /// Seat the signer wants (White when absent).
        player: Option<Player>,
        /// Opponent to pre-seat, as `0x` hex.
        second_player_address: Option<String>,
    },

    /// Take the open seat of a session.
    JoinSession {
        /// Target session.
        session_id: SessionId,
    },

    /// Read one session.
    GetSession {
        /// Target session.
        session_id: SessionId,
    },

    /// Submit a move.
    MakeMove {
        /// The move.
        chess_move: ChessMove,
        /// Target session.
        session_id: SessionId,
    },
}

impl ContractCall {
    /// Method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            ContractCall::ListSessions => "list_sessions",
            ContractCall::CreateSession { .. } => "create_session",
            ContractCall::JoinSession { .. } => "join_session",
            ContractCall::GetSession { .. } => "get_session",
            ContractCall::MakeMove { .. } => "make_move",
        }
    }
}

/// A signed contract call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    /// Correlation id echoed by the response.
    pub id: Uuid,
    /// Contract to call.
    pub contract_id: String,
    /// Signing account (canonical SS58).
    pub signer: String,
    /// Message and arguments.
    pub call: ContractCall,
}

// =============================================================================
// BACKEND -> CLIENT
// =============================================================================

/// Answer to a [`CallRequest`].
///
/// `result` is left raw so the envelope can be decoded outer layer first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResponse {
    /// Correlation id of the request.
    pub id: Uuid,
    /// Raw result envelope.
    pub result: Value,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl CallRequest {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl CallResponse {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::ChessLocation;
    use serde_json::json;

    #[test]
    fn test_make_move_wire_shape() {
        let call = ContractCall::MakeMove {
            chess_move: ChessMove::new(
                ChessLocation::new(1, 4).unwrap(),
                ChessLocation::new(3, 4).unwrap(),
            ),
            session_id: SessionId::new("65f0c2"),
        };
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({
                "method": "make_move",
                "params": {
                    "chess_move": {"from": [1, 4], "to": [3, 4]},
                    "session_id": "65f0c2",
                }
            })
        );
        assert_eq!(call.method(), "make_move");
    }

    #[test]
    fn test_list_sessions_has_no_params() {
        let value = serde_json::to_value(ContractCall::ListSessions).unwrap();
        assert_eq!(value, json!({"method": "list_sessions"}));
    }

    #[test]
    fn test_request_roundtrip() {
        let request = CallRequest {
            id: Uuid::new_v4(),
            contract_id: "0xabc".into(),
            signer: "5Grw".into(),
            call: ContractCall::CreateSession {
                player: Some(Player::Black),
                second_player_address: None,
            },
        };
        let parsed = CallRequest::from_json(&request.to_json().unwrap()).unwrap();
        assert_eq!(parsed.id, request.id);
        assert_eq!(parsed.call, request.call);
    }

    #[test]
    fn test_response_keeps_raw_result() {
        let id = Uuid::new_v4();
        let text = format!(r#"{{"id":"{id}","result":{{"ok":{{"err":"NotYourTurn"}}}}}}"#);
        let response = CallResponse::from_json(&text).unwrap();
        assert_eq!(response.id, id);
        assert_eq!(response.result, json!({"ok": {"err": "NotYourTurn"}}));
    }
}
