//! Two-Layer Result Envelope
//!
//! Every backend call answers with a nested result:
//!
//! ```text
//! {"err": "..."}                 - the call itself failed (transport, dispatch)
//! {"ok": {"err": "..."}}         - the contract rejected the request
//! {"ok": {"ok": <value>}}        - success
//! ```
//!
//! [`unwrap`] is the only place these layers are taken apart. The outer
//! layer is always checked first; when it carries an error the inner layer
//! is not inspected at all.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Inner (application) layer of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inner<T> {
    /// The contract accepted the request.
    Ok(T),
    /// The contract rejected the request.
    Err(String),
}

/// Outer (call) layer of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope<T> {
    /// The call reached the contract; see the inner layer.
    Ok(Inner<T>),
    /// The call itself failed.
    Err(String),
}

impl<T> Envelope<T> {
    /// Successful response carrying `value`.
    pub fn success(value: T) -> Self {
        Envelope::Ok(Inner::Ok(value))
    }

    /// Application-level rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Envelope::Ok(Inner::Err(message.into()))
    }

    /// Call-level failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Envelope::Err(message.into())
    }

    /// Map the success value, leaving both failure layers untouched.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Envelope<U> {
        match self {
            Envelope::Err(e) => Envelope::Err(e),
            Envelope::Ok(Inner::Err(e)) => Envelope::Ok(Inner::Err(e)),
            Envelope::Ok(Inner::Ok(v)) => Envelope::Ok(Inner::Ok(f(v))),
        }
    }
}

/// Failure extracted from an envelope.
///
/// The two variants are deliberately distinct: a call failure says nothing
/// about contract state, a rejection is an authoritative answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Outer layer failure (transport / dispatch).
    #[error("call failed: {0}")]
    OuterCall(String),

    /// Inner layer failure (contract rejected the request).
    #[error("rejected by contract: {0}")]
    InnerApplication(String),
}

impl EnvelopeError {
    /// True for outer-layer failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, EnvelopeError::OuterCall(_))
    }

    /// True for inner-layer failures.
    pub fn is_application(&self) -> bool {
        matches!(self, EnvelopeError::InnerApplication(_))
    }

    /// The original message carried by the failing layer.
    pub fn message(&self) -> &str {
        match self {
            EnvelopeError::OuterCall(m) | EnvelopeError::InnerApplication(m) => m,
        }
    }
}

/// Take an envelope apart: outer failure, then inner failure, then value.
pub fn unwrap<T>(envelope: Envelope<T>) -> Result<T, EnvelopeError> {
    match envelope {
        Envelope::Err(message) => Err(EnvelopeError::OuterCall(message)),
        Envelope::Ok(Inner::Err(message)) => Err(EnvelopeError::InnerApplication(message)),
        Envelope::Ok(Inner::Ok(value)) => Ok(value),
    }
}

/// Decode a raw JSON envelope into a typed one.
///
/// The outer tag is read before anything else. An outer `err` short-circuits
/// even if the rest of the document would not parse as `T`. A document that
/// does not match the envelope shape, or whose success payload is not a `T`,
/// becomes an outer failure: the call could not be understood, so nothing
/// can be assumed about contract state.
pub fn decode_envelope<T: DeserializeOwned>(raw: Value) -> Envelope<T> {
    let Value::Object(mut outer) = raw else {
        return Envelope::failed("malformed envelope: not an object");
    };

    if let Some(err) = outer.remove("err") {
        return Envelope::Err(error_text(err));
    }

    let Some(Value::Object(mut inner)) = outer.remove("ok") else {
        return Envelope::failed("malformed envelope: missing inner result");
    };

    if let Some(err) = inner.remove("err") {
        return Envelope::rejected(error_text(err));
    }

    match inner.remove("ok") {
        Some(value) => match serde_json::from_value(value) {
            Ok(v) => Envelope::success(v),
            Err(e) => Envelope::failed(format!("malformed payload: {e}")),
        },
        None => Envelope::failed("malformed envelope: missing inner value"),
    }
}

/// Error payloads are usually strings, but contract error enums can
/// serialize as bare variant names or objects.
fn error_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
