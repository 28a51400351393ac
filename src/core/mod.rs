//! Core primitives.
//!
//! Identity normalization and the result envelope every backend call is
//! wrapped in. Nothing here performs I/O.

pub mod address;
pub mod envelope;

// Re-export core types
pub use address::{addresses_equal, normalize, normalize_bytes, Address, AddressError};
pub use envelope::{decode_envelope, unwrap, Envelope, EnvelopeError, Inner};
