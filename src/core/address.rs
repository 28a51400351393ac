//! Account Address Normalization
//!
//! The same 32-byte account reaches us in different encodings: a browser
//! wallet hands out SS58 strings (with whatever network prefix it is
//! configured for) while session records coming back from the backend carry
//! `0x`-prefixed hex. Every equality check goes through the canonical form
//! produced here, never through the raw strings.

use std::fmt;
use std::str::FromStr;

use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of an account public key in bytes.
pub const ADDRESS_LEN: usize = 32;

/// Network prefix used for the canonical SS58 form.
pub const SS58_GENERIC_PREFIX: u16 = 42;

/// Checksum preimage prefix defined by the SS58 format.
const SS58_CHECKSUM_PREFIX: &[u8] = b"SS58PRE";

/// Number of checksum bytes appended to a 32-byte account payload.
const SS58_CHECKSUM_LEN: usize = 2;

/// Address decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Input could not be decoded as any supported encoding.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// A decoded 32-byte account identity.
///
/// `Display` and serde both use the canonical SS58 form, so two `Address`
/// values built from different encodings print identically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a byte slice that must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            AddressError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Decode a `0x`-prefixed (or bare) hex string.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| AddressError::InvalidAddress(format!("bad hex: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Decode an SS58 string with any one- or two-byte network prefix.
    pub fn from_ss58(s: &str) -> Result<Self, AddressError> {
        let data = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidAddress(format!("bad base58: {e}")))?;

        let prefix_len = match data.first() {
            Some(0..=63) => 1,
            Some(64..=127) => 2,
            _ => return Err(AddressError::InvalidAddress("bad ss58 prefix".into())),
        };

        if data.len() != prefix_len + ADDRESS_LEN + SS58_CHECKSUM_LEN {
            return Err(AddressError::InvalidAddress(format!(
                "unexpected ss58 length {}",
                data.len()
            )));
        }

        let (body, checksum) = data.split_at(data.len() - SS58_CHECKSUM_LEN);
        if ss58_checksum(body) != checksum {
            return Err(AddressError::InvalidAddress("ss58 checksum mismatch".into()));
        }

        Self::from_slice(&body[prefix_len..])
    }

    /// Encode as SS58 under the given network prefix.
    pub fn to_ss58(&self, prefix: u16) -> String {
        let mut data = Vec::with_capacity(2 + ADDRESS_LEN + SS58_CHECKSUM_LEN);
        if prefix < 64 {
            data.push(prefix as u8);
        } else {
            data.push((((prefix & 0b0000_0000_1111_1100) as u8) >> 2) | 0b0100_0000);
            data.push(((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) as u8) << 6));
        }
        data.extend_from_slice(&self.0);
        let checksum = ss58_checksum(&data);
        data.extend_from_slice(&checksum);
        bs58::encode(data).into_string()
    }

    /// Canonical string used for every comparison and map key.
    pub fn canonical(&self) -> String {
        self.to_ss58(SS58_GENERIC_PREFIX)
    }

    /// Lowercase `0x`-prefixed hex, the encoding the backend expects.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

fn ss58_checksum(data: &[u8]) -> [u8; SS58_CHECKSUM_LEN] {
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_CHECKSUM_PREFIX);
    hasher.update(data);
    let hash = hasher.finalize();

    let mut checksum = [0u8; SS58_CHECKSUM_LEN];
    checksum.copy_from_slice(&hash[..SS58_CHECKSUM_LEN]);
    checksum
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::InvalidAddress("empty".into()));
        }
        if s.starts_with("0x") || s.starts_with("0X") {
            Self::from_hex(s)
        } else {
            Self::from_ss58(s)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.canonical())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Normalize a textual address (hex or SS58) to its canonical string.
pub fn normalize(address: &str) -> Result<String, AddressError> {
    address.parse::<Address>().map(|a| a.canonical())
}

/// Normalize a raw 32-byte address to its canonical string.
pub fn normalize_bytes(address: &[u8]) -> Result<String, AddressError> {
    Address::from_slice(address).map(|a| a.canonical())
}

/// Encoding-agnostic equality. Undecodable input never compares equal.
pub fn addresses_equal(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALICE_SS58: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const ALICE_HEX: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const BOB_SS58: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
    const BOB_HEX: &str = "0x8eaf04151687736326c9fea17e25fc5287613693c912909cb226aa4794f26a48";

    #[test]
    fn test_hex_and_ss58_normalize_equal() {
        assert_eq!(normalize(ALICE_HEX).unwrap(), ALICE_SS58);
        assert_eq!(normalize(ALICE_SS58).unwrap(), ALICE_SS58);
        assert!(addresses_equal(ALICE_HEX, ALICE_SS58));
        assert!(addresses_equal(BOB_SS58, BOB_HEX));
    }

    #[test]
    fn test_different_accounts_differ() {
        assert!(!addresses_equal(ALICE_SS58, BOB_SS58));
        assert!(!addresses_equal(ALICE_HEX, BOB_HEX));
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let upper = format!("0x{}", ALICE_HEX[2..].to_uppercase());
        assert!(addresses_equal(&upper, ALICE_SS58));
    }

    #[test]
    fn test_bytes_normalize() {
        let alice = Address::from_hex(ALICE_HEX).unwrap();
        assert_eq!(normalize_bytes(alice.as_bytes()).unwrap(), ALICE_SS58);
        assert!(normalize_bytes(&[0u8; 31]).is_err());
    }

    #[test]
    fn test_other_network_prefix_normalizes() {
        let alice = Address::from_hex(ALICE_HEX).unwrap();
        let polkadot = alice.to_ss58(0);
        let kusama = alice.to_ss58(2);
        let wide = alice.to_ss58(1284);

        assert_ne!(polkadot, ALICE_SS58);
        assert_eq!(normalize(&polkadot).unwrap(), ALICE_SS58);
        assert_eq!(normalize(&kusama).unwrap(), ALICE_SS58);
        assert_eq!(normalize(&wide).unwrap(), ALICE_SS58);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(normalize(""), Err(AddressError::InvalidAddress(_))));
        assert!(normalize("0x1234").is_err());
        assert!(normalize("0xzz").is_err());
        assert!(normalize("not-an-address").is_err());
        assert!(!addresses_equal("garbage", "garbage"));
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let mut chars: Vec<char> = ALICE_SS58.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'Y' { 'Z' } else { 'Y' };
        let corrupted: String = chars.into_iter().collect();
        assert!(normalize(&corrupted).is_err());
    }

    #[test]
    fn test_serde_uses_canonical_form() {
        let alice: Address = ALICE_HEX.parse().unwrap();
        let json = serde_json::to_string(&alice).unwrap();
        assert_eq!(json, format!("\"{ALICE_SS58}\""));
        let parsed: Address = serde_json::from_str(&format!("\"{ALICE_HEX}\"")).unwrap();
        assert_eq!(parsed, alice);
    }

    proptest! {
        #[test]
        fn prop_encodings_agree(bytes in prop::array::uniform32(any::<u8>())) {
            let addr = Address::new(bytes);
            let from_hex = normalize(&addr.to_hex()).unwrap();
            let from_ss58 = normalize(&addr.to_ss58(0)).unwrap();
            prop_assert_eq!(&from_hex, &from_ss58);
            prop_assert_eq!(from_hex, normalize_bytes(&bytes).unwrap());
        }

        #[test]
        fn prop_distinct_accounts_never_equal(
            a in prop::array::uniform32(any::<u8>()),
            b in prop::array::uniform32(any::<u8>()),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(normalize_bytes(&a).unwrap(), normalize_bytes(&b).unwrap());
        }
    }
}
