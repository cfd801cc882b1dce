//! # Identity Newtypes
//!
//! Participants and collaborators are identified by a 20-byte [`Address`].
//! Protocol records are identified by sequential integer ids starting at 1,
//! one newtype per record kind so that a `ChallengeId` can never be passed
//! where an `ActionId` is expected.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::digest::sha256_bytes;
use crate::error::CoreError;

// ── Address ────────────────────────────────────────────────────────────

/// A 20-byte account or collaborator address, rendered as `0x`-prefixed hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address. Never a valid collaborator.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Construct from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive a stable address from a human-readable label.
    ///
    /// Takes the last 20 bytes of `sha256(label)`. Used by the simulator and
    /// tests to name participants ("submitter", "court") without hex.
    pub fn from_label(label: &str) -> Self {
        let digest = sha256_bytes(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.bytes[12..]);
        Self(bytes)
    }

    /// Access the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Lowercase `0x`-prefixed hex rendering.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(42);
        s.push_str("0x");
        for b in self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidAddress {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| invalid("missing 0x prefix"))?;
        if hex.len() != 40 {
            return Err(invalid("expected 40 hex characters"));
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| invalid("non-ascii input"))?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| invalid("non-hex character"))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Sequential identifiers ─────────────────────────────────────────────

macro_rules! sequential_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// The first identifier ever issued.
            pub const FIRST: $name = $name(1);

            /// Wrap a raw integer.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw integer value.
            pub const fn get(&self) -> u64 {
                self.0
            }

            /// The identifier issued after this one.
            pub const fn next(&self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

sequential_id!(
    /// Version number of a setting. Setting 1 is created at initialization.
    SettingId,
    "setting"
);
sequential_id!(
    /// Identifier of a disputable action registered with the agreement.
    ActionId,
    "action"
);
sequential_id!(
    /// Identifier of a challenge raised against an action.
    ChallengeId,
    "challenge"
);
sequential_id!(
    /// Identifier of a dispute escalated from a challenge.
    DisputeId,
    "dispute"
);
sequential_id!(
    /// Identifier of a collateral lock held in a staking pool.
    LockId,
    "lock"
);
sequential_id!(
    /// Identifier an arbitrator assigned to a dispute on its side.
    ArbitratorDisputeId,
    "arbitrator-dispute"
);

// ── Disputable action id ───────────────────────────────────────────────

/// Opaque identifier the disputable app uses for its own action
/// (for example a vote id). The protocol never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisputableActionId(pub String);

impl DisputableActionId {
    /// Wrap an app-defined identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Access the inner identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DisputableActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_roundtrip() {
        let addr = Address::from_label("submitter");
        let parsed: Address = addr.to_hex().parse().unwrap();
        assert_eq!(addr, parsed);
        assert_eq!(addr.to_hex().len(), 42);
    }

    #[test]
    fn address_labels_are_distinct_and_stable() {
        assert_eq!(Address::from_label("court"), Address::from_label("court"));
        assert_ne!(Address::from_label("court"), Address::from_label("cashier"));
        assert!(!Address::from_label("court").is_zero());
    }

    #[test]
    fn zero_address() {
        assert!(Address::ZERO.is_zero());
        assert_eq!(
            Address::ZERO.to_string(),
            "0x0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn address_parse_rejects_bad_input() {
        assert!("1234".parse::<Address>().is_err());
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz00000000000000000000000000000000000000"
            .parse::<Address>()
            .is_err());
    }

    #[test]
    fn address_serializes_as_hex_string() {
        let addr = Address::from_label("challenger");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn sequential_ids_advance() {
        assert_eq!(SettingId::FIRST.get(), 1);
        assert_eq!(ActionId::FIRST.next(), ActionId::new(2));
        assert_eq!(ChallengeId::new(7).to_string(), "challenge:7");
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        assert_eq!(serde_json::to_string(&LockId::new(3)).unwrap(), "3");
    }
}
