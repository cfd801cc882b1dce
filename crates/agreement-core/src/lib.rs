//! # agreement-core — Foundational Types for the Agreement Protocol
//!
//! Leaf crate of the workspace. Defines the primitives every other crate
//! builds on: who acts (`Address`), what is referenced (sequential
//! identifiers), how much is at stake (`Amount`, `TokenId`), when things
//! happen (`Timestamp`, `Clock`), and how payloads are fingerprinted
//! (`CanonicalBytes` → `ContentDigest`).
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `SettingId`, `ActionId`,
//!    `ChallengeId`, `DisputeId`, `LockId` are distinct types. You cannot
//!    hand a challenge id to an operation that expects an action id.
//!
//! 2. **Integer amounts only.** `Amount` wraps `u128`, uses checked
//!    arithmetic and serializes as a decimal string. Floats never touch
//!    collateral.
//!
//! 3. **Protocol time is injected.** Operations read time through a
//!    [`Clock`], so the challenge window and offer expiry are deterministic
//!    under test.
//!
//! 4. **Digests flow through `CanonicalBytes`.** Dispute metadata and
//!    evidence are fingerprinted from RFC 8785 canonical JSON only.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `agreement-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod amount;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use amount::{Amount, TokenId};
pub use canonical::CanonicalBytes;
pub use digest::{sha256_bytes, sha256_digest, ContentDigest, DigestAlgorithm};
pub use error::{CanonicalizationError, CoreError};
pub use identity::{
    ActionId, Address, ArbitratorDisputeId, ChallengeId, DisputableActionId, DisputeId, LockId,
    SettingId,
};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
