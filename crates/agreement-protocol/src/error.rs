//! # Protocol Errors
//!
//! Every operation of the [`crate::Agreement`] returns [`AgreementError`]
//! on failure. Errors are fatal to the call and leave no partial mutation
//! behind; nothing is retried automatically. Variants fall into four
//! families:
//!
//! - **configuration**: a collaborator reference fails its capability
//!   check, or a collateral requirement is malformed.
//! - **state violation**: the record is in the wrong state for the
//!   operation, or the caller lacks the role.
//! - **collateral**: the staking pool refused a lock or a settlement.
//! - **external call**: the arbitrator or fee cashier refused.

use thiserror::Error;

use agreement_core::{
    ActionId, Address, Amount, CanonicalizationError, ChallengeId, CoreError, DisputeId, LockId,
    SettingId, Timestamp, TokenId,
};

use crate::action::{ActionState, ChallengeState};
use crate::capability::{CapabilityMismatch, PoolError};
use crate::collateral::LockStatus;
use crate::dispute::Ruling;

/// Errors raised by protocol operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgreementError {
    // ── Lifecycle ──────────────────────────────────────────────────────
    /// `initialize` was called twice.
    #[error("agreement already initialized")]
    AlreadyInitialized,

    /// An operation ran before `initialize`.
    #[error("agreement not initialized")]
    NotInitialized,

    /// The caller lacks the role the operation requires.
    #[error("{caller} is not authorized to {operation}")]
    Unauthorized {
        /// Rejected caller.
        caller: Address,
        /// Operation attempted.
        operation: &'static str,
    },

    // ── Configuration ──────────────────────────────────────────────────
    /// The arbitrator reference failed its capability check.
    #[error("invalid arbitrator {address}: {reason}")]
    InvalidArbitrator {
        /// Checked address.
        address: Address,
        /// Why the check failed.
        reason: CapabilityMismatch,
    },

    /// The fee cashier reference failed its capability check.
    #[error("invalid fee cashier {address}: {reason}")]
    InvalidFeeCashier {
        /// Checked address.
        address: Address,
        /// Why the check failed.
        reason: CapabilityMismatch,
    },

    /// The staking factory reference failed its capability check.
    #[error("invalid staking factory {address}: {reason}")]
    InvalidStakingFactory {
        /// Checked address.
        address: Address,
        /// Why the check failed.
        reason: CapabilityMismatch,
    },

    /// The collateral requirement cannot be enforced.
    #[error("invalid collateral requirement: {0}")]
    InvalidCollateralRequirement(String),

    // ── Lookups ────────────────────────────────────────────────────────
    /// No setting with this id.
    #[error("{0} not found")]
    SettingNotFound(SettingId),

    /// No action with this id.
    #[error("{0} not found")]
    ActionNotFound(ActionId),

    /// No challenge with this id.
    #[error("{0} not found")]
    ChallengeNotFound(ChallengeId),

    /// No dispute with this id.
    #[error("{0} not found")]
    DisputeNotFound(DisputeId),

    /// No collateral lock with this id.
    #[error("{0} not found")]
    LockNotFound(LockId),

    // ── Apps ───────────────────────────────────────────────────────────
    /// The address is not a registered disputable app.
    #[error("app {0} is not registered")]
    AppNotRegistered(Address),

    /// The address is already registered.
    #[error("app {0} is already registered")]
    AppAlreadyRegistered(Address),

    /// The app is registered but deactivated.
    #[error("app {0} is inactive")]
    AppInactive(Address),

    // ── Action state machine ───────────────────────────────────────────
    /// The action is in the wrong state for the operation.
    #[error("cannot {operation} {action_id} in state {state}")]
    InvalidActionState {
        /// Action concerned.
        action_id: ActionId,
        /// Its current state.
        state: ActionState,
        /// Operation attempted.
        operation: &'static str,
    },

    /// The challenge window has elapsed.
    #[error("challenge window for {action_id} closed at {closed_at}")]
    ChallengeWindowClosed {
        /// Action concerned.
        action_id: ActionId,
        /// When the window closed.
        closed_at: Timestamp,
    },

    /// The challenge window is still running.
    #[error("challenge window for {action_id} is open until {ends_at}")]
    ChallengeWindowOpen {
        /// Action concerned.
        action_id: ActionId,
        /// When the window ends.
        ends_at: Timestamp,
    },

    /// A non-terminal challenge already exists for the action.
    #[error("{action_id} already has open {challenge_id}")]
    AlreadyChallenged {
        /// Action concerned.
        action_id: ActionId,
        /// The open challenge.
        challenge_id: ChallengeId,
    },

    /// The action was already executed.
    #[error("{0} already executed")]
    AlreadyExecuted(ActionId),

    /// The submitter tried to challenge their own action.
    #[error("submitter cannot challenge own {0}")]
    SelfChallenge(ActionId),

    /// The challenge is in the wrong state for the operation.
    #[error("cannot {operation} {challenge_id} in state {state}")]
    InvalidChallengeState {
        /// Challenge concerned.
        challenge_id: ChallengeId,
        /// Its current state.
        state: ChallengeState,
        /// Operation attempted.
        operation: &'static str,
    },

    /// The caller is neither submitter nor challenger.
    #[error("{caller} is not a party to {challenge_id}")]
    NotAParty {
        /// Rejected caller.
        caller: Address,
        /// Challenge concerned.
        challenge_id: ChallengeId,
    },

    // ── Settlement ─────────────────────────────────────────────────────
    /// A live offer already stands on the challenge.
    #[error("{challenge_id} already has a standing offer until {expires_at}")]
    OfferStandingRejected {
        /// Challenge concerned.
        challenge_id: ChallengeId,
        /// Expiry of the standing offer.
        expires_at: Timestamp,
    },

    /// No live offer stands on the challenge.
    #[error("{0} has no standing settlement offer")]
    NoStandingOffer(ChallengeId),

    /// The offer expired before acceptance.
    #[error("settlement offer on {challenge_id} expired at {expired_at}")]
    OfferExpired {
        /// Challenge concerned.
        challenge_id: ChallengeId,
        /// Expiry instant.
        expired_at: Timestamp,
    },

    /// Escalation is blocked by a live offer.
    #[error("{challenge_id} has a live settlement offer until {expires_at}")]
    SettlementPending {
        /// Challenge concerned.
        challenge_id: ChallengeId,
        /// Expiry of the live offer.
        expires_at: Timestamp,
    },

    /// The offer exceeds the submitter's collateral.
    #[error("settlement amount {requested} exceeds submitter collateral {max}")]
    InvalidSettlementAmount {
        /// Amount offered.
        requested: Amount,
        /// Submitter collateral.
        max: Amount,
    },

    /// The offer expiry is not in the future.
    #[error("settlement expiry {expires_at} is not after {now}")]
    InvalidOfferExpiry {
        /// Requested expiry.
        expires_at: Timestamp,
        /// Protocol time at the call.
        now: Timestamp,
    },

    // ── Disputes ───────────────────────────────────────────────────────
    /// The challenge was already escalated.
    #[error("{challenge_id} already escalated to {dispute_id}")]
    AlreadyEscalated {
        /// Challenge concerned.
        challenge_id: ChallengeId,
        /// Existing dispute.
        dispute_id: DisputeId,
    },

    /// The arbitrator refused the dispute or the evidence.
    #[error("arbitrator {arbitrator} rejected the request: {reason}")]
    ArbitratorRejected {
        /// Arbitrator address.
        arbitrator: Address,
        /// Arbitrator's reason.
        reason: String,
    },

    /// The dispute already has a ruling.
    #[error("{dispute_id} is closed with ruling {ruling}")]
    DisputeClosed {
        /// Dispute concerned.
        dispute_id: DisputeId,
        /// Recorded ruling.
        ruling: Ruling,
    },

    /// The dispute has no ruling yet.
    #[error("{0} has no ruling yet")]
    DisputePending(DisputeId),

    /// Only the pinned arbitrator may rule.
    #[error("{caller} is not the arbitrator of {dispute_id}")]
    UnauthorizedRuling {
        /// Rejected caller.
        caller: Address,
        /// Dispute concerned.
        dispute_id: DisputeId,
    },

    /// A ruling was already recorded.
    #[error("{dispute_id} already ruled {ruling}")]
    AlreadyRuled {
        /// Dispute concerned.
        dispute_id: DisputeId,
        /// Recorded ruling.
        ruling: Ruling,
    },

    /// The ruling code is not one the arbitrator may return.
    #[error("invalid ruling code {0}")]
    InvalidRuling(u8),

    // ── Collateral ─────────────────────────────────────────────────────
    /// The payer has not approved enough stake.
    #[error("insufficient allowance for {owner} in {token}: required {required}, approved {allowance}")]
    InsufficientAllowance {
        /// Payer.
        owner: Address,
        /// Token.
        token: TokenId,
        /// Amount needed.
        required: Amount,
        /// Amount approved.
        allowance: Amount,
    },

    /// The payer's available stake is too low.
    #[error("insufficient balance for {owner} in {token}: required {required}, available {available}")]
    InsufficientBalance {
        /// Payer.
        owner: Address,
        /// Token.
        token: TokenId,
        /// Amount needed.
        required: Amount,
        /// Amount available.
        available: Amount,
    },

    /// The lock was already released, slashed or split.
    #[error("{lock_id} already settled ({status})")]
    AlreadySettled {
        /// Lock concerned.
        lock_id: LockId,
        /// Its terminal status.
        status: LockStatus,
    },

    /// The staking pool failed for another reason.
    #[error("staking pool: {0}")]
    Pool(PoolError),

    /// The fee cashier refused to charge.
    #[error("fee cashier rejected the charge: {0}")]
    FeeRejected(String),

    // ── Wrapped ────────────────────────────────────────────────────────
    /// Amount or identifier error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Dispute metadata could not be canonicalized.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

impl From<PoolError> for AgreementError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::InsufficientAllowance {
                owner,
                token,
                required,
                allowance,
            } => Self::InsufficientAllowance {
                owner,
                token,
                required,
                allowance,
            },
            PoolError::InsufficientBalance {
                owner,
                token,
                required,
                available,
            } => Self::InsufficientBalance {
                owner,
                token,
                required,
                available,
            },
            other => Self::Pool(other),
        }
    }
}

impl From<CanonicalizationError> for AgreementError {
    fn from(err: CanonicalizationError) -> Self {
        Self::Canonicalization(err.to_string())
    }
}

/// Result alias for protocol operations.
pub type AgreementResult<T> = Result<T, AgreementError>;
