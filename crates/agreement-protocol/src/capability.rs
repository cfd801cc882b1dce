//! # Collaborator Capabilities
//!
//! The protocol never holds tokens, decides disputes or charges fees on its
//! own. It drives external collaborators through the traits in this module:
//!
//! - [`StakingFactory`] / [`StakingPool`]: collateral custody. A pool
//!   locks stake from a payer and settles batches of [`Movement`]s out of
//!   locked balances. A batch is all-or-nothing.
//! - [`Arbitrator`]: quotes dispute fees, accepts disputes and evidence.
//!   Rulings come back through [`crate::Agreement::resolve`].
//! - [`FeeCashier`]: charges the protocol fee for each submitted action.
//!
//! Collaborators are referenced by [`Address`] in settings. Whether an
//! address actually exposes a capability is answered by the
//! [`CollaboratorDirectory`], the interface check used when a setting is
//! created.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use agreement_core::{
    ActionId, Address, Amount, ArbitratorDisputeId, ContentDigest, DisputeId, TokenId,
};

use crate::dispute::DisputeMetadata;

// ── Staking ────────────────────────────────────────────────────────────

/// A transfer out of `from`'s locked balance into `to`'s available balance.
///
/// When `to == from` the movement is a plain unlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Payer whose locked stake is drawn down.
    pub from: Address,
    /// Recipient credited with available stake.
    pub to: Address,
    /// Amount moved.
    pub amount: Amount,
}

/// Errors reported by a staking pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The payer has not approved enough stake for the agreement to lock.
    #[error("insufficient allowance for {owner} in {token}: required {required}, approved {allowance}")]
    InsufficientAllowance {
        /// Stake owner.
        owner: Address,
        /// Pool token.
        token: TokenId,
        /// Amount requested.
        required: Amount,
        /// Amount approved.
        allowance: Amount,
    },

    /// The payer's unlocked stake is below the amount requested.
    #[error("insufficient balance for {owner} in {token}: required {required}, available {available}")]
    InsufficientBalance {
        /// Stake owner.
        owner: Address,
        /// Pool token.
        token: TokenId,
        /// Amount requested.
        required: Amount,
        /// Amount available.
        available: Amount,
    },

    /// A settlement batch tried to move more than the payer has locked.
    #[error("insufficient locked stake for {owner} in {token}: required {required}, locked {locked}")]
    InsufficientLocked {
        /// Stake owner.
        owner: Address,
        /// Pool token.
        token: TokenId,
        /// Amount requested.
        required: Amount,
        /// Amount locked.
        locked: Amount,
    },

    /// The factory has no pool for the requested token.
    #[error("no staking pool for token {0}")]
    UnsupportedToken(TokenId),

    /// The pool refused or failed the call.
    #[error("staking pool unavailable: {0}")]
    Unavailable(String),
}

/// A staking pool for a single token.
pub trait StakingPool: Send + Sync {
    /// The token this pool holds.
    fn token(&self) -> TokenId;

    /// Lock `amount` of `payer`'s approved, available stake.
    fn lock(&self, payer: &Address, amount: Amount) -> Result<(), PoolError>;

    /// Apply every movement or none of them.
    fn settle(&self, movements: &[Movement]) -> Result<(), PoolError>;

    /// Stake currently available (unlocked) to `owner`.
    fn available_balance(&self, owner: &Address) -> Amount;

    /// Stake currently locked for `owner`.
    fn locked_balance(&self, owner: &Address) -> Amount;
}

/// Resolves the staking pool for a token.
pub trait StakingFactory: Send + Sync {
    /// The pool for `token`.
    fn pool(&self, token: &TokenId) -> Result<Arc<dyn StakingPool>, PoolError>;
}

// ── Arbitration ────────────────────────────────────────────────────────

/// Fees an arbitrator charges to open a dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeFees {
    /// Fee token.
    pub token: TokenId,
    /// Fee amount, zero if the arbitrator is free.
    pub amount: Amount,
}

/// Everything an arbitrator receives when a dispute is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRequest {
    /// Agreement-side dispute id the ruling must reference.
    pub dispute_id: DisputeId,
    /// Number of rulings the arbitrator may choose from (submitter, challenger).
    pub possible_rulings: u8,
    /// Disputable payload plus challenge context.
    pub metadata: DisputeMetadata,
    /// SHA-256 over the canonical metadata.
    pub metadata_digest: ContentDigest,
}

/// Errors reported by an arbitrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArbitratorError {
    /// The arbitrator refused the request.
    #[error("arbitrator refused: {0}")]
    Refused(String),

    /// The arbitrator could not be reached.
    #[error("arbitrator unavailable: {0}")]
    Unavailable(String),
}

/// An external arbitration service.
pub trait Arbitrator: Send + Sync {
    /// Fees currently charged per dispute.
    fn dispute_fees(&self) -> DisputeFees;

    /// Open a dispute and return the arbitrator's own identifier for it.
    fn create_dispute(&self, request: &DisputeRequest) -> Result<ArbitratorDisputeId, ArbitratorError>;

    /// Forward evidence submitted by a party.
    fn submit_evidence(
        &self,
        dispute: ArbitratorDisputeId,
        party: &Address,
        evidence: &[u8],
    ) -> Result<(), ArbitratorError>;
}

// ── Fees ───────────────────────────────────────────────────────────────

/// Errors reported by a fee cashier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CashierError {
    /// The cashier refused to charge the fee.
    #[error("fee cashier refused: {0}")]
    Refused(String),
}

/// Collects the protocol fee owed for each submitted action.
pub trait FeeCashier: Send + Sync {
    /// Charge the fee for `action` submitted by `payer` through `app`.
    fn charge(&self, app: &Address, payer: &Address, action: ActionId) -> Result<(), CashierError>;
}

// ── Directory ──────────────────────────────────────────────────────────

/// What lives at an address.
#[derive(Clone)]
pub enum Capability {
    /// An externally-owned account. Exposes no interface.
    Account,
    /// A live arbitrator.
    Arbitrator(Arc<dyn Arbitrator>),
    /// A live fee cashier.
    FeeCashier(Arc<dyn FeeCashier>),
    /// A live staking factory.
    StakingFactory(Arc<dyn StakingFactory>),
}

impl Capability {
    /// Interface name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Arbitrator(_) => "arbitrator",
            Self::FeeCashier(_) => "fee-cashier",
            Self::StakingFactory(_) => "staking-factory",
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// Why an address failed a capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityMismatch {
    /// The zero address.
    ZeroAddress,
    /// Nothing is deployed at the address.
    NotDeployed,
    /// An externally-owned account, not a contract.
    NotAContract,
    /// A contract exposing a different interface.
    WrongInterface(&'static str),
}

impl std::fmt::Display for CapabilityMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroAddress => f.write_str("zero address"),
            Self::NotDeployed => f.write_str("nothing deployed at address"),
            Self::NotAContract => f.write_str("externally-owned account, not a contract"),
            Self::WrongInterface(kind) => write!(f, "contract exposes {kind} interface"),
        }
    }
}

/// Address book of live collaborators.
#[derive(Clone, Default, Debug)]
pub struct CollaboratorDirectory {
    entries: BTreeMap<Address, Capability>,
}

impl CollaboratorDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an externally-owned account.
    pub fn register_account(&mut self, address: Address) {
        self.entries.insert(address, Capability::Account);
    }

    /// Deploy an arbitrator at `address`.
    pub fn register_arbitrator(&mut self, address: Address, arbitrator: Arc<dyn Arbitrator>) {
        self.entries.insert(address, Capability::Arbitrator(arbitrator));
    }

    /// Deploy a fee cashier at `address`.
    pub fn register_fee_cashier(&mut self, address: Address, cashier: Arc<dyn FeeCashier>) {
        self.entries.insert(address, Capability::FeeCashier(cashier));
    }

    /// Deploy a staking factory at `address`.
    pub fn register_staking_factory(&mut self, address: Address, factory: Arc<dyn StakingFactory>) {
        self.entries.insert(address, Capability::StakingFactory(factory));
    }

    /// What lives at `address`, if anything.
    pub fn get(&self, address: &Address) -> Option<&Capability> {
        self.entries.get(address)
    }

    /// Resolve an arbitrator.
    pub fn arbitrator(&self, address: &Address) -> Result<Arc<dyn Arbitrator>, CapabilityMismatch> {
        match self.resolve(address)? {
            Capability::Arbitrator(a) => Ok(Arc::clone(a)),
            other => Err(CapabilityMismatch::WrongInterface(other.kind())),
        }
    }

    /// Resolve a fee cashier.
    pub fn fee_cashier(&self, address: &Address) -> Result<Arc<dyn FeeCashier>, CapabilityMismatch> {
        match self.resolve(address)? {
            Capability::FeeCashier(c) => Ok(Arc::clone(c)),
            other => Err(CapabilityMismatch::WrongInterface(other.kind())),
        }
    }

    /// Resolve a staking factory.
    pub fn staking_factory(
        &self,
        address: &Address,
    ) -> Result<Arc<dyn StakingFactory>, CapabilityMismatch> {
        match self.resolve(address)? {
            Capability::StakingFactory(s) => Ok(Arc::clone(s)),
            other => Err(CapabilityMismatch::WrongInterface(other.kind())),
        }
    }

    fn resolve(&self, address: &Address) -> Result<&Capability, CapabilityMismatch> {
        if address.is_zero() {
            return Err(CapabilityMismatch::ZeroAddress);
        }
        match self.entries.get(address) {
            None => Err(CapabilityMismatch::NotDeployed),
            Some(Capability::Account) => Err(CapabilityMismatch::NotAContract),
            Some(cap) => Ok(cap),
        }
    }
}
