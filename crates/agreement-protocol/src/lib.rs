//! # agreement-protocol — Disputable Actions, Collateral and Arbitration
//!
//! Implements the Agreement protocol: any action proposed inside an
//! organization can be challenged by a third party, triggering a
//! collateral-backed dispute process decided by a pluggable arbitrator.
//!
//! - **Settings** (`settings.rs`): append-only log of configuration
//!   versions; every action pins the version current at submission.
//!
//! - **Collateral** (`collateral.rs`): ledger of stake locked against an
//!   external staking pool, settled exactly once by resumable plans.
//!
//! - **Actions** (`action.rs`): the per-action state machine and its
//!   pausable challenge window.
//!
//! - **Settlement** (`settlement.rs`): offer negotiation and the
//!   configurable precedence between offers and escalation.
//!
//! - **Disputes** (`dispute.rs`): dispute metadata, evidence, rulings and
//!   their collateral outcomes.
//!
//! - **Agreement** (`agreement.rs`): the orchestrator exposing every
//!   protocol operation; [`SharedAgreement`] shares it across threads.
//!
//! - **Collaborators** (`capability.rs`, `app.rs`, `memory.rs`): traits
//!   for the staking pool, arbitrator, fee cashier and disputable apps,
//!   with in-memory implementations.
//!
//! ## Crate Policy
//!
//! - Depends on `agreement-core` only.
//! - Dispute metadata digests use `CanonicalBytes` → SHA-256.
//! - Operations never read the wall clock; they ask the injected `Clock`.

pub mod action;
pub mod agreement;
pub mod app;
pub mod capability;
pub mod collateral;
pub mod config;
pub mod dispute;
pub mod error;
pub mod events;
pub mod memory;
pub mod settings;
pub mod settlement;
pub mod shared;

pub use action::{Action, ActionState, Challenge, ChallengeState, ChallengeWindow};
pub use agreement::Agreement;
pub use app::{AppKind, AppNotification, CancelReason, DisputableApp, DisputableHooks};
pub use capability::{
    Arbitrator, ArbitratorError, CapabilityMismatch, CashierError, CollaboratorDirectory,
    DisputeFees, DisputeRequest, FeeCashier, Movement, PoolError, StakingFactory, StakingPool,
};
pub use collateral::{
    CollateralLock, CollateralManager, Disbursement, Disposition, LockOwner, LockStatus,
    SettlementPlan, SettlementReason,
};
pub use config::{AgreementConfig, ConfigError, SlashBeneficiary};
pub use dispute::{Dispute, DisputeMetadata, EvidenceRecord, PartyRole, Ruling};
pub use error::{AgreementError, AgreementResult};
pub use events::{AgreementEvent, EventLog, EventRecord};
pub use memory::{
    InMemoryArbitrator, InMemoryFeeCashier, InMemoryPool, InMemoryStaking, RecordingApp,
};
pub use settings::{CollateralRequirement, Setting, SettingDraft, SettingsRegistry};
pub use settlement::{OfferStatus, SettlementOffer, SettlementPrecedence, SettlementTerms};
pub use shared::SharedAgreement;
