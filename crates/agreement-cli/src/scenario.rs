//! # Scenario Documents
//!
//! A scenario is a YAML script replayed by `agreement simulate`. It names
//! the participants, funds them in the in-memory staking pool, registers
//! apps and then runs a list of protocol steps against a manual clock.
//!
//! Participants, apps and the fixed collaborator roles are referred to by
//! name; each name maps to a deterministic address through
//! [`Address::from_label`].
//!
//! ```yaml
//! start: "2026-01-01T00:00:00Z"
//! token: ANT
//! collateral:
//!   action_amount: 100
//!   challenge_amount: 50
//!   challenge_duration_secs: 3600
//! participants:
//!   alice: 1000
//!   bob: 1000
//! apps:
//!   - name: voting
//!     kind: voting
//! steps:
//!   - op: submit
//!     app: voting
//!     submitter: alice
//!     id: vote-1
//!   - op: challenge
//!     challenger: bob
//!     action: 1
//!     offer: { amount: 40, expires_in_secs: 600 }
//!   - op: accept_settlement
//!     caller: alice
//!     challenge: 1
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use agreement_core::{ActionId, Address, Amount, ChallengeId, DisputeId, Timestamp};
use agreement_protocol::{AppKind, Ruling};

/// Name of the governor account.
pub const GOVERNOR: &str = "governor";
/// Name of the arbitrator.
pub const ARBITRATOR: &str = "court";
/// Name of the fee cashier.
pub const CASHIER: &str = "cashier";
/// Name of the staking factory.
pub const STAKING: &str = "staking";

/// Deterministic address for a scenario name.
pub fn address_of(name: &str) -> Address {
    Address::from_label(name)
}

/// A parsed scenario.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Protocol time at the start of the run.
    pub start: Timestamp,
    /// Collateral token symbol.
    #[serde(default = "default_token")]
    pub token: String,
    /// Collateral requirement of the initial setting.
    pub collateral: CollateralSpec,
    /// Fee the arbitrator charges per dispute.
    #[serde(default)]
    pub arbitrator_fee: Amount,
    /// Participant name to initial funded stake.
    #[serde(default)]
    pub participants: BTreeMap<String, Amount>,
    /// Disputable apps registered by the governor.
    #[serde(default)]
    pub apps: Vec<AppSpec>,
    /// Steps, in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_token() -> String {
    "ANT".to_string()
}

impl Scenario {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("failed to parse scenario")
    }

    /// Read and parse a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// Collateral requirement in scenario form.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollateralSpec {
    /// Submitter collateral.
    pub action_amount: Amount,
    /// Challenger collateral.
    pub challenge_amount: Amount,
    /// Challenge window length.
    pub challenge_duration_secs: u64,
}

/// A disputable app to register.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppSpec {
    /// App name.
    pub name: String,
    /// App kind.
    pub kind: AppKind,
}

/// Offer terms relative to the step's protocol time.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfferSpec {
    /// Amount the submitter forfeits.
    pub amount: Amount,
    /// Seconds until the offer expires.
    pub expires_in_secs: u64,
}

/// One scripted step.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// The operation.
    #[serde(flatten)]
    pub op: StepOp,
    /// Substring the step's error message must contain. When set, the
    /// step is expected to fail.
    #[serde(default)]
    pub expect_error: Option<String>,
}

/// Scripted protocol operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepOp {
    /// Move the clock forward.
    Advance { secs: u64 },
    /// Append a setting version as the governor.
    CreateSetting {
        title: String,
        collateral: CollateralSpec,
    },
    /// Stop an app from submitting.
    DeactivateApp { app: String },
    /// Let an app submit again.
    ActivateApp { app: String },
    /// Submit an action through an app.
    Submit {
        app: String,
        submitter: String,
        id: String,
        #[serde(default)]
        context: String,
    },
    /// Execute an action.
    Execute { caller: String, action: ActionId },
    /// Close an action through its app.
    Close { app: String, action: ActionId },
    /// Challenge an action.
    Challenge {
        challenger: String,
        action: ActionId,
        #[serde(default)]
        offer: Option<OfferSpec>,
        #[serde(default)]
        context: String,
    },
    /// Cancel a challenge.
    CancelChallenge {
        caller: String,
        challenge: ChallengeId,
    },
    /// Put a settlement offer on a challenge.
    ProposeSettlement {
        caller: String,
        challenge: ChallengeId,
        offer: OfferSpec,
    },
    /// Withdraw the live offer.
    WithdrawSettlement {
        caller: String,
        challenge: ChallengeId,
    },
    /// Reject the live offer.
    RejectSettlement {
        caller: String,
        challenge: ChallengeId,
    },
    /// Accept the live offer.
    AcceptSettlement {
        caller: String,
        challenge: ChallengeId,
    },
    /// Escalate a challenge to the arbitrator.
    Escalate {
        caller: String,
        challenge: ChallengeId,
    },
    /// Submit evidence to a dispute.
    Evidence {
        caller: String,
        dispute: DisputeId,
        content: String,
    },
    /// Deliver a ruling from the arbitrator.
    Rule { dispute: DisputeId, ruling: Ruling },
}

impl StepOp {
    /// Short operation name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Advance { .. } => "advance",
            Self::CreateSetting { .. } => "create_setting",
            Self::DeactivateApp { .. } => "deactivate_app",
            Self::ActivateApp { .. } => "activate_app",
            Self::Submit { .. } => "submit",
            Self::Execute { .. } => "execute",
            Self::Close { .. } => "close",
            Self::Challenge { .. } => "challenge",
            Self::CancelChallenge { .. } => "cancel_challenge",
            Self::ProposeSettlement { .. } => "propose_settlement",
            Self::WithdrawSettlement { .. } => "withdraw_settlement",
            Self::RejectSettlement { .. } => "reject_settlement",
            Self::AcceptSettlement { .. } => "accept_settlement",
            Self::Escalate { .. } => "escalate",
            Self::Evidence { .. } => "evidence",
            Self::Rule { .. } => "rule",
        }
    }
}
