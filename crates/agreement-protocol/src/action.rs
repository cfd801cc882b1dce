//! # Action State Machine
//!
//! ```text
//!                 ┌──── cancel / Refused / InFavorOfSubmitter ─────┐
//!                 ▼                                                │
//!  submit ──▶ SCHEDULED ──challenge──▶ CHALLENGED ──escalate──▶ DISPUTED
//!              │    │                      │                       │
//!       execute│    │close          accept │   InFavorOfChallenger │
//!              ▼    ▼                      ▼                       ▼
//!          EXECUTED CANCELLED           SETTLED                CANCELLED
//! ```
//!
//! States are a validated enum rather than typestate: actions are stored
//! in a registry keyed by id and transitions are driven by runtime calls,
//! so the state must be inspectable as data. Every transition checks the
//! current state explicitly and the terminal states have no exits.
//!
//! The challenge window runs while the action is Scheduled and pauses
//! while a challenge is open. A challenge that ends without cancelling the
//! action (withdrawn, a `Refused` ruling or a ruling for the submitter)
//! resumes the window for the time that was left. The submitter's
//! collateral stays locked until the action ends.

use serde::{Deserialize, Serialize};

use agreement_core::{
    ActionId, Address, ChallengeId, DisputableActionId, LockId, SettingId, Timestamp,
};

use crate::dispute::{Dispute, PartyRole, Ruling};
use crate::error::{AgreementError, AgreementResult};
use crate::settings::CollateralRequirement;
use crate::settlement::SettlementOffer;

/// Lifecycle state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Open for challenges until the window ends.
    Scheduled,
    /// A challenge is being negotiated.
    Challenged,
    /// The challenge is before the arbitrator.
    Disputed,
    /// Resolved by an accepted settlement offer.
    Settled,
    /// Executed by the app.
    Executed,
    /// Cancelled by ruling or closed by the app.
    Cancelled,
}

impl ActionState {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Challenged => "challenged",
            Self::Disputed => "disputed",
            Self::Settled => "settled",
            Self::Executed => "executed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the state has no exits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Executed | Self::Cancelled)
    }

    /// States reachable in one transition.
    pub fn valid_transitions(&self) -> &'static [ActionState] {
        match self {
            Self::Scheduled => &[Self::Challenged, Self::Executed, Self::Cancelled],
            Self::Challenged => &[Self::Scheduled, Self::Settled, Self::Disputed],
            Self::Disputed => &[Self::Scheduled, Self::Cancelled],
            Self::Settled | Self::Executed | Self::Cancelled => &[],
        }
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    /// Negotiating; may settle, escalate or be cancelled.
    Open,
    /// Escalated; awaiting a ruling.
    Disputed,
    /// Submitter accepted the offer.
    Settled,
    /// Challenger withdrew before escalation.
    Cancelled,
    /// Arbitrator ruled.
    Ruled(Ruling),
}

impl ChallengeState {
    /// Whether the challenge is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Cancelled | Self::Ruled(_))
    }
}

impl std::fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Disputed => f.write_str("disputed"),
            Self::Settled => f.write_str("settled"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Ruled(r) => write!(f, "ruled:{r}"),
        }
    }
}

/// The pausable challenge window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeWindow {
    /// Total running time.
    pub duration_secs: u64,
    /// Time already run in earlier stretches.
    pub consumed_secs: u64,
    /// Start of the current stretch. `None` while paused.
    pub running_since: Option<Timestamp>,
}

impl ChallengeWindow {
    /// A window starting now.
    pub fn open(duration_secs: u64, now: Timestamp) -> Self {
        Self {
            duration_secs,
            consumed_secs: 0,
            running_since: Some(now),
        }
    }

    /// Seconds left when the current stretch started (or now, if paused).
    pub fn remaining_secs(&self) -> u64 {
        self.duration_secs.saturating_sub(self.consumed_secs)
    }

    /// End instant of the current stretch. `None` while paused.
    pub fn ends_at(&self) -> Option<Timestamp> {
        self.running_since
            .map(|since| since.plus_secs(self.remaining_secs()))
    }

    /// Challengeable while `now < end`.
    pub fn accepts_challenge_at(&self, now: Timestamp) -> bool {
        self.ends_at().is_some_and(|end| now < end)
    }

    /// Executable once `now >= end`.
    pub fn has_elapsed_at(&self, now: Timestamp) -> bool {
        self.ends_at().is_some_and(|end| now >= end)
    }

    /// Stop the clock.
    pub fn pause(&mut self, now: Timestamp) {
        if let Some(since) = self.running_since.take() {
            let run = now.secs_since(since).min(self.remaining_secs());
            self.consumed_secs += run;
        }
    }

    /// Restart the clock for the remaining time.
    pub fn resume(&mut self, now: Timestamp) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }
}

/// A challenge raised against an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Identifier.
    pub id: ChallengeId,
    /// Challenged action.
    pub action_id: ActionId,
    /// Who challenged.
    pub challenger: Address,
    /// Challenger's justification.
    pub context: String,
    /// Challenger collateral.
    pub lock_id: LockId,
    /// Current or last settlement offer.
    pub offer: Option<SettlementOffer>,
    /// State.
    pub state: ChallengeState,
    /// Who escalated, if escalated.
    pub escalated_by: Option<Address>,
    /// Arbitration fee lock, if escalated with a fee.
    pub fee_lock: Option<LockId>,
    /// The dispute, if escalated.
    pub dispute: Option<Dispute>,
    /// When the challenge was raised.
    pub created_at: Timestamp,
    /// When the challenge reached a terminal state.
    pub closed_at: Option<Timestamp>,
}

impl Challenge {
    /// Fail unless the challenge is in `expected`.
    pub fn ensure_state(
        &self,
        expected: ChallengeState,
        operation: &'static str,
    ) -> AgreementResult<()> {
        if self.state == expected {
            return Ok(());
        }
        if let (ChallengeState::Disputed, Some(dispute)) = (self.state, &self.dispute) {
            return Err(AgreementError::AlreadyEscalated {
                challenge_id: self.id,
                dispute_id: dispute.id,
            });
        }
        Err(AgreementError::InvalidChallengeState {
            challenge_id: self.id,
            state: self.state,
            operation,
        })
    }

    /// Move to a terminal state.
    pub(crate) fn close(&mut self, state: ChallengeState, now: Timestamp) {
        self.state = state;
        self.closed_at = Some(now);
    }
}

/// A disputable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Identifier.
    pub id: ActionId,
    /// Disputable app that submitted the action.
    pub app: Address,
    /// App-side id.
    pub disputable_action_id: DisputableActionId,
    /// Who submitted the action and posted collateral.
    pub submitter: Address,
    /// Setting current at submission. Never changes.
    pub setting_id: SettingId,
    /// Collateral requirement of that setting at submission.
    pub collateral: CollateralRequirement,
    /// Submitter's justification.
    pub context: String,
    /// State.
    pub state: ActionState,
    /// Challenge window.
    pub window: ChallengeWindow,
    /// Submitter collateral.
    pub lock_id: LockId,
    /// Every challenge raised, oldest first. Only the last may be open.
    pub challenges: Vec<Challenge>,
    /// When the action was submitted.
    pub created_at: Timestamp,
    /// When the action reached a terminal state.
    pub closed_at: Option<Timestamp>,
}

impl Action {
    /// The open (non-terminal) challenge, if any.
    pub fn current_challenge(&self) -> Option<&Challenge> {
        self.challenges.last().filter(|c| !c.state.is_terminal())
    }

    /// A challenge of this action by id.
    pub fn challenge(&self, id: ChallengeId) -> AgreementResult<&Challenge> {
        self.challenges
            .iter()
            .find(|c| c.id == id)
            .ok_or(AgreementError::ChallengeNotFound(id))
    }

    pub(crate) fn challenge_mut(&mut self, id: ChallengeId) -> AgreementResult<&mut Challenge> {
        self.challenges
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(AgreementError::ChallengeNotFound(id))
    }

    /// Which side `caller` is on for `challenge`.
    pub fn role_of(&self, challenge: &Challenge, caller: &Address) -> Option<PartyRole> {
        if *caller == self.submitter {
            Some(PartyRole::Submitter)
        } else if *caller == challenge.challenger {
            Some(PartyRole::Challenger)
        } else {
            None
        }
    }

    /// Check a new challenge may be raised now.
    pub fn ensure_challengeable(&self, now: Timestamp) -> AgreementResult<()> {
        if let Some(open) = self.current_challenge() {
            return Err(AgreementError::AlreadyChallenged {
                action_id: self.id,
                challenge_id: open.id,
            });
        }
        if self.state != ActionState::Scheduled {
            return Err(self.invalid_state("challenge"));
        }
        if !self.window.accepts_challenge_at(now) {
            return Err(AgreementError::ChallengeWindowClosed {
                action_id: self.id,
                closed_at: self.window.ends_at().unwrap_or(now),
            });
        }
        Ok(())
    }

    /// Check the action may be executed now.
    pub fn ensure_executable(&self, now: Timestamp) -> AgreementResult<()> {
        match self.state {
            ActionState::Executed => Err(AgreementError::AlreadyExecuted(self.id)),
            ActionState::Scheduled => {
                if self.window.has_elapsed_at(now) {
                    Ok(())
                } else {
                    Err(AgreementError::ChallengeWindowOpen {
                        action_id: self.id,
                        ends_at: self.window.ends_at().unwrap_or(now),
                    })
                }
            }
            _ => Err(self.invalid_state("execute")),
        }
    }

    /// Fail unless the action is in `expected`.
    pub fn ensure_state(
        &self,
        expected: ActionState,
        operation: &'static str,
    ) -> AgreementResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> AgreementError {
        AgreementError::InvalidActionState {
            action_id: self.id,
            state: self.state,
            operation,
        }
    }

    /// Scheduled → Challenged.
    pub(crate) fn begin_challenge(&mut self, challenge: Challenge, now: Timestamp) {
        self.window.pause(now);
        self.challenges.push(challenge);
        self.state = ActionState::Challenged;
    }

    /// Challenged/Disputed → Scheduled with the remaining window.
    pub(crate) fn resume(&mut self, now: Timestamp) {
        self.window.resume(now);
        self.state = ActionState::Scheduled;
    }

    /// Enter a terminal state.
    pub(crate) fn finish(&mut self, state: ActionState, now: Timestamp) {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.closed_at = Some(now);
    }
}
