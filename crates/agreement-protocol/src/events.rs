//! # Protocol Events
//!
//! Every committed transition appends one or more [`AgreementEvent`]s to
//! the [`EventLog`]. Records carry a gap-free sequence number and the
//! protocol time at which they were committed. Rejected operations leave
//! no event behind.

use serde::{Deserialize, Serialize};

use agreement_core::{
    ActionId, Address, Amount, ChallengeId, ContentDigest, DisputeId, SettingId, Timestamp,
};

use crate::app::AppKind;
use crate::dispute::Ruling;

/// An observable protocol event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgreementEvent {
    /// A setting version was appended.
    SettingChanged { setting_id: SettingId },
    /// A disputable app was registered.
    AppRegistered { app: Address, kind: AppKind },
    /// A disputable app was activated or deactivated.
    AppStatusChanged { app: Address, active: bool },
    /// An action was submitted.
    ActionSubmitted {
        action_id: ActionId,
        setting_id: SettingId,
    },
    /// An action was challenged.
    ActionChallenged {
        action_id: ActionId,
        challenge_id: ChallengeId,
    },
    /// A settlement offer was made.
    SettlementProposed {
        challenge_id: ChallengeId,
        amount: Amount,
        expires_at: Timestamp,
    },
    /// The challenger withdrew the offer.
    SettlementWithdrawn { challenge_id: ChallengeId },
    /// The submitter rejected the offer.
    SettlementRejected { challenge_id: ChallengeId },
    /// The submitter accepted the offer.
    ActionSettled {
        action_id: ActionId,
        challenge_id: ChallengeId,
    },
    /// The challenger cancelled the challenge.
    ChallengeCancelled {
        action_id: ActionId,
        challenge_id: ChallengeId,
    },
    /// A challenge was escalated.
    DisputeCreated {
        action_id: ActionId,
        challenge_id: ChallengeId,
        dispute_id: DisputeId,
    },
    /// A party submitted evidence.
    EvidenceSubmitted {
        dispute_id: DisputeId,
        party: Address,
        digest: ContentDigest,
    },
    /// The arbitrator ruled.
    Ruled {
        dispute_id: DisputeId,
        ruling: Ruling,
    },
    /// The dispute fee was refunded or paid to the arbitrator.
    DisputeFeeSettled { dispute_id: DisputeId },
    /// The challenge window resumed.
    ActionResumed { action_id: ActionId },
    /// The action was executed.
    ActionExecuted { action_id: ActionId },
    /// The action was cancelled by ruling.
    ActionCancelled { action_id: ActionId },
    /// The app closed the action.
    ActionClosed { action_id: ActionId },
}

impl AgreementEvent {
    /// Snake-case event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SettingChanged { .. } => "setting_changed",
            Self::AppRegistered { .. } => "app_registered",
            Self::AppStatusChanged { .. } => "app_status_changed",
            Self::ActionSubmitted { .. } => "action_submitted",
            Self::ActionChallenged { .. } => "action_challenged",
            Self::SettlementProposed { .. } => "settlement_proposed",
            Self::SettlementWithdrawn { .. } => "settlement_withdrawn",
            Self::SettlementRejected { .. } => "settlement_rejected",
            Self::ActionSettled { .. } => "action_settled",
            Self::ChallengeCancelled { .. } => "challenge_cancelled",
            Self::DisputeCreated { .. } => "dispute_created",
            Self::EvidenceSubmitted { .. } => "evidence_submitted",
            Self::Ruled { .. } => "ruled",
            Self::DisputeFeeSettled { .. } => "dispute_fee_settled",
            Self::ActionResumed { .. } => "action_resumed",
            Self::ActionExecuted { .. } => "action_executed",
            Self::ActionCancelled { .. } => "action_cancelled",
            Self::ActionClosed { .. } => "action_closed",
        }
    }
}

/// A sequenced, timestamped event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, starting at 1.
    pub sequence: u64,
    /// Commit time.
    pub at: Timestamp,
    /// The event.
    #[serde(flatten)]
    pub event: AgreementEvent,
}

/// Append-only event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event` at `at`.
    pub fn push(&mut self, at: Timestamp, event: AgreementEvent) -> u64 {
        let sequence = self.records.len() as u64 + 1;
        tracing::debug!(sequence, event = event.name(), "event recorded");
        self.records.push(EventRecord {
            sequence,
            at,
            event,
        });
        sequence
    }

    /// Every record.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records after `sequence`.
    pub fn since(&self, sequence: u64) -> &[EventRecord] {
        let start = usize::try_from(sequence)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        &self.records[start..]
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Events only, in order.
    pub fn events(&self) -> impl Iterator<Item = &AgreementEvent> {
        self.records.iter().map(|r| &r.event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Timestamp {
        Timestamp::parse("2026-01-01T00:00:00Z").unwrap()
    }

    #[test]
    fn sequences_are_gap_free() {
        let mut log = EventLog::new();
        assert_eq!(log.push(t0(), AgreementEvent::SettingChanged { setting_id: SettingId::FIRST }), 1);
        assert_eq!(log.push(t0(), AgreementEvent::ActionExecuted { action_id: ActionId::FIRST }), 2);
        assert_eq!(log.since(1).len(), 1);
        assert_eq!(log.since(1)[0].event.name(), "action_executed");
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn record_serializes_flat() {
        let mut log = EventLog::new();
        log.push(t0(), AgreementEvent::Ruled {
            dispute_id: DisputeId::FIRST,
            ruling: Ruling::Refused,
        });
        let json = serde_json::to_value(&log.records()[0]).unwrap();
        assert_eq!(json["sequence"], 1);
        assert_eq!(json["event"], "ruled");
        assert_eq!(json["ruling"], "refused");
        assert_eq!(json["at"], "2026-01-01T00:00:00Z");
    }
}
