//! # Dispute Coordination
//!
//! A challenge escalated to arbitration becomes a [`Dispute`]. The
//! coordinator builds the dispute metadata (the disputable payload plus
//! the challenge context), canonicalizes and fingerprints it, and hands it
//! to the arbitrator pinned by the action's setting.
//!
//! Rulings arrive later through a single entry point that accepts exactly
//! one ruling per dispute, from the pinned arbitrator only. The ruling is
//! translated into a collateral [`SettlementPlan`] by [`ruling_plan`].
//!
//! ## Ruling codes
//!
//! | Code | Ruling |
//! |------|--------|
//! | 2 | `Refused` |
//! | 3 | `InFavorOfSubmitter` |
//! | 4 | `InFavorOfChallenger` |
//!
//! Every other code is rejected with `InvalidRuling`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use agreement_core::{
    sha256_bytes, sha256_digest, ActionId, Address, Amount, ArbitratorDisputeId, CanonicalBytes,
    ChallengeId, ContentDigest, DisputableActionId, DisputeId, LockId, SettingId, Timestamp,
};

use crate::capability::{Arbitrator, DisputeRequest};
use crate::collateral::{Disposition, SettlementPlan, SettlementReason};
use crate::error::{AgreementError, AgreementResult};

/// Number of rulings an arbitrator chooses between: submitter or challenger.
pub const POSSIBLE_RULINGS: u8 = 2;

/// Outcome of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ruling {
    /// No ruling yet.
    Pending,
    /// The arbitrator declined to decide.
    Refused,
    /// The action stands.
    InFavorOfSubmitter,
    /// The action is cancelled.
    InFavorOfChallenger,
}

impl Ruling {
    /// Decode an arbitrator ruling code.
    pub fn from_code(code: u8) -> AgreementResult<Self> {
        match code {
            2 => Ok(Self::Refused),
            3 => Ok(Self::InFavorOfSubmitter),
            4 => Ok(Self::InFavorOfChallenger),
            other => Err(AgreementError::InvalidRuling(other)),
        }
    }

    /// The arbitrator code for this ruling. `Pending` has code 0.
    pub fn code(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Refused => 2,
            Self::InFavorOfSubmitter => 3,
            Self::InFavorOfChallenger => 4,
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Refused => "refused",
            Self::InFavorOfSubmitter => "in_favor_of_submitter",
            Self::InFavorOfChallenger => "in_favor_of_challenger",
        }
    }
}

impl std::fmt::Display for Ruling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a challenge a party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    /// Submitted the action.
    Submitter,
    /// Raised the challenge.
    Challenger,
}

/// A piece of evidence, kept as a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Submitting party.
    pub party: Address,
    /// Side the party is on.
    pub role: PartyRole,
    /// SHA-256 of the evidence bytes.
    pub digest: ContentDigest,
    /// Size of the evidence in bytes.
    pub size: usize,
    /// When the evidence was submitted.
    pub submitted_at: Timestamp,
}

/// What the arbitrator is asked to decide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeMetadata {
    /// Setting the action was submitted under.
    pub setting_id: SettingId,
    /// Digest of that setting's agreement content.
    pub agreement_digest: ContentDigest,
    /// Disputed action.
    pub action_id: ActionId,
    /// App the action belongs to.
    pub app: Address,
    /// App-side action id.
    pub disputable_action_id: DisputableActionId,
    /// Who submitted the action.
    pub submitter: Address,
    /// Submitter's justification.
    pub action_context: String,
    /// The challenge.
    pub challenge_id: ChallengeId,
    /// Who challenged.
    pub challenger: Address,
    /// Challenger's justification.
    pub challenge_context: String,
    /// Party that escalated.
    pub escalated_by: Address,
    /// Last settlement amount offered, if any.
    pub settlement_offer: Option<Amount>,
}

impl DisputeMetadata {
    /// Fingerprint the canonical metadata.
    pub fn digest(&self) -> AgreementResult<ContentDigest> {
        Ok(sha256_digest(&CanonicalBytes::new(self)?))
    }
}

/// A dispute raised from a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    /// Agreement-side id.
    pub id: DisputeId,
    /// Challenge the dispute was escalated from.
    pub challenge_id: ChallengeId,
    /// Arbitrator pinned at creation. Only it may rule.
    pub arbitrator: Address,
    /// The arbitrator's own id.
    pub arbitrator_dispute_id: ArbitratorDisputeId,
    /// Fingerprint of the submitted metadata.
    pub metadata_digest: ContentDigest,
    /// Current ruling.
    pub ruling: Ruling,
    /// Evidence submitted by the parties, oldest first.
    pub evidence: Vec<EvidenceRecord>,
    /// When the dispute was created.
    pub created_at: Timestamp,
    /// When the ruling was recorded.
    pub ruled_at: Option<Timestamp>,
}

impl Dispute {
    /// Whether the dispute still awaits a ruling.
    pub fn is_pending(&self) -> bool {
        self.ruling == Ruling::Pending
    }

    /// Fail with `DisputeClosed` once ruled.
    pub fn ensure_open(&self) -> AgreementResult<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(AgreementError::DisputeClosed {
                dispute_id: self.id,
                ruling: self.ruling,
            })
        }
    }

    /// Append an evidence record.
    pub(crate) fn record_evidence(
        &mut self,
        party: Address,
        role: PartyRole,
        evidence: &[u8],
        now: Timestamp,
    ) -> EvidenceRecord {
        let record = EvidenceRecord {
            party,
            role,
            digest: sha256_bytes(evidence),
            size: evidence.len(),
            submitted_at: now,
        };
        self.evidence.push(record.clone());
        record
    }

    /// Check a ruling may be recorded by `caller`.
    pub fn check_ruling(&self, caller: &Address, ruling: Ruling) -> AgreementResult<()> {
        if *caller != self.arbitrator {
            return Err(AgreementError::UnauthorizedRuling {
                caller: *caller,
                dispute_id: self.id,
            });
        }
        if !self.is_pending() {
            return Err(AgreementError::AlreadyRuled {
                dispute_id: self.id,
                ruling: self.ruling,
            });
        }
        if ruling == Ruling::Pending {
            return Err(AgreementError::InvalidRuling(ruling.code()));
        }
        Ok(())
    }

    pub(crate) fn record_ruling(&mut self, ruling: Ruling, now: Timestamp) {
        self.ruling = ruling;
        self.ruled_at = Some(now);
    }
}

/// Parties and locks a ruling settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulingParties {
    /// Action submitter.
    pub submitter: Address,
    /// Challenger.
    pub challenger: Address,
    /// Submitter collateral.
    pub submitter_lock: LockId,
    /// Challenger collateral.
    pub challenger_lock: LockId,
    /// Arbitration fee, if one was charged.
    pub fee_lock: Option<LockId>,
    /// Party that paid the fee.
    pub escalated_by: Address,
    /// Receives the fee when the escalating party loses.
    pub arbitrator: Address,
    /// Receives slashed challenger collateral.
    pub slash_beneficiary: Address,
}

/// Collateral dispositions for a ruling.
///
/// - `InFavorOfSubmitter`: challenger slashed to the beneficiary. The
///   submitter's collateral stays locked for the resumed action.
/// - `InFavorOfChallenger`: submitter slashed to the challenger,
///   challenger released.
/// - `Refused`: challenger released. The submitter's collateral stays
///   locked for the resumed action.
///
/// Both locks are in the action's pinned token, so the plan is a single
/// pool batch. The dispute fee is settled separately by [`fee_plan`].
pub fn ruling_plan(dispute: DisputeId, ruling: Ruling, p: &RulingParties) -> SettlementPlan {
    let plan = SettlementPlan::new(SettlementReason::Ruling(dispute));
    match ruling {
        Ruling::InFavorOfSubmitter => plan.with(Disposition::Slash {
            lock: p.challenger_lock,
            to: p.slash_beneficiary,
        }),
        Ruling::InFavorOfChallenger => plan
            .with(Disposition::Slash {
                lock: p.submitter_lock,
                to: p.challenger,
            })
            .with(Disposition::Release {
                lock: p.challenger_lock,
                to: p.challenger,
            }),
        Ruling::Refused | Ruling::Pending => plan.with(Disposition::Release {
            lock: p.challenger_lock,
            to: p.challenger,
        }),
    }
}

/// Disposition of the dispute fee, if one was charged.
///
/// The fee goes back to the escalating party if it prevailed or the
/// ruling is `Refused`, and to the arbitrator otherwise.
pub fn fee_plan(dispute: DisputeId, ruling: Ruling, p: &RulingParties) -> Option<SettlementPlan> {
    let lock = p.fee_lock?;
    let winner = match ruling {
        Ruling::InFavorOfSubmitter => Some(p.submitter),
        Ruling::InFavorOfChallenger => Some(p.challenger),
        Ruling::Refused | Ruling::Pending => None,
    };
    let disposition = match winner {
        Some(w) if w != p.escalated_by => Disposition::Slash {
            lock,
            to: p.arbitrator,
        },
        _ => Disposition::Release {
            lock,
            to: p.escalated_by,
        },
    };
    Some(SettlementPlan::new(SettlementReason::DisputeFee(dispute)).with(disposition))
}

/// Index of disputes and the bridge to the arbitrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisputeCoordinator {
    index: BTreeMap<DisputeId, ChallengeId>,
    last_issued: Option<DisputeId>,
}

impl DisputeCoordinator {
    /// An empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next dispute will receive. Ids handed to an arbitrator are
    /// never issued again, even if the dispute was refused.
    pub fn next_id(&self) -> DisputeId {
        self.last_issued
            .map(|id| id.next())
            .unwrap_or(DisputeId::FIRST)
    }

    /// Challenge a dispute was raised from.
    pub fn challenge_of(&self, id: DisputeId) -> AgreementResult<ChallengeId> {
        self.index
            .get(&id)
            .copied()
            .ok_or(AgreementError::DisputeNotFound(id))
    }

    /// Number of disputes created.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no dispute was created.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Build the request for the next dispute, consuming its id.
    pub fn prepare(&mut self, metadata: DisputeMetadata) -> AgreementResult<DisputeRequest> {
        let metadata_digest = metadata.digest()?;
        let dispute_id = self.next_id();
        self.last_issued = Some(dispute_id);
        Ok(DisputeRequest {
            dispute_id,
            possible_rulings: POSSIBLE_RULINGS,
            metadata,
            metadata_digest,
        })
    }

    /// Hand the request to the arbitrator.
    pub fn submit(
        &self,
        arbitrator: &dyn Arbitrator,
        address: Address,
        request: &DisputeRequest,
    ) -> AgreementResult<ArbitratorDisputeId> {
        arbitrator.create_dispute(request).map_err(|err| {
            tracing::warn!(arbitrator = %address, dispute = %request.dispute_id, error = %err, "arbitrator rejected dispute");
            AgreementError::ArbitratorRejected {
                arbitrator: address,
                reason: err.to_string(),
            }
        })
    }

    pub(crate) fn register(&mut self, id: DisputeId, challenge: ChallengeId) {
        self.index.insert(id, challenge);
    }
}
