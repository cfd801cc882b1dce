//! # Challenge Settlement
//!
//! The challenger may put a settlement offer on the table: the submitter
//! gives up `amount` of their collateral to the challenger and the action
//! is resolved without arbitration. At most one offer is live at a time.
//!
//! How an offer interacts with escalation is governed by
//! [`SettlementPrecedence`]:
//!
//! | | accept at `now == expires_at` | escalate while offer live |
//! |---|---|---|
//! | `offer_first` (default) | allowed | `SettlementPending` |
//! | `escalation_first` | `OfferExpired` | allowed, offer superseded |

use serde::{Deserialize, Serialize};

use agreement_core::{Amount, Timestamp};

use crate::action::Challenge;
use crate::error::{AgreementError, AgreementResult};

/// Tie-break between a live settlement offer and escalation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPrecedence {
    /// Offers are acceptable through their expiry instant and block escalation.
    #[default]
    OfferFirst,
    /// Offers are acceptable strictly before expiry; escalation supersedes them.
    EscalationFirst,
}

impl SettlementPrecedence {
    /// Whether an offer expiring at `expires_at` can still be accepted at `now`.
    pub fn offer_acceptable_at(&self, expires_at: Timestamp, now: Timestamp) -> bool {
        match self {
            Self::OfferFirst => now <= expires_at,
            Self::EscalationFirst => now < expires_at,
        }
    }

    /// Whether a live offer prevents escalation.
    pub fn offer_blocks_escalation(&self) -> bool {
        matches!(self, Self::OfferFirst)
    }
}

/// Status of a settlement offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    /// On the table until expiry.
    Standing,
    /// Withdrawn by the challenger.
    Withdrawn,
    /// Rejected by the submitter.
    Rejected,
    /// Accepted by the submitter.
    Accepted,
    /// Dropped because the challenge was escalated or cancelled.
    Superseded,
}

/// Terms of an offer as proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTerms {
    /// Collateral the submitter forfeits to the challenger.
    pub amount: Amount,
    /// Last instant the offer may be accepted.
    pub expires_at: Timestamp,
}

/// A settlement offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOffer {
    /// Amount forfeited on acceptance.
    pub amount: Amount,
    /// Expiry.
    pub expires_at: Timestamp,
    /// When the offer was made.
    pub proposed_at: Timestamp,
    /// Status.
    pub status: OfferStatus,
}

impl SettlementOffer {
    /// Whether the offer is standing and unexpired at `now`.
    pub fn is_live(&self, precedence: SettlementPrecedence, now: Timestamp) -> bool {
        self.status == OfferStatus::Standing && precedence.offer_acceptable_at(self.expires_at, now)
    }
}

/// Check terms against the submitter's collateral and the clock.
pub fn validate_terms(terms: &SettlementTerms, max: Amount, now: Timestamp) -> AgreementResult<()> {
    if terms.amount > max {
        return Err(AgreementError::InvalidSettlementAmount {
            requested: terms.amount,
            max,
        });
    }
    if terms.expires_at <= now {
        return Err(AgreementError::InvalidOfferExpiry {
            expires_at: terms.expires_at,
            now,
        });
    }
    Ok(())
}

impl Challenge {
    /// The live offer at `now`, if any.
    pub fn live_offer(
        &self,
        precedence: SettlementPrecedence,
        now: Timestamp,
    ) -> Option<&SettlementOffer> {
        self.offer.as_ref().filter(|o| o.is_live(precedence, now))
    }

    /// Put a new offer on the table, replacing a dead one.
    pub(crate) fn propose(
        &mut self,
        terms: SettlementTerms,
        precedence: SettlementPrecedence,
        now: Timestamp,
    ) -> AgreementResult<()> {
        if let Some(live) = self.live_offer(precedence, now) {
            return Err(AgreementError::OfferStandingRejected {
                challenge_id: self.id,
                expires_at: live.expires_at,
            });
        }
        self.offer = Some(SettlementOffer {
            amount: terms.amount,
            expires_at: terms.expires_at,
            proposed_at: now,
            status: OfferStatus::Standing,
        });
        Ok(())
    }

    /// Take the live offer off the table with `status`.
    pub(crate) fn retract(
        &mut self,
        status: OfferStatus,
        precedence: SettlementPrecedence,
        now: Timestamp,
    ) -> AgreementResult<SettlementOffer> {
        let id = self.id;
        let offer = self
            .offer
            .as_mut()
            .filter(|o| o.is_live(precedence, now))
            .ok_or(AgreementError::NoStandingOffer(id))?;
        offer.status = status;
        Ok(*offer)
    }

    /// The offer the submitter may accept at `now`.
    pub(crate) fn acceptable_offer(
        &self,
        precedence: SettlementPrecedence,
        now: Timestamp,
    ) -> AgreementResult<SettlementOffer> {
        match self.offer {
            Some(o) if o.status == OfferStatus::Standing => {
                if precedence.offer_acceptable_at(o.expires_at, now) {
                    Ok(o)
                } else {
                    Err(AgreementError::OfferExpired {
                        challenge_id: self.id,
                        expired_at: o.expires_at,
                    })
                }
            }
            _ => Err(AgreementError::NoStandingOffer(self.id)),
        }
    }

    /// Mark a still-standing offer as superseded.
    pub(crate) fn supersede_offer(&mut self) {
        if let Some(o) = self.offer.as_mut().filter(|o| o.status == OfferStatus::Standing) {
            o.status = OfferStatus::Superseded;
        }
    }

    /// Fail with `SettlementPending` if a live offer blocks escalation.
    pub(crate) fn ensure_escalation_unblocked(
        &self,
        precedence: SettlementPrecedence,
        now: Timestamp,
    ) -> AgreementResult<()> {
        if !precedence.offer_blocks_escalation() {
            return Ok(());
        }
        match self.live_offer(precedence, now) {
            Some(o) => Err(AgreementError::SettlementPending {
                challenge_id: self.id,
                expires_at: o.expires_at,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ChallengeState;
    use agreement_core::{ActionId, Address, ChallengeId, LockId};

    fn t0() -> Timestamp {
        Timestamp::parse("2026-01-01T00:00:00Z").unwrap()
    }

    fn challenge() -> Challenge {
        Challenge {
            id: ChallengeId::FIRST,
            action_id: ActionId::FIRST,
            challenger: Address::from_label("bob"),
            context: String::new(),
            lock_id: LockId::new(2),
            offer: None,
            state: ChallengeState::Open,
            escalated_by: None,
            fee_lock: None,
            dispute: None,
            created_at: t0(),
            closed_at: None,
        }
    }

    fn terms(amount: u128, secs: u64) -> SettlementTerms {
        SettlementTerms {
            amount: Amount::new(amount),
            expires_at: t0().plus_secs(secs),
        }
    }

    #[test]
    fn amount_capped_by_submitter_collateral() {
        assert!(validate_terms(&terms(100, 10), Amount::new(100), t0()).is_ok());
        assert!(matches!(
            validate_terms(&terms(101, 10), Amount::new(100), t0()),
            Err(AgreementError::InvalidSettlementAmount { .. })
        ));
        assert!(matches!(
            validate_terms(&terms(1, 0), Amount::new(100), t0()),
            Err(AgreementError::InvalidOfferExpiry { .. })
        ));
    }

    #[test]
    fn only_one_live_offer() {
        let p = SettlementPrecedence::OfferFirst;
        let mut c = challenge();
        c.propose(terms(40, 60), p, t0()).unwrap();
        assert!(matches!(
            c.propose(terms(30, 120), p, t0().plus_secs(10)),
            Err(AgreementError::OfferStandingRejected { .. })
        ));
        // Once expired, a new offer may replace it.
        c.propose(terms(30, 120), p, t0().plus_secs(61)).unwrap();
        assert_eq!(c.offer.unwrap().amount, Amount::new(30));
    }

    #[test]
    fn expiry_instant_depends_on_precedence() {
        let mut c = challenge();
        c.propose(terms(40, 60), SettlementPrecedence::OfferFirst, t0())
            .unwrap();
        let at_expiry = t0().plus_secs(60);
        assert!(c
            .acceptable_offer(SettlementPrecedence::OfferFirst, at_expiry)
            .is_ok());
        assert!(matches!(
            c.acceptable_offer(SettlementPrecedence::EscalationFirst, at_expiry),
            Err(AgreementError::OfferExpired { .. })
        ));
    }

    #[test]
    fn rejected_offer_is_not_acceptable() {
        let p = SettlementPrecedence::OfferFirst;
        let mut c = challenge();
        c.propose(terms(40, 60), p, t0()).unwrap();
        c.retract(OfferStatus::Rejected, p, t0().plus_secs(1)).unwrap();
        assert_eq!(
            c.acceptable_offer(p, t0().plus_secs(2)).unwrap_err(),
            AgreementError::NoStandingOffer(ChallengeId::FIRST)
        );
        assert!(c.ensure_escalation_unblocked(p, t0().plus_secs(2)).is_ok());
    }

    #[test]
    fn live_offer_blocks_escalation_only_when_offer_first() {
        let mut c = challenge();
        c.propose(terms(40, 60), SettlementPrecedence::OfferFirst, t0())
            .unwrap();
        assert!(matches!(
            c.ensure_escalation_unblocked(SettlementPrecedence::OfferFirst, t0().plus_secs(60)),
            Err(AgreementError::SettlementPending { .. })
        ));
        assert!(c
            .ensure_escalation_unblocked(SettlementPrecedence::EscalationFirst, t0().plus_secs(1))
            .is_ok());
        c.supersede_offer();
        assert_eq!(c.offer.unwrap().status, OfferStatus::Superseded);
    }
}
