//! # Collateral Manager
//!
//! Ledger of every collateral lock the agreement has taken against a
//! staking pool. A lock moves from `Locked` to exactly one terminal status
//! (`Released`, `Slashed` or `Split`) exactly once, and the disbursements
//! recorded when it settles always sum to the locked amount.
//!
//! Transitions that move several locks at once build a [`SettlementPlan`].
//! The manager groups the plan's dispositions by token and submits one
//! batch per staking pool; each batch is atomic on the pool side. When a
//! later pool fails after an earlier one succeeded, the locks of the
//! successful pool are already recorded as settled under the plan's
//! [`SettlementReason`]. Retrying the same transition then skips those
//! locks instead of moving them twice, while any other caller that tries
//! to settle them gets [`AgreementError::AlreadySettled`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use agreement_core::{
    ActionId, Address, Amount, ChallengeId, DisputeId, LockId, Timestamp, TokenId,
};

use crate::capability::{Movement, StakingFactory, StakingPool};
use crate::error::{AgreementError, AgreementResult};

/// What a lock secures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LockOwner {
    /// Submitter collateral of an action.
    Action(ActionId),
    /// Challenger collateral.
    Challenge(ChallengeId),
    /// Arbitration fee posted by the escalating party.
    DisputeFee(ChallengeId),
}

/// Lifecycle of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// Held by the pool.
    Locked,
    /// Returned in full.
    Released,
    /// Transferred in full to a beneficiary.
    Slashed,
    /// Partly transferred, remainder returned to the payer.
    Split,
}

impl LockStatus {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Released => "released",
            Self::Slashed => "slashed",
            Self::Split => "split",
        }
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing transfer recorded when a lock settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disbursement {
    /// Recipient.
    pub to: Address,
    /// Amount.
    pub amount: Amount,
    /// Whether the transfer was a penalty rather than a refund.
    pub slashed: bool,
}

/// A single collateral lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralLock {
    /// Identifier.
    pub id: LockId,
    /// What the lock secures.
    pub owner: LockOwner,
    /// Whose stake is locked.
    pub payer: Address,
    /// Pool token.
    pub token: TokenId,
    /// Locked amount.
    pub amount: Amount,
    /// Current status.
    pub status: LockStatus,
    /// Transfers made at settlement. Empty while locked.
    pub disbursements: Vec<Disbursement>,
    /// When the lock was taken.
    pub locked_at: Timestamp,
    /// When the lock settled.
    pub settled_at: Option<Timestamp>,
    /// Transition that settled the lock.
    pub settled_by: Option<SettlementReason>,
}

impl CollateralLock {
    /// Whether the lock still holds stake.
    pub fn is_locked(&self) -> bool {
        self.status == LockStatus::Locked
    }

    /// Sum of recorded disbursements.
    pub fn disbursed_total(&self) -> Amount {
        Amount::new(self.disbursements.iter().map(|d| d.amount.get()).sum())
    }
}

/// How a single lock should settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    /// Return the full amount to `to`.
    Release {
        /// Lock to settle.
        lock: LockId,
        /// Recipient, usually the payer.
        to: Address,
    },
    /// Transfer the full amount to `to` as a penalty.
    Slash {
        /// Lock to settle.
        lock: LockId,
        /// Beneficiary.
        to: Address,
    },
    /// Transfer `slashed` to `to` and return the rest to the payer.
    Split {
        /// Lock to settle.
        lock: LockId,
        /// Portion transferred to `to`.
        slashed: Amount,
        /// Beneficiary of the slashed portion.
        to: Address,
    },
}

impl Disposition {
    /// Lock this disposition settles.
    pub fn lock_id(&self) -> LockId {
        match self {
            Self::Release { lock, .. } | Self::Slash { lock, .. } | Self::Split { lock, .. } => {
                *lock
            }
        }
    }

    fn status(&self) -> LockStatus {
        match self {
            Self::Release { .. } => LockStatus::Released,
            Self::Slash { .. } => LockStatus::Slashed,
            Self::Split { .. } => LockStatus::Split,
        }
    }

    fn disbursements(&self, lock: &CollateralLock) -> AgreementResult<Vec<Disbursement>> {
        let out = match self {
            Self::Release { to, .. } => vec![Disbursement {
                to: *to,
                amount: lock.amount,
                slashed: false,
            }],
            Self::Slash { to, .. } => vec![Disbursement {
                to: *to,
                amount: lock.amount,
                slashed: true,
            }],
            Self::Split { slashed, to, .. } => {
                if *slashed > lock.amount {
                    return Err(AgreementError::InvalidSettlementAmount {
                        requested: *slashed,
                        max: lock.amount,
                    });
                }
                let remainder = lock.amount.checked_sub(*slashed)?;
                vec![
                    Disbursement {
                        to: *to,
                        amount: *slashed,
                        slashed: true,
                    },
                    Disbursement {
                        to: lock.payer,
                        amount: remainder,
                        slashed: false,
                    },
                ]
            }
        };
        Ok(out.into_iter().filter(|d| !d.amount.is_zero()).collect())
    }
}

/// The transition on whose behalf a plan runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SettlementReason {
    /// A standalone release, slash or split. Never resumed.
    Direct,
    /// Undoing a fresh lock after a later external call failed.
    Compensation(LockId),
    /// Action executed.
    Execute(ActionId),
    /// Action closed by its app.
    Close(ActionId),
    /// Settlement offer accepted.
    Settle(ChallengeId),
    /// Challenge cancelled by the challenger.
    CancelChallenge(ChallengeId),
    /// Arbitrator ruling applied.
    Ruling(DisputeId),
    /// Dispute fee routed after a ruling.
    DisputeFee(DisputeId),
}

impl SettlementReason {
    fn is_resumable(&self) -> bool {
        !matches!(self, Self::Direct)
    }
}

/// A set of dispositions applied on behalf of one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    /// Owning transition.
    pub reason: SettlementReason,
    /// Dispositions, at most one per lock.
    pub dispositions: Vec<Disposition>,
}

impl SettlementPlan {
    /// An empty plan for `reason`.
    pub fn new(reason: SettlementReason) -> Self {
        Self {
            reason,
            dispositions: Vec::new(),
        }
    }

    /// Append a disposition.
    pub fn with(mut self, disposition: Disposition) -> Self {
        self.dispositions.push(disposition);
        self
    }

    /// Append a disposition if present.
    pub fn with_opt(self, disposition: Option<Disposition>) -> Self {
        match disposition {
            Some(d) => self.with(d),
            None => self,
        }
    }
}

struct Pending {
    lock: LockId,
    payer: Address,
    status: LockStatus,
    disbursements: Vec<Disbursement>,
}

/// Ledger of all collateral locks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateralManager {
    locks: BTreeMap<LockId, CollateralLock>,
}

impl CollateralManager {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `amount` of `payer`'s stake in `pool`.
    ///
    /// Pool refusals surface as `InsufficientAllowance` /
    /// `InsufficientBalance` and leave the ledger untouched.
    pub fn lock(
        &mut self,
        pool: &dyn StakingPool,
        owner: LockOwner,
        payer: Address,
        amount: Amount,
        now: Timestamp,
    ) -> AgreementResult<LockId> {
        if !amount.is_zero() {
            pool.lock(&payer, amount)?;
        }
        let id = self
            .locks
            .keys()
            .next_back()
            .map(|id| id.next())
            .unwrap_or(LockId::FIRST);
        self.locks.insert(
            id,
            CollateralLock {
                id,
                owner,
                payer,
                token: pool.token(),
                amount,
                status: LockStatus::Locked,
                disbursements: Vec::new(),
                locked_at: now,
                settled_at: None,
                settled_by: None,
            },
        );
        tracing::debug!(lock = %id, payer = %payer, amount = %amount, token = %pool.token(), "collateral locked");
        Ok(id)
    }

    /// Return the full lock to `to`.
    pub fn release(
        &mut self,
        factory: &dyn StakingFactory,
        lock: LockId,
        to: Address,
        now: Timestamp,
    ) -> AgreementResult<()> {
        self.settle(
            factory,
            &SettlementPlan::new(SettlementReason::Direct).with(Disposition::Release { lock, to }),
            now,
        )
    }

    /// Transfer the full lock to `to`.
    pub fn slash(
        &mut self,
        factory: &dyn StakingFactory,
        lock: LockId,
        to: Address,
        now: Timestamp,
    ) -> AgreementResult<()> {
        self.settle(
            factory,
            &SettlementPlan::new(SettlementReason::Direct).with(Disposition::Slash { lock, to }),
            now,
        )
    }

    /// Transfer `slashed` to `to`, remainder back to the payer.
    pub fn split(
        &mut self,
        factory: &dyn StakingFactory,
        lock: LockId,
        slashed: Amount,
        to: Address,
        now: Timestamp,
    ) -> AgreementResult<()> {
        self.settle(
            factory,
            &SettlementPlan::new(SettlementReason::Direct).with(Disposition::Split {
                lock,
                slashed,
                to,
            }),
            now,
        )
    }

    /// Release a lock taken earlier in the same operation back to its payer.
    pub(crate) fn compensate(
        &mut self,
        factory: &dyn StakingFactory,
        lock: LockId,
        now: Timestamp,
    ) -> AgreementResult<()> {
        let payer = self.get(lock)?.payer;
        tracing::warn!(lock = %lock, payer = %payer, "compensating fresh collateral lock");
        self.settle(
            factory,
            &SettlementPlan::new(SettlementReason::Compensation(lock))
                .with(Disposition::Release { lock, to: payer }),
            now,
        )
    }

    /// Apply a plan, one atomic batch per token pool.
    pub fn settle(
        &mut self,
        factory: &dyn StakingFactory,
        plan: &SettlementPlan,
        now: Timestamp,
    ) -> AgreementResult<()> {
        let mut seen = BTreeSet::new();
        let mut by_token: BTreeMap<TokenId, Vec<Pending>> = BTreeMap::new();

        for disposition in &plan.dispositions {
            let id = disposition.lock_id();
            let lock = self.get(id)?;
            let status = disposition.status();
            if !seen.insert(id) {
                return Err(AgreementError::AlreadySettled {
                    lock_id: id,
                    status,
                });
            }
            let disbursements = disposition.disbursements(lock)?;

            if !lock.is_locked() {
                let same_transition = plan.reason.is_resumable()
                    && lock.settled_by.as_ref() == Some(&plan.reason)
                    && lock.status == status
                    && lock.disbursements == disbursements;
                if same_transition {
                    tracing::debug!(lock = %id, "lock already settled by this transition, skipping");
                    continue;
                }
                return Err(AgreementError::AlreadySettled {
                    lock_id: id,
                    status: lock.status,
                });
            }

            by_token.entry(lock.token.clone()).or_default().push(Pending {
                lock: id,
                payer: lock.payer,
                status,
                disbursements,
            });
        }

        for (token, batch) in by_token {
            let movements: Vec<Movement> = batch
                .iter()
                .flat_map(|p| {
                    p.disbursements.iter().map(move |d| Movement {
                        from: p.payer,
                        to: d.to,
                        amount: d.amount,
                    })
                })
                .collect();

            if !movements.is_empty() {
                let pool = factory.pool(&token)?;
                if let Err(err) = pool.settle(&movements) {
                    tracing::warn!(token = %token, error = %err, "staking pool refused settlement batch");
                    return Err(err.into());
                }
            }

            for pending in batch {
                if let Some(lock) = self.locks.get_mut(&pending.lock) {
                    lock.status = pending.status;
                    lock.disbursements = pending.disbursements;
                    lock.settled_at = Some(now);
                    lock.settled_by = Some(plan.reason.clone());
                    tracing::debug!(lock = %lock.id, status = %lock.status, "collateral settled");
                }
            }
        }
        Ok(())
    }

    /// A lock by id.
    pub fn get(&self, id: LockId) -> AgreementResult<&CollateralLock> {
        self.locks.get(&id).ok_or(AgreementError::LockNotFound(id))
    }

    /// All locks in id order.
    pub fn iter(&self) -> impl Iterator<Item = &CollateralLock> {
        self.locks.values()
    }

    /// Locks securing `owner`.
    pub fn owned_by(&self, owner: LockOwner) -> impl Iterator<Item = &CollateralLock> {
        self.locks.values().filter(move |l| l.owner == owner)
    }

    /// Total still locked in `token`.
    pub fn outstanding(&self, token: &TokenId) -> Amount {
        Amount::new(
            self.locks
                .values()
                .filter(|l| l.is_locked() && &l.token == token)
                .map(|l| l.amount.get())
                .sum(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStaking;

    fn ant() -> TokenId {
        TokenId::new("ANT").unwrap()
    }

    fn dai() -> TokenId {
        TokenId::new("DAI").unwrap()
    }

    fn now() -> Timestamp {
        Timestamp::parse("2026-01-01T00:00:00Z").unwrap()
    }

    fn funded(owner: Address) -> InMemoryStaking {
        let staking = InMemoryStaking::new();
        staking.fund(&ant(), owner, Amount::new(1_000));
        staking.fund(&dai(), owner, Amount::new(1_000));
        staking
    }

    #[test]
    fn lock_then_release_restores_balance() {
        let alice = Address::from_label("alice");
        let staking = funded(alice);
        let pool = staking.pool_handle(&ant());
        let mut ledger = CollateralManager::new();

        let id = ledger
            .lock(&*pool, LockOwner::Action(ActionId::FIRST), alice, Amount::new(100), now())
            .unwrap();
        assert_eq!(pool.available_balance(&alice), Amount::new(900));
        assert_eq!(ledger.outstanding(&ant()), Amount::new(100));

        ledger.release(&staking, id, alice, now()).unwrap();
        assert_eq!(pool.available_balance(&alice), Amount::new(1_000));
        assert_eq!(ledger.get(id).unwrap().status, LockStatus::Released);
        assert_eq!(ledger.get(id).unwrap().disbursed_total(), Amount::new(100));
    }

    #[test]
    fn second_settlement_fails_already_settled() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let staking = funded(alice);
        let pool = staking.pool_handle(&ant());
        let mut ledger = CollateralManager::new();
        let id = ledger
            .lock(&*pool, LockOwner::Action(ActionId::FIRST), alice, Amount::new(100), now())
            .unwrap();

        ledger.slash(&staking, id, bob, now()).unwrap();
        assert_eq!(
            ledger.release(&staking, id, alice, now()).unwrap_err(),
            AgreementError::AlreadySettled {
                lock_id: id,
                status: LockStatus::Slashed
            }
        );
        assert_eq!(pool.available_balance(&bob), Amount::new(100));
    }

    #[test]
    fn split_returns_remainder_to_payer() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let staking = funded(alice);
        let pool = staking.pool_handle(&ant());
        let mut ledger = CollateralManager::new();
        let id = ledger
            .lock(&*pool, LockOwner::Action(ActionId::FIRST), alice, Amount::new(100), now())
            .unwrap();

        ledger.split(&staking, id, Amount::new(40), bob, now()).unwrap();
        assert_eq!(pool.available_balance(&bob), Amount::new(40));
        assert_eq!(pool.available_balance(&alice), Amount::new(960));
        let lock = ledger.get(id).unwrap();
        assert_eq!(lock.status, LockStatus::Split);
        assert_eq!(lock.disbursed_total(), lock.amount);
    }

    #[test]
    fn split_above_locked_amount_is_rejected() {
        let alice = Address::from_label("alice");
        let staking = funded(alice);
        let pool = staking.pool_handle(&ant());
        let mut ledger = CollateralManager::new();
        let id = ledger
            .lock(&*pool, LockOwner::Action(ActionId::FIRST), alice, Amount::new(10), now())
            .unwrap();
        assert!(matches!(
            ledger.split(&staking, id, Amount::new(11), alice, now()),
            Err(AgreementError::InvalidSettlementAmount { .. })
        ));
        assert!(ledger.get(id).unwrap().is_locked());
    }

    #[test]
    fn unknown_lock_is_not_found() {
        let staking = InMemoryStaking::new();
        let mut ledger = CollateralManager::new();
        assert_eq!(
            ledger
                .release(&staking, LockId::new(9), Address::from_label("x"), now())
                .unwrap_err(),
            AgreementError::LockNotFound(LockId::new(9))
        );
    }

    #[test]
    fn insufficient_allowance_leaves_no_lock() {
        let carol = Address::from_label("carol");
        let staking = InMemoryStaking::new();
        staking.deposit(&ant(), carol, Amount::new(500));
        let pool = staking.pool_handle(&ant());
        let mut ledger = CollateralManager::new();
        let err = ledger
            .lock(&*pool, LockOwner::Action(ActionId::FIRST), carol, Amount::new(100), now())
            .unwrap_err();
        assert!(matches!(err, AgreementError::InsufficientAllowance { .. }));
        assert_eq!(ledger.iter().count(), 0);
    }

    #[test]
    fn failed_second_pool_resumes_without_double_movement() {
        let alice = Address::from_label("alice");
        let court = Address::from_label("court");
        let staking = funded(alice);
        let ant_pool = staking.pool_handle(&ant());
        let dai_pool = staking.pool_handle(&dai());
        let mut ledger = CollateralManager::new();

        let a = ledger
            .lock(&*ant_pool, LockOwner::Action(ActionId::FIRST), alice, Amount::new(100), now())
            .unwrap();
        let fee = ledger
            .lock(&*dai_pool, LockOwner::DisputeFee(ChallengeId::FIRST), alice, Amount::new(30), now())
            .unwrap();

        let plan = SettlementPlan::new(SettlementReason::Ruling(DisputeId::FIRST))
            .with(Disposition::Release { lock: a, to: alice })
            .with(Disposition::Slash { lock: fee, to: court });

        dai_pool.fail_next_settle("maintenance");
        assert!(matches!(
            ledger.settle(&staking, &plan, now()),
            Err(AgreementError::Pool(_))
        ));
        assert_eq!(ledger.get(a).unwrap().status, LockStatus::Released);
        assert!(ledger.get(fee).unwrap().is_locked());

        ledger.settle(&staking, &plan, now()).unwrap();
        assert_eq!(ant_pool.available_balance(&alice), Amount::new(1_000));
        assert_eq!(dai_pool.available_balance(&court), Amount::new(30));

        // A different transition may not claim the already-settled lock.
        let other = SettlementPlan::new(SettlementReason::Execute(ActionId::FIRST))
            .with(Disposition::Release { lock: a, to: alice });
        assert!(matches!(
            ledger.settle(&staking, &other, now()),
            Err(AgreementError::AlreadySettled { .. })
        ));
    }

    #[test]
    fn zero_amount_lock_settles_without_pool_traffic() {
        let alice = Address::from_label("alice");
        let staking = InMemoryStaking::new();
        let pool = staking.pool_handle(&ant());
        let mut ledger = CollateralManager::new();
        let id = ledger
            .lock(&*pool, LockOwner::Action(ActionId::FIRST), alice, Amount::ZERO, now())
            .unwrap();
        ledger.release(&staking, id, alice, now()).unwrap();
        assert_eq!(ledger.get(id).unwrap().status, LockStatus::Released);
        assert!(ledger.get(id).unwrap().disbursements.is_empty());
    }
}
