//! # In-Memory Collaborators
//!
//! Process-local implementations of every collaborator trait, used by the
//! scenario simulator and by tests. State lives behind
//! `parking_lot::Mutex` so a collaborator can be shared between the
//! [`crate::CollaboratorDirectory`] and the test that inspects it.
//!
//! Each collaborator can be told to misbehave (refuse the next call) so
//! the protocol's compensation and resumption paths can be exercised.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use agreement_core::{
    sha256_bytes, ActionId, Address, Amount, ArbitratorDisputeId, ContentDigest, TokenId,
};

use crate::app::{AppNotification, DisputableHooks};
use crate::capability::{
    Arbitrator, ArbitratorError, CashierError, DisputeFees, DisputeRequest, FeeCashier, Movement,
    PoolError, StakingFactory, StakingPool,
};

// ── Staking ────────────────────────────────────────────────────────────

/// One owner's position in a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StakeAccount {
    /// Unlocked stake.
    pub available: Amount,
    /// Stake locked by the agreement.
    pub locked: Amount,
    /// How much more the agreement may lock.
    pub allowance: Amount,
}

#[derive(Debug, Default)]
struct PoolState {
    accounts: BTreeMap<Address, StakeAccount>,
    fail_next_settle: Option<String>,
}

/// A single-token staking pool.
#[derive(Debug)]
pub struct InMemoryPool {
    token: TokenId,
    state: Mutex<PoolState>,
}

impl InMemoryPool {
    /// An empty pool for `token`.
    pub fn new(token: TokenId) -> Self {
        Self {
            token,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Credit `amount` of available stake to `owner`.
    pub fn deposit(&self, owner: Address, amount: Amount) {
        let mut state = self.state.lock();
        let account = state.accounts.entry(owner).or_default();
        account.available = Amount::new(account.available.get().saturating_add(amount.get()));
    }

    /// Set how much the agreement may lock from `owner`.
    pub fn approve(&self, owner: Address, amount: Amount) {
        self.state.lock().accounts.entry(owner).or_default().allowance = amount;
    }

    /// Snapshot of `owner`'s position.
    pub fn account(&self, owner: &Address) -> StakeAccount {
        self.state
            .lock()
            .accounts
            .get(owner)
            .copied()
            .unwrap_or_default()
    }

    /// Sum of available and locked stake over all owners.
    pub fn total_stake(&self) -> Amount {
        Amount::new(
            self.state
                .lock()
                .accounts
                .values()
                .map(|a| a.available.get() + a.locked.get())
                .sum(),
        )
    }

    /// Refuse the next settlement batch.
    pub fn fail_next_settle(&self, reason: &str) {
        self.state.lock().fail_next_settle = Some(reason.to_string());
    }
}

impl StakingPool for InMemoryPool {
    fn token(&self) -> TokenId {
        self.token.clone()
    }

    fn lock(&self, payer: &Address, amount: Amount) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let account = state.accounts.entry(*payer).or_default();
        if account.allowance < amount {
            return Err(PoolError::InsufficientAllowance {
                owner: *payer,
                token: self.token.clone(),
                required: amount,
                allowance: account.allowance,
            });
        }
        if account.available < amount {
            return Err(PoolError::InsufficientBalance {
                owner: *payer,
                token: self.token.clone(),
                required: amount,
                available: account.available,
            });
        }
        account.allowance = Amount::new(account.allowance.get() - amount.get());
        account.available = Amount::new(account.available.get() - amount.get());
        account.locked = Amount::new(account.locked.get() + amount.get());
        Ok(())
    }

    fn settle(&self, movements: &[Movement]) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next_settle.take() {
            return Err(PoolError::Unavailable(reason));
        }

        let mut required: BTreeMap<Address, u128> = BTreeMap::new();
        for m in movements {
            *required.entry(m.from).or_default() += m.amount.get();
        }
        for (owner, needed) in &required {
            let locked = state.accounts.get(owner).map(|a| a.locked).unwrap_or_default();
            if locked.get() < *needed {
                return Err(PoolError::InsufficientLocked {
                    owner: *owner,
                    token: self.token.clone(),
                    required: Amount::new(*needed),
                    locked,
                });
            }
        }

        for m in movements {
            let from = state.accounts.entry(m.from).or_default();
            from.locked = Amount::new(from.locked.get() - m.amount.get());
            let to = state.accounts.entry(m.to).or_default();
            to.available = Amount::new(to.available.get() + m.amount.get());
        }
        Ok(())
    }

    fn available_balance(&self, owner: &Address) -> Amount {
        self.account(owner).available
    }

    fn locked_balance(&self, owner: &Address) -> Amount {
        self.account(owner).locked
    }
}

/// A staking factory that opens a pool for any token on first use.
#[derive(Debug, Default)]
pub struct InMemoryStaking {
    pools: Mutex<BTreeMap<TokenId, Arc<InMemoryPool>>>,
}

impl InMemoryStaking {
    /// A factory with no pools yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete pool for `token`, opened if needed.
    pub fn pool_handle(&self, token: &TokenId) -> Arc<InMemoryPool> {
        Arc::clone(
            self.pools
                .lock()
                .entry(token.clone())
                .or_insert_with(|| Arc::new(InMemoryPool::new(token.clone()))),
        )
    }

    /// Credit available stake.
    pub fn deposit(&self, token: &TokenId, owner: Address, amount: Amount) {
        self.pool_handle(token).deposit(owner, amount);
    }

    /// Set the agreement's allowance.
    pub fn approve(&self, token: &TokenId, owner: Address, amount: Amount) {
        self.pool_handle(token).approve(owner, amount);
    }

    /// Deposit `amount` and approve all of it.
    pub fn fund(&self, token: &TokenId, owner: Address, amount: Amount) {
        let pool = self.pool_handle(token);
        pool.deposit(owner, amount);
        pool.approve(owner, amount);
    }
}

impl StakingFactory for InMemoryStaking {
    fn pool(&self, token: &TokenId) -> Result<Arc<dyn StakingPool>, PoolError> {
        let pool: Arc<dyn StakingPool> = self.pool_handle(token);
        Ok(pool)
    }
}

// ── Arbitrator ─────────────────────────────────────────────────────────

/// Evidence the arbitrator received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedEvidence {
    /// Arbitrator-side dispute.
    pub dispute: ArbitratorDisputeId,
    /// Submitting party.
    pub party: Address,
    /// Digest of the evidence bytes.
    pub digest: ContentDigest,
}

#[derive(Debug)]
struct ArbitratorState {
    fees: DisputeFees,
    refusing: Option<String>,
    disputes: Vec<(ArbitratorDisputeId, DisputeRequest)>,
    evidence: Vec<ReceivedEvidence>,
}

/// An arbitrator that records disputes and never rules on its own.
///
/// Tests deliver rulings by calling [`crate::Agreement::resolve`] with
/// this arbitrator's address.
#[derive(Debug)]
pub struct InMemoryArbitrator {
    state: Mutex<ArbitratorState>,
}

impl InMemoryArbitrator {
    /// An arbitrator charging `fee` of `token` per dispute.
    pub fn new(token: TokenId, fee: Amount) -> Self {
        Self {
            state: Mutex::new(ArbitratorState {
                fees: DisputeFees { token, amount: fee },
                refusing: None,
                disputes: Vec::new(),
                evidence: Vec::new(),
            }),
        }
    }

    /// Change the fee.
    pub fn set_fees(&self, token: TokenId, amount: Amount) {
        self.state.lock().fees = DisputeFees { token, amount };
    }

    /// Refuse every request with `reason` until cleared with `None`.
    pub fn set_refusing(&self, reason: Option<&str>) {
        self.state.lock().refusing = reason.map(str::to_string);
    }

    /// Disputes received so far.
    pub fn disputes(&self) -> Vec<DisputeRequest> {
        self.state
            .lock()
            .disputes
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Evidence received so far.
    pub fn evidence(&self) -> Vec<ReceivedEvidence> {
        self.state.lock().evidence.clone()
    }
}

impl Arbitrator for InMemoryArbitrator {
    fn dispute_fees(&self) -> DisputeFees {
        self.state.lock().fees.clone()
    }

    fn create_dispute(&self, request: &DisputeRequest) -> Result<ArbitratorDisputeId, ArbitratorError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.refusing {
            return Err(ArbitratorError::Refused(reason.clone()));
        }
        let id = ArbitratorDisputeId::new(state.disputes.len() as u64 + 1);
        state.disputes.push((id, request.clone()));
        Ok(id)
    }

    fn submit_evidence(
        &self,
        dispute: ArbitratorDisputeId,
        party: &Address,
        evidence: &[u8],
    ) -> Result<(), ArbitratorError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.refusing {
            return Err(ArbitratorError::Refused(reason.clone()));
        }
        if !state.disputes.iter().any(|(id, _)| *id == dispute) {
            return Err(ArbitratorError::Refused(format!("unknown {dispute}")));
        }
        state.evidence.push(ReceivedEvidence {
            dispute,
            party: *party,
            digest: sha256_bytes(evidence),
        });
        Ok(())
    }
}

// ── Fee cashier ────────────────────────────────────────────────────────

/// A fee charged by the cashier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeCharge {
    /// App the action was submitted through.
    pub app: Address,
    /// Party charged.
    pub payer: Address,
    /// Action charged for.
    pub action: ActionId,
}

#[derive(Debug, Default)]
struct CashierState {
    refusing: Option<String>,
    charges: Vec<FeeCharge>,
}

/// A fee cashier that records charges.
#[derive(Debug, Default)]
pub struct InMemoryFeeCashier {
    state: Mutex<CashierState>,
}

impl InMemoryFeeCashier {
    /// A cashier accepting every charge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every charge with `reason` until cleared with `None`.
    pub fn set_refusing(&self, reason: Option<&str>) {
        self.state.lock().refusing = reason.map(str::to_string);
    }

    /// Charges recorded so far.
    pub fn charges(&self) -> Vec<FeeCharge> {
        self.state.lock().charges.clone()
    }
}

impl FeeCashier for InMemoryFeeCashier {
    fn charge(&self, app: &Address, payer: &Address, action: ActionId) -> Result<(), CashierError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.refusing {
            return Err(CashierError::Refused(reason.clone()));
        }
        state.charges.push(FeeCharge {
            app: *app,
            payer: *payer,
            action,
        });
        Ok(())
    }
}

// ── Disputable app ─────────────────────────────────────────────────────

/// A disputable app that records every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingApp {
    received: Mutex<Vec<AppNotification>>,
}

impl RecordingApp {
    /// An app with no notifications yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    pub fn notifications(&self) -> Vec<AppNotification> {
        self.received.lock().clone()
    }
}

impl DisputableHooks for RecordingApp {
    fn notify(&self, notification: &AppNotification) {
        self.received.lock().push(notification.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ant() -> TokenId {
        TokenId::new("ANT").unwrap()
    }

    #[test]
    fn lock_consumes_allowance_and_balance() {
        let pool = InMemoryPool::new(ant());
        let alice = Address::from_label("alice");
        pool.deposit(alice, Amount::new(100));
        pool.approve(alice, Amount::new(60));

        pool.lock(&alice, Amount::new(50)).unwrap();
        let account = pool.account(&alice);
        assert_eq!(account.available, Amount::new(50));
        assert_eq!(account.locked, Amount::new(50));
        assert_eq!(account.allowance, Amount::new(10));

        assert!(matches!(
            pool.lock(&alice, Amount::new(20)),
            Err(PoolError::InsufficientAllowance { .. })
        ));
    }

    #[test]
    fn lock_beyond_balance_is_rejected() {
        let pool = InMemoryPool::new(ant());
        let alice = Address::from_label("alice");
        pool.deposit(alice, Amount::new(10));
        pool.approve(alice, Amount::new(100));
        assert!(matches!(
            pool.lock(&alice, Amount::new(20)),
            Err(PoolError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn settle_is_all_or_nothing() {
        let pool = InMemoryPool::new(ant());
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        pool.deposit(alice, Amount::new(100));
        pool.approve(alice, Amount::new(100));
        pool.lock(&alice, Amount::new(100)).unwrap();

        let overdrawn = [
            Movement { from: alice, to: bob, amount: Amount::new(80) },
            Movement { from: alice, to: alice, amount: Amount::new(30) },
        ];
        assert!(matches!(
            pool.settle(&overdrawn),
            Err(PoolError::InsufficientLocked { .. })
        ));
        assert_eq!(pool.account(&alice).locked, Amount::new(100));
        assert_eq!(pool.account(&bob).available, Amount::ZERO);
        assert_eq!(pool.total_stake(), Amount::new(100));
    }

    #[test]
    fn fail_next_settle_fires_once() {
        let pool = InMemoryPool::new(ant());
        pool.fail_next_settle("offline");
        assert!(matches!(pool.settle(&[]), Err(PoolError::Unavailable(_))));
        assert!(pool.settle(&[]).is_ok());
    }

    #[test]
    fn refusing_arbitrator_records_nothing() {
        let arb = InMemoryArbitrator::new(ant(), Amount::ZERO);
        arb.set_refusing(Some("docket full"));
        let addr = Address::from_label("x");
        assert!(arb
            .submit_evidence(ArbitratorDisputeId::FIRST, &addr, b"doc")
            .is_err());
        assert!(arb.disputes().is_empty());
    }

    #[test]
    fn cashier_records_charges() {
        let cashier = InMemoryFeeCashier::new();
        let app = Address::from_label("voting");
        let alice = Address::from_label("alice");
        cashier.charge(&app, &alice, ActionId::FIRST).unwrap();
        cashier.set_refusing(Some("paused"));
        assert!(cashier.charge(&app, &alice, ActionId::new(2)).is_err());
        assert_eq!(cashier.charges().len(), 1);
    }
}
