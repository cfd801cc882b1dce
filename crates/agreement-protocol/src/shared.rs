//! # Shared Agreement
//!
//! Thread-safe handle over an [`Agreement`]. Every call runs under one
//! `parking_lot::Mutex`, so each operation's validate, move collateral,
//! commit sequence is atomic with respect to every other caller. Of two
//! racing conflicting transitions exactly one succeeds; the other observes
//! the committed state and fails with the matching state error.
//!
//! App hooks run while the lock is held and must not call back into the
//! same handle.

use std::sync::Arc;

use parking_lot::Mutex;

use agreement_core::{ActionId, Address, ChallengeId, DisputeId};

use crate::action::Action;
use crate::agreement::Agreement;
use crate::dispute::Ruling;
use crate::error::AgreementResult;
use crate::settlement::SettlementTerms;

/// Cloneable, thread-safe handle to one agreement.
#[derive(Clone, Debug)]
pub struct SharedAgreement {
    inner: Arc<Mutex<Agreement>>,
}

impl SharedAgreement {
    /// Wrap an agreement.
    pub fn new(agreement: Agreement) -> Self {
        Self {
            inner: Arc::new(Mutex::new(agreement)),
        }
    }

    /// Run `f` with exclusive access.
    pub fn transact<R>(&self, f: impl FnOnce(&mut Agreement) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Run `f` with shared read access.
    pub fn read<R>(&self, f: impl FnOnce(&Agreement) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Snapshot of an action.
    pub fn action(&self, id: ActionId) -> AgreementResult<Action> {
        self.read(|a| a.action(id).cloned())
    }

    /// See [`Agreement::challenge`].
    pub fn challenge(
        &self,
        caller: Address,
        action_id: ActionId,
        offer: Option<SettlementTerms>,
        context: &str,
    ) -> AgreementResult<ChallengeId> {
        self.transact(|a| a.challenge(caller, action_id, offer, context))
    }

    /// See [`Agreement::escalate`].
    pub fn escalate(&self, caller: Address, challenge_id: ChallengeId) -> AgreementResult<DisputeId> {
        self.transact(|a| a.escalate(caller, challenge_id))
    }

    /// See [`Agreement::accept_settlement`].
    pub fn accept_settlement(&self, caller: Address, challenge_id: ChallengeId) -> AgreementResult<()> {
        self.transact(|a| a.accept_settlement(caller, challenge_id))
    }

    /// See [`Agreement::resolve`].
    pub fn resolve(&self, caller: Address, dispute_id: DisputeId, ruling: Ruling) -> AgreementResult<()> {
        self.transact(|a| a.resolve(caller, dispute_id, ruling))
    }

    /// See [`Agreement::execute`].
    pub fn execute(&self, caller: Address, action_id: ActionId) -> AgreementResult<()> {
        self.transact(|a| a.execute(caller, action_id))
    }
}

impl From<Agreement> for SharedAgreement {
    fn from(agreement: Agreement) -> Self {
        Self::new(agreement)
    }
}
