//! Shared harness: an initialized agreement wired to in-memory
//! collaborators, a manual clock and one registered voting app.

#![allow(dead_code)]

use std::sync::Arc;

use agreement_core::{ActionId, Address, Amount, DisputableActionId, ManualClock, Timestamp, TokenId};
use agreement_protocol::{
    Agreement, AgreementConfig, AppKind, CollaboratorDirectory, CollateralRequirement,
    InMemoryArbitrator, InMemoryFeeCashier, InMemoryStaking, RecordingApp, SettingDraft,
    SettlementTerms, SharedAgreement, StakingPool,
};

pub const START: &str = "2026-01-01T00:00:00Z";
pub const WINDOW: u64 = 3_600;
pub const STAKE: u128 = 1_000;

pub fn token() -> TokenId {
    TokenId::new("ANT").unwrap()
}

pub fn addr(label: &str) -> Address {
    Address::from_label(label)
}

pub fn governor() -> Address {
    addr("governor")
}
pub fn court() -> Address {
    addr("court")
}
pub fn cashier() -> Address {
    addr("cashier")
}
pub fn staking() -> Address {
    addr("staking")
}
pub fn voting() -> Address {
    addr("voting")
}
pub fn alice() -> Address {
    addr("alice")
}
pub fn bob() -> Address {
    addr("bob")
}
pub fn carol() -> Address {
    addr("carol")
}

pub fn requirement(action: u128, challenge: u128, window: u64) -> CollateralRequirement {
    CollateralRequirement {
        token: token(),
        action_amount: Amount::new(action),
        challenge_amount: Amount::new(challenge),
        challenge_duration_secs: window,
    }
}

pub fn draft(title: &str, collateral: CollateralRequirement) -> SettingDraft {
    SettingDraft {
        title: title.to_string(),
        content: format!("ipfs:{title}").into_bytes(),
        arbitrator: court(),
        fee_cashier: cashier(),
        collateral,
    }
}

pub struct Harness {
    pub agreement: Agreement,
    pub clock: ManualClock,
    pub staking: Arc<InMemoryStaking>,
    pub court: Arc<InMemoryArbitrator>,
    pub cashier: Arc<InMemoryFeeCashier>,
    pub voting: Arc<RecordingApp>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AgreementConfig::default())
    }

    pub fn with_config(config: AgreementConfig) -> Self {
        let clock = ManualClock::new(Timestamp::parse(START).unwrap());
        let staking = Arc::new(InMemoryStaking::new());
        for who in [alice(), bob(), carol()] {
            staking.fund(&token(), who, Amount::new(STAKE));
        }
        let court = Arc::new(InMemoryArbitrator::new(token(), Amount::ZERO));
        let cashier = Arc::new(InMemoryFeeCashier::new());
        let voting = Arc::new(RecordingApp::new());

        let mut directory = CollaboratorDirectory::new();
        directory.register_staking_factory(self::staking(), staking.clone());
        directory.register_arbitrator(self::court(), court.clone());
        directory.register_fee_cashier(self::cashier(), cashier.clone());
        for who in [governor(), alice(), bob(), carol()] {
            directory.register_account(who);
        }

        let mut agreement = Agreement::new(config, directory, Arc::new(clock.clone()));
        agreement
            .initialize(
                governor(),
                self::staking(),
                draft("covenant-v1", requirement(100, 50, WINDOW)),
            )
            .unwrap();
        agreement
            .register_app(governor(), self::voting(), AppKind::Voting, voting.clone())
            .unwrap();

        Self {
            agreement,
            clock,
            staking,
            court,
            cashier,
            voting,
        }
    }

    /// Hand the agreement to a shared handle, keeping the collaborators
    /// for inspection.
    pub fn share(self) -> (SharedAgreement, Observer) {
        (
            SharedAgreement::new(self.agreement),
            Observer {
                staking: self.staking,
                voting: self.voting,
            },
        )
    }

    pub fn submit(&mut self, submitter: Address, id: &str) -> ActionId {
        self.agreement
            .submit(voting(), DisputableActionId::new(id), submitter, format!("context of {id}"))
            .unwrap()
    }

    pub fn available(&self, who: Address) -> Amount {
        self.staking.pool_handle(&token()).available_balance(&who)
    }

    pub fn locked(&self, who: Address) -> Amount {
        self.staking.pool_handle(&token()).locked_balance(&who)
    }

    pub fn total_stake(&self) -> Amount {
        self.staking.pool_handle(&token()).total_stake()
    }

    pub fn terms(&self, amount: u128, expires_in_secs: u64) -> SettlementTerms {
        SettlementTerms {
            amount: Amount::new(amount),
            expires_at: self.agreement.now().plus_secs(expires_in_secs),
        }
    }
}

/// Collaborator view that outlives a [`Harness::share`].
pub struct Observer {
    pub staking: Arc<InMemoryStaking>,
    pub voting: Arc<RecordingApp>,
}

impl Observer {
    pub fn available(&self, who: Address) -> Amount {
        self.staking.pool_handle(&token()).available_balance(&who)
    }

    pub fn locked(&self, who: Address) -> Amount {
        self.staking.pool_handle(&token()).locked_balance(&who)
    }

    pub fn total_stake(&self) -> Amount {
        self.staking.pool_handle(&token()).total_stake()
    }
}
