//! # The Agreement
//!
//! [`Agreement`] owns every protocol record and exposes one method per
//! protocol operation. Each operation follows the same discipline:
//!
//! 1. **Validate** against a clone of the records it touches. No mutation.
//! 2. **Move collateral** through the staking pool. A refusal aborts the
//!    operation with nothing changed; a lock taken earlier in the same
//!    operation is compensated before the error is returned.
//! 3. **Commit** the modified clone and append events.
//! 4. **Notify** the disputable app. Notification cannot fail the
//!    operation.
//!
//! Operations take `&mut self`, so a single `Agreement` is a serialized
//! execution environment. Share one across threads with
//! [`crate::SharedAgreement`].

use std::collections::BTreeMap;
use std::sync::Arc;

use agreement_core::{
    sha256_bytes, ActionId, Address, ChallengeId, Clock, ContentDigest, DisputableActionId,
    DisputeId, LockId, SettingId, Timestamp, TokenId,
};

use crate::action::{Action, ActionState, Challenge, ChallengeState, ChallengeWindow};
use crate::app::{AppKind, AppNotification, CancelReason, DisputableApp, DisputableHooks};
use crate::capability::{CollaboratorDirectory, StakingFactory, StakingPool};
use crate::collateral::{
    CollateralLock, CollateralManager, Disposition, LockOwner, SettlementPlan, SettlementReason,
};
use crate::config::AgreementConfig;
use crate::dispute::{fee_plan, ruling_plan, Dispute, DisputeCoordinator, DisputeMetadata, Ruling, RulingParties};
use crate::error::{AgreementError, AgreementResult};
use crate::events::{AgreementEvent, EventLog};
use crate::settings::{Setting, SettingDraft, SettingsRegistry};
use crate::settlement::{validate_terms, OfferStatus, SettlementOffer, SettlementTerms};

/// The protocol state and its operations.
pub struct Agreement {
    config: AgreementConfig,
    directory: CollaboratorDirectory,
    clock: Arc<dyn Clock>,
    governor: Option<Address>,
    staking_factory: Option<Address>,
    settings: SettingsRegistry,
    apps: BTreeMap<Address, DisputableApp>,
    actions: BTreeMap<ActionId, Action>,
    challenge_index: BTreeMap<ChallengeId, ActionId>,
    next_action: ActionId,
    next_challenge: ChallengeId,
    disputes: DisputeCoordinator,
    collateral: CollateralManager,
    events: EventLog,
}

impl std::fmt::Debug for Agreement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agreement")
            .field("config", &self.config)
            .field("governor", &self.governor)
            .field("settings", &self.settings.len())
            .field("apps", &self.apps.len())
            .field("actions", &self.actions.len())
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

impl Agreement {
    /// An uninitialized agreement.
    pub fn new(
        config: AgreementConfig,
        directory: CollaboratorDirectory,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            directory,
            clock,
            governor: None,
            staking_factory: None,
            settings: SettingsRegistry::new(),
            apps: BTreeMap::new(),
            actions: BTreeMap::new(),
            challenge_index: BTreeMap::new(),
            next_action: ActionId::FIRST,
            next_challenge: ChallengeId::FIRST,
            disputes: DisputeCoordinator::new(),
            collateral: CollateralManager::new(),
            events: EventLog::new(),
        }
    }

    // ── Settings ───────────────────────────────────────────────────────

    /// Create setting 1, record the governor and the staking factory.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` on a second call; `InvalidStakingFactory`,
    /// `InvalidArbitrator`, `InvalidFeeCashier` or
    /// `InvalidCollateralRequirement` if a reference fails its capability check.
    pub fn initialize(
        &mut self,
        governor: Address,
        staking_factory: Address,
        setting: SettingDraft,
    ) -> AgreementResult<SettingId> {
        if self.settings.is_initialized() {
            return Err(AgreementError::AlreadyInitialized);
        }
        self.directory
            .staking_factory(&staking_factory)
            .map_err(|reason| AgreementError::InvalidStakingFactory {
                address: staking_factory,
                reason,
            })?;
        setting.check(&self.directory)?;

        let now = self.clock.now();
        self.governor = Some(governor);
        self.staking_factory = Some(staking_factory);
        let id = self.settings.append(setting, now);
        self.events
            .push(now, AgreementEvent::SettingChanged { setting_id: id });
        tracing::info!(setting = %id, governor = %governor, "agreement initialized");
        Ok(id)
    }

    /// Append a new setting version. Governor only.
    pub fn create_setting(
        &mut self,
        caller: Address,
        setting: SettingDraft,
    ) -> AgreementResult<SettingId> {
        self.ensure_governor(caller, "create a setting")?;
        setting.check(&self.directory)?;

        let now = self.clock.now();
        let id = self.settings.append(setting, now);
        self.events
            .push(now, AgreementEvent::SettingChanged { setting_id: id });
        tracing::info!(setting = %id, "setting appended");
        Ok(id)
    }

    /// A setting by id.
    pub fn setting(&self, id: SettingId) -> AgreementResult<&Setting> {
        self.settings.get(id)
    }

    /// Id of the current setting.
    pub fn current_setting_id(&self) -> AgreementResult<SettingId> {
        self.settings.current_id().ok_or(AgreementError::NotInitialized)
    }

    /// The settings log.
    pub fn settings(&self) -> &SettingsRegistry {
        &self.settings
    }

    // ── Apps ───────────────────────────────────────────────────────────

    /// Register a disputable app. Governor only.
    pub fn register_app(
        &mut self,
        caller: Address,
        address: Address,
        kind: AppKind,
        hooks: Arc<dyn DisputableHooks>,
    ) -> AgreementResult<()> {
        self.ensure_governor(caller, "register an app")?;
        if self.apps.contains_key(&address) {
            return Err(AgreementError::AppAlreadyRegistered(address));
        }
        let now = self.clock.now();
        self.apps.insert(
            address,
            DisputableApp {
                address,
                kind: kind.clone(),
                active: true,
                hooks,
                registered_at: now,
            },
        );
        tracing::info!(app = %address, kind = %kind, "disputable app registered");
        self.events
            .push(now, AgreementEvent::AppRegistered { app: address, kind });
        Ok(())
    }

    /// Allow the app to submit actions again. Governor only.
    pub fn activate_app(&mut self, caller: Address, address: Address) -> AgreementResult<()> {
        self.set_app_active(caller, address, true)
    }

    /// Stop the app from submitting new actions. Existing actions are
    /// unaffected. Governor only.
    pub fn deactivate_app(&mut self, caller: Address, address: Address) -> AgreementResult<()> {
        self.set_app_active(caller, address, false)
    }

    fn set_app_active(
        &mut self,
        caller: Address,
        address: Address,
        active: bool,
    ) -> AgreementResult<()> {
        self.ensure_governor(caller, "change app status")?;
        let app = self
            .apps
            .get_mut(&address)
            .ok_or(AgreementError::AppNotRegistered(address))?;
        if app.active == active {
            return Ok(());
        }
        app.active = active;
        let now = self.clock.now();
        self.events.push(
            now,
            AgreementEvent::AppStatusChanged {
                app: address,
                active,
            },
        );
        tracing::info!(app = %address, active, "app status changed");
        Ok(())
    }

    /// A registered app.
    pub fn app(&self, address: &Address) -> Option<&DisputableApp> {
        self.apps.get(address)
    }

    // ── Actions ────────────────────────────────────────────────────────

    /// Submit an action on behalf of `submitter`. `caller` must be an
    /// active registered app.
    ///
    /// Locks the submitter's collateral, charges the fee and pins the
    /// current setting.
    pub fn submit(
        &mut self,
        caller: Address,
        disputable_action_id: DisputableActionId,
        submitter: Address,
        context: impl Into<String>,
    ) -> AgreementResult<ActionId> {
        let setting = self.settings.current()?.clone();
        let app = self
            .apps
            .get(&caller)
            .ok_or(AgreementError::AppNotRegistered(caller))?;
        if !app.active {
            return Err(AgreementError::AppInactive(caller));
        }
        let cashier = self
            .directory
            .fee_cashier(&setting.fee_cashier)
            .map_err(|reason| AgreementError::InvalidFeeCashier {
                address: setting.fee_cashier,
                reason,
            })?;
        let factory = self.factory()?;
        let pool = factory.pool(&setting.collateral.token)?;

        let now = self.clock.now();
        let id = self.next_action;
        let lock_id = self.collateral.lock(
            &*pool,
            LockOwner::Action(id),
            submitter,
            setting.collateral.action_amount,
            now,
        )?;
        // The id owns a lock from here on, even if the charge is refused.
        self.next_action = id.next();

        if let Err(err) = cashier.charge(&caller, &submitter, id) {
            tracing::warn!(action = %id, error = %err, "fee cashier refused charge");
            self.compensate(&*factory, Some(lock_id), now);
            return Err(AgreementError::FeeRejected(err.to_string()));
        }

        let action = Action {
            id,
            app: caller,
            disputable_action_id,
            submitter,
            setting_id: setting.id,
            collateral: setting.collateral.clone(),
            context: context.into(),
            state: ActionState::Scheduled,
            window: ChallengeWindow::open(setting.collateral.challenge_duration_secs, now),
            lock_id,
            challenges: Vec::new(),
            created_at: now,
            closed_at: None,
        };
        self.actions.insert(id, action);
        self.events.push(
            now,
            AgreementEvent::ActionSubmitted {
                action_id: id,
                setting_id: setting.id,
            },
        );
        tracing::info!(action = %id, app = %caller, submitter = %submitter, setting = %setting.id, "action submitted");
        Ok(id)
    }

    /// Execute an action whose challenge window has elapsed unchallenged.
    /// Callable by the app or the submitter.
    pub fn execute(&mut self, caller: Address, action_id: ActionId) -> AgreementResult<()> {
        let now = self.clock.now();
        let mut action = self.action(action_id)?.clone();
        if caller != action.app && caller != action.submitter {
            return Err(AgreementError::Unauthorized {
                caller,
                operation: "execute",
            });
        }
        action.ensure_executable(now)?;

        let plan = SettlementPlan::new(SettlementReason::Execute(action_id)).with(
            Disposition::Release {
                lock: action.lock_id,
                to: action.submitter,
            },
        );
        self.settle(&plan, now)?;

        action.finish(ActionState::Executed, now);
        let notification = AppNotification::Executed {
            action_id,
            disputable_action_id: action.disputable_action_id.clone(),
        };
        let app = action.app;
        self.actions.insert(action_id, action);
        self.events
            .push(now, AgreementEvent::ActionExecuted { action_id });
        tracing::info!(action = %action_id, "action executed");
        self.notify(app, notification);
        Ok(())
    }

    /// Close a scheduled, unchallenged action early. App only.
    pub fn close(&mut self, caller: Address, action_id: ActionId) -> AgreementResult<()> {
        let now = self.clock.now();
        let mut action = self.action(action_id)?.clone();
        if caller != action.app {
            return Err(AgreementError::Unauthorized {
                caller,
                operation: "close",
            });
        }
        action.ensure_state(ActionState::Scheduled, "close")?;

        let plan = SettlementPlan::new(SettlementReason::Close(action_id)).with(
            Disposition::Release {
                lock: action.lock_id,
                to: action.submitter,
            },
        );
        self.settle(&plan, now)?;

        action.finish(ActionState::Cancelled, now);
        self.actions.insert(action_id, action);
        self.events
            .push(now, AgreementEvent::ActionClosed { action_id });
        tracing::info!(action = %action_id, "action closed by app");
        Ok(())
    }

    /// An action by id.
    pub fn action(&self, id: ActionId) -> AgreementResult<&Action> {
        self.actions.get(&id).ok_or(AgreementError::ActionNotFound(id))
    }

    /// All actions in id order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    // ── Challenges ─────────────────────────────────────────────────────

    /// Challenge a scheduled action, optionally with a settlement offer.
    ///
    /// Locks the challenger's collateral (the amount pinned on the
    /// action) before pausing the window.
    pub fn challenge(
        &mut self,
        caller: Address,
        action_id: ActionId,
        offer: Option<SettlementTerms>,
        context: impl Into<String>,
    ) -> AgreementResult<ChallengeId> {
        let now = self.clock.now();
        let mut action = self.action(action_id)?.clone();
        action.ensure_challengeable(now)?;
        if caller == action.submitter && !self.config.allow_self_challenge {
            return Err(AgreementError::SelfChallenge(action_id));
        }
        if let Some(terms) = &offer {
            validate_terms(terms, action.collateral.action_amount, now)?;
        }

        let factory = self.factory()?;
        let pool = factory.pool(&action.collateral.token)?;
        let id = self.next_challenge;
        let lock_id = self.collateral.lock(
            &*pool,
            LockOwner::Challenge(id),
            caller,
            action.collateral.challenge_amount,
            now,
        )?;
        self.next_challenge = id.next();

        let challenge = Challenge {
            id,
            action_id,
            challenger: caller,
            context: context.into(),
            lock_id,
            offer: offer.map(|terms| SettlementOffer {
                amount: terms.amount,
                expires_at: terms.expires_at,
                proposed_at: now,
                status: OfferStatus::Standing,
            }),
            state: ChallengeState::Open,
            escalated_by: None,
            fee_lock: None,
            dispute: None,
            created_at: now,
            closed_at: None,
        };
        action.begin_challenge(challenge, now);

        let notification = AppNotification::Challenged {
            action_id,
            disputable_action_id: action.disputable_action_id.clone(),
            challenge_id: id,
        };
        let app = action.app;
        self.actions.insert(action_id, action);
        self.challenge_index.insert(id, action_id);
        self.events.push(
            now,
            AgreementEvent::ActionChallenged {
                action_id,
                challenge_id: id,
            },
        );
        if let Some(terms) = offer {
            self.events.push(
                now,
                AgreementEvent::SettlementProposed {
                    challenge_id: id,
                    amount: terms.amount,
                    expires_at: terms.expires_at,
                },
            );
        }
        tracing::info!(action = %action_id, challenge = %id, challenger = %caller, "action challenged");
        self.notify(app, notification);
        Ok(id)
    }

    /// Withdraw an open, unescalated challenge. Challenger only.
    ///
    /// The challenger's collateral is released and the action's window
    /// resumes for the time that was left.
    pub fn cancel_challenge(
        &mut self,
        caller: Address,
        challenge_id: ChallengeId,
    ) -> AgreementResult<()> {
        let now = self.clock.now();
        let mut action = self.action_of(challenge_id)?.clone();
        let challenge = action.challenge(challenge_id)?;
        if caller != challenge.challenger {
            return Err(AgreementError::Unauthorized {
                caller,
                operation: "cancel the challenge",
            });
        }
        challenge.ensure_state(ChallengeState::Open, "cancel")?;

        let plan = SettlementPlan::new(SettlementReason::CancelChallenge(challenge_id)).with(
            Disposition::Release {
                lock: challenge.lock_id,
                to: challenge.challenger,
            },
        );
        self.settle(&plan, now)?;

        let challenge = action.challenge_mut(challenge_id)?;
        challenge.supersede_offer();
        challenge.close(ChallengeState::Cancelled, now);
        action.resume(now);

        let action_id = action.id;
        let notification = AppNotification::Resumed {
            action_id,
            disputable_action_id: action.disputable_action_id.clone(),
        };
        let app = action.app;
        self.actions.insert(action_id, action);
        self.events.push(
            now,
            AgreementEvent::ChallengeCancelled {
                action_id,
                challenge_id,
            },
        );
        self.events
            .push(now, AgreementEvent::ActionResumed { action_id });
        tracing::info!(action = %action_id, challenge = %challenge_id, "challenge cancelled");
        self.notify(app, notification);
        Ok(())
    }

    /// A challenge by id.
    pub fn challenge_record(&self, id: ChallengeId) -> AgreementResult<&Challenge> {
        self.action_of(id)?.challenge(id)
    }

    // ── Settlement ─────────────────────────────────────────────────────

    /// Put a settlement offer on an open challenge. Challenger only.
    pub fn propose_settlement(
        &mut self,
        caller: Address,
        challenge_id: ChallengeId,
        terms: SettlementTerms,
    ) -> AgreementResult<()> {
        let now = self.clock.now();
        let precedence = self.config.settlement_precedence;
        let mut action = self.action_of(challenge_id)?.clone();
        let max = action.collateral.action_amount;
        let challenge = action.challenge_mut(challenge_id)?;
        if caller != challenge.challenger {
            return Err(AgreementError::Unauthorized {
                caller,
                operation: "propose a settlement",
            });
        }
        challenge.ensure_state(ChallengeState::Open, "propose a settlement")?;
        validate_terms(&terms, max, now)?;
        challenge.propose(terms, precedence, now)?;

        self.actions.insert(action.id, action);
        self.events.push(
            now,
            AgreementEvent::SettlementProposed {
                challenge_id,
                amount: terms.amount,
                expires_at: terms.expires_at,
            },
        );
        tracing::info!(challenge = %challenge_id, amount = %terms.amount, expires_at = %terms.expires_at, "settlement proposed");
        Ok(())
    }

    /// Withdraw the live offer. Challenger only.
    pub fn withdraw_settlement(
        &mut self,
        caller: Address,
        challenge_id: ChallengeId,
    ) -> AgreementResult<()> {
        let now = self.clock.now();
        let precedence = self.config.settlement_precedence;
        let mut action = self.action_of(challenge_id)?.clone();
        let challenge = action.challenge_mut(challenge_id)?;
        if caller != challenge.challenger {
            return Err(AgreementError::Unauthorized {
                caller,
                operation: "withdraw the settlement",
            });
        }
        challenge.ensure_state(ChallengeState::Open, "withdraw the settlement")?;
        challenge.retract(OfferStatus::Withdrawn, precedence, now)?;

        self.actions.insert(action.id, action);
        self.events
            .push(now, AgreementEvent::SettlementWithdrawn { challenge_id });
        tracing::info!(challenge = %challenge_id, "settlement withdrawn");
        Ok(())
    }

    /// Reject the live offer. Submitter only.
    pub fn reject_settlement(
        &mut self,
        caller: Address,
        challenge_id: ChallengeId,
    ) -> AgreementResult<()> {
        let now = self.clock.now();
        let precedence = self.config.settlement_precedence;
        let mut action = self.action_of(challenge_id)?.clone();
        if caller != action.submitter {
            return Err(AgreementError::Unauthorized {
                caller,
                operation: "reject the settlement",
            });
        }
        let challenge = action.challenge_mut(challenge_id)?;
        challenge.ensure_state(ChallengeState::Open, "reject the settlement")?;
        challenge.retract(OfferStatus::Rejected, precedence, now)?;

        self.actions.insert(action.id, action);
        self.events
            .push(now, AgreementEvent::SettlementRejected { challenge_id });
        tracing::info!(challenge = %challenge_id, "settlement rejected");
        Ok(())
    }

    /// Accept the live offer. Submitter only.
    ///
    /// `amount` of the submitter's collateral goes to the challenger and
    /// the rest back to the submitter; the challenger's collateral is
    /// released. The action ends Settled.
    pub fn accept_settlement(
        &mut self,
        caller: Address,
        challenge_id: ChallengeId,
    ) -> AgreementResult<()> {
        let now = self.clock.now();
        let precedence = self.config.settlement_precedence;
        let mut action = self.action_of(challenge_id)?.clone();
        if caller != action.submitter {
            return Err(AgreementError::Unauthorized {
                caller,
                operation: "accept the settlement",
            });
        }
        let challenge = action.challenge(challenge_id)?;
        challenge.ensure_state(ChallengeState::Open, "accept the settlement")?;
        let offer = challenge.acceptable_offer(precedence, now)?;

        let plan = SettlementPlan::new(SettlementReason::Settle(challenge_id))
            .with(Disposition::Split {
                lock: action.lock_id,
                slashed: offer.amount,
                to: challenge.challenger,
            })
            .with(Disposition::Release {
                lock: challenge.lock_id,
                to: challenge.challenger,
            });
        self.settle(&plan, now)?;

        let challenge = action.challenge_mut(challenge_id)?;
        if let Some(o) = challenge.offer.as_mut() {
            o.status = OfferStatus::Accepted;
        }
        challenge.close(ChallengeState::Settled, now);
        action.finish(ActionState::Settled, now);

        let action_id = action.id;
        let notification = AppNotification::Cancelled {
            action_id,
            disputable_action_id: action.disputable_action_id.clone(),
            reason: CancelReason::Settled,
        };
        let app = action.app;
        self.actions.insert(action_id, action);
        self.events.push(
            now,
            AgreementEvent::ActionSettled {
                action_id,
                challenge_id,
            },
        );
        tracing::info!(action = %action_id, challenge = %challenge_id, amount = %offer.amount, "settlement accepted");
        self.notify(app, notification);
        Ok(())
    }

    // ── Disputes ───────────────────────────────────────────────────────

    /// Escalate an open challenge to the arbitrator pinned by the
    /// action's setting. Either party may escalate, once.
    ///
    /// The escalating party's dispute fee is locked first and released
    /// back to them if the arbitrator refuses the dispute.
    pub fn escalate(
        &mut self,
        caller: Address,
        challenge_id: ChallengeId,
    ) -> AgreementResult<DisputeId> {
        let now = self.clock.now();
        let precedence = self.config.settlement_precedence;
        let mut action = self.action_of(challenge_id)?.clone();
        let challenge = action.challenge(challenge_id)?;
        if action.role_of(challenge, &caller).is_none() {
            return Err(AgreementError::NotAParty {
                caller,
                challenge_id,
            });
        }
        challenge.ensure_state(ChallengeState::Open, "escalate")?;
        challenge.ensure_escalation_unblocked(precedence, now)?;

        let setting = self.settings.get(action.setting_id)?;
        let arbitrator_address = setting.arbitrator;
        let agreement_digest = sha256_bytes(&setting.content);
        let arbitrator = self
            .directory
            .arbitrator(&arbitrator_address)
            .map_err(|reason| AgreementError::InvalidArbitrator {
                address: arbitrator_address,
                reason,
            })?;
        let metadata = DisputeMetadata {
            setting_id: action.setting_id,
            agreement_digest,
            action_id: action.id,
            app: action.app,
            disputable_action_id: action.disputable_action_id.clone(),
            submitter: action.submitter,
            action_context: action.context.clone(),
            challenge_id,
            challenger: challenge.challenger,
            challenge_context: challenge.context.clone(),
            escalated_by: caller,
            settlement_offer: challenge.offer.map(|o| o.amount),
        };
        let request = self.disputes.prepare(metadata)?;

        let factory = self.factory()?;
        let fees = arbitrator.dispute_fees();
        let fee_lock = if fees.amount.is_zero() {
            None
        } else {
            let pool = factory.pool(&fees.token)?;
            Some(self.collateral.lock(
                &*pool,
                LockOwner::DisputeFee(challenge_id),
                caller,
                fees.amount,
                now,
            )?)
        };

        let arbitrator_dispute_id =
            match self
                .disputes
                .submit(&*arbitrator, arbitrator_address, &request)
            {
                Ok(id) => id,
                Err(err) => {
                    self.compensate(&*factory, fee_lock, now);
                    return Err(err);
                }
            };

        let dispute_id = request.dispute_id;
        let challenge = action.challenge_mut(challenge_id)?;
        challenge.supersede_offer();
        challenge.state = ChallengeState::Disputed;
        challenge.escalated_by = Some(caller);
        challenge.fee_lock = fee_lock;
        challenge.dispute = Some(Dispute {
            id: dispute_id,
            challenge_id,
            arbitrator: arbitrator_address,
            arbitrator_dispute_id,
            metadata_digest: request.metadata_digest,
            ruling: Ruling::Pending,
            evidence: Vec::new(),
            created_at: now,
            ruled_at: None,
        });
        action.state = ActionState::Disputed;

        let action_id = action.id;
        self.actions.insert(action_id, action);
        self.disputes.register(dispute_id, challenge_id);
        self.events.push(
            now,
            AgreementEvent::DisputeCreated {
                action_id,
                challenge_id,
                dispute_id,
            },
        );
        tracing::info!(
            action = %action_id,
            challenge = %challenge_id,
            dispute = %dispute_id,
            arbitrator = %arbitrator_address,
            arbitrator_dispute = %arbitrator_dispute_id,
            "challenge escalated"
        );
        Ok(dispute_id)
    }

    /// Submit evidence to a pending dispute. Submitter or challenger only.
    pub fn submit_evidence(
        &mut self,
        caller: Address,
        dispute_id: DisputeId,
        evidence: &[u8],
    ) -> AgreementResult<ContentDigest> {
        let now = self.clock.now();
        let challenge_id = self.disputes.challenge_of(dispute_id)?;
        let mut action = self.action_of(challenge_id)?.clone();
        let challenge = action.challenge(challenge_id)?;
        let dispute = challenge
            .dispute
            .as_ref()
            .ok_or(AgreementError::DisputeNotFound(dispute_id))?;
        dispute.ensure_open()?;
        let role = action
            .role_of(challenge, &caller)
            .ok_or(AgreementError::NotAParty {
                caller,
                challenge_id,
            })?;

        let arbitrator_address = dispute.arbitrator;
        let arbitrator = self
            .directory
            .arbitrator(&arbitrator_address)
            .map_err(|reason| AgreementError::InvalidArbitrator {
                address: arbitrator_address,
                reason,
            })?;
        arbitrator
            .submit_evidence(dispute.arbitrator_dispute_id, &caller, evidence)
            .map_err(|err| {
                tracing::warn!(dispute = %dispute_id, error = %err, "arbitrator rejected evidence");
                AgreementError::ArbitratorRejected {
                    arbitrator: arbitrator_address,
                    reason: err.to_string(),
                }
            })?;

        let record = action
            .challenge_mut(challenge_id)?
            .dispute
            .as_mut()
            .ok_or(AgreementError::DisputeNotFound(dispute_id))?
            .record_evidence(caller, role, evidence, now);

        self.actions.insert(action.id, action);
        self.events.push(
            now,
            AgreementEvent::EvidenceSubmitted {
                dispute_id,
                party: caller,
                digest: record.digest.clone(),
            },
        );
        tracing::info!(dispute = %dispute_id, party = %caller, digest = %record.digest, "evidence submitted");
        Ok(record.digest)
    }

    /// Record a ruling given as an arbitrator code.
    pub fn resolve_code(
        &mut self,
        caller: Address,
        dispute_id: DisputeId,
        code: u8,
    ) -> AgreementResult<()> {
        let ruling = Ruling::from_code(code)?;
        self.resolve(caller, dispute_id, ruling)
    }

    /// Record the ruling of the pinned arbitrator and apply it.
    ///
    /// Exactly one ruling is accepted per dispute. The parties' collateral
    /// moves in one pool batch together with the state transition; if the
    /// pool refuses, nothing changes and the ruling can be delivered again.
    ///
    /// A ruling for the challenger cancels the action. Any other ruling
    /// resumes the challenge window for the time that was left, with the
    /// submitter's collateral still locked.
    ///
    /// The dispute fee is routed after the ruling is committed. If that
    /// fails, the fee stays locked and [`Agreement::settle_dispute_fee`]
    /// retries it.
    pub fn resolve(
        &mut self,
        caller: Address,
        dispute_id: DisputeId,
        ruling: Ruling,
    ) -> AgreementResult<()> {
        let now = self.clock.now();
        let challenge_id = self.disputes.challenge_of(dispute_id)?;
        let mut action = self.action_of(challenge_id)?.clone();
        let challenge = action.challenge(challenge_id)?;
        let dispute = challenge
            .dispute
            .as_ref()
            .ok_or(AgreementError::DisputeNotFound(dispute_id))?;
        dispute.check_ruling(&caller, ruling)?;

        let parties = self.ruling_parties(&action, challenge, dispute);
        self.settle(&ruling_plan(dispute_id, ruling, &parties), now)?;

        let challenge = action.challenge_mut(challenge_id)?;
        if let Some(d) = challenge.dispute.as_mut() {
            d.record_ruling(ruling, now);
        }
        challenge.close(ChallengeState::Ruled(ruling), now);

        let action_id = action.id;
        let app_action_id = action.disputable_action_id.clone();
        let (notification, outcome) = match ruling {
            Ruling::InFavorOfChallenger => {
                action.finish(ActionState::Cancelled, now);
                (
                    AppNotification::Cancelled {
                        action_id,
                        disputable_action_id: app_action_id,
                        reason: CancelReason::RuledForChallenger,
                    },
                    AgreementEvent::ActionCancelled { action_id },
                )
            }
            Ruling::InFavorOfSubmitter | Ruling::Refused | Ruling::Pending => {
                action.resume(now);
                (
                    AppNotification::Resumed {
                        action_id,
                        disputable_action_id: app_action_id,
                    },
                    AgreementEvent::ActionResumed { action_id },
                )
            }
        };

        let app = action.app;
        self.actions.insert(action_id, action);
        self.events
            .push(now, AgreementEvent::Ruled { dispute_id, ruling });
        self.events.push(now, outcome);
        tracing::info!(dispute = %dispute_id, action = %action_id, ruling = %ruling, "ruling applied");

        if let Some(plan) = fee_plan(dispute_id, ruling, &parties) {
            match self.settle(&plan, now) {
                Ok(()) => {
                    self.events
                        .push(now, AgreementEvent::DisputeFeeSettled { dispute_id });
                }
                Err(err) => {
                    tracing::error!(dispute = %dispute_id, error = %err, "dispute fee settlement failed, fee stays locked");
                }
            }
        }

        self.notify(app, notification);
        Ok(())
    }

    /// Route the fee of a ruled dispute whose fee settlement failed.
    ///
    /// Does nothing when no fee was charged or it was already routed.
    /// Fails `DisputePending` before the ruling.
    pub fn settle_dispute_fee(&mut self, dispute_id: DisputeId) -> AgreementResult<()> {
        let now = self.clock.now();
        let challenge_id = self.disputes.challenge_of(dispute_id)?;
        let action = self.action_of(challenge_id)?;
        let challenge = action.challenge(challenge_id)?;
        let dispute = challenge
            .dispute
            .as_ref()
            .ok_or(AgreementError::DisputeNotFound(dispute_id))?;
        if dispute.ruling == Ruling::Pending {
            return Err(AgreementError::DisputePending(dispute_id));
        }
        let parties = self.ruling_parties(action, challenge, dispute);
        let Some(plan) = fee_plan(dispute_id, dispute.ruling, &parties) else {
            return Ok(());
        };
        let lock = plan
            .dispositions
            .first()
            .map(|d| d.lock_id())
            .ok_or(AgreementError::DisputeNotFound(dispute_id))?;
        if !self.collateral.get(lock)?.is_locked() {
            return Ok(());
        }

        self.settle(&plan, now)?;
        self.events
            .push(now, AgreementEvent::DisputeFeeSettled { dispute_id });
        tracing::info!(dispute = %dispute_id, lock = %lock, "dispute fee settled on retry");
        Ok(())
    }

    /// A dispute by id.
    pub fn dispute(&self, id: DisputeId) -> AgreementResult<&Dispute> {
        let challenge_id = self.disputes.challenge_of(id)?;
        self.challenge_record(challenge_id)?
            .dispute
            .as_ref()
            .ok_or(AgreementError::DisputeNotFound(id))
    }

    // ── Collateral and inspection ──────────────────────────────────────

    /// A collateral lock by id.
    pub fn lock(&self, id: LockId) -> AgreementResult<&CollateralLock> {
        self.collateral.get(id)
    }

    /// The collateral ledger.
    pub fn collateral(&self) -> &CollateralManager {
        &self.collateral
    }

    /// The event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Deployment configuration.
    pub fn config(&self) -> &AgreementConfig {
        &self.config
    }

    /// The governor, once initialized.
    pub fn governor(&self) -> Option<Address> {
        self.governor
    }

    /// Current protocol time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn ensure_governor(&self, caller: Address, operation: &'static str) -> AgreementResult<()> {
        match self.governor {
            None => Err(AgreementError::NotInitialized),
            Some(g) if g == caller => Ok(()),
            Some(_) => Err(AgreementError::Unauthorized { caller, operation }),
        }
    }

    fn factory(&self) -> AgreementResult<Arc<dyn StakingFactory>> {
        let address = self.staking_factory.ok_or(AgreementError::NotInitialized)?;
        self.directory
            .staking_factory(&address)
            .map_err(|reason| AgreementError::InvalidStakingFactory { address, reason })
    }

    /// The staking pool for a token, through the configured factory.
    pub fn staking_pool(
        &self,
        token: &TokenId,
    ) -> AgreementResult<Arc<dyn StakingPool>> {
        Ok(self.factory()?.pool(token)?)
    }

    fn ruling_parties(
        &self,
        action: &Action,
        challenge: &Challenge,
        dispute: &Dispute,
    ) -> RulingParties {
        RulingParties {
            submitter: action.submitter,
            challenger: challenge.challenger,
            submitter_lock: action.lock_id,
            challenger_lock: challenge.lock_id,
            fee_lock: challenge.fee_lock,
            escalated_by: challenge.escalated_by.unwrap_or(challenge.challenger),
            arbitrator: dispute.arbitrator,
            slash_beneficiary: self.config.slash_beneficiary(action.submitter),
        }
    }

    fn action_of(&self, challenge_id: ChallengeId) -> AgreementResult<&Action> {
        let action_id = self
            .challenge_index
            .get(&challenge_id)
            .ok_or(AgreementError::ChallengeNotFound(challenge_id))?;
        self.action(*action_id)
    }

    fn settle(&mut self, plan: &SettlementPlan, now: Timestamp) -> AgreementResult<()> {
        let factory = self.factory()?;
        self.collateral.settle(&*factory, plan, now)
    }

    fn compensate(&mut self, factory: &dyn StakingFactory, lock: Option<LockId>, now: Timestamp) {
        if let Some(lock) = lock {
            if let Err(err) = self.collateral.compensate(factory, lock, now) {
                tracing::error!(lock = %lock, error = %err, "failed to compensate fresh collateral lock");
            }
        }
    }

    fn notify(&self, app: Address, notification: AppNotification) {
        match self.apps.get(&app) {
            Some(registered) => registered.hooks.notify(&notification),
            None => tracing::debug!(app = %app, "no hooks registered for app"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryArbitrator, InMemoryFeeCashier, InMemoryStaking, RecordingApp};
    use crate::settings::CollateralRequirement;
    use crate::settlement::SettlementPrecedence;
    use agreement_core::{Amount, ManualClock};

    fn ant() -> TokenId {
        TokenId::new("ANT").unwrap()
    }

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    struct Fixture {
        agreement: Agreement,
        clock: ManualClock,
        staking: Arc<InMemoryStaking>,
        court: Arc<InMemoryArbitrator>,
        cashier: Arc<InMemoryFeeCashier>,
        app: Arc<RecordingApp>,
    }

    impl Fixture {
        fn balance(&self, who: &str) -> Amount {
            self.staking.pool_handle(&ant()).available_balance(&addr(who))
        }

        fn submit(&mut self) -> ActionId {
            self.agreement
                .submit(addr("voting"), DisputableActionId::new("vote-1"), addr("alice"), "raise budget")
                .unwrap()
        }
    }

    fn draft() -> SettingDraft {
        SettingDraft {
            title: "Community covenant".into(),
            content: b"ipfs:covenant-v1".to_vec(),
            arbitrator: addr("court"),
            fee_cashier: addr("cashier"),
            collateral: CollateralRequirement {
                token: ant(),
                action_amount: Amount::new(100),
                challenge_amount: Amount::new(50),
                challenge_duration_secs: 3_600,
            },
        }
    }

    fn directory(
        staking: &Arc<InMemoryStaking>,
        court: &Arc<InMemoryArbitrator>,
        cashier: &Arc<InMemoryFeeCashier>,
    ) -> CollaboratorDirectory {
        let mut dir = CollaboratorDirectory::new();
        dir.register_staking_factory(addr("staking"), staking.clone());
        dir.register_arbitrator(addr("court"), court.clone());
        dir.register_fee_cashier(addr("cashier"), cashier.clone());
        dir.register_account(addr("alice"));
        dir
    }

    fn fixture_with(config: AgreementConfig) -> Fixture {
        let clock = ManualClock::new(Timestamp::parse("2026-01-01T00:00:00Z").unwrap());
        let staking = Arc::new(InMemoryStaking::new());
        for who in ["alice", "bob", "carol"] {
            staking.fund(&ant(), addr(who), Amount::new(1_000));
        }
        let court = Arc::new(InMemoryArbitrator::new(ant(), Amount::ZERO));
        let cashier = Arc::new(InMemoryFeeCashier::new());
        let app = Arc::new(RecordingApp::new());

        let mut agreement = Agreement::new(
            config,
            directory(&staking, &court, &cashier),
            Arc::new(clock.clone()),
        );
        agreement
            .initialize(addr("governor"), addr("staking"), draft())
            .unwrap();
        agreement
            .register_app(addr("governor"), addr("voting"), AppKind::Voting, app.clone())
            .unwrap();
        Fixture {
            agreement,
            clock,
            staking,
            court,
            cashier,
            app,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(AgreementConfig::default())
    }

    // -- Settings ------------------------------------------------------------

    #[test]
    fn operations_before_initialize_fail() {
        let staking = Arc::new(InMemoryStaking::new());
        let court = Arc::new(InMemoryArbitrator::new(ant(), Amount::ZERO));
        let cashier = Arc::new(InMemoryFeeCashier::new());
        let clock = ManualClock::new(Timestamp::parse("2026-01-01T00:00:00Z").unwrap());
        let mut agreement = Agreement::new(
            AgreementConfig::default(),
            directory(&staking, &court, &cashier),
            Arc::new(clock),
        );
        assert_eq!(
            agreement
                .submit(addr("voting"), DisputableActionId::new("v"), addr("alice"), "")
                .unwrap_err(),
            AgreementError::NotInitialized
        );
        assert_eq!(
            agreement.create_setting(addr("governor"), draft()).unwrap_err(),
            AgreementError::NotInitialized
        );
        assert_eq!(
            agreement.current_setting_id().unwrap_err(),
            AgreementError::NotInitialized
        );
    }

    #[test]
    fn initialize_twice_fails() {
        let mut f = fixture();
        assert_eq!(
            f.agreement
                .initialize(addr("governor"), addr("staking"), draft())
                .unwrap_err(),
            AgreementError::AlreadyInitialized
        );
    }

    #[test]
    fn only_governor_appends_settings() {
        let mut f = fixture();
        assert!(matches!(
            f.agreement.create_setting(addr("alice"), draft()),
            Err(AgreementError::Unauthorized { .. })
        ));
        let id = f.agreement.create_setting(addr("governor"), draft()).unwrap();
        assert_eq!(id, SettingId::new(2));
        assert_eq!(f.agreement.current_setting_id().unwrap(), id);
    }

    #[test]
    fn account_as_arbitrator_is_rejected() {
        let mut f = fixture();
        let mut bad = draft();
        bad.arbitrator = addr("alice");
        assert!(matches!(
            f.agreement.create_setting(addr("governor"), bad),
            Err(AgreementError::InvalidArbitrator { .. })
        ));
        assert_eq!(f.agreement.settings().len(), 1);
    }

    // -- Submission ----------------------------------------------------------

    #[test]
    fn submit_requires_active_registered_app() {
        let mut f = fixture();
        assert_eq!(
            f.agreement
                .submit(addr("rogue"), DisputableActionId::new("v"), addr("alice"), "")
                .unwrap_err(),
            AgreementError::AppNotRegistered(addr("rogue"))
        );
        f.agreement
            .deactivate_app(addr("governor"), addr("voting"))
            .unwrap();
        assert_eq!(
            f.agreement
                .submit(addr("voting"), DisputableActionId::new("v"), addr("alice"), "")
                .unwrap_err(),
            AgreementError::AppInactive(addr("voting"))
        );
        f.agreement
            .activate_app(addr("governor"), addr("voting"))
            .unwrap();
        f.submit();
    }

    #[test]
    fn submit_locks_collateral_and_charges_fee() {
        let mut f = fixture();
        let id = f.submit();
        let action = f.agreement.action(id).unwrap();
        assert_eq!(action.state, ActionState::Scheduled);
        assert_eq!(action.setting_id, SettingId::FIRST);
        assert_eq!(f.balance("alice"), Amount::new(900));
        assert_eq!(f.cashier.charges().len(), 1);
    }

    #[test]
    fn refused_fee_compensates_the_fresh_lock() {
        let mut f = fixture();
        f.cashier.set_refusing(Some("paused"));
        let err = f
            .agreement
            .submit(addr("voting"), DisputableActionId::new("v"), addr("alice"), "")
            .unwrap_err();
        assert!(matches!(err, AgreementError::FeeRejected(_)));
        assert_eq!(f.balance("alice"), Amount::new(1_000));
        assert!(f.agreement.actions().next().is_none());
        let lock = f.agreement.collateral().iter().next().unwrap();
        assert_eq!(lock.status, crate::collateral::LockStatus::Released);
    }

    // -- Execution -----------------------------------------------------------

    #[test]
    fn execute_after_window_releases_and_notifies() {
        let mut f = fixture();
        let id = f.submit();
        assert!(matches!(
            f.agreement.execute(addr("voting"), id),
            Err(AgreementError::ChallengeWindowOpen { .. })
        ));
        f.clock.advance(3_600);
        assert!(matches!(
            f.agreement.execute(addr("bob"), id),
            Err(AgreementError::Unauthorized { .. })
        ));
        f.agreement.execute(addr("voting"), id).unwrap();
        assert_eq!(f.balance("alice"), Amount::new(1_000));
        assert_eq!(
            f.agreement.execute(addr("alice"), id).unwrap_err(),
            AgreementError::AlreadyExecuted(id)
        );
        assert!(matches!(
            f.app.notifications().last(),
            Some(AppNotification::Executed { .. })
        ));
    }

    #[test]
    fn app_may_close_scheduled_action() {
        let mut f = fixture();
        let id = f.submit();
        assert!(matches!(
            f.agreement.close(addr("alice"), id),
            Err(AgreementError::Unauthorized { .. })
        ));
        f.agreement.close(addr("voting"), id).unwrap();
        assert_eq!(f.agreement.action(id).unwrap().state, ActionState::Cancelled);
        assert_eq!(f.balance("alice"), Amount::new(1_000));
        assert!(matches!(
            f.agreement.challenge(addr("bob"), id, None, ""),
            Err(AgreementError::InvalidActionState { .. })
        ));
    }

    // -- Challenges ----------------------------------------------------------

    #[test]
    fn self_challenge_follows_config() {
        let mut f = fixture();
        let id = f.submit();
        assert_eq!(
            f.agreement.challenge(addr("alice"), id, None, "").unwrap_err(),
            AgreementError::SelfChallenge(id)
        );

        let mut f = fixture_with(AgreementConfig {
            allow_self_challenge: true,
            ..AgreementConfig::default()
        });
        let id = f.submit();
        f.agreement.challenge(addr("alice"), id, None, "").unwrap();
    }

    #[test]
    fn challenge_pauses_window_and_cancel_resumes_it() {
        let mut f = fixture();
        let id = f.submit();
        f.clock.advance(600);
        let c = f.agreement.challenge(addr("bob"), id, None, "off-topic").unwrap();
        assert_eq!(f.balance("bob"), Amount::new(950));

        f.clock.advance(10_000);
        assert!(matches!(
            f.agreement.cancel_challenge(addr("alice"), c),
            Err(AgreementError::Unauthorized { .. })
        ));
        f.agreement.cancel_challenge(addr("bob"), c).unwrap();
        assert_eq!(f.balance("bob"), Amount::new(1_000));

        let action = f.agreement.action(id).unwrap();
        assert_eq!(action.state, ActionState::Scheduled);
        assert_eq!(action.window.remaining_secs(), 3_000);
        f.clock.advance(2_999);
        assert!(f.agreement.execute(addr("voting"), id).is_err());
        f.clock.advance(1);
        f.agreement.execute(addr("voting"), id).unwrap();
    }

    #[test]
    fn challenge_without_allowance_changes_nothing() {
        let mut f = fixture();
        let id = f.submit();
        let err = f.agreement.challenge(addr("dave"), id, None, "").unwrap_err();
        assert!(matches!(err, AgreementError::InsufficientAllowance { .. }));
        assert_eq!(f.agreement.action(id).unwrap().state, ActionState::Scheduled);
        assert!(f.app.notifications().is_empty());
    }

    // -- Settlement ----------------------------------------------------------

    #[test]
    fn live_offer_blocks_escalation_under_offer_first() {
        let mut f = fixture();
        let id = f.submit();
        let expires_at = f.agreement.now().plus_secs(600);
        let c = f
            .agreement
            .challenge(
                addr("bob"),
                id,
                Some(SettlementTerms {
                    amount: Amount::new(40),
                    expires_at,
                }),
                "",
            )
            .unwrap();
        assert!(matches!(
            f.agreement.escalate(addr("alice"), c),
            Err(AgreementError::SettlementPending { .. })
        ));
        f.agreement.reject_settlement(addr("alice"), c).unwrap();
        f.agreement.escalate(addr("alice"), c).unwrap();
    }

    #[test]
    fn escalation_first_supersedes_offer() {
        let mut f = fixture_with(AgreementConfig {
            settlement_precedence: SettlementPrecedence::EscalationFirst,
            ..AgreementConfig::default()
        });
        let id = f.submit();
        let expires_at = f.agreement.now().plus_secs(600);
        let c = f
            .agreement
            .challenge(
                addr("bob"),
                id,
                Some(SettlementTerms {
                    amount: Amount::new(40),
                    expires_at,
                }),
                "",
            )
            .unwrap();
        f.agreement.escalate(addr("alice"), c).unwrap();
        let challenge = f.agreement.challenge_record(c).unwrap();
        assert_eq!(challenge.offer.unwrap().status, OfferStatus::Superseded);
        assert!(matches!(
            f.agreement.accept_settlement(addr("alice"), c),
            Err(AgreementError::AlreadyEscalated { .. })
        ));
    }

    #[test]
    fn propose_and_withdraw_are_challenger_only() {
        let mut f = fixture();
        let id = f.submit();
        let c = f.agreement.challenge(addr("bob"), id, None, "").unwrap();
        let terms = SettlementTerms {
            amount: Amount::new(10),
            expires_at: f.agreement.now().plus_secs(60),
        };
        assert!(matches!(
            f.agreement.propose_settlement(addr("alice"), c, terms),
            Err(AgreementError::Unauthorized { .. })
        ));
        f.agreement.propose_settlement(addr("bob"), c, terms).unwrap();
        f.agreement.withdraw_settlement(addr("bob"), c).unwrap();
        assert_eq!(
            f.agreement.accept_settlement(addr("alice"), c).unwrap_err(),
            AgreementError::NoStandingOffer(c)
        );
    }

    // -- Disputes ------------------------------------------------------------

    #[test]
    fn refused_dispute_compensates_fee_lock() {
        let mut f = fixture();
        f.court.set_fees(ant(), Amount::new(25));
        let id = f.submit();
        let c = f.agreement.challenge(addr("bob"), id, None, "").unwrap();
        f.court.set_refusing(Some("docket full"));

        assert!(matches!(
            f.agreement.escalate(addr("bob"), c),
            Err(AgreementError::ArbitratorRejected { .. })
        ));
        assert_eq!(f.balance("bob"), Amount::new(950));
        assert_eq!(
            f.agreement.challenge_record(c).unwrap().state,
            ChallengeState::Open
        );
        assert_eq!(f.agreement.action(id).unwrap().state, ActionState::Challenged);

        f.court.set_refusing(None);
        let d = f.agreement.escalate(addr("bob"), c).unwrap();
        assert_eq!(f.balance("bob"), Amount::new(925));
        assert_eq!(f.court.disputes()[0].dispute_id, d);
        assert!(matches!(
            f.agreement.escalate(addr("alice"), c),
            Err(AgreementError::AlreadyEscalated { .. })
        ));
    }

    #[test]
    fn evidence_and_ruling_guards() {
        let mut f = fixture();
        let id = f.submit();
        let c = f.agreement.challenge(addr("bob"), id, None, "").unwrap();
        assert!(matches!(
            f.agreement.escalate(addr("carol"), c),
            Err(AgreementError::NotAParty { .. })
        ));
        let d = f.agreement.escalate(addr("bob"), c).unwrap();

        f.agreement.submit_evidence(addr("alice"), d, b"minutes").unwrap();
        f.agreement.submit_evidence(addr("bob"), d, b"counter").unwrap();
        assert!(matches!(
            f.agreement.submit_evidence(addr("carol"), d, b"noise"),
            Err(AgreementError::NotAParty { .. })
        ));
        assert_eq!(f.agreement.dispute(d).unwrap().evidence.len(), 2);
        assert_eq!(f.court.evidence().len(), 2);

        assert!(matches!(
            f.agreement.resolve(addr("bob"), d, Ruling::InFavorOfChallenger),
            Err(AgreementError::UnauthorizedRuling { .. })
        ));
        assert_eq!(
            f.agreement.resolve_code(addr("court"), d, 7).unwrap_err(),
            AgreementError::InvalidRuling(7)
        );
        f.agreement.resolve_code(addr("court"), d, 3).unwrap();
        assert!(matches!(
            f.agreement.resolve(addr("court"), d, Ruling::InFavorOfChallenger),
            Err(AgreementError::AlreadyRuled { .. })
        ));
        assert!(matches!(
            f.agreement.submit_evidence(addr("alice"), d, b"late"),
            Err(AgreementError::DisputeClosed { .. })
        ));
    }

    #[test]
    fn ruling_for_submitter_resumes_the_remaining_window() {
        let mut f = fixture();
        let id = f.submit();
        f.clock.advance(600);
        let c = f.agreement.challenge(addr("bob"), id, None, "").unwrap();
        let d = f.agreement.escalate(addr("alice"), c).unwrap();
        f.clock.advance(5_000);
        f.agreement
            .resolve(addr("court"), d, Ruling::InFavorOfSubmitter)
            .unwrap();

        let action = f.agreement.action(id).unwrap();
        assert_eq!(action.state, ActionState::Scheduled);
        assert_eq!(action.window.remaining_secs(), 3_000);
        assert!(f.agreement.lock(action.lock_id).unwrap().is_locked());
        assert_eq!(f.balance("alice"), Amount::new(950));
        assert_eq!(f.balance("bob"), Amount::new(950));
        assert!(matches!(
            f.app.notifications().last(),
            Some(AppNotification::Resumed { .. })
        ));

        f.clock.advance(2_999);
        assert!(matches!(
            f.agreement.execute(addr("alice"), id),
            Err(AgreementError::ChallengeWindowOpen { .. })
        ));
        f.clock.advance(1);
        f.agreement.execute(addr("alice"), id).unwrap();
        assert_eq!(f.agreement.action(id).unwrap().state, ActionState::Executed);
        assert_eq!(f.balance("alice"), Amount::new(1_050));
    }

    #[test]
    fn treasury_receives_slashed_challenger_collateral_when_configured() {
        let treasury = addr("treasury");
        let mut f = fixture_with(AgreementConfig {
            challenger_slash_beneficiary: crate::config::SlashBeneficiary::Treasury,
            treasury: Some(treasury),
            ..AgreementConfig::default()
        });
        let id = f.submit();
        let c = f.agreement.challenge(addr("bob"), id, None, "").unwrap();
        let d = f.agreement.escalate(addr("bob"), c).unwrap();
        f.agreement
            .resolve(addr("court"), d, Ruling::InFavorOfSubmitter)
            .unwrap();
        assert_eq!(f.balance("treasury"), Amount::new(50));
        assert_eq!(f.balance("alice"), Amount::new(900));
        assert_eq!(f.balance("bob"), Amount::new(950));
    }

    #[test]
    fn refused_charge_does_not_reuse_the_action_id() {
        let mut f = fixture();
        f.cashier.set_refusing(Some("fees paused"));
        assert!(f.agreement.actions().next().is_none());
        assert!(matches!(
            f.agreement.submit(addr("voting"), DisputableActionId::new("vote-1"), addr("alice"), ""),
            Err(AgreementError::FeeRejected(_))
        ));
        f.cashier.set_refusing(None);
        let id = f.submit();

        assert_eq!(id, ActionId::new(2));
        for owner in [LockOwner::Action(ActionId::FIRST), LockOwner::Action(id)] {
            assert_eq!(f.agreement.collateral().owned_by(owner).count(), 1);
        }
    }

    #[test]
    fn fee_retry_requires_a_ruling_and_runs_once() {
        let mut f = fixture();
        f.court.set_fees(ant(), Amount::new(25));
        let id = f.submit();
        let c = f.agreement.challenge(addr("bob"), id, None, "").unwrap();
        let d = f.agreement.escalate(addr("alice"), c).unwrap();
        assert_eq!(
            f.agreement.settle_dispute_fee(d).unwrap_err(),
            AgreementError::DisputePending(d)
        );

        f.agreement
            .resolve(addr("court"), d, Ruling::InFavorOfChallenger)
            .unwrap();
        assert_eq!(f.balance("court"), Amount::new(25));
        let before = f.agreement.events().len();
        f.agreement.settle_dispute_fee(d).unwrap();
        assert_eq!(f.agreement.events().len(), before);
        assert_eq!(f.balance("court"), Amount::new(25));
    }

    #[test]
    fn every_committed_transition_is_logged() {
        let mut f = fixture();
        let id = f.submit();
        f.clock.advance(3_600);
        f.agreement.execute(addr("alice"), id).unwrap();
        let names: Vec<_> = f.agreement.events().events().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["setting_changed", "app_registered", "action_submitted", "action_executed"]
        );
    }
}
