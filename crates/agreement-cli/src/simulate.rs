//! # Simulate Subcommand
//!
//! Replays a [`Scenario`] against a fresh agreement wired to in-memory
//! collaborators and a manual clock, then prints what happened: the step
//! outcomes, the event log, final action states and stake balances.
//!
//! A step that fails aborts the run unless it carries `expect_error`, in
//! which case the error message must contain the given text. A step
//! marked `expect_error` that succeeds also aborts the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use agreement_core::{ActionId, Amount, DisputableActionId, ManualClock, SettingId, TokenId};
use agreement_protocol::memory::StakeAccount;
use agreement_protocol::{
    ActionState, Agreement, AgreementConfig, AgreementResult, AppNotification,
    CollaboratorDirectory, CollateralRequirement, EventRecord, InMemoryArbitrator,
    InMemoryFeeCashier, InMemoryStaking, RecordingApp, SettingDraft, SettlementTerms,
};

use crate::scenario::{
    address_of, CollateralSpec, OfferSpec, Scenario, StepOp, ARBITRATOR, CASHIER, GOVERNOR,
    STAKING,
};

/// Arguments for the `agreement simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Path to the scenario YAML file.
    pub scenario: PathBuf,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Execute the simulate subcommand.
pub fn run_simulate(args: &SimulateArgs, config: Option<&Path>) -> Result<u8> {
    let config = match config {
        Some(path) => AgreementConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AgreementConfig::default(),
    };
    let scenario = Scenario::load(&args.scenario)?;
    let report = simulate(&scenario, config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(0)
}

/// Outcome of one scripted step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// 1-based step number.
    pub step: usize,
    /// Operation name.
    pub op: &'static str,
    /// Error message of an expected failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final state of an action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSummary {
    /// Action id.
    pub id: ActionId,
    /// App-side id.
    pub disputable_action_id: String,
    /// Setting pinned at submission.
    pub setting_id: SettingId,
    /// Final state.
    pub state: ActionState,
    /// Number of challenges raised against it.
    pub challenges: usize,
}

/// A setting version.
#[derive(Debug, Clone, Serialize)]
pub struct SettingSummary {
    /// Version.
    pub id: SettingId,
    /// Title.
    pub title: String,
    /// Collateral requirement.
    pub collateral: CollateralRequirement,
}

/// Everything a simulation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Step outcomes, in order.
    pub steps: Vec<StepOutcome>,
    /// The full event log.
    pub events: Vec<EventRecord>,
    /// Setting versions.
    pub settings: Vec<SettingSummary>,
    /// Final action states.
    pub actions: Vec<ActionSummary>,
    /// Stake positions by name.
    pub balances: BTreeMap<String, StakeAccount>,
    /// Notifications each app received.
    pub notifications: BTreeMap<String, Vec<AppNotification>>,
}

impl SimulationReport {
    /// Human-readable rendering.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Steps:\n");
        for s in &self.steps {
            match &s.error {
                None => out.push_str(&format!("  {:>3}. {:<20} ok\n", s.step, s.op)),
                Some(e) => out.push_str(&format!(
                    "  {:>3}. {:<20} failed as expected: {e}\n",
                    s.step, s.op
                )),
            }
        }

        out.push_str("\nEvents:\n");
        for r in &self.events {
            out.push_str(&format!(
                "  #{:<4} {}  {}\n",
                r.sequence,
                r.at,
                r.event.name()
            ));
        }

        out.push_str("\nSettings:\n");
        for s in &self.settings {
            out.push_str(&format!(
                "  {}  {:?}  action {} / challenge {} {}  window {}s\n",
                s.id,
                s.title,
                s.collateral.action_amount,
                s.collateral.challenge_amount,
                s.collateral.token,
                s.collateral.challenge_duration_secs
            ));
        }

        out.push_str("\nActions:\n");
        for a in &self.actions {
            out.push_str(&format!(
                "  {}  {:<12} {:<10} {}  challenges: {}\n",
                a.id, a.disputable_action_id, a.state, a.setting_id, a.challenges
            ));
        }

        out.push_str("\nBalances:\n");
        for (name, acct) in &self.balances {
            out.push_str(&format!(
                "  {name:<12} available {:>8}  locked {:>8}\n",
                acct.available, acct.locked
            ));
        }
        out
    }
}

/// A deployed agreement and its in-memory collaborators.
pub struct Simulation {
    agreement: Agreement,
    clock: ManualClock,
    staking: Arc<InMemoryStaking>,
    token: TokenId,
    apps: BTreeMap<String, Arc<RecordingApp>>,
    names: Vec<String>,
}

impl Simulation {
    /// Deploy collaborators, fund participants, initialize the agreement
    /// and register the scenario's apps.
    pub fn deploy(scenario: &Scenario, config: AgreementConfig) -> Result<Self> {
        let token = TokenId::new(scenario.token.clone()).context("invalid scenario token")?;
        let clock = ManualClock::new(scenario.start);
        let staking = Arc::new(InMemoryStaking::new());
        let court = Arc::new(InMemoryArbitrator::new(
            token.clone(),
            scenario.arbitrator_fee,
        ));
        let cashier = Arc::new(InMemoryFeeCashier::new());

        let mut directory = CollaboratorDirectory::new();
        directory.register_staking_factory(address_of(STAKING), staking.clone());
        directory.register_arbitrator(address_of(ARBITRATOR), court);
        directory.register_fee_cashier(address_of(CASHIER), cashier);
        directory.register_account(address_of(GOVERNOR));

        let mut names = vec![ARBITRATOR.to_string()];
        for (name, stake) in &scenario.participants {
            staking.fund(&token, address_of(name), *stake);
            directory.register_account(address_of(name));
            names.push(name.clone());
        }
        if let Some(treasury) = config.treasury {
            directory.register_account(treasury);
        }

        let mut agreement = Agreement::new(config, directory, Arc::new(clock.clone()));
        agreement
            .initialize(
                address_of(GOVERNOR),
                address_of(STAKING),
                draft("Initial setting", &scenario.collateral, &token),
            )
            .context("initializing agreement")?;

        let mut apps = BTreeMap::new();
        for spec in &scenario.apps {
            let hooks = Arc::new(RecordingApp::new());
            agreement
                .register_app(
                    address_of(GOVERNOR),
                    address_of(&spec.name),
                    spec.kind.clone(),
                    hooks.clone(),
                )
                .with_context(|| format!("registering app {}", spec.name))?;
            apps.insert(spec.name.clone(), hooks);
        }

        tracing::info!(
            participants = scenario.participants.len(),
            apps = apps.len(),
            token = %token,
            "simulation deployed"
        );
        Ok(Self {
            agreement,
            clock,
            staking,
            token,
            apps,
            names,
        })
    }

    /// The agreement under simulation.
    pub fn agreement(&self) -> &Agreement {
        &self.agreement
    }

    /// Apply one operation.
    pub fn apply(&mut self, op: &StepOp) -> AgreementResult<()> {
        let a = &mut self.agreement;
        match op {
            StepOp::Advance { secs } => {
                self.clock.advance(*secs);
                Ok(())
            }
            StepOp::CreateSetting { title, collateral } => a
                .create_setting(address_of(GOVERNOR), draft(title, collateral, &self.token))
                .map(drop),
            StepOp::DeactivateApp { app } => {
                a.deactivate_app(address_of(GOVERNOR), address_of(app))
            }
            StepOp::ActivateApp { app } => a.activate_app(address_of(GOVERNOR), address_of(app)),
            StepOp::Submit {
                app,
                submitter,
                id,
                context,
            } => a
                .submit(
                    address_of(app),
                    DisputableActionId::new(id.clone()),
                    address_of(submitter),
                    context.clone(),
                )
                .map(drop),
            StepOp::Execute { caller, action } => a.execute(address_of(caller), *action),
            StepOp::Close { app, action } => a.close(address_of(app), *action),
            StepOp::Challenge {
                challenger,
                action,
                offer,
                context,
            } => {
                let terms = offer.map(|o| terms_at(&o, a));
                a.challenge(address_of(challenger), *action, terms, context.clone())
                    .map(drop)
            }
            StepOp::CancelChallenge { caller, challenge } => {
                a.cancel_challenge(address_of(caller), *challenge)
            }
            StepOp::ProposeSettlement {
                caller,
                challenge,
                offer,
            } => {
                let terms = terms_at(offer, a);
                a.propose_settlement(address_of(caller), *challenge, terms)
            }
            StepOp::WithdrawSettlement { caller, challenge } => {
                a.withdraw_settlement(address_of(caller), *challenge)
            }
            StepOp::RejectSettlement { caller, challenge } => {
                a.reject_settlement(address_of(caller), *challenge)
            }
            StepOp::AcceptSettlement { caller, challenge } => {
                a.accept_settlement(address_of(caller), *challenge)
            }
            StepOp::Escalate { caller, challenge } => {
                a.escalate(address_of(caller), *challenge).map(drop)
            }
            StepOp::Evidence {
                caller,
                dispute,
                content,
            } => a
                .submit_evidence(address_of(caller), *dispute, content.as_bytes())
                .map(drop),
            StepOp::Rule { dispute, ruling } => {
                a.resolve(address_of(ARBITRATOR), *dispute, *ruling)
            }
        }
    }

    /// Stake position of a named account.
    pub fn account(&self, name: &str) -> StakeAccount {
        self.staking.pool_handle(&self.token).account(&address_of(name))
    }

    /// Build the report.
    pub fn report(&self, steps: Vec<StepOutcome>) -> SimulationReport {
        let a = &self.agreement;
        let mut balances: BTreeMap<String, StakeAccount> = self
            .names
            .iter()
            .map(|name| (name.clone(), self.account(name)))
            .collect();
        if let Some(treasury) = a.config().treasury {
            balances.insert(
                "treasury".to_string(),
                self.staking.pool_handle(&self.token).account(&treasury),
            );
        }

        SimulationReport {
            steps,
            events: a.events().records().to_vec(),
            settings: a
                .settings()
                .iter()
                .map(|s| SettingSummary {
                    id: s.id,
                    title: s.title.clone(),
                    collateral: s.collateral.clone(),
                })
                .collect(),
            actions: a
                .actions()
                .map(|action| ActionSummary {
                    id: action.id,
                    disputable_action_id: action.disputable_action_id.to_string(),
                    setting_id: action.setting_id,
                    state: action.state,
                    challenges: action.challenges.len(),
                })
                .collect(),
            balances,
            notifications: self
                .apps
                .iter()
                .map(|(name, app)| (name.clone(), app.notifications()))
                .collect(),
        }
    }
}

fn draft(title: &str, spec: &CollateralSpec, token: &TokenId) -> SettingDraft {
    SettingDraft {
        title: title.to_string(),
        content: title.as_bytes().to_vec(),
        arbitrator: address_of(ARBITRATOR),
        fee_cashier: address_of(CASHIER),
        collateral: CollateralRequirement {
            token: token.clone(),
            action_amount: spec.action_amount,
            challenge_amount: spec.challenge_amount,
            challenge_duration_secs: spec.challenge_duration_secs,
        },
    }
}

fn terms_at(offer: &OfferSpec, agreement: &Agreement) -> SettlementTerms {
    SettlementTerms {
        amount: offer.amount,
        expires_at: agreement.now().plus_secs(offer.expires_in_secs),
    }
}

/// Run a scenario to completion.
pub fn simulate(scenario: &Scenario, config: AgreementConfig) -> Result<SimulationReport> {
    let mut sim = Simulation::deploy(scenario, config)?;
    let mut outcomes = Vec::with_capacity(scenario.steps.len());

    for (i, step) in scenario.steps.iter().enumerate() {
        let n = i + 1;
        let op = step.op.name();
        let result = sim.apply(&step.op);
        match (&step.expect_error, result) {
            (None, Ok(())) => {
                tracing::debug!(step = n, op, "step applied");
                outcomes.push(StepOutcome {
                    step: n,
                    op,
                    error: None,
                });
            }
            (None, Err(err)) => {
                return Err(anyhow::Error::new(err).context(format!("step {n} ({op}) failed")));
            }
            (Some(expected), Ok(())) => {
                bail!("step {n} ({op}) succeeded but was expected to fail with {expected:?}");
            }
            (Some(expected), Err(err)) => {
                let message = err.to_string();
                if !message.contains(expected.as_str()) {
                    bail!("step {n} ({op}) failed with {message:?}, expected {expected:?}");
                }
                tracing::info!(step = n, op, error = %message, "step failed as expected");
                outcomes.push(StepOutcome {
                    step: n,
                    op,
                    error: Some(message),
                });
            }
        }
    }

    Ok(sim.report(outcomes))
}

/// Sum of available and locked stake over every reported account.
pub fn total_stake(report: &SimulationReport) -> Amount {
    report
        .balances
        .values()
        .fold(Amount::ZERO, |acc, a| {
            Amount::new(acc.get() + a.available.get() + a.locked.get())
        })
}
