//! The `agreement simulate` pipeline end to end: scenario and config files
//! on disk, replayed against in-memory collaborators.

use std::path::PathBuf;

use agreement_cli::scenario::Scenario;
use agreement_cli::simulate::{run_simulate, simulate, total_stake, SimulateArgs};
use agreement_core::{Amount, SettingId};
use agreement_protocol::{ActionState, AgreementConfig, SettlementPrecedence};

const SETTLEMENT: &str = include_str!("../../agreement-cli/scenarios/settlement.yaml");
const DISPUTE: &str = include_str!("../../agreement-cli/scenarios/dispute.yaml");
const REFUSED: &str = include_str!("../../agreement-cli/scenarios/refused.yaml");

const VERSIONED: &str = r#"
start: "2026-03-01T12:00:00Z"
collateral:
  action_amount: 100
  challenge_amount: 50
  challenge_duration_secs: 3600
participants:
  alice: 1000
  bob: 1000
apps:
  - name: voting
    kind: voting
steps:
  - op: submit
    app: voting
    submitter: alice
    id: vote-1
  - op: create_setting
    title: Stricter covenant
    collateral:
      action_amount: 300
      challenge_amount: 150
      challenge_duration_secs: 7200
  - op: submit
    app: voting
    submitter: bob
    id: vote-2
  - op: advance
    secs: 3600
  - op: execute
    caller: alice
    action: 1
  - op: execute
    caller: bob
    action: 2
    expect_error: open until
  - op: deactivate_app
    app: voting
  - op: submit
    app: voting
    submitter: alice
    id: vote-3
    expect_error: inactive
"#;

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn bundled_scenarios_replay_and_conserve_stake() {
    for (name, yaml, participants) in [
        ("settlement", SETTLEMENT, 2u128),
        ("dispute", DISPUTE, 2),
        ("refused", REFUSED, 2),
    ] {
        let scenario = Scenario::from_yaml_str(yaml).unwrap();
        let report = simulate(&scenario, AgreementConfig::default())
            .unwrap_or_else(|e| panic!("{name}: {e:#}"));
        assert_eq!(report.steps.len(), scenario.steps.len(), "{name}");
        assert_eq!(
            total_stake(&report),
            Amount::new(participants * 1_000),
            "{name}"
        );
        for account in report.balances.values() {
            assert_eq!(account.locked, Amount::ZERO, "{name}");
        }
    }
}

#[test]
fn run_simulate_reads_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write(&dir, "versioned.yaml", VERSIONED);
    let config = write(&dir, "agreement.yaml", "allow_self_challenge: true\n");
    let args = SimulateArgs {
        scenario,
        json: true,
    };
    assert_eq!(run_simulate(&args, Some(&config)).unwrap(), 0);
}

#[test]
fn actions_keep_the_setting_they_were_submitted_under() {
    let scenario = Scenario::from_yaml_str(VERSIONED).unwrap();
    let report = simulate(&scenario, AgreementConfig::default()).unwrap();

    assert_eq!(report.settings.len(), 2);
    assert_eq!(report.actions[0].setting_id, SettingId::new(1));
    assert_eq!(report.actions[0].state, ActionState::Executed);
    assert_eq!(report.actions[1].setting_id, SettingId::new(2));
    assert_eq!(report.actions[1].state, ActionState::Scheduled);
    assert_eq!(report.balances["alice"].locked, Amount::ZERO);
    assert_eq!(report.balances["bob"].locked, Amount::new(300));
}

#[test]
fn config_file_changes_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write(&dir, "settlement.yaml", SETTLEMENT);
    let config = write(
        &dir,
        "agreement.yaml",
        "settlement_precedence: escalation_first\n",
    );
    assert_eq!(
        AgreementConfig::load(&config).unwrap().settlement_precedence,
        SettlementPrecedence::EscalationFirst
    );

    let args = SimulateArgs {
        scenario,
        json: false,
    };
    let err = run_simulate(&args, Some(&config)).unwrap_err();
    assert!(format!("{err:#}").contains("step 4 (escalate)"));
}

#[test]
fn invalid_inputs_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write(&dir, "settlement.yaml", SETTLEMENT);

    let bad_config = write(&dir, "agreement.yaml", "quorum: 3\n");
    let args = SimulateArgs {
        scenario: scenario.clone(),
        json: false,
    };
    assert!(run_simulate(&args, Some(&bad_config)).is_err());

    let missing = SimulateArgs {
        scenario: dir.path().join("missing.yaml"),
        json: false,
    };
    let err = run_simulate(&missing, None).unwrap_err();
    assert!(format!("{err:#}").contains("missing.yaml"));
}

#[test]
fn json_report_carries_events_and_balances() {
    let scenario = Scenario::from_yaml_str(DISPUTE).unwrap();
    let report = simulate(&scenario, AgreementConfig::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    let events = json["events"].as_array().unwrap();
    assert_eq!(events.len(), report.events.len());
    let last = events.last().unwrap();
    assert_eq!(last["event"], "action_cancelled");
    assert_eq!(last["sequence"], events.len() as u64);

    assert_eq!(json["actions"][0]["state"], "cancelled");
    assert_eq!(json["balances"]["alice"]["available"], "900");
    assert_eq!(json["balances"]["bob"]["available"], "1100");
    assert_eq!(json["balances"]["bob"]["locked"], "0");
}
