//! # agreement-cli — Command-Line Interface for the Agreement Protocol
//!
//! Provides the `agreement` binary.
//!
//! ## Subcommands
//!
//! - `agreement simulate`: replay a scripted scenario against in-memory
//!   collaborators and print the event log and final balances.
//! - `agreement config`: validate a deployment config or print the
//!   defaults.
//!
//! ```bash
//! agreement simulate scenarios/settlement.yaml
//! agreement --config agreement.yaml simulate scenarios/dispute.yaml --json
//! agreement config check agreement.yaml
//! ```

pub mod config;
pub mod scenario;
pub mod simulate;
