//! # Agreement Configuration
//!
//! Deployment-level policy that is not part of any versioned setting.
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```yaml
//! settlement_precedence: offer_first      # or escalation_first
//! challenger_slash_beneficiary: treasury  # or submitter
//! treasury: "0x…"                         # required for treasury
//! allow_self_challenge: false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use agreement_core::Address;

use crate::settlement::SettlementPrecedence;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The document parsed but is inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Who receives a challenger's collateral when the submitter wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashBeneficiary {
    /// The submitter of the challenged action.
    #[default]
    Submitter,
    /// The configured treasury address.
    Treasury,
}

/// Deployment policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgreementConfig {
    /// Tie-break between a live settlement offer and escalation.
    pub settlement_precedence: SettlementPrecedence,
    /// Beneficiary of slashed challenger collateral.
    pub challenger_slash_beneficiary: SlashBeneficiary,
    /// Treasury address, required when the beneficiary is `treasury`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treasury: Option<Address>,
    /// Whether a submitter may challenge their own action.
    pub allow_self_challenge: bool,
}

impl AgreementConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.challenger_slash_beneficiary, self.treasury) {
            (SlashBeneficiary::Treasury, None) => Err(ConfigError::Invalid(
                "challenger_slash_beneficiary is treasury but no treasury address is set".into(),
            )),
            (_, Some(addr)) if addr.is_zero() => Err(ConfigError::Invalid(
                "treasury must not be the zero address".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Address receiving slashed challenger collateral for an action
    /// submitted by `submitter`.
    pub fn slash_beneficiary(&self, submitter: Address) -> Address {
        match (self.challenger_slash_beneficiary, self.treasury) {
            (SlashBeneficiary::Treasury, Some(treasury)) => treasury,
            _ => submitter,
        }
    }
}
