//! # Settings Registry
//!
//! Append-only log of agreement configuration versions. Setting 1 is
//! written exactly once by `initialize`; later versions are appended by
//! the governor. The current setting is always the one with the highest
//! id. Every action pins the id (and a snapshot of the collateral
//! requirement) that was current when it was submitted, so appending a
//! new version never changes how an existing action is adjudicated.

use serde::{Deserialize, Serialize};

use agreement_core::{Address, Amount, SettingId, Timestamp, TokenId};

use crate::capability::CollaboratorDirectory;
use crate::error::{AgreementError, AgreementResult};

/// Collateral an action submitter and a challenger must post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralRequirement {
    /// Token both collaterals are denominated in.
    pub token: TokenId,
    /// Locked from the submitter for the lifetime of the action.
    pub action_amount: Amount,
    /// Locked from each challenger.
    pub challenge_amount: Amount,
    /// Length of the challenge window in seconds.
    pub challenge_duration_secs: u64,
}

impl CollateralRequirement {
    /// Reject requirements that cannot be enforced.
    pub fn validate(&self) -> AgreementResult<()> {
        if self.challenge_duration_secs == 0 {
            return Err(AgreementError::InvalidCollateralRequirement(
                "challenge duration must be at least one second".into(),
            ));
        }
        Ok(())
    }
}

/// Input to `initialize` and `create_setting`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingDraft {
    /// Human-readable title.
    pub title: String,
    /// Agreement text or a pointer to it. Opaque to the protocol.
    pub content: Vec<u8>,
    /// Arbitrator ruling on disputes raised under this setting.
    pub arbitrator: Address,
    /// Cashier charging the per-action fee.
    pub fee_cashier: Address,
    /// Collateral requirement for new actions.
    pub collateral: CollateralRequirement,
}

impl SettingDraft {
    /// Check collaborators and validate the requirement.
    pub fn check(&self, directory: &CollaboratorDirectory) -> AgreementResult<()> {
        directory
            .arbitrator(&self.arbitrator)
            .map_err(|reason| AgreementError::InvalidArbitrator {
                address: self.arbitrator,
                reason,
            })?;
        directory
            .fee_cashier(&self.fee_cashier)
            .map_err(|reason| AgreementError::InvalidFeeCashier {
                address: self.fee_cashier,
                reason,
            })?;
        self.collateral.validate()
    }
}

/// An immutable configuration version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    /// Version number, starting at 1.
    pub id: SettingId,
    /// Human-readable title.
    pub title: String,
    /// Agreement text or a pointer to it.
    pub content: Vec<u8>,
    /// Arbitrator pinned by actions created under this setting.
    pub arbitrator: Address,
    /// Fee cashier.
    pub fee_cashier: Address,
    /// Collateral requirement.
    pub collateral: CollateralRequirement,
    /// When the version was appended.
    pub created_at: Timestamp,
}

/// The append-only settings log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsRegistry {
    settings: Vec<Setting>,
}

impl SettingsRegistry {
    /// An empty, uninitialized registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether setting 1 exists.
    pub fn is_initialized(&self) -> bool {
        !self.settings.is_empty()
    }

    /// Append a validated draft as the next version.
    pub(crate) fn append(&mut self, draft: SettingDraft, now: Timestamp) -> SettingId {
        let id = self
            .current_id()
            .map(|id| id.next())
            .unwrap_or(SettingId::FIRST);
        self.settings.push(Setting {
            id,
            title: draft.title,
            content: draft.content,
            arbitrator: draft.arbitrator,
            fee_cashier: draft.fee_cashier,
            collateral: draft.collateral,
            created_at: now,
        });
        id
    }

    /// A setting by id. Fails for 0 and for ids beyond the latest.
    pub fn get(&self, id: SettingId) -> AgreementResult<&Setting> {
        let index = usize::try_from(id.get())
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or(AgreementError::SettingNotFound(id))?;
        self.settings
            .get(index)
            .ok_or(AgreementError::SettingNotFound(id))
    }

    /// Id of the latest version, if initialized.
    pub fn current_id(&self) -> Option<SettingId> {
        self.settings.last().map(|s| s.id)
    }

    /// The latest version.
    pub fn current(&self) -> AgreementResult<&Setting> {
        self.settings.last().ok_or(AgreementError::NotInitialized)
    }

    /// Number of versions.
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    /// Whether no version exists.
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// All versions in order.
    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.settings.iter()
    }
}
