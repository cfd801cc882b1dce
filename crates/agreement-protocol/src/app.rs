//! # Disputable Apps
//!
//! Apps submit actions and are told what happened to them. The protocol
//! treats every app the same way: one `notify` capability receiving an
//! [`AppNotification`], dispatched on the notification tag. What an app
//! does with it (pause a vote, cancel a payment) is its own business.
//!
//! Notifications are delivered after the protocol state has been
//! committed. They cannot fail the transition that produced them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use agreement_core::{ActionId, Address, ChallengeId, DisputableActionId, Timestamp};

/// Kind of disputable app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    /// Governance votes.
    Voting,
    /// Payments and transfers.
    Finance,
    /// Anything else, labelled.
    Other(String),
}

impl std::fmt::Display for AppKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voting => f.write_str("voting"),
            Self::Finance => f.write_str("finance"),
            Self::Other(label) => write!(f, "other:{label}"),
        }
    }
}

/// Why an action was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The arbitrator ruled for the challenger.
    RuledForChallenger,
    /// The submitter accepted a settlement.
    Settled,
}

/// What an app is told about its action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notification", rename_all = "snake_case")]
pub enum AppNotification {
    /// A challenge was raised; the app should pause the action.
    Challenged {
        /// Action.
        action_id: ActionId,
        /// App-side id.
        disputable_action_id: DisputableActionId,
        /// New challenge.
        challenge_id: ChallengeId,
    },
    /// The challenge ended without deciding; the app may continue.
    Resumed {
        /// Action.
        action_id: ActionId,
        /// App-side id.
        disputable_action_id: DisputableActionId,
    },
    /// The action is final and may take effect.
    Executed {
        /// Action.
        action_id: ActionId,
        /// App-side id.
        disputable_action_id: DisputableActionId,
    },
    /// The action must not take effect.
    Cancelled {
        /// Action.
        action_id: ActionId,
        /// App-side id.
        disputable_action_id: DisputableActionId,
        /// Why.
        reason: CancelReason,
    },
}

impl AppNotification {
    /// The action concerned.
    pub fn action_id(&self) -> ActionId {
        match self {
            Self::Challenged { action_id, .. }
            | Self::Resumed { action_id, .. }
            | Self::Executed { action_id, .. }
            | Self::Cancelled { action_id, .. } => *action_id,
        }
    }
}

/// Receives notifications for an app's actions.
pub trait DisputableHooks: Send + Sync {
    /// Handle a notification. Must not panic.
    fn notify(&self, notification: &AppNotification);
}

/// A registered app.
#[derive(Clone)]
pub struct DisputableApp {
    /// App address; the only caller allowed to submit on its behalf.
    pub address: Address,
    /// Kind.
    pub kind: AppKind,
    /// Whether new actions are accepted.
    pub active: bool,
    /// Notification sink.
    pub hooks: Arc<dyn DisputableHooks>,
    /// When the app was registered.
    pub registered_at: Timestamp,
}

impl std::fmt::Debug for DisputableApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisputableApp")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("active", &self.active)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}
