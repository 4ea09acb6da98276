//! Status conditions surfaced on declared resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const VM_PROVISIONED_CONDITION: &str = "VMProvisioned";
pub const READY_CONDITION: &str = "Ready";

// Stable reason codes; every stalled stage has its own.
pub const VM_CREATION_FAILED_REASON: &str = "VMCreationFailed";
pub const VM_PROVISION_STARTED_REASON: &str = "VMProvisionStarted";
pub const POWERING_ON_REASON: &str = "PoweringOn";
pub const POWERING_ON_FAILED_REASON: &str = "PoweringOnFailed";
pub const WAITING_FOR_NETWORK_ADDRESS_REASON: &str = "WaitingForNetworkAddress";
pub const WAITING_FOR_BIOS_UUID_REASON: &str = "WaitingForBIOSUUID";
pub const WAITING_FOR_BOOTSTRAP_DATA_REASON: &str = "WaitingForBootstrapData";
pub const WAITING_FOR_PLACEMENT_GROUP_REASON: &str = "WaitingForVirtualMachineGroup";
pub const WAITING_FOR_GROUP_MEMBERSHIP_REASON: &str = "WaitingForVirtualMachineGroupMembership";
pub const CLONING_REASON: &str = "Cloning";
pub const CLONING_FAILED_REASON: &str = "CloningFailed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
    #[default]
    #[serde(rename = "")]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Ordered set of conditions, at most one per type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    pub fn has(&self, type_: &str) -> bool {
        self.get(type_).is_some()
    }

    pub fn is_true(&self, type_: &str) -> bool {
        self.get(type_).is_some_and(|c| c.status)
    }

    pub fn mark_true(&mut self, type_: &str) {
        self.set(Condition {
            type_: type_.to_string(),
            status: true,
            reason: String::new(),
            severity: Severity::None,
            message: String::new(),
            last_transition_time: Utc::now(),
        });
    }

    pub fn mark_false(
        &mut self,
        type_: &str,
        reason: &str,
        severity: Severity,
        message: impl Into<String>,
    ) {
        self.set(Condition {
            type_: type_.to_string(),
            status: false,
            reason: reason.to_string(),
            severity,
            message: message.into(),
            last_transition_time: Utc::now(),
        });
    }

    /// Replace the condition of the same type
    ///
    /// The transition time only moves when the status flips, so repeated
    /// reconciles do not churn the object.
    pub fn set(&mut self, mut condition: Condition) {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.0.push(condition),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }
}
