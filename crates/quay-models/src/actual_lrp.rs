//! Actual LRPs: the per-instance observation.
//!
//! One actual LRP exists per `(process_guid, index)`. While a cell drains,
//! an *evacuating* record may exist alongside the normal instance record;
//! the two form an [`ActualLRPGroup`] that resolves to a single canonical
//! record for clients.

use serde::{Deserialize, Serialize};

use crate::tag::ModificationTag;
use crate::validator::{Validate, ValidationError, valid_guid};

/// Lifecycle state of an actual LRP.
///
/// ```text
///   UNCLAIMED <--> CLAIMED --> RUNNING
///       ^  \__________________/   |
///       |                         v
///       +---------------------- CRASHED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActualLRPState {
    /// Awaiting placement; no cell has claimed it.
    Unclaimed,
    /// A cell has claimed the instance but it is not yet running.
    Claimed,
    /// The instance is running on its cell.
    Running,
    /// The instance crashed and awaits a restart decision.
    Crashed,
}

/// Identity of an actual LRP: which process, which slot, which tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLRPKey {
    /// The owning process guid.
    pub process_guid: String,
    /// Instance slot; never negative.
    pub index: i32,
    /// Tenant/namespace label.
    pub domain: String,
}

impl ActualLRPKey {
    /// Creates a key.
    #[must_use]
    pub fn new(process_guid: impl Into<String>, index: i32, domain: impl Into<String>) -> Self {
        Self {
            process_guid: process_guid.into(),
            index,
            domain: domain.into(),
        }
    }
}

impl Validate for ActualLRPKey {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if !valid_guid(&self.process_guid) {
            err.invalid_field("process_guid");
        }
        if self.index < 0 {
            err.invalid_field("index");
        }
        if self.domain.is_empty() {
            err.invalid_field("domain");
        }
        err.into_result()
    }
}

/// Identity of the concrete container backing an actual LRP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLRPInstanceKey {
    /// Unique guid of the container instance.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance_guid: String,
    /// The cell hosting the instance.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cell_id: String,
}

impl ActualLRPInstanceKey {
    /// Creates an instance key.
    #[must_use]
    pub fn new(instance_guid: impl Into<String>, cell_id: impl Into<String>) -> Self {
        Self {
            instance_guid: instance_guid.into(),
            cell_id: cell_id.into(),
        }
    }

    /// True when neither field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instance_guid.is_empty() && self.cell_id.is_empty()
    }
}

impl Validate for ActualLRPInstanceKey {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if !valid_guid(&self.instance_guid) {
            err.invalid_field("instance_guid");
        }
        if self.cell_id.is_empty() {
            err.invalid_field("cell_id");
        }
        err.into_result()
    }
}

/// A single container-to-host port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Port on the host.
    pub host_port: u16,
}

/// Network placement of a running actual LRP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLRPNetInfo {
    /// Host address the instance is reachable at.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    /// Exposed port mappings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
}

impl ActualLRPNetInfo {
    /// True when no network placement has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.address.is_empty() && self.ports.is_empty()
    }
}

/// The cluster's view of one workload instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualLRP {
    /// Identity of the instance slot.
    #[serde(flatten)]
    pub key: ActualLRPKey,
    /// Identity of the backing container; empty unless claimed or running.
    #[serde(flatten)]
    pub instance_key: ActualLRPInstanceKey,
    /// Network placement; empty unless running.
    #[serde(flatten)]
    pub net_info: ActualLRPNetInfo,
    /// Number of crashes observed for this slot.
    #[serde(default)]
    pub crash_count: i32,
    /// Why placement failed, when it did.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub placement_error: String,
    /// Lifecycle state.
    pub state: ActualLRPState,
    /// Nanosecond timestamp of the last state transition.
    pub since: i64,
    /// Stamped on every mutation.
    #[serde(default)]
    pub modification_tag: ModificationTag,
}

impl ActualLRP {
    /// Creates an unclaimed actual LRP at the given timestamp.
    #[must_use]
    pub fn unclaimed(key: ActualLRPKey, since: i64) -> Self {
        Self {
            key,
            instance_key: ActualLRPInstanceKey::default(),
            net_info: ActualLRPNetInfo::default(),
            crash_count: 0,
            placement_error: String::new(),
            state: ActualLRPState::Unclaimed,
            since,
            modification_tag: ModificationTag::default(),
        }
    }

    /// Whether a transition to `new_state` under the given keys is legal.
    ///
    /// The LRP key must match exactly. Between the placed states (CLAIMED
    /// and RUNNING) the instance key must also match, with one exception:
    /// `CLAIMED -> RUNNING` may move to a different instance, covering a
    /// claimed container being replaced by one started elsewhere.
    #[must_use]
    pub fn allows_transition_to(
        &self,
        key: &ActualLRPKey,
        instance_key: &ActualLRPInstanceKey,
        new_state: ActualLRPState,
    ) -> bool {
        if self.key != *key {
            return false;
        }
        if self.state == ActualLRPState::Claimed && new_state == ActualLRPState::Running {
            return true;
        }
        if matches!(self.state, ActualLRPState::Claimed | ActualLRPState::Running)
            && matches!(new_state, ActualLRPState::Claimed | ActualLRPState::Running)
            && self.instance_key != *instance_key
        {
            return false;
        }
        true
    }
}

impl Validate for ActualLRP {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if let Err(nested) = self.key.validate() {
            err.extend(nested);
        }

        match self.state {
            ActualLRPState::Unclaimed | ActualLRPState::Crashed => {
                if !self.instance_key.is_empty() {
                    err.invalid_field("instance_key");
                }
                if !self.net_info.is_empty() {
                    err.invalid_field("net_info");
                }
                if self.state == ActualLRPState::Crashed && !self.placement_error.is_empty() {
                    err.invalid_field("placement_error");
                }
            }
            ActualLRPState::Claimed => {
                if let Err(nested) = self.instance_key.validate() {
                    err.extend(nested);
                }
                if !self.net_info.is_empty() {
                    err.invalid_field("net_info");
                }
                if !self.placement_error.is_empty() {
                    err.invalid_field("placement_error");
                }
            }
            ActualLRPState::Running => {
                if let Err(nested) = self.instance_key.validate() {
                    err.extend(nested);
                }
                if self.net_info.address.is_empty() {
                    err.invalid_field("address");
                }
                if !self.placement_error.is_empty() {
                    err.invalid_field("placement_error");
                }
            }
        }

        err.into_result()
    }
}

/// An actual LRP resolved out of its group, flagged when it is the
/// evacuating record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedActualLRP {
    /// The resolved record.
    #[serde(flatten)]
    pub actual_lrp: ActualLRP,
    /// True when the resolved record is the evacuating twin.
    #[serde(default)]
    pub evacuating: bool,
}

/// The instance record and its optional evacuating twin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActualLRPGroup {
    /// The normal instance record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<ActualLRP>,
    /// The evacuating record, present while the hosting cell drains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evacuating: Option<ActualLRP>,
}

impl ActualLRPGroup {
    /// Resolves the group to its canonical record.
    ///
    /// If only one record exists, that record wins. When both exist the
    /// instance wins unless it is UNCLAIMED or CLAIMED, in which case the
    /// evacuating record is still the one doing the work.
    ///
    /// # Errors
    ///
    /// An empty group is an invariant violation and resolves to an
    /// internal error.
    pub fn resolve(&self) -> quay_core::Result<ResolvedActualLRP> {
        match (&self.instance, &self.evacuating) {
            (Some(instance), None) => Ok(resolved(instance, false)),
            (None, Some(evacuating)) => Ok(resolved(evacuating, true)),
            (Some(instance), Some(evacuating)) => match instance.state {
                ActualLRPState::Unclaimed | ActualLRPState::Claimed => {
                    Ok(resolved(evacuating, true))
                }
                _ => Ok(resolved(instance, false)),
            },
            (None, None) => Err(quay_core::Error::internal("empty actual LRP group")),
        }
    }
}

fn resolved(lrp: &ActualLRP, evacuating: bool) -> ResolvedActualLRP {
    ResolvedActualLRP {
        actual_lrp: lrp.clone(),
        evacuating,
    }
}
