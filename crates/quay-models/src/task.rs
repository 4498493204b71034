//! Tasks: one-shot workloads.
//!
//! A task runs to completion once. After completing it is resolved: the
//! callback worker POSTs the task to its completion callback URL and then
//! removes it from the store.

use serde::{Deserialize, Serialize};

use crate::actions::{Action, EnvironmentVariable};
use crate::desired_lrp::MAXIMUM_ANNOTATION_LENGTH;
use crate::security_group::SecurityGroupRule;
use crate::validator::{Validate, ValidationError, valid_absolute_url, valid_guid, valid_rootfs_url};

/// Lifecycle state of a task.
///
/// ```text
///   PENDING --> RUNNING --> COMPLETED --> RESOLVING --> (removed)
///       \___________________^
/// ```
///
/// The short edge covers cancellation: a pending task completes directly,
/// with `failed` set and a cancellation reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Accepted, not yet placed on a cell.
    Pending,
    /// Executing on a cell.
    Running,
    /// Finished (successfully or not); outcome fields are set.
    Completed,
    /// Claimed by the callback worker; removal is imminent.
    Resolving,
}

impl TaskState {
    /// Whether a transition from `self` to `next` is legal.
    #[must_use]
    pub const fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Pending | TaskState::Running, TaskState::Completed)
                | (TaskState::Completed, TaskState::Resolving)
        )
    }

    /// Whether a task in this state may be deleted from the store.
    #[must_use]
    pub const fn is_deletable(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Resolving)
    }
}

/// The failure reason recorded when a task is cancelled.
pub const TASK_CANCELLED_REASON: &str = "task was cancelled";

/// A one-shot workload and its observed lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub task_guid: String,
    /// Tenant/namespace label.
    pub domain: String,
    /// Root filesystem URL.
    pub rootfs: String,
    /// The workload body; required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Environment applied to the action.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvironmentVariable>,
    /// Memory limit, in MiB.
    #[serde(default)]
    pub memory_mb: i32,
    /// Disk limit, in MiB.
    #[serde(default)]
    pub disk_mb: i32,
    /// Relative CPU weight in `[0, 100]`.
    #[serde(default)]
    pub cpu_weight: u32,
    /// Run the container in privileged mode.
    #[serde(default)]
    pub privileged: bool,
    /// Log stream guid.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_guid: String,
    /// Log source label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_source: String,
    /// Metrics stream guid.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metrics_guid: String,
    /// Opaque client annotation; ≤ 10 KiB.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub annotation: String,
    /// Egress whitelist rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress_rules: Vec<SecurityGroupRule>,
    /// Container path whose contents become `result` on completion.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result_file: String,
    /// Absolute URL POSTed to when the task completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_callback_url: Option<String>,
    /// Lifecycle state.
    #[serde(default = "default_state")]
    pub state: TaskState,
    /// The cell executing the task; set once running.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cell_id: String,
    /// Contents of `result_file`, captured at completion.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result: String,
    /// Whether the task failed.
    #[serde(default)]
    pub failed: bool,
    /// Why the task failed, when it did.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_reason: String,
    /// Nanosecond creation timestamp.
    #[serde(default)]
    pub created_at: i64,
    /// Nanosecond timestamp of the last mutation.
    #[serde(default)]
    pub updated_at: i64,
    /// Nanosecond timestamp of the first transition to COMPLETED.
    #[serde(default)]
    pub first_completed_at: i64,
}

fn default_state() -> TaskState {
    TaskState::Pending
}

impl Validate for Task {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();

        if !valid_guid(&self.task_guid) {
            err.invalid_field("task_guid");
        }
        if self.domain.is_empty() {
            err.invalid_field("domain");
        }
        if !valid_rootfs_url(&self.rootfs) {
            err.invalid_field("rootfs");
        }
        if self.cpu_weight > 100 {
            err.invalid_field("cpu_weight");
        }
        if self.annotation.len() > MAXIMUM_ANNOTATION_LENGTH {
            err.invalid_field("annotation");
        }
        if self
            .completion_callback_url
            .as_ref()
            .is_some_and(|raw| !valid_absolute_url(raw))
        {
            err.invalid_field("completion_callback_url");
        }

        match &self.action {
            None => err.invalid_field("action"),
            Some(action) => {
                if let Err(nested) = action.validate() {
                    err.extend(nested);
                }
            }
        }
        for rule in &self.egress_rules {
            if let Err(nested) = rule.validate() {
                err.extend(nested);
            }
        }

        err.into_result()
    }
}
