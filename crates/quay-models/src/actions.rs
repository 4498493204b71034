//! The recursive polymorphic action tree.
//!
//! Actions describe the body of a workload. The wire encoding is a
//! single-key JSON object whose key is the variant tag, e.g.
//! `{"run": {"path": "/bin/true", "user": "vcap"}}`. Unknown tags, empty
//! objects, and multi-key objects are hard decode errors.

use serde::{Deserialize, Serialize};

use crate::validator::{Validate, ValidationError};

/// An environment variable passed to a running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// Kernel resource limits applied to a running process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of open file descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nofile: Option<u64>,
}

/// A workload body: leaves do work, wrappers decorate one child, and
/// combinators run many children with differing failure propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Fetch an artifact into the container.
    Download(DownloadAction),
    /// Ship a file out of the container.
    Upload(UploadAction),
    /// Execute a process.
    Run(RunAction),
    /// Wrap a child with progress log messages.
    EmitProgress(EmitProgressAction),
    /// Fail a child that exceeds a duration.
    Timeout(TimeoutAction),
    /// Swallow a child's failure.
    Try(TryAction),
    /// Run all children to completion and aggregate failures.
    Parallel(ParallelAction),
    /// Run children in order, stopping at the first failure.
    Serial(SerialAction),
    /// Run children together, cancelling siblings when any terminates.
    Codependent(CodependentAction),
}

impl Action {
    /// The wire tag for this variant.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Download(_) => "download",
            Action::Upload(_) => "upload",
            Action::Run(_) => "run",
            Action::EmitProgress(_) => "emit_progress",
            Action::Timeout(_) => "timeout",
            Action::Try(_) => "try",
            Action::Parallel(_) => "parallel",
            Action::Serial(_) => "serial",
            Action::Codependent(_) => "codependent",
        }
    }
}

impl Validate for Action {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Action::Download(a) => a.validate(),
            Action::Upload(a) => a.validate(),
            Action::Run(a) => a.validate(),
            Action::EmitProgress(a) => a.validate(),
            Action::Timeout(a) => a.validate(),
            Action::Try(a) => a.validate(),
            Action::Parallel(a) => a.validate(),
            Action::Serial(a) => a.validate(),
            Action::Codependent(a) => a.validate(),
        }
    }
}

/// Fetches `from` (a URL) to `to` (a container path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadAction {
    /// Human name for log lines.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artifact: String,
    /// Source URL.
    pub from: String,
    /// Destination path inside the container.
    pub to: String,
    /// Cache key; downloads sharing a key share a cached copy.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cache_key: String,
    /// Log source label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_source: String,
    /// User to own the downloaded files.
    pub user: String,
}

impl Validate for DownloadAction {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.from.is_empty() {
            err.invalid_field("from");
        }
        if self.to.is_empty() {
            err.invalid_field("to");
        }
        if self.user.is_empty() {
            err.invalid_field("user");
        }
        err.into_result()
    }
}

/// Ships `from` (a container path) to `to` (a URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAction {
    /// Human name for log lines.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artifact: String,
    /// Source path inside the container.
    pub from: String,
    /// Destination URL.
    pub to: String,
    /// Log source label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_source: String,
    /// User whose files are uploaded.
    pub user: String,
}

impl Validate for UploadAction {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.from.is_empty() {
            err.invalid_field("from");
        }
        if self.to.is_empty() {
            err.invalid_field("to");
        }
        if self.user.is_empty() {
            err.invalid_field("user");
        }
        err.into_result()
    }
}

/// Executes a process inside the container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAction {
    /// Executable path.
    pub path: String,
    /// Arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dir: String,
    /// Additional environment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvironmentVariable>,
    /// Kernel resource limits.
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    /// User to run as.
    pub user: String,
    /// Log source label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_source: String,
}

impl Validate for RunAction {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.path.is_empty() {
            err.invalid_field("path");
        }
        if self.user.is_empty() {
            err.invalid_field("user");
        }
        err.into_result()
    }
}

/// Wraps a child with progress log messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitProgressAction {
    /// The wrapped action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Box<Action>>,
    /// Message emitted before the child starts.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start_message: String,
    /// Message emitted when the child succeeds.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub success_message: String,
    /// Prefix for the message emitted when the child fails.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_message_prefix: String,
}

impl Validate for EmitProgressAction {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_inner(self.action.as_deref())
    }
}

/// Fails the wrapped action once `timeout` nanoseconds elapse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutAction {
    /// The wrapped action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Box<Action>>,
    /// Timeout in nanoseconds; must be positive.
    pub timeout: i64,
}

impl Validate for TimeoutAction {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.timeout <= 0 {
            err.invalid_field("timeout");
        }
        if let Err(inner) = validate_inner(self.action.as_deref()) {
            err.extend(inner);
        }
        err.into_result()
    }
}

/// Swallows the wrapped action's failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryAction {
    /// The wrapped action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Box<Action>>,
}

impl Validate for TryAction {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_inner(self.action.as_deref())
    }
}

/// Runs every child to completion and aggregates failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelAction {
    /// Children; at least one is required.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Validate for ParallelAction {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_children(&self.actions)
    }
}

/// Runs children in order, stopping at the first failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialAction {
    /// Children; at least one is required.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Validate for SerialAction {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_children(&self.actions)
    }
}

/// Runs children together; any child's termination cancels its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodependentAction {
    /// Children; at least one is required.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Validate for CodependentAction {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_children(&self.actions)
    }
}

fn validate_inner(action: Option<&Action>) -> Result<(), ValidationError> {
    let mut err = ValidationError::new();
    match action {
        None => err.invalid_field("action"),
        Some(inner) => {
            if let Err(nested) = inner.validate() {
                err.extend(nested);
            }
        }
    }
    err.into_result()
}

fn validate_children(actions: &[Action]) -> Result<(), ValidationError> {
    let mut err = ValidationError::new();
    if actions.is_empty() {
        err.invalid_field("actions");
    }
    for child in actions {
        if let Err(nested) = child.validate() {
            err.extend(nested);
        }
    }
    err.into_result()
}
