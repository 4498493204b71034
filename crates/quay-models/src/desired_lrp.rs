//! Desired LRPs: the workload template.
//!
//! A desired LRP declares a workload the cluster should keep running.
//! After creation only `instances`, `routes`, and `annotation` may change,
//! via [`DesiredLRPUpdate`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::actions::{Action, EnvironmentVariable};
use crate::security_group::SecurityGroupRule;
use crate::tag::ModificationTag;
use crate::validator::{Validate, ValidationError, valid_guid, valid_rootfs_url};

/// Maximum encoded size of the `routes` mapping, in bytes.
pub const MAXIMUM_ROUTE_LENGTH: usize = 4 * 1024;

/// Maximum length of the `annotation` field, in bytes.
pub const MAXIMUM_ANNOTATION_LENGTH: usize = 10 * 1024;

/// Opaque per-route-provider routing blobs, keyed by provider name.
pub type RoutingInfo = BTreeMap<String, serde_json::Value>;

/// Declaration of a long-running workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredLRP {
    /// Unique identifier for the process; instances share it.
    pub process_guid: String,
    /// Tenant/namespace label.
    pub domain: String,
    /// Root filesystem URL, e.g. `docker:///cloudfoundry/lucid64`.
    pub rootfs: String,
    /// One-time setup action, run before `action`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<Action>,
    /// The main action; required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Health-monitoring action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<Action>,
    /// Seconds to wait for the instance to become healthy.
    #[serde(default)]
    pub start_timeout: u32,
    /// Number of instances to keep running; never negative.
    #[serde(default)]
    pub instances: i32,
    /// Environment applied to every action.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvironmentVariable>,
    /// Memory limit per instance, in MiB.
    #[serde(default)]
    pub memory_mb: i32,
    /// Disk limit per instance, in MiB.
    #[serde(default)]
    pub disk_mb: i32,
    /// Relative CPU weight in `[0, 100]`.
    #[serde(default)]
    pub cpu_weight: u32,
    /// Run the container in privileged mode.
    #[serde(default)]
    pub privileged: bool,
    /// Container ports to expose.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
    /// Routing blobs consumed by route providers; ≤ 4 KiB encoded.
    #[serde(default, skip_serializing_if = "RoutingInfo::is_empty")]
    pub routes: RoutingInfo,
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
    /// Stamped on every mutation.
    #[serde(default)]
    pub modification_tag: ModificationTag,
}

impl Validate for DesiredLRP {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();

        if !valid_guid(&self.process_guid) {
            err.invalid_field("process_guid");
        }
        if self.domain.is_empty() {
            err.invalid_field("domain");
        }
        if !valid_rootfs_url(&self.rootfs) {
            err.invalid_field("rootfs");
        }
        if self.instances < 0 {
            err.invalid_field("instances");
        }
        if self.cpu_weight > 100 {
            err.invalid_field("cpu_weight");
        }
        if self.annotation.len() > MAXIMUM_ANNOTATION_LENGTH {
            err.invalid_field("annotation");
        }
        if encoded_routes_len(&self.routes) > MAXIMUM_ROUTE_LENGTH {
            err.invalid_field("routes");
        }

        match &self.action {
            None => err.invalid_field("action"),
            Some(action) => {
                if let Err(nested) = action.validate() {
                    err.extend(nested);
                }
            }
        }
        for optional in [&self.setup, &self.monitor] {
            if let Some(action) = optional {
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

impl DesiredLRP {
    /// Applies an update, touching only the fields it carries and
    /// incrementing the modification tag.
    pub fn apply_update(&mut self, update: &DesiredLRPUpdate) {
        if let Some(instances) = update.instances {
            self.instances = instances;
        }
        if let Some(routes) = &update.routes {
            self.routes = routes.clone();
        }
        if let Some(annotation) = &update.annotation {
            self.annotation = annotation.clone();
        }
        self.modification_tag.increment();
    }
}

/// Partial update of a desired LRP.
///
/// An absent field means "leave unchanged"; a present empty field means
/// "set to empty".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredLRPUpdate {
    /// New instance count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<i32>,
    /// Replacement routing blobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<RoutingInfo>,
    /// Replacement annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl Validate for DesiredLRPUpdate {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.instances.is_some_and(|n| n < 0) {
            err.invalid_field("instances");
        }
        if self
            .annotation
            .as_ref()
            .is_some_and(|a| a.len() > MAXIMUM_ANNOTATION_LENGTH)
        {
            err.invalid_field("annotation");
        }
        if self
            .routes
            .as_ref()
            .is_some_and(|r| encoded_routes_len(r) > MAXIMUM_ROUTE_LENGTH)
        {
            err.invalid_field("routes");
        }
        err.into_result()
    }
}

fn encoded_routes_len(routes: &RoutingInfo) -> usize {
    serde_json::to_vec(routes).map_or(0, |encoded| encoded.len())
}
