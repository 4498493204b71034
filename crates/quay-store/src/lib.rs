//! # quay-store
//!
//! The narrow client interface to the cluster-state store, plus an
//! in-memory implementation used by tests and single-process deployments.
//!
//! The facade depends on exactly the operations in [`Store`] and nothing
//! more. The store is the linearization point for every resource guid;
//! the facade never caches and never reorders.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use quay_core::Result;
use quay_models::{
    ActualLRPGroup, ActualLRPKey, CellPresence, DesiredLRP, DesiredLRPUpdate, Event, Task,
};

/// Client interface to the external cluster-state store.
///
/// Writes are linearizable per resource guid; `watch` delivers the six
/// change-event variants in commit order.
#[async_trait]
pub trait Store: Send + Sync {
    // Tasks

    /// Records a new task in PENDING.
    async fn desire_task(&self, task: Task) -> Result<()>;

    /// All tasks.
    async fn tasks(&self) -> Result<Vec<Task>>;

    /// Tasks in a domain.
    async fn tasks_by_domain(&self, domain: &str) -> Result<Vec<Task>>;

    /// A single task by guid.
    async fn task_by_guid(&self, task_guid: &str) -> Result<Task>;

    /// Transitions a task to RUNNING on a cell. Returns `false` when the
    /// same cell already started it (an idempotent retry).
    async fn start_task(&self, task_guid: &str, cell_id: &str) -> Result<bool>;

    /// Transitions a task to COMPLETED, recording its outcome.
    async fn complete_task(
        &self,
        task_guid: &str,
        failed: bool,
        failure_reason: &str,
        result: &str,
    ) -> Result<()>;

    /// Conditionally transitions a task from COMPLETED to RESOLVING.
    async fn resolving_task(&self, task_guid: &str) -> Result<()>;

    /// Removes a RESOLVING task.
    async fn resolve_task(&self, task_guid: &str) -> Result<()>;

    /// Completes a PENDING or RUNNING task with a cancellation failure.
    async fn cancel_task(&self, task_guid: &str) -> Result<()>;

    // Desired LRPs

    /// Records a new desired LRP.
    async fn desire_lrp(&self, lrp: DesiredLRP) -> Result<()>;

    /// All desired LRPs.
    async fn desired_lrps(&self) -> Result<Vec<DesiredLRP>>;

    /// Desired LRPs in a domain.
    async fn desired_lrps_by_domain(&self, domain: &str) -> Result<Vec<DesiredLRP>>;

    /// A single desired LRP by process guid.
    async fn desired_lrp_by_process_guid(&self, process_guid: &str) -> Result<DesiredLRP>;

    /// Applies a partial update, returning the updated LRP.
    async fn update_desired_lrp(
        &self,
        process_guid: &str,
        update: DesiredLRPUpdate,
    ) -> Result<DesiredLRP>;

    /// Removes a desired LRP.
    async fn remove_desired_lrp(&self, process_guid: &str) -> Result<()>;

    // Actual LRPs

    /// All actual LRP groups.
    async fn actual_lrp_groups(&self) -> Result<Vec<ActualLRPGroup>>;

    /// Actual LRP groups in a domain.
    async fn actual_lrp_groups_by_domain(&self, domain: &str) -> Result<Vec<ActualLRPGroup>>;

    /// Actual LRP groups for a process.
    async fn actual_lrp_groups_by_process_guid(
        &self,
        process_guid: &str,
    ) -> Result<Vec<ActualLRPGroup>>;

    /// The actual LRP group at a specific instance index.
    async fn actual_lrp_group_by_process_guid_and_index(
        &self,
        process_guid: &str,
        index: i32,
    ) -> Result<ActualLRPGroup>;

    /// Requests retirement (stop and removal) of the given instances.
    async fn retire_actual_lrps(&self, keys: &[ActualLRPKey]) -> Result<()>;

    // Cells

    /// The live cell presences.
    async fn cells(&self) -> Result<Vec<CellPresence>>;

    // Domains

    /// Refreshes a domain label with a TTL in seconds (0 = never expires).
    async fn upsert_domain(&self, domain: &str, ttl: u32) -> Result<()>;

    /// The active (unexpired) domain labels.
    async fn domains(&self) -> Result<Vec<String>>;

    // Watch

    /// Subscribes to the store's change-notification channel.
    fn watch(&self) -> broadcast::Receiver<Event>;
}

/// Identity advertised by the facade's presence heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceptorPresence {
    /// Unique id of this facade process.
    pub receptor_id: String,
    /// URL clients reach this facade at.
    pub receptor_url: String,
}

/// Presence writes live behind their own one-method trait so that the
/// [`Store`] surface stays exactly as narrow as the facade requires.
#[async_trait]
pub trait PresenceKeeper: Send + Sync {
    /// Writes (or refreshes) the facade's presence record with a TTL.
    async fn set_presence(&self, presence: &ReceptorPresence, ttl: Duration) -> Result<()>;
}
