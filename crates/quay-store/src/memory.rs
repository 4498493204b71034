//! In-memory store.
//!
//! Backs tests and single-process deployments. Lifecycle rules are
//! enforced the same way the real store enforces them, so handler and
//! worker behavior against this implementation matches production.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::sync::broadcast;

use quay_core::{Error, Result};
use quay_models::task::TASK_CANCELLED_REASON;
use quay_models::{
    ActualLRPGroup, ActualLRPKey, CellPresence, DesiredLRP, DesiredLRPUpdate, Event,
    ModificationTag, Task, TaskState,
};

use crate::{PresenceKeeper, ReceptorPresence, Store};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct State {
    tasks: HashMap<String, Task>,
    desired: HashMap<String, DesiredLRP>,
    actuals: HashMap<(String, i32), ActualLRPGroup>,
    cells: HashMap<String, CellPresence>,
    domains: HashMap<String, Option<DateTime<Utc>>>,
    presence: Option<ReceptorPresence>,
}

/// An in-memory [`Store`] with full lifecycle enforcement.
pub struct MemoryStore {
    state: RwLock<State>,
    events: broadcast::Sender<Event>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(State::default()),
            events,
        }
    }

    /// Installs an actual LRP group directly, standing in for the cell
    /// agents that write these records in a real cluster. Emits an
    /// actual-LRP-created event for the group's resolved record.
    ///
    /// # Errors
    ///
    /// Fails when the group is empty.
    pub async fn put_actual_lrp_group(&self, group: ActualLRPGroup) -> Result<()> {
        let resolved = group.resolve()?;
        let key = resolved.actual_lrp.key.clone();
        let mut state = self.state.write().await;
        state
            .actuals
            .insert((key.process_guid.clone(), key.index), group);
        drop(state);
        self.publish(Event::actual_lrp_created(resolved));
        Ok(())
    }

    /// Installs a cell presence, standing in for the cell's heartbeat.
    pub async fn put_cell(&self, presence: CellPresence) {
        let mut state = self.state.write().await;
        state.cells.insert(presence.cell_id.clone(), presence);
    }

    /// The presence record written by the heartbeat, if any.
    pub async fn presence(&self) -> Option<ReceptorPresence> {
        self.state.read().await.presence.clone()
    }

    fn publish(&self, event: Event) {
        // Nobody listening is fine; the watcher may not be up yet.
        let _ = self.events.send(event);
    }
}

fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

fn fresh_tag() -> ModificationTag {
    ModificationTag::new(ulid::Ulid::new().to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn desire_task(&self, mut task: Task) -> Result<()> {
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.task_guid) {
            return Err(Error::resource_exists("task", &task.task_guid));
        }
        let now = now_ns();
        task.state = TaskState::Pending;
        task.created_at = now;
        task.updated_at = now;
        state.tasks.insert(task.task_guid.clone(), task);
        Ok(())
    }

    async fn tasks(&self) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        Ok(state.tasks.values().cloned().collect())
    }

    async fn tasks_by_domain(&self, domain: &str) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .values()
            .filter(|task| task.domain == domain)
            .cloned()
            .collect())
    }

    async fn task_by_guid(&self, task_guid: &str) -> Result<Task> {
        let state = self.state.read().await;
        state
            .tasks
            .get(task_guid)
            .cloned()
            .ok_or_else(|| Error::resource_not_found("task", task_guid))
    }

    async fn start_task(&self, task_guid: &str, cell_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(task_guid)
            .ok_or_else(|| Error::resource_not_found("task", task_guid))?;

        if task.state == TaskState::Running && task.cell_id == cell_id {
            return Ok(false);
        }
        if !task.state.can_transition_to(TaskState::Running) {
            return Err(Error::invalid_state_transition(format!(
                "cannot start task {task_guid} from {:?}",
                task.state
            )));
        }
        task.state = TaskState::Running;
        task.cell_id = cell_id.to_string();
        task.updated_at = now_ns();
        Ok(true)
    }

    async fn complete_task(
        &self,
        task_guid: &str,
        failed: bool,
        failure_reason: &str,
        result: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(task_guid)
            .ok_or_else(|| Error::resource_not_found("task", task_guid))?;

        if !task.state.can_transition_to(TaskState::Completed) {
            return Err(Error::invalid_state_transition(format!(
                "cannot complete task {task_guid} from {:?}",
                task.state
            )));
        }
        let now = now_ns();
        task.state = TaskState::Completed;
        task.failed = failed;
        task.failure_reason = failure_reason.to_string();
        task.result = result.to_string();
        task.first_completed_at = now;
        task.updated_at = now;
        Ok(())
    }

    async fn resolving_task(&self, task_guid: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(task_guid)
            .ok_or_else(|| Error::resource_not_found("task", task_guid))?;

        if !task.state.can_transition_to(TaskState::Resolving) {
            return Err(Error::invalid_state_transition(format!(
                "cannot resolve task {task_guid} from {:?}",
                task.state
            )));
        }
        task.state = TaskState::Resolving;
        task.updated_at = now_ns();
        Ok(())
    }

    async fn resolve_task(&self, task_guid: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get(task_guid)
            .ok_or_else(|| Error::resource_not_found("task", task_guid))?;

        if task.state != TaskState::Resolving {
            return Err(Error::invalid_state_transition(format!(
                "cannot remove task {task_guid} from {:?}",
                task.state
            )));
        }
        state.tasks.remove(task_guid);
        Ok(())
    }

    async fn cancel_task(&self, task_guid: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(task_guid)
            .ok_or_else(|| Error::resource_not_found("task", task_guid))?;

        if !task.state.can_transition_to(TaskState::Completed) {
            return Err(Error::invalid_state_transition(format!(
                "cannot cancel task {task_guid} from {:?}",
                task.state
            )));
        }
        let now = now_ns();
        task.state = TaskState::Completed;
        task.failed = true;
        task.failure_reason = TASK_CANCELLED_REASON.to_string();
        task.result = String::new();
        task.first_completed_at = now;
        task.updated_at = now;
        Ok(())
    }

    async fn desire_lrp(&self, mut lrp: DesiredLRP) -> Result<()> {
        let mut state = self.state.write().await;
        if state.desired.contains_key(&lrp.process_guid) {
            return Err(Error::resource_exists("desired LRP", &lrp.process_guid));
        }
        lrp.modification_tag = fresh_tag();
        state.desired.insert(lrp.process_guid.clone(), lrp.clone());
        drop(state);
        self.publish(Event::desired_lrp_created(lrp));
        Ok(())
    }

    async fn desired_lrps(&self) -> Result<Vec<DesiredLRP>> {
        let state = self.state.read().await;
        Ok(state.desired.values().cloned().collect())
    }

    async fn desired_lrps_by_domain(&self, domain: &str) -> Result<Vec<DesiredLRP>> {
        let state = self.state.read().await;
        Ok(state
            .desired
            .values()
            .filter(|lrp| lrp.domain == domain)
            .cloned()
            .collect())
    }

    async fn desired_lrp_by_process_guid(&self, process_guid: &str) -> Result<DesiredLRP> {
        let state = self.state.read().await;
        state
            .desired
            .get(process_guid)
            .cloned()
            .ok_or_else(|| Error::resource_not_found("desired LRP", process_guid))
    }

    async fn update_desired_lrp(
        &self,
        process_guid: &str,
        update: DesiredLRPUpdate,
    ) -> Result<DesiredLRP> {
        let mut state = self.state.write().await;
        let lrp = state
            .desired
            .get_mut(process_guid)
            .ok_or_else(|| Error::resource_not_found("desired LRP", process_guid))?;

        let before = lrp.clone();
        lrp.apply_update(&update);
        let after = lrp.clone();
        drop(state);
        self.publish(Event::desired_lrp_changed(before, after.clone()));
        Ok(after)
    }

    async fn remove_desired_lrp(&self, process_guid: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let lrp = state
            .desired
            .remove(process_guid)
            .ok_or_else(|| Error::resource_not_found("desired LRP", process_guid))?;
        drop(state);
        self.publish(Event::desired_lrp_removed(lrp));
        Ok(())
    }

    async fn actual_lrp_groups(&self) -> Result<Vec<ActualLRPGroup>> {
        let state = self.state.read().await;
        Ok(state.actuals.values().cloned().collect())
    }

    async fn actual_lrp_groups_by_domain(&self, domain: &str) -> Result<Vec<ActualLRPGroup>> {
        let state = self.state.read().await;
        Ok(state
            .actuals
            .values()
            .filter(|group| {
                group
                    .instance
                    .as_ref()
                    .or(group.evacuating.as_ref())
                    .is_some_and(|lrp| lrp.key.domain == domain)
            })
            .cloned()
            .collect())
    }

    async fn actual_lrp_groups_by_process_guid(
        &self,
        process_guid: &str,
    ) -> Result<Vec<ActualLRPGroup>> {
        let state = self.state.read().await;
        Ok(state
            .actuals
            .iter()
            .filter(|((guid, _), _)| guid == process_guid)
            .map(|(_, group)| group.clone())
            .collect())
    }

    async fn actual_lrp_group_by_process_guid_and_index(
        &self,
        process_guid: &str,
        index: i32,
    ) -> Result<ActualLRPGroup> {
        let state = self.state.read().await;
        state
            .actuals
            .get(&(process_guid.to_string(), index))
            .cloned()
            .ok_or_else(|| Error::resource_not_found("actual LRP", process_guid))
    }

    async fn retire_actual_lrps(&self, keys: &[ActualLRPKey]) -> Result<()> {
        let mut removed = Vec::new();
        {
            let mut state = self.state.write().await;
            for key in keys {
                if let Some(group) = state
                    .actuals
                    .remove(&(key.process_guid.clone(), key.index))
                {
                    if let Ok(resolved) = group.resolve() {
                        removed.push(resolved);
                    }
                }
            }
        }
        for resolved in removed {
            self.publish(Event::actual_lrp_removed(resolved));
        }
        Ok(())
    }

    async fn cells(&self) -> Result<Vec<CellPresence>> {
        let state = self.state.read().await;
        Ok(state.cells.values().cloned().collect())
    }

    async fn upsert_domain(&self, domain: &str, ttl: u32) -> Result<()> {
        if domain.is_empty() {
            return Err(Error::internal("domain must not be empty"));
        }
        let expires_at = if ttl == 0 {
            None
        } else {
            Some(Utc::now() + chrono::Duration::seconds(i64::from(ttl)))
        };
        let mut state = self.state.write().await;
        state.domains.insert(domain.to_string(), expires_at);
        Ok(())
    }

    async fn domains(&self) -> Result<Vec<String>> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state
            .domains
            .retain(|_, expiry| expiry.map_or(true, |at| at > now));
        Ok(state.domains.keys().cloned().collect())
    }

    fn watch(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

#[async_trait]
impl PresenceKeeper for MemoryStore {
    async fn set_presence(&self, presence: &ReceptorPresence, _ttl: Duration) -> Result<()> {
        let mut state = self.state.write().await;
        state.presence = Some(presence.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use quay_models::actions::{Action, ResourceLimits, RunAction};
    use quay_models::actual_lrp::{ActualLRP, ActualLRPState};

    fn task(guid: &str) -> Task {
        Task {
            task_guid: guid.to_string(),
            domain: "test-domain".to_string(),
            rootfs: "docker:///lucid64".to_string(),
            action: Some(Action::Run(RunAction {
                path: "/bin/true".to_string(),
                args: Vec::new(),
                dir: String::new(),
                env: Vec::new(),
                resource_limits: ResourceLimits::default(),
                user: "vcap".to_string(),
                log_source: String::new(),
            })),
            env: Vec::new(),
            memory_mb: 0,
            disk_mb: 0,
            cpu_weight: 0,
            privileged: false,
            log_guid: String::new(),
            log_source: String::new(),
            metrics_guid: String::new(),
            annotation: String::new(),
            egress_rules: Vec::new(),
            result_file: String::new(),
            completion_callback_url: None,
            state: TaskState::Pending,
            cell_id: String::new(),
            result: String::new(),
            failed: false,
            failure_reason: String::new(),
            created_at: 0,
            updated_at: 0,
            first_completed_at: 0,
        }
    }

    fn desired(guid: &str) -> DesiredLRP {
        DesiredLRP {
            process_guid: guid.to_string(),
            domain: "test-domain".to_string(),
            rootfs: "docker:///lucid64".to_string(),
            instances: 1,
            ..DesiredLRP::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_task_guid_is_rejected() -> Result<()> {
        let store = MemoryStore::new();
        store.desire_task(task("t1")).await?;
        let err = store.desire_task(task("t1")).await.unwrap_err();
        assert!(matches!(err, Error::ResourceExists { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_task_lifecycle_happy_path() -> Result<()> {
        let store = MemoryStore::new();
        store.desire_task(task("t1")).await?;

        assert!(store.start_task("t1", "cell-1").await?);
        // idempotent retry from the same cell
        assert!(!store.start_task("t1", "cell-1").await?);

        store.complete_task("t1", false, "", "42").await?;
        let completed = store.task_by_guid("t1").await?;
        assert_eq!(completed.state, TaskState::Completed);
        assert_eq!(completed.result, "42");
        assert!(completed.first_completed_at > 0);

        store.resolving_task("t1").await?;
        store.resolve_task("t1").await?;
        assert!(store.task_by_guid("t1").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolving_twice_is_a_transition_error() -> Result<()> {
        let store = MemoryStore::new();
        store.desire_task(task("t1")).await?;
        store.start_task("t1", "cell-1").await?;
        store.complete_task("t1", true, "boom", "").await?;

        store.resolving_task("t1").await?;
        let err = store.resolving_task("t1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_completes_with_reason() -> Result<()> {
        let store = MemoryStore::new();
        store.desire_task(task("t1")).await?;
        store.cancel_task("t1").await?;

        let cancelled = store.task_by_guid("t1").await?;
        assert_eq!(cancelled.state, TaskState::Completed);
        assert!(cancelled.failed);
        assert_eq!(cancelled.failure_reason, TASK_CANCELLED_REASON);

        let err = store.cancel_task("t1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_desire_lrp_emits_created_event() -> Result<()> {
        let store = MemoryStore::new();
        let mut watch = store.watch();
        store.desire_lrp(desired("p1")).await?;

        let event = watch.recv().await?;
        assert_eq!(event.event_type(), "desired_lrp_created");
        assert_eq!(event.key(), "p1");
        Ok(())
    }

    #[tokio::test]
    async fn test_update_stamps_tag_and_emits_changed() -> Result<()> {
        let store = MemoryStore::new();
        store.desire_lrp(desired("p1")).await?;
        let before = store.desired_lrp_by_process_guid("p1").await?;

        let mut watch = store.watch();
        let after = store
            .update_desired_lrp(
                "p1",
                DesiredLRPUpdate {
                    instances: Some(4),
                    routes: None,
                    annotation: None,
                },
            )
            .await?;

        assert_eq!(after.instances, 4);
        assert!(before.modification_tag.succeeded_by(&after.modification_tag));
        assert_eq!(watch.recv().await?.event_type(), "desired_lrp_changed");
        Ok(())
    }

    #[tokio::test]
    async fn test_domain_filters_apply() -> Result<()> {
        let store = MemoryStore::new();
        store.desire_task(task("t1")).await?;
        let mut other = task("t2");
        other.domain = "other".to_string();
        store.desire_task(other).await?;

        assert_eq!(store.tasks().await?.len(), 2);
        assert_eq!(store.tasks_by_domain("other").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_domain_ttl_expiry() -> Result<()> {
        let store = MemoryStore::new();
        store.upsert_domain("forever", 0).await?;
        store.upsert_domain("brief", 1).await?;
        let mut domains = store.domains().await?;
        domains.sort();
        assert_eq!(domains, vec!["brief", "forever"]);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.domains().await?, vec!["forever"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_retire_removes_group_and_emits() -> Result<()> {
        let store = MemoryStore::new();
        let key = ActualLRPKey::new("p1", 0, "test-domain");
        store
            .put_actual_lrp_group(ActualLRPGroup {
                instance: Some(ActualLRP::unclaimed(key.clone(), 1)),
                evacuating: None,
            })
            .await?;

        let mut watch = store.watch();
        store.retire_actual_lrps(&[key]).await?;
        assert_eq!(watch.recv().await?.event_type(), "actual_lrp_removed");
        assert!(
            store
                .actual_lrp_group_by_process_guid_and_index("p1", 0)
                .await
                .is_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_group_resolution_prefers_evacuating_while_unclaimed() -> Result<()> {
        let store = MemoryStore::new();
        let key = ActualLRPKey::new("p1", 0, "test-domain");
        let mut evacuating = ActualLRP::unclaimed(key.clone(), 1);
        evacuating.state = ActualLRPState::Running;
        evacuating.instance_key =
            quay_models::ActualLRPInstanceKey::new("instance-1", "cell-1");
        evacuating.net_info.address = "10.0.0.1".to_string();

        store
            .put_actual_lrp_group(ActualLRPGroup {
                instance: Some(ActualLRP::unclaimed(key, 2)),
                evacuating: Some(evacuating),
            })
            .await?;

        let group = store
            .actual_lrp_group_by_process_guid_and_index("p1", 0)
            .await?;
        assert!(group.resolve()?.evacuating);
        Ok(())
    }
}
