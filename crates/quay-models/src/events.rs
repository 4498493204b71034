//! Change events fanned out to SSE subscribers.
//!
//! Six variants: desired/actual LRP created, changed, and removed. The
//! wire body is the variant's field record alone; the variant name travels
//! in the SSE `event:` field, so the enum serializes untagged.

use serde::Serialize;

use crate::actual_lrp::ResolvedActualLRP;
use crate::desired_lrp::DesiredLRP;

/// A cluster-state change observed through the store watch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    /// A desired LRP was created.
    DesiredLRPCreated(DesiredLRPCreatedEvent),
    /// A desired LRP was updated.
    DesiredLRPChanged(DesiredLRPChangedEvent),
    /// A desired LRP was removed.
    DesiredLRPRemoved(DesiredLRPRemovedEvent),
    /// An actual LRP appeared.
    ActualLRPCreated(ActualLRPCreatedEvent),
    /// An actual LRP changed.
    ActualLRPChanged(ActualLRPChangedEvent),
    /// An actual LRP disappeared.
    ActualLRPRemoved(ActualLRPRemovedEvent),
}

/// Body of a desired-LRP-created event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredLRPCreatedEvent {
    /// The created LRP.
    pub desired_lrp: DesiredLRP,
}

/// Body of a desired-LRP-changed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredLRPChangedEvent {
    /// The LRP before the change.
    pub desired_lrp_before: DesiredLRP,
    /// The LRP after the change.
    pub desired_lrp_after: DesiredLRP,
}

/// Body of a desired-LRP-removed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredLRPRemovedEvent {
    /// The removed LRP.
    pub desired_lrp: DesiredLRP,
}

/// Body of an actual-LRP-created event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualLRPCreatedEvent {
    /// The created record, resolved out of its group.
    pub actual_lrp: ResolvedActualLRP,
}

/// Body of an actual-LRP-changed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualLRPChangedEvent {
    /// The record before the change.
    pub actual_lrp_before: ResolvedActualLRP,
    /// The record after the change.
    pub actual_lrp_after: ResolvedActualLRP,
}

/// Body of an actual-LRP-removed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualLRPRemovedEvent {
    /// The removed record.
    pub actual_lrp: ResolvedActualLRP,
}

impl Event {
    /// Creates a desired-LRP-created event.
    #[must_use]
    pub fn desired_lrp_created(desired_lrp: DesiredLRP) -> Self {
        Event::DesiredLRPCreated(DesiredLRPCreatedEvent { desired_lrp })
    }

    /// Creates a desired-LRP-changed event.
    #[must_use]
    pub fn desired_lrp_changed(before: DesiredLRP, after: DesiredLRP) -> Self {
        Event::DesiredLRPChanged(DesiredLRPChangedEvent {
            desired_lrp_before: before,
            desired_lrp_after: after,
        })
    }

    /// Creates a desired-LRP-removed event.
    #[must_use]
    pub fn desired_lrp_removed(desired_lrp: DesiredLRP) -> Self {
        Event::DesiredLRPRemoved(DesiredLRPRemovedEvent { desired_lrp })
    }

    /// Creates an actual-LRP-created event.
    #[must_use]
    pub fn actual_lrp_created(actual_lrp: ResolvedActualLRP) -> Self {
        Event::ActualLRPCreated(ActualLRPCreatedEvent { actual_lrp })
    }

    /// Creates an actual-LRP-changed event.
    #[must_use]
    pub fn actual_lrp_changed(before: ResolvedActualLRP, after: ResolvedActualLRP) -> Self {
        Event::ActualLRPChanged(ActualLRPChangedEvent {
            actual_lrp_before: before,
            actual_lrp_after: after,
        })
    }

    /// Creates an actual-LRP-removed event.
    #[must_use]
    pub fn actual_lrp_removed(actual_lrp: ResolvedActualLRP) -> Self {
        Event::ActualLRPRemoved(ActualLRPRemovedEvent { actual_lrp })
    }

    /// The `event:` tag written on the SSE frame.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::DesiredLRPCreated(_) => "desired_lrp_created",
            Event::DesiredLRPChanged(_) => "desired_lrp_changed",
            Event::DesiredLRPRemoved(_) => "desired_lrp_removed",
            Event::ActualLRPCreated(_) => "actual_lrp_created",
            Event::ActualLRPChanged(_) => "actual_lrp_changed",
            Event::ActualLRPRemoved(_) => "actual_lrp_removed",
        }
    }

    /// Stable key for downstream filtering: the process guid for desired
    /// events, the instance guid for actual events.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Event::DesiredLRPCreated(e) => &e.desired_lrp.process_guid,
            Event::DesiredLRPChanged(e) => &e.desired_lrp_after.process_guid,
            Event::DesiredLRPRemoved(e) => &e.desired_lrp.process_guid,
            Event::ActualLRPCreated(e) => &e.actual_lrp.actual_lrp.instance_key.instance_guid,
            Event::ActualLRPChanged(e) => {
                &e.actual_lrp_after.actual_lrp.instance_key.instance_guid
            }
            Event::ActualLRPRemoved(e) => &e.actual_lrp.actual_lrp.instance_key.instance_guid,
        }
    }
}
