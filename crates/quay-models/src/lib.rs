//! # quay-models
//!
//! Domain model for the quay API facade.
//!
//! Everything that crosses the wire or the store boundary is defined here:
//!
//! - **Desired LRPs**: declarations of workloads the cluster keeps running
//! - **Actual LRPs**: per-instance observations with their lifecycle machine
//! - **Tasks**: one-shot workloads with completion callbacks
//! - **Actions**: the recursive polymorphic workload body
//! - **Cells, domains, security rules**: cluster topology and policy
//! - **Events**: the six change-event variants fanned out over SSE
//!
//! All types carry `serde` wire shapes matching the public JSON API and a
//! `validate()` method that reports every violation in one pass.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod actions;
pub mod actual_lrp;
pub mod cell;
pub mod desired_lrp;
pub mod events;
pub mod restart;
pub mod security_group;
pub mod tag;
pub mod task;
pub mod validator;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::actions::Action;
    pub use crate::actual_lrp::{
        ActualLRP, ActualLRPGroup, ActualLRPInstanceKey, ActualLRPKey, ActualLRPNetInfo,
        ActualLRPState, ResolvedActualLRP,
    };
    pub use crate::cell::{CellCapacity, CellPresence};
    pub use crate::desired_lrp::{DesiredLRP, DesiredLRPUpdate, RoutingInfo};
    pub use crate::events::Event;
    pub use crate::restart::RestartCalculator;
    pub use crate::security_group::SecurityGroupRule;
    pub use crate::tag::ModificationTag;
    pub use crate::task::{Task, TaskState};
    pub use crate::validator::{Validate, ValidationError};
}

pub use actions::Action;
pub use actual_lrp::{
    ActualLRP, ActualLRPGroup, ActualLRPInstanceKey, ActualLRPKey, ActualLRPNetInfo,
    ActualLRPState, ResolvedActualLRP,
};
pub use cell::{CellCapacity, CellPresence};
pub use desired_lrp::{DesiredLRP, DesiredLRPUpdate, RoutingInfo};
pub use events::Event;
pub use restart::RestartCalculator;
pub use security_group::SecurityGroupRule;
pub use tag::ModificationTag;
pub use task::{Task, TaskState};
pub use validator::{Validate, ValidationError};
