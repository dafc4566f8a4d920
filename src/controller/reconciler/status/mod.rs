//! # Status Management
//!
//! Turns the outcome of a pass into ApplicationTemplate status.
//!
//! `aggregate` and `conditions` are pure; `phase` holds the phase projection
//! and the two status writes a pass performs (phase-only progress updates and
//! the final full status).

mod aggregate;
mod conditions;
mod phase;

pub use aggregate::{aggregate, Aggregation};
pub use conditions::{
    upsert_condition, CONDITION_CONFIGURATION_WARNING, CONDITION_DEGRADED, CONDITION_READY,
    CONDITION_STALE,
};
pub use phase::{project_phase, update_status, update_status_phase, PassStage};
