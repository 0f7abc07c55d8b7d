//! Scheduling, feasibility checks and cost evaluation.
//!
//! - [`timing`] — schedule propagation over routes and candidate sequences
//! - [`feasibility`] — per-stop, per-route and whole-solution checks

pub mod feasibility;
pub mod timing;

pub use feasibility::{
    is_capacity_feasible, is_feasible, is_max_ride_feasible, is_time_window_feasible,
    is_transfer_order_feasible, route_cost,
};
pub use timing::{
    evaluate_sequence, retime, sequence_cost, step, SequenceViolation, ViolationKind, Visit,
    EPSILON,
};
