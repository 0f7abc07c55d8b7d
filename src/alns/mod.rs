//! ALNS (Adaptive Large Neighborhood Search) for dial-a-ride with transfers.
//!
//! - [`destroy`] — Destroy operators (random, Shaw, cluster, most expensive, close transfer)
//! - [`repair`] — Repair operators (greedy, best insertion with transfer, transfer first)
//! - [`AlnsConfig`] — Search parameters
//! - [`AlnsRunner`] — Destroy/repair loop with adaptive operator weights
//! - [`DarptAlnsProblem`] — The same operators for [`u_metaheur::alns::AlnsRunner`]

mod config;
pub mod destroy;
mod insertion;
mod problem;
pub mod repair;
mod runner;

pub use config::{Acceptance, AlnsConfig, InitialSolution, OperatorSelection, Scores};
pub use destroy::DestroyOperator;
pub use problem::{BoundDestroy, BoundRepair, DarptAlnsProblem, UNSERVED_PENALTY};
pub use repair::{RepairOperator, RepairOutcome};
pub use runner::{initial_solution, AlnsResult, AlnsRunner, OutcomeCounts};
