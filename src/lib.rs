//! # u-darpt
//!
//! Dial-a-ride with transfers (DARP-T): capacity-limited vehicles serve
//! pickup/dropoff requests under time windows and maximum ride times, and
//! may hand a passenger to another vehicle at a transfer point. Solutions
//! are improved by Adaptive Large Neighborhood Search.
//!
//! ## Modules
//!
//! - [`models`] — Problem, nodes, routes and the editable [`models::Solution`]
//! - [`distance`] — Euclidean distance and cost matrices
//! - [`evaluation`] — Timing propagation and feasibility checks
//! - [`alns`] — Destroy and repair operators and the search loop
//! - [`io`] — Delimited numeric instance files
//! - [`batch`] — Solving a range of instances on a worker pool
//! - [`error`] — Error types
//!
//! ## Example
//!
//! ```
//! use u_darpt::alns::{AlnsConfig, AlnsRunner};
//! use u_darpt::models::{Location, ProblemBuilder};
//!
//! let problem = ProblemBuilder::new(2, 1.0)
//!     .depot(0.0, 0.0)
//!     .request(
//!         Location::new(10.0, 0.0).with_window(0.0, 200.0),
//!         Location::new(20.0, 0.0).with_window(0.0, 200.0),
//!         60.0,
//!     )
//!     .build()
//!     .unwrap();
//!
//! let result = AlnsRunner::run(&problem, &AlnsConfig::default().with_max_iterations(20).with_seed(3)).unwrap();
//! assert_eq!(result.best.num_served(), 1);
//! assert!((result.best_cost - 40.0).abs() < 1e-9);
//! ```

pub mod alns;
pub mod batch;
pub mod distance;
pub mod error;
pub mod evaluation;
pub mod io;
pub mod models;
