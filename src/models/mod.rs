//! Domain model types for dial-a-ride problems with transfers.
//!
//! Provides the read-only [`Problem`] (nodes, requests, depots, transfer
//! points and travel matrices) and the mutable [`Solution`] built from
//! [`Route`]s of [`RouteNode`]s.

mod node;
mod problem;
mod route;
mod solution;

pub use node::{DepotId, Node, NodeId, NodeKind, RequestId, TimeWindow};
pub use problem::{Depot, Location, Problem, ProblemBuilder, Request};
pub use route::{Route, RouteNode, RouteNodeType, StopId, Timing};
pub use solution::{Placement, Solution, SolutionRequest};

pub(crate) use solution::splice_visits;
