//! Cheapest feasible placement of two stops of one request.
//!
//! Existing routes are scanned first-stop position ascending, then
//! second-stop position ascending. Two early exits keep the scan short:
//!
//! - the first stop cannot start inside its own window at position `i`;
//!   later positions only arrive later, so the route is done;
//! - the first stop at position `i` pushes its successor past that
//!   successor's window; every second-stop position for this `i` fails too,
//!   so the next `i` is tried.
//!
//! Each surviving candidate is scheduled in full by
//! [`evaluate_sequence`]. Routes holding a transfer dropoff can delay other
//! vehicles, so an improving candidate there is confirmed on a copy of the
//! whole solution.

use crate::evaluation::{evaluate_sequence, is_feasible, sequence_cost, Visit, EPSILON};
use crate::models::{Placement, Problem, RouteNodeType, Solution, Timing};

/// A feasible placement and the cost it adds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insertion {
    pub placement: Placement,
    pub delta: f64,
}

/// Which placements a scan may consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Scope {
    /// Route that must not receive the stops.
    pub exclude: Option<usize>,
    /// Whether a new vehicle may be opened.
    pub new_route: bool,
    /// Confirm every improving candidate on a copy of the whole solution.
    pub confirm_all: bool,
}

impl Scope {
    pub fn everywhere() -> Self {
        Self {
            exclude: None,
            new_route: true,
            confirm_all: false,
        }
    }

    pub fn existing_routes() -> Self {
        Self {
            new_route: false,
            ..Self::everywhere()
        }
    }

    pub fn excluding(route: usize) -> Self {
        Self {
            exclude: Some(route),
            ..Self::everywhere()
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.confirm_all = true;
        self
    }
}

/// Reusable buffers for insertion scans.
#[derive(Debug, Default)]
pub(crate) struct Scratch {
    base: Vec<Visit>,
    visits: Vec<Visit>,
    timings: Vec<Timing>,
}

/// Cheapest feasible placement of `first` followed by `second`.
///
/// A new vehicle is costed last, when the scope allows one, and wins only
/// when strictly cheaper.
pub(crate) fn cheapest_insertion(
    problem: &Problem,
    solution: &Solution,
    first: Visit,
    second: Visit,
    scope: Scope,
    scratch: &mut Scratch,
) -> Option<Insertion> {
    let mut best: Option<Insertion> = None;
    for route in 0..solution.num_routes() {
        if scope.exclude == Some(route) {
            continue;
        }
        scan_route(problem, solution, route, (first, second), scope, scratch, &mut best);
    }

    if scope.new_route {
        let placement = Placement::new_route();
        let visits = solution.candidate_visits(problem, None, placement, first, second);
        if let Ok(cost) = evaluate_sequence(problem, &visits, &mut scratch.timings) {
            if best.is_none_or(|b| cost < b.delta)
                && (!scope.confirm_all || confirm(problem, solution, placement, first, second))
            {
                best = Some(Insertion {
                    placement,
                    delta: cost,
                });
            }
        }
    }
    best
}

fn scan_route(
    problem: &Problem,
    solution: &Solution,
    route: usize,
    (first, second): (Visit, Visit),
    scope: Scope,
    scratch: &mut Scratch,
    best: &mut Option<Insertion>,
) {
    solution.route_visits_into(route, &mut scratch.base);
    let base_cost = sequence_cost(problem, &scratch.base);
    let needs_check = scope.confirm_all
        || solution
            .route_nodes(route)
            .any(|s| s.kind() == RouteNodeType::TransferDropoff);
    let n = scratch.base.len();
    let f = problem.node(first.node);

    for i in 1..n {
        let (prev_node, prev_departure) = if i == 1 {
            (problem.nearest_depot(first.node).start(), 0.0)
        } else {
            (scratch.base[i - 1].node, solution.stop_at(route, i - 1).departure())
        };
        let start = (prev_departure + problem.distance(prev_node, first.node))
            .max(f.e())
            .max(first.release);
        if start > f.l() + EPSILON {
            break;
        }
        let next = scratch.base[i].node;
        let pushed = start + f.service_time() + problem.distance(first.node, next);
        if pushed > problem.node(next).l() + EPSILON {
            continue;
        }

        for j in i..n {
            crate::models::splice_visits(
                problem,
                &scratch.base,
                i,
                first,
                j,
                second,
                &mut scratch.visits,
            );
            match evaluate_sequence(problem, &scratch.visits, &mut scratch.timings) {
                Ok(cost) => {
                    let delta = cost - base_cost;
                    if best.is_some_and(|b| delta >= b.delta) {
                        continue;
                    }
                    let placement = Placement::in_route(route, i, j);
                    if !needs_check || confirm(problem, solution, placement, first, second) {
                        *best = Some(Insertion { placement, delta });
                    }
                }
                // the second stop sits at j + 1; anything up to it only gets worse
                Err(v) if v.position <= j + 1 => break,
                Err(_) => continue,
            }
        }
    }
}

/// Applies the placement to a copy and checks the whole solution.
fn confirm(
    problem: &Problem,
    solution: &Solution,
    placement: Placement,
    first: Visit,
    second: Visit,
) -> bool {
    let Some(request) = first.request else {
        return false;
    };
    let mut trial = solution.clone();
    let (_, converged) = trial.insert_pair(
        problem,
        placement,
        request,
        (first.node, first.kind),
        (second.node, second.kind),
    );
    converged && is_feasible(problem, &trial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, ProblemBuilder};

    fn problem() -> Problem {
        ProblemBuilder::new(2, 1.0)
            .depot(0.0, 0.0)
            .request(
                Location::new(10.0, 0.0).with_window(0.0, 200.0),
                Location::new(40.0, 0.0).with_window(0.0, 200.0),
                100.0,
            )
            .request(
                Location::new(20.0, 0.0).with_window(0.0, 200.0),
                Location::new(30.0, 0.0).with_window(0.0, 200.0),
                100.0,
            )
            .with_window_tightening(false)
            .build()
            .expect("valid")
    }

    fn pair(problem: &Problem, r: usize) -> (Visit, Visit) {
        let req = problem.request(r);
        (
            Visit::new(req.pickup(), RouteNodeType::Pickup, Some(r)),
            Visit::new(req.dropoff(), RouteNodeType::Dropoff, Some(r)),
        )
    }

    #[test]
    fn test_nested_insertion_is_free() {
        let p = problem();
        let mut sol = Solution::empty(&p);
        let (a, b) = pair(&p, 1);
        sol.insert_pair(&p, Placement::new_route(), 1, (a.node, a.kind), (b.node, b.kind));

        let (a, b) = pair(&p, 2);
        let mut scratch = Scratch::default();
        let ins = cheapest_insertion(&p, &sol, a, b, Scope::everywhere(), &mut scratch).expect("placed");
        assert_eq!(ins.placement, Placement::in_route(0, 2, 2));
        assert!(ins.delta.abs() < 1e-10);
    }

    #[test]
    fn test_new_route_when_routes_excluded() {
        let p = problem();
        let mut sol = Solution::empty(&p);
        let (a, b) = pair(&p, 1);
        sol.insert_pair(&p, Placement::new_route(), 1, (a.node, a.kind), (b.node, b.kind));

        let (a, b) = pair(&p, 2);
        let mut scratch = Scratch::default();
        let ins = cheapest_insertion(&p, &sol, a, b, Scope::excluding(0), &mut scratch).expect("placed");
        assert_eq!(ins.placement, Placement::new_route());
        assert!((ins.delta - 60.0).abs() < 1e-10);
        assert!(cheapest_insertion(
            &p,
            &sol,
            a,
            b,
            Scope {
                new_route: false,
                ..Scope::excluding(0)
            },
            &mut scratch
        ).is_none());
    }

    #[test]
    fn test_capacity_blocks_overlap() {
        let p = ProblemBuilder::new(1, 1.0)
            .depot(0.0, 0.0)
            .request(Location::new(10.0, 0.0), Location::new(40.0, 0.0), 100.0)
            .request(Location::new(20.0, 0.0), Location::new(30.0, 0.0), 100.0)
            .build()
            .expect("valid");
        let mut sol = Solution::empty(&p);
        let (a, b) = pair(&p, 1);
        sol.insert_pair(&p, Placement::new_route(), 1, (a.node, a.kind), (b.node, b.kind));

        let (a, b) = pair(&p, 2);
        let mut scratch = Scratch::default();
        let ins = cheapest_insertion(&p, &sol, a, b, Scope::existing_routes(), &mut scratch).expect("placed");
        // only after the first passenger has left: 40 -> 20 -> 30 -> 0 instead of 40 -> 0
        assert_eq!(ins.placement, Placement::in_route(0, 3, 3));
        assert!((ins.delta - 20.0).abs() < 1e-10);
    }
}
