//! Repair operators for dial-a-ride ALNS.
//!
//! # Operators
//!
//! - [`GreedyRepair`] — Cheapest-first direct insertion
//! - [`BestInsertionWithTransfer`] — Direct or relayed through an open transfer point
//! - [`TransferFirst`] — Opens a transfer point, then inserts with transfers
//!
//! A request that fits nowhere is reported in [`RepairOutcome::unplaced`]
//! and leaves the solution untouched; requests placed before it stay placed.
//!
//! # Reference
//!
//! Ropke, S. & Pisinger, D. (2006). "An Adaptive Large Neighborhood Search
//! Heuristic for the Pickup and Delivery Problem with Time Windows",
//! *Transportation Science* 40(4), 455-472.

use rand::{Rng, RngExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::SolutionError;
use crate::evaluation::{is_feasible, Visit};
use crate::models::{NodeId, Problem, RequestId, RouteNodeType, Solution};

use super::insertion::{cheapest_insertion, Insertion, Scope, Scratch};

/// Result of a repair call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Requests that could not be placed.
    pub unplaced: Vec<RequestId>,
}

impl RepairOutcome {
    /// Returns `true` if every request was placed.
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }
}

/// Rejects unknown and already served request ids.
fn check_pending(solution: &Solution, requests: &[RequestId]) -> Result<(), SolutionError> {
    for &r in requests {
        if r == 0 || r > solution.requests().len() {
            return Err(SolutionError::UnknownRequest(r));
        }
        if solution.is_served(r) {
            return Err(SolutionError::AlreadyServed(r));
        }
    }
    Ok(())
}

fn direct_visits(problem: &Problem, request: RequestId) -> (Visit, Visit) {
    let req = problem.request(request);
    (
        Visit::new(req.pickup(), RouteNodeType::Pickup, Some(request)),
        Visit::new(req.dropoff(), RouteNodeType::Dropoff, Some(request)),
    )
}

fn commit(
    problem: &Problem,
    solution: &mut Solution,
    request: RequestId,
    insertion: Insertion,
    (first, second): (Visit, Visit),
) {
    let (route, converged) = solution.insert_pair(
        problem,
        insertion.placement,
        request,
        (first.node, first.kind),
        (second.node, second.kind),
    );
    if !converged {
        warn!(request, route, "schedule propagation did not settle");
    }
}

/// Cheapest-first greedy insertion without transfers.
///
/// Each round costs the best direct insertion of every pending request and
/// commits the cheapest one.
///
/// # Examples
///
/// ```
/// use rand::SeedableRng;
/// use u_darpt::alns::repair::GreedyRepair;
/// use u_darpt::models::{Location, ProblemBuilder, Solution};
///
/// let problem = ProblemBuilder::new(2, 1.0)
///     .depot(0.0, 0.0)
///     .request(Location::new(1.0, 0.0), Location::new(4.0, 0.0), 100.0)
///     .request(Location::new(2.0, 0.0), Location::new(3.0, 0.0), 100.0)
///     .build()
///     .unwrap();
/// let mut sol = Solution::empty(&problem);
/// let mut rng = rand::rngs::StdRng::seed_from_u64(42);
///
/// let outcome = GreedyRepair::default()
///     .repair(&problem, &mut sol, &[1, 2], &mut rng)
///     .unwrap();
/// assert!(outcome.is_complete());
/// assert_eq!(sol.num_routes(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreedyRepair {
    /// Whether a request may get a vehicle of its own.
    pub allow_new_routes: bool,
}

impl Default for GreedyRepair {
    fn default() -> Self {
        Self {
            allow_new_routes: true,
        }
    }
}

impl GreedyRepair {
    pub fn repair<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        requests: &[RequestId],
        _rng: &mut R,
    ) -> Result<RepairOutcome, SolutionError> {
        check_pending(solution, requests)?;
        let scope = if self.allow_new_routes {
            Scope::everywhere()
        } else {
            Scope::existing_routes()
        };
        let mut scratch = Scratch::default();
        let mut pending = requests.to_vec();
        let mut outcome = RepairOutcome::default();

        while !pending.is_empty() {
            let mut best: Option<(usize, Insertion)> = None;
            let mut k = 0;
            while k < pending.len() {
                let (first, second) = direct_visits(problem, pending[k]);
                match cheapest_insertion(problem, solution, first, second, scope, &mut scratch) {
                    Some(ins) => {
                        if best.is_none_or(|(_, b)| ins.delta < b.delta) {
                            best = Some((k, ins));
                        }
                        k += 1;
                    }
                    // routes only fill up, so it will not fit later either
                    None => outcome.unplaced.push(pending.remove(k)),
                }
            }
            let Some((k, ins)) = best else {
                break;
            };
            let request = pending.remove(k);
            trace!(request, delta = ins.delta, "greedy insertion");
            commit(problem, solution, request, ins, direct_visits(problem, request));
        }
        Ok(outcome)
    }
}

/// Which half of a transferred ride is placed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Pickup and transfer dropoff first, then transfer pickup and dropoff.
    PickupFirst,
    /// Transfer pickup and dropoff first, then pickup and transfer dropoff.
    DropoffFirst,
}

/// Inserts each request directly or relayed through an open transfer point,
/// whichever is cheapest.
///
/// A relayed ride is placed in two phases on a copy of the solution; the
/// second half goes to a different vehicle than the first. The fee of a
/// transfer point not yet in use counts towards the relayed cost. Direct
/// insertion wins ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestInsertionWithTransfer;

impl BestInsertionWithTransfer {
    pub fn repair<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        requests: &[RequestId],
        _rng: &mut R,
    ) -> Result<RepairOutcome, SolutionError> {
        check_pending(solution, requests)?;
        let mut scratch = Scratch::default();
        let mut outcome = RepairOutcome::default();

        for &request in requests {
            let visits = direct_visits(problem, request);
            let direct =
                cheapest_insertion(problem, solution, visits.0, visits.1, Scope::everywhere(), &mut scratch);

            let mut relayed: Option<(f64, Solution)> = None;
            for &transfer in solution.open_transfers() {
                let fee = if solution.is_transfer_used(transfer) {
                    0.0
                } else {
                    problem.node(transfer).transfer_fee().unwrap_or(0.0)
                };
                for shape in [Shape::PickupFirst, Shape::DropoffFirst] {
                    let Some((delta, trial)) =
                        transfer_shape(problem, solution, request, transfer, shape, &mut scratch)
                    else {
                        continue;
                    };
                    let total = delta + fee;
                    if relayed.as_ref().is_none_or(|(best, _)| total < *best) {
                        relayed = Some((total, trial));
                    }
                }
            }

            match (direct, relayed) {
                (Some(ins), Some((cost, _))) if ins.delta <= cost => {
                    commit(problem, solution, request, ins, visits);
                }
                (_, Some((cost, trial))) => {
                    debug!(request, cost, "relayed insertion");
                    *solution = trial;
                }
                (Some(ins), None) => commit(problem, solution, request, ins, visits),
                (None, None) => outcome.unplaced.push(request),
            }
        }
        Ok(outcome)
    }
}

/// Places `request` relayed through `transfer` on a copy of `solution`.
///
/// Returns the added travel cost and the resulting solution, if feasible.
fn transfer_shape(
    problem: &Problem,
    solution: &Solution,
    request: RequestId,
    transfer: NodeId,
    shape: Shape,
    scratch: &mut Scratch,
) -> Option<(f64, Solution)> {
    let req = problem.request(request);
    let pickup = Visit::new(req.pickup(), RouteNodeType::Pickup, Some(request));
    let dropoff = Visit::new(req.dropoff(), RouteNodeType::Dropoff, Some(request));
    let hand_off = Visit::new(transfer, RouteNodeType::TransferDropoff, Some(request));
    let board = Visit::new(transfer, RouteNodeType::TransferPickup, Some(request));

    let mut trial = solution.clone();
    let (first_pair, second_pair) = match shape {
        Shape::PickupFirst => ((pickup, hand_off), None),
        Shape::DropoffFirst => ((board, dropoff), Some((pickup, hand_off))),
    };

    let first = cheapest_insertion(problem, &trial, first_pair.0, first_pair.1, Scope::everywhere(), scratch)?;
    let (route, _) = trial.insert_pair(
        problem,
        first.placement,
        request,
        (first_pair.0.node, first_pair.0.kind),
        (first_pair.1.node, first_pair.1.kind),
    );

    let (second_pair, scope) = match second_pair {
        Some(pair) => (pair, Scope::excluding(route).confirmed()),
        None => {
            let placed = trial.request(request);
            let release = trial.stop(placed.transfer_dropoff()?).departure();
            let origin = trial.stop(placed.pickup()?).departure();
            (
                (board.with_release(release), dropoff.with_ride_origin(Some(origin))),
                Scope::excluding(route),
            )
        }
    };
    let second = cheapest_insertion(problem, &trial, second_pair.0, second_pair.1, scope, scratch)?;
    let (_, converged) = trial.insert_pair(
        problem,
        second.placement,
        request,
        (second_pair.0.node, second_pair.0.kind),
        (second_pair.1.node, second_pair.1.kind),
    );

    (converged && is_feasible(problem, &trial)).then_some((first.delta + second.delta, trial))
}

/// Opens a closed transfer point before inserting with transfers, and
/// closes every open transfer point left unused afterwards.
///
/// A transfer point is opened with probability `open_probability`, or
/// always when none is open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferFirst {
    pub open_probability: f64,
}

impl Default for TransferFirst {
    fn default() -> Self {
        Self {
            open_probability: 0.7,
        }
    }
}

impl TransferFirst {
    pub fn new(open_probability: f64) -> Self {
        Self {
            open_probability: open_probability.clamp(0.0, 1.0),
        }
    }

    pub fn repair<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        requests: &[RequestId],
        rng: &mut R,
    ) -> Result<RepairOutcome, SolutionError> {
        let closed: Vec<NodeId> = solution.closed_transfers().iter().copied().collect();
        if !closed.is_empty()
            && (solution.open_transfers().is_empty()
                || rng.random_bool(self.open_probability.clamp(0.0, 1.0)))
        {
            let transfer = closed[rng.random_range(0..closed.len())];
            solution.open_transfer(transfer)?;
            trace!(transfer, "opened transfer point");
        }

        let outcome = BestInsertionWithTransfer.repair(problem, solution, requests, rng)?;

        let unused: Vec<NodeId> = solution
            .open_transfers()
            .iter()
            .copied()
            .filter(|&t| !solution.is_transfer_used(t))
            .collect();
        for t in unused {
            solution.close_transfer(t)?;
        }
        Ok(outcome)
    }
}

/// The repair operators available to the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RepairOperator {
    Greedy(GreedyRepair),
    BestWithTransfer(BestInsertionWithTransfer),
    TransferFirst(TransferFirst),
}

impl RepairOperator {
    /// The default operator set.
    pub fn all(transfer_probability: f64) -> Vec<RepairOperator> {
        vec![
            RepairOperator::Greedy(GreedyRepair::default()),
            RepairOperator::BestWithTransfer(BestInsertionWithTransfer),
            RepairOperator::TransferFirst(TransferFirst::new(transfer_probability)),
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            RepairOperator::Greedy(_) => "greedy",
            RepairOperator::BestWithTransfer(_) => "best_with_transfer",
            RepairOperator::TransferFirst(_) => "transfer_first",
        }
    }

    /// Reinserts `requests`, reporting those that fit nowhere.
    pub fn repair<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        requests: &[RequestId],
        rng: &mut R,
    ) -> Result<RepairOutcome, SolutionError> {
        match self {
            RepairOperator::Greedy(op) => op.repair(problem, solution, requests, rng),
            RepairOperator::BestWithTransfer(op) => op.repair(problem, solution, requests, rng),
            RepairOperator::TransferFirst(op) => op.repair(problem, solution, requests, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alns::destroy::RandomDestroy;
    use crate::evaluation::is_max_ride_feasible;
    use crate::models::{Location, ProblemBuilder};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grid_problem() -> Problem {
        let mut b = ProblemBuilder::new(3, 1.0).depot(0.0, 0.0).depot(60.0, 60.0);
        for k in 0..8 {
            let x = (k * 7 % 50) as f64;
            let y = (k * 13 % 50) as f64;
            b = b.request(
                Location::new(x, y).with_window(0.0, 400.0).with_service_time(1.0),
                Location::new(y + 5.0, x + 3.0).with_window(0.0, 500.0).with_service_time(1.0),
                150.0,
            );
        }
        b.transfer(30.0, 30.0, 2.0, 10.0).build().expect("valid")
    }

    #[test]
    fn test_far_apart_requests_get_separate_vehicles() {
        let p = ProblemBuilder::new(1, 1.0)
            .depot(0.0, 0.0)
            .request(
                Location::new(100.0, 0.0).with_window(100.0, 110.0),
                Location::new(200.0, 0.0).with_window(200.0, 210.0),
                150.0,
            )
            .request(
                Location::new(-100.0, 0.0).with_window(100.0, 110.0),
                Location::new(-200.0, 0.0).with_window(200.0, 210.0),
                150.0,
            )
            .build()
            .expect("valid");
        let mut sol = Solution::empty(&p);
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = GreedyRepair::default()
            .repair(&p, &mut sol, &[1, 2], &mut rng)
            .expect("ok");
        assert!(outcome.is_complete());
        assert_eq!(sol.num_routes(), 2);
        assert!(is_feasible(&p, &sol));
    }

    #[test]
    fn test_destroy_then_greedy_serves_everything() {
        let p = grid_problem();
        let mut rng = StdRng::seed_from_u64(17);
        let mut sol = Solution::with_singleton_routes(&p);
        assert_eq!(sol.num_served(), 8);
        for _ in 0..20 {
            let removed = RandomDestroy.destroy(&p, &mut sol, 4, &mut rng).expect("ok");
            let outcome = GreedyRepair::default()
                .repair(&p, &mut sol, &removed, &mut rng)
                .expect("ok");
            assert!(outcome.is_complete());
            assert!(sol.unserved_requests().is_empty());
            assert!(sol.is_consistent());
            assert!(is_feasible(&p, &sol));
            assert!(is_max_ride_feasible(&p, &sol));
        }
    }

    #[test]
    fn test_greedy_without_new_routes() {
        let p = grid_problem();
        let mut sol = Solution::empty(&p);
        let mut rng = StdRng::seed_from_u64(2);
        let outcome = GreedyRepair {
            allow_new_routes: false,
        }
        .repair(&p, &mut sol, &[1, 2], &mut rng)
        .expect("ok");
        assert_eq!(outcome.unplaced, vec![1, 2]);
        assert_eq!(sol.num_routes(), 0);
    }

    #[test]
    fn test_rejects_served_request() {
        let p = grid_problem();
        let mut sol = Solution::with_singleton_routes(&p);
        let mut rng = StdRng::seed_from_u64(2);
        let err = GreedyRepair::default()
            .repair(&p, &mut sol, &[3], &mut rng)
            .unwrap_err();
        assert_eq!(err, SolutionError::AlreadyServed(3));
        let err = BestInsertionWithTransfer
            .repair(&p, &mut sol, &[42], &mut rng)
            .unwrap_err();
        assert_eq!(err, SolutionError::UnknownRequest(42));
    }

    fn relay_problem() -> Problem {
        ProblemBuilder::new(2, 1.0)
            .depot(0.0, 0.0)
            .depot(100.0, 0.0)
            .request(Location::new(10.0, 0.0), Location::new(90.0, 0.0), 1000.0)
            .transfer(50.0, 0.0, 0.0, 3.0)
            .build()
            .expect("valid")
    }

    #[test]
    fn test_transfer_shapes() {
        let p = relay_problem();
        let t = p.transfers()[0];
        let mut sol = Solution::empty(&p);
        sol.open_transfer(t).expect("transfer");
        let mut scratch = Scratch::default();
        for shape in [Shape::PickupFirst, Shape::DropoffFirst] {
            let (delta, trial) =
                transfer_shape(&p, &sol, 1, t, shape, &mut scratch).expect("feasible");
            assert!((delta - 200.0).abs() < 1e-10, "{shape:?}: {delta}");
            assert!((trial.cost(&p) - 203.0).abs() < 1e-10);
            assert_eq!(trial.num_routes(), 2);
            assert!(trial.request(1).has_transfer());
            assert!(trial.is_consistent());
            assert!(is_feasible(&p, &trial));
        }
    }

    #[test]
    fn test_best_with_transfer_prefers_cheaper_direct() {
        let p = relay_problem();
        let mut sol = Solution::empty(&p);
        sol.open_transfer(p.transfers()[0]).expect("transfer");
        let mut rng = StdRng::seed_from_u64(4);
        let outcome = BestInsertionWithTransfer
            .repair(&p, &mut sol, &[1], &mut rng)
            .expect("ok");
        assert!(outcome.is_complete());
        assert!(!sol.request(1).has_transfer());
        assert!((sol.cost(&p) - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_transfer_first_closes_unused() {
        let p = relay_problem();
        let t = p.transfers()[0];
        let mut sol = Solution::empty(&p);
        let mut rng = StdRng::seed_from_u64(8);
        let outcome = TransferFirst::new(1.0)
            .repair(&p, &mut sol, &[1], &mut rng)
            .expect("ok");
        assert!(outcome.is_complete());
        assert!(sol.open_transfers().is_empty());
        assert!(sol.closed_transfers().contains(&t));
        assert_eq!(sol.num_served(), 1);
    }

    #[test]
    fn test_all_operators_repair_grid() {
        let p = grid_problem();
        for op in RepairOperator::all(0.7) {
            let mut rng = StdRng::seed_from_u64(21);
            let mut sol = Solution::with_singleton_routes(&p);
            let removed = RandomDestroy.destroy(&p, &mut sol, 5, &mut rng).expect("ok");
            let outcome = op.repair(&p, &mut sol, &removed, &mut rng).expect("ok");
            assert!(outcome.is_complete(), "{}", op.name());
            assert_eq!(sol.num_served(), 8);
            assert!(sol.is_consistent(), "{}", op.name());
            assert!(is_feasible(&p, &sol), "{}", op.name());
        }
    }
}
