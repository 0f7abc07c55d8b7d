//! Destroy operators for dial-a-ride ALNS.
//!
//! # Operators
//!
//! - [`RandomDestroy`] — Removes random served requests
//! - [`ShawRemoval`] — Removes requests related to a random seed request
//! - [`ClusterRemoval`] — Removes requests whose stops lie near a random root stop
//! - [`MostExpensiveDestroy`] — Removes requests whose removal saves the most
//! - [`CloseRandomTransfer`] — Closes an open transfer point and removes its users
//!
//! Every operator edits the solution in place and returns the ids of the
//! removed requests. A transferred request is removed from both of its
//! vehicles at once.
//!
//! # Reference
//!
//! Ropke, S. & Pisinger, D. (2006). "An Adaptive Large Neighborhood Search
//! Heuristic for the Pickup and Delivery Problem with Time Windows",
//! *Transportation Science* 40(4), 455-472.

use rand::{Rng, RngExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SolutionError;
use crate::models::{Problem, RequestId, Solution};

/// Removes `requests` one by one.
fn remove_all(
    problem: &Problem,
    solution: &mut Solution,
    requests: &[RequestId],
) -> Result<(), SolutionError> {
    for &r in requests {
        solution.remove_request(problem, r)?;
    }
    Ok(())
}

/// Served requests, reduced to `count` with a warning when fewer are served.
fn clamp_count(solution: &Solution, count: usize, operator: &str) -> (Vec<RequestId>, usize) {
    let served = solution.served_requests();
    if count > served.len() {
        warn!(
            operator,
            requested = count,
            served = served.len(),
            "asked to remove more requests than are served"
        );
    }
    let count = count.min(served.len());
    (served, count)
}

/// Removes served requests chosen uniformly at random.
///
/// # Examples
///
/// ```
/// use rand::SeedableRng;
/// use u_darpt::alns::destroy::RandomDestroy;
/// use u_darpt::models::{Location, ProblemBuilder, Solution};
///
/// let problem = ProblemBuilder::new(2, 1.0)
///     .depot(0.0, 0.0)
///     .request(Location::new(1.0, 0.0), Location::new(2.0, 0.0), 100.0)
///     .request(Location::new(0.0, 1.0), Location::new(0.0, 2.0), 100.0)
///     .build()
///     .unwrap();
/// let mut sol = Solution::with_singleton_routes(&problem);
/// let mut rng = rand::rngs::StdRng::seed_from_u64(42);
///
/// let removed = RandomDestroy.destroy(&problem, &mut sol, 1, &mut rng).unwrap();
/// assert_eq!(removed.len(), 1);
/// assert_eq!(sol.num_served(), 1);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomDestroy;

impl RandomDestroy {
    pub fn destroy<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<RequestId>, SolutionError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let (served, count) = clamp_count(solution, count, "random");
        let removed: Vec<RequestId> = rand::seq::index::sample(rng, served.len(), count)
            .into_iter()
            .map(|k| served[k])
            .collect();
        remove_all(problem, solution, &removed)?;
        Ok(removed)
    }
}

/// Removes a random seed request and the requests most related to it.
///
/// Relatedness of requests `a` and `b` (lower is more related) is
///
/// ```text
/// w_d * (c(p_a, p_b) + c(d_a, d_b)) / max_cost
///   + w_t * (|S(p_a) - S(p_b)| + |S(d_a) - S(d_b)|) / latest_start
///   + w_l * (|Q(p_a) - Q(p_b)| + |Q(d_a) - Q(d_b)|) / capacity
/// ```
///
/// where `c` is travel cost, `S` start of service and `Q` load on departure.
/// Two requests picked up at the same location score `+inf`, so duplicates
/// are never taken for neighbours.
///
/// # Reference
///
/// Shaw, P. (1998). "Using Constraint Programming and Local Search Methods
/// to Solve Vehicle Routing Problems", *CP-98*, LNCS 1520, 417-431.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShawRemoval {
    pub distance_weight: f64,
    pub time_weight: f64,
    pub load_weight: f64,
}

impl Default for ShawRemoval {
    fn default() -> Self {
        Self {
            distance_weight: 1.0,
            time_weight: 1.0,
            load_weight: 1.0,
        }
    }
}

impl ShawRemoval {
    pub fn new(distance_weight: f64, time_weight: f64, load_weight: f64) -> Self {
        Self {
            distance_weight,
            time_weight,
            load_weight,
        }
    }

    /// Relatedness of two served requests; `None` if either is unserved.
    pub fn relatedness(
        &self,
        problem: &Problem,
        solution: &Solution,
        a: RequestId,
        b: RequestId,
    ) -> Option<f64> {
        let (ra, rb) = (problem.request(a), problem.request(b));
        let (sa, sb) = (solution.request(a), solution.request(b));
        let (pa, da) = (solution.stop(sa.pickup()?), solution.stop(sa.dropoff()?));
        let (pb, db) = (solution.stop(sb.pickup()?), solution.stop(sb.dropoff()?));
        if problem.distance(ra.pickup(), rb.pickup()) == 0.0 {
            return Some(f64::INFINITY);
        }

        let cost = problem.cost(ra.pickup(), rb.pickup()) + problem.cost(ra.dropoff(), rb.dropoff());
        let time = (pa.start_of_service() - pb.start_of_service()).abs()
            + (da.start_of_service() - db.start_of_service()).abs();
        let load = ((pa.load() - pb.load()).abs() + (da.load() - db.load()).abs()) as f64;

        Some(
            self.distance_weight * normalized(cost, problem.max_cost())
                + self.time_weight * normalized(time, solution.latest_service_time())
                + self.load_weight * normalized(load, problem.capacity() as f64),
        )
    }

    /// Other served requests ordered from most to least related to `seed`.
    pub fn ranked(&self, problem: &Problem, solution: &Solution, seed: RequestId) -> Vec<RequestId> {
        let mut scored: Vec<(RequestId, f64)> = solution
            .served_requests()
            .into_iter()
            .filter(|&r| r != seed)
            .filter_map(|r| Some((r, self.relatedness(problem, solution, seed, r)?)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.into_iter().map(|(r, _)| r).collect()
    }

    pub fn destroy<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<RequestId>, SolutionError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let (served, count) = clamp_count(solution, count, "shaw");
        if count == 0 {
            return Ok(Vec::new());
        }
        let seed = served[rng.random_range(0..served.len())];
        let mut removed = vec![seed];
        removed.extend(self.ranked(problem, solution, seed).into_iter().take(count - 1));
        remove_all(problem, solution, &removed)?;
        Ok(removed)
    }
}

fn normalized(value: f64, scale: f64) -> f64 {
    if scale > 0.0 {
        value / scale
    } else {
        0.0
    }
}

/// Removes requests whose stops lie near a random root stop.
///
/// A random served request and one of its sides (pickup or dropoff) give
/// the root. Other served requests are ranked by distance from the root to
/// their stop of the same side, and drawn at index `floor(y^p * remaining)`
/// with `y ~ U(0, 1)`, which strongly favours the nearest ones.
///
/// # Reference
///
/// Masson, R., Lehuédé, F. & Péton, O. (2013). "An Adaptive Large
/// Neighborhood Search for the Pickup and Delivery Problem with
/// Transfers", *Transportation Science* 47(3), 344-355.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterRemoval {
    /// Exponent `p` of the draw.
    pub bias: i32,
}

impl Default for ClusterRemoval {
    fn default() -> Self {
        Self { bias: 9 }
    }
}

impl ClusterRemoval {
    /// Other served requests ordered by distance from the root stop.
    pub fn ranked(
        &self,
        problem: &Problem,
        solution: &Solution,
        root: RequestId,
        pickup_side: bool,
    ) -> Vec<RequestId> {
        let side = |r: RequestId| {
            let req = problem.request(r);
            if pickup_side {
                req.pickup()
            } else {
                req.dropoff()
            }
        };
        let anchor = side(root);
        let mut others: Vec<RequestId> = solution
            .served_requests()
            .into_iter()
            .filter(|&r| r != root)
            .collect();
        others.sort_by(|&a, &b| {
            problem
                .distance(anchor, side(a))
                .total_cmp(&problem.distance(anchor, side(b)))
        });
        others
    }

    pub fn destroy<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<RequestId>, SolutionError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let (served, count) = clamp_count(solution, count, "cluster");
        if count == 0 {
            return Ok(Vec::new());
        }
        let root = served[rng.random_range(0..served.len())];
        let pickup_side = rng.random_bool(0.5);
        let mut candidates = self.ranked(problem, solution, root, pickup_side);

        let mut removed = vec![root];
        while removed.len() < count && !candidates.is_empty() {
            let y: f64 = rng.random();
            let k = ((y.powi(self.bias) * candidates.len() as f64) as usize).min(candidates.len() - 1);
            removed.push(candidates.remove(k));
        }
        remove_all(problem, solution, &removed)?;
        Ok(removed)
    }
}

/// Removes the requests whose individual removal lowers total cost most.
///
/// Each served request is removed alone from a copy of the solution to
/// measure its saving. The `count` largest savings are kept in one pass,
/// a new candidate replacing the smallest kept saving only when strictly
/// larger, so earlier requests win ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MostExpensiveDestroy;

impl MostExpensiveDestroy {
    /// Cost saved by removing `request` alone.
    pub fn saving(
        &self,
        problem: &Problem,
        solution: &Solution,
        scratch: &mut Solution,
        request: RequestId,
    ) -> Result<f64, SolutionError> {
        scratch.copy_from(solution);
        scratch.remove_request(problem, request)?;
        Ok(solution.cost(problem) - scratch.cost(problem))
    }

    pub fn destroy<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        count: usize,
        _rng: &mut R,
    ) -> Result<Vec<RequestId>, SolutionError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let (served, count) = clamp_count(solution, count, "most_expensive");
        let mut scratch = solution.clone();
        let mut kept: Vec<(RequestId, f64)> = Vec::with_capacity(count);
        for r in served {
            let saving = self.saving(problem, solution, &mut scratch, r)?;
            if kept.len() < count {
                kept.push((r, saving));
                continue;
            }
            let worst = kept
                .iter()
                .enumerate()
                .min_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
                .map(|(k, _)| k);
            if let Some(k) = worst {
                if saving > kept[k].1 {
                    kept[k] = (r, saving);
                }
            }
        }
        let removed: Vec<RequestId> = kept.into_iter().map(|(r, _)| r).collect();
        remove_all(problem, solution, &removed)?;
        Ok(removed)
    }
}

/// Closes a random open transfer point and removes every request using it.
///
/// Any positive removal count closes one transfer; nothing happens when the
/// count is zero or no transfer is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseRandomTransfer;

impl CloseRandomTransfer {
    pub fn destroy<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<RequestId>, SolutionError> {
        let open: Vec<_> = solution.open_transfers().iter().copied().collect();
        if count == 0 || open.is_empty() {
            return Ok(Vec::new());
        }
        let transfer = open[rng.random_range(0..open.len())];
        let removed = solution.requests_through(transfer);
        remove_all(problem, solution, &removed)?;
        solution.close_transfer(transfer)?;
        debug!(transfer, removed = removed.len(), "closed transfer point");
        Ok(removed)
    }
}

/// The destroy operators available to the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DestroyOperator {
    Random(RandomDestroy),
    Shaw(ShawRemoval),
    Cluster(ClusterRemoval),
    MostExpensive(MostExpensiveDestroy),
    CloseRandomTransfer(CloseRandomTransfer),
}

impl DestroyOperator {
    /// The default operator set, Shaw weighted as given.
    pub fn all(shaw: ShawRemoval) -> Vec<DestroyOperator> {
        vec![
            DestroyOperator::Random(RandomDestroy),
            DestroyOperator::Shaw(shaw),
            DestroyOperator::Cluster(ClusterRemoval::default()),
            DestroyOperator::MostExpensive(MostExpensiveDestroy),
            DestroyOperator::CloseRandomTransfer(CloseRandomTransfer),
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            DestroyOperator::Random(_) => "random",
            DestroyOperator::Shaw(_) => "shaw",
            DestroyOperator::Cluster(_) => "cluster",
            DestroyOperator::MostExpensive(_) => "most_expensive",
            DestroyOperator::CloseRandomTransfer(_) => "close_random_transfer",
        }
    }

    /// Removes up to `count` requests and returns their ids.
    pub fn destroy<R: Rng>(
        &self,
        problem: &Problem,
        solution: &mut Solution,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<RequestId>, SolutionError> {
        match self {
            DestroyOperator::Random(op) => op.destroy(problem, solution, count, rng),
            DestroyOperator::Shaw(op) => op.destroy(problem, solution, count, rng),
            DestroyOperator::Cluster(op) => op.destroy(problem, solution, count, rng),
            DestroyOperator::MostExpensive(op) => op.destroy(problem, solution, count, rng),
            DestroyOperator::CloseRandomTransfer(op) => op.destroy(problem, solution, count, rng),
        }
    }
}
