//! ALNS execution loop.

use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, RngExt, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::ConfigError;
use crate::evaluation::is_feasible;
use crate::models::{Problem, RequestId, Solution};

use super::config::{Acceptance, AlnsConfig, InitialSolution, OperatorSelection};
use super::destroy::DestroyOperator;
use super::repair::{GreedyRepair, RepairOperator};

/// What happened to one iteration's candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    NewBest,
    Improved,
    Accepted,
    Rejected,
    Skipped,
    RepairFailed,
    Inconsistent,
}

/// How many iterations ended each way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub new_best: usize,
    pub improved: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// The destroy operator removed nothing, so the iteration earned no score.
    pub skipped: usize,
    /// Some removed request could not be reinserted.
    pub repair_failed: usize,
    /// An operator reported a structural error or left the solution
    /// infeasible.
    pub inconsistent: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::NewBest => self.new_best += 1,
            Outcome::Improved => self.improved += 1,
            Outcome::Accepted => self.accepted += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::RepairFailed => self.repair_failed += 1,
            Outcome::Inconsistent => self.inconsistent += 1,
        }
    }
}

/// Result of an ALNS optimization run.
#[derive(Debug, Clone)]
pub struct AlnsResult {
    /// The best solution found.
    pub best: Solution,

    /// Cost of the best solution.
    pub best_cost: f64,

    /// Cost of the initial solution.
    pub initial_cost: f64,

    /// Total number of iterations.
    pub iterations: usize,

    /// Number of new global bests found.
    pub improvements: usize,

    /// Final destroy operator weights.
    pub destroy_weights: Vec<f64>,

    /// Final repair operator weights.
    pub repair_weights: Vec<f64>,

    pub outcomes: OutcomeCounts,

    /// Best cost sampled at the end of every segment.
    pub cost_history: Vec<f64>,
}

/// Weights of one operator family and the credit collected toward the next
/// update.
#[derive(Debug, Clone)]
struct OperatorWheel {
    weights: Vec<f64>,
    credit: Vec<f64>,
    uses: Vec<u32>,
    /// `None` only while `weights` is empty.
    wheel: Option<WeightedIndex<f64>>,
}

impl OperatorWheel {
    fn new(operators: usize) -> Self {
        let weights = vec![1.0; operators];
        Self {
            wheel: WeightedIndex::new(&weights).ok(),
            credit: vec![0.0; operators],
            uses: vec![0; operators],
            weights,
        }
    }

    fn spin<R: Rng>(&self, rng: &mut R) -> usize {
        self.wheel.as_ref().map_or(0, |wheel| rng.sample(wheel))
    }

    fn reward(&mut self, operator: usize, score: f64) {
        self.credit[operator] += score;
        self.uses[operator] += 1;
    }

    /// Blends each used operator's mean credit into its weight. Unused
    /// operators keep their weight.
    fn close_segment(&mut self, reaction_factor: f64, min_weight: f64) {
        for ((weight, credit), uses) in self.weights.iter_mut().zip(&self.credit).zip(&self.uses) {
            if *uses > 0 {
                let mean = credit / f64::from(*uses);
                *weight = (*weight + reaction_factor * (mean - *weight)).max(min_weight);
            }
        }
        self.credit.fill(0.0);
        self.uses.fill(0);
        self.wheel = WeightedIndex::new(&self.weights).ok();
    }
}

fn select<R: Rng>(
    selection: OperatorSelection,
    destroy: &OperatorWheel,
    repair: &OperatorWheel,
    rng: &mut R,
) -> (usize, usize) {
    match selection {
        OperatorSelection::Fixed { destroy, repair } => (destroy, repair),
        OperatorSelection::Random => (
            rng.random_range(0..destroy.weights.len()),
            rng.random_range(0..repair.weights.len()),
        ),
        OperatorSelection::Adaptive => (destroy.spin(rng), repair.spin(rng)),
    }
}

/// Requests to remove out of `served` at the given degree, `0` when nothing
/// is served.
pub(super) fn removals_for(served: usize, degree: f64, max_removals: usize) -> usize {
    if served == 0 {
        return 0;
    }
    ((served as f64 * degree).round() as usize).clamp(1, max_removals.max(1))
}

fn removal_count<R: Rng>(served: usize, config: &AlnsConfig, rng: &mut R) -> usize {
    let degree = if config.max_destroy_degree > config.min_destroy_degree {
        rng.random_range(config.min_destroy_degree..config.max_destroy_degree)
    } else {
        config.min_destroy_degree
    };
    removals_for(served, degree, config.max_removals)
}

/// Builds the starting solution.
pub fn initial_solution<R: Rng>(problem: &Problem, kind: InitialSolution, rng: &mut R) -> Solution {
    match kind {
        InitialSolution::Singletons => Solution::with_singleton_routes(problem),
        InitialSolution::Greedy => {
            let mut solution = Solution::empty(problem);
            let all: Vec<RequestId> = (1..=problem.num_requests()).collect();
            match GreedyRepair::default().repair(problem, &mut solution, &all, rng) {
                Ok(outcome) if !outcome.is_complete() => {
                    warn!(unplaced = ?outcome.unplaced, "requests left out of the initial solution");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "greedy construction failed; using singleton routes");
                    return Solution::with_singleton_routes(problem);
                }
            }
            solution
        }
    }
}

/// Executes the ALNS search on a dial-a-ride problem.
///
/// # Examples
///
/// ```
/// use u_darpt::alns::{AlnsConfig, AlnsRunner};
/// use u_darpt::models::{Location, ProblemBuilder};
///
/// let problem = ProblemBuilder::new(3, 1.0)
///     .depot(0.0, 0.0)
///     .request(Location::new(1.0, 0.0), Location::new(4.0, 0.0), 100.0)
///     .request(Location::new(2.0, 0.0), Location::new(3.0, 0.0), 100.0)
///     .build()
///     .unwrap();
/// let config = AlnsConfig::default().with_max_iterations(50).with_seed(1);
///
/// let result = AlnsRunner::run(&problem, &config).unwrap();
/// assert!(result.best_cost <= result.initial_cost);
/// assert_eq!(result.best.num_served(), 2);
/// ```
pub struct AlnsRunner;

impl AlnsRunner {
    /// Runs the search with every destroy and repair operator.
    pub fn run(problem: &Problem, config: &AlnsConfig) -> Result<AlnsResult, ConfigError> {
        let destroy_ops = DestroyOperator::all(config.shaw);
        let repair_ops = RepairOperator::all(config.transfer_probability);
        Self::run_with_operators(problem, &destroy_ops, &repair_ops, config)
    }

    /// Runs the search with the given operators.
    #[instrument(
        level = "info",
        skip_all,
        fields(requests = problem.num_requests(), iterations = config.max_iterations),
        err(Display)
    )]
    pub fn run_with_operators(
        problem: &Problem,
        destroy_ops: &[DestroyOperator],
        repair_ops: &[RepairOperator],
        config: &AlnsConfig,
    ) -> Result<AlnsResult, ConfigError> {
        config.validate()?;
        if destroy_ops.is_empty() || repair_ops.is_empty() {
            return Err(ConfigError::new(
                "at least one destroy and one repair operator required",
            ));
        }
        if let OperatorSelection::Fixed { destroy, repair } = config.selection {
            if destroy >= destroy_ops.len() || repair >= repair_ops.len() {
                return Err(ConfigError::new(format!(
                    "fixed operator pair ({destroy}, {repair}) out of range"
                )));
            }
        }

        let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));

        let infeasible = problem.infeasible_requests();
        if !infeasible.is_empty() {
            warn!(requests = ?infeasible, "requests cannot be served by any vehicle");
        }

        let mut current = initial_solution(problem, config.initial_solution, &mut rng);
        let mut current_cost = current.cost(problem);
        let initial_cost = current_cost;
        let mut best = current.clone();
        let mut best_cost = current_cost;
        let mut working = current.clone();
        info!(cost = initial_cost, routes = current.num_routes(), "initial solution");

        let mut destroy_wheel = OperatorWheel::new(destroy_ops.len());
        let mut repair_wheel = OperatorWheel::new(repair_ops.len());

        let mut temperature = match config.acceptance {
            Acceptance::SimulatedAnnealing {
                initial_temperature,
                ..
            } => initial_temperature,
            Acceptance::ImprovingOnly => 0.0,
        };
        let mut outcomes = OutcomeCounts::default();
        let mut cost_history = vec![best_cost];

        for iteration in 0..config.max_iterations {
            let (d_idx, r_idx) = select(config.selection, &destroy_wheel, &repair_wheel, &mut rng);
            let destroy_op = &destroy_ops[d_idx];
            let repair_op = &repair_ops[r_idx];
            working.copy_from(&current);

            let count = removal_count(working.num_served(), config, &mut rng);
            let outcome = match destroy_op.destroy(problem, &mut working, count, &mut rng) {
                Err(e) => {
                    warn!(error = %e, op = destroy_op.name(), "destroy failed; discarding");
                    Outcome::Inconsistent
                }
                Ok(removed) if removed.is_empty() => Outcome::Skipped,
                Ok(removed) => match repair_op.repair(problem, &mut working, &removed, &mut rng) {
                    Err(e) => {
                        warn!(error = %e, op = repair_op.name(), "repair failed; discarding");
                        Outcome::Inconsistent
                    }
                    Ok(repaired) if !repaired.is_complete() => Outcome::RepairFailed,
                    Ok(_) if !working.is_consistent() || !is_feasible(problem, &working) => {
                        warn!(
                            destroy = destroy_op.name(),
                            repair = repair_op.name(),
                            "candidate violates solution invariants; discarding"
                        );
                        Outcome::Inconsistent
                    }
                    Ok(_) => {
                        let cost = working.cost(problem);
                        let outcome = if cost < best_cost {
                            Outcome::NewBest
                        } else if cost < current_cost {
                            Outcome::Improved
                        } else if temperature > 0.0
                            && rng.random_range(0.0..1.0) < (-(cost - current_cost) / temperature).exp()
                        {
                            Outcome::Accepted
                        } else {
                            Outcome::Rejected
                        };
                        if outcome == Outcome::NewBest {
                            best.copy_from(&working);
                            best_cost = cost;
                            debug!(iteration, cost, destroy = destroy_op.name(), repair = repair_op.name(), "new best");
                        }
                        if matches!(outcome, Outcome::NewBest | Outcome::Improved | Outcome::Accepted) {
                            std::mem::swap(&mut current, &mut working);
                            current_cost = cost;
                        }
                        outcome
                    }
                },
            };
            outcomes.record(outcome);

            let score = match outcome {
                Outcome::NewBest => Some(config.scores.new_best),
                Outcome::Improved => Some(config.scores.improved),
                Outcome::Accepted => Some(config.scores.accepted),
                Outcome::Skipped => None,
                Outcome::Rejected | Outcome::RepairFailed | Outcome::Inconsistent => Some(0.0),
            };
            if let Some(score) = score {
                destroy_wheel.reward(d_idx, score);
                repair_wheel.reward(r_idx, score);
            }

            if let Acceptance::SimulatedAnnealing {
                cooling_rate,
                min_temperature,
                ..
            } = config.acceptance
            {
                temperature = (temperature * cooling_rate).max(min_temperature);
            }

            if (iteration + 1) % config.segment_length == 0 {
                if config.selection == OperatorSelection::Adaptive {
                    destroy_wheel.close_segment(config.reaction_factor, config.min_weight);
                    repair_wheel.close_segment(config.reaction_factor, config.min_weight);
                }
                cost_history.push(best_cost);
            }
        }

        if cost_history
            .last()
            .is_none_or(|&last| (last - best_cost).abs() > 1e-15)
        {
            cost_history.push(best_cost);
        }

        info!(
            best_cost,
            initial_cost,
            routes = best.num_routes(),
            served = best.num_served(),
            new_best = outcomes.new_best,
            rejected = outcomes.rejected,
            repair_failed = outcomes.repair_failed,
            "search finished"
        );

        Ok(AlnsResult {
            best,
            best_cost,
            initial_cost,
            iterations: config.max_iterations,
            improvements: outcomes.new_best,
            destroy_weights: destroy_wheel.weights,
            repair_weights: repair_wheel.weights,
            outcomes,
            cost_history,
        })
    }
}
