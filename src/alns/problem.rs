//! The dial-a-ride operators behind the [`u_metaheur::alns`] traits.
//!
//! [`AlnsRunner`](super::AlnsRunner) supports fixed and uniform operator
//! selection, improving-only acceptance and per-outcome bookkeeping. When
//! plain adaptive annealing is enough, [`u_metaheur::alns::AlnsRunner`] can
//! drive the same operators through the types here. Operators are bound to
//! the problem because the generic traits pass only the solution.

use rand::Rng;
use tracing::warn;
use u_metaheur::alns::AlnsProblem;

use crate::evaluation::is_feasible;
use crate::models::{Problem, RequestId, Solution};

use super::config::{AlnsConfig, InitialSolution};
use super::destroy::DestroyOperator;
use super::repair::RepairOperator;
use super::runner::{initial_solution, removals_for};

/// Cost charged for every request a solution leaves unserved.
pub const UNSERVED_PENALTY: f64 = 1.0e6;

/// A dial-a-ride instance seen as a generic ALNS problem.
///
/// Infeasible or structurally broken solutions cost `f64::INFINITY`, so the
/// generic runner never accepts them.
///
/// # Examples
///
/// ```
/// use u_darpt::alns::{AlnsConfig, DarptAlnsProblem};
/// use u_darpt::models::{Location, ProblemBuilder};
/// use u_metaheur::alns::AlnsRunner;
///
/// let problem = ProblemBuilder::new(3, 1.0)
///     .depot(0.0, 0.0)
///     .request(Location::new(1.0, 0.0), Location::new(4.0, 0.0), 100.0)
///     .request(Location::new(2.0, 0.0), Location::new(3.0, 0.0), 100.0)
///     .build()
///     .unwrap();
/// let config = AlnsConfig::default().with_max_iterations(50).with_seed(1);
/// let darpt = DarptAlnsProblem::new(&problem, config.initial_solution);
///
/// let result = AlnsRunner::run(
///     &darpt,
///     &darpt.destroy_operators(&config),
///     &darpt.repair_operators(&config),
///     &config.to_metaheur(),
/// )
/// .unwrap();
/// assert_eq!(result.best.num_served(), 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DarptAlnsProblem<'a> {
    problem: &'a Problem,
    initial: InitialSolution,
}

impl<'a> DarptAlnsProblem<'a> {
    pub fn new(problem: &'a Problem, initial: InitialSolution) -> Self {
        Self { problem, initial }
    }

    /// Every destroy operator, capped at `config.max_removals` per call.
    pub fn destroy_operators(&self, config: &AlnsConfig) -> Vec<BoundDestroy<'a>> {
        DestroyOperator::all(config.shaw)
            .into_iter()
            .map(|operator| BoundDestroy {
                problem: self.problem,
                operator,
                max_removals: config.max_removals,
            })
            .collect()
    }

    pub fn repair_operators(&self, config: &AlnsConfig) -> Vec<BoundRepair<'a>> {
        RepairOperator::all(config.transfer_probability)
            .into_iter()
            .map(|operator| BoundRepair {
                problem: self.problem,
                operator,
            })
            .collect()
    }
}

impl AlnsProblem for DarptAlnsProblem<'_> {
    type Solution = Solution;

    fn initial_solution<R: Rng>(&self, rng: &mut R) -> Solution {
        initial_solution(self.problem, self.initial, rng)
    }

    fn cost(&self, solution: &Solution) -> f64 {
        if !solution.is_consistent() || !is_feasible(self.problem, solution) {
            return f64::INFINITY;
        }
        let unserved = solution.unserved_requests().len() as f64;
        solution.cost(self.problem) + unserved * UNSERVED_PENALTY
    }
}

/// A destroy operator together with the problem it edits.
#[derive(Debug, Clone, Copy)]
pub struct BoundDestroy<'a> {
    problem: &'a Problem,
    operator: DestroyOperator,
    max_removals: usize,
}

impl u_metaheur::alns::DestroyOperator<Solution> for BoundDestroy<'_> {
    fn name(&self) -> &str {
        self.operator.name()
    }

    fn destroy<R: Rng>(&self, solution: &Solution, degree: f64, rng: &mut R) -> Solution {
        let mut partial = solution.clone();
        let count = removals_for(partial.num_served(), degree, self.max_removals);
        match self.operator.destroy(self.problem, &mut partial, count, rng) {
            Ok(_) => partial,
            Err(e) => {
                warn!(error = %e, op = self.operator.name(), "destroy failed; keeping the solution");
                solution.clone()
            }
        }
    }
}

/// A repair operator together with the problem it edits.
///
/// Reinserts every unserved request. Requests it cannot place stay unserved
/// and are charged [`UNSERVED_PENALTY`].
#[derive(Debug, Clone, Copy)]
pub struct BoundRepair<'a> {
    problem: &'a Problem,
    operator: RepairOperator,
}

impl u_metaheur::alns::RepairOperator<Solution> for BoundRepair<'_> {
    fn name(&self) -> &str {
        self.operator.name()
    }

    fn repair<R: Rng>(&self, solution: &Solution, rng: &mut R) -> Solution {
        let mut repaired = solution.clone();
        let pending: Vec<RequestId> = repaired.unserved_requests();
        match self.operator.repair(self.problem, &mut repaired, &pending, rng) {
            Ok(_) => repaired,
            Err(e) => {
                warn!(error = %e, op = self.operator.name(), "repair failed; keeping the partial solution");
                solution.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::is_max_ride_feasible;
    use crate::models::{Location, ProblemBuilder};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use u_metaheur::alns::{AlnsRunner, DestroyOperator as _, RepairOperator as _};

    fn corridor() -> Problem {
        let mut b = ProblemBuilder::new(4, 1.0).depot(0.0, 0.0);
        for k in 0..6 {
            let x = 5.0 * k as f64;
            b = b.request(
                Location::new(x, 1.0).with_window(0.0, 400.0),
                Location::new(x + 3.0, -1.0).with_window(0.0, 500.0),
                120.0,
            );
        }
        b.build().expect("valid")
    }

    #[test]
    fn test_cost_charges_unserved_requests() {
        let p = corridor();
        let darpt = DarptAlnsProblem::new(&p, InitialSolution::Singletons);
        let full = Solution::with_singleton_routes(&p);
        let empty = Solution::empty(&p);
        assert!((darpt.cost(&full) - full.cost(&p)).abs() < 1e-9);
        assert!((darpt.cost(&empty) - 6.0 * UNSERVED_PENALTY).abs() < 1e-6);
    }

    #[test]
    fn test_bound_destroy_caps_removals() {
        let p = corridor();
        let darpt = DarptAlnsProblem::new(&p, InitialSolution::Singletons);
        let config = AlnsConfig::default().with_max_removals(2);
        let destroy = darpt.destroy_operators(&config);
        let full = Solution::with_singleton_routes(&p);
        let mut rng = StdRng::seed_from_u64(3);

        let partial = destroy[0].destroy(&full, 1.0, &mut rng);
        assert_eq!(destroy[0].name(), "random");
        assert_eq!(partial.num_served(), 4);
        assert_eq!(full.num_served(), 6);
        assert!(partial.is_consistent());
    }

    #[test]
    fn test_bound_repair_serves_everything() {
        let p = corridor();
        let darpt = DarptAlnsProblem::new(&p, InitialSolution::Singletons);
        let config = AlnsConfig::default();
        let repair = darpt.repair_operators(&config);
        let mut rng = StdRng::seed_from_u64(8);

        let repaired = repair[0].repair(&Solution::empty(&p), &mut rng);
        assert_eq!(repaired.num_served(), 6);
        assert!(darpt.cost(&repaired) < UNSERVED_PENALTY);
    }

    #[test]
    fn test_generic_runner_improves_singletons() {
        let p = corridor();
        let config = AlnsConfig::default().with_max_iterations(150).with_seed(21);
        let darpt = DarptAlnsProblem::new(&p, config.initial_solution);
        let destroy = darpt.destroy_operators(&config);
        let repair = darpt.repair_operators(&config);

        let result = AlnsRunner::run(&darpt, &destroy, &repair, &config.to_metaheur())
            .expect("valid config");
        let initial = Solution::with_singleton_routes(&p).cost(&p);
        assert!(result.best_cost < initial);
        assert_eq!(result.best.num_served(), 6);
        assert!(is_feasible(&p, &result.best));
        assert!(is_max_ride_feasible(&p, &result.best));
        assert_eq!(result.destroy_weights.len(), 5);
    }
}
