//! Solving a range of instances on a worker pool.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::alns::{AlnsConfig, AlnsRunner, OutcomeCounts};
use crate::error::{BatchError, ConfigError, InstanceError};
use crate::io::Instance;
use crate::models::{NodeId, RequestId};

/// Summary of one solved instance, printed as a JSON line by the binary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveReport {
    pub index: usize,
    pub requests: usize,
    pub routes: usize,
    pub served: usize,
    pub unserved: Vec<RequestId>,
    pub initial_cost: f64,
    pub best_cost: f64,
    pub iterations: usize,
    pub improvements: usize,
    pub outcomes: OutcomeCounts,
    pub destroy_weights: Vec<f64>,
    pub repair_weights: Vec<f64>,
    pub used_transfers: Vec<NodeId>,
    pub elapsed_ms: u64,
}

/// Base seed of batch runs whose configuration names none.
pub const DEFAULT_BASE_SEED: u64 = 0x5EED_DA27_0000_0001;

/// Seed of the run for instance `index`.
///
/// The base seed (the configured one, else [`DEFAULT_BASE_SEED`]) is mixed
/// with the index so each instance draws its own stream and every batch run
/// is reproducible.
pub fn instance_seed(base: Option<u64>, index: usize) -> u64 {
    base.unwrap_or(DEFAULT_BASE_SEED) ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Runs ALNS on one instance.
#[instrument(level = "info", skip_all, fields(index = instance.index), err(Display))]
pub fn solve_instance(instance: &Instance, config: &AlnsConfig) -> Result<SolveReport, ConfigError> {
    let config = AlnsConfig {
        seed: Some(instance_seed(config.seed, instance.index)),
        ..config.clone()
    };
    let started = Instant::now();
    let result = AlnsRunner::run(&instance.problem, &config)?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let best = &result.best;
    Ok(SolveReport {
        index: instance.index,
        requests: instance.problem.num_requests(),
        routes: best.num_routes(),
        served: best.num_served(),
        unserved: best.unserved_requests(),
        initial_cost: result.initial_cost,
        best_cost: result.best_cost,
        iterations: result.iterations,
        improvements: result.improvements,
        outcomes: result.outcomes,
        destroy_weights: result.destroy_weights,
        repair_weights: result.repair_weights,
        used_transfers: best.used_transfers().into_iter().collect(),
        elapsed_ms,
    })
}

/// Solves every instance whose index lies in `start..end`.
///
/// One worker per available processor; worker `w` takes indices
/// `start + w`, `start + w + W`, ... in turn. Indices missing from
/// `instances` and instances whose run fails are logged and skipped.
/// Reports come back ordered by index.
pub fn run_batch(
    instances: &[Instance],
    start: usize,
    end: usize,
    config: &AlnsConfig,
) -> Result<Vec<SolveReport>, BatchError> {
    config.validate()?;
    let by_index: BTreeMap<usize, &Instance> = instances.iter().map(|i| (i.index, i)).collect();
    let span = end.saturating_sub(start);
    if span == 0 {
        return Ok(Vec::new());
    }
    let workers = num_cpus::get().clamp(1, span);
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| BatchError::ThreadPool(e.to_string()))?;
    info!(start, end, workers, "solving batch");

    let mut reports: Vec<SolveReport> = pool.install(|| {
        (0..workers)
            .into_par_iter()
            .flat_map_iter(|w| {
                let by_index = &by_index;
                (start + w..end).step_by(workers).filter_map(move |index| {
                    let Some(instance) = by_index.get(&index) else {
                        warn!(error = %InstanceError::NotFound(index), "skipping");
                        return None;
                    };
                    match solve_instance(instance, config) {
                        Ok(report) => Some(report),
                        Err(e) => {
                            warn!(index, error = %e, "instance failed; skipping");
                            None
                        }
                    }
                })
            })
            .collect()
    });
    reports.sort_by_key(|r| r.index);
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, ProblemBuilder};

    fn instance(index: usize) -> Instance {
        let problem = ProblemBuilder::new(3, 1.0)
            .depot(0.0, 0.0)
            .request(
                Location::new(10.0, 0.0).with_window(0.0, 300.0),
                Location::new(20.0, 0.0).with_window(0.0, 300.0),
                100.0,
            )
            .request(
                Location::new(12.0, 2.0).with_window(0.0, 300.0),
                Location::new(22.0, 2.0).with_window(0.0, 300.0),
                100.0,
            )
            .request(
                Location::new(0.0, 15.0).with_window(0.0, 300.0),
                Location::new(0.0, 25.0).with_window(0.0, 300.0),
                100.0,
            )
            .transfer(15.0, 5.0, 0.0, 3.0)
            .build()
            .expect("valid");
        Instance { index, problem }
    }

    fn config() -> AlnsConfig {
        AlnsConfig::default().with_max_iterations(40).with_seed(11)
    }

    #[test]
    fn test_solve_instance_report() {
        let report = solve_instance(&instance(4), &config()).expect("valid config");
        assert_eq!(report.index, 4);
        assert_eq!(report.requests, 3);
        assert_eq!(report.served, 3);
        assert!(report.unserved.is_empty());
        assert_eq!(report.iterations, 40);
        assert!(report.best_cost <= report.initial_cost + 1e-9);
        assert!(report.routes >= 1);

        let json = serde_json::to_value(&report).expect("serializable");
        assert_eq!(json["index"], 4);
        assert!(json["outcomes"]["new_best"].is_number());
    }

    #[test]
    fn test_batch_skips_missing_and_orders_reports() {
        let instances = vec![instance(5), instance(2), instance(3)];
        let reports = run_batch(&instances, 1, 6, &config()).expect("batch runs");
        let indices: Vec<usize> = reports.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 3, 5]);
    }

    #[test]
    fn test_batch_is_reproducible_with_seed() {
        let instances = vec![instance(0), instance(1)];
        let a = run_batch(&instances, 0, 2, &config()).expect("batch runs");
        let b = run_batch(&instances, 0, 2, &config()).expect("batch runs");
        let costs = |r: &[SolveReport]| r.iter().map(|x| x.best_cost).collect::<Vec<_>>();
        assert_eq!(costs(&a), costs(&b));
    }

    #[test]
    fn test_batch_empty_range_and_bad_config() {
        let instances = vec![instance(0)];
        assert!(run_batch(&instances, 3, 3, &config()).expect("empty").is_empty());
        let bad = config().with_max_iterations(0);
        assert!(matches!(
            run_batch(&instances, 0, 1, &bad),
            Err(BatchError::Config(_))
        ));
    }

    #[test]
    fn test_batch_is_reproducible_without_seed() {
        let instances = vec![instance(0), instance(1)];
        let unseeded = AlnsConfig::default().with_max_iterations(40);
        let a = run_batch(&instances, 0, 2, &unseeded).expect("batch runs");
        let b = run_batch(&instances, 0, 2, &unseeded).expect("batch runs");
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.best_cost, y.best_cost);
            assert_eq!(x.outcomes, y.outcomes);
            assert_eq!(x.destroy_weights, y.destroy_weights);
        }
    }

    #[test]
    fn test_instance_seed_mixing() {
        assert_eq!(instance_seed(None, 3), instance_seed(None, 3));
        assert_eq!(instance_seed(None, 3), instance_seed(Some(DEFAULT_BASE_SEED), 3));
        assert_ne!(instance_seed(None, 0), instance_seed(None, 1));
        assert_ne!(instance_seed(Some(7), 0), instance_seed(Some(7), 1));
        assert_ne!(instance_seed(Some(7), 2), instance_seed(None, 2));
    }
}
