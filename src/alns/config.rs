//! ALNS configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::destroy::ShawRemoval;

/// How a worse candidate may replace the current solution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Acceptance {
    /// Only strictly cheaper candidates are accepted.
    ImprovingOnly,
    /// Worse candidates are accepted with probability `exp(-delta / T)`.
    /// `T` starts at `initial_temperature` and decays geometrically by
    /// `cooling_rate` each iteration, never below `min_temperature`.
    SimulatedAnnealing {
        initial_temperature: f64,
        cooling_rate: f64,
        min_temperature: f64,
    },
}

impl Default for Acceptance {
    fn default() -> Self {
        Acceptance::SimulatedAnnealing {
            initial_temperature: 100.0,
            cooling_rate: 0.9995,
            min_temperature: 0.01,
        }
    }
}

/// How the destroy/repair pair is chosen each iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorSelection {
    /// Always the same pair, by index into the operator lists.
    Fixed { destroy: usize, repair: usize },
    /// Uniformly at random.
    Random,
    /// Roulette wheel over adaptive weights.
    #[default]
    Adaptive,
}

/// Starting point of the search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialSolution {
    /// One vehicle per request.
    #[default]
    Singletons,
    /// Greedy insertion of every request into an empty solution.
    Greedy,
}

/// Credit an operator pair earns for one iteration's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// The candidate became the best solution seen so far.
    pub new_best: f64,
    /// The candidate beat the current solution but not the best.
    pub improved: f64,
    /// The candidate was worse but the acceptance rule took it.
    pub accepted: f64,
}

impl Default for Scores {
    fn default() -> Self {
        Self {
            new_best: 33.0,
            improved: 9.0,
            accepted: 3.0,
        }
    }
}

/// Search parameters for [`AlnsRunner`](super::AlnsRunner).
///
/// Iterations are grouped into segments of `segment_length`. Under
/// [`OperatorSelection::Adaptive`] every operator keeps a weight, and at the
/// end of a segment the mean of the [`Scores`] it collected pulls that weight
/// toward itself by `reaction_factor`. Weights never drop below `min_weight`.
///
/// An iteration removes `round(served * degree)` requests, `degree` drawn
/// from `[min_destroy_degree, max_destroy_degree)` and the result kept
/// within `[1, max_removals]`.
///
/// ```
/// use u_darpt::alns::{AlnsConfig, OperatorSelection};
///
/// let config = AlnsConfig::default()
///     .with_max_iterations(5000)
///     .with_scores(20.0, 10.0, 2.0)
///     .with_selection(OperatorSelection::Random)
///     .with_seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlnsConfig {
    pub max_iterations: usize,

    /// Iterations between weight updates and cost history samples.
    pub segment_length: usize,

    pub scores: Scores,

    /// Share of a segment's mean score blended into a weight, in (0, 1].
    pub reaction_factor: f64,

    pub min_weight: f64,

    /// Smallest fraction of served requests removed per iteration.
    pub min_destroy_degree: f64,

    /// Largest fraction of served requests removed per iteration.
    pub max_destroy_degree: f64,

    pub max_removals: usize,

    pub acceptance: Acceptance,

    pub selection: OperatorSelection,

    pub initial_solution: InitialSolution,

    /// Weights of the Shaw relatedness measure.
    pub shaw: ShawRemoval,

    /// Probability that transfer-first repair opens another transfer point.
    pub transfer_probability: f64,

    /// Seed of the search's random stream; drawn from entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for AlnsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            segment_length: 100,
            scores: Scores::default(),
            reaction_factor: 0.1,
            min_weight: 0.01,
            min_destroy_degree: 0.1,
            max_destroy_degree: 0.4,
            max_removals: 30,
            acceptance: Acceptance::default(),
            selection: OperatorSelection::default(),
            initial_solution: InitialSolution::default(),
            shaw: ShawRemoval::default(),
            transfer_probability: 0.7,
            seed: None,
        }
    }
}

impl AlnsConfig {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_segment_length(mut self, n: usize) -> Self {
        self.segment_length = n.max(1);
        self
    }

    pub fn with_scores(mut self, new_best: f64, improved: f64, accepted: f64) -> Self {
        self.scores = Scores {
            new_best,
            improved,
            accepted,
        };
        self
    }

    pub fn with_reaction_factor(mut self, rho: f64) -> Self {
        self.reaction_factor = rho;
        self
    }

    pub fn with_destroy_degree(mut self, min: f64, max: f64) -> Self {
        self.min_destroy_degree = min.clamp(0.0, 1.0);
        self.max_destroy_degree = max.clamp(self.min_destroy_degree, 1.0);
        self
    }

    pub fn with_max_removals(mut self, n: usize) -> Self {
        self.max_removals = n;
        self
    }

    pub fn with_acceptance(mut self, acceptance: Acceptance) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn with_selection(mut self, selection: OperatorSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_initial_solution(mut self, initial: InitialSolution) -> Self {
        self.initial_solution = initial;
        self
    }

    pub fn with_shaw_weights(mut self, distance: f64, time: f64, load: f64) -> Self {
        self.shaw = ShawRemoval::new(distance, time, load);
        self
    }

    pub fn with_transfer_probability(mut self, p: f64) -> Self {
        self.transfer_probability = p;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::new("max_iterations must be positive"));
        }
        if self.segment_length == 0 {
            return Err(ConfigError::new("segment_length must be positive"));
        }
        if self.reaction_factor <= 0.0 || self.reaction_factor > 1.0 {
            return Err(ConfigError::new(format!(
                "reaction_factor must be in (0, 1], got {}",
                self.reaction_factor
            )));
        }
        if self.min_weight <= 0.0 {
            return Err(ConfigError::new("min_weight must be positive"));
        }
        if !(0.0..=1.0).contains(&self.min_destroy_degree)
            || !(0.0..=1.0).contains(&self.max_destroy_degree)
            || self.min_destroy_degree > self.max_destroy_degree
        {
            return Err(ConfigError::new(
                "destroy degrees must satisfy 0 <= min <= max <= 1",
            ));
        }
        if self.max_removals == 0 {
            return Err(ConfigError::new("max_removals must be positive"));
        }
        let Scores {
            new_best,
            improved,
            accepted,
        } = self.scores;
        if [new_best, improved, accepted]
            .iter()
            .any(|s| !s.is_finite() || *s < 0.0)
        {
            return Err(ConfigError::new("scores must be finite and non-negative"));
        }
        if !(0.0..=1.0).contains(&self.transfer_probability) {
            return Err(ConfigError::new(format!(
                "transfer_probability must be in [0, 1], got {}",
                self.transfer_probability
            )));
        }
        let ShawRemoval {
            distance_weight,
            time_weight,
            load_weight,
        } = self.shaw;
        if [distance_weight, time_weight, load_weight]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(ConfigError::new("shaw weights must be finite and non-negative"));
        }
        if let Acceptance::SimulatedAnnealing {
            initial_temperature,
            cooling_rate,
            min_temperature,
        } = self.acceptance
        {
            if cooling_rate <= 0.0 || cooling_rate >= 1.0 {
                return Err(ConfigError::new(format!(
                    "cooling_rate must be in (0, 1), got {cooling_rate}"
                )));
            }
            if initial_temperature <= 0.0 {
                return Err(ConfigError::new("initial_temperature must be positive"));
            }
            if min_temperature <= 0.0 {
                return Err(ConfigError::new("min_temperature must be positive"));
            }
        }
        Ok(())
    }

    /// The matching settings for [`u_metaheur::alns::AlnsRunner`].
    ///
    /// The generic runner always anneals, so [`Acceptance::ImprovingOnly`]
    /// maps to a temperature too small to take any worse candidate. Removal
    /// caps, selection mode and operator parameters stay on the operators.
    pub fn to_metaheur(&self) -> u_metaheur::alns::AlnsConfig {
        let (initial, cooling, floor) = match self.acceptance {
            Acceptance::SimulatedAnnealing {
                initial_temperature,
                cooling_rate,
                min_temperature,
            } => (initial_temperature, cooling_rate, min_temperature),
            Acceptance::ImprovingOnly => (f64::MIN_POSITIVE, 0.5, f64::MIN_POSITIVE),
        };
        let mut meta = u_metaheur::alns::AlnsConfig::default()
            .with_max_iterations(self.max_iterations)
            .with_segment_length(self.segment_length)
            .with_scores(self.scores.new_best, self.scores.improved, self.scores.accepted)
            .with_reaction_factor(self.reaction_factor)
            .with_destroy_degree(self.min_destroy_degree, self.max_destroy_degree)
            .with_temperature(initial, cooling, floor);
        meta.min_weight = self.min_weight;
        meta.seed = self.seed;
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AlnsConfig::default();
        assert_eq!(config.max_iterations, 1000);
        assert_eq!(config.segment_length, 100);
        assert_eq!(config.scores, Scores::default());
        assert!((config.transfer_probability - 0.7).abs() < 1e-10);
        assert_eq!(config.selection, OperatorSelection::Adaptive);
        assert_eq!(config.initial_solution, InitialSolution::Singletons);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_iterations() {
        let config = AlnsConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err().message(),
            "max_iterations must be positive"
        );
    }

    #[test]
    fn test_validate_bad_reaction_factor() {
        assert!(AlnsConfig::default().with_reaction_factor(0.0).validate().is_err());
        assert!(AlnsConfig::default().with_reaction_factor(1.5).validate().is_err());
    }

    #[test]
    fn test_validate_bad_cooling_rate() {
        let sa = |cooling_rate| Acceptance::SimulatedAnnealing {
            initial_temperature: 100.0,
            cooling_rate,
            min_temperature: 0.01,
        };
        assert!(AlnsConfig::default().with_acceptance(sa(0.0)).validate().is_err());
        assert!(AlnsConfig::default().with_acceptance(sa(1.0)).validate().is_err());
        assert!(AlnsConfig::default().with_acceptance(sa(0.99)).validate().is_ok());
        assert!(AlnsConfig::default()
            .with_acceptance(Acceptance::ImprovingOnly)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_bad_probability_and_weights() {
        assert!(AlnsConfig::default().with_transfer_probability(1.2).validate().is_err());
        assert!(AlnsConfig::default().with_shaw_weights(1.0, -1.0, 1.0).validate().is_err());
        assert!(AlnsConfig::default().with_max_removals(0).validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = AlnsConfig::default()
            .with_max_iterations(500)
            .with_segment_length(50)
            .with_scores(10.0, 5.0, 1.0)
            .with_reaction_factor(0.2)
            .with_destroy_degree(0.2, 0.5)
            .with_max_removals(12)
            .with_initial_solution(InitialSolution::Greedy)
            .with_selection(OperatorSelection::Fixed { destroy: 1, repair: 0 })
            .with_seed(42);

        assert_eq!(config.max_iterations, 500);
        assert_eq!(config.segment_length, 50);
        assert!((config.scores.new_best - 10.0).abs() < 1e-10);
        assert!((config.scores.accepted - 1.0).abs() < 1e-10);
        assert!((config.min_destroy_degree - 0.2).abs() < 1e-10);
        assert!((config.max_destroy_degree - 0.5).abs() < 1e-10);
        assert_eq!(config.max_removals, 12);
        assert_eq!(config.seed, Some(42));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_scores() {
        assert!(AlnsConfig::default().with_scores(33.0, -1.0, 3.0).validate().is_err());
        assert!(AlnsConfig::default().with_scores(f64::NAN, 9.0, 3.0).validate().is_err());
    }

    #[test]
    fn test_to_metaheur_carries_shared_settings() {
        let config = AlnsConfig::default()
            .with_max_iterations(250)
            .with_segment_length(25)
            .with_scores(12.0, 6.0, 1.0)
            .with_destroy_degree(0.2, 0.3)
            .with_seed(11);
        let meta = config.to_metaheur();
        assert_eq!(meta.max_iterations, 250);
        assert_eq!(meta.segment_length, 25);
        assert!((meta.score_improved - 6.0).abs() < 1e-12);
        assert!((meta.max_destroy_degree - 0.3).abs() < 1e-12);
        assert!((meta.initial_temperature - 100.0).abs() < 1e-12);
        assert!((meta.min_weight - config.min_weight).abs() < 1e-12);
        assert_eq!(meta.seed, Some(11));
        assert!(meta.validate().is_ok());

        let strict = config.with_acceptance(Acceptance::ImprovingOnly).to_metaheur();
        assert!(strict.validate().is_ok());
        assert!((-1e-6 / strict.initial_temperature).exp() < 1e-300);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = AlnsConfig::default().with_seed(7);
        let json = serde_json::to_string(&config).expect("serialize");
        let back: AlnsConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);
    }
}
