//! Error types.
//!
//! Feasibility outcomes are plain `bool`/`Option` values throughout the
//! crate. The types here cover malformed input, invalid configuration and
//! structural inconsistencies of a [`Solution`](crate::models::Solution).

use std::fmt::Display;

use crate::models::{NodeId, RequestId};

/// Invalid data handed to [`ProblemBuilder`](crate::models::ProblemBuilder).
#[derive(Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// An instance needs at least one depot.
    NoDepot,
    /// Capacity must be at least one passenger.
    InvalidCapacity(i64),
    /// Cost per unit distance must be finite and non-negative.
    InvalidCostPerUnit(f64),
    /// A time window with `ready > due` or non-finite bounds.
    InvalidTimeWindow { ready: f64, due: f64 },
    /// Negative or non-finite service time, fee or ride time.
    InvalidValue { what: &'static str, value: f64 },
}

impl Display for ProblemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProblemError::NoDepot => write!(f, "instance has no depot"),
            ProblemError::InvalidCapacity(c) => write!(f, "invalid vehicle capacity {c}"),
            ProblemError::InvalidCostPerUnit(c) => {
                write!(f, "invalid travel cost per unit distance {c}")
            }
            ProblemError::InvalidTimeWindow { ready, due } => {
                write!(f, "invalid time window [{ready}, {due}]")
            }
            ProblemError::InvalidValue { what, value } => write!(f, "invalid {what} {value}"),
        }
    }
}

impl std::error::Error for ProblemError {}

/// Failure while reading an instance file.
#[derive(Debug)]
pub enum InstanceError {
    Io(std::io::Error),
    /// A field that is not a number.
    Parse {
        line: usize,
        field: usize,
        value: String,
    },
    /// A header count that is negative or fractional.
    InvalidCount {
        line: usize,
        field: usize,
        value: f64,
    },
    /// Fewer fields than the header counts require.
    TooShort {
        line: usize,
        expected: usize,
        found: usize,
    },
    /// The numbers parsed but describe an invalid problem.
    Problem { line: usize, source: ProblemError },
    /// No instance with the requested index in the file.
    NotFound(usize),
}

impl Display for InstanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceError::Io(e) => write!(f, "failed to read instances: {e}"),
            InstanceError::Parse { line, field, value } => {
                write!(f, "line {line}, field {field}: '{value}' is not a number")
            }
            InstanceError::InvalidCount { line, field, value } => {
                write!(f, "line {line}, field {field}: {value} is not a valid count")
            }
            InstanceError::TooShort {
                line,
                expected,
                found,
            } => write!(f, "line {line}: expected {expected} fields, found {found}"),
            InstanceError::Problem { line, source } => write!(f, "line {line}: {source}"),
            InstanceError::NotFound(idx) => write!(f, "instance {idx} not found"),
        }
    }
}

impl std::error::Error for InstanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InstanceError::Io(e) => Some(e),
            InstanceError::Problem { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InstanceError {
    fn from(e: std::io::Error) -> Self {
        InstanceError::Io(e)
    }
}

/// A structural inconsistency detected while editing a solution.
///
/// These signal a defect rather than an infeasible move; callers discard
/// the attempted edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolutionError {
    /// Request id outside `1..=R`.
    UnknownRequest(RequestId),
    /// Node id is not a transfer point.
    NotATransfer(NodeId),
    /// The request has no stops in any route.
    NotServed(RequestId),
    /// The request is already placed.
    AlreadyServed(RequestId),
    /// Removal freed a different number of stops than the request held.
    DetachMismatch {
        request: RequestId,
        expected: usize,
        detached: usize,
    },
    /// The request was detached but the remaining schedules did not settle.
    Unsettled(RequestId),
}

impl Display for SolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolutionError::UnknownRequest(r) => write!(f, "unknown request {r}"),
            SolutionError::NotATransfer(n) => write!(f, "node {n} is not a transfer point"),
            SolutionError::NotServed(r) => write!(f, "request {r} is not served"),
            SolutionError::AlreadyServed(r) => write!(f, "request {r} is already served"),
            SolutionError::DetachMismatch {
                request,
                expected,
                detached,
            } => write!(
                f,
                "removing request {request} detached {detached} stops, expected {expected}"
            ),
            SolutionError::Unsettled(r) => {
                write!(f, "schedules did not settle after removing request {r}")
            }
        }
    }
}

impl std::error::Error for SolutionError {}

/// Invalid solver configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Failure that stops a whole batch before any instance is solved.
#[derive(Debug)]
pub enum BatchError {
    Config(ConfigError),
    /// The worker pool could not be created.
    ThreadPool(String),
}

impl Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::Config(e) => write!(f, "{e}"),
            BatchError::ThreadPool(msg) => write!(f, "cannot build worker pool: {msg}"),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchError::Config(e) => Some(e),
            BatchError::ThreadPool(_) => None,
        }
    }
}

impl From<ConfigError> for BatchError {
    fn from(e: ConfigError) -> Self {
        BatchError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = SolutionError::DetachMismatch {
            request: 3,
            expected: 4,
            detached: 2,
        };
        assert_eq!(
            e.to_string(),
            "removing request 3 detached 2 stops, expected 4"
        );
        let e = InstanceError::TooShort {
            line: 2,
            expected: 30,
            found: 12,
        };
        assert_eq!(e.to_string(), "line 2: expected 30 fields, found 12");
        assert_eq!(
            ConfigError::new("max_iterations must be positive").to_string(),
            "invalid configuration: max_iterations must be positive"
        );
    }

    #[test]
    fn test_instance_error_source() {
        use std::error::Error;
        let e = InstanceError::Problem {
            line: 1,
            source: ProblemError::NoDepot,
        };
        assert!(e.source().is_some());
        assert!(InstanceError::NotFound(4).source().is_none());
    }
}
