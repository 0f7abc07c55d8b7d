//! Delimited numeric instance files, one instance per line.
//!
//! Fields are separated by commas, semicolons or whitespace. Empty lines and
//! lines starting with `#` are skipped. With `R` requests, `T` transfer
//! points and `D` depots a line holds `6 + 11R + 4T + 2D` numbers:
//!
//! | count | meaning |
//! |---|---|
//! | 6 | index, `R`, `T`, `D`, capacity, cost per unit distance |
//! | `T` | transfer fees |
//! | `2R` | pickup windows `e l` |
//! | `2R` | dropoff windows `e l` |
//! | `2(2R+T+D)` | `x y` of pickups, dropoffs, transfer points, depots |
//! | `2R+T` | service times of pickups, dropoffs, transfer points |
//! | `R` | maximum ride times |

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::error::InstanceError;
use crate::models::{Location, Problem, ProblemBuilder};

/// A parsed instance and its index.
#[derive(Debug, Clone)]
pub struct Instance {
    pub index: usize,
    pub problem: Problem,
}

/// Reads every instance of the file at `path`.
pub fn read_instances(path: impl AsRef<Path>) -> Result<Vec<Instance>, InstanceError> {
    let file = File::open(path.as_ref())?;
    read_instances_from(BufReader::new(file))
}

/// Reads every instance from `reader`.
pub fn read_instances_from<R: BufRead>(reader: R) -> Result<Vec<Instance>, InstanceError> {
    let mut instances = Vec::new();
    for (k, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        instances.push(parse_line(trimmed, k + 1)?);
    }
    debug!(count = instances.len(), "read instances");
    Ok(instances)
}

struct Fields<'a> {
    values: &'a [f64],
    line: usize,
}

impl Fields<'_> {
    fn count(&self, field: usize) -> Result<usize, InstanceError> {
        let value = self.values[field];
        if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
            return Err(InstanceError::InvalidCount {
                line: self.line,
                field,
                value,
            });
        }
        Ok(value as usize)
    }

    fn pair(&self, field: usize) -> (f64, f64) {
        (self.values[field], self.values[field + 1])
    }
}

/// Parses one instance line. `line` is the 1-based line number used in
/// error messages.
pub fn parse_line(text: &str, line: usize) -> Result<Instance, InstanceError> {
    let values = text
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(field, s)| {
            s.parse::<f64>().map_err(|_| InstanceError::Parse {
                line,
                field,
                value: s.to_string(),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    if values.len() < 6 {
        return Err(InstanceError::TooShort {
            line,
            expected: 6,
            found: values.len(),
        });
    }

    let f = Fields {
        values: &values,
        line,
    };
    let index = f.count(0)?;
    let r = f.count(1)?;
    let t = f.count(2)?;
    let d = f.count(3)?;
    let capacity = f.count(4)?;
    let cost_per_unit = values[5];

    let expected = [(11, r), (4, t), (2, d)]
        .iter()
        .fold(6usize, |acc, &(k, n)| acc.saturating_add(n.saturating_mul(k)));
    if values.len() < expected {
        return Err(InstanceError::TooShort {
            line,
            expected,
            found: values.len(),
        });
    }

    let fees = 6;
    let pickup_windows = fees + t;
    let dropoff_windows = pickup_windows + 2 * r;
    let coords = dropoff_windows + 2 * r;
    let services = coords + 2 * (2 * r + t + d);
    let ride_times = services + 2 * r + t;

    let xy = |node: usize| f.pair(coords + 2 * node);
    let mut builder = ProblemBuilder::new(capacity as i64, cost_per_unit);
    for k in 0..d {
        let (x, y) = xy(2 * r + t + k);
        builder = builder.depot(x, y);
    }
    for k in 0..r {
        let location = |node: usize, window: usize| {
            let (x, y) = xy(node);
            let (e, l) = f.pair(window + 2 * k);
            Location::new(x, y)
                .with_window(e, l)
                .with_service_time(values[services + node])
        };
        builder = builder.request(
            location(k, pickup_windows),
            location(r + k, dropoff_windows),
            values[ride_times + k],
        );
    }
    for k in 0..t {
        let node = 2 * r + k;
        let (x, y) = xy(node);
        builder = builder.transfer(x, y, values[services + node], values[fees + k]);
    }

    let problem = builder
        .build()
        .map_err(|source| InstanceError::Problem { line, source })?;
    Ok(Instance { index, problem })
}
