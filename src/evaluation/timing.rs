//! Schedule propagation along a stop sequence.
//!
//! A stop's schedule depends only on its predecessor's departure, the travel
//! time between them, the stop's own window and an optional release time
//! (the departure of the matching transfer dropoff, for a transfer pickup).
//! [`step`] computes one stop; [`retime`] applies it along a route of a
//! solution; [`evaluate_sequence`] applies it along a candidate sequence that
//! is not yet part of any solution, checking feasibility on the way.

use crate::models::{NodeId, Problem, RequestId, RouteNodeType, Solution, Timing};

/// Tolerance used by every feasibility comparison on times.
pub const EPSILON: f64 = 1e-6;

/// A stop of a candidate sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visit {
    pub node: NodeId,
    pub kind: RouteNodeType,
    pub request: Option<RequestId>,
    /// Earliest start imposed from outside the sequence.
    pub release: f64,
    /// Departure of the request's pickup when it lies in another route.
    pub ride_origin: Option<f64>,
}

impl Visit {
    pub fn new(node: NodeId, kind: RouteNodeType, request: Option<RequestId>) -> Self {
        Self {
            node,
            kind,
            request,
            release: 0.0,
            ride_origin: None,
        }
    }

    pub fn with_release(mut self, release: f64) -> Self {
        self.release = release;
        self
    }

    pub fn with_ride_origin(mut self, origin: Option<f64>) -> Self {
        self.ride_origin = origin;
        self
    }
}

/// Which constraint a candidate sequence breaks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    TimeWindow,
    Capacity,
    MaxRide,
}

/// First violation found while scheduling a candidate sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceViolation {
    /// Index of the offending stop in the sequence.
    pub position: usize,
    pub kind: ViolationKind,
}

/// Computes the schedule of `node` visited right after `prev`.
///
/// Without a predecessor the vehicle is at the node at time zero with an
/// empty cabin.
#[inline]
pub fn step(
    problem: &Problem,
    prev: Option<(NodeId, &Timing)>,
    node: NodeId,
    kind: RouteNodeType,
    release: f64,
) -> Timing {
    let n = problem.node(node);
    let (arrival, load) = match prev {
        Some((from, t)) => (t.departure + problem.distance(from, node), t.load),
        None => (0.0, 0),
    };
    let start = arrival.max(n.e()).max(release);
    Timing {
        arrival,
        start_of_service: start,
        departure: start + n.service_time(),
        waiting: start - arrival,
        slack: n.l() - start,
        load: load + kind.load_delta(),
    }
}

/// Recomputes the schedule of `route` from stop index `from` to its end.
///
/// The stop before `from` must already be correct. Transfer pickups are held
/// until their transfer dropoff has departed, as currently scheduled.
pub fn retime(problem: &Problem, solution: &mut Solution, route: usize, from: usize) {
    solution.retime(problem, route, from);
}

/// Schedules a candidate sequence into `timings` and returns its travel cost.
///
/// Checks every stop's window, the cabin load and the ride time of every
/// request whose pickup (or pickup departure via
/// [`Visit::ride_origin`]) is known. Stops on the first violation.
pub fn evaluate_sequence(
    problem: &Problem,
    visits: &[Visit],
    timings: &mut Vec<Timing>,
) -> Result<f64, SequenceViolation> {
    timings.clear();
    let capacity = problem.capacity();
    let mut cost = 0.0;

    for (k, visit) in visits.iter().enumerate() {
        let prev = if k == 0 {
            None
        } else {
            cost += problem.cost(visits[k - 1].node, visit.node);
            Some((visits[k - 1].node, &timings[k - 1]))
        };
        let t = step(problem, prev, visit.node, visit.kind, visit.release);

        if t.start_of_service > problem.node(visit.node).l() + EPSILON {
            return Err(SequenceViolation {
                position: k,
                kind: ViolationKind::TimeWindow,
            });
        }
        if t.load < 0 || t.load > capacity {
            return Err(SequenceViolation {
                position: k,
                kind: ViolationKind::Capacity,
            });
        }
        if let Some(origin) = ride_origin(visits, timings, k) {
            let request = visit.request.map(|r| problem.request(r));
            if let Some(req) = request {
                if t.start_of_service - origin > req.max_ride_time() + EPSILON {
                    return Err(SequenceViolation {
                        position: k,
                        kind: ViolationKind::MaxRide,
                    });
                }
            }
        }
        timings.push(t);
    }
    Ok(cost)
}

/// Departure of the pickup that the ride ending at `visits[k]` started from.
fn ride_origin(visits: &[Visit], timings: &[Timing], k: usize) -> Option<f64> {
    let visit = &visits[k];
    let same_route = || {
        let request = visit.request?;
        (0..k)
            .rev()
            .find(|&m| visits[m].request == Some(request) && visits[m].kind == RouteNodeType::Pickup)
            .map(|m| timings[m].departure)
    };
    match visit.kind {
        RouteNodeType::Dropoff => visit.ride_origin.or_else(same_route),
        RouteNodeType::TransferDropoff => same_route().or(visit.ride_origin),
        _ => None,
    }
}

/// Travel cost of a candidate sequence, without scheduling it.
pub fn sequence_cost(problem: &Problem, visits: &[Visit]) -> f64 {
    visits
        .windows(2)
        .map(|w| problem.cost(w[0].node, w[1].node))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, ProblemBuilder};

    fn line_problem() -> Problem {
        // depot at 0, pickup 1 at 10 (window [20, 40]), dropoff 1 at 20
        ProblemBuilder::new(1, 1.0)
            .depot(0.0, 0.0)
            .request(
                Location::new(10.0, 0.0).with_window(20.0, 40.0).with_service_time(2.0),
                Location::new(20.0, 0.0).with_window(0.0, 100.0).with_service_time(1.0),
                30.0,
            )
            .request(
                Location::new(15.0, 0.0).with_window(0.0, 100.0),
                Location::new(18.0, 0.0).with_window(0.0, 100.0),
                30.0,
            )
            .transfer(12.0, 0.0, 0.0, 0.0)
            .with_window_tightening(false)
            .build()
            .expect("valid")
    }

    fn direct(problem: &Problem, request: RequestId) -> Vec<Visit> {
        let req = problem.request(request);
        let depot = problem.depots()[0];
        vec![
            Visit::new(depot.start(), RouteNodeType::DepotStart, None),
            Visit::new(req.pickup(), RouteNodeType::Pickup, Some(request)),
            Visit::new(req.dropoff(), RouteNodeType::Dropoff, Some(request)),
            Visit::new(depot.end(), RouteNodeType::DepotEnd, None),
        ]
    }

    #[test]
    fn test_step_waits_for_window() {
        let p = line_problem();
        let mut timings = Vec::new();
        let cost = evaluate_sequence(&p, &direct(&p, 1), &mut timings).expect("feasible");
        assert!((cost - 40.0).abs() < 1e-10);
        let pickup = timings[1];
        // arrive at 10, wait until 20, serve 2
        assert!((pickup.arrival - 10.0).abs() < 1e-10);
        assert!((pickup.start_of_service - 20.0).abs() < 1e-10);
        assert!((pickup.waiting - 10.0).abs() < 1e-10);
        assert!((pickup.departure - 22.0).abs() < 1e-10);
        assert!((pickup.slack - 20.0).abs() < 1e-10);
        assert_eq!(pickup.load, 1);
        let dropoff = timings[2];
        assert!((dropoff.arrival - 32.0).abs() < 1e-10);
        assert_eq!(dropoff.load, 0);
    }

    #[test]
    fn test_capacity_violation() {
        let p = line_problem();
        let depot = p.depots()[0];
        let visits = vec![
            Visit::new(depot.start(), RouteNodeType::DepotStart, None),
            Visit::new(1, RouteNodeType::Pickup, Some(1)),
            Visit::new(2, RouteNodeType::Pickup, Some(2)),
            Visit::new(4, RouteNodeType::Dropoff, Some(2)),
            Visit::new(3, RouteNodeType::Dropoff, Some(1)),
            Visit::new(depot.end(), RouteNodeType::DepotEnd, None),
        ];
        let mut timings = Vec::new();
        let err = evaluate_sequence(&p, &visits, &mut timings).unwrap_err();
        assert_eq!(
            err,
            SequenceViolation {
                position: 2,
                kind: ViolationKind::Capacity
            }
        );
    }

    #[test]
    fn test_time_window_violation_with_release() {
        let p = line_problem();
        let mut visits = direct(&p, 1);
        visits[1] = visits[1].with_release(45.0);
        let mut timings = Vec::new();
        let err = evaluate_sequence(&p, &visits, &mut timings).unwrap_err();
        assert_eq!(err.position, 1);
        assert_eq!(err.kind, ViolationKind::TimeWindow);
    }

    #[test]
    fn test_ride_origin_from_other_route() {
        let p = line_problem();
        let depot = p.depots()[0];
        let transfer = p.transfers()[0];
        // handed over at the transfer, picked up long ago by another vehicle
        let visits = vec![
            Visit::new(depot.start(), RouteNodeType::DepotStart, None),
            Visit::new(transfer, RouteNodeType::TransferPickup, Some(2)),
            Visit::new(4, RouteNodeType::Dropoff, Some(2)).with_ride_origin(Some(-100.0)),
            Visit::new(depot.end(), RouteNodeType::DepotEnd, None),
        ];
        let mut timings = Vec::new();
        let err = evaluate_sequence(&p, &visits, &mut timings).unwrap_err();
        assert_eq!(err.kind, ViolationKind::MaxRide);
    }

    #[test]
    fn test_sequence_cost_matches_evaluation() {
        let p = line_problem();
        let visits = direct(&p, 2);
        let mut timings = Vec::new();
        let cost = evaluate_sequence(&p, &visits, &mut timings).expect("feasible");
        assert!((cost - sequence_cost(&p, &visits)).abs() < 1e-10);
    }
}
