//! Feasibility checks on a committed [`Solution`].
//!
//! These read the schedule stored on each stop, so they are only meaningful
//! after the touched routes have been retimed.

use crate::models::{Problem, RouteNode, Solution};

use super::timing::EPSILON;

/// Returns `true` if the stop starts service before its window closes.
///
/// Depots and transfer points have no window and always pass.
#[inline]
pub fn is_time_window_feasible(problem: &Problem, stop: &RouteNode) -> bool {
    stop.start_of_service() <= problem.node(stop.node()).l() + EPSILON
}

/// Returns `true` if the load stays within `[0, capacity]` along the route.
pub fn is_capacity_feasible(problem: &Problem, solution: &Solution, route: usize) -> bool {
    let capacity = problem.capacity();
    solution
        .route_nodes(route)
        .all(|s| (0..=capacity).contains(&s.load()))
}

/// Returns `true` if every served request reaches its dropoff within its
/// maximum ride time after leaving the pickup.
pub fn is_max_ride_feasible(problem: &Problem, solution: &Solution) -> bool {
    solution.requests().iter().enumerate().all(|(i, req)| {
        match (req.pickup(), req.dropoff()) {
            (Some(p), Some(d)) => {
                let ride = solution.stop(d).start_of_service() - solution.stop(p).departure();
                ride <= problem.request(i + 1).max_ride_time() + EPSILON
            }
            _ => true,
        }
    })
}

/// Returns `true` if every transferred request is handed over between two
/// different vehicles and boards the second one only after leaving the
/// first.
pub fn is_transfer_order_feasible(solution: &Solution) -> bool {
    solution.requests().iter().all(|req| {
        match (req.transfer_dropoff(), req.transfer_pickup()) {
            (Some(td), Some(tp)) => {
                let (td, tp) = (solution.stop(td), solution.stop(tp));
                td.route() != tp.route() && tp.start_of_service() + EPSILON >= td.departure()
            }
            (None, None) => true,
            _ => false,
        }
    })
}

/// Travel cost of a route, depots included.
pub fn route_cost(problem: &Problem, solution: &Solution, route: usize) -> f64 {
    let stops = solution.route(route).stops();
    stops
        .windows(2)
        .map(|w| problem.cost(solution.stop(w[0]).node(), solution.stop(w[1]).node()))
        .sum()
}

/// Checks every constraint on the whole solution: windows, loads, ride
/// times and transfer ordering.
pub fn is_feasible(problem: &Problem, solution: &Solution) -> bool {
    let routes_ok = (0..solution.num_routes()).all(|r| {
        is_capacity_feasible(problem, solution, r)
            && solution
                .route_nodes(r)
                .all(|s| is_time_window_feasible(problem, s))
    });
    routes_ok && is_max_ride_feasible(problem, solution) && is_transfer_order_feasible(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, Placement, ProblemBuilder, RouteNodeType};

    fn problem() -> Problem {
        ProblemBuilder::new(1, 1.0)
            .depot(0.0, 0.0)
            .request(
                Location::new(10.0, 0.0).with_window(0.0, 50.0),
                Location::new(30.0, 0.0).with_window(0.0, 100.0),
                40.0,
            )
            .request(
                Location::new(0.0, 10.0).with_window(0.0, 50.0),
                Location::new(0.0, 30.0).with_window(0.0, 35.0),
                40.0,
            )
            .transfer(20.0, 0.0, 0.0, 5.0)
            .with_window_tightening(false)
            .build()
            .expect("valid")
    }

    #[test]
    fn test_singletons_feasible() {
        let p = problem();
        let sol = Solution::with_singleton_routes(&p);
        assert!(is_feasible(&p, &sol));
        assert!((route_cost(&p, &sol, 0) - 60.0).abs() < 1e-10);
    }

    #[test]
    fn test_capacity_infeasible() {
        let p = problem();
        let mut sol = Solution::with_singleton_routes(&p);
        sol.remove_request(&p, 2).expect("served");
        // both passengers on board of a one-seat vehicle
        sol.insert_pair(
            &p,
            Placement::in_route(0, 2, 2),
            2,
            (2, RouteNodeType::Pickup),
            (4, RouteNodeType::Dropoff),
        );
        assert!(!is_capacity_feasible(&p, &sol, 0));
        assert!(!is_feasible(&p, &sol));
    }

    #[test]
    fn test_time_window_infeasible() {
        let p = problem();
        let mut sol = Solution::with_singleton_routes(&p);
        sol.remove_request(&p, 2).expect("served");
        // serve request 2 after request 1: dropoff 4 misses its window
        let end = sol.route(0).len() - 1;
        sol.insert_pair(
            &p,
            Placement::in_route(0, end, end),
            2,
            (2, RouteNodeType::Pickup),
            (4, RouteNodeType::Dropoff),
        );
        assert!(is_capacity_feasible(&p, &sol, 0));
        assert!(!is_feasible(&p, &sol));
    }

    #[test]
    fn test_transfer_ordering_and_ride() {
        let p = problem();
        let t = p.transfers()[0];
        let mut sol = Solution::empty(&p);
        sol.open_transfer(t).expect("transfer");
        sol.insert_pair(
            &p,
            Placement::new_route(),
            1,
            (1, RouteNodeType::Pickup),
            (t, RouteNodeType::TransferDropoff),
        );
        sol.insert_pair(
            &p,
            Placement::new_route(),
            1,
            (t, RouteNodeType::TransferPickup),
            (3, RouteNodeType::Dropoff),
        );
        assert!(is_transfer_order_feasible(&sol));
        // second vehicle drives 20 to the transfer, waits for the first (arrives 20)
        // then 10 to the dropoff: ride = 30 - 10 = 20
        assert!(is_max_ride_feasible(&p, &sol));
        assert!(is_feasible(&p, &sol));
        assert!((sol.cost(&p) - (20.0 + 20.0 + 20.0 + 10.0 + 30.0 + 5.0)).abs() < 1e-10);
    }
}
