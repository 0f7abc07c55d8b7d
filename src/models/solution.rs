//! Solution: stop arena, routes, per-request stop references and transfer
//! bookkeeping.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::SolutionError;
use crate::evaluation::{self, Visit};

use super::node::{NodeId, RequestId};
use super::problem::Problem;
use super::route::{Route, RouteNode, RouteNodeType, StopId};

/// The stops currently realizing one request.
///
/// A direct ride uses `pickup` and `dropoff` in one route. A transferred
/// ride also uses `transfer_dropoff` (same vehicle as `pickup`) and
/// `transfer_pickup` (same vehicle as `dropoff`) at the node `transfer`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolutionRequest {
    pub(crate) pickup: Option<StopId>,
    pub(crate) dropoff: Option<StopId>,
    pub(crate) transfer_pickup: Option<StopId>,
    pub(crate) transfer_dropoff: Option<StopId>,
    pub(crate) transfer: Option<NodeId>,
}

impl SolutionRequest {
    pub fn pickup(&self) -> Option<StopId> {
        self.pickup
    }

    pub fn dropoff(&self) -> Option<StopId> {
        self.dropoff
    }

    pub fn transfer_pickup(&self) -> Option<StopId> {
        self.transfer_pickup
    }

    pub fn transfer_dropoff(&self) -> Option<StopId> {
        self.transfer_dropoff
    }

    /// Transfer node used by this request, if transferred.
    pub fn transfer(&self) -> Option<NodeId> {
        self.transfer
    }

    pub fn has_transfer(&self) -> bool {
        self.transfer_pickup.is_some()
    }

    /// Returns `true` if no stop realizes this request.
    pub fn is_unserved(&self) -> bool {
        self.stops().next().is_none()
    }

    /// All stop ids realizing this request.
    pub fn stops(&self) -> impl Iterator<Item = StopId> {
        [
            self.pickup,
            self.transfer_dropoff,
            self.transfer_pickup,
            self.dropoff,
        ]
        .into_iter()
        .flatten()
    }
}

/// Where to put two stops of one request within one route.
///
/// `first` is inserted before the stop currently at index `first`, `second`
/// before the stop currently at index `second` (`first <= second`, both in
/// `1..route.len()`). With `route: None` a new vehicle is opened and both
/// indices are `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub route: Option<usize>,
    pub first: usize,
    pub second: usize,
}

impl Placement {
    /// Both stops on a fresh vehicle.
    pub fn new_route() -> Self {
        Self {
            route: None,
            first: 1,
            second: 1,
        }
    }

    pub fn in_route(route: usize, first: usize, second: usize) -> Self {
        Self {
            route: Some(route),
            first,
            second,
        }
    }
}

/// A complete or partial dial-a-ride solution.
///
/// Stops live in an arena addressed by [`StopId`]; routes hold ordered stop
/// ids, and each [`SolutionRequest`] holds optional stop ids. Cloning copies
/// the arena, routes and request table, which is how hypothetical edits are
/// evaluated without touching the original.
///
/// # Examples
///
/// ```
/// use u_darpt::models::{Location, ProblemBuilder, Solution};
///
/// let problem = ProblemBuilder::new(2, 1.0)
///     .depot(0.0, 0.0)
///     .request(Location::new(1.0, 0.0), Location::new(2.0, 0.0), 100.0)
///     .request(Location::new(0.0, 1.0), Location::new(0.0, 2.0), 100.0)
///     .build()
///     .unwrap();
///
/// let sol = Solution::with_singleton_routes(&problem);
/// assert_eq!(sol.num_routes(), 2);
/// assert_eq!(sol.num_served(), 2);
/// assert!((sol.cost(&problem) - 8.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    stops: Vec<RouteNode>,
    vacant: Vec<StopId>,
    routes: Vec<Route>,
    requests: Vec<SolutionRequest>,
    open_transfers: BTreeSet<NodeId>,
    closed_transfers: BTreeSet<NodeId>,
    next_vehicle: usize,
}

impl Solution {
    /// A solution serving nothing, with every transfer closed.
    pub fn empty(problem: &Problem) -> Self {
        Self {
            stops: Vec::new(),
            vacant: Vec::new(),
            routes: Vec::new(),
            requests: vec![SolutionRequest::default(); problem.num_requests()],
            open_transfers: BTreeSet::new(),
            closed_transfers: problem.transfers().iter().copied().collect(),
            next_vehicle: 0,
        }
    }

    /// One dedicated vehicle per request.
    ///
    /// Requests that cannot be served even alone stay unserved.
    pub fn with_singleton_routes(problem: &Problem) -> Self {
        let mut sol = Self::empty(problem);
        let mut timings = Vec::new();
        for req in problem.requests() {
            let visits = sol.candidate_visits(
                problem,
                None,
                Placement::new_route(),
                Visit::new(req.pickup(), RouteNodeType::Pickup, Some(req.id())),
                Visit::new(req.dropoff(), RouteNodeType::Dropoff, Some(req.id())),
            );
            if evaluation::evaluate_sequence(problem, &visits, &mut timings).is_err() {
                warn!(request = req.id(), "request cannot be served by a dedicated vehicle");
                continue;
            }
            sol.insert_pair(
                problem,
                Placement::new_route(),
                req.id(),
                (req.pickup(), RouteNodeType::Pickup),
                (req.dropoff(), RouteNodeType::Dropoff),
            );
        }
        sol
    }

    /// Copies `other` into `self`, reusing allocations.
    pub fn copy_from(&mut self, other: &Solution) {
        self.clone_from(other);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, index: usize) -> &Route {
        &self.routes[index]
    }

    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    pub fn stop(&self, id: StopId) -> &RouteNode {
        &self.stops[id]
    }

    /// Stop at `position` in route `route`.
    pub fn stop_at(&self, route: usize, position: usize) -> &RouteNode {
        &self.stops[self.routes[route].stops()[position]]
    }

    /// Stops of a route in visit order.
    pub fn route_nodes(&self, route: usize) -> impl Iterator<Item = &RouteNode> {
        self.routes[route].stops().iter().map(move |&s| &self.stops[s])
    }

    pub fn request(&self, id: RequestId) -> &SolutionRequest {
        &self.requests[id - 1]
    }

    pub fn requests(&self) -> &[SolutionRequest] {
        &self.requests
    }

    pub fn is_served(&self, id: RequestId) -> bool {
        !self.requests[id - 1].is_unserved()
    }

    /// Ids of all served requests, ascending.
    pub fn served_requests(&self) -> Vec<RequestId> {
        (1..=self.requests.len()).filter(|&r| self.is_served(r)).collect()
    }

    /// Ids of all unserved requests, ascending.
    pub fn unserved_requests(&self) -> Vec<RequestId> {
        (1..=self.requests.len()).filter(|&r| !self.is_served(r)).collect()
    }

    pub fn num_served(&self) -> usize {
        self.requests.iter().filter(|r| !r.is_unserved()).count()
    }

    pub fn open_transfers(&self) -> &BTreeSet<NodeId> {
        &self.open_transfers
    }

    pub fn closed_transfers(&self) -> &BTreeSet<NodeId> {
        &self.closed_transfers
    }

    /// Makes a closed transfer point available for insertions.
    pub fn open_transfer(&mut self, transfer: NodeId) -> Result<(), SolutionError> {
        if !self.closed_transfers.remove(&transfer) && !self.open_transfers.contains(&transfer) {
            return Err(SolutionError::NotATransfer(transfer));
        }
        self.open_transfers.insert(transfer);
        Ok(())
    }

    /// Excludes a transfer point from new insertions.
    ///
    /// Requests already routed through it are left in place.
    pub fn close_transfer(&mut self, transfer: NodeId) -> Result<(), SolutionError> {
        if !self.open_transfers.remove(&transfer) && !self.closed_transfers.contains(&transfer) {
            return Err(SolutionError::NotATransfer(transfer));
        }
        self.closed_transfers.insert(transfer);
        Ok(())
    }

    /// Transfer nodes used by at least one served request.
    pub fn used_transfers(&self) -> BTreeSet<NodeId> {
        self.requests.iter().filter_map(|r| r.transfer).collect()
    }

    pub fn is_transfer_used(&self, transfer: NodeId) -> bool {
        self.requests.iter().any(|r| r.transfer == Some(transfer))
    }

    /// Requests currently handed over at `transfer`.
    pub fn requests_through(&self, transfer: NodeId) -> Vec<RequestId> {
        (1..=self.requests.len())
            .filter(|&r| self.requests[r - 1].transfer == Some(transfer))
            .collect()
    }

    /// Total travel cost plus the fee of every transfer point in use.
    pub fn cost(&self, problem: &Problem) -> f64 {
        let travel: f64 = (0..self.routes.len())
            .map(|r| evaluation::route_cost(problem, self, r))
            .sum();
        let fees: f64 = self
            .used_transfers()
            .into_iter()
            .filter_map(|t| problem.node(t).transfer_fee())
            .sum();
        travel + fees
    }

    /// Latest start of service over all stops, `0` for an empty solution.
    pub fn latest_service_time(&self) -> f64 {
        self.routes
            .iter()
            .flat_map(|r| r.stops().iter())
            .map(|&s| self.stops[s].timing.start_of_service)
            .fold(0.0, f64::max)
    }

    /// Current stops of a route as candidate visits, with the release times
    /// and ride origins that other routes impose on them.
    pub fn route_visits(&self, route: usize) -> Vec<Visit> {
        let mut out = Vec::with_capacity(self.routes[route].len() + 2);
        self.route_visits_into(route, &mut out);
        out
    }

    pub(crate) fn route_visits_into(&self, route: usize, out: &mut Vec<Visit>) {
        out.clear();
        for &s in self.routes[route].stops() {
            let stop = &self.stops[s];
            let mut visit = Visit::new(stop.node, stop.kind, stop.request);
            if let Some(req) = stop.request.map(|r| &self.requests[r - 1]) {
                match stop.kind {
                    RouteNodeType::TransferPickup => {
                        if let Some(td) = req.transfer_dropoff {
                            visit.release = self.stops[td].timing.departure;
                        }
                    }
                    RouteNodeType::Dropoff if req.has_transfer() => {
                        visit.ride_origin = req.pickup.map(|p| self.stops[p].timing.departure);
                    }
                    _ => {}
                }
            }
            out.push(visit);
        }
    }

    /// The visits `route` would have after placing `first` and `second`,
    /// with boundary depots re-anchored to the nearest depot of the new
    /// boundary stops.
    pub fn candidate_visits(
        &self,
        problem: &Problem,
        current: Option<&[Visit]>,
        placement: Placement,
        first: Visit,
        second: Visit,
    ) -> Vec<Visit> {
        let mut out = Vec::new();
        let empty;
        let base = match (current, placement.route) {
            (Some(v), _) => v,
            (None, Some(r)) => {
                empty = self.route_visits(r);
                &empty[..]
            }
            (None, None) => {
                empty = vec![
                    Visit::new(first.node, RouteNodeType::DepotStart, None),
                    Visit::new(first.node, RouteNodeType::DepotEnd, None),
                ];
                &empty[..]
            }
        };
        splice_visits(problem, base, placement.first, first, placement.second, second, &mut out);
        out
    }

    pub(crate) fn alloc_stop(&mut self, stop: RouteNode) -> StopId {
        match self.vacant.pop() {
            Some(id) => {
                self.stops[id] = stop;
                id
            }
            None => {
                self.stops.push(stop);
                self.stops.len() - 1
            }
        }
    }

    fn free_stop(&mut self, id: StopId) {
        self.vacant.push(id);
    }

    /// Opens a new vehicle based at the depot nearest to `node`.
    fn open_route(&mut self, problem: &Problem, node: NodeId) -> usize {
        let depot = *problem.nearest_depot(node);
        let start = self.alloc_stop(RouteNode::new(depot.start(), RouteNodeType::DepotStart, None));
        let end = self.alloc_stop(RouteNode::new(depot.end(), RouteNodeType::DepotEnd, None));
        let index = self.routes.len();
        self.stops[start].route = index;
        self.stops[end].route = index;
        self.routes.push(Route::new(self.next_vehicle, vec![start, end]));
        self.next_vehicle += 1;
        index
    }

    /// Inserts two stops of `request` as described by `placement`, updates
    /// the request's references and reschedules affected routes.
    ///
    /// Returns the index of the route that received the stops and whether
    /// schedule propagation converged.
    pub fn insert_pair(
        &mut self,
        problem: &Problem,
        placement: Placement,
        request: RequestId,
        first: (NodeId, RouteNodeType),
        second: (NodeId, RouteNodeType),
    ) -> (usize, bool) {
        let route = match placement.route {
            Some(r) => r,
            None => self.open_route(problem, first.0),
        };
        let a = self.alloc_stop(RouteNode::new(first.0, first.1, Some(request)));
        let b = self.alloc_stop(RouteNode::new(second.0, second.1, Some(request)));
        self.stops[a].route = route;
        self.stops[b].route = route;
        {
            let stops = self.routes[route].stops_mut();
            stops.insert(placement.second, b);
            stops.insert(placement.first, a);
        }
        for (id, (node, kind)) in [(a, first), (b, second)] {
            let entry = &mut self.requests[request - 1];
            match kind {
                RouteNodeType::Pickup => entry.pickup = Some(id),
                RouteNodeType::Dropoff => entry.dropoff = Some(id),
                RouteNodeType::TransferPickup => {
                    entry.transfer_pickup = Some(id);
                    entry.transfer = Some(node);
                }
                RouteNodeType::TransferDropoff => {
                    entry.transfer_dropoff = Some(id);
                    entry.transfer = Some(node);
                }
                RouteNodeType::DepotStart | RouteNodeType::DepotEnd => {}
            }
        }
        self.reanchor_depots(problem, route);
        let converged = self.refresh(problem, &[route]);
        (route, converged)
    }

    /// Detaches every stop of `request`, deleting routes left with depots
    /// only and rescheduling the others.
    ///
    /// Returns [`SolutionError::Unsettled`] when rescheduling does not
    /// converge. The request is detached even then, and the stale schedules
    /// mean the solution should be discarded.
    pub fn remove_request(
        &mut self,
        problem: &Problem,
        request: RequestId,
    ) -> Result<(), SolutionError> {
        if request == 0 || request > self.requests.len() {
            return Err(SolutionError::UnknownRequest(request));
        }
        let entry = std::mem::take(&mut self.requests[request - 1]);
        let expected = if entry.has_transfer() { 4 } else { 2 };
        let ids: Vec<StopId> = entry.stops().collect();
        if ids.is_empty() {
            return Err(SolutionError::NotServed(request));
        }

        let mut touched: Vec<usize> = Vec::with_capacity(2);
        let mut detached = 0;
        for &id in &ids {
            let route = self.stops[id].route;
            let stops = self.routes[route].stops_mut();
            if let Some(pos) = stops.iter().position(|&s| s == id) {
                stops.remove(pos);
                self.free_stop(id);
                detached += 1;
                if !touched.contains(&route) {
                    touched.push(route);
                }
            }
        }
        if detached != expected {
            return Err(SolutionError::DetachMismatch {
                request,
                expected,
                detached,
            });
        }

        let vehicles: Vec<usize> = touched.iter().map(|&r| self.routes[r].vehicle()).collect();
        touched.sort_unstable_by(|a, b| b.cmp(a));
        let mut deleted = false;
        for &r in &touched {
            if self.routes[r].is_empty() {
                let route = self.routes.remove(r);
                for &s in route.stops() {
                    self.free_stop(s);
                }
                deleted = true;
            }
        }
        if deleted {
            self.reindex_routes();
        }

        let survivors: Vec<usize> = vehicles
            .iter()
            .filter_map(|&v| self.routes.iter().position(|r| r.vehicle() == v))
            .collect();
        for &r in &survivors {
            self.reanchor_depots(problem, r);
        }
        if !self.refresh(problem, &survivors) {
            return Err(SolutionError::Unsettled(request));
        }
        Ok(())
    }

    fn reindex_routes(&mut self) {
        for (index, route) in self.routes.iter().enumerate() {
            for &s in route.stops() {
                self.stops[s].route = index;
            }
        }
    }

    /// Moves the boundary depots of `route` to the depots nearest to its
    /// first and last passenger stops.
    fn reanchor_depots(&mut self, problem: &Problem, route: usize) {
        let stops = self.routes[route].stops();
        if stops.len() < 3 {
            return;
        }
        let (start, first) = (stops[0], stops[1]);
        let (last, end) = (stops[stops.len() - 2], stops[stops.len() - 1]);
        let start_node = problem.nearest_depot(self.stops[first].node).start();
        let end_node = problem.nearest_depot(self.stops[last].node).end();
        self.stops[start].node = start_node;
        self.stops[end].node = end_node;
    }

    /// Recomputes the schedule of `route` from index `from` to its end.
    pub fn retime(&mut self, problem: &Problem, route: usize, from: usize) {
        let len = self.routes[route].len();
        for k in from..len {
            let id = self.routes[route].stops()[k];
            let prev = if k == 0 {
                None
            } else {
                let p = self.routes[route].stops()[k - 1];
                Some((self.stops[p].node, self.stops[p].timing))
            };
            let stop = &self.stops[id];
            let release = match (stop.kind, stop.request) {
                (RouteNodeType::TransferPickup, Some(r)) => self.requests[r - 1]
                    .transfer_dropoff
                    .map_or(0.0, |td| self.stops[td].timing.departure),
                _ => 0.0,
            };
            let timing = evaluation::step(
                problem,
                prev.as_ref().map(|(n, t)| (*n, t)),
                stop.node,
                stop.kind,
                release,
            );
            self.stops[id].timing = timing;
        }
    }

    /// Retimes `routes`, then every route whose transfer pickups depend on a
    /// transfer dropoff whose departure moved, until nothing moves.
    ///
    /// Returns `false` when propagation does not settle, which happens when
    /// vehicles wait on each other in a cycle.
    pub fn refresh(&mut self, problem: &Problem, routes: &[usize]) -> bool {
        let mut queue: Vec<usize> = routes.to_vec();
        let mut budget = 4 * self.routes.len() + 16;
        while let Some(route) = queue.pop() {
            if budget == 0 {
                return false;
            }
            budget -= 1;

            let before: Vec<(StopId, f64)> = self.routes[route]
                .stops()
                .iter()
                .filter(|&&s| self.stops[s].kind == RouteNodeType::TransferDropoff)
                .map(|&s| (s, self.stops[s].timing.departure))
                .collect();
            self.retime(problem, route, 0);

            for (s, departure) in before {
                if self.stops[s].timing.departure == departure {
                    continue;
                }
                let partner = self.stops[s]
                    .request
                    .and_then(|r| self.requests[r - 1].transfer_pickup)
                    .map(|tp| self.stops[tp].route);
                if let Some(p) = partner {
                    if !queue.contains(&p) {
                        queue.push(p);
                    }
                }
            }
        }
        true
    }

    /// Checks the structural invariants: every passenger stop is referenced
    /// by exactly one request field, routes start and end at depots, stop
    /// route indices are current, and each vehicle visits a pickup before
    /// its dropoff.
    pub fn is_consistent(&self) -> bool {
        let mut referenced = 0;
        for (i, req) in self.requests.iter().enumerate() {
            let r = i + 1;
            for s in req.stops() {
                referenced += 1;
                if self.stops[s].request != Some(r) {
                    return false;
                }
            }
            if req.has_transfer() != req.transfer_dropoff.is_some()
                || req.has_transfer() != req.transfer.is_some()
            {
                return false;
            }
            let position = |s: StopId| {
                let route = self.stops[s].route;
                self.routes[route].stops().iter().position(|&x| x == s).map(|p| (route, p))
            };
            let pairs = if req.has_transfer() {
                vec![(req.pickup, req.transfer_dropoff), (req.transfer_pickup, req.dropoff)]
            } else {
                vec![(req.pickup, req.dropoff)]
            };
            for (a, b) in pairs {
                match (a.map(position), b.map(position)) {
                    (None, None) => {}
                    (Some(Some((ra, pa))), Some(Some((rb, pb)))) if ra == rb && pa < pb => {}
                    _ => return false,
                }
            }
            if req.has_transfer() {
                let a = req.pickup.map(|s| self.stops[s].route);
                let b = req.dropoff.map(|s| self.stops[s].route);
                if a == b {
                    return false;
                }
            }
        }

        let mut passenger_stops = 0;
        for (index, route) in self.routes.iter().enumerate() {
            let stops = route.stops();
            if stops.len() < 3 {
                return false;
            }
            if self.stops[stops[0]].kind != RouteNodeType::DepotStart
                || self.stops[stops[stops.len() - 1]].kind != RouteNodeType::DepotEnd
            {
                return false;
            }
            for &s in stops {
                if self.stops[s].route != index {
                    return false;
                }
                if !self.stops[s].kind.is_depot() {
                    passenger_stops += 1;
                }
            }
        }
        referenced == passenger_stops
    }
}

/// Builds `base` with `first` inserted before index `i` and `second` before
/// index `j` (`i <= j`), re-anchoring the boundary depots.
pub(crate) fn splice_visits(
    problem: &Problem,
    base: &[Visit],
    i: usize,
    first: Visit,
    j: usize,
    second: Visit,
    out: &mut Vec<Visit>,
) {
    out.clear();
    out.extend_from_slice(&base[..i]);
    out.push(first);
    out.extend_from_slice(&base[i..j]);
    out.push(second);
    out.extend_from_slice(&base[j..]);
    let n = out.len();
    out[0].node = problem.nearest_depot(out[1].node).start();
    out[n - 1].node = problem.nearest_depot(out[n - 2].node).end();
}
