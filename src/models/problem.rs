//! Immutable dial-a-ride problem instance.

use crate::distance::DistanceMatrix;
use crate::error::ProblemError;

use super::node::{DepotId, Node, NodeId, NodeKind, RequestId, TimeWindow};

/// A transportation request: carry one passenger from `pickup` to `dropoff`
/// within `max_ride_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    id: RequestId,
    pickup: NodeId,
    dropoff: NodeId,
    max_ride_time: f64,
}

impl Request {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn pickup(&self) -> NodeId {
        self.pickup
    }

    pub fn dropoff(&self) -> NodeId {
        self.dropoff
    }

    /// Maximum ride time `L`.
    pub fn max_ride_time(&self) -> f64 {
        self.max_ride_time
    }
}

/// A depot location, represented by a start node and an end node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Depot {
    id: DepotId,
    start: NodeId,
    end: NodeId,
}

impl Depot {
    pub fn id(&self) -> DepotId {
        self.id
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn end(&self) -> NodeId {
        self.end
    }
}

/// Location, window and service time of a pickup or dropoff, as handed to
/// [`ProblemBuilder::request`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    x: f64,
    y: f64,
    ready: f64,
    due: f64,
    service_time: f64,
}

impl Location {
    /// A location open over `[0, 1e9]` with no service time.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ready: 0.0,
            due: 1e9,
            service_time: 0.0,
        }
    }

    pub fn with_window(mut self, ready: f64, due: f64) -> Self {
        self.ready = ready;
        self.due = due;
        self
    }

    pub fn with_service_time(mut self, service_time: f64) -> Self {
        self.service_time = service_time;
        self
    }
}

#[derive(Debug, Clone)]
struct RequestSpec {
    pickup: Location,
    dropoff: Location,
    max_ride_time: f64,
}

#[derive(Debug, Clone)]
struct TransferSpec {
    x: f64,
    y: f64,
    service_time: f64,
    fee: f64,
}

/// Builds a [`Problem`], assigning node ids and precomputing matrices.
///
/// Node ids are laid out as pickups `1..=R`, dropoffs `R+1..=2R`, transfers
/// `2R+1..=2R+T`, then `D` depot starts and `D` depot ends.
///
/// # Examples
///
/// ```
/// use u_darpt::models::{Location, ProblemBuilder};
///
/// let problem = ProblemBuilder::new(3, 1.0)
///     .depot(0.0, 0.0)
///     .request(
///         Location::new(1.0, 0.0).with_window(0.0, 50.0),
///         Location::new(4.0, 0.0).with_window(0.0, 80.0),
///         30.0,
///     )
///     .transfer(2.0, 2.0, 1.0, 5.0)
///     .build()
///     .unwrap();
///
/// assert_eq!(problem.num_requests(), 1);
/// assert_eq!(problem.num_nodes(), 5);
/// assert!((problem.distance(1, 2) - 3.0).abs() < 1e-10);
/// assert_eq!(problem.transfers(), &[3]);
/// ```
#[derive(Debug, Clone)]
pub struct ProblemBuilder {
    capacity: i64,
    cost_per_unit: f64,
    depots: Vec<(f64, f64)>,
    requests: Vec<RequestSpec>,
    transfers: Vec<TransferSpec>,
    tighten_windows: bool,
}

impl ProblemBuilder {
    /// Starts an instance with the given vehicle capacity and travel cost
    /// per unit distance.
    pub fn new(capacity: i64, cost_per_unit: f64) -> Self {
        Self {
            capacity,
            cost_per_unit,
            depots: Vec::new(),
            requests: Vec::new(),
            transfers: Vec::new(),
            tighten_windows: true,
        }
    }

    pub fn depot(mut self, x: f64, y: f64) -> Self {
        self.depots.push((x, y));
        self
    }

    pub fn request(mut self, pickup: Location, dropoff: Location, max_ride_time: f64) -> Self {
        self.requests.push(RequestSpec {
            pickup,
            dropoff,
            max_ride_time,
        });
        self
    }

    pub fn transfer(mut self, x: f64, y: f64, service_time: f64, fee: f64) -> Self {
        self.transfers.push(TransferSpec {
            x,
            y,
            service_time,
            fee,
        });
        self
    }

    /// Enables or disables time window tightening (enabled by default).
    pub fn with_window_tightening(mut self, on: bool) -> Self {
        self.tighten_windows = on;
        self
    }

    pub fn build(self) -> Result<Problem, ProblemError> {
        if self.depots.is_empty() {
            return Err(ProblemError::NoDepot);
        }
        if self.capacity < 1 || self.capacity > i32::MAX as i64 {
            return Err(ProblemError::InvalidCapacity(self.capacity));
        }
        if !self.cost_per_unit.is_finite() || self.cost_per_unit < 0.0 {
            return Err(ProblemError::InvalidCostPerUnit(self.cost_per_unit));
        }
        for &(x, y) in &self.depots {
            check_coordinates(x, y)?;
        }
        for entry in &self.transfers {
            check_coordinates(entry.x, entry.y)?;
        }

        let r = self.requests.len();
        let t = self.transfers.len();
        let d = self.depots.len();
        let mut nodes = Vec::with_capacity(2 * r + t + 2 * d);

        for (i, entry) in self.requests.iter().enumerate() {
            nodes.push(stop_node(nodes.len() + 1, NodeKind::Pickup { request: i + 1 }, &entry.pickup)?);
        }
        for (i, entry) in self.requests.iter().enumerate() {
            nodes.push(stop_node(nodes.len() + 1, NodeKind::Dropoff { request: i + 1 }, &entry.dropoff)?);
        }
        let mut transfers = Vec::with_capacity(t);
        for entry in &self.transfers {
            check_value("transfer service time", entry.service_time)?;
            check_value("transfer fee", entry.fee)?;
            let id = nodes.len() + 1;
            nodes.push(
                Node::new(id, NodeKind::Transfer { fee: entry.fee }, entry.x, entry.y)
                    .with_service_time(entry.service_time),
            );
            transfers.push(id);
        }
        let first_start = nodes.len() + 1;
        for (k, &(x, y)) in self.depots.iter().enumerate() {
            nodes.push(Node::new(nodes.len() + 1, NodeKind::DepotStart { depot: k }, x, y));
        }
        let first_end = nodes.len() + 1;
        for (k, &(x, y)) in self.depots.iter().enumerate() {
            nodes.push(Node::new(nodes.len() + 1, NodeKind::DepotEnd { depot: k }, x, y));
        }
        let depots: Vec<Depot> = (0..d)
            .map(|k| Depot {
                id: k,
                start: first_start + k,
                end: first_end + k,
            })
            .collect();

        let mut requests = Vec::with_capacity(r);
        for (i, entry) in self.requests.iter().enumerate() {
            check_value("max ride time", entry.max_ride_time)?;
            requests.push(Request {
                id: i + 1,
                pickup: i + 1,
                dropoff: r + i + 1,
                max_ride_time: entry.max_ride_time,
            });
        }

        let distances = DistanceMatrix::from_nodes(&nodes);
        let costs = distances.scaled(self.cost_per_unit);
        let depot_starts: Vec<NodeId> = depots.iter().map(|dp| dp.start).collect();
        let nearest_depot = nodes
            .iter()
            .map(|n| match n.kind() {
                NodeKind::DepotStart { depot } | NodeKind::DepotEnd { depot } => depot,
                _ => distances
                    .nearest(n.id(), &depot_starts)
                    .map_or(0, |start| start - first_start),
            })
            .collect();

        let mut problem = Problem {
            max_cost: costs.max(),
            max_distance: distances.max(),
            nodes,
            requests,
            transfers,
            depots,
            capacity: self.capacity as i32,
            cost_per_unit: self.cost_per_unit,
            distances,
            costs,
            nearest_depot,
        };
        if self.tighten_windows {
            problem.tighten_windows();
        }
        Ok(problem)
    }
}

fn check_value(what: &'static str, value: f64) -> Result<(), ProblemError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ProblemError::InvalidValue { what, value });
    }
    Ok(())
}

/// Coordinates may be negative but must be finite.
fn check_coordinates(x: f64, y: f64) -> Result<(), ProblemError> {
    match [x, y].into_iter().find(|v| !v.is_finite()) {
        Some(value) => Err(ProblemError::InvalidValue {
            what: "coordinate",
            value,
        }),
        None => Ok(()),
    }
}

fn stop_node(id: NodeId, kind: NodeKind, loc: &Location) -> Result<Node, ProblemError> {
    check_coordinates(loc.x, loc.y)?;
    check_value("service time", loc.service_time)?;
    let tw = TimeWindow::new(loc.ready, loc.due).ok_or(ProblemError::InvalidTimeWindow {
        ready: loc.ready,
        due: loc.due,
    })?;
    Ok(Node::new(id, kind, loc.x, loc.y)
        .with_service_time(loc.service_time)
        .with_time_window(tw))
}

/// A dial-a-ride instance with transfers.
///
/// Read-only after construction and shared by reference across workers.
/// Travel time equals travel distance; travel cost is distance times the
/// cost per unit distance.
#[derive(Debug, Clone)]
pub struct Problem {
    nodes: Vec<Node>,
    requests: Vec<Request>,
    transfers: Vec<NodeId>,
    depots: Vec<Depot>,
    capacity: i32,
    cost_per_unit: f64,
    distances: DistanceMatrix,
    costs: DistanceMatrix,
    nearest_depot: Vec<DepotId>,
    max_cost: f64,
    max_distance: f64,
}

impl Problem {
    pub fn num_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Node by 1-indexed id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id - 1]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Request by 1-indexed id.
    pub fn request(&self, id: RequestId) -> &Request {
        &self.requests[id - 1]
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Node ids of all transfer points.
    pub fn transfers(&self) -> &[NodeId] {
        &self.transfers
    }

    pub fn depots(&self) -> &[Depot] {
        &self.depots
    }

    pub fn capacity(&self) -> i32 {
        self.capacity
    }

    pub fn cost_per_unit(&self) -> f64 {
        self.cost_per_unit
    }

    /// Travel distance (and time) between two nodes.
    #[inline]
    pub fn distance(&self, from: NodeId, to: NodeId) -> f64 {
        self.distances.get(from, to)
    }

    /// Travel cost between two nodes.
    #[inline]
    pub fn cost(&self, from: NodeId, to: NodeId) -> f64 {
        self.costs.get(from, to)
    }

    /// Depot closest to the given node.
    pub fn nearest_depot(&self, node: NodeId) -> &Depot {
        &self.depots[self.nearest_depot[node - 1]]
    }

    /// Largest pairwise travel cost.
    pub fn max_cost(&self) -> f64 {
        self.max_cost
    }

    /// Largest pairwise travel distance.
    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Requests that cannot be served even by a dedicated vehicle.
    ///
    /// A request is infeasible when its direct ride exceeds `L`, when its
    /// dropoff window closes before the earliest possible arrival from the
    /// pickup, or when the pickup window closes before a vehicle from the
    /// nearest depot can reach it.
    pub fn infeasible_requests(&self) -> Vec<RequestId> {
        self.requests
            .iter()
            .filter(|req| {
                let p = self.node(req.pickup);
                let d = self.node(req.dropoff);
                let direct = self.distance(req.pickup, req.dropoff);
                let reach = self.distance(self.nearest_depot(req.pickup).start, req.pickup);
                direct > req.max_ride_time
                    || p.e() + p.service_time() + direct > d.l()
                    || reach > p.l()
            })
            .map(|req| req.id)
            .collect()
    }

    /// Narrows pickup and dropoff windows using ride time and direct travel
    /// time (Cordeau, 2006). Windows that would become empty are left as is.
    fn tighten_windows(&mut self) {
        for i in 0..self.requests.len() {
            let req = self.requests[i].clone();
            let direct = self.distance(req.pickup, req.dropoff);
            let p = self.node(req.pickup);
            let d = self.node(req.dropoff);
            let s_p = p.service_time();

            let e_p = p.e().max(d.e() - req.max_ride_time - s_p);
            let l_p = p.l().min(d.l() - direct - s_p);
            let e_d = d.e().max(e_p + s_p + direct);
            let l_d = d.l().min(l_p + s_p + req.max_ride_time);

            if let (Some(pw), Some(dw)) = (TimeWindow::new(e_p, l_p), TimeWindow::new(e_d, l_d)) {
                self.nodes[req.pickup - 1].set_time_window(pw);
                self.nodes[req.dropoff - 1].set_time_window(dw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_depot_problem() -> Problem {
        ProblemBuilder::new(2, 2.0)
            .depot(0.0, 0.0)
            .depot(100.0, 0.0)
            .request(
                Location::new(10.0, 0.0).with_window(0.0, 100.0),
                Location::new(90.0, 0.0).with_window(0.0, 200.0),
                100.0,
            )
            .transfer(50.0, 0.0, 2.0, 4.0)
            .with_window_tightening(false)
            .build()
            .expect("valid problem")
    }

    #[test]
    fn test_id_layout() {
        let p = two_depot_problem();
        assert_eq!(p.num_nodes(), 2 + 1 + 4);
        assert!(matches!(p.node(1).kind(), NodeKind::Pickup { request: 1 }));
        assert!(matches!(p.node(2).kind(), NodeKind::Dropoff { request: 1 }));
        assert!(p.node(3).is_transfer());
        assert!(matches!(p.node(4).kind(), NodeKind::DepotStart { depot: 0 }));
        assert!(matches!(p.node(5).kind(), NodeKind::DepotStart { depot: 1 }));
        assert!(matches!(p.node(6).kind(), NodeKind::DepotEnd { depot: 0 }));
        assert!(matches!(p.node(7).kind(), NodeKind::DepotEnd { depot: 1 }));
        assert_eq!(p.request(1).pickup(), 1);
        assert_eq!(p.request(1).dropoff(), 2);
    }

    #[test]
    fn test_nearest_depot() {
        let p = two_depot_problem();
        assert_eq!(p.nearest_depot(1).id(), 0);
        assert_eq!(p.nearest_depot(2).id(), 1);
        assert_eq!(p.nearest_depot(2).start(), 5);
        assert_eq!(p.nearest_depot(2).end(), 7);
        assert_eq!(p.nearest_depot(7).id(), 1);
    }

    #[test]
    fn test_cost_scaled() {
        let p = two_depot_problem();
        assert!((p.distance(1, 2) - 80.0).abs() < 1e-10);
        assert!((p.cost(1, 2) - 160.0).abs() < 1e-10);
        assert!((p.max_distance() - 100.0).abs() < 1e-10);
        assert!((p.max_cost() - 200.0).abs() < 1e-10);
    }

    #[test]
    fn test_build_errors() {
        assert_eq!(
            ProblemBuilder::new(1, 1.0).build().unwrap_err(),
            ProblemError::NoDepot
        );
        assert_eq!(
            ProblemBuilder::new(0, 1.0).depot(0.0, 0.0).build().unwrap_err(),
            ProblemError::InvalidCapacity(0)
        );
        let err = ProblemBuilder::new(1, 1.0)
            .depot(0.0, 0.0)
            .request(
                Location::new(0.0, 0.0).with_window(10.0, 5.0),
                Location::new(1.0, 0.0),
                10.0,
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ProblemError::InvalidTimeWindow { .. }));
    }

    #[test]
    fn test_rejects_non_finite_coordinates() {
        let coordinate = |b: ProblemBuilder| {
            matches!(
                b.build(),
                Err(ProblemError::InvalidValue { what: "coordinate", .. })
            )
        };
        let stop = Location::new(1.0, 0.0);
        assert!(coordinate(ProblemBuilder::new(1, 1.0).depot(f64::NAN, 0.0)));
        assert!(coordinate(
            ProblemBuilder::new(1, 1.0)
                .depot(0.0, 0.0)
                .request(Location::new(0.0, f64::INFINITY), stop, 10.0)
        ));
        assert!(coordinate(
            ProblemBuilder::new(1, 1.0)
                .depot(0.0, 0.0)
                .request(stop, Location::new(f64::NEG_INFINITY, 2.0), 10.0)
        ));
        assert!(coordinate(
            ProblemBuilder::new(1, 1.0)
                .depot(0.0, 0.0)
                .transfer(f64::NAN, 0.0, 0.0, 0.0)
        ));

        let negative = ProblemBuilder::new(1, 1.0)
            .depot(-5.0, -5.0)
            .request(Location::new(-1.0, 0.0), stop, 10.0)
            .build()
            .expect("negative coordinates are valid");
        assert!(negative.max_distance().is_finite());
    }

    #[test]
    fn test_window_tightening() {
        let p = ProblemBuilder::new(1, 1.0)
            .depot(0.0, 0.0)
            .request(
                Location::new(0.0, 0.0).with_window(0.0, 100.0).with_service_time(1.0),
                Location::new(10.0, 0.0).with_window(50.0, 60.0),
                20.0,
            )
            .build()
            .expect("valid");
        let pickup = p.node(1);
        let dropoff = p.node(2);
        // l_p = 60 - 10 - 1, e_p = 50 - 20 - 1
        assert!((pickup.l() - 49.0).abs() < 1e-10);
        assert!((pickup.e() - 29.0).abs() < 1e-10);
        assert!((dropoff.e() - 50.0).abs() < 1e-10);
        assert!((dropoff.l() - 60.0).abs() < 1e-10);
    }

    #[test]
    fn test_infeasible_requests() {
        let p = ProblemBuilder::new(1, 1.0)
            .depot(0.0, 0.0)
            .request(Location::new(0.0, 0.0), Location::new(5.0, 0.0), 10.0)
            .request(Location::new(0.0, 0.0), Location::new(50.0, 0.0), 10.0)
            .build()
            .expect("valid");
        assert_eq!(p.infeasible_requests(), vec![2]);
    }
}
