//! Route and stop types.

use super::node::{NodeId, RequestId};

/// Index of a [`RouteNode`] in a solution's stop arena.
///
/// Stable for as long as the stop stays in the solution; freed slots are
/// reused by later insertions.
pub type StopId = usize;

/// The role a stop plays in its route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteNodeType {
    Pickup,
    Dropoff,
    /// Passenger boards at a transfer point after being handed over.
    TransferPickup,
    /// Passenger alights at a transfer point to be handed over.
    TransferDropoff,
    DepotStart,
    DepotEnd,
}

impl RouteNodeType {
    /// Change in passengers on board caused by this stop.
    pub fn load_delta(self) -> i32 {
        match self {
            RouteNodeType::Pickup | RouteNodeType::TransferPickup => 1,
            RouteNodeType::Dropoff | RouteNodeType::TransferDropoff => -1,
            RouteNodeType::DepotStart | RouteNodeType::DepotEnd => 0,
        }
    }

    pub fn is_depot(self) -> bool {
        matches!(self, RouteNodeType::DepotStart | RouteNodeType::DepotEnd)
    }

    pub fn is_transfer(self) -> bool {
        matches!(
            self,
            RouteNodeType::TransferPickup | RouteNodeType::TransferDropoff
        )
    }
}

/// Schedule and load at one stop.
///
/// `departure = start_of_service + service_time`,
/// `waiting = start_of_service - arrival` and `slack = l - start_of_service`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timing {
    pub arrival: f64,
    pub start_of_service: f64,
    pub departure: f64,
    pub waiting: f64,
    pub slack: f64,
    /// Passengers on board when leaving the stop.
    pub load: i32,
}

/// One visit of a vehicle: a node, its role and its computed schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteNode {
    pub(crate) node: NodeId,
    pub(crate) kind: RouteNodeType,
    pub(crate) request: Option<RequestId>,
    pub(crate) route: usize,
    pub(crate) timing: Timing,
}

impl RouteNode {
    pub(crate) fn new(node: NodeId, kind: RouteNodeType, request: Option<RequestId>) -> Self {
        Self {
            node,
            kind,
            request,
            route: 0,
            timing: Timing::default(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn kind(&self) -> RouteNodeType {
        self.kind
    }

    /// Request served here, absent for depots.
    pub fn request(&self) -> Option<RequestId> {
        self.request
    }

    /// Index of the route holding this stop.
    pub fn route(&self) -> usize {
        self.route
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn arrival(&self) -> f64 {
        self.timing.arrival
    }

    pub fn start_of_service(&self) -> f64 {
        self.timing.start_of_service
    }

    pub fn departure(&self) -> f64 {
        self.timing.departure
    }

    pub fn waiting(&self) -> f64 {
        self.timing.waiting
    }

    pub fn slack(&self) -> f64 {
        self.timing.slack
    }

    pub fn load(&self) -> i32 {
        self.timing.load
    }
}

/// The ordered stops of one vehicle, from its start depot to its end depot.
///
/// Stops live in the owning [`Solution`](super::Solution)'s arena; a route
/// only holds their ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    vehicle: usize,
    stops: Vec<StopId>,
}

impl Route {
    pub(crate) fn new(vehicle: usize, stops: Vec<StopId>) -> Self {
        Self { vehicle, stops }
    }

    /// Vehicle serving this route.
    pub fn vehicle(&self) -> usize {
        self.vehicle
    }

    /// Stop ids in visit order, depots included.
    pub fn stops(&self) -> &[StopId] {
        &self.stops
    }

    pub(crate) fn stops_mut(&mut self) -> &mut Vec<StopId> {
        &mut self.stops
    }

    /// Number of stops, depots included.
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// Returns `true` if the route visits nothing but its depots.
    pub fn is_empty(&self) -> bool {
        self.stops.len() <= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_delta() {
        assert_eq!(RouteNodeType::Pickup.load_delta(), 1);
        assert_eq!(RouteNodeType::TransferPickup.load_delta(), 1);
        assert_eq!(RouteNodeType::Dropoff.load_delta(), -1);
        assert_eq!(RouteNodeType::TransferDropoff.load_delta(), -1);
        assert_eq!(RouteNodeType::DepotStart.load_delta(), 0);
        assert_eq!(RouteNodeType::DepotEnd.load_delta(), 0);
    }

    #[test]
    fn test_kind_predicates() {
        assert!(RouteNodeType::DepotEnd.is_depot());
        assert!(!RouteNodeType::Pickup.is_depot());
        assert!(RouteNodeType::TransferDropoff.is_transfer());
        assert!(!RouteNodeType::Dropoff.is_transfer());
    }

    #[test]
    fn test_route_empty() {
        let r = Route::new(3, vec![0, 1]);
        assert!(r.is_empty());
        assert_eq!(r.vehicle(), 3);
        let r = Route::new(3, vec![0, 2, 3, 1]);
        assert!(!r.is_empty());
        assert_eq!(r.len(), 4);
    }
}
