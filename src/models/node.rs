//! Node and time window types.

/// Stable 1-indexed node identifier, used to index distance and cost matrices.
pub type NodeId = usize;

/// Stable 1-indexed request identifier.
pub type RequestId = usize;

/// 0-indexed depot identifier.
pub type DepotId = usize;

/// A hard time window on the start of service at a node.
///
/// Service may start no earlier than `ready` (the vehicle waits) and no
/// later than `due`.
///
/// # Examples
///
/// ```
/// use u_darpt::models::TimeWindow;
///
/// let tw = TimeWindow::new(100.0, 200.0).unwrap();
/// assert!(tw.ready() <= tw.due());
/// assert!(TimeWindow::new(200.0, 100.0).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    ready: f64,
    due: f64,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// Returns `None` if `ready > due` or either value is non-finite.
    pub fn new(ready: f64, due: f64) -> Option<Self> {
        if !ready.is_finite() || !due.is_finite() || ready > due {
            return None;
        }
        Some(Self { ready, due })
    }

    /// Earliest allowable start of service.
    pub fn ready(&self) -> f64 {
        self.ready
    }

    /// Latest allowable start of service.
    pub fn due(&self) -> f64 {
        self.due
    }
}

/// What a node is, and which request or depot it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    /// Boarding location of a request.
    Pickup { request: RequestId },
    /// Alighting location of a request.
    Dropoff { request: RequestId },
    /// Hand-off point where one vehicle passes a passenger to another.
    Transfer { fee: f64 },
    /// Start location of a vehicle based at a depot.
    DepotStart { depot: DepotId },
    /// End location of a vehicle returning to a depot.
    DepotEnd { depot: DepotId },
}

/// A location in a dial-a-ride instance.
///
/// Nodes are immutable once the [`Problem`](super::Problem) is built. Only
/// pickups and dropoffs carry a hard time window; transfers and depots are
/// open all day.
///
/// # Examples
///
/// ```
/// use u_darpt::models::{Node, NodeKind, TimeWindow};
///
/// let pickup = Node::new(1, NodeKind::Pickup { request: 1 }, 3.0, 4.0)
///     .with_service_time(2.0)
///     .with_time_window(TimeWindow::new(10.0, 30.0).unwrap());
/// assert_eq!(pickup.e(), 10.0);
/// assert_eq!(pickup.l(), 30.0);
/// assert_eq!(pickup.request(), Some(1));
///
/// let depot = Node::new(9, NodeKind::DepotStart { depot: 0 }, 0.0, 0.0);
/// assert_eq!(depot.l(), f64::INFINITY);
/// ```
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    x: f64,
    y: f64,
    service_time: f64,
    time_window: Option<TimeWindow>,
}

impl Node {
    /// Creates a node without service time or time window.
    pub fn new(id: NodeId, kind: NodeKind, x: f64, y: f64) -> Self {
        Self {
            id,
            kind,
            x,
            y,
            service_time: 0.0,
            time_window: None,
        }
    }

    /// Sets the service time at this node.
    pub fn with_service_time(mut self, service_time: f64) -> Self {
        self.service_time = service_time;
        self
    }

    /// Sets a hard time window for this node.
    pub fn with_time_window(mut self, tw: TimeWindow) -> Self {
        self.time_window = Some(tw);
        self
    }

    pub(crate) fn set_time_window(&mut self, tw: TimeWindow) {
        self.time_window = Some(tw);
    }

    /// Node ID (1-indexed).
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn service_time(&self) -> f64 {
        self.service_time
    }

    /// Hard time window, if any.
    pub fn time_window(&self) -> Option<&TimeWindow> {
        self.time_window.as_ref()
    }

    /// Earliest start of service (`0` without a window).
    pub fn e(&self) -> f64 {
        self.time_window.map_or(0.0, |tw| tw.ready())
    }

    /// Latest start of service (`+inf` without a window).
    pub fn l(&self) -> f64 {
        self.time_window.map_or(f64::INFINITY, |tw| tw.due())
    }

    /// Request served at this node, for pickups and dropoffs.
    pub fn request(&self) -> Option<RequestId> {
        match self.kind {
            NodeKind::Pickup { request } | NodeKind::Dropoff { request } => Some(request),
            _ => None,
        }
    }

    /// Fee charged for using this node as a transfer point.
    pub fn transfer_fee(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Transfer { fee } => Some(fee),
            _ => None,
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self.kind, NodeKind::Transfer { .. })
    }

    pub fn is_depot(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::DepotStart { .. } | NodeKind::DepotEnd { .. }
        )
    }

    /// Euclidean distance to another node.
    pub fn distance_to(&self, other: &Node) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}
