use crate::direction::Direction;
use crate::math::Point2d;
use crate::{VehicleId, VehicleSet};

/// Minimum bumper-to-bumper gap between queued vehicles in m.
pub(crate) const MIN_GAP: f64 = 2.0;

/// A FIFO queue of vehicles on one approach to an intersection.
///
/// The queue spans from `head_position` (the stop line) back towards
/// `edge_position` (where the approach road begins). `tail_position` is
/// the point behind which the next arriving vehicle must join; it trails
/// the last queued vehicle, or decays behind a departing one until that
/// vehicle has cleared the stop line.
#[derive(Clone, Debug)]
pub struct Queue {
    /// Queued vehicles in arrival order; the head of the queue is first.
    vehicles: Vec<VehicleId>,
    /// The travel direction of the approach.
    direction: Direction,
    /// The stop line of the approach in m.
    head_position: Point2d,
    /// Where the approach road begins in m.
    edge_position: Point2d,
    /// The point behind which an arriving vehicle must join, in m.
    tail_position: Point2d,
    /// The vehicle most recently released past the stop line, if it has
    /// not yet cleared the queue's frontage.
    departing: Option<VehicleId>,
    /// The vehicle most recently appended, while it is still driving up.
    last_arriving: Option<VehicleId>,
}

impl Queue {
    pub(crate) fn new(direction: Direction, head_position: Point2d, edge_position: Point2d) -> Self {
        Self {
            vehicles: vec![],
            direction,
            head_position,
            edge_position,
            tail_position: head_position,
            departing: None,
            last_arriving: None,
        }
    }

    /// The travel direction of the approach.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The stop line of the approach in m.
    pub fn head_position(&self) -> Point2d {
        self.head_position
    }

    /// Where the approach road begins in m.
    pub fn edge_position(&self) -> Point2d {
        self.edge_position
    }

    /// The point behind which an arriving vehicle must join, in m.
    pub fn tail_position(&self) -> Point2d {
        self.tail_position
    }

    /// The number of queued vehicles.
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    /// Whether the queue has no members.
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// The queued vehicles in order, head of the queue first.
    pub fn members(&self) -> &[VehicleId] {
        &self.vehicles
    }

    pub(crate) fn last_arriving(&self) -> Option<VehicleId> {
        self.last_arriving
    }

    /// Appends a vehicle to the back of the queue.
    ///
    /// A vehicle already queued here is ignored. An entrant that would
    /// breach the minimum gap to the current tail is pushed back behind it.
    pub(crate) fn append(&mut self, id: VehicleId, vehicles: &mut VehicleSet) {
        if self.vehicles.contains(&id) {
            return;
        }
        if let Some(&last) = self.vehicles.last() {
            let limit = vehicles[last].tail_position() - MIN_GAP * self.direction.unit();
            let vehicle = &mut vehicles[id];
            if self.direction.progress(vehicle.position(), limit) > 0.0 {
                vehicle.set_position(limit);
            }
        }
        self.vehicles.push(id);
        self.last_arriving = Some(id);
    }

    /// Releases the head vehicle if it has reached the stop line.
    pub(crate) fn remove(&mut self, vehicles: &VehicleSet) -> Option<VehicleId> {
        let &head = self.vehicles.first()?;
        let at_line = self
            .direction
            .progress(vehicles[head].position(), self.head_position)
            >= 0.0;
        if !at_line {
            return None;
        }
        self.vehicles.remove(0);
        self.departing = Some(head);
        if self.last_arriving == Some(head) {
            self.last_arriving = None;
        }
        Some(head)
    }

    /// Recomputes the tail position from the queue's current members.
    pub(crate) fn update_tail(&mut self, vehicles: &VehicleSet) {
        if let Some(&last) = self.vehicles.last() {
            self.tail_position = vehicles[last].tail_position();
            return;
        }
        if let Some(id) = self.departing {
            // The departing vehicle may have exited the network already.
            if let Some(vehicle) = vehicles.get(id) {
                let trail = vehicle.tail_position() - MIN_GAP * self.direction.unit();
                if self.direction.progress(trail, self.head_position) < 0.0 {
                    self.tail_position = trail;
                    return;
                }
            }
            self.departing = None;
        }
        self.tail_position = self.head_position;
    }

    /// Adjusts member speeds for one step. The head is held exactly at the
    /// stop line until released, so a queued vehicle never enters the
    /// intersection box; followers hold the minimum gap to the vehicle
    /// ahead regardless of the signal.
    pub(crate) fn regulate(&mut self, dt: f64, saturation: f64, vehicles: &mut VehicleSet) {
        let mut leader_tail: Option<Point2d> = None;
        for &id in &self.vehicles {
            let vehicle = &mut vehicles[id];
            match leader_tail {
                None => {
                    let past = self
                        .direction
                        .progress(vehicle.position(), self.head_position);
                    if past > -(vehicle.full_speed() * dt) {
                        // At the line, or this step's travel would cross it.
                        vehicle.set_position(self.head_position);
                        if saturation > 0.0 {
                            vehicle.accelerate();
                        } else {
                            vehicle.stop();
                        }
                    } else if vehicle.speed() <= 0.0 {
                        vehicle.accelerate();
                    }
                }
                Some(tail) => {
                    let limit = tail - MIN_GAP * self.direction.unit();
                    let past = self.direction.progress(vehicle.position(), limit);
                    if past > -(vehicle.full_speed() * dt) {
                        if past > 0.0 {
                            vehicle.set_position(limit);
                        }
                        vehicle.stop();
                    } else {
                        vehicle.accelerate();
                    }
                }
            }
            leader_tail = Some(vehicle.tail_position());
        }
    }
}
