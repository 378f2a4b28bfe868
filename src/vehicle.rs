use crate::direction::{Direction, GridIndex};
use crate::math::Point2d;

/// Cruising speed of a vehicle in m/s.
const FULL_SPEED: f64 = 14.0;

/// Length of a vehicle in m.
const LENGTH: f64 = 5.0;

/// A single vehicle travelling through the network.
///
/// Vehicles have two-state kinematics: either stopped or cruising at full
/// speed. `position` is the leading edge of the vehicle; the rear bumper
/// trails one vehicle length behind along the travel direction.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The position of the vehicle's leading edge in m.
    position: Point2d,
    /// The compass direction the vehicle travels in.
    direction: Direction,
    /// Current speed in m/s, either `0` or `full_speed`.
    speed: f64,
    /// The speed the vehicle cruises at when unobstructed, in m/s.
    full_speed: f64,
    /// Length of the vehicle in m.
    length: f64,
    /// Time spent stopped since the vehicle last departed a stop line, in s.
    wait: f64,
    /// Total time spent stopped over the vehicle's lifetime, in s.
    total_wait: f64,
    /// The grid cell whose approach queue the vehicle is heading for,
    /// or `None` once it is bound off-grid.
    destination: Option<GridIndex>,
}

impl Vehicle {
    pub(crate) fn new(position: Point2d, direction: Direction) -> Self {
        Self {
            position,
            direction,
            speed: FULL_SPEED,
            full_speed: FULL_SPEED,
            length: LENGTH,
            wait: 0.0,
            total_wait: 0.0,
            destination: None,
        }
    }

    /// The position of the vehicle's leading edge in m.
    pub fn position(&self) -> Point2d {
        self.position
    }

    /// The position of the vehicle's rear bumper in m.
    pub fn tail_position(&self) -> Point2d {
        self.position - self.length * self.direction.unit()
    }

    /// The compass direction the vehicle travels in.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The current speed of the vehicle in m/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The vehicle's unobstructed cruising speed in m/s.
    pub fn full_speed(&self) -> f64 {
        self.full_speed
    }

    /// The length of the vehicle in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Time spent stopped since last departing a stop line, in s.
    pub fn wait(&self) -> f64 {
        self.wait
    }

    /// Total time spent stopped over the vehicle's lifetime, in s.
    pub fn total_wait(&self) -> f64 {
        self.total_wait
    }

    /// The grid cell the vehicle is currently heading for.
    pub fn destination(&self) -> Option<GridIndex> {
        self.destination
    }

    pub(crate) fn set_destination(&mut self, destination: Option<GridIndex>) {
        self.destination = destination;
    }

    pub(crate) fn set_position(&mut self, position: Point2d) {
        self.position = position;
    }

    pub(crate) fn stop(&mut self) {
        self.speed = 0.0;
    }

    pub(crate) fn accelerate(&mut self) {
        self.speed = self.full_speed;
    }

    pub(crate) fn reset_wait(&mut self) {
        self.wait = 0.0;
    }

    /// Integrates the vehicle's position over `dt` seconds and accrues
    /// waiting time while it is stopped.
    pub(crate) fn step(&mut self, dt: f64) {
        if self.speed > 0.0 {
            self.position += self.speed * dt * self.direction.unit();
        } else {
            self.wait += dt;
            self.total_wait += dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_vehicle_accrues_wait() {
        let mut v = Vehicle::new(Point2d::new(0.0, 0.0), Direction::East);
        v.stop();
        v.step(0.5);
        v.step(0.5);
        assert_eq!(v.position(), Point2d::new(0.0, 0.0));
        assert_eq!(v.wait(), 1.0);
        v.reset_wait();
        assert_eq!(v.wait(), 0.0);
        assert_eq!(v.total_wait(), 1.0);
    }

    #[test]
    fn moving_vehicle_advances_along_direction() {
        let mut v = Vehicle::new(Point2d::new(0.0, 0.0), Direction::North);
        v.step(2.0);
        assert_eq!(v.position(), Point2d::new(0.0, 28.0));
        assert_eq!(v.tail_position(), Point2d::new(0.0, 23.0));
        assert_eq!(v.wait(), 0.0);
    }
}
