use crate::direction::{Axis, Direction, GridIndex, PerDirection};
use crate::math::{distance, Point2d};
use crate::series::TimeSeries;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Normal};

/// Mean of the synthetic inter-arrival time at unobserved edge
/// approaches, in s.
const EDGE_ARRIVAL_MEAN: f64 = 10.0;

/// Standard deviation of the synthetic inter-arrival time in s.
const EDGE_ARRIVAL_STD: f64 = 5.0;

/// Assumed vehicle length when reconstructing a tail position, in m.
const ASSUMED_LENGTH: f64 = 5.0;

/// A departure event abstracted for consumption by estimators: no vehicle
/// identity, just where it was, where it is going and how fast.
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    pub position: Point2d,
    pub direction: Direction,
    /// Speed at the time of observation in m/s.
    pub speed: f64,
    /// The cell whose approach the vehicle is heading for.
    pub destination: GridIndex,
}

/// Shadow state of one unobserved approach queue.
///
/// The estimator never sees real vehicles. It turns observations into
/// predicted arrival timestamps and serves its counted queue at a fixed
/// service time whenever the real signal grants right-of-way.
pub struct QueueEstimator {
    direction: Direction,
    head_position: Point2d,
    /// Whether the approach enters from outside the grid; such approaches
    /// receive synthetic arrivals since nobody observes them.
    is_edge: bool,
    /// Estimated queue length in vehicles.
    length: usize,
    /// Predicted arrival times, not necessarily sorted.
    arrival_timestamps: Vec<f64>,
    /// Time one departure takes once the light is green, in s.
    service_time: f64,
    time: f64,
    /// Continuous green time served to the current head, in s.
    time_served: f64,
    queue_length: TimeSeries,
    arrivals: TimeSeries,
    departures: TimeSeries,
}

impl QueueEstimator {
    pub(crate) fn new(
        direction: Direction,
        head_position: Point2d,
        is_edge: bool,
        service_time: f64,
        steps: usize,
    ) -> Self {
        Self {
            direction,
            head_position,
            is_edge,
            length: 0,
            arrival_timestamps: vec![],
            service_time,
            time: 0.0,
            time_served: 0.0,
            queue_length: TimeSeries::with_capacity(steps),
            arrivals: TimeSeries::with_capacity(steps),
            departures: TimeSeries::with_capacity(steps),
        }
    }

    /// Estimated queue length per step.
    pub fn queue_length(&self) -> &TimeSeries {
        &self.queue_length
    }

    /// Cumulative estimated arrivals per step.
    pub fn arrivals(&self) -> &TimeSeries {
        &self.arrivals
    }

    /// Cumulative estimated departures per step.
    pub fn departures(&self) -> &TimeSeries {
        &self.departures
    }

    /// The rearmost point the counted queue is assumed to occupy.
    fn tail_position(&self) -> Point2d {
        self.head_position - (self.length as f64 * ASSUMED_LENGTH) * self.direction.unit()
    }

    /// Converts an observation into a predicted arrival timestamp.
    /// Stationary observations carry no usable travel time and are dropped.
    pub(crate) fn predict_arrival(&mut self, observation: &Observation) {
        if observation.speed <= 0.0 {
            return;
        }
        let eta = distance(observation.position, self.tail_position()) / observation.speed;
        self.arrival_timestamps.push(self.time + eta);
    }

    pub(crate) fn step(&mut self, dt: f64, saturation: f64, rng: &mut SmallRng) {
        if self.is_edge && self.length == 0 && self.arrival_timestamps.is_empty() {
            // Nobody observes traffic entering at the boundary, so assume
            // a background stream.
            let gap = Normal::new(EDGE_ARRIVAL_MEAN, EDGE_ARRIVAL_STD)
                .map(|n| n.sample(rng))
                .unwrap_or(EDGE_ARRIVAL_MEAN)
                .max(0.0);
            self.arrival_timestamps.push(self.time + gap);
        }

        let due = self.arrival_timestamps.len();
        self.arrival_timestamps.retain(|&t| t > self.time);
        let due = due - self.arrival_timestamps.len();
        self.length += due;
        self.arrivals.push_delta(due as f64);

        let mut departed = 0;
        if saturation <= 0.0 {
            self.time_served = 0.0;
        } else {
            self.time_served += dt;
            if self.length > 0 && self.time_served >= self.service_time {
                self.length -= 1;
                self.time_served = 0.0;
                departed = 1;
            }
        }
        self.departures.push_delta(departed as f64);
        self.queue_length.push(self.length as f64);
        self.time += dt;
    }
}

/// Shadow state of a whole unobserved intersection, fed from the network's
/// observation bus.
pub struct IntersectionEstimator {
    index: GridIndex,
    queues: PerDirection<QueueEstimator>,
}

impl IntersectionEstimator {
    pub(crate) fn new(index: GridIndex, queues: PerDirection<QueueEstimator>) -> Self {
        Self { index, queues }
    }

    /// The estimated state of one approach.
    pub fn queue(&self, direction: Direction) -> &QueueEstimator {
        &self.queues[direction]
    }

    /// Claims the observations destined for this intersection, leaving the
    /// rest on the bus. Observations whose direction has no matching
    /// record here are dropped rather than treated as an error.
    pub(crate) fn consume(&mut self, bus: &mut Vec<Observation>) {
        bus.retain(|observation| {
            if observation.destination == self.index {
                self.queues[observation.direction].predict_arrival(observation);
                false
            } else {
                true
            }
        });
    }

    pub(crate) fn step(&mut self, dt: f64, ns_saturation: f64, ew_saturation: f64, rng: &mut SmallRng) {
        for direction in Direction::ALL {
            let saturation = match direction.axis() {
                Axis::NS => ns_saturation,
                Axis::EW => ew_saturation,
            };
            self.queues[direction].step(dt, saturation, rng);
        }
    }
}
