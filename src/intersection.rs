use crate::config::{IntersectionConfig, SignalPolicy};
use crate::direction::{Axis, Direction, GridIndex, PerDirection};
use crate::estimator::{IntersectionEstimator, Observation, QueueEstimator};
use crate::math::Point2d;
use crate::queue::Queue;
use crate::series::TimeSeries;
use crate::signal::{Sensed, Signal};
use crate::simulator::QueueSimulator;
use crate::vehicle::Vehicle;
use crate::{VehicleId, VehicleSet};
use anyhow::{bail, Result};
use rand::rngs::SmallRng;
use smallvec::SmallVec;

/// Length of the approach road leading to each stop line, in m.
const APPROACH_LENGTH: f64 = 50.0;

/// A signal-controlled intersection of two perpendicular roads.
///
/// Four approach queues feed the intersection box; the two axis signals
/// arbitrate right-of-way, additionally gated on the box being clear of
/// crossing traffic from the other axis.
pub struct FourWayIntersection {
    index: GridIndex,
    /// Centre of the intersection box in m.
    position: Point2d,
    queues: PerDirection<QueueSimulator>,
    signal_ns: Signal,
    signal_ew: Signal,
    /// Whether departures here are published as observations.
    observable: bool,
    /// Shadow model run when the intersection is not observable.
    estimator: Option<IntersectionEstimator>,
    /// Eastbound/westbound vehicles currently inside the box.
    horizontal: Vec<VehicleId>,
    /// Northbound/southbound vehicles currently inside the box.
    vertical: Vec<VehicleId>,
    /// Total queued vehicles per step, over all four approaches.
    queued_series: TimeSeries,
    arrival_count: u32,
    arrivals_on_green: u32,
    clearance_ns: ClearanceTracker,
    clearance_ew: ClearanceTracker,
    step_index: usize,
}

/// Running average of queue growth per unit time between consecutive
/// red-to-green switches of one axis.
#[derive(Default)]
struct ClearanceTracker {
    last_switch_step: Option<usize>,
    queued_at_switch: f64,
    sum: f64,
    samples: u32,
}

impl ClearanceTracker {
    fn record(&mut self, step: usize, queued: f64, dt: f64) {
        if let Some(previous) = self.last_switch_step {
            let duration = (step - previous) as f64 * dt;
            if duration > 0.0 {
                self.sum += (queued - self.queued_at_switch) / duration;
                self.samples += 1;
            }
        }
        self.last_switch_step = Some(step);
        self.queued_at_switch = queued;
    }

    fn average(&self) -> f64 {
        if self.samples > 0 {
            self.sum / self.samples as f64
        } else {
            f64::NAN
        }
    }
}

impl FourWayIntersection {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: GridIndex,
        position: Point2d,
        size: f64,
        config: &IntersectionConfig,
        edges: PerDirection<bool>,
        departure_rate: f64,
        steps: usize,
        observable: bool,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let head = |d: Direction| {
            position - (size / 2.0) * d.unit() + (size / 4.0) * d.right().unit()
        };

        let mut queues = Vec::with_capacity(4);
        for d in Direction::ALL {
            let queue = Queue::new(d, head(d), head(d) - APPROACH_LENGTH * d.unit());
            queues.push(QueueSimulator::new(
                queue,
                &config.arrivals[d],
                departure_rate,
                steps,
                rng,
            )?);
        }
        let mut queues = queues.into_iter();
        let queues = PerDirection::from_fn(|_| queues.next().unwrap());

        let (signal_ns, signal_ew) = match (&config.ns, &config.ew) {
            (SignalPolicy::Mirror, SignalPolicy::Mirror) => {
                bail!("intersection ({}, {}) mirrors both axes", index.row, index.col)
            }
            (SignalPolicy::Mirror, primary) => {
                let ew = build_signal(primary, position, steps, rng)?;
                let ns = Signal::mirror_of(&ew, steps);
                (ns, ew)
            }
            (primary, _) => {
                let ns = build_signal(primary, position, steps, rng)?;
                let ew = match &config.ew {
                    SignalPolicy::Mirror => Signal::mirror_of(&ns, steps),
                    other => build_signal(other, position, steps, rng)?,
                };
                (ns, ew)
            }
        };

        let estimator = (!observable).then(|| {
            let service_time = 1.0 / departure_rate;
            IntersectionEstimator::new(
                index,
                PerDirection::from_fn(|d| {
                    QueueEstimator::new(d, head(d), edges[d], service_time, steps)
                }),
            )
        });

        Ok(Self {
            index,
            position,
            queues,
            signal_ns,
            signal_ew,
            observable,
            estimator,
            horizontal: vec![],
            vertical: vec![],
            queued_series: TimeSeries::with_capacity(steps),
            arrival_count: 0,
            arrivals_on_green: 0,
            clearance_ns: ClearanceTracker::default(),
            clearance_ew: ClearanceTracker::default(),
            step_index: 0,
        })
    }

    /// The grid cell this intersection occupies.
    pub fn index(&self) -> GridIndex {
        self.index
    }

    /// Centre of the intersection box in m.
    pub fn position(&self) -> Point2d {
        self.position
    }

    /// One approach's queue simulator.
    pub fn queue(&self, direction: Direction) -> &QueueSimulator {
        &self.queues[direction]
    }

    /// The signal of one axis.
    pub fn signal(&self, axis: Axis) -> &Signal {
        match axis {
            Axis::NS => &self.signal_ns,
            Axis::EW => &self.signal_ew,
        }
    }

    /// The shadow estimator, present on unobserved intersections only.
    pub fn estimator(&self) -> Option<&IntersectionEstimator> {
        self.estimator.as_ref()
    }

    pub fn is_observable(&self) -> bool {
        self.observable
    }

    /// Total queued vehicles per step, over all four approaches.
    pub fn queued_series(&self) -> &TimeSeries {
        &self.queued_series
    }

    /// Average queue growth per unit green cycle of one axis, in
    /// vehicles/s; `NaN` until the axis has completed a cycle.
    pub fn clearance_rate(&self, axis: Axis) -> f64 {
        match axis {
            Axis::NS => self.clearance_ns.average(),
            Axis::EW => self.clearance_ew.average(),
        }
    }

    /// Fraction of arrivals that occurred while their axis was green,
    /// `NaN` before the first arrival.
    pub fn arrivals_on_green_rate(&self) -> f64 {
        if self.arrival_count > 0 {
            self.arrivals_on_green as f64 / self.arrival_count as f64
        } else {
            f64::NAN
        }
    }

    /// Mean stop-line wait over all departures here, `NaN` before the
    /// first departure.
    pub fn avg_wait_time(&self) -> f64 {
        let total: f64 = self.queues.values().map(|q| q.total_wait()).sum();
        let departed: f64 = self.queues.values().map(|q| q.departures().last()).sum();
        if departed > 0.0 {
            total / departed
        } else {
            f64::NAN
        }
    }

    /// Hands a vehicle routed from a neighbouring intersection to the
    /// matching approach queue.
    pub(crate) fn route_vehicle(
        &mut self,
        direction: Direction,
        id: VehicleId,
        vehicles: &mut VehicleSet,
    ) {
        self.arrival_count += 1;
        if self.signal(direction.axis()).service() {
            self.arrivals_on_green += 1;
        }
        self.queues[direction].queue_vehicle(id, vehicles);
    }

    /// Moves a vehicle onto the lane of one of this intersection's
    /// approaches, preserving its travel progress.
    pub(crate) fn align_to_approach(&self, direction: Direction, vehicle: &mut Vehicle) {
        self.queues[direction].adjust_position(vehicle);
    }

    /// Advances the intersection by one step. Returns vehicles spawned on
    /// its approaches and vehicles released past their stop lines.
    pub(crate) fn step(
        &mut self,
        dt: f64,
        vehicles: &mut VehicleSet,
        rng: &mut SmallRng,
    ) -> (SmallVec<[VehicleId; 8]>, SmallVec<[(VehicleId, Direction); 4]>) {
        // A mirror reads its primary's published bit, so the primary must
        // step first. Signals advance before the queues read their service,
        // so a case sensed last step governs this step's departures.
        if self.signal_ns.is_mirror() {
            self.signal_ew.time_step(dt, rng);
            self.signal_ns.time_step(dt, rng);
        } else {
            self.signal_ns.time_step(dt, rng);
            self.signal_ew.time_step(dt, rng);
        }

        let queued: f64 = self.queues.values().map(|q| q.queue().len() as f64).sum();
        self.queued_series.push(queued);
        if self.signal_ns.switched_green() {
            self.clearance_ns.record(self.step_index, queued, dt);
        }
        if self.signal_ew.switched_green() {
            self.clearance_ew.record(self.step_index, queued, dt);
        }

        self.prune_crossers(vehicles);
        let ns_clear = self.horizontal.is_empty();
        let ew_clear = self.vertical.is_empty();
        let ns_saturation = self.signal_ns.saturation_rate() * (ns_clear as u8 as f64);
        let ew_saturation = self.signal_ew.saturation_rate() * (ew_clear as u8 as f64);

        let mut arrivals = SmallVec::new();
        let mut departures = SmallVec::new();
        for d in Direction::ALL {
            let saturation = match d.axis() {
                Axis::NS => ns_saturation,
                Axis::EW => ew_saturation,
            };
            let green = self.signal(d.axis()).service();
            let (spawned, departed) = self.queues[d].step(dt, saturation, vehicles, rng);
            self.arrival_count += spawned.len() as u32;
            if green {
                self.arrivals_on_green += spawned.len() as u32;
            }
            arrivals.extend(spawned);
            if let Some(id) = departed {
                match d.axis() {
                    Axis::NS => self.vertical.push(id),
                    Axis::EW => self.horizontal.push(id),
                }
                departures.push((id, d));
            }
        }

        self.step_index += 1;
        (arrivals, departures)
    }

    /// Drops crossing vehicles whose rear bumper has passed the far stop
    /// line, or which have left the network entirely.
    fn prune_crossers(&mut self, vehicles: &VehicleSet) {
        let queues = &self.queues;
        let still_crossing = |id: &VehicleId| match vehicles.get(*id) {
            None => false,
            Some(v) => {
                let far_line = queues[v.direction().opposite()].queue().head_position();
                v.direction().progress(v.tail_position(), far_line) <= 0.0
            }
        };
        self.vertical.retain(still_crossing);
        self.horizontal.retain(still_crossing);
    }

    /// Feeds the adaptive signals their visible vehicles, partitioned by
    /// travel direction. No-op for other signal kinds.
    pub(crate) fn sense(&mut self, by_direction: &PerDirection<Vec<Sensed>>) {
        use Direction::{East, North, South, West};
        let ns_lanes = [by_direction[North].as_slice(), by_direction[South].as_slice()];
        let ew_lanes = [by_direction[East].as_slice(), by_direction[West].as_slice()];
        if self.signal_ns.is_adaptive() {
            self.signal_ns.sense(ns_lanes, ew_lanes);
        }
        if self.signal_ew.is_adaptive() {
            self.signal_ew.sense(ew_lanes, ns_lanes);
        }
    }

    /// Runs the shadow estimator for one step, claiming this cell's
    /// observations from the bus. No-op on observable intersections.
    pub(crate) fn run_estimator(
        &mut self,
        dt: f64,
        bus: &mut Vec<Observation>,
        rng: &mut SmallRng,
    ) {
        let ns_saturation = self.signal_ns.saturation_rate();
        let ew_saturation = self.signal_ew.saturation_rate();
        if let Some(estimator) = &mut self.estimator {
            estimator.consume(bus);
            estimator.step(dt, ns_saturation, ew_saturation, rng);
        }
    }
}

fn build_signal(
    policy: &SignalPolicy,
    sensor: Point2d,
    steps: usize,
    rng: &mut SmallRng,
) -> Result<Signal> {
    Ok(match policy {
        SignalPolicy::Periodic {
            period,
            delay,
            green_ratio,
        } => Signal::periodic(*period, *delay, *green_ratio, steps),
        SignalPolicy::Memoryless {
            green_to_red,
            red_to_green,
        } => Signal::memoryless(*green_to_red, *red_to_green, steps, rng),
        SignalPolicy::Adaptive {
            sensor_depth,
            range,
            rule,
        } => Signal::adaptive(sensor, *range, *sensor_depth, *rule, steps),
        SignalPolicy::Mirror => bail!("a mirror signal cannot be built standalone"),
    })
}
