use crate::config::ArrivalSpec;
use crate::queue::Queue;
use crate::series::TimeSeries;
use crate::vehicle::Vehicle;
use crate::{VehicleId, VehicleSet};
use anyhow::{Context, Result};
use rand::distributions::WeightedIndex;
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::Distribution;
use smallvec::SmallVec;
use std::collections::VecDeque;

/// Gap left behind the previous arrival when spawning a vehicle, in m.
const SPAWN_GAP: f64 = 3.0;

/// An arrival rate as a function of simulation time.
#[derive(Clone, Debug)]
pub enum RateFn {
    /// A fixed rate in vehicles/s.
    Constant(f64),
    /// Piecewise-constant segments of `(start_time, rate)`, sorted by
    /// start time.
    Piecewise(Vec<(f64, f64)>),
}

impl RateFn {
    /// The rate in effect at time `t`.
    pub fn at(&self, t: f64) -> f64 {
        match self {
            RateFn::Constant(rate) => *rate,
            RateFn::Piecewise(segments) => segments
                .iter()
                .take_while(|(start, _)| *start <= t)
                .last()
                .or(segments.first())
                .map(|(_, rate)| *rate)
                .unwrap_or(0.0),
        }
    }
}

/// How vehicles enter an approach queue.
enum Process {
    /// A Poisson stream with platoon sizes drawn from a weighted
    /// distribution; `platoons` weights index platoon size 1, 2, ...
    Poisson {
        rate: RateFn,
        platoons: WeightedIndex<f64>,
    },
    /// Arrivals at fixed timestamps, one vehicle each.
    Scheduled(VecDeque<f64>),
    /// Arrivals come only from upstream intersections.
    Routed,
}

/// Drives one approach queue: samples arrivals, releases departures when
/// the approach is served, and records per-step statistics.
pub struct QueueSimulator {
    queue: Queue,
    process: Process,
    /// Nominal departure rate in vehicles/s; only used downstream as the
    /// estimator's service rate.
    departure_rate: f64,
    time: f64,
    /// Time since the last arrival (sampled or routed), in s.
    time_since_arrival: f64,
    /// Uniform draw the arrival CDF is tested against, redrawn per arrival.
    arrival_draw: f64,
    queue_length: TimeSeries,
    arrivals: TimeSeries,
    departures: TimeSeries,
    /// Sum of the stop-line waits of every departed vehicle, in s.
    total_wait: f64,
    /// Vehicles queued since the previous step's statistics were flushed.
    queued_this_step: u32,
}

impl QueueSimulator {
    pub(crate) fn new(
        queue: Queue,
        spec: &ArrivalSpec,
        departure_rate: f64,
        steps: usize,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let process = match spec {
            ArrivalSpec::None => Process::Routed,
            ArrivalSpec::Poisson {
                rate,
                platoon_sizes,
            } => Process::Poisson {
                rate: rate.clone(),
                platoons: WeightedIndex::new(platoon_sizes.iter().copied())
                    .context("invalid platoon size distribution")?,
            },
            ArrivalSpec::Scheduled(times) => {
                let mut times = times.clone();
                times.sort_by(|a, b| a.total_cmp(b));
                Process::Scheduled(times.into())
            }
        };
        Ok(Self {
            queue,
            process,
            departure_rate,
            time: 0.0,
            time_since_arrival: 0.0,
            arrival_draw: rng.gen(),
            queue_length: TimeSeries::with_capacity(steps),
            arrivals: TimeSeries::with_capacity(steps),
            departures: TimeSeries::with_capacity(steps),
            total_wait: 0.0,
            queued_this_step: 0,
        })
    }

    /// The queue this simulator drives.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Queue length per step.
    pub fn queue_length(&self) -> &TimeSeries {
        &self.queue_length
    }

    /// Cumulative arrivals per step.
    pub fn arrivals(&self) -> &TimeSeries {
        &self.arrivals
    }

    /// Cumulative departures per step.
    pub fn departures(&self) -> &TimeSeries {
        &self.departures
    }

    /// Nominal departure rate of the approach in vehicles/s.
    pub fn departure_rate(&self) -> f64 {
        self.departure_rate
    }

    /// Summed stop-line waits of every departed vehicle, in s.
    pub fn total_wait(&self) -> f64 {
        self.total_wait
    }

    /// Mean stop-line wait of departed vehicles in s, `NaN` before the
    /// first departure.
    pub fn avg_wait_time(&self) -> f64 {
        let departed = self.departures.last();
        if departed > 0.0 {
            self.total_wait / departed
        } else {
            f64::NAN
        }
    }

    /// Hands a vehicle routed from upstream to this queue.
    pub(crate) fn queue_vehicle(&mut self, id: VehicleId, vehicles: &mut VehicleSet) {
        self.queue.append(id, vehicles);
        self.queued_this_step += 1;
        self.time_since_arrival = 0.0;
    }

    /// Moves a vehicle sideways onto this approach's lane, preserving its
    /// progress along the travel direction.
    pub(crate) fn adjust_position(&self, vehicle: &mut Vehicle) {
        let direction = self.queue.direction();
        let head = self.queue.head_position();
        let along = direction.progress(vehicle.position(), head);
        vehicle.set_position(head + along * direction.unit());
    }

    /// Advances the approach by one step of `dt` seconds. Returns the
    /// vehicles spawned here this step and the departed vehicle, if any.
    pub(crate) fn step(
        &mut self,
        dt: f64,
        saturation: f64,
        vehicles: &mut VehicleSet,
        rng: &mut SmallRng,
    ) -> (SmallVec<[VehicleId; 4]>, Option<VehicleId>) {
        self.queue.update_tail(vehicles);
        self.queue.regulate(dt, saturation, vehicles);

        let mut spawned = SmallVec::new();
        for _ in 0..self.pending_arrivals(rng) {
            let id = self.spawn(vehicles);
            spawned.push(id);
            self.queued_this_step += 1;
        }
        self.arrivals.push_delta(self.queued_this_step as f64);
        self.queued_this_step = 0;

        let departed = if saturation > 0.0 {
            self.queue.remove(vehicles)
        } else {
            None
        };
        if let Some(id) = departed {
            let vehicle = &mut vehicles[id];
            self.total_wait += vehicle.wait();
            vehicle.reset_wait();
            vehicle.accelerate();
        }
        self.departures
            .push_delta(if departed.is_some() { 1.0 } else { 0.0 });
        self.queue_length.push(self.queue.len() as f64);

        self.time += dt;
        self.time_since_arrival += dt;
        (spawned, departed)
    }

    /// The number of vehicles arriving externally this step.
    fn pending_arrivals(&mut self, rng: &mut SmallRng) -> usize {
        match &mut self.process {
            Process::Routed => 0,
            Process::Scheduled(times) => {
                let mut due = 0;
                while times.front().map_or(false, |&t| t <= self.time) {
                    times.pop_front();
                    due += 1;
                }
                if due > 0 {
                    self.time_since_arrival = 0.0;
                }
                due
            }
            Process::Poisson { rate, platoons } => {
                let rate = rate.at(self.time);
                let threshold = 1.0 - (-rate * self.time_since_arrival).exp();
                if threshold > self.arrival_draw {
                    self.arrival_draw = rng.gen();
                    self.time_since_arrival = 0.0;
                    platoons.sample(rng) + 1
                } else {
                    0
                }
            }
        }
    }

    /// Spawns one vehicle at the back of the approach and queues it.
    fn spawn(&mut self, vehicles: &mut VehicleSet) -> VehicleId {
        let direction = self.queue.direction();
        let mut position = self.queue.edge_position();
        if let Some(last) = self.queue.last_arriving() {
            let behind = vehicles[last].tail_position() - SPAWN_GAP * direction.unit();
            // Spawn at whichever point is further from the stop line.
            if direction.progress(behind, position) < 0.0 {
                position = behind;
            }
        }
        let id = vehicles.insert(Vehicle::new(position, direction));
        self.queue.append(id, vehicles);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piecewise_rate_selects_active_segment() {
        let rate = RateFn::Piecewise(vec![(0.0, 0.1), (60.0, 0.5), (120.0, 0.2)]);
        assert_eq!(rate.at(0.0), 0.1);
        assert_eq!(rate.at(59.9), 0.1);
        assert_eq!(rate.at(60.0), 0.5);
        assert_eq!(rate.at(500.0), 0.2);
    }
}
