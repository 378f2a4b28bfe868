use crate::config::NetworkConfig;
use crate::direction::{Direction, GridIndex, PerDirection};
use crate::estimator::Observation;
use crate::intersection::FourWayIntersection;
use crate::math::Point2d;
use crate::queue::MIN_GAP;
use crate::series::TimeSeries;
use crate::signal::Sensed;
use crate::{VehicleId, VehicleSet};
use anyhow::Result;
use itertools::iproduct;
use log::{debug, trace};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::HashMap;

/// How far beyond the outermost intersection box a vehicle must travel
/// before it is considered to have left the network, in m.
const EXIT_MARGIN: f64 = 50.0;

/// Vehicles spawned, released past a stop line, and removed at the
/// boundary during one step of [IntersectionNetwork::advance].
#[derive(Debug, Default)]
pub struct StepEvents {
    pub arrivals: Vec<VehicleId>,
    pub departures: Vec<VehicleId>,
    pub exits: Vec<VehicleId>,
}

/// A rectangular grid of four-way intersections and the vehicles moving
/// through it.
///
/// Grid cell `(0, 0)` sits at the world origin; columns extend east and
/// rows extend south. The network owns every vehicle; each vehicle is
/// held by exactly one approach queue or by the in-transit set.
pub struct IntersectionNetwork {
    config: NetworkConfig,
    /// Intersections in row-major order.
    intersections: Vec<FourWayIntersection>,
    vehicles: VehicleSet,
    /// Vehicles between intersections, owned by no queue.
    transit: Vec<VehicleId>,
    /// Departure observations published by observable intersections and
    /// consumed by estimators, once per step.
    observations: Vec<Observation>,
    /// Cumulative boundary exits per step.
    exits: TimeSeries,
    /// Summed lifetime waits of exited vehicles, in s.
    total_wait: f64,
    spawned: u64,
    exited: u64,
    time: f64,
    rng: SmallRng,
}

impl IntersectionNetwork {
    /// Builds a network from a validated configuration.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let steps = config.steps();
        let mut intersections = Vec::with_capacity(config.rows * config.cols);
        for (row, col) in iproduct!(0..config.rows, 0..config.cols) {
            let index = GridIndex::new(row, col);
            let edges = PerDirection::from_fn(|d| config.is_edge_approach(index, d));
            intersections.push(FourWayIntersection::new(
                index,
                cell_centre(index, config.spacing),
                config.road_width,
                &config.intersections[row * config.cols + col],
                edges,
                config.departure_rate,
                steps,
                config.observable.contains(&index),
                &mut rng,
            )?);
        }
        Ok(Self {
            config,
            intersections,
            vehicles: VehicleSet::with_key(),
            transit: vec![],
            observations: vec![],
            exits: TimeSeries::with_capacity(steps),
            total_wait: 0.0,
            spawned: 0,
            exited: 0,
            time: 0.0,
            rng,
        })
    }

    /// A freshly constructed network with the same structure but an
    /// independent random stream.
    pub fn reset(&self) -> Result<Self> {
        let mut config = self.config.clone();
        config.seed = None;
        Self::new(config)
    }

    /// The intersection at `cell`, if it lies on the grid.
    pub fn intersection(&self, cell: GridIndex) -> Option<&FourWayIntersection> {
        (cell.row < self.config.rows && cell.col < self.config.cols)
            .then(|| &self.intersections[cell.row * self.config.cols + cell.col])
    }

    /// All intersections in row-major order.
    pub fn intersections(&self) -> &[FourWayIntersection] {
        &self.intersections
    }

    /// Every vehicle currently in the network.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = (VehicleId, &crate::Vehicle)> {
        self.vehicles.iter()
    }

    /// The number of vehicles currently in the network.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Total vehicles created since construction.
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Total vehicles removed at the boundary since construction.
    pub fn exited(&self) -> u64 {
        self.exited
    }

    /// Cumulative boundary exits per step.
    pub fn exits(&self) -> &TimeSeries {
        &self.exits
    }

    /// Mean lifetime wait of exited vehicles in s, `NaN` before the first
    /// exit.
    pub fn avg_wait_time(&self) -> f64 {
        if self.exited > 0 {
            self.total_wait / self.exited as f64
        } else {
            f64::NAN
        }
    }

    /// Elapsed simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Advances the whole network by one step of `dt` seconds.
    pub fn advance(&mut self, dt: f64) -> StepEvents {
        let mut events = StepEvents::default();

        // In-transit vehicles either leave at the boundary or get handed
        // to their destination approach once they reach its tail.
        let routed = self.resolve_transit(dt, &mut events);
        for (id, cell, direction) in routed {
            let index = cell.row * self.config.cols + cell.col;
            self.intersections[index].route_vehicle(direction, id, &mut self.vehicles);
        }

        // Each intersection resolves its own arrivals and departures.
        let mut departures = Vec::new();
        for intersection in &mut self.intersections {
            let cell = intersection.index();
            let (spawned, released) = intersection.step(dt, &mut self.vehicles, &mut self.rng);
            for id in spawned {
                self.vehicles[id].set_destination(Some(cell));
                self.spawned += 1;
                events.arrivals.push(id);
            }
            departures.extend(released.into_iter().map(|(id, d)| (cell, id, d)));
        }

        // Departures move one grid cell along their travel direction, or
        // head off-grid with no destination.
        for &(cell, id, direction) in &departures {
            let destination = cell.neighbour(direction, self.config.rows, self.config.cols);
            self.vehicles[id].set_destination(destination);
            if let Some(dest) = destination {
                let index = dest.row * self.config.cols + dest.col;
                self.intersections[index]
                    .align_to_approach(direction, &mut self.vehicles[id]);
                let origin_observable = self.intersections
                    [cell.row * self.config.cols + cell.col]
                    .is_observable();
                let dest_observable = self.intersections[index].is_observable();
                if origin_observable && !dest_observable {
                    let vehicle = &self.vehicles[id];
                    self.observations.push(Observation {
                        position: vehicle.position(),
                        direction,
                        speed: vehicle.speed(),
                        destination: dest,
                    });
                }
            }
            self.transit.push(id);
            events.departures.push(id);
        }

        self.run_sensors();

        for intersection in &mut self.intersections {
            intersection.run_estimator(dt, &mut self.observations, &mut self.rng);
        }

        for (_, vehicle) in &mut self.vehicles {
            vehicle.step(dt);
        }

        self.exits.push_delta(events.exits.len() as f64);
        self.time += dt;
        trace!(
            "t={:.1}s: {} vehicles, {} spawned, {} routed, {} exited",
            self.time,
            self.vehicles.len(),
            events.arrivals.len(),
            events.departures.len(),
            events.exits.len(),
        );
        events
    }

    /// Removes out-of-bounds vehicles and collects transit vehicles that
    /// have reached their destination approach.
    fn resolve_transit(
        &mut self,
        dt: f64,
        events: &mut StepEvents,
    ) -> Vec<(VehicleId, GridIndex, Direction)> {
        let Self {
            config,
            intersections,
            vehicles,
            transit,
            ..
        } = self;
        let mut routed = vec![];
        let mut gone = vec![];
        transit.retain(|&id| {
            let vehicle = &vehicles[id];
            match vehicle.destination() {
                None => {
                    if out_of_bounds(vehicle, config) {
                        gone.push(id);
                        return false;
                    }
                    true
                }
                Some(dest) => {
                    if vehicle.speed() <= 0.0 {
                        return true;
                    }
                    let queue = intersections[dest.row * config.cols + dest.col]
                        .queue(vehicle.direction())
                        .queue();
                    let gap = vehicle
                        .direction()
                        .progress(vehicle.position(), queue.tail_position());
                    if gap > -(MIN_GAP + vehicle.full_speed() * dt) {
                        routed.push((id, dest, vehicle.direction()));
                        return false;
                    }
                    true
                }
            }
        });
        for id in gone {
            if let Some(vehicle) = self.vehicles.remove(id) {
                self.total_wait += vehicle.total_wait();
                self.exited += 1;
                events.exits.push(id);
            }
        }
        if !events.exits.is_empty() {
            debug!("{} vehicles left the network", events.exits.len());
        }
        routed
    }

    /// Feeds every intersection's adaptive signals the vehicles currently
    /// bound for it, partitioned by travel direction.
    fn run_sensors(&mut self) {
        let mut visible: HashMap<GridIndex, PerDirection<Vec<Sensed>>> = HashMap::new();
        for (id, vehicle) in &self.vehicles {
            if let Some(dest) = vehicle.destination() {
                visible.entry(dest).or_default()[vehicle.direction()].push(Sensed {
                    id,
                    position: vehicle.position(),
                    tail: vehicle.tail_position(),
                    direction: vehicle.direction(),
                    length: vehicle.length(),
                    full_speed: vehicle.full_speed(),
                    wait: vehicle.wait(),
                });
            }
        }
        let empty = PerDirection::default();
        for intersection in &mut self.intersections {
            let by_direction = visible.get(&intersection.index()).unwrap_or(&empty);
            intersection.sense(by_direction);
        }
    }
}

/// World position of a grid cell's intersection centre.
fn cell_centre(cell: GridIndex, spacing: f64) -> Point2d {
    Point2d::new(cell.col as f64 * spacing, -(cell.row as f64) * spacing)
}

/// Whether a vehicle's rear bumper has passed the exit margin beyond the
/// outermost intersection box in its direction of travel.
fn out_of_bounds(vehicle: &crate::Vehicle, config: &NetworkConfig) -> bool {
    let outermost = match vehicle.direction() {
        Direction::North | Direction::West => GridIndex::new(0, 0),
        Direction::South => GridIndex::new(config.rows - 1, 0),
        Direction::East => GridIndex::new(0, config.cols - 1),
    };
    let unit = vehicle.direction().unit();
    let boundary = cell_centre(outermost, config.spacing)
        + (config.road_width / 2.0 + EXIT_MARGIN) * unit;
    vehicle
        .direction()
        .progress(vehicle.tail_position(), boundary)
        > 0.0
}
