use crate::direction::{Direction, GridIndex, PerDirection};
use crate::signal::AdaptiveRule;
use crate::simulator::RateFn;
use anyhow::{bail, ensure, Result};

/// The external arrival process of one approach.
#[derive(Clone, Debug, Default)]
pub enum ArrivalSpec {
    /// No external arrivals; vehicles come only from upstream.
    #[default]
    None,
    /// A Poisson stream with a (possibly time-varying) rate and a weighted
    /// platoon size distribution; weight `i` is the weight of size `i + 1`.
    Poisson {
        rate: RateFn,
        platoon_sizes: Vec<f64>,
    },
    /// Single vehicles at fixed timestamps.
    Scheduled(Vec<f64>),
}

/// The signal policy of one intersection axis.
#[derive(Clone, Debug)]
pub enum SignalPolicy {
    Periodic {
        period: f64,
        delay: f64,
        green_ratio: f64,
    },
    Memoryless {
        green_to_red: f64,
        red_to_green: f64,
    },
    Adaptive {
        sensor_depth: usize,
        range: f64,
        rule: AdaptiveRule,
    },
    /// The negation of this intersection's other axis.
    Mirror,
}

/// Per-intersection configuration.
#[derive(Clone, Debug)]
pub struct IntersectionConfig {
    /// Arrival processes per approach direction. Only approaches entering
    /// from outside the grid may generate vehicles.
    pub arrivals: PerDirection<ArrivalSpec>,
    pub ns: SignalPolicy,
    pub ew: SignalPolicy,
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self {
            arrivals: PerDirection::default(),
            ns: SignalPolicy::Periodic {
                period: 20.0,
                delay: 0.0,
                green_ratio: 0.5,
            },
            ew: SignalPolicy::Mirror,
        }
    }
}

/// Structural configuration of a whole network.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub rows: usize,
    pub cols: usize,
    /// Distance between neighbouring intersection centres in m.
    pub spacing: f64,
    /// Width of the intersection box and its roads in m.
    pub road_width: f64,
    /// Step size in s.
    pub delta_t: f64,
    /// Planned run length in s, used to size statistics series.
    pub end_time: f64,
    /// Nominal service rate of every approach in vehicles/s.
    pub departure_rate: f64,
    /// Per-intersection configuration in row-major order.
    pub intersections: Vec<IntersectionConfig>,
    /// Cells whose departures are published to the observation feed;
    /// every other cell reconstructs its queues with an estimator.
    pub observable: Vec<GridIndex>,
    /// Seed for the random stream, or `None` for an entropy seed.
    pub seed: Option<u64>,
}

impl NetworkConfig {
    /// A `rows` x `cols` grid with default per-intersection policies.
    pub fn grid(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            spacing: 150.0,
            road_width: 15.0,
            delta_t: 0.2,
            end_time: 600.0,
            departure_rate: 0.5,
            intersections: vec![IntersectionConfig::default(); rows * cols],
            observable: vec![],
            seed: None,
        }
    }

    /// The number of steps a full run records.
    pub fn steps(&self) -> usize {
        (self.end_time / self.delta_t).ceil() as usize + 1
    }

    /// Whether the `direction` approach of `cell` enters from outside the
    /// grid, meaning it may carry an external arrival process.
    pub fn is_edge_approach(&self, cell: GridIndex, direction: Direction) -> bool {
        cell.neighbour(direction.opposite(), self.rows, self.cols)
            .is_none()
    }

    /// Rejects structurally invalid configurations.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.rows >= 1 && self.cols >= 1, "grid must be at least 1x1");
        ensure!(self.spacing > 0.0, "intersection spacing must be positive");
        ensure!(
            self.road_width > 0.0 && self.road_width < self.spacing,
            "road width must be positive and smaller than the spacing"
        );
        ensure!(self.delta_t > 0.0, "time step must be positive");
        ensure!(self.end_time > 0.0, "end time must be positive");
        ensure!(
            self.departure_rate > 0.0,
            "departure rate must be positive"
        );
        ensure!(
            self.intersections.len() == self.rows * self.cols,
            "expected {} intersection configs, got {}",
            self.rows * self.cols,
            self.intersections.len()
        );
        for cell in &self.observable {
            ensure!(
                cell.row < self.rows && cell.col < self.cols,
                "observable cell ({}, {}) is outside the grid",
                cell.row,
                cell.col
            );
        }
        for (i, ix) in self.intersections.iter().enumerate() {
            let cell = GridIndex::new(i / self.cols, i % self.cols);
            validate_policy(&ix.ns)?;
            validate_policy(&ix.ew)?;
            if matches!(ix.ns, SignalPolicy::Mirror) && matches!(ix.ew, SignalPolicy::Mirror) {
                bail!(
                    "intersection ({}, {}) mirrors both axes",
                    cell.row,
                    cell.col
                );
            }
            for (direction, spec) in ix.arrivals.iter() {
                validate_arrivals(spec)?;
                if !matches!(spec, ArrivalSpec::None) {
                    ensure!(
                        self.is_edge_approach(cell, direction),
                        "approach {:?} of interior cell ({}, {}) cannot generate arrivals",
                        direction,
                        cell.row,
                        cell.col
                    );
                }
            }
        }
        Ok(())
    }
}

fn validate_policy(policy: &SignalPolicy) -> Result<()> {
    match policy {
        SignalPolicy::Periodic {
            period,
            green_ratio,
            ..
        } => {
            ensure!(*period > 0.0, "signal period must be positive");
            ensure!(
                *green_ratio > 0.0 && *green_ratio <= 1.0,
                "green ratio must lie in (0, 1]"
            );
        }
        SignalPolicy::Memoryless {
            green_to_red,
            red_to_green,
        } => {
            ensure!(
                *green_to_red > 0.0 && *red_to_green > 0.0,
                "signal transition rates must be positive"
            );
        }
        SignalPolicy::Adaptive {
            sensor_depth,
            range,
            ..
        } => {
            ensure!(*sensor_depth > 0, "sensor depth must be positive");
            ensure!(*range > 0.0, "sensor range must be positive");
        }
        SignalPolicy::Mirror => {}
    }
    Ok(())
}

fn validate_arrivals(spec: &ArrivalSpec) -> Result<()> {
    match spec {
        ArrivalSpec::None => {}
        ArrivalSpec::Poisson {
            rate,
            platoon_sizes,
        } => {
            match rate {
                RateFn::Constant(r) => ensure!(*r > 0.0, "arrival rate must be positive"),
                RateFn::Piecewise(segments) => {
                    ensure!(!segments.is_empty(), "piecewise rate must not be empty");
                    ensure!(
                        segments.windows(2).all(|w| w[0].0 <= w[1].0),
                        "piecewise rate segments must be sorted by start time"
                    );
                    ensure!(
                        segments.iter().all(|(_, r)| *r >= 0.0),
                        "arrival rates must not be negative"
                    );
                }
            }
            ensure!(
                !platoon_sizes.is_empty()
                    && platoon_sizes.iter().all(|w| *w >= 0.0)
                    && platoon_sizes.iter().sum::<f64>() > 0.0,
                "platoon size weights must be non-negative with a positive sum"
            );
        }
        ArrivalSpec::Scheduled(times) => {
            ensure!(
                times.iter().all(|t| *t >= 0.0),
                "scheduled arrival times must not be negative"
            );
        }
    }
    Ok(())
}
