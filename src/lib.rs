pub use cgmath;
pub use config::{ArrivalSpec, IntersectionConfig, NetworkConfig, SignalPolicy};
pub use direction::{Axis, Direction, GridIndex, PerDirection};
pub use estimator::{IntersectionEstimator, Observation, QueueEstimator};
pub use intersection::FourWayIntersection;
pub use network::{IntersectionNetwork, StepEvents};
pub use queue::Queue;
pub use series::TimeSeries;
pub use signal::{AdaptiveRule, Signal, SignalCase};
pub use simulator::{QueueSimulator, RateFn};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use vehicle::Vehicle;

mod config;
mod direction;
mod estimator;
mod intersection;
pub mod math;
mod network;
mod queue;
mod series;
mod signal;
mod simulator;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
