use crate::direction::Direction;
use crate::math::{distance, Point2d};
use crate::VehicleId;
use itertools::Itertools;

/// The decision rule driving an adaptive signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdaptiveRule {
    /// Compare raw sensed vehicle counts per axis.
    Counting,
    /// Compare platoon delay costs; bounded service counted in platoons.
    PlatoonClearing,
    /// Compare platoon delay costs; bounded service ends when a remembered
    /// vehicle has left the sensed set.
    PlatoonTarget,
}

/// The finite-state case of an adaptive signal.
///
/// `Empty*` cases serve the signal's own axis, `EmptyOther*` cases serve
/// the cross axis, and `Idle` holds whatever service was last decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalCase {
    Idle,
    /// Serve own axis until it has no sensed vehicles.
    Empty,
    /// Serve cross axis until it has no sensed vehicles.
    EmptyOther,
    /// Serve own axis until its count drops to the objective.
    EmptyMidway,
    /// Serve cross axis until its count drops to the objective.
    EmptyOtherMidway,
    /// Serve own axis until the remembered vehicle has left it.
    WaitForVehicle,
    /// Serve cross axis until the remembered vehicle has left it.
    WaitForOtherVehicle,
}

/// A vehicle as seen by a signal's sensor.
#[derive(Clone, Debug)]
pub(crate) struct Sensed {
    pub id: VehicleId,
    pub position: Point2d,
    pub tail: Point2d,
    pub direction: Direction,
    pub length: f64,
    pub full_speed: f64,
    pub wait: f64,
}

/// The sensing and decision state of an adaptive signal.
pub(crate) struct AdaptiveSignal {
    /// The fixed point distances are sensed from.
    sensor: Point2d,
    /// Sensing radius in m.
    range: f64,
    /// Vehicles sensed per lane, nearest first.
    depth: usize,
    rule: AdaptiveRule,
    case: SignalCase,
    /// Count the current bounded service runs down to.
    objective: usize,
    /// The vehicle a `WaitFor*` case is waiting on.
    target: Option<VehicleId>,
}

impl AdaptiveSignal {
    pub fn new(sensor: Point2d, range: f64, depth: usize, rule: AdaptiveRule) -> Self {
        Self {
            sensor,
            range,
            depth,
            rule,
            case: SignalCase::Idle,
            objective: 0,
            target: None,
        }
    }

    pub fn case(&self) -> SignalCase {
        self.case
    }

    /// The service the current case implies, or `None` while `Idle`.
    pub fn service(&self) -> Option<bool> {
        match self.case {
            SignalCase::Idle => None,
            SignalCase::Empty | SignalCase::EmptyMidway | SignalCase::WaitForVehicle => Some(true),
            SignalCase::EmptyOther
            | SignalCase::EmptyOtherMidway
            | SignalCase::WaitForOtherVehicle => Some(false),
        }
    }

    /// Runs one sensing pass over the two lanes of each axis and advances
    /// the case machine.
    pub fn sense(&mut self, own: [&[Sensed]; 2], cross: [&[Sensed]; 2]) {
        let own: Vec<Sensed> = own.iter().flat_map(|lane| self.clip(lane)).collect();
        let cross: Vec<Sensed> = cross.iter().flat_map(|lane| self.clip(lane)).collect();
        match self.rule {
            AdaptiveRule::Counting => self.rule_counting(own.len(), cross.len()),
            AdaptiveRule::PlatoonClearing | AdaptiveRule::PlatoonTarget => {
                self.rule_platoons(&own, &cross)
            }
        }
    }

    /// The vehicles of one lane within range, nearest to the sensor first,
    /// clipped to the sensor depth.
    fn clip(&self, lane: &[Sensed]) -> Vec<Sensed> {
        lane.iter()
            .filter(|v| distance(v.position, self.sensor) < self.range)
            .sorted_by(|a, b| {
                distance(a.position, self.sensor).total_cmp(&distance(b.position, self.sensor))
            })
            .take(self.depth)
            .cloned()
            .collect()
    }

    fn rule_counting(&mut self, own: usize, cross: usize) {
        match self.case {
            SignalCase::EmptyMidway if own <= self.objective => {
                self.case = SignalCase::EmptyOther;
            }
            SignalCase::EmptyOtherMidway if cross <= self.objective => {
                self.case = SignalCase::Empty;
            }
            _ => {}
        }
        match self.case {
            SignalCase::Empty if own == 0 => self.case = SignalCase::Idle,
            SignalCase::EmptyOther if cross == 0 => self.case = SignalCase::Idle,
            _ => {}
        }
        if self.case != SignalCase::Idle {
            return;
        }
        let diff = own as i64 - cross as i64;
        let full = 2 * self.depth;
        // Both blocks run in order; the second may override the first.
        if own >= 1 && cross < full {
            if cross == 0 || cross == own {
                self.case = SignalCase::Empty;
            } else if cross > own {
                if -diff > 2 {
                    self.case = SignalCase::EmptyOtherMidway;
                    self.objective = cross - own;
                } else {
                    self.case = SignalCase::EmptyOther;
                }
            }
        } else if own == 1 && cross >= full {
            self.case = SignalCase::Empty;
        }
        if cross >= 1 && own < full {
            if own == 0 {
                self.case = SignalCase::EmptyOther;
            } else if own > cross {
                if diff > 2 {
                    self.case = SignalCase::EmptyMidway;
                    self.objective = own - cross;
                } else {
                    self.case = SignalCase::Empty;
                }
            }
        } else if cross == 1 && own >= full {
            self.case = SignalCase::EmptyOther;
        }
    }

    fn rule_platoons(&mut self, own: &[Sensed], cross: &[Sensed]) {
        let own_platoons = platoons(own);
        let cross_platoons = platoons(cross);
        match self.case {
            SignalCase::EmptyMidway if own_platoons.len() <= self.objective => {
                self.case = SignalCase::Idle;
            }
            SignalCase::EmptyOtherMidway if cross_platoons.len() <= self.objective => {
                self.case = SignalCase::Idle;
            }
            SignalCase::WaitForVehicle if !self.target_present(own) => {
                self.case = SignalCase::Idle;
                self.target = None;
            }
            SignalCase::WaitForOtherVehicle if !self.target_present(cross) => {
                self.case = SignalCase::Idle;
                self.target = None;
            }
            SignalCase::Empty if own_platoons.is_empty() => self.case = SignalCase::Idle,
            SignalCase::EmptyOther if cross_platoons.is_empty() => self.case = SignalCase::Idle,
            _ => {}
        }
        if self.case != SignalCase::Idle {
            return;
        }
        if cross_platoons.is_empty() {
            self.case = SignalCase::Empty;
        } else if own_platoons.is_empty() {
            self.case = SignalCase::EmptyOther;
        } else if own_platoons.len() == 1 && cross_platoons.len() == 1 {
            let own_cost = mean_wait(own_platoons[0]) + self.eta(cross_platoons[0]);
            let cross_cost = mean_wait(cross_platoons[0]) + self.eta(own_platoons[0]);
            self.case = if own_cost >= cross_cost {
                SignalCase::Empty
            } else {
                SignalCase::EmptyOther
            };
        } else if own_platoons.len() > 1 && cross_platoons.len() > 1 {
            let own_cost = (self.eta(cross_platoons[0])
                + own_platoons.iter().map(|p| mean_wait(p)).sum::<f64>())
                / own_platoons.len() as f64;
            let cross_cost = (self.eta(own_platoons[0])
                + cross_platoons.iter().map(|p| mean_wait(p)).sum::<f64>())
                / cross_platoons.len() as f64;
            if own_cost >= cross_cost {
                self.grant_bounded(true, &own_platoons);
            } else {
                self.grant_bounded(false, &cross_platoons);
            }
        }
    }

    /// Begins a bounded service run over `served`, on this axis when
    /// `own` or on the cross axis otherwise.
    fn grant_bounded(&mut self, own: bool, served: &[&[Sensed]]) {
        match self.rule {
            AdaptiveRule::PlatoonClearing => {
                self.case = if own {
                    SignalCase::EmptyMidway
                } else {
                    SignalCase::EmptyOtherMidway
                };
                self.objective = served.len() - 1;
            }
            AdaptiveRule::PlatoonTarget => {
                self.case = if own {
                    SignalCase::WaitForVehicle
                } else {
                    SignalCase::WaitForOtherVehicle
                };
                // The last member of the nearest platoon; once it is gone
                // the whole platoon has passed the sensor.
                self.target = served[0].last().map(|v| v.id);
            }
            AdaptiveRule::Counting => unreachable!(),
        }
    }

    fn target_present(&self, axis: &[Sensed]) -> bool {
        self.target
            .map(|t| axis.iter().any(|v| v.id == t))
            .unwrap_or(false)
    }

    /// Straight-line travel time from a platoon's nearest vehicle to the
    /// sensor, in s.
    fn eta(&self, platoon: &[Sensed]) -> f64 {
        let first = &platoon[0];
        distance(first.position, self.sensor) / first.full_speed
    }
}

/// Splits sensed vehicles into maximal runs where each vehicle trails the
/// previous one by no more than its own length.
fn platoons(vehicles: &[Sensed]) -> Vec<&[Sensed]> {
    let mut runs = vec![];
    let mut start = 0;
    for i in 1..vehicles.len() {
        let v = &vehicles[i];
        if v.direction.progress(vehicles[i - 1].tail, v.position) > v.length {
            runs.push(&vehicles[start..i]);
            start = i;
        }
    }
    if !vehicles.is_empty() {
        runs.push(&vehicles[start..]);
    }
    runs
}

/// Mean accumulated wait of a platoon in s.
fn mean_wait(platoon: &[Sensed]) -> f64 {
    platoon.iter().map(|v| v.wait).sum::<f64>() / platoon.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn sensed(y: f64, wait: f64, n: u64) -> Sensed {
        Sensed {
            id: VehicleId::from(KeyData::from_ffi(n | (1 << 32))),
            position: Point2d::new(0.0, y),
            tail: Point2d::new(0.0, y - 5.0),
            direction: Direction::North,
            length: 5.0,
            full_speed: 14.0,
            wait,
        }
    }

    #[test]
    fn platoons_split_on_wide_gaps() {
        // Gaps of 2 m, 20 m and 4 m between consecutive vehicles.
        let lane = [
            sensed(0.0, 1.0, 1),
            sensed(-7.0, 1.0, 2),
            sensed(-32.0, 1.0, 3),
            sensed(-41.0, 1.0, 4),
        ];
        let runs = platoons(&lane);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 2);
        assert_eq!(runs[1].len(), 2);
    }

    #[test]
    fn counting_serves_the_only_populated_axis() {
        let sensor = Point2d::new(0.0, 0.0);
        let mut signal = AdaptiveSignal::new(sensor, 50.0, 4, AdaptiveRule::Counting);
        let lane = [sensed(-10.0, 0.0, 1), sensed(-17.0, 0.0, 2)];
        signal.sense([&lane, &[]], [&[], &[]]);
        assert_eq!(signal.case(), SignalCase::Empty);
        assert_eq!(signal.service(), Some(true));
        // Axis emptied, controller returns to idle and holds service.
        signal.sense([&[], &[]], [&[], &[]]);
        assert_eq!(signal.case(), SignalCase::Idle);
        assert_eq!(signal.service(), None);
    }

    #[test]
    fn clearing_rule_runs_down_to_its_objective() {
        let sensor = Point2d::new(0.0, 0.0);
        let mut signal = AdaptiveSignal::new(sensor, 50.0, 4, AdaptiveRule::PlatoonClearing);
        // Three platoons against two, the triple carrying the larger delay.
        let own = [
            sensed(-10.0, 9.0, 1),
            sensed(-30.0, 8.0, 2),
            sensed(-44.0, 7.0, 3),
        ];
        let cross = [sensed(-10.0, 1.0, 4), sensed(-30.0, 1.0, 5)];
        signal.sense([&own, &[]], [&cross, &[]]);
        assert_eq!(signal.case(), SignalCase::EmptyMidway);
        assert_eq!(signal.service(), Some(true));
        // The objective is one platoon fewer than were sensed, so service
        // holds while all three are still present.
        signal.sense([&own, &[]], [&cross, &[]]);
        assert_eq!(signal.case(), SignalCase::EmptyMidway);
        // Down to one platoon the run ends; one against two platoons gives
        // no fresh grant and the controller idles.
        signal.sense([&own[..1], &[]], [&cross, &[]]);
        assert_eq!(signal.case(), SignalCase::Idle);
        assert_eq!(signal.service(), None);
    }

    #[test]
    fn target_rule_releases_when_vehicle_leaves() {
        let sensor = Point2d::new(0.0, 0.0);
        let mut signal = AdaptiveSignal::new(sensor, 50.0, 4, AdaptiveRule::PlatoonTarget);
        // Two platoons on each axis, own axis carrying the larger delay.
        let own = [
            sensed(-10.0, 9.0, 1),
            sensed(-30.0, 8.0, 2),
            sensed(-44.0, 7.0, 3),
        ];
        let cross = [sensed(-10.0, 1.0, 4), sensed(-30.0, 1.0, 5)];
        signal.sense([&own, &[]], [&cross, &[]]);
        assert_eq!(signal.case(), SignalCase::WaitForVehicle);
        assert_eq!(signal.service(), Some(true));
        // The tracked vehicle is still sensed, service holds.
        signal.sense([&own, &[]], [&cross, &[]]);
        assert_eq!(signal.case(), SignalCase::WaitForVehicle);
        // It departs; with mixed platoon counts left over, no new grant is
        // made and the controller idles.
        signal.sense([&own[1..], &[]], [&cross[..1], &[]]);
        assert_eq!(signal.case(), SignalCase::Idle);
    }
}
