use crate::math::Point2d;
use rand::rngs::SmallRng;
use rand::Rng;
use std::cell::Cell;
use std::rc::Rc;

mod adaptive;

pub use adaptive::{AdaptiveRule, SignalCase};
pub(crate) use adaptive::{AdaptiveSignal, Sensed};

/// A traffic signal governing one axis of an intersection.
///
/// The signal publishes its right-of-way bit into a shared cell so that a
/// [mirror](Signal::mirror_of) on the opposing axis can derive the negated
/// state without owning this signal.
pub struct Signal {
    kind: SignalKind,
    /// Whether the governed axis currently has right-of-way.
    service: bool,
    /// This signal's published service bit, shared with any mirror of it.
    shared: Rc<Cell<bool>>,
    time: f64,
    /// Service bit per step.
    history: Vec<bool>,
    /// Completed green-to-red cycles.
    cycles: u32,
    /// `+1` on a red-to-green switch this step, `-1` on green-to-red.
    switch: i8,
}

enum SignalKind {
    Periodic {
        period: f64,
        delay: f64,
        green_ratio: f64,
    },
    Memoryless {
        green_to_red: f64,
        red_to_green: f64,
    },
    Adaptive(AdaptiveSignal),
    /// Always the negation of the signal whose cell this holds.
    Mirror(Rc<Cell<bool>>),
}

impl Signal {
    fn with_kind(kind: SignalKind, service: bool, steps: usize) -> Self {
        Self {
            kind,
            service,
            shared: Rc::new(Cell::new(service)),
            time: 0.0,
            history: Vec::with_capacity(steps),
            cycles: 0,
            switch: 0,
        }
    }

    /// Green iff `((time - delay) mod period) / period < green_ratio`.
    pub(crate) fn periodic(period: f64, delay: f64, green_ratio: f64, steps: usize) -> Self {
        let service = (0.0f64 - delay).rem_euclid(period) / period < green_ratio;
        Self::with_kind(
            SignalKind::Periodic {
                period,
                delay,
                green_ratio,
            },
            service,
            steps,
        )
    }

    /// Markov toggle with the given transition rates in 1/s.
    pub(crate) fn memoryless(
        green_to_red: f64,
        red_to_green: f64,
        steps: usize,
        rng: &mut SmallRng,
    ) -> Self {
        Self::with_kind(
            SignalKind::Memoryless {
                green_to_red,
                red_to_green,
            },
            rng.gen(),
            steps,
        )
    }

    /// Sensor-driven signal; starts red until a decision is made.
    pub(crate) fn adaptive(
        sensor: Point2d,
        range: f64,
        depth: usize,
        rule: AdaptiveRule,
        steps: usize,
    ) -> Self {
        Self::with_kind(
            SignalKind::Adaptive(AdaptiveSignal::new(sensor, range, depth, rule)),
            false,
            steps,
        )
    }

    /// A signal that is always the negation of `other`. It must be stepped
    /// after `other` within each step.
    pub(crate) fn mirror_of(other: &Signal, steps: usize) -> Self {
        Self::with_kind(
            SignalKind::Mirror(other.shared.clone()),
            !other.service,
            steps,
        )
    }

    /// Whether the governed axis currently has right-of-way.
    pub fn service(&self) -> bool {
        self.service
    }

    /// The instantaneous right-of-way indicator, `1.0` or `0.0`.
    pub fn saturation_rate(&self) -> f64 {
        if self.service {
            1.0
        } else {
            0.0
        }
    }

    /// Completed green-to-red cycles so far.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Service bit per step.
    pub fn history(&self) -> &[bool] {
        &self.history
    }

    /// Whether the signal turned green on the most recent step.
    pub fn switched_green(&self) -> bool {
        self.switch > 0
    }

    /// The adaptive controller's current case, if this signal is adaptive.
    pub fn case(&self) -> Option<SignalCase> {
        match &self.kind {
            SignalKind::Adaptive(a) => Some(a.case()),
            _ => None,
        }
    }

    pub(crate) fn is_adaptive(&self) -> bool {
        matches!(self.kind, SignalKind::Adaptive(_))
    }

    pub(crate) fn is_mirror(&self) -> bool {
        matches!(self.kind, SignalKind::Mirror(_))
    }

    /// Feeds the adaptive controller its visible vehicles, two lanes per
    /// axis. No-op for every other signal kind.
    pub(crate) fn sense(&mut self, own: [&[Sensed]; 2], cross: [&[Sensed]; 2]) {
        if let SignalKind::Adaptive(a) = &mut self.kind {
            a.sense(own, cross);
        }
    }

    /// Advances the signal by one step of `dt` seconds.
    pub(crate) fn time_step(&mut self, dt: f64, rng: &mut SmallRng) {
        let next = match &self.kind {
            SignalKind::Periodic {
                period,
                delay,
                green_ratio,
            } => (self.time + dt - delay).rem_euclid(*period) / period < *green_ratio,
            SignalKind::Memoryless {
                green_to_red,
                red_to_green,
            } => {
                if self.service {
                    !(rng.gen::<f64>() < dt * green_to_red)
                } else {
                    rng.gen::<f64>() < dt * red_to_green
                }
            }
            SignalKind::Adaptive(a) => a.service().unwrap_or(self.service),
            SignalKind::Mirror(other) => !other.get(),
        };
        self.switch = match (self.service, next) {
            (false, true) => 1,
            (true, false) => -1,
            _ => 0,
        };
        if self.switch < 0 {
            self.cycles += 1;
        }
        self.service = next;
        self.shared.set(next);
        self.history.push(next);
        self.time += dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn periodic_duty_cycle() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut signal = Signal::periodic(10.0, 0.0, 0.5, 32);
        let mut greens = 0;
        for _ in 0..10 {
            signal.time_step(1.0, &mut rng);
            greens += signal.service() as u32;
        }
        assert_eq!(greens, 5);
        assert_eq!(signal.cycles(), 1);
    }

    #[test]
    fn mirror_negates_every_step() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut primary = Signal::memoryless(0.3, 0.3, 64, &mut rng);
        let mut mirror = Signal::mirror_of(&primary, 64);
        for _ in 0..50 {
            primary.time_step(0.5, &mut rng);
            mirror.time_step(0.5, &mut rng);
            assert_ne!(primary.service(), mirror.service());
        }
    }
}
