/// A per-step series of samples, pre-sized for the run length.
#[derive(Clone, Debug, Default)]
pub struct TimeSeries {
    samples: Vec<f64>,
}

impl TimeSeries {
    /// Creates an empty series with room for `steps` samples.
    pub fn with_capacity(steps: usize) -> Self {
        Self {
            samples: Vec::with_capacity(steps),
        }
    }

    /// Appends a sample.
    pub(crate) fn push(&mut self, sample: f64) {
        self.samples.push(sample);
    }

    /// Appends the previous sample plus `delta`, for cumulative series.
    pub(crate) fn push_delta(&mut self, delta: f64) {
        self.samples.push(self.last() + delta);
    }

    /// The most recent sample, or `0.0` before any were recorded.
    pub fn last(&self) -> f64 {
        self.samples.last().copied().unwrap_or(0.0)
    }

    /// All recorded samples, one per step.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// The arithmetic mean of the samples, or `NaN` if there are none.
    pub fn mean(&self) -> f64 {
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}
