/// An immutable, sorted view of the values retained by a reservoir.
///
/// Statistics over an empty sample are all zero.
///
/// Quantiles use "nearest-rank with interpolation": for quantile `q` over `n` sorted values, the
/// position `q * (n - 1)` is computed and the result is linearly interpolated between the value at
/// `floor(position)` and the one after it.  The same rule applies to weighted samples so that the
/// two reservoir kinds agree on identical inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    values: Vec<i64>,
    weights: Option<Vec<f64>>,
    count: u64,
}

impl Sample {
    /// Creates a sample where every value carries the same weight.
    ///
    /// `count` is the total number of observations seen by the reservoir, which may exceed the
    /// number of retained values.
    pub fn uniform(mut values: Vec<i64>, count: u64) -> Sample {
        values.sort_unstable();
        Sample { values, weights: None, count }
    }

    /// Creates a sample from `(value, weight)` pairs.
    ///
    /// Weights are normalized so that they sum to one.  Non-positive or non-finite totals fall back
    /// to equal weights.
    pub fn weighted(mut pairs: Vec<(i64, f64)>, count: u64) -> Sample {
        pairs.sort_unstable_by_key(|(value, _)| *value);

        let total: f64 = pairs.iter().map(|(_, weight)| *weight).sum();
        let (values, weights): (Vec<i64>, Vec<f64>) = if total > 0.0 && total.is_finite() {
            pairs.into_iter().map(|(value, weight)| (value, weight / total)).unzip()
        } else {
            let len = pairs.len().max(1) as f64;
            pairs.into_iter().map(|(value, _)| (value, 1.0 / len)).unzip()
        };

        Sample { values, weights: Some(weights), count }
    }

    /// Creates an empty sample.
    pub fn empty() -> Sample {
        Sample { values: Vec::new(), weights: None, count: 0 }
    }

    /// Number of values retained in the sample.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the sample holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total number of observations seen by the reservoir that produced this sample.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The retained values, in ascending order.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Smallest retained value.
    pub fn min(&self) -> i64 {
        self.values.first().copied().unwrap_or(0)
    }

    /// Largest retained value.
    pub fn max(&self) -> i64 {
        self.values.last().copied().unwrap_or(0)
    }

    /// Arithmetic mean, weighted when the sample carries weights.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        match &self.weights {
            Some(weights) => {
                self.values.iter().zip(weights).map(|(v, w)| *v as f64 * w).sum()
            }
            None => {
                let sum: f64 = self.values.iter().map(|v| *v as f64).sum();
                sum / self.values.len() as f64
            }
        }
    }

    /// Standard deviation.
    ///
    /// Unweighted samples use the sample (n - 1) variance; weighted samples use the variance under
    /// their normalized weights.
    pub fn std_dev(&self) -> f64 {
        if self.values.len() <= 1 {
            return 0.0;
        }

        let mean = self.mean();
        let variance = match &self.weights {
            Some(weights) => self
                .values
                .iter()
                .zip(weights)
                .map(|(v, w)| {
                    let diff = *v as f64 - mean;
                    w * diff * diff
                })
                .sum::<f64>(),
            None => {
                let sum: f64 = self
                    .values
                    .iter()
                    .map(|v| {
                        let diff = *v as f64 - mean;
                        diff * diff
                    })
                    .sum();
                sum / (self.values.len() - 1) as f64
            }
        };

        variance.sqrt()
    }

    /// Value at the given quantile, interpolated between neighbouring ranks.
    ///
    /// `q` is clamped to `[0.0, 1.0]`; `NaN` is treated as 0.0.
    pub fn quantile(&self, q: f64) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return 0.0;
        }

        let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
        let position = q * (n - 1) as f64;
        let lower = position.floor() as usize;
        let upper = (lower + 1).min(n - 1);
        let fraction = position - lower as f64;

        let lo = self.values[lower] as f64;
        let hi = self.values[upper] as f64;
        lo + fraction * (hi - lo)
    }

    /// Median of the sample.
    pub fn median(&self) -> f64 {
        self.quantile(0.5)
    }
}
