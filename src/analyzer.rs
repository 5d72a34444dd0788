//! Statistics over the keystroke history window.
//!
//! A feature is *distinguishing* once the window is full and its mean sits
//! more than `k` standard deviations away from the feature's threshold.
//! Only distinguishing features get a corrupted branch in the next table.

use serde::{Deserialize, Serialize};

use crate::FeatureVector;

/// Mean and standard deviation of one feature over the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    /// Number of samples.
    pub count: usize,
    /// Sample mean.
    pub mean: f64,
    /// Sample standard deviation (`n - 1` denominator, 0 for fewer than 2 samples).
    pub std_dev: f64,
}

impl FeatureStats {
    /// Compute statistics for one column of samples.
    pub fn from_samples(samples: &[f64]) -> Self {
        let count = samples.len();
        if count == 0 {
            return Self {
                count: 0,
                mean: 0.0,
                std_dev: 0.0,
            };
        }

        let mean = samples.iter().sum::<f64>() / count as f64;
        let std_dev = if count < 2 {
            0.0
        } else {
            let variance = samples
                .iter()
                .map(|&v| {
                    let diff = v - mean;
                    diff * diff
                })
                .sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        };

        Self {
            count,
            mean,
            std_dev,
        }
    }
}

/// Per-feature statistics for a history window of `feature_count`-long vectors.
pub fn column_stats(history: &[FeatureVector], feature_count: usize) -> Vec<FeatureStats> {
    (0..feature_count)
        .map(|i| {
            let column: Vec<f64> = history
                .iter()
                .map(|v| v.get(i).copied().unwrap_or_default())
                .collect();
            FeatureStats::from_samples(&column)
        })
        .collect()
}

/// Decide whether a feature is trustworthy as a discriminator.
///
/// Always false while `window_size < min_window`. Otherwise true iff
/// `|mean - threshold| > k * std_dev`; equality is not distinguishing.
pub fn classify(
    window_size: usize,
    mean: f64,
    std_dev: f64,
    threshold: f64,
    min_window: usize,
    k: f64,
) -> bool {
    if window_size < min_window {
        return false;
    }
    (mean - threshold).abs() > k * std_dev
}

/// Running tally of classification outcomes per feature.
///
/// Kept for observability; authentication never reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishingCounters {
    /// Times each feature was judged distinguishing.
    pub distinguishing: Vec<u64>,
    /// Times each feature was judged non-distinguishing.
    pub non_distinguishing: Vec<u64>,
}

impl DistinguishingCounters {
    /// Zeroed counters for `feature_count` features.
    pub fn new(feature_count: usize) -> Self {
        Self {
            distinguishing: vec![0; feature_count],
            non_distinguishing: vec![0; feature_count],
        }
    }

    /// Record one classification of `feature`.
    pub fn record(&mut self, feature: usize, is_distinguishing: bool) {
        let counters = if is_distinguishing {
            &mut self.distinguishing
        } else {
            &mut self.non_distinguishing
        };
        if let Some(slot) = counters.get_mut(feature) {
            *slot += 1;
        }
    }

    /// Share of all classifications that were distinguishing, in `[0, 1]`.
    pub fn distinguishing_ratio(&self) -> f64 {
        let yes: u64 = self.distinguishing.iter().sum();
        let no: u64 = self.non_distinguishing.iter().sum();
        if yes + no == 0 {
            0.0
        } else {
            yes as f64 / (yes + no) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = FeatureStats::from_samples(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        // Sample variance 32/7
        assert!((stats.std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_stats_degenerate() {
        let empty = FeatureStats::from_samples(&[]);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.std_dev, 0.0);

        let single = FeatureStats::from_samples(&[3.5]);
        assert_eq!(single.mean, 3.5);
        assert_eq!(single.std_dev, 0.0);

        let constant = FeatureStats::from_samples(&[0.0; 50]);
        assert_eq!(constant.mean, 0.0);
        assert_eq!(constant.std_dev, 0.0);
    }

    #[test]
    fn test_column_stats() {
        let history = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let stats = column_stats(&history, 2);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].mean, 2.0);
        assert_eq!(stats[1].std_dev, 0.0);
    }

    #[test]
    fn test_classify_warm_up() {
        // Far from threshold but window not yet full.
        assert!(!classify(49, 0.0, 0.0, 0.5, 50, 1.0));
        assert!(!classify(0, 100.0, 0.0, 0.5, 50, 1.0));
        assert!(classify(50, 0.0, 0.0, 0.5, 50, 1.0));
    }

    #[test]
    fn test_classify_boundary() {
        // |mean - threshold| == k * std_dev is not distinguishing.
        assert!(!classify(50, 1.0, 0.5, 0.5, 50, 1.0));
        assert!(classify(50, 1.0, 0.49, 0.5, 50, 1.0));
        assert!(!classify(50, 1.0, 0.51, 0.5, 50, 1.0));
        assert!(!classify(60, 0.5, 0.0, 0.5, 50, 1.0));
        assert!(classify(60, 0.0, 0.2, 0.5, 50, 2.0));
        assert!(!classify(60, 0.0, 0.25, 0.5, 50, 2.0));
    }

    #[test]
    fn test_counters() {
        let mut counters = DistinguishingCounters::new(3);
        counters.record(0, true);
        counters.record(0, false);
        counters.record(2, true);
        counters.record(7, true);
        assert_eq!(counters.distinguishing, vec![1, 0, 1]);
        assert_eq!(counters.non_distinguishing, vec![1, 0, 0]);
        assert!((counters.distinguishing_ratio() - 2.0 / 3.0).abs() < 1e-12);

        let json = serde_json::to_string(&counters).unwrap();
        let back: DistinguishingCounters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, counters);
    }
}
