//! Bootstrap confidence intervals over pick outcomes.
//!
//! Each resample draws `n` decided wagers with replacement and records accuracy and ROI.
//! Pushes are refunded stakes and are excluded before resampling.
//!
//! Resample `b` uses a ChaCha8 stream seeded with the configured seed and stream id `b`,
//! so the result is identical regardless of how rayon schedules the work.

use crate::models::{break_even_rate, win_payout, BetOutcome};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_resamples")]
    pub resamples: usize,
    /// Two-sided interval coverage, e.g. 0.95
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_american_odds")]
    pub american_odds: i32,
}

fn default_resamples() -> usize {
    10_000
}
fn default_confidence() -> f64 {
    0.95
}
fn default_seed() -> u64 {
    42
}
fn default_american_odds() -> i32 {
    -110
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            resamples: default_resamples(),
            confidence: default_confidence(),
            seed: default_seed(),
            american_odds: default_american_odds(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub category: String,
    /// Decided wagers (wins + losses); `None` when nothing was decided
    pub n: Option<usize>,
    pub wins: usize,
    pub pushes: usize,
    pub accuracy: Option<f64>,
    pub accuracy_ci: Option<ConfidenceInterval>,
    pub roi: Option<f64>,
    pub roi_ci: Option<ConfidenceInterval>,
    pub break_even: f64,
    /// Lower accuracy bound clears break-even
    pub profitable: bool,
}

pub struct BootstrapEngine {
    config: BootstrapConfig,
}

impl BootstrapEngine {
    pub fn new(mut config: BootstrapConfig) -> Self {
        config.resamples = config.resamples.max(1);
        Self { config }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn resample(&self, category: &str, outcomes: &[BetOutcome]) -> BootstrapResult {
        let wins = outcomes.iter().filter(|o| **o == BetOutcome::Win).count();
        let losses = outcomes.iter().filter(|o| **o == BetOutcome::Loss).count();
        let pushes = outcomes.len() - wins - losses;
        let n = wins + losses;

        let payout = win_payout(self.config.american_odds);
        let break_even = break_even_rate(self.config.american_odds);

        if n == 0 {
            return BootstrapResult {
                category: category.to_string(),
                n: None,
                wins,
                pushes,
                accuracy: None,
                accuracy_ci: None,
                roi: None,
                roi_ci: None,
                break_even,
                profitable: false,
            };
        }

        let roi_of = |k: usize| (k as f64 * payout - (n - k) as f64) / n as f64;

        // Only the win count matters, so draw indices against a canonical wins-first layout
        let seed = self.config.seed;
        let mut resampled_wins: Vec<usize> = (0..self.config.resamples)
            .into_par_iter()
            .map(|b| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(b as u64);
                (0..n).filter(|_| rng.gen_range(0..n) < wins).count()
            })
            .collect();
        resampled_wins.sort_unstable();

        let (lo, hi) = percentile_indices(self.config.resamples, self.config.confidence);
        let (k_lo, k_hi) = (resampled_wins[lo], resampled_wins[hi]);

        let accuracy_ci = ConfidenceInterval {
            lower: k_lo as f64 / n as f64,
            upper: k_hi as f64 / n as f64,
        };
        let roi_ci = ConfidenceInterval {
            lower: roi_of(k_lo),
            upper: roi_of(k_hi),
        };

        debug!(
            category,
            n,
            wins,
            lower = accuracy_ci.lower,
            upper = accuracy_ci.upper,
            "bootstrap complete"
        );

        BootstrapResult {
            category: category.to_string(),
            n: Some(n),
            wins,
            pushes,
            accuracy: Some(wins as f64 / n as f64),
            accuracy_ci: Some(accuracy_ci),
            roi: Some(roi_of(wins)),
            roi_ci: Some(roi_ci),
            break_even,
            profitable: accuracy_ci.lower > break_even,
        }
    }

    pub fn resample_categories(
        &self,
        categories: &BTreeMap<String, Vec<BetOutcome>>,
    ) -> Vec<BootstrapResult> {
        categories
            .iter()
            .map(|(name, outcomes)| self.resample(name, outcomes))
            .collect()
    }

    /// Mean accuracy across resamples, for diagnostics.
    pub fn resampled_mean(&self, outcomes: &[BetOutcome]) -> Option<f64> {
        let wins = outcomes.iter().filter(|o| **o == BetOutcome::Win).count();
        let n = wins + outcomes.iter().filter(|o| **o == BetOutcome::Loss).count();
        if n == 0 {
            return None;
        }
        let seed = self.config.seed;
        let total: usize = (0..self.config.resamples)
            .into_par_iter()
            .map(|b| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(b as u64);
                (0..n).filter(|_| rng.gen_range(0..n) < wins).count()
            })
            .sum();
        Some(total as f64 / (n * self.config.resamples) as f64)
    }
}

/// Sorted-array indices bounding the central `confidence` mass of `resamples` values.
fn percentile_indices(resamples: usize, confidence: f64) -> (usize, usize) {
    let alpha = (1.0 - confidence) / 2.0;
    let last = resamples.saturating_sub(1);
    let lower = ((alpha * resamples as f64).floor() as usize).min(last);
    let upper = (((1.0 - alpha) * resamples as f64).ceil() as usize)
        .saturating_sub(1)
        .min(last);
    (lower, upper.max(lower))
}
