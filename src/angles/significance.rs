//! Significance testing against a fair 50% line.
//!
//! `z = (rate - 0.5) / sqrt(0.25 / n)`, two-tailed `p = 2 * (1 - Φ(|z|))`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Noise,
    Weak,
    Moderate,
    Strong,
}

impl Strength {
    pub fn from_p_value(p: Option<f64>) -> Self {
        match p {
            Some(p) if p < 0.01 => Strength::Strong,
            Some(p) if p < 0.05 => Strength::Moderate,
            Some(p) if p < 0.10 => Strength::Weak,
            _ => Strength::Noise,
        }
    }

    /// Bonus added to the interest score.
    pub fn bonus(&self) -> f64 {
        match self {
            Strength::Strong => 10.0,
            Strength::Moderate => 6.0,
            Strength::Weak => 3.0,
            Strength::Noise => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::Strong => "strong",
            Strength::Moderate => "moderate",
            Strength::Weak => "weak",
            Strength::Noise => "noise",
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceTest {
    pub n: usize,
    pub rate: Option<f64>,
    pub z_score: Option<f64>,
    pub p_value: Option<f64>,
    pub strength: Strength,
}

/// Test `wins` out of `wins + losses` against a 50% null. Pushes never enter `n`.
pub fn test_rate(wins: usize, losses: usize) -> SignificanceTest {
    let n = wins + losses;
    if n == 0 {
        return SignificanceTest {
            n,
            rate: None,
            z_score: None,
            p_value: None,
            strength: Strength::Noise,
        };
    }

    let rate = wins as f64 / n as f64;
    let z = (rate - 0.5) / (0.25 / n as f64).sqrt();
    let p = two_tailed_p(z);
    SignificanceTest {
        n,
        rate: Some(rate),
        z_score: Some(z),
        p_value: p,
        strength: Strength::from_p_value(p),
    }
}

pub fn two_tailed_p(z: f64) -> Option<f64> {
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some((2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0))
}

/// `effect% × min(1, ln(1+n)/ln(1001)) + strength bonus`.
pub fn interest_score(test: &SignificanceTest) -> f64 {
    let Some(rate) = test.rate else {
        return 0.0;
    };
    let effect_pct = (rate - 0.5).abs() * 100.0;
    let sample_weight = ((1.0 + test.n as f64).ln() / 1001f64.ln()).min(1.0);
    effect_pct * sample_weight + test.strength.bonus()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sample_is_noise() {
        let t = test_rate(0, 0);
        assert_eq!(t.strength, Strength::Noise);
        assert_eq!(t.z_score, None);
        assert_eq!(t.p_value, None);
        assert_eq!(interest_score(&t), 0.0);
    }

    #[test]
    fn test_strong_effect_at_thousand_trials() {
        let t = test_rate(650, 350);
        assert!(t.p_value.unwrap() < 0.01);
        assert_eq!(t.strength, Strength::Strong);
        // z = 0.15 / sqrt(0.25/1000)
        assert!((t.z_score.unwrap() - 9.4868).abs() < 1e-3);
    }

    #[test]
    fn test_even_record_is_noise() {
        let t = test_rate(50, 50);
        assert_eq!(t.z_score, Some(0.0));
        assert!((t.p_value.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(t.strength, Strength::Noise);
    }

    #[test]
    fn test_strength_boundaries() {
        // n = 100: z = 2 * (rate - 0.5) * 10
        assert_eq!(test_rate(59, 41).strength, Strength::Weak); // z = 1.8, p ≈ 0.072
        assert_eq!(test_rate(61, 39).strength, Strength::Moderate); // z = 2.2, p ≈ 0.028
        assert_eq!(test_rate(64, 36).strength, Strength::Strong); // z = 2.8, p ≈ 0.005
        assert_eq!(test_rate(55, 45).strength, Strength::Noise); // z = 1.0
    }

    #[test]
    fn test_negative_effects_are_symmetric() {
        let up = test_rate(60, 40);
        let down = test_rate(40, 60);
        assert!((up.p_value.unwrap() - down.p_value.unwrap()).abs() < 1e-12);
        assert!((interest_score(&up) - interest_score(&down)).abs() < 1e-12);
    }

    #[test]
    fn test_interest_score_saturates_with_sample() {
        let t = test_rate(6_000, 4_000);
        assert!((interest_score(&t) - (10.0 + 10.0)).abs() < 1e-9);
    }
}
