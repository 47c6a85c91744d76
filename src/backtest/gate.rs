//! Accuracy gates
//!
//! A gate pins a named report category to an accuracy range. Variance inside the range
//! passes; anything outside it (or an undefined accuracy) fails. Automation consumes the
//! aggregate verdict as a process exit code.

use crate::backtest::report::{pct, BacktestReport};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyGate {
    pub name: String,
    /// Report category, e.g. `overall`, `season:2022`, `direction:OVER`
    pub category: String,
    pub min_accuracy: f64,
    pub max_accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateVerdict {
    Pass,
    Fail,
}

impl fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateVerdict::Pass => f.pad("PASS"),
            GateVerdict::Fail => f.pad("FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: AccuracyGate,
    pub observed: Option<f64>,
    pub n: usize,
    pub verdict: GateVerdict,
}

impl AccuracyGate {
    pub fn check(&self, observed: Option<f64>, n: usize) -> GateResult {
        let verdict = match observed {
            Some(acc) if acc >= self.min_accuracy && acc <= self.max_accuracy => GateVerdict::Pass,
            _ => GateVerdict::Fail,
        };
        GateResult {
            gate: self.clone(),
            observed,
            n,
            verdict,
        }
    }

    pub fn evaluate(&self, report: &BacktestReport) -> GateResult {
        let result = match report.category(&self.category) {
            Some(r) => self.check(r.accuracy, r.n.unwrap_or(0)),
            None => self.check(None, 0),
        };
        match result.verdict {
            GateVerdict::Pass => info!(
                gate = %self.name,
                category = %self.category,
                observed = ?result.observed,
                n = result.n,
                "gate passed"
            ),
            GateVerdict::Fail => warn!(
                gate = %self.name,
                category = %self.category,
                observed = ?result.observed,
                n = result.n,
                min = self.min_accuracy,
                max = self.max_accuracy,
                "gate failed"
            ),
        }
        result
    }
}

pub fn evaluate_gates(gates: &[AccuracyGate], report: &BacktestReport) -> Vec<GateResult> {
    gates.iter().map(|g| g.evaluate(report)).collect()
}

/// 0 when every gate passes, 1 otherwise.
pub fn exit_code(results: &[GateResult]) -> i32 {
    if results.iter().all(|r| r.verdict == GateVerdict::Pass) {
        0
    } else {
        1
    }
}

pub fn render_results(results: &[GateResult]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<24} {:<18} {:>6} {:>8} {:>17} {:>7}\n",
        "GATE", "CATEGORY", "N", "ACC", "RANGE", "RESULT"
    ));
    for r in results {
        let range = format!(
            "[{:.1}, {:.1}]",
            r.gate.min_accuracy * 100.0,
            r.gate.max_accuracy * 100.0
        );
        out.push_str(&format!(
            "{:<24} {:<18} {:>6} {:>8} {:>17} {:>7}\n",
            r.gate.name,
            r.gate.category,
            r.n,
            pct(r.observed),
            range,
            r.verdict
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AccuracyGate {
        AccuracyGate {
            name: "totals".to_string(),
            category: "overall".to_string(),
            min_accuracy: 0.52,
            max_accuracy: 0.60,
        }
    }

    #[test]
    fn test_inside_range_passes() {
        assert_eq!(gate().check(Some(0.55), 400).verdict, GateVerdict::Pass);
        assert_eq!(gate().check(Some(0.52), 400).verdict, GateVerdict::Pass);
        assert_eq!(gate().check(Some(0.60), 400).verdict, GateVerdict::Pass);
    }

    #[test]
    fn test_outside_range_fails() {
        assert_eq!(gate().check(Some(0.51), 400).verdict, GateVerdict::Fail);
        assert_eq!(gate().check(Some(0.65), 400).verdict, GateVerdict::Fail);
    }

    #[test]
    fn test_undefined_accuracy_fails() {
        assert_eq!(gate().check(None, 0).verdict, GateVerdict::Fail);
    }

    #[test]
    fn test_exit_code() {
        let pass = gate().check(Some(0.55), 10);
        let fail = gate().check(Some(0.40), 10);
        assert_eq!(exit_code(&[pass.clone()]), 0);
        assert_eq!(exit_code(&[pass, fail]), 1);
        assert_eq!(exit_code(&[]), 0);
    }

    #[test]
    fn test_render_shows_verdicts() {
        let text = render_results(&[gate().check(Some(0.55), 10), gate().check(None, 0)]);
        assert!(text.contains("PASS"));
        assert!(text.contains("FAIL"));
        assert!(text.contains("N/A"));
    }
}
