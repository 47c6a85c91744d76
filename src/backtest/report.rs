//! Plain-text backtest report
//!
//! Fixed-width tables: season-by-season results, the aggregate row, per-season
//! coefficients, edge calibration and bootstrap intervals per category. Undefined
//! statistics render as `N/A`.

use crate::backtest::bootstrap::{BootstrapEngine, BootstrapResult, ConfidenceInterval};
use crate::backtest::features::Target;
use crate::backtest::walk_forward::{
    EdgeThresholdAccuracy, Record, SeasonStatus, SkipReason, WalkForwardReport,
};
use crate::models::Sport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const RULE: &str =
    "==========================================================================================";
const THIN_RULE: &str =
    "------------------------------------------------------------------------------------------";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub sport: Sport,
    pub target: Target,
    pub generated_at: DateTime<Utc>,
    pub walk_forward: WalkForwardReport,
    pub calibration: Vec<EdgeThresholdAccuracy>,
    pub bootstrap: Vec<BootstrapResult>,
}

impl BacktestReport {
    pub fn build(sport: Sport, walk_forward: WalkForwardReport, engine: &BootstrapEngine) -> Self {
        let calibration = walk_forward.edge_calibration();
        let bootstrap = engine.resample_categories(&walk_forward.category_outcomes());
        Self {
            sport,
            target: walk_forward.target,
            generated_at: Utc::now(),
            walk_forward,
            calibration,
            bootstrap,
        }
    }

    pub fn category(&self, name: &str) -> Option<&BootstrapResult> {
        self.bootstrap.iter().find(|r| r.category == name)
    }

    pub fn render(&self) -> String {
        let odds = self.walk_forward.config.american_odds;
        let mut out = String::new();

        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!(
            "BACKTEST REPORT  sport={}  target={}  min_edge={:.1}  lambda={}\n",
            self.sport,
            self.target,
            self.walk_forward.config.min_edge,
            self.walk_forward.config.lambda
        ));
        out.push_str(&format!(
            "generated {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if let Some(stats) = &self.walk_forward.match_stats {
            out.push_str(&format!(
                "snapshot match: {}/{} games ({})  same-day={} two-day={} lookback={}\n",
                stats.matched,
                stats.games_seen,
                pct(stats.match_rate()),
                stats.same_day_fallbacks,
                stats.two_day_fallbacks,
                stats.lookback_fallbacks
            ));
        }
        out.push_str(RULE);
        out.push('\n');

        // Season-by-season
        out.push_str(&format!(
            "{:<8} {:<14} {:>7} {:>6} {:>6} {:>5} {:>5} {:>5} {:>8} {:>8}\n",
            "SEASON", "STATUS", "TRAIN", "TEST", "PICKS", "W", "L", "P", "ACC", "ROI"
        ));
        out.push_str(THIN_RULE);
        out.push('\n');
        for season in &self.walk_forward.seasons {
            let status = match &season.status {
                SeasonStatus::Evaluated => "evaluated".to_string(),
                SeasonStatus::Skipped {
                    reason: SkipReason::InsufficientTraining { .. },
                } => "insufficient".to_string(),
                SeasonStatus::Skipped {
                    reason: SkipReason::NoTestRows,
                } => "no test rows".to_string(),
            };
            out.push_str(&record_row(
                &season.season.to_string(),
                &status,
                season.training_rows,
                season.test_rows,
                &season.record,
                odds,
            ));
        }
        out.push_str(THIN_RULE);
        out.push('\n');
        let tested_rows: usize = self
            .walk_forward
            .evaluated_seasons()
            .map(|s| s.test_rows)
            .sum();
        out.push_str(&record_row(
            "ALL",
            "aggregate",
            0,
            tested_rows,
            &self.walk_forward.overall,
            odds,
        ));
        out.push('\n');

        // Coefficients
        out.push_str("COEFFICIENTS\n");
        out.push_str(THIN_RULE);
        out.push('\n');
        let names = self.target.feature_names();
        out.push_str(&format!("{:<8} {:>12}", "SEASON", "intercept"));
        for name in names {
            out.push_str(&format!(" {:>12}", name));
        }
        out.push('\n');
        for season in self.walk_forward.evaluated_seasons() {
            if let Some(model) = &season.model {
                out.push_str(&format!(
                    "{:<8} {:>12.4}",
                    season.season, model.coefficients.intercept
                ));
                for w in &model.coefficients.weights {
                    out.push_str(&format!(" {:>12.4}", w));
                }
                out.push('\n');
            }
        }
        out.push('\n');

        // Edge calibration
        out.push_str("EDGE CALIBRATION (all predictions)\n");
        out.push_str(THIN_RULE);
        out.push('\n');
        out.push_str(&format!(
            "{:<10} {:>7} {:>8} {:>8}\n",
            "|EDGE|>=", "N", "ACC", "ROI"
        ));
        for row in &self.calibration {
            out.push_str(&format!(
                "{:<10.1} {:>7} {:>8} {:>8}\n",
                row.threshold,
                row.record.decided(),
                pct(row.record.accuracy()),
                signed_pct(row.record.roi(odds))
            ));
        }
        out.push('\n');

        // Bootstrap
        out.push_str("BOOTSTRAP CONFIDENCE INTERVALS (picks)\n");
        out.push_str(THIN_RULE);
        out.push('\n');
        out.push_str(&format!(
            "{:<18} {:>6} {:>8} {:>17} {:>8} {:>17} {:>5}\n",
            "CATEGORY", "N", "ACC", "ACC CI", "ROI", "ROI CI", "PROF"
        ));
        for r in &self.bootstrap {
            out.push_str(&format!(
                "{:<18} {:>6} {:>8} {:>17} {:>8} {:>17} {:>5}\n",
                r.category,
                r.n.map_or_else(|| "N/A".to_string(), |n| n.to_string()),
                pct(r.accuracy),
                interval(r.accuracy_ci, false),
                signed_pct(r.roi),
                interval(r.roi_ci, true),
                if r.profitable { "YES" } else { "NO" }
            ));
        }
        out.push_str(RULE);
        out.push('\n');
        out
    }
}

fn record_row(
    label: &str,
    status: &str,
    training_rows: usize,
    test_rows: usize,
    record: &Record,
    odds: i32,
) -> String {
    format!(
        "{:<8} {:<14} {:>7} {:>6} {:>6} {:>5} {:>5} {:>5} {:>8} {:>8}\n",
        label,
        status,
        training_rows,
        test_rows,
        record.wins + record.losses + record.pushes,
        record.wins,
        record.losses,
        record.pushes,
        pct(record.accuracy()),
        signed_pct(record.roi(odds))
    )
}

/// Percentage to one decimal place, or `N/A`.
pub fn pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "N/A".to_string(),
    }
}

pub fn signed_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.1}%", v * 100.0),
        None => "N/A".to_string(),
    }
}

fn interval(ci: Option<ConfidenceInterval>, signed: bool) -> String {
    match ci {
        Some(ci) if signed => format!("[{:+.1}, {:+.1}]", ci.lower * 100.0, ci.upper * 100.0),
        Some(ci) => format!("[{:.1}, {:.1}]", ci.lower * 100.0, ci.upper * 100.0),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::bootstrap::BootstrapConfig;
    use crate::backtest::walk_forward::{SeasonReport, WalkForwardConfig};

    fn empty_report() -> WalkForwardReport {
        WalkForwardReport {
            target: Target::Total,
            config: WalkForwardConfig::default(),
            seasons: vec![SeasonReport {
                season: 2021,
                status: SeasonStatus::Skipped {
                    reason: SkipReason::InsufficientTraining {
                        rows: 12,
                        required: 100,
                    },
                },
                training_rows: 12,
                test_rows: 40,
                max_training_season: None,
                model: None,
                predictions: Vec::new(),
                record: Record::default(),
            }],
            overall: Record::default(),
            match_stats: None,
        }
    }

    #[test]
    fn test_percentages_have_one_decimal() {
        assert_eq!(pct(Some(0.5534)), "55.3%");
        assert_eq!(pct(None), "N/A");
        assert_eq!(signed_pct(Some(0.051)), "+5.1%");
        assert_eq!(signed_pct(Some(-0.2)), "-20.0%");
    }

    #[test]
    fn test_empty_statistics_render_na() {
        let engine = BootstrapEngine::new(BootstrapConfig {
            resamples: 100,
            ..BootstrapConfig::default()
        });
        let report = BacktestReport::build(Sport::Ncaamb, empty_report(), &engine);
        let text = report.render();

        assert!(text.contains("insufficient"));
        assert!(text.contains("N/A"));
        assert!(!text.contains("NaN"));
        let overall = report.category("overall").unwrap();
        assert_eq!(overall.n, None);
        assert_eq!(overall.accuracy, None);
    }
}
