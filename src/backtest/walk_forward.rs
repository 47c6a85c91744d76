//! Walk-Forward Evaluator
//!
//! Season-by-season protocol over the ridge model:
//!
//! ```text
//!   seasons:   S1    S2    S3    S4
//!   test S2:  [fit]  pred
//!   test S3:  [fit   fit]  pred
//!   test S4:  [fit   fit   fit]  pred
//! ```
//!
//! Every iteration re-fits from scratch on rows with `season < S`. No model survives
//! past the season it scores. Pushes never count as wins or losses, and a prediction
//! only becomes a scored pick when its edge is non-zero and `|edge| >= min_edge`.

use crate::backtest::features::{training_pairs, Target};
use crate::backtest::regression::{fit, TrainedModel};
use crate::backtest::snapshot_matcher::{EnrichedFeatureRow, MatchStats};
use crate::models::{BetOutcome, PickSide};
use anyhow::{ensure, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Seasons with fewer training rows are skipped
    #[serde(default = "default_min_training_rows")]
    pub min_training_rows: usize,
    /// Minimum |edge| for a prediction to count as a pick
    #[serde(default = "default_min_edge")]
    pub min_edge: f64,
    /// Ridge penalty
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Price every pick is assumed to be taken at
    #[serde(default = "default_american_odds")]
    pub american_odds: i32,
    /// |edge| thresholds for the calibration table
    #[serde(default = "default_edge_thresholds")]
    pub edge_thresholds: Vec<f64>,
    /// Edge bucket boundaries used for category breakdowns
    #[serde(default = "default_edge_buckets")]
    pub edge_buckets: Vec<f64>,
}

fn default_min_training_rows() -> usize {
    100
}
fn default_min_edge() -> f64 {
    1.5
}
fn default_lambda() -> f64 {
    1.0
}
fn default_american_odds() -> i32 {
    -110
}
fn default_edge_thresholds() -> Vec<f64> {
    vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
}
fn default_edge_buckets() -> Vec<f64> {
    vec![2.0, 4.0, 6.0]
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            min_training_rows: default_min_training_rows(),
            min_edge: default_min_edge(),
            lambda: default_lambda(),
            american_odds: default_american_odds(),
            edge_thresholds: default_edge_thresholds(),
            edge_buckets: default_edge_buckets(),
        }
    }
}

// =============================================================================
// TRAINING SET
// =============================================================================

/// Exclusive boundary on what a training set may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingBound {
    Season { before: i32 },
    Date { before: NaiveDate },
}

/// Final rows visible to a model fit. Only constructible through a bound.
#[derive(Debug, Clone)]
pub struct TrainingSet<'a> {
    rows: Vec<&'a EnrichedFeatureRow>,
    bound: TrainingBound,
}

impl<'a> TrainingSet<'a> {
    pub fn before_season(rows: &'a [EnrichedFeatureRow], season: i32) -> Self {
        Self {
            rows: rows
                .iter()
                .filter(|r| r.game.is_final() && r.season() < season)
                .collect(),
            bound: TrainingBound::Season { before: season },
        }
    }

    pub fn before_date(rows: &'a [EnrichedFeatureRow], date: NaiveDate) -> Self {
        Self {
            rows: rows
                .iter()
                .filter(|r| r.game.is_final() && r.game_date() < date)
                .collect(),
            bound: TrainingBound::Date { before: date },
        }
    }

    pub fn rows(&self) -> &[&'a EnrichedFeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn bound(&self) -> TrainingBound {
        self.bound
    }

    pub fn max_season(&self) -> Option<i32> {
        self.rows.iter().map(|r| r.season()).max()
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.game_date()).max()
    }

    /// True when no row crosses the bound.
    pub fn respects_bound(&self) -> bool {
        match self.bound {
            TrainingBound::Season { before } => self.max_season().map_or(true, |s| s < before),
            TrainingBound::Date { before } => self.max_date().map_or(true, |d| d < before),
        }
    }

    /// Fit a fresh model on this set. `None` when no row has a final score.
    pub fn fit(&self, target: Target, lambda: f64) -> Result<Option<TrainedModel>> {
        ensure!(self.respects_bound(), "training set crosses its bound {:?}", self.bound);

        let (x, y) = training_pairs(target, &self.rows);
        if x.is_empty() {
            return Ok(None);
        }
        let coefficients = fit(&x, &y, lambda)?;
        let trained_before_season = match self.bound {
            TrainingBound::Season { before } => before,
            TrainingBound::Date { .. } => self.max_season().map_or(0, |s| s + 1),
        };
        Ok(Some(TrainedModel {
            target,
            coefficients,
            lambda,
            trained_before_season,
            training_rows: x.len(),
        }))
    }
}

// =============================================================================
// RESULT TYPES
// =============================================================================

/// Win/loss/push tally. Pushes are refunds and never enter accuracy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
}

impl Record {
    pub fn add(&mut self, outcome: BetOutcome) {
        match outcome {
            BetOutcome::Win => self.wins += 1,
            BetOutcome::Loss => self.losses += 1,
            BetOutcome::Push => self.pushes += 1,
        }
    }

    pub fn merge(&mut self, other: &Record) {
        self.wins += other.wins;
        self.losses += other.losses;
        self.pushes += other.pushes;
    }

    pub fn decided(&self) -> usize {
        self.wins + self.losses
    }

    pub fn accuracy(&self) -> Option<f64> {
        let n = self.decided();
        if n == 0 {
            None
        } else {
            Some(self.wins as f64 / n as f64)
        }
    }

    /// Units won per unit staked over decided wagers.
    pub fn roi(&self, american_odds: i32) -> Option<f64> {
        let n = self.decided();
        if n == 0 {
            return None;
        }
        let payout = crate::models::win_payout(american_odds);
        Some((self.wins as f64 * payout - self.losses as f64) / n as f64)
    }
}

/// An edge is actionable when it clears `min_edge` and has a direction.
pub fn is_actionable_edge(edge: f64, min_edge: f64) -> bool {
    edge != 0.0 && edge.abs() >= min_edge
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub game_id: String,
    pub season: i32,
    pub game_date: NaiveDate,
    pub matchup: String,
    pub predicted: f64,
    pub line: f64,
    /// predicted - line
    pub edge: f64,
    pub direction: PickSide,
    pub actual: f64,
    pub outcome: BetOutcome,
    /// |edge| cleared the configured threshold
    pub is_pick: bool,
}

impl Prediction {
    fn new(model: &TrainedModel, row: &EnrichedFeatureRow, min_edge: f64) -> Option<Self> {
        let target = model.target;
        let actual = target.actual(row)?;
        let line = target.line(row)?;
        let predicted = model.predict(&target.features(row));
        let edge = predicted - line;
        let direction = target.direction(edge);

        let signed = (actual - line) * direction.sign();
        let outcome = if signed > 0.0 {
            BetOutcome::Win
        } else if signed < 0.0 {
            BetOutcome::Loss
        } else {
            BetOutcome::Push
        };

        Some(Self {
            game_id: row.game.id.clone(),
            season: row.season(),
            game_date: row.game_date(),
            matchup: row.game.matchup(),
            predicted,
            line,
            edge,
            direction,
            actual,
            outcome,
            is_pick: is_actionable_edge(edge, min_edge),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientTraining { rows: usize, required: usize },
    NoTestRows,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeasonStatus {
    Evaluated,
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonReport {
    pub season: i32,
    pub status: SeasonStatus,
    pub training_rows: usize,
    pub test_rows: usize,
    /// Highest season seen while training (always < `season`)
    pub max_training_season: Option<i32>,
    pub model: Option<TrainedModel>,
    pub predictions: Vec<Prediction>,
    pub record: Record,
}

impl SeasonReport {
    fn skipped(season: i32, training_rows: usize, test_rows: usize, reason: SkipReason) -> Self {
        Self {
            season,
            status: SeasonStatus::Skipped { reason },
            training_rows,
            test_rows,
            max_training_season: None,
            model: None,
            predictions: Vec::new(),
            record: Record::default(),
        }
    }

    pub fn picks(&self) -> impl Iterator<Item = &Prediction> {
        self.predictions.iter().filter(|p| p.is_pick)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeThresholdAccuracy {
    pub threshold: f64,
    pub record: Record,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub target: Target,
    pub config: WalkForwardConfig,
    pub seasons: Vec<SeasonReport>,
    pub overall: Record,
    pub match_stats: Option<MatchStats>,
}

impl WalkForwardReport {
    pub fn evaluated_seasons(&self) -> impl Iterator<Item = &SeasonReport> {
        self.seasons
            .iter()
            .filter(|s| s.status == SeasonStatus::Evaluated)
    }

    pub fn skipped_seasons(&self) -> Vec<i32> {
        self.seasons
            .iter()
            .filter(|s| s.status != SeasonStatus::Evaluated)
            .map(|s| s.season)
            .collect()
    }

    pub fn predictions(&self) -> impl Iterator<Item = &Prediction> {
        self.seasons.iter().flat_map(|s| s.predictions.iter())
    }

    pub fn picks(&self) -> impl Iterator<Item = &Prediction> {
        self.predictions().filter(|p| p.is_pick)
    }

    pub fn edge_calibration(&self) -> Vec<EdgeThresholdAccuracy> {
        let predictions: Vec<&Prediction> = self.predictions().collect();
        edge_calibration(&predictions, &self.config.edge_thresholds)
    }

    /// Pick outcomes grouped by reporting category.
    ///
    /// Keys: `overall`, `season:<year>`, `direction:<SIDE>`, `edge:<lo>-<hi>`.
    pub fn category_outcomes(&self) -> BTreeMap<String, Vec<BetOutcome>> {
        let mut out: BTreeMap<String, Vec<BetOutcome>> = BTreeMap::new();
        out.insert("overall".to_string(), Vec::new());

        for pick in self.picks() {
            let keys = [
                "overall".to_string(),
                format!("season:{}", pick.season),
                format!("direction:{}", pick.direction.as_str()),
                format!("edge:{}", edge_bucket_label(pick.edge.abs(), &self.config.edge_buckets)),
            ];
            for key in keys {
                out.entry(key).or_default().push(pick.outcome);
            }
        }
        out
    }
}

/// Label of the bucket containing `abs_edge`, e.g. `2-4` or `6+`.
pub fn edge_bucket_label(abs_edge: f64, boundaries: &[f64]) -> String {
    let mut lower = 0.0;
    for &upper in boundaries {
        if abs_edge < upper {
            return format!("{}-{}", lower, upper);
        }
        lower = upper;
    }
    format!("{}+", lower)
}

/// Accuracy of all predictions with `|edge| >= t` for each threshold.
pub fn edge_calibration(
    predictions: &[&Prediction],
    thresholds: &[f64],
) -> Vec<EdgeThresholdAccuracy> {
    thresholds
        .iter()
        .map(|&threshold| {
            let mut record = Record::default();
            for p in predictions.iter().filter(|p| p.edge.abs() >= threshold) {
                record.add(p.outcome);
            }
            EdgeThresholdAccuracy { threshold, record }
        })
        .collect()
}

// =============================================================================
// EVALUATOR
// =============================================================================

pub struct WalkForwardEvaluator {
    config: WalkForwardConfig,
    target: Target,
}

impl WalkForwardEvaluator {
    pub fn new(config: WalkForwardConfig, target: Target) -> Self {
        Self { config, target }
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    pub fn run(&self, rows: &[EnrichedFeatureRow]) -> Result<WalkForwardReport> {
        let seasons: BTreeSet<i32> = rows.iter().map(|r| r.season()).collect();
        info!(
            target = %self.target,
            rows = rows.len(),
            seasons = seasons.len(),
            min_edge = self.config.min_edge,
            lambda = self.config.lambda,
            "starting walk-forward evaluation"
        );

        let mut reports = Vec::with_capacity(seasons.len().saturating_sub(1));
        let mut overall = Record::default();

        for &season in seasons.iter().skip(1) {
            let report = self.evaluate_season(rows, season)?;
            overall.merge(&report.record);
            reports.push(report);
        }

        info!(
            target = %self.target,
            wins = overall.wins,
            losses = overall.losses,
            pushes = overall.pushes,
            accuracy = overall.accuracy().map(|a| a * 100.0),
            "walk-forward evaluation complete"
        );

        Ok(WalkForwardReport {
            target: self.target,
            config: self.config.clone(),
            seasons: reports,
            overall,
            match_stats: None,
        })
    }

    fn evaluate_season(&self, rows: &[EnrichedFeatureRow], season: i32) -> Result<SeasonReport> {
        let training = TrainingSet::before_season(rows, season);
        ensure!(
            training.max_season().map_or(true, |s| s < season),
            "leakage: training for {} contains season {:?}",
            season,
            training.max_season()
        );

        let test: Vec<&EnrichedFeatureRow> = rows
            .iter()
            .filter(|r| r.season() == season)
            .filter(|r| self.target.actual(r).is_some() && self.target.line(r).is_some())
            .collect();

        if training.len() < self.config.min_training_rows {
            warn!(
                season,
                training_rows = training.len(),
                required = self.config.min_training_rows,
                "insufficient training data; skipping season"
            );
            return Ok(SeasonReport::skipped(
                season,
                training.len(),
                test.len(),
                SkipReason::InsufficientTraining {
                    rows: training.len(),
                    required: self.config.min_training_rows,
                },
            ));
        }
        if test.is_empty() {
            warn!(season, "no gradable test rows; skipping season");
            return Ok(SeasonReport::skipped(
                season,
                training.len(),
                0,
                SkipReason::NoTestRows,
            ));
        }

        let Some(model) = training.fit(self.target, self.config.lambda)? else {
            return Ok(SeasonReport::skipped(
                season,
                training.len(),
                test.len(),
                SkipReason::InsufficientTraining {
                    rows: 0,
                    required: self.config.min_training_rows,
                },
            ));
        };

        let predictions: Vec<Prediction> = test
            .iter()
            .filter_map(|row| Prediction::new(&model, row, self.config.min_edge))
            .collect();

        let mut record = Record::default();
        for p in predictions.iter().filter(|p| p.is_pick) {
            record.add(p.outcome);
        }

        info!(
            season,
            training_rows = training.len(),
            test_rows = test.len(),
            picks = record.wins + record.losses + record.pushes,
            wins = record.wins,
            losses = record.losses,
            pushes = record.pushes,
            "season evaluated"
        );

        Ok(SeasonReport {
            season,
            status: SeasonStatus::Evaluated,
            training_rows: training.len(),
            test_rows: test.len(),
            max_training_season: training.max_season(),
            model: Some(model),
            predictions,
            record,
        })
    }
}

/// Fit a model on everything final before `date`, for live pick generation.
pub fn train_point_in_time(
    rows: &[EnrichedFeatureRow],
    date: NaiveDate,
    target: Target,
    config: &WalkForwardConfig,
) -> Result<Option<TrainedModel>> {
    let training = TrainingSet::before_date(rows, date);
    if training.len() < config.min_training_rows {
        warn!(
            %date,
            target = %target,
            training_rows = training.len(),
            required = config.min_training_rows,
            "insufficient point-in-time training data"
        );
        return Ok(None);
    }
    training.fit(target, config.lambda)
}
