//! Point-in-time backtesting
//!
//! games + snapshots -> settlement reconcile -> snapshot matcher -> walk-forward
//! (ridge per season) -> bootstrap per category -> report

pub mod bootstrap;
pub mod features;
pub mod gate;
pub mod regression;
pub mod report;
pub mod snapshot_matcher;
pub mod synthetic;
pub mod walk_forward;


use crate::config::EngineConfig;
use crate::models::{GameRecord, RatingSnapshot, Sport};
use crate::settlement::reconcile;
use anyhow::Result;
use bootstrap::BootstrapEngine;
use features::Target;
use report::BacktestReport;
use snapshot_matcher::{SnapshotIndex, SnapshotMatcher, TeamNameNormalizer};
use std::collections::HashMap;
use tracing::info;
use walk_forward::WalkForwardEvaluator;

/// Everything one batch run reads, loaded up front so the store session can close.
#[derive(Debug, Clone, Default)]
pub struct BacktestInputs {
    pub games: Vec<GameRecord>,
    pub snapshots: Vec<RatingSnapshot>,
    pub aliases: HashMap<String, String>,
}

pub fn run_backtest(
    sport: Sport,
    target: Target,
    inputs: BacktestInputs,
    config: &EngineConfig,
) -> Result<BacktestReport> {
    let reconciliation = reconcile(inputs.games, config.settlement.mismatch_policy);
    info!(
        %sport,
        games = reconciliation.games.len(),
        quarantined = reconciliation.quarantined.len(),
        mismatches = reconciliation.mismatches.len(),
        "settlement labels reconciled"
    );

    let matcher = SnapshotMatcher::new(
        SnapshotIndex::new(inputs.snapshots),
        TeamNameNormalizer::new(inputs.aliases),
        config.matcher.clone(),
    );
    let (rows, stats) = matcher.enrich(&reconciliation.games);

    let mut walk_forward =
        WalkForwardEvaluator::new(config.walk_forward.clone(), target).run(&rows)?;
    walk_forward.match_stats = Some(stats);

    let engine = BootstrapEngine::new(config.bootstrap.clone());
    Ok(BacktestReport::build(sport, walk_forward, &engine))
}
