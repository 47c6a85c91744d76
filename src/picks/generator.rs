//! Live pick generation for one (date, sport).
//!
//! Models are trained point-in-time on games strictly before the pick date, every game on
//! the slate is scored for both markets, and the run is persisted once. A repeated or
//! concurrent request for the same (date, sport) returns the stored set.

use crate::backtest::features::Target;
use crate::backtest::regression::TrainedModel;
use crate::backtest::snapshot_matcher::{
    EnrichedFeatureRow, SnapshotIndex, SnapshotMatcher, TeamNameNormalizer,
};
use crate::backtest::walk_forward::train_point_in_time;
use crate::config::EngineConfig;
use crate::models::{GameRecord, Sport};
use crate::picks::scorer::ConvergenceScorer;
use crate::picks::signals::SignalInputs;
use crate::picks::Pick;
use crate::settlement::reconcile;
use crate::store::{AliasRepository, GameRepository, PickRepository, SnapshotRepository};
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

pub struct PickGenerator<'a, S> {
    store: &'a S,
    config: &'a EngineConfig,
    scorer: ConvergenceScorer,
}

impl<'a, S> PickGenerator<'a, S>
where
    S: GameRepository + SnapshotRepository + AliasRepository + PickRepository,
{
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self {
            store,
            config,
            scorer: ConvergenceScorer::new(config.scorer.clone()),
        }
    }

    /// Idempotent entry point: returns the persisted picks for (date, sport).
    pub fn generate(&self, date: NaiveDate, sport: Sport) -> Result<Vec<Pick>> {
        if self.store.pick_run_exists(date, sport)? {
            info!(%date, %sport, "picks already generated; returning stored run");
            return self.store.picks_for(date, sport);
        }

        let picks = self.build(date, sport)?;
        if !self.store.save_pick_run(date, sport, &picks)? {
            info!(%date, %sport, "another request stored this run first");
        }
        self.store.picks_for(date, sport)
    }

    /// Score the slate without persisting anything.
    pub fn build(&self, date: NaiveDate, sport: Sport) -> Result<Vec<Pick>> {
        let games = self.store.games(sport)?;
        let (prior, slate): (Vec<GameRecord>, Vec<GameRecord>) = games
            .into_iter()
            .filter(|g| g.game_date <= date)
            .partition(|g| g.game_date < date);
        let history: Vec<GameRecord> = reconcile(
            prior.into_iter().filter(|g| g.is_final()).collect(),
            self.config.settlement.mismatch_policy,
        )
        .games;

        if slate.is_empty() {
            info!(%date, %sport, "no games on slate");
            return Ok(Vec::new());
        }

        let matcher = SnapshotMatcher::new(
            SnapshotIndex::new(self.store.snapshots(sport, None)?),
            TeamNameNormalizer::new(self.store.aliases(sport)?),
            self.config.matcher.clone(),
        );
        let (rows, _) = matcher.enrich(&history);

        let mut models: Vec<TrainedModel> = Vec::new();
        for target in [Target::Margin, Target::Total] {
            let trained = train_point_in_time(&rows, date, target, &self.config.walk_forward)?;
            if let Some(model) = trained {
                models.push(model);
            }
        }
        if models.is_empty() {
            warn!(%date, %sport, "no model could be trained; slate left unpicked");
            return Ok(Vec::new());
        }

        let slate_rows: Vec<EnrichedFeatureRow> = slate
            .iter()
            .filter_map(|game| {
                let row = matcher.resolve(game);
                if row.is_none() {
                    debug!(game_id = %game.id, "slate game has no rating snapshots");
                }
                row
            })
            .collect();
        let slate_tempo = mean(
            slate_rows
                .iter()
                .map(|r| (r.home.adj_tempo + r.away.adj_tempo) / 2.0),
        );

        let generated_at = Utc::now();
        let mut picks = Vec::new();
        for row in &slate_rows {
            for model in &models {
                let target = model.target;
                let Some(line) = target.line(row) else {
                    continue;
                };
                let predicted = model.predict(&target.features(row));
                let inputs = SignalInputs {
                    game: &row.game,
                    market: target.market(),
                    predicted,
                    line,
                    history: &history,
                    home_rating: Some(&row.home),
                    away_rating: Some(&row.away),
                    slate_tempo,
                };
                if let Some(scored) = self.scorer.score(sport, &inputs) {
                    picks.push(Pick::from_scored(
                        date,
                        sport,
                        &row.game.id,
                        row.game.matchup(),
                        scored,
                        generated_at,
                    ));
                }
            }
        }

        info!(
            %date,
            %sport,
            slate = slate.len(),
            resolved = slate_rows.len(),
            training_rows = models.first().map(|m| m.training_rows).unwrap_or(0),
            picks = picks.len(),
            forced = picks.iter().filter(|p| p.forced_by.is_some()).count(),
            "slate scored"
        );
        Ok(picks)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}
