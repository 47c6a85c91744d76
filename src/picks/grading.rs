//! Grade pending picks once their games are final, and bootstrap the graded record by
//! confidence tier.

use crate::backtest::bootstrap::{BootstrapEngine, BootstrapResult};
use crate::models::{BetOutcome, ConfidenceTier, GameRecord, Sport};
use crate::picks::{Pick, PickStatus};
use crate::settlement::grade_wager;
use crate::store::{GameRepository, PickRepository};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Outcome of a pick at its stored line, recomputed from the final score.
/// `None` while the game is not final.
pub fn grade_pick(pick: &Pick, game: &GameRecord) -> Option<PickStatus> {
    grade_wager(game, pick.side, pick.line).map(PickStatus::from)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GradeSummary {
    pub examined: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    /// Game not final yet
    pub still_pending: usize,
    /// Game id no longer present in the store
    pub missing_games: usize,
}

impl GradeSummary {
    pub fn graded(&self) -> usize {
        self.wins + self.losses + self.pushes
    }
}

/// Settle every pending pick whose game has a final score.
pub fn grade_pending<S>(store: &S, sport: Option<Sport>) -> Result<GradeSummary>
where
    S: GameRepository + PickRepository,
{
    let mut summary = GradeSummary::default();
    for pick in store.pending_picks(sport)? {
        summary.examined += 1;
        let Some(id) = pick.id else {
            continue;
        };
        let Some(game) = store.game(&pick.game_id)? else {
            warn!(pick = id, game = %pick.game_id, "pick references an unknown game");
            summary.missing_games += 1;
            continue;
        };
        match grade_pick(&pick, &game) {
            Some(status) => {
                store.update_pick_status(id, status)?;
                match status {
                    PickStatus::Win => summary.wins += 1,
                    PickStatus::Loss => summary.losses += 1,
                    PickStatus::Push => summary.pushes += 1,
                    PickStatus::Pending => {}
                }
            }
            None => summary.still_pending += 1,
        }
    }

    info!(
        examined = summary.examined,
        graded = summary.graded(),
        wins = summary.wins,
        losses = summary.losses,
        pushes = summary.pushes,
        "pending picks graded"
    );
    Ok(summary)
}

/// Settled pick outcomes grouped by reporting category.
///
/// Keys: `overall`, `tier:<tier>` (every tier, even when empty), `market:<market>`,
/// `sport:<SPORT>`. Pending picks are skipped.
pub fn pick_categories(picks: &[Pick]) -> BTreeMap<String, Vec<BetOutcome>> {
    let mut out: BTreeMap<String, Vec<BetOutcome>> = BTreeMap::new();
    out.insert("overall".to_string(), Vec::new());
    for tier in ConfidenceTier::ALL {
        out.insert(format!("tier:{}", tier.as_str()), Vec::new());
    }

    for pick in picks {
        let Some(outcome) = pick.status.outcome() else {
            continue;
        };
        let keys = [
            "overall".to_string(),
            format!("tier:{}", pick.tier.as_str()),
            format!("market:{}", pick.market.as_str()),
            format!("sport:{}", pick.sport.as_str()),
        ];
        for key in keys {
            out.entry(key).or_default().push(outcome);
        }
    }
    out
}

/// Bootstrap accuracy and ROI of every settled pick, per category.
pub fn pick_performance<S: PickRepository>(
    store: &S,
    sport: Option<Sport>,
    engine: &BootstrapEngine,
) -> Result<Vec<BootstrapResult>> {
    let picks = store.settled_picks(sport)?;
    let results = engine.resample_categories(&pick_categories(&picks));
    info!(
        settled = picks.len(),
        categories = results.len(),
        "pick performance bootstrapped"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::bootstrap::BootstrapConfig;
    use crate::models::{GameContext, Market, PickSide, SpreadResult};
    use crate::store::SqliteStore;
    use chrono::{NaiveDate, Utc};

    fn game(id: &str, score: Option<(i32, i32)>) -> GameRecord {
        GameRecord {
            id: id.to_string(),
            sport: Sport::Ncaaf,
            season: 2023,
            week: Some("12".to_string()),
            game_date: NaiveDate::from_ymd_opt(2023, 11, 25).unwrap(),
            home_team: "Michigan".to_string(),
            away_team: "Ohio State".to_string(),
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            spread: Some(-3.0),
            over_under: Some(47.5),
            home_moneyline: None,
            away_moneyline: None,
            // Deliberately wrong label; grading must not read it
            spread_result: Some(SpreadResult::Lost),
            ou_result: None,
            context: GameContext::default(),
        }
    }

    fn pick(game_id: &str, side: PickSide, line: f64) -> Pick {
        Pick {
            id: None,
            pick_date: NaiveDate::from_ymd_opt(2023, 11, 25).unwrap(),
            sport: Sport::Ncaaf,
            game_id: game_id.to_string(),
            matchup: format!("{} Ohio State @ Michigan", game_id),
            market: side.market(),
            side,
            line,
            tier: ConfidenceTier::Base,
            trend_score: 40.0,
            edge: 2.0,
            predicted: 5.0,
            signals: Vec::new(),
            forced_by: None,
            status: PickStatus::Pending,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_grade_pick_recomputes_from_scores() {
        let g = game("g", Some((30, 24)));
        assert_eq!(grade_pick(&pick("g", PickSide::Home, -3.0), &g), Some(PickStatus::Win));
        assert_eq!(grade_pick(&pick("g", PickSide::Away, 3.0), &g), Some(PickStatus::Loss));
        assert_eq!(grade_pick(&pick("g", PickSide::Home, -6.0), &g), Some(PickStatus::Push));
        assert_eq!(grade_pick(&pick("g", PickSide::Over, 47.5), &g), Some(PickStatus::Win));
        assert_eq!(grade_pick(&pick("g", PickSide::Under, 54.0), &g), Some(PickStatus::Push));
        assert_eq!(grade_pick(&pick("g", PickSide::Home, -3.0), &game("g", None)), None);
    }

    #[test]
    fn test_grade_pending_settles_final_games_only() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert_games(&[game("final", Some((30, 24))), game("upcoming", None)])
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2023, 11, 25).unwrap();
        store
            .save_pick_run(
                date,
                Sport::Ncaaf,
                &[
                    pick("final", PickSide::Home, -3.0),
                    pick("final", PickSide::Under, 47.5),
                    pick("upcoming", PickSide::Away, 3.0),
                    pick("vanished", PickSide::Over, 50.0),
                ],
            )
            .unwrap();

        let summary = grade_pending(&store, Some(Sport::Ncaaf)).unwrap();
        assert_eq!(summary.examined, 4);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.still_pending, 1);
        assert_eq!(summary.missing_games, 1);
        assert_eq!(store.pending_picks(None).unwrap().len(), 2);

        // Regrading is a no-op for settled picks
        let again = grade_pending(&store, None).unwrap();
        assert_eq!(again.examined, 2);
        assert_eq!(again.graded(), 0);
        let stored = store.picks_for(date, Sport::Ncaaf).unwrap();
        assert_eq!(stored[0].status, PickStatus::Win);
        assert_eq!(stored[0].market, Market::Spread);
    }

    #[test]
    fn test_performance_breaks_down_by_tier() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_games(&[game("final", Some((30, 24)))]).unwrap();
        let date = NaiveDate::from_ymd_opt(2023, 11, 25).unwrap();

        let mut highest = pick("final", PickSide::Home, -3.0);
        highest.tier = ConfidenceTier::Highest;
        let mut middle = pick("final", PickSide::Away, 3.0);
        middle.tier = ConfidenceTier::Middle;
        let under = pick("final", PickSide::Under, 54.0);
        store
            .save_pick_run(date, Sport::Ncaaf, &[highest, middle, under])
            .unwrap();

        let engine = BootstrapEngine::new(BootstrapConfig {
            resamples: 200,
            ..BootstrapConfig::default()
        });
        // Nothing graded yet: tier categories exist but carry no count
        let before = pick_performance(&store, None, &engine).unwrap();
        let tier = |results: &[BootstrapResult], name: &str| {
            results.iter().find(|r| r.category == name).cloned().unwrap()
        };
        assert_eq!(tier(&before, "tier:highest").n, None);

        grade_pending(&store, None).unwrap();
        let after = pick_performance(&store, Some(Sport::Ncaaf), &engine).unwrap();

        let highest = tier(&after, "tier:highest");
        assert_eq!(highest.n, Some(1));
        assert_eq!(highest.accuracy, Some(1.0));
        let middle = tier(&after, "tier:middle");
        assert_eq!(middle.n, Some(1));
        assert_eq!(middle.accuracy, Some(0.0));
        // The base-tier under pushed at 54
        let base = tier(&after, "tier:base");
        assert_eq!(base.n, None);
        assert_eq!(base.pushes, 1);

        let overall = tier(&after, "overall");
        assert_eq!(overall.n, Some(2));
        assert_eq!(overall.pushes, 1);
        assert!(after.iter().any(|r| r.category == "market:spread"));
    }
}
