//! Settlement Recompute
//!
//! Spread and total labels are always derived from final scores and the published
//! line. Labels supplied by an upstream feed are compared against the recomputed
//! values; the recomputed value wins.

use crate::models::{BetOutcome, GameRecord, PickSide, SpreadResult, TeamSide, TotalResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Home-perspective spread result: margin = (home - away) + spread.
pub fn spread_result(home_score: i32, away_score: i32, spread: f64) -> SpreadResult {
    let margin = (home_score - away_score) as f64 + spread;
    if margin > 0.0 {
        SpreadResult::Covered
    } else if margin < 0.0 {
        SpreadResult::Lost
    } else {
        SpreadResult::Push
    }
}

pub fn total_result(home_score: i32, away_score: i32, over_under: f64) -> TotalResult {
    let total = (home_score + away_score) as f64;
    if total > over_under {
        TotalResult::Over
    } else if total < over_under {
        TotalResult::Under
    } else {
        TotalResult::Push
    }
}

/// ATS result for either side, computed from that side's own score and handicap.
pub fn ats_result_for(game: &GameRecord, side: TeamSide) -> Option<SpreadResult> {
    let own = game.score(side)?;
    let other = game.score(side.opponent())?;
    let handicap = game.handicap_for(side)?;
    Some(spread_result(own, other, handicap))
}

pub fn recomputed_spread_result(game: &GameRecord) -> Option<SpreadResult> {
    ats_result_for(game, TeamSide::Home)
}

pub fn recomputed_total_result(game: &GameRecord) -> Option<TotalResult> {
    Some(total_result(game.home_score?, game.away_score?, game.over_under?))
}

/// Grade a wager at a fixed line against the final score.
///
/// `line` is the handicap of the picked team for spread sides and the total for
/// over/under sides. Returns `None` while the game has no final score.
pub fn grade_wager(game: &GameRecord, side: PickSide, line: f64) -> Option<BetOutcome> {
    let home = game.home_score?;
    let away = game.away_score?;
    let margin = match side {
        PickSide::Home => (home - away) as f64 + line,
        PickSide::Away => (away - home) as f64 + line,
        PickSide::Over => (home + away) as f64 - line,
        PickSide::Under => line - (home + away) as f64,
    };
    Some(if margin > 0.0 {
        BetOutcome::Win
    } else if margin < 0.0 {
        BetOutcome::Loss
    } else {
        BetOutcome::Push
    })
}

/// What to do with games whose supplied labels disagree with the recomputed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Replace the supplied label and keep the game.
    #[default]
    Overwrite,
    /// Hold the game out of every computation for manual review.
    Quarantine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelField {
    Spread,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMismatch {
    pub game_id: String,
    pub field: LabelField,
    pub supplied: String,
    pub recomputed: String,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub games: Vec<GameRecord>,
    pub quarantined: Vec<GameRecord>,
    pub mismatches: Vec<LabelMismatch>,
}

/// Recompute settlement labels for every final game.
pub fn reconcile(games: Vec<GameRecord>, policy: MismatchPolicy) -> Reconciliation {
    let mut out = Reconciliation {
        games: Vec::with_capacity(games.len()),
        ..Default::default()
    };

    for mut game in games {
        let spread = recomputed_spread_result(&game);
        let total = recomputed_total_result(&game);
        let before = out.mismatches.len();

        if let (Some(supplied), Some(recomputed)) = (game.spread_result, spread) {
            if supplied != recomputed {
                out.mismatches.push(LabelMismatch {
                    game_id: game.id.clone(),
                    field: LabelField::Spread,
                    supplied: supplied.as_str().to_string(),
                    recomputed: recomputed.as_str().to_string(),
                });
            }
        }
        if let (Some(supplied), Some(recomputed)) = (game.ou_result, total) {
            if supplied != recomputed {
                out.mismatches.push(LabelMismatch {
                    game_id: game.id.clone(),
                    field: LabelField::Total,
                    supplied: supplied.as_str().to_string(),
                    recomputed: recomputed.as_str().to_string(),
                });
            }
        }

        let mismatched = out.mismatches.len() > before;
        for m in &out.mismatches[before..] {
            warn!(
                game_id = %m.game_id,
                field = ?m.field,
                supplied = %m.supplied,
                recomputed = %m.recomputed,
                policy = ?policy,
                "settlement label disagrees with final score"
            );
        }

        if mismatched && policy == MismatchPolicy::Quarantine {
            out.quarantined.push(game);
            continue;
        }

        game.spread_result = spread;
        game.ou_result = total;
        out.games.push(game);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GameContext, Sport};
    use chrono::NaiveDate;

    fn final_game(home: i32, away: i32, spread: f64, total: f64) -> GameRecord {
        GameRecord {
            id: format!("g-{}-{}", home, away),
            sport: Sport::Nfl,
            season: 2021,
            week: Some("5".to_string()),
            game_date: NaiveDate::from_ymd_opt(2021, 10, 10).unwrap(),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            home_score: Some(home),
            away_score: Some(away),
            spread: Some(spread),
            over_under: Some(total),
            home_moneyline: None,
            away_moneyline: None,
            spread_result: None,
            ou_result: None,
            context: GameContext::default(),
        }
    }

    #[test]
    fn test_spread_result_home_handicap() {
        // Home favored by 3, wins by 7
        assert_eq!(spread_result(24, 17, -3.0), SpreadResult::Covered);
        // Home favored by 7, wins by 7
        assert_eq!(spread_result(24, 17, -7.0), SpreadResult::Push);
        // Home dog +3.5, loses by 4
        assert_eq!(spread_result(20, 24, 3.5), SpreadResult::Lost);
    }

    #[test]
    fn test_away_result_mirrors_home() {
        let g = final_game(20, 24, 3.5, 44.0);
        assert_eq!(ats_result_for(&g, TeamSide::Home), Some(SpreadResult::Lost));
        assert_eq!(ats_result_for(&g, TeamSide::Away), Some(SpreadResult::Covered));
        assert_eq!(recomputed_total_result(&g), Some(TotalResult::Push));
    }

    #[test]
    fn test_grade_wager_uses_pick_line() {
        let g = final_game(27, 20, -6.5, 47.5);
        assert_eq!(grade_wager(&g, PickSide::Home, -6.5), Some(BetOutcome::Win));
        assert_eq!(grade_wager(&g, PickSide::Away, 6.5), Some(BetOutcome::Loss));
        assert_eq!(grade_wager(&g, PickSide::Home, -7.0), Some(BetOutcome::Push));
        assert_eq!(grade_wager(&g, PickSide::Under, 47.5), Some(BetOutcome::Win));
        assert_eq!(grade_wager(&g, PickSide::Over, 47.5), Some(BetOutcome::Loss));
        assert_eq!(grade_wager(&g, PickSide::Over, 47.0), Some(BetOutcome::Push));
    }

    #[test]
    fn test_reconcile_overwrites_bad_labels() {
        let mut g = final_game(27, 20, -6.5, 47.5);
        g.spread_result = Some(SpreadResult::Lost);
        g.ou_result = Some(TotalResult::Under);

        let rec = reconcile(vec![g], MismatchPolicy::Overwrite);
        assert_eq!(rec.games.len(), 1);
        assert_eq!(rec.mismatches.len(), 1);
        assert_eq!(rec.mismatches[0].field, LabelField::Spread);
        assert_eq!(rec.games[0].spread_result, Some(SpreadResult::Covered));
        assert_eq!(rec.games[0].ou_result, Some(TotalResult::Under));
    }

    #[test]
    fn test_reconcile_quarantine_holds_out_game() {
        let mut bad = final_game(27, 20, -6.5, 47.5);
        bad.ou_result = Some(TotalResult::Over);
        let good = final_game(10, 13, 1.0, 38.0);

        let rec = reconcile(vec![bad, good], MismatchPolicy::Quarantine);
        assert_eq!(rec.games.len(), 1);
        assert_eq!(rec.quarantined.len(), 1);
        assert_eq!(rec.quarantined[0].ou_result, Some(TotalResult::Over));
        assert_eq!(rec.games[0].spread_result, Some(SpreadResult::Lost));
    }

    #[test]
    fn test_upcoming_game_has_no_labels() {
        let mut g = final_game(0, 0, -3.0, 41.0);
        g.home_score = None;
        g.away_score = None;
        assert_eq!(recomputed_spread_result(&g), None);
        assert_eq!(grade_wager(&g, PickSide::Over, 41.0), None);
    }
}
