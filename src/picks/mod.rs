//! Daily picks: signal convergence scoring, idempotent generation and grading.

pub mod generator;
pub mod grading;
pub mod scorer;
pub mod signals;

#[cfg(test)]
mod generator_tests;

use crate::models::{BetOutcome, ConfidenceTier, Market, PickSide, Sport};
use crate::picks::scorer::ScoredPick;
use crate::picks::signals::SignalContribution;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use generator::PickGenerator;
pub use grading::{grade_pick, grade_pending, pick_categories, pick_performance, GradeSummary};
pub use scorer::{ConvergenceScorer, OverrideCondition, OverrideRule, ScorerConfig};

/// Lifecycle of a persisted pick. Only PENDING picks are ever re-graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickStatus {
    Pending,
    Win,
    Loss,
    Push,
}

impl PickStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickStatus::Pending => "PENDING",
            PickStatus::Win => "WIN",
            PickStatus::Loss => "LOSS",
            PickStatus::Push => "PUSH",
        }
    }

    pub fn is_settled(&self) -> bool {
        *self != PickStatus::Pending
    }

    pub fn outcome(&self) -> Option<BetOutcome> {
        match self {
            PickStatus::Pending => None,
            PickStatus::Win => Some(BetOutcome::Win),
            PickStatus::Loss => Some(BetOutcome::Loss),
            PickStatus::Push => Some(BetOutcome::Push),
        }
    }
}

impl From<BetOutcome> for PickStatus {
    fn from(outcome: BetOutcome) -> Self {
        match outcome {
            BetOutcome::Win => PickStatus::Win,
            BetOutcome::Loss => PickStatus::Loss,
            BetOutcome::Push => PickStatus::Push,
        }
    }
}

impl fmt::Display for PickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PickStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PickStatus::Pending),
            "WIN" => Ok(PickStatus::Win),
            "LOSS" => Ok(PickStatus::Loss),
            "PUSH" => Ok(PickStatus::Push),
            other => Err(format!("unknown pick status '{}'", other)),
        }
    }
}

/// A graded recommendation. Natural key: (pick_date, sport, game_id, side), so two
/// meetings of the same teams on one date stay distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    /// Row id once persisted
    #[serde(default)]
    pub id: Option<i64>,
    pub pick_date: NaiveDate,
    pub sport: Sport,
    pub game_id: String,
    pub matchup: String,
    pub market: Market,
    pub side: PickSide,
    pub line: f64,
    pub tier: ConfidenceTier,
    pub trend_score: f64,
    pub edge: f64,
    pub predicted: f64,
    pub signals: Vec<SignalContribution>,
    #[serde(default)]
    pub forced_by: Option<String>,
    pub status: PickStatus,
    pub generated_at: DateTime<Utc>,
}

impl Pick {
    pub fn from_scored(
        pick_date: NaiveDate,
        sport: Sport,
        game_id: &str,
        matchup: String,
        scored: ScoredPick,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            pick_date,
            sport,
            game_id: game_id.to_string(),
            matchup,
            market: scored.market,
            side: scored.side,
            line: scored.line,
            tier: scored.tier,
            trend_score: scored.trend_score,
            edge: scored.edge,
            predicted: scored.predicted,
            signals: scored.signals,
            forced_by: scored.forced_by,
            status: PickStatus::Pending,
            generated_at,
        }
    }

    pub fn natural_key(&self) -> (NaiveDate, Sport, &str, PickSide) {
        (self.pick_date, self.sport, &self.game_id, self.side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_settled() {
        assert_eq!("WIN".parse::<PickStatus>().unwrap(), PickStatus::Win);
        assert!("won".parse::<PickStatus>().is_err());
        assert!(!PickStatus::Pending.is_settled());
        assert!(PickStatus::Push.is_settled());
        assert_eq!(PickStatus::from(BetOutcome::Loss), PickStatus::Loss);
    }

    #[test]
    fn test_status_json_is_uppercase() {
        assert_eq!(serde_json::to_string(&PickStatus::Pending).unwrap(), "\"PENDING\"");
    }
}
