//! Signal Convergence Scorer
//!
//! Trend score = Σ weight × signed strength over the signals that could be computed.
//! Tier comes from |trend score|. Override rules run afterwards in order; the first
//! match forces the side. Without an override a pick needs |model edge| ≥ `min_edge`
//! and a trend score pointing the same way as the edge.

use crate::backtest::walk_forward::is_actionable_edge;
use crate::models::{ConfidenceTier, Market, PickSide, Sport, TeamSide};
use crate::picks::signals::{
    head_to_head, market_divergence, model_edge, recent_form, season_record, situational,
    weather_pace, SignalContribution, SignalDetail, SignalInputs, SignalKind, SignalSettings,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_highest")]
    pub highest: f64,
    #[serde(default = "default_middle")]
    pub middle: f64,
}

fn default_highest() -> f64 {
    85.0
}
fn default_middle() -> f64 {
    70.0
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            highest: default_highest(),
            middle: default_middle(),
        }
    }
}

impl TierThresholds {
    pub fn assign(&self, trend_score: f64) -> ConfidenceTier {
        let magnitude = trend_score.abs();
        if magnitude >= self.highest {
            ConfidenceTier::Highest
        } else if magnitude >= self.middle {
            ConfidenceTier::Middle
        } else {
            ConfidenceTier::Base
        }
    }
}

/// Per-signal weights. The defaults sum to 100 so trend scores live in [-100, 100].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWeights {
    #[serde(default = "default_model_edge_weight")]
    pub model_edge: f64,
    #[serde(default = "default_market_divergence_weight")]
    pub market_divergence: f64,
    #[serde(default = "default_season_record_weight")]
    pub season_record: f64,
    #[serde(default = "default_recent_form_weight")]
    pub recent_form: f64,
    #[serde(default = "default_head_to_head_weight")]
    pub head_to_head: f64,
    #[serde(default = "default_situational_weight")]
    pub situational: f64,
    #[serde(default = "default_weather_pace_weight")]
    pub weather_pace: f64,
}

fn default_model_edge_weight() -> f64 {
    35.0
}
fn default_market_divergence_weight() -> f64 {
    15.0
}
fn default_season_record_weight() -> f64 {
    12.0
}
fn default_recent_form_weight() -> f64 {
    12.0
}
fn default_head_to_head_weight() -> f64 {
    8.0
}
fn default_situational_weight() -> f64 {
    10.0
}
fn default_weather_pace_weight() -> f64 {
    8.0
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            model_edge: default_model_edge_weight(),
            market_divergence: default_market_divergence_weight(),
            season_record: default_season_record_weight(),
            recent_form: default_recent_form_weight(),
            head_to_head: default_head_to_head_weight(),
            situational: default_situational_weight(),
            weather_pace: default_weather_pace_weight(),
        }
    }
}

impl SignalWeights {
    pub fn weight(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::ModelEdge => self.model_edge,
            SignalKind::MarketDivergence => self.market_divergence,
            SignalKind::SeasonRecord => self.season_record,
            SignalKind::RecentForm => self.recent_form,
            SignalKind::HeadToHead => self.head_to_head,
            SignalKind::Situational => self.situational,
            SignalKind::WeatherPace => self.weather_pace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverrideCondition {
    /// Both teams ranked at or better than `max_rank` on the snapshot used for the game
    BothTopRanked { max_rank: u32 },
    /// Published total strictly above `threshold`
    TotalAbove { threshold: f64 },
    /// Published total strictly below `threshold`
    TotalBelow { threshold: f64 },
}

/// A contextual rule forcing the side of a pick. Rules apply only to the market of
/// the side they force.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRule {
    pub id: String,
    #[serde(default)]
    pub sports: Vec<Sport>,
    pub force: PickSide,
    pub condition: OverrideCondition,
    #[serde(default)]
    pub description: String,
}

impl OverrideRule {
    pub fn matches(&self, sport: Sport, inputs: &SignalInputs) -> bool {
        if inputs.market != self.force.market() {
            return false;
        }
        if !self.sports.is_empty() && !self.sports.contains(&sport) {
            return false;
        }
        match &self.condition {
            OverrideCondition::BothTopRanked { max_rank } => {
                match (inputs.home_rating, inputs.away_rating) {
                    (Some(h), Some(a)) => h.rank <= *max_rank && a.rank <= *max_rank,
                    _ => false,
                }
            }
            OverrideCondition::TotalAbove { threshold } => {
                inputs.game.over_under.map_or(false, |t| t > *threshold)
            }
            OverrideCondition::TotalBelow { threshold } => {
                inputs.game.over_under.map_or(false, |t| t < *threshold)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Minimum |model edge| for a pick without an override
    #[serde(default = "default_min_edge")]
    pub min_edge: f64,
    #[serde(default)]
    pub tiers: TierThresholds,
    #[serde(default)]
    pub weights: SignalWeights,
    #[serde(default)]
    pub signals: SignalSettings,
    /// Evaluated in order, first match wins
    #[serde(default)]
    pub overrides: Vec<OverrideRule>,
}

fn default_min_edge() -> f64 {
    1.5
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            min_edge: default_min_edge(),
            tiers: TierThresholds::default(),
            weights: SignalWeights::default(),
            signals: SignalSettings::default(),
            overrides: Vec::new(),
        }
    }
}

/// Scorer output for one game and market, before it becomes a persisted pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPick {
    pub market: Market,
    pub side: PickSide,
    /// Wager line: the picked team's handicap, or the published total
    pub line: f64,
    pub tier: ConfidenceTier,
    pub trend_score: f64,
    pub edge: f64,
    pub predicted: f64,
    pub signals: Vec<SignalContribution>,
    pub forced_by: Option<String>,
}

pub struct ConvergenceScorer {
    config: ScorerConfig,
}

impl ConvergenceScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Every signal computable from the inputs, in a fixed order.
    pub fn signals(&self, inputs: &SignalInputs) -> Vec<SignalContribution> {
        let settings = &self.config.signals;
        let computed: [Option<(f64, SignalDetail)>; 7] = [
            model_edge(inputs, settings),
            market_divergence(inputs, settings),
            season_record(inputs, settings),
            recent_form(inputs, settings),
            head_to_head(inputs, settings),
            situational(inputs, settings),
            weather_pace(inputs, settings),
        ];
        computed
            .into_iter()
            .flatten()
            .map(|(strength, detail)| {
                let weight = self.config.weights.weight(detail.kind());
                SignalContribution::new(inputs.market, weight, strength, detail)
            })
            .collect()
    }

    pub fn score(&self, sport: Sport, inputs: &SignalInputs) -> Option<ScoredPick> {
        let signals = self.signals(inputs);
        let trend_score: f64 = signals.iter().map(|s| s.contribution()).sum();
        let tier = self.config.tiers.assign(trend_score);
        let edge = inputs.edge();

        let forced = self
            .config
            .overrides
            .iter()
            .find(|rule| rule.matches(sport, inputs));

        let side = match forced {
            Some(rule) => rule.force,
            None => {
                if !is_actionable_edge(edge, self.config.min_edge) || trend_score == 0.0 {
                    return None;
                }
                if trend_score.signum() != edge.signum() {
                    debug!(
                        game = %inputs.game.id,
                        edge,
                        trend_score,
                        "signals diverge from model edge"
                    );
                    return None;
                }
                PickSide::from_sign(inputs.market, edge)
            }
        };

        let line = wager_line(inputs, side)?;
        Some(ScoredPick {
            market: inputs.market,
            side,
            line,
            tier,
            trend_score,
            edge,
            predicted: inputs.predicted,
            signals,
            forced_by: forced.map(|rule| rule.id.clone()),
        })
    }
}

/// The line a wager on `side` is graded against.
pub fn wager_line(inputs: &SignalInputs, side: PickSide) -> Option<f64> {
    let game = inputs.game;
    match side {
        PickSide::Home => game.handicap_for(TeamSide::Home),
        PickSide::Away => game.handicap_for(TeamSide::Away),
        PickSide::Over | PickSide::Under => game.over_under,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GameContext, GameRecord, RatingSnapshot};
    use chrono::NaiveDate;

    fn upcoming(spread: f64, total: f64) -> GameRecord {
        GameRecord {
            id: "ncaamb-2024-00001".to_string(),
            sport: Sport::Ncaamb,
            season: 2024,
            week: None,
            game_date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            home_team: "Houston".to_string(),
            away_team: "Kansas".to_string(),
            home_score: None,
            away_score: None,
            spread: Some(spread),
            over_under: Some(total),
            home_moneyline: None,
            away_moneyline: None,
            spread_result: None,
            ou_result: None,
            context: GameContext::default(),
        }
    }

    fn rating(team: &str, rank: u32) -> RatingSnapshot {
        RatingSnapshot {
            team: team.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 2, 9).unwrap(),
            season: 2024,
            adj_oe: 115.0,
            adj_de: 92.0,
            adj_em: 23.0,
            adj_tempo: 66.0,
            rank,
        }
    }

    fn inputs<'a>(
        game: &'a GameRecord,
        market: Market,
        predicted: f64,
        line: f64,
    ) -> SignalInputs<'a> {
        SignalInputs {
            game,
            market,
            predicted,
            line,
            history: &[],
            home_rating: None,
            away_rating: None,
            slate_tempo: None,
        }
    }

    #[test]
    fn test_tier_thresholds() {
        let tiers = TierThresholds::default();
        assert_eq!(tiers.assign(90.0), ConfidenceTier::Highest);
        assert_eq!(tiers.assign(-85.0), ConfidenceTier::Highest);
        assert_eq!(tiers.assign(70.0), ConfidenceTier::Middle);
        assert_eq!(tiers.assign(69.9), ConfidenceTier::Base);
    }

    #[test]
    fn test_default_weights_sum_to_hundred() {
        let w = SignalWeights::default();
        let total = w.model_edge
            + w.market_divergence
            + w.season_record
            + w.recent_form
            + w.head_to_head
            + w.situational
            + w.weather_pace;
        assert!((total - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_pick_follows_model_edge() {
        let game = upcoming(-4.0, 140.0);
        let scorer = ConvergenceScorer::new(ScorerConfig::default());
        let pick = scorer
            .score(Sport::Ncaamb, &inputs(&game, Market::Total, 146.0, 140.0))
            .unwrap();
        assert_eq!(pick.side, PickSide::Over);
        assert_eq!(pick.line, 140.0);
        // Only the model signal is available: 35 × (6 / 6)
        assert!((pick.trend_score - 35.0).abs() < 1e-12);
        assert_eq!(pick.tier, ConfidenceTier::Base);
        assert_eq!(pick.forced_by, None);
        assert_eq!(pick.signals.len(), 1);
    }

    #[test]
    fn test_spread_pick_uses_picked_team_handicap() {
        let game = upcoming(-4.0, 140.0);
        let scorer = ConvergenceScorer::new(ScorerConfig::default());
        // Model expects the home side to win by 1, market says 4: take the away side +4
        let pick = scorer
            .score(Sport::Ncaamb, &inputs(&game, Market::Spread, 1.0, 4.0))
            .unwrap();
        assert_eq!(pick.side, PickSide::Away);
        assert_eq!(pick.line, 4.0);
    }

    #[test]
    fn test_small_edge_produces_no_pick() {
        let game = upcoming(-4.0, 140.0);
        let scorer = ConvergenceScorer::new(ScorerConfig::default());
        assert!(scorer
            .score(Sport::Ncaamb, &inputs(&game, Market::Total, 141.0, 140.0))
            .is_none());
    }

    #[test]
    fn test_divergent_signals_block_pick() {
        let mut game = upcoming(-4.0, 140.0);
        game.context.wind_mph = Some(30.0);
        game.context.temperature = Some(10.0);
        let mut config = ScorerConfig::default();
        config.weights.weather_pace = 60.0;
        let scorer = ConvergenceScorer::new(config);
        // Edge +1.8 gives model strength 0.3 (10.5), weather -0.8 × 60 = -48
        assert!(scorer
            .score(Sport::Ncaamb, &inputs(&game, Market::Total, 141.8, 140.0))
            .is_none());
    }

    #[test]
    fn test_first_matching_override_forces_side() {
        let game = upcoming(-4.0, 160.0);
        let home = rating("Houston", 3);
        let away = rating("Kansas", 11);
        let config = ScorerConfig {
            overrides: vec![
                OverrideRule {
                    id: "both-top-25-under".to_string(),
                    sports: vec![Sport::Ncaamb],
                    force: PickSide::Under,
                    condition: OverrideCondition::BothTopRanked { max_rank: 25 },
                    description: String::new(),
                },
                OverrideRule {
                    id: "high-total-over".to_string(),
                    sports: vec![],
                    force: PickSide::Over,
                    condition: OverrideCondition::TotalAbove { threshold: 150.0 },
                    description: String::new(),
                },
            ],
            ..ScorerConfig::default()
        };
        let scorer = ConvergenceScorer::new(config);
        let mut si = inputs(&game, Market::Total, 170.0, 160.0);
        si.home_rating = Some(&home);
        si.away_rating = Some(&away);

        let pick = scorer.score(Sport::Ncaamb, &si).unwrap();
        assert_eq!(pick.side, PickSide::Under);
        assert_eq!(pick.forced_by.as_deref(), Some("both-top-25-under"));

        // Without ratings the second rule applies
        si.home_rating = None;
        let pick = scorer.score(Sport::Ncaamb, &si).unwrap();
        assert_eq!(pick.side, PickSide::Over);
        assert_eq!(pick.forced_by.as_deref(), Some("high-total-over"));

        // Rules scoped to NCAAMB or total markets do not touch NFL spreads
        let pick = scorer
            .score(Sport::Nfl, &inputs(&game, Market::Spread, 0.0, 4.0))
            .unwrap();
        assert_eq!(pick.side, PickSide::Away);
        assert_eq!(pick.forced_by, None);
    }

    #[test]
    fn test_override_applies_even_without_edge() {
        let game = upcoming(-4.0, 120.0);
        let config = ScorerConfig {
            overrides: vec![OverrideRule {
                id: "low-total-over".to_string(),
                sports: vec![],
                force: PickSide::Over,
                condition: OverrideCondition::TotalBelow { threshold: 125.0 },
                description: "Low totals drift over".to_string(),
            }],
            ..ScorerConfig::default()
        };
        let pick = ConvergenceScorer::new(config)
            .score(Sport::Ncaamb, &inputs(&game, Market::Total, 120.0, 120.0))
            .unwrap();
        assert_eq!(pick.side, PickSide::Over);
        assert_eq!(pick.edge, 0.0);
    }

    #[test]
    fn test_override_rule_toml_shape() {
        let rule: OverrideRule = toml::from_str(
            r#"
            id = "total-above-155"
            force = "UNDER"
            condition = { kind = "total_above", threshold = 155.5 }
            "#,
        )
        .unwrap();
        assert!(rule.sports.is_empty());
        assert_eq!(rule.condition, OverrideCondition::TotalAbove { threshold: 155.5 });
    }
}
