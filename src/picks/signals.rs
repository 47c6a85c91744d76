//! Independent signals feeding the convergence scorer.
//!
//! Every signal reports a signed strength in [-1, 1]. Positive means Home for the spread
//! market and Over for the total market. A signal whose inputs are missing is omitted.

use crate::models::{
    GameRecord, Market, PickSide, RatingSnapshot, SpreadResult, TeamSide, TotalResult,
    WeatherCategory,
};
use crate::settlement::{ats_result_for, recomputed_total_result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ModelEdge,
    MarketDivergence,
    SeasonRecord,
    RecentForm,
    HeadToHead,
    Situational,
    WeatherPace,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::ModelEdge => "model_edge",
            SignalKind::MarketDivergence => "market_divergence",
            SignalKind::SeasonRecord => "season_record",
            SignalKind::RecentForm => "recent_form",
            SignalKind::HeadToHead => "head_to_head",
            SignalKind::Situational => "situational",
            SignalKind::WeatherPace => "weather_pace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SituationalFactor {
    HomeRestAdvantage,
    AwayRestAdvantage,
    HomeShortWeek,
    AwayShortWeek,
    HomeOffBye,
    AwayOffBye,
    NeutralSite,
    NationallyTelevised,
    Playoff,
}

/// Structured inputs behind a signal, kept with the pick for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalDetail {
    ModelEdge {
        predicted: f64,
        line: f64,
        edge: f64,
    },
    MarketDivergence {
        model_probability: f64,
        market_probability: f64,
    },
    SeasonRecord {
        home_rate: f64,
        away_rate: f64,
        home_games: usize,
        away_games: usize,
    },
    RecentForm {
        home_rate: f64,
        away_rate: f64,
        window: usize,
    },
    HeadToHead {
        meetings: usize,
        /// Cover (or over) rate from the current home team's perspective
        rate: f64,
    },
    Situational {
        factors: Vec<SituationalFactor>,
    },
    WeatherPace {
        wind_mph: Option<f64>,
        temperature: Option<f64>,
        dome: bool,
        tempo_delta: Option<f64>,
    },
}

impl SignalDetail {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalDetail::ModelEdge { .. } => SignalKind::ModelEdge,
            SignalDetail::MarketDivergence { .. } => SignalKind::MarketDivergence,
            SignalDetail::SeasonRecord { .. } => SignalKind::SeasonRecord,
            SignalDetail::RecentForm { .. } => SignalKind::RecentForm,
            SignalDetail::HeadToHead { .. } => SignalKind::HeadToHead,
            SignalDetail::Situational { .. } => SignalKind::Situational,
            SignalDetail::WeatherPace { .. } => SignalKind::WeatherPace,
        }
    }
}

/// One signal's share of the trend score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub kind: SignalKind,
    pub weight: f64,
    /// Signed strength in [-1, 1]
    pub strength: f64,
    pub direction: PickSide,
    pub detail: SignalDetail,
}

impl SignalContribution {
    pub fn new(market: Market, weight: f64, strength: f64, detail: SignalDetail) -> Self {
        let strength = strength.clamp(-1.0, 1.0);
        Self {
            kind: detail.kind(),
            weight,
            strength,
            direction: PickSide::from_sign(market, strength),
            detail,
        }
    }

    pub fn contribution(&self) -> f64 {
        self.weight * self.strength
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSettings {
    /// |edge| that saturates the model signal, spread market
    #[serde(default = "default_spread_edge_scale")]
    pub spread_edge_scale: f64,
    /// |edge| that saturates the model signal, total market
    #[serde(default = "default_total_edge_scale")]
    pub total_edge_scale: f64,
    /// Standard deviation of the final margin around the model prediction
    #[serde(default = "default_margin_sigma")]
    pub margin_sigma: f64,
    /// Probability gap that saturates the market divergence signal
    #[serde(default = "default_divergence_scale")]
    pub divergence_scale: f64,
    #[serde(default = "default_recent_form_window")]
    pub recent_form_window: usize,
    #[serde(default = "default_min_season_games")]
    pub min_season_games: usize,
    #[serde(default = "default_min_meetings")]
    pub min_meetings: usize,
    #[serde(default = "default_short_week_days")]
    pub short_week_days: i32,
    #[serde(default = "default_wind_threshold")]
    pub wind_threshold_mph: f64,
    #[serde(default = "default_cold_threshold")]
    pub cold_threshold_f: f64,
}

fn default_spread_edge_scale() -> f64 {
    4.0
}
fn default_total_edge_scale() -> f64 {
    6.0
}
fn default_margin_sigma() -> f64 {
    12.0
}
fn default_divergence_scale() -> f64 {
    0.10
}
fn default_recent_form_window() -> usize {
    5
}
fn default_min_season_games() -> usize {
    3
}
fn default_min_meetings() -> usize {
    2
}
fn default_short_week_days() -> i32 {
    5
}
fn default_wind_threshold() -> f64 {
    15.0
}
fn default_cold_threshold() -> f64 {
    32.0
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            spread_edge_scale: default_spread_edge_scale(),
            total_edge_scale: default_total_edge_scale(),
            margin_sigma: default_margin_sigma(),
            divergence_scale: default_divergence_scale(),
            recent_form_window: default_recent_form_window(),
            min_season_games: default_min_season_games(),
            min_meetings: default_min_meetings(),
            short_week_days: default_short_week_days(),
            wind_threshold_mph: default_wind_threshold(),
            cold_threshold_f: default_cold_threshold(),
        }
    }
}

/// Everything the signals may look at for one game. `history` must only hold games
/// that were final before `game.game_date`.
pub struct SignalInputs<'a> {
    pub game: &'a GameRecord,
    pub market: Market,
    /// Model prediction on the line's scale (total, or home margin)
    pub predicted: f64,
    /// Market line on the prediction's scale (over/under, or -spread)
    pub line: f64,
    pub history: &'a [GameRecord],
    pub home_rating: Option<&'a RatingSnapshot>,
    pub away_rating: Option<&'a RatingSnapshot>,
    /// Mean tempo of the day's slate
    pub slate_tempo: Option<f64>,
}

impl<'a> SignalInputs<'a> {
    pub fn edge(&self) -> f64 {
        self.predicted - self.line
    }
}

// =============================================================================
// SIGNALS
// =============================================================================

pub fn model_edge(inputs: &SignalInputs, settings: &SignalSettings) -> Option<(f64, SignalDetail)> {
    let scale = match inputs.market {
        Market::Spread => settings.spread_edge_scale,
        Market::Total => settings.total_edge_scale,
    };
    if scale <= 0.0 {
        return None;
    }
    let edge = inputs.edge();
    Some((
        (edge / scale).clamp(-1.0, 1.0),
        SignalDetail::ModelEdge {
            predicted: inputs.predicted,
            line: inputs.line,
            edge,
        },
    ))
}

/// Implied probability of an American price, vig included.
pub fn implied_probability(american_odds: i32) -> f64 {
    let odds = american_odds as f64;
    if odds < 0.0 {
        -odds / (-odds + 100.0)
    } else {
        100.0 / (odds + 100.0)
    }
}

pub fn market_divergence(
    inputs: &SignalInputs,
    settings: &SignalSettings,
) -> Option<(f64, SignalDetail)> {
    if inputs.market != Market::Spread || settings.margin_sigma <= 0.0 {
        return None;
    }
    let home = implied_probability(inputs.game.home_moneyline?);
    let away = implied_probability(inputs.game.away_moneyline?);
    let market_probability = home / (home + away);

    let normal = Normal::new(0.0, 1.0).ok()?;
    let model_probability = normal.cdf(inputs.predicted / settings.margin_sigma);

    Some((
        ((model_probability - market_probability) / settings.divergence_scale).clamp(-1.0, 1.0),
        SignalDetail::MarketDivergence {
            model_probability,
            market_probability,
        },
    ))
}

/// 1.0 for a cover (or over), 0.0 for a loss (or under), `None` for a push or no line.
fn team_hit(game: &GameRecord, team: &str, market: Market) -> Option<f64> {
    match market {
        Market::Spread => {
            let side = game.side_of(team)?;
            match ats_result_for(game, side)? {
                SpreadResult::Covered => Some(1.0),
                SpreadResult::Lost => Some(0.0),
                SpreadResult::Push => None,
            }
        }
        Market::Total => {
            game.side_of(team)?;
            match recomputed_total_result(game)? {
                TotalResult::Over => Some(1.0),
                TotalResult::Under => Some(0.0),
                TotalResult::Push => None,
            }
        }
    }
}

/// Prior games of `team` in the same season, most recent first.
fn team_games<'a>(inputs: &'a SignalInputs, team: &'a str) -> impl Iterator<Item = &'a GameRecord> {
    let date = inputs.game.game_date;
    let season = inputs.game.season;
    let mut games: Vec<&GameRecord> = inputs
        .history
        .iter()
        .filter(move |g| g.season == season && g.game_date < date && g.side_of(team).is_some())
        .collect();
    games.sort_by(|a, b| b.game_date.cmp(&a.game_date));
    games.into_iter()
}

fn hit_rate<'a>(
    games: impl Iterator<Item = &'a GameRecord>,
    team: &str,
    market: Market,
    limit: usize,
) -> Option<(f64, usize)> {
    let hits: Vec<f64> = games
        .filter_map(|g| team_hit(g, team, market))
        .take(limit)
        .collect();
    if hits.is_empty() {
        None
    } else {
        Some((hits.iter().sum::<f64>() / hits.len() as f64, hits.len()))
    }
}

/// Combine per-team rates into a signed strength.
fn rate_strength(market: Market, home_rate: f64, away_rate: f64) -> f64 {
    match market {
        // Better home cover rate points home
        Market::Spread => home_rate - away_rate,
        // Both teams going over points over
        Market::Total => (home_rate + away_rate) - 1.0,
    }
}

pub fn season_record(
    inputs: &SignalInputs,
    settings: &SignalSettings,
) -> Option<(f64, SignalDetail)> {
    let game = inputs.game;
    let (home_rate, home_games) =
        hit_rate(team_games(inputs, &game.home_team), &game.home_team, inputs.market, usize::MAX)?;
    let (away_rate, away_games) =
        hit_rate(team_games(inputs, &game.away_team), &game.away_team, inputs.market, usize::MAX)?;
    if home_games < settings.min_season_games || away_games < settings.min_season_games {
        return None;
    }
    Some((
        rate_strength(inputs.market, home_rate, away_rate),
        SignalDetail::SeasonRecord {
            home_rate,
            away_rate,
            home_games,
            away_games,
        },
    ))
}

pub fn recent_form(
    inputs: &SignalInputs,
    settings: &SignalSettings,
) -> Option<(f64, SignalDetail)> {
    let game = inputs.game;
    let window = settings.recent_form_window;
    let (home_rate, home_n) =
        hit_rate(team_games(inputs, &game.home_team), &game.home_team, inputs.market, window)?;
    let (away_rate, away_n) =
        hit_rate(team_games(inputs, &game.away_team), &game.away_team, inputs.market, window)?;
    if home_n < window || away_n < window {
        return None;
    }
    Some((
        rate_strength(inputs.market, home_rate, away_rate),
        SignalDetail::RecentForm {
            home_rate,
            away_rate,
            window,
        },
    ))
}

pub fn head_to_head(
    inputs: &SignalInputs,
    settings: &SignalSettings,
) -> Option<(f64, SignalDetail)> {
    let game = inputs.game;
    let hits: Vec<f64> = inputs
        .history
        .iter()
        .filter(|g| g.game_date < game.game_date)
        .filter(|g| g.side_of(&game.away_team).is_some() && g.side_of(&game.home_team).is_some())
        .filter_map(|g| team_hit(g, &game.home_team, inputs.market))
        .collect();
    if hits.len() < settings.min_meetings.max(1) {
        return None;
    }
    let rate = hits.iter().sum::<f64>() / hits.len() as f64;
    Some((
        (rate - 0.5) * 2.0,
        SignalDetail::HeadToHead {
            meetings: hits.len(),
            rate,
        },
    ))
}

pub fn situational(
    inputs: &SignalInputs,
    settings: &SignalSettings,
) -> Option<(f64, SignalDetail)> {
    let game = inputs.game;
    let ctx = &game.context;
    let mut factors = Vec::new();
    let mut strength = 0.0;

    match inputs.market {
        Market::Spread => {
            let rest = (game.rest_days(TeamSide::Home), game.rest_days(TeamSide::Away));
            if let (Some(h), Some(a)) = rest {
                if h - a >= 2 {
                    factors.push(SituationalFactor::HomeRestAdvantage);
                    strength += 0.4;
                } else if a - h >= 2 {
                    factors.push(SituationalFactor::AwayRestAdvantage);
                    strength -= 0.4;
                }
            }
            if game.rest_days(TeamSide::Home).map_or(false, |d| d <= settings.short_week_days) {
                factors.push(SituationalFactor::HomeShortWeek);
                strength -= 0.3;
            }
            if game.rest_days(TeamSide::Away).map_or(false, |d| d <= settings.short_week_days) {
                factors.push(SituationalFactor::AwayShortWeek);
                strength += 0.3;
            }
            if game.off_bye(TeamSide::Home) {
                factors.push(SituationalFactor::HomeOffBye);
                strength += 0.3;
            }
            if game.off_bye(TeamSide::Away) {
                factors.push(SituationalFactor::AwayOffBye);
                strength -= 0.3;
            }
            if ctx.is_neutral_site {
                factors.push(SituationalFactor::NeutralSite);
                strength -= 0.2;
            }
            if ctx.is_primetime {
                factors.push(SituationalFactor::NationallyTelevised);
                strength += 0.2;
            }
        }
        Market::Total => {
            if ctx.is_primetime {
                factors.push(SituationalFactor::NationallyTelevised);
                strength -= 0.3;
            }
            if ctx.is_playoff {
                factors.push(SituationalFactor::Playoff);
                strength -= 0.2;
            }
            if game.off_bye(TeamSide::Home) && game.off_bye(TeamSide::Away) {
                factors.push(SituationalFactor::HomeOffBye);
                factors.push(SituationalFactor::AwayOffBye);
                strength += 0.2;
            }
        }
    }

    if factors.is_empty() {
        return None;
    }
    Some((strength, SignalDetail::Situational { factors }))
}

pub fn weather_pace(
    inputs: &SignalInputs,
    settings: &SignalSettings,
) -> Option<(f64, SignalDetail)> {
    if inputs.market != Market::Total {
        return None;
    }
    let ctx = &inputs.game.context;
    let dome = ctx.weather_category == Some(WeatherCategory::Dome);
    let tempo_delta = match (inputs.home_rating, inputs.away_rating, inputs.slate_tempo) {
        (Some(h), Some(a), Some(slate)) => Some((h.adj_tempo + a.adj_tempo) / 2.0 - slate),
        _ => None,
    };

    let mut strength = 0.0;
    let mut informative = false;
    if !dome {
        if let Some(wind) = ctx.wind_mph {
            informative = true;
            if wind >= settings.wind_threshold_mph {
                strength -= 0.5;
            }
        }
        if let Some(temp) = ctx.temperature {
            informative = true;
            if temp <= settings.cold_threshold_f {
                strength -= 0.3;
            }
        }
    } else {
        informative = true;
        strength += 0.2;
    }
    if let Some(delta) = tempo_delta {
        informative = true;
        strength += (delta / 5.0).clamp(-0.5, 0.5);
    }

    if !informative {
        return None;
    }
    Some((
        strength,
        SignalDetail::WeatherPace {
            wind_mph: ctx.wind_mph,
            temperature: ctx.temperature,
            dome,
            tempo_delta,
        },
    ))
}
