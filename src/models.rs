use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sports covered by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sport {
    #[serde(rename = "NFL")]
    Nfl,
    #[serde(rename = "NCAAF")]
    Ncaaf,
    #[serde(rename = "NCAAMB")]
    Ncaamb,
}

impl Sport {
    pub const ALL: [Sport; 3] = [Sport::Nfl, Sport::Ncaaf, Sport::Ncaamb];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Nfl => "NFL",
            Sport::Ncaaf => "NCAAF",
            Sport::Ncaamb => "NCAAMB",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NFL" => Ok(Sport::Nfl),
            "NCAAF" | "CFB" => Ok(Sport::Ncaaf),
            "NCAAMB" | "CBB" => Ok(Sport::Ncaamb),
            other => Err(format!("unknown sport '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    Home,
    Away,
}

impl TeamSide {
    pub fn opponent(self) -> Self {
        match self {
            TeamSide::Home => TeamSide::Away,
            TeamSide::Away => TeamSide::Home,
        }
    }
}

/// Against-the-spread settlement, always from the home team's perspective
/// when stored on a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadResult {
    Covered,
    Lost,
    Push,
}

impl SpreadResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpreadResult::Covered => "COVERED",
            SpreadResult::Lost => "LOST",
            SpreadResult::Push => "PUSH",
        }
    }
}

impl FromStr for SpreadResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COVERED" => Ok(SpreadResult::Covered),
            "LOST" => Ok(SpreadResult::Lost),
            "PUSH" => Ok(SpreadResult::Push),
            other => Err(format!("unknown spread result '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TotalResult {
    Over,
    Under,
    Push,
}

impl TotalResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TotalResult::Over => "OVER",
            TotalResult::Under => "UNDER",
            TotalResult::Push => "PUSH",
        }
    }
}

impl FromStr for TotalResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OVER" => Ok(TotalResult::Over),
            "UNDER" => Ok(TotalResult::Under),
            "PUSH" => Ok(TotalResult::Push),
            other => Err(format!("unknown total result '{}'", other)),
        }
    }
}

/// Outcome of a single wager once its game is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetOutcome {
    Win,
    Loss,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Spread,
    Total,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Spread => "spread",
            Market::Total => "total",
        }
    }
}

/// The side of a wager. Positive orientation is Home for spreads and Over for totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickSide {
    Home,
    Away,
    Over,
    Under,
}

impl PickSide {
    pub fn market(&self) -> Market {
        match self {
            PickSide::Home | PickSide::Away => Market::Spread,
            PickSide::Over | PickSide::Under => Market::Total,
        }
    }

    /// Side implied by a signed quantity in the given market.
    pub fn from_sign(market: Market, value: f64) -> Self {
        match (market, value >= 0.0) {
            (Market::Spread, true) => PickSide::Home,
            (Market::Spread, false) => PickSide::Away,
            (Market::Total, true) => PickSide::Over,
            (Market::Total, false) => PickSide::Under,
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            PickSide::Home | PickSide::Over => 1.0,
            PickSide::Away | PickSide::Under => -1.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            PickSide::Home => PickSide::Away,
            PickSide::Away => PickSide::Home,
            PickSide::Over => PickSide::Under,
            PickSide::Under => PickSide::Over,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PickSide::Home => "HOME",
            PickSide::Away => "AWAY",
            PickSide::Over => "OVER",
            PickSide::Under => "UNDER",
        }
    }
}

impl FromStr for PickSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOME" => Ok(PickSide::Home),
            "AWAY" => Ok(PickSide::Away),
            "OVER" => Ok(PickSide::Over),
            "UNDER" => Ok(PickSide::Under),
            other => Err(format!("unknown pick side '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCategory {
    Dome,
    Clear,
    Rain,
    Snow,
    Wind,
}

impl WeatherCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCategory::Dome => "dome",
            WeatherCategory::Clear => "clear",
            WeatherCategory::Rain => "rain",
            WeatherCategory::Snow => "snow",
            WeatherCategory::Wind => "wind",
        }
    }
}

impl FromStr for WeatherCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dome" => Ok(WeatherCategory::Dome),
            "clear" => Ok(WeatherCategory::Clear),
            "rain" => Ok(WeatherCategory::Rain),
            "snow" => Ok(WeatherCategory::Snow),
            "wind" => Ok(WeatherCategory::Wind),
            other => Err(format!("unknown weather category '{}'", other)),
        }
    }
}

/// Situational and environmental context attached to a game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameContext {
    #[serde(default)]
    pub is_playoff: bool,
    #[serde(default)]
    pub is_primetime: bool,
    #[serde(default)]
    pub primetime_slot: Option<String>,
    #[serde(default)]
    pub is_neutral_site: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub wind_mph: Option<f64>,
    #[serde(default)]
    pub weather_category: Option<WeatherCategory>,
    #[serde(default)]
    pub home_rest_days: Option<i32>,
    #[serde(default)]
    pub away_rest_days: Option<i32>,
    #[serde(default)]
    pub home_is_bye: bool,
    #[serde(default)]
    pub away_is_bye: bool,
}

/// A scheduled or completed contest with its published market lines.
///
/// `spread` is the home team's handicap: negative means the home team is favored.
/// Settlement labels are advisory; [`crate::settlement`] recomputes them from the scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub sport: Sport,
    pub season: i32,
    #[serde(default)]
    pub week: Option<String>,
    pub game_date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub spread: Option<f64>,
    pub over_under: Option<f64>,
    #[serde(default)]
    pub home_moneyline: Option<i32>,
    #[serde(default)]
    pub away_moneyline: Option<i32>,
    #[serde(default)]
    pub spread_result: Option<SpreadResult>,
    #[serde(default)]
    pub ou_result: Option<TotalResult>,
    #[serde(default)]
    pub context: GameContext,
}

impl GameRecord {
    pub fn is_final(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }

    pub fn matchup(&self) -> String {
        format!("{} @ {}", self.away_team, self.home_team)
    }

    pub fn team(&self, side: TeamSide) -> &str {
        match side {
            TeamSide::Home => &self.home_team,
            TeamSide::Away => &self.away_team,
        }
    }

    /// Side of a named team in this game, if it played.
    pub fn side_of(&self, team: &str) -> Option<TeamSide> {
        if self.home_team == team {
            Some(TeamSide::Home)
        } else if self.away_team == team {
            Some(TeamSide::Away)
        } else {
            None
        }
    }

    pub fn score(&self, side: TeamSide) -> Option<i32> {
        match side {
            TeamSide::Home => self.home_score,
            TeamSide::Away => self.away_score,
        }
    }

    /// Final home margin (home minus away).
    pub fn home_margin(&self) -> Option<f64> {
        Some((self.home_score? - self.away_score?) as f64)
    }

    pub fn combined_score(&self) -> Option<f64> {
        Some((self.home_score? + self.away_score?) as f64)
    }

    /// Handicap from one side's perspective (negative = that side is favored).
    pub fn handicap_for(&self, side: TeamSide) -> Option<f64> {
        self.spread.map(|s| match side {
            TeamSide::Home => s,
            TeamSide::Away => -s,
        })
    }

    /// The favored side, `None` for pick'em games or games without a line.
    pub fn favorite(&self) -> Option<TeamSide> {
        match self.spread {
            Some(s) if s < 0.0 => Some(TeamSide::Home),
            Some(s) if s > 0.0 => Some(TeamSide::Away),
            _ => None,
        }
    }

    pub fn rest_days(&self, side: TeamSide) -> Option<i32> {
        match side {
            TeamSide::Home => self.context.home_rest_days,
            TeamSide::Away => self.context.away_rest_days,
        }
    }

    pub fn off_bye(&self, side: TeamSide) -> bool {
        match side {
            TeamSide::Home => self.context.home_is_bye,
            TeamSide::Away => self.context.away_is_bye,
        }
    }

    pub fn moneyline(&self, side: TeamSide) -> Option<i32> {
        match side {
            TeamSide::Home => self.home_moneyline,
            TeamSide::Away => self.away_moneyline,
        }
    }
}

/// A team's efficiency ratings as published on a specific date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub team: String,
    pub date: NaiveDate,
    pub season: i32,
    /// Adjusted offensive efficiency
    pub adj_oe: f64,
    /// Adjusted defensive efficiency (lower is better)
    pub adj_de: f64,
    /// Composite efficiency margin
    pub adj_em: f64,
    /// Adjusted pace
    pub adj_tempo: f64,
    /// Composite rank, 1 = best
    pub rank: u32,
}

/// Confidence tier of a graded pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Base,
    Middle,
    Highest,
}

impl ConfidenceTier {
    pub const ALL: [ConfidenceTier; 3] = [
        ConfidenceTier::Base,
        ConfidenceTier::Middle,
        ConfidenceTier::Highest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Base => "base",
            ConfidenceTier::Middle => "middle",
            ConfidenceTier::Highest => "highest",
        }
    }
}

impl FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(ConfidenceTier::Base),
            "middle" => Ok(ConfidenceTier::Middle),
            "highest" => Ok(ConfidenceTier::Highest),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// Payout per unit staked for a winning wager at American odds.
pub fn win_payout(american_odds: i32) -> f64 {
    if american_odds < 0 {
        100.0 / (american_odds.unsigned_abs() as f64)
    } else {
        american_odds as f64 / 100.0
    }
}

/// Win rate needed to break even at American odds (52.4% at -110).
pub fn break_even_rate(american_odds: i32) -> f64 {
    let payout = win_payout(american_odds);
    1.0 / (1.0 + payout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(spread: Option<f64>) -> GameRecord {
        GameRecord {
            id: "g1".to_string(),
            sport: Sport::Nfl,
            season: 2022,
            week: None,
            game_date: NaiveDate::from_ymd_opt(2022, 10, 9).unwrap(),
            home_team: "Buffalo Bills".to_string(),
            away_team: "Pittsburgh Steelers".to_string(),
            home_score: Some(38),
            away_score: Some(3),
            spread,
            over_under: Some(45.5),
            home_moneyline: None,
            away_moneyline: None,
            spread_result: None,
            ou_result: None,
            context: GameContext::default(),
        }
    }

    #[test]
    fn test_favorite_follows_home_handicap() {
        assert_eq!(game(Some(-14.0)).favorite(), Some(TeamSide::Home));
        assert_eq!(game(Some(3.5)).favorite(), Some(TeamSide::Away));
        assert_eq!(game(Some(0.0)).favorite(), None);
        assert_eq!(game(None).favorite(), None);
    }

    #[test]
    fn test_handicap_is_negated_for_away() {
        let g = game(Some(-14.0));
        assert_eq!(g.handicap_for(TeamSide::Home), Some(-14.0));
        assert_eq!(g.handicap_for(TeamSide::Away), Some(14.0));
        assert_eq!(g.matchup(), "Pittsburgh Steelers @ Buffalo Bills");
    }

    #[test]
    fn test_break_even_at_standard_vig() {
        assert!((win_payout(-110) - 0.909_090_9).abs() < 1e-6);
        assert!((break_even_rate(-110) - 0.5238).abs() < 1e-4);
        assert!((win_payout(150) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_sport_parse() {
        assert_eq!("nfl".parse::<Sport>().unwrap(), Sport::Nfl);
        assert_eq!("CBB".parse::<Sport>().unwrap(), Sport::Ncaamb);
        assert!("mlb".parse::<Sport>().is_err());
    }
}
