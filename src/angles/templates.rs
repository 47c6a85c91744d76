//! Angle templates
//!
//! A template is a sport scope, a conjunction of conditions over a game's lines and
//! context, and the sides it reads in each market. Conditions are a closed set so every
//! template is data.

use crate::models::{
    BetOutcome, GameRecord, PickSide, Sport, SpreadResult, TeamSide, TotalResult, WeatherCategory,
};
use crate::settlement::{ats_result_for, recomputed_total_result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Whose ATS result a template tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Home,
    Away,
    Favorite,
    Underdog,
}

impl Subject {
    pub fn flipped(self) -> Self {
        match self {
            Subject::Home => Subject::Away,
            Subject::Away => Subject::Home,
            Subject::Favorite => Subject::Underdog,
            Subject::Underdog => Subject::Favorite,
        }
    }

    /// Concrete side for a game. Favorite/underdog need a non-zero spread.
    pub fn resolve(self, game: &GameRecord) -> Option<TeamSide> {
        match self {
            Subject::Home => Some(TeamSide::Home),
            Subject::Away => Some(TeamSide::Away),
            Subject::Favorite => game.favorite(),
            Subject::Underdog => game.favorite().map(TeamSide::opponent),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Home => "home",
            Subject::Away => "away",
            Subject::Favorite => "favorite",
            Subject::Underdog => "underdog",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "market", rename_all = "snake_case")]
pub enum AngleMarket {
    Ats { subject: Subject },
    Total { side: PickSide },
}

impl AngleMarket {
    pub fn flipped(self) -> Self {
        match self {
            AngleMarket::Ats { subject } => AngleMarket::Ats {
                subject: subject.flipped(),
            },
            AngleMarket::Total { side } => AngleMarket::Total {
                side: side.opposite(),
            },
        }
    }

    pub fn label(&self) -> String {
        match self {
            AngleMarket::Ats { subject } => format!("{} ATS", subject.as_str()),
            AngleMarket::Total { side } => side.as_str().to_lowercase(),
        }
    }

    /// Settle this market for one game from its scores and lines.
    pub fn settle(&self, game: &GameRecord) -> Option<BetOutcome> {
        match self {
            AngleMarket::Ats { subject } => {
                let side = subject.resolve(game)?;
                Some(match ats_result_for(game, side)? {
                    SpreadResult::Covered => BetOutcome::Win,
                    SpreadResult::Lost => BetOutcome::Loss,
                    SpreadResult::Push => BetOutcome::Push,
                })
            }
            AngleMarket::Total { side } => {
                let result = recomputed_total_result(game)?;
                Some(match (result, side) {
                    (TotalResult::Push, _) => BetOutcome::Push,
                    (TotalResult::Over, PickSide::Over) | (TotalResult::Under, PickSide::Under) => {
                        BetOutcome::Win
                    }
                    _ => BetOutcome::Loss,
                })
            }
        }
    }
}

/// Filter predicates. A game missing the data a condition needs does not match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Primetime,
    NotPrimetime,
    NeutralSite,
    NotNeutralSite,
    Playoff,
    HomeFavorite,
    HomeUnderdog,
    AwayFavorite,
    /// |spread| within [min, max]
    SpreadBand { min: f64, max: f64 },
    /// Over/under within [min, max]
    TotalBand { min: f64, max: f64 },
    /// `side` has at least `min_days` more rest than its opponent
    RestAdvantage { side: TeamSide, min_days: i32 },
    /// `side` plays on `max_days` or fewer days of rest
    ShortWeek { side: TeamSide, max_days: i32 },
    OffBye { side: TeamSide },
    WindAtLeast { mph: f64 },
    TemperatureAtMost { degrees: f64 },
    Weather { category: WeatherCategory },
    MonthIn { months: Vec<u32> },
}

impl Condition {
    pub fn matches(&self, game: &GameRecord) -> bool {
        let ctx = &game.context;
        match self {
            Condition::Primetime => ctx.is_primetime,
            Condition::NotPrimetime => !ctx.is_primetime,
            Condition::NeutralSite => ctx.is_neutral_site,
            Condition::NotNeutralSite => !ctx.is_neutral_site,
            Condition::Playoff => ctx.is_playoff,
            Condition::HomeFavorite => game.favorite() == Some(TeamSide::Home),
            Condition::HomeUnderdog => game.favorite() == Some(TeamSide::Away),
            Condition::AwayFavorite => game.favorite() == Some(TeamSide::Away),
            Condition::SpreadBand { min, max } => game
                .spread
                .map_or(false, |s| s.abs() >= *min && s.abs() <= *max),
            Condition::TotalBand { min, max } => game
                .over_under
                .map_or(false, |t| t >= *min && t <= *max),
            Condition::RestAdvantage { side, min_days } => {
                match (game.rest_days(*side), game.rest_days(side.opponent())) {
                    (Some(own), Some(other)) => own - other >= *min_days,
                    _ => false,
                }
            }
            Condition::ShortWeek { side, max_days } => {
                game.rest_days(*side).map_or(false, |d| d <= *max_days)
            }
            Condition::OffBye { side } => game.off_bye(*side),
            Condition::WindAtLeast { mph } => ctx.wind_mph.map_or(false, |w| w >= *mph),
            Condition::TemperatureAtMost { degrees } => {
                ctx.temperature.map_or(false, |t| t <= *degrees)
            }
            Condition::Weather { category } => ctx.weather_category == Some(*category),
            Condition::MonthIn { months } => months.contains(&game.game_date.month()),
        }
    }
}

/// A filtered subset of games, read two ways: the ATS record of `subject` and the
/// totals record of `total_side`. Both markets settle the same matched games.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub sports: Vec<Sport>,
    /// Side whose cover rate is tracked
    pub subject: Subject,
    /// Totals side the angle leans toward
    pub total_side: PickSide,
    pub conditions: Vec<Condition>,
}

impl AngleTemplate {
    pub fn applies_to(&self, sport: Sport) -> bool {
        self.sports.contains(&sport)
    }

    pub fn matches(&self, game: &GameRecord) -> bool {
        self.applies_to(game.sport) && self.conditions.iter().all(|c| c.matches(game))
    }

    /// ATS first, then totals.
    pub fn markets(&self) -> [AngleMarket; 2] {
        [
            AngleMarket::Ats {
                subject: self.subject,
            },
            AngleMarket::Total {
                side: self.total_side,
            },
        ]
    }

    /// Same subset of games, opposite side of both markets.
    pub fn flipped(&self) -> Self {
        Self {
            id: format!("{}:flipped", self.id),
            name: format!("{} (flipped)", self.name),
            description: self.description.clone(),
            sports: self.sports.clone(),
            subject: self.subject.flipped(),
            total_side: self.total_side.opposite(),
            conditions: self.conditions.clone(),
        }
    }
}

fn template(
    id: &str,
    name: &str,
    description: &str,
    sports: &[Sport],
    subject: Subject,
    total_side: PickSide,
    conditions: Vec<Condition>,
) -> AngleTemplate {
    AngleTemplate {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        sports: sports.to_vec(),
        subject,
        total_side,
        conditions,
    }
}

#[rustfmt::skip]
pub fn builtin_templates() -> Vec<AngleTemplate> {
    use Condition::*;
    use PickSide::{Over, Under};
    use Subject::*;
    const NFL: &[Sport] = &[Sport::Nfl];
    const NCAAF: &[Sport] = &[Sport::Ncaaf];
    const NCAAMB: &[Sport] = &[Sport::Ncaamb];
    const FOOTBALL: &[Sport] = &[Sport::Nfl, Sport::Ncaaf];
    const HOME: TeamSide = TeamSide::Home;
    const AWAY: TeamSide = TeamSide::Away;

    vec![
        // NFL
        template("nfl-home-dog-primetime", "Home dogs in primetime",
            "Home underdogs in nationally televised slots", NFL,
            Home, Under, vec![HomeUnderdog, Primetime]),
        template("nfl-road-favorite-primetime", "Road favorites in primetime",
            "Away favorites in nationally televised slots", NFL,
            Away, Under, vec![AwayFavorite, Primetime]),
        template("nfl-primetime", "Primetime games",
            "Every nationally televised slot", NFL,
            Underdog, Under, vec![Primetime]),
        template("nfl-short-week-road", "Road team on a short week",
            "Away team playing on five or fewer days of rest", NFL,
            Away, Under, vec![ShortWeek { side: AWAY, max_days: 5 }]),
        template("nfl-home-off-bye", "Home team off a bye",
            "Home team coming off its bye week", NFL,
            Home, Over, vec![OffBye { side: HOME }]),
        template("nfl-home-rest-edge", "Home rest advantage",
            "Home team with three or more extra days of rest", NFL,
            Home, Over, vec![RestAdvantage { side: HOME, min_days: 3 }]),
        template("nfl-big-home-favorite", "Big home favorites",
            "Home favorites laying seven or more", NFL,
            Favorite, Over, vec![HomeFavorite, SpreadBand { min: 7.0, max: 99.0 }]),
        template("nfl-short-road-dog", "Short road dogs",
            "Road underdogs getting three or fewer", NFL,
            Underdog, Under, vec![HomeFavorite, SpreadBand { min: 0.5, max: 3.0 }]),
        template("nfl-december-home-dog", "December home dogs",
            "Home underdogs in December", NFL,
            Home, Under, vec![HomeUnderdog, MonthIn { months: vec![12] }]),
        template("nfl-playoff-favorite", "Playoff favorites",
            "Favorites in postseason games", NFL,
            Favorite, Under, vec![Playoff]),
        template("nfl-high-total", "High totals",
            "Totals of 50 or more", NFL,
            Underdog, Under, vec![TotalBand { min: 50.0, max: 99.0 }]),
        template("nfl-low-total", "Low totals",
            "Totals of 38 or fewer", NFL,
            Underdog, Over, vec![TotalBand { min: 0.0, max: 38.0 }]),
        template("nfl-dome", "Dome games",
            "Games played indoors", NFL,
            Favorite, Over, vec![Weather { category: WeatherCategory::Dome }]),
        // Football, both levels
        template("football-wind", "Windy games",
            "Sustained wind of 15 mph or more", FOOTBALL,
            Underdog, Under, vec![WindAtLeast { mph: 15.0 }]),
        template("football-cold", "Freezing games",
            "Kickoff temperature at or below 32F", FOOTBALL,
            Home, Under, vec![TemperatureAtMost { degrees: 32.0 }]),
        template("football-snow", "Snow games",
            "Games with snow in the forecast", FOOTBALL,
            Underdog, Under, vec![Weather { category: WeatherCategory::Snow }]),
        template("football-rain", "Rain games",
            "Games with rain in the forecast", FOOTBALL,
            Underdog, Under, vec![Weather { category: WeatherCategory::Rain }]),
        // NCAAF
        template("ncaaf-huge-favorite", "Huge favorites",
            "Favorites laying 21 or more", NCAAF,
            Favorite, Over, vec![SpreadBand { min: 21.0, max: 99.0 }]),
        template("ncaaf-home-dog", "College home dogs",
            "Home underdogs at non-neutral sites", NCAAF,
            Home, Under, vec![HomeUnderdog, NotNeutralSite]),
        template("ncaaf-neutral-favorite", "Neutral-site favorites",
            "Favorites at neutral sites", NCAAF,
            Favorite, Under, vec![NeutralSite]),
        template("ncaaf-bowl-underdog", "Bowl underdogs",
            "Underdogs in postseason games", NCAAF,
            Underdog, Over, vec![Playoff]),
        template("ncaaf-high-total", "Shootout totals",
            "Totals of 65 or more", NCAAF,
            Underdog, Under, vec![TotalBand { min: 65.0, max: 200.0 }]),
        template("ncaaf-november-home-favorite", "November home favorites",
            "Home favorites in November", NCAAF,
            Home, Under, vec![HomeFavorite, MonthIn { months: vec![11] }]),
        template("ncaaf-primetime-road-dog", "Primetime road dogs",
            "Road underdogs in nationally televised slots", NCAAF,
            Away, Over, vec![HomeFavorite, Primetime]),
        // NCAAMB
        template("ncaamb-neutral-dog", "Neutral-court dogs",
            "Underdogs on neutral courts", NCAAMB,
            Underdog, Under, vec![NeutralSite]),
        template("ncaamb-big-home-favorite", "Big home favorites",
            "Home favorites laying ten or more", NCAAMB,
            Home, Over,
            vec![HomeFavorite, SpreadBand { min: 10.0, max: 99.0 }, NotNeutralSite]),
        template("ncaamb-road-favorite", "Road favorites",
            "Away favorites at true road games", NCAAMB,
            Away, Under, vec![AwayFavorite, NotNeutralSite]),
        template("ncaamb-high-total", "High totals",
            "Totals of 155 or more", NCAAMB,
            Underdog, Under, vec![TotalBand { min: 155.0, max: 400.0 }]),
        template("ncaamb-low-total", "Low totals",
            "Totals of 130 or fewer", NCAAMB,
            Favorite, Over, vec![TotalBand { min: 0.0, max: 130.0 }]),
        template("ncaamb-march-underdog", "March underdogs",
            "Underdogs in March", NCAAMB,
            Underdog, Under, vec![MonthIn { months: vec![3] }]),
        template("ncaamb-home-rest-edge", "Home rest advantage",
            "Home team with two or more extra days of rest", NCAAMB,
            Home, Over, vec![RestAdvantage { side: HOME, min_days: 2 }]),
        // All sports
        template("all-short-home-favorite", "Short home favorites",
            "Home favorites laying three or fewer", &Sport::ALL,
            Home, Under, vec![HomeFavorite, SpreadBand { min: 0.5, max: 3.0 }]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GameContext;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn game(spread: f64, home: i32, away: i32, total: f64) -> GameRecord {
        GameRecord {
            id: "g".to_string(),
            sport: Sport::Nfl,
            season: 2023,
            week: Some("10".to_string()),
            game_date: NaiveDate::from_ymd_opt(2023, 12, 10).unwrap(),
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
    fn test_builtin_ids_are_unique() {
        let templates = builtin_templates();
        assert!(templates.len() >= 30);
        let ids: HashSet<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), templates.len());
        for sport in Sport::ALL {
            assert!(templates.iter().any(|t| t.applies_to(sport)));
        }
    }

    #[test]
    fn test_subject_resolution() {
        let g = game(-6.5, 24, 20, 44.5);
        assert_eq!(Subject::Favorite.resolve(&g), Some(TeamSide::Home));
        assert_eq!(Subject::Underdog.resolve(&g), Some(TeamSide::Away));
        assert_eq!(Subject::Favorite.resolve(&game(0.0, 1, 0, 40.0)), None);
    }

    fn ats(subject: Subject) -> AngleMarket {
        AngleMarket::Ats { subject }
    }

    fn total(side: PickSide) -> AngleMarket {
        AngleMarket::Total { side }
    }

    #[test]
    fn test_settle_ats_and_total() {
        // Home -6.5 wins by 4: favorite fails to cover
        let g = game(-6.5, 24, 20, 44.5);
        assert_eq!(ats(Subject::Favorite).settle(&g), Some(BetOutcome::Loss));
        assert_eq!(ats(Subject::Underdog).settle(&g), Some(BetOutcome::Win));
        assert_eq!(total(PickSide::Under).settle(&g), Some(BetOutcome::Win));

        let push = game(-4.0, 24, 20, 44.0);
        assert_eq!(ats(Subject::Home).settle(&push), Some(BetOutcome::Push));
        assert_eq!(total(PickSide::Over).settle(&push), Some(BetOutcome::Push));
    }

    #[test]
    fn test_conditions_require_data() {
        let mut g = game(-3.0, 20, 17, 41.0);
        assert!(!Condition::WindAtLeast { mph: 15.0 }.matches(&g));
        g.context.wind_mph = Some(18.0);
        assert!(Condition::WindAtLeast { mph: 15.0 }.matches(&g));

        let rest = Condition::RestAdvantage {
            side: TeamSide::Home,
            min_days: 3,
        };
        assert!(!rest.matches(&g));
        g.context.home_rest_days = Some(10);
        g.context.away_rest_days = Some(6);
        assert!(rest.matches(&g));
        assert!(Condition::MonthIn { months: vec![12] }.matches(&g));
    }

    #[test]
    fn test_flip_keeps_conditions() {
        let t = &builtin_templates()[0];
        let f = t.flipped();
        assert_eq!(f.conditions, t.conditions);
        assert_eq!(f.markets(), [ats(Subject::Away), total(PickSide::Over)]);
        assert_eq!(f.flipped().markets(), t.markets());
    }
}
