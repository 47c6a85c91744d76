//! Point-in-time Snapshot Matcher
//!
//! Joins each game to the rating snapshots that were published before tip-off.
//!
//! Date resolution order: `game_date - 1`, `game_date`, `game_date - 2`, then the most
//! recent strictly-prior date within `max_lookback_days`. The first date with ANY
//! snapshots is used; the team lookup then happens on that date only.
//!
//! Name resolution order: exact key, normalized name (alias table + suffix rewriting),
//! case-insensitive scan of the date's keys.
//!
//! A game that cannot be resolved for both sides is dropped and counted. It is never
//! given a default rating.

use crate::models::{GameRecord, RatingSnapshot};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Oldest strictly-prior snapshot date accepted after the fixed fallbacks
    #[serde(default = "default_max_lookback_days")]
    pub max_lookback_days: i64,
}

fn default_max_lookback_days() -> i64 {
    7
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_lookback_days: default_max_lookback_days(),
        }
    }
}

// =============================================================================
// TEAM NAME NORMALIZATION
// =============================================================================

/// Rewrites team names into the snapshot feed's conventions.
///
/// The alias table is maintained outside this crate and injected at construction.
#[derive(Debug, Clone, Default)]
pub struct TeamNameNormalizer {
    aliases: HashMap<String, String>,
}

impl TeamNameNormalizer {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn normalize(&self, name: &str) -> String {
        let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if let Some(canonical) = self.aliases.get(&collapsed) {
            return canonical.clone();
        }

        let mut rewritten = collapsed.clone();
        if let Some(stripped) = rewritten.strip_suffix(" University") {
            rewritten = stripped.to_string();
        }
        if let Some(stripped) = rewritten.strip_suffix(" State") {
            rewritten = format!("{} St.", stripped);
        }
        if let Some(stripped) = rewritten.strip_prefix("Saint ") {
            rewritten = format!("St. {}", stripped);
        }
        rewritten = rewritten.replace(" & ", " and ");

        self.aliases.get(&rewritten).cloned().unwrap_or(rewritten)
    }
}

// =============================================================================
// SNAPSHOT INDEX
// =============================================================================

/// Snapshots keyed by publication date, then team key.
#[derive(Debug, Clone, Default)]
pub struct SnapshotIndex {
    by_date: BTreeMap<NaiveDate, HashMap<String, RatingSnapshot>>,
    count: usize,
}

impl SnapshotIndex {
    pub fn new(snapshots: impl IntoIterator<Item = RatingSnapshot>) -> Self {
        let mut index = Self::default();
        for snapshot in snapshots {
            index.insert(snapshot);
        }
        index
    }

    pub fn insert(&mut self, snapshot: RatingSnapshot) {
        let replaced = self
            .by_date
            .entry(snapshot.date)
            .or_default()
            .insert(snapshot.team.clone(), snapshot);
        if replaced.is_none() {
            self.count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn on(&self, date: NaiveDate) -> Option<&HashMap<String, RatingSnapshot>> {
        self.by_date.get(&date).filter(|teams| !teams.is_empty())
    }

    /// Most recent non-empty date in `[earliest, latest]`.
    fn latest_between(
        &self,
        earliest: NaiveDate,
        latest: NaiveDate,
    ) -> Option<(NaiveDate, &HashMap<String, RatingSnapshot>)> {
        if earliest > latest {
            return None;
        }
        self.by_date
            .range(earliest..=latest)
            .rev()
            .find(|(_, teams)| !teams.is_empty())
            .map(|(date, teams)| (*date, teams))
    }
}

// =============================================================================
// RESOLUTION TYPES
// =============================================================================

/// Which date rule produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateFallback {
    PriorDay,
    SameDay,
    TwoDaysPrior,
    Lookback { days: i64 },
}

impl DateFallback {
    /// Only the same-day fallback lets a snapshot share the game's date.
    pub fn is_strictly_prior(&self) -> bool {
        !matches!(self, DateFallback::SameDay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameStrategy {
    Exact,
    Normalized,
    CaseInsensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub date_fallback: DateFallback,
    pub name_strategy: NameStrategy,
}

/// A game joined to both sides' point-in-time ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedFeatureRow {
    pub game: GameRecord,
    pub home: RatingSnapshot,
    pub away: RatingSnapshot,
    pub home_resolution: Resolution,
    pub away_resolution: Resolution,
}

impl EnrichedFeatureRow {
    pub fn season(&self) -> i32 {
        self.game.season
    }

    pub fn game_date(&self) -> NaiveDate {
        self.game.game_date
    }
}

/// Data-quality counters for one matching batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub games_seen: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub exact_names: usize,
    pub normalized_names: usize,
    pub case_insensitive_names: usize,
    pub same_day_fallbacks: usize,
    pub two_day_fallbacks: usize,
    pub lookback_fallbacks: usize,
}

impl MatchStats {
    pub fn match_rate(&self) -> Option<f64> {
        if self.games_seen == 0 {
            None
        } else {
            Some(self.matched as f64 / self.games_seen as f64)
        }
    }

    fn record(&mut self, resolution: &Resolution) {
        match resolution.name_strategy {
            NameStrategy::Exact => self.exact_names += 1,
            NameStrategy::Normalized => self.normalized_names += 1,
            NameStrategy::CaseInsensitive => self.case_insensitive_names += 1,
        }
        match resolution.date_fallback {
            DateFallback::PriorDay => {}
            DateFallback::SameDay => self.same_day_fallbacks += 1,
            DateFallback::TwoDaysPrior => self.two_day_fallbacks += 1,
            DateFallback::Lookback { .. } => self.lookback_fallbacks += 1,
        }
    }
}

// =============================================================================
// MATCHER
// =============================================================================

pub struct SnapshotMatcher {
    index: SnapshotIndex,
    normalizer: TeamNameNormalizer,
    config: MatcherConfig,
}

impl SnapshotMatcher {
    pub fn new(
        index: SnapshotIndex,
        normalizer: TeamNameNormalizer,
        config: MatcherConfig,
    ) -> Self {
        Self {
            index,
            normalizer,
            config,
        }
    }

    pub fn index(&self) -> &SnapshotIndex {
        &self.index
    }

    /// Pick the snapshot date for a game.
    pub fn resolve_date(
        &self,
        game_date: NaiveDate,
    ) -> Option<(NaiveDate, DateFallback, &HashMap<String, RatingSnapshot>)> {
        let fixed = [
            (game_date - Duration::days(1), DateFallback::PriorDay),
            (game_date, DateFallback::SameDay),
            (game_date - Duration::days(2), DateFallback::TwoDaysPrior),
        ];
        for (date, fallback) in fixed {
            if let Some(teams) = self.index.on(date) {
                return Some((date, fallback, teams));
            }
        }

        if self.config.max_lookback_days < 3 {
            return None;
        }
        let latest = game_date - Duration::days(3);
        let earliest = game_date - Duration::days(self.config.max_lookback_days);
        self.index
            .latest_between(earliest, latest)
            .map(|(date, teams)| {
                let days = (game_date - date).num_days();
                (date, DateFallback::Lookback { days }, teams)
            })
    }

    fn resolve_team<'a>(
        &self,
        teams: &'a HashMap<String, RatingSnapshot>,
        team: &str,
    ) -> Option<(&'a RatingSnapshot, NameStrategy)> {
        if let Some(snapshot) = teams.get(team) {
            return Some((snapshot, NameStrategy::Exact));
        }

        let normalized = self.normalizer.normalize(team);
        if normalized != team {
            if let Some(snapshot) = teams.get(&normalized) {
                return Some((snapshot, NameStrategy::Normalized));
            }
        }

        teams
            .iter()
            .find(|(key, _)| {
                key.eq_ignore_ascii_case(team)
                    || key.eq_ignore_ascii_case(&normalized)
                    || self.normalizer.normalize(key).eq_ignore_ascii_case(&normalized)
            })
            .map(|(_, snapshot)| (snapshot, NameStrategy::CaseInsensitive))
    }

    /// Resolve both sides of one game, or `None` if either side is missing.
    pub fn resolve(&self, game: &GameRecord) -> Option<EnrichedFeatureRow> {
        let (date, date_fallback, teams) = self.resolve_date(game.game_date)?;

        let (home, home_strategy) = self.resolve_team(teams, &game.home_team)?;
        let (away, away_strategy) = self.resolve_team(teams, &game.away_team)?;

        if date_fallback == DateFallback::SameDay {
            warn!(
                game_id = %game.id,
                game_date = %game.game_date,
                snapshot_date = %date,
                "using same-day rating snapshot (no prior-day snapshot published)"
            );
        }

        Some(EnrichedFeatureRow {
            game: game.clone(),
            home: home.clone(),
            away: away.clone(),
            home_resolution: Resolution {
                date_fallback,
                name_strategy: home_strategy,
            },
            away_resolution: Resolution {
                date_fallback,
                name_strategy: away_strategy,
            },
        })
    }

    /// Enrich a batch of games, dropping and counting the ones that cannot be joined.
    pub fn enrich(&self, games: &[GameRecord]) -> (Vec<EnrichedFeatureRow>, MatchStats) {
        let mut stats = MatchStats::default();
        let mut rows = Vec::with_capacity(games.len());

        for game in games {
            stats.games_seen += 1;
            match self.resolve(game) {
                Some(row) => {
                    stats.matched += 1;
                    stats.record(&row.home_resolution);
                    stats.record(&row.away_resolution);
                    rows.push(row);
                }
                None => {
                    stats.unmatched += 1;
                    debug!(
                        game_id = %game.id,
                        home = %game.home_team,
                        away = %game.away_team,
                        game_date = %game.game_date,
                        "no point-in-time snapshot pair; excluding game"
                    );
                }
            }
        }

        info!(
            games = stats.games_seen,
            matched = stats.matched,
            unmatched = stats.unmatched,
            normalized = stats.normalized_names,
            case_insensitive = stats.case_insensitive_names,
            same_day = stats.same_day_fallbacks,
            two_day = stats.two_day_fallbacks,
            lookback = stats.lookback_fallbacks,
            "snapshot match complete"
        );

        (rows, stats)
    }
}
