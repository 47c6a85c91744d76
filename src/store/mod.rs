//! Repository interfaces over persisted games, rating snapshots, aliases and picks.
//!
//! Callers receive a repository for the lifetime of one batch; nothing here is global.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::models::{GameRecord, RatingSnapshot, Sport};
use crate::picks::{Pick, PickStatus};
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;

pub trait GameRepository {
    /// Every stored game of a sport, ordered by date.
    fn games(&self, sport: Sport) -> Result<Vec<GameRecord>>;

    /// Games of a sport with `from <= game_date <= to`, ordered by date.
    fn games_between(
        &self,
        sport: Sport,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<GameRecord>>;

    fn game(&self, id: &str) -> Result<Option<GameRecord>>;

    /// Insert or replace games by id. Returns rows written.
    fn upsert_games(&self, games: &[GameRecord]) -> Result<usize>;

    fn games_on(&self, sport: Sport, date: NaiveDate) -> Result<Vec<GameRecord>> {
        self.games_between(sport, date, date)
    }
}

pub trait SnapshotRepository {
    /// Snapshots of a sport, optionally limited to one season.
    fn snapshots(&self, sport: Sport, season: Option<i32>) -> Result<Vec<RatingSnapshot>>;

    fn upsert_snapshots(&self, sport: Sport, snapshots: &[RatingSnapshot]) -> Result<usize>;
}

pub trait AliasRepository {
    /// Alias → canonical snapshot name.
    fn aliases(&self, sport: Sport) -> Result<HashMap<String, String>>;

    fn upsert_alias(&self, sport: Sport, alias: &str, canonical: &str) -> Result<()>;
}

pub trait PickRepository {
    fn pick_run_exists(&self, date: NaiveDate, sport: Sport) -> Result<bool>;

    /// Record the run for (date, sport) and insert its picks atomically.
    ///
    /// Returns `false` without writing any pick when the run was already recorded.
    /// Picks colliding on their natural key are ignored.
    fn save_pick_run(&self, date: NaiveDate, sport: Sport, picks: &[Pick]) -> Result<bool>;

    fn picks_for(&self, date: NaiveDate, sport: Sport) -> Result<Vec<Pick>>;

    fn pending_picks(&self, sport: Option<Sport>) -> Result<Vec<Pick>>;

    /// Picks graded WIN, LOSS or PUSH, oldest first.
    fn settled_picks(&self, sport: Option<Sport>) -> Result<Vec<Pick>>;

    fn update_pick_status(&self, id: i64, status: PickStatus) -> Result<()>;
}
