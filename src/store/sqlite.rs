//! SQLite-backed store
//!
//! - WAL mode so read-only batch sessions never block the writer
//! - Prepared statement caching
//! - Batch upserts inside one IMMEDIATE transaction
//! - Natural-key uniqueness on picks so concurrent generation converges

use crate::models::{GameContext, GameRecord, RatingSnapshot, Sport};
use crate::picks::{Pick, PickStatus};
use crate::store::{AliasRepository, GameRepository, PickRepository, SnapshotRepository};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -16000;  -- 16MB cache
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS games (
    id TEXT PRIMARY KEY,
    sport TEXT NOT NULL,
    season INTEGER NOT NULL,
    week TEXT,
    game_date TEXT NOT NULL,
    home_team TEXT NOT NULL,
    away_team TEXT NOT NULL,
    home_score INTEGER,
    away_score INTEGER,
    spread REAL,
    over_under REAL,
    home_moneyline INTEGER,
    away_moneyline INTEGER,
    spread_result TEXT,
    ou_result TEXT,
    context_json TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_games_sport_date
    ON games(sport, game_date);

CREATE INDEX IF NOT EXISTS idx_games_sport_season
    ON games(sport, season);

CREATE TABLE IF NOT EXISTS rating_snapshots (
    sport TEXT NOT NULL,
    team TEXT NOT NULL,
    snapshot_date TEXT NOT NULL,
    season INTEGER NOT NULL,
    adj_oe REAL NOT NULL,
    adj_de REAL NOT NULL,
    adj_em REAL NOT NULL,
    adj_tempo REAL NOT NULL,
    rank INTEGER NOT NULL,
    PRIMARY KEY (sport, team, snapshot_date)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_snapshots_season
    ON rating_snapshots(sport, season, snapshot_date);

CREATE TABLE IF NOT EXISTS team_aliases (
    sport TEXT NOT NULL,
    alias TEXT NOT NULL,
    canonical TEXT NOT NULL,
    PRIMARY KEY (sport, alias)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS picks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pick_date TEXT NOT NULL,
    sport TEXT NOT NULL,
    game_id TEXT NOT NULL,
    matchup TEXT NOT NULL,
    market TEXT NOT NULL,
    side TEXT NOT NULL,
    line REAL NOT NULL,
    tier TEXT NOT NULL,
    trend_score REAL NOT NULL,
    edge REAL NOT NULL,
    predicted REAL NOT NULL,
    signals_json TEXT NOT NULL,
    forced_by TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING',
    generated_at TEXT NOT NULL,
    UNIQUE (pick_date, sport, game_id, side)
);

CREATE INDEX IF NOT EXISTS idx_picks_status
    ON picks(status, sport);

CREATE TABLE IF NOT EXISTS pick_runs (
    pick_date TEXT NOT NULL,
    sport TEXT NOT NULL,
    pick_count INTEGER NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (pick_date, sport)
) WITHOUT ROWID;
"#;

const GAME_COLUMNS: &str = "id, sport, season, week, game_date, home_team, away_team, \
     home_score, away_score, spread, over_under, home_moneyline, away_moneyline, \
     spread_result, ou_result, context_json";

const PICK_COLUMNS: &str = "id, pick_date, sport, game_id, matchup, market, side, line, tier, \
     trend_score, edge, predicted, signals_json, forced_by, status, generated_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Store implementing every repository trait over one SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) a read-write store and apply the schema.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        conn.busy_timeout(Duration::from_secs(10))
            .context("Failed to set busy timeout")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let games: i64 = conn
            .query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))
            .unwrap_or(0);
        info!(path = %db_path.display(), games, "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an existing database for a read-only batch session.
    pub fn open_read_only(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags).with_context(|| {
            format!("Failed to open database read-only at {}", db_path.display())
        })?;
        conn.busy_timeout(Duration::from_secs(10))
            .context("Failed to set busy timeout")?;
        debug!(path = %db_path.display(), "read-only session opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn count_games(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn count_picks(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM picks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    // =========================================================================
    // Row mapping
    // =========================================================================

    fn row_to_game(row: &rusqlite::Row) -> rusqlite::Result<GameRecord> {
        let context_json: String = row.get(15)?;
        let context: GameContext = serde_json::from_str(&context_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?;

        Ok(GameRecord {
            id: row.get(0)?,
            sport: parse_column(row, 1)?,
            season: row.get(2)?,
            week: row.get(3)?,
            game_date: date_column(row, 4)?,
            home_team: row.get(5)?,
            away_team: row.get(6)?,
            home_score: row.get(7)?,
            away_score: row.get(8)?,
            spread: row.get(9)?,
            over_under: row.get(10)?,
            home_moneyline: row.get(11)?,
            away_moneyline: row.get(12)?,
            spread_result: optional_parse_column(row, 13)?,
            ou_result: optional_parse_column(row, 14)?,
            context,
        })
    }

    fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<RatingSnapshot> {
        Ok(RatingSnapshot {
            team: row.get(0)?,
            date: date_column(row, 1)?,
            season: row.get(2)?,
            adj_oe: row.get(3)?,
            adj_de: row.get(4)?,
            adj_em: row.get(5)?,
            adj_tempo: row.get(6)?,
            rank: row.get(7)?,
        })
    }

    fn row_to_pick(row: &rusqlite::Row) -> rusqlite::Result<Pick> {
        let signals_json: String = row.get(12)?;
        let signals = serde_json::from_str(&signals_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?;
        let generated_at: String = row.get(15)?;
        let generated_at = DateTime::parse_from_rfc3339(&generated_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);

        Ok(Pick {
            id: row.get(0)?,
            pick_date: date_column(row, 1)?,
            sport: parse_column(row, 2)?,
            game_id: row.get(3)?,
            matchup: row.get(4)?,
            market: json_column(row, 5)?,
            side: parse_column(row, 6)?,
            line: row.get(7)?,
            tier: parse_column(row, 8)?,
            trend_score: row.get(9)?,
            edge: row.get(10)?,
            predicted: row.get(11)?,
            signals,
            forced_by: row.get(13)?,
            status: parse_column(row, 14)?,
            generated_at,
        })
    }
}

#[derive(Debug)]
struct ParseError(String);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

fn parse_column<T: std::str::FromStr<Err = String>>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(ParseError(e)))
    })
}

fn optional_parse_column<T: std::str::FromStr<Err = String>>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse::<T>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(ParseError(e)))
        })
    })
    .transpose()
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_value(serde_json::Value::String(raw))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// =============================================================================
// Repositories
// =============================================================================

impl GameRepository for SqliteStore {
    fn games(&self, sport: Sport) -> Result<Vec<GameRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM games WHERE sport = ?1 ORDER BY game_date, id",
            GAME_COLUMNS
        ))?;
        let games = stmt
            .query_map(params![sport.as_str()], Self::row_to_game)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read games")?;
        Ok(games)
    }

    fn games_between(
        &self,
        sport: Sport,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<GameRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM games
             WHERE sport = ?1 AND game_date >= ?2 AND game_date <= ?3
             ORDER BY game_date, id",
            GAME_COLUMNS
        ))?;
        let games = stmt
            .query_map(
                params![sport.as_str(), date_key(from), date_key(to)],
                Self::row_to_game,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read games")?;
        Ok(games)
    }

    fn game(&self, id: &str) -> Result<Option<GameRecord>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {} FROM games WHERE id = ?1", GAME_COLUMNS))?;
        let game = stmt
            .query_row(params![id], Self::row_to_game)
            .optional()
            .with_context(|| format!("Failed to read game {}", id))?;
        Ok(game)
    }

    fn upsert_games(&self, games: &[GameRecord]) -> Result<usize> {
        if games.is_empty() {
            return Ok(0);
        }

        let serialized: Vec<_> = games
            .iter()
            .map(|g| serde_json::to_string(&g.context).map(|ctx| (g, ctx)))
            .collect::<serde_json::Result<Vec<_>>>()
            .context("Failed to serialize game context")?;

        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;
        let mut written = 0usize;
        for (game, context_json) in &serialized {
            let result = conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO games ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    GAME_COLUMNS
                ),
                params![
                    &game.id,
                    game.sport.as_str(),
                    game.season,
                    &game.week,
                    date_key(game.game_date),
                    &game.home_team,
                    &game.away_team,
                    game.home_score,
                    game.away_score,
                    game.spread,
                    game.over_under,
                    game.home_moneyline,
                    game.away_moneyline,
                    game.spread_result.map(|r| r.as_str()),
                    game.ou_result.map(|r| r.as_str()),
                    context_json,
                ],
            );
            match result {
                Ok(changes) => written += changes,
                Err(e) => {
                    conn.execute("ROLLBACK", []).ok();
                    return Err(e).with_context(|| format!("Failed to write game {}", game.id));
                }
            }
        }
        conn.execute("COMMIT", [])?;

        debug!(written, "games upserted");
        Ok(written)
    }
}

impl SnapshotRepository for SqliteStore {
    fn snapshots(&self, sport: Sport, season: Option<i32>) -> Result<Vec<RatingSnapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT team, snapshot_date, season, adj_oe, adj_de, adj_em, adj_tempo, rank
             FROM rating_snapshots
             WHERE sport = ?1 AND (?2 IS NULL OR season = ?2)
             ORDER BY snapshot_date, team",
        )?;
        let snapshots = stmt
            .query_map(params![sport.as_str(), season], Self::row_to_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read rating snapshots")?;
        Ok(snapshots)
    }

    fn upsert_snapshots(&self, sport: Sport, snapshots: &[RatingSnapshot]) -> Result<usize> {
        if snapshots.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;
        let mut written = 0usize;
        for s in snapshots {
            let result = conn.execute(
                "INSERT OR REPLACE INTO rating_snapshots
                 (sport, team, snapshot_date, season, adj_oe, adj_de, adj_em, adj_tempo, rank)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    sport.as_str(),
                    &s.team,
                    date_key(s.date),
                    s.season,
                    s.adj_oe,
                    s.adj_de,
                    s.adj_em,
                    s.adj_tempo,
                    s.rank,
                ],
            );
            match result {
                Ok(changes) => written += changes,
                Err(e) => {
                    conn.execute("ROLLBACK", []).ok();
                    return Err(e).context("Failed to write rating snapshot");
                }
            }
        }
        conn.execute("COMMIT", [])?;

        debug!(%sport, written, "rating snapshots upserted");
        Ok(written)
    }
}

impl AliasRepository for SqliteStore {
    fn aliases(&self, sport: Sport) -> Result<HashMap<String, String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT alias, canonical FROM team_aliases WHERE sport = ?1")?;
        let aliases = stmt
            .query_map(params![sport.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<HashMap<String, String>>>()
            .context("Failed to read team aliases")?;
        Ok(aliases)
    }

    fn upsert_alias(&self, sport: Sport, alias: &str, canonical: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO team_aliases (sport, alias, canonical) VALUES (?1, ?2, ?3)",
            params![sport.as_str(), alias, canonical],
        )
        .with_context(|| format!("Failed to write alias {} -> {}", alias, canonical))?;
        Ok(())
    }
}

impl PickRepository for SqliteStore {
    fn pick_run_exists(&self, date: NaiveDate, sport: Sport) -> Result<bool> {
        let conn = self.conn.lock();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pick_runs WHERE pick_date = ?1 AND sport = ?2)",
            params![date_key(date), sport.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn save_pick_run(&self, date: NaiveDate, sport: Sport, picks: &[Pick]) -> Result<bool> {
        let serialized: Vec<_> = picks
            .iter()
            .map(|p| serde_json::to_string(&p.signals).map(|signals| (p, signals)))
            .collect::<serde_json::Result<Vec<_>>>()
            .context("Failed to serialize pick signals")?;

        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;

        let claimed = conn.execute(
            "INSERT OR IGNORE INTO pick_runs (pick_date, sport, pick_count) VALUES (?1, ?2, ?3)",
            params![date_key(date), sport.as_str(), picks.len() as i64],
        );
        let claimed = match claimed {
            Ok(changes) => changes == 1,
            Err(e) => {
                conn.execute("ROLLBACK", []).ok();
                return Err(e).context("Failed to record pick run");
            }
        };
        if !claimed {
            conn.execute("COMMIT", [])?;
            debug!(%date, %sport, "pick run already recorded");
            return Ok(false);
        }

        let mut inserted = 0usize;
        for (pick, signals_json) in &serialized {
            let result = conn.execute(
                "INSERT OR IGNORE INTO picks
                 (pick_date, sport, game_id, matchup, market, side, line, tier, trend_score,
                  edge, predicted, signals_json, forced_by, status, generated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    date_key(pick.pick_date),
                    pick.sport.as_str(),
                    &pick.game_id,
                    &pick.matchup,
                    pick.market.as_str(),
                    pick.side.as_str(),
                    pick.line,
                    pick.tier.as_str(),
                    pick.trend_score,
                    pick.edge,
                    pick.predicted,
                    signals_json,
                    &pick.forced_by,
                    pick.status.as_str(),
                    pick.generated_at.to_rfc3339(),
                ],
            );
            match result {
                Ok(changes) => inserted += changes,
                Err(e) => {
                    conn.execute("ROLLBACK", []).ok();
                    return Err(e).context("Failed to write pick");
                }
            }
        }
        conn.execute("COMMIT", [])?;

        info!(%date, %sport, inserted, "pick run saved");
        Ok(true)
    }

    fn picks_for(&self, date: NaiveDate, sport: Sport) -> Result<Vec<Pick>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM picks WHERE pick_date = ?1 AND sport = ?2 ORDER BY id",
            PICK_COLUMNS
        ))?;
        let picks = stmt
            .query_map(params![date_key(date), sport.as_str()], Self::row_to_pick)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read picks")?;
        Ok(picks)
    }

    fn pending_picks(&self, sport: Option<Sport>) -> Result<Vec<Pick>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM picks
             WHERE status = 'PENDING' AND (?1 IS NULL OR sport = ?1)
             ORDER BY pick_date, id",
            PICK_COLUMNS
        ))?;
        let picks = stmt
            .query_map(params![sport.map(|s| s.as_str())], Self::row_to_pick)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read pending picks")?;
        Ok(picks)
    }

    fn settled_picks(&self, sport: Option<Sport>) -> Result<Vec<Pick>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM picks
             WHERE status != 'PENDING' AND (?1 IS NULL OR sport = ?1)
             ORDER BY pick_date, id",
            PICK_COLUMNS
        ))?;
        let picks = stmt
            .query_map(params![sport.map(|s| s.as_str())], Self::row_to_pick)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read settled picks")?;
        Ok(picks)
    }

    fn update_pick_status(&self, id: i64, status: PickStatus) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE picks SET status = ?1 WHERE id = ?2 AND status = 'PENDING'",
            params![status.as_str(), id],
        )
        .with_context(|| format!("Failed to update pick {}", id))?;
        Ok(())
    }
}
