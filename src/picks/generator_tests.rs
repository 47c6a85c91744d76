use super::generator::PickGenerator;
use super::{Pick, PickStatus};
use crate::backtest::synthetic::{SyntheticConfig, SyntheticLeague, SyntheticLeagueGenerator};
use crate::config::EngineConfig;
use crate::models::{Market, PickSide, Sport};
use crate::picks::scorer::{OverrideCondition, OverrideRule};
use crate::store::{GameRepository, PickRepository, SnapshotRepository, SqliteStore};
use chrono::NaiveDate;
use std::sync::Arc;
use tempfile::TempDir;

fn league() -> SyntheticLeague {
    SyntheticLeagueGenerator::new(SyntheticConfig::default())
        .generate()
        .unwrap()
}

fn seed(store: &SqliteStore, league: &SyntheticLeague) {
    store.upsert_games(&league.games).unwrap();
    store.upsert_snapshots(Sport::Ncaamb, &league.snapshots).unwrap();
}

/// Model edge only, so every slate game with a non-trivial edge becomes a pick.
fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.scorer.min_edge = 0.5;
    let w = &mut config.scorer.weights;
    w.market_divergence = 0.0;
    w.season_record = 0.0;
    w.recent_form = 0.0;
    w.head_to_head = 0.0;
    w.situational = 0.0;
    w.weather_pace = 0.0;
    config
}

fn pick_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 10).unwrap()
}

fn key(p: &Pick) -> (String, PickSide, String, String) {
    (
        p.game_id.clone(),
        p.side,
        format!("{:.6}", p.line),
        format!("{:.6}", p.predicted),
    )
}

#[test]
fn test_second_call_returns_first_result() {
    let store = SqliteStore::in_memory().unwrap();
    seed(&store, &league());
    let config = config();
    let generator = PickGenerator::new(&store, &config);

    let first = generator.generate(pick_date(), Sport::Ncaamb).unwrap();
    assert!(!first.is_empty());
    assert!(first.iter().all(|p| p.status == PickStatus::Pending && p.id.is_some()));
    assert!(first.iter().all(|p| p.pick_date == pick_date()));

    let second = generator.generate(pick_date(), Sport::Ncaamb).unwrap();
    assert_eq!(first, second);
    assert_eq!(store.count_picks().unwrap(), first.len());
}

#[test]
fn test_concurrent_requests_converge_to_one_set() {
    let dir = TempDir::new().unwrap();
    let path = Arc::new(dir.path().join("picks.db"));
    seed(&SqliteStore::open(path.as_ref()).unwrap(), &league());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = Arc::clone(&path);
            std::thread::spawn(move || {
                let store = SqliteStore::open(path.as_ref()).unwrap();
                let config = config();
                PickGenerator::new(&store, &config)
                    .generate(pick_date(), Sport::Ncaamb)
                    .unwrap()
            })
        })
        .collect();
    let results: Vec<Vec<Pick>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for r in &results[1..] {
        assert_eq!(r, &results[0]);
    }
    let store = SqliteStore::open(path.as_ref()).unwrap();
    assert_eq!(store.count_picks().unwrap(), results[0].len());
}

#[test]
fn test_future_results_do_not_change_picks() {
    let league = league();
    let config = config();

    let clean = SqliteStore::in_memory().unwrap();
    seed(&clean, &league);
    let expected: Vec<_> = PickGenerator::new(&clean, &config)
        .build(pick_date(), Sport::Ncaamb)
        .unwrap()
        .iter()
        .map(key)
        .collect();

    // Rewrite every result on or after the pick date
    let mut tampered = league.clone();
    for g in tampered.games.iter_mut().filter(|g| g.game_date >= pick_date()) {
        g.home_score = Some(200);
        g.away_score = Some(0);
    }
    let store = SqliteStore::in_memory().unwrap();
    seed(&store, &tampered);
    let actual: Vec<_> = PickGenerator::new(&store, &config)
        .build(pick_date(), Sport::Ncaamb)
        .unwrap()
        .iter()
        .map(key)
        .collect();

    assert_eq!(expected, actual);
}

#[test]
fn test_empty_run_is_still_recorded() {
    let store = SqliteStore::in_memory().unwrap();
    seed(&store, &league());
    let mut config = config();
    config.walk_forward.min_training_rows = 1_000_000;

    let picks = PickGenerator::new(&store, &config)
        .generate(pick_date(), Sport::Ncaamb)
        .unwrap();
    assert!(picks.is_empty());
    assert!(store.pick_run_exists(pick_date(), Sport::Ncaamb).unwrap());

    // A later config change does not regenerate a recorded run
    let picks = PickGenerator::new(&store, &self::config())
        .generate(pick_date(), Sport::Ncaamb)
        .unwrap();
    assert!(picks.is_empty());
}

#[test]
fn test_override_forces_side_on_stored_picks() {
    let store = SqliteStore::in_memory().unwrap();
    seed(&store, &league());
    let mut config = config();
    config.scorer.overrides = vec![OverrideRule {
        id: "everything-under".to_string(),
        sports: vec![Sport::Ncaamb],
        force: PickSide::Under,
        condition: OverrideCondition::TotalAbove { threshold: 0.0 },
        description: String::new(),
    }];

    let picks = PickGenerator::new(&store, &config)
        .generate(pick_date(), Sport::Ncaamb)
        .unwrap();
    let slate = store.games_on(Sport::Ncaamb, pick_date()).unwrap();
    let totals: Vec<&Pick> = picks.iter().filter(|p| p.market == Market::Total).collect();
    assert_eq!(totals.len(), slate.len());
    for p in totals {
        assert_eq!(p.side, PickSide::Under);
        assert_eq!(p.forced_by.as_deref(), Some("everything-under"));
    }
}
