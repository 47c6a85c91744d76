//! Synthetic league through the full backtest path: store, matcher, walk-forward,
//! bootstrap and gates.

use trendline::backtest::features::Target;
use trendline::backtest::gate::{evaluate_gates, exit_code, AccuracyGate, GateVerdict};
use trendline::backtest::synthetic::{SyntheticConfig, SyntheticLeagueGenerator};
use trendline::backtest::walk_forward::SeasonStatus;
use trendline::backtest::{run_backtest, BacktestInputs};
use trendline::models::{break_even_rate, Sport};
use trendline::store::{AliasRepository, GameRepository, SnapshotRepository, SqliteStore};
use trendline::EngineConfig;

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.bootstrap.resamples = 2_000;
    config
}

fn inputs() -> BacktestInputs {
    let league = SyntheticLeagueGenerator::new(SyntheticConfig::default())
        .generate()
        .unwrap();
    BacktestInputs {
        games: league.games,
        snapshots: league.snapshots,
        aliases: Default::default(),
    }
}

#[test]
fn test_total_backtest_recovers_generating_model() {
    let report = run_backtest(Sport::Ncaamb, Target::Total, inputs(), &config()).unwrap();
    let wf = &report.walk_forward;

    assert_eq!(wf.seasons.len(), 3);
    assert!(matches!(wf.seasons[0].status, SeasonStatus::Skipped { .. }));
    for season in &wf.seasons[1..] {
        assert_eq!(season.status, SeasonStatus::Evaluated);
        assert!(season.max_training_season.unwrap() < season.season);

        let model = season.model.as_ref().unwrap();
        // total = 150 + 0.5 * sumOE - 0.3 * sumDE + noise
        assert!((model.coefficients.weights[0] - 0.5).abs() < 0.1, "{:?}", model.coefficients);
        assert!((model.coefficients.weights[1] + 0.3).abs() < 0.1, "{:?}", model.coefficients);
    }

    let stats = wf.match_stats.as_ref().unwrap();
    assert_eq!(stats.unmatched, 0);
}

#[test]
fn test_edges_beat_break_even_when_lines_are_noisy() {
    let report = run_backtest(Sport::Ncaamb, Target::Total, inputs(), &config()).unwrap();
    let overall = report.category("overall").unwrap();

    assert!(overall.n.unwrap() > 500);
    assert!(overall.accuracy.unwrap() > break_even_rate(-110));
    assert!(overall.profitable);
    let ci = overall.accuracy_ci.unwrap();
    assert!(ci.lower <= overall.accuracy.unwrap() && overall.accuracy.unwrap() <= ci.upper);

    // Accuracy grows with the edge threshold
    let low = report.calibration.first().unwrap().record.accuracy().unwrap();
    let high = report
        .calibration
        .iter()
        .rev()
        .find_map(|c| c.record.accuracy())
        .unwrap();
    assert!(high >= low);
}

#[test]
fn test_gates_pass_and_fail() {
    let report = run_backtest(Sport::Ncaamb, Target::Total, inputs(), &config()).unwrap();
    let plausible = AccuracyGate {
        name: "plausible".to_string(),
        category: "overall".to_string(),
        min_accuracy: 0.50,
        max_accuracy: 0.90,
    };
    let too_good = AccuracyGate {
        name: "too-good-to-be-true".to_string(),
        category: "overall".to_string(),
        min_accuracy: 0.95,
        max_accuracy: 1.0,
    };
    let missing = AccuracyGate {
        name: "no-such-category".to_string(),
        category: "season:1999".to_string(),
        min_accuracy: 0.0,
        max_accuracy: 1.0,
    };

    let results = evaluate_gates(&[plausible.clone()], &report);
    assert_eq!(results[0].verdict, GateVerdict::Pass);
    assert_eq!(exit_code(&results), 0);

    let results = evaluate_gates(&[plausible, too_good, missing], &report);
    assert_eq!(results[1].verdict, GateVerdict::Fail);
    assert_eq!(results[2].verdict, GateVerdict::Fail);
    assert_eq!(exit_code(&results), 1);
}

#[test]
fn test_backtest_from_read_only_store_session() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("league.db");
    let data = inputs();
    {
        let store = SqliteStore::open(&path).unwrap();
        store.upsert_games(&data.games).unwrap();
        store.upsert_snapshots(Sport::Ncaamb, &data.snapshots).unwrap();
    }

    let loaded = {
        let store = SqliteStore::open_read_only(&path).unwrap();
        BacktestInputs {
            games: store.games(Sport::Ncaamb).unwrap(),
            snapshots: store.snapshots(Sport::Ncaamb, None).unwrap(),
            aliases: store.aliases(Sport::Ncaamb).unwrap(),
        }
    };
    assert_eq!(loaded.games.len(), data.games.len());

    let from_store = run_backtest(Sport::Ncaamb, Target::Total, loaded, &config()).unwrap();
    let in_memory = run_backtest(Sport::Ncaamb, Target::Total, data, &config()).unwrap();
    assert_eq!(from_store.walk_forward.overall, in_memory.walk_forward.overall);
}

#[test]
fn test_margin_backtest_runs() {
    let report = run_backtest(Sport::Ncaamb, Target::Margin, inputs(), &config()).unwrap();
    assert_eq!(report.target, Target::Margin);
    assert_eq!(report.walk_forward.evaluated_seasons().count(), 2);
    assert!(report
        .walk_forward
        .picks()
        .all(|p| p.direction.market() == trendline::models::Market::Spread));
}
