//! Trendline CLI
//!
//! # Usage
//!
//! ```bash
//! trendline --db ./trendline.db backtest --sport NCAAMB --target total
//! trendline angles --sport NFL --output angles.json
//! trendline picks --sport NCAAMB --date 2024-02-10
//! trendline grade
//! trendline gate --sport NCAAMB --target total
//! trendline simulate --seed 7
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success (for `gate`: every gate passed)
//! - 1: `gate` ran and at least one gate failed
//! - 2: Configuration or validation error
//! - 3: Runtime error (database, I/O, etc.)

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trendline::angles::AngleEngine;
use trendline::backtest::bootstrap::BootstrapEngine;
use trendline::backtest::features::Target;
use trendline::backtest::gate::{evaluate_gates, exit_code, render_results};
use trendline::backtest::synthetic::{SyntheticConfig, SyntheticLeagueGenerator};
use trendline::backtest::{run_backtest, BacktestInputs};
use trendline::models::Sport;
use trendline::picks::{grade_pending, pick_performance, PickGenerator};
use trendline::store::{AliasRepository, GameRepository, SnapshotRepository, SqliteStore};
use trendline::EngineConfig;

const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_RUNTIME_ERROR: i32 = 3;

/// Historical angle discovery, walk-forward backtests and daily picks
#[derive(Parser, Debug)]
#[command(name = "trendline")]
#[command(about = "Point-in-time backtesting and signal-convergence picks")]
struct Cli {
    /// TOML config file (defaults to $TRENDLINE_CONFIG, then built-in defaults)
    #[arg(short, long, env = "TRENDLINE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database (overrides `database_path` from the config)
    #[arg(short, long, env = "TRENDLINE_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk-forward backtest with bootstrap confidence intervals
    Backtest {
        #[arg(short, long)]
        sport: Sport,

        /// total | margin
        #[arg(short, long, default_value = "total")]
        target: Target,

        /// Print the full report as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Scan angle templates for significant historical patterns (JSON output)
    Angles {
        #[arg(short, long)]
        sport: Sport,

        /// Output file path (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate (or return the stored) picks for a date
    Picks {
        #[arg(short, long)]
        sport: Sport,

        /// Pick date, YYYY-MM-DD (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Grade pending picks whose games are final, then bootstrap the record by tier
    Grade {
        #[arg(short, long)]
        sport: Option<Sport>,
    },

    /// Check configured accuracy gates against a fresh backtest
    Gate {
        #[arg(short, long)]
        sport: Sport,

        #[arg(short, long, default_value = "total")]
        target: Target,
    },

    /// Write a seeded synthetic league into the database
    Simulate {
        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(long, default_value = "24")]
        teams: usize,
    },
}

fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {:#}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    match run(cli.command, &config) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env(),
    };
    if let Some(db) = &cli.db {
        config.database_path = db.to_string_lossy().into_owned();
    }
    config.validate()?;
    Ok(config)
}

fn run(command: Commands, config: &EngineConfig) -> Result<i32> {
    match command {
        Commands::Backtest { sport, target, json } => {
            let report = run_backtest(sport, target, load_inputs(config, sport)?, config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
            Ok(0)
        }
        Commands::Angles { sport, output } => {
            let games = {
                let store = SqliteStore::open_read_only(&config.database_path)?;
                store.games(sport)?
            };
            let engine = AngleEngine::with_builtin_templates(config.angles.clone());
            let run = engine.discover_reconciled(sport, games, config.settlement.mismatch_policy);
            let json = serde_json::to_string_pretty(&run)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(
                        path = %path.display(),
                        results = run.results.len(),
                        quarantined = run.quarantined,
                        "angles written"
                    );
                }
                None => println!("{}", json),
            }
            Ok(0)
        }
        Commands::Picks { sport, date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let store = SqliteStore::open(&config.database_path)?;
            let picks = PickGenerator::new(&store, config).generate(date, sport)?;

            println!("{} picks for {} ({})", picks.len(), date, sport);
            for p in &picks {
                println!(
                    "  {:<40} {:<6} {:>7.1}  {:<8} score {:>6.1}  edge {:>+5.1}{}",
                    p.matchup,
                    p.side.as_str(),
                    p.line,
                    p.tier.as_str(),
                    p.trend_score,
                    p.edge,
                    p.forced_by
                        .as_deref()
                        .map(|rule| format!("  [forced: {}]", rule))
                        .unwrap_or_default()
                );
            }
            Ok(0)
        }
        Commands::Grade { sport } => {
            let store = SqliteStore::open(&config.database_path)?;
            let summary = grade_pending(&store, sport)?;
            let engine = BootstrapEngine::new(config.bootstrap.clone());
            let performance = pick_performance(&store, sport, &engine)?;
            let output = serde_json::json!({
                "graded": summary,
                "performance": performance,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(0)
        }
        Commands::Gate { sport, target } => {
            if config.gates.is_empty() {
                error!("no gates configured");
                return Ok(EXIT_CONFIG_ERROR);
            }
            let report = run_backtest(sport, target, load_inputs(config, sport)?, config)?;
            let results = evaluate_gates(&config.gates, &report);
            print!("{}", render_results(&results));
            Ok(exit_code(&results))
        }
        Commands::Simulate { seed, teams } => {
            let synthetic = SyntheticConfig {
                seed,
                teams,
                ..SyntheticConfig::default()
            };
            let sport = synthetic.sport;
            let league = SyntheticLeagueGenerator::new(synthetic).generate()?;
            let store = SqliteStore::open(&config.database_path)?;
            let games = store.upsert_games(&league.games)?;
            let snapshots = store.upsert_snapshots(sport, &league.snapshots)?;
            info!(%sport, games, snapshots, "synthetic league written");
            Ok(0)
        }
    }
}

/// Read everything a backtest needs through one read-only session.
fn load_inputs(config: &EngineConfig, sport: Sport) -> Result<BacktestInputs> {
    let store = SqliteStore::open_read_only(&config.database_path)?;
    let inputs = BacktestInputs {
        games: store.games(sport)?,
        snapshots: store.snapshots(sport, None)?,
        aliases: store.aliases(sport)?,
    };
    if inputs.games.is_empty() {
        bail!("no {} games in {}", sport, config.database_path);
    }
    Ok(inputs)
}
