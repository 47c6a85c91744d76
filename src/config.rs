//! Engine configuration
//!
//! Every tunable threshold lives here so it can be re-validated without a rebuild.
//! Loaded from TOML; missing sections fall back to their defaults.

use crate::angles::engine::AngleConfig;
use crate::backtest::bootstrap::BootstrapConfig;
use crate::backtest::gate::AccuracyGate;
use crate::backtest::snapshot_matcher::MatcherConfig;
use crate::backtest::walk_forward::WalkForwardConfig;
use crate::picks::scorer::ScorerConfig;
use crate::settlement::MismatchPolicy;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database holding games, snapshots and picks
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default)]
    pub settlement: SettlementConfig,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub walk_forward: WalkForwardConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    #[serde(default)]
    pub angles: AngleConfig,

    #[serde(default)]
    pub scorer: ScorerConfig,

    /// Accuracy ranges checked by the `gate` command
    #[serde(default)]
    pub gates: Vec<AccuracyGate>,
}

fn default_database_path() -> String {
    "./trendline.db".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default)]
    pub mismatch_policy: MismatchPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            settlement: SettlementConfig::default(),
            matcher: MatcherConfig::default(),
            walk_forward: WalkForwardConfig::default(),
            bootstrap: BootstrapConfig::default(),
            angles: AngleConfig::default(),
            scorer: ScorerConfig::default(),
            gates: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `TRENDLINE_CONFIG` (or `trendline.toml`), falling back to defaults
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let path =
            std::env::var("TRENDLINE_CONFIG").unwrap_or_else(|_| "trendline.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default engine config ({}): {:#}", path, e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<()> {
        let wf = &self.walk_forward;
        ensure!(wf.min_edge >= 0.0, "walk_forward.min_edge must be >= 0");
        ensure!(wf.lambda >= 0.0, "walk_forward.lambda must be >= 0");

        let bs = &self.bootstrap;
        ensure!(bs.resamples > 0, "bootstrap.resamples must be > 0");
        ensure!(
            bs.confidence > 0.0 && bs.confidence < 1.0,
            "bootstrap.confidence must be in (0, 1)"
        );
        ensure!(bs.american_odds.abs() >= 100, "bootstrap.american_odds must be |odds| >= 100");

        let tiers = &self.scorer.tiers;
        ensure!(
            tiers.highest >= tiers.middle,
            "scorer.tiers.highest ({}) must be >= scorer.tiers.middle ({})",
            tiers.highest,
            tiers.middle
        );

        for gate in &self.gates {
            ensure!(
                gate.min_accuracy <= gate.max_accuracy,
                "gate '{}' has min_accuracy > max_accuracy",
                gate.name
            );
        }
        Ok(())
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PickSide, Sport};
    use crate::picks::scorer::OverrideCondition;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.walk_forward.min_training_rows, 100);
        assert_eq!(config.bootstrap.resamples, 10_000);
        assert!(config.scorer.overrides.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EngineConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.walk_forward.min_edge, config.walk_forward.min_edge);
        assert_eq!(parsed.scorer.tiers.highest, config.scorer.tiers.highest);
    }

    #[test]
    fn test_partial_file_with_overrides() {
        let toml = r#"
            database_path = "/tmp/x.db"

            [walk_forward]
            min_edge = 3.0

            [settlement]
            mismatch_policy = "quarantine"

            [[scorer.overrides]]
            id = "both-top-25-under"
            sports = ["NCAAMB"]
            force = "UNDER"
            condition = { kind = "both_top_ranked", max_rank = 25 }

            [[gates]]
            name = "ncaamb-totals"
            category = "overall"
            min_accuracy = 0.50
            max_accuracy = 0.60
        "#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.walk_forward.min_edge, 3.0);
        assert_eq!(config.walk_forward.min_training_rows, 100);
        assert_eq!(config.settlement.mismatch_policy, MismatchPolicy::Quarantine);
        assert_eq!(config.scorer.overrides.len(), 1);
        let rule = &config.scorer.overrides[0];
        assert_eq!(rule.force, PickSide::Under);
        assert_eq!(rule.sports, vec![Sport::Ncaamb]);
        assert!(matches!(
            rule.condition,
            OverrideCondition::BothTopRanked { max_rank: 25 }
        ));
        assert_eq!(config.gates.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_config_loads() {
        let config =
            EngineConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/trendline.toml"))
                .unwrap();
        assert_eq!(config.scorer.tiers.highest, 85.0);
        assert_eq!(config.scorer.overrides.len(), 2);
        assert_eq!(config.scorer.overrides[0].force, PickSide::Under);
        assert_eq!(config.gates.len(), 2);
    }

    #[test]
    fn test_validate_rejects_inverted_tiers() {
        let mut config = EngineConfig::default();
        config.scorer.tiers.highest = 50.0;
        config.scorer.tiers.middle = 60.0;
        assert!(config.validate().is_err());
    }
}
