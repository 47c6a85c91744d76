//! Feature extraction for the regression model.

use crate::backtest::snapshot_matcher::EnrichedFeatureRow;
use crate::models::{Market, PickSide};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the model predicts, and which market line it is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Combined score vs the over/under
    Total,
    /// Home margin vs the market-implied margin (`-spread`)
    Margin,
}

impl Target {
    pub fn market(&self) -> Market {
        match self {
            Target::Total => Market::Total,
            Target::Margin => Market::Spread,
        }
    }

    pub fn feature_names(&self) -> &'static [&'static str] {
        match self {
            Target::Total => &["sum_oe", "sum_de", "avg_tempo"],
            Target::Margin => &["em_diff", "oe_diff", "de_diff"],
        }
    }

    pub fn features(&self, row: &EnrichedFeatureRow) -> Vec<f64> {
        let (h, a) = (&row.home, &row.away);
        match self {
            Target::Total => vec![
                h.adj_oe + a.adj_oe,
                h.adj_de + a.adj_de,
                (h.adj_tempo + a.adj_tempo) / 2.0,
            ],
            Target::Margin => vec![
                h.adj_em - a.adj_em,
                h.adj_oe - a.adj_oe,
                h.adj_de - a.adj_de,
            ],
        }
    }

    /// Observed value for a final game.
    pub fn actual(&self, row: &EnrichedFeatureRow) -> Option<f64> {
        match self {
            Target::Total => row.game.combined_score(),
            Target::Margin => row.game.home_margin(),
        }
    }

    /// Market line expressed on the same scale as the prediction.
    pub fn line(&self, row: &EnrichedFeatureRow) -> Option<f64> {
        match self {
            Target::Total => row.game.over_under,
            Target::Margin => row.game.spread.map(|s| -s),
        }
    }

    /// Side implied by a signed edge.
    pub fn direction(&self, edge: f64) -> PickSide {
        PickSide::from_sign(self.market(), edge)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Total => "total",
            Target::Margin => "margin",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "total" | "totals" | "ou" => Ok(Target::Total),
            "margin" | "spread" | "ats" => Ok(Target::Margin),
            other => Err(format!("unknown target '{}'", other)),
        }
    }
}

/// Rows usable for training: final score and a line present.
pub fn training_pairs(target: Target, rows: &[&EnrichedFeatureRow]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut x = Vec::with_capacity(rows.len());
    let mut y = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(actual) = target.actual(row) {
            x.push(target.features(row));
            y.push(actual);
        }
    }
    (x, y)
}
