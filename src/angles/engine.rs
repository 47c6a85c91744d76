//! Angle discovery
//!
//! Runs every template scoped to a sport over the final games. Each matched subset is
//! settled in both markets (ATS and totals), each market is scored for significance from
//! both perspectives, and the results are ranked by interest score. Games are settled
//! here from scores and lines; supplied labels are never read.

use crate::angles::significance::{interest_score, test_rate, Strength};
use crate::angles::templates::{builtin_templates, AngleMarket, AngleTemplate};
use crate::backtest::walk_forward::Record;
use crate::models::{GameRecord, Sport};
use crate::settlement::{reconcile, MismatchPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AngleConfig {
    /// Results with fewer decided games are not surfaced
    #[serde(default = "default_min_sample")]
    pub min_sample: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Also surface the opposite perspective of every template
    #[serde(default = "default_include_flipped")]
    pub include_flipped: bool,
}

fn default_min_sample() -> usize {
    30
}
fn default_max_results() -> usize {
    25
}
fn default_include_flipped() -> bool {
    true
}

impl Default for AngleConfig {
    fn default() -> Self {
        Self {
            min_sample: default_min_sample(),
            max_results: default_max_results(),
            include_flipped: default_include_flipped(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    Primary,
    Flipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub template_id: String,
    pub name: String,
    pub description: String,
    pub sport: Sport,
    pub perspective: Perspective,
    pub market: AngleMarket,
    /// Matched games this market could settle, pushes included
    pub games: usize,
    pub record: Record,
    /// Wins over decided games
    pub rate: Option<f64>,
    /// Pushes over all matched games
    pub push_rate: Option<f64>,
    pub z_score: Option<f64>,
    pub p_value: Option<f64>,
    pub strength: Strength,
    pub interest_score: f64,
}

impl SignificanceResult {
    /// Wins over all matched games, pushes included in the denominator.
    pub fn win_share(&self) -> Option<f64> {
        if self.games == 0 {
            None
        } else {
            Some(self.record.wins as f64 / self.games as f64)
        }
    }
}

/// One market of a template, read from both sides over an identical game subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnglePair {
    pub primary: SignificanceResult,
    pub flipped: SignificanceResult,
}

/// A template settled in both markets over the games its conditions matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEvaluation {
    pub template_id: String,
    pub matched: usize,
    pub ats: AnglePair,
    pub totals: AnglePair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRun {
    pub sport: Sport,
    pub generated_at: DateTime<Utc>,
    pub games_considered: usize,
    /// Games held out because their supplied labels disagreed with the scores
    #[serde(default)]
    pub quarantined: usize,
    pub results: Vec<SignificanceResult>,
}

pub struct AngleEngine {
    config: AngleConfig,
    templates: Vec<AngleTemplate>,
}

impl AngleEngine {
    pub fn new(config: AngleConfig, templates: Vec<AngleTemplate>) -> Self {
        Self { config, templates }
    }

    pub fn with_builtin_templates(config: AngleConfig) -> Self {
        Self::new(config, builtin_templates())
    }

    pub fn templates(&self) -> &[AngleTemplate] {
        &self.templates
    }

    /// Evaluate a template in both markets, each with its flip.
    pub fn evaluate(
        &self,
        template: &AngleTemplate,
        sport: Sport,
        games: &[GameRecord],
    ) -> TemplateEvaluation {
        let matched: Vec<&GameRecord> = games
            .iter()
            .filter(|g| g.sport == sport && template.matches(g))
            .collect();
        let flipped = template.flipped();
        let [ats, totals] = template.markets();
        let [flipped_ats, flipped_totals] = flipped.markets();

        TemplateEvaluation {
            template_id: template.id.clone(),
            matched: matched.len(),
            ats: settle_pair(template, &flipped, (ats, flipped_ats), sport, &matched),
            totals: settle_pair(template, &flipped, (totals, flipped_totals), sport, &matched),
        }
    }

    /// Reconcile supplied settlement labels under `policy`, then discover over the games
    /// that survive.
    pub fn discover_reconciled(
        &self,
        sport: Sport,
        games: Vec<GameRecord>,
        policy: MismatchPolicy,
    ) -> DiscoveryRun {
        let reconciliation = reconcile(games, policy);
        let mut run = self.discover(sport, &reconciliation.games);
        run.quarantined = reconciliation.quarantined.len();
        run
    }

    pub fn discover(&self, sport: Sport, games: &[GameRecord]) -> DiscoveryRun {
        let considered: Vec<GameRecord> = games
            .iter()
            .filter(|g| g.sport == sport && g.is_final())
            .cloned()
            .collect();

        let mut results = Vec::new();
        for template in self.templates.iter().filter(|t| t.applies_to(sport)) {
            let evaluation = self.evaluate(template, sport, &considered);
            debug!(
                template = %template.id,
                matched = evaluation.matched,
                ats_rate = ?evaluation.ats.primary.rate,
                totals_rate = ?evaluation.totals.primary.rate,
                "template evaluated"
            );
            for pair in [evaluation.ats, evaluation.totals] {
                results.push(pair.primary);
                if self.config.include_flipped {
                    results.push(pair.flipped);
                }
            }
        }

        let evaluated = results.len();
        results.retain(|r| r.record.decided() >= self.config.min_sample);
        results.sort_by(|a, b| {
            b.interest_score
                .partial_cmp(&a.interest_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.template_id.cmp(&b.template_id))
                .then_with(|| a.market.label().cmp(&b.market.label()))
        });
        results.truncate(self.config.max_results);

        info!(
            %sport,
            games = considered.len(),
            evaluated,
            surfaced = results.len(),
            strong = results.iter().filter(|r| r.strength == Strength::Strong).count(),
            "angle discovery complete"
        );

        DiscoveryRun {
            sport,
            generated_at: Utc::now(),
            games_considered: considered.len(),
            quarantined: 0,
            results,
        }
    }
}

/// Settle one market and its opposite over the matched games. Games the market cannot
/// settle (no favorite, no total) drop out of both sides.
fn settle_pair(
    template: &AngleTemplate,
    flipped_template: &AngleTemplate,
    (market, flipped_market): (AngleMarket, AngleMarket),
    sport: Sport,
    games: &[&GameRecord],
) -> AnglePair {
    let mut primary = Record::default();
    let mut flipped = Record::default();
    let mut settled = 0;

    for game in games {
        let (Some(a), Some(b)) = (market.settle(game), flipped_market.settle(game)) else {
            continue;
        };
        settled += 1;
        primary.add(a);
        flipped.add(b);
    }

    AnglePair {
        primary: score(template, market, sport, Perspective::Primary, settled, primary),
        flipped: score(
            flipped_template,
            flipped_market,
            sport,
            Perspective::Flipped,
            settled,
            flipped,
        ),
    }
}

fn score(
    template: &AngleTemplate,
    market: AngleMarket,
    sport: Sport,
    perspective: Perspective,
    games: usize,
    record: Record,
) -> SignificanceResult {
    let test = test_rate(record.wins, record.losses);
    SignificanceResult {
        template_id: template.id.clone(),
        name: template.name.clone(),
        description: template.description.clone(),
        sport,
        perspective,
        market,
        games,
        record,
        rate: test.rate,
        push_rate: if games == 0 {
            None
        } else {
            Some(record.pushes as f64 / games as f64)
        },
        z_score: test.z_score,
        p_value: test.p_value,
        strength: test.strength,
        interest_score: interest_score(&test),
    }
}
