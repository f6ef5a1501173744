use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::{MatchRecord, Outcome};
use crate::registry::TeamId;

#[derive(Debug, Clone, Copy)]
pub struct RatingConfig {
    /// Aggregates from fewer games are still computed, but flagged
    /// low-sample and excluded from default ranking views.
    pub min_games: u32,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self { min_games: 3 }
    }
}

/// Derived per-team aggregate. Wholly regenerated each pass from the
/// then-current match set, never hand-edited, so it is always a pure
/// function of committed match data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAggregate {
    pub team_id: TeamId,
    pub games_played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for_total: u32,
    pub goals_against_total: u32,
    pub points: u32,
    pub ppg: f64,
    pub gd_per_game: f64,
    pub strength_index: f64,
    pub low_sample: bool,
    pub last_computed_at: DateTime<Utc>,
}

/// Normalized 0-100 rating: 70% points-per-game, 30% goal-differential
/// per game. Clamping bounds the influence of any single blowout so it
/// cannot dominate a small sample's rating.
pub fn strength_index(ppg: f64, gd_per_game: f64) -> f64 {
    let ppg_norm = ppg.clamp(0.0, 3.0) / 3.0 * 100.0;
    let gd_norm = (gd_per_game.clamp(-5.0, 5.0) + 5.0) / 10.0 * 100.0;
    0.7 * ppg_norm + 0.3 * gd_norm
}

/// Reduce a team's resolved matches to a TeamAggregate. Deterministic in
/// its inputs; `now` is injected by the pass so every aggregate of one
/// pass carries the same timestamp.
pub fn aggregate(
    team_id: TeamId,
    matches: &[&MatchRecord],
    cfg: &RatingConfig,
    now: DateTime<Utc>,
) -> TeamAggregate {
    let mut wins = 0u32;
    let mut draws = 0u32;
    let mut losses = 0u32;
    let mut goals_for_total = 0u32;
    let mut goals_against_total = 0u32;

    for m in matches {
        match m.outcome {
            Outcome::Win => wins += 1,
            Outcome::Draw => draws += 1,
            Outcome::Loss => losses += 1,
        }
        goals_for_total += m.goals_for;
        goals_against_total += m.goals_against;
    }

    let games_played = matches.len() as u32;
    let points = 3 * wins + draws;
    let (ppg, gd_per_game) = if games_played == 0 {
        (0.0, 0.0)
    } else {
        let games = games_played as f64;
        (
            points as f64 / games,
            (goals_for_total as f64 - goals_against_total as f64) / games,
        )
    };

    TeamAggregate {
        team_id,
        games_played,
        wins,
        draws,
        losses,
        goals_for_total,
        goals_against_total,
        points,
        ppg,
        gd_per_game,
        strength_index: strength_index(ppg, gd_per_game),
        low_sample: games_played < cfg.min_games,
        last_computed_at: now,
    }
}
