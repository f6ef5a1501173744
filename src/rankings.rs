use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cohort::Cohort;
use crate::engine::Snapshot;
use crate::ingest::{MatchRecord, Outcome};
use crate::registry::TeamId;
use crate::resolve::{self, ResolverConfig};

/// One row of the ranking table, shaped for dashboard/report consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRow {
    pub rank: u32,
    pub team_id: TeamId,
    pub canonical_name: String,
    pub cohort: Cohort,
    pub cohort_confidence: f64,
    pub games_played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub points: u32,
    pub ppg: f64,
    pub strength_index: f64,
    pub low_sample: bool,
}

/// Sorted ranking over the committed snapshot: teams in the requested
/// cohort with at least `min_games` played, ordered by (ppg desc,
/// strength_index desc), ties broken by first-seen order. Rank numbers
/// are stable across repeated calls on the same snapshot.
pub fn rank(snapshot: &Snapshot, cohort: Option<Cohort>, min_games: u32) -> Vec<RankingRow> {
    let mut rows: Vec<RankingRow> = snapshot
        .teams
        .iter()
        .filter(|team| cohort.is_none_or(|c| team.cohort == c))
        .filter_map(|team| {
            let agg = snapshot.aggregates.get(&team.id)?;
            (agg.games_played >= min_games).then(|| RankingRow {
                rank: 0,
                team_id: team.id,
                canonical_name: team.canonical_name.clone(),
                cohort: team.cohort,
                cohort_confidence: team.cohort_confidence,
                games_played: agg.games_played,
                wins: agg.wins,
                draws: agg.draws,
                losses: agg.losses,
                goals_for: agg.goals_for_total,
                goals_against: agg.goals_against_total,
                points: agg.points,
                ppg: agg.ppg,
                strength_index: agg.strength_index,
                low_sample: agg.low_sample,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.ppg
            .partial_cmp(&a.ppg)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.strength_index
                    .partial_cmp(&a.strength_index)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.team_id.cmp(&b.team_id))
    });
    for (idx, row) in rows.iter_mut().enumerate() {
        row.rank = idx as u32 + 1;
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    HeadToHead,
    CommonOpponents,
    Both,
    /// Neither direct matches nor shared opponents: explicitly no basis
    /// for comparison, rather than an empty or fabricated result.
    InsufficientData,
}

/// A shared opponent with each side's record against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonOpponent {
    pub opponent_id: TeamId,
    pub opponent_name: String,
    pub a_games: u32,
    pub a_avg_gd: f64,
    pub b_games: u32,
    pub b_avg_gd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub team_a: TeamId,
    pub team_b: TeamId,
    pub team_a_name: String,
    pub team_b_name: String,
    pub status: ComparisonStatus,
    /// Direct matches, from team A's perspective.
    pub head_to_head: Vec<MatchRecord>,
    pub a_wins: u32,
    pub draws: u32,
    pub b_wins: u32,
    pub common_opponents: Vec<CommonOpponent>,
    /// Average goal differential over every match against the shared
    /// opponent set, one value per side.
    pub a_avg_gd_vs_common: Option<f64>,
    pub b_avg_gd_vs_common: Option<f64>,
    pub strength_delta: Option<f64>,
}

fn mirror(record: &MatchRecord) -> MatchRecord {
    let mut m = record.clone();
    m.team_id = record.opponent_id.unwrap_or(record.team_id);
    m.opponent_id = Some(record.team_id);
    m.goals_for = record.goals_against;
    m.goals_against = record.goals_for;
    m.outcome = Outcome::from_goals(m.goals_for, m.goals_against);
    m
}

fn avg_gd(matches: &[&MatchRecord]) -> Option<f64> {
    if matches.is_empty() {
        return None;
    }
    let total: f64 = matches
        .iter()
        .map(|m| m.goals_for as f64 - m.goals_against as f64)
        .sum();
    Some(total / matches.len() as f64)
}

/// Head-to-head plus common-opponent comparison between two teams, from
/// the committed snapshot only.
pub fn compare(snapshot: &Snapshot, team_a: TeamId, team_b: TeamId) -> ComparisonResult {
    let a_matches = snapshot.matches_for(team_a);
    let b_matches = snapshot.matches_for(team_b);

    // Direct matches from A's perspective. One-sided reports may only
    // exist on B's side, so B's records against A are mirrored in when A
    // has no record of the same match.
    let mut head_to_head: Vec<MatchRecord> = a_matches
        .iter()
        .filter(|m| m.opponent_id == Some(team_b))
        .map(|m| (*m).clone())
        .collect();
    for m in b_matches.iter().filter(|m| m.opponent_id == Some(team_a)) {
        let mirrored = mirror(m);
        let already_known = head_to_head.iter().any(|h| {
            h.date == mirrored.date
                && h.goals_for == mirrored.goals_for
                && h.goals_against == mirrored.goals_against
        });
        if !already_known {
            head_to_head.push(mirrored);
        }
    }
    head_to_head.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

    let mut a_wins = 0u32;
    let mut draws = 0u32;
    let mut b_wins = 0u32;
    for m in &head_to_head {
        match m.outcome {
            Outcome::Win => a_wins += 1,
            Outcome::Draw => draws += 1,
            Outcome::Loss => b_wins += 1,
        }
    }

    let a_opponents: BTreeSet<TeamId> = a_matches.iter().filter_map(|m| m.opponent_id).collect();
    let b_opponents: BTreeSet<TeamId> = b_matches.iter().filter_map(|m| m.opponent_id).collect();
    let shared: Vec<TeamId> = a_opponents
        .intersection(&b_opponents)
        .copied()
        .filter(|id| *id != team_a && *id != team_b)
        .collect();

    let mut common_opponents = Vec::new();
    let mut a_vs_shared: Vec<&MatchRecord> = Vec::new();
    let mut b_vs_shared: Vec<&MatchRecord> = Vec::new();
    for opp in shared {
        let a_vs: Vec<&MatchRecord> = a_matches
            .iter()
            .copied()
            .filter(|m| m.opponent_id == Some(opp))
            .collect();
        let b_vs: Vec<&MatchRecord> = b_matches
            .iter()
            .copied()
            .filter(|m| m.opponent_id == Some(opp))
            .collect();
        let (Some(a_avg), Some(b_avg)) = (avg_gd(&a_vs), avg_gd(&b_vs)) else {
            continue;
        };
        common_opponents.push(CommonOpponent {
            opponent_id: opp,
            opponent_name: snapshot
                .team(opp)
                .map(|t| t.canonical_name.clone())
                .unwrap_or_else(|| format!("team {opp}")),
            a_games: a_vs.len() as u32,
            a_avg_gd: a_avg,
            b_games: b_vs.len() as u32,
            b_avg_gd: b_avg,
        });
        a_vs_shared.extend(a_vs);
        b_vs_shared.extend(b_vs);
    }

    let status = match (head_to_head.is_empty(), common_opponents.is_empty()) {
        (false, false) => ComparisonStatus::Both,
        (false, true) => ComparisonStatus::HeadToHead,
        (true, false) => ComparisonStatus::CommonOpponents,
        (true, true) => ComparisonStatus::InsufficientData,
    };

    let strength_delta = match (
        snapshot.aggregates.get(&team_a),
        snapshot.aggregates.get(&team_b),
    ) {
        (Some(a), Some(b)) => Some(a.strength_index - b.strength_index),
        _ => None,
    };

    ComparisonResult {
        team_a,
        team_b,
        team_a_name: snapshot
            .team(team_a)
            .map(|t| t.canonical_name.clone())
            .unwrap_or_else(|| format!("team {team_a}")),
        team_b_name: snapshot
            .team(team_b)
            .map(|t| t.canonical_name.clone())
            .unwrap_or_else(|| format!("team {team_b}")),
        status,
        head_to_head,
        a_wins,
        draws,
        b_wins,
        common_opponents,
        a_avg_gd_vs_common: avg_gd(&a_vs_shared),
        b_avg_gd_vs_common: avg_gd(&b_vs_shared),
        strength_delta,
    }
}

/// Look a team up by raw name against the snapshot, read-only: exact
/// normalized alias first, then the best fuzzy candidate above the
/// acceptance threshold.
pub fn find_team(snapshot: &Snapshot, raw_name: &str, cfg: &ResolverConfig) -> Option<TeamId> {
    let normalized = resolve::normalize_name(raw_name);
    let mut best: Option<(TeamId, f64)> = None;
    for team in &snapshot.teams {
        for alias in &team.aliases {
            if *alias == normalized {
                return Some(team.id);
            }
            let score = resolve::token_set_similarity(&normalized, alias, cfg);
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((team.id, score));
            }
        }
    }
    best.and_then(|(id, score)| (score >= cfg.accept_threshold).then_some(id))
}
