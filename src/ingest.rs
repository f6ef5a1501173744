use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::registry::TeamId;

/// Source trust, descending: authoritative standings exports, tournament
/// results with explicit final scores, matches inferred from an
/// opponent's own published schedule, one-sided entries with no
/// corroboration. Conflicts between reports of the same logical match
/// are arbitrated on this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    DivisionStandings,
    TournamentResult,
    InferredSchedule,
    Uncorroborated,
}

impl SourceKind {
    pub fn trust_rank(&self) -> u8 {
        match self {
            SourceKind::DivisionStandings => 3,
            SourceKind::TournamentResult => 2,
            SourceKind::InferredSchedule => 1,
            SourceKind::Uncorroborated => 0,
        }
    }

    /// Coarse confidence label reported on output rows.
    pub fn tier(&self) -> ConfidenceTier {
        match self {
            SourceKind::DivisionStandings | SourceKind::TournamentResult => ConfidenceTier::High,
            SourceKind::InferredSchedule => ConfidenceTier::Medium,
            SourceKind::Uncorroborated => ConfidenceTier::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::DivisionStandings => "standings",
            SourceKind::TournamentResult => "tournament",
            SourceKind::InferredSchedule => "inferred",
            SourceKind::Uncorroborated => "uncorroborated",
        }
    }

    /// Lenient parse of the provider's source label. Anything
    /// unrecognized lands in the lowest trust level.
    pub fn parse(raw: &str) -> SourceKind {
        let s = raw.trim().to_lowercase();
        if s.contains("standing") || s.contains("division") || s.contains("league") {
            SourceKind::DivisionStandings
        } else if s.contains("tournament") || s.contains("bracket") {
            SourceKind::TournamentResult
        } else if s.contains("schedule") || s.contains("inferred") {
            SourceKind::InferredSchedule
        } else {
            SourceKind::Uncorroborated
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    pub fn from_goals(goals_for: u32, goals_against: u32) -> Outcome {
        if goals_for > goals_against {
            Outcome::Win
        } else if goals_for < goals_against {
            Outcome::Loss
        } else {
            Outcome::Draw
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Outcome::Win => 'W',
            Outcome::Draw => 'D',
            Outcome::Loss => 'L',
        }
    }

    pub fn from_letter(c: char) -> Option<Outcome> {
        match c.to_ascii_uppercase() {
            'W' => Some(Outcome::Win),
            'D' => Some(Outcome::Draw),
            'L' => Some(Outcome::Loss),
            _ => None,
        }
    }
}

/// One row as exported by a provider, before validation. Everything is
/// optional: scrapers routinely emit blank cells, score strings in name
/// columns, and numbers as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSourceRow {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub opponent: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub goals_for: Option<Value>,
    #[serde(default)]
    pub goals_against: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub provenance: Option<String>,
    #[serde(default)]
    pub division: Option<String>,
}

/// A validated, immutable input record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub raw_team_name: String,
    pub raw_opponent_name: Option<String>,
    pub date: NaiveDate,
    pub goals_for: u32,
    pub goals_against: u32,
    pub source: SourceKind,
    pub provenance: String,
    pub cohort_hint: Option<String>,
}

/// Accept JSON numbers or numeric strings; scrapers emit both.
fn value_to_u32(v: &Value) -> Option<u32> {
    if let Some(n) = v.as_u64() {
        return u32::try_from(n).ok();
    }
    v.as_str()?.trim().parse::<u32>().ok()
}

/// A name cell that is actually a score ("4-4", "5 - 1") or a known
/// placeholder. Standings exports leak these into opponent columns.
fn is_placeholder_name(raw: &str) -> bool {
    let s = raw.trim();
    if s.len() < 3 {
        return true;
    }
    if matches!(s.to_lowercase().as_str(), "n/a" | "null" | "tbd" | "unknown") {
        return true;
    }
    let parts: Vec<&str> = s.split('-').map(str::trim).collect();
    parts.len() == 2 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Validate a raw row into a SourceRecord. Failures are row-level and
/// recoverable: the pass skips and counts them.
pub fn validate_row(row: &RawSourceRow) -> Result<SourceRecord, EngineError> {
    let team = row
        .team
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::MalformedRecord("missing team name".into()))?;

    let date_raw = row
        .date
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::MalformedRecord("missing date".into()))?;
    let date = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d")
        .map_err(|_| EngineError::MalformedRecord(format!("unparseable date '{date_raw}'")))?;

    let goals_for = row
        .goals_for
        .as_ref()
        .and_then(value_to_u32)
        .ok_or_else(|| EngineError::MalformedRecord("missing or non-numeric goals_for".into()))?;
    let goals_against = row
        .goals_against
        .as_ref()
        .and_then(value_to_u32)
        .ok_or_else(|| {
            EngineError::MalformedRecord("missing or non-numeric goals_against".into())
        })?;

    let raw_opponent_name = row
        .opponent
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_placeholder_name(s))
        .map(str::to_string);

    let source = row
        .source
        .as_deref()
        .map(SourceKind::parse)
        .unwrap_or(SourceKind::Uncorroborated);

    Ok(SourceRecord {
        raw_team_name: team.to_string(),
        raw_opponent_name,
        date,
        goals_for,
        goals_against,
        source,
        provenance: row
            .provenance
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("unspecified")
            .to_string(),
        cohort_hint: row
            .division
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}

/// A resolved match, one per team perspective. Two source rows that
/// describe the same real match under different spellings collapse onto
/// the same dedupe key once both sides are canonicalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: u64,
    pub team_id: TeamId,
    pub opponent_id: Option<TeamId>,
    pub date: NaiveDate,
    pub goals_for: u32,
    pub goals_against: u32,
    pub outcome: Outcome,
    pub source: SourceKind,
    pub tier: ConfidenceTier,
    pub provenance: String,
    pub dedupe_key: String,
}

/// Explicit, explainable key: readable in the store and stable across
/// runs. The opponent slot is "-" when unresolved.
pub fn dedupe_key(
    team_id: TeamId,
    opponent_id: Option<TeamId>,
    date: NaiveDate,
    goals_for: u32,
    goals_against: u32,
) -> String {
    let opp = match opponent_id {
        Some(id) => id.to_string(),
        None => "-".to_string(),
    };
    format!("{team_id}|{opp}|{date}|{goals_for}|{goals_against}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    ReplacedLowerTier,
    DuplicateIgnored,
}

/// Match records keyed by dedupe key. Records are replaced by
/// strictly-higher-trust reports or kept as first seen; never silently
/// deleted.
#[derive(Debug, Clone, Default)]
pub struct MatchStore {
    by_key: HashMap<String, MatchRecord>,
    next_id: u64,
}

impl MatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<MatchRecord>) -> Self {
        let next_id = records.iter().map(|r| r.id + 1).max().unwrap_or(0);
        let by_key = records
            .into_iter()
            .map(|r| (r.dedupe_key.clone(), r))
            .collect();
        Self { by_key, next_id }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&MatchRecord> {
        self.by_key.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &MatchRecord> {
        self.by_key.values()
    }

    pub fn for_team(&self, team_id: TeamId) -> Vec<&MatchRecord> {
        let mut out: Vec<&MatchRecord> = self
            .by_key
            .values()
            .filter(|r| r.team_id == team_id)
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        out
    }

    /// Insert a resolved record under the collision policy: a strictly
    /// higher-trust report replaces the stored data and provenance; an
    /// equal-or-lower-trust collision is a no-op, keeping the first-seen
    /// record. The no-op branch is what makes re-ingestion idempotent.
    pub fn upsert(
        &mut self,
        team_id: TeamId,
        opponent_id: Option<TeamId>,
        record: &SourceRecord,
    ) -> IngestOutcome {
        let key = dedupe_key(
            team_id,
            opponent_id,
            record.date,
            record.goals_for,
            record.goals_against,
        );

        if let Some(existing) = self.by_key.get_mut(&key) {
            if record.source.trust_rank() > existing.source.trust_rank() {
                existing.goals_for = record.goals_for;
                existing.goals_against = record.goals_against;
                existing.outcome = Outcome::from_goals(record.goals_for, record.goals_against);
                existing.source = record.source;
                existing.tier = record.source.tier();
                existing.provenance = record.provenance.clone();
                return IngestOutcome::ReplacedLowerTier;
            }
            return IngestOutcome::DuplicateIgnored;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.by_key.insert(
            key.clone(),
            MatchRecord {
                id,
                team_id,
                opponent_id,
                date: record.date,
                goals_for: record.goals_for,
                goals_against: record.goals_against,
                outcome: Outcome::from_goals(record.goals_for, record.goals_against),
                source: record.source,
                tier: record.source.tier(),
                provenance: record.provenance.clone(),
                dedupe_key: key,
            },
        );
        IngestOutcome::Inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(team: &str, opp: &str, date: &str, gf: i64, ga: i64) -> RawSourceRow {
        RawSourceRow {
            team: Some(team.to_string()),
            opponent: Some(opp.to_string()),
            date: Some(date.to_string()),
            goals_for: Some(Value::from(gf)),
            goals_against: Some(Value::from(ga)),
            source: Some("standings".to_string()),
            provenance: Some("test".to_string()),
            division: None,
        }
    }

    #[test]
    fn validate_accepts_numeric_strings() {
        let mut r = row("A", "B", "2025-09-07", 0, 0);
        r.goals_for = Some(Value::from("11"));
        r.goals_against = Some(Value::from("0"));
        let rec = validate_row(&r).unwrap();
        assert_eq!((rec.goals_for, rec.goals_against), (11, 0));
    }

    #[test]
    fn validate_rejects_missing_and_garbage_fields() {
        let mut r = row("A", "B", "2025-09-07", 3, 1);
        r.team = None;
        assert!(validate_row(&r).is_err());

        let mut r = row("A", "B", "Sept 7", 3, 1);
        r.date = Some("Sept 7".to_string());
        assert!(validate_row(&r).is_err());

        let mut r = row("A", "B", "2025-09-07", 3, 1);
        r.goals_for = Some(Value::from("three"));
        assert!(validate_row(&r).is_err());
    }

    #[test]
    fn score_like_opponent_cells_become_unresolved() {
        let r = row("A", "4 - 4", "2025-09-07", 3, 1);
        let rec = validate_row(&r).unwrap();
        assert_eq!(rec.raw_opponent_name, None);
    }

    #[test]
    fn source_kind_parse_is_lenient() {
        assert_eq!(SourceKind::parse("OCL division standings"), SourceKind::DivisionStandings);
        assert_eq!(SourceKind::parse("Tournament bracket"), SourceKind::TournamentResult);
        assert_eq!(SourceKind::parse("opponent schedule"), SourceKind::InferredSchedule);
        assert_eq!(SourceKind::parse("mystery"), SourceKind::Uncorroborated);
    }
}
