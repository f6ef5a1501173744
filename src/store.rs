use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, params};

use crate::cohort::Cohort;
use crate::engine::PassSummary;
use crate::ingest::{MatchRecord, MatchStore, Outcome, SourceKind};
use crate::registry::{CanonicalTeam, ReviewEvent, ScoredCandidate, TeamRegistry};

/// Everything needed to resume from the last committed pass.
#[derive(Debug)]
pub struct PersistedState {
    pub registry: TeamRegistry,
    pub matches: MatchStore,
    pub pass_id: u64,
    pub computed_at: Option<DateTime<Utc>>,
}

/// Sqlite persistence for the canonical team registry, the match record
/// store, and the pass log. All writes of one pass go through a single
/// transaction.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Store> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Store { conn })
    }

    pub fn open_in_memory() -> Result<Store> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Store { conn })
    }

    pub fn default_path() -> Option<PathBuf> {
        // Prefer XDG cache, fall back to ~/.cache.
        if let Ok(base) = std::env::var("XDG_CACHE_HOME")
            && !base.trim().is_empty()
        {
            return Some(PathBuf::from(base).join("pitchrank").join("pitchrank.sqlite"));
        }
        let home = std::env::var("HOME").ok()?;
        if home.trim().is_empty() {
            return None;
        }
        Some(
            PathBuf::from(home)
                .join(".cache")
                .join("pitchrank")
                .join("pitchrank.sqlite"),
        )
    }

    /// Persist the registry, match store, review events and pass row in
    /// one transaction. Called by the engine before the snapshot swap;
    /// an error here aborts the pass without committing anything.
    pub fn save_pass(
        &mut self,
        registry: &TeamRegistry,
        matches: &MatchStore,
        summary: &PassSummary,
    ) -> Result<()> {
        let tx = self.conn.transaction().context("begin pass transaction")?;

        for team in registry.teams() {
            tx.execute(
                r#"
                INSERT INTO teams (id, canonical_name, cohort_year, cohort_confidence, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    canonical_name = excluded.canonical_name,
                    cohort_year = excluded.cohort_year,
                    cohort_confidence = excluded.cohort_confidence
                "#,
                params![
                    team.id as i64,
                    team.canonical_name,
                    team.cohort.birth_year().map(|y| y as i64),
                    team.cohort_confidence,
                    team.created_at.to_rfc3339(),
                ],
            )
            .context("upsert team")?;

            for (position, alias) in team.aliases.iter().enumerate() {
                tx.execute(
                    "INSERT INTO aliases (alias, team_id, position) VALUES (?1, ?2, ?3)
                     ON CONFLICT(alias) DO NOTHING",
                    params![alias, team.id as i64, position as i64],
                )
                .context("upsert alias")?;
            }
        }

        for record in matches.records() {
            tx.execute(
                r#"
                INSERT INTO matches (
                    dedupe_key, match_id, team_id, opponent_id, match_date,
                    goals_for, goals_against, outcome, source, provenance, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(dedupe_key) DO UPDATE SET
                    goals_for = excluded.goals_for,
                    goals_against = excluded.goals_against,
                    outcome = excluded.outcome,
                    source = excluded.source,
                    provenance = excluded.provenance,
                    updated_at = excluded.updated_at
                "#,
                params![
                    record.dedupe_key,
                    record.id as i64,
                    record.team_id as i64,
                    record.opponent_id.map(|id| id as i64),
                    record.date.to_string(),
                    record.goals_for as i64,
                    record.goals_against as i64,
                    record.outcome.letter().to_string(),
                    record.source.as_str(),
                    record.provenance,
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("upsert match record")?;
        }

        tx.execute(
            r#"
            INSERT INTO passes (
                pass_id, computed_at, rows_seen, rows_ingested, malformed_skipped,
                self_matches_skipped, duplicates_ignored, replaced_by_higher_tier, teams_created
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                summary.pass_id as i64,
                summary.computed_at.to_rfc3339(),
                summary.rows_seen as i64,
                summary.rows_ingested as i64,
                summary.malformed_skipped as i64,
                summary.self_matches_skipped as i64,
                summary.duplicates_ignored as i64,
                summary.replaced_by_higher_tier as i64,
                summary.teams_created as i64,
            ],
        )
        .context("insert pass row")?;

        for event in &summary.review_events {
            let candidates_json =
                serde_json::to_string(&event.candidates).context("serialize review candidates")?;
            tx.execute(
                r#"
                INSERT INTO review_events (pass_id, raw_name, created_id, candidates_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    summary.pass_id as i64,
                    event.raw_name,
                    event.created_id as i64,
                    candidates_json,
                    event.created_at.to_rfc3339(),
                ],
            )
            .context("insert review event")?;
        }

        tx.commit().context("commit pass transaction")?;
        Ok(())
    }

    /// Rebuild the registry and match store from the last committed
    /// pass. Returns None when the store has never seen a pass.
    pub fn load_state(&self) -> Result<Option<PersistedState>> {
        let pass: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT pass_id, computed_at FROM passes ORDER BY pass_id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("query latest pass")?;

        let teams = self.load_teams()?;
        if pass.is_none() && teams.is_empty() {
            return Ok(None);
        }

        let matches = self.load_matches()?;
        let (pass_id, computed_at) = match pass {
            Some((id, raw)) => (
                id as u64,
                DateTime::parse_from_rfc3339(&raw)
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
            ),
            None => (0, None),
        };

        Ok(Some(PersistedState {
            registry: TeamRegistry::from_teams(teams),
            matches: MatchStore::from_records(matches),
            pass_id,
            computed_at,
        }))
    }

    fn load_teams(&self) -> Result<Vec<CanonicalTeam>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, canonical_name, cohort_year, cohort_confidence, created_at
                 FROM teams ORDER BY id ASC",
            )
            .context("prepare teams query")?;
        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let cohort_year: Option<i64> = row.get(2)?;
                let created_at: String = row.get(4)?;
                Ok(CanonicalTeam {
                    id: id as u32,
                    canonical_name: row.get(1)?,
                    aliases: Vec::new(),
                    cohort: cohort_year
                        .map(|y| Cohort::BirthYear(y as u16))
                        .unwrap_or(Cohort::Unknown),
                    cohort_confidence: row.get(3)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .context("query teams")?;

        let mut teams = Vec::new();
        for row in rows {
            teams.push(row.context("decode team row")?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT alias, team_id FROM aliases ORDER BY team_id ASC, position ASC")
            .context("prepare aliases query")?;
        let rows = stmt
            .query_map([], |row| {
                let alias: String = row.get(0)?;
                let team_id: i64 = row.get(1)?;
                Ok((alias, team_id as u32))
            })
            .context("query aliases")?;
        for row in rows {
            let (alias, team_id) = row.context("decode alias row")?;
            if let Some(team) = teams.iter_mut().find(|t| t.id == team_id) {
                team.aliases.push(alias);
            }
        }

        Ok(teams)
    }

    fn load_matches(&self) -> Result<Vec<MatchRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT dedupe_key, match_id, team_id, opponent_id, match_date,
                        goals_for, goals_against, outcome, source, provenance
                 FROM matches ORDER BY match_id ASC",
            )
            .context("prepare matches query")?;
        let rows = stmt
            .query_map([], |row| {
                let dedupe_key: String = row.get(0)?;
                let match_id: i64 = row.get(1)?;
                let team_id: i64 = row.get(2)?;
                let opponent_id: Option<i64> = row.get(3)?;
                let date: String = row.get(4)?;
                let goals_for: i64 = row.get(5)?;
                let goals_against: i64 = row.get(6)?;
                let outcome: String = row.get(7)?;
                let source: String = row.get(8)?;
                let provenance: String = row.get(9)?;
                Ok((
                    dedupe_key, match_id, team_id, opponent_id, date, goals_for, goals_against,
                    outcome, source, provenance,
                ))
            })
            .context("query matches")?;

        let mut out = Vec::new();
        for row in rows {
            let (dedupe_key, match_id, team_id, opponent_id, date, goals_for, goals_against, outcome, source, provenance) =
                row.context("decode match row")?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("bad stored match date '{date}'"))?;
            let goals_for = goals_for as u32;
            let goals_against = goals_against as u32;
            let source = SourceKind::parse(&source);
            out.push(MatchRecord {
                id: match_id as u64,
                team_id: team_id as u32,
                opponent_id: opponent_id.map(|id| id as u32),
                date,
                goals_for,
                goals_against,
                outcome: outcome
                    .chars()
                    .next()
                    .and_then(Outcome::from_letter)
                    .unwrap_or(Outcome::from_goals(goals_for, goals_against)),
                source,
                tier: source.tier(),
                provenance,
                dedupe_key,
            });
        }
        Ok(out)
    }

    /// Most recent ambiguity events, newest first.
    pub fn load_review_events(&self, limit: usize) -> Result<Vec<ReviewEvent>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT raw_name, created_id, candidates_json, created_at
                 FROM review_events ORDER BY id DESC LIMIT ?1",
            )
            .context("prepare review events query")?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let raw_name: String = row.get(0)?;
                let created_id: i64 = row.get(1)?;
                let candidates_json: String = row.get(2)?;
                let created_at: String = row.get(3)?;
                Ok((raw_name, created_id, candidates_json, created_at))
            })
            .context("query review events")?;

        let mut out = Vec::new();
        for row in rows {
            let (raw_name, created_id, candidates_json, created_at) =
                row.context("decode review event row")?;
            let candidates: Vec<ScoredCandidate> =
                serde_json::from_str(&candidates_json).unwrap_or_default();
            out.push(ReviewEvent {
                raw_name,
                created_id: created_id as u32,
                candidates,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            });
        }
        Ok(out)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY,
            canonical_name TEXT NOT NULL,
            cohort_year INTEGER NULL,
            cohort_confidence REAL NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS aliases (
            alias TEXT PRIMARY KEY,
            team_id INTEGER NOT NULL,
            position INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_aliases_team ON aliases(team_id);
        CREATE TABLE IF NOT EXISTS matches (
            dedupe_key TEXT PRIMARY KEY,
            match_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            opponent_id INTEGER NULL,
            match_date TEXT NOT NULL,
            goals_for INTEGER NOT NULL,
            goals_against INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            source TEXT NOT NULL,
            provenance TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_team ON matches(team_id);
        CREATE TABLE IF NOT EXISTS passes (
            pass_id INTEGER PRIMARY KEY,
            computed_at TEXT NOT NULL,
            rows_seen INTEGER NOT NULL,
            rows_ingested INTEGER NOT NULL,
            malformed_skipped INTEGER NOT NULL,
            self_matches_skipped INTEGER NOT NULL,
            duplicates_ignored INTEGER NOT NULL,
            replaced_by_higher_tier INTEGER NOT NULL,
            teams_created INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS review_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pass_id INTEGER NOT NULL,
            raw_name TEXT NOT NULL,
            created_id INTEGER NOT NULL,
            candidates_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}
