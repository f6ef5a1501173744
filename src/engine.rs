use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rayon::prelude::*;
use serde::Serialize;

use crate::cohort::{self, Cohort, CohortSignal, SignalKind};
use crate::error::EngineError;
use crate::ingest::{self, IngestOutcome, MatchRecord, MatchStore, RawSourceRow};
use crate::rating::{self, RatingConfig, TeamAggregate};
use crate::registry::{CanonicalTeam, ReviewEvent, TeamId, TeamRegistry};
use crate::resolve::{self, ResolverConfig};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub rating: RatingConfig,
}

/// The committed result of one aggregation pass. Immutable; readers hold
/// an Arc to it and are never exposed to a partially-updated state.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub pass_id: u64,
    /// Timestamp of the pass that produced this snapshot; None until the
    /// first pass commits.
    pub computed_at: Option<DateTime<Utc>>,
    pub teams: Vec<CanonicalTeam>,
    pub matches: Vec<MatchRecord>,
    pub aggregates: HashMap<TeamId, TeamAggregate>,
    pub review_events: Vec<ReviewEvent>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            pass_id: 0,
            computed_at: None,
            teams: Vec::new(),
            matches: Vec::new(),
            aggregates: HashMap::new(),
            review_events: Vec::new(),
        }
    }

    pub fn team(&self, id: TeamId) -> Option<&CanonicalTeam> {
        self.teams.get(id as usize).filter(|t| t.id == id)
    }

    pub fn matches_for(&self, id: TeamId) -> Vec<&MatchRecord> {
        self.matches.iter().filter(|m| m.team_id == id).collect()
    }
}

/// What one pass did, for operators and the pass log.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub pass_id: u64,
    pub computed_at: DateTime<Utc>,
    pub rows_seen: usize,
    pub rows_ingested: usize,
    pub malformed_skipped: usize,
    pub self_matches_skipped: usize,
    pub duplicates_ignored: usize,
    pub replaced_by_higher_tier: usize,
    pub teams_created: usize,
    pub review_events: Vec<ReviewEvent>,
}

struct PassState {
    registry: TeamRegistry,
    matches: MatchStore,
    pass_id: u64,
}

/// Exclusive hold on the pass state. While a guard is alive any
/// `run_pass` attempt fails fast with `ConcurrentPass`.
pub struct PassGuard<'a> {
    _state: MutexGuard<'a, PassState>,
}

/// Batch aggregation engine. At most one pass mutates state at a time;
/// ranking and comparison queries read the last committed snapshot and
/// run concurrently with each other and with an in-flight pass.
pub struct Engine {
    cfg: EngineConfig,
    state: Mutex<PassState>,
    snapshot: RwLock<Arc<Snapshot>>,
    store: Option<Mutex<Store>>,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(PassState {
                registry: TeamRegistry::new(),
                matches: MatchStore::new(),
                pass_id: 0,
            }),
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
            store: None,
        }
    }

    /// Attach a sqlite store and resume from its last committed pass, if
    /// any. Aggregates are recomputed from the persisted match set (they
    /// are a pure function of it) stamped with the persisted pass time,
    /// so readers immediately see "data as of" the last successful pass.
    pub fn with_store(cfg: EngineConfig, store: Store) -> Result<Self, EngineError> {
        let persisted = store.load_state()?;
        let mut engine = Engine::new(cfg);
        if let Some(persisted) = persisted {
            let computed_at = persisted.computed_at.unwrap_or_else(Utc::now);
            let aggregates = compute_aggregates(
                &persisted.registry,
                &persisted.matches,
                &cfg.rating,
                computed_at,
            );
            let mut matches: Vec<MatchRecord> =
                persisted.matches.records().cloned().collect();
            sort_matches(&mut matches);
            *engine.snapshot.write() = Arc::new(Snapshot {
                pass_id: persisted.pass_id,
                computed_at: persisted.computed_at,
                teams: persisted.registry.teams().to_vec(),
                matches,
                aggregates,
                review_events: Vec::new(),
            });
            engine.state = Mutex::new(PassState {
                registry: persisted.registry,
                matches: persisted.matches,
                pass_id: persisted.pass_id,
            });
            info!(
                "resumed from store: pass {} with {} teams",
                engine.snapshot.read().pass_id,
                engine.snapshot.read().teams.len()
            );
        }
        engine.store = Some(Mutex::new(store));
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// The last committed snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Pending ambiguity events: the persisted log when a store is
    /// attached (newest first), otherwise the last pass's events.
    pub fn review_events(&self, limit: usize) -> Result<Vec<ReviewEvent>, EngineError> {
        if let Some(store) = &self.store {
            return Ok(store.lock().load_review_events(limit)?);
        }
        let snapshot = self.snapshot();
        Ok(snapshot.review_events.iter().take(limit).cloned().collect())
    }

    /// Take the pass lock without running a pass. Useful for callers
    /// that need to fence out aggregation for a while.
    pub fn pass_guard(&self) -> Result<PassGuard<'_>, EngineError> {
        self.state
            .try_lock()
            .map(|state| PassGuard { _state: state })
            .ok_or(EngineError::ConcurrentPass)
    }

    /// Run one complete aggregation pass over the given rows. The pass
    /// works on clones of the registry and match store; only a fully
    /// successful pass (including persistence) replaces the state and
    /// swaps the committed snapshot. Any failure leaves the previous
    /// snapshot fully intact.
    pub fn run_pass(&self, rows: &[RawSourceRow]) -> Result<PassSummary, EngineError> {
        let mut state = self.state.try_lock().ok_or(EngineError::ConcurrentPass)?;
        info!("aggregation pass starting over {} rows", rows.len());

        let mut registry = state.registry.clone();
        let mut matches = state.matches.clone();
        let teams_before = registry.len();

        let mut rows_ingested = 0usize;
        let mut malformed_skipped = 0usize;
        let mut self_matches_skipped = 0usize;
        let mut duplicates_ignored = 0usize;
        let mut replaced_by_higher_tier = 0usize;
        let mut signals: HashMap<TeamId, HashSet<(SignalKind, Cohort)>> = HashMap::new();

        for row in rows {
            let record = match ingest::validate_row(row) {
                Ok(record) => record,
                Err(err) => {
                    warn!("skipping row: {err}");
                    malformed_skipped += 1;
                    continue;
                }
            };

            let team_id = resolve::resolve(&mut registry, &record.raw_team_name, &self.cfg.resolver).id();
            collect_name_signals(
                &mut signals,
                team_id,
                &record.raw_team_name,
                record.cohort_hint.as_deref(),
            );

            let opponent_id = record.raw_opponent_name.as_deref().map(|name| {
                let id = resolve::resolve(&mut registry, name, &self.cfg.resolver).id();
                collect_name_signals(&mut signals, id, name, record.cohort_hint.as_deref());
                id
            });

            if opponent_id == Some(team_id) {
                warn!(
                    "skipping row: '{}' and '{}' resolve to the same team",
                    record.raw_team_name,
                    record.raw_opponent_name.as_deref().unwrap_or("")
                );
                self_matches_skipped += 1;
                continue;
            }

            match matches.upsert(team_id, opponent_id, &record) {
                IngestOutcome::Inserted => rows_ingested += 1,
                IngestOutcome::ReplacedLowerTier => {
                    debug!(
                        "replaced lower-tier record for team {team_id} on {} with {}",
                        record.date, record.source
                    );
                    replaced_by_higher_tier += 1;
                }
                IngestOutcome::DuplicateIgnored => duplicates_ignored += 1,
            }
        }

        // Classification phase 1: name and division-label signals, so
        // newly created teams carry a cohort before co-occurrence runs.
        for (team_id, set) in &signals {
            let (cohort, confidence) = cohort::classify(&signal_vec(set));
            registry.reclassify(*team_id, cohort, confidence);
        }

        // Phase 2: co-occurrence with already-classified opponents, one
        // signal per candidate cohort, folded together with the base
        // signals so the weighted sum stays comparable across kinds.
        let opponent_cohorts: HashMap<TeamId, Cohort> = registry
            .teams()
            .iter()
            .filter(|t| t.cohort != Cohort::Unknown)
            .map(|t| (t.id, t.cohort))
            .collect();
        for m in matches.records() {
            let Some(opponent) = m.opponent_id else {
                continue;
            };
            if let Some(c) = opponent_cohorts.get(&opponent) {
                signals
                    .entry(m.team_id)
                    .or_default()
                    .insert((SignalKind::OpponentCohort, *c));
            }
        }
        for (team_id, set) in &signals {
            let (cohort, confidence) = cohort::classify(&signal_vec(set));
            registry.reclassify(*team_id, cohort, confidence);
        }

        let now = Utc::now();
        let aggregates = compute_aggregates(&registry, &matches, &self.cfg.rating, now);

        let review_events = registry.take_review_events();
        let pass_id = state.pass_id + 1;
        let summary = PassSummary {
            pass_id,
            computed_at: now,
            rows_seen: rows.len(),
            rows_ingested,
            malformed_skipped,
            self_matches_skipped,
            duplicates_ignored,
            replaced_by_higher_tier,
            teams_created: registry.len() - teams_before,
            review_events: review_events.clone(),
        };

        if let Some(store) = &self.store {
            store.lock().save_pass(&registry, &matches, &summary)?;
        }

        let mut sorted_matches: Vec<MatchRecord> = matches.records().cloned().collect();
        sort_matches(&mut sorted_matches);
        let snapshot = Arc::new(Snapshot {
            pass_id,
            computed_at: Some(now),
            teams: registry.teams().to_vec(),
            matches: sorted_matches,
            aggregates,
            review_events,
        });

        state.registry = registry;
        state.matches = matches;
        state.pass_id = pass_id;
        *self.snapshot.write() = snapshot;

        info!(
            "pass {pass_id} committed: {} ingested, {} duplicates, {} replaced, {} malformed, {} teams",
            summary.rows_ingested,
            summary.duplicates_ignored,
            summary.replaced_by_higher_tier,
            summary.malformed_skipped,
            state.registry.len()
        );
        Ok(summary)
    }
}

fn collect_name_signals(
    signals: &mut HashMap<TeamId, HashSet<(SignalKind, Cohort)>>,
    team_id: TeamId,
    raw_name: &str,
    hint: Option<&str>,
) {
    let entry = signals.entry(team_id).or_default();
    for signal in cohort::signals_from_names(raw_name, hint) {
        entry.insert((signal.kind, signal.cohort));
    }
}

fn signal_vec(set: &HashSet<(SignalKind, Cohort)>) -> Vec<CohortSignal> {
    set.iter()
        .map(|(kind, cohort)| CohortSignal::new(*kind, *cohort))
        .collect()
}

fn compute_aggregates(
    registry: &TeamRegistry,
    matches: &MatchStore,
    cfg: &RatingConfig,
    now: DateTime<Utc>,
) -> HashMap<TeamId, TeamAggregate> {
    registry
        .ids()
        .par_iter()
        .map(|id| {
            let team_matches = matches.for_team(*id);
            (*id, rating::aggregate(*id, &team_matches, cfg, now))
        })
        .collect()
}

fn sort_matches(matches: &mut [MatchRecord]) {
    matches.sort_by(|a, b| {
        a.team_id
            .cmp(&b.team_id)
            .then(a.date.cmp(&b.date))
            .then(a.id.cmp(&b.id))
    });
}
