use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cohort::Cohort;

pub type TeamId = u32;

/// The single resolved identity standing for all name variants of one
/// real team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTeam {
    pub id: TeamId,
    /// Display name: the first raw spelling seen, trimmed.
    pub canonical_name: String,
    /// Normalized alias strings, insertion order. Each alias belongs to
    /// exactly one team at any time.
    pub aliases: Vec<String>,
    pub cohort: Cohort,
    pub cohort_confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub id: TeamId,
    pub canonical_name: String,
    pub score: f64,
}

/// Ambiguous-identity event queued for manual confirmation: the raw name
/// that could not be safely merged, the tentative entity created for it,
/// and the competing candidates with their similarity scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub raw_name: String,
    pub created_id: TeamId,
    pub candidates: Vec<ScoredCandidate>,
    pub created_at: DateTime<Utc>,
}

/// Arena of canonical teams indexed by id, with a reverse map from
/// normalized alias to id. Passed explicitly into resolver calls so tests
/// can instantiate isolated registries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamRegistry {
    teams: Vec<CanonicalTeam>,
    alias_to_id: HashMap<String, TeamId>,
    #[serde(skip)]
    review_queue: Vec<ReviewEvent>,
}

impl TeamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted teams (id order). The alias map
    /// is derived from each team's alias list.
    pub fn from_teams(teams: Vec<CanonicalTeam>) -> Self {
        let mut alias_to_id = HashMap::new();
        for team in &teams {
            for alias in &team.aliases {
                alias_to_id.insert(alias.clone(), team.id);
            }
        }
        Self {
            teams,
            alias_to_id,
            review_queue: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn get(&self, id: TeamId) -> Option<&CanonicalTeam> {
        self.teams.get(id as usize)
    }

    pub fn teams(&self) -> &[CanonicalTeam] {
        &self.teams
    }

    pub fn ids(&self) -> Vec<TeamId> {
        (0..self.teams.len() as TeamId).collect()
    }

    pub fn lookup_alias(&self, normalized: &str) -> Option<TeamId> {
        self.alias_to_id.get(normalized).copied()
    }

    /// Create a brand-new canonical team with the raw name as sole alias.
    /// Ids are assigned in creation order, which doubles as first-seen
    /// order for ranking tie-breaks.
    pub fn create_team(&mut self, raw_name: &str, normalized: &str) -> TeamId {
        let id = self.teams.len() as TeamId;
        self.teams.push(CanonicalTeam {
            id,
            canonical_name: raw_name.trim().to_string(),
            aliases: vec![normalized.to_string()],
            cohort: Cohort::Unknown,
            cohort_confidence: 0.0,
            created_at: Utc::now(),
        });
        self.alias_to_id.insert(normalized.to_string(), id);
        id
    }

    /// Register a new alias for an existing team. A no-op when the alias
    /// is already mapped (the first owner keeps it).
    pub fn add_alias(&mut self, id: TeamId, normalized: &str) {
        if self.alias_to_id.contains_key(normalized) {
            return;
        }
        let Some(team) = self.teams.get_mut(id as usize) else {
            return;
        };
        team.aliases.push(normalized.to_string());
        self.alias_to_id.insert(normalized.to_string(), id);
    }

    /// Apply a classification outcome. A later signal set only changes
    /// the stored assignment when its confidence is strictly higher, so
    /// weaker signals never downgrade an existing classification.
    pub fn reclassify(&mut self, id: TeamId, cohort: Cohort, confidence: f64) -> bool {
        let Some(team) = self.teams.get_mut(id as usize) else {
            return false;
        };
        if cohort == Cohort::Unknown || confidence <= team.cohort_confidence {
            return false;
        }
        team.cohort = cohort;
        team.cohort_confidence = confidence;
        true
    }

    pub fn push_review(&mut self, event: ReviewEvent) {
        self.review_queue.push(event);
    }

    /// Drain the review events accumulated since the last call. The
    /// engine collects these into the pass summary and snapshot.
    pub fn take_review_events(&mut self) -> Vec<ReviewEvent> {
        std::mem::take(&mut self.review_queue)
    }
}
