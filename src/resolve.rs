use std::collections::HashSet;

use chrono::Utc;
use once_cell::sync::Lazy;
use strsim::jaro_winkler;

use crate::registry::{ReviewEvent, ScoredCandidate, TeamId, TeamRegistry};

/// Tunables for identity resolution. The acceptance threshold and
/// ambiguity margin were never fixed by the source material; they are
/// configuration, validated against real rosters, not constants.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Minimum token-set similarity for the top candidate to be eligible.
    pub accept_threshold: f64,
    /// The top candidate must beat the runner-up by more than this.
    pub ambiguity_margin: f64,
    /// Two tokens count as equal when their Jaro-Winkler similarity
    /// reaches this floor (catches misspellings like "colombus").
    pub fuzzy_token_floor: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.78,
            ambiguity_margin: 0.08,
            fuzzy_token_floor: 0.92,
        }
    }
}

/// Outcome of resolving one raw name. Tagged so callers and tests can
/// assert on what happened rather than inspecting registry side effects.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Existing team, by exact alias or accepted fuzzy match.
    Matched { id: TeamId, score: f64 },
    /// No candidate came close; a fresh entity was created.
    Created { id: TeamId },
    /// Two or more candidates scored within the ambiguity margin. A
    /// tentative entity was created and a review event queued; merging
    /// is left to a human.
    Ambiguous {
        id: TeamId,
        candidates: Vec<ScoredCandidate>,
    },
}

impl Resolution {
    pub fn id(&self) -> TeamId {
        match self {
            Resolution::Matched { id, .. }
            | Resolution::Created { id }
            | Resolution::Ambiguous { id, .. } => *id,
        }
    }
}

/// Structural words that carry no identity. Age/year tokens and roman
/// numerals are deliberately NOT here: "2018" vs "2017" and "II" vs "III"
/// distinguish real sibling teams, and a false merge is irreversible.
static NOISE_TOKENS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["boys", "girls", "academy", "fc", "sc", "soccer", "club", "team", "youth", "the"]
        .into_iter()
        .collect()
});

/// Canonical form of a raw team name: lowercase, alphanumeric tokens,
/// with a repeated leading club-name run collapsed ("Sporting Columbus
/// Sporting Columbus Boys 2018 Bexley" keeps one "sporting columbus").
/// Several providers concatenate club and team names, producing that
/// duplication.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    loop {
        let mut collapsed = false;
        for k in (1..=tokens.len() / 2).rev() {
            if tokens[..k] == tokens[k..2 * k] {
                tokens.drain(..k);
                collapsed = true;
                break;
            }
        }
        if !collapsed {
            break;
        }
    }

    tokens.join(" ")
}

/// Tokens that actually identify a team. Falls back to the full token
/// set when a name is nothing but structural words.
fn significant_tokens(normalized: &str) -> Vec<&str> {
    let all: Vec<&str> = normalized.split_whitespace().collect();
    let kept: Vec<&str> = all
        .iter()
        .copied()
        .filter(|t| !NOISE_TOKENS.contains(t))
        .collect();
    if kept.is_empty() { all } else { kept }
}

/// Order-insensitive token-set similarity: Dice coefficient over
/// significant tokens, with near-equal tokens (Jaro-Winkler above the
/// configured floor) counting as matched. Deterministic and cheap to
/// explain in a review event.
pub fn token_set_similarity(a: &str, b: &str, cfg: &ResolverConfig) -> f64 {
    let a_tokens = significant_tokens(a);
    let b_tokens = significant_tokens(b);
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }

    let mut used = vec![false; b_tokens.len()];
    let mut matched = 0usize;
    for a_tok in &a_tokens {
        let mut best: Option<usize> = None;
        for (idx, b_tok) in b_tokens.iter().enumerate() {
            if used[idx] {
                continue;
            }
            if a_tok == b_tok {
                best = Some(idx);
                break;
            }
            if best.is_none() && jaro_winkler(a_tok, b_tok) >= cfg.fuzzy_token_floor {
                best = Some(idx);
            }
        }
        if let Some(idx) = best {
            used[idx] = true;
            matched += 1;
        }
    }

    (2.0 * matched as f64) / (a_tokens.len() + b_tokens.len()) as f64
}

/// Score every known team against a normalized name: per team the best
/// score across its aliases, ranked by (score desc, id asc). Read-only;
/// also used by the comparison CLI to look teams up without mutating the
/// registry.
pub fn rank_candidates(
    registry: &TeamRegistry,
    normalized: &str,
    cfg: &ResolverConfig,
) -> Vec<ScoredCandidate> {
    let mut out: Vec<ScoredCandidate> = registry
        .teams()
        .iter()
        .filter_map(|team| {
            let score = team
                .aliases
                .iter()
                .map(|alias| token_set_similarity(normalized, alias, cfg))
                .fold(0.0_f64, f64::max);
            (score > 0.0).then(|| ScoredCandidate {
                id: team.id,
                canonical_name: team.canonical_name.clone(),
                score,
            })
        })
        .collect();
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    out
}

/// Canonicalize a raw team name into a stable entity id.
///
/// The acceptance policy is asymmetric on purpose: a duplicate entity is
/// cheap to reconcile manually later, while an incorrect auto-merge
/// corrupts the merged team's entire match history irreversibly. So the
/// top fuzzy candidate is accepted only when it clears the threshold AND
/// beats the runner-up by more than the ambiguity margin; anything less
/// gets a fresh entity.
pub fn resolve(registry: &mut TeamRegistry, raw_name: &str, cfg: &ResolverConfig) -> Resolution {
    let normalized = normalize_name(raw_name);

    if let Some(id) = registry.lookup_alias(&normalized) {
        return Resolution::Matched { id, score: 1.0 };
    }

    let candidates = rank_candidates(registry, &normalized, cfg);
    let Some(top) = candidates.first().cloned() else {
        let id = registry.create_team(raw_name, &normalized);
        return Resolution::Created { id };
    };

    if top.score < cfg.accept_threshold {
        let id = registry.create_team(raw_name, &normalized);
        return Resolution::Created { id };
    }

    let runner_up = candidates.iter().find(|c| c.id != top.id);
    let ambiguous = runner_up.is_some_and(|r| top.score - r.score <= cfg.ambiguity_margin);

    if ambiguous {
        let id = registry.create_team(raw_name, &normalized);
        let competing: Vec<ScoredCandidate> = candidates
            .iter()
            .filter(|c| top.score - c.score <= cfg.ambiguity_margin)
            .cloned()
            .collect();
        registry.push_review(ReviewEvent {
            raw_name: raw_name.trim().to_string(),
            created_id: id,
            candidates: competing.clone(),
            created_at: Utc::now(),
        });
        return Resolution::Ambiguous {
            id,
            candidates: competing,
        };
    }

    registry.add_alias(top.id, &normalized);
    Resolution::Matched {
        id: top.id,
        score: top.score,
    }
}
