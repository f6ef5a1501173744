use std::collections::HashMap;

use pitchrank::registry::TeamRegistry;
use pitchrank::resolve::{Resolution, ResolverConfig, normalize_name, resolve};

fn cfg() -> ResolverConfig {
    ResolverConfig::default()
}

#[test]
fn first_sighting_creates_a_new_team() {
    let mut registry = TeamRegistry::new();
    let res = resolve(&mut registry, "Johnstown FC Johnstown FC 2018 Boys", &cfg());
    assert!(matches!(res, Resolution::Created { .. }));
    assert_eq!(registry.len(), 1);

    let team = registry.get(res.id()).unwrap();
    assert_eq!(team.canonical_name, "Johnstown FC Johnstown FC 2018 Boys");
    assert_eq!(team.aliases, vec!["johnstown fc 2018 boys".to_string()]);
}

#[test]
fn exact_alias_lookup_wins_immediately() {
    let mut registry = TeamRegistry::new();
    let created = resolve(&mut registry, "Delaware Knights 2018 BU08", &cfg());

    // Different punctuation and case, same normalized form.
    let res = resolve(&mut registry, "  DELAWARE KNIGHTS 2018 bu08 ", &cfg());
    match res {
        Resolution::Matched { id, score } => {
            assert_eq!(id, created.id());
            assert_eq!(score, 1.0);
        }
        other => panic!("expected exact match, got {other:?}"),
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn confident_fuzzy_match_registers_a_new_alias() {
    let mut registry = TeamRegistry::new();
    let created = resolve(
        &mut registry,
        "Blast FC Soccer Academy Blast FC 2018B",
        &cfg(),
    );

    let res = resolve(&mut registry, "Blast FC 2018B", &cfg());
    match res {
        Resolution::Matched { id, score } => {
            assert_eq!(id, created.id());
            assert!(score >= cfg().accept_threshold);
        }
        other => panic!("expected fuzzy match, got {other:?}"),
    }

    // The new spelling is now an exact alias.
    assert_eq!(
        registry.lookup_alias(&normalize_name("Blast FC 2018B")),
        Some(created.id())
    );
    assert_eq!(registry.len(), 1);
}

#[test]
fn ambiguous_top_two_creates_tentative_team_and_review_event() {
    let mut registry = TeamRegistry::new();
    let navy = resolve(&mut registry, "Polaris SC 18B Navy", &cfg());
    let white = resolve(&mut registry, "Polaris SC 18B White", &cfg());

    // Drops the color: equally close to both existing entries.
    let res = resolve(&mut registry, "Polaris SC 18B", &cfg());
    let Resolution::Ambiguous { id, candidates } = res else {
        panic!("expected ambiguous resolution, got {res:?}");
    };
    assert_eq!(registry.len(), 3);
    assert_ne!(id, navy.id());
    assert_ne!(id, white.id());
    let candidate_ids: Vec<_> = candidates.iter().map(|c| c.id).collect();
    assert!(candidate_ids.contains(&navy.id()));
    assert!(candidate_ids.contains(&white.id()));
    for c in &candidates {
        assert!(c.score >= cfg().accept_threshold);
    }

    let events = registry.take_review_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].created_id, id);
    assert_eq!(events[0].candidates.len(), candidates.len());
}

#[test]
fn adjacent_birth_years_never_merge() {
    let mut registry = TeamRegistry::new();
    let older = resolve(&mut registry, "Elite FC 2018 Arsenal", &cfg());
    let res = resolve(&mut registry, "Elite FC 2017 Arsenal", &cfg());
    assert!(matches!(res, Resolution::Created { .. }));
    assert_ne!(res.id(), older.id());
}

#[test]
fn sibling_roman_numeral_squads_stay_distinct() {
    let mut registry = TeamRegistry::new();
    let first = resolve(&mut registry, "Sporting Columbus Boys 2018 I", &cfg());
    let second = resolve(&mut registry, "Sporting Columbus Boys 2018 II", &cfg());
    assert_ne!(first.id(), second.id());
}

#[test]
fn no_alias_ever_belongs_to_two_teams() {
    let mut registry = TeamRegistry::new();
    let names = [
        "Blast FC Soccer Academy Blast FC 2018B",
        "Blast FC 2018B",
        "Polaris Soccer Club Polaris SC 18B Navy",
        "Polaris SC 18B Navy",
        "Columbus Force SC CE 2018B Net Ninjas",
        "Sporting Columbus Sporting Columbus Boys 2018 II",
        "Sporting Columbus Boys 2018 II",
        "Delaware Knights Delaware Knights 2018 BU08",
        "Johnstown FC Johnstown FC 2018 Boys",
    ];
    for name in names {
        resolve(&mut registry, name, &cfg());
    }

    let mut owners: HashMap<&str, u32> = HashMap::new();
    for team in registry.teams() {
        for alias in &team.aliases {
            if let Some(prev) = owners.insert(alias.as_str(), team.id) {
                panic!("alias '{alias}' owned by both team {prev} and team {}", team.id);
            }
        }
    }
    // And the reverse map agrees with the per-team lists.
    for (alias, id) in owners {
        assert_eq!(registry.lookup_alias(alias), Some(id));
    }
}
