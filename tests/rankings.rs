use serde_json::Value;

use pitchrank::cohort::Cohort;
use pitchrank::engine::{Engine, EngineConfig};
use pitchrank::ingest::RawSourceRow;
use pitchrank::rankings::{self, ComparisonStatus};
use pitchrank::resolve::ResolverConfig;

fn row(team: &str, opponent: &str, date: &str, gf: u32, ga: u32) -> RawSourceRow {
    RawSourceRow {
        team: Some(team.to_string()),
        opponent: Some(opponent.to_string()),
        date: Some(date.to_string()),
        goals_for: Some(Value::from(gf)),
        goals_against: Some(Value::from(ga)),
        source: Some("standings".to_string()),
        provenance: Some("division export".to_string()),
        division: Some("OCL BU08 Stripes".to_string()),
    }
}

/// Three-team 2018 round robin plus a single-game team and a 2017 team.
fn seeded_engine() -> Engine {
    let rows = vec![
        // Alpha beats everyone.
        row("Alpha United 2018", "Bravo Celtic 2018", "2025-09-01", 3, 0),
        row("Alpha United 2018", "Charlie City 2018", "2025-09-02", 4, 1),
        row("Alpha United 2018", "Bravo Celtic 2018", "2025-09-08", 2, 1),
        // Bravo splits with Charlie.
        row("Bravo Celtic 2018", "Alpha United 2018", "2025-09-01", 0, 3),
        row("Bravo Celtic 2018", "Alpha United 2018", "2025-09-08", 1, 2),
        row("Bravo Celtic 2018", "Charlie City 2018", "2025-09-09", 2, 2),
        row("Bravo Celtic 2018", "Charlie City 2018", "2025-09-15", 3, 1),
        // Charlie from its own perspective.
        row("Charlie City 2018", "Alpha United 2018", "2025-09-02", 1, 4),
        row("Charlie City 2018", "Bravo Celtic 2018", "2025-09-09", 2, 2),
        row("Charlie City 2018", "Bravo Celtic 2018", "2025-09-15", 1, 3),
        // One blowout win only: rated 97 but low-sample.
        row("Delta Rovers 2018", "Charlie City 2018", "2025-09-20", 4, 0),
        // Different cohort entirely.
        row("Echo Thunder 2017", "Foxtrot Storm 2017", "2025-09-21", 2, 1),
        row("Echo Thunder 2017", "Foxtrot Storm 2017", "2025-09-27", 1, 1),
        row("Echo Thunder 2017", "Foxtrot Storm 2017", "2025-10-04", 0, 2),
    ];
    let engine = Engine::new(EngineConfig::default());
    engine.run_pass(&rows).unwrap();
    engine
}

fn team_id(engine: &Engine, name: &str) -> u32 {
    rankings::find_team(&engine.snapshot(), name, &ResolverConfig::default())
        .unwrap_or_else(|| panic!("team '{name}' not found"))
}

#[test]
fn rank_orders_by_ppg_then_strength_with_stable_numbers() {
    let engine = seeded_engine();
    let snapshot = engine.snapshot();

    let rows = rankings::rank(&snapshot, Some(Cohort::BirthYear(2018)), 3);
    let names: Vec<&str> = rows.iter().map(|r| r.canonical_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Alpha United 2018", "Bravo Celtic 2018", "Charlie City 2018"]
    );
    assert_eq!(rows[0].rank, 1);
    assert_eq!(rows[1].rank, 2);
    assert_eq!(rows[2].rank, 3);
    assert!(rows[0].ppg >= rows[1].ppg && rows[1].ppg >= rows[2].ppg);

    // Same snapshot, same answer.
    let again = rankings::rank(&snapshot, Some(Cohort::BirthYear(2018)), 3);
    for (a, b) in rows.iter().zip(again.iter()) {
        assert_eq!(a.rank, b.rank);
        assert_eq!(a.team_id, b.team_id);
        assert_eq!(a.ppg, b.ppg);
        assert_eq!(a.strength_index, b.strength_index);
    }
}

#[test]
fn low_sample_teams_are_excluded_from_default_views_but_still_rated() {
    let engine = seeded_engine();
    let snapshot = engine.snapshot();

    let default_view = rankings::rank(&snapshot, Some(Cohort::BirthYear(2018)), 3);
    assert!(
        !default_view
            .iter()
            .any(|r| r.canonical_name == "Delta Rovers 2018")
    );

    let everything = rankings::rank(&snapshot, Some(Cohort::BirthYear(2018)), 1);
    let delta = everything
        .iter()
        .find(|r| r.canonical_name == "Delta Rovers 2018")
        .expect("one-game team still rated");
    assert!(delta.low_sample);
    assert!((delta.strength_index - 97.0).abs() < 1e-9);
    assert!((delta.ppg - 3.0).abs() < 1e-9);
}

#[test]
fn cohort_filter_separates_brackets() {
    let engine = seeded_engine();
    let snapshot = engine.snapshot();

    let older = rankings::rank(&snapshot, Some(Cohort::BirthYear(2017)), 3);
    assert_eq!(older.len(), 1);
    assert_eq!(older[0].canonical_name, "Echo Thunder 2017");

    let younger = rankings::rank(&snapshot, Some(Cohort::BirthYear(2018)), 3);
    assert!(younger.iter().all(|r| r.cohort == Cohort::BirthYear(2018)));
}

#[test]
fn cohorts_are_classified_from_name_and_division_signals() {
    let engine = seeded_engine();
    let snapshot = engine.snapshot();

    let alpha = snapshot.team(team_id(&engine, "Alpha United 2018")).unwrap();
    assert_eq!(alpha.cohort, Cohort::BirthYear(2018));
    assert!(alpha.cohort_confidence >= 0.6);

    // Foxtrot appears only as an opponent; its name token still fires.
    let foxtrot = snapshot.team(team_id(&engine, "Foxtrot Storm 2017")).unwrap();
    assert_eq!(foxtrot.cohort, Cohort::BirthYear(2017));
}

#[test]
fn compare_reports_head_to_head_record() {
    let engine = seeded_engine();
    let snapshot = engine.snapshot();
    let alpha = team_id(&engine, "Alpha United 2018");
    let bravo = team_id(&engine, "Bravo Celtic 2018");

    let result = rankings::compare(&snapshot, alpha, bravo);
    assert!(matches!(
        result.status,
        ComparisonStatus::HeadToHead | ComparisonStatus::Both
    ));
    assert_eq!(result.head_to_head.len(), 2);
    assert_eq!((result.a_wins, result.draws, result.b_wins), (2, 0, 0));
    let delta = result.strength_delta.expect("both sides aggregated");
    assert!(delta > 0.0);
}

#[test]
fn compare_falls_back_to_common_opponents() {
    let engine = seeded_engine();
    let snapshot = engine.snapshot();
    let alpha = team_id(&engine, "Alpha United 2018");
    let delta = team_id(&engine, "Delta Rovers 2018");

    // Alpha and Delta never met; both played Charlie.
    let result = rankings::compare(&snapshot, alpha, delta);
    assert_eq!(result.status, ComparisonStatus::CommonOpponents);
    assert_eq!(result.common_opponents.len(), 1);
    let common = &result.common_opponents[0];
    assert_eq!(common.opponent_name, "Charlie City 2018");
    assert!((common.a_avg_gd - 3.0).abs() < 1e-9);
    assert!((common.b_avg_gd - 4.0).abs() < 1e-9);
}

#[test]
fn compare_without_any_link_is_insufficient_data() {
    let engine = seeded_engine();
    let snapshot = engine.snapshot();
    let alpha = team_id(&engine, "Alpha United 2018");
    let echo = team_id(&engine, "Echo Thunder 2017");

    let result = rankings::compare(&snapshot, alpha, echo);
    assert_eq!(result.status, ComparisonStatus::InsufficientData);
    assert!(result.head_to_head.is_empty());
    assert!(result.common_opponents.is_empty());
}
