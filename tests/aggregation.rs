use serde_json::Value;

use pitchrank::engine::{Engine, EngineConfig};
use pitchrank::ingest::{RawSourceRow, SourceKind};

fn row(team: &str, opponent: &str, date: &str, gf: u32, ga: u32, source: &str) -> RawSourceRow {
    RawSourceRow {
        team: Some(team.to_string()),
        opponent: Some(opponent.to_string()),
        date: Some(date.to_string()),
        goals_for: Some(Value::from(gf)),
        goals_against: Some(Value::from(ga)),
        source: Some(source.to_string()),
        provenance: Some(format!("{source} export")),
        division: None,
    }
}

fn engine() -> Engine {
    Engine::new(EngineConfig::default())
}

#[test]
fn repeated_passes_over_identical_rows_are_idempotent() {
    let rows = vec![
        row("DSX Orange 2018", "Johnstown FC 2018 Boys", "2025-09-15", 4, 0, "standings"),
        row("DSX Orange 2018", "Delaware Knights 2018 BU08", "2025-09-14", 7, 2, "standings"),
        row("Johnstown FC 2018 Boys", "DSX Orange 2018", "2025-09-15", 0, 4, "standings"),
    ];

    let engine = engine();
    let first = engine.run_pass(&rows).unwrap();
    let snap_one = engine.snapshot();
    let second = engine.run_pass(&rows).unwrap();
    let snap_two = engine.snapshot();

    assert_eq!(first.rows_ingested, 3);
    assert_eq!(second.rows_ingested, 0);
    assert_eq!(second.duplicates_ignored, 3);
    assert_eq!(second.teams_created, 0);

    assert_eq!(snap_one.teams.len(), snap_two.teams.len());
    assert_eq!(snap_one.matches.len(), snap_two.matches.len());
    for (id, agg_one) in &snap_one.aggregates {
        let agg_two = snap_two.aggregates.get(id).expect("aggregate survives");
        assert_eq!(agg_one.games_played, agg_two.games_played);
        assert_eq!(agg_one.wins, agg_two.wins);
        assert_eq!(agg_one.draws, agg_two.draws);
        assert_eq!(agg_one.losses, agg_two.losses);
        assert_eq!(agg_one.goals_for_total, agg_two.goals_for_total);
        assert_eq!(agg_one.goals_against_total, agg_two.goals_against_total);
        assert_eq!(agg_one.points, agg_two.points);
        assert_eq!(agg_one.ppg, agg_two.ppg);
        assert_eq!(agg_one.gd_per_game, agg_two.gd_per_game);
        assert_eq!(agg_one.strength_index, agg_two.strength_index);
        assert_eq!(agg_one.low_sample, agg_two.low_sample);
    }
}

#[test]
fn name_variants_collapse_onto_one_match_record() {
    // Two providers report the same game under different spellings of
    // both sides.
    let rows = vec![
        row(
            "Blast FC Soccer Academy Blast FC 2018B",
            "Johnstown FC Johnstown FC 2018 Boys",
            "2025-09-21",
            3,
            0,
            "tournament",
        ),
        row(
            "Blast FC 2018B",
            "Johnstown FC 2018 Boys",
            "2025-09-21",
            3,
            0,
            "tournament",
        ),
    ];

    let engine = engine();
    let summary = engine.run_pass(&rows).unwrap();
    assert_eq!(summary.rows_ingested, 1);
    assert_eq!(summary.duplicates_ignored, 1);
    assert_eq!(summary.teams_created, 2);
    assert_eq!(engine.snapshot().matches.len(), 1);
}

#[test]
fn higher_tier_replaces_lower_in_either_order() {
    let low_then_high = vec![
        row("DSX Orange 2018", "Polaris SC 18B Navy", "2025-09-22", 2, 4, "head-to-head"),
        row("DSX Orange 2018", "Polaris SC 18B Navy", "2025-09-22", 2, 4, "standings"),
    ];
    let engine_one = engine();
    let summary = engine_one.run_pass(&low_then_high).unwrap();
    assert_eq!(summary.rows_ingested, 1);
    assert_eq!(summary.replaced_by_higher_tier, 1);
    let snap = engine_one.snapshot();
    assert_eq!(snap.matches.len(), 1);
    assert_eq!(snap.matches[0].source, SourceKind::DivisionStandings);

    let high_then_low = vec![
        row("DSX Orange 2018", "Polaris SC 18B Navy", "2025-09-22", 2, 4, "standings"),
        row("DSX Orange 2018", "Polaris SC 18B Navy", "2025-09-22", 2, 4, "head-to-head"),
    ];
    let engine_two = engine();
    let summary = engine_two.run_pass(&high_then_low).unwrap();
    assert_eq!(summary.rows_ingested, 1);
    assert_eq!(summary.replaced_by_higher_tier, 0);
    assert_eq!(summary.duplicates_ignored, 1);
    let snap = engine_two.snapshot();
    assert_eq!(snap.matches.len(), 1);
    assert_eq!(snap.matches[0].source, SourceKind::DivisionStandings);
}

#[test]
fn equal_tier_collision_keeps_first_seen_provenance() {
    let rows = vec![
        row("DSX Orange 2018", "Polaris SC 18B Navy", "2025-09-22", 2, 4, "standings"),
        {
            let mut r = row("DSX Orange 2018", "Polaris SC 18B Navy", "2025-09-22", 2, 4, "standings");
            r.provenance = Some("a different export".to_string());
            r
        },
    ];
    let engine = engine();
    engine.run_pass(&rows).unwrap();
    let snap = engine.snapshot();
    assert_eq!(snap.matches.len(), 1);
    assert_eq!(snap.matches[0].provenance, "standings export");
}

#[test]
fn malformed_rows_are_skipped_and_counted_without_aborting() {
    let mut missing_team = row("x", "Opp 2018", "2025-09-01", 1, 1, "standings");
    missing_team.team = None;
    let mut bad_date = row("Team A 2018", "Opp 2018", "x", 1, 1, "standings");
    bad_date.date = Some("September 1st".to_string());
    let mut bad_goals = row("Team A 2018", "Opp 2018", "2025-09-02", 0, 0, "standings");
    bad_goals.goals_for = Some(Value::from("three"));
    let mut missing_goals = row("Team A 2018", "Opp 2018", "2025-09-03", 0, 0, "standings");
    missing_goals.goals_against = None;

    let rows = vec![
        missing_team,
        bad_date,
        bad_goals,
        missing_goals,
        row("Team A 2018", "Opp 2018", "2025-09-04", 2, 1, "standings"),
    ];

    let engine = engine();
    let summary = engine.run_pass(&rows).unwrap();
    assert_eq!(summary.rows_seen, 5);
    assert_eq!(summary.malformed_skipped, 4);
    assert_eq!(summary.rows_ingested, 1);
}

#[test]
fn both_sides_resolving_to_one_team_is_rejected() {
    let rows = vec![row(
        "Sporting Columbus Sporting Columbus Boys 2018 Bexley",
        "Sporting Columbus Boys 2018 Bexley",
        "2025-09-28",
        1,
        1,
        "standings",
    )];
    let engine = engine();
    let summary = engine.run_pass(&rows).unwrap();
    assert_eq!(summary.self_matches_skipped, 1);
    assert_eq!(summary.rows_ingested, 0);
    assert!(engine.snapshot().matches.is_empty());
}

#[test]
fn unresolvable_opponent_cells_yield_opponent_less_records() {
    let rows = vec![row("Team A 2018", "4 - 4", "2025-09-05", 4, 4, "schedule")];
    let engine = engine();
    let summary = engine.run_pass(&rows).unwrap();
    assert_eq!(summary.rows_ingested, 1);
    let snap = engine.snapshot();
    assert_eq!(snap.matches.len(), 1);
    assert_eq!(snap.matches[0].opponent_id, None);
}

#[test]
fn strength_index_is_bounded_for_every_aggregate() {
    let mut rows = Vec::new();
    // Extreme blowouts in both directions plus a normal spread.
    rows.push(row("Crushers 2018", "Feeders 2018", "2025-09-01", 30, 0, "standings"));
    rows.push(row("Feeders 2018", "Crushers 2018", "2025-09-01", 0, 30, "standings"));
    for day in 2..=9 {
        rows.push(row(
            "Middle FC 2018",
            "Crushers 2018",
            &format!("2025-09-{day:02}"),
            day,
            9 - day,
            "standings",
        ));
    }

    let engine = engine();
    engine.run_pass(&rows).unwrap();
    for agg in engine.snapshot().aggregates.values() {
        assert!(
            (0.0..=100.0).contains(&agg.strength_index),
            "strength index {} out of bounds for team {}",
            agg.strength_index,
            agg.team_id
        );
    }
}
