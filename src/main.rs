use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use log::warn;

use pitchrank::cohort::Cohort;
use pitchrank::engine::{Engine, EngineConfig};
use pitchrank::ingest::RawSourceRow;
use pitchrank::rankings::{self, ComparisonStatus};
use pitchrank::registry::ReviewEvent;
use pitchrank::store::Store;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = first_operand(&args).cloned() else {
        print_usage();
        return Err(anyhow!("no command given"));
    };

    let cfg = engine_config_from_args(&args);
    let engine = build_engine(cfg, &args)?;
    let min_games = cfg.rating.min_games;

    match command.as_str() {
        "pass" => run_pass_command(&engine, &args),
        "rank" => run_rank_command(&engine, &args, min_games),
        "compare" => run_compare_command(&engine, &args),
        "review" => run_review_command(&engine, &args),
        other => {
            print_usage();
            Err(anyhow!("unknown command '{other}'"))
        }
    }
}

fn print_usage() {
    println!("pitchrank: cross-source opponent rating engine");
    println!();
    println!("usage: pitchrank [flags] <command>");
    println!("  pass FILE...        ingest JSON-lines rows, run one aggregation pass");
    println!("  rank                print rankings from the last committed pass");
    println!("  compare A B         head-to-head / common-opponent comparison");
    println!("  review              print pending ambiguous-identity events");
    println!();
    println!("flags: --db PATH | --no-db, --min-games N, --cohort YEAR,");
    println!("       --accept-threshold X, --ambiguity-margin X");
}

fn build_engine(cfg: EngineConfig, args: &[String]) -> Result<Engine> {
    if args.iter().any(|a| a == "--no-db") {
        return Ok(Engine::new(cfg));
    }
    let path = parse_flag::<PathBuf>(args, "--db")
        .or_else(Store::default_path)
        .context("unable to resolve sqlite path; pass --db or --no-db")?;
    let store = Store::open(&path)?;
    Ok(Engine::with_store(cfg, store)?)
}

fn engine_config_from_args(args: &[String]) -> EngineConfig {
    let mut cfg = EngineConfig::default();
    if let Some(v) =
        parse_flag(args, "--accept-threshold").or_else(|| env_parse("PITCHRANK_ACCEPT_THRESHOLD"))
    {
        cfg.resolver.accept_threshold = v;
    }
    if let Some(v) =
        parse_flag(args, "--ambiguity-margin").or_else(|| env_parse("PITCHRANK_AMBIGUITY_MARGIN"))
    {
        cfg.resolver.ambiguity_margin = v;
    }
    if let Some(v) = parse_flag(args, "--min-games").or_else(|| env_parse("PITCHRANK_MIN_GAMES")) {
        cfg.rating.min_games = v;
    }
    cfg
}

fn run_pass_command(engine: &Engine, args: &[String]) -> Result<()> {
    let files = command_operands(args, "pass");
    if files.is_empty() {
        return Err(anyhow!("pass requires at least one input file"));
    }

    let mut rows = Vec::new();
    for file in files {
        let raw = fs::read_to_string(file).with_context(|| format!("read {file}"))?;
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawSourceRow>(line) {
                Ok(row) => rows.push(row),
                Err(err) => warn!("{file}:{}: unparseable row: {err}", lineno + 1),
            }
        }
    }

    let summary = engine.run_pass(&rows)?;

    println!(
        "Pass {} committed at {}",
        summary.pass_id,
        summary.computed_at.to_rfc3339()
    );
    println!(
        "  rows: {} seen, {} ingested, {} duplicates, {} replaced by higher tier",
        summary.rows_seen,
        summary.rows_ingested,
        summary.duplicates_ignored,
        summary.replaced_by_higher_tier
    );
    println!(
        "  skipped: {} malformed, {} self-matches",
        summary.malformed_skipped, summary.self_matches_skipped
    );
    println!("  teams created: {}", summary.teams_created);
    if !summary.review_events.is_empty() {
        println!(
            "  ambiguous identities needing review: {}",
            summary.review_events.len()
        );
        for event in &summary.review_events {
            print_review_event(event);
        }
    }
    Ok(())
}

fn run_rank_command(engine: &Engine, args: &[String], min_games: u32) -> Result<()> {
    let snapshot = engine.snapshot();
    let Some(computed_at) = snapshot.computed_at else {
        return Err(anyhow!("no committed pass yet; run `pitchrank pass` first"));
    };

    let cohort = parse_flag::<u16>(args, "--cohort").map(Cohort::BirthYear);
    let rows = rankings::rank(&snapshot, cohort, min_games);

    println!(
        "Rankings as of {} (pass {})",
        computed_at.to_rfc3339(),
        snapshot.pass_id
    );
    match cohort {
        Some(c) => println!("Cohort {c}, minimum {min_games} games"),
        None => println!("All cohorts, minimum {min_games} games"),
    }
    println!(
        "{:<5}{:<42}{:<9}{:<5}{:<9}{:<6}{:<6}{:<7}{:<7}{}",
        "Rank", "Team", "Cohort", "GP", "W-D-L", "GF", "GA", "PPG", "SI", "Flags"
    );
    for row in &rows {
        println!(
            "{:<5}{:<42}{:<9}{:<5}{:<9}{:<6}{:<6}{:<7.2}{:<7.1}{}",
            row.rank,
            truncate(&row.canonical_name, 40),
            row.cohort.to_string(),
            row.games_played,
            format!("{}-{}-{}", row.wins, row.draws, row.losses),
            row.goals_for,
            row.goals_against,
            row.ppg,
            row.strength_index,
            if row.low_sample { "low-sample" } else { "" }
        );
    }
    println!("{} teams", rows.len());
    Ok(())
}

fn run_compare_command(engine: &Engine, args: &[String]) -> Result<()> {
    let names = command_operands(args, "compare");
    let [name_a, name_b] = names.as_slice() else {
        return Err(anyhow!("compare requires exactly two team names"));
    };

    let snapshot = engine.snapshot();
    if snapshot.computed_at.is_none() {
        return Err(anyhow!("no committed pass yet; run `pitchrank pass` first"));
    }
    let resolver = engine.config().resolver;
    let team_a = rankings::find_team(&snapshot, name_a, &resolver)
        .with_context(|| format!("no team matching '{name_a}'"))?;
    let team_b = rankings::find_team(&snapshot, name_b, &resolver)
        .with_context(|| format!("no team matching '{name_b}'"))?;

    let result = rankings::compare(&snapshot, team_a, team_b);
    println!("{} vs {}", result.team_a_name, result.team_b_name);

    if result.status == ComparisonStatus::InsufficientData {
        println!("Insufficient data: no head-to-head matches and no common opponents.");
        return Ok(());
    }

    if !result.head_to_head.is_empty() {
        println!(
            "Head-to-head: {}-{}-{} across {} matches",
            result.a_wins,
            result.draws,
            result.b_wins,
            result.head_to_head.len()
        );
        for m in &result.head_to_head {
            println!(
                "  {}  {}-{}  ({}, {})",
                m.date,
                m.goals_for,
                m.goals_against,
                m.outcome.letter(),
                m.tier
            );
        }
    }

    if !result.common_opponents.is_empty() {
        println!("Common opponents ({}):", result.common_opponents.len());
        for c in &result.common_opponents {
            println!(
                "  {:<40} A: {:+.2} avg GD over {}  B: {:+.2} avg GD over {}",
                truncate(&c.opponent_name, 38),
                c.a_avg_gd,
                c.a_games,
                c.b_avg_gd,
                c.b_games
            );
        }
        if let (Some(a), Some(b)) = (result.a_avg_gd_vs_common, result.b_avg_gd_vs_common) {
            println!("Against the shared set: A {a:+.2} avg GD, B {b:+.2} avg GD");
        }
    }

    if let Some(delta) = result.strength_delta {
        println!("Strength index delta (A - B): {delta:+.1}");
    }
    Ok(())
}

fn run_review_command(engine: &Engine, args: &[String]) -> Result<()> {
    let limit = parse_flag(args, "--limit").unwrap_or(50usize);
    let events = engine.review_events(limit)?;
    if events.is_empty() {
        println!("No pending identity reviews.");
        return Ok(());
    }
    println!("{} ambiguous identities:", events.len());
    for event in &events {
        print_review_event(event);
    }
    Ok(())
}

fn print_review_event(event: &ReviewEvent) {
    println!("  '{}' (created team {})", event.raw_name, event.created_id);
    for c in &event.candidates {
        println!(
            "    candidate {}: '{}' score {:.3}",
            c.id, c.canonical_name, c.score
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// First argument that is neither a flag nor a flag's value.
fn first_operand(args: &[String]) -> Option<&String> {
    let mut skip_value = false;
    for arg in args {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_value = !arg.contains('=') && arg != "--no-db";
            continue;
        }
        return Some(arg);
    }
    None
}

/// Free operands after a subcommand, flags and their values excluded.
fn command_operands<'a>(args: &'a [String], command: &str) -> Vec<&'a String> {
    let mut out = Vec::new();
    let mut seen_command = false;
    let mut skip_value = false;
    for arg in args {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_value = !arg.contains('=') && arg != "--no-db";
            continue;
        }
        if !seen_command {
            seen_command = arg == command;
            continue;
        }
        out.push(arg);
    }
    out
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{flag}="))
            && let Ok(v) = raw.trim().parse()
        {
            return Some(v);
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse()
        {
            return Some(v);
        }
    }
    None
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
