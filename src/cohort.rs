use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Competitive cohort: the birth-year bracket a team plays in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cohort {
    BirthYear(u16),
    Unknown,
}

impl Cohort {
    pub fn birth_year(&self) -> Option<u16> {
        match self {
            Cohort::BirthYear(year) => Some(*year),
            Cohort::Unknown => None,
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cohort::BirthYear(year) => write!(f, "{year}"),
            Cohort::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Birth-year / age-group token in the team name itself.
    NameToken,
    /// Birth-year / age-group token in the division or tournament label.
    DivisionLabel,
    /// Co-occurrence with an already-classified opponent in a resolved match.
    OpponentCohort,
}

impl SignalKind {
    pub fn weight(&self) -> f64 {
        match self {
            SignalKind::NameToken => 0.6,
            SignalKind::DivisionLabel => 0.3,
            SignalKind::OpponentCohort => 0.1,
        }
    }
}

/// One weak classification signal. Signals are combined by weighted sum
/// per candidate cohort, never by simple override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohortSignal {
    pub kind: SignalKind,
    pub weight: f64,
    pub cohort: Cohort,
}

impl CohortSignal {
    pub fn new(kind: SignalKind, cohort: Cohort) -> Self {
        Self {
            kind,
            weight: kind.weight(),
            cohort,
        }
    }
}

/// Birth years observed in the source data, with their age-group spellings.
const COHORT_YEARS: std::ops::RangeInclusive<u16> = 2015..=2020;
const SEASON_BASE_YEAR: u16 = 2026;

/// token -> birth year, e.g. "u8" / "bu08" / "18b" / "2018" -> 2018.
static COHORT_TOKENS: Lazy<HashMap<String, u16>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for year in COHORT_YEARS {
        map.insert(year.to_string(), year);
        let age = SEASON_BASE_YEAR - year;
        for prefix in ["u", "bu", "gu"] {
            map.insert(format!("{prefix}{age}"), year);
            if age < 10 {
                map.insert(format!("{prefix}0{age}"), year);
            }
        }
        // Short forms like "18b" / "b18" for 2018.
        let short = year % 100;
        map.insert(format!("{short}b"), year);
        map.insert(format!("b{short}"), year);
    }
    map
});

/// Scan free text for a birth-year or age-group token.
pub fn cohort_from_text(text: &str) -> Option<Cohort> {
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        if let Some(year) = COHORT_TOKENS.get(token) {
            return Some(Cohort::BirthYear(*year));
        }
    }
    None
}

/// Signals derivable from a single source row: the raw team name plus an
/// optional division/tournament label.
pub fn signals_from_names(raw_name: &str, hint: Option<&str>) -> Vec<CohortSignal> {
    let mut out = Vec::new();
    if let Some(cohort) = cohort_from_text(raw_name) {
        out.push(CohortSignal::new(SignalKind::NameToken, cohort));
    }
    if let Some(cohort) = hint.and_then(cohort_from_text) {
        out.push(CohortSignal::new(SignalKind::DivisionLabel, cohort));
    }
    out
}

/// Fold signals with a weighted sum per candidate cohort. The cohort with
/// the highest combined weight wins; confidence is that weight clamped to
/// [0, 1]. No firing signal yields (Unknown, 0).
pub fn classify(signals: &[CohortSignal]) -> (Cohort, f64) {
    let mut totals: HashMap<Cohort, f64> = HashMap::new();
    for signal in signals {
        if signal.cohort == Cohort::Unknown {
            continue;
        }
        *totals.entry(signal.cohort).or_insert(0.0) += signal.weight;
    }

    let mut best: Option<(Cohort, f64)> = None;
    for (cohort, total) in totals {
        let better = match best {
            None => true,
            // Deterministic tie-break: older bracket wins on exact tie.
            Some((best_cohort, best_total)) => {
                total > best_total
                    || (total == best_total && cohort.birth_year() < best_cohort.birth_year())
            }
        };
        if better {
            best = Some((cohort, total));
        }
    }

    match best {
        Some((cohort, total)) => (cohort, total.clamp(0.0, 1.0)),
        None => (Cohort::Unknown, 0.0),
    }
}
