// Phase-column detection.
//
// Every candidate column (from the phase boundary onward) gets its own
// `ColumnDecision` so a run can explain why a column was or was not used.
use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DetectionStrategy, PhaseRules};
use crate::types::{Cell, Table, SOURCE_COLUMN};
use crate::util::normalize_text;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rationale {
    /// Header contains a phase keyword.
    Keyword { keyword: String },
    /// Textual column with a distinct-value count inside the bounds.
    TextualCardinality { distinct: usize, max: usize },
    /// Textual column, but too few or too many distinct values.
    CardinalityOutOfRange { distinct: usize, min: usize, max: usize },
    /// No text cells at all (numbers, dates or empty).
    NotTextual,
    /// Keyword strategy found nothing; non-numeric columns are used instead.
    NonNumericFallback,
    /// Keyword strategy: no keyword in the header.
    NoKeyword,
    /// Keyword strategy fallback skipped a numeric column.
    Numeric,
    /// Bookkeeping column added by the loader.
    SourceColumn,
}

impl fmt::Display for Rationale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rationale::Keyword { keyword } => write!(f, "header matches '{}'", keyword),
            Rationale::TextualCardinality { distinct, max } => {
                write!(f, "text column with {} distinct values (max {})", distinct, max)
            }
            Rationale::CardinalityOutOfRange { distinct, min, max } => write!(
                f,
                "{} distinct values outside [{}, {}]",
                distinct, min, max
            ),
            Rationale::NotTextual => f.write_str("not a text column"),
            Rationale::NonNumericFallback => f.write_str("non-numeric fallback"),
            Rationale::NoKeyword => f.write_str("no phase keyword"),
            Rationale::Numeric => f.write_str("numeric column"),
            Rationale::SourceColumn => f.write_str("source file column"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDecision {
    pub column: String,
    pub index: usize,
    pub is_phase: bool,
    pub rationale: Rationale,
}

/// Result of running the detector over a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseDetection {
    pub decisions: Vec<ColumnDecision>,
    /// Distinct phase column names in table order.
    pub phase_columns: Vec<String>,
}

impl PhaseDetection {
    /// `true` is the explicit "no phases found" state.
    pub fn is_empty(&self) -> bool {
        self.phase_columns.is_empty()
    }
}

/// Shape of a column's values, the input to every rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnProfile {
    pub textual: bool,
    pub numeric: bool,
    pub distinct: usize,
}

pub fn profile_column(table: &Table, col: usize) -> ColumnProfile {
    let mut textual = false;
    let mut numeric = true;
    let mut seen: HashSet<String> = HashSet::new();
    for cell in table.column_cells(col) {
        if cell.is_blank() {
            continue;
        }
        match cell {
            Cell::Text(_) => {
                textual = true;
                numeric = false;
            }
            Cell::Date(_) => numeric = false,
            _ => {}
        }
        seen.insert(cell.to_string());
    }
    ColumnProfile {
        textual,
        numeric,
        distinct: seen.len(),
    }
}

fn keyword_match(header: &str, rules: &PhaseRules) -> Option<String> {
    let h = normalize_text(header);
    rules
        .keywords
        .iter()
        .find(|k| {
            let k = normalize_text(k);
            !k.is_empty() && h.contains(&k)
        })
        .cloned()
}

/// Heuristic rule for one column: keyword header, or textual with a
/// distinct count in `[min_distinct, max(floor, ratio × rows)]`.
pub fn classify_column(table: &Table, col: usize, rules: &PhaseRules) -> ColumnDecision {
    let column = table.columns().get(col).cloned().unwrap_or_default();
    let decide = |is_phase, rationale| ColumnDecision {
        column: column.clone(),
        index: col,
        is_phase,
        rationale,
    };

    if column == SOURCE_COLUMN {
        return decide(false, Rationale::SourceColumn);
    }
    if let Some(keyword) = keyword_match(&column, rules) {
        return decide(true, Rationale::Keyword { keyword });
    }
    let profile = profile_column(table, col);
    if !profile.textual {
        return decide(false, Rationale::NotTextual);
    }
    let max = rules.max_distinct(table.len());
    if (rules.min_distinct..=max).contains(&profile.distinct) {
        decide(
            true,
            Rationale::TextualCardinality {
                distinct: profile.distinct,
                max,
            },
        )
    } else {
        decide(
            false,
            Rationale::CardinalityOutOfRange {
                distinct: profile.distinct,
                min: rules.min_distinct,
                max,
            },
        )
    }
}

fn keyword_decisions(table: &Table, cols: &[usize], rules: &PhaseRules) -> Vec<ColumnDecision> {
    let mut decisions: Vec<ColumnDecision> = cols
        .iter()
        .map(|&col| {
            let column = table.columns()[col].clone();
            let (is_phase, rationale) = if column == SOURCE_COLUMN {
                (false, Rationale::SourceColumn)
            } else {
                match keyword_match(&column, rules) {
                    Some(keyword) => (true, Rationale::Keyword { keyword }),
                    None => (false, Rationale::NoKeyword),
                }
            };
            ColumnDecision {
                column,
                index: col,
                is_phase,
                rationale,
            }
        })
        .collect();

    if decisions.iter().any(|d| d.is_phase) {
        return decisions;
    }
    for d in &mut decisions {
        if d.rationale == Rationale::SourceColumn {
            continue;
        }
        if profile_column(table, d.index).numeric {
            d.rationale = Rationale::Numeric;
        } else {
            d.is_phase = true;
            d.rationale = Rationale::NonNumericFallback;
        }
    }
    decisions
}

/// Classify every column from `start` onward and collect the phase columns.
pub fn detect_phase_columns(table: &Table, start: usize, rules: &PhaseRules) -> PhaseDetection {
    let cols: Vec<usize> = (start..table.columns().len()).collect();
    let decisions = match rules.strategy {
        DetectionStrategy::Heuristic => cols
            .iter()
            .map(|&c| classify_column(table, c, rules))
            .collect(),
        DetectionStrategy::Keyword => keyword_decisions(table, &cols, rules),
    };

    let mut phase_columns: Vec<String> = Vec::new();
    for d in &decisions {
        debug!(column = %d.column, is_phase = d.is_phase, rationale = %d.rationale, "phase rule");
        if d.is_phase && !phase_columns.contains(&d.column) {
            phase_columns.push(d.column.clone());
        }
    }

    if phase_columns.is_empty() {
        warn!(start, "no phase columns detected");
    } else {
        info!(count = phase_columns.len(), columns = ?phase_columns, "phase columns detected");
    }
    PhaseDetection {
        decisions,
        phase_columns,
    }
}
