use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::Datelike;
use tracing::{info, warn};

use crate::types::{Cell, ClassifiedRecord, Dataset};
use crate::util::{format_cell_number, normalize_text};

const MONTH_NAMES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Month label of a cell; `None` for blank cells.
///
/// Real dates collapse to `YYYY-MM` so every day of a month lands in the
/// same bucket.
pub fn cell_month(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        Cell::Text(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Cell::Number(n) => Some(format_cell_number(*n)),
        Cell::Bool(b) => Some(b.to_string()),
        Cell::Date(d) => Some(format!("{:04}-{:02}", d.year(), d.month())),
    }
}

fn calendar_position(month: &str) -> Option<usize> {
    let n = normalize_text(month);
    MONTH_NAMES
        .iter()
        .position(|m| *m == n || (n == "setiembre" && *m == "septiembre"))
}

/// Spanish month names in calendar order first, then everything else
/// (`2024-01`, `Sin mes`, ...) lexicographically.
pub fn compare_months(a: &str, b: &str) -> Ordering {
    match (calendar_position(a), calendar_position(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

pub fn sort_months<I>(months: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let unique: BTreeSet<String> = months.into_iter().collect();
    let mut out: Vec<String> = unique.into_iter().collect();
    out.sort_by(|a, b| compare_months(a, b));
    out
}

/// Distinct `month` values of the dataset, ordered.
pub fn available_months(ds: &Dataset) -> Vec<String> {
    sort_months(ds.records.iter().map(|r| r.month.clone()))
}

/// Keep only records whose month is selected.
///
/// An empty selection keeps everything. Unknown months in the selection are
/// reported and otherwise ignored.
pub fn filter_months(ds: &Dataset, selection: &[String]) -> Dataset {
    if selection.is_empty() {
        return ds.clone();
    }
    let available = available_months(ds);
    for m in selection {
        if !available.contains(m) {
            warn!(month = %m, "selected month not present in data");
        }
    }

    let kept: Vec<&ClassifiedRecord> = ds
        .records
        .iter()
        .filter(|r| selection.contains(&r.month))
        .collect();
    let rows: Vec<usize> = kept.iter().map(|r| r.row).collect();
    let table = ds.table.select_rows(&rows);
    let records = kept
        .into_iter()
        .enumerate()
        .map(|(i, r)| ClassifiedRecord {
            row: i,
            ..r.clone()
        })
        .collect();
    info!(
        before = ds.records.len(),
        after = rows.len(),
        "month filter applied"
    );
    Dataset { table, records }
}
