// Wide "TD" pivot: one row per phase value, a (Cant. Reg, Vlr. Servicio)
// pair per month, then the Total pair.
use std::collections::HashMap;
use std::ops::AddAssign;

use serde::Serialize;
use tracing::warn;

use crate::months::compare_months;
use crate::types::{Dataset, PhaseGroupRow};

pub const PHASE_HEADER: &str = "Fase";
pub const CANT_REG: &str = "Cant. Reg";
pub const VLR_SERVICIO: &str = "Vlr. Servicio";
pub const TOTAL: &str = "Total";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Measures {
    pub cant_reg: i64,
    pub vlr_servicio: f64,
}

impl AddAssign for Measures {
    fn add_assign(&mut self, rhs: Self) {
        self.cant_reg += rhs.cant_reg;
        self.vlr_servicio += rhs.vlr_servicio;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub phase: String,
    /// Parallel to [`PivotTable::months`].
    pub months: Vec<Measures>,
    pub total: Measures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub phase_column: String,
    pub months: Vec<String>,
    pub rows: Vec<PivotRow>,
    /// Long-format (month, phase) groups the pivot was built from,
    /// including groups whose phase value is blank.
    pub groups: Vec<PhaseGroupRow>,
}

impl PivotTable {
    /// Flattened column headers: `Fase`, `<month> — <metric>` ..., `Total — <metric>`.
    pub fn headers(&self) -> Vec<String> {
        let mut out = vec![PHASE_HEADER.to_string()];
        for m in self.months.iter().map(String::as_str).chain([TOTAL]) {
            out.push(format!("{} — {}", m, CANT_REG));
            out.push(format!("{} — {}", m, VLR_SERVICIO));
        }
        out
    }

    pub fn row(&self, phase: &str) -> Option<&PivotRow> {
        self.rows.iter().find(|r| r.phase == phase)
    }

    /// Cell for a (phase, month) pair; `None` only when the phase or the
    /// month is not part of the table.
    pub fn cell(&self, phase: &str, month: &str) -> Option<Measures> {
        let idx = self.months.iter().position(|m| m == month)?;
        self.row(phase).map(|r| r.months[idx])
    }

    pub fn grand_total(&self) -> Measures {
        let mut t = Measures::default();
        for r in &self.rows {
            t += r.total;
        }
        t
    }
}

/// Build the pivot of `phase_column` over the given months.
///
/// Months absent for a phase value are zero; the Total pair sums every
/// grouped month of that phase value.
pub fn build_pivot(ds: &Dataset, phase_column: &str, months: &[String]) -> PivotTable {
    let col = ds.table.column_index(phase_column);
    if col.is_none() {
        warn!(column = phase_column, "phase column not in table");
    }

    let mut grouped: HashMap<(String, Option<String>), Measures> = HashMap::new();
    for r in &ds.records {
        let phase = col.and_then(|c| ds.phase_value(r, c));
        *grouped.entry((r.month.clone(), phase)).or_default() += Measures {
            cant_reg: r.quantity,
            vlr_servicio: r.value,
        };
    }
    let mut keys: Vec<(String, Option<String>)> = grouped.keys().cloned().collect();
    // Blank phase values go last within a month.
    keys.sort_by(|a, b| {
        compare_months(&a.0, &b.0)
            .then_with(|| a.1.is_none().cmp(&b.1.is_none()))
            .then_with(|| a.1.cmp(&b.1))
    });

    let mut phases: Vec<String> = Vec::new();
    for (_, phase) in &keys {
        if let Some(p) = phase {
            if !phases.contains(p) {
                phases.push(p.clone());
            }
        }
    }
    let mut totals: HashMap<&str, Measures> = HashMap::new();
    for ((_, phase), m) in &grouped {
        if let Some(p) = phase {
            *totals.entry(p.as_str()).or_default() += *m;
        }
    }

    let rows = phases
        .iter()
        .map(|p| PivotRow {
            phase: p.clone(),
            months: months
                .iter()
                .map(|m| {
                    grouped
                        .get(&(m.clone(), Some(p.clone())))
                        .copied()
                        .unwrap_or_default()
                })
                .collect(),
            total: totals.get(p.as_str()).copied().unwrap_or_default(),
        })
        .collect();

    let groups = keys
        .into_iter()
        .map(|key| {
            let m = grouped[&key];
            PhaseGroupRow {
                phase_column: phase_column.to_string(),
                month: key.0,
                phase: key.1,
                cant_reg: m.cant_reg,
                vlr_servicio: m.vlr_servicio,
            }
        })
        .collect();

    PivotTable {
        phase_column: phase_column.to_string(),
        months: months.to_vec(),
        rows,
        groups,
    }
}

/// One pivot per detected phase column, in detection order.
pub fn build_all(ds: &Dataset, phase_columns: &[String], months: &[String]) -> Vec<PivotTable> {
    phase_columns
        .iter()
        .map(|c| build_pivot(ds, c, months))
        .collect()
}

/// Long-format groups of every pivot stacked together (`TD_FASES_TODAS`).
pub fn consolidated(pivots: &[PivotTable]) -> Vec<PhaseGroupRow> {
    pivots.iter().flat_map(|p| p.groups.iter().cloned()).collect()
}
