// The whole report as a pure function of an already-loaded table and the
// run parameters. Nothing here touches the filesystem.
use serde::Serialize;
use tracing::info;

use crate::classify::classify_table;
use crate::config::ReportConfig;
use crate::months::{available_months, filter_months};
use crate::phases::{detect_phase_columns, PhaseDetection};
use crate::pivot::{build_all, consolidated, PivotTable};
use crate::reports::{fact_nofact_by_month, headline_kpis, kpi_by_month};
use crate::types::{Dataset, FactNoFactRow, HeadlineKpis, KpiMesRow, PhaseGroupRow, Table};

#[derive(Debug, Clone)]
pub struct Report {
    /// Filtered rows and their derived fields.
    pub dataset: Dataset,
    /// Every month present before filtering.
    pub available_months: Vec<String>,
    /// Months left after filtering, in pivot column order.
    pub months: Vec<String>,
    pub detection: PhaseDetection,
    pub pivots: Vec<PivotTable>,
    pub consolidated: Vec<PhaseGroupRow>,
    pub headline: HeadlineKpis,
    pub kpi_mes: Vec<KpiMesRow>,
    pub fact_nofact: Vec<FactNoFactRow>,
}

/// JSON-friendly subset of a [`Report`].
#[derive(Debug, Serialize)]
pub struct ReportSummary<'a> {
    pub headline: &'a HeadlineKpis,
    pub available_months: &'a [String],
    pub months: &'a [String],
    pub phase_detection: &'a PhaseDetection,
    pub kpi_mes: &'a [KpiMesRow],
}

impl Report {
    pub fn summary(&self) -> ReportSummary<'_> {
        ReportSummary {
            headline: &self.headline,
            available_months: &self.available_months,
            months: &self.months,
            phase_detection: &self.detection,
            kpi_mes: &self.kpi_mes,
        }
    }
}

/// Classify, filter, detect phases, pivot and summarize.
///
/// `selected_months` empty means "all months".
pub fn build_report(table: Table, cfg: &ReportConfig, selected_months: &[String]) -> Report {
    let (all, cols) = classify_table(table, cfg);
    let available = available_months(&all);
    let dataset = filter_months(&all, selected_months);
    drop(all);

    let months = available_months(&dataset);
    let detection = detect_phase_columns(&dataset.table, cols.phase_start, &cfg.phases);
    let pivots = build_all(&dataset, &detection.phase_columns, &months);
    let consolidated = consolidated(&pivots);
    info!(
        months = months.len(),
        pivots = pivots.len(),
        "report built"
    );

    Report {
        headline: headline_kpis(&dataset),
        kpi_mes: kpi_by_month(&dataset),
        fact_nofact: fact_nofact_by_month(&dataset),
        available_months: available,
        months,
        detection,
        pivots,
        consolidated,
        dataset,
    }
}
