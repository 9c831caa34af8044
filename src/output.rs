use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style, Table as TextTable, Tabled};

use crate::error::{ReportError, Result};
use crate::pipeline::Report;
use crate::pivot::{PivotTable, PHASE_HEADER};
use crate::types::{Cell, Dataset, FactNoFactRow, KpiMesRow, PhaseGroupRow};

static NOT_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]").unwrap());

/// Spreadsheet sheet names are limited to 31 chars; `TD_` plus the phase
/// part must stay under that.
const PHASE_SHEET_LEN: usize = 25;
const MAX_SHEET_LEN: usize = 31;

pub const BASE_SHEET: &str = "Base_Filtrada";
pub const KPI_SHEET: &str = "KPI_Mes";
pub const FACT_SHEET: &str = "Fact_NoFact_por_Mes";
pub const ALL_PHASES_SHEET: &str = "TD_FASES_TODAS";

const DERIVED_HEADERS: [&str; 5] = ["_VALOR_", "_CANT_PROC_", "_ESTADO_", "_FACTURADO_", "_MES_"];

/// Phase part of a pivot sheet name: `[A-Za-z0-9_]`, at most 25 chars.
pub fn sanitize_sheet_name(name: &str) -> String {
    let s: String = NOT_ALNUM
        .replace_all(name, "_")
        .chars()
        .take(PHASE_SHEET_LEN)
        .collect();
    if s.is_empty() {
        PHASE_HEADER.to_string()
    } else {
        s
    }
}

/// `TD_<sanitized>`, suffixed `_2`, `_3`, ... when two phase columns
/// sanitize to the same name. Comparison is case-insensitive like Excel.
pub fn pivot_sheet_name(phase_column: &str, used: &mut HashSet<String>) -> String {
    let base = format!("TD_{}", sanitize_sheet_name(phase_column));
    let mut name = base.clone();
    let mut n = 2;
    while used.contains(&name.to_lowercase()) {
        let suffix = format!("_{}", n);
        let keep = base.len().min(MAX_SHEET_LEN - suffix.len());
        name = format!("{}{}", &base[..keep], suffix);
        n += 1;
    }
    used.insert(name.to_lowercase());
    name
}

/// Rows that know how to lay themselves out as sheet cells.
trait SheetRow {
    const HEADERS: &'static [&'static str];
    fn cells(&self) -> Vec<Cell>;
}

impl SheetRow for KpiMesRow {
    const HEADERS: &'static [&'static str] = &[
        "Mes",
        "Cant_Facturado",
        "Cant_No_Facturado",
        "Valor_Facturado",
        "Valor_No_Facturado",
        "Cant_Serv_Total",
        "Valor_Total",
        "Valor_Promedio_Servicio",
        "%_Valor_Facturado",
        "%_Valor_No_Facturado",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.month.clone()),
            Cell::Number(self.cant_facturado as f64),
            Cell::Number(self.cant_no_facturado as f64),
            Cell::Number(self.valor_facturado),
            Cell::Number(self.valor_no_facturado),
            Cell::Number(self.cant_serv_total as f64),
            Cell::Number(self.valor_total),
            Cell::Number(self.valor_promedio_servicio),
            Cell::Number(self.pct_valor_facturado),
            Cell::Number(self.pct_valor_no_facturado),
        ]
    }
}

impl SheetRow for FactNoFactRow {
    const HEADERS: &'static [&'static str] = &["Mes", "Estado_Fact", "Cant_Serv", "Vlr_Servicio"];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.month.clone()),
            Cell::Text(self.estado_fact.label().to_string()),
            Cell::Number(self.cant_serv as f64),
            Cell::Number(self.vlr_servicio),
        ]
    }
}

impl SheetRow for PhaseGroupRow {
    const HEADERS: &'static [&'static str] =
        &["Columna_Fase", "Mes", "Fase", "Cant_Reg", "Vlr_Servicio"];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.phase_column.clone()),
            Cell::Text(self.month.clone()),
            self.phase.clone().map(Cell::Text).unwrap_or_default(),
            Cell::Number(self.cant_reg as f64),
            Cell::Number(self.vlr_servicio),
        ]
    }
}

fn header_format() -> Format {
    Format::new().set_bold()
}

fn write_header<S: AsRef<str>>(ws: &mut Worksheet, headers: &[S]) -> Result<()> {
    let hfmt = header_format();
    for (c, h) in headers.iter().enumerate() {
        ws.write_string_with_format(0, c as u16, h.as_ref(), &hfmt)?;
    }
    Ok(())
}

fn date_format() -> Format {
    Format::new().set_num_format("yyyy-mm-dd hh:mm:ss")
}

fn write_cell(ws: &mut Worksheet, row: u32, col: u16, cell: &Cell) -> Result<()> {
    match cell {
        Cell::Empty => {}
        Cell::Date(dt) => {
            ws.write_datetime_with_format(row, col, dt, &date_format())?;
        }
        Cell::Number(n) if n.is_finite() => {
            ws.write_number(row, col, *n)?;
        }
        Cell::Bool(b) => {
            ws.write_boolean(row, col, *b)?;
        }
        other => {
            ws.write_string(row, col, other.to_string())?;
        }
    }
    Ok(())
}

fn write_rows<I>(ws: &mut Worksheet, rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<Cell>>,
{
    for (i, cells) in rows.into_iter().enumerate() {
        let r = (i + 1) as u32;
        for (c, cell) in cells.iter().enumerate() {
            write_cell(ws, r, c as u16, cell)?;
        }
    }
    Ok(())
}

fn write_sheet<T: SheetRow>(workbook: &mut Workbook, name: &str, rows: &[T]) -> Result<()> {
    let ws = workbook.add_worksheet();
    ws.set_name(name)?;
    write_header(ws, T::HEADERS)?;
    write_rows(ws, rows.iter().map(T::cells))
}

/// Table columns followed by the derived ones.
fn base_rows(ds: &Dataset) -> impl Iterator<Item = Vec<Cell>> + '_ {
    ds.records.iter().map(move |r| {
        let mut cells = ds.table.rows()[r.row].clone();
        cells.extend([
            Cell::Number(r.value),
            Cell::Number(r.quantity as f64),
            Cell::Text(r.status.clone()),
            Cell::Text(r.billing.label().to_string()),
            Cell::Text(r.month.clone()),
        ]);
        cells
    })
}

fn pivot_rows(p: &PivotTable) -> impl Iterator<Item = Vec<Cell>> + '_ {
    p.rows.iter().map(|r| {
        let mut cells = vec![Cell::Text(r.phase.clone())];
        for m in r.months.iter().chain([&r.total]) {
            cells.push(Cell::Number(m.cant_reg as f64));
            cells.push(Cell::Number(m.vlr_servicio));
        }
        cells
    })
}

/// Sheet names of the workbook `write_workbook` produces, in order.
pub fn sheet_names(report: &Report) -> Vec<String> {
    let mut names = vec![
        BASE_SHEET.to_string(),
        KPI_SHEET.to_string(),
        FACT_SHEET.to_string(),
    ];
    let mut used: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
    used.insert(ALL_PHASES_SHEET.to_lowercase());
    for p in &report.pivots {
        names.push(pivot_sheet_name(&p.phase_column, &mut used));
    }
    if !report.pivots.is_empty() {
        names.push(ALL_PHASES_SHEET.to_string());
    }
    names
}

pub fn write_workbook(path: &Path, report: &Report) -> Result<()> {
    let names = sheet_names(report);
    let mut workbook = Workbook::new();

    let ws = workbook.add_worksheet();
    ws.set_name(BASE_SHEET)?;
    let mut headers: Vec<&str> = report
        .dataset
        .table
        .columns()
        .iter()
        .map(String::as_str)
        .collect();
    headers.extend(DERIVED_HEADERS);
    write_header(ws, &headers)?;
    write_rows(ws, base_rows(&report.dataset))?;

    write_sheet(&mut workbook, KPI_SHEET, &report.kpi_mes)?;
    write_sheet(&mut workbook, FACT_SHEET, &report.fact_nofact)?;

    for (pivot, name) in report.pivots.iter().zip(names.iter().skip(3)) {
        let ws = workbook.add_worksheet();
        ws.set_name(name)?;
        write_header(ws, &pivot.headers())?;
        write_rows(ws, pivot_rows(pivot))?;
    }
    if !report.pivots.is_empty() {
        write_sheet(&mut workbook, ALL_PHASES_SHEET, &report.consolidated)?;
    }

    workbook.save(path)?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

const NO_ROWS: &str = "(no rows)";

/// Markdown rendering of the first `max_rows` rows.
pub fn render_table_rows<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return NO_ROWS.to_string();
    }
    TextTable::new(slice).with(Style::markdown()).to_string()
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}\n", render_table_rows(rows, max_rows));
}

/// Markdown rendering of a pivot; its columns depend on the months present.
pub fn render_pivot(pivot: &PivotTable, max_rows: usize) -> String {
    if pivot.rows.is_empty() {
        return NO_ROWS.to_string();
    }
    let mut builder = Builder::default();
    builder.push_record(pivot.headers());
    for cells in pivot_rows(pivot).take(max_rows) {
        builder.push_record(cells.iter().map(|c| match c {
            Cell::Number(n) => crate::util::format_money(*n),
            other => other.to_string(),
        }));
    }
    builder.build().with(Style::markdown()).to_string()
}

pub fn preview_pivot(pivot: &PivotTable, max_rows: usize) {
    println!("{}\n", render_pivot(pivot, max_rows));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;
    use crate::pipeline::build_report;
    use crate::types::Table;
    use calamine::{open_workbook_auto, Data, Reader};
    use chrono::NaiveDate;

    fn dated_report() -> Report {
        let mut table = Table::new(["Mes Servicio", "Fecha Radicado"]);
        let dt = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        table.push_row(vec![Cell::Text("Marzo".into()), Cell::Date(dt)]);
        build_report(table, &ReportConfig::default(), &[])
    }

    #[test]
    fn date_cells_are_written_as_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fechas.xlsx");
        write_workbook(&path, &dated_report()).unwrap();

        let mut wb = open_workbook_auto(&path).unwrap();
        let base = wb.worksheet_range(BASE_SHEET).unwrap();
        match base.get_value((1, 1)) {
            Some(Data::DateTime(dt)) => {
                let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
                    .unwrap()
                    .and_hms_opt(0, 0, 0);
                assert_eq!(dt.as_datetime(), expected);
            }
            other => panic!("expected a date cell, got {:?}", other),
        }
    }

    #[test]
    fn previews_are_capped_markdown() {
        let report = dated_report();
        let kpi = render_table_rows(&report.kpi_mes, 3);
        let lines: Vec<&str> = kpi.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("| Mes"));
        assert!(lines[2].contains("Marzo"));

        assert_eq!(render_table_rows(&report.kpi_mes, 0), "(no rows)");
        assert_eq!(render_table_rows::<KpiMesRow>(&[], 3), "(no rows)");
    }

    #[test]
    fn pivot_preview_formats_money() {
        let pivot = PivotTable {
            phase_column: "Fase".into(),
            months: vec!["Enero".into()],
            rows: vec![crate::pivot::PivotRow {
                phase: "Radicada".into(),
                months: vec![crate::pivot::Measures {
                    cant_reg: 3,
                    vlr_servicio: 1234567.4,
                }],
                total: crate::pivot::Measures {
                    cant_reg: 3,
                    vlr_servicio: 1234567.4,
                },
            }],
            groups: Vec::new(),
        };
        let text = render_pivot(&pivot, 5);
        assert!(text.contains("Enero — Cant. Reg"));
        assert!(text.contains("| Radicada"));
        assert!(text.contains("1,234,567"));
        assert!(!text.contains("1234567"));
    }

    #[test]
    fn json_summary_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resumen.json");
        let report = dated_report();
        write_json(&path, &report.summary()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \""));
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["headline"]["registros"], 1);
    }

    #[test]
    fn json_into_a_directory_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_json(dir.path(), &dated_report().summary()).unwrap_err();
        match err {
            ReportError::Io { path, .. } => assert_eq!(path, dir.path()),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn sheet_names_are_alphanumeric_and_short() {
        let s = sanitize_sheet_name("Fase #1 (Verificación)");
        assert_eq!(s, "Fase__1__Verificaci_n_");
        assert!(s.len() <= 25);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));

        let long = sanitize_sheet_name("Verificación de la etapa administrativa final");
        assert_eq!(long.chars().count(), 25);
        assert_eq!(sanitize_sheet_name(""), "Fase");
    }

    #[test]
    fn colliding_sheet_names_get_suffixes() {
        let mut used = HashSet::new();
        let a = pivot_sheet_name("Fase 1", &mut used);
        let b = pivot_sheet_name("Fase-1", &mut used);
        let c = pivot_sheet_name("fase_1", &mut used);
        assert_eq!(a, "TD_Fase_1");
        assert_eq!(b, "TD_Fase_1_2");
        assert_eq!(c, "TD_fase_1_3");

        let long = "x".repeat(40);
        let first = pivot_sheet_name(&long, &mut used);
        let second = pivot_sheet_name(&long, &mut used);
        assert_eq!(first.len(), 28);
        assert!(second.len() <= 31);
        assert!(second.ends_with("_2"));
    }
}
