use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use tracing::{error, info, warn};

use crate::error::{ReportError, Result};
use crate::types::{Cell, Table, SOURCE_COLUMN};

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub files_loaded: usize,
    pub total_rows: usize,
    /// Files that could not be read, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

fn data_to_cell(d: &Data) -> Cell {
    match d {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => Cell::Date(ndt),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso(s).map(Cell::Date).unwrap_or_else(|| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// First row is the header; the rest are data rows.
///
/// A range starts at its first used cell, so leading empty columns are
/// put back in front; column letters keep pointing at the sheet's columns.
pub fn range_to_table(range: &Range<Data>) -> Table {
    let lead = range.start().map(|(_, col)| col as usize).unwrap_or(0);
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(h) => std::iter::repeat(String::new())
            .take(lead)
            .chain(h.iter().map(|c| data_to_cell(c).to_string()))
            .collect(),
        None => return Table::default(),
    };
    let mut table = Table::new(headers);
    for row in rows {
        let cells: Vec<Cell> = std::iter::repeat(Cell::Empty)
            .take(lead)
            .chain(row.iter().map(data_to_cell))
            .collect();
        if cells.iter().all(Cell::is_blank) {
            continue;
        }
        table.push_row(cells);
    }
    table
}

fn read_workbook(path: &Path, preferred_sheet: &str) -> Result<Table> {
    let spreadsheet = |source| ReportError::Spreadsheet {
        path: path.to_path_buf(),
        source,
    };
    let mut workbook = open_workbook_auto(path).map_err(spreadsheet)?;
    let names = workbook.sheet_names();
    let sheet = if names.iter().any(|n| n == preferred_sheet) {
        preferred_sheet.to_string()
    } else {
        let first = names.first().cloned().ok_or_else(|| ReportError::NoSheets {
            path: path.to_path_buf(),
        })?;
        warn!(file = %path.display(), sheet = %first, "preferred sheet '{}' missing; using first sheet", preferred_sheet);
        first
    };
    let range = workbook.worksheet_range(&sheet).map_err(spreadsheet)?;
    Ok(range_to_table(&range))
}

fn csv_cell(field: &str) -> Cell {
    let t = field.trim();
    if t.is_empty() {
        Cell::Empty
    } else if let Ok(n) = t.parse::<f64>() {
        Cell::Number(n)
    } else {
        Cell::Text(field.to_string())
    }
}

fn read_csv(path: &Path) -> Result<Table> {
    let csv_err = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let headers: Vec<String> = rdr
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();
    let mut table = Table::new(headers);
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        table.push_row(record.iter().map(csv_cell).collect());
    }
    Ok(table)
}

/// Read one input file into a table tagged with its file name.
pub fn load_file(path: &Path, preferred_sheet: &str) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let table = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path, preferred_sheet)?,
        "csv" => read_csv(path)?,
        _ => {
            return Err(ReportError::UnsupportedExtension {
                path: path.to_path_buf(),
            })
        }
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archivo.xlsx".to_string());
    Ok(table.with_constant_column(SOURCE_COLUMN, Cell::Text(name)))
}

/// Load every file, skipping the ones that fail, and stack the rest.
///
/// Fails with [`ReportError::NoInput`] only when nothing could be read.
pub fn load_all(paths: &[PathBuf], preferred_sheet: &str) -> Result<(Table, LoadReport)> {
    let mut report = LoadReport::default();
    let mut tables = Vec::new();
    for path in paths {
        match load_file(path, preferred_sheet) {
            Ok(t) => {
                info!(file = %path.display(), rows = t.len(), "file loaded");
                report.files_loaded += 1;
                report.total_rows += t.len();
                tables.push(t);
            }
            Err(e) => {
                error!(file = %path.display(), "skipping file: {}", e);
                report.failures.push((path.clone(), e.to_string()));
            }
        }
    }
    if tables.is_empty() {
        return Err(ReportError::NoInput);
    }
    Ok((Table::concat(tables), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::letter_to_index;
    use pretty_assertions::assert_eq;

    #[test]
    fn csv_files_are_typed_and_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enero.csv");
        std::fs::write(
            &path,
            "Mes Servicio,Valor,Fase\nEnero,\"1,200\",F1\nEnero,300,\n",
        )
        .unwrap();

        let t = load_file(&path, "Base de Datos").unwrap();
        assert_eq!(t.columns(), &["Mes Servicio", "Valor", "Fase", SOURCE_COLUMN]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(0, 1), &Cell::Text("1,200".into()));
        assert_eq!(t.cell(1, 1), &Cell::Number(300.0));
        assert_eq!(t.cell(1, 2), &Cell::Empty);
        assert_eq!(t.cell(1, 3), &Cell::Text("enero.csv".into()));
    }

    #[test]
    fn unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("ok.csv");
        std::fs::write(&good, "Mes Servicio,Fase\nEnero,F1\n").unwrap();
        let broken = dir.path().join("broken.xlsx");
        std::fs::write(&broken, "this is not a zip").unwrap();
        let unknown = dir.path().join("notes.txt");
        std::fs::write(&unknown, "hola").unwrap();

        let (t, report) = load_all(&[broken, good, unknown], "Base de Datos").unwrap();
        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn empty_leading_column_keeps_letter_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desplazado.xlsx");
        let mut wb = rust_xlsxwriter::Workbook::new();
        let ws = wb.add_worksheet();
        ws.set_name("Base de Datos").unwrap();
        for c in 1..=34u16 {
            ws.write_string(0, c, format!("c{}", c)).unwrap();
            ws.write_number(1, c, f64::from(c)).unwrap();
        }
        wb.save(&path).unwrap();

        let t = load_file(&path, "Base de Datos").unwrap();
        assert_eq!(&t.columns()[..3], &["Unnamed: 0", "c1", "c2"]);
        let k = letter_to_index("K").unwrap();
        let x = letter_to_index("X").unwrap();
        assert_eq!(t.columns()[k], "c10");
        assert_eq!(t.columns()[x], "c23");
        assert_eq!(t.cell(0, 0), &Cell::Empty);
        assert_eq!(t.cell(0, k), &Cell::Number(10.0));
    }

    #[test]
    fn nothing_loaded_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.csv");
        let err = load_all(&[missing], "Base de Datos").unwrap_err();
        assert!(matches!(err, ReportError::NoInput));
    }
}
