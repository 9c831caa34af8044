use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::fmt;
use tabled::Tabled;

use crate::util::{format_cell_number, format_money, format_ratio};

/// A single spreadsheet cell after loading.
///
/// Loaders (xlsx via calamine, csv via the csv crate) map their own cell
/// representations onto this enum so the rest of the pipeline never sees
/// a library-specific type.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl Cell {
    /// Empty cells and whitespace-only text both count as "no value".
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => f.write_str(&format_cell_number(*n)),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Date(d) => {
                if d.hour() == 0 && d.minute() == 0 && d.second() == 0 {
                    write!(f, "{}", d.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))
                }
            }
        }
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

/// Column added by the loader holding the file each row came from.
pub const SOURCE_COLUMN: &str = "__archivo__";

/// Column-ordered table with unique header names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build an empty table from raw header cells.
    ///
    /// Blank headers become `Unnamed: <index>` and repeated headers are
    /// suffixed `.1`, `.2`, ... so every column name is unique.
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut columns: Vec<String> = Vec::new();
        for (idx, h) in headers.into_iter().enumerate() {
            let h: String = h.into();
            let base = if h.trim().is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                h
            };
            let mut name = base.clone();
            let mut n = 1;
            while columns.contains(&name) {
                name = format!("{}.{}", base, n);
                n += 1;
            }
            columns.push(name);
        }
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding with empty cells or dropping overflow so the
    /// row always matches the header width.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn column_cells(&self, col: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |r| r.get(col).unwrap_or(&EMPTY_CELL))
    }

    /// Add (or overwrite) a column holding the same value on every row.
    pub fn with_constant_column(mut self, name: &str, value: Cell) -> Self {
        match self.column_index(name) {
            Some(idx) => {
                for r in &mut self.rows {
                    r[idx] = value.clone();
                }
            }
            None => {
                self.columns.push(name.to_string());
                for r in &mut self.rows {
                    r.push(value.clone());
                }
            }
        }
        self
    }

    /// Keep only the rows at the given indices, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|i| self.rows.get(*i).cloned())
                .collect(),
        }
    }

    /// Stack tables vertically, aligning columns by name.
    ///
    /// The resulting header is the union of all headers in first-seen
    /// order; cells for columns a table does not have are left empty.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for t in &tables {
            for c in &t.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }
        let mut out = Table {
            columns,
            rows: Vec::new(),
        };
        for t in tables {
            let mapping: Vec<Option<usize>> = out
                .columns
                .iter()
                .map(|c| t.column_index(c))
                .collect();
            for row in t.rows {
                let aligned = mapping
                    .iter()
                    .map(|m| m.and_then(|i| row.get(i).cloned()).unwrap_or_default())
                    .collect();
                out.rows.push(aligned);
            }
        }
        out
    }
}

/// Billing bucket derived from the free-text status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Billing {
    #[serde(rename = "Facturado")]
    Facturado,
    #[serde(rename = "No Facturado")]
    NoFacturado,
}

impl Billing {
    pub const ALL: [Billing; 2] = [Billing::Facturado, Billing::NoFacturado];

    pub fn label(self) -> &'static str {
        match self {
            Billing::Facturado => "Facturado",
            Billing::NoFacturado => "No Facturado",
        }
    }
}

impl fmt::Display for Billing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived fields for one table row. `row` indexes into the owning
/// [`Dataset`]'s table.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub row: usize,
    pub quantity: i64,
    pub value: f64,
    pub status: String,
    pub billing: Billing,
    pub month: String,
    pub service_month: String,
}

/// A table together with one classified record per row.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub table: Table,
    pub records: Vec<ClassifiedRecord>,
}

impl Dataset {
    /// Phase value of a record in the given column; blank cells yield `None`.
    pub fn phase_value(&self, record: &ClassifiedRecord, col: usize) -> Option<String> {
        let cell = self.table.cell(record.row, col);
        if cell.is_blank() {
            None
        } else {
            Some(cell.to_string())
        }
    }
}

/// One (month, phase value) group of a phase pivot.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct PhaseGroupRow {
    #[serde(rename = "Columna_Fase")]
    #[tabled(rename = "Columna_Fase")]
    pub phase_column: String,
    #[serde(rename = "Mes")]
    #[tabled(rename = "Mes")]
    pub month: String,
    #[serde(rename = "Fase")]
    #[tabled(rename = "Fase", display_with = "display_phase")]
    pub phase: Option<String>,
    #[serde(rename = "Cant_Reg")]
    #[tabled(rename = "Cant_Reg")]
    pub cant_reg: i64,
    #[serde(rename = "Vlr_Servicio")]
    #[tabled(rename = "Vlr_Servicio", display_with = "display_money")]
    pub vlr_servicio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct KpiMesRow {
    #[serde(rename = "Mes")]
    #[tabled(rename = "Mes")]
    pub month: String,
    #[serde(rename = "Cant_Facturado")]
    #[tabled(rename = "Cant_Facturado")]
    pub cant_facturado: i64,
    #[serde(rename = "Cant_No_Facturado")]
    #[tabled(rename = "Cant_No_Facturado")]
    pub cant_no_facturado: i64,
    #[serde(rename = "Valor_Facturado")]
    #[tabled(rename = "Valor_Facturado", display_with = "display_money")]
    pub valor_facturado: f64,
    #[serde(rename = "Valor_No_Facturado")]
    #[tabled(rename = "Valor_No_Facturado", display_with = "display_money")]
    pub valor_no_facturado: f64,
    #[serde(rename = "Cant_Serv_Total")]
    #[tabled(rename = "Cant_Serv_Total")]
    pub cant_serv_total: i64,
    #[serde(rename = "Valor_Total")]
    #[tabled(rename = "Valor_Total", display_with = "display_money")]
    pub valor_total: f64,
    #[serde(rename = "Valor_Promedio_Servicio")]
    #[tabled(rename = "Valor_Promedio_Servicio", display_with = "display_money")]
    pub valor_promedio_servicio: f64,
    #[serde(rename = "%_Valor_Facturado")]
    #[tabled(rename = "%_Valor_Facturado", display_with = "display_ratio")]
    pub pct_valor_facturado: f64,
    #[serde(rename = "%_Valor_No_Facturado")]
    #[tabled(rename = "%_Valor_No_Facturado", display_with = "display_ratio")]
    pub pct_valor_no_facturado: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct FactNoFactRow {
    #[serde(rename = "Mes")]
    #[tabled(rename = "Mes")]
    pub month: String,
    #[serde(rename = "Estado_Fact")]
    #[tabled(rename = "Estado_Fact")]
    pub estado_fact: Billing,
    #[serde(rename = "Cant_Serv")]
    #[tabled(rename = "Cant_Serv")]
    pub cant_serv: i64,
    #[serde(rename = "Vlr_Servicio")]
    #[tabled(rename = "Vlr_Servicio", display_with = "display_money")]
    pub vlr_servicio: f64,
}

/// Headline numbers shown after loading and written to the JSON summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadlineKpis {
    pub registros: i64,
    pub valor_total: f64,
    pub valor_facturado: f64,
    pub valor_no_facturado: f64,
}

fn display_money(v: &f64) -> String {
    format_money(*v)
}

fn display_ratio(v: &f64) -> String {
    format_ratio(*v)
}

fn display_phase(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn headers_are_made_unique() {
        let t = Table::new(["Fase", "", "Fase", "Fase"]);
        assert_eq!(t.columns(), &["Fase", "Unnamed: 1", "Fase.1", "Fase.2"]);
    }

    #[test]
    fn push_row_pads_to_width() {
        let mut t = Table::new(["a", "b", "c"]);
        t.push_row(vec![Cell::Number(1.0)]);
        assert_eq!(t.cell(0, 2), &Cell::Empty);
        assert_eq!(t.cell(9, 9), &Cell::Empty);
    }

    #[test]
    fn concat_takes_union_of_columns() {
        let mut a = Table::new(["Mes", "Valor"]);
        a.push_row(vec![Cell::Text("Enero".into()), Cell::Number(10.0)]);
        let mut b = Table::new(["Valor", "Fase"]);
        b.push_row(vec![Cell::Number(5.0), Cell::Text("F1".into())]);

        let t = Table::concat(vec![a, b]);
        assert_eq!(t.columns(), &["Mes", "Valor", "Fase"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(1, 0), &Cell::Empty);
        assert_eq!(t.cell(1, 1), &Cell::Number(5.0));
        assert_eq!(t.cell(1, 2), &Cell::Text("F1".into()));
    }

    #[test]
    fn cell_display_drops_integral_decimals() {
        assert_eq!(Cell::Number(3.0).to_string(), "3");
        assert_eq!(Cell::Number(2.5).to_string(), "2.5");
        assert_eq!(Cell::Empty.to_string(), "");
    }

    #[test]
    fn constant_column_is_appended() {
        let mut t = Table::new(["a"]);
        t.push_row(vec![Cell::Number(1.0)]);
        let t = t.with_constant_column("__archivo__", Cell::Text("x.xlsx".into()));
        assert_eq!(t.columns(), &["a", "__archivo__"]);
        assert_eq!(t.cell(0, 1), &Cell::Text("x.xlsx".into()));
    }
}
