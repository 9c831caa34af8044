// Run configuration.
//
// Every field has a default matching the usual "Base de Datos" export
// layout, so a config file only needs the keys that differ. The CLI
// applies its flags on top of whatever was loaded.
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Which month column defines the `_MES_` of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MonthBasis {
    #[default]
    Servicio,
    Facturacion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    /// Keyword match, or textual columns with a bounded number of distinct values.
    #[default]
    Heuristic,
    /// Keyword match only, falling back to every non-numeric column.
    Keyword,
}

/// How to find one column: by header name first, by spreadsheet letter second.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleSpec {
    pub name: Option<String>,
    pub letter: Option<String>,
}

impl RoleSpec {
    fn letter(letter: &str) -> Self {
        RoleSpec {
            name: None,
            letter: Some(letter.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ColumnRoles {
    pub quantity: RoleSpec,
    pub value: RoleSpec,
    pub status: RoleSpec,
    /// First column considered for phase detection.
    pub phase_start: RoleSpec,
    /// Header of the invoice-number column; a value there forces "Facturado".
    pub invoice: String,
    pub service_month: String,
    pub billing_month: String,
}

impl Default for ColumnRoles {
    fn default() -> Self {
        ColumnRoles {
            quantity: RoleSpec::letter("K"),
            value: RoleSpec::letter("W"),
            status: RoleSpec::letter("AH"),
            phase_start: RoleSpec::letter("X"),
            invoice: "Factura".to_string(),
            service_month: "Mes Servicio".to_string(),
            billing_month: "Mes Facturacion".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PhaseRules {
    pub strategy: DetectionStrategy,
    /// Header fragments (accent/case-insensitive) that mark a phase column.
    pub keywords: Vec<String>,
    pub min_distinct: usize,
    pub max_distinct_floor: usize,
    pub max_distinct_ratio: f64,
}

impl Default for PhaseRules {
    fn default() -> Self {
        PhaseRules {
            strategy: DetectionStrategy::Heuristic,
            keywords: vec!["fase".into(), "verific".into(), "etapa".into()],
            min_distinct: 2,
            max_distinct_floor: 200,
            max_distinct_ratio: 0.8,
        }
    }
}

impl PhaseRules {
    /// Upper bound on distinct values: `max(floor, ratio × rows)`.
    pub fn max_distinct(&self, row_count: usize) -> usize {
        let scaled = (self.max_distinct_ratio * row_count as f64).floor() as usize;
        scaled.max(self.max_distinct_floor)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Preferred sheet; the first sheet is used when it is missing.
    pub sheet_name: String,
    pub month_basis: MonthBasis,
    pub roles: ColumnRoles,
    pub phases: PhaseRules,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            sheet_name: "Base de Datos".to_string(),
            month_basis: MonthBasis::Servicio,
            roles: ColumnRoles::default(),
            phases: PhaseRules::default(),
        }
    }
}

impl ReportConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ReportError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Header of the month column selected by `month_basis`.
    pub fn month_column(&self) -> &str {
        match self.month_basis {
            MonthBasis::Servicio => &self.roles.service_month,
            MonthBasis::Facturacion => &self.roles.billing_month,
        }
    }
}
