// Column role resolution.
//
// Exports are not consistent about header spelling, and some older files
// only agree on column *positions*. Each role is looked up by configured
// header, then by a built-in header heuristic, then by spreadsheet letter.
use std::fmt;

use tracing::{debug, warn};

use crate::config::{ReportConfig, RoleSpec};
use crate::types::Table;
use crate::util::normalize_text;

/// Zero-based index of a spreadsheet column letter (`A` -> 0, `AA` -> 26).
pub fn letter_to_index(letter: &str) -> Option<usize> {
    let letter = letter.trim();
    if letter.is_empty() {
        return None;
    }
    let mut idx: usize = 0;
    for ch in letter.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let v = (ch.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        idx = idx.checked_mul(26)?.checked_add(v)?;
    }
    Some(idx - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Quantity,
    Value,
    Status,
}

impl Role {
    /// Built-in header heuristic for the role.
    fn matches_header(self, header: &str) -> bool {
        let n = normalize_text(header);
        match self {
            Role::Quantity => n.contains("cantidad") && n.contains("proced"),
            Role::Value => {
                n.contains("valor")
                    && (n.contains("serv") || matches!(n.as_str(), "valor" | "valor total" | "valor unitario"))
            }
            Role::Status => {
                let compact: String = n.chars().filter(|c| !c.is_whitespace()).collect();
                compact.contains("estado") && compact.contains("factur")
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Quantity => "quantity",
            Role::Value => "value",
            Role::Status => "status",
        };
        f.write_str(s)
    }
}

/// Which lookup strategy found a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedBy {
    ConfiguredName,
    HeaderHeuristic,
    Letter(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub index: usize,
    pub name: String,
    pub by: ResolvedBy,
}

/// Header lookup that ignores case, accents and surrounding whitespace.
pub fn find_header(table: &Table, header: &str) -> Option<usize> {
    let wanted = normalize_text(header);
    table
        .columns()
        .iter()
        .position(|c| normalize_text(c) == wanted)
}

fn by_letter(table: &Table, spec: &RoleSpec) -> Option<ResolvedColumn> {
    let letter = spec.letter.as_deref()?;
    let index = letter_to_index(letter)?;
    let name = table.columns().get(index)?.clone();
    Some(ResolvedColumn {
        index,
        name,
        by: ResolvedBy::Letter(letter.to_uppercase()),
    })
}

pub fn resolve_role(table: &Table, role: Role, spec: &RoleSpec) -> Option<ResolvedColumn> {
    if let Some(name) = spec.name.as_deref() {
        match find_header(table, name) {
            Some(index) => {
                return Some(ResolvedColumn {
                    index,
                    name: table.columns()[index].clone(),
                    by: ResolvedBy::ConfiguredName,
                })
            }
            None => warn!(%role, header = name, "configured column not found"),
        }
    }
    if let Some(index) = table
        .columns()
        .iter()
        .position(|c| role.matches_header(c))
    {
        return Some(ResolvedColumn {
            index,
            name: table.columns()[index].clone(),
            by: ResolvedBy::HeaderHeuristic,
        });
    }
    by_letter(table, spec)
}

/// Every column position the normalizer and phase detector need.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumns {
    pub quantity: Option<ResolvedColumn>,
    pub value: Option<ResolvedColumn>,
    pub status: Option<ResolvedColumn>,
    pub invoice: Option<usize>,
    pub month: Option<usize>,
    pub service_month: Option<usize>,
    /// May point past the last column, which means "no phase candidates".
    pub phase_start: usize,
}

pub fn resolve_columns(table: &Table, cfg: &ReportConfig) -> ResolvedColumns {
    let roles = &cfg.roles;
    let quantity = resolve_role(table, Role::Quantity, &roles.quantity);
    let value = resolve_role(table, Role::Value, &roles.value);
    let status = resolve_role(table, Role::Status, &roles.status);

    for (role, col) in [
        (Role::Quantity, &quantity),
        (Role::Value, &value),
        (Role::Status, &status),
    ] {
        match col {
            Some(c) => debug!(%role, column = %c.name, by = ?c.by, "column resolved"),
            None => warn!(%role, "column not found; using default values"),
        }
    }

    let service_month = find_header(table, &roles.service_month);
    let month = find_header(table, cfg.month_column()).or(service_month);
    if month.is_none() {
        warn!(
            column = cfg.month_column(),
            "month column not found; every record is 'Sin mes'"
        );
    }

    let phase_start = roles
        .phase_start
        .name
        .as_deref()
        .and_then(|n| find_header(table, n))
        .or_else(|| roles.phase_start.letter.as_deref().and_then(letter_to_index))
        .unwrap_or(0);

    ResolvedColumns {
        quantity,
        value,
        status,
        invoice: find_header(table, &roles.invoice),
        month,
        service_month,
        phase_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wide_table(headers: &[&str]) -> Table {
        Table::new(headers.iter().copied())
    }

    #[test]
    fn letters_map_to_indices() {
        assert_eq!(letter_to_index("A"), Some(0));
        assert_eq!(letter_to_index("z"), Some(25));
        assert_eq!(letter_to_index("AA"), Some(26));
        assert_eq!(letter_to_index("AH"), Some(33));
        assert_eq!(letter_to_index("K"), Some(10));
        assert_eq!(letter_to_index("X"), Some(23));
        assert_eq!(letter_to_index(""), None);
        assert_eq!(letter_to_index("A1"), None);
    }

    #[test]
    fn configured_name_wins_over_heuristic_and_letter() {
        let t = wide_table(&["Valor Servicio", "Valor Neto"]);
        let spec = RoleSpec {
            name: Some("valor neto".into()),
            letter: Some("A".into()),
        };
        let c = resolve_role(&t, Role::Value, &spec).unwrap();
        assert_eq!(c.index, 1);
        assert_eq!(c.by, ResolvedBy::ConfiguredName);
    }

    #[test]
    fn heuristic_wins_over_letter() {
        let t = wide_table(&["Id", "Cantidad Procedimientos", "Estado de Facturación"]);
        let q = resolve_role(&t, Role::Quantity, &RoleSpec::default()).unwrap();
        assert_eq!((q.index, q.by), (1, ResolvedBy::HeaderHeuristic));
        let s = resolve_role(
            &t,
            Role::Status,
            &RoleSpec {
                name: None,
                letter: Some("A".into()),
            },
        )
        .unwrap();
        assert_eq!(s.index, 2);
    }

    #[test]
    fn letter_is_the_fallback() {
        let t = wide_table(&["a", "b", "c"]);
        let spec = RoleSpec {
            name: None,
            letter: Some("C".into()),
        };
        let c = resolve_role(&t, Role::Value, &spec).unwrap();
        assert_eq!(c.name, "c");
        assert_eq!(c.by, ResolvedBy::Letter("C".into()));

        let out_of_range = RoleSpec {
            name: None,
            letter: Some("W".into()),
        };
        assert_eq!(resolve_role(&t, Role::Value, &out_of_range), None);
    }

    #[test]
    fn month_falls_back_to_service_month() {
        let t = wide_table(&["Mes Servicio", "Fase"]);
        let mut cfg = ReportConfig::default();
        cfg.month_basis = crate::config::MonthBasis::Facturacion;
        let cols = resolve_columns(&t, &cfg);
        assert_eq!(cols.month, Some(0));
        assert_eq!(cols.service_month, Some(0));
        assert_eq!(cols.phase_start, 23);
    }
}
