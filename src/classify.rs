// Record normalization and billing classification.
use tracing::info;

use crate::columns::{resolve_columns, ResolvedColumns};
use crate::config::ReportConfig;
use crate::months::cell_month;
use crate::types::{Billing, Cell, ClassifiedRecord, Dataset, Table};
use crate::util::{cell_money, cell_quantity};

pub const NO_STATUS: &str = "Sin estado";
pub const NO_MONTH: &str = "Sin mes";

const NEGATING_TOKENS: [&str; 3] = ["no factur", "sin factur", "no aplica"];
const BILLED_TOKEN: &str = "factur";

/// Bucket a free-text billing status.
///
/// Negating tokens take precedence over the positive token, so
/// `"facturado / no facturado"` is `NoFacturado`. A non-empty invoice
/// number forces `Facturado` regardless of the text.
pub fn classify_billing(status: &str, has_invoice: bool) -> Billing {
    if has_invoice {
        return Billing::Facturado;
    }
    let lc = status.to_lowercase();
    let negated = NEGATING_TOKENS.iter().any(|t| lc.contains(t));
    if !negated && lc.contains(BILLED_TOKEN) {
        Billing::Facturado
    } else {
        Billing::NoFacturado
    }
}

fn status_text(cell: &Cell) -> String {
    if cell.is_blank() {
        NO_STATUS.to_string()
    } else {
        cell.to_string().trim().to_string()
    }
}

fn month_text(table: &Table, row: usize, col: Option<usize>) -> String {
    match col {
        Some(c) => cell_month(table.cell(row, c)).unwrap_or_else(|| NO_MONTH.to_string()),
        None => NO_MONTH.to_string(),
    }
}

fn classify_row(table: &Table, cols: &ResolvedColumns, row: usize) -> ClassifiedRecord {
    let quantity = match &cols.quantity {
        Some(c) => cell_quantity(table.cell(row, c.index)),
        None => 1,
    };
    let value = match &cols.value {
        Some(c) => cell_money(table.cell(row, c.index)),
        None => 0.0,
    };
    let status = match &cols.status {
        Some(c) => status_text(table.cell(row, c.index)),
        None => NO_STATUS.to_string(),
    };
    let has_invoice = cols
        .invoice
        .map(|c| !table.cell(row, c).is_blank())
        .unwrap_or(false);
    let billing = classify_billing(&status, has_invoice);
    let month = month_text(table, row, cols.month);
    let service_month = match cols.service_month {
        Some(_) => month_text(table, row, cols.service_month),
        None => month.clone(),
    };

    ClassifiedRecord {
        row,
        quantity,
        value,
        status,
        billing,
        month,
        service_month,
    }
}

/// Normalize every row of `table` into a [`Dataset`].
///
/// Returns the resolved column positions as well; phase detection needs
/// the phase boundary from them.
pub fn classify_table(table: Table, cfg: &ReportConfig) -> (Dataset, ResolvedColumns) {
    let cols = resolve_columns(&table, cfg);
    let records: Vec<ClassifiedRecord> = (0..table.len())
        .map(|row| classify_row(&table, &cols, row))
        .collect();
    let billed = records
        .iter()
        .filter(|r| r.billing == Billing::Facturado)
        .count();
    info!(
        records = records.len(),
        billed,
        not_billed = records.len() - billed,
        "records classified"
    );
    (Dataset { table, records }, cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn billing_tokens() {
        assert_eq!(classify_billing("Facturado", false), Billing::Facturado);
        assert_eq!(classify_billing("FACTURADA EN MARZO", false), Billing::Facturado);
        assert_eq!(classify_billing("No Facturado", false), Billing::NoFacturado);
        assert_eq!(classify_billing("sin facturar", false), Billing::NoFacturado);
        assert_eq!(classify_billing("No aplica factura", false), Billing::NoFacturado);
        assert_eq!(classify_billing("Pendiente", false), Billing::NoFacturado);
        assert_eq!(classify_billing(NO_STATUS, false), Billing::NoFacturado);
    }

    #[test]
    fn negation_beats_positive_token() {
        assert_eq!(
            classify_billing("facturado / no facturado", false),
            Billing::NoFacturado
        );
    }

    #[test]
    fn invoice_number_forces_billed() {
        assert_eq!(classify_billing("No Facturado", true), Billing::Facturado);
        assert_eq!(classify_billing("", true), Billing::Facturado);
    }

    #[test]
    fn classification_is_total() {
        let statuses = ["", "x", "factur", "no factur", "Sin Facturar", "facturado"];
        for s in statuses {
            for inv in [false, true] {
                let b = classify_billing(s, inv);
                assert!(Billing::ALL.iter().filter(|x| **x == b).count() == 1);
            }
        }
    }

    #[test]
    fn missing_columns_degrade_to_defaults() {
        let mut t = Table::new(["Fase"]);
        t.push_row(vec![Cell::Text("F1".into())]);
        let mut cfg = ReportConfig::default();
        cfg.roles.quantity.letter = None;
        cfg.roles.value.letter = None;
        cfg.roles.status.letter = None;

        let (ds, _) = classify_table(t, &cfg);
        let r = &ds.records[0];
        assert_eq!(r.quantity, 1);
        assert_eq!(r.value, 0.0);
        assert_eq!(r.status, NO_STATUS);
        assert_eq!(r.billing, Billing::NoFacturado);
        assert_eq!(r.month, NO_MONTH);
        assert_eq!(r.service_month, NO_MONTH);
    }

    #[test]
    fn rows_are_normalized_from_named_columns() {
        let mut t = Table::new([
            "Cantidad Procedimientos",
            "Valor Servicio",
            "Estado Facturacion",
            "Mes Servicio",
            "Mes Facturacion",
            "Factura",
        ]);
        t.push_row(vec![
            Cell::Number(2.0),
            Cell::Text("$ 1,500".into()),
            Cell::Text(" Pendiente ".into()),
            Cell::Text(" Enero ".into()),
            Cell::Text("Febrero".into()),
            Cell::Text("FE-991".into()),
        ]);
        let mut cfg = ReportConfig::default();
        cfg.month_basis = crate::config::MonthBasis::Facturacion;

        let (ds, cols) = classify_table(t, &cfg);
        assert_eq!(cols.invoice, Some(5));
        let r = &ds.records[0];
        assert_eq!(r.quantity, 2);
        assert_eq!(r.value, 1500.0);
        assert_eq!(r.status, "Pendiente");
        assert_eq!(r.billing, Billing::Facturado);
        assert_eq!(r.month, "Febrero");
        assert_eq!(r.service_month, "Enero");
    }
}
