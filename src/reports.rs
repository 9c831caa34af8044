use std::collections::HashMap;

use crate::months::sort_months;
use crate::types::{Billing, Dataset, FactNoFactRow, HeadlineKpis, KpiMesRow};
use crate::util::{format_int, format_money, ratio};

pub fn headline_kpis(ds: &Dataset) -> HeadlineKpis {
    let mut kpis = HeadlineKpis {
        registros: 0,
        valor_total: 0.0,
        valor_facturado: 0.0,
        valor_no_facturado: 0.0,
    };
    for r in &ds.records {
        kpis.registros += r.quantity;
        kpis.valor_total += r.value;
        match r.billing {
            Billing::Facturado => kpis.valor_facturado += r.value,
            Billing::NoFacturado => kpis.valor_no_facturado += r.value,
        }
    }
    kpis
}

/// One-line banner shown after filtering.
pub fn headline_message(k: &HeadlineKpis) -> String {
    format!(
        "Registros filtrados: {} | Valor: ${} | Facturado: ${} | No Facturado: ${}",
        format_int(k.registros),
        format_money(k.valor_total),
        format_money(k.valor_facturado),
        format_money(k.valor_no_facturado)
    )
}

/// Quantity and value per (service month, billing bucket).
fn by_service_month(ds: &Dataset) -> HashMap<(String, Billing), (i64, f64)> {
    let mut map: HashMap<(String, Billing), (i64, f64)> = HashMap::new();
    for r in &ds.records {
        let e = map
            .entry((r.service_month.clone(), r.billing))
            .or_insert((0, 0.0));
        e.0 += r.quantity;
        e.1 += r.value;
    }
    map
}

/// `KPI_Mes`: per service month, both billing buckets side by side.
pub fn kpi_by_month(ds: &Dataset) -> Vec<KpiMesRow> {
    let map = by_service_month(ds);
    let months = sort_months(map.keys().map(|(m, _)| m.clone()));
    months
        .into_iter()
        .map(|month| {
            let get = |b: Billing| map.get(&(month.clone(), b)).copied().unwrap_or((0, 0.0));
            let (cant_f, val_f) = get(Billing::Facturado);
            let (cant_nf, val_nf) = get(Billing::NoFacturado);
            let cant_total = cant_f + cant_nf;
            let val_total = val_f + val_nf;
            KpiMesRow {
                month,
                cant_facturado: cant_f,
                cant_no_facturado: cant_nf,
                valor_facturado: val_f,
                valor_no_facturado: val_nf,
                cant_serv_total: cant_total,
                valor_total: val_total,
                valor_promedio_servicio: ratio(val_total, cant_total as f64),
                pct_valor_facturado: ratio(val_f, val_total),
                pct_valor_no_facturado: ratio(val_nf, val_total),
            }
        })
        .collect()
}

/// `Fact_NoFact_por_Mes`: only the (month, bucket) pairs that occur.
pub fn fact_nofact_by_month(ds: &Dataset) -> Vec<FactNoFactRow> {
    let map = by_service_month(ds);
    let months = sort_months(map.keys().map(|(m, _)| m.clone()));
    let mut rows = Vec::new();
    for month in months {
        for b in Billing::ALL {
            if let Some((cant, val)) = map.get(&(month.clone(), b)) {
                rows.push(FactNoFactRow {
                    month: month.clone(),
                    estado_fact: b,
                    cant_serv: *cant,
                    vlr_servicio: *val,
                });
            }
        }
    }
    rows
}
