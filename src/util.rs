// Utility helpers for text normalization, forgiving number parsing and
// number rendering.
//
// Spreadsheet exports are messy: accents are inconsistent, numbers arrive
// as text with currency symbols and thousands separators. Everything that
// deals with that lives here so the classifiers can work on clean values.
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::types::Cell;

static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9\-,\.]").unwrap());

/// Lower-case, trim and strip diacritics (`"Verificación"` -> `"verificacion"`).
pub fn normalize_text(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Parse a monetary text value.
///
/// - Drops everything that is not a digit, `-`, `,` or `.` (currency
///   symbols, spaces, letters).
/// - Removes `,` thousands separators.
/// - Returns `None` for anything that still does not parse.
pub fn parse_money(s: &str) -> Option<f64> {
    let cleaned = NON_NUMERIC.replace_all(s, "").replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Numeric value of a cell for the value column; unparseable cells are 0.
pub fn cell_money(cell: &Cell) -> f64 {
    match cell {
        Cell::Number(n) if n.is_finite() => *n,
        Cell::Text(s) => parse_money(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Integer quantity of a cell; fractional values are truncated and
/// anything non-numeric is 0.
pub fn cell_quantity(cell: &Cell) -> i64 {
    let v = match cell {
        Cell::Number(n) => Some(*n),
        Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Cell::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match v {
        Some(n) if n.is_finite() => n.trunc() as i64,
        _ => 0,
    }
}

/// Render a cell number the way a person typed it: `3.0` -> `3`.
pub fn format_cell_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus `,` thousands separators (e.g., `1,234,567.89`).
    let s = format!("{:.*}", decimals, n.abs());
    let neg = n < 0.0 && s.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// Money in console previews: no decimals, thousands separators.
pub fn format_money(n: f64) -> String {
    format_number(n, 0)
}

/// Ratio (0..=1) rendered as a percentage with one decimal.
pub fn format_ratio(r: f64) -> String {
    format!("{}%", format_number(r * 100.0, 1))
}

/// Safe division used by every average and share; `0` when `den` is 0.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_accents_and_case() {
        assert_eq!(normalize_text("  Verificación "), "verificacion");
        assert_eq!(normalize_text("ETAPA"), "etapa");
    }

    #[test]
    fn money_parsing_is_forgiving() {
        assert_eq!(parse_money("$ 1,234.50"), Some(1234.5));
        assert_eq!(parse_money("-20"), Some(-20.0));
        assert_eq!(parse_money("n/a"), None);
        assert_eq!(cell_money(&Cell::Text("abc".into())), 0.0);
        assert_eq!(cell_money(&Cell::Number(7.5)), 7.5);
        assert_eq!(cell_money(&Cell::Empty), 0.0);
    }

    #[test]
    fn quantity_truncates() {
        assert_eq!(cell_quantity(&Cell::Number(2.9)), 2);
        assert_eq!(cell_quantity(&Cell::Text(" 4 ".into())), 4);
        assert_eq!(cell_quantity(&Cell::Text("cuatro".into())), 0);
        assert_eq!(cell_quantity(&Cell::Empty), 0);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_money(-1500.0), "-1,500");
        assert_eq!(format_money(0.0), "0");
        assert_eq!(format_ratio(0.25), "25.0%");
        assert_eq!(format_int(9855), "9,855");
    }

    #[test]
    fn rounding_carries_into_grouped_digits() {
        assert_eq!(format_number(999_999.996, 2), "1,000,000.00");
        assert_eq!(format_money(1_999.5), "2,000");
        assert_eq!(format_number(-0.004, 2), "0.00");
        assert_eq!(format_number(-1234.5, 1), "-1,234.5");
        assert_eq!(format_ratio(1.0 / 3.0), "33.3%");
    }

    #[test]
    fn integers_of_any_width_get_separators() {
        assert_eq!(format_int(0usize), "0");
        assert_eq!(format_int(12_345_678u64), "12,345,678");
        assert_eq!(format_int(-4_500i64), "-4,500");
    }

    #[test]
    fn cell_numbers_drop_integral_decimals() {
        assert_eq!(format_cell_number(3.0), "3");
        assert_eq!(format_cell_number(-12.0), "-12");
        assert_eq!(format_cell_number(2.5), "2.5");
        assert_eq!(format_cell_number(1e16), "10000000000000000");
    }

    #[test]
    fn ratio_guards_zero() {
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(ratio(5.0, 2.0), 2.5);
    }
}
