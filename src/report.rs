// src/report.rs
use crate::models::ClassifiedEntry;
use std::fmt::Write;

pub const CSV_HEADER: &str = "Date,Height,TokenQty,TXID,Vout";

/// Render entries as CSV, in the order given. A title, when present, goes on
/// its own line above the header.
pub fn render_csv(title: Option<&str>, entries: &[ClassifiedEntry]) -> String {
    let mut out = String::new();
    if let Some(title) = title {
        let _ = writeln!(out, "{title}:");
    }
    out.push_str(CSV_HEADER);
    out.push('\n');

    for e in entries {
        let _ = writeln!(
            out,
            "{},{},{},{},{}",
            e.date,
            e.height,
            e.amount.normalize(),
            e.txid,
            e.vout
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn entry(txid: &str, amount: &str, vout: u32, height: i64) -> ClassifiedEntry {
        ClassifiedEntry {
            txid: txid.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            vout,
            height,
            date: "2020-12-01T10:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn empty_report_is_just_the_header() {
        assert_eq!(render_csv(None, &[]), "Date,Height,TokenQty,TXID,Vout\n");
    }

    #[test]
    fn rows_keep_classifier_order_and_trim_zeros() {
        let csv = render_csv(
            Some("Inflows"),
            &[entry("bb", "12.50000000", 2, 160), entry("aa", "0.00000001", 1, 150)],
        );
        assert_eq!(
            csv,
            "Inflows:\n\
             Date,Height,TokenQty,TXID,Vout\n\
             2020-12-01T10:00:00.000Z,160,12.5,bb,2\n\
             2020-12-01T10:00:00.000Z,150,0.00000001,aa,1\n"
        );
    }
}
