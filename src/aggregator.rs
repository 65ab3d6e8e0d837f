use chrono::Utc;
use eyre::Result;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{info, warn};

use crate::models::NetFlow;

#[derive(Default)]
struct Totals {
    inflow: Decimal,
    outflow: Decimal,
    burned: Decimal,
    last_height: i64,
}

/// Recompute per-token net flow (`inflow - outflow - burned`) from stored flows.
pub fn update_netflows(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT token_id, kind, amount, height FROM flows")?;

    // Amounts are summed as Decimal; SQLite REAL would lose the 8th place.
    let mut totals: HashMap<String, Totals> = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    for row in rows {
        let (token_id, kind, amount, height) = row?;
        let amount = match Decimal::from_str(&amount) {
            Ok(a) => a,
            Err(e) => {
                warn!("Unparseable amount '{}' for {}: {}", amount, token_id, e);
                continue;
            }
        };

        let t = totals.entry(token_id).or_default();
        match kind.as_str() {
            "inflow" => t.inflow += amount,
            "outflow" => t.outflow += amount,
            "burn" => t.burned += amount,
            _ => continue,
        }
        t.last_height = t.last_height.max(height);
    }

    let now = Utc::now().to_rfc3339();
    for (token_id, t) in totals {
        let net = t.inflow - t.outflow - t.burned;
        conn.execute(
            "
            INSERT INTO netflows (token_id, inflow, outflow, burned, net, last_height, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(token_id) DO UPDATE SET
                inflow = excluded.inflow,
                outflow = excluded.outflow,
                burned = excluded.burned,
                net = excluded.net,
                last_height = excluded.last_height,
                updated_at = excluded.updated_at
            ",
            params![
                token_id,
                t.inflow.to_string(),
                t.outflow.to_string(),
                t.burned.to_string(),
                net.to_string(),
                t.last_height,
                now
            ],
        )?;

        info!("Updated netflow for {} => {}", token_id, net);
    }

    Ok(())
}

/// Stored net flow of one token, if any flows were recorded.
pub fn netflow(conn: &Connection, token_id: &str) -> Result<Option<NetFlow>> {
    let row = conn
        .query_row(
            "SELECT token_id, inflow, outflow, burned, net, last_height, updated_at
             FROM netflows WHERE LOWER(token_id) = LOWER(?1)",
            [token_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    [
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                    ],
                    r.get::<_, i64>(5)?,
                    r.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((token_id, amounts, last_height, updated_at)) = row else {
        return Ok(None);
    };
    let [inflow, outflow, burned, net] = amounts.map(|s| stored_amount(&token_id, &s));
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Some(NetFlow {
        token_id,
        inflow,
        outflow,
        burned,
        net,
        last_height,
        updated_at,
    }))
}

fn stored_amount(token_id: &str, raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_else(|e| {
        warn!("Unparseable netflow amount '{}' for {}: {}", raw, token_id, e);
        Decimal::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, tests::memory_db};
    use crate::models::{ClassifiedEntry, FlowKind, TokenId};

    const PSF: &str = "38e97c5d7d3585a2cbf3f9580c82ca33985f9cb0845d4dcce220cb709f9538b0";

    fn record(conn: &Connection, kind: FlowKind, txid: &str, amount: &str, height: i64) {
        let token: TokenId = PSF.parse().unwrap();
        let entry = ClassifiedEntry {
            txid: txid.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            vout: 1,
            height,
            date: "2020-12-01T10:00:00.000Z".to_string(),
        };
        db::record_entry(conn, kind, &token, &entry).unwrap();
    }

    #[test]
    fn net_is_inflow_minus_outflow_minus_burn() {
        let conn = memory_db();
        record(&conn, FlowKind::Inflow, "a", "100.00000001", 150);
        record(&conn, FlowKind::Inflow, "b", "0.00000002", 151);
        record(&conn, FlowKind::Outflow, "c", "40", 170);
        record(&conn, FlowKind::Burn, "d", "5.5", 160);

        update_netflows(&conn).unwrap();
        let nf = netflow(&conn, &PSF.to_uppercase()).unwrap().unwrap();

        assert_eq!(nf.inflow, Decimal::from_str("100.00000003").unwrap());
        assert_eq!(nf.outflow, Decimal::from(40));
        assert_eq!(nf.burned, Decimal::from_str("5.5").unwrap());
        assert_eq!(nf.net, Decimal::from_str("54.50000003").unwrap());
        assert_eq!(nf.last_height, 170);
    }

    #[test]
    fn corrupt_netflow_amount_reads_as_zero() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO netflows (token_id, inflow, outflow, burned, net, last_height, updated_at)
             VALUES (?1, '7', 'garbage', '1', '6', 150, '2020-12-01T10:00:00Z')",
            [PSF],
        )
        .unwrap();

        let nf = netflow(&conn, PSF).unwrap().unwrap();
        assert_eq!(nf.inflow, Decimal::from(7));
        assert_eq!(nf.outflow, Decimal::ZERO);
        assert_eq!(nf.net, Decimal::from(6));
    }

    #[test]
    fn unknown_token_has_no_netflow() {
        let conn = memory_db();
        update_netflows(&conn).unwrap();
        assert!(netflow(&conn, PSF).unwrap().is_none());
    }
}
