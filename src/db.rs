use crate::models::{ClassifiedEntry, FlowKind, FlowReport, StoredFlow, TokenId};
use eyre::Result;
use rusqlite::{params, Connection};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS flows (
  id         INTEGER PRIMARY KEY AUTOINCREMENT,
  kind       TEXT NOT NULL CHECK (kind IN ('inflow','outflow','burn')),
  token_id   TEXT NOT NULL,
  txid       TEXT NOT NULL,
  vout       INTEGER NOT NULL,
  amount     TEXT NOT NULL, -- Decimal stored as string
  height     INTEGER NOT NULL,
  date       TEXT NOT NULL,
  UNIQUE(kind, txid, vout)
);

CREATE TABLE IF NOT EXISTS netflows (
  token_id     TEXT NOT NULL PRIMARY KEY,
  inflow       TEXT NOT NULL,
  outflow      TEXT NOT NULL,
  burned       TEXT NOT NULL,
  net          TEXT NOT NULL,
  last_height  INTEGER NOT NULL,
  updated_at   TEXT NOT NULL
);
"#;

/// Connect to SQLite (with WAL mode for performance)
pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INIT_SQL)?;
    Ok(())
}

/// Insert or update one classified entry
pub fn record_entry(
    conn: &Connection,
    kind: FlowKind,
    token_id: &TokenId,
    entry: &ClassifiedEntry,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO flows (kind, token_id, txid, vout, amount, height, date)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(kind, txid, vout) DO UPDATE SET
            amount = excluded.amount,
            height = excluded.height,
            date   = excluded.date
        "#,
        params![
            kind.as_str(),
            token_id.to_string(),
            entry.txid,
            entry.vout,
            entry.amount.to_string(),
            entry.height,
            entry.date
        ],
    )?;
    Ok(())
}

/// Store a whole report in one transaction. Returns the number of rows written.
pub fn record_report(conn: &mut Connection, token_id: &TokenId, report: &FlowReport) -> Result<usize> {
    let tx = conn.transaction()?;
    for entry in &report.entries {
        record_entry(&tx, report.kind, token_id, entry)?;
    }
    tx.commit()?;
    Ok(report.entries.len())
}

/// Most recent flows, optionally of one kind.
pub fn recent_flows(conn: &Connection, kind: Option<FlowKind>, limit: u32) -> Result<Vec<StoredFlow>> {
    let mut stmt = conn.prepare(
        "SELECT kind, token_id, txid, vout, amount, height, date
         FROM flows
         WHERE ?1 IS NULL OR kind = ?1
         ORDER BY height DESC, id DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![kind.map(|k| k.as_str()), limit as i64], |r| {
        Ok(StoredFlow {
            kind: r.get(0)?,
            token_id: r.get(1)?,
            txid: r.get(2)?,
            vout: r.get(3)?,
            amount: r.get(4)?,
            height: r.get(5)?,
            date: r.get(6)?,
        })
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
