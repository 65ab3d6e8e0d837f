// src/classifier.rs
//
// Inflow / outflow / burn classification of SLP transfers through the two
// liquidity addresses. Each call fetches one address history, keeps the
// strict height window, walks it newest-first and applies one rule per
// transaction. Calls are sequential with a pause between transactions so the
// indexer is not throttled.

use crate::models::{
    iso8601_from_unix, to_token_units, ClassifiedEntry, FlowKind, FlowReport, TokenDescriptor,
    TxData, TxHistoryEntry, WatchedAddress, Watchlist,
};
use crate::rpc::{DecodeError, Indexer, IndexerError, TokenDecoder};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid block window: start {start} must be below stop {stop}")]
    InvalidWindow { start: i64, stop: i64 },

    #[error("indexer failure: {0}")]
    Indexer(#[from] IndexerError),
}

/// Delay applied between consecutive transactions of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    delay: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(1000))
    }
}

/// Round to 8 decimal places, ties away from zero.
pub fn round8(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(8, RoundingStrategy::MidpointAwayFromZero)
}

/// Keep `start < height < stop`, newest first. The sort is stable, so
/// transactions within one block keep the indexer's order.
pub fn select_window(history: Vec<TxHistoryEntry>, start: i64, stop: i64) -> Vec<TxHistoryEntry> {
    let mut window: Vec<TxHistoryEntry> = history
        .into_iter()
        .filter(|t| t.height > start && t.height < stop)
        .collect();
    window.sort_by(|a, b| b.height.cmp(&a.height));
    window
}

/// Token units carried by output `vout`; `None` when absent or zero.
fn output_amount(descriptor: &TokenDescriptor, vout: usize) -> Option<Decimal> {
    descriptor
        .amount_for_output(vout)
        .filter(|raw| *raw != 0)
        .map(to_token_units)
}

fn is_address(addr: Option<&str>, watched: &WatchedAddress) -> bool {
    addr.is_some_and(|a| watched.matches(a))
}

fn entry_date(tx: &TxData) -> Option<String> {
    let date = tx.time.and_then(iso8601_from_unix);
    if date.is_none() {
        debug!("{} has no block time, skipping", tx.txid);
    }
    date
}

/// Tokens arriving at the liquidity source from a third party.
///
/// A transaction with the source address among its inputs is an outgoing or
/// internal transfer; it is dropped as a whole at the first matching output.
pub fn inflow_entries(
    watch: &Watchlist,
    item: &TxHistoryEntry,
    descriptor: &TokenDescriptor,
    tx: &TxData,
) -> Vec<ClassifiedEntry> {
    let mut entries = Vec::new();
    if descriptor.token_id != watch.token_id {
        return entries;
    }
    let Some(date) = entry_date(tx) else {
        return entries;
    };

    for (j, out) in tx.vout.iter().enumerate() {
        if !is_address(out.address.as_deref(), &watch.source) {
            continue;
        }
        // zero or missing amount: transfer between the liquidity addresses
        let Some(amount) = output_amount(descriptor, j) else {
            continue;
        };
        if tx
            .vin
            .iter()
            .any(|input| is_address(input.address.as_deref(), &watch.source))
        {
            break;
        }
        entries.push(ClassifiedEntry {
            txid: item.tx_hash.clone(),
            amount,
            vout: j as u32,
            height: item.height,
            date: date.clone(),
        });
    }
    entries
}

/// Tokens leaving the liquidity sink: any token output not paying the sink.
///
/// Unlike inflows there is no input-side exclusion.
pub fn outflow_entries(
    watch: &Watchlist,
    item: &TxHistoryEntry,
    descriptor: &TokenDescriptor,
    tx: &TxData,
) -> Vec<ClassifiedEntry> {
    let mut entries = Vec::new();
    if descriptor.token_id != watch.token_id {
        return entries;
    }
    let Some(date) = entry_date(tx) else {
        return entries;
    };

    for (j, out) in tx.vout.iter().enumerate() {
        if out.address.is_none() || is_address(out.address.as_deref(), &watch.sink) {
            continue;
        }
        if let Some(amount) = output_amount(descriptor, j) {
            entries.push(ClassifiedEntry {
                txid: item.tx_hash.clone(),
                amount,
                vout: j as u32,
                height: item.height,
                date: date.clone(),
            });
        }
    }
    entries
}

/// Second output and second input both belong to the sink.
pub fn is_burn_candidate(watch: &Watchlist, descriptor: &TokenDescriptor, tx: &TxData) -> bool {
    descriptor.token_id == watch.token_id
        && is_address(
            tx.vout.get(1).and_then(|o| o.address.as_deref()),
            &watch.sink,
        )
        && is_address(
            tx.vin.get(1).and_then(|i| i.address.as_deref()),
            &watch.sink,
        )
}

/// `round8(sum(input token quantities) - amounts[0])`, from a token-hydrated view.
pub fn burn_amount(descriptor: &TokenDescriptor, hydrated: &TxData) -> Option<Decimal> {
    let input_total: Decimal = hydrated
        .vin
        .iter()
        .filter_map(|i| i.token_qty)
        .map(to_token_units)
        .sum();
    let output = to_token_units(*descriptor.amounts.first()?);
    Some(round8(input_total - output))
}

pub struct FlowClassifier {
    indexer: Arc<dyn Indexer>,
    decoder: Arc<dyn TokenDecoder>,
    watch: Watchlist,
    pacing: Pacing,
}

impl FlowClassifier {
    pub fn new(indexer: Arc<dyn Indexer>, decoder: Arc<dyn TokenDecoder>, watch: Watchlist) -> Self {
        Self {
            indexer,
            decoder,
            watch,
            pacing: Pacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watch
    }

    pub async fn classify_inflows(&self, start: i64, stop: i64) -> Result<FlowReport, FlowError> {
        self.classify(FlowKind::Inflow, start, stop).await
    }

    pub async fn classify_outflows(&self, start: i64, stop: i64) -> Result<FlowReport, FlowError> {
        self.classify(FlowKind::Outflow, start, stop).await
    }

    pub async fn classify_burns(&self, start: i64, stop: i64) -> Result<FlowReport, FlowError> {
        self.classify(FlowKind::Burn, start, stop).await
    }

    /// Classify every transaction of the relevant address inside `(start, stop)`.
    ///
    /// Non-token transactions are skipped; any indexer failure aborts the
    /// run without a partial report.
    pub async fn classify(
        &self,
        kind: FlowKind,
        start: i64,
        stop: i64,
    ) -> Result<FlowReport, FlowError> {
        if start >= stop {
            return Err(FlowError::InvalidWindow { start, stop });
        }

        let address = match kind {
            FlowKind::Inflow => &self.watch.source,
            FlowKind::Outflow | FlowKind::Burn => &self.watch.sink,
        };
        let history = self.indexer.transactions(&address.address).await?;
        let window = select_window(history, start, stop);
        info!(
            "Classifying {} for {}: {} transactions in ({}, {})",
            kind,
            address.address,
            window.len(),
            start,
            stop
        );

        let mut report = FlowReport::new(kind, start, stop);
        for (i, item) in window.iter().enumerate() {
            if i > 0 {
                self.pacing.pause().await;
            }

            let descriptor = match self.decoder.decode_op_return(&item.tx_hash).await {
                Ok(d) => d,
                Err(DecodeError::NotToken(e)) => {
                    debug!("Skipping {}: {}", item.tx_hash, e);
                    continue;
                }
                Err(DecodeError::Indexer(e)) => return Err(e.into()),
            };
            if descriptor.token_id != self.watch.token_id {
                debug!("Skipping {}: token {}", item.tx_hash, descriptor.token_id);
                continue;
            }

            let tx = self.indexer.tx_data(&item.tx_hash).await?;
            let entries = match kind {
                FlowKind::Inflow => inflow_entries(&self.watch, item, &descriptor, &tx),
                FlowKind::Outflow => outflow_entries(&self.watch, item, &descriptor, &tx),
                FlowKind::Burn => self
                    .burn_entry(item, &descriptor, &tx)
                    .await?
                    .into_iter()
                    .collect(),
            };

            for entry in entries {
                info!(
                    "{} {} at {}:{} (block {})",
                    kind, entry.amount, entry.txid, entry.vout, entry.height
                );
                report.push(entry);
            }
        }

        info!("Total {}: {}", kind, report.total);
        Ok(report)
    }

    async fn burn_entry(
        &self,
        item: &TxHistoryEntry,
        descriptor: &TokenDescriptor,
        tx: &TxData,
    ) -> Result<Option<ClassifiedEntry>, FlowError> {
        if !is_burn_candidate(&self.watch, descriptor, tx) {
            return Ok(None);
        }
        let Some(date) = entry_date(tx) else {
            return Ok(None);
        };

        let hydrated = self.indexer.tx_data_slp(&item.tx_hash).await?;
        let amount = match burn_amount(descriptor, &hydrated) {
            Some(a) if a > Decimal::ZERO => a,
            other => {
                debug!("{} burns nothing ({:?})", item.tx_hash, other);
                return Ok(None);
            }
        };

        Ok(Some(ClassifiedEntry {
            txid: item.tx_hash.clone(),
            amount,
            vout: 1,
            height: item.height,
            date,
        }))
    }
}
