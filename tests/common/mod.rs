#![allow(dead_code)]

use async_trait::async_trait;
use slp_flow_metrics::models::{
    AddressBalance, AddressRole, TokenDescriptor, TokenId, TransferType, TxData, TxHistoryEntry,
    TxInput, TxOutput, Utxo, WatchedAddress, Watchlist,
};
use slp_flow_metrics::parser::SlpParseError;
use slp_flow_metrics::{DecodeError, Indexer, IndexerError, TokenDecoder};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub const SOURCE: &str = "bitcoincash:qrnn49rx0p4xh78tts79utf0zv26vyru6vqtl9trd3";
pub const SINK: &str = "bitcoincash:qzhrpmu7nruyfcemeanqh5leuqcnf6zkjq4qm9nqh0";
pub const ALICE: &str = "bitcoincash:qqh793x9au6ehvh7r2zflzguanlme760wuzehgzjh9";
pub const BOB: &str = "bitcoincash:qp3sn6vlwz28ntmf3wmyra7jqttfx7z6zgtkygjhc7";
pub const PSF: &str = "38e97c5d7d3585a2cbf3f9580c82ca33985f9cb0845d4dcce220cb709f9538b0";

/// 2020-12-01T10:00:00Z
pub const BLOCK_TIME: i64 = 1_606_816_800;

pub fn watchlist() -> Watchlist {
    Watchlist {
        source: WatchedAddress::new(AddressRole::LiquiditySource, SOURCE),
        sink: WatchedAddress::new(AddressRole::LiquiditySink, SINK),
        token_id: PSF.parse().unwrap(),
    }
}

pub fn psf_send(amounts: &[u64]) -> TokenDescriptor {
    TokenDescriptor {
        token_id: PSF.parse().unwrap(),
        token_type: 1,
        transfer_type: TransferType::Send,
        amounts: amounts.to_vec(),
    }
}

pub fn other_token_send(amounts: &[u64]) -> TokenDescriptor {
    TokenDescriptor {
        token_id: TokenId::from_bytes([0x42; 32]),
        ..psf_send(amounts)
    }
}

pub fn txid(n: u8) -> String {
    hex_byte(n).repeat(32)
}

fn hex_byte(n: u8) -> String {
    format!("{n:02x}")
}

/// Transaction detail; output 0 is the OP_RETURN when `outputs[0]` is `None`.
pub fn tx_data(id: &str, inputs: &[&str], outputs: &[Option<&str>]) -> TxData {
    TxData {
        txid: id.to_string(),
        time: Some(BLOCK_TIME),
        vin: inputs
            .iter()
            .enumerate()
            .map(|(i, a)| TxInput {
                txid: Some(format!("{id}-parent{i}")),
                vout: Some(1),
                address: Some(a.to_string()),
                token_qty: None,
            })
            .collect(),
        vout: outputs
            .iter()
            .enumerate()
            .map(|(n, a)| TxOutput {
                n: n as u32,
                script_hex: String::new(),
                address: a.map(String::from),
                token_qty: None,
            })
            .collect(),
    }
}

/// In-memory indexer and decoder with call recording and failure injection.
#[derive(Default)]
pub struct MockChain {
    history: HashMap<String, Vec<TxHistoryEntry>>,
    descriptors: HashMap<String, TokenDescriptor>,
    txs: HashMap<String, TxData>,
    hydrated: HashMap<String, TxData>,
    balances: HashMap<String, AddressBalance>,
    utxos: HashMap<String, Vec<Utxo>>,
    spent: HashSet<(String, u32)>,
    broken_txs: HashSet<String>,
    history_failures: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token transaction to an address history.
    pub fn token_tx(
        &mut self,
        address: &str,
        height: i64,
        descriptor: TokenDescriptor,
        data: TxData,
    ) -> &mut Self {
        self.descriptors.insert(data.txid.clone(), descriptor);
        self.plain_tx(address, height, data)
    }

    /// Add a transaction that carries no SLP descriptor.
    pub fn plain_tx(&mut self, address: &str, height: i64, data: TxData) -> &mut Self {
        self.history
            .entry(address.to_string())
            .or_default()
            .push(TxHistoryEntry {
                tx_hash: data.txid.clone(),
                height,
            });
        self.txs.insert(data.txid.clone(), data);
        self
    }

    pub fn hydrated(&mut self, data: TxData) -> &mut Self {
        self.hydrated.insert(data.txid.clone(), data);
        self
    }

    pub fn balance(&mut self, address: &str, confirmed: i64, unconfirmed: i64) -> &mut Self {
        self.balances.insert(
            address.to_string(),
            AddressBalance {
                confirmed,
                unconfirmed,
            },
        );
        self
    }

    pub fn utxos(&mut self, address: &str, utxos: Vec<Utxo>) -> &mut Self {
        self.utxos.insert(address.to_string(), utxos);
        self
    }

    pub fn spent(&mut self, txid: &str, vout: u32) -> &mut Self {
        self.spent.insert((txid.to_string(), vout));
        self
    }

    /// Detail lookups for `txid` fail with a transport error.
    pub fn broken(&mut self, txid: &str) -> &mut Self {
        self.broken_txs.insert(txid.to_string());
        self
    }

    /// The next `n` history lookups fail.
    pub fn fail_history(&self, n: u32) {
        self.history_failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<String> {
        let prefix = format!("{method}:");
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(String::from))
            .collect()
    }

    fn record(&self, method: &str, arg: &str) {
        self.calls.lock().unwrap().push(format!("{method}:{arg}"));
    }

    fn unavailable(what: &str) -> IndexerError {
        IndexerError::Status {
            status: 429,
            body: format!("rate limited: {what}"),
        }
    }
}

#[async_trait]
impl Indexer for MockChain {
    async fn transactions(&self, address: &str) -> Result<Vec<TxHistoryEntry>, IndexerError> {
        self.record("transactions", address);
        let remaining = self.history_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.history_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Self::unavailable(address));
        }
        Ok(self.history.get(address).cloned().unwrap_or_default())
    }

    async fn balance(&self, address: &str) -> Result<AddressBalance, IndexerError> {
        self.record("balance", address);
        self.balances
            .get(address)
            .copied()
            .ok_or_else(|| IndexerError::Unsuccessful(address.to_string()))
    }

    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, IndexerError> {
        self.record("utxos", address);
        Ok(self.utxos.get(address).cloned().unwrap_or_default())
    }

    async fn is_unspent(&self, txid: &str, vout: u32) -> Result<bool, IndexerError> {
        self.record("is_unspent", txid);
        Ok(!self.spent.contains(&(txid.to_string(), vout)))
    }

    async fn tx_data(&self, txid: &str) -> Result<TxData, IndexerError> {
        self.record("tx_data", txid);
        if self.broken_txs.contains(txid) {
            return Err(Self::unavailable(txid));
        }
        self.txs
            .get(txid)
            .cloned()
            .ok_or_else(|| IndexerError::Malformed(format!("unknown tx {txid}")))
    }

    async fn tx_data_slp(&self, txid: &str) -> Result<TxData, IndexerError> {
        self.record("tx_data_slp", txid);
        self.hydrated
            .get(txid)
            .cloned()
            .ok_or_else(|| IndexerError::Malformed(format!("unknown tx {txid}")))
    }
}

#[async_trait]
impl TokenDecoder for MockChain {
    async fn decode_op_return(&self, txid: &str) -> Result<TokenDescriptor, DecodeError> {
        self.record("decode", txid);
        self.descriptors
            .get(txid)
            .cloned()
            .ok_or(DecodeError::NotToken(SlpParseError::NotSlp))
    }
}
