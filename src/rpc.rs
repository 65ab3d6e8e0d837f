// src/rpc.rs
use crate::models::{
    AddressBalance, TokenDescriptor, TxData, TxHistoryEntry, TxInput, TxOutput, Utxo,
};
use crate::parser::{self, SlpParseError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("indexer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("indexer reported failure for {0}")]
    Unsuccessful(String),

    #[error("malformed indexer response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Expected for ordinary BCH transactions.
    #[error("not an SLP token transaction: {0}")]
    NotToken(#[from] SlpParseError),

    #[error(transparent)]
    Indexer(#[from] IndexerError),
}

/// Address history, balances and transaction detail.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Confirmed and mempool history of an address, in indexer order.
    async fn transactions(&self, address: &str) -> Result<Vec<TxHistoryEntry>, IndexerError>;

    async fn balance(&self, address: &str) -> Result<AddressBalance, IndexerError>;

    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, IndexerError>;

    /// Whether the full node still considers `txid:vout` unspent.
    async fn is_unspent(&self, txid: &str, vout: u32) -> Result<bool, IndexerError>;

    /// Transaction detail with every input's address resolved.
    async fn tx_data(&self, txid: &str) -> Result<TxData, IndexerError>;

    /// `tx_data` with token quantities on inputs and outputs.
    async fn tx_data_slp(&self, txid: &str) -> Result<TxData, IndexerError>;
}

#[async_trait]
pub trait TokenDecoder: Send + Sync {
    async fn decode_op_return(&self, txid: &str) -> Result<TokenDescriptor, DecodeError>;
}

// ---------- wire types ----------

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    success: bool,
    #[serde(default)]
    transactions: Vec<TxHistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    success: bool,
    balance: Option<AddressBalance>,
}

#[derive(Debug, Deserialize)]
struct UtxosResponse {
    success: bool,
    #[serde(default)]
    utxos: Vec<Utxo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<RawInput>,
    #[serde(default)]
    pub vout: Vec<RawOutput>,
    pub time: Option<i64>,
    pub blocktime: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInput {
    pub txid: Option<String>,
    pub vout: Option<u32>,
    pub coinbase: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOutput {
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub hex: String,
    pub addresses: Option<Vec<String>>,
    pub address: Option<String>,
}

impl ScriptPubKey {
    fn first_address(&self) -> Option<String> {
        self.addresses
            .as_ref()
            .and_then(|a| a.first().cloned())
            .or_else(|| self.address.clone())
    }
}

impl RawTransaction {
    /// SLP descriptor carried by output 0.
    pub fn descriptor(&self) -> Result<TokenDescriptor, SlpParseError> {
        let script = self
            .vout
            .first()
            .map(|o| o.script_pub_key.hex.as_str())
            .ok_or(SlpParseError::NotOpReturn)?;
        parser::decode_op_return(&self.txid, script)
    }

    fn to_tx_data(&self) -> TxData {
        TxData {
            txid: self.txid.clone(),
            time: self.time.or(self.blocktime),
            vin: self
                .vin
                .iter()
                .map(|i| TxInput {
                    txid: i.txid.clone().filter(|_| i.coinbase.is_none()),
                    vout: i.vout,
                    address: None,
                    token_qty: None,
                })
                .collect(),
            vout: self
                .vout
                .iter()
                .map(|o| TxOutput {
                    n: o.n,
                    script_hex: o.script_pub_key.hex.clone(),
                    address: o.script_pub_key.first_address(),
                    token_qty: None,
                })
                .collect(),
        }
    }
}

/// Annotate token quantities: output `n` gets `amounts[n-1]` of the
/// transaction's own descriptor; an input gets its parent's quantity when
/// the parent moved the same token.
pub fn hydrate_token_quantities(
    tx: &mut TxData,
    own: &TokenDescriptor,
    parents: &HashMap<String, TokenDescriptor>,
) {
    for out in tx.vout.iter_mut() {
        out.token_qty = own.amount_for_output(out.n as usize);
    }
    for input in tx.vin.iter_mut() {
        let (Some(parent_txid), Some(vout)) = (input.txid.as_ref(), input.vout) else {
            continue;
        };
        input.token_qty = parents
            .get(parent_txid)
            .filter(|p| p.token_id == own.token_id)
            .and_then(|p| p.amount_for_output(vout as usize));
    }
}

// ---------- REST client ----------

/// Client for a bch-api compatible REST indexer (Electrumx + full node endpoints).
#[derive(Debug, Clone)]
pub struct RestIndexer {
    base_url: String,
    client: Client,
}

impl RestIndexer {
    pub fn new(base_url: &str, api_token: Option<&str>) -> Result<Self, IndexerError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = api_token {
            let value = HeaderValue::from_str(&format!("Token {token}"))
                .map_err(|e| IndexerError::Malformed(format!("api token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .default_headers(headers)
            .build()?;

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { base_url, client })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, IndexerError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(IndexerError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| IndexerError::Malformed(format!("{path}: {e}")))
    }

    pub async fn raw_transaction(&self, txid: &str) -> Result<RawTransaction, IndexerError> {
        self.get_json(&format!(
            "rawtransactions/getRawTransaction/{txid}?verbose=true"
        ))
        .await
    }

    /// Fetch a transaction plus each distinct parent, resolving input addresses.
    async fn hydrate(
        &self,
        txid: &str,
    ) -> Result<(RawTransaction, TxData, HashMap<String, RawTransaction>), IndexerError> {
        let raw = self.raw_transaction(txid).await?;
        let mut tx = raw.to_tx_data();
        let mut parents: HashMap<String, RawTransaction> = HashMap::new();

        for input in tx.vin.iter_mut() {
            let (Some(parent_txid), Some(vout)) = (input.txid.clone(), input.vout) else {
                continue;
            };
            if !parents.contains_key(&parent_txid) {
                let parent = self.raw_transaction(&parent_txid).await?;
                parents.insert(parent_txid.clone(), parent);
            }
            input.address = parents
                .get(&parent_txid)
                .and_then(|p| p.vout.iter().find(|o| o.n == vout))
                .and_then(|o| o.script_pub_key.first_address());
        }

        Ok((raw, tx, parents))
    }
}

#[async_trait]
impl Indexer for RestIndexer {
    async fn transactions(&self, address: &str) -> Result<Vec<TxHistoryEntry>, IndexerError> {
        let resp: TransactionsResponse = self
            .get_json(&format!("electrumx/transactions/{address}"))
            .await?;
        if !resp.success {
            return Err(IndexerError::Unsuccessful(address.to_string()));
        }
        Ok(resp.transactions)
    }

    async fn balance(&self, address: &str) -> Result<AddressBalance, IndexerError> {
        let resp: BalanceResponse = self
            .get_json(&format!("electrumx/balance/{address}"))
            .await?;
        match resp.balance {
            Some(b) if resp.success => Ok(b),
            _ => Err(IndexerError::Unsuccessful(address.to_string())),
        }
    }

    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, IndexerError> {
        let resp: UtxosResponse = self
            .get_json(&format!("electrumx/utxos/{address}"))
            .await?;
        if !resp.success {
            return Err(IndexerError::Unsuccessful(address.to_string()));
        }
        Ok(resp.utxos)
    }

    async fn is_unspent(&self, txid: &str, vout: u32) -> Result<bool, IndexerError> {
        // The node answers `null` for spent outputs.
        let txout: Option<serde_json::Value> = self
            .get_json(&format!(
                "blockchain/getTxOut/{txid}/{vout}?include_mempool=true"
            ))
            .await?;
        Ok(txout.is_some_and(|v| !v.is_null()))
    }

    async fn tx_data(&self, txid: &str) -> Result<TxData, IndexerError> {
        let (_, tx, _) = self.hydrate(txid).await?;
        Ok(tx)
    }

    async fn tx_data_slp(&self, txid: &str) -> Result<TxData, IndexerError> {
        let (raw, mut tx, parents) = self.hydrate(txid).await?;

        let own = match raw.descriptor() {
            Ok(d) => d,
            Err(e) => {
                debug!("{} carries no token quantities: {}", txid, e);
                return Ok(tx);
            }
        };
        let parent_descriptors: HashMap<String, TokenDescriptor> = parents
            .iter()
            .filter_map(|(id, p)| p.descriptor().ok().map(|d| (id.clone(), d)))
            .collect();

        hydrate_token_quantities(&mut tx, &own, &parent_descriptors);
        Ok(tx)
    }
}

#[async_trait]
impl TokenDecoder for RestIndexer {
    async fn decode_op_return(&self, txid: &str) -> Result<TokenDescriptor, DecodeError> {
        let raw = self.raw_transaction(txid).await?;
        Ok(raw.descriptor()?)
    }
}
