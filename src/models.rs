// src/models.rs
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SLP token quantities and BCH values both carry 8 decimal places.
pub const TOKEN_DECIMALS: u32 = 8;

/// Convert a raw integer quantity (satoshi-equivalent) into token units.
pub fn to_token_units(raw: u64) -> Decimal {
    Decimal::from_i128_with_scale(raw as i128, TOKEN_DECIMALS)
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2020-12-01T10:00:00.000Z`.
pub fn iso8601_from_unix(secs: i64) -> Option<String> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// 32-byte token identifier, hex encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId([u8; 32]);

impl TokenId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for TokenId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| format!("token id is not hex: {e}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("token id must be 32 bytes, got {}", b.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRole {
    LiquiditySource,
    LiquiditySink,
}

/// A fixed address the reports are built around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedAddress {
    pub role: AddressRole,
    pub address: String,
}

impl WatchedAddress {
    pub fn new(role: AddressRole, address: impl Into<String>) -> Self {
        Self {
            role,
            address: address.into(),
        }
    }

    /// Cash addresses are compared without their `bitcoincash:` prefix and
    /// case-insensitively. Legacy base58 addresses must match exactly.
    pub fn matches(&self, other: &str) -> bool {
        let (mine, theirs) = (strip_prefix(&self.address), strip_prefix(other));
        if is_cashaddr(&self.address) && is_cashaddr(other) {
            mine.eq_ignore_ascii_case(theirs)
        } else {
            mine == theirs
        }
    }
}

fn strip_prefix(addr: &str) -> &str {
    addr.rsplit_once(':').map(|(_, rest)| rest).unwrap_or(addr)
}

// Base58 legacy addresses start with 1 or 3, never q or p.
fn is_cashaddr(addr: &str) -> bool {
    addr.contains(':') || matches!(addr.as_bytes().first(), Some(b'q' | b'p' | b'Q' | b'P'))
}

/// The two liquidity addresses plus the monitored token.
#[derive(Debug, Clone)]
pub struct Watchlist {
    pub source: WatchedAddress,
    pub sink: WatchedAddress,
    pub token_id: TokenId,
}

/// One row of an address's confirmed history, as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TxHistoryEntry {
    pub tx_hash: String,
    pub height: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Genesis,
    Mint,
    Send,
}

/// Decoded SLP OP_RETURN metadata of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub token_id: TokenId,
    pub token_type: u16,
    pub transfer_type: TransferType,
    /// Raw quantities. `amounts[i]` belongs to output `i + 1`; output 0 is the OP_RETURN.
    pub amounts: Vec<u64>,
}

impl TokenDescriptor {
    /// Raw token quantity carried by output `vout`, if any.
    pub fn amount_for_output(&self, vout: usize) -> Option<u64> {
        vout.checked_sub(1).and_then(|i| self.amounts.get(i)).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxInput {
    /// Parent transaction; `None` for coinbase inputs.
    pub txid: Option<String>,
    pub vout: Option<u32>,
    /// Address of the spent output, resolved from the parent transaction.
    pub address: Option<String>,
    /// Raw token quantity, only present on a token-hydrated view.
    pub token_qty: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOutput {
    pub n: u32,
    pub script_hex: String,
    pub address: Option<String>,
    pub token_qty: Option<u64>,
}

/// Transaction detail with inputs resolved to addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxData {
    pub txid: String,
    /// Block time in unix seconds; absent while unconfirmed.
    pub time: Option<i64>,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Inflow,
    Outflow,
    Burn,
}

impl FlowKind {
    pub const ALL: [FlowKind; 3] = [FlowKind::Inflow, FlowKind::Outflow, FlowKind::Burn];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Inflow => "inflow",
            FlowKind::Outflow => "outflow",
            FlowKind::Burn => "burn",
        }
    }

    /// Heading used above a CSV report.
    pub fn title(&self) -> &'static str {
        match self {
            FlowKind::Inflow => "Inflows",
            FlowKind::Outflow => "Outflows",
            FlowKind::Burn => "Burns",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inflow" | "inflows" => Ok(FlowKind::Inflow),
            "outflow" | "outflows" => Ok(FlowKind::Outflow),
            "burn" | "burns" => Ok(FlowKind::Burn),
            other => Err(format!("unknown flow kind '{other}'")),
        }
    }
}

/// A single classified token movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedEntry {
    pub txid: String,
    pub amount: Decimal, // token units, 8 dp
    pub vout: u32,
    pub height: i64,
    pub date: String, // ISO-8601
}

/// Result of one classification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowReport {
    pub kind: FlowKind,
    pub start_block: i64,
    pub stop_block: i64,
    pub entries: Vec<ClassifiedEntry>,
    pub total: Decimal,
}

impl FlowReport {
    pub fn new(kind: FlowKind, start_block: i64, stop_block: i64) -> Self {
        Self {
            kind,
            start_block,
            stop_block,
            entries: Vec::new(),
            total: Decimal::ZERO,
        }
    }

    /// Append an entry and add it to the running total.
    pub fn push(&mut self, entry: ClassifiedEntry) {
        self.total += entry.amount;
        self.entries.push(entry);
    }
}

/// Stored flow row, as returned by the API.
#[derive(Debug, Serialize)]
pub struct StoredFlow {
    pub kind: String,
    pub token_id: String,
    pub txid: String,
    pub vout: i64,
    pub amount: String,
    pub height: i64,
    pub date: String,
}

/// Aggregated token flows through the liquidity addresses.
#[derive(Debug, Serialize)]
pub struct NetFlow {
    pub token_id: String,
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub burned: Decimal,
    pub net: Decimal,
    pub last_height: i64,
    pub updated_at: DateTime<Utc>,
}

/// Confirmed and unconfirmed balance in satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AddressBalance {
    pub confirmed: i64,
    pub unconfirmed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Utxo {
    pub height: i64,
    pub tx_hash: String,
    pub tx_pos: u32,
    pub value: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PSF: &str = "38e97c5d7d3585a2cbf3f9580c82ca33985f9cb0845d4dcce220cb709f9538b0";

    #[test]
    fn token_id_round_trips_through_hex() {
        let id: TokenId = PSF.parse().unwrap();
        assert_eq!(id.to_string(), PSF);
    }

    #[test]
    fn token_id_rejects_wrong_length() {
        assert!("38e97c5d".parse::<TokenId>().is_err());
        assert!("zz".repeat(32).parse::<TokenId>().is_err());
    }

    #[test]
    fn descriptor_amounts_are_one_behind_outputs() {
        let d = TokenDescriptor {
            token_id: PSF.parse().unwrap(),
            token_type: 1,
            transfer_type: TransferType::Send,
            amounts: vec![500, 700],
        };
        assert_eq!(d.amount_for_output(0), None);
        assert_eq!(d.amount_for_output(1), Some(500));
        assert_eq!(d.amount_for_output(2), Some(700));
        assert_eq!(d.amount_for_output(3), None);
    }

    #[test]
    fn raw_quantities_scale_to_eight_places() {
        assert_eq!(to_token_units(1_200_000_000).to_string(), "12.00000000");
        assert_eq!(to_token_units(1).to_string(), "0.00000001");
    }

    #[test]
    fn dates_render_like_js_iso_strings() {
        assert_eq!(
            iso8601_from_unix(1_606_816_800).as_deref(),
            Some("2020-12-01T10:00:00.000Z")
        );
    }

    #[test]
    fn addresses_match_with_or_without_prefix() {
        let w = WatchedAddress::new(
            AddressRole::LiquiditySource,
            "bitcoincash:qrnn49rx0p4xh78tts79utf0zv26vyru6vqtl9trd3",
        );
        assert!(w.matches("qrnn49rx0p4xh78tts79utf0zv26vyru6vqtl9trd3"));
        assert!(w.matches("BITCOINCASH:QRNN49RX0P4XH78TTS79UTF0ZV26VYRU6VQTL9TRD3"));
        assert!(!w.matches("bitcoincash:qzhrpmu7nruyfcemeanqh5leuqcnf6zkjq4qm9nqh0"));
    }

    #[test]
    fn legacy_addresses_are_case_sensitive() {
        let w = WatchedAddress::new(
            AddressRole::LiquiditySink,
            "1BoatSLRHtKNngkdXEeobR76b53LETtpyT",
        );
        assert!(w.matches("1BoatSLRHtKNngkdXEeobR76b53LETtpyT"));
        assert!(!w.matches("1boatslrhtknngkdxeeobr76b53lettpyt"));
        assert!(!w.matches("qrnn49rx0p4xh78tts79utf0zv26vyru6vqtl9trd3"));
    }

    #[test]
    fn flow_kinds_parse_plural_and_singular() {
        assert_eq!("Inflows".parse::<FlowKind>(), Ok(FlowKind::Inflow));
        assert_eq!("burn".parse::<FlowKind>(), Ok(FlowKind::Burn));
        assert!("swap".parse::<FlowKind>().is_err());
    }
}
