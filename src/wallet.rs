// src/wallet.rs
//
// Balance and UTXO helpers used by the surrounding wallet tooling. The flow
// classifier does not depend on these.

use crate::models::{to_token_units, Utxo};
use crate::rpc::{Indexer, IndexerError};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("No UTXOs found for {0}.")]
    NoUtxos(String),

    #[error("All UTXOs are spent; the indexer may need to catch up.")]
    NoSpendableUtxo,

    #[error("Balance of sending address is zero.")]
    ZeroBalance,

    #[error(transparent)]
    Indexer(#[from] IndexerError),
}

/// Confirmed plus unconfirmed balance, in BCH.
pub async fn bch_balance(indexer: &dyn Indexer, address: &str) -> Result<Decimal, IndexerError> {
    let balance = indexer.balance(address).await?;
    let sats = balance.confirmed + balance.unconfirmed;
    let bch = if sats < 0 {
        -to_token_units(sats.unsigned_abs())
    } else {
        to_token_units(sats as u64)
    };
    debug!("Balance of address {} is {} BCH.", address, bch);
    Ok(bch)
}

pub fn ensure_funded(balance: Decimal) -> Result<(), WalletError> {
    if balance <= Decimal::ZERO {
        return Err(WalletError::ZeroBalance);
    }
    Ok(())
}

pub async fn utxos_for(indexer: &dyn Indexer, address: &str) -> Result<Vec<Utxo>, WalletError> {
    let utxos = indexer.utxos(address).await?;
    if utxos.is_empty() {
        return Err(WalletError::NoUtxos(address.to_string()));
    }
    Ok(utxos)
}

/// Largest UTXO the full node still reports as unspent.
pub async fn find_biggest_utxo(indexer: &dyn Indexer, utxos: &[Utxo]) -> Result<Utxo, WalletError> {
    let mut biggest: Option<&Utxo> = None;

    for utxo in utxos {
        if !indexer.is_unspent(&utxo.tx_hash, utxo.tx_pos).await? {
            warn!(
                "Stale UTXO {}:{} found. You may need to wait for the indexer to catch up.",
                utxo.tx_hash, utxo.tx_pos
            );
            continue;
        }
        if biggest.map_or(true, |b| utxo.value > b.value) {
            biggest = Some(utxo);
        }
    }

    biggest.cloned().ok_or(WalletError::NoSpendableUtxo)
}
