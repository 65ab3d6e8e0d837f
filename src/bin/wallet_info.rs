use slp_flow_metrics::{config, wallet, RestIndexer};
use std::env;

/// Print the BCH balance and the biggest spendable UTXO of an address.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // config errors are eyre reports
    let cfg = config::load().map_err(|e| anyhow::anyhow!("{e:#}"))?;
    let address = env::args()
        .nth(1)
        .unwrap_or_else(|| cfg.sink_address.clone());

    let indexer = RestIndexer::new(&cfg.rest_url, cfg.api_token.as_deref())?;
    println!("Address: {}", address);

    let balance = wallet::bch_balance(&indexer, &address).await?;
    println!("Balance: {} BCH", balance);
    if let Err(e) = wallet::ensure_funded(balance) {
        println!("{}", e);
        return Ok(());
    }

    let utxos = wallet::utxos_for(&indexer, &address).await?;
    println!("UTXOs: {}", utxos.len());

    let biggest = wallet::find_biggest_utxo(&indexer, &utxos).await?;
    println!(
        "Biggest UTXO: {}:{} ({} sats, height {})",
        biggest.tx_hash, biggest.tx_pos, biggest.value, biggest.height
    );

    Ok(())
}
