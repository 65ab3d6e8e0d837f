use crate::classifier::Pacing;
use crate::models::{AddressRole, FlowKind, TokenId, WatchedAddress, Watchlist};
use dotenvy::dotenv;
use eyre::{eyre, Result, WrapErr};
use std::{env, time::Duration};
use tracing::info;

pub const DEFAULT_REST_URL: &str = "https://api.fullstack.cash/v5/";
/// 145 derivation path address of the token liquidity app.
pub const DEFAULT_LIQUIDITY_SOURCE: &str = "bitcoincash:qrnn49rx0p4xh78tts79utf0zv26vyru6vqtl9trd3";
/// 245 derivation path address of the token liquidity app.
pub const DEFAULT_LIQUIDITY_SINK: &str = "bitcoincash:qzhrpmu7nruyfcemeanqh5leuqcnf6zkjq4qm9nqh0";
/// PSF token.
pub const DEFAULT_TOKEN_ID: &str =
    "38e97c5d7d3585a2cbf3f9580c82ca33985f9cb0845d4dcce220cb709f9538b0";

#[derive(Debug, Clone)]
pub struct Config {
    pub rest_url: String,
    pub api_token: Option<String>,
    pub source_address: String,
    pub sink_address: String,
    pub token_id: TokenId,
    pub start_block: i64,
    pub end_block: i64,
    pub reports: Vec<FlowKind>,
    pub pacing_ms: u64,
    pub max_attempts: u32,
    pub db_path: String,
    pub serve: bool,
    pub port: u16,
}

impl Config {
    /// Build the config from any key lookup (process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // Indexer REST API, with the bch-js variable name as an alias
        let rest_url = lookup("REST_URL")
            .or_else(|| lookup("RESTURL"))
            .unwrap_or_else(|| DEFAULT_REST_URL.to_string());
        let api_token = lookup("BCHJSTOKEN").filter(|t| !t.trim().is_empty());

        let source_address = get("LIQUIDITY_SOURCE", DEFAULT_LIQUIDITY_SOURCE);
        let sink_address = get("LIQUIDITY_SINK", DEFAULT_LIQUIDITY_SINK);

        let token_id: TokenId = get("TOKEN_ID", DEFAULT_TOKEN_ID)
            .parse()
            .map_err(|e| eyre!("TOKEN_ID: {}", e))?;

        let start_block: i64 = get("START_BLOCK", "659650")
            .parse()
            .wrap_err("START_BLOCK must be an integer")?;
        let end_block: i64 = get("END_BLOCK", "664000")
            .parse()
            .wrap_err("END_BLOCK must be an integer")?;
        if start_block >= end_block {
            return Err(eyre!(
                "START_BLOCK ({}) must be below END_BLOCK ({})",
                start_block,
                end_block
            ));
        }

        let reports = get("REPORTS", "inflows,outflows,burns")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<FlowKind>().map_err(|e| eyre!("REPORTS: {}", e)))
            .collect::<Result<Vec<_>>>()?;

        let pacing_ms = get("PACING_MS", "1000").parse().unwrap_or(1000);
        let max_attempts = get("MAX_ATTEMPTS", "3").parse::<u32>().unwrap_or(3).max(1);

        let db_path = get("DATABASE_URL", "flows.db");
        let serve = matches!(
            get("SERVE", "false").to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        );
        let port = get("PORT", "8080").parse().unwrap_or(8080);

        Ok(Config {
            rest_url,
            api_token,
            source_address,
            sink_address,
            token_id,
            start_block,
            end_block,
            reports,
            pacing_ms,
            max_attempts,
            db_path,
            serve,
            port,
        })
    }

    pub fn watchlist(&self) -> Watchlist {
        Watchlist {
            source: WatchedAddress::new(AddressRole::LiquiditySource, &self.source_address),
            sink: WatchedAddress::new(AddressRole::LiquiditySink, &self.sink_address),
            token_id: self.token_id,
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::fixed(Duration::from_millis(self.pacing_ms))
    }
}

pub fn load() -> Result<Config> {
    dotenv().ok(); // .env is optional

    let cfg = Config::from_lookup(|key| env::var(key).ok())?;
    // the api token stays out of the logs
    info!(
        "Loaded config: rest {} (token {}), window ({}, {}), reports {:?}",
        cfg.rest_url,
        if cfg.api_token.is_some() { "set" } else { "unset" },
        cfg.start_block,
        cfg.end_block,
        cfg.reports
    );

    Ok(cfg)
}
