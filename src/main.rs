use std::sync::{Arc, Mutex};
use slp_flow_metrics::{
    api, config, db,
    indexer::{self, RetryPolicy},
    FlowClassifier, RestIndexer,
};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("SLP flow metrics starting...");

    let cfg = config::load()?;
    info!("  REST URL: {}", cfg.rest_url);
    info!("  DB Path: {}", cfg.db_path);
    info!("  Token: {}", cfg.token_id);
    info!("  Liquidity source: {}", cfg.source_address);
    info!("  Liquidity sink: {}", cfg.sink_address);

    // Run DB migrations once at startup
    let conn = db::connect(&cfg.db_path)?;
    db::run_migrations(&conn)?;
    let shared_conn = Arc::new(Mutex::new(conn));

    let rest = Arc::new(RestIndexer::new(&cfg.rest_url, cfg.api_token.as_deref())?);
    let classifier = FlowClassifier::new(rest.clone(), rest, cfg.watchlist())
        .with_pacing(cfg.pacing());

    let policy = RetryPolicy::new(cfg.max_attempts);
    let run = indexer::run(&cfg, &classifier, Arc::clone(&shared_conn), policy);

    tokio::select! {
        res = run => match res {
            Ok(reports) => info!("Completed {} reports", reports.len()),
            Err(e) => {
                error!("Report run failed: {:?}", e);
                return Err(e);
            }
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
            return Ok(());
        }
    }

    if cfg.serve {
        tokio::select! {
            res = api::serve(cfg.clone(), Arc::clone(&shared_conn)) => match res {
                Ok(_) => info!("API exited cleanly"),
                Err(e) => error!("API error: {:?}", e),
            },
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received, stopping...");
            }
        }
    }

    info!("SLP flow metrics stopped.");
    Ok(())
}
