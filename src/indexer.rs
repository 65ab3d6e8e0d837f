use std::sync::{Arc, Mutex};
use rusqlite::Connection;
use crate::{
    aggregator,
    classifier::{FlowClassifier, FlowError},
    config::Config,
    db,
    models::{FlowKind, FlowReport},
    report,
};
use eyre::{eyre, Result};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Whole-run retry for fatal indexer failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(120),
        }
    }
}

/// Classify one window, restarting from scratch after an indexer failure.
/// An invalid window is never retried.
pub async fn classify_with_retry(
    classifier: &FlowClassifier,
    kind: FlowKind,
    start: i64,
    stop: i64,
    policy: RetryPolicy,
) -> Result<FlowReport, FlowError> {
    let mut retry_delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        match classifier.classify(kind, start, stop).await {
            Ok(report) => return Ok(report),
            Err(e @ FlowError::InvalidWindow { .. }) => return Err(e),
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    "{} run failed (attempt {}/{}): {}. Retrying in {:?}",
                    kind, attempt, policy.max_attempts, e, retry_delay
                );
                sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(policy.max_delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run every configured report over the configured window: print the CSV,
/// persist the entries, refresh net flows.
pub async fn run(
    cfg: &Config,
    classifier: &FlowClassifier,
    conn: Arc<Mutex<Connection>>,
    policy: RetryPolicy,
) -> Result<Vec<FlowReport>> {
    info!(
        "Reporting {:?} between blocks {} and {}",
        cfg.reports, cfg.start_block, cfg.end_block
    );

    let mut reports = Vec::with_capacity(cfg.reports.len());
    for kind in &cfg.reports {
        let report =
            classify_with_retry(classifier, *kind, cfg.start_block, cfg.end_block, policy).await?;

        println!("\n{}", report::render_csv(Some(kind.title()), &report.entries));

        {
            let mut db = conn.lock().map_err(|_| eyre!("database mutex poisoned"))?;
            let stored = db::record_report(&mut db, &cfg.token_id, &report)?;
            if let Err(e) = aggregator::update_netflows(&db) {
                error!("Aggregator failed: {:?}", e);
            }
            info!("Stored {} {} entries (total {})", stored, kind, report.total);
        }

        reports.push(report);
    }

    Ok(reports)
}
