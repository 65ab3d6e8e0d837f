use axum::{
    extract::Query,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use rusqlite::Connection;
use crate::{aggregator, db};
use crate::config::Config;
use crate::models::{FlowKind, NetFlow, StoredFlow};
use tracing::{error, info};
use tower_http::cors::{Any, CorsLayer};
use tokio::task;

type ApiError = (StatusCode, String);

const DEFAULT_FLOW_LIMIT: u32 = 10;
const MAX_FLOW_LIMIT: u32 = 1000;

#[derive(Deserialize)]
pub struct FlowQuery {
    pub kind: Option<FlowKind>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct NetFlowQuery {
    pub token: Option<String>,
}

pub fn router(cfg: &Config, conn: Arc<Mutex<Connection>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let default_token = cfg.token_id.to_string();

    Router::new()
        .route("/", get(|| async { "SLP flow metrics API running" }))
        .route("/flows", get({
            let conn = Arc::clone(&conn);
            move |q: Query<FlowQuery>| {
                let conn = Arc::clone(&conn);
                async move { get_flows(conn, q.kind, q.limit).await.map(Json) }
            }
        }))
        .route("/netflow", get({
            let conn = Arc::clone(&conn);
            move |q: Query<NetFlowQuery>| {
                let conn = Arc::clone(&conn);
                let token = q.0.token.unwrap_or(default_token.clone());
                async move { get_netflow(conn, token).await.map(Json) }
            }
        }))
        .layer(cors)
}

pub async fn serve(cfg: Config, conn: Arc<Mutex<Connection>>) -> eyre::Result<()> {
    let app = router(&cfg, conn);

    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// ---------- DB wrappers (spawn_blocking) ----------

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("API request failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
}

fn flow_limit(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_FLOW_LIMIT).min(MAX_FLOW_LIMIT)
}

async fn get_flows(
    conn: Arc<Mutex<Connection>>,
    kind: Option<FlowKind>,
    limit: Option<u32>,
) -> Result<Vec<StoredFlow>, ApiError> {
    let limit = flow_limit(limit);
    task::spawn_blocking(move || {
        let db = conn.lock().map_err(|_| internal("database mutex poisoned"))?;
        db::recent_flows(&db, kind, limit).map_err(internal)
    })
    .await
    .map_err(internal)?
}

async fn get_netflow(conn: Arc<Mutex<Connection>>, token: String) -> Result<NetFlow, ApiError> {
    task::spawn_blocking(move || {
        let db = conn.lock().map_err(|_| internal("database mutex poisoned"))?;
        aggregator::netflow(&db, &token)
            .map_err(internal)?
            .ok_or((StatusCode::NOT_FOUND, format!("no flows recorded for {token}")))
    })
    .await
    .map_err(internal)?
}
