use crate::config;
use crate::feed::FeedClient;
use crate::model::{ApiAlert, PredictionStatus, StockBoard, ThemeForecast};
use crate::schedule::{self, CollectionRound};
use crate::stats::{compute_backtest_stats, BacktestStats};
use crate::stock_view::{build_stock_days, CategoryFilter, HitOutcome, StockPrediction};
use crate::store::StoreClient;
use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

#[derive(Clone)]
struct WebState {
    feed: FeedClient,
    store: Option<StoreClient>,
    store_error: Option<Arc<str>>,
    hit_threshold: f64,
}

#[derive(Clone, Debug, Serialize)]
struct ApiError {
    error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScheduleQuery {
    updated_at: Option<String>,
    estimated: Option<bool>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    hit_threshold_pct: f64,
    #[serde(flatten)]
    stats: BacktestStats,
}

#[derive(Debug, Serialize)]
struct HistoryStock {
    #[serde(flatten)]
    stock: StockPrediction,
    outcome: HitOutcome,
    display_return: Option<f64>,
}

#[derive(Debug, Serialize)]
struct HistoryDay {
    date: String,
    index_return: Option<f64>,
    hit: usize,
    missed: usize,
    active: usize,
    stocks: Vec<HistoryStock>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    category: &'static str,
    days: Vec<HistoryDay>,
}

#[derive(Debug, Serialize)]
struct ScheduleResponse {
    state: &'static str,
    label: &'static str,
    round_text: Option<String>,
    next_update: Option<&'static str>,
}

impl From<CollectionRound> for ScheduleResponse {
    fn from(round: CollectionRound) -> Self {
        let state = match round {
            CollectionRound::Confirmed => "confirmed",
            CollectionRound::Waiting { .. } => "waiting",
            CollectionRound::Round { .. } => "round",
        };
        Self {
            state,
            label: round.label(),
            round_text: round.round_text(),
            next_update: round.next_update(),
        }
    }
}

pub async fn run_webui_server(
    port: u16,
    serve_dir: Option<PathBuf>,
    feed: FeedClient,
    store: Result<StoreClient>,
) -> Result<()> {
    let app = router(feed, store, config::hit_threshold_pct(), serve_dir);

    let addr = format!("0.0.0.0:{}", port);
    info!("WebUI listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(
    feed: FeedClient,
    store: Result<StoreClient>,
    hit_threshold: f64,
    serve_dir: Option<PathBuf>,
) -> Router {
    let (store, store_error) = match store {
        Ok(store) => (Some(store), None),
        Err(err) => {
            warn!("Prediction store disabled: {}", err);
            (None, Some(Arc::from(err.to_string())))
        }
    };
    let state = WebState {
        feed,
        store,
        store_error,
        hit_threshold,
    };

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/forecast", get(forecast))
        .route("/api/movers", get(movers))
        .route("/api/stats", get(stats))
        .route("/api/history", get(history))
        .route("/api/alerts", get(alerts))
        .route("/api/schedule", get(collection_schedule))
        .with_state(state);

    match serve_dir {
        Some(dir) => {
            info!("Serving {} under /data", dir.display());
            app.nest_service("/data", ServeDir::new(dir))
        }
        None => app,
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn forecast(State(state): State<WebState>) -> ApiResult<Option<ThemeForecast>> {
    state
        .feed
        .fetch_theme_forecast()
        .await
        .map(Json)
        .map_err(upstream_err)
}

async fn movers(State(state): State<WebState>) -> ApiResult<Option<StockBoard>> {
    state
        .feed
        .fetch_stock_board()
        .await
        .map(Json)
        .map_err(upstream_err)
}

async fn stats(State(state): State<WebState>) -> ApiResult<StatsResponse> {
    let store = require_store(&state)?;
    let records = store
        .fetch_evaluated_predictions()
        .await
        .map_err(upstream_err)?;
    Ok(Json(StatsResponse {
        hit_threshold_pct: state.hit_threshold,
        stats: compute_backtest_stats(&records, state.hit_threshold),
    }))
}

async fn history(
    State(state): State<WebState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryResponse> {
    let filter = match query.category.as_deref() {
        None => CategoryFilter::All,
        Some(raw) => CategoryFilter::parse(raw).ok_or_else(|| {
            api_err(
                StatusCode::BAD_REQUEST,
                "category must be one of all, today, short_term, long_term",
            )
        })?,
    };

    let store = require_store(&state)?;
    let dates = store
        .fetch_prediction_history()
        .await
        .map_err(upstream_err)?;

    let days = dates
        .iter()
        .zip(build_stock_days(&dates))
        .map(|(group, day)| {
            let stocks = day
                .filtered(filter)
                .into_iter()
                .map(|stock| HistoryStock {
                    outcome: stock.hit_outcome(filter, state.hit_threshold),
                    display_return: stock.display_return(filter),
                    stock: stock.clone(),
                })
                .collect();
            HistoryDay {
                date: day.date,
                index_return: day.index_return,
                hit: group.count_status(PredictionStatus::Hit),
                missed: group.count_status(PredictionStatus::Missed),
                active: group.count_status(PredictionStatus::Active),
                stocks,
            }
        })
        .collect();

    Ok(Json(HistoryResponse {
        category: filter.label(),
        days,
    }))
}

async fn alerts(State(state): State<WebState>) -> ApiResult<Vec<ApiAlert>> {
    let store = require_store(&state)?;
    store
        .fetch_unresolved_alerts()
        .await
        .map(Json)
        .map_err(upstream_err)
}

async fn collection_schedule(Query(query): Query<ScheduleQuery>) -> ApiResult<ScheduleResponse> {
    let round = match query.updated_at.as_deref().map(str::trim) {
        Some(stamp) if !stamp.is_empty() => {
            schedule::resolve_round(stamp, query.estimated.unwrap_or(true))
        }
        _ => schedule::resolve_now(chrono::Utc::now()),
    };
    Ok(Json(round.into()))
}

fn require_store(state: &WebState) -> Result<&StoreClient, (StatusCode, Json<ApiError>)> {
    state.store.as_ref().ok_or_else(|| {
        let message = state
            .store_error
            .as_deref()
            .unwrap_or("prediction store is not configured");
        api_err(StatusCode::SERVICE_UNAVAILABLE, message)
    })
}

fn api_err(status: StatusCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.to_string(),
        }),
    )
}

fn upstream_err<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ApiError>) {
    error!("Upstream request failed: {}", err);
    api_err(StatusCode::BAD_GATEWAY, &err.to_string())
}
