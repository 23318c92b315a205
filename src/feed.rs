use crate::config::{FeedConfig, FORECAST_FEED_PATH, STOCK_BOARD_FEED_PATH};
use crate::model::{StockBoard, ThemeForecast};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

#[derive(Clone)]
pub struct FeedClient {
    config: FeedConfig,
    http: reqwest::Client,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building feed HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(FeedConfig::from_env())
    }

    /// Fetches one feed, bypassing caches. `Ok(None)` means the file is not published yet.
    async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.config.url_for(path);
        let cache_buster = Utc::now().timestamp_millis().to_string();
        debug!("GET {}?t={}", url, cache_buster);

        let resp = self
            .http
            .get(&url)
            .query(&[("t", cache_buster.as_str())])
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .with_context(|| format!("fetching {}", url))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            info!("Feed {} not published yet (404)", path);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow!("HTTP error! status: {} for {}", status, url));
        }

        let parsed = resp
            .json::<T>()
            .await
            .with_context(|| format!("decoding {}", path))?;
        Ok(Some(parsed))
    }

    pub async fn fetch_theme_forecast(&self) -> Result<Option<ThemeForecast>> {
        self.fetch_json(FORECAST_FEED_PATH).await
    }

    pub async fn fetch_stock_board(&self) -> Result<Option<StockBoard>> {
        self.fetch_json(STOCK_BOARD_FEED_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::normalize_base_url;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn forecast_handler(
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Result<Json<serde_json::Value>, AxumStatus> {
        let busted = query.get("t").map(|t| t.parse::<i64>().is_ok()).unwrap_or(false);
        let no_store = headers
            .get("cache-control")
            .and_then(|v| v.to_str().ok())
            == Some("no-store");
        if !busted || !no_store {
            return Err(AxumStatus::BAD_REQUEST);
        }
        Ok(Json(json!({
            "forecast_date": "2026-02-27",
            "generated_at": "2026-02-27 07:30:00",
            "market_context": "ctx",
            "today": [],
            "short_term": [{"theme_name": "원전", "confidence": "높음", "leader_stocks": []}],
            "long_term": []
        })))
    }

    async fn spawn_feed(router: Router) -> FeedClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        FeedClient::new(FeedConfig {
            base_url: normalize_base_url(&format!("http://{}", addr)),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_forecast_is_cache_busted() {
        let client = spawn_feed(
            Router::new().route("/data/theme-forecast.json", get(forecast_handler)),
        )
        .await;
        let forecast = client.fetch_theme_forecast().await.unwrap().unwrap();
        assert_eq!(forecast.short_term[0].theme_name, "원전");
    }

    #[tokio::test]
    async fn test_missing_feed_is_none() {
        let client = spawn_feed(Router::new()).await;
        assert!(client.fetch_theme_forecast().await.unwrap().is_none());
        assert!(client.fetch_stock_board().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_err() {
        let client = spawn_feed(Router::new().route(
            "/data/latest.json",
            get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        assert!(client.fetch_stock_board().await.is_err());
    }

    #[tokio::test]
    async fn test_stock_board_parses() {
        let client = spawn_feed(Router::new().route(
            "/data/latest.json",
            get(|| async {
                Json(json!({
                    "timestamp": "2026-02-27 15:40:00",
                    "rising": {"kospi": [{"rank": 1, "code": "005930", "name": "삼성전자",
                        "current_price": 71500, "change_rate": 12.3, "volume": 1234567}], "kosdaq": []},
                    "falling": {"kospi": [], "kosdaq": []},
                    "history": {}
                }))
            }),
        ))
        .await;
        let board = client.fetch_stock_board().await.unwrap().unwrap();
        assert_eq!(board.rising.kospi[0].current_price, 71_500.0);
        assert_eq!(board.rising.len(), 1);
    }
}
