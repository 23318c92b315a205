use crate::config::{StoreConfig, ALERTS_TABLE, HISTORY_ROW_LIMIT, PREDICTIONS_TABLE};
use crate::model::{group_by_date, ApiAlert, PredictionRecord, PredictionRow, PredictionsByDate};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

const EVALUATED_COLUMNS: &str =
    "id,prediction_date,status,confidence,category,theme_name,leader_stocks,actual_performance";
const HISTORY_COLUMNS: &str =
    "id,prediction_date,category,theme_name,confidence,status,leader_stocks,actual_performance,evaluated_at";
const ALERT_COLUMNS: &str = "id,service_name,error_type,error_message,detected_at";

#[derive(Clone)]
pub struct StoreClient {
    config: StoreConfig,
    http: reqwest::Client,
}

impl StoreClient {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building store HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(StoreConfig::from_env()?)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, table)
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let url = self.table_url(table);
        debug!("GET {} {:?}", url, query);

        let rows = self
            .http
            .get(&url)
            .query(query)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("querying {}", table))?
            .error_for_status()
            .with_context(|| format!("store rejected query on {}", table))?
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("decoding rows from {}", table))?;

        Ok(rows)
    }

    /// Predictions whose outcome is judged (hit or missed), input for the accuracy stats.
    pub async fn fetch_evaluated_predictions(&self) -> Result<Vec<PredictionRecord>> {
        let rows: Vec<PredictionRow> = self
            .select(
                PREDICTIONS_TABLE,
                &[
                    ("select", EVALUATED_COLUMNS.to_string()),
                    ("status", "in.(hit,missed)".to_string()),
                ],
            )
            .await?;

        info!("Loaded {} evaluated prediction rows", rows.len());
        Ok(rows.into_iter().map(PredictionRecord::from).collect())
    }

    /// The most recent predictions of every status, grouped by date (newest first).
    pub async fn fetch_prediction_history(&self) -> Result<Vec<PredictionsByDate>> {
        let rows: Vec<PredictionRow> = self
            .select(
                PREDICTIONS_TABLE,
                &[
                    ("select", HISTORY_COLUMNS.to_string()),
                    ("status", "in.(hit,missed,expired,active)".to_string()),
                    ("order", "prediction_date.desc,category.asc".to_string()),
                    ("limit", HISTORY_ROW_LIMIT.to_string()),
                ],
            )
            .await?;

        info!("Loaded {} prediction history rows", rows.len());
        let records = rows.into_iter().map(PredictionRecord::from).collect();
        Ok(group_by_date(records))
    }

    /// API-key alerts not yet resolved, newest first.
    pub async fn fetch_unresolved_alerts(&self) -> Result<Vec<ApiAlert>> {
        self.select(
            ALERTS_TABLE,
            &[
                ("select", ALERT_COLUMNS.to_string()),
                ("resolved_at", "is.null".to_string()),
                ("order", "detected_at.desc".to_string()),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn rest_table(
        Path(table): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("test-key") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        match table.as_str() {
            "theme_predictions" if query.get("status").map(String::as_str) == Some("in.(hit,missed)") => {
                Ok(Json(json!([
                    {
                        "id": 1, "prediction_date": "2026-01-01", "status": "hit",
                        "confidence": "높음", "category": "today", "theme_name": "반도체",
                        "leader_stocks": "[{\"priority\":1,\"name\":\"삼성전자\",\"code\":\"005930\"}]",
                        "actual_performance": {"005930": 2.5}
                    }
                ])))
            }
            "theme_predictions" => {
                assert_eq!(query.get("limit").map(String::as_str), Some("200"));
                assert_eq!(
                    query.get("order").map(String::as_str),
                    Some("prediction_date.desc,category.asc")
                );
                Ok(Json(json!([
                    {"id": 3, "prediction_date": "2026-01-02", "status": "active", "category": "today",
                     "theme_name": "조선", "confidence": "보통", "leader_stocks": [], "actual_performance": null,
                     "evaluated_at": null},
                    {"id": 2, "prediction_date": "2026-01-01", "status": "missed", "category": "long_term",
                     "theme_name": "방산", "confidence": "낮음", "leader_stocks": "oops", "actual_performance": "{}",
                     "evaluated_at": "2026-01-31T18:00:00"}
                ])))
            }
            "api_key_alerts" => {
                assert_eq!(query.get("resolved_at").map(String::as_str), Some("is.null"));
                Ok(Json(json!([
                    {"id": "a-1", "service_name": "DART", "error_type": "quota", "error_message": null,
                     "detected_at": "2026-01-02T08:00:00Z"}
                ])))
            }
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn spawn_store(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String, key: &str) -> StoreClient {
        StoreClient::new(StoreConfig {
            base_url,
            anon_key: key.to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_evaluated_predictions_decodes_encoded_fields() {
        let base = spawn_store(Router::new().route("/rest/v1/:table", get(rest_table))).await;
        let records = client(base, "test-key").fetch_evaluated_predictions().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].leader_stocks[0].code, "005930");
        assert_eq!(records[0].return_for("005930"), Some(2.5));
    }

    #[tokio::test]
    async fn test_fetch_history_groups_by_date() {
        let base = spawn_store(Router::new().route("/rest/v1/:table", get(rest_table))).await;
        let dates = client(base, "test-key").fetch_prediction_history().await.unwrap();

        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].date, "2026-01-02");
        assert_eq!(dates[1].predictions[0].theme_name, "방산");
        assert!(dates[1].predictions[0].leader_stocks.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_alerts() {
        let base = spawn_store(Router::new().route("/rest/v1/:table", get(rest_table))).await;
        let alerts = client(base, "test-key").fetch_unresolved_alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].service_name, "DART");
        assert_eq!(alerts[0].error_message, None);
    }

    #[tokio::test]
    async fn test_rejected_query_is_an_error() {
        let base = spawn_store(Router::new().route("/rest/v1/:table", get(rest_table))).await;
        let result = client(base, "wrong-key").fetch_prediction_history().await;
        assert!(result.is_err());
    }
}
