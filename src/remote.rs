use crate::config::ALERT_POLL_INTERVAL;
use crate::model::ApiAlert;
use crate::store::StoreClient;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// State of one remote resource as seen by a view.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Fetch<T> {
    #[default]
    Loading,
    Failed(String),
    Ready(T),
}

impl<T> Fetch<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Maps a fetch result, replacing the error detail with a user-facing message.
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>, user_message: &str, what: &str) -> Self {
        match result {
            Ok(data) => Self::Ready(data),
            Err(err) => {
                tracing::error!("Failed to fetch {}: {}", what, err);
                Self::Failed(user_message.to_string())
            }
        }
    }
}

/// Periodic alert refresh. The task is aborted when the poller is dropped.
pub struct AlertPoller {
    handle: JoinHandle<()>,
}

impl AlertPoller {
    pub fn spawn(store: StoreClient, tx: UnboundedSender<Vec<ApiAlert>>) -> Self {
        Self::spawn_with_interval(store, tx, ALERT_POLL_INTERVAL)
    }

    pub fn spawn_with_interval(
        store: StoreClient,
        tx: UnboundedSender<Vec<ApiAlert>>,
        period: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                match store.fetch_unresolved_alerts().await {
                    Ok(alerts) => {
                        if !alerts.is_empty() {
                            info!("{} unresolved API-key alert(s)", alerts.len());
                        }
                        if tx.send(alerts).is_err() {
                            // Receiver gone, nobody left to show alerts to.
                            break;
                        }
                    }
                    Err(err) => {
                        // Keep whatever the view already shows.
                        warn!("Alert polling failed (will retry next tick): {}", err);
                    }
                }
            }
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for AlertPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fetch_accessors() {
        let loading: Fetch<u32> = Fetch::default();
        assert!(loading.is_loading());
        assert_eq!(loading.data(), None);

        let failed: Fetch<u32> = Fetch::from_result(Err("boom"), "Failed to load.", "thing");
        assert_eq!(failed.error(), Some("Failed to load."));

        let ready: Fetch<u32> = Fetch::from_result(Ok::<u32, String>(7), "unused", "thing");
        assert_eq!(ready.data(), Some(&7));
    }

    #[tokio::test]
    async fn test_poller_delivers_and_stops_on_drop() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/rest/v1/api_key_alerts",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!([{"id": "1", "service_name": "KIS", "error_type": "auth",
                                 "detected_at": "2026-01-01T00:00:00Z"}]))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let store = StoreClient::new(StoreConfig {
            base_url: format!("http://{}", addr),
            anon_key: "k".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let poller = AlertPoller::spawn_with_interval(store, tx, Duration::from_millis(50));

        let first = rx.recv().await.unwrap();
        assert_eq!(first[0].service_name, "KIS");
        let _second = rx.recv().await.unwrap();
        assert!(poller.is_running());

        drop(poller);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_poller_survives_failed_polls() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/rest/v1/api_key_alerts",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let store = StoreClient::new(StoreConfig {
            base_url: format!("http://{}", addr),
            anon_key: "k".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let poller = AlertPoller::spawn_with_interval(store, tx, Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(hits.load(Ordering::SeqCst) >= 2);
        assert!(rx.try_recv().is_err());
        assert!(poller.is_running());
    }
}
