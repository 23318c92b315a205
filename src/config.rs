use anyhow::{anyhow, Result};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

static HIT_THRESHOLD: OnceLock<f64> = OnceLock::new();

/// A leader stock counts as a hit when its realised return is at least this many percent.
pub const DEFAULT_HIT_THRESHOLD_PCT: f64 = 2.0;
/// How often unresolved API-key alerts are re-queried in admin mode.
pub const ALERT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Upper bound on rows pulled for the prediction history view.
pub const HISTORY_ROW_LIMIT: usize = 200;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
/// Bucket for records that carry no confidence or category.
pub const UNKNOWN_BUCKET: &str = "N/A";

pub const PREDICTIONS_TABLE: &str = "theme_predictions";
pub const ALERTS_TABLE: &str = "api_key_alerts";
pub const FORECAST_FEED_PATH: &str = "data/theme-forecast.json";
pub const STOCK_BOARD_FEED_PATH: &str = "data/latest.json";
pub const DEFAULT_FEED_BASE_URL: &str = "http://127.0.0.1:8080/";
pub const QUOTE_PAGE_BASE: &str = "https://m.stock.naver.com/domestic/stock";
pub const LOG_FILE_NAME: &str = "krx-theme-tui.log";

/// Connection settings for the upstream PostgREST store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub base_url: String,
    pub anon_key: String,
    pub timeout: Duration,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = env_string("SUPABASE_URL")
            .ok_or(anyhow!("SUPABASE_URL is not set (check your .env)"))?;
        let anon_key = env_string("SUPABASE_ANON_KEY")
            .ok_or(anyhow!("SUPABASE_ANON_KEY is not set (check your .env)"))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            timeout: request_timeout(),
        })
    }
}

/// Where the periodically regenerated JSON feeds are published.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl FeedConfig {
    pub fn from_env() -> Self {
        let base_url = env_string("FEED_BASE_URL").unwrap_or_else(|| {
            info!(
                "FEED_BASE_URL not set, using {}",
                DEFAULT_FEED_BASE_URL
            );
            DEFAULT_FEED_BASE_URL.to_string()
        });

        Self {
            base_url: normalize_base_url(&base_url),
            timeout: request_timeout(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Threshold used by every hit/miss decision in the process.
pub fn hit_threshold_pct() -> f64 {
    *HIT_THRESHOLD.get_or_init(|| match env_string("THEME_HIT_THRESHOLD_PCT") {
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => {
                info!("Using hit threshold {}% from THEME_HIT_THRESHOLD_PCT", v);
                v
            }
            _ => {
                warn!(
                    "Invalid THEME_HIT_THRESHOLD_PCT={} ; defaulting to {}",
                    raw, DEFAULT_HIT_THRESHOLD_PCT
                );
                DEFAULT_HIT_THRESHOLD_PCT
            }
        },
        None => DEFAULT_HIT_THRESHOLD_PCT,
    })
}

fn request_timeout() -> Duration {
    let secs = env_string("THEME_REQUEST_TIMEOUT_SECS")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|v| v.clamp(1, 120))
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
