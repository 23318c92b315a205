use crate::config::UNKNOWN_BUCKET;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Key inside `actual_performance` holding the benchmark index return.
pub const INDEX_RETURN_KEY: &str = "index_return";

/// Prediction horizon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Today,
    ShortTerm,
    LongTerm,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Today, Category::ShortTerm, Category::LongTerm];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "today" => Some(Self::Today),
            "short_term" => Some(Self::ShortTerm),
            "long_term" => Some(Self::LongTerm),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::ShortTerm => "short_term",
            Self::LongTerm => "long_term",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::ShortTerm => "Short-term (≤7d)",
            Self::LongTerm => "Long-term (≤1mo)",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "높음")]
    High,
    #[serde(rename = "보통")]
    Medium,
    #[serde(rename = "낮음")]
    Low,
}

impl Confidence {
    pub const ALL: [Confidence; 3] = [Confidence::High, Confidence::Medium, Confidence::Low];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "높음" => Some(Self::High),
            "보통" => Some(Self::Medium),
            "낮음" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "높음",
            Self::Medium => "보통",
            Self::Low => "낮음",
        }
    }
}

/// Bucket key for an optional label, `N/A` when absent.
pub fn bucket_key(label: Option<&'static str>) -> String {
    label.unwrap_or(UNKNOWN_BUCKET).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Active,
    Hit,
    Missed,
    Expired,
}

impl PredictionStatus {
    /// Unknown values fall back to `Active`, the neutral "not judged yet" state.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "hit" => Self::Hit,
            "missed" => Self::Missed,
            "expired" => Self::Expired,
            _ => Self::Active,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Hit => "hit",
            Self::Missed => "missed",
            Self::Expired => "expired",
        }
    }

    /// Hit or missed: the return was measured and judged.
    pub fn is_evaluated(self) -> bool {
        matches!(self, Self::Hit | Self::Missed)
    }
}

/// A column that upstream writers sometimes store as a JSON-encoded string.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum MaybeEncoded<T> {
    Structured(T),
    Encoded(String),
    Other(serde_json::Value),
}

impl<T: DeserializeOwned> MaybeEncoded<T> {
    /// Decodes either representation. Garbage is logged and dropped.
    pub fn decode(self, field: &str) -> Option<T> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Encoded(text) => match serde_json::from_str::<T>(&text) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!("Could not parse encoded {} ({}), ignoring it", field, err);
                    None
                }
            },
            Self::Other(value) => {
                warn!("Unexpected shape for {}: {}", field, value);
                None
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderStock {
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub name: String,
    pub code: String,
}

/// Realised returns keyed by stock code, plus `index_return`. Values can still be null.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActualPerformance(pub HashMap<String, Option<f64>>);

impl ActualPerformance {
    pub fn return_for(&self, code: &str) -> Option<f64> {
        self.0.get(code).copied().flatten()
    }

    pub fn index_return(&self) -> Option<f64> {
        self.return_for(INDEX_RETURN_KEY)
    }
}

/// A theme prediction row exactly as the store returns it.
#[derive(Clone, Debug, Deserialize)]
pub struct PredictionRow {
    #[serde(default)]
    pub id: i64,
    pub prediction_date: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub theme_name: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub leader_stocks: Option<MaybeEncoded<Vec<LeaderStock>>>,
    #[serde(default)]
    pub actual_performance: Option<MaybeEncoded<ActualPerformance>>,
    #[serde(default)]
    pub evaluated_at: Option<String>,
}

/// One theme's prediction for one date, normalized.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub prediction_date: String,
    pub category: Option<Category>,
    pub theme_name: String,
    pub confidence: Option<Confidence>,
    pub status: PredictionStatus,
    pub leader_stocks: Vec<LeaderStock>,
    pub actual_performance: Option<ActualPerformance>,
    pub evaluated_at: Option<String>,
}

impl From<PredictionRow> for PredictionRecord {
    fn from(row: PredictionRow) -> Self {
        let leader_stocks = row
            .leader_stocks
            .and_then(|v| v.decode("leader_stocks"))
            .unwrap_or_default();
        let actual_performance = row
            .actual_performance
            .and_then(|v| v.decode("actual_performance"));

        Self {
            id: row.id,
            prediction_date: row.prediction_date,
            category: row.category.as_deref().and_then(Category::parse),
            theme_name: row.theme_name.unwrap_or_default(),
            confidence: row.confidence.as_deref().and_then(Confidence::parse),
            status: row
                .status
                .as_deref()
                .map(PredictionStatus::parse)
                .unwrap_or(PredictionStatus::Active),
            leader_stocks,
            actual_performance,
            evaluated_at: row.evaluated_at,
        }
    }
}

impl PredictionRecord {
    pub fn return_for(&self, code: &str) -> Option<f64> {
        self.actual_performance.as_ref().and_then(|p| p.return_for(code))
    }

    pub fn index_return(&self) -> Option<f64> {
        self.actual_performance.as_ref().and_then(|p| p.index_return())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PredictionsByDate {
    pub date: String,
    pub predictions: Vec<PredictionRecord>,
}

impl PredictionsByDate {
    pub fn count_status(&self, status: PredictionStatus) -> usize {
        self.predictions.iter().filter(|p| p.status == status).count()
    }
}

/// Groups records by `prediction_date`, newest date first. Order within a date is kept.
pub fn group_by_date(records: Vec<PredictionRecord>) -> Vec<PredictionsByDate> {
    let mut groups: Vec<PredictionsByDate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        match index.get(&record.prediction_date) {
            Some(&i) => groups[i].predictions.push(record),
            None => {
                index.insert(record.prediction_date.clone(), groups.len());
                groups.push(PredictionsByDate {
                    date: record.prediction_date.clone(),
                    predictions: vec![record],
                });
            }
        }
    }

    groups.sort_by(|a, b| b.date.cmp(&a.date));
    groups
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiAlert {
    pub id: String,
    pub service_name: String,
    pub error_type: String,
    #[serde(default)]
    pub error_message: Option<String>,
    pub detected_at: String,
}

impl ApiAlert {
    /// `service — type: message`, message cut to 80 chars.
    pub fn summary(&self) -> String {
        match self.error_message.as_deref() {
            Some(msg) if !msg.is_empty() => {
                let short: String = msg.chars().take(80).collect();
                format!("{} — {}: {}", self.service_name, self.error_type, short)
            }
            _ => format!("{} — {}", self.service_name, self.error_type),
        }
    }
}

// ── Static feeds ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastStock {
    #[serde(default)]
    pub priority: u32,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub data_verified: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastTheme {
    pub theme_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub catalyst: String,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub target_period: Option<String>,
    #[serde(default)]
    pub leader_stocks: Vec<ForecastStock>,
}

impl ForecastTheme {
    pub fn confidence_level(&self) -> Option<Confidence> {
        Confidence::parse(&self.confidence)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewsSource {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThemeForecast {
    pub forecast_date: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub market_context: String,
    #[serde(default)]
    pub us_market_summary: Option<String>,
    #[serde(default)]
    pub news_sources: Vec<serde_json::Value>,
    #[serde(default)]
    pub today: Vec<ForecastTheme>,
    #[serde(default)]
    pub short_term: Vec<ForecastTheme>,
    #[serde(default)]
    pub long_term: Vec<ForecastTheme>,
}

impl ThemeForecast {
    pub fn themes(&self, category: Category) -> &[ForecastTheme] {
        match category {
            Category::Today => &self.today,
            Category::ShortTerm => &self.short_term,
            Category::LongTerm => &self.long_term,
        }
    }

    /// `HH:MM:SS` part of `generated_at`, or the whole value when it has no space.
    pub fn generated_time(&self) -> &str {
        self.generated_at
            .split_once(' ')
            .map(|(_, time)| time)
            .unwrap_or(&self.generated_at)
    }

    /// Headline and link for each cited source; entries may be bare strings.
    pub fn sources(&self) -> Vec<NewsSource> {
        self.news_sources
            .iter()
            .filter_map(|v| match v {
                serde_json::Value::String(title) => Some(NewsSource {
                    title: title.clone(),
                    url: None,
                }),
                other => serde_json::from_value::<NewsSource>(other.clone()).ok(),
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub rank: u32,
    pub code: String,
    pub name: String,
    pub current_price: f64,
    pub change_rate: f64,
    #[serde(default)]
    pub volume: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSplit {
    #[serde(default)]
    pub kospi: Vec<Stock>,
    #[serde(default)]
    pub kosdaq: Vec<Stock>,
}

impl MarketSplit {
    pub fn len(&self) -> usize {
        self.kospi.len() + self.kosdaq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryChange {
    pub date: String,
    pub change_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockHistory {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub changes: Vec<HistoryChange>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: String,
    #[serde(default)]
    pub currency_name: String,
    pub rate: f64,
    #[serde(default)]
    pub is_100: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeData {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub search_date: String,
    #[serde(default)]
    pub rates: Vec<ExchangeRate>,
}

/// Daily movers snapshot exported by the collector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockBoard {
    pub timestamp: String,
    #[serde(default)]
    pub exchange: ExchangeData,
    #[serde(default)]
    pub rising: MarketSplit,
    #[serde(default)]
    pub falling: MarketSplit,
    #[serde(default)]
    pub history: HashMap<String, StockHistory>,
}

impl StockBoard {
    /// Last three daily changes, oldest first, labelled D-2 / D-1 / D.
    pub fn recent_changes(&self, code: &str) -> Vec<(&'static str, f64)> {
        const LABELS: [&str; 3] = ["D-2", "D-1", "D"];
        let Some(history) = self.history.get(code) else {
            return Vec::new();
        };
        history
            .changes
            .iter()
            .take(LABELS.len())
            .rev()
            .zip(LABELS)
            .map(|(change, label)| (label, change.change_rate))
            .collect()
    }
}
