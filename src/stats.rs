use crate::model::{bucket_key, PredictionRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct AccuracyGroup {
    pub total: usize,
    pub hit: usize,
    /// Percent with one decimal, 0 when `total == 0`.
    pub accuracy: f64,
}

impl AccuracyGroup {
    pub fn new(total: usize, hit: usize) -> Self {
        let accuracy = if total > 0 {
            (hit as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self { total, hit, accuracy }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    total: usize,
    hit: usize,
}

impl Tally {
    fn add(&mut self, is_hit: bool) {
        self.total += 1;
        if is_hit {
            self.hit += 1;
        }
    }

    fn group(self) -> AccuracyGroup {
        AccuracyGroup::new(self.total, self.hit)
    }
}

/// One counted (date, stock) outcome.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StockOutcome {
    pub date: String,
    pub code: String,
    pub name: String,
    pub theme_name: String,
    pub return_pct: f64,
    pub is_hit: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BacktestStats {
    pub overall: AccuracyGroup,
    pub by_confidence: BTreeMap<String, AccuracyGroup>,
    pub by_category: BTreeMap<String, AccuracyGroup>,
    /// Per-confidence outcomes, newest date first.
    pub details_by_confidence: BTreeMap<String, Vec<StockOutcome>>,
}

impl BacktestStats {
    pub fn has_data(&self) -> bool {
        self.overall.total > 0
    }
}

/// Aggregates hit/miss counts. Records not yet judged (status other than hit/missed) are ignored.
pub fn compute_backtest_stats(records: &[PredictionRecord], hit_threshold_pct: f64) -> BacktestStats {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut overall = Tally::default();
    let mut by_confidence: BTreeMap<String, Tally> = BTreeMap::new();
    let mut by_category: BTreeMap<String, Tally> = BTreeMap::new();
    let mut details: BTreeMap<String, Vec<StockOutcome>> = BTreeMap::new();

    for record in records.iter().filter(|r| r.status.is_evaluated()) {
        for stock in &record.leader_stocks {
            // First sighting claims the (date, code) slot even if its return is still null.
            if !seen.insert((record.prediction_date.as_str(), stock.code.as_str())) {
                continue;
            }

            let Some(ret) = record.return_for(&stock.code) else {
                continue;
            };
            let is_hit = ret >= hit_threshold_pct;

            let confidence = bucket_key(record.confidence.map(|c| c.as_str()));
            let category = bucket_key(record.category.map(|c| c.as_str()));

            overall.add(is_hit);
            by_confidence.entry(confidence.clone()).or_default().add(is_hit);
            by_category.entry(category).or_default().add(is_hit);

            details.entry(confidence).or_default().push(StockOutcome {
                date: record.prediction_date.clone(),
                code: stock.code.clone(),
                name: stock.name.clone(),
                theme_name: record.theme_name.clone(),
                return_pct: ret,
                is_hit,
            });
        }
    }

    for rows in details.values_mut() {
        rows.sort_by(|a, b| b.date.cmp(&a.date));
    }

    BacktestStats {
        overall: overall.group(),
        by_confidence: by_confidence.into_iter().map(|(k, t)| (k, t.group())).collect(),
        by_category: by_category.into_iter().map(|(k, t)| (k, t.group())).collect(),
        details_by_confidence: details,
    }
}
