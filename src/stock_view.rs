use crate::model::{Category, Confidence, PredictionStatus, PredictionsByDate};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// One slot per prediction horizon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PerCategory<T> {
    pub today: T,
    pub short_term: T,
    pub long_term: T,
}

impl<T> PerCategory<T> {
    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::Today => &self.today,
            Category::ShortTerm => &self.short_term,
            Category::LongTerm => &self.long_term,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Today => &mut self.today,
            Category::ShortTerm => &mut self.short_term,
            Category::LongTerm => &mut self.long_term,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThemeInfo {
    pub prediction_id: i64,
    pub theme_name: String,
    pub category: Option<Category>,
    pub confidence: Option<Confidence>,
    pub status: PredictionStatus,
    pub priority: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StockPrediction {
    pub code: String,
    pub name: String,
    pub return_by_category: PerCategory<Option<f64>>,
    pub evaluated_by_category: PerCategory<bool>,
    pub themes: Vec<ThemeInfo>,
}

/// Outcome of a stock for the selected horizon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitOutcome {
    Hit,
    Miss,
    /// Not judged yet, or no return recorded.
    Pending,
    /// Themes of several horizons and no horizon selected: which return applies is ambiguous.
    Indeterminate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" | "all" => Some(Self::All),
            other => Category::parse(other).map(Self::Only),
        }
    }

    /// All -> today -> short_term -> long_term -> All.
    pub fn next(self) -> Self {
        match self {
            Self::All => Self::Only(Category::Today),
            Self::Only(Category::Today) => Self::Only(Category::ShortTerm),
            Self::Only(Category::ShortTerm) => Self::Only(Category::LongTerm),
            Self::Only(Category::LongTerm) => Self::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Only(category) => category.as_str(),
        }
    }
}

impl StockPrediction {
    /// Distinct horizons among the themes naming this stock.
    pub fn categories(&self) -> BTreeSet<Category> {
        self.themes.iter().filter_map(|t| t.category).collect()
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.themes.iter().any(|t| t.category == Some(category))
    }

    pub fn hit_outcome(&self, filter: CategoryFilter, hit_threshold_pct: f64) -> HitOutcome {
        let category = match filter {
            CategoryFilter::Only(category) => category,
            CategoryFilter::All => {
                let categories = self.categories();
                if categories.len() > 1 {
                    return HitOutcome::Indeterminate;
                }
                match categories.into_iter().next() {
                    Some(category) => category,
                    None => return HitOutcome::Pending,
                }
            }
        };

        if !*self.evaluated_by_category.get(category) {
            return HitOutcome::Pending;
        }
        match *self.return_by_category.get(category) {
            Some(ret) if ret >= hit_threshold_pct => HitOutcome::Hit,
            Some(_) => HitOutcome::Miss,
            None => HitOutcome::Pending,
        }
    }

    /// Return shown for the filter; for `All` only when a single horizon is involved.
    pub fn display_return(&self, filter: CategoryFilter) -> Option<f64> {
        match filter {
            CategoryFilter::Only(category) => *self.return_by_category.get(category),
            CategoryFilter::All => {
                let categories = self.categories();
                if categories.len() == 1 {
                    categories
                        .into_iter()
                        .next()
                        .and_then(|c| *self.return_by_category.get(c))
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StockDay {
    pub date: String,
    /// Benchmark return reported alongside the predictions of this date.
    pub index_return: Option<f64>,
    pub stocks: Vec<StockPrediction>,
}

impl StockDay {
    pub fn filtered(&self, filter: CategoryFilter) -> Vec<&StockPrediction> {
        self.stocks
            .iter()
            .filter(|s| match filter {
                CategoryFilter::All => true,
                CategoryFilter::Only(category) => s.has_category(category),
            })
            .collect()
    }
}

/// Builds the per-date stock lists. Stocks keep first-sighting order; dates keep input order.
pub fn build_stock_days(dates: &[PredictionsByDate]) -> Vec<StockDay> {
    dates.iter().map(build_stock_day).collect()
}

fn build_stock_day(group: &PredictionsByDate) -> StockDay {
    let mut stocks: Vec<StockPrediction> = Vec::new();
    let mut by_code: HashMap<&str, usize> = HashMap::new();

    for pred in &group.predictions {
        for leader in &pred.leader_stocks {
            let ret = pred.return_for(&leader.code);
            let evaluated = pred.status.is_evaluated();
            let theme = ThemeInfo {
                prediction_id: pred.id,
                theme_name: pred.theme_name.clone(),
                category: pred.category,
                confidence: pred.confidence,
                status: pred.status,
                priority: leader.priority,
            };

            match by_code.get(leader.code.as_str()) {
                Some(&idx) => {
                    let entry = &mut stocks[idx];
                    entry.themes.push(theme);
                    if let Some(category) = pred.category {
                        let slot = entry.return_by_category.get_mut(category);
                        if slot.is_none() {
                            *slot = ret;
                        }
                        *entry.evaluated_by_category.get_mut(category) |= evaluated;
                    }
                }
                None => {
                    let mut entry = StockPrediction {
                        code: leader.code.clone(),
                        name: leader.name.clone(),
                        return_by_category: PerCategory::default(),
                        evaluated_by_category: PerCategory::default(),
                        themes: vec![theme],
                    };
                    if let Some(category) = pred.category {
                        *entry.return_by_category.get_mut(category) = ret;
                        *entry.evaluated_by_category.get_mut(category) = evaluated;
                    }
                    by_code.insert(leader.code.as_str(), stocks.len());
                    stocks.push(entry);
                }
            }
        }
    }

    let index_return = group.predictions.iter().find_map(|p| p.index_return());

    StockDay {
        date: group.date.clone(),
        index_return,
        stocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_HIT_THRESHOLD_PCT;
    use crate::model::{ActualPerformance, LeaderStock, PredictionRecord};

    fn pred(
        id: i64,
        category: Category,
        status: PredictionStatus,
        stocks: &[(&str, Option<f64>)],
    ) -> PredictionRecord {
        PredictionRecord {
            id,
            prediction_date: "2026-01-05".to_string(),
            category: Some(category),
            theme_name: format!("theme-{}", id),
            confidence: Some(Confidence::Medium),
            status,
            leader_stocks: stocks
                .iter()
                .map(|(code, _)| LeaderStock {
                    priority: 1,
                    name: format!("name-{}", code),
                    code: code.to_string(),
                })
                .collect(),
            actual_performance: Some(ActualPerformance(
                stocks.iter().map(|(c, r)| (c.to_string(), *r)).collect(),
            )),
            evaluated_at: None,
        }
    }

    fn day(predictions: Vec<PredictionRecord>) -> StockDay {
        let groups = vec![PredictionsByDate {
            date: "2026-01-05".to_string(),
            predictions,
        }];
        build_stock_days(&groups).remove(0)
    }

    #[test]
    fn test_two_categories_merge_into_one_entry() {
        let d = day(vec![
            pred(1, Category::Today, PredictionStatus::Hit, &[("005930", Some(3.1))]),
            pred(2, Category::LongTerm, PredictionStatus::Active, &[("005930", Some(-0.4))]),
        ]);

        assert_eq!(d.stocks.len(), 1);
        let s = &d.stocks[0];
        assert_eq!(s.themes.len(), 2);
        assert_eq!(s.return_by_category.today, Some(3.1));
        assert_eq!(s.return_by_category.long_term, Some(-0.4));
        assert_eq!(s.return_by_category.short_term, None);
        assert!(s.evaluated_by_category.today);
        assert!(!s.evaluated_by_category.long_term);
    }

    #[test]
    fn test_first_non_null_return_wins_and_evaluated_is_ored() {
        let d = day(vec![
            pred(1, Category::Today, PredictionStatus::Active, &[("A", None)]),
            pred(2, Category::Today, PredictionStatus::Hit, &[("A", Some(2.4))]),
            pred(3, Category::Today, PredictionStatus::Missed, &[("A", Some(-7.0))]),
        ]);
        let s = &d.stocks[0];
        assert_eq!(s.return_by_category.today, Some(2.4));
        assert!(s.evaluated_by_category.today);
        assert_eq!(s.themes.len(), 3);
    }

    #[test]
    fn test_hit_outcome_single_category() {
        let d = day(vec![pred(1, Category::ShortTerm, PredictionStatus::Hit, &[("A", Some(2.0)), ("B", Some(1.9))])]);
        let t = DEFAULT_HIT_THRESHOLD_PCT;
        assert_eq!(d.stocks[0].hit_outcome(CategoryFilter::All, t), HitOutcome::Hit);
        assert_eq!(d.stocks[1].hit_outcome(CategoryFilter::All, t), HitOutcome::Miss);
        assert_eq!(
            d.stocks[0].hit_outcome(CategoryFilter::Only(Category::ShortTerm), t),
            HitOutcome::Hit
        );
        assert_eq!(
            d.stocks[0].hit_outcome(CategoryFilter::Only(Category::Today), t),
            HitOutcome::Pending
        );
    }

    #[test]
    fn test_hit_outcome_ambiguous_across_categories() {
        let d = day(vec![
            pred(1, Category::Today, PredictionStatus::Hit, &[("A", Some(5.0))]),
            pred(2, Category::ShortTerm, PredictionStatus::Missed, &[("A", Some(0.5))]),
        ]);
        let s = &d.stocks[0];
        let t = DEFAULT_HIT_THRESHOLD_PCT;
        assert_eq!(s.hit_outcome(CategoryFilter::All, t), HitOutcome::Indeterminate);
        assert_eq!(s.display_return(CategoryFilter::All), None);
        assert_eq!(s.hit_outcome(CategoryFilter::Only(Category::Today), t), HitOutcome::Hit);
        assert_eq!(s.hit_outcome(CategoryFilter::Only(Category::ShortTerm), t), HitOutcome::Miss);
        assert_eq!(s.display_return(CategoryFilter::Only(Category::ShortTerm)), Some(0.5));
    }

    #[test]
    fn test_unevaluated_is_pending() {
        let d = day(vec![pred(1, Category::Today, PredictionStatus::Active, &[("A", Some(4.0))])]);
        assert_eq!(
            d.stocks[0].hit_outcome(CategoryFilter::All, DEFAULT_HIT_THRESHOLD_PCT),
            HitOutcome::Pending
        );
    }

    #[test]
    fn test_filter_selects_stocks_and_order_is_first_sighting() {
        let d = day(vec![
            pred(1, Category::Today, PredictionStatus::Hit, &[("B", Some(1.0)), ("A", Some(1.0))]),
            pred(2, Category::LongTerm, PredictionStatus::Hit, &[("C", Some(1.0)), ("A", Some(1.0))]),
        ]);
        let codes: Vec<&str> = d.stocks.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["B", "A", "C"]);

        let long: Vec<&str> = d
            .filtered(CategoryFilter::Only(Category::LongTerm))
            .iter()
            .map(|s| s.code.as_str())
            .collect();
        assert_eq!(long, vec!["A", "C"]);
        assert_eq!(d.filtered(CategoryFilter::All).len(), 3);
    }

    #[test]
    fn test_filter_cycle_and_parse() {
        let mut f = CategoryFilter::All;
        for _ in 0..4 {
            f = f.next();
        }
        assert_eq!(f, CategoryFilter::All);
        assert_eq!(CategoryFilter::parse("short_term"), Some(CategoryFilter::Only(Category::ShortTerm)));
        assert_eq!(CategoryFilter::parse("all"), Some(CategoryFilter::All));
        assert_eq!(CategoryFilter::parse("weekly"), None);
    }

    #[test]
    fn test_index_return_taken_from_day() {
        let mut p = pred(1, Category::Today, PredictionStatus::Hit, &[("A", Some(1.0))]);
        if let Some(perf) = p.actual_performance.as_mut() {
            perf.0.insert("index_return".to_string(), Some(-0.8));
        }
        assert_eq!(day(vec![p]).index_return, Some(-0.8));
    }
}
