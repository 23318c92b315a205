use crate::app::HistoryView;
use crate::format::{format_return, quote_url};
use crate::model::{Category, Confidence, PredictionStatus, ThemeForecast};
use crate::schedule::CollectionRound;
use crate::stats::{AccuracyGroup, BacktestStats};
use crate::stock_view::{CategoryFilter, HitOutcome};
use std::fmt::Write;

const RULE: &str = "════════════════════════════════════════════════════════════";

fn group_cell(group: Option<&AccuracyGroup>) -> String {
    match group {
        Some(g) => format!("{:>5.1}% ({}/{})", g.accuracy, g.hit, g.total),
        None => "-".to_string(),
    }
}

pub fn stats_report(stats: &BacktestStats, hit_threshold_pct: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  Theme prediction backtest (hit ≥ {}%)", hit_threshold_pct);
    let _ = writeln!(out, "{}", RULE);

    if !stats.has_data() {
        let _ = writeln!(out, "  No evaluated predictions yet.");
        return out;
    }

    let _ = writeln!(out, "  Overall      {}", group_cell(Some(&stats.overall)));
    let _ = writeln!(out, "  By confidence");
    for confidence in Confidence::ALL {
        let _ = writeln!(
            out,
            "    {:<10} {}",
            confidence.as_str(),
            group_cell(stats.by_confidence.get(confidence.as_str()))
        );
    }
    if let Some(group) = stats.by_confidence.get(crate::config::UNKNOWN_BUCKET) {
        let _ = writeln!(out, "    {:<10} {}", crate::config::UNKNOWN_BUCKET, group_cell(Some(group)));
    }

    let _ = writeln!(out, "  By category");
    for category in Category::ALL {
        let _ = writeln!(
            out,
            "    {:<10} {}",
            category.as_str(),
            group_cell(stats.by_category.get(category.as_str()))
        );
    }
    if let Some(group) = stats.by_category.get(crate::config::UNKNOWN_BUCKET) {
        let _ = writeln!(out, "    {:<10} {}", crate::config::UNKNOWN_BUCKET, group_cell(Some(group)));
    }
    out
}

pub fn history_report(view: &HistoryView, filter: CategoryFilter, hit_threshold_pct: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Prediction history ({} days, category: {})", view.dates.len(), filter.label());

    for (group, day) in view.dates.iter().zip(view.stock_days.iter()) {
        let _ = write!(
            out,
            "\n{}  hit {} / missed {} / active {}",
            group.date,
            group.count_status(PredictionStatus::Hit),
            group.count_status(PredictionStatus::Missed),
            group.count_status(PredictionStatus::Active),
        );
        if let Some(index) = day.index_return {
            let _ = write!(out, "  index {}", format_return(index));
        }
        out.push('\n');

        for stock in day.filtered(filter) {
            let outcome = match stock.hit_outcome(filter, hit_threshold_pct) {
                HitOutcome::Hit => "HIT ",
                HitOutcome::Miss => "MISS",
                HitOutcome::Pending => "....",
                HitOutcome::Indeterminate => "  ? ",
            };
            let ret = stock
                .display_return(filter)
                .map(format_return)
                .unwrap_or_else(|| "-".to_string());
            let themes = stock
                .themes
                .iter()
                .map(|t| t.theme_name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                out,
                "  [{}] {:<14} {:<8} {:>8}  {}",
                outcome, stock.name, stock.code, ret, themes
            );
        }
    }
    out
}

pub fn forecast_report(forecast: Option<&ThemeForecast>) -> String {
    let Some(forecast) = forecast else {
        return "No forecast published yet.\n".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(
        out,
        "  Theme forecast {} (generated {})",
        forecast.forecast_date,
        forecast.generated_time()
    );
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "{}", forecast.market_context);

    for category in Category::ALL {
        let themes = forecast.themes(category);
        let _ = writeln!(out, "\n[{}] {} theme(s)", category.display_name(), themes.len());
        for theme in themes {
            let _ = writeln!(out, "  * {} ({})", theme.theme_name, theme.confidence);
            for stock in &theme.leader_stocks {
                let mark = if stock.data_verified { "" } else { " 추정" };
                let _ = writeln!(
                    out,
                    "      {}. {} {}{}  {}",
                    stock.priority,
                    stock.name,
                    stock.code,
                    mark,
                    quote_url(&stock.code)
                );
            }
        }
    }
    out
}

pub fn schedule_report(round: &CollectionRound) -> String {
    match (round.round_text(), round.next_update()) {
        (Some(text), Some(next)) => format!("{} {} (next update {})\n", round.label(), text, next),
        _ => format!("{}\n", round.label()),
    }
}
