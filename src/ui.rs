use crate::app::{App, HistoryView, Tab};
use crate::config::UNKNOWN_BUCKET;
use crate::format::{
    change_band, change_tone, format_change_rate, format_price, format_return, format_volume,
    quote_url, ChangeBand, ChangeTone,
};
use crate::model::{
    Category, Confidence, ForecastTheme, PredictionStatus, Stock, StockBoard, ThemeForecast,
};
use crate::remote::Fetch;
use crate::schedule;
use crate::stats::{AccuracyGroup, BacktestStats};
use crate::stock_view::{CategoryFilter, HitOutcome};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState, Tabs, Wrap},
    Frame,
};

pub fn render(f: &mut Frame, app: &App) {
    let alert_height = if app.alerts.is_empty() {
        0
    } else {
        (app.alerts.len() as u16).min(4) + 2
    };

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(alert_height),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, app, layout[0]);
    if alert_height > 0 {
        render_alerts(f, app, layout[1]);
    }

    match app.tab {
        Tab::Movers => render_movers(f, app, layout[2]),
        Tab::Forecast => render_forecast(f, app, layout[2]),
        Tab::Backtest => render_backtest(f, app, layout[2]),
        Tab::History => render_history(f, app, layout[2]),
    }

    render_footer(f, app, layout[3]);
}

fn tone_color(tone: ChangeTone) -> Color {
    match tone {
        ChangeTone::Up => Color::Red,
        ChangeTone::Down => Color::Blue,
        ChangeTone::Flat => Color::Gray,
    }
}

fn band_color(band: ChangeBand) -> Color {
    match band {
        ChangeBand::StrongUp => Color::Red,
        ChangeBand::Up | ChangeBand::MildUp => Color::LightRed,
        ChangeBand::StrongDown => Color::Blue,
        ChangeBand::Down | ChangeBand::MildDown => Color::LightBlue,
        ChangeBand::Flat => Color::Gray,
    }
}

fn confidence_color(confidence: Option<Confidence>) -> Color {
    match confidence {
        Some(Confidence::High) => Color::Red,
        Some(Confidence::Medium) => Color::Yellow,
        Some(Confidence::Low) | None => Color::Gray,
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(34)])
        .split(area);

    let titles: Vec<Line> = Tab::ALL
        .iter()
        .map(|t| Line::from(t.title()))
        .collect();
    let selected = Tab::ALL.iter().position(|t| *t == app.tab).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(
                    " KRX Theme Dashboard ",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )),
        )
        .style(Style::default().fg(Color::Gray))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, chunks[0]);

    let round = schedule::resolve_now(chrono::Utc::now());
    let mut spans = vec![
        Span::styled("수급 ", Style::default().fg(Color::Gray)),
        Span::styled(round.label(), Style::default().fg(Color::Yellow)),
    ];
    if let Some(text) = round.round_text() {
        spans.push(Span::raw(format!(" {}", text)));
    }
    if let Some(next) = round.next_update() {
        spans.push(Span::styled(format!(" next {}", next), Style::default().fg(Color::Gray)));
    }
    let status = Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, chunks[1]);
}

fn render_alerts(f: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = app
        .alerts
        .iter()
        .take(4)
        .map(|a| Line::from(a.summary()))
        .collect();
    let banner = Paragraph::new(lines)
        .style(Style::default().fg(Color::Red))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" API key errors ({}) ", app.alerts.len())),
        );
    f.render_widget(banner, area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let hint = match app.tab {
        Tab::Movers => "Tab: switch | ↑/↓: select | r: refresh | q/Esc: quit",
        Tab::History => "Tab: switch | ↑/↓: scroll | c: category | r: refresh | q/Esc: quit",
        _ => "Tab: switch | ↑/↓: scroll | r: refresh | q/Esc: quit",
    };

    let mut spans = vec![
        Span::styled(" Controls: ", Style::default().fg(Color::Gray)),
        Span::styled(hint, Style::default().fg(Color::White)),
    ];
    if app.tab == Tab::Movers {
        if let Some(stock) = app.selected_stock() {
            spans.push(Span::raw("  "));
            spans.push(Span::styled(quote_url(&stock.code), Style::default().fg(Color::Cyan)));
        }
    }

    let footer = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

/// Renders the loading / failed placeholder. Returns true when the caller should stop.
fn render_fetch_placeholder<T>(f: &mut Frame, fetch: &Fetch<T>, what: &str, area: Rect) -> bool {
    let (text, color) = match fetch {
        Fetch::Loading => (format!("Loading {}...", what), Color::Gray),
        Fetch::Failed(message) => (message.clone(), Color::Red),
        Fetch::Ready(_) => return false,
    };
    let p = Paragraph::new(text)
        .alignment(Alignment::Center)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
    true
}

fn render_empty(f: &mut Frame, text: &str, area: Rect) {
    let p = Paragraph::new(text)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

// ── Movers ──────────────────────────────────────────────────────────────────

fn render_movers(f: &mut Frame, app: &App, area: Rect) {
    if render_fetch_placeholder(f, &app.board, "market movers", area) {
        return;
    }
    let Some(Some(board)) = app.board.data() else {
        render_empty(f, "No market snapshot published yet.", area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);

    let mut meta = vec![Span::styled(
        format!(" Updated {}", board.timestamp),
        Style::default().fg(Color::Gray),
    )];
    for rate in board.exchange.rates.iter().take(4) {
        let unit = if rate.is_100 { "100" } else { "" };
        meta.push(Span::raw(format!("  {}{} {}", unit, rate.currency, format_price(rate.rate))));
    }
    f.render_widget(Paragraph::new(Line::from(meta)), chunks[0]);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    let rising_len = board.rising.len();
    let (rising_sel, falling_sel) = if app.selected < rising_len {
        (Some(app.selected), None)
    } else {
        (None, Some(app.selected - rising_len))
    };

    render_mover_table(f, board, true, rising_sel, halves[0]);
    render_mover_table(f, board, false, falling_sel, halves[1]);
}

fn mover_row<'a>(board: &StockBoard, market: &'a str, stock: &'a Stock) -> Row<'a> {
    let color = tone_color(change_tone(stock.change_rate));
    let chips: Vec<Span> = board
        .recent_changes(&stock.code)
        .into_iter()
        .map(|(label, rate)| {
            Span::styled(
                format!("{} {:+.1}% ", label, rate),
                Style::default().fg(band_color(change_band(rate))),
            )
        })
        .collect();

    Row::new(vec![
        Cell::from(stock.rank.to_string()),
        Cell::from(market),
        Cell::from(format!("{} ({})", stock.name, stock.code)),
        Cell::from(format!("{}원", format_price(stock.current_price))),
        Cell::from(Span::styled(format_change_rate(stock.change_rate), Style::default().fg(color))),
        Cell::from(format_volume(stock.volume)),
        Cell::from(Line::from(chips)),
    ])
}

fn render_mover_table(f: &mut Frame, board: &StockBoard, rising: bool, selected: Option<usize>, area: Rect) {
    let split = if rising { &board.rising } else { &board.falling };
    let (title, color) = if rising {
        (format!(" Rising ({}) ", split.len()), Color::Red)
    } else {
        (format!(" Falling ({}) ", split.len()), Color::Blue)
    };

    let rows: Vec<Row> = split
        .kospi
        .iter()
        .map(|s| mover_row(board, "KOSPI", s))
        .chain(split.kosdaq.iter().map(|s| mover_row(board, "KOSDAQ", s)))
        .collect();

    if split.is_empty() {
        let p = Paragraph::new("No stocks")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(p, area);
        return;
    }

    let header = Row::new(vec!["#", "Mkt", "Name", "Price", "Chg", "Vol", "3d"])
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Length(7),
            Constraint::Min(16),
            Constraint::Length(12),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Length(30),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(title, Style::default().fg(color).add_modifier(Modifier::BOLD))),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    let mut state = TableState::default().with_selected(selected);
    f.render_stateful_widget(table, area, &mut state);
}

// ── Forecast ────────────────────────────────────────────────────────────────

fn render_forecast(f: &mut Frame, app: &App, area: Rect) {
    if render_fetch_placeholder(f, &app.forecast, "forecast", area) {
        return;
    }
    let Some(Some(forecast)) = app.forecast.data() else {
        render_empty(
            f,
            "No forecast yet. It is generated before the next market open (07:30 KST).",
            area,
        );
        return;
    };

    let p = Paragraph::new(forecast_lines(forecast))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(
                    " AI theme forecast {} (generated {}) ",
                    forecast.forecast_date,
                    forecast.generated_time()
                )),
        );
    f.render_widget(p, area);
}

fn forecast_lines(forecast: &ThemeForecast) -> Vec<Line<'_>> {
    let mut lines = vec![Line::from(Span::styled(
        forecast.market_context.as_str(),
        Style::default().fg(Color::Gray),
    ))];
    if let Some(us) = forecast.us_market_summary.as_deref().filter(|s| !s.is_empty()) {
        lines.push(Line::from(Span::styled(
            format!("US: {}", us),
            Style::default().fg(Color::LightBlue),
        )));
    }

    for category in Category::ALL {
        let themes = forecast.themes(category);
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{} ({})", category.display_name(), themes.len()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )));
        if themes.is_empty() {
            lines.push(Line::from(Span::styled("  no themes", Style::default().fg(Color::DarkGray))));
        }
        for theme in themes {
            lines.extend(theme_lines(theme));
        }
    }

    let sources = forecast.sources();
    if !sources.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Sources", Style::default().fg(Color::Gray))));
        for source in sources {
            lines.push(Line::from(format!("  - {}", source.title)));
        }
    }
    lines
}

fn theme_lines(theme: &ForecastTheme) -> Vec<Line<'_>> {
    let mut header = vec![
        Span::styled("● ", Style::default().fg(confidence_color(theme.confidence_level()))),
        Span::styled(theme.theme_name.as_str(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(" [{}]", theme.confidence)),
    ];
    if let Some(period) = theme.target_period.as_deref() {
        header.push(Span::styled(format!(" {}", period), Style::default().fg(Color::Gray)));
    }

    let mut lines = vec![
        Line::from(header),
        Line::from(format!("    {}", theme.description)),
        Line::from(Span::styled(format!("    ⚡ {}", theme.catalyst), Style::default().fg(Color::Yellow))),
    ];

    let mut leaders = vec![Span::styled("    Leaders: ", Style::default().fg(Color::Gray))];
    for stock in &theme.leader_stocks {
        let color = if stock.data_verified { Color::LightBlue } else { Color::DarkGray };
        leaders.push(Span::styled(
            format!("{}.{} ({})", stock.priority, stock.name, stock.code),
            Style::default().fg(color),
        ));
        if !stock.data_verified {
            leaders.push(Span::styled(" 추정", Style::default().fg(Color::Yellow)));
        }
        leaders.push(Span::raw("  "));
    }
    lines.push(Line::from(leaders));
    lines
}

// ── Backtest ────────────────────────────────────────────────────────────────

fn accuracy_color(accuracy: f64) -> Color {
    if accuracy >= 50.0 {
        Color::Green
    } else if accuracy >= 30.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn render_backtest(f: &mut Frame, app: &App, area: Rect) {
    if render_fetch_placeholder(f, &app.stats, "backtest results", area) {
        return;
    }
    let Some(stats) = app.stats.data() else {
        return;
    };
    if !stats.has_data() {
        render_empty(f, "No evaluated predictions yet.", area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Min(0),
        ])
        .split(area);

    let overall = stats.overall;
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Hit rate (≥{}%) ", app.hit_threshold)),
        )
        .gauge_style(Style::default().fg(accuracy_color(overall.accuracy)))
        .percent(overall.accuracy.clamp(0.0, 100.0).round() as u16)
        .label(format!("{}% ({}/{})", overall.accuracy, overall.hit, overall.total));
    f.render_widget(gauge, chunks[0]);

    let mut confidence_cells: Vec<(&str, Option<AccuracyGroup>)> = Confidence::ALL
        .iter()
        .map(|c| (c.as_str(), stats.by_confidence.get(c.as_str()).copied()))
        .collect();
    if let Some(group) = stats.by_confidence.get(UNKNOWN_BUCKET) {
        confidence_cells.push((UNKNOWN_BUCKET, Some(*group)));
    }
    render_group_row(f, " By confidence ", &confidence_cells, chunks[1]);

    let mut category_cells: Vec<(&str, Option<AccuracyGroup>)> = Category::ALL
        .iter()
        .map(|c| (c.display_name(), stats.by_category.get(c.as_str()).copied()))
        .collect();
    if let Some(group) = stats.by_category.get(UNKNOWN_BUCKET) {
        category_cells.push((UNKNOWN_BUCKET, Some(*group)));
    }
    render_group_row(f, " By category ", &category_cells, chunks[2]);

    render_recent_outcomes(f, stats, app.hit_threshold, app.scroll, chunks[3]);
}

fn render_group_row(f: &mut Frame, title: &str, cells: &[(&str, Option<AccuracyGroup>)], area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Ratio(1, cells.len().max(1) as u32); cells.len()])
        .split(inner);

    for ((label, group), column) in cells.iter().zip(columns.iter()) {
        let lines = match group {
            Some(g) => vec![
                Line::from(Span::styled(*label, Style::default().fg(Color::Gray))),
                Line::from(Span::styled(
                    format!("{}%", g.accuracy),
                    Style::default().fg(accuracy_color(g.accuracy)).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(format!("{}/{}", g.hit, g.total), Style::default().fg(Color::Gray))),
            ],
            None => vec![
                Line::from(Span::styled(*label, Style::default().fg(Color::Gray))),
                Line::from(Span::styled("-", Style::default().fg(Color::DarkGray))),
            ],
        };
        f.render_widget(Paragraph::new(lines).alignment(Alignment::Center), *column);
    }
}

fn render_recent_outcomes(f: &mut Frame, stats: &BacktestStats, threshold: f64, scroll: u16, area: Rect) {
    let mut lines = Vec::new();
    let buckets = Confidence::ALL
        .iter()
        .map(|c| (c.as_str(), Some(*c)))
        .chain([(UNKNOWN_BUCKET, None)]);
    for (key, confidence) in buckets {
        let Some(rows) = stats.details_by_confidence.get(key) else {
            continue;
        };
        lines.push(Line::from(Span::styled(
            key,
            Style::default().fg(confidence_color(confidence)).add_modifier(Modifier::BOLD),
        )));
        for row in rows {
            let (mark, color) = if row.is_hit { ("✔", Color::Green) } else { ("✘", Color::Red) };
            lines.push(Line::from(vec![
                Span::styled(format!("  {} ", mark), Style::default().fg(color)),
                Span::raw(format!("{}  {} ({})  ", row.date, row.name, row.theme_name)),
                Span::styled(format_return(row.return_pct), Style::default().fg(tone_color(change_tone(row.return_pct)))),
            ]));
        }
    }

    let p = Paragraph::new(lines)
        .scroll((scroll, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Outcomes per stock (hit ≥ {}%) ", threshold)),
        );
    f.render_widget(p, area);
}

// ── History ─────────────────────────────────────────────────────────────────

fn render_history(f: &mut Frame, app: &App, area: Rect) {
    if render_fetch_placeholder(f, &app.history, "prediction history", area) {
        return;
    }
    let Some(view) = app.history.data() else {
        return;
    };
    if view.dates.is_empty() {
        render_empty(f, "No predictions recorded yet.", area);
        return;
    }

    let p = Paragraph::new(history_lines(view, app.filter, app.hit_threshold))
        .scroll((app.scroll, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(
                    " Prediction history: {} days | category: {} ",
                    view.dates.len(),
                    app.filter.label()
                )),
        );
    f.render_widget(p, area);
}

fn outcome_span(outcome: HitOutcome) -> Span<'static> {
    match outcome {
        HitOutcome::Hit => Span::styled("적중", Style::default().fg(Color::Green)),
        HitOutcome::Miss => Span::styled("미스", Style::default().fg(Color::Red)),
        HitOutcome::Pending => Span::styled("평가중", Style::default().fg(Color::LightBlue)),
        HitOutcome::Indeterminate => Span::styled("복수", Style::default().fg(Color::Gray)),
    }
}

fn history_lines(view: &HistoryView, filter: CategoryFilter, threshold: f64) -> Vec<Line<'_>> {
    let mut lines = Vec::new();

    for (group, day) in view.dates.iter().zip(view.stock_days.iter()) {
        let mut header = vec![
            Span::styled(group.date.as_str(), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("  {} themes", group.predictions.len())),
        ];
        for (status, color) in [
            (PredictionStatus::Hit, Color::Green),
            (PredictionStatus::Missed, Color::Red),
            (PredictionStatus::Active, Color::LightBlue),
        ] {
            let n = group.count_status(status);
            if n > 0 {
                header.push(Span::styled(format!("  {} {}", n, status.as_str()), Style::default().fg(color)));
            }
        }
        if let Some(index) = day.index_return {
            header.push(Span::styled(
                format!("  KOSPI {}", format_return(index)),
                Style::default().fg(Color::Gray),
            ));
        }
        lines.push(Line::from(header));

        for stock in day.filtered(filter) {
            let themes = stock
                .themes
                .iter()
                .map(|t| t.theme_name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let mut spans = vec![
                Span::raw("  "),
                outcome_span(stock.hit_outcome(filter, threshold)),
                Span::raw(format!("  {} ({})", stock.name, stock.code)),
            ];
            if let Some(ret) = stock.display_return(filter) {
                spans.push(Span::styled(
                    format!(" {}", format_return(ret)),
                    Style::default().fg(tone_color(change_tone(ret))),
                ));
            }
            spans.push(Span::styled(format!("  {}", themes), Style::default().fg(Color::DarkGray)));
            lines.push(Line::from(spans));
        }
        lines.push(Line::from(""));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{normalize_base_url, FeedConfig};
    use crate::feed::FeedClient;
    use crate::model::{ActualPerformance, LeaderStock, PredictionRecord};
    use crate::stats::compute_backtest_stats;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::collections::HashMap;
    use std::time::Duration;

    fn app() -> App {
        let feed = FeedClient::new(FeedConfig {
            base_url: normalize_base_url("http://127.0.0.1:9"),
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        App::new(feed, Err(anyhow::anyhow!("SUPABASE_URL is not set")), false)
    }

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|f| render(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_backtest_shows_unlabelled_bucket() {
        let record = PredictionRecord {
            id: 1,
            prediction_date: "2026-01-01".into(),
            category: None,
            theme_name: "Robotics".into(),
            confidence: None,
            status: PredictionStatus::Hit,
            leader_stocks: vec![LeaderStock {
                priority: 1,
                name: "StockX".into(),
                code: "000001".into(),
            }],
            actual_performance: Some(ActualPerformance(HashMap::from([(
                "000001".to_string(),
                Some(3.0),
            )]))),
            evaluated_at: None,
        };

        let mut a = app();
        a.tab = Tab::Backtest;
        a.stats = Fetch::Ready(compute_backtest_stats(&[record], 2.0));

        let text = screen(&a);
        assert!(text.contains("(1/1)"));
        assert!(text.contains("N/A"));
        assert!(text.contains("StockX (Robotics)"));
    }

    #[test]
    fn test_backtest_empty_state() {
        let mut a = app();
        a.tab = Tab::Backtest;
        a.stats = Fetch::Ready(compute_backtest_stats(&[], 2.0));
        assert!(screen(&a).contains("No evaluated predictions yet."));
    }
}
