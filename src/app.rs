use crate::config;
use crate::feed::FeedClient;
use crate::model::{ApiAlert, PredictionsByDate, Stock, StockBoard, ThemeForecast};
use crate::remote::{AlertPoller, Fetch};
use crate::stats::{compute_backtest_stats, BacktestStats};
use crate::stock_view::{build_stock_days, CategoryFilter, StockDay};
use crate::store::StoreClient;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::io;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info;

pub const FORECAST_ERROR: &str = "Failed to load forecast data.";
pub const BOARD_ERROR: &str = "Failed to load market movers.";
pub const STATS_ERROR: &str = "Failed to load backtest results.";
pub const HISTORY_ERROR: &str = "Failed to load prediction history.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tab {
    Movers,
    Forecast,
    Backtest,
    History,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Movers, Tab::Forecast, Tab::Backtest, Tab::History];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Movers => "Movers",
            Tab::Forecast => "Theme Forecast",
            Tab::Backtest => "Backtest",
            Tab::History => "History",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Prediction history plus its stock-centric projection.
#[derive(Clone, Debug, Default)]
pub struct HistoryView {
    pub dates: Vec<PredictionsByDate>,
    pub stock_days: Vec<StockDay>,
}

impl HistoryView {
    pub fn new(dates: Vec<PredictionsByDate>) -> Self {
        let stock_days = build_stock_days(&dates);
        Self { dates, stock_days }
    }
}

/// Results delivered by background fetch tasks.
#[derive(Debug)]
pub enum DataEvent {
    Board(Fetch<Option<StockBoard>>),
    Forecast(Fetch<Option<ThemeForecast>>),
    Stats(Fetch<BacktestStats>),
    History(Fetch<HistoryView>),
    Alerts(Vec<ApiAlert>),
}

pub struct App {
    pub should_quit: bool,
    pub tab: Tab,
    pub board: Fetch<Option<StockBoard>>,
    pub forecast: Fetch<Option<ThemeForecast>>,
    pub stats: Fetch<BacktestStats>,
    pub history: Fetch<HistoryView>,
    pub alerts: Vec<ApiAlert>,
    pub filter: CategoryFilter,
    pub selected: usize,
    pub scroll: u16,
    pub hit_threshold: f64,
    feed: FeedClient,
    store: Option<StoreClient>,
    store_error: Option<String>,
    admin: bool,
    tx: UnboundedSender<DataEvent>,
    rx: UnboundedReceiver<DataEvent>,
    alert_poller: Option<AlertPoller>,
}

impl App {
    pub fn new(feed: FeedClient, store: anyhow::Result<StoreClient>, admin: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (store, store_error) = match store {
            Ok(store) => (Some(store), None),
            Err(err) => (None, Some(format!("Prediction store unavailable: {}", err))),
        };

        Self {
            should_quit: false,
            tab: Tab::Movers,
            board: Fetch::Loading,
            forecast: Fetch::Loading,
            stats: Fetch::Loading,
            history: Fetch::Loading,
            alerts: Vec::new(),
            filter: CategoryFilter::All,
            selected: 0,
            scroll: 0,
            hit_threshold: config::hit_threshold_pct(),
            feed,
            store,
            store_error,
            admin,
            tx,
            rx,
            alert_poller: None,
        }
    }

    /// Kicks off every initial load and, in admin mode, alert polling.
    pub fn start(&mut self) {
        for tab in Tab::ALL {
            self.refresh(tab);
        }

        if self.admin {
            if let Some(store) = self.store.clone() {
                let (alert_tx, mut alert_rx) = mpsc::unbounded_channel();
                self.alert_poller = Some(AlertPoller::spawn(store, alert_tx));
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    while let Some(alerts) = alert_rx.recv().await {
                        if tx.send(DataEvent::Alerts(alerts)).is_err() {
                            break;
                        }
                    }
                });
            }
        }
    }

    /// Re-queries the data behind `tab` in the background.
    pub fn refresh(&mut self, tab: Tab) {
        let tx = self.tx.clone();
        match tab {
            Tab::Movers => {
                self.board = Fetch::Loading;
                let feed = self.feed.clone();
                tokio::spawn(async move {
                    let result = feed.fetch_stock_board().await;
                    let _ = tx.send(DataEvent::Board(Fetch::from_result(result, BOARD_ERROR, "stock board")));
                });
            }
            Tab::Forecast => {
                self.forecast = Fetch::Loading;
                let feed = self.feed.clone();
                tokio::spawn(async move {
                    let result = feed.fetch_theme_forecast().await;
                    let _ = tx.send(DataEvent::Forecast(Fetch::from_result(result, FORECAST_ERROR, "theme forecast")));
                });
            }
            Tab::Backtest => {
                let Some(store) = self.store.clone() else {
                    self.stats = Fetch::Failed(self.store_unavailable());
                    return;
                };
                self.stats = Fetch::Loading;
                let threshold = self.hit_threshold;
                tokio::spawn(async move {
                    let result = store
                        .fetch_evaluated_predictions()
                        .await
                        .map(|records| compute_backtest_stats(&records, threshold));
                    let _ = tx.send(DataEvent::Stats(Fetch::from_result(result, STATS_ERROR, "backtest stats")));
                });
            }
            Tab::History => {
                let Some(store) = self.store.clone() else {
                    self.history = Fetch::Failed(self.store_unavailable());
                    return;
                };
                self.history = Fetch::Loading;
                tokio::spawn(async move {
                    let result = store.fetch_prediction_history().await.map(HistoryView::new);
                    let _ = tx.send(DataEvent::History(Fetch::from_result(result, HISTORY_ERROR, "prediction history")));
                });
            }
        }
    }

    fn store_unavailable(&self) -> String {
        self.store_error
            .clone()
            .unwrap_or_else(|| "Prediction store unavailable".to_string())
    }

    pub fn apply(&mut self, event: DataEvent) {
        match event {
            DataEvent::Board(board) => {
                self.board = board;
                self.selected = 0;
            }
            DataEvent::Forecast(forecast) => self.forecast = forecast,
            DataEvent::Stats(stats) => self.stats = stats,
            DataEvent::History(history) => self.history = history,
            DataEvent::Alerts(alerts) => self.alerts = alerts,
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event);
        }
    }

    /// Rising then falling, KOSPI before KOSDAQ, as `(is_rising, market, stock)`.
    pub fn mover_rows(&self) -> Vec<(bool, &'static str, &Stock)> {
        let Some(Some(board)) = self.board.data() else {
            return Vec::new();
        };
        let mut rows = Vec::with_capacity(board.rising.len() + board.falling.len());
        for (rising, split) in [(true, &board.rising), (false, &board.falling)] {
            rows.extend(split.kospi.iter().map(|s| (rising, "KOSPI", s)));
            rows.extend(split.kosdaq.iter().map(|s| (rising, "KOSDAQ", s)));
        }
        rows
    }

    pub fn selected_stock(&self) -> Option<&Stock> {
        self.mover_rows().get(self.selected).map(|(_, _, s)| *s)
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::Right => self.switch_tab(self.tab.next()),
            KeyCode::BackTab | KeyCode::Left => self.switch_tab(self.tab.prev()),
            KeyCode::Char('r') => {
                info!("Refreshing {}", self.tab.title());
                self.refresh(self.tab);
            }
            KeyCode::Char('c') => {
                self.filter = self.filter.next();
                self.scroll = 0;
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.tab == Tab::Movers {
                    let len = self.mover_rows().len();
                    if len > 0 {
                        self.selected = (self.selected + 1).min(len - 1);
                    }
                } else {
                    self.scroll = self.scroll.saturating_add(1);
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if self.tab == Tab::Movers {
                    self.selected = self.selected.saturating_sub(1);
                } else {
                    self.scroll = self.scroll.saturating_sub(1);
                }
            }
            _ => {}
        }
    }

    fn switch_tab(&mut self, tab: Tab) {
        self.tab = tab;
        self.scroll = 0;
    }

    pub async fn run(&mut self, terminal: &mut crate::tui::Tui) -> io::Result<()> {
        self.start();

        while !self.should_quit {
            self.drain_events();
            terminal.draw(|f| crate::ui::render(f, self))?;

            if event::poll(std::time::Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            } else {
                tokio::task::yield_now().await;
            }
        }

        // Stops alert polling before the terminal is restored.
        self.alert_poller = None;
        Ok(())
    }
}
