mod app;
mod config;
mod feed;
mod format;
mod model;
mod remote;
mod report;
mod schedule;
mod stats;
mod stock_view;
mod store;
mod tui;
mod ui;
mod webui;

use anyhow::{Context, Result};
use app::{App, HistoryView};
use clap::Parser;
use feed::FeedClient;
use std::path::PathBuf;
use std::sync::Mutex;
use stock_view::CategoryFilter;
use store::StoreClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "KRX Theme TUI: AI theme forecasts, market movers and prediction backtests",
    after_help = "EXAMPLES:
    # Interactive dashboard
    cargo run --release

    # Hit-rate report
    cargo run --release -- --stats

    # Serve the JSON API together with the static feeds
    cargo run --release -- --webui --serve-dir ./public"
)]
struct Args {
    /// Print hit-rate statistics over evaluated predictions and exit
    #[arg(long)]
    stats: bool,

    /// Print the prediction history and exit
    #[arg(long)]
    history: bool,

    /// Category for --history (all|today|short_term|long_term)
    #[arg(long, default_value = "all")]
    category: String,

    /// Print the latest theme forecast and exit
    #[arg(long)]
    forecast: bool,

    /// Resolve the collection round for a timestamp (e.g. 2026-02-27T13:30:00) and exit
    #[arg(long)]
    schedule: Option<String>,

    /// Treat the --schedule timestamp as a provisional (intraday) figure
    #[arg(long)]
    estimated: bool,

    /// Launch the JSON API server
    #[arg(long)]
    webui: bool,

    /// WebUI server port
    #[arg(long, default_value_t = 8080)]
    webui_port: u16,

    /// Directory served under /data by the WebUI (static feeds)
    #[arg(long)]
    serve_dir: Option<PathBuf>,

    /// Poll unresolved API-key alerts in the dashboard
    #[arg(long)]
    admin: bool,
}

impl Args {
    fn interactive(&self) -> bool {
        !(self.stats || self.history || self.forecast || self.schedule.is_some() || self.webui)
    }
}

fn init_tracing(to_file: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("krx_theme_tui=info"));

    if to_file {
        // stdout belongs to the alternate screen while the dashboard runs.
        let file = std::fs::File::create(config::LOG_FILE_NAME)
            .with_context(|| format!("creating {}", config::LOG_FILE_NAME))?;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the process environment still applies.
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.interactive())?;

    if let Some(ref stamp) = args.schedule {
        let round = schedule::resolve_round(stamp, args.estimated);
        print!("{}", report::schedule_report(&round));
        return Ok(());
    }

    let threshold = config::hit_threshold_pct();

    if args.stats {
        let store = StoreClient::from_env()?;
        let records = store.fetch_evaluated_predictions().await?;
        let stats = stats::compute_backtest_stats(&records, threshold);
        print!("{}", report::stats_report(&stats, threshold));
        return Ok(());
    }

    if args.history {
        let filter = CategoryFilter::parse(&args.category)
            .with_context(|| format!("unknown category {:?}", args.category))?;
        let store = StoreClient::from_env()?;
        let view = HistoryView::new(store.fetch_prediction_history().await?);
        print!("{}", report::history_report(&view, filter, threshold));
        return Ok(());
    }

    if args.forecast {
        let feed = FeedClient::from_env()?;
        let forecast = feed.fetch_theme_forecast().await?;
        print!("{}", report::forecast_report(forecast.as_ref()));
        return Ok(());
    }

    if args.webui {
        let feed = FeedClient::from_env()?;
        match webui::run_webui_server(args.webui_port, args.serve_dir, feed, StoreClient::from_env()).await {
            Ok(_) => info!("WebUI exited."),
            Err(e) => error!("WebUI failed: {}", e),
        }
        return Ok(());
    }

    let feed = FeedClient::from_env()?;
    let mut app = App::new(feed, StoreClient::from_env(), args.admin);

    let mut terminal = tui::init()?;
    let res = app.run(&mut terminal).await;

    tui::restore()?;

    if let Err(e) = res {
        error!("Error: {:?}", e);
    }

    Ok(())
}
