// Entry point of the SwitchBoard terminal panel.

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use switchboard::SyncEngine;
use switchboard::http::HttpBackend;

mod app;

use app::App;

#[derive(Parser, Debug)]
#[command(name = "switchboard", about = "Terminal control panel for SwitchBoard services")]
struct Args {
    /// Base URL of the SwitchBoard gateway.
    #[arg(long, env = "SWITCHBOARD_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Timeout applied to every gateway request.
    #[arg(long, default_value_t = 10)]
    request_timeout_secs: u64,

    /// Write logs here. Without it logs are discarded so the UI stays intact.
    #[arg(long, env = "SWITCHBOARD_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let backend = Arc::new(
        HttpBackend::new(&args.url, Duration::from_secs(args.request_timeout_secs))
            .context("failed to build HTTP client")?,
    );
    let mut engine = SyncEngine::new(backend.clone(), backend.clone());
    // A failed init still opens the panel; the header shows ERROR like the web UI did.
    let init = engine.initialize(backend.as_ref()).await;

    let mut app = App::new(engine);
    match init {
        Ok(()) => info!(url = %args.url, "connected to gateway"),
        Err(err) => {
            error!(url = %args.url, error = %err, "panel started without configuration");
            app.set_notice(format!("{} ({})", err, args.url));
        }
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = app.run(&mut terminal).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
    Ok(())
}
