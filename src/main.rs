use runfeed::app::{AppConfig, AppState};
use runfeed::bridge::{BridgeFetcher, BridgePushChannel};
use runfeed::cli::Cli;
use runfeed::events::{AppEvent, EventHandler};
use runfeed::push::SubscriptionTask;
use runfeed::runtime;
use runfeed::traits::{PushChannel, RunFetcher};
use runfeed::tui;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen, SetTitle};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn setup_verbose_logging() -> Result<()> {
    let state_dir = state_dir();
    std::fs::create_dir_all(&state_dir)
        .map_err(|e| eyre!("Failed to create log directory {state_dir:?}: {e}"))?;
    let log_path = state_dir.join("debug.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| eyre!("Failed to open log file {log_path:?}: {e}"))?;
    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .init();
    tracing::info!(
        "runfeed v{} starting with verbose logging",
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

fn state_dir() -> std::path::PathBuf {
    if let Some(state) = std::env::var_os("XDG_STATE_HOME") {
        std::path::PathBuf::from(state).join("runfeed")
    } else if let Some(home) = std::env::var_os("HOME") {
        std::path::PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("runfeed")
    } else {
        std::env::temp_dir().join("runfeed")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    if args.verbose {
        setup_verbose_logging()?;
    }

    // Restore the terminal before the default hook prints the panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        if let Err(e) = terminal::disable_raw_mode() {
            eprintln!("Failed to disable raw mode during panic: {e}");
        }
        if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen, SetTitle("")) {
            eprintln!("Failed to leave alternate screen during panic: {e}");
        }
        original_hook(panic_info);
    }));

    let config = AppConfig {
        bridge: args.bridge.clone(),
        function_path: args.function_path.clone(),
        roots_only: args.roots_only,
        limit: args.limit,
        version_string: format!(
            "runfeed v{}+{}",
            env!("CARGO_PKG_VERSION"),
            env!("BUILD_NUMBER")
        ),
    };

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, SetTitle("runfeed"))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let fetcher: Arc<dyn RunFetcher> = Arc::new(BridgeFetcher::new(args.bridge.clone()));
    let channel: Arc<dyn PushChannel> = Arc::new(BridgePushChannel::new(args.bridge.clone()));

    let events = EventHandler::new(Duration::from_millis(100))?;
    let tx = events.sender();
    let subscriptions = SubscriptionTask::spawn(channel, tx.clone());

    let mut state = AppState::new(config);
    state.desktop_notify = !args.no_notify;
    state.start(args.run.as_deref());

    let result = run_app(&mut terminal, &mut state, events, &tx, &fetcher, &subscriptions).await;

    subscriptions.shutdown().await;

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, SetTitle(""))?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    mut events: EventHandler,
    tx: &mpsc::UnboundedSender<AppEvent>,
    fetcher: &Arc<dyn RunFetcher>,
    subscriptions: &SubscriptionTask,
) -> Result<()> {
    loop {
        runtime::pump(state, fetcher, subscriptions, tx);

        terminal.draw(|f| tui::render::render(f, state))?;

        state.prune_notifications();
        state.prune_error();

        match events.next().await {
            Some(event) => runtime::handle_event(state, event),
            None => return Err(eyre!("event channel closed")),
        }

        if state.should_quit {
            return Ok(());
        }
    }
}
