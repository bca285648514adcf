mod admin;
mod app;
mod cli;
mod config;
mod dispatch;
mod error;
mod format;
mod host;
mod input;
mod model;
mod nomad;
mod page;
mod session;
#[cfg(test)]
mod testing;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{CliArgs, CliCommand};
use config::{ConfigFile, SessionConfig, resolve_host, resolve_session};
use crossterm::event::{
    EventStream, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use nomad::NomadClient;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

enum LogSink<'a> {
    Discard,
    Stderr,
    File(&'a Path),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let sink = match (&args.command, args.log_file.as_deref()) {
        (_, Some(path)) => LogSink::File(path),
        (Some(CliCommand::Serve(_)), None) => LogSink::Stderr,
        (None, None) => LogSink::Discard,
    };
    init_tracing(&args.log_filter, sink)?;

    let file = ConfigFile::discover()?;
    if let Some(source) = file.source() {
        info!("using config file {}", source.display());
    }
    let session = resolve_session(&args.session, |name| std::env::var(name).ok(), &file)?;

    match &args.command {
        Some(CliCommand::Serve(serve)) => {
            let host = resolve_host(serve, |name| std::env::var(name).ok(), &file)?;
            host::serve(session, host).await
        }
        None => run_local(session).await,
    }
}

fn init_tracing(level_filter: &str, sink: LogSink<'_>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();
    let _ = match sink {
        LogSink::Discard => builder.with_writer(io::sink).try_init(),
        LogSink::Stderr => builder.with_writer(io::stderr).try_init(),
        LogSink::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };

    Ok(())
}

async fn run_local(config: SessionConfig) -> Result<()> {
    let client = NomadClient::new(&config.base_url, &config.token)
        .context("failed to create Nomad client")?;

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(async move {
        let mut events = EventStream::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if input_tx.send(event).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!("terminal event error: {error}");
                    break;
                }
            }
        }
    });

    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let result = session::run_session(&mut terminal, config, client, input_rx).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);
    reader.abort();

    result?;
    restore_result?;
    Ok(())
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}
