use std::io::Write;

use anyhow::{Context, Result};
use crossterm::event::{Event, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::app::App;
use crate::config::SessionConfig;
use crate::dispatch::{Dispatcher, Msg};
use crate::nomad::ClusterClient;
use crate::ui;

/// Drives one dashboard session until the user quits or the input closes.
///
/// The terminal may be the local screen or an SSH channel; both feed terminal
/// events through `input`. Dropping the returned future aborts every command
/// still running for this session.
pub async fn run_session<W, C>(
    terminal: &mut Terminal<CrosstermBackend<W>>,
    config: SessionConfig,
    client: C,
    mut input: mpsc::UnboundedReceiver<Event>,
) -> Result<()>
where
    W: Write,
    C: ClusterClient,
{
    let area = terminal.get_frame().area();
    let mut ticker = interval(config.update_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately; init already fetches
    ticker.tick().await;

    let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();
    let mut dispatcher = Dispatcher::new(client, tx);
    let mut app = App::new(config, area.width, area.height);
    if let Some(command) = app.init() {
        dispatcher.dispatch(command);
    }

    loop {
        terminal
            .draw(|frame| ui::render(frame, &app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        let msg = tokio::select! {
            maybe_event = input.recv() => match maybe_event {
                Some(Event::Key(key)) if key.kind == KeyEventKind::Press => Msg::Key(key),
                Some(Event::Resize(width, height)) => {
                    terminal
                        .resize(Rect::new(0, 0, width, height))
                        .context("failed to resize terminal")?;
                    Msg::Resize(width, height)
                }
                Some(_) => continue,
                None => {
                    debug!("session input closed");
                    break;
                }
            },
            Some(msg) = rx.recv() => msg,
            _ = ticker.tick() => {
                dispatcher.reap();
                Msg::Tick
            }
        };

        if let Some(command) = app.update(msg) {
            dispatcher.dispatch(command);
        }
    }

    debug!(
        "session finished with {} command(s) outstanding",
        dispatcher.outstanding()
    );
    Ok(())
}
