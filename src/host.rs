//! Serves the dashboard over SSH.
//!
//! Every connection gets its own handler, and every shell gets its own task
//! owning a controller, a dispatcher, and a terminal drawn into the channel.
//! Nothing is shared between connections except the immutable base settings.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, Show};
use crossterm::event::Event;
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::{Terminal, TerminalOptions, Viewport};
use russh::keys::{PublicKey, load_secret_key};
use russh::server::{Auth, Config, Handle, Handler, Msg, Server, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{HostConfig, SessionConfig};
use crate::input::KeyDecoder;
use crate::nomad::NomadClient;
use crate::session::run_session;

const DEFAULT_WIDTH: u16 = 80;
const DEFAULT_HEIGHT: u16 = 24;
/// Upper bounds on client-reported geometry; the frame buffer is sized from it.
const MAX_WIDTH: u16 = 1_000;
const MAX_HEIGHT: u16 = 500;
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub async fn serve(config: SessionConfig, host: HostConfig) -> Result<()> {
    let key = load_secret_key(&host.host_key_path, None).with_context(|| {
        format!(
            "failed to load host key {}",
            host.host_key_path.display()
        )
    })?;
    let ssh_config = Config {
        keys: vec![key],
        inactivity_timeout: Some(INACTIVITY_TIMEOUT),
        auth_rejection_time: Duration::from_secs(1),
        auth_rejection_time_initial: Some(Duration::ZERO),
        ..Default::default()
    };

    info!(
        "serving dashboards for {} on {}:{}",
        config.base_url, host.host, host.port
    );
    let mut server = DashboardServer { config };
    server
        .run_on_address(Arc::new(ssh_config), (host.host.as_str(), host.port))
        .await
        .with_context(|| format!("ssh server on {}:{} stopped", host.host, host.port))?;
    Ok(())
}

#[derive(Clone)]
struct DashboardServer {
    config: SessionConfig,
}

impl Server for DashboardServer {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer: Option<SocketAddr>) -> ConnectionHandler {
        ConnectionHandler::new(self.config.clone(), peer)
    }

    fn handle_session_error(&mut self, error: anyhow::Error) {
        warn!("ssh session error: {error:#}");
    }
}

struct ConnectionHandler {
    config: SessionConfig,
    peer: String,
    user: String,
    public_key: bool,
    term: String,
    width: u16,
    height: u16,
    connected_at: Instant,
    sessions: usize,
    decoder: KeyDecoder,
    input: Option<mpsc::UnboundedSender<Event>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandler {
    fn new(config: SessionConfig, peer: Option<SocketAddr>) -> Self {
        Self {
            config,
            peer: peer
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            user: String::new(),
            public_key: false,
            term: String::new(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            connected_at: Instant::now(),
            sessions: 0,
            decoder: KeyDecoder::default(),
            input: None,
            task: None,
        }
    }

    /// Starts the dashboard on `channel`. A token given as the first exec
    /// argument replaces the configured token for this session only.
    fn start_dashboard(
        &mut self,
        channel: ChannelId,
        token: Option<&str>,
        session: &mut Session,
    ) -> Result<()> {
        if self.task.is_some() {
            let _ = session.channel_failure(channel);
            return Ok(());
        }

        let (config, client) = match self.open_session(token) {
            Ok(prepared) => prepared,
            Err(error) => return reject_session(channel, session, &error.to_string()),
        };

        let handle = session.handle();
        let (output_tx, output_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let forwarder = tokio::spawn(forward_output(handle.clone(), channel, output_rx));

        let area = Rect::new(0, 0, self.width, self.height);
        let mut terminal = Terminal::with_options(
            CrosstermBackend::new(ChannelWriter::new(output_tx)),
            TerminalOptions {
                viewport: Viewport::Fixed(area),
            },
        )
        .context("failed to create channel terminal")?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        self.input = Some(input_tx);

        let peer = self.peer.clone();
        self.task = Some(tokio::spawn(async move {
            let result = async {
                execute!(terminal.backend_mut(), EnterAlternateScreen, Hide)
                    .context("failed to prepare remote terminal")?;
                run_session(&mut terminal, config, client, input_rx).await?;
                execute!(terminal.backend_mut(), LeaveAlternateScreen, Show)
                    .context("failed to restore remote terminal")?;
                anyhow::Ok(())
            }
            .await;
            if let Err(error) = result {
                warn!("session for {peer} ended with error: {error:#}");
            }

            // flush what the session drew before closing the channel
            drop(terminal);
            let _ = forwarder.await;
            let _ = handle.exit_status_request(channel, 0).await;
            let _ = handle.eof(channel).await;
            let _ = handle.close(channel).await;
        }));

        let _ = session.channel_success(channel);
        Ok(())
    }

    /// Logs the connect line, then builds this session's settings and client.
    fn open_session(&mut self, token: Option<&str>) -> Result<(SessionConfig, NomadClient)> {
        self.sessions += 1;
        info!(
            "connect user={} remote={} public_key={} term={} width={} height={}",
            self.user, self.peer, self.public_key, self.term, self.width, self.height
        );
        let config = match token {
            Some(token) => self.config.with_token(token)?,
            None => self.config.clone(),
        };
        let client = NomadClient::new(&config.base_url, &config.token)?;
        Ok((config, client))
    }

    fn send_event(&self, event: Event) {
        if let Some(input) = &self.input {
            let _ = input.send(event);
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        info!(
            "disconnect remote={} sessions={} elapsed={:?}",
            self.peer,
            self.sessions,
            self.connected_at.elapsed()
        );
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Handler for ConnectionHandler {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        self.user = user.to_string();
        Ok(Auth::Accept)
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        self.user = user.to_string();
        Ok(Auth::Accept)
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        self.user = user.to_string();
        self.public_key = true;
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!("session channel {:?} opened by {}", channel.id(), self.peer);
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.term = term.to_string();
        self.width = clamp_dimension(col_width, DEFAULT_WIDTH, MAX_WIDTH);
        self.height = clamp_dimension(row_height, DEFAULT_HEIGHT, MAX_HEIGHT);
        let _ = session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.start_dashboard(channel, None, session)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data);
        let token = command.split_whitespace().next();
        self.start_dashboard(channel, token, session)
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        for key in self.decoder.feed(data) {
            self.send_event(Event::Key(key));
        }
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        _channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.width = clamp_dimension(col_width, DEFAULT_WIDTH, MAX_WIDTH);
        self.height = clamp_dimension(row_height, DEFAULT_HEIGHT, MAX_HEIGHT);
        self.send_event(Event::Resize(self.width, self.height));
        Ok(())
    }
}

fn reject_session(channel: ChannelId, session: &mut Session, reason: &str) -> Result<()> {
    warn!("rejecting session: {reason}");
    let _ = session.data(channel, CryptoVec::from(format!("drover: {reason}\r\n").into_bytes()));
    let _ = session.exit_status_request(channel, 1);
    let _ = session.close(channel);
    Ok(())
}

async fn forward_output(
    handle: Handle,
    channel: ChannelId,
    mut output: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = output.recv().await {
        if handle.data(channel, CryptoVec::from(bytes)).await.is_err() {
            debug!("channel {channel:?} closed while writing");
            break;
        }
    }
}

fn clamp_dimension(value: u32, fallback: u16, max: u16) -> u16 {
    match value {
        0 => fallback,
        value => u16::try_from(value).unwrap_or(u16::MAX).min(max),
    }
}

/// Buffers terminal output and hands each flushed frame to the channel
/// forwarder.
struct ChannelWriter {
    buffer: Vec<u8>,
    output: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelWriter {
    fn new(output: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            buffer: Vec::new(),
            output,
        }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.buffer);
        self.output
            .send(bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "ssh channel closed"))
    }
}
