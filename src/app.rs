use crate::admin::{AdminAction, AdminPhase, AdminRejection, AdminTracker, admin_text};
use crate::config::SessionConfig;
use crate::dispatch::{Command, Msg};
use crate::input::{Action, map_key};
use crate::model::{LogStream, PageKind, PageRequest, RequestToken, RowKey};
use crate::page::Page;
use tracing::debug;

/// Live event rows kept per session; older rows scroll off.
const MAX_EVENT_ROWS: usize = 2_000;
/// Rows outside the table body: header, footer, borders and column titles.
const CHROME_ROWS: u16 = 5;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Filter,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Phase {
    Initializing,
    Ready,
    Loading,
    Terminated,
}

/// Per-session controller state. Every input arrives as a `Msg`; the only
/// side effects are the returned commands.
pub struct App {
    config: SessionConfig,
    phase: Phase,
    mode: InputMode,
    page: Page,
    history: Vec<PageRequest>,
    next_token: u64,
    outstanding: Option<RequestToken>,
    status: String,
    status_is_error: bool,
    fetch_error: Option<String>,
    show_help: bool,
    admin: AdminTracker,
    width: u16,
    height: u16,
}

impl App {
    pub fn new(config: SessionConfig, width: u16, height: u16) -> Self {
        Self {
            config,
            phase: Phase::Initializing,
            mode: InputMode::Normal,
            page: Page::new(PageRequest::Jobs),
            history: Vec::new(),
            next_token: 0,
            outstanding: None,
            status: String::new(),
            status_is_error: false,
            fetch_error: None,
            show_help: false,
            admin: AdminTracker::default(),
            width,
            height,
        }
    }

    /// Issues the first fetch; the session starts on the jobs page.
    pub fn init(&mut self) -> Option<Command> {
        if self.phase != Phase::Initializing {
            return None;
        }
        self.fetch_active()
    }

    pub fn running(&self) -> bool {
        self.phase != Phase::Terminated
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    /// Banner text; a failed fetch of the active page takes precedence until
    /// the page loads again.
    pub fn status(&self) -> &str {
        self.fetch_error.as_deref().unwrap_or(&self.status)
    }

    pub fn status_is_error(&self) -> bool {
        self.fetch_error.is_some() || self.status_is_error
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn pending_confirmation_prompt(&self) -> Option<String> {
        self.admin.confirming().map(|pending| pending.prompt())
    }

    pub fn dispatched_actions(&self) -> usize {
        self.admin.dispatched_count()
    }

    /// The admin action in progress for the selected allocation, if any.
    pub fn selected_admin_phase(&self) -> Option<(AdminAction, AdminPhase)> {
        let Some(RowKey::Alloc(target)) = self.page.selected_key() else {
            return None;
        };
        AdminAction::ALL.into_iter().find_map(|action| {
            match self.admin.phase(action, &target.id) {
                AdminPhase::Idle => None,
                phase => Some((action, phase)),
            }
        })
    }

    #[cfg(test)]
    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// The tab highlighted in the header: the active page or the tab the
    /// drill-down started from.
    pub fn active_tab(&self) -> PageKind {
        std::iter::once(self.page.kind())
            .chain(self.history.iter().rev().map(PageRequest::kind))
            .filter(|kind| kind.is_tab())
            .last()
            .unwrap_or(PageKind::Jobs)
    }

    pub fn update(&mut self, msg: Msg) -> Option<Command> {
        if self.phase == Phase::Terminated {
            return None;
        }

        match msg {
            Msg::PageLoaded {
                token,
                page,
                header,
                rows,
            } => {
                if !self.is_current(token, page) {
                    debug!("discarding stale {} result {token}", page.title());
                    return None;
                }
                self.page.set_rows(header, rows);
                self.phase = Phase::Ready;
                self.fetch_error = None;
                None
            }
            Msg::EventsReceived { token, rows } => {
                if !self.is_current(token, PageKind::Events) {
                    debug!("discarding stale event batch {token}");
                    return None;
                }
                self.page.append_rows(rows, MAX_EVENT_ROWS);
                None
            }
            Msg::FetchFailed { token, page, error } => {
                if !self.is_current(token, page) {
                    debug!("discarding stale {} failure {token}", page.title());
                    return None;
                }
                self.phase = Phase::Ready;
                let summary = summarize_error_line(&error);
                self.fetch_error = Some(normalize_status_text(format!(
                    "{} refresh failed: {summary}",
                    page.title()
                )));
                None
            }
            Msg::ActionComplete { action, target } => {
                self.admin.finish(action, &target.id);
                self.set_status(format!(
                    "{} allocation {}",
                    action.past_tense(),
                    target.name
                ));
                if self.page.kind().is_streaming() {
                    None
                } else {
                    self.fetch_active()
                }
            }
            Msg::ActionFailed {
                action,
                target,
                error,
            } => {
                self.admin.finish(action, &target.id);
                let summary = summarize_error_line(&error);
                self.set_error(format!("{} failed: {summary}", admin_text(action, &target)));
                None
            }
            Msg::Tick => {
                // a newer read supersedes one still in flight by token
                if self.phase == Phase::Initializing || self.page.kind().is_streaming() {
                    return None;
                }
                self.fetch_active()
            }
            Msg::Key(key) => {
                let action = map_key(self.mode, key)?;
                self.apply_action(action)
            }
            Msg::Resize(width, height) => {
                self.width = width;
                self.height = height;
                None
            }
        }
    }

    fn apply_action(&mut self, action: Action) -> Option<Command> {
        if self.admin.confirming().is_some() {
            match action {
                Action::ConfirmYes | Action::EnterResource => {
                    let pending = self.admin.confirm()?;
                    self.set_status(format!("Confirmed: {}", pending.prompt()));
                    return Some(Command::Admin {
                        action: pending.action,
                        target: pending.target,
                    });
                }
                Action::ConfirmNo | Action::Back | Action::CancelInput => {
                    self.admin.cancel();
                    self.set_status("Action cancelled");
                    return None;
                }
                _ => {
                    self.set_status("Pending confirmation: press y to confirm or n to cancel");
                    return None;
                }
            }
        }

        if self.show_help && !matches!(action, Action::ToggleHelp) {
            self.show_help = false;
        }

        match action {
            Action::Quit => {
                self.phase = Phase::Terminated;
                self.status = "Exit requested".to_string();
                None
            }
            Action::NextTab => self.switch_tab_by_offset(1),
            Action::PrevTab => self.switch_tab_by_offset(-1),
            Action::Down => {
                self.page.move_selection(1);
                None
            }
            Action::Up => {
                self.page.move_selection(-1);
                None
            }
            Action::PageDown => {
                self.page.move_selection(self.table_page_step());
                None
            }
            Action::PageUp => {
                self.page.move_selection(-self.table_page_step());
                None
            }
            Action::Top => {
                self.page.select_first();
                None
            }
            Action::Bottom => {
                self.page.select_last();
                None
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                None
            }
            Action::EnterResource => self.drill_down(),
            Action::ShowSpec => self.open_spec(),
            Action::ToggleLogStream => {
                let PageRequest::Logs { target, stream } = self.page.request().clone() else {
                    return None;
                };
                let mut page = Page::new(PageRequest::Logs {
                    target,
                    stream: stream.toggled(),
                });
                page.set_filter(self.page.filter());
                self.page = page;
                self.fetch_active()
            }
            Action::Back => {
                let previous = self.history.pop()?;
                self.page = Page::new(previous);
                self.mode = InputMode::Normal;
                self.fetch_error = None;
                self.fetch_active()
            }
            Action::Restart => self.request_admin(AdminAction::Restart),
            Action::Stop => self.request_admin(AdminAction::Stop),
            Action::StartFilter => {
                self.mode = InputMode::Filter;
                self.set_status("Filter: type to narrow rows, Enter to keep, Esc to clear");
                None
            }
            Action::InputChar(c) => {
                let mut filter = self.page.filter().to_string();
                filter.push(c);
                self.page.set_filter(filter);
                None
            }
            Action::Backspace => {
                let mut filter = self.page.filter().to_string();
                filter.pop();
                self.page.set_filter(filter);
                None
            }
            Action::SubmitInput => {
                self.mode = InputMode::Normal;
                None
            }
            Action::CancelInput => {
                self.mode = InputMode::Normal;
                self.page.set_filter("");
                None
            }
            Action::Refresh => self.fetch_active(),
            Action::ConfirmYes | Action::ConfirmNo => None,
        }
    }

    fn is_current(&self, token: RequestToken, page: PageKind) -> bool {
        self.outstanding == Some(token) && self.page.kind() == page
    }

    fn fetch_active(&mut self) -> Option<Command> {
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.outstanding = Some(token);
        self.phase = Phase::Loading;
        debug!("fetch {} {token}", self.page.kind().title());
        Some(Command::Fetch {
            token,
            request: self.page.request().clone(),
        })
    }

    fn navigate(&mut self, request: PageRequest) -> Option<Command> {
        let previous = std::mem::replace(&mut self.page, Page::new(request));
        self.history.push(previous.request().clone());
        self.mode = InputMode::Normal;
        self.fetch_error = None;
        self.fetch_active()
    }

    fn tab_request(&self, kind: PageKind) -> PageRequest {
        match kind {
            PageKind::Deployments => PageRequest::Deployments,
            PageKind::Evaluations => PageRequest::Evaluations,
            PageKind::Events => PageRequest::Events {
                topics: self.config.event_topics.clone(),
                namespace: self.config.event_namespace.clone(),
            },
            _ => PageRequest::Jobs,
        }
    }

    fn switch_tab_by_offset(&mut self, offset: isize) -> Option<Command> {
        let tabs = PageKind::TABS;
        let current = tabs
            .iter()
            .position(|kind| *kind == self.active_tab())
            .unwrap_or(0) as isize;
        let next = (current + offset).rem_euclid(tabs.len() as isize) as usize;

        self.history.clear();
        self.page = Page::new(self.tab_request(tabs[next]));
        self.mode = InputMode::Normal;
        self.fetch_error = None;
        self.fetch_active()
    }

    fn drill_down(&mut self) -> Option<Command> {
        match self.page.selected_key()?.clone() {
            RowKey::Job { id, namespace } => self.navigate(PageRequest::Allocations {
                job_id: id,
                namespace,
            }),
            RowKey::Alloc(target) if target.task.is_empty() => {
                self.set_status(format!("Allocation {} has no tasks yet", target.name));
                None
            }
            RowKey::Alloc(target) => self.navigate(PageRequest::Logs {
                target,
                stream: LogStream::Stdout,
            }),
            RowKey::None => None,
        }
    }

    fn open_spec(&mut self) -> Option<Command> {
        match self.page.selected_key()?.clone() {
            RowKey::Job { id, namespace } => self.navigate(PageRequest::JobSpec {
                job_id: id,
                namespace,
            }),
            RowKey::Alloc(target) => self.navigate(PageRequest::AllocSpec { target }),
            RowKey::None => None,
        }
    }

    fn request_admin(&mut self, action: AdminAction) -> Option<Command> {
        let target = match self.page.selected_key() {
            Some(RowKey::Alloc(target)) => Some(target.clone()),
            _ => self.page.request().alloc_target().cloned(),
        };
        let Some(target) = target else {
            self.set_status(format!("{}: select an allocation first", action.label()));
            return None;
        };

        match self.admin.request(action, target) {
            Ok(pending) => {
                let prompt = format!("{}? press y to confirm or n to cancel", pending.prompt());
                self.set_status(prompt);
            }
            Err(rejection @ AdminRejection::AlreadyDispatched(_)) => {
                self.set_status(rejection.to_string());
            }
        }
        None
    }

    fn table_page_step(&self) -> isize {
        self.height.saturating_sub(CHROME_ROWS).max(1) as isize
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = normalize_status_text(status.into());
        self.status_is_error = false;
    }

    fn set_error(&mut self, status: impl Into<String>) {
        self.status = normalize_status_text(status.into());
        self.status_is_error = true;
    }
}

fn summarize_error_line(error: &str) -> String {
    error
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn normalize_status_text(status: String) -> String {
    const MAX_STATUS_LEN: usize = 180;
    if status.chars().count() <= MAX_STATUS_LEN {
        return status;
    }

    let mut shortened = status
        .chars()
        .take(MAX_STATUS_LEN.saturating_sub(1))
        .collect::<String>();
    shortened.push('…');
    shortened
}

#[cfg(test)]
mod tests {
    use super::{App, InputMode, Phase};
    use crate::admin::{AdminAction, AdminPhase};
    use crate::config::SessionConfig;
    use crate::dispatch::{Command, Msg};
    use crate::model::{
        AllocTarget, LogStream, PageKind, PageRequest, RequestToken, Row, RowKey,
    };
    use crate::testing::alloc_target;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn key(code: KeyCode) -> Msg {
        Msg::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn chars(app: &mut App, text: &str) {
        for c in text.chars() {
            app.update(key(KeyCode::Char(c)));
        }
    }

    fn fetch_token(command: Option<Command>) -> RequestToken {
        match command {
            Some(Command::Fetch { token, .. }) => token,
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    fn job_rows(names: &[&str]) -> Vec<Row> {
        names
            .iter()
            .map(|name| Row {
                key: RowKey::Job {
                    id: name.to_string(),
                    namespace: "default".to_string(),
                },
                cells: vec![name.to_string(), "running".to_string()],
            })
            .collect()
    }

    fn alloc_rows(targets: &[AllocTarget]) -> Vec<Row> {
        targets
            .iter()
            .map(|target| Row {
                key: RowKey::Alloc(target.clone()),
                cells: vec![target.id.clone(), target.task.clone(), target.name.clone()],
            })
            .collect()
    }

    fn loaded(page: PageKind, token: RequestToken, rows: Vec<Row>) -> Msg {
        Msg::PageLoaded {
            token,
            page,
            header: vec!["ID".to_string()],
            rows,
        }
    }

    fn ready_app(jobs: &[&str]) -> App {
        let mut app = App::new(SessionConfig::default(), 120, 40);
        let token = fetch_token(app.init());
        app.update(loaded(PageKind::Jobs, token, job_rows(jobs)));
        app
    }

    /// Opens the allocations page of the selected job and loads `targets`.
    fn allocations_app(targets: &[AllocTarget]) -> App {
        let mut app = ready_app(&["web"]);
        let token = fetch_token(app.update(key(KeyCode::Enter)));
        app.update(loaded(PageKind::Allocations, token, alloc_rows(targets)));
        app
    }

    #[test]
    fn init_fetches_jobs_once() {
        let mut app = App::new(SessionConfig::default(), 80, 24);
        assert_eq!(app.phase(), Phase::Initializing);
        let command = app.init();
        assert_eq!(
            command,
            Some(Command::Fetch {
                token: RequestToken(1),
                request: PageRequest::Jobs
            })
        );
        assert_eq!(app.phase(), Phase::Loading);
        assert_eq!(app.init(), None);
    }

    #[test]
    fn stale_results_never_reach_the_active_page() {
        let mut app = App::new(SessionConfig::default(), 80, 24);
        let first = fetch_token(app.init());
        let second = fetch_token(app.update(key(KeyCode::Char('r'))));
        assert!(second > first);

        app.update(loaded(PageKind::Jobs, first, job_rows(&["old"])));
        assert!(!app.page().loaded());

        app.update(loaded(PageKind::Jobs, second, job_rows(&["new"])));
        assert_eq!(app.page().rows()[0].cells[0], "new");
        assert_eq!(app.phase(), Phase::Ready);
    }

    #[test]
    fn results_for_a_page_left_behind_are_discarded() {
        let mut app = ready_app(&["web"]);
        let allocations = fetch_token(app.update(key(KeyCode::Enter)));
        app.update(key(KeyCode::Esc));

        app.update(loaded(
            PageKind::Allocations,
            allocations,
            alloc_rows(&[alloc_target("a1", "web.web[0]")]),
        ));
        assert_eq!(app.page().kind(), PageKind::Jobs);
        assert_eq!(app.page().rows()[0].cells[0], "web");
    }

    #[test]
    fn fetch_failure_keeps_rows_and_reports_error() {
        let mut app = ready_app(&["web", "api"]);
        let token = fetch_token(app.update(Msg::Tick));

        app.update(Msg::FetchFailed {
            token,
            page: PageKind::Jobs,
            error: "request to http://localhost:4646/v1/jobs failed: connection refused\ncaused by"
                .to_string(),
        });

        assert_eq!(app.page().rows().len(), 2);
        assert!(app.status_is_error());
        assert_eq!(
            app.status(),
            "Jobs refresh failed: request to http://localhost:4646/v1/jobs failed: connection refused"
        );
        assert_eq!(app.phase(), Phase::Ready);
    }

    #[test]
    fn tick_supersedes_outstanding_reads_on_polled_pages() {
        let mut app = App::new(SessionConfig::default(), 80, 24);
        assert_eq!(app.update(Msg::Tick), None);
        let first = fetch_token(app.init());
        let second = fetch_token(app.update(Msg::Tick));
        assert!(second > first);

        app.update(loaded(PageKind::Jobs, first, job_rows(&["stale"])));
        assert_eq!(app.phase(), Phase::Loading);
        assert!(!app.page().loaded());

        app.update(loaded(PageKind::Jobs, second, job_rows(&["web"])));
        assert_eq!(app.phase(), Phase::Ready);
        assert_eq!(app.page().rows()[0].cells[0], "web");
        assert!(matches!(app.update(Msg::Tick), Some(Command::Fetch { .. })));

        let mut app = ready_app(&["web"]);
        let events = fetch_token(app.update(key(KeyCode::BackTab)));
        assert_eq!(app.page().kind(), PageKind::Events);
        app.update(loaded(PageKind::Events, events, Vec::new()));
        assert_eq!(app.update(Msg::Tick), None);
    }

    #[test]
    fn event_batches_append_to_the_live_page() {
        let mut app = ready_app(&["web"]);
        let command = app.update(key(KeyCode::BackTab));
        let Some(Command::Fetch {
            token,
            request: PageRequest::Events { topics, namespace },
        }) = command
        else {
            panic!("expected events fetch");
        };
        assert_eq!(topics.len(), 4);
        assert_eq!(namespace, "default");

        app.update(loaded(PageKind::Events, token, Vec::new()));
        app.update(Msg::EventsReceived {
            token,
            rows: vec![Row::line("one")],
        });
        app.update(Msg::EventsReceived {
            token,
            rows: vec![Row::line("two")],
        });
        app.update(Msg::EventsReceived {
            token: RequestToken(token.0 + 10),
            rows: vec![Row::line("stale")],
        });
        assert_eq!(app.page().rows().len(), 2);
    }

    #[test]
    fn tabs_cycle_and_reset_history() {
        let mut app = ready_app(&["web"]);
        app.update(key(KeyCode::Enter));
        assert_eq!(app.history_depth(), 1);
        assert_eq!(app.active_tab(), PageKind::Jobs);

        app.update(key(KeyCode::Tab));
        assert_eq!(app.page().kind(), PageKind::Deployments);
        assert_eq!(app.history_depth(), 0);

        app.update(key(KeyCode::Left));
        app.update(key(KeyCode::Left));
        assert_eq!(app.page().kind(), PageKind::Events);
    }

    #[test]
    fn escape_returns_to_a_fresh_previous_page() {
        let mut app = ready_app(&["api", "web", "worker"]);
        app.update(key(KeyCode::Char('j')));
        let command = app.update(key(KeyCode::Enter));
        assert!(matches!(
            command,
            Some(Command::Fetch {
                request: PageRequest::Allocations { ref job_id, .. },
                ..
            }) if job_id == "web"
        ));

        let token = fetch_token(app.update(key(KeyCode::Esc)));
        assert_eq!(app.page().kind(), PageKind::Jobs);
        assert_eq!(app.page().selected(), None);
        assert_eq!(app.history_depth(), 0);
        app.update(loaded(PageKind::Jobs, token, job_rows(&["web", "zeta"])));
        assert_eq!(app.page().selected(), Some(0));

        assert_eq!(app.update(key(KeyCode::Esc)), None);
    }

    #[test]
    fn spec_and_logs_follow_the_selected_row() {
        let target = alloc_target("a1", "web.web[0]");
        let mut app = allocations_app(&[target.clone()]);

        let command = app.update(key(KeyCode::Enter));
        assert!(matches!(
            command,
            Some(Command::Fetch {
                request: PageRequest::Logs {
                    stream: LogStream::Stdout,
                    ..
                },
                ..
            })
        ));
        let command = app.update(key(KeyCode::Char('e')));
        assert_eq!(
            command.map(|command| match command {
                Command::Fetch { request, .. } => request,
                other => panic!("unexpected {other:?}"),
            }),
            Some(PageRequest::Logs {
                target: target.clone(),
                stream: LogStream::Stderr
            })
        );

        app.update(key(KeyCode::Esc));
        let command = app.update(key(KeyCode::Char('s')));
        assert!(matches!(
            command,
            Some(Command::Fetch {
                request: PageRequest::AllocSpec { .. },
                ..
            })
        ));
    }

    #[test]
    fn stop_requires_confirmation_before_dispatch() {
        let target = alloc_target("a1", "web.web[0]");
        let mut app = allocations_app(&[target.clone()]);

        assert_eq!(app.update(key(KeyCode::Char('X'))), None);
        assert_eq!(
            app.pending_confirmation_prompt().as_deref(),
            Some("Stop allocation web.web[0] (a1)")
        );

        assert_eq!(app.update(key(KeyCode::Char('j'))), None);
        assert!(app.pending_confirmation_prompt().is_some());

        let command = app.update(key(KeyCode::Char('y')));
        assert_eq!(
            command,
            Some(Command::Admin {
                action: AdminAction::Stop,
                target: target.clone()
            })
        );
        assert_eq!(app.pending_confirmation_prompt(), None);
        assert_eq!(app.dispatched_actions(), 1);

        assert_eq!(app.update(key(KeyCode::Char('X'))), None);
        assert!(app.status().contains("already in progress"));
        assert_eq!(app.pending_confirmation_prompt(), None);

        let refresh = app.update(Msg::ActionComplete {
            action: AdminAction::Stop,
            target,
        });
        assert!(matches!(refresh, Some(Command::Fetch { .. })));
        assert_eq!(app.dispatched_actions(), 0);
        assert_eq!(app.status(), "Stopped allocation web.web[0]");
    }

    #[test]
    fn selected_allocation_reports_its_admin_phase() {
        let target = alloc_target("a1", "web.web[0]");
        let mut app = allocations_app(&[target.clone()]);
        assert_eq!(app.selected_admin_phase(), None);

        app.update(key(KeyCode::Char('R')));
        assert_eq!(
            app.selected_admin_phase(),
            Some((AdminAction::Restart, AdminPhase::Confirming))
        );
        app.update(key(KeyCode::Char('y')));
        assert_eq!(
            app.selected_admin_phase(),
            Some((AdminAction::Restart, AdminPhase::Dispatched))
        );
        app.update(Msg::ActionComplete {
            action: AdminAction::Restart,
            target,
        });
        assert_eq!(app.selected_admin_phase(), None);
    }

    #[test]
    fn admin_actions_stay_within_their_session() {
        let target = alloc_target("a1", "web.web[0]");
        let mut first = allocations_app(&[target.clone()]);
        let mut second = allocations_app(&[target]);

        first.update(key(KeyCode::Char('X')));
        assert!(first.pending_confirmation_prompt().is_some());
        assert_eq!(second.pending_confirmation_prompt(), None);

        assert!(matches!(
            first.update(key(KeyCode::Char('y'))),
            Some(Command::Admin { .. })
        ));
        assert_eq!(first.dispatched_actions(), 1);
        assert_eq!(second.dispatched_actions(), 0);

        second.update(key(KeyCode::Char('X')));
        assert_eq!(
            second.pending_confirmation_prompt().as_deref(),
            Some("Stop allocation web.web[0] (a1)")
        );
    }

    #[test]
    fn declined_confirmation_dispatches_nothing() {
        let mut app = allocations_app(&[alloc_target("a1", "web.web[0]")]);
        app.update(key(KeyCode::Char('R')));
        assert_eq!(app.update(key(KeyCode::Char('n'))), None);
        assert_eq!(app.pending_confirmation_prompt(), None);
        assert_eq!(app.dispatched_actions(), 0);

        app.update(key(KeyCode::Char('R')));
        assert_eq!(app.update(key(KeyCode::Esc)), None);
        assert_eq!(app.dispatched_actions(), 0);
        assert_eq!(app.page().kind(), PageKind::Allocations);
    }

    #[test]
    fn admin_keys_need_an_allocation() {
        let mut app = ready_app(&["web"]);
        assert_eq!(app.update(key(KeyCode::Char('X'))), None);
        assert_eq!(app.pending_confirmation_prompt(), None);
        assert!(app.status().contains("select an allocation"));
    }

    #[test]
    fn admin_failure_sets_error_and_returns_to_idle() {
        let target = alloc_target("a1", "web.web[0]");
        let mut app = allocations_app(&[target.clone()]);
        app.update(key(KeyCode::Char('R')));
        app.update(key(KeyCode::Enter));

        let command = app.update(Msg::ActionFailed {
            action: AdminAction::Restart,
            target,
            error: "/v1/allocation/a1 not found".to_string(),
        });
        assert_eq!(command, None);
        assert!(app.status_is_error());
        assert!(app.status().starts_with("Restart allocation web.web[0] (a1) failed"));
        assert_eq!(app.dispatched_actions(), 0);
    }

    #[test]
    fn filter_narrows_on_every_keystroke() {
        let mut app = ready_app(&["web", "worker", "api"]);
        app.update(key(KeyCode::Char('/')));
        assert_eq!(app.mode(), InputMode::Filter);

        chars(&mut app, "w");
        assert_eq!(app.page().visible_len(), 2);
        chars(&mut app, "or");
        assert_eq!(app.page().visible_len(), 1);
        app.update(key(KeyCode::Backspace));
        app.update(key(KeyCode::Backspace));
        assert_eq!(app.page().visible_len(), 2);

        app.update(key(KeyCode::Enter));
        assert_eq!(app.mode(), InputMode::Normal);
        assert_eq!(app.page().filter(), "w");

        app.update(key(KeyCode::Char('/')));
        app.update(key(KeyCode::Esc));
        assert_eq!(app.page().filter(), "");
        assert_eq!(app.page().visible_len(), 3);
    }

    #[test]
    fn filter_does_not_survive_a_round_trip_through_drill_down() {
        let mut app = ready_app(&["web", "api"]);
        app.update(key(KeyCode::Char('/')));
        chars(&mut app, "web");
        app.update(key(KeyCode::Enter));
        assert_eq!(app.page().filter(), "web");

        let token = fetch_token(app.update(key(KeyCode::Enter)));
        assert_eq!(app.page().filter(), "");
        app.update(loaded(PageKind::Allocations, token, Vec::new()));

        let token = fetch_token(app.update(key(KeyCode::Esc)));
        assert_eq!(app.page().kind(), PageKind::Jobs);
        assert_eq!(app.page().filter(), "");
        app.update(loaded(PageKind::Jobs, token, job_rows(&["web", "api"])));
        assert_eq!(app.page().visible_len(), 2);
        assert_eq!(app.page().selected(), Some(0));
    }

    #[test]
    fn resize_changes_geometry_only() {
        let mut app = ready_app(&["web"]);
        let before = app.page().selected();
        assert_eq!(app.update(Msg::Resize(200, 60)), None);
        assert_eq!(app.size(), (200, 60));
        assert_eq!(app.page().selected(), before);
        assert_eq!(app.phase(), Phase::Ready);
    }

    #[test]
    fn quit_terminates_and_ignores_later_messages() {
        let mut app = ready_app(&["web"]);
        app.update(Msg::Key(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
        )));
        assert!(!app.running());
        assert_eq!(app.update(Msg::Tick), None);
        assert_eq!(app.update(key(KeyCode::Char('r'))), None);
    }

    #[test]
    fn sessions_do_not_share_state() {
        let mut first = ready_app(&["web", "api"]);
        let mut second = ready_app(&["web", "api"]);

        first.update(key(KeyCode::Char('G')));
        first.update(key(KeyCode::Char('/')));
        chars(&mut first, "api");
        first.update(key(KeyCode::Enter));

        assert_eq!(second.page().selected(), Some(0));
        assert_eq!(second.page().filter(), "");
        assert_eq!(second.update(key(KeyCode::Char('r'))).map(|_| ()), Some(()));
        assert_eq!(first.page().filter(), "api");
    }

    #[test]
    fn long_status_text_is_shortened() {
        let mut app = ready_app(&["web"]);
        app.set_status("x".repeat(400));
        assert_eq!(app.status().chars().count(), 180);
        assert!(app.status().ends_with('…'));
    }
}
