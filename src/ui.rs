use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::admin::{AdminAction, AdminPhase};
use crate::app::{App, InputMode, Phase};
use crate::model::{BUILD, PageKind};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const PL_D: Color = Color::Rgb(82, 24, 124);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_tab_strip(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width / 2 {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    let version = if BUILD.commit.is_empty() {
        format!(" drover {} ", BUILD.version)
    } else {
        format!(" drover {} ({}) ", BUILD.version, compact_text(BUILD.commit, 7))
    };
    push_powerline_segment(&mut spans, version, Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(
            " {} ",
            compact_text(&display_cluster_endpoint(&app.config().base_url), 32)
        ),
        Color::White,
        PL_B,
        PL_C,
    );

    let page = app.page();
    let title = match page.request().subject() {
        Some(subject) => format!(" {}: {} ", page.kind().title(), compact_text(&subject, 40)),
        None => format!(" {} ", page.kind().title()),
    };
    if page.filter().is_empty() {
        push_powerline_segment(&mut spans, title, Color::White, PL_C, BG);
    } else {
        push_powerline_segment(&mut spans, title, Color::White, PL_C, PL_D);
        push_powerline_segment(
            &mut spans,
            format!(" /{} ", compact_text(page.filter(), 24)),
            Color::White,
            PL_D,
            BG,
        );
    }
    Line::from(spans)
}

fn build_tab_strip(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    let mut next_bg = BG;
    for tab in PageKind::TABS {
        let active = tab == app.active_tab();
        let bg = if active {
            Color::Rgb(59, 130, 246)
        } else {
            Color::Rgb(30, 41, 59)
        };
        let fg = if active { Color::Black } else { Color::White };
        push_powerline_segment_rtl(&mut spans, format!(" {} ", tab.title()), fg, bg, next_bg);
        next_bg = bg;
    }
    spans.push(Span::styled(" ", Style::default().bg(next_bg)));
    Line::from(spans)
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    let page = app.page();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.mode() == InputMode::Filter {
            WARN
        } else {
            ACCENT
        }))
        .style(Style::default().bg(PANEL));

    if !page.loaded() {
        let message = if app.status_is_error() {
            app.status().to_string()
        } else {
            format!("Loading {}…", page.kind().title().to_ascii_lowercase())
        };
        let panel = Paragraph::new(message)
            .wrap(Wrap { trim: false })
            .block(block.title(page.kind().title()))
            .style(Style::default().fg(if app.status_is_error() { ERROR } else { MUTED }));
        frame.render_widget(panel, area);
        return;
    }

    let visible_rows = page.visible_rows();
    let title = if page.filter().is_empty() {
        format!("{} ({})", page.kind().title(), visible_rows.len())
    } else {
        format!(
            "{} ({}/{})",
            page.kind().title(),
            visible_rows.len(),
            page.rows().len()
        )
    };

    let columns = page.header().len().max(1);
    let rows = visible_rows.iter().map(|row| {
        Row::new(
            row.cells
                .iter()
                .map(|cell| Cell::from(cell.clone()).style(Style::default().fg(Color::White))),
        )
    });

    let mut table = Table::new(rows, column_constraints(columns))
        .block(block.title(title))
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("󰜴 ");
    if !page.header().is_empty() {
        let header_row = Row::new(page.header().iter().map(|header| {
            Cell::from(header.clone()).style(Style::default().add_modifier(Modifier::BOLD))
        }))
        .height(1)
        .style(Style::default().fg(ACCENT));
        table = table.header(header_row);
    }

    let mut state = TableState::default();
    state.select(page.selected());
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();

    if app.mode() == InputMode::Filter {
        push_powerline_segment(&mut spans, " 󰈲 flt ", Color::Black, WARN, PL_B);
        push_powerline_segment(
            &mut spans,
            format!(" /{}▏", app.page().filter()),
            Color::White,
            PL_B,
            BG,
        );
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let prompt = app.pending_confirmation_prompt();
    let (status_text, status_fg, status_bg) = match &prompt {
        Some(pending) => (format!("{pending}? (y/n)"), Color::Black, WARN),
        None if app.status_is_error() => (app.status().to_string(), Color::Black, ERROR),
        None => (app.status().to_string(), Color::White, PL_B),
    };

    push_powerline_segment(&mut spans, " 󰘳 nrm ", Color::White, PL_A, status_bg);
    let status_width_hint = area.width.saturating_sub(30).max(16) as usize;
    push_powerline_segment(
        &mut spans,
        format!(
            " {} {} ",
            footer_status_icon(&prompt, app.status_is_error()),
            compact_text(&status_text, status_width_hint)
        ),
        status_fg,
        status_bg,
        BG,
    );

    let right_spans = build_footer_glance_spans(app);
    let right_width = spans_width(&right_spans) as u16;
    if prompt.is_some() || right_width == 0 || right_width + 28 > area.width {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(Line::from(right_spans)).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_footer_glance_spans(app: &App) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    if let Some((action, phase)) = app.selected_admin_phase() {
        let state = match phase {
            AdminPhase::Confirming => "confirm",
            _ => "pending",
        };
        spans.push(Span::styled(
            format!(" {} {state} ", action.label().to_lowercase()),
            Style::default().fg(WARN).bg(BG),
        ));
    }
    if app.dispatched_actions() > 0 {
        spans.push(Span::styled(
            format!(" 󱁤 {} running ", app.dispatched_actions()),
            Style::default().fg(WARN).bg(BG),
        ));
    }
    let state = match app.phase() {
        Phase::Loading => " loading… ",
        _ if app.page().kind().is_streaming() => " live ",
        _ => "",
    };
    if !state.is_empty() {
        spans.push(Span::styled(state, Style::default().fg(MUTED).bg(BG)));
    }
    if app.history_depth() > 0 {
        spans.push(Span::styled(" esc back ", Style::default().fg(MUTED).bg(BG)));
    }
    spans.push(Span::styled(" ? help ", Style::default().fg(MUTED).bg(BG)));
    spans
}

fn footer_status_icon(prompt: &Option<String>, error: bool) -> &'static str {
    if prompt.is_some() {
        "󰀦"
    } else if error {
        ""
    } else {
        "󰄬"
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn push_powerline_segment_rtl(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "drover help  mode:{}  page:{}",
            help_mode_label(app.mode()),
            app.page().kind().title()
        )),
        Line::from(""),
    ];
    for line in help_lines(app.page().kind()) {
        lines.push(Line::from(line));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(modal, area);
}

fn help_lines(kind: PageKind) -> Vec<String> {
    let mut lines = vec![
        "Move: j/k or arrows  PgDn/PgUp or Ctrl+d/Ctrl+u  g/Home top  G/End bottom".to_string(),
        "Tabs: Tab/Right next  Shift+Tab/Left previous".to_string(),
        "Flow: Enter drill-down  s spec  Esc back".to_string(),
        "Filter: / type to narrow  Enter keep  Esc clear".to_string(),
        "Other: r refresh  ? help  q or Ctrl+c quit".to_string(),
    ];
    if matches!(
        kind,
        PageKind::Allocations | PageKind::Logs | PageKind::AllocSpec
    ) {
        let actions = AdminAction::ALL
            .iter()
            .map(|action| format!("{} {}", admin_key_hint(*action), action.label()))
            .collect::<Vec<_>>()
            .join("  ");
        lines.push(format!("Allocation: {actions}  (y confirm, n cancel)"));
    }
    if kind == PageKind::Logs {
        lines.push("Logs: e toggle stdout/stderr".to_string());
    }
    lines
}

fn admin_key_hint(action: AdminAction) -> char {
    match action {
        AdminAction::Restart => 'R',
        AdminAction::Stop => 'X',
    }
}

fn help_mode_label(mode: InputMode) -> &'static str {
    match mode {
        InputMode::Normal => "normal",
        InputMode::Filter => "filter",
    }
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn display_cluster_endpoint(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
        .to_string()
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}
