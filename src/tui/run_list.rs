use crate::app::{format_timestamp, stats_label, truncate, AppState, Focus};
use crate::feed::RunFeed;
use crate::model::{FutureState, Run, User};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use unicode_width::UnicodeWidthStr;

const ID_WIDTH: usize = 8;
const SUBMITTED_WIDTH: usize = 17;
const TAGS_WIDTH: usize = 16;
const OWNER_WIDTH: usize = 14;
const STATUS_WIDTH: usize = 34;

pub fn state_style(state: FutureState) -> (&'static str, Color) {
    match state {
        FutureState::Resolved => ("✓", Color::Green),
        FutureState::Failed | FutureState::NestedFailed => ("✗", Color::Red),
        FutureState::Canceled => ("⊘", Color::Yellow),
        FutureState::Ran | FutureState::Retrying => ("⟳", Color::Yellow),
        FutureState::Created | FutureState::Scheduled | FutureState::Unknown => {
            ("·", Color::DarkGray)
        }
    }
}

/// Left-aligns `s` in exactly `width` columns.
pub fn pad(s: &str, width: usize) -> String {
    let cut = truncate(s, width);
    let fill = width.saturating_sub(UnicodeWidthStr::width(cut.as_str()));
    format!("{cut}{}", " ".repeat(fill))
}

pub fn status_text(run: &Run) -> String {
    match run.status_timestamp() {
        Some(ts) => format!("{} {}", run.future_state.label(), format_timestamp(Some(ts))),
        None => run.future_state.label().to_string(),
    }
}

/// "First Last", or the email when the owner has no name on record.
pub fn owner_name(user: &User) -> String {
    let name = user.display_name();
    if name.is_empty() {
        user.email.clone()
    } else {
        name
    }
}

/// `‹ 1 / 3 ›`, with the arrows dimmed at the bounds.
pub fn pagination_line(feed: &RunFeed) -> Line<'static> {
    let pagination = feed.pagination();
    let arrow = |enabled: bool, glyph: &'static str| {
        let style = if enabled {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Span::styled(glyph, style)
    };
    Line::from(vec![
        arrow(pagination.has_previous(), "‹ "),
        Span::raw(pagination.label()),
        arrow(pagination.has_next(), " ›"),
    ])
}

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let narrow = area.width < crate::app::NARROW_WIDTH_THRESHOLD;
    let focused = state.focus == Focus::List;
    let feed = &state.list;

    let border = if focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .title(format!(" {} ", stats_label(feed.total_count())))
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // column titles
            Constraint::Min(1),    // rows
            Constraint::Length(1), // pagination
        ])
        .split(inner);

    let name_width = if narrow {
        (inner.width as usize).saturating_sub(ID_WIDTH + 2 + 4)
    } else {
        (inner.width as usize)
            .saturating_sub(ID_WIDTH + SUBMITTED_WIDTH + TAGS_WIDTH + OWNER_WIDTH + STATUS_WIDTH + 5)
    };

    let title_style = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::BOLD);
    let titles = if narrow {
        format!("  {}{}", pad("ID", ID_WIDTH), pad("Name", name_width))
    } else {
        format!(
            "  {}{}{}{}{}{}",
            pad("ID", ID_WIDTH),
            pad("Submitted at", SUBMITTED_WIDTH),
            pad("Name", name_width + 1),
            pad("Tags", TAGS_WIDTH),
            pad("Owner", OWNER_WIDTH),
            "Status"
        )
    };
    f.render_widget(Paragraph::new(Span::styled(titles, title_style)), chunks[0]);

    if feed.runs().is_empty() {
        let msg = if feed.is_loading() {
            "Loading runs…"
        } else if feed.last_error().is_some() {
            "Could not load runs"
        } else {
            "No runs found"
        };
        f.render_widget(
            Paragraph::new(msg).style(Style::default().fg(Color::DarkGray)),
            chunks[1],
        );
    } else {
        let visible = chunks[1].height as usize;
        let cursor = state.list_cursor;
        let skip = if cursor >= visible { cursor + 1 - visible } else { 0 };
        let lines: Vec<Line> = feed
            .runs()
            .iter()
            .enumerate()
            .skip(skip)
            .take(visible)
            .map(|(i, run)| {
                let selected = focused && i == cursor;
                let is_root = state.root.as_ref().is_some_and(|r| r.id == run.id);
                render_run_line(run, selected, is_root, narrow, name_width)
            })
            .collect();
        f.render_widget(Paragraph::new(lines), chunks[1]);
    }

    f.render_widget(Paragraph::new(pagination_line(feed)), chunks[2]);
}

fn render_run_line(
    run: &Run,
    selected: bool,
    is_root: bool,
    narrow: bool,
    name_width: usize,
) -> Line<'static> {
    let (icon, color) = state_style(run.future_state);
    let base = if selected {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };
    let marker = if is_root { "▸" } else { " " };
    let name = if run.name.is_empty() {
        run.function_path.clone()
    } else {
        format!("{} {}", run.name, run.function_path)
    };

    let mut spans = vec![
        Span::styled(format!("{marker}{icon}"), base.fg(color)),
        Span::styled(pad(run.short_id(), ID_WIDTH), base.fg(Color::DarkGray)),
    ];
    if narrow {
        spans.push(Span::styled(pad(&name, name_width), base));
        return Line::from(spans);
    }
    let owner = run.user.as_ref().map(owner_name).unwrap_or_default();
    spans.push(Span::styled(
        pad(&format_timestamp(run.created_at), SUBMITTED_WIDTH),
        base,
    ));
    spans.push(Span::styled(pad(&name, name_width + 1), base));
    spans.push(Span::styled(
        pad(&run.tags.join(","), TAGS_WIDTH),
        base.fg(Color::Magenta),
    ));
    spans.push(Span::styled(pad(&owner, OWNER_WIDTH), base.fg(Color::Cyan)));
    spans.push(Span::styled(pad(&status_text(run), STATUS_WIDTH), base.fg(color)));
    Line::from(spans)
}
