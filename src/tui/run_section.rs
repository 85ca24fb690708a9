//! The selected root run: owner, runner, tags, and the pipeline's other root runs.

use crate::app::{stats_label, truncate, AppState, Focus};
use crate::model::{resolver_label, Run};
use crate::tui::run_list::{owner_name, pad, pagination_line, state_style, status_text};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

/// Rows of pipeline runs shown under the summary line.
pub const SECTION_ROWS: u16 = 5;

/// `[AL] Ada Lovelace` style owner badge; `None` when the run has no owner.
pub fn owner_badge(run: &Run) -> Option<String> {
    let user = run.user.as_ref()?;
    Some(format!("[{}] {}", user.initials(), owner_name(user)))
}

pub fn height() -> u16 {
    // border + summary + rows + pagination
    1 + 1 + SECTION_ROWS + 1
}

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let focused = state.focus == Focus::Section;
    let border = if focused { Color::Cyan } else { Color::DarkGray };
    let title = match (&state.root, &state.root_pending) {
        (_, Some(pending)) => format!(" Run {} (loading) ", truncate(pending, 8)),
        (Some(root), None) => format!(" Run {} · {} ", root.short_id(), root.function_path),
        (None, None) => " Run ".to_string(),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(root) = &state.root else {
        f.render_widget(
            Paragraph::new("Loading run…").style(Style::default().fg(Color::DarkGray)),
            inner,
        );
        return;
    };

    let width = inner.width as usize;
    let mut lines = vec![summary_line(state, root)];

    let feed = &state.section;
    if feed.runs().is_empty() {
        let msg = if feed.is_loading() || feed.total_count().is_none() {
            "Loading pipeline runs…"
        } else {
            "No runs for this pipeline"
        };
        lines.push(Line::styled(msg, Style::default().fg(Color::DarkGray)));
    } else {
        let rows = SECTION_ROWS as usize;
        let cursor = state.section_cursor;
        let skip = if cursor >= rows { cursor + 1 - rows } else { 0 };
        for (i, run) in feed.runs().iter().enumerate().skip(skip).take(rows) {
            let selected = focused && i == cursor;
            lines.push(pipeline_run_line(run, run.id == root.id, selected, width));
        }
    }
    while lines.len() < 1 + SECTION_ROWS as usize {
        lines.push(Line::raw(""));
    }

    let mut controls = pagination_line(feed);
    controls.spans.insert(
        0,
        Span::styled(
            format!("{}  ", stats_label(feed.total_count())),
            Style::default().fg(Color::DarkGray),
        ),
    );
    lines.push(controls);

    f.render_widget(Paragraph::new(lines), inner);
}

fn summary_line(state: &AppState, root: &Run) -> Line<'static> {
    let mut spans = Vec::new();
    if let Some(badge) = owner_badge(root) {
        spans.push(Span::styled(badge, Style::default().fg(Color::Cyan)));
        spans.push(Span::raw("  "));
    }
    spans.push(Span::styled("Resolver ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
        resolver_label(state.resolution.as_ref()),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    if !root.tags.is_empty() {
        spans.push(Span::raw("  "));
        for tag in &root.tags {
            spans.push(Span::styled(
                format!("#{tag} "),
                Style::default().fg(Color::Magenta),
            ));
        }
    }
    Line::from(spans)
}

fn pipeline_run_line(run: &Run, is_root: bool, selected: bool, width: usize) -> Line<'static> {
    let (icon, color) = state_style(run.future_state);
    let mut style = Style::default();
    if is_root {
        style = style.add_modifier(Modifier::BOLD);
    }
    if selected {
        style = style.add_modifier(Modifier::REVERSED);
    }
    let marker = if is_root { "▸" } else { " " };
    let status_width = width.saturating_sub(2 + 8);
    Line::from(vec![
        Span::styled(format!("{marker}{icon}"), style.fg(color)),
        Span::styled(pad(run.short_id(), 8), style.fg(Color::DarkGray)),
        Span::styled(pad(&status_text(run), status_width), style),
    ])
}
