use crate::app::AppState;
use crate::tui::spinner;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

/// Human summary of the list filter, e.g. `pipelines.train [roots]`.
pub fn scope_label(state: &AppState) -> String {
    let scope = state
        .config
        .function_path
        .clone()
        .unwrap_or_else(|| "all pipelines".to_string());
    if state.config.roots_only {
        format!("{scope} [roots]")
    } else {
        scope
    }
}

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let mut spans = vec![
        Span::styled(
            format!(" {} ", state.config.version_string),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("│ "),
        Span::styled(
            scope_label(state),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
    ];

    if state.is_loading() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            spinner::frame(state.spinner_frame).to_string(),
            Style::default().fg(Color::Yellow),
        ));
    }

    if let Some((glyph, color)) = spinner::link_glyph(state.link(), state.spinner_frame) {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(glyph.to_string(), Style::default().fg(color)));
        if let Some(key) = state.push.subject_key() {
            spans.push(Span::styled(
                format!(" {key}"),
                Style::default().fg(Color::DarkGray),
            ));
        }
    }

    if state.error_message().is_some() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            "!",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(header, area);
}
