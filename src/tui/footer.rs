use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::app::{AppState, Focus};
use crate::push::LinkState;

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let narrow = area.width < crate::app::NARROW_WIDTH_THRESHOLD;

    let mut hints: Vec<(&str, &str)> = if narrow {
        vec![
            ("j/k", "nav"),
            ("h/l", "page"),
            ("⏎", "open"),
            ("r", "reload"),
            ("q", "quit"),
        ]
    } else {
        vec![
            ("↑↓/jk", "navigate"),
            ("←→/hl", "page"),
            ("Enter", "open run"),
            ("r", "reload"),
            ("q", "quit"),
        ]
    };
    if state.root.is_some() {
        let target = match state.focus {
            Focus::List => "section",
            Focus::Section => "list",
        };
        hints.insert(3, ("Tab", target));
    }
    if state.link() == LinkState::Offline {
        hints.insert(hints.len() - 1, ("s", "resubscribe"));
    }

    let line = if let Some(notif) = state.notifications.last() {
        Line::from(vec![
            Span::styled("★ ", Style::default().fg(Color::Yellow)),
            Span::styled(&notif.message, Style::default().fg(Color::Yellow)),
        ])
    } else {
        let mut spans: Vec<Span> = Vec::new();
        for (i, (key, desc)) in hints.iter().enumerate() {
            if i > 0 {
                spans.push(Span::raw(" "));
            }
            spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
            spans.push(Span::styled(
                format!(" {desc}"),
                Style::default().fg(Color::DarkGray),
            ));
        }
        Line::from(spans)
    };

    let footer = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(footer, area);
}
