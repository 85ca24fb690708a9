use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    DismissError,
    MoveUp,
    MoveDown,
    NextPage,
    PreviousPage,
    Reload,
    SelectRun,
    SwitchFocus,
    RetrySubscription,
    None,
}

/// Captures the UI state needed to interpret a key press.
#[derive(Debug, Clone, Default)]
pub struct InputContext {
    pub has_error: bool,
    pub link_offline: bool,
}

pub fn map_key(key: KeyEvent, ctx: &InputContext) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }

    // Ctrl+C always quits
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }

    match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Esc => {
            if ctx.has_error {
                Action::DismissError
            } else {
                Action::Quit
            }
        }
        KeyCode::Up | KeyCode::Char('k') => Action::MoveUp,
        KeyCode::Down | KeyCode::Char('j') => Action::MoveDown,
        KeyCode::Right | KeyCode::Char('l') | KeyCode::PageDown => Action::NextPage,
        KeyCode::Left | KeyCode::Char('h') | KeyCode::PageUp => Action::PreviousPage,
        KeyCode::Char('r') => Action::Reload,
        KeyCode::Enter => Action::SelectRun,
        KeyCode::Tab => Action::SwitchFocus,
        KeyCode::Char('s') if ctx.link_offline => Action::RetrySubscription,
        _ => Action::None,
    }
}
