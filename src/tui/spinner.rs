use crate::push::LinkState;
use ratatui::style::Color;

const BRAILLE_FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub fn frame(idx: usize) -> char {
    BRAILLE_FRAMES[idx % BRAILLE_FRAMES.len()]
}

/// Live-update indicator for the push subscription. `None` while unbound.
pub fn link_glyph(link: LinkState, idx: usize) -> Option<(char, Color)> {
    match link {
        LinkState::Unbound => None,
        LinkState::Connecting => Some((frame(idx), Color::DarkGray)),
        LinkState::Live => Some(('●', Color::Green)),
        LinkState::Offline => Some(('○', Color::Red)),
    }
}
