use ratatui::style::{Color, Modifier, Style};

use super::app::StatusKind;

pub struct Theme;

impl Theme {
    // Dracula palette
    pub const BG: Color = Color::Rgb(40, 42, 54);
    pub const FG: Color = Color::Rgb(248, 248, 242);
    pub const COMMENT: Color = Color::Rgb(98, 114, 164);
    pub const CYAN: Color = Color::Rgb(139, 233, 253);
    pub const GREEN: Color = Color::Rgb(80, 250, 123);
    pub const PINK: Color = Color::Rgb(255, 121, 198);
    pub const PURPLE: Color = Color::Rgb(189, 147, 249);
    pub const RED: Color = Color::Rgb(255, 85, 85);
    pub const YELLOW: Color = Color::Rgb(241, 250, 140);

    pub fn logo() -> Style { Style::default().fg(Self::CYAN).add_modifier(Modifier::BOLD) }
    pub fn label() -> Style { Style::default().fg(Self::PURPLE) }
    pub fn text() -> Style { Style::default().fg(Self::FG) }
    pub fn hint() -> Style { Style::default().fg(Self::COMMENT) }
    pub fn button_idle() -> Style { Style::default().fg(Self::COMMENT) }
    pub fn button_selected() -> Style {
        Style::default().fg(Self::BG).bg(Self::CYAN).add_modifier(Modifier::BOLD)
    }
    pub fn selected() -> Style { Style::default().fg(Self::PINK).add_modifier(Modifier::REVERSED | Modifier::BOLD) }

    pub fn status(kind: StatusKind) -> Style {
        let fg = match kind {
            StatusKind::Info => Self::COMMENT,
            StatusKind::Progress => Self::YELLOW,
            StatusKind::Success => Self::GREEN,
            StatusKind::Error => Self::RED,
        };
        Style::default().fg(fg)
    }
}
