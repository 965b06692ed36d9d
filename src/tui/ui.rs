use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use super::app::{AppState, Field, Screen, MENU_ITEMS};
use super::theme::Theme;
use crate::url::mask_token;

const LOGO: [&str; 3] = [
    "  ___ _   _ _ __   ___ ___ _ __ ___| |__  ",
    " / __| | | | '_ \\ / __/ _ \\ '__/ __| '_ \\ ",
    " \\__ \\ |_| | | | | (_|  __/ | | (__| | | |",
];
const LOGO_TAIL: &str = " |___/\\__, |_| |_|\\___\\___|_|  \\___|_| |_|";
const LOGO_FOOT: &str = "       |___/                               ";

pub fn draw(f: &mut Frame, app: &AppState) {
    let background = Block::default().style(Style::default().bg(Theme::BG));
    f.render_widget(background, f.size());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(2),
        ])
        .split(f.size());

    draw_logo(f, chunks[0]);
    match app.screen {
        Screen::Menu => draw_menu(f, chunks[1], app),
        Screen::Settings => draw_settings(f, chunks[1], app),
    }
    draw_input(f, chunks[2], app);
    draw_status(f, chunks[3], app);
}

fn draw_logo(f: &mut Frame, area: Rect) {
    let mut lines: Vec<Line> = LOGO.iter().map(|l| Line::from(Span::styled(*l, Theme::logo()))).collect();
    lines.push(Line::from(Span::styled(LOGO_TAIL, Theme::logo())));
    lines.push(Line::from(Span::styled(LOGO_FOOT, Theme::logo())));
    f.render_widget(Paragraph::new(lines), area);
}

fn draw_menu(f: &mut Frame, area: Rect, app: &AppState) {
    let mut buttons: Vec<Span> = Vec::new();
    for (i, label) in MENU_ITEMS.iter().enumerate() {
        if i > 0 {
            buttons.push(Span::raw("   "));
        }
        let style = if i == app.menu_idx { Theme::button_selected() } else { Theme::button_idle() };
        buttons.push(Span::styled(format!(" {label} "), style));
    }

    let lines = vec![
        Line::from(vec![
            Span::styled("Server: ", Theme::label()),
            Span::styled(app.cfg.server_url.clone(), Theme::text()),
        ]),
        Line::from(vec![
            Span::styled("Folder: ", Theme::label()),
            Span::styled(app.cfg.folder_path.clone(), Theme::text()),
        ]),
        Line::from(""),
        Line::from(buttons),
        Line::from(""),
        Line::from(Span::styled("[←/→] select  [Enter] run  [q/Esc] quit", Theme::hint())),
    ];
    f.render_widget(Paragraph::new(lines), area);
}

fn draw_settings(f: &mut Frame, area: Rect, app: &AppState) {
    let rows = [
        format!("Folder path     [{}]", app.cfg.folder_path),
        format!("Token           [{}]", mask_token(&app.cfg.token)),
        format!("Server address  [{}]", app.cfg.server_url),
        "Back".to_string(),
    ];
    let items: Vec<ListItem> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let style = if i == app.settings_idx { Theme::selected() } else { Theme::text() };
            ListItem::new(Line::from(Span::styled(format!(" {r} "), style)))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Theme::COMMENT))
            .title(Span::styled(" Settings ", Theme::logo()))
            .title_bottom(Span::styled(" [↑/↓] move  [Enter] edit  [q/Esc] back ", Theme::hint())),
    );
    f.render_widget(list, area);
}

fn draw_input(f: &mut Frame, area: Rect, app: &AppState) {
    let Some(field) = app.editing else { return };
    let prompt = match field {
        Field::Folder => "New folder path",
        Field::Token => "New token",
        Field::Server => "New server address (http://host:port)",
    };
    let p = Paragraph::new(Line::from(vec![
        Span::styled(app.input_buffer.clone(), Theme::text()),
        Span::styled("█", Style::default().fg(Theme::PINK)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Theme::PINK))
            .title(Span::styled(format!(" {prompt}, empty cancels "), Theme::hint())),
    );
    f.render_widget(p, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &AppState) {
    let spinner = if app.running {
        ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'][app.spinner_idx % 10]
    } else {
        ' '
    };
    let line = match &app.status {
        Some((msg, kind)) => Line::from(vec![
            Span::raw(format!("{spinner} ")),
            Span::styled(msg.clone(), Theme::status(*kind)),
        ]),
        None => Line::from(Span::styled("  Ready", Theme::hint())),
    };
    let p = Paragraph::new(line).alignment(Alignment::Left).block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Theme::COMMENT)),
    );
    f.render_widget(p, area);
}
