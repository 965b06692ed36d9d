use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use super::ui;
use crate::client::SyncClient;
use crate::config::ClientConfig;
use crate::logger::Logger;
use crate::url::{expand_path, normalize_server_url};

/// Terminal guard that ensures proper cleanup on drop
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = io::stdout().flush();
    }
}

/// Messages from the transfer worker
pub enum UiMsg {
    TransferComplete { success: bool, message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Download,
    Upload,
}

impl Op {
    fn label(self) -> &'static str {
        match self {
            Op::Download => "Downloading...",
            Op::Upload => "Uploading...",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Menu,
    Settings,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Progress,
    Success,
    Error,
}

/// Editable settings rows; the fourth row is "Back"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Folder,
    Token,
    Server,
}

pub const MENU_ITEMS: [&str; 3] = ["download", "upload", "settings"];
pub const SETTINGS_ROWS: usize = 4;

/// What the event loop should do after a key press
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Start(Op),
}

pub struct AppState {
    pub cfg: ClientConfig,
    pub config_path: PathBuf,
    pub screen: Screen,
    pub menu_idx: usize,
    pub settings_idx: usize,
    pub editing: Option<Field>,
    pub input_buffer: String,
    pub status: Option<(String, StatusKind)>,
    pub running: bool,
    pub spinner_idx: usize,
    settings_dirty: bool,
    /// A first Ctrl+C arrived while a transfer was running
    interrupt_armed: bool,
}

impl AppState {
    pub fn new(cfg: ClientConfig, config_path: PathBuf) -> Self {
        Self {
            cfg,
            config_path,
            screen: Screen::Menu,
            menu_idx: 0,
            settings_idx: 0,
            editing: None,
            input_buffer: String::new(),
            status: None,
            running: false,
            spinner_idx: 0,
            settings_dirty: false,
            interrupt_armed: false,
        }
    }

    fn set_status(&mut self, msg: impl Into<String>, kind: StatusKind) {
        self.status = Some((msg.into(), kind));
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return self.handle_interrupt();
        }
        if self.editing.is_some() {
            self.handle_input_key(key.code);
            return Action::None;
        }
        match self.screen {
            Screen::Menu => self.handle_menu_key(key.code),
            Screen::Settings => {
                self.handle_settings_key(key.code);
                Action::None
            }
        }
    }

    /// Ctrl+C quits at once when idle; mid-transfer it takes a second press
    fn handle_interrupt(&mut self) -> Action {
        if !self.running || self.interrupt_armed {
            return Action::Quit;
        }
        self.interrupt_armed = true;
        self.set_status(
            "Transfer in progress, press Ctrl+C again to abandon it (the folder may be left partial)",
            StatusKind::Error,
        );
        Action::None
    }

    fn handle_menu_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => {
                if self.running {
                    self.set_status("Transfer in progress, wait for it to finish", StatusKind::Error);
                    Action::None
                } else {
                    Action::Quit
                }
            }
            KeyCode::Left => {
                self.menu_idx = (self.menu_idx + MENU_ITEMS.len() - 1) % MENU_ITEMS.len();
                Action::None
            }
            KeyCode::Right => {
                self.menu_idx = (self.menu_idx + 1) % MENU_ITEMS.len();
                Action::None
            }
            KeyCode::Enter => match self.menu_idx {
                0 => self.try_start(Op::Download),
                1 => self.try_start(Op::Upload),
                _ => {
                    self.screen = Screen::Settings;
                    self.settings_idx = 0;
                    self.settings_dirty = false;
                    self.status = None;
                    Action::None
                }
            },
            _ => Action::None,
        }
    }

    fn try_start(&mut self, op: Op) -> Action {
        if self.running {
            self.set_status("Transfer in progress", StatusKind::Error);
            return Action::None;
        }
        if self.cfg.is_incomplete() {
            self.set_status("Set folder and token in settings first", StatusKind::Error);
            return Action::None;
        }
        self.running = true;
        self.set_status(op.label(), StatusKind::Progress);
        Action::Start(op)
    }

    fn handle_settings_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => self.leave_settings(),
            KeyCode::Up => {
                self.settings_idx = (self.settings_idx + SETTINGS_ROWS - 1) % SETTINGS_ROWS;
            }
            KeyCode::Down => {
                self.settings_idx = (self.settings_idx + 1) % SETTINGS_ROWS;
            }
            KeyCode::Enter => {
                let field = match self.settings_idx {
                    0 => Field::Folder,
                    1 => Field::Token,
                    2 => Field::Server,
                    _ => {
                        self.leave_settings();
                        return;
                    }
                };
                self.editing = Some(field);
                self.input_buffer.clear();
            }
            _ => {}
        }
    }

    fn leave_settings(&mut self) {
        self.screen = Screen::Menu;
        if self.settings_dirty {
            self.set_status("Settings saved", StatusKind::Success);
        }
    }

    fn handle_input_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter => self.commit_input(),
            KeyCode::Esc => {
                self.editing = None;
                self.input_buffer.clear();
                self.set_status("Cancelled", StatusKind::Info);
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            KeyCode::Char(c) => self.input_buffer.push(c),
            _ => {}
        }
    }

    fn commit_input(&mut self) {
        let Some(field) = self.editing.take() else { return };
        let value = std::mem::take(&mut self.input_buffer);
        let value = value.trim();
        if value.is_empty() {
            self.set_status("Cancelled", StatusKind::Info);
            return;
        }
        let msg = match field {
            Field::Folder => {
                self.cfg.folder_path = expand_path(value).to_string_lossy().into_owned();
                "Folder path updated"
            }
            Field::Token => {
                self.cfg.token = value.to_string();
                "Token updated"
            }
            Field::Server => match normalize_server_url(value) {
                Some(url) => {
                    self.cfg.server_url = url;
                    "Server address updated"
                }
                None => {
                    self.set_status("Invalid server address", StatusKind::Error);
                    return;
                }
            },
        };
        match self.cfg.save(&self.config_path) {
            Ok(()) => {
                self.settings_dirty = true;
                self.set_status(msg, StatusKind::Success);
            }
            Err(e) => self.set_status(format!("Could not save settings: {e:#}"), StatusKind::Error),
        }
    }

    fn apply(&mut self, msg: UiMsg) {
        match msg {
            UiMsg::TransferComplete { success, message } => {
                self.running = false;
                self.interrupt_armed = false;
                let kind = if success { StatusKind::Success } else { StatusKind::Error };
                self.set_status(message, kind);
            }
        }
    }
}

fn spawn_transfer(op: Op, cfg: ClientConfig, logger: Arc<dyn Logger>, tx: Sender<UiMsg>) {
    std::thread::spawn(move || {
        let folder = cfg.folder();
        let res = SyncClient::new(&cfg.server_url, &cfg.token).and_then(|c| match op {
            Op::Download => c.download(&folder, logger.as_ref()),
            Op::Upload => c.upload(&folder, logger.as_ref()),
        });
        let msg = match (op, res) {
            (Op::Download, Ok(r)) => UiMsg::TransferComplete {
                success: true,
                message: format!("Folder downloaded: {}", r.summary()),
            },
            (Op::Upload, Ok(r)) => UiMsg::TransferComplete {
                success: true,
                message: format!("Folder uploaded: {}", r.summary()),
            },
            (Op::Download, Err(e)) => UiMsg::TransferComplete {
                success: false,
                message: format!("Download failed: {e:#}"),
            },
            (Op::Upload, Err(e)) => UiMsg::TransferComplete {
                success: false,
                message: format!("Upload failed: {e:#}"),
            },
        };
        let _ = tx.send(msg);
    });
}

pub fn run(cfg: ClientConfig, config_path: PathBuf, logger: Arc<dyn Logger>) -> Result<()> {
    // Install panic hook to restore terminal on panic
    let original_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = io::stdout().flush();
        original_panic(info);
    }));

    let _guard = TerminalGuard;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = AppState::new(cfg, config_path);
    let (tx_ui, rx_ui): (Sender<UiMsg>, Receiver<UiMsg>) = channel();

    loop {
        while let Ok(msg) = rx_ui.try_recv() {
            app.apply(msg);
        }
        if app.running {
            app.spinner_idx = (app.spinner_idx + 1) % 10;
        }

        terminal.draw(|f| ui::draw(f, &app))?;

        if event::poll(Duration::from_millis(80))? {
            if let Event::Key(k) = event::read()? {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match app.handle_key(k) {
                    Action::Quit => break,
                    Action::Start(op) => {
                        spawn_transfer(op, app.cfg.clone(), Arc::clone(&logger), tx_ui.clone())
                    }
                    Action::None => {}
                }
            }
        }
    }
    Ok(())
}
