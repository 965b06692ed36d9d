//! Spinner for the scripted `upload` / `download` subcommands

use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct TransferSpinner {
    spinner: ProgressBar,
}

impl TransferSpinner {
    pub fn new(msg: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
        );
        spinner.set_message(msg.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self { spinner }
    }

    pub fn success(&self, msg: &str) {
        self.spinner.finish_with_message(format!(
            "{} {}",
            "Done".with(Color::Green).bold(),
            msg
        ));
    }

    pub fn failure(&self, msg: &str) {
        self.spinner.abandon_with_message(format!(
            "{} {}",
            "Failed".with(Color::Red).bold(),
            msg
        ));
    }
}

impl Drop for TransferSpinner {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
