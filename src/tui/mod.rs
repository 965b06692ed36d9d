//! Interactive menu client

pub mod app;
pub mod theme;
pub mod ui;

pub use app::run;
