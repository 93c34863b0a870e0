mod config;
pub mod database;

pub use config::{CarryoverConfig, Config, TimerConfig, WeekConfig};
pub use database::Database;

use std::path::PathBuf;

/// Returns `~/.config/quizscreen[-dev]/` based on QUIZSCREEN_ENV.
///
/// Set QUIZSCREEN_ENV=dev to use a development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("QUIZSCREEN_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("quizscreen-dev")
    } else {
        base_dir.join("quizscreen")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
