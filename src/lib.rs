mod cli;
mod config;
pub mod db;
pub mod exercise;
pub mod models;
mod settings;
pub mod store;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cli::Cli;
use config::AppConfig;
use db::Database;
use exercise::ExerciseSessionController;
use settings::SettingsStore;

/// Shared handles for one CLI invocation.
pub(crate) struct AppState {
    pub(crate) controller: ExerciseSessionController,
    pub(crate) settings: SettingsStore,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::from_env();

    // RUST_LOG still wins when set.
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();

    let settings = SettingsStore::new(config.settings_path())?;
    let database = Database::new(config.db_path())
        .with_context(|| format!("failed to open database at {}", config.db_path().display()))?;

    let controller = ExerciseSessionController::with_system_clock(
        Arc::new(database),
        config.controller_options(&settings.get()),
    );

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        let state = AppState {
            controller,
            settings,
        };

        let output = cli::dispatch(cli.command, &state).await?;
        if !output.is_null() {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Ok(())
    })
}
