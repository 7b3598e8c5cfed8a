use std::{env, path::PathBuf, time::Duration};

use crate::{exercise::ControllerOptions, settings::UserSettings};

const DATA_DIR_ENV: &str = "DIABEATERS_DATA_DIR";
const DEBUG_ENV: &str = "DIABEATERS_DEBUG";
const DEFAULT_DATA_DIR: &str = ".diabeaters";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// Debug-level logging by default.
    pub debug: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env::var_os(DATA_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let debug = env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self { data_dir, debug }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("diabeaters.sqlite3")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }

    pub fn controller_options(&self, settings: &UserSettings) -> ControllerOptions {
        ControllerOptions {
            tick_interval: Duration::from_millis(settings.tick_interval_ms.max(100)),
            heartbeat_every_ticks: 1,
            evening_hour: settings.evening_snack_hour.min(23),
        }
    }
}
