use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "library_scraper";
const ENV_PREFIX: &str = "LIBRARY";

/// Runtime settings. Layered: defaults, `library_scraper.toml`, `LIBRARY_*` env vars,
/// then whatever the CLI overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub listing_url: String,
    pub user_agent: String,
    pub listing_timeout_secs: u64,
    pub detail_timeout_secs: u64,
    pub delay_ms: u64,
    pub page_size: u32,
    pub listing_id: u32,
    /// Hard cap on pages fetched per content type. Unset trusts the provider's page count.
    pub max_pages: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/library.db"),
            listing_url: "https://hub.villageofwisdom.org/library/?jsf_ajax=1".to_string(),
            user_agent: "Mozilla/5.0 (compatible; LibraryScraper/1.0)".to_string(),
            listing_timeout_secs: 15,
            detail_timeout_secs: 20,
            delay_ms: 1000,
            page_size: 20,
            listing_id: 6497,
            max_pages: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
