//! Runtime settings: reef registry, ERDDAP servers and request policy.
//!
//! Resolution order:
//! 1. `--config <path>` (or `CORAL_CONFIG`, via clap's `env`)
//! 2. `coral.toml` in the working directory, if present
//! 3. compiled defaults
//!
//! Any field missing from the TOML file falls back to its default, so a file
//! that only lists extra reefs is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::domain::ReefLocation;
use crate::error::AppError;

pub const DEFAULT_CONFIG_FILE: &str = "coral.toml";

/// Upper bound for `live_window_days` (ten years).
pub const MAX_LIVE_WINDOW_DAYS: i64 = 3650;

pub const DEFAULT_SERVERS: [&str; 2] = [
    "https://coastwatch.pfeg.noaa.gov/erddap/griddap/NOAA_DHW.csv",
    "https://oceanwatch.pifsc.noaa.gov/erddap/griddap/NOAA_DHW.csv",
];

pub fn default_reefs() -> Vec<ReefLocation> {
    vec![
        ReefLocation::new("Andaman_Islands", 11.25, 92.77),
        ReefLocation::new("Lakshadweep_Islands", 10.56, 72.64),
        // Offshore cell; the coastal 8.78/78.14 cell is land-masked in CRW.
        ReefLocation::new("Gulf_of_Mannar", 8.80, 78.25),
        ReefLocation::new("Gulf_of_Kutch", 22.47, 69.07),
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub reefs: Vec<ReefLocation>,
    pub servers: Vec<String>,
    /// Per-request timeout for bulk history downloads.
    pub request_timeout_secs: u64,
    /// Per-request timeout for the live (last N days) lookup.
    pub live_timeout_secs: u64,
    pub max_retries: usize,
    /// Delay after a failed request (timeout, HTTP error, transport error).
    pub retry_delay_secs: u64,
    /// Delay after a response that carried no usable data.
    pub empty_retry_delay_secs: u64,
    /// Pause between consecutive history chunks.
    pub chunk_pause_secs: u64,
    pub live_window_days: i64,
    pub live_cache_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reefs: default_reefs(),
            servers: DEFAULT_SERVERS.iter().map(|s| s.to_string()).collect(),
            request_timeout_secs: 120,
            live_timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 10,
            empty_retry_delay_secs: 5,
            chunk_pause_secs: 2,
            live_window_days: 30,
            live_cache_ttl_secs: 3600,
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, `coral.toml`, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let path: Option<PathBuf> = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.exists().then_some(local)
            }
        };

        let settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    AppError::new(2, format!("Failed to read config '{}': {e}", path.display()))
                })?;
                let settings = Self::from_toml(&text)
                    .map_err(|e| AppError::new(2, format!("Invalid config '{}': {e}", path.display())))?;
                tracing::debug!(path = %path.display(), "loaded config");
                settings
            }
            None => Self::default(),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| AppError::new(2, e.to_string()))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.reefs.is_empty() {
            return Err(AppError::new(2, "Config must list at least one reef."));
        }
        for reef in &self.reefs {
            if reef.name.trim().is_empty() {
                return Err(AppError::new(2, "Reef names must not be empty."));
            }
            if !(reef.lat.is_finite() && (-90.0..=90.0).contains(&reef.lat)) {
                return Err(AppError::new(2, format!("Invalid latitude for reef {}.", reef.name)));
            }
            if !(reef.lon.is_finite() && (-180.0..=180.0).contains(&reef.lon)) {
                return Err(AppError::new(2, format!("Invalid longitude for reef {}.", reef.name)));
            }
        }
        if self.servers.is_empty() {
            return Err(AppError::new(2, "Config must list at least one ERDDAP server."));
        }
        if self.max_retries == 0 {
            return Err(AppError::new(2, "max_retries must be >= 1."));
        }
        if !(1..=MAX_LIVE_WINDOW_DAYS).contains(&self.live_window_days) {
            return Err(AppError::new(
                2,
                format!("live_window_days must be in 1..={MAX_LIVE_WINDOW_DAYS}."),
            ));
        }
        Ok(())
    }

    pub fn reef(&self, query: &str) -> Option<&ReefLocation> {
        self.reefs.iter().find(|r| r.matches(query))
    }

    pub fn reef_or_err(&self, query: &str) -> Result<&ReefLocation, AppError> {
        self.reef(query).ok_or_else(|| {
            let known: Vec<&str> = self.reefs.iter().map(|r| r.name.as_str()).collect();
            AppError::new(
                2,
                format!("Unknown reef '{query}'. Known reefs: {}", known.join(", ")),
            )
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn live_timeout(&self) -> Duration {
        Duration::from_secs(self.live_timeout_secs)
    }

    pub fn live_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.live_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.reefs.len(), 4);
        assert_eq!(s.servers.len(), 2);
        assert_eq!(s.reef("gulf of mannar").unwrap().lon, 78.25);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = Settings::from_toml(
            r#"
            max_retries = 5

            [[reefs]]
            name = "Palk_Bay"
            lat = 9.5
            lon = 79.2
            "#,
        )
        .unwrap();
        assert_eq!(s.max_retries, 5);
        assert_eq!(s.reefs.len(), 1);
        assert_eq!(s.servers.len(), 2);
        assert_eq!(s.request_timeout_secs, 120);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let s = Settings::from_toml("max_retries = 0").unwrap();
        assert_eq!(s.validate().unwrap_err().exit_code(), 2);

        let s = Settings::from_toml("servers = []").unwrap();
        assert!(s.validate().is_err());

        for days in ["0", "3651", "100000000"] {
            let s = Settings::from_toml(&format!("live_window_days = {days}")).unwrap();
            assert_eq!(s.validate().unwrap_err().exit_code(), 2, "live_window_days = {days}");
        }
        let s = Settings::from_toml("live_window_days = 3650").unwrap();
        s.validate().unwrap();

        assert!(Settings::from_toml("unknown_key = 1").is_err());
    }

    #[test]
    fn unknown_reef_lists_known_names() {
        let s = Settings::default();
        let err = s.reef_or_err("Atlantis").unwrap_err();
        assert!(err.to_string().contains("Gulf_of_Kutch"));
    }
}
