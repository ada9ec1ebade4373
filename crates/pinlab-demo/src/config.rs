//! Demo configuration from environment variables
//!
//! Invalid values are reported with `warn!` and replaced by defaults.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use pinlab_types::DEFAULT_TIMEOUT_SECS;

/// Accepted range for `PINLAB_TIMEOUT`, in seconds
const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=120;

/// Summary format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned table
    #[default]
    Text,
    /// One JSON document
    Json,
}

/// Demo settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// JSON pin registry to load instead of the built-in one
    pub registry_path: Option<PathBuf>,
    /// Request names to run; all when unset
    pub only: Option<Vec<String>>,
    /// Summary format
    pub output: OutputFormat,
    /// Host whose chain pins should be printed instead of running the catalog
    pub show_pins: Option<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            registry_path: None,
            only: None,
            output: OutputFormat::Text,
            show_pins: None,
        }
    }
}

impl DemoConfig {
    /// Read `PINLAB_*` variables from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(timeout_str) = lookup("PINLAB_TIMEOUT") {
            match timeout_str.trim().parse::<u64>() {
                Ok(secs) if TIMEOUT_RANGE.contains(&secs) => {
                    config.timeout = Duration::from_secs(secs);
                }
                Ok(secs) => warn!(
                    "Invalid timeout '{}', using default {}s",
                    secs,
                    config.timeout.as_secs()
                ),
                Err(e) => warn!("Failed to parse PINLAB_TIMEOUT '{}': {}", timeout_str, e),
            }
        }

        if let Some(path) = lookup("PINLAB_REGISTRY").filter(|p| !p.trim().is_empty()) {
            config.registry_path = Some(PathBuf::from(path.trim()));
        }

        if let Some(only) = lookup("PINLAB_ONLY") {
            let names: Vec<String> = only
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            if names.is_empty() {
                warn!("PINLAB_ONLY is empty, running every request");
            } else {
                config.only = Some(names);
            }
        }

        if let Some(output) = lookup("PINLAB_OUTPUT") {
            match output.trim().to_ascii_lowercase().as_str() {
                "text" => config.output = OutputFormat::Text,
                "json" => config.output = OutputFormat::Json,
                other => warn!("Unknown PINLAB_OUTPUT '{}', using text", other),
            }
        }

        if let Some(host) = lookup("PINLAB_SHOW_PINS").filter(|h| !h.trim().is_empty()) {
            config.show_pins = Some(host.trim().to_string());
        }

        config
    }
}
