//! Log output for field nodes.
//!
//! Bench runs want readable text; unattended gateways ship JSON lines to
//! the uplink collector. `RUST_LOG` always wins over the configured level
//! so a single node can be turned up without editing its file.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `[logging]` section of the node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info,fieldmesh_mesh=debug`
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    /// Check the configured level parses as a filter directive
    pub fn validate(&self) -> CoreResult<()> {
        self.configured_filter().map(|_| ())
    }

    /// Build the filter: `RUST_LOG` if set, the configured level otherwise
    pub fn filter(&self) -> CoreResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => self.configured_filter(),
        }
    }

    fn configured_filter(&self) -> CoreResult<EnvFilter> {
        EnvFilter::try_new(&self.level).map_err(|e| {
            CoreError::InvalidConfig(format!("logging level {:?}: {e}", self.level))
        })
    }
}

/// Install the global subscriber.
///
/// A subscriber installed earlier (tests, embedding applications) is left
/// in place.
///
/// # Example
/// ```no_run
/// use fieldmesh_core::logging::{self, LogFormat, LoggingSettings};
///
/// let settings = LoggingSettings {
///     format: LogFormat::Json,
///     ..LoggingSettings::default()
/// };
/// logging::init(&settings).unwrap();
/// tracing::info!(node_id = "GW-001", "Gateway started");
/// ```
pub fn init(settings: &LoggingSettings) -> CoreResult<()> {
    let filter = settings.filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let _ = match settings.format {
        LogFormat::Text => registry.with(fmt::layer().compact().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_text_at_info() {
        let settings = LoggingSettings::default();
        assert_eq!(settings.format, LogFormat::Text);
        assert_eq!(settings.level, "info");
    }

    #[test]
    fn test_bad_level_rejected() {
        let mut settings = LoggingSettings {
            level: "fieldmesh_mesh=loud".to_string(),
            ..LoggingSettings::default()
        };
        assert!(matches!(settings.validate(), Err(CoreError::InvalidConfig(_))));

        settings.level = "warn,fieldmesh_mesh=trace".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_init_twice_keeps_first() {
        init(&LoggingSettings::default()).unwrap();
        let json = LoggingSettings {
            format: LogFormat::Json,
            ..LoggingSettings::default()
        };
        assert!(init(&json).is_ok());
    }
}
