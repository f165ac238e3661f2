//! Core configuration loaded from `practicas.toml`.
//!
//! Values missing from the file fall back to defaults. `PRACTICAS_*`
//! environment variables take precedence over the file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{CoreError, CoreResult};
use crate::weights::WeightConfig;

/// Upper bound for `evaluation_deadline_days`.
pub const MAX_EVALUATION_DEADLINE_DAYS: i64 = 365;

/// Top-level configuration for the practicas core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoreConfig {
    /// Informe weight used until an explicit replacement is accepted.
    #[serde(default = "default_informe_weight")]
    pub default_informe_weight: u8,

    /// Empleador weight used until an explicit replacement is accepted.
    #[serde(default = "default_empleador_weight")]
    pub default_empleador_weight: u8,

    /// Maximum concurrent recipient sends per dispatch.
    #[serde(default = "default_dispatch_concurrency")]
    pub dispatch_concurrency: usize,

    /// Upper bound for a single transport send.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Entries fetched per page when streaming ledger queries.
    #[serde(default = "default_audit_page_size")]
    pub audit_page_size: usize,

    /// Days after the practice end date before evaluators get reminded.
    #[serde(default = "default_evaluation_deadline_days")]
    pub evaluation_deadline_days: i64,

    /// Default log level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit newline-delimited JSON log lines.
    #[serde(default)]
    pub log_json: bool,
}

fn default_informe_weight() -> u8 {
    60
}

fn default_empleador_weight() -> u8 {
    40
}

fn default_dispatch_concurrency() -> usize {
    4
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

fn default_audit_page_size() -> usize {
    256
}

fn default_evaluation_deadline_days() -> i64 {
    14
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_informe_weight: default_informe_weight(),
            default_empleador_weight: default_empleador_weight(),
            dispatch_concurrency: default_dispatch_concurrency(),
            send_timeout_ms: default_send_timeout_ms(),
            audit_page_size: default_audit_page_size(),
            evaluation_deadline_days: default_evaluation_deadline_days(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl CoreConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> CoreResult<Self> {
        let config: CoreConfig =
            toml::from_str(contents).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists (defaults otherwise), then apply
    /// `PRACTICAS_*` environment overrides.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
            toml::from_str::<CoreConfig>(&contents)
                .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    ///
    /// Recognised keys:
    /// - `PRACTICAS_DISPATCH_CONCURRENCY`
    /// - `PRACTICAS_SEND_TIMEOUT_MS`
    /// - `PRACTICAS_AUDIT_PAGE_SIZE`
    /// - `PRACTICAS_EVALUATION_DEADLINE_DAYS`
    /// - `PRACTICAS_LOG` (level)
    /// - `PRACTICAS_LOG_FORMAT` (`json` enables JSON output)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PRACTICAS_DISPATCH_CONCURRENCY") {
            self.dispatch_concurrency = parse_var("PRACTICAS_DISPATCH_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("PRACTICAS_SEND_TIMEOUT_MS") {
            self.send_timeout_ms = parse_var("PRACTICAS_SEND_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("PRACTICAS_AUDIT_PAGE_SIZE") {
            self.audit_page_size = parse_var("PRACTICAS_AUDIT_PAGE_SIZE", &v)?;
        }
        if let Some(v) = lookup("PRACTICAS_EVALUATION_DEADLINE_DAYS") {
            self.evaluation_deadline_days = parse_var("PRACTICAS_EVALUATION_DEADLINE_DAYS", &v)?;
        }
        if let Some(v) = lookup("PRACTICAS_LOG") {
            if !v.is_empty() {
                self.log_level = v;
            }
        }
        if let Some(v) = lookup("PRACTICAS_LOG_FORMAT") {
            self.log_json = v.eq_ignore_ascii_case("json");
        }
        Ok(())
    }

    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.default_weights()?;
        if self.dispatch_concurrency == 0 {
            return Err(CoreError::Config(
                "dispatch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.audit_page_size == 0 {
            return Err(CoreError::Config(
                "audit_page_size must be at least 1".to_string(),
            ));
        }
        if !(0..=MAX_EVALUATION_DEADLINE_DAYS).contains(&self.evaluation_deadline_days) {
            return Err(CoreError::Config(format!(
                "evaluation_deadline_days must be between 0 and {MAX_EVALUATION_DEADLINE_DAYS}"
            )));
        }
        Ok(())
    }

    /// The configured fallback weights, validated.
    pub fn default_weights(&self) -> CoreResult<WeightConfig> {
        WeightConfig::new(
            u32::from(self.default_informe_weight),
            u32::from(self.default_empleador_weight),
        )
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> CoreResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{key}: cannot parse {value:?}")))
}
