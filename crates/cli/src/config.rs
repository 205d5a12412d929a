//! Environment-driven configuration of the replay binary.

use anyhow::{Context, anyhow};

use supplyerp_observability::LogFormat;
use supplyerp_purchasing::ReceivingPolicy;

pub const LOG_FORMAT_VAR: &str = "SUPPLYERP_LOG_FORMAT";
pub const OVER_DELIVERY_TOLERANCE_VAR: &str = "SUPPLYERP_OVER_DELIVERY_TOLERANCE";

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    pub log_format: LogFormat,
    /// Receiving policy for orders whose scenario does not set one.
    pub default_policy: ReceivingPolicy,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            default_policy: ReceivingPolicy::default(),
        }
    }
}

impl ReplayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(LOG_FORMAT_VAR) {
            config.log_format = raw
                .parse()
                .map_err(|e: String| anyhow!(e))
                .with_context(|| format!("invalid {LOG_FORMAT_VAR}"))?;
        }

        if let Some(raw) = lookup(OVER_DELIVERY_TOLERANCE_VAR) {
            let percent: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{OVER_DELIVERY_TOLERANCE_VAR} must be a number, got `{raw}`"))?;
            config.default_policy = ReceivingPolicy::with_over_delivery_tolerance(percent)
                .with_context(|| format!("invalid {OVER_DELIVERY_TOLERANCE_VAR}"))?;
        }

        Ok(config)
    }
}
