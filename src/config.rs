use crate::actions::SmtpConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-wide settings, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum auto-classifier confidence accepted as a match.
    #[serde(default = "default_auto_threshold")]
    pub auto_threshold: f64,
    /// Ceiling on a single auto-classifier call.
    #[serde(default = "default_auto_timeout_secs")]
    pub auto_timeout_secs: u64,
    /// Ceiling on a single email or webhook delivery.
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
    /// SMTP transport for email actions; absent means email actions fail
    /// with a configuration error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpConfig>,
}

fn default_auto_threshold() -> f64 {
    0.5
}

fn default_auto_timeout_secs() -> u64 {
    10
}

fn default_delivery_timeout_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            auto_threshold: default_auto_threshold(),
            auto_timeout_secs: default_auto_timeout_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            smtp: None,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.auto_threshold) {
            anyhow::bail!(
                "auto_threshold must be between 0.0 and 1.0, got {}",
                self.auto_threshold
            );
        }
        if self.auto_timeout_secs == 0 {
            anyhow::bail!("auto_timeout_secs must be at least 1");
        }
        if self.delivery_timeout_secs == 0 {
            anyhow::bail!("delivery_timeout_secs must be at least 1");
        }
        if let Some(smtp) = &self.smtp {
            if smtp.host.is_empty() {
                anyhow::bail!("smtp.host must not be empty");
            }
            if smtp.from.is_empty() {
                anyhow::bail!("smtp.from must not be empty");
            }
        }
        Ok(())
    }

    pub fn auto_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_timeout_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}
