// Runtime configuration for the aggregator

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    // How long a searched offer stays bookable
    pub offer_ttl_seconds: u64,
    // Upper bound on any single carrier call (search, booking, status, cancel)
    pub provider_timeout_ms: u64,
    pub booking_reference_prefix: String,
    pub booking_reference_length: usize,
    // Drop the offer from the correlation cache once it has been booked
    pub invalidate_offer_on_booking: bool,
    // Share of valid payment requests the simulated gateways approve, 0.0 to 1.0
    pub payment_approval_rate: f64,
    pub cache: CacheConfig,
    pub carriers: Vec<CarrierConfig>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            offer_ttl_seconds: 30 * 60,
            provider_timeout_ms: 3000,
            booking_reference_prefix: "MMT".to_string(),
            booking_reference_length: 8,
            invalidate_offer_on_booking: false,
            payment_approval_rate: 0.9,
            cache: CacheConfig::default(),
            carriers: CarrierConfig::builtin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub cleanup_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            cleanup_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarrierConfig {
    pub code: String,
    pub name: String,
    // When set the carrier is reached over HTTP, otherwise the simulated schedule is used
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl CarrierConfig {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            base_url: None,
            timeout_ms: None,
            enabled: true,
        }
    }

    pub fn builtin() -> Vec<CarrierConfig> {
        vec![
            CarrierConfig::new("6E", "IndiGo"),
            CarrierConfig::new("AI", "Air India"),
            CarrierConfig::new("SG", "SpiceJet"),
            CarrierConfig::new("UK", "Vistara"),
        ]
    }
}

impl AggregatorConfig {
    // Layered load: config/default, config/{RUN_MODE}, config/local, then AGGREGATOR__* env vars.
    // Every file is optional; missing keys fall back to the struct defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("AGGREGATOR").separator("__"))
            .build()?;

        let config: AggregatorConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.offer_ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "offer_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.provider_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "provider_timeout_ms must be positive".to_string(),
            ));
        }
        if self.booking_reference_length == 0 {
            return Err(ConfigError::Invalid(
                "booking_reference_length must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.payment_approval_rate) {
            return Err(ConfigError::Invalid(format!(
                "payment_approval_rate {} is outside 0.0..=1.0",
                self.payment_approval_rate
            )));
        }
        if self.cache.max_entries == 0 || self.cache.cleanup_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "cache max_entries and cleanup_interval_seconds must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for carrier in &self.carriers {
            if carrier.code.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "carrier '{}' has an empty code",
                    carrier.name
                )));
            }
            if !seen.insert(carrier.code.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "carrier code {} is configured twice",
                    carrier.code
                )));
            }
            if carrier.timeout_ms == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "carrier {} has a zero timeout",
                    carrier.code
                )));
            }
        }

        Ok(())
    }

    pub fn offer_ttl(&self) -> Duration {
        Duration::from_secs(self.offer_ttl_seconds)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache.cleanup_interval_seconds)
    }
}
