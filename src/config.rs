use crate::domain::{Asset, Decimal};
use crate::ledger::Precision;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub events_path: String,
    pub ledger: LedgerConfig,
}

/// Engine-facing settings. Defaults reproduce the reference behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub reference_currency: Asset,
    /// Symbols rounded to 4 decimals with dust removal.
    pub fiat_currencies: Vec<Asset>,
    pub fiat_epsilon: Decimal,
    /// Precision for assets that declare 0 decimals.
    pub default_decimals: u32,
    pub reconcile_window_ms: u64,
    /// Relative tolerance in percent.
    pub reconcile_tolerance_pct: Decimal,
    /// Clear the short flag of a margin instrument once its sub-ledger is flat.
    pub margin_reset_on_flat: bool,
    /// Value short closes as short-sale receipts against the buy-back,
    /// instead of as a disposal of the short lots.
    pub margin_short_close_economic: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            reference_currency: Asset::new("EUR"),
            fiat_currencies: vec![Asset::new("USD"), Asset::new("EUR")],
            fiat_epsilon: Decimal::parse_or_zero("0.0001"),
            default_decimals: 8,
            reconcile_window_ms: 15 * 60 * 1000,
            reconcile_tolerance_pct: Decimal::from(10),
            margin_reset_on_flat: false,
            margin_short_close_economic: false,
        }
    }
}

impl LedgerConfig {
    pub fn is_fiat(&self, asset: &Asset) -> bool {
        self.fiat_currencies.contains(asset)
    }

    pub fn is_reference(&self, asset: &Asset) -> bool {
        &self.reference_currency == asset
    }

    /// Declared decimals, or the default when the feed reports none.
    pub fn decimals_or_default(&self, decimals: u32) -> u32 {
        if decimals == 0 {
            self.default_decimals
        } else {
            decimals
        }
    }

    /// How amounts of `asset` are normalised while consuming lots.
    pub fn precision_for(&self, asset: &Asset, decimals: u32) -> Precision {
        if self.is_fiat(asset) {
            Precision::Fiat {
                epsilon: self.fiat_epsilon,
            }
        } else {
            Precision::Decimals(self.decimals_or_default(decimals))
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let events_path = env_map
            .get("EVENTS_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("EVENTS_PATH".to_string()))?;

        let ledger = parse_ledger_config_from_map(&env_map)?;

        Ok(Config {
            port,
            events_path,
            ledger,
        })
    }
}

#[cfg_attr(not(test), allow(dead_code))]
fn parse_ledger_config_from_map(
    env_map: &HashMap<String, String>,
) -> Result<LedgerConfig, ConfigError> {
    let defaults = LedgerConfig::default();

    let reference_currency = match env_map.get("REFERENCE_CURRENCY").map(|s| s.trim()) {
        Some("") => {
            return Err(ConfigError::InvalidValue(
                "REFERENCE_CURRENCY".to_string(),
                "must not be empty".to_string(),
            ))
        }
        Some(symbol) => Asset::new(symbol.to_ascii_uppercase()),
        None => defaults.reference_currency,
    };

    let fiat_currencies = match env_map.get("FIAT_CURRENCIES") {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .map(Asset::new)
            .collect(),
        None => defaults.fiat_currencies,
    };

    let fiat_epsilon = parse_decimal(env_map, "FIAT_EPSILON", defaults.fiat_epsilon)?;
    if fiat_epsilon.is_negative() {
        return Err(ConfigError::InvalidValue(
            "FIAT_EPSILON".to_string(),
            "must not be negative".to_string(),
        ));
    }

    let default_decimals = env_map
        .get("DEFAULT_DECIMALS")
        .map(|s| s.as_str())
        .unwrap_or("8")
        .parse::<u32>()
        .ok()
        .filter(|dp| *dp <= 28)
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "DEFAULT_DECIMALS".to_string(),
                "must be an integer between 0 and 28".to_string(),
            )
        })?;

    let reconcile_window_ms = env_map
        .get("RECONCILE_WINDOW_MS")
        .map(|s| s.as_str())
        .unwrap_or("900000")
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::InvalidValue(
                "RECONCILE_WINDOW_MS".to_string(),
                "must be a non-negative integer".to_string(),
            )
        })?;

    let reconcile_tolerance_pct = parse_decimal(
        env_map,
        "RECONCILE_TOLERANCE_PCT",
        defaults.reconcile_tolerance_pct,
    )?;

    let margin_reset_on_flat = parse_bool(env_map, "MARGIN_RESET_ON_FLAT")?;
    let margin_short_close_economic = parse_bool(env_map, "MARGIN_SHORT_CLOSE_ECONOMIC")?;

    Ok(LedgerConfig {
        reference_currency,
        fiat_currencies,
        fiat_epsilon,
        default_decimals,
        reconcile_window_ms,
        reconcile_tolerance_pct,
        margin_reset_on_flat,
        margin_short_close_economic,
    })
}

fn parse_bool(env_map: &HashMap<String, String>, key: &str) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.as_str()).unwrap_or("false") {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be true or false, got {}", other),
        )),
    }
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match env_map.get(key) {
        Some(raw) => Decimal::from_str_canonical(raw).map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a decimal number".to_string())
        }),
        None => Ok(default),
    }
}
