//! Application configuration.
//!
//! Loaded from a TOML file, then overlaid with `QUOTER__SECTION__KEY`
//! environment variables (for example `QUOTER__WS__LOGIN_TOKEN` or
//! `QUOTER__QUOTER__MAX_POSITION`).

use std::path::Path;
use std::time::Duration;

use quoter_core::{InstrumentSpec, Price, Size};
use quoter_mm::QuoterParams;
use quoter_ws::ConnectionConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "QUOTER";

/// Exchange environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Test,
    Prod,
}

impl Network {
    pub fn ws_url(&self) -> &'static str {
        match self {
            Self::Test => "wss://testnet.thalex.com/ws/api/v2",
            Self::Prod => "wss://thalex.com/ws/api/v2",
        }
    }
}

/// The quoted instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(default = "default_instrument_name")]
    pub name: String,
    #[serde(default = "default_price_tick")]
    pub price_tick: Decimal,
    #[serde(default = "default_size_tick")]
    pub size_tick: Decimal,
    /// Label attached to our orders. Orders without it are not ours.
    #[serde(default = "default_order_label")]
    pub order_label: String,
}

fn default_instrument_name() -> String {
    "BTC-PERPETUAL".to_string()
}

fn default_price_tick() -> Decimal {
    Decimal::ONE
}

fn default_size_tick() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_order_label() -> String {
    "simple_quoter".to_string()
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            name: default_instrument_name(),
            price_tick: default_price_tick(),
            size_tick: default_size_tick(),
            order_label: default_order_label(),
        }
    }
}

impl InstrumentConfig {
    pub fn spec(&self) -> AppResult<InstrumentSpec> {
        Ok(InstrumentSpec::new(
            self.name.clone(),
            Price::new(self.price_tick),
            Size::new(self.size_tick),
        )?)
    }
}

/// WebSocket session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Overrides the network's default URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Session token for `public/login`. Required for live trading.
    #[serde(default)]
    pub login_token: Option<String>,
    /// Venue-side cancel of our orders when the socket drops (0 = off).
    #[serde(default = "default_cancel_on_disconnect_secs")]
    pub cancel_on_disconnect_secs: u64,
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_private_channels")]
    pub private_channels: Vec<String>,
    #[serde(default)]
    pub public_channels: Vec<String>,
}

fn default_cancel_on_disconnect_secs() -> u64 {
    6
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_heartbeat_interval_ms() -> u64 {
    20_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_private_channels() -> Vec<String> {
    ["session.orders", "account.portfolio", "trades"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: None,
            login_token: None,
            cancel_on_disconnect_secs: default_cancel_on_disconnect_secs(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            private_channels: default_private_channels(),
            public_channels: Vec::new(),
        }
    }
}

impl From<WsConfig> for ConnectionConfig {
    fn from(cfg: WsConfig) -> Self {
        Self {
            url: cfg.url.unwrap_or_default(), // Network default filled in by AppConfig
            max_reconnect_attempts: cfg.max_reconnect_attempts,
            reconnect_base_delay_ms: cfg.reconnect_base_delay_ms,
            reconnect_max_delay_ms: cfg.reconnect_max_delay_ms,
            heartbeat_interval_ms: cfg.heartbeat_interval_ms,
            heartbeat_timeout_ms: cfg.heartbeat_timeout_ms,
            login_token: cfg.login_token,
            cancel_on_disconnect_secs: Some(cfg.cancel_on_disconnect_secs)
                .filter(|secs| *secs > 0),
            private_channels: cfg.private_channels,
            public_channels: cfg.public_channels,
        }
    }
}

/// Where the volatility scalar comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityMode {
    /// Constant `fixed` value.
    #[default]
    Fixed,
    /// Realized volatility of the mid price.
    Rolling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    #[serde(default)]
    pub mode: VolatilityMode,
    #[serde(default = "default_fixed_volatility")]
    pub fixed: Decimal,
    /// How often the quoter picks up a new volatility value.
    #[serde(default = "default_volatility_update_interval_secs")]
    pub update_interval_secs: u64,
    /// Mid-price returns kept by the rolling estimator.
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    #[serde(default = "default_rolling_min_samples")]
    pub rolling_min_samples: usize,
    /// Return std-dev (bps) that maps to a volatility of 1.0.
    #[serde(default = "default_reference_bps")]
    pub reference_bps: f64,
}

fn default_fixed_volatility() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_volatility_update_interval_secs() -> u64 {
    300
}

fn default_rolling_window() -> usize {
    300
}

fn default_rolling_min_samples() -> usize {
    20
}

fn default_reference_bps() -> f64 {
    10.0
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            mode: VolatilityMode::default(),
            fixed: default_fixed_volatility(),
            update_interval_secs: default_volatility_update_interval_secs(),
            rolling_window: default_rolling_window(),
            rolling_min_samples: default_rolling_min_samples(),
            reference_bps: default_reference_bps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookkeepingConfig {
    /// Fee charged on our fills when the exchange does not report one.
    #[serde(default = "default_fee_rate_bps")]
    pub fee_rate_bps: Decimal,
    #[serde(default = "default_account_summary_interval_ms")]
    pub account_summary_interval_ms: u64,
}

fn default_fee_rate_bps() -> Decimal {
    Decimal::new(25, 1) // 2.5 bps
}

fn default_account_summary_interval_ms() -> u64 {
    5_000
}

impl Default for BookkeepingConfig {
    fn default() -> Self {
        Self {
            fee_rate_bps: default_fee_rate_bps(),
            account_summary_interval_ms: default_account_summary_interval_ms(),
        }
    }
}

/// Market data polling and the quoting cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_ticker_interval_ms")]
    pub ticker_interval_ms: u64,
    /// Period of the quoting tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_ticker_interval_ms() -> u64 {
    1_000
}

fn default_tick_interval_ms() -> u64 {
    250
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ticker_interval_ms: default_ticker_interval_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// State summary period.
    #[serde(default = "default_log_interval_secs")]
    pub log_interval_secs: u64,
}

fn default_log_interval_secs() -> u64 {
    5
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_interval_secs: default_log_interval_secs(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub ws: WsConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub quoter: QuoterParams,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    #[serde(default)]
    pub bookkeeping: BookkeepingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load `path`, then apply environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            return Err(AppError::Config(format!("Config file not found: {path}")));
        }

        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without environment overrides.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the quoter cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        self.quoter.validate()?;
        self.instrument.spec()?;
        if self.instrument.order_label.is_empty() {
            return Err(AppError::Config("instrument.order_label must not be empty".to_string()));
        }
        if self.bookkeeping.fee_rate_bps < Decimal::ZERO {
            return Err(AppError::Config("bookkeeping.fee_rate_bps must be >= 0".to_string()));
        }
        if self.volatility.fixed < Decimal::ZERO {
            return Err(AppError::Config("volatility.fixed must be >= 0".to_string()));
        }
        if self.volatility.reference_bps <= 0.0 {
            return Err(AppError::Config("volatility.reference_bps must be > 0".to_string()));
        }
        let intervals = [
            ("feed.tick_interval_ms", self.feed.tick_interval_ms),
            ("feed.ticker_interval_ms", self.feed.ticker_interval_ms),
            ("bookkeeping.account_summary_interval_ms", self.bookkeeping.account_summary_interval_ms),
            ("volatility.update_interval_secs", self.volatility.update_interval_secs),
            ("telemetry.log_interval_secs", self.telemetry.log_interval_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(AppError::Config(format!("{name} must be > 0")));
        }
        Ok(())
    }

    /// Session settings with the network default URL filled in.
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut conn: ConnectionConfig = self.ws.clone().into();
        if conn.url.is_empty() {
            conn.url = self.network.ws_url().to_string();
        }
        conn
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.feed.tick_interval_ms)
    }

    pub fn ticker_interval(&self) -> Duration {
        Duration::from_millis(self.feed.ticker_interval_ms)
    }

    pub fn account_summary_interval(&self) -> Duration {
        Duration::from_millis(self.bookkeeping.account_summary_interval_ms)
    }

    pub fn volatility_update_interval(&self) -> Duration {
        Duration::from_secs(self.volatility.update_interval_secs)
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.log_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.network, Network::Test);
        assert_eq!(config.instrument.name, "BTC-PERPETUAL");
        assert_eq!(config.instrument.order_label, "simple_quoter");
        assert_eq!(config.instrument.price_tick, dec!(1));
        assert_eq!(config.instrument.size_tick, dec!(0.001));
        assert_eq!(config.quoter.min_spread_bps, dec!(0.5));
        assert_eq!(config.quoter.max_spread_bps, dec!(2.5));
        assert_eq!(config.quoter.recovery_spread_multiplier, dec!(3));
        assert_eq!(config.bookkeeping.fee_rate_bps, dec!(2.5));
        assert_eq!(config.volatility_update_interval(), Duration::from_secs(300));
        assert_eq!(config.log_interval(), Duration::from_secs(5));
        assert_eq!(config.ticker_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_config_uses_network_url() {
        let mut config = AppConfig::default();
        config.network = Network::Prod;
        let conn = config.connection_config();
        assert_eq!(conn.url, "wss://thalex.com/ws/api/v2");
        assert_eq!(conn.cancel_on_disconnect_secs, Some(6));
        assert!(conn.private_channels.contains(&"session.orders".to_string()));

        config.ws.url = Some("ws://127.0.0.1:9000".to_string());
        config.ws.cancel_on_disconnect_secs = 0;
        let conn = config.connection_config();
        assert_eq!(conn.url, "ws://127.0.0.1:9000");
        assert_eq!(conn.cancel_on_disconnect_secs, None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            network = "prod"

            [instrument]
            name = "ETH-PERPETUAL"

            [quoter]
            max_position = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(config.network, Network::Prod);
        assert_eq!(config.instrument.name, "ETH-PERPETUAL");
        assert_eq!(config.instrument.order_label, "simple_quoter");
        assert_eq!(config.quoter.max_position, dec!(1.5));
        assert_eq!(config.quoter.base_size, dec!(0.01));
        assert_eq!(config.volatility.mode, VolatilityMode::Fixed);
    }

    #[test]
    fn test_validate_rejects_inverted_spreads() {
        let result = AppConfig::from_toml(
            r#"
            [quoter]
            min_spread_bps = 3.0
            max_spread_bps = 1.0
            "#,
        );
        assert!(matches!(result, Err(AppError::Mm(_))));
    }

    #[test]
    fn test_validate_rejects_zero_tick_and_interval() {
        let mut config = AppConfig::default();
        config.instrument.price_tick = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(AppError::Core(_))));

        let mut config = AppConfig::default();
        config.feed.tick_interval_ms = 0;
        match config.validate() {
            Err(AppError::Config(msg)) => assert!(msg.contains("tick_interval_ms")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_config_error() {
        assert!(matches!(
            AppConfig::from_file("does/not/exist.toml"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_from_file_reads_toml() {
        let path = std::env::temp_dir().join(format!("quoter-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[volatility]\nmode = \"rolling\"\nfixed = 0.25\n\n[feed]\ntick_interval_ms = 100\n",
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.volatility.mode, VolatilityMode::Rolling);
        assert_eq!(config.volatility.fixed, dec!(0.25));
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("network"));
        assert!(toml_str.contains("order_label"));
    }
}
