//! Settings Schema & Loading
//! Mission: One typed settings struct; runtime store > environment > static file; missing
//! required keys are fatal at startup.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Runtime-overridable settings (spec.md §6). Decimal fields use
/// `rust_decimal::Decimal`; integer fields use the stated integer type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub min_spread_pct: Decimal,
    pub max_spread_pct: Decimal,
    pub max_slippage_pct: Decimal,
    pub max_bid_ask_spread_pct: Decimal,
    pub min_depth_vs_history_ratio: Decimal,
    pub warning_depth_ratio: Decimal,
    pub max_position_to_exit_ratio: Decimal,

    pub min_exit_liquidity_usd: u64,
    pub suggested_position_hard_cap_usd: u64,
    pub max_spread_age_hours: u32,
    pub max_price_age_ms: i64,
    pub max_latency_ms: u32,
    pub max_latency_diff_ms: u32,
    pub min_history_samples: usize,
    pub alert_cooldown_seconds: u64,

    pub max_parallel_venues: usize,

    /// Lagging-venue detector thresholds; not in the settings table of §6
    /// but named throughout §4.7 — kept alongside the rest of the tunables.
    pub min_lag_pct: Decimal,
    pub lagging_min_cohort: usize,
    pub lagging_hysteresis_ticks: u32,
    pub lagging_min_net_spread_pct: Decimal,

    /// Convergence tracker tunables (§4.10); `divergence_multiplier` is the
    /// Open Question resolved in SPEC_FULL.md / DESIGN.md.
    pub convergence_floor_pct: Decimal,
    pub convergence_consecutive_checks: u32,
    pub divergence_multiplier: Decimal,
    pub max_tracking_duration_secs: i64,

    pub http_connect_timeout_secs: u64,
    pub http_read_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_spread_pct: Decimal::new(300, 2),          // 3.00%
            max_spread_pct: Decimal::new(25000, 2),       // 250.00%
            max_slippage_pct: Decimal::new(150, 2),       // 1.50%
            max_bid_ask_spread_pct: Decimal::new(100, 2), // 1.00%
            min_depth_vs_history_ratio: Decimal::new(50, 2), // 0.50
            warning_depth_ratio: Decimal::new(80, 2),     // 0.80
            max_position_to_exit_ratio: Decimal::new(50, 2), // 0.50

            min_exit_liquidity_usd: 10_000,
            suggested_position_hard_cap_usd: 50_000,
            max_spread_age_hours: 48,
            max_price_age_ms: 5_000,
            max_latency_ms: 2_000,
            max_latency_diff_ms: 3_000,
            min_history_samples: 20,
            alert_cooldown_seconds: 300,

            max_parallel_venues: 16,

            min_lag_pct: Decimal::new(300, 2), // 3.00%
            lagging_min_cohort: 4,
            lagging_hysteresis_ticks: 3,
            lagging_min_net_spread_pct: Decimal::new(500, 2), // 5.00%

            convergence_floor_pct: Decimal::new(50, 2), // 0.50%
            convergence_consecutive_checks: 2,
            divergence_multiplier: Decimal::new(150, 2), // 1.5x
            max_tracking_duration_secs: 24 * 3600,

            http_connect_timeout_secs: 10,
            http_read_timeout_secs: 10,
        }
    }
}

/// Loads settings with precedence: runtime store row > environment variable
/// > static TOML file > code default. `runtime_overrides` models a row read
/// from the `settings:config` KV key; it is empty outside of tests in this
/// rewrite since there is no admin UI to write it.
pub fn load(
    file_path: Option<&std::path::Path>,
    runtime_overrides: &HashMap<String, String>,
) -> Result<Settings, PipelineError> {
    dotenv::dotenv().ok();

    let mut settings = Settings::default();

    if let Some(path) = file_path {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| PipelineError::Config(format!("reading {}: {e}", path.display())))?;
            let file_settings: Settings = toml::from_str(&raw)
                .map_err(|e| PipelineError::Config(format!("parsing {}: {e}", path.display())))?;
            settings = file_settings;
        }
    }

    apply_env_overrides(&mut settings)?;
    apply_runtime_overrides(&mut settings, runtime_overrides)?;
    validate(&settings)?;

    Ok(settings)
}

fn apply_env_overrides(settings: &mut Settings) -> Result<(), PipelineError> {
    if let Ok(v) = std::env::var("MIN_SPREAD_PCT") {
        settings.min_spread_pct = parse_decimal("MIN_SPREAD_PCT", &v)?;
    }
    if let Ok(v) = std::env::var("MAX_SPREAD_PCT") {
        settings.max_spread_pct = parse_decimal("MAX_SPREAD_PCT", &v)?;
    }
    if let Ok(v) = std::env::var("MIN_EXIT_LIQUIDITY_USD") {
        settings.min_exit_liquidity_usd = v
            .parse()
            .map_err(|_| PipelineError::Config("MIN_EXIT_LIQUIDITY_USD must be an integer".into()))?;
    }
    if let Ok(v) = std::env::var("MAX_PARALLEL_VENUES") {
        settings.max_parallel_venues = v
            .parse()
            .map_err(|_| PipelineError::Config("MAX_PARALLEL_VENUES must be an integer".into()))?;
    }
    if let Ok(v) = std::env::var("ALERT_COOLDOWN_SECONDS") {
        settings.alert_cooldown_seconds = v.parse().map_err(|_| {
            PipelineError::Config("ALERT_COOLDOWN_SECONDS must be an integer".into())
        })?;
    }
    Ok(())
}

fn apply_runtime_overrides(
    settings: &mut Settings,
    overrides: &HashMap<String, String>,
) -> Result<(), PipelineError> {
    if let Some(v) = overrides.get("min_spread_pct") {
        settings.min_spread_pct = parse_decimal("min_spread_pct", v)?;
    }
    if let Some(v) = overrides.get("max_spread_pct") {
        settings.max_spread_pct = parse_decimal("max_spread_pct", v)?;
    }
    if let Some(v) = overrides.get("alert_cooldown_seconds") {
        settings.alert_cooldown_seconds = v.parse().map_err(|_| {
            PipelineError::Config("runtime override alert_cooldown_seconds must be an integer".into())
        })?;
    }
    Ok(())
}

fn parse_decimal(key: &str, raw: &str) -> Result<Decimal, PipelineError> {
    raw.parse()
        .map_err(|_| PipelineError::Config(format!("{key} must be a decimal, got {raw:?}")))
}

/// `Settings` always has a code default for every field, so there is no
/// "key absent" case to check here the way a loosely-typed config loader
/// would need to. "Required at startup" (spec.md §6) instead means these
/// domain invariants hold once all four layers have been merged.
fn validate(settings: &Settings) -> Result<(), PipelineError> {
    if settings.min_spread_pct >= settings.max_spread_pct {
        return Err(PipelineError::Config(
            "min_spread_pct must be less than max_spread_pct".into(),
        ));
    }
    if settings.min_exit_liquidity_usd == 0 {
        return Err(PipelineError::Config(
            "min_exit_liquidity_usd must be present and non-zero".into(),
        ));
    }
    if settings.max_price_age_ms <= 0 {
        return Err(PipelineError::Config("max_price_age_ms must be positive".into()));
    }
    if settings.alert_cooldown_seconds == 0 {
        return Err(PipelineError::Config("alert_cooldown_seconds must be non-zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(validate(&Settings::default()).is_ok());
    }

    #[test]
    fn rejects_inverted_spread_bounds() {
        let mut s = Settings::default();
        s.max_spread_pct = s.min_spread_pct;
        assert!(validate(&s).is_err());
    }

    #[test]
    fn env_override_takes_precedence_over_file_default() {
        std::env::set_var("MIN_EXIT_LIQUIDITY_USD", "12345");
        let loaded = load(None, &HashMap::new()).unwrap();
        assert_eq!(loaded.min_exit_liquidity_usd, 12345);
        std::env::remove_var("MIN_EXIT_LIQUIDITY_USD");
    }

    #[test]
    fn runtime_override_takes_precedence_over_env() {
        std::env::set_var("MIN_SPREAD_PCT", "1.0");
        let mut overrides = HashMap::new();
        overrides.insert("min_spread_pct".to_string(), "2.0".to_string());
        let loaded = load(None, &overrides).unwrap();
        assert_eq!(loaded.min_spread_pct, Decimal::new(20, 1));
        std::env::remove_var("MIN_SPREAD_PCT");
    }
}
