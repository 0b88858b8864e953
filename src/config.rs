use crate::exchange::SendSyncError;
use crate::types::{BotConfig, LiveConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
pub struct UserConfig {
    pub exchange: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
}

pub fn load_api_keys<P: AsRef<Path>>(
    path: P,
) -> Result<HashMap<String, UserConfig>, SendSyncError> {
    let content = fs::read_to_string(path).map_err(|e| Box::new(e) as SendSyncError)?;
    parse_api_keys(&content)
}

fn parse_api_keys(content: &str) -> Result<HashMap<String, UserConfig>, SendSyncError> {
    let api_keys: HashMap<String, UserConfig> =
        serde_json::from_str(content).map_err(|e| Box::new(e) as SendSyncError)?;
    Ok(api_keys)
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BotConfig, SendSyncError> {
    let content = fs::read_to_string(path).map_err(|e| Box::new(e) as SendSyncError)?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<BotConfig, SendSyncError> {
    let config: BotConfig =
        serde_hjson::from_str(content).map_err(|e| Box::new(e) as SendSyncError)?;
    config.live.validate()?;
    Ok(config)
}

impl LiveConfig {
    pub fn validate(&self) -> Result<(), SendSyncError> {
        if self.snapshot_interval_ms == 0 || self.wallet_poll_ms == 0 {
            return Err("polling intervals must be positive".into());
        }
        if self.reconcile_interval_secs == 0 {
            return Err("reconcile_interval_secs must be positive".into());
        }
        if self.matrix_depth < 2 {
            return Err(format!(
                "matrix_depth must be at least 2, got {}",
                self.matrix_depth
            )
            .into());
        }
        if !(self.change_gap_pct >= 0.0) {
            return Err(format!("change_gap_pct must be >= 0, got {}", self.change_gap_pct).into());
        }
        if !(self.leverage >= 1.0) {
            return Err(format!("leverage must be >= 1, got {}", self.leverage).into());
        }
        if self.max_positions == 0 {
            return Err("max_positions must be at least 1".into());
        }
        if !(self.entry_balance_share > 0.0 && self.entry_balance_share <= 1.0) {
            return Err(format!(
                "entry_balance_share must be in (0, 1], got {}",
                self.entry_balance_share
            )
            .into());
        }
        if self.trailing_stop_pct < 0.0 {
            return Err("trailing_stop_pct must be >= 0".into());
        }
        Ok(())
    }

    /// Whether a symbol passes the approved/ignored lists.
    /// An empty approved list approves everything.
    pub fn is_symbol_allowed(&self, symbol: &str) -> bool {
        if self.ignored_coins.iter().any(|s| s == symbol) {
            return false;
        }
        self.approved_coins.is_empty() || self.approved_coins.iter().any(|s| s == symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PriceType, Strategy};

    #[test]
    fn test_parse_config_applies_defaults() {
        let config = parse_config(
            r#"
            {
              live: {
                strategy: REVERSE
                price_type: indexPrice
                change_gap_pct: 0.5
              }
            }
            "#,
        )
        .unwrap();
        assert_eq!(config.live.strategy, Strategy::Reverse);
        assert_eq!(config.live.price_type, PriceType::IndexPrice);
        assert_eq!(config.live.change_gap_pct, 0.5);
        assert_eq!(config.live.matrix_depth, 5);
        assert_eq!(config.live.wallet_poll_ms, 500);
        assert!(!config.live.dry_run);
    }

    #[test]
    fn test_parse_config_rejects_shallow_matrix() {
        let err = parse_config(r#"{ live: { strategy: "INERTIA", matrix_depth: 1 } }"#).unwrap_err();
        assert!(err.to_string().contains("matrix_depth"));
    }

    #[test]
    fn test_validate_rejects_bad_share() {
        let live = LiveConfig {
            entry_balance_share: 1.5,
            ..Default::default()
        };
        assert!(live.validate().is_err());
        let live = LiveConfig {
            entry_balance_share: 0.0,
            ..Default::default()
        };
        assert!(live.validate().is_err());
        assert!(LiveConfig::default().validate().is_ok());
    }

    #[test]
    fn test_symbol_lists() {
        let mut live = LiveConfig::default();
        assert!(live.is_symbol_allowed("BTCUSDT"));
        live.ignored_coins = vec!["BTCUSDT".into()];
        assert!(!live.is_symbol_allowed("BTCUSDT"));
        live.approved_coins = vec!["ETHUSDT".into()];
        assert!(live.is_symbol_allowed("ETHUSDT"));
        assert!(!live.is_symbol_allowed("SOLUSDT"));
    }

    #[test]
    fn test_parse_api_keys() {
        let keys = parse_api_keys(
            r#"{"main": {"exchange": "bybit", "key": "k", "secret": "s"}}"#,
        )
        .unwrap();
        let user = keys.get("main").unwrap();
        assert_eq!(user.exchange, "bybit");
        assert_eq!(user.key, "k");
    }
}
