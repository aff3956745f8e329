use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::battery::sysfs::{DEFAULT_BATTERY_PATH, DEFAULT_POLL_DELAY};
use crate::device::constants::{CONNECT_DELAY, DEVICE_NAME, PUSH_INTERVAL, SCAN_TIMEOUT};
use crate::device::controller::ControllerSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub device_name: String,
    pub scan_timeout_ms: u64,
    pub push_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub battery_path: PathBuf,
    pub battery_poll_ms: u64,
}

impl Config {
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            device_name: self.device_name.clone(),
            scan_timeout: Duration::from_millis(self.scan_timeout_ms),
            push_interval: Duration::from_millis(self.push_interval_ms),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn battery_poll_delay(&self) -> Duration {
        Duration::from_millis(self.battery_poll_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_name: DEVICE_NAME.to_string(),
            scan_timeout_ms: SCAN_TIMEOUT,
            push_interval_ms: PUSH_INTERVAL,
            reconnect_delay_ms: CONNECT_DELAY,
            battery_path: PathBuf::from(DEFAULT_BATTERY_PATH),
            battery_poll_ms: DEFAULT_POLL_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{ "deviceName": "Charger", "pushIntervalMs": 60000 }"#).unwrap();

        assert_eq!(config.device_name, "Charger");
        assert_eq!(config.push_interval_ms, 60_000);
        assert_eq!(config.scan_timeout_ms, SCAN_TIMEOUT);
        assert_eq!(config.battery_path, PathBuf::from(DEFAULT_BATTERY_PATH));
    }

    #[test]
    fn settings_follow_config() {
        let settings = Config::default().controller_settings();

        assert_eq!(settings.device_name, "BatteryMonitor");
        assert_eq!(settings.scan_timeout, Duration::from_secs(10));
        assert_eq!(settings.push_interval, Duration::from_secs(120));
    }
}
