use std::path::{Path, PathBuf};
use futures::stream::{self, BoxStream, StreamExt};
use log::warn;
use tokio::fs;
use tokio::time::{sleep, Duration};

use crate::battery::BatterySource;
use crate::device::types::{BatteryLevel, BatteryReading};
use crate::error::BatteryError;

pub const DEFAULT_BATTERY_PATH: &str = "/sys/class/power_supply/BAT0";

/**
 * How often (milliseconds) the power supply directory is polled for changes.
 */
pub const DEFAULT_POLL_DELAY: u64 = 30_000;

/// Reads a Linux power supply directory (`capacity` and `status`).
#[derive(Debug, Clone)]
pub struct SysfsBattery {
    path: PathBuf,
    poll_delay: Duration,
}

async fn read_reading(path: &Path) -> Result<BatteryReading, BatteryError> {
    let capacity = fs::read_to_string(path.join("capacity")).await?;
    let percent: u8 = capacity.trim().parse()?;

    // a missing status file only means we cannot tell
    let is_charging = match fs::read_to_string(path.join("status")).await {
        Ok(status) => status.trim() == "Charging",
        Err(_) => false,
    };

    Ok(BatteryReading { level: BatteryLevel::from_percent(percent), is_charging })
}

impl SysfsBattery {
    pub fn new(path: impl Into<PathBuf>, poll_delay: Duration) -> Self {
        SysfsBattery { path: path.into(), poll_delay }
    }

    pub async fn reading(&self) -> Result<BatteryReading, BatteryError> {
        read_reading(&self.path).await
    }
}

impl BatterySource for SysfsBattery {
    async fn level(&self) -> Result<BatteryLevel, BatteryError> {
        Ok(self.reading().await?.level)
    }

    fn subscribe(&self) -> BoxStream<'static, BatteryReading> {
        let path = self.path.clone();
        let poll_delay = self.poll_delay;

        stream::unfold(None, move |previous: Option<BatteryReading>| {
            let path = path.clone();
            async move {
                loop {
                    if previous.is_some() {
                        sleep(poll_delay).await;
                    }

                    match read_reading(&path).await {
                        Ok(reading) if previous != Some(reading) => {
                            return Some((reading, Some(reading)));
                        },
                        Ok(_) => {},
                        Err(err) => warn!("Failed to read battery state from {}: {}", path.to_string_lossy(), err),
                    }

                    if previous.is_none() {
                        sleep(poll_delay).await;
                    }
                }
            }
        }).boxed()
    }
}
