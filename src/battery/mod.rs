use std::future::Future;
use futures::stream::{self, BoxStream, StreamExt};

use crate::device::types::{BatteryLevel, BatteryReading};
use crate::error::BatteryError;

pub mod sysfs;

/// Where the host's own battery level comes from.
pub trait BatterySource: Send + Sync + 'static {
    fn level(&self) -> impl Future<Output = Result<BatteryLevel, BatteryError>> + Send;

    /// Yields a reading whenever the level or the charging state changes.
    fn subscribe(&self) -> BoxStream<'static, BatteryReading>;
}

/// Always reports the same level, for hosts without a battery.
#[derive(Debug, Clone, Copy)]
pub struct FixedBattery {
    level: BatteryLevel,
}

impl FixedBattery {
    pub fn new(level: BatteryLevel) -> Self {
        FixedBattery { level }
    }
}

impl BatterySource for FixedBattery {
    async fn level(&self) -> Result<BatteryLevel, BatteryError> {
        Ok(self.level)
    }

    fn subscribe(&self) -> BoxStream<'static, BatteryReading> {
        stream::pending::<BatteryReading>().boxed()
    }
}
