use uuid::Uuid;

use crate::device::constants::{BATTERY_LEVEL_CHARACTERISTIC, LED_CHARACTERISTIC};
use crate::device::types::{BatteryLevel, LedRoutine};

/// A single write-without-response to one of the peripheral's characteristics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Write {
    BatteryLevel(BatteryLevel),
    LedRoutine(LedRoutine),
}

impl Write {
    pub fn characteristic(&self) -> Uuid {
        match self {
            Write::BatteryLevel(_) => BATTERY_LEVEL_CHARACTERISTIC,
            Write::LedRoutine(_) => LED_CHARACTERISTIC,
        }
    }

    /// Both payloads are plain ASCII decimals: "0.73" for a level, "3" for a routine.
    pub fn payload(&self) -> Vec<u8> {
        let text = match self {
            Write::BatteryLevel(level) => format!("{:.2}", level.fraction()),
            Write::LedRoutine(routine) => routine.index().to_string(),
        };
        text.into_bytes()
    }
}
