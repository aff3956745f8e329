use std::fmt;
use crate::error::{ArgumentError, LinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    Ready,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Scanning => "Scanning",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Ready => "Ready",
            ConnectionState::Disconnecting => "Disconnecting",
        };

        write!(f, "{}", result)
    }
}

/// Battery charge as a fraction in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct BatteryLevel(f64);

impl BatteryLevel {
    /// Clamps `fraction` into [0.0, 1.0]; NaN becomes 0.0.
    pub fn new(fraction: f64) -> Self {
        if fraction.is_nan() {
            return BatteryLevel(0.0);
        }
        BatteryLevel(fraction.clamp(0.0, 1.0))
    }

    pub fn from_percent(percent: u8) -> Self {
        BatteryLevel::new(f64::from(percent) / 100.0)
    }

    pub fn fraction(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub level: BatteryLevel,
    pub is_charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedRoutine {
    ElectricCurrentMulti,
    ElectricCurrentSingle,
    BatteryCylon,
    Rainbow,
    RainbowCylon,
    Off,
}

/// All routines, in wire index order.
pub const LED_ROUTINES: [LedRoutine; 6] = [
    LedRoutine::ElectricCurrentMulti,
    LedRoutine::ElectricCurrentSingle,
    LedRoutine::BatteryCylon,
    LedRoutine::Rainbow,
    LedRoutine::RainbowCylon,
    LedRoutine::Off,
];

impl LedRoutine {
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedRoutine::ElectricCurrentMulti => "Electric Current (Multi-Color)",
            LedRoutine::ElectricCurrentSingle => "Electric Current (Single Color)",
            LedRoutine::BatteryCylon => "Battery Level Cylon",
            LedRoutine::Rainbow => "Rainbow",
            LedRoutine::RainbowCylon => "Rainbow Cylon",
            LedRoutine::Off => "Off",
        }
    }
}

impl TryFrom<usize> for LedRoutine {
    type Error = ArgumentError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        LED_ROUTINES.get(index).copied().ok_or(ArgumentError::RoutineOutOfRange(index))
    }
}

impl fmt::Display for LedRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Transport-independent identity of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceHandle<P> {
    pub id: DeviceId,
    pub peripheral: P,
}

/// Snapshot published to observers after every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub state: ConnectionState,
    pub battery_level: BatteryLevel,
    pub is_charging: bool,
    pub last_error: Option<LinkError>,
}

impl Default for ControllerStatus {
    fn default() -> Self {
        ControllerStatus {
            state: ConnectionState::Idle,
            battery_level: BatteryLevel::default(),
            is_charging: false,
            last_error: None,
        }
    }
}
