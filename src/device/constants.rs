use uuid::Uuid;

/**
 * How long (milliseconds) a scan may run without finding the peripheral.
 */
pub const SCAN_TIMEOUT: u64 = 10_000;

/**
 * How often (milliseconds) the current battery level is pushed to a connected peripheral.
 */
pub const PUSH_INTERVAL: u64 = 120_000;

/**
 * How long (milliseconds) the `run` command waits before attempting to reconnect.
 */
pub const CONNECT_DELAY: u64 = 5_000;

/**
 * The advertised name (or local name) of the peripheral to connect to.
 */
pub const DEVICE_NAME: &str = "BatteryMonitor";

/**
 * The UUID of the standard Bluetooth battery service (0x180F). Also used as the scan filter.
 */
pub const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/**
 * The UUID of the characteristic that receives the battery level (0x2A19).
 */
pub const BATTERY_LEVEL_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/**
 * The UUID of the characteristic that receives the LED routine index.
 */
pub const LED_CHARACTERISTIC: Uuid = Uuid::from_u128(0x19b10001_e8f2_537e_4f6c_d104768a1214);

/**
 * How long (milliseconds) connecting and discovering services may take.
 */
pub const CONNECT_DEADLINE: u64 = 20_000;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2_000;

/**
 * How long (milliseconds) disconnecting from a peripheral may take. A graceful disconnect that
 * takes longer is torn down locally.
 */
pub const DISCONNECT_DEADLINE: u64 = 5_000;

/**
 * How long (milliseconds) starting or stopping a scan may take.
 */
pub const SCAN_CONTROL_DEADLINE: u64 = 5_000;

/**
 * How long (milliseconds) acquiring a fresh adapter (and its event stream) may take.
 */
pub const RESET_DEADLINE: u64 = 10_000;
