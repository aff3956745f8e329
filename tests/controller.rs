//! Controller scenarios against a recording adapter, on a paused clock.

use std::sync::{Arc, Mutex};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{advance, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use battery_monitor_link::battery::BatterySource;
use battery_monitor_link::device::adapter::{AdapterEvent, BleAdapter, DiscoveredPeripheral};
use battery_monitor_link::device::constants::{BATTERY_LEVEL_CHARACTERISTIC, BATTERY_SERVICE, LED_CHARACTERISTIC};
use battery_monitor_link::device::controller::{spawn_controller, ControllerHandle, ControllerSettings};
use battery_monitor_link::device::types::{BatteryLevel, BatteryReading, ConnectionState, ControllerStatus, DeviceId, LedRoutine};
use battery_monitor_link::error::{BatteryError, DeviceError, LinkError};

#[derive(Default)]
struct Recorder {
    scans: Vec<Uuid>,
    stops: usize,
    connects: usize,
    disconnects: usize,
    resets: usize,
    writes: Vec<(Uuid, String)>,
    senders: Vec<UnboundedSender<AdapterEvent<u32>>>,
    fail_scan: bool,
    fail_connect: bool,
    fail_disconnect: bool,
    fail_writes: bool,
    hang_stop_scan: bool,
    hang_connect: bool,
    hang_disconnect: bool,
    hang_reset: bool,
}

#[derive(Clone, Default)]
struct MockAdapter {
    recorder: Arc<Mutex<Recorder>>,
}

impl MockAdapter {
    fn with<T>(&self, f: impl FnOnce(&mut Recorder) -> T) -> T {
        f(&mut self.recorder.lock().unwrap())
    }

    /// Delivers an event on the most recent event stream, like a platform callback.
    fn emit(&self, event: AdapterEvent<u32>) {
        self.with(|recorder| {
            let sender = recorder.senders.last().expect("controller has not subscribed to events");
            sender.unbounded_send(event).unwrap();
        });
    }

    fn writes(&self) -> Vec<(Uuid, String)> {
        self.with(|recorder| recorder.writes.clone())
    }
}

impl BleAdapter for MockAdapter {
    type Peripheral = u32;

    async fn events(&self) -> Result<BoxStream<'static, AdapterEvent<u32>>, DeviceError> {
        let (sender, receiver) = unbounded();
        self.with(|recorder| recorder.senders.push(sender));
        Ok(receiver.boxed())
    }

    async fn start_scan(&self, service: Uuid) -> Result<(), DeviceError> {
        self.with(|recorder| {
            recorder.scans.push(service);
            if recorder.fail_scan { Err(DeviceError::NoAdapter) } else { Ok(()) }
        })
    }

    async fn stop_scan(&self) -> Result<(), DeviceError> {
        let hang = self.with(|recorder| {
            recorder.stops += 1;
            recorder.hang_stop_scan
        });
        if hang {
            future::pending::<()>().await;
        }
        Ok(())
    }

    async fn connect(&self, _peripheral: &u32) -> Result<(), DeviceError> {
        let hang = self.with(|recorder| {
            recorder.connects += 1;
            recorder.hang_connect
        });
        if hang {
            future::pending::<()>().await;
        }
        self.with(|recorder| if recorder.fail_connect { Err(DeviceError::MissingCharacteristic) } else { Ok(()) })
    }

    async fn disconnect(&self, _peripheral: &u32) -> Result<(), DeviceError> {
        let hang = self.with(|recorder| {
            recorder.disconnects += 1;
            recorder.hang_disconnect
        });
        if hang {
            future::pending::<()>().await;
        }
        self.with(|recorder| if recorder.fail_disconnect { Err(DeviceError::NoAdapter) } else { Ok(()) })
    }

    async fn write(&self, _peripheral: &u32, characteristic: Uuid, payload: &[u8]) -> Result<(), DeviceError> {
        self.with(|recorder| {
            if recorder.fail_writes {
                return Err(DeviceError::MissingCharacteristic);
            }
            recorder.writes.push((characteristic, String::from_utf8(payload.to_vec()).unwrap()));
            Ok(())
        })
    }

    async fn reset(&mut self) -> Result<(), DeviceError> {
        let hang = self.with(|recorder| {
            recorder.resets += 1;
            recorder.hang_reset
        });
        if hang {
            future::pending::<()>().await;
        }
        Ok(())
    }
}

struct TestBattery {
    level: BatteryLevel,
    updates: Mutex<Option<UnboundedReceiver<BatteryReading>>>,
}

impl TestBattery {
    fn new(fraction: f64) -> (Self, UnboundedSender<BatteryReading>) {
        let (sender, receiver) = unbounded();
        let battery = TestBattery { level: BatteryLevel::new(fraction), updates: Mutex::new(Some(receiver)) };
        (battery, sender)
    }
}

impl BatterySource for TestBattery {
    async fn level(&self) -> Result<BatteryLevel, BatteryError> {
        Ok(self.level)
    }

    fn subscribe(&self) -> BoxStream<'static, BatteryReading> {
        match self.updates.lock().unwrap().take() {
            Some(receiver) => receiver.boxed(),
            None => stream::pending::<BatteryReading>().boxed(),
        }
    }
}

struct Harness {
    adapter: MockAdapter,
    controller: ControllerHandle,
    battery_updates: UnboundedSender<BatteryReading>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

fn start() -> Harness {
    let adapter = MockAdapter::default();
    let (battery, battery_updates) = TestBattery::new(0.73);
    let cancel = CancellationToken::new();
    let (controller, task) = spawn_controller(adapter.clone(), battery, ControllerSettings::default(), cancel.clone());

    Harness { adapter, controller, battery_updates, cancel, task }
}

fn battery_monitor(id: &str) -> AdapterEvent<u32> {
    AdapterEvent::Discovered(DiscoveredPeripheral {
        id: DeviceId(id.to_string()),
        name: Some("BatteryMonitor".to_string()),
        local_name: None,
        peripheral: 1,
    })
}

// lets the controller task drain its queue
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn wait_for_state(controller: &ControllerHandle, state: ConnectionState) -> ControllerStatus {
    controller.subscribe().wait_for(|status| status.state == state).await.unwrap().clone()
}

async fn connected() -> Harness {
    let harness = start();
    assert_eq!(harness.controller.connect().await, Ok(ConnectionState::Scanning));
    harness.adapter.emit(battery_monitor("aa"));
    wait_for_state(&harness.controller, ConnectionState::Ready).await;
    settle().await;
    harness
}

#[tokio::test(start_paused = true)]
async fn connect_pushes_battery_level_once() {
    let harness = connected().await;

    assert_eq!(harness.adapter.with(|recorder| recorder.scans.clone()), vec![BATTERY_SERVICE]);
    assert_eq!(harness.adapter.with(|recorder| recorder.stops), 1);
    assert_eq!(harness.adapter.with(|recorder| recorder.connects), 1);
    assert_eq!(harness.adapter.writes(), vec![(BATTERY_LEVEL_CHARACTERISTIC, "0.73".to_string())]);

    let status = harness.controller.status();
    assert_eq!(status.state, ConnectionState::Ready);
    assert_eq!(status.battery_level, BatteryLevel::new(0.73));
    assert_eq!(status.last_error, None);
}

#[tokio::test(start_paused = true)]
async fn second_connect_is_a_no_op() {
    let harness = start();

    assert_eq!(harness.controller.connect().await, Ok(ConnectionState::Scanning));
    assert_eq!(harness.controller.connect().await, Ok(ConnectionState::Scanning));
    assert_eq!(harness.adapter.with(|recorder| recorder.scans.len()), 1);
}

#[tokio::test(start_paused = true)]
async fn scan_times_out_after_ten_seconds() {
    let harness = start();
    harness.controller.connect().await.unwrap();

    advance(Duration::from_secs(9)).await;
    settle().await;
    assert_eq!(harness.controller.status().state, ConnectionState::Scanning);

    advance(Duration::from_secs(1)).await;
    let status = wait_for_state(&harness.controller, ConnectionState::Idle).await;
    assert_eq!(status.last_error, Some(LinkError::ScanTimeout));
    assert_eq!(harness.adapter.with(|recorder| recorder.stops), 1);

    // a peripheral showing up after the scan was abandoned is ignored
    harness.adapter.emit(battery_monitor("aa"));
    settle().await;
    assert_eq!(harness.controller.status().state, ConnectionState::Idle);
    assert_eq!(harness.adapter.with(|recorder| recorder.connects), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_does_not_fire_after_match() {
    let harness = connected().await;

    advance(Duration::from_secs(30)).await;
    settle().await;
    let status = harness.controller.status();
    assert_eq!(status.state, ConnectionState::Ready);
    assert_eq!(status.last_error, None);
}

#[tokio::test(start_paused = true)]
async fn other_peripherals_are_skipped() {
    let harness = start();
    harness.controller.connect().await.unwrap();

    harness.adapter.emit(AdapterEvent::Discovered(DiscoveredPeripheral {
        id: DeviceId("bb".to_string()),
        name: Some("Headphones".to_string()),
        local_name: None,
        peripheral: 2,
    }));
    settle().await;
    assert_eq!(harness.controller.status().state, ConnectionState::Scanning);
    assert_eq!(harness.adapter.with(|recorder| recorder.connects), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_returns_to_idle() {
    let harness = start();
    harness.adapter.with(|recorder| recorder.fail_connect = true);
    harness.controller.connect().await.unwrap();

    harness.adapter.emit(battery_monitor("aa"));
    let status = wait_for_state(&harness.controller, ConnectionState::Idle).await;

    assert!(matches!(status.last_error, Some(LinkError::ConnectFailed(_))));
    assert_eq!(harness.adapter.with(|recorder| recorder.disconnects), 1);
    assert!(harness.adapter.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unexpected_disconnect_tears_down_once() {
    let harness = connected().await;

    harness.adapter.emit(AdapterEvent::Disconnected(DeviceId("aa".to_string())));
    let status = wait_for_state(&harness.controller, ConnectionState::Idle).await;
    assert_eq!(status.last_error, Some(LinkError::UnexpectedDisconnect));
    assert_eq!(harness.adapter.with(|recorder| recorder.resets), 1);
    // the adapter was replaced, so the controller listens on a new event stream
    assert_eq!(harness.adapter.with(|recorder| recorder.senders.len()), 2);

    harness.adapter.emit(AdapterEvent::Disconnected(DeviceId("aa".to_string())));
    settle().await;
    assert_eq!(harness.adapter.with(|recorder| recorder.resets), 1);
    assert_eq!(harness.controller.status().last_error, Some(LinkError::UnexpectedDisconnect));

    assert_eq!(harness.controller.connect().await, Ok(ConnectionState::Scanning));
}

#[tokio::test(start_paused = true)]
async fn send_command_writes_routine_index() {
    let harness = connected().await;

    assert_eq!(harness.controller.send_command(LedRoutine::Rainbow).await, Ok(()));
    assert_eq!(harness.adapter.writes().last(), Some(&(LED_CHARACTERISTIC, "3".to_string())));
}

#[tokio::test(start_paused = true)]
async fn every_routine_is_sent_as_its_index() {
    let harness = connected().await;

    for index in 0..6usize {
        let routine = LedRoutine::try_from(index).unwrap();
        harness.controller.send_command(routine).await.unwrap();
        assert_eq!(harness.adapter.writes().last(), Some(&(LED_CHARACTERISTIC, index.to_string())));
    }
}

#[tokio::test(start_paused = true)]
async fn writes_while_idle_are_rejected() {
    let harness = start();

    assert_eq!(harness.controller.send_battery_level().await, Err(LinkError::NotConnected));
    assert_eq!(harness.controller.send_command(LedRoutine::Off).await, Err(LinkError::NotConnected));
    assert!(harness.adapter.writes().is_empty());
    assert_eq!(harness.controller.status().state, ConnectionState::Idle);
    assert_eq!(harness.controller.status().last_error, Some(LinkError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn failed_write_keeps_connection() {
    let harness = connected().await;
    harness.adapter.with(|recorder| recorder.fail_writes = true);

    let result = harness.controller.send_command(LedRoutine::Off).await;
    assert!(matches!(result, Err(LinkError::WriteFailed(_))));

    let status = harness.controller.status();
    assert_eq!(status.state, ConnectionState::Ready);
    assert!(matches!(status.last_error, Some(LinkError::WriteFailed(_))));
}

#[tokio::test(start_paused = true)]
async fn battery_readings_update_the_pushed_level() {
    let harness = connected().await;

    harness.battery_updates.unbounded_send(BatteryReading { level: BatteryLevel::new(0.5), is_charging: true }).unwrap();
    settle().await;
    assert!(harness.controller.status().is_charging);

    harness.controller.send_battery_level().await.unwrap();
    assert_eq!(harness.adapter.writes().last(), Some(&(BATTERY_LEVEL_CHARACTERISTIC, "0.50".to_string())));
}

#[tokio::test(start_paused = true)]
async fn battery_level_is_pushed_every_two_minutes_while_ready() {
    let harness = connected().await;
    assert_eq!(harness.adapter.writes().len(), 1);

    advance(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(harness.adapter.writes().len(), 2);

    harness.adapter.emit(AdapterEvent::Disconnected(DeviceId("aa".to_string())));
    wait_for_state(&harness.controller, ConnectionState::Idle).await;

    advance(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(harness.adapter.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn disconnect_tears_down_even_when_it_fails() {
    let harness = connected().await;
    harness.adapter.with(|recorder| recorder.fail_disconnect = true);

    assert_eq!(harness.controller.disconnect().await, Ok(ConnectionState::Idle));
    let status = harness.controller.status();
    assert_eq!(status.last_error, None);
    assert_eq!(harness.adapter.with(|recorder| recorder.disconnects), 1);
    assert_eq!(harness.adapter.with(|recorder| recorder.resets), 1);

    assert_eq!(harness.controller.send_battery_level().await, Err(LinkError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_idle_is_a_no_op() {
    let harness = start();

    assert_eq!(harness.controller.disconnect().await, Ok(ConnectionState::Idle));
    assert_eq!(harness.adapter.with(|recorder| recorder.disconnects), 0);
    assert_eq!(harness.adapter.with(|recorder| recorder.resets), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_disconnects_and_stops() {
    let harness = connected().await;

    harness.cancel.cancel();
    harness.task.await.unwrap();

    assert_eq!(harness.adapter.with(|recorder| recorder.disconnects), 1);
    assert_eq!(harness.controller.connect().await, Err(LinkError::ControllerStopped));
}

#[tokio::test(start_paused = true)]
async fn scan_start_failure_returns_to_idle() {
    let harness = start();
    harness.adapter.with(|recorder| recorder.fail_scan = true);

    assert_eq!(harness.controller.connect().await, Ok(ConnectionState::Idle));
    let status = harness.controller.status();
    assert!(matches!(status.last_error, Some(LinkError::ConnectFailed(_))));
    assert_eq!(harness.adapter.with(|recorder| recorder.stops), 1);

    // the scan timeout was never left armed
    advance(Duration::from_secs(30)).await;
    settle().await;
    assert!(matches!(harness.controller.status().last_error, Some(LinkError::ConnectFailed(_))));

    harness.adapter.with(|recorder| recorder.fail_scan = false);
    assert_eq!(harness.controller.connect().await, Ok(ConnectionState::Scanning));
}

#[tokio::test(start_paused = true)]
async fn connect_that_never_finishes_is_abandoned() {
    let harness = start();
    harness.adapter.with(|recorder| recorder.hang_connect = true);
    harness.controller.connect().await.unwrap();

    harness.adapter.emit(battery_monitor("aa"));
    wait_for_state(&harness.controller, ConnectionState::Connecting).await;

    advance(Duration::from_secs(19)).await;
    settle().await;
    assert_eq!(harness.controller.status().state, ConnectionState::Connecting);

    advance(Duration::from_secs(1)).await;
    let status = wait_for_state(&harness.controller, ConnectionState::Idle).await;
    assert!(matches!(status.last_error, Some(LinkError::ConnectFailed(_))));
    // the tentative peripheral is released
    assert_eq!(harness.adapter.with(|recorder| recorder.disconnects), 1);
    assert!(harness.adapter.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_that_never_finishes_still_tears_down() {
    let harness = connected().await;
    harness.adapter.with(|recorder| recorder.hang_disconnect = true);

    assert_eq!(harness.controller.disconnect().await, Ok(ConnectionState::Idle));
    assert_eq!(harness.controller.status().last_error, None);
    assert_eq!(harness.adapter.with(|recorder| recorder.resets), 1);

    harness.cancel.cancel();
    harness.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancel_finishes_when_disconnect_never_does() {
    let harness = connected().await;
    harness.adapter.with(|recorder| recorder.hang_disconnect = true);

    harness.cancel.cancel();
    harness.task.await.unwrap();
    assert_eq!(harness.adapter.with(|recorder| recorder.disconnects), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_scan_that_never_finishes_does_not_block_connecting() {
    let harness = start();
    harness.adapter.with(|recorder| recorder.hang_stop_scan = true);
    harness.controller.connect().await.unwrap();

    harness.adapter.emit(battery_monitor("aa"));
    wait_for_state(&harness.controller, ConnectionState::Ready).await;
    settle().await;
    assert_eq!(harness.adapter.writes(), vec![(BATTERY_LEVEL_CHARACTERISTIC, "0.73".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn reset_that_never_finishes_leaves_controller_usable() {
    let harness = connected().await;
    harness.adapter.with(|recorder| recorder.hang_reset = true);

    harness.adapter.emit(AdapterEvent::Disconnected(DeviceId("aa".to_string())));
    let status = wait_for_state(&harness.controller, ConnectionState::Idle).await;
    assert_eq!(status.last_error, Some(LinkError::UnexpectedDisconnect));

    assert_eq!(harness.controller.connect().await, Ok(ConnectionState::Scanning));
    assert_eq!(harness.adapter.with(|recorder| recorder.resets), 1);
    assert_eq!(harness.adapter.with(|recorder| recorder.senders.len()), 2);
}
