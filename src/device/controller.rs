use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::channel::oneshot;
use futures::stream::{self, BoxStream, Fuse};
use log::{info, warn};
use tokio::spawn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, sleep_until, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::battery::BatterySource;
use crate::device::adapter::{AdapterEvent, BleAdapter};
use crate::device::constants::{
    BATTERY_SERVICE, CONNECT_DEADLINE, DEVICE_NAME, DISCONNECT_DEADLINE, PUSH_INTERVAL, RESET_DEADLINE,
    SCAN_CONTROL_DEADLINE, SCAN_TIMEOUT, WRITE_DEADLINE,
};
use crate::device::machine::{Action, ConnectionMachine, Event};
use crate::device::protocol::Write;
use crate::device::types::{BatteryReading, ConnectionState, ControllerStatus, LedRoutine};
use crate::error::LinkError;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub device_name: String,
    pub scan_timeout: Duration,
    pub push_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        ControllerSettings {
            device_name: DEVICE_NAME.to_string(),
            scan_timeout: Duration::from_millis(SCAN_TIMEOUT),
            push_interval: Duration::from_millis(PUSH_INTERVAL),
        }
    }
}

#[derive(Debug)]
enum Command {
    Connect(oneshot::Sender<ConnectionState>),
    Disconnect(oneshot::Sender<ConnectionState>),
    SendBatteryLevel(oneshot::Sender<Result<(), LinkError>>),
    SendCommand(LedRoutine, oneshot::Sender<Result<(), LinkError>>),
}

/// Caller side of a running connection controller. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: Sender<Command>,
    status: watch::Receiver<ControllerStatus>,
}

impl ControllerHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, LinkError> {
        let (reply, response) = oneshot::channel();
        let mut commands = self.commands.clone();

        commands.send(make(reply)).await.map_err(|_| LinkError::ControllerStopped)?;
        response.await.map_err(|_| LinkError::ControllerStopped)
    }

    /// Starts scanning if idle. Returns the state after the request; a no-op unless `Idle`.
    pub async fn connect(&self) -> Result<ConnectionState, LinkError> {
        self.request(Command::Connect).await
    }

    /// Gracefully disconnects if ready and waits for the teardown.
    pub async fn disconnect(&self) -> Result<ConnectionState, LinkError> {
        self.request(Command::Disconnect).await
    }

    /// Writes the current battery level. Success means the local transport accepted it.
    pub async fn send_battery_level(&self) -> Result<(), LinkError> {
        self.request(Command::SendBatteryLevel).await?
    }

    pub async fn send_command(&self, routine: LedRoutine) -> Result<(), LinkError> {
        self.request(|reply| Command::SendCommand(routine, reply)).await?
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }
}

async fn with_deadline<T, E: Display>(deadline: u64, fut: impl Future<Output = Result<T, E>>) -> Result<T, String> {
    tokio::select! {
        _ = sleep(Duration::from_millis(deadline)) => Err(format!("took longer than {}ms", deadline)),
        result = fut => result.map_err(|err| err.to_string()),
    }
}

struct ConnectionController<A: BleAdapter> {
    adapter: A,
    machine: ConnectionMachine<A::Peripheral>,
    settings: ControllerSettings,
    events: Fuse<BoxStream<'static, AdapterEvent<A::Peripheral>>>,
    scan_deadline: Option<Instant>,
    status: watch::Sender<ControllerStatus>,
}

impl<A: BleAdapter> ConnectionController<A> {
    fn new(adapter: A, settings: ControllerSettings, status: watch::Sender<ControllerStatus>) -> Self {
        ConnectionController {
            adapter,
            machine: ConnectionMachine::new(settings.device_name.clone()),
            settings,
            events: stream::pending().boxed().fuse(),
            scan_deadline: None,
            status,
        }
    }

    async fn subscribe_events(&mut self) {
        self.events = match with_deadline(RESET_DEADLINE, self.adapter.events()).await {
            Ok(events) => events.fuse(),
            Err(err) => {
                warn!("Failed to subscribe to bluetooth adapter events: {}", err);
                stream::pending().boxed().fuse()
            },
        };
    }

    fn publish(&self) {
        let status = self.machine.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    /// Discards the adapter and acquires a fresh one.
    ///
    /// The platform libraries can leak connection state across sessions, so every teardown starts
    /// over with a new adapter instance instead of reusing the old one.
    async fn reset_adapter(&mut self) {
        info!("Resetting bluetooth adapter");
        if let Err(err) = with_deadline(RESET_DEADLINE, self.adapter.reset()).await {
            warn!("Failed to reset bluetooth adapter: {}", err);
        }
        self.subscribe_events().await;
    }

    async fn stop_scan(&mut self) {
        if let Err(err) = with_deadline(SCAN_CONTROL_DEADLINE, self.adapter.stop_scan()).await {
            warn!("Failed to stop scanning: {}", err);
        }
    }

    async fn perform(&mut self, action: Action<A::Peripheral>) -> Result<Option<Event<A::Peripheral>>, LinkError> {
        match action {
            Action::StartScan => {
                info!("Scanning for {}...", self.settings.device_name);
                if let Err(err) = with_deadline(SCAN_CONTROL_DEADLINE, self.adapter.start_scan(BATTERY_SERVICE)).await {
                    warn!("Scanning failed: {}", err);
                    return Ok(Some(Event::ScanFailed(err)));
                }
            },
            Action::StopScan => self.stop_scan().await,
            Action::ArmScanTimeout => {
                self.scan_deadline = Some(Instant::now() + self.settings.scan_timeout);
            },
            Action::CancelScanTimeout => {
                self.scan_deadline = None;
            },
            Action::Connect(device) => {
                info!("Connecting to peripheral {}...", device.id);
                return match with_deadline(CONNECT_DEADLINE, self.adapter.connect(&device.peripheral)).await {
                    Ok(()) => {
                        info!("Peripheral ready");
                        Ok(Some(Event::ConnectSucceeded))
                    },
                    Err(reason) => Ok(Some(Event::ConnectFailed(reason))),
                };
            },
            Action::Release(device) => {
                if let Err(err) = with_deadline(DISCONNECT_DEADLINE, self.adapter.disconnect(&device.peripheral)).await {
                    warn!("Failed to release peripheral {}: {}", device.id, err);
                }
            },
            Action::Disconnect(device) => {
                info!("Disconnecting from peripheral {}...", device.id);
                let result = with_deadline(DISCONNECT_DEADLINE, self.adapter.disconnect(&device.peripheral)).await;
                return Ok(Some(Event::DisconnectFinished(result)));
            },
            Action::Deregister(subscription) => subscription.deregister(),
            Action::ResetAdapter => self.reset_adapter().await,
            Action::Write(device, write) => {
                let payload = write.payload();
                let fut = self.adapter.write(&device.peripheral, write.characteristic(), &payload);

                match with_deadline(WRITE_DEADLINE, fut).await {
                    Ok(()) => info!("Sent {:?} ({}) to {}", write, String::from_utf8_lossy(&payload), device.id),
                    Err(reason) => return Err(LinkError::WriteFailed(reason)),
                }
            },
            Action::Reject(error) => return Err(error),
        }

        Ok(None)
    }

    /// Feeds one event through the machine, then every follow-up event its actions produce.
    /// Returns the first write error, if any.
    async fn dispatch(&mut self, event: Event<A::Peripheral>) -> Result<(), LinkError> {
        let mut outcome = Ok(());
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let actions = self.machine.handle(event);
            self.publish();

            for action in actions {
                match self.perform(action).await {
                    Ok(Some(follow_up)) => pending.push_back(follow_up),
                    Ok(None) => {},
                    Err(err) => {
                        if let LinkError::WriteFailed(reason) = &err {
                            pending.push_back(Event::WriteFailed(reason.clone()));
                        }
                        if outcome.is_ok() {
                            outcome = Err(err);
                        }
                    },
                }
            }
        }

        outcome
    }

    async fn execute(&mut self, command: Command) {
        // a dropped receiver only means the caller stopped waiting
        match command {
            Command::Connect(reply) => {
                let _ = self.dispatch(Event::ConnectRequested).await;
                let _ = reply.send(self.machine.state());
            },
            Command::Disconnect(reply) => {
                let _ = self.dispatch(Event::DisconnectRequested).await;
                let _ = reply.send(self.machine.state());
            },
            Command::SendBatteryLevel(reply) => {
                let write = Write::BatteryLevel(self.machine.battery_level());
                let _ = reply.send(self.dispatch(Event::WriteRequested(write)).await);
            },
            Command::SendCommand(routine, reply) => {
                let write = Write::LedRoutine(routine);
                let _ = reply.send(self.dispatch(Event::WriteRequested(write)).await);
            },
        }
    }

    async fn shutdown(&mut self) {
        match self.machine.state() {
            ConnectionState::Ready => {
                let _ = self.dispatch(Event::DisconnectRequested).await;
            },
            ConnectionState::Scanning => self.stop_scan().await,
            _ => {},
        }
    }

    async fn run<B: BatterySource>(mut self, battery: B, mut commands: Receiver<Command>, cancel: CancellationToken) {
        match battery.level().await {
            Ok(level) => {
                let _ = self.dispatch(Event::BatteryChanged(BatteryReading { level, is_charging: false })).await;
            },
            Err(err) => warn!("Failed to read battery level: {}", err),
        }

        let mut battery_updates = battery.subscribe().fuse();
        self.subscribe_events().await;

        let mut push = interval_at(Instant::now() + self.settings.push_interval, self.settings.push_interval);
        push.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'mainloop: loop {
            let deadline = self.scan_deadline;

            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                command = commands.next() => match command {
                    Some(command) => self.execute(command).await,
                    None => break 'mainloop,
                },
                Some(event) = self.events.next() => {
                    let event = match event {
                        AdapterEvent::Discovered(discovered) => Event::PeripheralDiscovered(discovered),
                        AdapterEvent::Disconnected(id) => Event::PeripheralDisconnected(id),
                    };
                    let _ = self.dispatch(event).await;
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.scan_deadline = None;
                    let _ = self.dispatch(Event::ScanTimedOut).await;
                },
                _ = push.tick() => {
                    let _ = self.dispatch(Event::PushTick).await;
                },
                Some(reading) = battery_updates.next() => {
                    let _ = self.dispatch(Event::BatteryChanged(reading)).await;
                },
            }
        }

        info!("Stopping connection controller");
        self.shutdown().await;
    }
}

/// Spawns the controller task. All adapter callbacks, timers, battery readings and the returned
/// handle's requests are handled one at a time by that task.
pub fn spawn_controller<A: BleAdapter, B: BatterySource>(
    adapter: A,
    battery: B,
    settings: ControllerSettings,
    cancel: CancellationToken,
) -> (ControllerHandle, JoinHandle<()>) {
    let (command_sender, command_receiver) = channel::<Command>(16);
    let (status_sender, status_receiver) = watch::channel(ControllerStatus::default());

    let controller = ConnectionController::new(adapter, settings, status_sender);
    let handle = spawn(controller.run(battery, command_receiver, cancel));

    (ControllerHandle { commands: command_sender, status: status_receiver }, handle)
}
