//! The connection lifecycle as a pure transition function.
//!
//! `ConnectionMachine::handle` is the only place the connection state changes. Everything that
//! happens to the link (caller requests, adapter callbacks, timers) arrives as an [`Event`], and
//! the machine answers with the [`Action`]s the controller must carry out against the adapter.
//! Events that make no sense in the current state are ignored, which is what resolves the races
//! between discovery, the scan timeout and disconnect callbacks.

use std::fmt::Debug;
use std::mem;
use log::{debug, info, warn};

use crate::device::adapter::DiscoveredPeripheral;
use crate::device::protocol::Write;
use crate::device::types::{BatteryLevel, BatteryReading, ConnectionState, ControllerStatus, DeviceHandle, DeviceId};
use crate::error::LinkError;

/// Interest in disconnect events for one peripheral.
///
/// Not `Clone`: deregistering consumes it, so a subscription can only be removed once.
#[derive(Debug, PartialEq, Eq)]
pub struct DisconnectSubscription {
    device: DeviceId,
}

impl DisconnectSubscription {
    fn register(device: DeviceId) -> Self {
        debug!("Subscribing to disconnect events of {}", device);
        DisconnectSubscription { device }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn deregister(self) {
        debug!("Unsubscribed from disconnect events of {}", self.device);
    }
}

#[derive(Debug)]
enum Link<P> {
    Idle,
    Scanning,
    Connecting {
        tentative: DeviceHandle<P>,
    },
    Ready {
        device: DeviceHandle<P>,
        subscription: DisconnectSubscription,
    },
    Disconnecting {
        subscription: DisconnectSubscription,
    },
}

impl<P> Link<P> {
    fn state(&self) -> ConnectionState {
        match self {
            Link::Idle => ConnectionState::Idle,
            Link::Scanning => ConnectionState::Scanning,
            Link::Connecting { .. } => ConnectionState::Connecting,
            Link::Ready { .. } => ConnectionState::Ready,
            Link::Disconnecting { .. } => ConnectionState::Disconnecting,
        }
    }
}

#[derive(Debug)]
pub enum Event<P> {
    ConnectRequested,
    DisconnectRequested,
    ScanFailed(String),
    PeripheralDiscovered(DiscoveredPeripheral<P>),
    ScanTimedOut,
    ConnectSucceeded,
    ConnectFailed(String),
    PeripheralDisconnected(DeviceId),
    DisconnectFinished(Result<(), String>),
    BatteryChanged(BatteryReading),
    PushTick,
    WriteRequested(Write),
    WriteFailed(String),
}

#[derive(Debug)]
pub enum Action<P> {
    StartScan,
    StopScan,
    ArmScanTimeout,
    CancelScanTimeout,
    /// Connect to and discover the tentative peripheral.
    Connect(DeviceHandle<P>),
    /// Best-effort disconnect of a peripheral whose connect attempt failed.
    Release(DeviceHandle<P>),
    /// Graceful disconnect; always answered with `Event::DisconnectFinished`.
    Disconnect(DeviceHandle<P>),
    Deregister(DisconnectSubscription),
    ResetAdapter,
    Write(DeviceHandle<P>, Write),
    Reject(LinkError),
}

#[derive(Debug)]
pub struct ConnectionMachine<P> {
    link: Link<P>,
    device_name: String,
    battery_level: BatteryLevel,
    is_charging: bool,
    last_error: Option<LinkError>,
}

impl<P: Clone + Debug> ConnectionMachine<P> {
    pub fn new(device_name: impl Into<String>) -> Self {
        ConnectionMachine {
            link: Link::Idle,
            device_name: device_name.into(),
            battery_level: BatteryLevel::default(),
            is_charging: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// The connected peripheral; only present while `Ready`.
    pub fn device(&self) -> Option<&DeviceHandle<P>> {
        match &self.link {
            Link::Ready { device, .. } => Some(device),
            _ => None,
        }
    }

    pub fn disconnect_subscription(&self) -> Option<&DisconnectSubscription> {
        match &self.link {
            Link::Ready { subscription, .. } | Link::Disconnecting { subscription } => Some(subscription),
            _ => None,
        }
    }

    pub fn battery_level(&self) -> BatteryLevel {
        self.battery_level
    }

    pub fn last_error(&self) -> Option<&LinkError> {
        self.last_error.as_ref()
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state(),
            battery_level: self.battery_level,
            is_charging: self.is_charging,
            last_error: self.last_error.clone(),
        }
    }

    pub fn handle(&mut self, event: Event<P>) -> Vec<Action<P>> {
        let link = mem::replace(&mut self.link, Link::Idle);
        let previous = link.state();

        let (link, actions) = self.advance(link, event);
        self.link = link;

        if previous != self.state() {
            info!("Connection state {} -> {}", previous, self.state());
        }
        actions
    }

    fn fail(&mut self, error: LinkError) {
        warn!("{}", error);
        self.last_error = Some(error);
    }

    fn advance(&mut self, link: Link<P>, event: Event<P>) -> (Link<P>, Vec<Action<P>>) {
        match (link, event) {
            (Link::Idle, Event::ConnectRequested) => {
                self.last_error = None;
                (Link::Scanning, vec![Action::StartScan, Action::ArmScanTimeout])
            },
            (Link::Scanning, Event::PeripheralDiscovered(discovered)) => {
                if !discovered.matches(&self.device_name) {
                    debug!("Ignoring peripheral {} {:?}", discovered.id, discovered.local_name.as_ref().or(discovered.name.as_ref()));
                    return (Link::Scanning, vec![]);
                }

                info!("Found {} ({})", self.device_name, discovered.id);
                let tentative = discovered.into_handle();
                let connect = Action::Connect(tentative.clone());
                (Link::Connecting { tentative }, vec![Action::StopScan, Action::CancelScanTimeout, connect])
            },
            (Link::Scanning, Event::ScanTimedOut) => {
                self.fail(LinkError::ScanTimeout);
                (Link::Idle, vec![Action::StopScan])
            },
            (Link::Scanning, Event::ScanFailed(reason)) => {
                self.fail(LinkError::ConnectFailed(reason));
                (Link::Idle, vec![Action::StopScan, Action::CancelScanTimeout])
            },
            (Link::Connecting { tentative }, Event::ConnectSucceeded) => {
                let subscription = DisconnectSubscription::register(tentative.id.clone());
                let push = Action::Write(tentative.clone(), Write::BatteryLevel(self.battery_level));
                (Link::Ready { device: tentative, subscription }, vec![push])
            },
            (Link::Connecting { tentative }, Event::ConnectFailed(reason)) => {
                self.fail(LinkError::ConnectFailed(reason));
                (Link::Idle, vec![Action::Release(tentative)])
            },
            (Link::Ready { device, subscription }, Event::PeripheralDisconnected(id)) => {
                if subscription.device() != &id {
                    debug!("Ignoring disconnect of {}; connected to {}", id, device.id);
                    return (Link::Ready { device, subscription }, vec![]);
                }

                self.fail(LinkError::UnexpectedDisconnect);
                (Link::Idle, vec![Action::Deregister(subscription), Action::ResetAdapter])
            },
            (Link::Ready { device, subscription }, Event::DisconnectRequested) => {
                (Link::Disconnecting { subscription }, vec![Action::Disconnect(device)])
            },
            (Link::Disconnecting { subscription }, Event::DisconnectFinished(result)) => {
                if let Err(reason) = result {
                    // local teardown happens regardless
                    warn!("Unable to gracefully disconnect, disconnecting manually: {}", reason);
                }
                (Link::Idle, vec![Action::Deregister(subscription), Action::ResetAdapter])
            },
            (Link::Ready { device, subscription }, Event::PushTick) => {
                let push = Action::Write(device.clone(), Write::BatteryLevel(self.battery_level));
                (Link::Ready { device, subscription }, vec![push])
            },
            (Link::Ready { device, subscription }, Event::WriteRequested(write)) => {
                let action = Action::Write(device.clone(), write);
                (Link::Ready { device, subscription }, vec![action])
            },
            (link, Event::WriteRequested(write)) => {
                debug!("Rejecting {:?} while {}", write, link.state());
                self.fail(LinkError::NotConnected);
                (link, vec![Action::Reject(LinkError::NotConnected)])
            },
            (link, Event::WriteFailed(reason)) => {
                self.fail(LinkError::WriteFailed(reason));
                (link, vec![])
            },
            (link, Event::BatteryChanged(reading)) => {
                debug!("Battery level {} (charging: {})", reading.level, reading.is_charging);
                self.battery_level = reading.level;
                self.is_charging = reading.is_charging;
                (link, vec![])
            },
            (link, Event::PushTick) => {
                debug!("Not pushing battery level while {}", link.state());
                (link, vec![])
            },
            (link, event) => {
                debug!("Ignoring {:?} while {}", event, link.state());
                (link, vec![])
            },
        }
    }
}
