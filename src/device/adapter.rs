use std::fmt::Debug;
use std::future::Future;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::device::types::{DeviceHandle, DeviceId};
use crate::error::DeviceError;

/// A peripheral seen while scanning, with both name fields the platform may report.
///
/// btleplug merges the advertised and the scan response name into `local_name`, so `BtleAdapter`
/// leaves `name` empty. Other transports may report them separately.
#[derive(Debug, Clone)]
pub struct DiscoveredPeripheral<P> {
    pub id: DeviceId,
    pub name: Option<String>,
    pub local_name: Option<String>,
    pub peripheral: P,
}

impl<P> DiscoveredPeripheral<P> {
    pub fn matches(&self, target: &str) -> bool {
        self.name.as_deref() == Some(target) || self.local_name.as_deref() == Some(target)
    }

    pub fn into_handle(self) -> DeviceHandle<P> {
        DeviceHandle { id: self.id, peripheral: self.peripheral }
    }
}

#[derive(Debug, Clone)]
pub enum AdapterEvent<P> {
    Discovered(DiscoveredPeripheral<P>),
    Disconnected(DeviceId),
}

/// The BLE capability the connection controller drives.
///
/// Implementations are owned by exactly one controller task, which calls them sequentially.
pub trait BleAdapter: Send + Sync + 'static {
    type Peripheral: Clone + Debug + Send + Sync + 'static;

    /// Stream of discovery and disconnect events. Invalidated by `reset`.
    fn events(&self) -> impl Future<Output = Result<BoxStream<'static, AdapterEvent<Self::Peripheral>>, DeviceError>> + Send;

    fn start_scan(&self, service: Uuid) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn stop_scan(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Connects and discovers services; fails if the expected characteristics are missing.
    fn connect(&self, peripheral: &Self::Peripheral) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn disconnect(&self, peripheral: &Self::Peripheral) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Write without response: returns once the local stack accepted the payload.
    fn write(&self, peripheral: &Self::Peripheral, characteristic: Uuid, payload: &[u8]) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Discards the underlying adapter and acquires a fresh one.
    fn reset(&mut self) -> impl Future<Output = Result<(), DeviceError>> + Send;
}
