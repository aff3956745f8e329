use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::{BoxStream, StreamExt};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::device::adapter::{AdapterEvent, BleAdapter, DiscoveredPeripheral};
use crate::device::constants::{BATTERY_LEVEL_CHARACTERISTIC, BATTERY_SERVICE, LED_CHARACTERISTIC};
use crate::device::types::DeviceId;
use crate::error::DeviceError;

/// `BleAdapter` backed by the first adapter btleplug reports.
pub struct BtleAdapter {
    manager: Manager,
    adapter: Adapter,
}

async fn first_adapter(manager: &Manager) -> Result<Adapter, DeviceError> {
    let adapter = manager.adapters().await?
        .into_iter()
        .next()
        .ok_or(DeviceError::NoAdapter)?;

    info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
    Ok(adapter)
}

fn device_id(id: &PeripheralId) -> DeviceId {
    DeviceId(format!("{:?}", id))
}

async fn describe_peripheral(adapter: &Adapter, id: &PeripheralId) -> Option<DiscoveredPeripheral<Peripheral>> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(v) => v,
        Err(err) => {
            warn!("Failed to query BLE adapter for peripheral {:?}: {}", id, err);
            return None;
        },
    };

    match peripheral.properties().await {
        Err(err) => {
            warn!("Could not query peripheral for properties: {:?}", err);
            None
        },
        Ok(None) => {
            debug!("Peripheral has no properties");
            None
        },
        Ok(Some(properties)) => {
            // Some environments ignore the filter, so make sure to check the service uuid again
            if !properties.services.contains(&BATTERY_SERVICE) {
                return None;
            }

            debug!(
                "Discovered peripheral {} {:?} {} {:?}",
                properties.address,
                properties.address_type,
                properties.local_name.as_deref().unwrap_or("NONE"),
                properties.services,
            );

            // btleplug merges the advertised and the scan response name into `local_name`
            Some(DiscoveredPeripheral {
                id: device_id(id),
                name: None,
                local_name: properties.local_name,
                peripheral,
            })
        },
    }
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic, DeviceError> {
    peripheral.characteristics()
        .into_iter()
        .find(|characteristic| characteristic.service_uuid == BATTERY_SERVICE && characteristic.uuid == uuid)
        .ok_or(DeviceError::MissingCharacteristic)
}

impl BtleAdapter {
    pub async fn new() -> Result<Self, DeviceError> {
        let manager = Manager::new().await?;
        let adapter = first_adapter(&manager).await?;
        Ok(BtleAdapter { manager, adapter })
    }
}

impl BleAdapter for BtleAdapter {
    type Peripheral = Peripheral;

    async fn events(&self) -> Result<BoxStream<'static, AdapterEvent<Peripheral>>, DeviceError> {
        let adapter = self.adapter.clone();
        let events = self.adapter.events().await?;

        let events = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        describe_peripheral(&adapter, &id).await.map(AdapterEvent::Discovered)
                    },
                    CentralEvent::DeviceDisconnected(id) => Some(AdapterEvent::Disconnected(device_id(&id))),
                    _ => None,
                }
            }
        });

        Ok(events.boxed())
    }

    async fn start_scan(&self, service: Uuid) -> Result<(), DeviceError> {
        let filter = ScanFilter {
            services: vec![service],
        };
        self.adapter.start_scan(filter).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), DeviceError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<(), DeviceError> {
        peripheral.connect().await?;

        info!("Connected; Discovering services...");
        peripheral.discover_services().await?;

        find_characteristic(peripheral, BATTERY_LEVEL_CHARACTERISTIC)?;
        find_characteristic(peripheral, LED_CHARACTERISTIC)?;
        Ok(())
    }

    async fn disconnect(&self, peripheral: &Peripheral) -> Result<(), DeviceError> {
        if peripheral.is_connected().await? {
            peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn write(&self, peripheral: &Peripheral, characteristic: Uuid, payload: &[u8]) -> Result<(), DeviceError> {
        let characteristic = find_characteristic(peripheral, characteristic)?;
        peripheral.write(&characteristic, payload, WriteType::WithoutResponse).await?;
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), DeviceError> {
        if let Err(err) = self.adapter.stop_scan().await {
            debug!("Failed to stop scanning before reset: {}", err);
        }

        self.manager = Manager::new().await?;
        self.adapter = first_adapter(&self.manager).await?;
        Ok(())
    }
}
