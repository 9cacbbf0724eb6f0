use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::channel::mpsc::Sender;
use futures::channel::oneshot;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::transport::Transport;
use crate::device::types::{CharacteristicAddress, ConnectionHandle, DeviceFilter, DiscoveredDevice};
use crate::error::TransportError;

/// [`Transport`] backed by the platform bluetooth stack through btleplug.
///
/// Device ids are the string form of the btleplug `PeripheralId`, so a device can be looked up
/// again through the adapter after the scan that found it has stopped.
pub struct BtleTransport {
    adapter: Mutex<Option<Adapter>>,
    scan_cancel: Mutex<Option<CancellationToken>>,
    // cancelled on an explicit disconnect so that the link watcher stays quiet
    link_cancel: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl BtleTransport {
    pub fn new() -> Self {
        BtleTransport {
            adapter: Mutex::new(None),
            scan_cancel: Mutex::new(None),
            link_cancel: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn adapter(&self) -> Result<Adapter, TransportError> {
        self.adapter.lock().await.clone().ok_or(TransportError::NotInitialized)
    }

    async fn peripheral(&self, device_id: &str) -> Result<Peripheral, TransportError> {
        let adapter = self.adapter().await?;

        adapter.peripherals().await?
            .into_iter()
            .find(|peripheral| peripheral.id().to_string() == device_id)
            .ok_or_else(|| TransportError::UnknownDevice { device_id: device_id.to_string() })
    }

    async fn connected_peripheral(&self, device_id: &str) -> Result<Peripheral, TransportError> {
        let peripheral = self.peripheral(device_id).await?;

        if !peripheral.is_connected().await? {
            return Err(TransportError::NotConnected { device_id: device_id.to_string() });
        }

        Ok(peripheral)
    }
}

impl Default for BtleTransport {
    fn default() -> Self {
        BtleTransport::new()
    }
}

fn find_characteristic(peripheral: &Peripheral, address: CharacteristicAddress) -> Result<Characteristic, TransportError> {
    peripheral.characteristics()
        .into_iter()
        .find(|characteristic| {
            characteristic.service_uuid == address.service && characteristic.uuid == address.characteristic
        })
        .ok_or(TransportError::MissingCharacteristic { uuid: address.characteristic })
}

/// The peripheral an event reports an advertisement for.
///
/// Every advertisement is one raw scan result. Some platforms only report a peripheral as
/// discovered the first time the adapter sees it and as updated afterwards, so both count.
fn advertised_peripheral(event: CentralEvent) -> Option<PeripheralId> {
    match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id),
        _ => None,
    }
}

fn matches_filter(filter: &DeviceFilter, advertised_services: &[Uuid]) -> bool {
    filter.services.is_empty() || filter.services.iter().any(|service| advertised_services.contains(service))
}

/// `None` when the peripheral does not advertise any of the filtered services.
async fn describe_peripheral(
    adapter: &Adapter,
    id: &PeripheralId,
    filter: &DeviceFilter,
) -> Result<Option<DiscoveredDevice>, TransportError> {
    let peripheral = adapter.peripheral(id).await?;
    let (display_name, services) = match peripheral.properties().await? {
        Some(properties) => (properties.local_name, properties.services),
        None => (None, Vec::new()),
    };

    // Some environments ignore the scan filter, so check the service uuids again
    if !matches_filter(filter, &services) {
        return Ok(None);
    }

    Ok(Some(DiscoveredDevice {
        device_id: id.to_string(),
        display_name,
    }))
}

/// Forgets the link token of a device whose link was lost, unless a newer connection replaced it.
fn forget_link(links: &mut HashMap<String, CancellationToken>, device_id: &str, token: &CancellationToken) {
    // a replaced token has been cancelled by whoever replaced it
    if !token.is_cancelled() {
        links.remove(device_id);
    }
}

#[async_trait]
impl Transport for BtleTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        let mut adapter = self.adapter.lock().await;
        if adapter.is_some() {
            return Ok(());
        }

        let manager = Manager::new().await?;
        let first = manager.adapters().await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;

        info!("Using adapter {}", first.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        *adapter = Some(first);
        Ok(())
    }

    async fn scan(&self, filter: DeviceFilter, mut results: Sender<DiscoveredDevice>) -> Result<(), TransportError> {
        let adapter = self.adapter().await?;

        // subscribe before starting so that no advertisement is missed
        let mut events = adapter.events().await?;
        adapter.start_scan(ScanFilter { services: filter.services.clone() }).await?;

        let cancel = CancellationToken::new();
        if let Some(previous) = self.scan_cancel.lock().await.replace(cancel.clone()) {
            previous.cancel();
        }

        spawn(async move {
            'mainloop: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break 'mainloop;
                    },
                    event = events.next() => {
                        let id = match event.map(advertised_peripheral) {
                            Some(Some(id)) => id,
                            Some(None) => continue 'mainloop,
                            None => break 'mainloop,
                        };

                        match describe_peripheral(&adapter, &id, &filter).await {
                            Err(err) => {
                                warn!("Could not query discovered peripheral {}: {}", id, err);
                            },
                            Ok(None) => {
                                debug!("Ignoring peripheral {} without a filtered service", id);
                            },
                            Ok(Some(device)) => {
                                debug!("Scan result {} {:?}", device.device_id, device.display_name);
                                if results.send(device).await.is_err() {
                                    debug!("Scan results receiver is gone");
                                    break 'mainloop;
                                }
                            },
                        }
                    },
                }
            }
        });

        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        let cancel = self.scan_cancel.lock().await.take();

        if let Some(cancel) = cancel {
            cancel.cancel();
            self.adapter().await?.stop_scan().await?;
        }

        Ok(())
    }

    async fn connect(&self, device_id: &str) -> Result<ConnectionHandle, TransportError> {
        let adapter = self.adapter().await?;
        let peripheral = self.peripheral(device_id).await?;

        let mut events = adapter.events().await?;

        info!("Connecting to peripheral {}...", device_id);
        peripheral.connect().await?;

        info!("Connected; Discovering services...");
        if let Err(err) = peripheral.discover_services().await {
            // a failed connect must not leave a link behind
            if let Err(disconnect_err) = peripheral.disconnect().await {
                warn!("Failed to disconnect from {} after service discovery failed: {}", device_id, disconnect_err);
            }
            return Err(err.into());
        }

        let cancel = CancellationToken::new();
        if let Some(previous) = self.link_cancel.lock().await.insert(device_id.to_string(), cancel.clone()) {
            previous.cancel();
        }

        let (link_lost_tx, link_lost) = oneshot::channel();
        let mut link_lost_tx = Some(link_lost_tx);
        let peripheral_id = peripheral.id();
        let watched_id = device_id.to_string();
        let links = self.link_cancel.clone();

        spawn(async move {
            'mainloop: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break 'mainloop;
                    },
                    event = events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                            warn!("Peripheral {} dropped the connection", watched_id);
                            forget_link(&mut *links.lock().await, &watched_id, &cancel);
                            if let Some(link_lost_tx) = link_lost_tx.take() {
                                let _ = link_lost_tx.send(());
                            }
                            break 'mainloop;
                        },
                        Some(_) => {},
                        None => break 'mainloop,
                    },
                }
            }
        });

        Ok(ConnectionHandle { device_id: device_id.to_string(), link_lost })
    }

    async fn disconnect(&self, device_id: &str) -> Result<(), TransportError> {
        if let Some(cancel) = self.link_cancel.lock().await.remove(device_id) {
            cancel.cancel();
        }

        let peripheral = match self.peripheral(device_id).await {
            Ok(peripheral) => peripheral,
            // the adapter forgot about it, so there is no link left to tear down
            Err(TransportError::UnknownDevice { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };

        if peripheral.is_connected().await? {
            peripheral.disconnect().await?;
        }

        Ok(())
    }

    async fn read_characteristic(
        &self,
        device_id: &str,
        address: CharacteristicAddress,
    ) -> Result<Vec<u8>, TransportError> {
        let peripheral = self.connected_peripheral(device_id).await?;
        let characteristic = find_characteristic(&peripheral, address)?;

        Ok(peripheral.read(&characteristic).await?)
    }

    async fn write_characteristic(
        &self,
        device_id: &str,
        address: CharacteristicAddress,
        value: &[u8],
    ) -> Result<(), TransportError> {
        let peripheral = self.connected_peripheral(device_id).await?;
        let characteristic = find_characteristic(&peripheral, address)?;

        peripheral.write(&characteristic, value, WriteType::WithResponse).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btleplug::api::CentralState;
    use crate::device::constants::USER_DATA_SERVICE;

    #[test]
    fn empty_filter_accepts_any_peripheral() {
        let filter = DeviceFilter::default();

        assert!(matches_filter(&filter, &[]));
        assert!(matches_filter(&filter, &[Uuid::from_u128(7)]));
    }

    #[test]
    fn filter_drops_peripherals_without_the_service() {
        let filter = DeviceFilter { services: vec![USER_DATA_SERVICE] };

        assert!(!matches_filter(&filter, &[]));
        assert!(!matches_filter(&filter, &[Uuid::from_u128(7)]));
        assert!(matches_filter(&filter, &[Uuid::from_u128(7), USER_DATA_SERVICE]));
    }

    #[test]
    fn adapter_state_is_not_a_scan_result() {
        assert!(advertised_peripheral(CentralEvent::StateUpdate(CentralState::PoweredOn)).is_none());
    }

    #[cfg(any(target_os = "windows", target_os = "macos"))]
    fn peripheral_id() -> PeripheralId {
        #[cfg(target_os = "windows")]
        let id = PeripheralId::from(btleplug::api::BDAddr::from([1, 2, 3, 4, 5, 6]));
        #[cfg(target_os = "macos")]
        let id = PeripheralId::from(Uuid::from_u128(1));
        id
    }

    #[cfg(any(target_os = "windows", target_os = "macos"))]
    #[test]
    fn known_peripherals_advertising_again_are_scan_results() {
        let id = peripheral_id();

        assert_eq!(advertised_peripheral(CentralEvent::DeviceDiscovered(id.clone())), Some(id.clone()));
        assert_eq!(advertised_peripheral(CentralEvent::DeviceUpdated(id.clone())), Some(id.clone()));
        assert_eq!(advertised_peripheral(CentralEvent::DeviceDisconnected(id)), None);
    }

    #[test]
    fn lost_link_is_forgotten() {
        let mut links = HashMap::new();
        let token = CancellationToken::new();
        links.insert("A1".to_string(), token.clone());

        forget_link(&mut links, "A1", &token);

        assert!(links.is_empty());
    }

    #[test]
    fn lost_link_keeps_a_newer_connection() {
        let mut links = HashMap::new();
        let stale = CancellationToken::new();
        let current = CancellationToken::new();
        stale.cancel();
        links.insert("A1".to_string(), current);

        forget_link(&mut links, "A1", &stale);

        assert!(links.contains_key("A1"));
    }
}
