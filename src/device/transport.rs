use async_trait::async_trait;
use futures::channel::mpsc::Sender;

use crate::device::types::{CharacteristicAddress, ConnectionHandle, DeviceFilter, DiscoveredDevice};
use crate::error::TransportError;

/// The platform BLE stack, as far as the session needs it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Prepares the stack. Calling it again after a success is a no-op.
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Starts discovery. Every advertisement is sent to `results` in arrival order, duplicates
    /// included, until [`Transport::stop_scan`] is called or the receiver is dropped.
    async fn scan(&self, filter: DeviceFilter, results: Sender<DiscoveredDevice>) -> Result<(), TransportError>;

    /// Idempotent.
    async fn stop_scan(&self) -> Result<(), TransportError>;

    async fn connect(&self, device_id: &str) -> Result<ConnectionHandle, TransportError>;

    /// Idempotent; disconnecting a device that is not connected succeeds.
    async fn disconnect(&self, device_id: &str) -> Result<(), TransportError>;

    async fn read_characteristic(
        &self,
        device_id: &str,
        address: CharacteristicAddress,
    ) -> Result<Vec<u8>, TransportError>;

    /// Writes with response; returns once the peripheral acknowledged the value.
    async fn write_characteristic(
        &self,
        device_id: &str,
        address: CharacteristicAddress,
        value: &[u8],
    ) -> Result<(), TransportError>;
}
