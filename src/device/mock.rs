use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use async_trait::async_trait;
use futures::channel::mpsc::Sender;
use futures::channel::oneshot;
use log::{debug, info};
use uuid::Uuid;

use crate::device::codec;
use crate::device::constants::characteristic_address;
use crate::device::transport::Transport;
use crate::device::types::{CharacteristicAddress, ConnectionHandle, DeviceFilter, DiscoveredDevice, Field, UserRecord};
use crate::error::TransportError;

/// One call made against a [`MockTransport`], in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Initialize,
    Scan,
    StopScan,
    Connect(String),
    Disconnect(String),
    Read { device_id: String, characteristic: Uuid },
    Write { device_id: String, characteristic: Uuid, value: Vec<u8> },
}

/// Where a [`MockTransport`] should fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    Initialize,
    Scan,
    StopScan,
    Connect(String),
    Disconnect(String),
    Read(Uuid),
    Write(Uuid),
}

#[derive(Debug, Clone)]
pub struct MockPeripheral {
    pub device: DiscoveredDevice,
    pub values: HashMap<Uuid, Vec<u8>>,
}

impl MockPeripheral {
    pub fn new(device_id: &str, display_name: Option<&str>) -> Self {
        MockPeripheral {
            device: DiscoveredDevice::new(device_id, display_name),
            values: HashMap::new(),
        }
    }

    pub fn with_record(mut self, record: &UserRecord) -> Self {
        for field in Field::ALL {
            let address = characteristic_address(field);
            self.values.insert(address.characteristic, codec::encode(record.get(field)));
        }
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    peripherals: Vec<MockPeripheral>,
    calls: Vec<TransportCall>,
    faults: HashMap<Fault, String>,
    scan_results: Option<Sender<DiscoveredDevice>>,
    links: HashMap<String, oneshot::Sender<()>>,
}

/// In-memory [`Transport`] with scripted peripherals, injectable faults and a call log.
///
/// Clones share the same state, so a test can keep one clone while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(peripherals: Vec<MockPeripheral>) -> Self {
        let state = MockState {
            peripherals,
            ..MockState::default()
        };

        MockTransport { state: Arc::new(Mutex::new(state)) }
    }

    pub fn with_sample_data() -> Self {
        let record = UserRecord {
            first_name: "Ana".to_string(),
            last_name: "Lee".to_string(),
            age: "30".to_string(),
        };

        MockTransport::new(vec![
            MockPeripheral::new("A1", Some("Scale A1")).with_record(&record),
            MockPeripheral::new("B2", None).with_record(&UserRecord::default()),
        ])
    }

    fn state(&self) -> MutexGuard<MockState> {
        // a panicking test thread must not hide the original failure behind a poison error
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_call(&self, call: TransportCall, fault: Fault) -> Result<(), TransportError> {
        let mut state = self.state();
        state.calls.push(call);

        match state.faults.get(&fault) {
            Some(message) => Err(TransportError::Simulated(message.clone())),
            None => Ok(()),
        }
    }

    pub fn fail(&self, fault: Fault, message: &str) {
        self.state().faults.insert(fault, message.to_string());
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Delivers one more advertisement to the running scan, if any.
    pub fn advertise(&self, device: DiscoveredDevice) -> bool {
        match self.state().scan_results.as_mut() {
            Some(results) => results.try_send(device).is_ok(),
            None => false,
        }
    }

    /// Simulates the peripheral dropping the link on its own.
    pub fn drop_link(&self, device_id: &str) -> bool {
        match self.state().links.remove(device_id) {
            Some(link) => link.send(()).is_ok(),
            None => false,
        }
    }

    pub fn is_connected(&self, device_id: &str) -> bool {
        self.state().links.contains_key(device_id)
    }

    /// The value currently stored on the peripheral, decoded.
    pub fn stored_value(&self, device_id: &str, field: Field) -> Option<String> {
        let address = characteristic_address(field);

        self.state().peripherals
            .iter()
            .find(|peripheral| peripheral.device.device_id == device_id)
            .and_then(|peripheral| peripheral.values.get(&address.characteristic))
            .map(|bytes| codec::decode(bytes))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        self.record_call(TransportCall::Initialize, Fault::Initialize)
    }

    async fn scan(&self, _filter: DeviceFilter, mut results: Sender<DiscoveredDevice>) -> Result<(), TransportError> {
        self.record_call(TransportCall::Scan, Fault::Scan)?;

        let mut state = self.state();
        for peripheral in &state.peripherals {
            if let Err(err) = results.try_send(peripheral.device.clone()) {
                debug!("Dropping simulated scan result {}: {}", peripheral.device.device_id, err);
            }
        }
        state.scan_results = Some(results);

        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.record_call(TransportCall::StopScan, Fault::StopScan)?;
        self.state().scan_results = None;
        Ok(())
    }

    async fn connect(&self, device_id: &str) -> Result<ConnectionHandle, TransportError> {
        self.record_call(TransportCall::Connect(device_id.to_string()), Fault::Connect(device_id.to_string()))?;

        let mut state = self.state();
        if !state.peripherals.iter().any(|peripheral| peripheral.device.device_id == device_id) {
            return Err(TransportError::UnknownDevice { device_id: device_id.to_string() });
        }

        let (link_lost_tx, link_lost) = oneshot::channel();
        state.links.insert(device_id.to_string(), link_lost_tx);
        info!("Simulated connection to {}", device_id);

        Ok(ConnectionHandle { device_id: device_id.to_string(), link_lost })
    }

    async fn disconnect(&self, device_id: &str) -> Result<(), TransportError> {
        self.record_call(TransportCall::Disconnect(device_id.to_string()), Fault::Disconnect(device_id.to_string()))?;

        // dropping the sender cancels the receiver instead of firing it; explicit disconnects are not link losses
        self.state().links.remove(device_id);

        Ok(())
    }

    async fn read_characteristic(
        &self,
        device_id: &str,
        address: CharacteristicAddress,
    ) -> Result<Vec<u8>, TransportError> {
        let call = TransportCall::Read { device_id: device_id.to_string(), characteristic: address.characteristic };
        self.record_call(call, Fault::Read(address.characteristic))?;

        let state = self.state();
        if !state.links.contains_key(device_id) {
            return Err(TransportError::NotConnected { device_id: device_id.to_string() });
        }

        state.peripherals
            .iter()
            .find(|peripheral| peripheral.device.device_id == device_id)
            .and_then(|peripheral| peripheral.values.get(&address.characteristic))
            .cloned()
            .ok_or(TransportError::MissingCharacteristic { uuid: address.characteristic })
    }

    async fn write_characteristic(
        &self,
        device_id: &str,
        address: CharacteristicAddress,
        value: &[u8],
    ) -> Result<(), TransportError> {
        let call = TransportCall::Write {
            device_id: device_id.to_string(),
            characteristic: address.characteristic,
            value: value.to_vec(),
        };
        self.record_call(call, Fault::Write(address.characteristic))?;

        let mut state = self.state();
        if !state.links.contains_key(device_id) {
            return Err(TransportError::NotConnected { device_id: device_id.to_string() });
        }

        match state.peripherals.iter_mut().find(|peripheral| peripheral.device.device_id == device_id) {
            Some(peripheral) => {
                peripheral.values.insert(address.characteristic, value.to_vec());
                Ok(())
            },
            None => Err(TransportError::UnknownDevice { device_id: device_id.to_string() }),
        }
    }
}
