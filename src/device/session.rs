use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;
use std::time::Duration;
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::future::{pending, FusedFuture};
use futures::stream::FusedStream;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::time::{sleep, Sleep};

use crate::config::types::SessionConfig;
use crate::device::codec;
use crate::device::constants::{characteristic_address, SCAN_RESULT_BUFFER};
use crate::device::transport::Transport;
use crate::device::types::{
    ConnectionHandle, DeviceEvent, DeviceFilter, DiscoveredDevice, Field, SessionCommand, SessionSnapshot, UserRecord,
};
use crate::error::{IntentRejected, OperationError};

struct ActiveScan {
    results: Receiver<DiscoveredDevice>,
    // the pending stop lives and dies with the scan it belongs to
    dwell: Pin<Box<Sleep>>,
}

enum Phase {
    Idle,
    Scanning(ActiveScan),
    // connecting, or the connect/link failed; the device stays selected either way
    DeviceSelected { device: DiscoveredDevice },
    Connected { device: DiscoveredDevice, connection: ConnectionHandle },
}

/// Something that happened on the transport side while no intent was being handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ScanResult(DiscoveredDevice),
    ScanDwellElapsed,
    LinkLost(String),
}

/// The device session: discovery, the single connection and the user record.
///
/// There is at most one scan and at most one connection, because both only exist inside the
/// current phase. Intents are handled one at a time and every transport fault ends up as an
/// [`OperationError`] that subscribers receive exactly once. Without subscribers, errors queue
/// up until [`Session::take_error`] is called.
pub struct Session<T: Transport> {
    transport: T,
    scan_dwell: Duration,
    filter: DeviceFilter,
    phase: Phase,
    devices: Vec<DiscoveredDevice>,
    record: UserRecord,
    loading_device: bool,
    errors: VecDeque<OperationError>,
    senders: Vec<Sender<DeviceEvent>>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: &SessionConfig) -> Self {
        Session {
            transport,
            scan_dwell: config.scan_dwell(),
            filter: config.device_filter(),
            phase: Phase::Idle,
            devices: Vec::new(),
            record: UserRecord::default(),
            loading_device: false,
            errors: VecDeque::new(),
            senders: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, sender: Sender<DeviceEvent>) {
        self.senders.push(sender);
    }

    pub fn devices(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    pub fn record(&self) -> &UserRecord {
        &self.record
    }

    pub fn selected(&self) -> Option<&DiscoveredDevice> {
        match &self.phase {
            Phase::DeviceSelected { device } | Phase::Connected { device, .. } => Some(device),
            Phase::Idle | Phase::Scanning(_) => None,
        }
    }

    pub fn connected_device_id(&self) -> Option<&str> {
        match &self.phase {
            Phase::Connected { connection, .. } => Some(&connection.device_id),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected_device_id().is_some()
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.phase, Phase::Scanning(_))
    }

    pub fn is_loading_device(&self) -> bool {
        self.loading_device
    }

    /// Submit is possible only with a live connection and a complete record.
    pub fn can_submit(&self) -> bool {
        self.is_connected() && self.record.is_complete()
    }

    pub fn take_error(&mut self) -> Option<OperationError> {
        self.errors.pop_front()
    }

    /// The current state; consumes at most one pending error.
    pub fn take_snapshot(&mut self) -> SessionSnapshot {
        SessionSnapshot {
            devices: self.devices.clone(),
            selected: self.selected().cloned(),
            connected: self.is_connected(),
            record: self.record.clone(),
            scanning: self.is_scanning(),
            loading_device: self.loading_device,
            error: self.take_error(),
        }
    }

    async fn send(&mut self, event: DeviceEvent) {
        for sender in &mut self.senders {
            if let Err(err) = sender.send(event.clone()).await {
                debug!("Dropping state update for a closed subscriber: {}", err);
            }
        }

        self.senders.retain(|sender| !sender.is_closed());
    }

    /// Sends the current state to every subscriber, one update per pending error.
    pub async fn publish_state(&mut self) {
        if self.senders.is_empty() {
            return;
        }

        loop {
            let snapshot = self.take_snapshot();
            self.send(DeviceEvent::StateChange(snapshot)).await;

            if self.errors.is_empty() {
                break;
            }
        }
    }

    pub async fn reject(&mut self, rejection: IntentRejected) {
        info!("Rejected intent: {}", rejection);
        self.send(DeviceEvent::Rejected(rejection)).await;
    }

    fn report(&mut self, err: OperationError) {
        error!("{} failed: {}", err.operation(), err);
        self.errors.push_back(err);
    }

    /// Tears a connection down; a failure is reported but never stops the caller.
    async fn release_connection(&mut self, connection: ConnectionHandle) {
        info!("Disconnecting from device {}...", connection.device_id);

        match self.transport.disconnect(&connection.device_id).await {
            Ok(()) => info!("Disconnected from device {}", connection.device_id),
            Err(err) => self.report(OperationError::disconnect(&connection.device_id, &err)),
        }
    }

    pub async fn execute(&mut self, command: SessionCommand) {
        let result = match command {
            SessionCommand::StartScan => self.start_scan().await,
            SessionCommand::SelectDevice(device_id) => self.select_device(&device_id).await,
            SessionCommand::EditField(field, value) => {
                self.edit_field(field, value).await;
                Ok(())
            },
            SessionCommand::Submit => self.submit().await,
        };

        if let Err(rejection) = result {
            self.reject(rejection).await;
        }
    }

    pub async fn start_scan(&mut self) -> Result<(), IntentRejected> {
        if self.is_scanning() {
            return Err(IntentRejected::ScanInProgress);
        }

        self.devices.clear();
        if let Phase::Connected { connection, .. } = mem::replace(&mut self.phase, Phase::Idle) {
            self.release_connection(connection).await;
        }

        info!("Initializing bluetooth...");
        if let Err(err) = self.transport.initialize().await {
            self.report(OperationError::init(&err));
            self.publish_state().await;
            return Ok(());
        }

        info!("Requesting devices...");
        let (sender, results) = channel(SCAN_RESULT_BUFFER);
        if let Err(err) = self.transport.scan(self.filter.clone(), sender).await {
            self.report(OperationError::scan(&err));
            self.publish_state().await;
            return Ok(());
        }

        self.phase = Phase::Scanning(ActiveScan {
            results,
            dwell: Box::pin(sleep(self.scan_dwell)),
        });
        self.publish_state().await;
        Ok(())
    }

    async fn finish_scan(&mut self) {
        let mut scan = match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Scanning(scan) => scan,
            other => {
                self.phase = other;
                return;
            },
        };

        if let Err(err) = self.transport.stop_scan().await {
            self.report(OperationError::scan(&err));
        }

        // results that were already delivered still belong to this scan
        while let Ok(Some(device)) = scan.results.try_next() {
            self.devices.push(device);
        }

        info!("Stopped scanning; {} results", self.devices.len());
    }

    pub async fn select_device(&mut self, device_id: &str) -> Result<(), IntentRejected> {
        if self.is_scanning() {
            return Err(IntentRejected::ScanInProgress);
        }

        let device = self.devices
            .iter()
            .find(|device| device.device_id == device_id)
            .cloned()
            .ok_or_else(|| IntentRejected::UnknownDevice { device_id: device_id.to_string() })?;

        let previous = mem::replace(&mut self.phase, Phase::DeviceSelected { device: device.clone() });
        let existing = match previous {
            Phase::Connected { connection, .. } if connection.device_id == device_id => Some(connection),
            Phase::Connected { connection, .. } => {
                self.release_connection(connection).await;
                None
            },
            _ => None,
        };

        self.record = UserRecord::default();
        self.loading_device = true;
        self.publish_state().await;

        let connection = match existing {
            Some(connection) => {
                info!("Already connected to device {}", device_id);
                connection
            },
            None => {
                info!("Connecting to device {}...", device_id);
                match self.transport.connect(device_id).await {
                    Ok(connection) => connection,
                    Err(err) => {
                        self.report(OperationError::connect(device_id, &err));
                        self.loading_device = false;
                        self.publish_state().await;
                        return Ok(());
                    },
                }
            },
        };

        info!("Connected to device {}; requesting user data...", device_id);
        self.phase = Phase::Connected { device, connection };

        match read_record(&self.transport, device_id).await {
            Ok(record) => {
                info!("Requesting user data from device {} is finished", device_id);
                self.record = record;
            },
            Err(err) => self.report(err),
        }

        self.loading_device = false;
        self.publish_state().await;
        Ok(())
    }

    pub async fn edit_field(&mut self, field: Field, value: String) {
        self.record.set(field, value);
        self.publish_state().await;
    }

    pub async fn submit(&mut self) -> Result<(), IntentRejected> {
        let device_id = self.connected_device_id()
            .ok_or(IntentRejected::NotConnected)?
            .to_string();

        if let Some(field) = self.record.first_missing() {
            return Err(IntentRejected::IncompleteRecord { field });
        }

        self.loading_device = true;
        self.publish_state().await;

        info!("Writing user data to device {}...", device_id);
        match write_record(&self.transport, &device_id, &self.record).await {
            Ok(()) => info!("Writing user data to device {} is finished", device_id),
            Err(err) => self.report(err),
        }

        self.loading_device = false;
        self.publish_state().await;
        Ok(())
    }

    /// Waits for the next scan result, scan dwell expiry or link loss.
    ///
    /// Never resolves while there is nothing to wait for, so it can sit in a `select!` next to
    /// the command channel.
    pub async fn next_event(&mut self) -> SessionEvent {
        match &mut self.phase {
            Phase::Scanning(scan) => {
                tokio::select! {
                    Some(device) = scan.results.next(), if !scan.results.is_terminated() => {
                        SessionEvent::ScanResult(device)
                    },
                    _ = &mut scan.dwell => SessionEvent::ScanDwellElapsed,
                }
            },
            Phase::Connected { connection, .. } if !connection.link_lost.is_terminated() => {
                match (&mut connection.link_lost).await {
                    Ok(()) => SessionEvent::LinkLost(connection.device_id.clone()),
                    Err(_) => {
                        debug!("Link watch for device {} ended", connection.device_id);
                        pending().await
                    },
                }
            },
            _ => pending().await,
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ScanResult(device) => {
                debug!("Received scan result {} {:?}", device.device_id, device.display_name);
                if self.is_scanning() {
                    self.devices.push(device);
                }
            },
            SessionEvent::ScanDwellElapsed => self.finish_scan().await,
            SessionEvent::LinkLost(device_id) => {
                match mem::replace(&mut self.phase, Phase::Idle) {
                    Phase::Connected { device, connection } if connection.device_id == device_id => {
                        warn!("Lost connection to device {}", device_id);
                        self.phase = Phase::DeviceSelected { device };
                    },
                    other => self.phase = other,
                }
            },
        }

        self.publish_state().await;
    }

    /// Stops the scan and drops the connection, if any. Failures are only logged.
    pub async fn shutdown(&mut self) {
        match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Scanning(_) => {
                if let Err(err) = self.transport.stop_scan().await {
                    warn!("Failed to stop scan during shutdown: {}", err);
                }
            },
            Phase::Connected { connection, .. } => {
                if let Err(err) = self.transport.disconnect(&connection.device_id).await {
                    warn!("Failed to disconnect from {} during shutdown: {}", connection.device_id, err);
                }
            },
            Phase::Idle | Phase::DeviceSelected { .. } => {},
        }
    }
}

/// Reads all three fields concurrently; the record exists only if every read succeeded.
async fn read_record<T: Transport>(transport: &T, device_id: &str) -> Result<UserRecord, OperationError> {
    let read = |field: Field| async move {
        transport.read_characteristic(device_id, characteristic_address(field))
            .await
            .map(|bytes| codec::decode(&bytes))
            .map_err(|err| OperationError::read(device_id, field, &err))
    };

    let (first_name, last_name, age) = futures::try_join!(
        read(Field::FirstName),
        read(Field::LastName),
        read(Field::Age),
    )?;

    Ok(UserRecord { first_name, last_name, age })
}

/// Writes the fields one by one in [`Field::ALL`] order. The first failure stops the remaining
/// writes; fields written before it stay written.
async fn write_record<T: Transport>(transport: &T, device_id: &str, record: &UserRecord) -> Result<(), OperationError> {
    for field in Field::ALL {
        let value = codec::encode(record.get(field));

        transport.write_characteristic(device_id, characteristic_address(field), &value)
            .await
            .map_err(|err| OperationError::write(device_id, field, &err))?;
    }

    Ok(())
}
