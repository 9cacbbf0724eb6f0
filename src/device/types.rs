use futures::channel::oneshot;
use uuid::Uuid;

use crate::error::{IntentRejected, OperationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub device_id: String,
    pub display_name: Option<String>,
}

impl DiscoveredDevice {
    pub fn new(device_id: &str, display_name: Option<&str>) -> Self {
        DiscoveredDevice {
            device_id: device_id.to_string(),
            display_name: display_name.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicAddress {
    pub service: Uuid,
    pub characteristic: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    // empty means every advertising peripheral
    pub services: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    FirstName,
    LastName,
    Age,
}

impl Field {
    /// Fields in the order they are written to the peripheral.
    pub const ALL: [Field; 3] = [Field::FirstName, Field::LastName, Field::Age];
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Field::FirstName => "first name",
            Field::LastName => "last name",
            Field::Age => "age",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub first_name: String,
    pub last_name: String,
    pub age: String, // decimal digits, kept as text
}

impl UserRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::FirstName => &self.first_name,
            Field::LastName => &self.last_name,
            Field::Age => &self.age,
        }
    }

    pub fn set(&mut self, field: Field, value: String) {
        match field {
            Field::FirstName => self.first_name = value,
            Field::LastName => self.last_name = value,
            Field::Age => self.age = value,
        }
    }

    /// The first field (in write order) that is still empty.
    pub fn first_missing(&self) -> Option<Field> {
        Field::ALL.into_iter().find(|field| self.get(*field).is_empty())
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }
}

/// The single live link to a peripheral.
///
/// `link_lost` resolves at most once, when the transport notices that the peripheral dropped the
/// link on its own. It is never resolved by an explicit disconnect.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub device_id: String,
    pub link_lost: oneshot::Receiver<()>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    StartScan,
    SelectDevice(String),
    EditField(Field, String),
    Submit,
}

/// Everything the presentation layer needs to render one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub devices: Vec<DiscoveredDevice>,
    pub selected: Option<DiscoveredDevice>,
    pub connected: bool,
    pub record: UserRecord,
    pub scanning: bool,
    pub loading_device: bool,
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    StateChange(SessionSnapshot),
    Rejected(IntentRejected),
}
