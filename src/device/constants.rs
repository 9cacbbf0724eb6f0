use btleplug::api::bleuuid::uuid_from_u16;
use uuid::Uuid;

use crate::device::types::{CharacteristicAddress, Field};

/**
 * How long (milliseconds) a scan runs before it is stopped automatically.
 */
pub const SCAN_DWELL: u64 = 5000;

/**
 * How many scan results may be buffered between the transport and the session.
 */
pub const SCAN_RESULT_BUFFER: usize = 64;

/**
 * The UUID of the Bluetooth SIG "User Data" service (0x181C)
 */
pub const USER_DATA_SERVICE: Uuid = uuid_from_u16(0x181C);

/**
 * The UUID of the "First Name" characteristic (0x2A8A)
 */
pub const USER_DATA_FIRST_NAME_CHARACTERISTIC: Uuid = uuid_from_u16(0x2A8A);

/**
 * The UUID of the "Last Name" characteristic (0x2A90)
 */
pub const USER_DATA_LAST_NAME_CHARACTERISTIC: Uuid = uuid_from_u16(0x2A90);

/**
 * The UUID of the "Age" characteristic (0x2A80)
 */
pub const USER_DATA_AGE_CHARACTERISTIC: Uuid = uuid_from_u16(0x2A80);

pub fn characteristic_address(field: Field) -> CharacteristicAddress {
    let characteristic = match field {
        Field::FirstName => USER_DATA_FIRST_NAME_CHARACTERISTIC,
        Field::LastName => USER_DATA_LAST_NAME_CHARACTERISTIC,
        Field::Age => USER_DATA_AGE_CHARACTERISTIC,
    };

    CharacteristicAddress { service: USER_DATA_SERVICE, characteristic }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uuids_expand_onto_the_bluetooth_base_uuid() {
        assert_eq!(USER_DATA_SERVICE.to_string(), "0000181c-0000-1000-8000-00805f9b34fb");
        assert_eq!(USER_DATA_FIRST_NAME_CHARACTERISTIC.to_string(), "00002a8a-0000-1000-8000-00805f9b34fb");
        assert_eq!(USER_DATA_LAST_NAME_CHARACTERISTIC.to_string(), "00002a90-0000-1000-8000-00805f9b34fb");
        assert_eq!(USER_DATA_AGE_CHARACTERISTIC.to_string(), "00002a80-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn every_field_lives_under_the_user_data_service() {
        for field in Field::ALL {
            assert_eq!(characteristic_address(field).service, USER_DATA_SERVICE);
        }
        assert_eq!(characteristic_address(Field::Age).characteristic, USER_DATA_AGE_CHARACTERISTIC);
    }
}
