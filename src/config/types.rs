use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::SCAN_DWELL;
use crate::device::types::DeviceFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub scan_dwell_ms: u64,
    // empty: report every advertising peripheral
    pub service_filter: Vec<Uuid>,
}

impl SessionConfig {
    pub fn scan_dwell(&self) -> Duration {
        Duration::from_millis(self.scan_dwell_ms)
    }

    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter { services: self.service_filter.clone() }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            scan_dwell_ms: SCAN_DWELL,
            service_filter: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::USER_DATA_SERVICE;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{ "scanDwellMs": 1500 }"#).unwrap();

        assert_eq!(config.scan_dwell(), Duration::from_millis(1500));
        assert!(config.device_filter().services.is_empty());
    }

    #[test]
    fn service_filter_is_parsed_as_uuids() {
        let config: SessionConfig = serde_json::from_str(
            r#"{ "serviceFilter": ["0000181c-0000-1000-8000-00805f9b34fb"] }"#
        ).unwrap();

        assert_eq!(config.scan_dwell_ms, SCAN_DWELL);
        assert_eq!(config.service_filter, vec![USER_DATA_SERVICE]);
    }
}
