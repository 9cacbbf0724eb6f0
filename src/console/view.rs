use crate::device::types::{DiscoveredDevice, Field, SessionSnapshot};

fn device_label(device: &DiscoveredDevice) -> String {
    match &device.display_name {
        Some(name) => format!("{} ({})", name, device.device_id),
        None => device.device_id.clone(),
    }
}

fn device_list(devices: &[DiscoveredDevice]) -> Vec<String> {
    if devices.is_empty() {
        return vec!["  no devices found".to_string()];
    }

    devices.iter()
        .enumerate()
        .map(|(index, device)| format!("  {}. {}", index + 1, device_label(device)))
        .collect()
}

fn record_lines(snapshot: &SessionSnapshot) -> Vec<String> {
    Field::ALL.iter()
        .map(|field| format!("  {:<10} {}", format!("{}:", field), snapshot.record.get(*field)))
        .collect()
}

/// The full state, for the `show` command.
pub fn render_state(snapshot: &SessionSnapshot) -> String {
    let mut lines = vec!["Devices:".to_string()];
    lines.extend(device_list(&snapshot.devices));

    let selected = match &snapshot.selected {
        Some(device) if snapshot.connected => format!("Selected: {} (connected)", device_label(device)),
        Some(device) => format!("Selected: {} (not connected)", device_label(device)),
        None => "Selected: none".to_string(),
    };
    lines.push(selected);

    lines.push("User data:".to_string());
    lines.extend(record_lines(snapshot));

    let ready = snapshot.connected && snapshot.record.is_complete();
    lines.push(format!("Submit: {}", if ready { "ready" } else { "not ready" }));

    lines.join("\n")
}

/// What to tell the operator about the step from `previous` to `next`.
pub fn describe_change(previous: &SessionSnapshot, next: &SessionSnapshot) -> Vec<String> {
    let mut lines = Vec::new();

    if !previous.scanning && next.scanning {
        lines.push("Scanning for devices...".to_string());
    }

    if next.scanning && next.devices.len() > previous.devices.len() {
        for device in &next.devices[previous.devices.len()..] {
            lines.push(format!("  found {}", device_label(device)));
        }
    }

    if previous.scanning && !next.scanning {
        lines.push("Scan finished:".to_string());
        lines.extend(device_list(&next.devices));
    }

    if !previous.loading_device && next.loading_device {
        if let Some(device) = &next.selected {
            lines.push(format!("Working with {}...", device_label(device)));
        }
    }

    if previous.loading_device && !next.loading_device && next.connected {
        lines.push("User data:".to_string());
        lines.extend(record_lines(next));
    }

    if previous.connected && !next.connected && !next.loading_device {
        if let Some(device) = &next.selected {
            lines.push(format!("Connection to {} lost", device_label(device)));
        }
    }

    if let Some(err) = &next.error {
        lines.push(format!("Error: {}", err));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot::default()
    }

    #[test]
    fn new_scan_results_are_listed_as_they_arrive() {
        let previous = SessionSnapshot { scanning: true, ..snapshot() };
        let next = SessionSnapshot {
            scanning: true,
            devices: vec![DiscoveredDevice::new("A1", Some("Scale"))],
            ..snapshot()
        };

        assert_eq!(describe_change(&previous, &next), vec!["  found Scale (A1)".to_string()]);
    }

    #[test]
    fn errors_are_printed_once_per_snapshot() {
        let next = SessionSnapshot {
            error: Some(OperationError::ScanError { message: "busy".to_string() }),
            ..snapshot()
        };

        assert_eq!(describe_change(&snapshot(), &next), vec!["Error: Failed to scan for devices: busy".to_string()]);
    }

    #[test]
    fn state_lists_devices_by_number() {
        let state = SessionSnapshot {
            devices: vec![DiscoveredDevice::new("A1", None), DiscoveredDevice::new("B2", Some("Band"))],
            selected: Some(DiscoveredDevice::new("B2", Some("Band"))),
            ..snapshot()
        };

        let rendered = render_state(&state);
        assert!(rendered.contains("  1. A1\n  2. Band (B2)"));
        assert!(rendered.contains("Selected: Band (B2) (not connected)"));
        assert!(rendered.ends_with("Submit: not ready"));
    }
}
