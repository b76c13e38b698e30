// Dashboard numbers published by the control loop
//
// Modules write labelled values into a sink without waiting for delivery.
// The runtime drains the buffer once per cycle and ships it over zenoh.

use std::collections::BTreeMap;

use tracing::trace;

use crate::messages::TelemetryFrame;

/// Fire-and-forget number sink
pub trait Telemetry {
    fn put_number(&mut self, label: &str, value: f64);
}

/// Keeps the latest value written under each label
#[derive(Debug, Default)]
pub struct TelemetryBuffer {
    values: BTreeMap<String, f64>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.values.get(label).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Move everything collected so far into a frame
    pub fn take_frame(&mut self) -> TelemetryFrame {
        TelemetryFrame {
            values: std::mem::take(&mut self.values),
        }
    }
}

impl Telemetry for TelemetryBuffer {
    fn put_number(&mut self, label: &str, value: f64) {
        trace!("{} = {}", label, value);
        self.values.insert(label.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_value_wins() {
        let mut buf = TelemetryBuffer::new();
        buf.put_number("FrontLeft Turn Power", 0.1);
        buf.put_number("FrontLeft Turn Power", 0.4);
        assert_eq!(buf.get("FrontLeft Turn Power"), Some(0.4));
    }

    #[test]
    fn test_take_frame_drains() {
        let mut buf = TelemetryBuffer::new();
        buf.put_number("a", 1.0);
        buf.put_number("b", 2.0);

        let frame = buf.take_frame();
        assert_eq!(frame.values.len(), 2);
        assert_eq!(frame.values["b"], 2.0);
        assert!(buf.is_empty());
    }
}
