//! Immutable row snapshots delivered to subscribers
//!
//! The pipeline reuses its working buffers as soon as the per-row callback
//! returns, so a row handed to subscribers must never alias them. Rows are
//! built by deep-copying key and value columns at fan-out time and are
//! immutable from then on. Windowed and non-windowed output are one type,
//! distinguished by whether the key carries a window bound.

use serde::{Deserialize, Serialize};

/// Half-open time interval of a windowed aggregate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBound {
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Key columns, optionally scoped to a window interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowKey {
    pub columns: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub window: Option<WindowBound>,
}

impl RowKey {
    pub fn is_windowed(&self) -> bool {
        self.window.is_some()
    }
}

/// One output row, snapshotted at fan-out time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub key: RowKey,
    pub value: Vec<serde_json::Value>,
    pub timestamp_ms: i64,
}

impl Row {
    /// Build a row by deep-copying borrowed key and value columns.
    pub fn of(
        key_columns: &[serde_json::Value],
        window: Option<WindowBound>,
        value_columns: &[serde_json::Value],
        timestamp_ms: i64,
    ) -> Self {
        Self {
            key: RowKey {
                columns: key_columns.to_vec(),
                window,
            },
            value: value_columns.to_vec(),
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_does_not_alias_source_buffers() {
        let mut key_buf = vec![json!("k1")];
        let mut value_buf = vec![json!(1), json!("a")];

        let row = Row::of(&key_buf, None, &value_buf, 42);

        // Producer reuses its buffers immediately.
        key_buf[0] = json!("clobbered");
        value_buf[0] = json!(999);

        assert_eq!(row.key.columns, vec![json!("k1")]);
        assert_eq!(row.value, vec![json!(1), json!("a")]);
        assert_eq!(row.timestamp_ms, 42);
    }

    #[test]
    fn test_window_bound_only_serialized_when_present() {
        let plain = Row::of(&[json!("k")], None, &[json!(1)], 1);
        let line = serde_json::to_string(&plain).unwrap();
        assert!(!line.contains("window"));

        let windowed = Row::of(
            &[json!("k")],
            Some(WindowBound {
                start_ms: 0,
                end_ms: 60_000,
            }),
            &[json!(1)],
            1,
        );
        let line = serde_json::to_string(&windowed).unwrap();
        assert!(line.contains("\"start_ms\":0"));
        assert!(line.contains("\"end_ms\":60000"));
    }

    #[test]
    fn test_round_trips_through_wire_form() {
        let row = Row::of(&[json!("k")], None, &[json!(1.5), json!(null)], 7);
        let line = serde_json::to_string(&row).unwrap();
        let back: Row = serde_json::from_str(&line).unwrap();
        assert_eq!(back, row);
    }
}
