//! `_events.tsv` sidecar written from an event structure of parallel arrays.

use std::fs::File;
use std::path::Path;

use crate::error::{ConvertError, Result};

/// Marker written for events with no value in a column.
pub const BLANK_MARKER: &str = "NaN";

/// One cell of an event column.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    Number(f64),
    Text(String),
    Empty,
}

impl EventValue {
    fn render(&self) -> String {
        match self {
            EventValue::Number(n) if n.is_nan() => BLANK_MARKER.to_string(),
            EventValue::Number(n) => n.to_string(),
            EventValue::Text(s) => s.clone(),
            EventValue::Empty => BLANK_MARKER.to_string(),
        }
    }
}

impl From<f64> for EventValue {
    fn from(value: f64) -> Self {
        EventValue::Number(value)
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        EventValue::Text(value.to_string())
    }
}

/// Event fields in their original order, each with one value per event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    columns: Vec<(String, Vec<EventValue>)>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: &str, values: Vec<EventValue>) -> Self {
        self.push_column(name, values);
        self
    }

    pub fn push_column(&mut self, name: &str, values: Vec<EventValue>) {
        self.columns.push((name.to_string(), values));
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of events, or an error if the columns disagree.
    pub fn event_count(&self) -> Result<usize> {
        let mut lengths = self.columns.iter().map(|(name, values)| (name, values.len()));
        let Some((_, expected)) = lengths.next() else {
            return Ok(0);
        };
        for (name, len) in lengths {
            if len != expected {
                return Err(ConvertError::Validation(format!(
                    "event field {:?} has {} values, expected {}",
                    name, len, expected
                )));
            }
        }
        Ok(expected)
    }

    /// Column headers as written to the TSV, `type` renamed to `trial_type`.
    pub fn tsv_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|(name, _)| if name == "type" { "trial_type" } else { name.as_str() })
            .collect()
    }
}

/// Writes `table` as a tab-separated events file.
pub fn write_events_tsv<P: AsRef<Path>>(path: P, table: &EventTable) -> Result<()> {
    let path = path.as_ref();
    let rows = table.event_count()?;
    let file = File::create(path).map_err(|e| ConvertError::writing(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(file);

    writer.write_record(table.tsv_columns())?;
    for row in 0..rows {
        writer.write_record(table.columns.iter().map(|(_, values)| values[row].render()))?;
    }
    writer.flush().map_err(|e| ConvertError::writing(path, e))?;
    Ok(())
}
