//! EDF+ annotations.
//!
//! Every `EDF Annotations` signal holds, per data record, a run of
//! time-stamped annotation lists (TALs):
//! `+onset[0x15 duration]0x14 text 0x14 [text 0x14 ...] 0x00`.
//! The first TAL of each record only keeps time and carries no text.

use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::Path;

use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::events::{EventTable, EventValue};
use crate::header::{data_record_count, read_block};
use crate::types::RecordingHeader;
use crate::utils::parse_edf_time;
use crate::{EDF_SAMPLE_BYTES, EDF_TIME_DIMENSION};

const TAL_DURATION: u8 = 0x15;
const TAL_SEPARATOR: u8 = 0x14;

/// One annotation; times are in 100 ns units relative to the recording start.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub onset: i64,
    pub duration: Option<i64>,
    pub description: String,
}

impl Annotation {
    pub fn onset_secs(&self) -> f64 {
        self.onset as f64 / EDF_TIME_DIMENSION as f64
    }

    /// Duration in seconds, `0` when the TAL gives none.
    pub fn duration_secs(&self) -> f64 {
        self.duration
            .map_or(0.0, |d| d as f64 / EDF_TIME_DIMENSION as f64)
    }
}

/// Decodes the TALs in the annotation bytes of one data record.
pub fn parse_tal_block(data: &[u8]) -> std::result::Result<Vec<Annotation>, String> {
    let mut annotations = Vec::new();

    for tal in data.split(|&b| b == 0).filter(|t| !t.is_empty()) {
        let mut parts = tal.split(|&b| b == TAL_SEPARATOR);
        let Some(stamp) = parts.next() else {
            continue;
        };
        if !matches!(stamp.first(), Some(&b'+') | Some(&b'-')) {
            return Err(format!(
                "annotation list does not start with a signed onset: {:?}",
                String::from_utf8_lossy(tal)
            ));
        }

        let (onset_bytes, duration_bytes) = match stamp.iter().position(|&b| b == TAL_DURATION) {
            Some(i) => (&stamp[..i], Some(&stamp[i + 1..])),
            None => (stamp, None),
        };
        let onset = parse_edf_time(&String::from_utf8_lossy(onset_bytes))?;
        let duration = duration_bytes
            .filter(|d| !d.is_empty())
            .map(|d| parse_edf_time(&String::from_utf8_lossy(d)))
            .transpose()?;

        for text in parts.filter(|p| !p.is_empty()) {
            annotations.push(Annotation {
                onset,
                duration,
                description: String::from_utf8_lossy(text).into_owned(),
            });
        }
    }

    Ok(annotations)
}

/// Byte ranges of the annotation signals inside one data record.
fn annotation_ranges(header: &RecordingHeader) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    for signal in &header.signals {
        let len = signal.samples_per_record * EDF_SAMPLE_BYTES;
        if signal.is_annotation() {
            ranges.push(offset..offset + len);
        }
        offset += len;
    }
    ranges
}

/// Reads every annotation of an EDF+ recording, in file order.
///
/// Plain EDF files have no annotation signal and yield an empty list.
///
/// # Errors
///
/// * `ConvertError::Parse` - a TAL is malformed or the data records are truncated
pub fn read_annotations<P: AsRef<Path>>(
    path: P,
    header: &RecordingHeader,
) -> Result<Vec<Annotation>> {
    let path = path.as_ref();
    let ranges = annotation_ranges(header);
    if ranges.is_empty() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| ConvertError::reading(path, e))?;
    let file_len = file
        .metadata()
        .map_err(|e| ConvertError::reading(path, e))?
        .len();
    let mut reader = BufReader::new(file);

    let mut annotations = Vec::new();
    for index in 0..data_record_count(header, file_len) {
        let block =
            read_block(&mut reader, header, index).map_err(|e| ConvertError::reading(path, e))?;
        for range in &ranges {
            let found = parse_tal_block(&block[range.clone()])
                .map_err(|m| ConvertError::parse(path, format!("data record {}: {}", index, m)))?;
            annotations.extend(found);
        }
    }

    debug!(path = %path.display(), annotations = annotations.len(), "read annotations");
    Ok(annotations)
}

/// Event columns `onset`, `duration` and `type` built from annotations.
pub fn annotation_events(annotations: &[Annotation]) -> EventTable {
    EventTable::new()
        .with_column(
            "onset",
            annotations
                .iter()
                .map(|a| EventValue::from(a.onset_secs()))
                .collect(),
        )
        .with_column(
            "duration",
            annotations
                .iter()
                .map(|a| EventValue::from(a.duration_secs()))
                .collect(),
        )
        .with_column(
            "type",
            annotations
                .iter()
                .map(|a| EventValue::from(a.description.as_str()))
                .collect(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctest_utils::{write_annotated_recording, write_test_recording};
    use tempfile::tempdir;

    #[test]
    fn test_parse_tal_block() {
        let data = b"+0\x14\x14\0+0.5\x14Lights off\x14\0+1.25\x152\x14Arousal\x14Snore\x14\0\0\0";
        let annotations = parse_tal_block(data).unwrap();

        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations[0].onset, 5_000_000);
        assert_eq!(annotations[0].duration, None);
        assert_eq!(annotations[0].description, "Lights off");
        assert_eq!(annotations[1].duration, Some(20_000_000));
        assert_eq!(annotations[1].description, "Arousal");
        assert_eq!(annotations[2].onset, annotations[1].onset);
        assert_eq!(annotations[2].description, "Snore");
    }

    #[test]
    fn test_time_keeping_tal_only() {
        assert!(parse_tal_block(b"+3\x14\x14\0\0\0\0").unwrap().is_empty());
        assert!(parse_tal_block(&[0u8; 16]).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_tal() {
        assert!(parse_tal_block(b"3\x14x\x14\0").is_err());
        assert!(parse_tal_block(b"+a.b\x14x\x14\0").is_err());
    }

    #[test]
    fn test_read_annotations_across_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        let header = write_annotated_recording(
            &path,
            "P001",
            &["EEG Fp1"],
            3,
            &[(0.5, None, "Lights off"), (2.25, Some(1.5), "Arousal")],
        )
        .unwrap();

        let annotations = read_annotations(&path, &header).unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].onset_secs(), 0.5);
        assert_eq!(annotations[1].onset_secs(), 2.25);
        assert_eq!(annotations[1].duration_secs(), 1.5);

        let events = annotation_events(&annotations);
        assert_eq!(events.event_count().unwrap(), 2);
        assert_eq!(events.tsv_columns(), vec!["onset", "duration", "trial_type"]);
    }

    #[test]
    fn test_plain_edf_has_no_annotations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        let header = write_test_recording(&path, "P001", &["EEG"], 2).unwrap();
        assert!(read_annotations(&path, &header).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_in_annotation_signal_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        // record 1 is filled with 0x01 bytes
        let header = write_test_recording(&path, "P001", &["EEG", "EDF Annotations"], 2).unwrap();
        assert!(matches!(
            read_annotations(&path, &header),
            Err(ConvertError::Parse { .. })
        ));
    }
}
