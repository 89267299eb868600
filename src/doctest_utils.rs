// Internal utilities for documentation and integration tests
// Synthesizes small EDF recordings without needing a full signal writer

use crate::header::write_block;
use crate::types::{RecordingHeader, SignalHeader};
use crate::{ConvertError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Samples per data record given to every synthesized signal.
pub const TEST_SAMPLES_PER_RECORD: usize = 4;

/// Builds an EDF+C header with one signal per label.
pub fn build_header(patient_id: &str, labels: &[&str], records: i64) -> RecordingHeader {
    let signals = labels
        .iter()
        .map(|label| SignalHeader {
            label: label.to_string(),
            transducer: "AgAgCl electrodes".to_string(),
            physical_dimension: "uV".to_string(),
            physical_min: "-200".to_string(),
            physical_max: "200".to_string(),
            digital_min: "-32768".to_string(),
            digital_max: "32767".to_string(),
            prefilter: "HP:0.1Hz LP:70Hz".to_string(),
            samples_per_record: TEST_SAMPLES_PER_RECORD,
            reserved: String::new(),
        })
        .collect::<Vec<_>>();

    RecordingHeader {
        version: "0".to_string(),
        patient_id: patient_id.to_string(),
        recording_id: "Startdate 01-JAN-2020 EEG01 tech device".to_string(),
        start_date: "01.01.20".to_string(),
        start_time: "10.30.00".to_string(),
        header_bytes: (signals.len() + 1) * crate::EDF_HEADER_BLOCK,
        reserved: "EDF+C".to_string(),
        record_count: records,
        record_duration: "1".to_string(),
        signals,
        raw: Vec::new(),
    }
}

/// Samples per data record of the synthesized `EDF Annotations` signal.
pub const TEST_ANNOTATION_SAMPLES: usize = 60;

/// Writes a recording whose data record `i` is filled with the byte `i`.
///
/// The block content makes record order observable after a copy.
pub fn write_test_recording<P: AsRef<Path>>(
    path: P,
    patient_id: &str,
    labels: &[&str],
    records: usize,
) -> Result<RecordingHeader> {
    let header = build_header(patient_id, labels, records as i64);
    let blocks = (0..records).map(|index| vec![index as u8; header.record_size()]);
    write_records(path.as_ref(), &header, blocks)?;
    Ok(header)
}

/// Writes an EDF+ recording with a trailing `EDF Annotations` signal.
///
/// Each `(onset, duration, text)` lands in the data record covering its
/// onset (records last one second). Ordinary signals are filled as in
/// [`write_test_recording`].
pub fn write_annotated_recording<P: AsRef<Path>>(
    path: P,
    patient_id: &str,
    labels: &[&str],
    records: usize,
    annotations: &[(f64, Option<f64>, &str)],
) -> Result<RecordingHeader> {
    let path = path.as_ref();
    let mut all_labels = labels.to_vec();
    all_labels.push(crate::EDF_ANNOTATIONS_LABEL);
    let mut header = build_header(patient_id, &all_labels, records as i64);
    if let Some(signal) = header.signals.last_mut() {
        signal.samples_per_record = TEST_ANNOTATION_SAMPLES;
        signal.physical_dimension = String::new();
    }

    let tal_bytes = TEST_ANNOTATION_SAMPLES * crate::EDF_SAMPLE_BYTES;
    let data_bytes = header.record_size() - tal_bytes;
    let mut blocks = Vec::with_capacity(records);
    for index in 0..records {
        let mut tal = format!("+{}\x14\x14\0", index).into_bytes();
        for (onset, duration, text) in annotations.iter().filter(|a| a.0.floor() as usize == index) {
            tal.extend(format!("+{}", onset).bytes());
            if let Some(duration) = duration {
                tal.push(0x15);
                tal.extend(duration.to_string().bytes());
            }
            tal.push(0x14);
            tal.extend(text.bytes());
            tal.extend([0x14, 0]);
        }
        if tal.len() > tal_bytes {
            return Err(ConvertError::Validation(format!(
                "annotations of record {} need {} bytes, only {} available",
                index,
                tal.len(),
                tal_bytes
            )));
        }
        tal.resize(tal_bytes, 0);

        let mut block = vec![index as u8; data_bytes];
        block.extend(tal);
        blocks.push(block);
    }

    write_records(path, &header, blocks.into_iter())?;
    Ok(header)
}

fn write_records(
    path: &Path,
    header: &RecordingHeader,
    blocks: impl Iterator<Item = Vec<u8>>,
) -> Result<()> {
    let file = File::create(path).map_err(|e| ConvertError::writing(path, e))?;
    let mut writer = BufWriter::new(file);

    writer
        .write_all(&header.to_bytes())
        .map_err(|e| ConvertError::writing(path, e))?;
    for block in blocks {
        write_block(&mut writer, &block).map_err(|e| ConvertError::writing(path, e))?;
    }
    writer.flush().map_err(|e| ConvertError::writing(path, e))?;
    Ok(())
}
