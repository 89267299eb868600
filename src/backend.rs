//! Reading whole recordings and writing them into the exchange layout.
//!
//! [`RecordingBackend`] is the seam to the full recording codec. The crate
//! ships [`EdfBackend`], which handles EDF on its own by block copy; EEGLAB
//! `.set` decoding needs another backend behind the same trait.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::annotations::{annotation_events, read_annotations};
use crate::channels::role_counts;
use crate::error::{ConvertError, Result};
use crate::events::{write_events_tsv, EventTable};
use crate::header::{copy_recording_with_header, parse_header};
use crate::identity::BidsPath;
use crate::types::{ChannelDescriptor, ChannelRole, RecordingHeader};

/// BIDS version declared in `dataset_description.json`.
pub const BIDS_VERSION: &str = "1.8.0";

/// Input recording format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Edf,
    Set,
}

impl FileFormat {
    /// Detects the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("edf") => Ok(FileFormat::Edf),
            Some("set") => Ok(FileFormat::Set),
            _ => Err(ConvertError::Validation(format!(
                "unsupported file format: {}",
                path.display()
            ))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Edf => "edf",
            FileFormat::Set => "set",
        }
    }
}

/// A recording as loaded by a backend.
#[derive(Debug, Clone)]
pub struct Recording {
    pub source: PathBuf,
    pub format: FileFormat,
    /// Present for EDF input; the scrub stage edits it before writing.
    pub header: Option<RecordingHeader>,
    pub channel_names: Vec<String>,
    pub sampling_frequency: Option<f64>,
    pub duration_secs: Option<f64>,
    pub events: Option<EventTable>,
}

/// Sidecar metadata supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarInfo {
    pub task: String,
    pub power_line_frequency: Option<u32>,
}

/// Full-recording reader and exchange-layout writer.
pub trait RecordingBackend {
    fn read_recording(&self, path: &Path, format: FileFormat) -> Result<Recording>;

    /// Writes `recording` at `target` and returns the path of the recording file.
    ///
    /// Must refuse to overwrite an existing recording file.
    fn write_recording(
        &self,
        recording: &Recording,
        channels: &[ChannelDescriptor],
        target: &BidsPath,
        sidecar: &SidecarInfo,
    ) -> Result<PathBuf>;
}

/// EDF-only backend built on the header codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdfBackend;

impl RecordingBackend for EdfBackend {
    fn read_recording(&self, path: &Path, format: FileFormat) -> Result<Recording> {
        if format != FileFormat::Edf {
            return Err(ConvertError::Validation(format!(
                "{} input is not supported by the EDF backend: {}",
                format.extension(),
                path.display()
            )));
        }

        let header = parse_header(path)?;
        let annotations = read_annotations(path, &header)?;
        Ok(Recording {
            source: path.to_path_buf(),
            format,
            channel_names: header.channel_names(),
            sampling_frequency: header.sampling_frequency(),
            duration_secs: header.duration_secs(),
            header: Some(header),
            events: (!annotations.is_empty()).then(|| annotation_events(&annotations)),
        })
    }

    fn write_recording(
        &self,
        recording: &Recording,
        channels: &[ChannelDescriptor],
        target: &BidsPath,
        sidecar: &SidecarInfo,
    ) -> Result<PathBuf> {
        let header = recording.header.as_ref().ok_or_else(|| {
            ConvertError::Validation(format!(
                "no EDF header loaded for {}",
                recording.source.display()
            ))
        })?;

        let output = target.fpath(FileFormat::Edf.extension());
        if output.exists() {
            return Err(ConvertError::Validation(format!(
                "refusing to overwrite {}",
                output.display()
            )));
        }

        let directory = target.directory();
        fs::create_dir_all(&directory).map_err(|e| ConvertError::writing(&directory, e))?;
        write_dataset_description(&target.root)?;

        let records = copy_recording_with_header(&recording.source, &output, header)?;
        debug!(output = %output.display(), records, "wrote recording");

        write_sidecar_json(target, recording, channels, sidecar)?;
        write_channels_tsv(target, recording, channels)?;
        if let Some(events) = recording.events.as_ref().filter(|e| !e.is_empty()) {
            write_events_tsv(target.sidecar("events", "tsv"), events)?;
        }
        write_scans_row(target, header)?;

        info!(output = %output.display(), "wrote BIDS recording");
        Ok(output)
    }
}

fn write_dataset_description(root: &Path) -> Result<()> {
    let path = root.join("dataset_description.json");
    if path.exists() {
        return Ok(());
    }
    let description = json!({
        "Name": root.file_name().and_then(|n| n.to_str()).unwrap_or("dataset"),
        "BIDSVersion": BIDS_VERSION,
        "DatasetType": "raw",
    });
    write_json(&path, &description)
}

fn write_sidecar_json(
    target: &BidsPath,
    recording: &Recording,
    channels: &[ChannelDescriptor],
    sidecar: &SidecarInfo,
) -> Result<()> {
    let counts = role_counts(channels);
    let count = |role: ChannelRole| counts.get(&role).copied().unwrap_or(0);
    let power_line = sidecar
        .power_line_frequency
        .map_or(json!("n/a"), |f| json!(f));

    let mut body = json!({
        "TaskName": sidecar.task,
        "SamplingFrequency": recording.sampling_frequency,
        "PowerLineFrequency": power_line,
        "SoftwareFilters": "n/a",
        "EEGChannelCount": count(ChannelRole::Eeg),
        "EOGChannelCount": count(ChannelRole::Eog),
        "ECGChannelCount": count(ChannelRole::Ecg),
        "EMGChannelCount": count(ChannelRole::Emg),
        "MiscChannelCount": count(ChannelRole::Misc),
        "TriggerChannelCount": count(ChannelRole::Stim),
        "RecordingDuration": recording.duration_secs,
        "RecordingType": "continuous",
    });
    if count(ChannelRole::Seeg) > 0 {
        body["SEEGChannelCount"] = json!(count(ChannelRole::Seeg));
    }
    if count(ChannelRole::Ecog) > 0 {
        body["ECOGChannelCount"] = json!(count(ChannelRole::Ecog));
    }

    write_json(&target.sidecar(&target.datatype, "json"), &body)
}

fn write_channels_tsv(
    target: &BidsPath,
    recording: &Recording,
    channels: &[ChannelDescriptor],
) -> Result<()> {
    let path = target.sidecar("channels", "tsv");
    let file = fs::File::create(&path).map_err(|e| ConvertError::writing(&path, e))?;
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(file);

    let signals = recording.header.as_ref().map(|h| {
        h.signals
            .iter()
            .filter(|s| !s.is_annotation())
            .collect::<Vec<_>>()
    });
    let duration = recording
        .header
        .as_ref()
        .map_or(0.0, |h| h.record_duration_secs());

    writer.write_record(["name", "type", "units", "sampling_frequency", "status"])?;
    for (index, channel) in channels.iter().enumerate() {
        let signal = signals.as_ref().and_then(|s| s.get(index));
        let units = signal
            .map(|s| s.physical_dimension.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "n/a".to_string());
        let frequency = match signal {
            Some(s) if duration > 0.0 => (s.samples_per_record as f64 / duration).to_string(),
            _ => recording
                .sampling_frequency
                .map_or_else(|| "n/a".to_string(), |f| f.to_string()),
        };
        writer.write_record([
            channel.name(),
            channel.role().bids_type(),
            units.as_str(),
            frequency.as_str(),
            "good",
        ])?;
    }
    writer.flush().map_err(|e| ConvertError::writing(&path, e))?;
    Ok(())
}

/// Appends the recording to the session's scans file, creating it with a header row.
fn write_scans_row(target: &BidsPath, header: &RecordingHeader) -> Result<()> {
    let path = target.scans_path();
    let acq_time = match header.start_datetime() {
        Ok(start) => start.format("%Y-%m-%dT%H:%M:%S").to_string(),
        Err(e) => {
            warn!(error = %e, "recording start unreadable, acq_time left as n/a");
            "n/a".to_string()
        }
    };

    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| ConvertError::writing(&path, e))?;
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(file);
    if is_new {
        writer.write_record(["filename", "acq_time"])?;
    }
    writer.write_record([
        target.scans_entry(FileFormat::Edf.extension()).as_str(),
        acq_time.as_str(),
    ])?;
    writer.flush().map_err(|e| ConvertError::writing(&path, e))?;
    Ok(())
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(|e| ConvertError::writing(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::classify_channels;
    use crate::doctest_utils::{write_annotated_recording, write_test_recording};
    use tempfile::tempdir;

    #[test]
    fn test_scans_rows_accumulate_per_session() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("rec.edf");
        let mut header = write_test_recording(&source, "P001", &["EEG"], 1).unwrap();
        let target = BidsPath::new(dir.path(), "01", "rest").unwrap();
        std::fs::create_dir_all(target.session_directory()).unwrap();

        write_scans_row(&target.clone().with_run(Some(1)), &header).unwrap();
        header.start_date = "31.12.99".to_string();
        header.start_time = "xx".to_string();
        write_scans_row(&target.with_run(Some(2)), &header).unwrap();

        let scans = std::fs::read_to_string(dir.path().join("sub-01/sub-01_scans.tsv")).unwrap();
        let lines: Vec<&str> = scans.lines().collect();
        assert_eq!(
            lines,
            vec![
                "filename\tacq_time",
                "eeg/sub-01_task-rest_run-1_eeg.edf\t2020-01-01T10:30:00",
                "eeg/sub-01_task-rest_run-2_eeg.edf\tn/a",
            ]
        );
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FileFormat::from_path(Path::new("a/b.EDF")).unwrap(), FileFormat::Edf);
        assert_eq!(FileFormat::from_path(Path::new("b.set")).unwrap(), FileFormat::Set);
        assert!(FileFormat::from_path(Path::new("b.vhdr")).is_err());
        assert!(FileFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_read_recording_skips_annotation_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        write_annotated_recording(&path, "P001", &["EEG Fp1"], 2, &[(1.5, None, "Spike")])
            .unwrap();

        let recording = EdfBackend.read_recording(&path, FileFormat::Edf).unwrap();
        assert_eq!(recording.channel_names, vec!["EEG Fp1".to_string()]);
        assert_eq!(recording.sampling_frequency, Some(4.0));
        assert_eq!(recording.duration_secs, Some(2.0));

        let events = recording.events.unwrap();
        assert_eq!(events.event_count().unwrap(), 1);
    }

    #[test]
    fn test_plain_edf_has_no_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        write_test_recording(&path, "P001", &["EEG Fp1"], 2).unwrap();
        let recording = EdfBackend.read_recording(&path, FileFormat::Edf).unwrap();
        assert!(recording.events.is_none());
    }

    #[test]
    fn test_set_input_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.set");
        std::fs::write(&path, b"MATLAB").unwrap();
        assert!(matches!(
            EdfBackend.read_recording(&path, FileFormat::Set),
            Err(ConvertError::Validation(_))
        ));
    }

    #[test]
    fn test_write_recording_layout_and_no_overwrite() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("rec.edf");
        write_test_recording(&source, "P001", &["C3-EEG", "ECG"], 3).unwrap();

        let recording = EdfBackend.read_recording(&source, FileFormat::Edf).unwrap();
        let channels = classify_channels(&recording.channel_names, ChannelRole::Eeg);
        let target = BidsPath::new(dir.path().join("bids"), "01", "rest")
            .unwrap()
            .with_session("V1")
            .unwrap();
        let sidecar = SidecarInfo {
            task: "rest".to_string(),
            power_line_frequency: Some(60),
        };

        let output = EdfBackend
            .write_recording(&recording, &channels, &target, &sidecar)
            .unwrap();
        assert_eq!(output, target.fpath("edf"));
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&source).unwrap());

        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(target.sidecar("eeg", "json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["PowerLineFrequency"], 60);
        assert_eq!(json["EEGChannelCount"], 1);
        assert_eq!(json["ECGChannelCount"], 1);

        let channels_tsv = std::fs::read_to_string(target.sidecar("channels", "tsv")).unwrap();
        assert!(channels_tsv.starts_with("name\ttype\tunits\tsampling_frequency\tstatus\n"));
        assert!(channels_tsv.contains("C3-EEG\tEEG\tuV\t4\tgood"));
        assert!(channels_tsv.contains("ECG\tECG\tuV\t4\tgood"));
        assert!(dir.path().join("bids/dataset_description.json").exists());
        assert!(!target.sidecar("events", "tsv").exists());

        let scans = std::fs::read_to_string(target.scans_path()).unwrap();
        assert_eq!(
            scans,
            "filename\tacq_time\neeg/sub-01_ses-V1_task-rest_eeg.edf\t2020-01-01T10:30:00\n"
        );

        let again = EdfBackend.write_recording(&recording, &channels, &target, &sidecar);
        assert!(matches!(again, Err(ConvertError::Validation(_))));
    }
}
