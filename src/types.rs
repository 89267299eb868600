use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::atof_nonlocalized;

/// Per-signal block of the EDF header.
///
/// Numeric fields are kept as the text found in the file so that a header
/// written back out reproduces the original bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHeader {
    pub label: String,
    pub transducer: String,
    pub physical_dimension: String,
    pub physical_min: String,
    pub physical_max: String,
    pub digital_min: String,
    pub digital_max: String,
    pub prefilter: String,
    pub samples_per_record: usize,
    pub reserved: String,
}

impl SignalHeader {
    /// 是否为EDF+注释通道
    pub fn is_annotation(&self) -> bool {
        self.label == crate::EDF_ANNOTATIONS_LABEL
    }
}

/// Fixed-layout header of a legacy EDF recording.
///
/// Owned by whoever parsed it; there is no shared "last header" anywhere in
/// the crate, callers thread this value through explicitly.
///
/// A parsed header also keeps the bytes it was decoded from. Serializing it
/// again starts from those bytes and only re-encodes fields whose value was
/// changed, so padding, non-ASCII text and numeric spelling survive a copy.
#[derive(Debug, Clone)]
pub struct RecordingHeader {
    pub version: String,
    pub patient_id: String,
    pub recording_id: String,
    pub start_date: String,
    pub start_time: String,
    pub header_bytes: usize,
    pub reserved: String,
    /// Number of data records, `-1` while unknown.
    pub record_count: i64,
    pub record_duration: String,
    pub signals: Vec<SignalHeader>,
    /// Header bytes as read from disk; empty for a header built in memory.
    pub(crate) raw: Vec<u8>,
}

// Compares decoded values only; the retained source bytes are not part of it.
impl PartialEq for RecordingHeader {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.patient_id == other.patient_id
            && self.recording_id == other.recording_id
            && self.start_date == other.start_date
            && self.start_time == other.start_time
            && self.header_bytes == other.header_bytes
            && self.reserved == other.reserved
            && self.record_count == other.record_count
            && self.record_duration == other.record_duration
            && self.signals == other.signals
    }
}

impl RecordingHeader {
    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Size of one data record in bytes (16-bit samples).
    pub fn record_size(&self) -> usize {
        self.signals
            .iter()
            .map(|s| s.samples_per_record * crate::EDF_SAMPLE_BYTES)
            .sum()
    }

    /// Data record duration in seconds.
    pub fn record_duration_secs(&self) -> f64 {
        atof_nonlocalized(&self.record_duration)
    }

    /// Total duration covered by the data records, when known.
    pub fn duration_secs(&self) -> Option<f64> {
        (self.record_count >= 0).then(|| self.record_count as f64 * self.record_duration_secs())
    }

    /// Sampling frequency of the fastest ordinary signal.
    pub fn sampling_frequency(&self) -> Option<f64> {
        let duration = self.record_duration_secs();
        if duration <= 0.0 {
            return None;
        }
        self.signals
            .iter()
            .filter(|s| !s.is_annotation())
            .map(|s| s.samples_per_record as f64 / duration)
            .fold(None, |acc: Option<f64>, f| Some(acc.map_or(f, |a| a.max(f))))
    }

    /// Labels of the ordinary (non-annotation) signals, in file order.
    pub fn channel_names(&self) -> Vec<String> {
        self.signals
            .iter()
            .filter(|s| !s.is_annotation())
            .map(|s| s.label.clone())
            .collect()
    }
}

/// Editable text fields of the main header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    PatientId,
    RecordingId,
    StartDate,
    StartTime,
    Reserved,
}

impl HeaderField {
    /// Byte offset of the field from the start of the file.
    pub fn offset(self) -> usize {
        match self {
            HeaderField::PatientId => 8,
            HeaderField::RecordingId => 88,
            HeaderField::StartDate => 168,
            HeaderField::StartTime => 176,
            HeaderField::Reserved => 192,
        }
    }

    pub fn width(self) -> usize {
        match self {
            HeaderField::PatientId | HeaderField::RecordingId => 80,
            HeaderField::StartDate | HeaderField::StartTime => 8,
            HeaderField::Reserved => 44,
        }
    }
}

/// Physiological role inferred for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Eeg,
    Eog,
    Ecg,
    Emg,
    Stim,
    Seeg,
    Ecog,
    Misc,
}

impl ChannelRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelRole::Eeg => "eeg",
            ChannelRole::Eog => "eog",
            ChannelRole::Ecg => "ecg",
            ChannelRole::Emg => "emg",
            ChannelRole::Stim => "stim",
            ChannelRole::Seeg => "seeg",
            ChannelRole::Ecog => "ecog",
            ChannelRole::Misc => "misc",
        }
    }

    /// Upper-case type code used in `_channels.tsv`.
    pub fn bids_type(self) -> &'static str {
        match self {
            ChannelRole::Eeg => "EEG",
            ChannelRole::Eog => "EOG",
            ChannelRole::Ecg => "ECG",
            ChannelRole::Emg => "EMG",
            ChannelRole::Stim => "TRIG",
            ChannelRole::Seeg => "SEEG",
            ChannelRole::Ecog => "ECOG",
            ChannelRole::Misc => "MISC",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A channel name paired with the role assigned to it by classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelDescriptor {
    name: String,
    role: ChannelRole,
}

impl ChannelDescriptor {
    pub(crate) fn new(name: impl Into<String>, role: ChannelRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }
}

/// Acquisition modality declared by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Eeg,
    Ieeg,
}

impl Modality {
    /// Role given to channels no rule matches; also used as the `acq` tag.
    pub fn default_role(self) -> ChannelRole {
        match self {
            Modality::Eeg => ChannelRole::Eeg,
            Modality::Ieeg => ChannelRole::Seeg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(label: &str, samples: usize) -> SignalHeader {
        SignalHeader {
            label: label.to_string(),
            transducer: String::new(),
            physical_dimension: "uV".to_string(),
            physical_min: "-200".to_string(),
            physical_max: "200".to_string(),
            digital_min: "-32768".to_string(),
            digital_max: "32767".to_string(),
            prefilter: String::new(),
            samples_per_record: samples,
            reserved: String::new(),
        }
    }

    #[test]
    fn test_record_size_and_frequency() {
        let header = RecordingHeader {
            version: "0".to_string(),
            patient_id: String::new(),
            recording_id: String::new(),
            start_date: "01.01.20".to_string(),
            start_time: "10.00.00".to_string(),
            header_bytes: 768,
            reserved: "EDF+C".to_string(),
            record_count: 10,
            record_duration: "0.5".to_string(),
            signals: vec![signal("EEG Fp1", 128), signal("EDF Annotations", 30)],
            raw: Vec::new(),
        };

        assert_eq!(header.record_size(), (128 + 30) * 2);
        assert_eq!(header.sampling_frequency(), Some(256.0));
        assert_eq!(header.duration_secs(), Some(5.0));
        assert_eq!(header.channel_names(), vec!["EEG Fp1".to_string()]);
    }

    #[test]
    fn test_modality_default_role() {
        assert_eq!(Modality::Eeg.default_role(), ChannelRole::Eeg);
        assert_eq!(Modality::Ieeg.default_role(), ChannelRole::Seeg);
    }
}
