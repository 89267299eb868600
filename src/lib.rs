//! # edf2bids
//!
//! Converts EDF recordings into a BIDS dataset layout. Patient-identifying
//! header fields are scrubbed, channels are classified by physiological
//! role from their labels, and every output file gets a canonical
//! subject/session/task/acquisition/run name.
//!
//! ## Quick Start
//!
//! ### Converting a recording
//!
//! ```rust
//! use edf2bids::{ChannelRole, ConversionRequest, Converter, Modality};
//!
//! # let dir = tempfile::tempdir()?;
//! # let source = dir.path().join("night1.edf");
//! # edf2bids::doctest_utils::write_test_recording(
//! #     &source, "PT007 M 01-JAN-1970 Doe", &["C3-EEG", "LFlex1", "TriggerA"], 2)?;
//! let request = ConversionRequest {
//!     source_files: vec![source.clone()],
//!     modality: Modality::Ieeg,
//!     participant_id: "PT_007".to_string(),
//!     session: Some("V1".to_string()),
//!     task: "sleep".to_string(),
//!     output_root: dir.path().to_path_buf(),
//!     output_name: "bids".to_string(),
//!     read_only: false,
//!     power_line_frequency: "60".to_string(),
//!     file_format: None,
//! };
//!
//! let outcome = Converter::new().convert(&request)?;
//! let run = &outcome.runs[0];
//! assert_eq!(run.basename, "sub-PT007_ses-V1_task-sleep_acq-seeg");
//! assert_eq!(run.channels[1].role(), ChannelRole::Emg);
//! # Ok::<(), edf2bids::ConvertError>(())
//! ```
//!
//! ### Anonymizing a header
//!
//! ```rust
//! use edf2bids::{parse_header, scrub, IDENTITY_PLACEHOLDER};
//!
//! # let dir = tempfile::tempdir()?;
//! # let path = dir.path().join("rec.edf");
//! # edf2bids::doctest_utils::write_test_recording(&path, "P001 F 02-FEB-1980 Roe", &["EEG Fp1"], 1)?;
//! let mut header = parse_header(&path)?;
//! scrub(&mut header);
//! assert_eq!(header.patient_id, IDENTITY_PLACEHOLDER);
//! # Ok::<(), edf2bids::ConvertError>(())
//! ```
//!
//! ## Header layout
//!
//! Only the legacy EDF header is handled here: a 256-byte main block
//! followed by 256 bytes per signal. The patient identification field sits
//! at bytes `[8, 88)`. Both constants belong to this one layout; other
//! formats need their own offsets.

pub mod annotations;
pub mod anonymize;
pub mod backend;
pub mod channels;
pub mod converter;
pub mod error;
pub mod events;
pub mod header;
pub mod identity;
pub mod types;
pub mod utils;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use annotations::{annotation_events, read_annotations, Annotation};
pub use anonymize::{
    is_scrubbed, patch_output_identity, scrub, Anonymizer, IDENTITY_OFFSET, IDENTITY_PLACEHOLDER,
    IDENTITY_WIDTH,
};
pub use backend::{EdfBackend, FileFormat, Recording, RecordingBackend, SidecarInfo};
pub use channels::{classify, classify_channels, ChannelRule, CHANNEL_RULES};
pub use converter::{ConversionOutcome, ConversionRequest, ConvertedRun, Converter, Stage};
pub use error::{ConvertError, Result};
pub use events::{write_events_tsv, EventTable, EventValue};
pub use header::{copy_recording, parse_header, write_header};
pub use identity::{normalize_subject, split_indices, BidsPath};
pub use types::{
    ChannelDescriptor, ChannelRole, HeaderField, Modality, RecordingHeader, SignalHeader,
};

// Important constants
pub const EDF_HEADER_BLOCK: usize = 256;
pub const EDF_MAX_SIGNALS: usize = 4096;
pub const EDF_SAMPLE_BYTES: usize = 2;
pub const EDF_ANNOTATIONS_LABEL: &str = "EDF Annotations";
pub const EDF_TIME_DIMENSION: i64 = 10_000_000; // 100纳秒单位

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
