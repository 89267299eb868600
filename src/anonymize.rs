//! Scrubbing of patient-identifying header fields.
//!
//! Two passes exist. [`scrub`] edits a parsed header in memory before the
//! recording is written; [`patch_output_identity`] rewrites the identity
//! field of a file that has already been written, for writers that carry the
//! source identity through unchanged.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConvertError, Result};
use crate::header::{copy_recording_with_header, parse_header, rewrite_header};
use crate::types::{HeaderField, RecordingHeader};
use crate::utils::{field_text, fit_field};
use crate::EDF_HEADER_BLOCK;

/// Value written over the patient identification field.
pub const IDENTITY_PLACEHOLDER: &str = "X X X X";

/// Byte offset of the patient identification field.
pub const IDENTITY_OFFSET: u64 = 8;

/// Width of the patient identification field in bytes.
pub const IDENTITY_WIDTH: usize = 80;

/// The placeholder rendered at full field width.
pub fn identity_placeholder_bytes() -> Vec<u8> {
    fit_field(IDENTITY_PLACEHOLDER, IDENTITY_WIDTH)
}

impl RecordingHeader {
    /// Replaces one text field, truncated or space-padded to its fixed width.
    ///
    /// Non-ASCII characters become `_` so the byte width never changes.
    pub fn set_field(&mut self, field: HeaderField, value: &str) {
        let fitted = field_text(&fit_field(value, field.width()));
        match field {
            HeaderField::PatientId => self.patient_id = fitted,
            HeaderField::RecordingId => self.recording_id = fitted,
            HeaderField::StartDate => self.start_date = fitted,
            HeaderField::StartTime => self.start_time = fitted,
            HeaderField::Reserved => self.reserved = fitted,
        }
    }

    pub fn field(&self, field: HeaderField) -> &str {
        match field {
            HeaderField::PatientId => &self.patient_id,
            HeaderField::RecordingId => &self.recording_id,
            HeaderField::StartDate => &self.start_date,
            HeaderField::StartTime => &self.start_time,
            HeaderField::Reserved => &self.reserved,
        }
    }
}

/// Overwrites the patient identification with [`IDENTITY_PLACEHOLDER`].
///
/// Idempotent; no other field is touched.
pub fn scrub(header: &mut RecordingHeader) {
    header.set_field(HeaderField::PatientId, IDENTITY_PLACEHOLDER);
}

/// Whether the patient identification already holds the placeholder.
pub fn is_scrubbed(header: &RecordingHeader) -> bool {
    header.patient_id == IDENTITY_PLACEHOLDER
}

/// Anonymizes a single EDF recording.
///
/// Holds the source path and its own copy of the parsed header; edits apply
/// to that copy only until [`Anonymizer::make_copy`] or
/// [`Anonymizer::write_in_place`] puts them on disk.
///
/// ```rust
/// use edf2bids::{Anonymizer, HeaderField};
/// # let dir = tempfile::tempdir()?;
/// # let source = dir.path().join("night.edf");
/// # edf2bids::doctest_utils::write_test_recording(&source, "P001 M 01-JAN-1970 Doe", &["EEG C3"], 2)?;
///
/// let mut anonymizer = Anonymizer::open(&source)?;
/// anonymizer.scrub();
/// anonymizer.set_field(HeaderField::RecordingId, "Startdate X X X X");
/// anonymizer.make_copy(dir.path().join("night_anon.edf"))?;
/// # Ok::<(), edf2bids::ConvertError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Anonymizer {
    path: PathBuf,
    header: RecordingHeader,
}

impl Anonymizer {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = parse_header(&path)?;
        Ok(Self { path, header })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }

    pub fn into_header(self) -> RecordingHeader {
        self.header
    }

    pub fn scrub(&mut self) {
        scrub(&mut self.header);
    }

    pub fn set_field(&mut self, field: HeaderField, value: &str) {
        self.header.set_field(field, value);
    }

    /// Writes the edited header plus every data record of the source to `dest`.
    ///
    /// On failure `dest` may be left truncated; it is the caller's to remove.
    pub fn make_copy<P: AsRef<Path>>(&self, dest: P) -> Result<usize> {
        let dest = dest.as_ref();
        let records = copy_recording_with_header(&self.path, dest, &self.header)?;
        info!(
            src = %self.path.display(),
            dest = %dest.display(),
            records,
            "wrote anonymized copy"
        );
        Ok(records)
    }

    /// Puts the edited header back into the source file.
    pub fn write_in_place(&self) -> Result<()> {
        rewrite_header(&self.header, &self.path)
    }
}

/// Overwrites bytes `[8, 88)` of a written EDF file with the placeholder.
///
/// The file must already be closed by whoever wrote it. Always writes
/// exactly [`IDENTITY_WIDTH`] bytes and never changes the file length.
pub fn patch_output_identity<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let len = std::fs::metadata(path)
        .map_err(|e| ConvertError::writing(path, e))?
        .len();
    if len < EDF_HEADER_BLOCK as u64 {
        return Err(ConvertError::parse(
            path,
            format!("{} bytes is too short for an EDF header", len),
        ));
    }

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| ConvertError::writing(path, e))?;
    file.seek(SeekFrom::Start(IDENTITY_OFFSET))
        .and_then(|_| file.write_all(&identity_placeholder_bytes()))
        .and_then(|_| file.flush())
        .map_err(|e| ConvertError::writing(path, e))?;

    debug!(path = %path.display(), "patched output identity");
    Ok(())
}
