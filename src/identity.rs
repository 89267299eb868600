//! Subject codes and BIDS naming.

use std::path::{Path, PathBuf};

use crate::error::{ConvertError, Result};

/// Characters removed from raw participant ids.
const SUBJECT_SEPARATORS: [char; 3] = ['_', '-', ' '];

/// Derives the subject code from a raw participant id.
///
/// Every `_`, `-` and space is removed. The result must be non-empty and
/// alphanumeric so it can be used as a path component.
///
/// Distinct raw ids may map to the same code (`"A-1"` and `"A_1"`); this
/// function does not detect that.
///
/// ```rust
/// use edf2bids::normalize_subject;
///
/// assert_eq!(normalize_subject("sub_01 - A").unwrap(), "sub01A");
/// assert!(normalize_subject(" - _").is_err());
/// ```
pub fn normalize_subject(raw: &str) -> Result<String> {
    let code: String = raw
        .chars()
        .filter(|c| !SUBJECT_SEPARATORS.contains(c))
        .collect();

    if code.is_empty() {
        return Err(ConvertError::Validation(format!(
            "participant id {:?} is empty after normalization",
            raw
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConvertError::Validation(format!(
            "participant id {:?} normalizes to {:?}, which is not alphanumeric",
            raw, code
        )));
    }
    Ok(code)
}

/// Checks that an entity label (session, task, acquisition) is path safe.
pub fn validate_label(entity: &str, value: &str) -> Result<()> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConvertError::Validation(format!(
            "{} label {:?} must be non-empty and alphanumeric",
            entity, value
        )));
    }
    Ok(())
}

/// Split indices for the files of one logical recording.
///
/// A single file gets no index; several files are numbered from 1.
pub fn split_indices(file_count: usize) -> Vec<Option<u32>> {
    match file_count {
        0 => Vec::new(),
        1 => vec![None],
        n => (1..=n as u32).map(Some).collect(),
    }
}

/// Location of one recording inside a BIDS dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsPath {
    pub root: PathBuf,
    pub subject: String,
    pub session: Option<String>,
    pub task: String,
    pub acquisition: Option<String>,
    pub run: Option<u32>,
    pub datatype: String,
}

impl BidsPath {
    /// Creates a path for `subject` and `task` under `root`, validating both.
    pub fn new<P: AsRef<Path>>(root: P, subject: &str, task: &str) -> Result<Self> {
        validate_label("subject", subject)?;
        validate_label("task", task)?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            subject: subject.to_string(),
            session: None,
            task: task.to_string(),
            acquisition: None,
            run: None,
            datatype: "eeg".to_string(),
        })
    }

    pub fn with_session(mut self, session: &str) -> Result<Self> {
        validate_label("session", session)?;
        self.session = Some(session.to_string());
        Ok(self)
    }

    pub fn with_acquisition(mut self, acquisition: &str) -> Result<Self> {
        validate_label("acquisition", acquisition)?;
        self.acquisition = Some(acquisition.to_string());
        Ok(self)
    }

    pub fn with_run(mut self, run: Option<u32>) -> Self {
        self.run = run;
        self
    }

    /// `sub-<s>[_ses-<ses>]_task-<t>[_acq-<a>][_run-<r>]`
    pub fn basename(&self) -> String {
        let mut name = format!("sub-{}", self.subject);
        if let Some(session) = &self.session {
            name.push_str(&format!("_ses-{}", session));
        }
        name.push_str(&format!("_task-{}", self.task));
        if let Some(acquisition) = &self.acquisition {
            name.push_str(&format!("_acq-{}", acquisition));
        }
        if let Some(run) = self.run {
            name.push_str(&format!("_run-{}", run));
        }
        name
    }

    /// `root/sub-<s>[/ses-<ses>]`, the level above the datatype folder.
    pub fn session_directory(&self) -> PathBuf {
        let mut dir = self.root.join(format!("sub-{}", self.subject));
        if let Some(session) = &self.session {
            dir.push(format!("ses-{}", session));
        }
        dir
    }

    /// Directory holding the recording and its sidecars.
    pub fn directory(&self) -> PathBuf {
        self.session_directory().join(&self.datatype)
    }

    /// `sub-<s>[_ses-<ses>]_scans.tsv`, shared by every run of the session.
    pub fn scans_path(&self) -> PathBuf {
        let mut name = format!("sub-{}", self.subject);
        if let Some(session) = &self.session {
            name.push_str(&format!("_ses-{}", session));
        }
        self.session_directory().join(format!("{}_scans.tsv", name))
    }

    /// Recording file as listed in the scans file, relative to the session directory.
    pub fn scans_entry(&self, extension: &str) -> String {
        format!(
            "{}/{}_{}.{}",
            self.datatype,
            self.basename(),
            self.datatype,
            extension
        )
    }

    /// Path of the recording file itself, e.g. `..._eeg.edf`.
    pub fn fpath(&self, extension: &str) -> PathBuf {
        self.sidecar(&self.datatype, extension)
    }

    /// Path of a file sharing the basename, e.g. `..._channels.tsv`.
    pub fn sidecar(&self, suffix: &str, extension: &str) -> PathBuf {
        self.directory()
            .join(format!("{}_{}.{}", self.basename(), suffix, extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_subject() {
        assert_eq!(normalize_subject("sub_01 - A").unwrap(), "sub01A");
        assert_eq!(normalize_subject("P001").unwrap(), "P001");
        assert!(matches!(
            normalize_subject("__--  "),
            Err(ConvertError::Validation(_))
        ));
        assert!(normalize_subject("").is_err());
        assert!(normalize_subject("../x").is_err());
    }

    #[test]
    fn test_normalize_subject_collision_is_not_detected() {
        assert_eq!(
            normalize_subject("A-1").unwrap(),
            normalize_subject("A_1").unwrap()
        );
    }

    #[test]
    fn test_split_indices() {
        assert_eq!(split_indices(0), Vec::<Option<u32>>::new());
        assert_eq!(split_indices(1), vec![None]);
        assert_eq!(split_indices(3), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_basename_full() {
        let path = BidsPath::new("/data/out", "01", "rest")
            .unwrap()
            .with_session("V1")
            .unwrap()
            .with_acquisition("seeg")
            .unwrap()
            .with_run(Some(2));

        assert_eq!(path.basename(), "sub-01_ses-V1_task-rest_acq-seeg_run-2");
        assert_eq!(path.directory(), PathBuf::from("/data/out/sub-01/ses-V1/eeg"));
        assert_eq!(
            path.fpath("edf"),
            PathBuf::from("/data/out/sub-01/ses-V1/eeg/sub-01_ses-V1_task-rest_acq-seeg_run-2_eeg.edf")
        );
        assert_eq!(
            path.sidecar("events", "tsv").file_name().unwrap(),
            "sub-01_ses-V1_task-rest_acq-seeg_run-2_events.tsv"
        );
        assert_eq!(
            path.scans_path(),
            PathBuf::from("/data/out/sub-01/ses-V1/sub-01_ses-V1_scans.tsv")
        );
        assert_eq!(
            path.scans_entry("edf"),
            "eeg/sub-01_ses-V1_task-rest_acq-seeg_run-2_eeg.edf"
        );
    }

    #[test]
    fn test_basename_without_optional_entities() {
        let path = BidsPath::new("out", "01", "rest").unwrap();
        assert_eq!(path.basename(), "sub-01_task-rest");
        assert_eq!(path.directory(), PathBuf::from("out/sub-01/eeg"));
        assert_eq!(path.scans_path(), PathBuf::from("out/sub-01/sub-01_scans.tsv"));
    }

    #[test]
    fn test_labels_must_be_alphanumeric() {
        assert!(BidsPath::new("out", "01", "resting state").is_err());
        assert!(BidsPath::new("out", "01", "rest")
            .unwrap()
            .with_session("v_1")
            .is_err());
        assert!(validate_label("task", "").is_err());
    }
}
