//! Conversion of one request into a BIDS dataset.
//!
//! Each source file moves through [`Stage`]s in order; the first failure
//! abandons the whole request.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};

use crate::anonymize::{patch_output_identity, scrub};
use crate::backend::{EdfBackend, FileFormat, RecordingBackend, SidecarInfo};
use crate::channels::classify_channels;
use crate::error::{ConvertError, Result};
use crate::identity::{normalize_subject, split_indices, BidsPath};
use crate::types::{ChannelDescriptor, Modality};

fn default_power_line_frequency() -> String {
    "n/a".to_string()
}

/// A conversion request as sent by the caller, in camelCase JSON.
///
/// ```rust
/// use edf2bids::{ConversionRequest, Modality};
///
/// let request = ConversionRequest::from_json_str(r#"{
///     "sourceFiles": ["/data/night1.edf"],
///     "modality": "ieeg",
///     "participantId": "PT_007",
///     "session": "V1",
///     "task": "sleep",
///     "outputRoot": "/data/bids",
///     "outputName": "export",
///     "readOnly": true,
///     "powerLineFrequency": "60"
/// }"#)?;
///
/// assert_eq!(request.modality, Modality::Ieeg);
/// assert_eq!(request.line_frequency(), Some(60));
/// # Ok::<(), edf2bids::ConvertError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub source_files: Vec<PathBuf>,
    pub modality: Modality,
    pub participant_id: String,
    #[serde(default)]
    pub session: Option<String>,
    pub task: String,
    pub output_root: PathBuf,
    pub output_name: String,
    #[serde(default)]
    pub read_only: bool,
    /// Free text; only a whole number is carried into the sidecar.
    #[serde(default = "default_power_line_frequency")]
    pub power_line_frequency: String,
    /// Overrides detection from the file extension.
    #[serde(default)]
    pub file_format: Option<FileFormat>,
}

impl ConversionRequest {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConvertError::reading(path, e))?;
        Self::from_json_str(&text)
    }

    /// The power line frequency, when the text is nothing but ASCII digits.
    pub fn line_frequency(&self) -> Option<u32> {
        let text = &self.power_line_frequency;
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        text.parse().ok()
    }

    /// Dataset directory, `outputRoot/outputName`.
    pub fn dataset_root(&self) -> PathBuf {
        self.output_root.join(&self.output_name)
    }
}

/// Processing stages of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Validate,
    Parse,
    Classify,
    Scrub,
    Write,
    PatchOutput,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Parse => "parse",
            Stage::Classify => "classify",
            Stage::Scrub => "scrub",
            Stage::Write => "write",
            Stage::PatchOutput => "patch-output",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result for one source file.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertedRun {
    pub source: PathBuf,
    pub run: Option<u32>,
    pub basename: String,
    pub channels: Vec<ChannelDescriptor>,
    /// Written recording file; `None` in read-only mode.
    pub output: Option<PathBuf>,
    /// Last stage reached.
    pub stage: Stage,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionOutcome {
    pub runs: Vec<ConvertedRun>,
}

impl ConversionOutcome {
    pub fn basenames(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.basename.as_str()).collect()
    }
}

/// Drives header scrubbing, channel classification and the exchange-layout write.
///
/// Conversions sharing an output root must not run concurrently: each one
/// starts by deleting its previous dataset directory.
#[derive(Debug, Clone, Default)]
pub struct Converter<B = EdfBackend> {
    backend: B,
}

impl Converter<EdfBackend> {
    pub fn new() -> Self {
        Self {
            backend: EdfBackend,
        }
    }
}

impl<B: RecordingBackend> Converter<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutcome> {
        let span = info_span!("convert", participant = %request.participant_id);
        let _enter = span.enter();

        let (target, formats) = self.validate(request).map_err(|e| failed(Stage::Validate, e))?;

        if !request.read_only {
            remove_previous_output(&request.dataset_root())?;
        }

        let mut outcome = ConversionOutcome::default();
        let runs = split_indices(request.source_files.len());
        for ((source, format), run) in request.source_files.iter().zip(formats).zip(runs) {
            let converted = self.convert_file(request, source, format, target.clone().with_run(run))?;
            outcome.runs.push(converted);
        }

        info!(
            runs = outcome.runs.len(),
            read_only = request.read_only,
            "conversion finished"
        );
        Ok(outcome)
    }

    fn validate(&self, request: &ConversionRequest) -> Result<(BidsPath, Vec<FileFormat>)> {
        if request.source_files.is_empty() {
            return Err(ConvertError::Validation("no source files given".to_string()));
        }
        validate_output_name(&request.output_name)?;

        let mut formats = Vec::with_capacity(request.source_files.len());
        for source in &request.source_files {
            if !source.is_file() {
                return Err(ConvertError::Validation(format!(
                    "File not found or is not file: {}",
                    source.display()
                )));
            }
            formats.push(match request.file_format {
                Some(format) => format,
                None => FileFormat::from_path(source)?,
            });
        }

        let subject = normalize_subject(&request.participant_id)?;
        debug!(raw = %request.participant_id, subject = %subject, "normalized subject");

        let mut target = BidsPath::new(request.dataset_root(), &subject, &request.task)?
            .with_acquisition(request.modality.default_role().as_str())?;
        if let Some(session) = request.session.as_deref().filter(|s| !s.is_empty()) {
            target = target.with_session(session)?;
        }
        Ok((target, formats))
    }

    fn convert_file(
        &self,
        request: &ConversionRequest,
        source: &Path,
        format: FileFormat,
        target: BidsPath,
    ) -> Result<ConvertedRun> {
        let mut recording = self
            .backend
            .read_recording(source, format)
            .map_err(|e| failed(Stage::Parse, e))?;

        let channels = classify_channels(&recording.channel_names, request.modality.default_role());
        debug!(
            stage = %Stage::Classify,
            source = %source.display(),
            channels = channels.len(),
            "classified channels"
        );

        let mut converted = ConvertedRun {
            source: source.to_path_buf(),
            run: target.run,
            basename: target.basename(),
            channels,
            output: None,
            stage: Stage::Classify,
        };
        if request.read_only {
            return Ok(converted);
        }

        if let Some(header) = recording.header.as_mut() {
            scrub(header);
            debug!(stage = %Stage::Scrub, source = %source.display(), "scrubbed header");
        }

        let sidecar = SidecarInfo {
            task: request.task.clone(),
            power_line_frequency: request.line_frequency(),
        };
        let expected = target.fpath(format.extension());
        let existed = expected.exists();
        let output = self
            .backend
            .write_recording(&recording, &converted.channels, &target, &sidecar)
            .map_err(|e| {
                error!(stage = %Stage::Write, output = %expected.display(), error = %e, "write failed");
                if !existed {
                    discard_partial_output(&expected);
                }
                e.into_write(&expected)
            })?;

        if format == FileFormat::Edf {
            patch_output_identity(&output).map_err(|e| {
                discard_partial_output(&output);
                failed(Stage::PatchOutput, e)
            })?;
        }

        info!(source = %source.display(), output = %output.display(), "converted recording");
        converted.output = Some(output);
        converted.stage = Stage::Done;
        Ok(converted)
    }
}

/// Rejects output names that would escape the output root.
fn validate_output_name(name: &str) -> Result<()> {
    let single_component = Path::new(name).components().count() == 1;
    let has_separator = name.contains(&['/', '\\'][..]);
    if name.is_empty() || name == "." || name == ".." || !single_component || has_separator {
        return Err(ConvertError::Validation(format!(
            "output name {:?} must be a single directory name",
            name
        )));
    }
    Ok(())
}

/// Deletes a dataset directory left by an earlier attempt.
fn remove_previous_output(root: &Path) -> Result<()> {
    if root.exists() {
        warn!(path = %root.display(), "removing output of a previous attempt");
        fs::remove_dir_all(root).map_err(|e| ConvertError::writing(root, e))?;
    }
    Ok(())
}

fn discard_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove partial output");
        }
    }
}

fn failed(stage: Stage, err: ConvertError) -> ConvertError {
    error!(stage = %stage, error = %err, "conversion failed");
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_json() -> &'static str {
        r#"{
            "sourceFiles": ["a.edf", "b.edf"],
            "modality": "eeg",
            "participantId": "sub_01 - A",
            "task": "rest",
            "outputRoot": "/tmp/bids",
            "outputName": "out"
        }"#
    }

    #[test]
    fn test_request_defaults() {
        let request = ConversionRequest::from_json_str(request_json()).unwrap();
        assert_eq!(request.source_files.len(), 2);
        assert_eq!(request.session, None);
        assert!(!request.read_only);
        assert_eq!(request.power_line_frequency, "n/a");
        assert_eq!(request.line_frequency(), None);
        assert_eq!(request.file_format, None);
        assert_eq!(request.dataset_root(), PathBuf::from("/tmp/bids/out"));
    }

    #[test]
    fn test_line_frequency_requires_plain_digits() {
        let mut request = ConversionRequest::from_json_str(request_json()).unwrap();
        for (text, expected) in [
            ("50", Some(50)),
            ("060", Some(60)),
            (" 60 ", None),
            ("+60", None),
            ("60.0", None),
            ("", None),
            ("99999999999", None),
        ] {
            request.power_line_frequency = text.to_string();
            assert_eq!(request.line_frequency(), expected, "{text:?}");
        }
    }

    #[test]
    fn test_request_rejects_unknown_modality() {
        let json = request_json().replace("\"eeg\"", "\"meg\"");
        assert!(matches!(
            ConversionRequest::from_json_str(&json),
            Err(ConvertError::Json(_))
        ));
    }

    #[test]
    fn test_output_name_must_be_single_component() {
        assert!(validate_output_name("export").is_ok());
        assert!(validate_output_name("").is_err());
        assert!(validate_output_name("..").is_err());
        assert!(validate_output_name("a/b").is_err());
        assert!(validate_output_name("/abs").is_err());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::PatchOutput.to_string(), "patch-output");
        assert_eq!(Stage::Done.to_string(), "done");
    }
}
