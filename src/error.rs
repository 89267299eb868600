use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// Input could not be read because the platform denied access.
    #[error("Read error on {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Output could not be written, or the exchange-layout write step failed.
    #[error("Write error on {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Malformed header in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ConvertError {
    /// Translates an I/O fault raised while reading `path`.
    pub(crate) fn reading(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => ConvertError::Read {
                path: path.to_path_buf(),
                source: err,
            },
            io::ErrorKind::NotFound => {
                ConvertError::Validation(format!("File not found: {}", path.display()))
            }
            io::ErrorKind::UnexpectedEof => ConvertError::Parse {
                path: path.to_path_buf(),
                message: "file ends before the declared length".to_string(),
            },
            _ => ConvertError::Io(err),
        }
    }

    /// Translates an I/O fault raised while writing `path`.
    pub(crate) fn writing(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => ConvertError::Write {
                path: path.to_path_buf(),
                source: Box::new(err),
            },
            _ => ConvertError::Io(err),
        }
    }

    pub(crate) fn parse(path: &Path, message: impl Into<String>) -> Self {
        ConvertError::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Wraps any fault from the exchange-layout write step as a write error.
    pub(crate) fn into_write(self, path: &Path) -> Self {
        match self {
            err @ ConvertError::Write { .. } => err,
            other => ConvertError::Write {
                path: path.to_path_buf(),
                source: Box::new(other),
            },
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, ConvertError::Read { .. })
    }

    pub fn is_write(&self) -> bool {
        matches!(self, ConvertError::Write { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_faults_are_translated() {
        let path = Path::new("rec.edf");
        let denied = || io::Error::new(io::ErrorKind::PermissionDenied, "denied");

        assert!(ConvertError::reading(path, denied()).is_read());
        assert!(ConvertError::writing(path, denied()).is_write());
    }

    #[test]
    fn test_missing_file_is_validation() {
        let err = ConvertError::reading(
            Path::new("missing.edf"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ConvertError::Validation(_)));
    }

    #[test]
    fn test_into_write_keeps_existing_write() {
        let path = Path::new("out.edf");
        let err = ConvertError::Validation("bad".into()).into_write(path);
        assert!(err.is_write());
        assert!(err.to_string().contains("bad"));

        let again = err.into_write(Path::new("other.edf"));
        assert!(again.to_string().contains("out.edf"));
    }
}
