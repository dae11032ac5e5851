//! Pipeline error taxonomy.
//!
//! Every failure a participant's pipeline can hit falls into one of four
//! [`ErrorKind`]s.  Batch mode uses the kind to report failures; it never
//! decides whether to continue based on it (every error aborts only the
//! current participant).
use thiserror::Error;

/// Broad class of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Recorded events and logged trials disagree.
    Alignment,
    /// Bad parameters, registry entries or channel/column names.
    Configuration,
    /// Input data that cannot be processed (rank-deficient, wrong shape).
    Data,
    /// File system failures.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Alignment => "alignment",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Data => "data",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The status channel produced fewer onsets than the paradigm has trials.
    #[error("marker detection failed: found {found} onsets, expected {expected}")]
    InsufficientMarkers { found: usize, expected: usize },

    /// Marker and behavioural-log lengths differ.
    #[error("trial count mismatch: {markers} markers vs {log_rows} behavioural rows")]
    TrialCountMismatch { markers: usize, log_rows: usize },

    /// An exclusion index that does not name a fitted component.
    #[error("component {index} out of range (model has {n_components} components)")]
    ExclusionOutOfRange { index: usize, n_components: usize },

    /// Non-interactive run with no registry entry for this recording.
    #[error("no component exclusions recorded for '{recording}'")]
    MissingExclusions { recording: String },

    #[error("channel '{name}' not found in recording")]
    UnknownChannel { name: String },

    #[error("behavioural log has no column '{column}'")]
    MissingColumn { column: String },

    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("decomposition failed: {0}")]
    Decomposition(String),

    #[error("shape mismatch for '{name}': expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("malformed {what}: {reason}")]
    Malformed { what: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InsufficientMarkers { .. }
            | PipelineError::TrialCountMismatch { .. } => ErrorKind::Alignment,
            PipelineError::ExclusionOutOfRange { .. }
            | PipelineError::MissingExclusions { .. }
            | PipelineError::UnknownChannel { .. }
            | PipelineError::MissingColumn { .. }
            | PipelineError::InvalidConfig { .. } => ErrorKind::Configuration,
            PipelineError::Decomposition(_)
            | PipelineError::ShapeMismatch { .. }
            | PipelineError::Malformed { .. } => ErrorKind::Data,
            PipelineError::Io(_) => ErrorKind::Io,
            PipelineError::Csv(e) => {
                if e.is_io_error() {
                    ErrorKind::Io
                } else {
                    ErrorKind::Data
                }
            }
        }
    }

    pub(crate) fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Classify an `anyhow` error coming out of a participant run.
///
/// Errors that did not originate in this crate's taxonomy are treated as
/// I/O when they wrap `std::io::Error`, and as data errors otherwise.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(p) = cause.downcast_ref::<PipelineError>() {
            return p.kind();
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorKind::Io;
        }
    }
    ErrorKind::Data
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn alignment_errors_classified() {
        let e = PipelineError::InsufficientMarkers { found: 418, expected: 420 };
        assert_eq!(e.kind(), ErrorKind::Alignment);
        let e = PipelineError::TrialCountMismatch { markers: 420, log_rows: 419 };
        assert_eq!(e.kind(), ErrorKind::Alignment);
    }

    #[test]
    fn classify_walks_context_chain() {
        let err: anyhow::Error = Err::<(), _>(PipelineError::MissingExclusions {
            recording: "1001-eriksen".into(),
        })
        .context("artifact removal")
        .unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Configuration);

        let io: anyhow::Error = Err::<(), _>(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ))
        .context("reading bdf")
        .unwrap_err();
        assert_eq!(classify(&io), ErrorKind::Io);
    }
}
