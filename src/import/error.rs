use std::fmt;

use crate::import::detect::CardFormat;
use crate::storage::StorageError;

/// Pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Detect,
    Parse,
    Process,
    Persist,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImportStage::Detect => "detect",
            ImportStage::Parse => "parse",
            ImportStage::Process => "process",
            ImportStage::Persist => "persist",
        };
        f.write_str(label)
    }
}

/// Errors produced while importing a card file.
#[derive(Debug)]
pub enum ImportError {
    /// Input could not be classified as any supported format
    UnsupportedFormat { hint: Option<String> },
    /// Container is structurally invalid (bad PNG chunk stream, unreadable ZIP, missing manifest)
    MalformedContainer { format: CardFormat, reason: String },
    /// PNG carries no recognized card metadata chunk
    MissingEmbeddedData { keywords: Vec<String> },
    /// JSON does not match any known card or lorebook shape
    UnrecognizedSchema(String),
    /// Card or collection failed processing checks
    ValidationFailed(Vec<String>),
    /// A storage adapter call failed
    StorageWriteFailed(StorageError),
    /// None of a collection's member characters were saved, so the
    /// collection card was not written
    NoMembersSaved { members: usize },
}

impl ImportError {
    pub fn malformed(format: CardFormat, reason: impl Into<String>) -> Self {
        ImportError::MalformedContainer {
            format,
            reason: reason.into(),
        }
    }

    pub fn stage(&self) -> ImportStage {
        match self {
            ImportError::UnsupportedFormat { .. } => ImportStage::Detect,
            ImportError::MalformedContainer { .. }
            | ImportError::MissingEmbeddedData { .. }
            | ImportError::UnrecognizedSchema(_) => ImportStage::Parse,
            ImportError::ValidationFailed(_) => ImportStage::Process,
            ImportError::StorageWriteFailed(_) | ImportError::NoMembersSaved { .. } => {
                ImportStage::Persist
            }
        }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::UnsupportedFormat { hint: Some(hint) } => {
                write!(f, "unsupported format ({hint})")
            }
            ImportError::UnsupportedFormat { hint: None } => write!(f, "unsupported format"),
            ImportError::MalformedContainer { format, reason } => {
                write!(f, "malformed {format} container: {reason}")
            }
            ImportError::MissingEmbeddedData { keywords } => {
                write!(f, "no embedded card data (looked for {})", keywords.join(", "))
            }
            ImportError::UnrecognizedSchema(reason) => {
                write!(f, "unrecognized card schema: {reason}")
            }
            ImportError::ValidationFailed(errors) => {
                write!(f, "validation failed: {}", errors.join("; "))
            }
            ImportError::StorageWriteFailed(err) => write!(f, "storage write failed: {err}"),
            ImportError::NoMembersSaved { members } => {
                write!(f, "none of the {members} member characters were saved")
            }
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::StorageWriteFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ImportError {
    fn from(err: StorageError) -> Self {
        ImportError::StorageWriteFailed(err)
    }
}

/// A terminal failure for a whole file, with the context needed to report it.
#[derive(Debug)]
pub struct ImportFailure {
    pub file: String,
    pub error: ImportError,
}

impl ImportFailure {
    pub fn stage(&self) -> ImportStage {
        self.error.stage()
    }
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} failed: {}", self.file, self.stage(), self.error)
    }
}

impl std::error::Error for ImportFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
