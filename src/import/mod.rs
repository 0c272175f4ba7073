pub mod assets;
pub mod detect;
pub mod error;
pub mod json;
pub mod package;
pub mod png;
pub mod png_text;
pub mod process;
pub mod report;
pub mod service;

#[cfg(test)]
mod tests_integration;

// Re-exports for internal module use
pub use detect::{detect_format, CardFormat};
pub use error::{ImportError, ImportFailure, ImportStage};
pub use report::{EntityOutcome, ImportReport, ImportStatus, PersistedCard, PersistedCollection};
pub use service::{ImportOptions, ImportService, ImportSource};
