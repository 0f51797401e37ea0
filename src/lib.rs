//! EDF: archive format for automated-grading pipelines
//!
//! An EDF archive bundles one grading task (rubric, prompt, metadata) with its
//! graded submissions (content plus probabilistic grade distributions) as a
//! verifiable, immutable artifact:
//! - Zip container with a fixed JSON layout and a `manifest.json`
//! - Canonical SHA-256 content hash over the grading content
//! - Structural and cross-file validation that reports every problem found
//!   in one pass
//!
//! # Example
//!
//! ```no_run
//! use edf::{Edf, GradeDistributions, SubmissionContent};
//!
//! // Create an archive
//! let mut edf = Edf::new(20);
//! let mut peaked = vec![0.0; 21];
//! peaked[18] = 1.0;
//! edf.add_submission(
//!     "student_1",
//!     18,
//!     GradeDistributions::new(peaked.clone(), peaked.clone(), peaked),
//!     SubmissionContent::Markdown("Hello".to_string()),
//! )?;
//! edf.save("graded.edf")?;
//!
//! // Open it back, validated
//! let reopened = Edf::open("graded.edf", true)?;
//! assert_eq!(reopened.get_submission("student_1").unwrap().grade, 18);
//! # Ok::<(), edf::EdfError>(())
//! ```

// Core modules
pub mod archive;
pub mod error;
pub mod hash;
pub mod models;
pub mod validation;

mod edf;

// Re-export commonly used types
pub use archive::{ArchiveSource, DirSource, EdfReader, SubmissionRecord, ZipSource};
pub use edf::{Edf, Provenance, Submission};
pub use error::{EdfError, Result};
pub use models::{
    AdditionalDataDeclaration, ContentFormat, GradeDistributions, Manifest, SubmissionContent,
    SubmissionCore, SubmissionIndex, TaskCore, DISTRIBUTION_SUM_TOLERANCE, EDF_VERSION,
};
pub use validation::{
    ValidationReport, CUSTOM_ATTRIBUTE_PREFIX, REGISTERED_SUBMISSION_ATTRIBUTES,
    REGISTERED_TASK_ATTRIBUTES,
};
