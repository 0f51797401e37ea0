//! Schema layer for EDF archive files
//!
//! Each struct here maps one-to-one onto a JSON file inside the archive:
//!
//! ```text
//! manifest.json                  -> Manifest
//! task/core.json                 -> TaskCore
//! submissions/_index.json        -> SubmissionIndex
//! submissions/<id>/core.json     -> SubmissionCore
//! ```
//!
//! `validate()` methods check field-level shape and value constraints only;
//! nothing in this module knows about other files. Checks that need
//! cross-file knowledge (distribution length vs `max_grade`, id vs folder
//! name, counts vs index) live in [`crate::validation`].

use crate::error::{EdfError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current version of the EDF format written by this crate.
pub const EDF_VERSION: &str = "1.0.0";

/// Maximum allowed deviation of a probability distribution's sum from 1.0.
pub const DISTRIBUTION_SUM_TOLERANCE: f64 = 1e-4;

/// Content representation used uniformly by every submission in one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Markdown,
    Pdf,
    Images,
}

impl ContentFormat {
    /// Stable lowercase name, as written into the manifest.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::Markdown => "markdown",
            ContentFormat::Pdf => "pdf",
            ContentFormat::Images => "images",
        }
    }
}

/// One submission's content, typed by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionContent {
    /// Markdown text (`content.md`)
    Markdown(String),
    /// Binary document (`content.pdf`)
    Pdf(Vec<u8>),
    /// Ordered page images (`pages/0.jpg`, `pages/1.jpg`, ...)
    Images(Vec<Vec<u8>>),
}

impl SubmissionContent {
    pub fn format(&self) -> ContentFormat {
        match self {
            SubmissionContent::Markdown(_) => ContentFormat::Markdown,
            SubmissionContent::Pdf(_) => ContentFormat::Pdf,
            SubmissionContent::Images(_) => ContentFormat::Images,
        }
    }

    /// Markdown text, or `None` if this is not markdown content.
    pub fn markdown(&self) -> Option<&str> {
        match self {
            SubmissionContent::Markdown(text) => Some(text),
            _ => None,
        }
    }

    /// PDF bytes, or `None` if this is not PDF content.
    pub fn pdf(&self) -> Option<&[u8]> {
        match self {
            SubmissionContent::Pdf(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Ordered page images, or `None` if this is not image content.
    pub fn images(&self) -> Option<&[Vec<u8>]> {
        match self {
            SubmissionContent::Images(pages) => Some(pages),
            _ => None,
        }
    }
}

/// Declared additional-data attribute names, task-level and submission-level.
///
/// Acts as an open-schema contract: every declared attribute must appear
/// (value may be null) in every relevant payload, and no undeclared attribute
/// may appear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDataDeclaration {
    #[serde(default)]
    pub task: Vec<String>,

    #[serde(default)]
    pub submission: Vec<String>,
}

/// The `manifest.json` schema declaring archive structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Semantic version of the EDF format
    pub edf_version: String,

    /// Canonical lower-case UUID v4 identifying this task
    pub task_id: String,

    /// SHA-256 content hash prefixed with `sha256:`
    pub content_hash: String,

    /// Unix millisecond creation timestamp
    pub created_at: u64,

    /// Content representation shared by every submission
    pub content_format: ContentFormat,

    /// Number of submissions; must match `submissions/_index.json`
    pub submission_count: u32,

    #[serde(default)]
    pub has_rubric: bool,

    #[serde(default)]
    pub has_prompt: bool,

    #[serde(default)]
    pub additional_data: AdditionalDataDeclaration,
}

impl Manifest {
    /// Validate field-level constraints, normalizing `task_id` to lowercase.
    pub fn validate(&mut self) -> Result<()> {
        self.task_id = canonical_task_id(&self.task_id).map_err(EdfError::Schema)?;
        check_content_hash(&self.content_hash).map_err(EdfError::Schema)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(EdfError::from)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(EdfError::from)
    }
}

/// The `task/core.json` schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCore {
    /// Must match the manifest's `task_id`
    pub task_id: String,

    /// Increments on content change; `>= 1` for committed archives
    pub version: u32,

    /// Grade ceiling; grades run `0..=max_grade`
    pub max_grade: u32,
}

impl TaskCore {
    pub fn validate(&mut self) -> Result<()> {
        self.task_id = canonical_task_id(&self.task_id).map_err(EdfError::Schema)?;
        if self.version < 1 {
            return Err(EdfError::Schema("version must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Three parallel probability vectors modeling differing marker-noise spread
/// around the same peak grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeDistributions {
    pub optimistic: Vec<f64>,
    pub expected: Vec<f64>,
    pub pessimistic: Vec<f64>,
}

impl GradeDistributions {
    pub fn new(optimistic: Vec<f64>, expected: Vec<f64>, pessimistic: Vec<f64>) -> Self {
        Self {
            optimistic,
            expected,
            pessimistic,
        }
    }

    fn named(&self) -> [(&'static str, &Vec<f64>); 3] {
        [
            ("optimistic", &self.optimistic),
            ("expected", &self.expected),
            ("pessimistic", &self.pessimistic),
        ]
    }

    /// Check non-negativity and the 1e-4 sum tolerance for all three vectors.
    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        for (name, dist) in self.named() {
            if dist.iter().any(|p| *p < 0.0) {
                return Err(format!("{name} distribution contains negative probabilities"));
            }
            let total: f64 = dist.iter().sum();
            if (total - 1.0).abs() > DISTRIBUTION_SUM_TOLERANCE {
                return Err(format!(
                    "{name} distribution must sum to 1.0 (got {total})"
                ));
            }
        }
        Ok(())
    }

    /// Deferred length check: each vector needs exactly `max_grade + 1` entries.
    pub(crate) fn check_len(&self, max_grade: u32) -> std::result::Result<(), String> {
        let expected_len = max_grade as usize + 1;
        for (name, dist) in self.named() {
            if dist.len() != expected_len {
                return Err(format!(
                    "{name} distribution must have length {expected_len}, got {}",
                    dist.len()
                ));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.check().map_err(EdfError::Schema)
    }

    pub fn validate_len(&self, max_grade: u32) -> Result<()> {
        self.check_len(max_grade).map_err(EdfError::Schema)
    }
}

/// The `submissions/<id>/core.json` schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionCore {
    /// `[A-Za-z0-9_]+`, matches the containing folder name
    pub submission_id: String,

    /// Ground-truth grade in `[0, max_grade]`
    pub grade: u32,

    pub grade_distributions: GradeDistributions,
}

impl SubmissionCore {
    pub fn validate(&self) -> Result<()> {
        check_submission_id(&self.submission_id).map_err(EdfError::Schema)?;
        self.grade_distributions.validate()
    }
}

/// The `submissions/_index.json` schema; defines storage and iteration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionIndex {
    pub submission_ids: Vec<String>,
}

impl SubmissionIndex {
    pub fn validate(&self) -> Result<()> {
        for sid in &self.submission_ids {
            check_submission_id(sid)
                .map_err(|e| EdfError::Schema(format!("index entry '{sid}': {e}")))?;
        }
        Ok(())
    }
}

/// Check that an id contains only `[A-Za-z0-9_]` and is non-empty.
pub(crate) fn check_submission_id(id: &str) -> std::result::Result<(), String> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(
            "submission_id must be non-empty and contain only alphanumeric characters and underscores"
                .to_string(),
        );
    }
    Ok(())
}

/// Parse a task id, requiring a hyphenated UUID v4; returns the canonical
/// lowercase form.
pub(crate) fn canonical_task_id(value: &str) -> std::result::Result<String, String> {
    let parsed =
        Uuid::parse_str(value).map_err(|_| format!("task_id '{value}' is not a valid UUID"))?;
    let canonical = parsed.hyphenated().to_string();
    // Reject braced/urn spellings that Uuid::parse_str would accept.
    if !value.eq_ignore_ascii_case(&canonical) {
        return Err(format!("task_id '{value}' is not in canonical hyphenated form"));
    }
    if parsed.get_version() != Some(uuid::Version::Random) {
        return Err(format!("task_id '{value}' is not a version 4 UUID"));
    }
    Ok(canonical)
}

/// Check `sha256:` prefix and a 64-character lowercase hex body.
pub(crate) fn check_content_hash(value: &str) -> std::result::Result<(), String> {
    let Some(body) = value.strip_prefix("sha256:") else {
        return Err("content_hash must be prefixed with 'sha256:'".to_string());
    };
    if body.len() != 64 || !body.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
        return Err("content_hash must contain a valid SHA-256 hex string".to_string());
    }
    Ok(())
}
