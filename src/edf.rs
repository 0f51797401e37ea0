//! The single mutable handle for an EDF archive
//!
//! [`Edf`] composes create/open/modify/save/close into one lifecycle. Every
//! mutator validates its input up front, so the in-memory graph is always
//! writable without re-validation at save time.
//!
//! # Example
//!
//! ```no_run
//! use edf::{Edf, GradeDistributions, SubmissionContent};
//!
//! let mut edf = Edf::new(2);
//! edf.set_rubric(Some("# Criteria".to_string()));
//! edf.add_submission(
//!     "student_1",
//!     2,
//!     GradeDistributions::new(vec![0.0, 0.0, 1.0], vec![0.0, 0.1, 0.9], vec![0.1, 0.2, 0.7]),
//!     SubmissionContent::Markdown("The answer.".to_string()),
//! )?;
//! edf.save("graded.edf")?;
//! # Ok::<(), edf::EdfError>(())
//! ```

use crate::archive::reader::read_content;
use crate::archive::source::{read_json, read_text, ArchiveSource, DirSource};
use crate::archive::{writer, EdfReader};
use crate::error::{EdfError, Result};
use crate::models::{
    check_submission_id, ContentFormat, GradeDistributions, Manifest, SubmissionContent,
    SubmissionIndex, TaskCore, EDF_VERSION,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

/// Where a handle's identity came from.
///
/// A `Versioned` handle is traceable to a committed, hashed artifact; an
/// `Ephemeral` one was loaded from an unzipped directory and has no committed
/// identity until first saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Versioned { task_id: Uuid, version: u32 },
    Ephemeral,
}

/// A submission held in memory by the facade.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub grade: u32,
    pub distributions: GradeDistributions,
    pub content: SubmissionContent,
    pub additional: BTreeMap<String, Value>,
}

impl Submission {
    pub fn format(&self) -> ContentFormat {
        self.content.format()
    }
}

/// Mutable handle over one archive's entity graph.
///
/// The handle exclusively owns its submission collection (keyed by id,
/// insertion order significant) and task-level fields; nothing is shared
/// across two open archives, and the model carries no locking.
#[derive(Debug)]
pub struct Edf {
    provenance: Provenance,
    edf_version: String,
    max_grade: u32,
    rubric: Option<String>,
    prompt: Option<String>,
    task_additional: BTreeMap<String, Value>,
    submissions: HashMap<String, Submission>,
    order: Vec<String>,
    created_at: Option<u64>,
    content_hash: Option<String>,
    // Kept open for the handle's lifetime; released on close/drop.
    reader: Option<EdfReader>,
}

impl Edf {
    /// Create a fresh archive with a newly generated task id, version 1.
    pub fn new(max_grade: u32) -> Self {
        Self::with_identity(max_grade, Uuid::new_v4(), 1)
    }

    /// Create a fresh archive under a caller-supplied task identity.
    pub fn with_task_id(max_grade: u32, task_id: Uuid, version: u32) -> Result<Self> {
        if version < 1 {
            return Err(EdfError::UserInput("version must be >= 1".to_string()));
        }
        Ok(Self::with_identity(max_grade, task_id, version))
    }

    fn with_identity(max_grade: u32, task_id: Uuid, version: u32) -> Self {
        Self {
            provenance: Provenance::Versioned { task_id, version },
            edf_version: EDF_VERSION.to_string(),
            max_grade,
            rubric: None,
            prompt: None,
            task_additional: BTreeMap::new(),
            submissions: HashMap::new(),
            order: Vec::new(),
            created_at: None,
            content_hash: None,
            reader: None,
        }
    }

    /// Open an existing archive file, populating the full entity graph.
    ///
    /// With `validate` set (the recommended default), the archive is run
    /// through the full validation pipeline before anything is loaded.
    pub fn open<P: AsRef<Path>>(path: P, validate: bool) -> Result<Self> {
        let mut reader = EdfReader::open(path, validate)?;
        let manifest = reader.manifest().clone();
        let task = reader.task().clone();

        let task_id = Uuid::parse_str(&manifest.task_id)
            .map_err(|_| EdfError::Schema(format!("task_id '{}' is not a valid UUID", manifest.task_id)))?;

        let rubric = reader.rubric()?;
        let prompt = reader.prompt()?;
        let task_additional: BTreeMap<String, Value> =
            reader.task_additional()?.into_iter().collect();

        let mut submissions = HashMap::new();
        let mut order = Vec::new();
        for id in reader.submission_ids().to_vec() {
            let record = reader.submission(&id)?;
            let content = reader.content(&id)?;
            submissions.insert(
                id.clone(),
                Submission {
                    id: id.clone(),
                    grade: record.core.grade,
                    distributions: record.core.grade_distributions,
                    content,
                    additional: record.additional.into_iter().collect(),
                },
            );
            order.push(id);
        }

        Ok(Self {
            provenance: Provenance::Versioned {
                task_id,
                version: task.version,
            },
            edf_version: manifest.edf_version,
            max_grade: task.max_grade,
            rubric,
            prompt,
            task_additional,
            submissions,
            order,
            created_at: Some(manifest.created_at),
            content_hash: Some(manifest.content_hash),
            reader: Some(reader),
        })
    }

    /// Load an archive from an unzipped directory tree.
    ///
    /// This bypasses hash and version guarantees, so the result is tagged
    /// [`Provenance::Ephemeral`]: untraceable to any committed artifact until
    /// first saved. The caller must acknowledge this by passing
    /// `acknowledge_unversioned = true`. Declared-but-missing optional files
    /// (rubric, prompt, additional data) degrade to absent instead of failing.
    pub fn from_directory<P: AsRef<Path>>(path: P, acknowledge_unversioned: bool) -> Result<Self> {
        if !acknowledge_unversioned {
            return Err(EdfError::UserInput(
                "loading an unzipped directory bypasses integrity checks and versioning; \
                 pass acknowledge_unversioned = true to proceed"
                    .to_string(),
            ));
        }

        let path = path.as_ref();
        let mut source = DirSource::open(path)?;

        for required in ["manifest.json", "task/core.json", "submissions/_index.json"] {
            if !source.contains(required) {
                return Err(EdfError::Structure(format!(
                    "missing {required} in {}",
                    path.display()
                )));
            }
        }

        let mut manifest: Manifest = read_json(&mut source, "manifest.json")?;
        manifest.validate()?;
        let mut task: TaskCore = read_json(&mut source, "task/core.json")?;
        task.validate()?;
        let index: SubmissionIndex = read_json(&mut source, "submissions/_index.json")?;
        index.validate()?;

        let rubric = if manifest.has_rubric && source.contains("task/rubric.md") {
            Some(read_text(&mut source, "task/rubric.md")?)
        } else {
            None
        };
        let prompt = if manifest.has_prompt && source.contains("task/prompt.md") {
            Some(read_text(&mut source, "task/prompt.md")?)
        } else {
            None
        };
        let task_additional: BTreeMap<String, Value> =
            if !manifest.additional_data.task.is_empty()
                && source.contains("task/additional_data.json")
            {
                read_json::<serde_json::Map<String, Value>>(&mut source, "task/additional_data.json")?
                    .into_iter()
                    .collect()
            } else {
                BTreeMap::new()
            };

        let mut submissions = HashMap::new();
        let mut order = Vec::new();
        for id in &index.submission_ids {
            let core: crate::models::SubmissionCore =
                read_json(&mut source, &format!("submissions/{id}/core.json"))?;

            let additional_path = format!("submissions/{id}/additional_data.json");
            let additional: BTreeMap<String, Value> =
                if !manifest.additional_data.submission.is_empty()
                    && source.contains(&additional_path)
                {
                    read_json::<serde_json::Map<String, Value>>(&mut source, &additional_path)?
                        .into_iter()
                        .collect()
                } else {
                    BTreeMap::new()
                };

            let content = read_content(&mut source, manifest.content_format, id)?;
            submissions.insert(
                id.clone(),
                Submission {
                    id: id.clone(),
                    grade: core.grade,
                    distributions: core.grade_distributions,
                    content,
                    additional,
                },
            );
            order.push(id.clone());
        }

        debug!(path = %path.display(), "loaded ephemeral archive from directory");
        Ok(Self {
            provenance: Provenance::Ephemeral,
            edf_version: manifest.edf_version,
            max_grade: task.max_grade,
            rubric,
            prompt,
            task_additional,
            submissions,
            order,
            created_at: None,
            content_hash: None,
            reader: None,
        })
    }

    /// Release the underlying archive file, if one is held open.
    pub fn close(&mut self) {
        self.reader = None;
    }

    // Accessors

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// True if this handle was loaded from an unzipped directory and has not
    /// been saved yet.
    pub fn is_ephemeral(&self) -> bool {
        self.provenance == Provenance::Ephemeral
    }

    /// Committed task identity; `None` while ephemeral.
    pub fn task_id(&self) -> Option<Uuid> {
        match self.provenance {
            Provenance::Versioned { task_id, .. } => Some(task_id),
            Provenance::Ephemeral => None,
        }
    }

    /// Task version; 0 while ephemeral.
    pub fn version(&self) -> u32 {
        match self.provenance {
            Provenance::Versioned { version, .. } => version,
            Provenance::Ephemeral => 0,
        }
    }

    /// Bump the task version ahead of a content-changing save.
    pub fn set_version(&mut self, version: u32) -> Result<()> {
        if version < 1 {
            return Err(EdfError::UserInput("version must be >= 1".to_string()));
        }
        match &mut self.provenance {
            Provenance::Versioned { version: v, .. } => {
                *v = version;
                Ok(())
            }
            Provenance::Ephemeral => Err(EdfError::UserInput(
                "ephemeral archives have no version until first saved".to_string(),
            )),
        }
    }

    pub fn edf_version(&self) -> &str {
        &self.edf_version
    }

    pub fn max_grade(&self) -> u32 {
        self.max_grade
    }

    pub fn rubric(&self) -> Option<&str> {
        self.rubric.as_deref()
    }

    pub fn set_rubric(&mut self, rubric: Option<String>) {
        self.rubric = rubric;
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn set_prompt(&mut self, prompt: Option<String>) {
        self.prompt = prompt;
    }

    /// Task-level additional attributes.
    pub fn task_data(&self) -> &BTreeMap<String, Value> {
        &self.task_additional
    }

    pub fn set_task_value(&mut self, key: impl Into<String>, value: Value) {
        self.task_additional.insert(key.into(), value);
    }

    /// Millisecond creation timestamp; `None` until saved at least once.
    pub fn created_at(&self) -> Option<u64> {
        self.created_at
    }

    /// Canonical content hash; `None` until saved at least once.
    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    /// Content kind shared by all submissions; `None` while empty.
    pub fn content_format(&self) -> Option<ContentFormat> {
        self.order
            .first()
            .map(|id| self.submissions[id.as_str()].content.format())
    }

    pub fn submission_count(&self) -> usize {
        self.order.len()
    }

    pub fn submission_ids(&self) -> &[String] {
        &self.order
    }

    pub fn get_submission(&self, id: &str) -> Option<&Submission> {
        self.submissions.get(id)
    }

    /// Iterate submissions in insertion/index order.
    pub fn submissions(&self) -> impl Iterator<Item = &Submission> {
        self.order.iter().map(|id| &self.submissions[id.as_str()])
    }

    // Mutators

    /// Add a submission after validating id shape, uniqueness, content-kind
    /// consistency, grade range, and distribution shape.
    ///
    /// All failures are [`EdfError::UserInput`] and leave existing entries
    /// untouched.
    pub fn add_submission(
        &mut self,
        id: &str,
        grade: u32,
        distributions: GradeDistributions,
        content: SubmissionContent,
    ) -> Result<()> {
        self.add_submission_with_data(id, grade, distributions, content, BTreeMap::new())
    }

    /// [`Self::add_submission`] with submission-level additional attributes.
    pub fn add_submission_with_data(
        &mut self,
        id: &str,
        grade: u32,
        distributions: GradeDistributions,
        content: SubmissionContent,
        additional: BTreeMap<String, Value>,
    ) -> Result<()> {
        check_submission_id(id).map_err(EdfError::UserInput)?;

        if self.submissions.contains_key(id) {
            return Err(EdfError::UserInput(format!(
                "submission '{id}' already exists"
            )));
        }

        if let Some(existing) = self.content_format() {
            if content.format() != existing {
                return Err(EdfError::UserInput(format!(
                    "content format mismatch: expected {}, got {}",
                    existing.as_str(),
                    content.format().as_str()
                )));
            }
        }

        if grade > self.max_grade {
            return Err(EdfError::UserInput(format!(
                "grade {grade} out of range [0, {}]",
                self.max_grade
            )));
        }

        distributions.check().map_err(EdfError::UserInput)?;
        distributions
            .check_len(self.max_grade)
            .map_err(EdfError::UserInput)?;

        self.submissions.insert(
            id.to_string(),
            Submission {
                id: id.to_string(),
                grade,
                distributions,
                content,
                additional,
            },
        );
        self.order.push(id.to_string());
        Ok(())
    }

    /// Remove a submission by id, returning it.
    pub fn remove_submission(&mut self, id: &str) -> Result<Submission> {
        let removed = self
            .submissions
            .remove(id)
            .ok_or_else(|| EdfError::UserInput(format!("submission '{id}' not found")))?;
        self.order.retain(|s| s != id);
        Ok(removed)
    }

    /// Serialize to an archive file.
    ///
    /// Saving an ephemeral handle mints a fresh task id, resets the version
    /// to 1, and emits a warning: the untraceable edit session becomes a new
    /// permanently-hashed artifact. On success the handle's content hash and
    /// creation timestamp reflect the written archive.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.submissions.is_empty() {
            return Err(EdfError::UserInput(
                "cannot save an archive with no submissions".to_string(),
            ));
        }

        let (task_id, version) = match self.provenance {
            Provenance::Versioned { task_id, version } => (task_id, version),
            Provenance::Ephemeral => {
                let minted = Uuid::new_v4();
                warn!(
                    task_id = %minted,
                    "saving ephemeral archive: minted a fresh task id and reset version to 1"
                );
                self.provenance = Provenance::Versioned {
                    task_id: minted,
                    version: 1,
                };
                (minted, 1)
            }
        };

        let id_string = task_id.hyphenated().to_string();
        let plan = writer::plan_archive(self, &id_string, version)?;
        writer::write_archive(path.as_ref(), &plan.files)?;

        self.content_hash = Some(plan.manifest.content_hash);
        self.created_at = Some(plan.manifest.created_at);
        Ok(())
    }
}
