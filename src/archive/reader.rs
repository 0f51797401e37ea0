//! Read-only access to a committed EDF archive
//!
//! [`EdfReader`] opens a zip archive, optionally running the full validation
//! pipeline first, and parses only the small JSON entities up front. Submission
//! content is materialized lazily per accessor call, so inspecting a large
//! archive stays low-memory. The underlying file stays open for the handle's
//! lifetime and is released on drop.

use crate::archive::source::{read_json, read_text, ArchiveSource, ZipSource};
use crate::error::{EdfError, Result};
use crate::models::{
    ContentFormat, Manifest, SubmissionContent, SubmissionCore, SubmissionIndex, TaskCore,
};
use crate::validation::validate_archive;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

/// One submission's parsed metadata, without its content.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub core: SubmissionCore,
    pub additional: Map<String, Value>,
}

impl SubmissionRecord {
    pub fn grade(&self) -> u32 {
        self.core.grade
    }
}

/// Lazy reader over a zip-packaged EDF archive.
#[derive(Debug)]
pub struct EdfReader {
    source: ZipSource,
    // Second handle onto the same file, for raw byte-range serving.
    raw: File,
    archive_len: u64,
    manifest: Manifest,
    task_core: TaskCore,
    index: SubmissionIndex,
}

impl EdfReader {
    /// Open an archive for reading.
    ///
    /// With `validate` set, the full validation pipeline runs first and a
    /// [`EdfError::Validation`] aggregate is returned before any entity
    /// reaches the caller. Disabling validation is an explicit trust decision
    /// for known-good archives.
    pub fn open<P: AsRef<Path>>(path: P, validate: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(EdfError::Structure(format!(
                "'{}' is a directory; use Edf::from_directory to load an unzipped archive tree",
                path.display()
            )));
        }

        let mut source = ZipSource::open(path)?;

        if validate {
            let report = validate_archive(&mut source);
            for warning in &report.warnings {
                warn!("{warning}");
            }
            if !report.is_valid() {
                return Err(EdfError::Validation {
                    errors: report.errors,
                    warnings: report.warnings,
                });
            }
        }

        let mut manifest: Manifest = read_json(&mut source, "manifest.json")?;
        manifest.validate()?;
        let mut task_core: TaskCore = read_json(&mut source, "task/core.json")?;
        task_core.validate()?;
        let index: SubmissionIndex = read_json(&mut source, "submissions/_index.json")?;
        index.validate()?;

        let raw = File::open(path)?;
        let archive_len = raw.metadata()?.len();
        debug!(
            task_id = %manifest.task_id,
            submissions = manifest.submission_count,
            "opened archive"
        );

        Ok(Self {
            source,
            raw,
            archive_len,
            manifest,
            task_core,
            index,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn task(&self) -> &TaskCore {
        &self.task_core
    }

    pub fn task_id(&self) -> &str {
        &self.manifest.task_id
    }

    pub fn version(&self) -> u32 {
        self.task_core.version
    }

    pub fn max_grade(&self) -> u32 {
        self.task_core.max_grade
    }

    pub fn content_format(&self) -> ContentFormat {
        self.manifest.content_format
    }

    pub fn submission_count(&self) -> usize {
        self.index.submission_ids.len()
    }

    pub fn submission_ids(&self) -> &[String] {
        &self.index.submission_ids
    }

    /// Rubric markdown, if the manifest declares one.
    pub fn rubric(&mut self) -> Result<Option<String>> {
        if !self.manifest.has_rubric {
            return Ok(None);
        }
        read_text(&mut self.source, "task/rubric.md").map(Some)
    }

    /// Prompt markdown, if the manifest declares one.
    pub fn prompt(&mut self) -> Result<Option<String>> {
        if !self.manifest.has_prompt {
            return Ok(None);
        }
        read_text(&mut self.source, "task/prompt.md").map(Some)
    }

    /// Task-level additional data; empty when none is declared.
    pub fn task_additional(&mut self) -> Result<Map<String, Value>> {
        if self.manifest.additional_data.task.is_empty() {
            return Ok(Map::new());
        }
        read_json(&mut self.source, "task/additional_data.json")
    }

    /// Parse one submission's metadata. Content is not read.
    pub fn submission(&mut self, id: &str) -> Result<SubmissionRecord> {
        if !self.index.submission_ids.iter().any(|s| s == id) {
            return Err(EdfError::UserInput(format!("submission '{id}' not found")));
        }

        let core: SubmissionCore =
            read_json(&mut self.source, &format!("submissions/{id}/core.json"))?;
        let additional = if self.manifest.additional_data.submission.is_empty() {
            Map::new()
        } else {
            read_json(
                &mut self.source,
                &format!("submissions/{id}/additional_data.json"),
            )?
        };

        Ok(SubmissionRecord { core, additional })
    }

    /// Materialize one submission's content, typed by the archive's format.
    pub fn content(&mut self, id: &str) -> Result<SubmissionContent> {
        read_content(&mut self.source, self.manifest.content_format, id)
    }

    /// Markdown content, or `None` if this archive is not markdown-formatted.
    pub fn content_markdown(&mut self, id: &str) -> Result<Option<String>> {
        if self.manifest.content_format != ContentFormat::Markdown {
            return Ok(None);
        }
        read_text(&mut self.source, &format!("submissions/{id}/content.md")).map(Some)
    }

    /// PDF content, or `None` if this archive is not PDF-formatted.
    pub fn content_pdf(&mut self, id: &str) -> Result<Option<Vec<u8>>> {
        if self.manifest.content_format != ContentFormat::Pdf {
            return Ok(None);
        }
        self.source
            .read(&format!("submissions/{id}/content.pdf"))
            .map(Some)
    }

    /// Ordered page images, or `None` if this archive is not images-formatted.
    pub fn content_images(&mut self, id: &str) -> Result<Option<Vec<Vec<u8>>>> {
        if self.manifest.content_format != ContentFormat::Images {
            return Ok(None);
        }
        scan_pages(&mut self.source, id).map(Some)
    }

    /// Total size of the serialized archive file in bytes.
    pub fn archive_len(&self) -> u64 {
        self.archive_len
    }

    /// Read a raw byte range of the serialized archive file.
    ///
    /// Serves progressive delivery in the viewer; a range past the end of the
    /// file is truncated rather than failing.
    pub fn read_byte_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if offset >= self.archive_len {
            return Ok(Vec::new());
        }
        self.raw.seek(SeekFrom::Start(offset))?;
        let mut data = Vec::with_capacity(len);
        self.raw.by_ref().take(len as u64).read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Read one submission's content from any source, typed by format.
pub(crate) fn read_content(
    source: &mut dyn ArchiveSource,
    format: ContentFormat,
    id: &str,
) -> Result<SubmissionContent> {
    match format {
        ContentFormat::Markdown => {
            read_text(source, &format!("submissions/{id}/content.md")).map(SubmissionContent::Markdown)
        }
        ContentFormat::Pdf => source
            .read(&format!("submissions/{id}/content.pdf"))
            .map(SubmissionContent::Pdf),
        ContentFormat::Images => scan_pages(source, id).map(SubmissionContent::Images),
    }
}

/// Collect `pages/<n>.jpg` by scanning contiguous indices from 0; the scan
/// stops at the first missing index.
pub(crate) fn scan_pages(source: &mut dyn ArchiveSource, id: &str) -> Result<Vec<Vec<u8>>> {
    let mut pages = Vec::new();
    let mut i = 0u32;
    loop {
        let path = format!("submissions/{id}/pages/{i}.jpg");
        if !source.contains(&path) {
            break;
        }
        pages.push(source.read(&path)?);
        i += 1;
    }
    Ok(pages)
}
