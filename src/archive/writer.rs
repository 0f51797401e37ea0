//! Deterministic serialization of an in-memory archive
//!
//! [`plan_archive`] turns the facade's entity graph into the canonical
//! path-to-bytes layout, computes the content hash and creation timestamp,
//! and assembles the manifest from actual in-memory state (`has_rubric`,
//! `has_prompt`, and both attribute-name lists are derived, never caller
//! supplied). [`write_archive`] then emits every file into one zip in
//! lexicographic path order.

use crate::edf::Edf;
use crate::error::{EdfError, Result};
use crate::hash::content_hash;
use crate::models::{
    AdditionalDataDeclaration, Manifest, SubmissionContent, SubmissionCore, SubmissionIndex,
    TaskCore,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A fully serialized archive: file bytes plus the assembled manifest.
pub(crate) struct ArchivePlan {
    pub files: BTreeMap<String, Vec<u8>>,
    pub manifest: Manifest,
}

/// Serialize the entity graph under the given committed identity.
pub(crate) fn plan_archive(edf: &Edf, task_id: &str, version: u32) -> Result<ArchivePlan> {
    let submissions: Vec<_> = edf.submissions().collect();
    let content_format = submissions
        .first()
        .map(|s| s.content.format())
        .ok_or_else(|| EdfError::UserInput("cannot save an archive with no submissions".to_string()))?;

    // Attribute-name lists are derived from what is actually present.
    let task_attrs: Vec<String> = edf.task_data().keys().cloned().collect();
    let submission_attrs: Vec<String> = submissions
        .iter()
        .flat_map(|s| s.additional.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    let core = TaskCore {
        task_id: task_id.to_string(),
        version,
        max_grade: edf.max_grade(),
    };
    files.insert("task/core.json".to_string(), serde_json::to_vec_pretty(&core)?);

    if let Some(rubric) = edf.rubric() {
        files.insert("task/rubric.md".to_string(), rubric.as_bytes().to_vec());
    }
    if let Some(prompt) = edf.prompt() {
        files.insert("task/prompt.md".to_string(), prompt.as_bytes().to_vec());
    }
    if !edf.task_data().is_empty() {
        files.insert(
            "task/additional_data.json".to_string(),
            serde_json::to_vec_pretty(edf.task_data())?,
        );
    }

    let index = SubmissionIndex {
        submission_ids: edf.submission_ids().to_vec(),
    };
    files.insert(
        "submissions/_index.json".to_string(),
        serde_json::to_vec_pretty(&index)?,
    );

    for sub in &submissions {
        let base = format!("submissions/{}", sub.id);

        let core = SubmissionCore {
            submission_id: sub.id.clone(),
            grade: sub.grade,
            grade_distributions: sub.distributions.clone(),
        };
        files.insert(format!("{base}/core.json"), serde_json::to_vec_pretty(&core)?);

        if !submission_attrs.is_empty() {
            // Every declared attribute appears in every payload; absent
            // values are written as explicit nulls.
            let mut payload = Map::new();
            for attr in &submission_attrs {
                payload.insert(
                    attr.clone(),
                    sub.additional.get(attr).cloned().unwrap_or(Value::Null),
                );
            }
            files.insert(
                format!("{base}/additional_data.json"),
                serde_json::to_vec_pretty(&payload)?,
            );
        }

        match &sub.content {
            SubmissionContent::Markdown(text) => {
                files.insert(format!("{base}/content.md"), text.as_bytes().to_vec());
            }
            SubmissionContent::Pdf(bytes) => {
                files.insert(format!("{base}/content.pdf"), bytes.clone());
            }
            SubmissionContent::Images(pages) => {
                for (i, page) in pages.iter().enumerate() {
                    files.insert(format!("{base}/pages/{i}.jpg"), page.clone());
                }
            }
        }
    }

    let hash = content_hash(&files);
    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;

    let manifest = Manifest {
        edf_version: edf.edf_version().to_string(),
        task_id: task_id.to_string(),
        content_hash: hash,
        created_at,
        content_format,
        submission_count: submissions.len() as u32,
        has_rubric: edf.rubric().is_some(),
        has_prompt: edf.prompt().is_some(),
        additional_data: AdditionalDataDeclaration {
            task: task_attrs,
            submission: submission_attrs,
        },
    };
    files.insert("manifest.json".to_string(), manifest.to_json()?);

    Ok(ArchivePlan { files, manifest })
}

/// Write the planned files into one zip archive.
///
/// The `BTreeMap` iterates in lexicographic path order, which fixes the entry
/// order on disk.
pub(crate) fn write_archive(path: &Path, files: &BTreeMap<String, Vec<u8>>) -> Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (entry_path, bytes) in files {
        zip.start_file(entry_path.as_str(), options)?;
        zip.write_all(bytes)?;
    }
    zip.finish()?;
    debug!(entries = files.len(), path = %path.display(), "wrote archive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GradeDistributions;
    use serde_json::json;

    fn sample_edf() -> Edf {
        let mut edf = Edf::new(1);
        edf.set_rubric(Some("# Criteria".to_string()));
        edf.add_submission_with_data(
            "s1",
            1,
            GradeDistributions::new(vec![0.0, 1.0], vec![0.0, 1.0], vec![0.5, 0.5]),
            SubmissionContent::Markdown("Answer".to_string()),
            [("student_name".to_string(), json!("Ada"))].into_iter().collect(),
        )
        .unwrap();
        edf.add_submission(
            "s2",
            0,
            GradeDistributions::new(vec![1.0, 0.0], vec![1.0, 0.0], vec![0.5, 0.5]),
            SubmissionContent::Markdown("Other".to_string()),
        )
        .unwrap();
        edf
    }

    #[test]
    fn test_manifest_derived_from_state() {
        let edf = sample_edf();
        let plan = plan_archive(&edf, "e58ed763-928c-4155-bee9-fdbaaadc15f3", 1).unwrap();
        assert!(plan.manifest.has_rubric);
        assert!(!plan.manifest.has_prompt);
        assert_eq!(plan.manifest.submission_count, 2);
        assert_eq!(
            plan.manifest.additional_data.submission,
            vec!["student_name".to_string()]
        );
        assert!(plan.manifest.additional_data.task.is_empty());
    }

    #[test]
    fn test_absent_declared_attribute_written_as_null() {
        let edf = sample_edf();
        let plan = plan_archive(&edf, "e58ed763-928c-4155-bee9-fdbaaadc15f3", 1).unwrap();
        let payload: Map<String, Value> =
            serde_json::from_slice(&plan.files["submissions/s2/additional_data.json"]).unwrap();
        assert_eq!(payload["student_name"], Value::Null);
    }

    #[test]
    fn test_plan_hash_stable_across_runs() {
        let edf = sample_edf();
        let a = plan_archive(&edf, "e58ed763-928c-4155-bee9-fdbaaadc15f3", 1).unwrap();
        let b = plan_archive(&edf, "e58ed763-928c-4155-bee9-fdbaaadc15f3", 1).unwrap();
        assert_eq!(a.manifest.content_hash, b.manifest.content_hash);
    }

    #[test]
    fn test_empty_save_rejected() {
        let edf = Edf::new(5);
        assert!(matches!(
            plan_archive(&edf, "e58ed763-928c-4155-bee9-fdbaaadc15f3", 1),
            Err(EdfError::UserInput(_))
        ));
    }
}
