//! Lazy reader accessors and byte-range serving

use edf::{ContentFormat, Edf, EdfError, EdfReader, GradeDistributions, SubmissionContent};
use std::path::Path;

fn peaked_distributions(max_grade: u32, peak: u32) -> GradeDistributions {
    let mut v = vec![0.0; max_grade as usize + 1];
    v[peak as usize] = 1.0;
    GradeDistributions::new(v.clone(), v.clone(), v)
}

fn write_markdown_sample(path: &Path) {
    let mut edf = Edf::new(10);
    edf.set_rubric(Some("# Rubric".to_string()));
    for (id, grade) in [("s1", 7), ("s2", 9)] {
        edf.add_submission(
            id,
            grade,
            peaked_distributions(10, grade),
            SubmissionContent::Markdown(format!("answer from {id}")),
        )
        .unwrap();
    }
    edf.save(path).unwrap();
}

#[test]
fn test_summary_accessors_without_content_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.edf");
    write_markdown_sample(&path);

    let reader = EdfReader::open(&path, true).unwrap();
    assert_eq!(reader.version(), 1);
    assert_eq!(reader.max_grade(), 10);
    assert_eq!(reader.content_format(), ContentFormat::Markdown);
    assert_eq!(reader.submission_count(), 2);
    assert_eq!(reader.submission_ids(), &["s1", "s2"]);
    assert!(reader.manifest().has_rubric);
    assert!(!reader.manifest().has_prompt);
}

#[test]
fn test_lazy_submission_and_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.edf");
    write_markdown_sample(&path);

    let mut reader = EdfReader::open(&path, true).unwrap();
    let record = reader.submission("s2").unwrap();
    assert_eq!(record.grade(), 9);
    assert_eq!(record.core.grade_distributions.expected.len(), 11);

    assert_eq!(
        reader.content_markdown("s2").unwrap().as_deref(),
        Some("answer from s2")
    );
    assert_eq!(reader.rubric().unwrap().as_deref(), Some("# Rubric"));
    assert_eq!(reader.prompt().unwrap(), None);
}

#[test]
fn test_typed_content_mismatch_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.edf");
    write_markdown_sample(&path);

    let mut reader = EdfReader::open(&path, true).unwrap();
    assert_eq!(reader.content_pdf("s1").unwrap(), None);
    assert_eq!(reader.content_images("s1").unwrap(), None);
}

#[test]
fn test_unknown_submission_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.edf");
    write_markdown_sample(&path);

    let mut reader = EdfReader::open(&path, true).unwrap();
    let err = reader.submission("nobody").unwrap_err();
    assert!(matches!(err, EdfError::UserInput(_)));
}

#[test]
fn test_byte_range_serving() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.edf");
    write_markdown_sample(&path);

    let mut reader = EdfReader::open(&path, true).unwrap();
    let len = reader.archive_len();
    assert!(len > 0);

    // Zip local-file-header magic at offset 0.
    let head = reader.read_byte_range(0, 4).unwrap();
    assert_eq!(head, b"PK\x03\x04");

    // Ranges get truncated at EOF instead of failing.
    let tail = reader.read_byte_range(len - 2, 100).unwrap();
    assert_eq!(tail.len(), 2);
    assert!(reader.read_byte_range(len, 10).unwrap().is_empty());

    // Chunked reads reassemble the whole file.
    let mut reassembled = Vec::new();
    let mut offset = 0;
    loop {
        let chunk = reader.read_byte_range(offset, 512).unwrap();
        if chunk.is_empty() {
            break;
        }
        offset += chunk.len() as u64;
        reassembled.extend(chunk);
    }
    assert_eq!(reassembled.len() as u64, len);
    assert_eq!(reassembled, std::fs::read(&path).unwrap());
}

#[test]
fn test_images_paging_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scans.edf");

    // 11 pages so lexicographic entry order (10 before 2) would scramble them.
    let pages: Vec<Vec<u8>> = (0u8..11).map(|n| vec![0xff, 0xd8, n]).collect();
    let mut edf = Edf::new(5);
    edf.add_submission(
        "s1",
        3,
        peaked_distributions(5, 3),
        SubmissionContent::Images(pages.clone()),
    )
    .unwrap();
    edf.save(&path).unwrap();

    let mut reader = EdfReader::open(&path, true).unwrap();
    assert_eq!(reader.content_format(), ContentFormat::Images);
    assert_eq!(reader.content_images("s1").unwrap(), Some(pages));
}
