//! Listing/read access to an archive's files
//!
//! [`ArchiveSource`] is the seam between the validators/loaders and the two
//! physical layouts an EDF can live in: a zip file or an equivalent unzipped
//! directory tree. Paths always use forward slashes relative to the archive
//! root, and directory entries are never listed.

use crate::error::{EdfError, Result};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::ZipArchive;

/// Path-addressed access to an archive's file set.
pub trait ArchiveSource {
    /// All file paths, sorted lexicographically.
    fn names(&self) -> &[String];

    /// Read one file's bytes. Missing paths are a [`EdfError::Structure`].
    fn read(&mut self, path: &str) -> Result<Vec<u8>>;

    fn contains(&self, path: &str) -> bool {
        self.names().binary_search_by(|n| n.as_str().cmp(path)).is_ok()
    }
}

/// Zip-backed source; holds the underlying file open for its lifetime.
#[derive(Debug)]
pub struct ZipSource {
    archive: ZipArchive<File>,
    names: Vec<String>,
}

impl ZipSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file)?;

        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .map(str::to_string)
            .collect();
        names.sort();

        Ok(Self { archive, names })
    }
}

impl ArchiveSource for ZipSource {
    fn names(&self) -> &[String] {
        &self.names
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut entry = match self.archive.by_name(path) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(EdfError::Structure(format!(
                    "missing file in archive: {path}"
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Directory-backed source over an unzipped archive tree.
pub struct DirSource {
    root: PathBuf,
    names: Vec<String>,
}

impl DirSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(EdfError::Structure(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        let mut names = Vec::new();
        walk(&root, &root, &mut names)?;
        names.sort();
        Ok(Self { root, names })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArchiveSource for DirSource {
    fn names(&self) -> &[String] {
        &self.names
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path);
        std::fs::read(&full).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EdfError::Structure(format!("missing file in archive: {path}"))
            } else {
                e.into()
            }
        })
    }
}

fn walk(root: &Path, dir: &Path, names: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, names)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            names.push(name);
        }
    }
    Ok(())
}

/// Read and decode one JSON file, reporting parse failures with path context.
pub(crate) fn read_json<T: DeserializeOwned>(
    source: &mut dyn ArchiveSource,
    path: &str,
) -> Result<T> {
    let data = source.read(path)?;
    serde_json::from_slice(&data)
        .map_err(|e| EdfError::Schema(format!("failed to parse {path}: {e}")))
}

/// Read one file as UTF-8 text.
pub(crate) fn read_text(source: &mut dyn ArchiveSource, path: &str) -> Result<String> {
    let data = source.read(path)?;
    String::from_utf8(data).map_err(|_| EdfError::Schema(format!("{path} is not valid UTF-8")))
}
