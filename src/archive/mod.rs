pub(crate) mod reader;
pub(crate) mod source;
pub(crate) mod writer;

pub use reader::{EdfReader, SubmissionRecord};
pub use source::{ArchiveSource, DirSource, ZipSource};
