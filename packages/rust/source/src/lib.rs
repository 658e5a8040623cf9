//! Book sources: object-storage fetch and chapter extraction.
//!
//! - [`HttpObjectStore`] resolves `s3://bucket/key` locators over HTTP
//! - [`ChapterHeadingExtractor`] splits plain text into chapters by heading

mod extractor;
mod object_store;

pub use extractor::{ChapterHeadingExtractor, split_chapters};
pub use object_store::{HttpObjectStore, ObjectStoreOptions};
