//! Core types for the persistence layer.
//!
//! - [`Project`], [`Note`], [`Occurrence`] - the stored documents
//! - [`FieldMask`] - partial update paths
//! - [`PageRequest`], [`Page`], [`PageCursor`] - pagination
//!
//! # Examples
//!
//! ```
//! use grafeas_persistence::types::{Note, NoteKind, note_name};
//!
//! let note = Note {
//!     name: note_name("my-project", "CVE-2024-0001"),
//!     short_description: "Heap overflow in libfoo".to_string(),
//!     kind: NoteKind::Vulnerability,
//!     ..Default::default()
//! };
//!
//! let json = serde_json::to_value(&note).unwrap();
//! assert_eq!(json["name"], "projects/my-project/notes/CVE-2024-0001");
//! assert_eq!(json["relatedUrl"], serde_json::json!([]));
//! ```
//!
//! ## Pagination
//!
//! ```
//! use grafeas_persistence::types::{PageCursor, PageRequest};
//!
//! let cursor = PageCursor::new("snapshot-id", "grafeas-projects", 20);
//! let request = PageRequest::next(20, cursor.encode());
//!
//! let decoded = PageCursor::decode(&request.page_token).unwrap();
//! assert_eq!(decoded.offset(), 20);
//! ```

mod document;
mod field_mask;
mod pagination;

pub use document::{
    ContentHash, Document, Note, NoteKind, Occurrence, Project, RelatedUrl, Resource, Timestamped,
    note_name, occurrence_name, parse_note_name, parse_occurrence_name, project_name,
};

pub use field_mask::FieldMask;

pub use pagination::{Page, PageCursor, PageRequest};
