//! Core storage traits.
//!
//! - [`ProjectStorage`] - Projects and their index lifecycle
//! - [`NoteStorage`] - Notes, including batch creation and note occurrences
//! - [`OccurrenceStorage`] - Occurrences
//! - [`GrafeasStorage`] - All of the above
//!
//! # Example
//!
//! ```ignore
//! use grafeas_persistence::core::NoteStorage;
//! use grafeas_persistence::types::{Note, NoteKind, PageRequest};
//!
//! async fn example<S: NoteStorage>(storage: &S) -> grafeas_persistence::StorageResult<()> {
//!     let note = Note {
//!         kind: NoteKind::Vulnerability,
//!         short_description: "CVE-2024-0001".to_string(),
//!         ..Default::default()
//!     };
//!     let created = storage.create_note("acme", "cve-2024-0001", note).await?;
//!     assert_eq!(created.name, "projects/acme/notes/cve-2024-0001");
//!
//!     let page = storage
//!         .list_notes("acme", "kind == \"VULNERABILITY\"", &PageRequest::first(50))
//!         .await?;
//!     println!("{} notes", page.len());
//!     Ok(())
//! }
//! ```

mod storage;

pub use storage::{GrafeasStorage, NoteStorage, OccurrenceStorage, ProjectStorage};
