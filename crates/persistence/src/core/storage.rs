//! Grafeas storage traits.
//!
//! These traits are the contract between the API layer and a storage
//! backend. Every operation is scoped by a project id; names follow the
//! Grafeas resource name scheme (`projects/{pid}`, `projects/{pid}/notes/{nid}`,
//! `projects/{pid}/occurrences/{oid}`).

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::store::BatchOutcome;
use crate::types::{FieldMask, Note, Occurrence, Page, PageRequest, Project};

/// Storage of projects.
///
/// A project owns one occurrences index and one notes index; creating a
/// project creates both, deleting it removes both together with everything
/// stored in them.
#[async_trait]
pub trait ProjectStorage: Send + Sync {
    /// Creates a project.
    ///
    /// # Arguments
    ///
    /// * `project_id` - The project id; must be usable as an index name fragment
    /// * `project` - The project; its name is set to `projects/{project_id}`
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(AlreadyExists)` - If the project exists
    /// * `StorageError::Search(InvalidIdentifier)` - If the project id is invalid
    async fn create_project(&self, project_id: &str, project: Project) -> StorageResult<Project>;

    /// Reads a project.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the project does not exist
    async fn get_project(&self, project_id: &str) -> StorageResult<Project>;

    /// Lists projects matching `filter`.
    ///
    /// # Errors
    ///
    /// * `StorageError::Search(InvalidFilter)` - If the filter does not compile
    /// * `StorageError::Search(InvalidPageToken)` - If the page token is not one of ours
    async fn list_projects(&self, filter: &str, page: &PageRequest) -> StorageResult<Page<Project>>;

    /// Deletes a project and both of its indices.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NothingDeleted)` - If the project does not exist
    async fn delete_project(&self, project_id: &str) -> StorageResult<()>;
}

/// Storage of notes.
#[async_trait]
pub trait NoteStorage: Send + Sync {
    /// Creates a note under a caller-chosen id.
    ///
    /// The name is set from the ids and `createTime` defaults to now.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(AlreadyExists)` - If a note with that name exists
    async fn create_note(&self, project_id: &str, note_id: &str, note: Note) -> StorageResult<Note>;

    /// Creates many notes with one bulk request, keyed by note id.
    ///
    /// Notes whose name is already taken are reported as `AlreadyExists`
    /// errors; the rest are written. Per-item failures never fail the call.
    async fn batch_create_notes(
        &self,
        project_id: &str,
        notes: BTreeMap<String, Note>,
    ) -> StorageResult<BatchOutcome<Note>>;

    /// Reads a note.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the note does not exist
    async fn get_note(&self, project_id: &str, note_id: &str) -> StorageResult<Note>;

    /// Lists the notes of a project matching `filter`.
    async fn list_notes(
        &self,
        project_id: &str,
        filter: &str,
        page: &PageRequest,
    ) -> StorageResult<Page<Note>>;

    /// Updates a note.
    ///
    /// With an empty `mask` the note is replaced; otherwise only the masked
    /// paths are copied from `note`. `name` and `createTime` never change and
    /// `updateTime` is set to now.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the note does not exist
    async fn update_note(
        &self,
        project_id: &str,
        note_id: &str,
        note: Note,
        mask: &FieldMask,
    ) -> StorageResult<Note>;

    /// Deletes a note.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NothingDeleted)` - If the note does not exist
    async fn delete_note(&self, project_id: &str, note_id: &str) -> StorageResult<()>;

    /// Lists the occurrences in the note's project that reference the note.
    async fn list_note_occurrences(
        &self,
        project_id: &str,
        note_id: &str,
        filter: &str,
        page: &PageRequest,
    ) -> StorageResult<Page<Occurrence>>;
}

/// Storage of occurrences.
#[async_trait]
pub trait OccurrenceStorage: Send + Sync {
    /// Creates an occurrence under a server-generated id.
    ///
    /// Any name on the input is overwritten.
    async fn create_occurrence(
        &self,
        project_id: &str,
        occurrence: Occurrence,
    ) -> StorageResult<Occurrence>;

    /// Creates many occurrences with one bulk request.
    async fn batch_create_occurrences(
        &self,
        project_id: &str,
        occurrences: Vec<Occurrence>,
    ) -> StorageResult<BatchOutcome<Occurrence>>;

    /// Reads an occurrence.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the occurrence does not exist
    async fn get_occurrence(&self, project_id: &str, occurrence_id: &str) -> StorageResult<Occurrence>;

    /// Lists the occurrences of a project matching `filter`.
    async fn list_occurrences(
        &self,
        project_id: &str,
        filter: &str,
        page: &PageRequest,
    ) -> StorageResult<Page<Occurrence>>;

    /// Updates an occurrence; see [`NoteStorage::update_note`] for mask semantics.
    async fn update_occurrence(
        &self,
        project_id: &str,
        occurrence_id: &str,
        occurrence: Occurrence,
        mask: &FieldMask,
    ) -> StorageResult<Occurrence>;

    /// Deletes an occurrence.
    async fn delete_occurrence(&self, project_id: &str, occurrence_id: &str) -> StorageResult<()>;

    /// Reads the note an occurrence refers to, possibly in another project.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the occurrence or the note does not exist
    /// * `StorageError::Search(InvalidIdentifier)` - If `noteName` is malformed
    async fn get_occurrence_note(&self, project_id: &str, occurrence_id: &str) -> StorageResult<Note>;
}

/// Everything the Grafeas API needs from storage.
pub trait GrafeasStorage: ProjectStorage + NoteStorage + OccurrenceStorage {}

impl<T: ProjectStorage + NoteStorage + OccurrenceStorage> GrafeasStorage for T {}
