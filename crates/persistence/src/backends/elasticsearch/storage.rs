//! Storage trait implementations for [`ElasticsearchStorage`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::core::{NoteStorage, OccurrenceStorage, ProjectStorage};
use crate::error::{ResourceError, SearchError, StorageError, StorageResult};
use crate::index::{DocumentKind, validate_project_id};
use crate::query::Query;
use crate::store::BatchOutcome;
use crate::types::{
    Document, FieldMask, Note, Occurrence, Page, PageRequest, Project, Timestamped, note_name,
    occurrence_name, parse_note_name, project_name,
};

use super::ElasticsearchStorage;
use super::backend::validate_child_id;

#[async_trait]
impl ProjectStorage for ElasticsearchStorage {
    #[instrument(skip(self, project))]
    async fn create_project(&self, project_id: &str, mut project: Project) -> StorageResult<Project> {
        validate_project_id(project_id)?;
        let alias = self.registry().projects_alias();
        let name = project_name(project_id);
        self.ensure_absent::<Project>(&alias, &name).await?;

        project.set_name(name);
        self.client().create(&alias, &project).await?;

        for kind in [DocumentKind::Occurrence, DocumentKind::Note] {
            let info = self.registry().index_info(kind, Some(project_id));
            self.registry().create_index(&info, true).await?;
        }

        info!(name = %project.name, "Created project");
        Ok(project)
    }

    #[instrument(skip(self))]
    async fn get_project(&self, project_id: &str) -> StorageResult<Project> {
        validate_project_id(project_id)?;
        let hit = self
            .require::<Project>(&self.registry().projects_alias(), &project_name(project_id))
            .await?;
        Ok(hit.document)
    }

    #[instrument(skip(self, page))]
    async fn list_projects(&self, filter: &str, page: &PageRequest) -> StorageResult<Page<Project>> {
        self.list_documents(&self.registry().projects_alias(), filter, page, None)
            .await
    }

    #[instrument(skip(self))]
    async fn delete_project(&self, project_id: &str) -> StorageResult<()> {
        validate_project_id(project_id)?;
        self.delete_document(&self.registry().projects_alias(), &project_name(project_id))
            .await?;
        self.delete_project_indices(project_id).await?;
        info!("Deleted project");
        Ok(())
    }
}

#[async_trait]
impl NoteStorage for ElasticsearchStorage {
    #[instrument(skip(self, note))]
    async fn create_note(&self, project_id: &str, note_id: &str, mut note: Note) -> StorageResult<Note> {
        validate_project_id(project_id)?;
        validate_child_id("note id", note_id)?;
        let alias = self.registry().notes_alias(project_id);
        let name = note_name(project_id, note_id);
        self.ensure_absent::<Note>(&alias, &name).await?;

        note.set_name(name);
        note.default_create_time(Utc::now());
        self.client().create(&alias, &note).await?;
        Ok(note)
    }

    #[instrument(skip(self, notes), fields(count = notes.len()))]
    async fn batch_create_notes(
        &self,
        project_id: &str,
        notes: BTreeMap<String, Note>,
    ) -> StorageResult<BatchOutcome<Note>> {
        validate_project_id(project_id)?;
        if notes.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let alias = self.registry().notes_alias(project_id);

        let names: Vec<String> = notes
            .keys()
            .map(|note_id| note_name(project_id, note_id))
            .collect();
        let taken = self.existing_names::<Note>(&alias, &names).await?;

        let now = Utc::now();
        let mut rejected: Vec<StorageError> = Vec::new();
        let mut pending = Vec::with_capacity(notes.len());
        for (note_id, mut note) in notes {
            if let Err(e) = validate_child_id("note id", &note_id) {
                rejected.push(e.into());
                continue;
            }
            let name = note_name(project_id, &note_id);
            if taken.contains(&name) {
                rejected.push(
                    ResourceError::AlreadyExists {
                        kind: DocumentKind::Note,
                        name,
                    }
                    .into(),
                );
                continue;
            }
            note.set_name(name);
            note.default_create_time(now);
            pending.push(note);
        }

        Ok(self
            .client()
            .bulk_create(&alias, pending)
            .await
            .with_errors(rejected))
    }

    #[instrument(skip(self))]
    async fn get_note(&self, project_id: &str, note_id: &str) -> StorageResult<Note> {
        validate_project_id(project_id)?;
        let hit = self
            .require::<Note>(
                &self.registry().notes_alias(project_id),
                &note_name(project_id, note_id),
            )
            .await?;
        Ok(hit.document)
    }

    #[instrument(skip(self, page))]
    async fn list_notes(
        &self,
        project_id: &str,
        filter: &str,
        page: &PageRequest,
    ) -> StorageResult<Page<Note>> {
        validate_project_id(project_id)?;
        self.list_documents(&self.registry().notes_alias(project_id), filter, page, None)
            .await
    }

    #[instrument(skip(self, note, mask))]
    async fn update_note(
        &self,
        project_id: &str,
        note_id: &str,
        note: Note,
        mask: &FieldMask,
    ) -> StorageResult<Note> {
        validate_project_id(project_id)?;
        self.update_document(
            &self.registry().notes_alias(project_id),
            &note_name(project_id, note_id),
            note,
            mask,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_note(&self, project_id: &str, note_id: &str) -> StorageResult<()> {
        validate_project_id(project_id)?;
        self.delete_document(
            &self.registry().notes_alias(project_id),
            &note_name(project_id, note_id),
        )
        .await
    }

    #[instrument(skip(self, page))]
    async fn list_note_occurrences(
        &self,
        project_id: &str,
        note_id: &str,
        filter: &str,
        page: &PageRequest,
    ) -> StorageResult<Page<Occurrence>> {
        validate_project_id(project_id)?;
        let by_note = Query::term("noteName", note_name(project_id, note_id));
        self.list_documents(
            &self.registry().occurrences_alias(project_id),
            filter,
            page,
            Some(by_note),
        )
        .await
    }
}

#[async_trait]
impl OccurrenceStorage for ElasticsearchStorage {
    #[instrument(skip(self, occurrence))]
    async fn create_occurrence(
        &self,
        project_id: &str,
        mut occurrence: Occurrence,
    ) -> StorageResult<Occurrence> {
        validate_project_id(project_id)?;
        occurrence.set_name(occurrence_name(project_id, &Uuid::new_v4().to_string()));
        occurrence.default_create_time(Utc::now());
        self.client()
            .create(&self.registry().occurrences_alias(project_id), &occurrence)
            .await?;
        Ok(occurrence)
    }

    #[instrument(skip(self, occurrences), fields(count = occurrences.len()))]
    async fn batch_create_occurrences(
        &self,
        project_id: &str,
        occurrences: Vec<Occurrence>,
    ) -> StorageResult<BatchOutcome<Occurrence>> {
        validate_project_id(project_id)?;
        let now = Utc::now();
        let pending: Vec<Occurrence> = occurrences
            .into_iter()
            .map(|mut occurrence| {
                occurrence.set_name(occurrence_name(project_id, &Uuid::new_v4().to_string()));
                occurrence.default_create_time(now);
                occurrence
            })
            .collect();
        Ok(self
            .client()
            .bulk_create(&self.registry().occurrences_alias(project_id), pending)
            .await)
    }

    #[instrument(skip(self))]
    async fn get_occurrence(&self, project_id: &str, occurrence_id: &str) -> StorageResult<Occurrence> {
        validate_project_id(project_id)?;
        let hit = self
            .require::<Occurrence>(
                &self.registry().occurrences_alias(project_id),
                &occurrence_name(project_id, occurrence_id),
            )
            .await?;
        Ok(hit.document)
    }

    #[instrument(skip(self, page))]
    async fn list_occurrences(
        &self,
        project_id: &str,
        filter: &str,
        page: &PageRequest,
    ) -> StorageResult<Page<Occurrence>> {
        validate_project_id(project_id)?;
        self.list_documents(
            &self.registry().occurrences_alias(project_id),
            filter,
            page,
            None,
        )
        .await
    }

    #[instrument(skip(self, occurrence, mask))]
    async fn update_occurrence(
        &self,
        project_id: &str,
        occurrence_id: &str,
        occurrence: Occurrence,
        mask: &FieldMask,
    ) -> StorageResult<Occurrence> {
        validate_project_id(project_id)?;
        self.update_document(
            &self.registry().occurrences_alias(project_id),
            &occurrence_name(project_id, occurrence_id),
            occurrence,
            mask,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_occurrence(&self, project_id: &str, occurrence_id: &str) -> StorageResult<()> {
        validate_project_id(project_id)?;
        self.delete_document(
            &self.registry().occurrences_alias(project_id),
            &occurrence_name(project_id, occurrence_id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_occurrence_note(&self, project_id: &str, occurrence_id: &str) -> StorageResult<Note> {
        let occurrence = self.get_occurrence(project_id, occurrence_id).await?;
        let (note_project, note_id) =
            parse_note_name(&occurrence.note_name).ok_or_else(|| SearchError::InvalidIdentifier {
                what: "note name",
                value: occurrence.note_name.clone(),
                message: "expected projects/{project}/notes/{note}".to_string(),
            })?;
        self.get_note(note_project, note_id).await
    }
}
