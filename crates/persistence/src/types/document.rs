//! Grafeas documents: projects, notes and occurrences.
//!
//! Documents serialize to the canonical camelCase JSON projection with every
//! field present; absent optionals become `null` and empty lists `[]`. The
//! kind-specific payload of notes and occurrences (vulnerability, build,
//! attestation, ...) is carried as free-form JSON in `details`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::DocumentKind;

/// Behavior shared by every stored document type.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The kind of index this document lives in.
    const KIND: DocumentKind;

    /// Returns the document's resource name.
    fn name(&self) -> &str;

    /// Sets the document's resource name.
    fn set_name(&mut self, name: String);
}

/// Documents carrying server-managed timestamps.
pub trait Timestamped {
    /// Returns the creation time.
    fn create_time(&self) -> Option<DateTime<Utc>>;

    /// Sets the creation time.
    fn set_create_time(&mut self, time: Option<DateTime<Utc>>);

    /// Sets the last update time.
    fn set_update_time(&mut self, time: Option<DateTime<Utc>>);

    /// Fills in the creation time if the caller left it empty.
    fn default_create_time(&mut self, now: DateTime<Utc>) {
        if self.create_time().is_none() {
            self.set_create_time(Some(now));
        }
    }
}

/// The kind of analysis a note or occurrence describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoteKind {
    /// Unknown kind.
    #[default]
    #[serde(rename = "NOTE_KIND_UNSPECIFIED")]
    Unspecified,
    /// A package vulnerability.
    Vulnerability,
    /// Build provenance.
    Build,
    /// A base image relationship.
    Image,
    /// A package installed in an image.
    Package,
    /// A deployment of an artifact.
    Deployment,
    /// Discovery status of other analyses.
    Discovery,
    /// An attestation authority.
    Attestation,
    /// An in-toto link.
    Intoto,
}

/// A Grafeas project, the owner of notes and occurrences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    /// `projects/{project_id}`.
    pub name: String,
}

impl Project {
    /// Creates a project with the resource name for `project_id`.
    pub fn new(project_id: &str) -> Self {
        Self {
            name: project_name(project_id),
        }
    }
}

/// A link related to a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelatedUrl {
    /// The URL.
    pub url: String,
    /// A label for the URL.
    pub label: String,
}

/// A digest of the resource an occurrence applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentHash {
    /// Hash algorithm, e.g. `SHA256`.
    #[serde(rename = "type")]
    pub hash_type: String,
    /// Hash value.
    pub value: String,
}

/// The resource an occurrence applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resource {
    /// Unique URI of the resource, e.g. `https://gcr.io/project/image@sha256:...`.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Digest of the resource.
    pub content_hash: Option<ContentHash>,
}

/// A high-level description of a type of analysis result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Note {
    /// `projects/{project_id}/notes/{note_id}`.
    pub name: String,
    /// One sentence description.
    pub short_description: String,
    /// Detailed description.
    pub long_description: String,
    /// Kind of the note.
    pub kind: NoteKind,
    /// Related links.
    pub related_url: Vec<RelatedUrl>,
    /// After this time the note is considered stale.
    pub expiration_time: Option<DateTime<Utc>>,
    /// Set when the note is created.
    pub create_time: Option<DateTime<Utc>>,
    /// Set when the note is updated.
    pub update_time: Option<DateTime<Utc>>,
    /// Names of related notes.
    pub related_note_names: Vec<String>,
    /// Kind-specific payload.
    pub details: Value,
}

/// An instance of a note applied to a specific resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Occurrence {
    /// `projects/{project_id}/occurrences/{occurrence_id}`, assigned by the server.
    pub name: String,
    /// The resource this occurrence applies to.
    pub resource: Resource,
    /// Name of the note this occurrence instantiates.
    pub note_name: String,
    /// Kind of the occurrence, matching its note.
    pub kind: NoteKind,
    /// How to remediate the problem described.
    pub remediation: String,
    /// Set when the occurrence is created.
    pub create_time: Option<DateTime<Utc>>,
    /// Set when the occurrence is updated.
    pub update_time: Option<DateTime<Utc>>,
    /// Kind-specific payload.
    pub details: Value,
}

impl Document for Project {
    const KIND: DocumentKind = DocumentKind::Project;

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Document for Note {
    const KIND: DocumentKind = DocumentKind::Note;

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Document for Occurrence {
    const KIND: DocumentKind = DocumentKind::Occurrence;

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Timestamped for Note {
    fn create_time(&self) -> Option<DateTime<Utc>> {
        self.create_time
    }

    fn set_create_time(&mut self, time: Option<DateTime<Utc>>) {
        self.create_time = time;
    }

    fn set_update_time(&mut self, time: Option<DateTime<Utc>>) {
        self.update_time = time;
    }
}

impl Timestamped for Occurrence {
    fn create_time(&self) -> Option<DateTime<Utc>> {
        self.create_time
    }

    fn set_create_time(&mut self, time: Option<DateTime<Utc>>) {
        self.create_time = time;
    }

    fn set_update_time(&mut self, time: Option<DateTime<Utc>>) {
        self.update_time = time;
    }
}

/// Returns `projects/{project_id}`.
pub fn project_name(project_id: &str) -> String {
    format!("projects/{project_id}")
}

/// Returns `projects/{project_id}/notes/{note_id}`.
pub fn note_name(project_id: &str, note_id: &str) -> String {
    format!("projects/{project_id}/notes/{note_id}")
}

/// Returns `projects/{project_id}/occurrences/{occurrence_id}`.
pub fn occurrence_name(project_id: &str, occurrence_id: &str) -> String {
    format!("projects/{project_id}/occurrences/{occurrence_id}")
}

/// Splits `projects/{project_id}/notes/{note_id}` into its ids.
pub fn parse_note_name(name: &str) -> Option<(&str, &str)> {
    parse_child_name(name, "notes")
}

/// Splits `projects/{project_id}/occurrences/{occurrence_id}` into its ids.
pub fn parse_occurrence_name(name: &str) -> Option<(&str, &str)> {
    parse_child_name(name, "occurrences")
}

fn parse_child_name<'a>(name: &'a str, collection: &str) -> Option<(&'a str, &'a str)> {
    let mut segments = name.split('/');
    match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some("projects"), Some(project_id), Some(kind), Some(id), None)
            if kind == collection && !project_id.is_empty() && !id.is_empty() =>
        {
            Some((project_id, id))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_note_serializes_every_field() {
        let note = Note {
            name: note_name("p1", "cve-1"),
            kind: NoteKind::Vulnerability,
            ..Default::default()
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["name"], "projects/p1/notes/cve-1");
        assert_eq!(value["kind"], "VULNERABILITY");
        assert_eq!(value["relatedUrl"], json!([]));
        assert_eq!(value["relatedNoteNames"], json!([]));
        assert!(value["expirationTime"].is_null());
        assert!(value["createTime"].is_null());
        assert!(value.get("shortDescription").is_some());
        assert!(value.get("details").is_some());
    }

    #[test]
    fn test_occurrence_round_trip() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let occurrence = Occurrence {
            name: occurrence_name("p1", "abc"),
            resource: Resource {
                uri: "https://registry.example.com/app@sha256:1234".to_string(),
                name: String::new(),
                content_hash: Some(ContentHash {
                    hash_type: "SHA256".to_string(),
                    value: "1234".to_string(),
                }),
            },
            note_name: note_name("p1", "cve-1"),
            kind: NoteKind::Vulnerability,
            remediation: "upgrade".to_string(),
            create_time: Some(created),
            update_time: None,
            details: json!({"vulnerability": {"severity": "HIGH"}}),
        };
        let value = serde_json::to_value(&occurrence).unwrap();
        assert_eq!(value["noteName"], "projects/p1/notes/cve-1");
        assert_eq!(value["resource"]["contentHash"]["type"], "SHA256");
        let back: Occurrence = serde_json::from_value(value).unwrap();
        assert_eq!(back, occurrence);
    }

    #[test]
    fn test_missing_fields_default() {
        let note: Note = serde_json::from_value(json!({"name": "projects/p/notes/n"})).unwrap();
        assert_eq!(note.kind, NoteKind::Unspecified);
        assert!(note.related_url.is_empty());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            parse_note_name("projects/p1/notes/n1"),
            Some(("p1", "n1"))
        );
        assert_eq!(
            parse_occurrence_name("projects/p-1/occurrences/o1"),
            Some(("p-1", "o1"))
        );
        assert_eq!(parse_note_name("projects/p1/occurrences/o1"), None);
        assert_eq!(parse_note_name("projects//notes/n1"), None);
        assert_eq!(parse_note_name("projects/p1/notes/n1/extra"), None);
        assert_eq!(parse_note_name("notes/n1"), None);
    }

    #[test]
    fn test_default_create_time_keeps_existing() {
        let earlier = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let now = Utc::now();
        let mut note = Note {
            create_time: Some(earlier),
            ..Default::default()
        };
        note.default_create_time(now);
        assert_eq!(note.create_time, Some(earlier));

        let mut fresh = Occurrence::default();
        fresh.default_create_time(now);
        assert_eq!(fresh.create_time, Some(now));
    }
}
