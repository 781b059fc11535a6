//! Document fixtures.

use grafeas_persistence::types::{
    ContentHash, Note, NoteKind, Occurrence, Project, Resource, note_name, parse_occurrence_name,
};
use serde_json::json;

/// A vulnerability note with a short description.
pub fn vulnerability_note(short_description: &str) -> Note {
    Note {
        short_description: short_description.to_string(),
        long_description: format!("{short_description} (details)"),
        kind: NoteKind::Vulnerability,
        details: json!({"severity": "HIGH", "cvssScore": 7.5}),
        ..Default::default()
    }
}

/// A build note.
pub fn build_note() -> Note {
    Note {
        short_description: "Build provenance".to_string(),
        kind: NoteKind::Build,
        ..Default::default()
    }
}

/// An occurrence of `projects/{note_project}/notes/{note_id}` on an image.
pub fn occurrence_of(note_project: &str, note_id: &str, image: &str) -> Occurrence {
    Occurrence {
        resource: Resource {
            uri: format!("https://gcr.io/acme/{image}@sha256:0123"),
            name: image.to_string(),
            content_hash: Some(ContentHash {
                hash_type: "SHA256".to_string(),
                value: "0123".to_string(),
            }),
        },
        note_name: note_name(note_project, note_id),
        kind: NoteKind::Vulnerability,
        remediation: "Upgrade".to_string(),
        ..Default::default()
    }
}

/// An empty project document.
pub fn project() -> Project {
    Project::default()
}

/// The occurrence id at the end of a server-assigned name.
pub fn occurrence_id(occurrence: &Occurrence) -> String {
    parse_occurrence_name(&occurrence.name)
        .map(|(_, id)| id.to_string())
        .expect("occurrence name")
}
