//! Document kinds stored by the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MappingError;

/// The closed set of document kinds, one index family per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Project documents, one shared index.
    Project,
    /// Occurrence documents, one index per project.
    Occurrence,
    /// Note documents, one index per project.
    Note,
}

impl DocumentKind {
    /// Every document kind.
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::Project,
        DocumentKind::Occurrence,
        DocumentKind::Note,
    ];

    /// Returns the plural collection name used in index names and mapping file names.
    pub fn collection(&self) -> &'static str {
        match self {
            DocumentKind::Project => "projects",
            DocumentKind::Occurrence => "occurrences",
            DocumentKind::Note => "notes",
        }
    }

    /// Looks up a kind by its collection name.
    pub fn from_collection(name: &str) -> Option<Self> {
        match name {
            "projects" => Some(DocumentKind::Project),
            "occurrences" => Some(DocumentKind::Occurrence),
            "notes" => Some(DocumentKind::Note),
            _ => None,
        }
    }

    /// Returns true if indices of this kind are scoped to a single project.
    pub fn is_project_scoped(&self) -> bool {
        !matches!(self, DocumentKind::Project)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Project => write!(f, "project"),
            DocumentKind::Occurrence => write!(f, "occurrence"),
            DocumentKind::Note => write!(f, "note"),
        }
    }
}

impl FromStr for DocumentKind {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_collection(s).ok_or_else(|| MappingError::UnrecognizedKind {
            name: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names_round_trip() {
        for kind in DocumentKind::ALL {
            assert_eq!(DocumentKind::from_collection(kind.collection()), Some(kind));
        }
    }

    #[test]
    fn test_from_str_rejects_unknown_kind() {
        let err = "widgets".parse::<DocumentKind>().unwrap_err();
        assert_eq!(err.to_string(), "unrecognized document kind mapping: widgets");
        assert!("occurrences".parse::<DocumentKind>().is_ok());
        // singular display names are not collection names
        assert!("note".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_project_scope() {
        assert!(!DocumentKind::Project.is_project_scoped());
        assert!(DocumentKind::Note.is_project_scoped());
        assert!(DocumentKind::Occurrence.is_project_scoped());
    }
}
