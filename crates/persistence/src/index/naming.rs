//! Deterministic index and alias names.
//!
//! Concrete indices carry the schema version:
//!
//! ```text
//! {prefix}-{version}-projects
//! {prefix}-{version}-{projectId}-occurrences
//! {prefix}-{version}-{projectId}-notes
//! ```
//!
//! Aliases drop the version so that callers never observe a migration:
//!
//! ```text
//! {prefix}-projects
//! {prefix}-{projectId}-occurrences
//! {prefix}-{projectId}-notes
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::SearchError;

use super::DocumentKind;

/// Default prefix shared by every index of a deployment.
pub const DEFAULT_INDEX_PREFIX: &str = "grafeas";

/// Longest index name the engine accepts, in bytes.
const MAX_INDEX_NAME_BYTES: usize = 255;

/// Project ids become part of index names, so they must be valid index-name fragments.
static PROJECT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("valid project id pattern"));

/// Components recovered from a concrete index name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNameParts {
    /// Schema version segment.
    pub version: String,
    /// Owning project, absent for the projects index.
    pub project_id: Option<String>,
    /// Document kind from the final segment.
    pub kind: DocumentKind,
}

/// Builds and parses names under a fixed deployment prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNaming {
    prefix: String,
}

impl Default for IndexNaming {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_PREFIX)
    }
}

impl IndexNaming {
    /// Creates a naming scheme for the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the deployment prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the concrete index name for a kind at a version.
    ///
    /// `project_id` is ignored for [`DocumentKind::Project`].
    pub fn index_name(&self, kind: DocumentKind, version: &str, project_id: Option<&str>) -> String {
        match project_id.filter(|_| kind.is_project_scoped()) {
            Some(project_id) => format!(
                "{}-{}-{}-{}",
                self.prefix,
                version,
                project_id,
                kind.collection()
            ),
            None => format!("{}-{}-{}", self.prefix, version, kind.collection()),
        }
    }

    /// Returns the version-independent alias name for a kind.
    pub fn alias_name(&self, kind: DocumentKind, project_id: Option<&str>) -> String {
        match project_id.filter(|_| kind.is_project_scoped()) {
            Some(project_id) => format!("{}-{}-{}", self.prefix, project_id, kind.collection()),
            None => format!("{}-{}", self.prefix, kind.collection()),
        }
    }

    /// Parses a concrete index name created under this prefix.
    ///
    /// Returns `None` when the name does not carry this prefix or its final
    /// segment is not a known document kind. The project id is everything
    /// between the version and the kind and may itself contain hyphens.
    pub fn parse(&self, index_name: &str) -> Option<IndexNameParts> {
        let rest = index_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('-')?;
        let (body, collection) = rest.rsplit_once('-')?;
        let kind = DocumentKind::from_collection(collection)?;

        match kind {
            DocumentKind::Project => {
                let version = body.split('-').next().unwrap_or(body);
                (!version.is_empty()).then(|| IndexNameParts {
                    version: version.to_string(),
                    project_id: None,
                    kind,
                })
            }
            DocumentKind::Occurrence | DocumentKind::Note => {
                let (version, project_id) = body.split_once('-')?;
                if version.is_empty() || project_id.is_empty() {
                    return None;
                }
                Some(IndexNameParts {
                    version: version.to_string(),
                    project_id: Some(project_id.to_string()),
                    kind,
                })
            }
        }
    }
}

/// Checks that a project id can be embedded in index and alias names.
pub fn validate_project_id(project_id: &str) -> Result<(), SearchError> {
    let invalid = |message: &str| SearchError::InvalidIdentifier {
        what: "project id",
        value: project_id.to_string(),
        message: message.to_string(),
    };

    if project_id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if project_id.len() > MAX_INDEX_NAME_BYTES {
        return Err(invalid("is too long"));
    }
    if !PROJECT_ID_PATTERN.is_match(project_id) {
        return Err(invalid(
            "must contain only lowercase letters, digits, '-', '_' or '.' and start with a letter or digit",
        ));
    }
    Ok(())
}
