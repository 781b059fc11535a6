//! Versioned mapping definitions, one per document kind.
//!
//! A mapping file is named after its kind's collection (`projects.json`,
//! `occurrences.json`, `notes.json`) and holds:
//!
//! ```json
//! { "version": "v1", "mappings": { "properties": { ... } } }
//! ```
//!
//! Where the files come from is a [`MappingSource`]: the filesystem in
//! production, the copies compiled into this crate by default, or anything a
//! test wants to hand in.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::MappingError;

use super::DocumentKind;

/// A schema version together with the engine mapping for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedMapping {
    /// Version segment embedded in index names.
    pub version: String,
    /// Engine mapping object sent when creating an index.
    pub mappings: Value,
}

impl VersionedMapping {
    /// Creates a versioned mapping.
    pub fn new(version: impl Into<String>, mappings: Value) -> Self {
        Self {
            version: version.into(),
            mappings,
        }
    }
}

/// One entry of a mapping directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// File name relative to the listed directory.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Read access to mapping definitions.
pub trait MappingSource: Send + Sync {
    /// Lists the entries of a directory.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<MappingEntry>>;

    /// Reads a file in full.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads mapping definitions from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMappingSource;

impl MappingSource for FsMappingSource {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<MappingEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            entries.push(MappingEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

const EMBEDDED_MAPPINGS: [(&str, &str); 3] = [
    ("notes.json", include_str!("../../mappings/notes.json")),
    (
        "occurrences.json",
        include_str!("../../mappings/occurrences.json"),
    ),
    ("projects.json", include_str!("../../mappings/projects.json")),
];

/// Serves the mapping files compiled into this crate, whatever directory is asked for.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedMappingSource;

impl MappingSource for EmbeddedMappingSource {
    fn list_files(&self, _dir: &Path) -> io::Result<Vec<MappingEntry>> {
        Ok(EMBEDDED_MAPPINGS
            .iter()
            .map(|(name, _)| MappingEntry {
                name: (*name).to_string(),
                is_dir: false,
            })
            .collect())
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let file_name = path.file_name().and_then(|name| name.to_str());
        EMBEDDED_MAPPINGS
            .iter()
            .find(|(name, _)| Some(*name) == file_name)
            .map(|(_, contents)| contents.as_bytes().to_vec())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no embedded mapping named {}", path.display()),
                )
            })
    }
}

/// A complete set of mappings: exactly one per document kind.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingSet {
    project: VersionedMapping,
    occurrence: VersionedMapping,
    note: VersionedMapping,
}

impl MappingSet {
    /// Builds a set from explicit mappings.
    pub fn new(
        project: VersionedMapping,
        occurrence: VersionedMapping,
        note: VersionedMapping,
    ) -> Self {
        Self {
            project,
            occurrence,
            note,
        }
    }

    /// Loads the mappings shipped with this crate.
    pub fn embedded() -> Result<Self, MappingError> {
        Self::load(&EmbeddedMappingSource, Path::new("mappings"))
    }

    /// Loads one mapping per document kind from `dir`.
    ///
    /// Sub-directories are skipped. A file whose base name is not a known
    /// collection, an unreadable file, invalid JSON, or a kind left without a
    /// mapping all fail the load.
    pub fn load(source: &dyn MappingSource, dir: &Path) -> Result<Self, MappingError> {
        let entries = source.list_files(dir).map_err(|e| MappingError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut loaded: BTreeMap<DocumentKind, VersionedMapping> = BTreeMap::new();
        for entry in entries {
            if entry.is_dir {
                debug!(entry = %entry.name, "Skipping directory in mappings source");
                continue;
            }

            let path: PathBuf = dir.join(&entry.name);
            let base_name = Path::new(&entry.name)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(entry.name.as_str());
            let kind: DocumentKind = base_name.parse()?;

            let contents = source.read_file(&path).map_err(|e| MappingError::Io {
                path: path.clone(),
                source: e,
            })?;
            let mapping: VersionedMapping =
                serde_json::from_slice(&contents).map_err(|e| MappingError::InvalidJson {
                    path: path.clone(),
                    source: e,
                })?;

            debug!(kind = %kind, version = %mapping.version, path = %path.display(), "Loaded mapping");
            loaded.insert(kind, mapping);
        }

        let mut take = |kind: DocumentKind| {
            loaded
                .remove(&kind)
                .ok_or(MappingError::MissingKind { kind })
        };
        let set = Self {
            project: take(DocumentKind::Project)?,
            occurrence: take(DocumentKind::Occurrence)?,
            note: take(DocumentKind::Note)?,
        };

        info!(
            projects = %set.project.version,
            occurrences = %set.occurrence.version,
            notes = %set.note.version,
            "Mappings loaded"
        );
        Ok(set)
    }

    /// Returns the mapping registered for a kind.
    pub fn get(&self, kind: DocumentKind) -> &VersionedMapping {
        match kind {
            DocumentKind::Project => &self.project,
            DocumentKind::Occurrence => &self.occurrence,
            DocumentKind::Note => &self.note,
        }
    }

    /// Returns the current version for a kind.
    pub fn version(&self, kind: DocumentKind) -> &str {
        &self.get(kind).version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeSource {
        entries: Vec<MappingEntry>,
        files: HashMap<PathBuf, Vec<u8>>,
        list_error: bool,
    }

    impl FakeSource {
        fn with_file(mut self, name: &str, contents: &str) -> Self {
            self.entries.push(MappingEntry {
                name: name.to_string(),
                is_dir: false,
            });
            self.files
                .insert(Path::new("maps").join(name), contents.as_bytes().to_vec());
            self
        }

        fn with_dir(mut self, name: &str) -> Self {
            self.entries.push(MappingEntry {
                name: name.to_string(),
                is_dir: true,
            });
            self
        }

        /// Lists `name` but fails to read it.
        fn with_unreadable(mut self, name: &str) -> Self {
            self.files.remove(&Path::new("maps").join(name));
            if !self.entries.iter().any(|entry| entry.name == name) {
                self.entries.push(MappingEntry {
                    name: name.to_string(),
                    is_dir: false,
                });
            }
            self
        }
    }

    impl MappingSource for FakeSource {
        fn list_files(&self, _dir: &Path) -> io::Result<Vec<MappingEntry>> {
            if self.list_error {
                return Err(io::Error::other("listing failed"));
            }
            Ok(self.entries.clone())
        }

        fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "missing"))
        }
    }

    fn mapping_json(version: &str) -> String {
        json!({"version": version, "mappings": {"properties": {"name": {"type": "keyword"}}}})
            .to_string()
    }

    fn full_source() -> FakeSource {
        FakeSource::default()
            .with_file("projects.json", &mapping_json("v1"))
            .with_file("occurrences.json", &mapping_json("v2"))
            .with_file("notes.json", &mapping_json("v3"))
    }

    #[test]
    fn test_load_complete_set() {
        let set = MappingSet::load(&full_source(), Path::new("maps")).unwrap();
        assert_eq!(set.version(DocumentKind::Project), "v1");
        assert_eq!(set.version(DocumentKind::Occurrence), "v2");
        assert_eq!(set.version(DocumentKind::Note), "v3");
        assert_eq!(
            set.get(DocumentKind::Note).mappings["properties"]["name"]["type"],
            "keyword"
        );
    }

    #[test]
    fn test_load_skips_directories() {
        let source = full_source().with_dir("archive");
        assert!(MappingSet::load(&source, Path::new("maps")).is_ok());
    }

    #[test]
    fn test_load_rejects_unknown_kind() {
        let source = full_source().with_file("widgets.json", &mapping_json("v1"));
        let err = MappingSet::load(&source, Path::new("maps")).unwrap_err();
        assert!(matches!(err, MappingError::UnrecognizedKind { ref name } if name == "widgets"));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let source = FakeSource::default()
            .with_file("projects.json", "{not json")
            .with_file("occurrences.json", &mapping_json("v1"))
            .with_file("notes.json", &mapping_json("v1"));
        let err = MappingSet::load(&source, Path::new("maps")).unwrap_err();
        assert!(matches!(err, MappingError::InvalidJson { .. }));
    }

    #[test]
    fn test_load_rejects_unreadable_file() {
        let source = FakeSource::default()
            .with_file("projects.json", &mapping_json("v1"))
            .with_file("occurrences.json", &mapping_json("v1"))
            .with_unreadable("notes.json");
        let err = MappingSet::load(&source, Path::new("maps")).unwrap_err();
        assert!(matches!(err, MappingError::Io { .. }));
    }

    #[test]
    fn test_load_rejects_missing_kind() {
        let source = FakeSource::default()
            .with_file("projects.json", &mapping_json("v1"))
            .with_file("notes.json", &mapping_json("v1"));
        let err = MappingSet::load(&source, Path::new("maps")).unwrap_err();
        assert!(matches!(
            err,
            MappingError::MissingKind {
                kind: DocumentKind::Occurrence
            }
        ));
    }

    #[test]
    fn test_load_propagates_listing_failure() {
        let source = FakeSource {
            list_error: true,
            ..Default::default()
        };
        let err = MappingSet::load(&source, Path::new("maps")).unwrap_err();
        assert!(matches!(err, MappingError::Io { .. }));
    }

    #[test]
    fn test_embedded_mappings() {
        let set = MappingSet::embedded().unwrap();
        for kind in DocumentKind::ALL {
            let mapping = set.get(kind);
            assert!(!mapping.version.is_empty());
            assert_eq!(mapping.mappings["_meta"]["type"], "grafeas");
            assert!(mapping.mappings["dynamic_templates"].is_array());
        }
    }

    #[test]
    fn test_fs_source_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        for (name, version) in [
            ("projects.json", "v1"),
            ("occurrences.json", "v1"),
            ("notes.json", "v4"),
        ] {
            fs::write(dir.path().join(name), mapping_json(version)).unwrap();
        }
        fs::create_dir(dir.path().join("old")).unwrap();

        let set = MappingSet::load(&FsMappingSource, dir.path()).unwrap();
        assert_eq!(set.version(DocumentKind::Note), "v4");
    }
}
