//! # Manifest Loader
//!
//! Discovers manifest files and parses every YAML document in them, keeping
//! file order and in-file document order.

use crate::manifest::{Manifest, ManifestError, ManifestResource};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Where the manifest is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    /// A single file, or a directory of manifest files
    pub path: PathBuf,
    /// When `path` is a directory, descend into subdirectories
    pub recursive: bool,
}

impl ManifestSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            path: path.into(),
            recursive,
        }
    }
}

/// Load every resource document from the source
///
/// # Errors
///
/// Returns a [`ManifestError`] if the source cannot be read or any document
/// is malformed. A single bad document fails the whole load.
pub fn load(source: &ManifestSource) -> Result<Manifest, ManifestError> {
    let files = manifest_files(source)?;
    let mut resources = Vec::new();

    for file in &files {
        let contents = std::fs::read_to_string(file).map_err(|e| ManifestError::Io {
            path: file.clone(),
            source: e,
        })?;
        let parsed = parse_documents(&contents, file)?;
        debug!(path = %file.display(), resources = parsed.len(), "Parsed manifest file");
        resources.extend(parsed);
    }

    info!(
        path = %source.path.display(),
        recursive = source.recursive,
        files = files.len(),
        resources = resources.len(),
        "Loaded manifest"
    );
    Ok(Manifest::new(resources))
}

/// Parse a multi-document YAML string
///
/// Empty documents (a bare `---`, or comments only) are skipped.
///
/// # Errors
///
/// Returns a [`ManifestError`] for the first document that is not valid YAML or
/// is not a usable resource object.
pub fn parse_documents(contents: &str, path: &Path) -> Result<Vec<ManifestResource>, ManifestError> {
    let mut resources = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(contents).enumerate() {
        let yaml = serde_yaml::Value::deserialize(document).map_err(|e| ManifestError::Yaml {
            path: path.to_path_buf(),
            index,
            source: e,
        })?;
        if yaml.is_null() {
            continue;
        }

        let value = serde_json::to_value(&yaml).map_err(|e| ManifestError::InvalidDocument {
            path: path.to_path_buf(),
            index,
            reason: e.to_string(),
        })?;
        resources.push(ManifestResource::from_value(value, path, index)?);
    }

    Ok(resources)
}

/// Resolve the list of files to read, sorted by name at every level
fn manifest_files(source: &ManifestSource) -> Result<Vec<PathBuf>, ManifestError> {
    let metadata = std::fs::metadata(&source.path).map_err(|e| ManifestError::Io {
        path: source.path.clone(),
        source: e,
    })?;
    if metadata.is_file() {
        return Ok(vec![source.path.clone()]);
    }

    let max_depth = if source.recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    // Symlinks are followed so ConfigMap volume mounts resolve to their
    // files; the `..data` style bookkeeping entries are hidden and skipped.
    let walker = WalkDir::new(&source.path)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in walker {
        let entry = entry.map_err(|e| ManifestError::Walk {
            path: source.path.clone(),
            source: e,
        })?;
        if entry.file_type().is_file() && has_manifest_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MANIFEST_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext)))
}
