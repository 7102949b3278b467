//! Local file bundle: every script source under `<root>/src` plus the
//! generated manifest, in the shape the remote project stores them.

pub mod manifest;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::errors::DeployError;
pub use manifest::{Manifest, MANIFEST_NAME};

/// Sources are read from this directory under the project root.
pub const SOURCE_SUBDIR: &str = "src";

/// Extensions treated as server-side script code.
pub const SOURCE_EXTENSIONS: &[&str] = &["gs", "js"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    ServerCode,
    Manifest,
}

impl FileKind {
    /// Type string used by the Script API (`projects.updateContent`).
    pub fn script_api_type(self) -> &'static str {
        match self {
            FileKind::ServerCode => "SERVER_JS",
            FileKind::Manifest => "JSON",
        }
    }

    /// Type string used by the Drive import format on project creation.
    pub fn drive_import_type(self) -> &'static str {
        match self {
            FileKind::ServerCode => "server_js",
            FileKind::Manifest => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub kind: FileKind,
    pub content: String,
}

/// Wire form of a [`FileEntry`].
#[derive(Debug, Serialize)]
pub struct WireFile<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub source: &'a str,
}

impl FileEntry {
    pub fn server_code(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::ServerCode,
            content: content.into(),
        }
    }

    pub fn manifest(manifest: &Manifest) -> Self {
        Self {
            name: MANIFEST_NAME.to_string(),
            kind: FileKind::Manifest,
            content: manifest.to_source(),
        }
    }

    pub fn for_script_api(&self) -> WireFile<'_> {
        WireFile {
            name: &self.name,
            kind: self.kind.script_api_type(),
            source: &self.content,
        }
    }

    pub fn for_drive_import(&self) -> WireFile<'_> {
        WireFile {
            name: &self.name,
            kind: self.kind.drive_import_type(),
            source: &self.content,
        }
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Build the upload bundle for the project rooted at `root`.
///
/// Sources are sorted by file name. Fails with `EmptySource` when no
/// source file exists and with `DuplicateSource` when two files share a
/// stem (`foo.gs` and `foo.js`), before anything touches the remote service.
pub fn build(root: &Path, manifest: &Manifest) -> Result<Vec<FileEntry>, DeployError> {
    let dir = root.join(SOURCE_SUBDIR);
    let empty = || DeployError::EmptySource { dir: dir.clone() };

    let mut paths: Vec<_> = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_source_file(p))
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(empty()),
        Err(source) => return Err(DeployError::SourceRead { path: dir.clone(), source }),
    };

    if paths.is_empty() {
        return Err(empty());
    }
    paths.sort();

    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut files = Vec::with_capacity(paths.len() + 1);
    for path in paths {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(first) = seen.insert(name.clone(), path.clone()) {
            return Err(DeployError::DuplicateSource {
                name,
                first,
                second: path,
            });
        }

        let content = fs::read_to_string(&path).map_err(|source| DeployError::SourceRead {
            path: path.clone(),
            source,
        })?;

        tracing::info!(file = %path.display(), chars = content.chars().count(), "loaded source");
        files.push(FileEntry::server_code(name, content));
    }

    files.push(FileEntry::manifest(manifest));
    tracing::info!(total = files.len(), "bundle ready (including {}.json manifest)", MANIFEST_NAME);

    Ok(files)
}
