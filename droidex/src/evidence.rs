use std::io;
use std::path::{Path, PathBuf};

use crate::artifact::{ArtifactSpec, ArtifactType};
use crate::utils::ensure_dir_exists;

pub const BACKUP_DIR: &'static str = "backup_extracted";
pub const BACKUP_CONTAINER_NAME: &'static str = "backup.ab";
pub const INNER_ARCHIVE_NAME: &'static str = "backup.tar";
pub const RESULT_FILE_NAME: &'static str = "acquisition_result.json";

/// The on-disk evidence folder for a single case.
///
/// ```text
/// <root>/
///   mmssms.db calllog.db History ...
///   shared_storage/
///   system_dump/
///   content_query/
///   backup_extracted/
///     backup.ab
///     backup.tar
///     extract_<type>/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceLayout {
    root: PathBuf,
}

impl EvidenceLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical location of the given artifact under the root
    pub fn artifact_path(&self, spec: &ArtifactSpec) -> PathBuf {
        self.root.join(spec.local_name)
    }

    pub fn shared_storage_dir(&self) -> PathBuf {
        self.root.join("shared_storage")
    }

    pub fn system_dump_dir(&self) -> PathBuf {
        self.root.join("system_dump")
    }

    pub fn content_query_dir(&self) -> PathBuf {
        self.root.join("content_query")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    pub fn backup_container_path(&self) -> PathBuf {
        self.backup_dir().join(BACKUP_CONTAINER_NAME)
    }

    pub fn inner_archive_path(&self) -> PathBuf {
        self.backup_dir().join(INNER_ARCHIVE_NAME)
    }

    /// Scratch space the locator extracts archive members into
    pub fn scratch_dir(&self, kind: ArtifactType) -> PathBuf {
        self.backup_dir().join(format!("extract_{}", kind))
    }

    pub fn result_path(&self) -> PathBuf {
        self.root.join(RESULT_FILE_NAME)
    }

    /// Create the folder tree, existing content is left alone
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            self.root.clone(),
            self.shared_storage_dir(),
            self.system_dump_dir(),
            self.content_query_dir(),
            self.backup_dir(),
        ] {
            ensure_dir_exists(&dir)?;
        }
        Ok(())
    }
}
