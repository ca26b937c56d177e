use std::io;
use std::time::Duration;

use droidex_proc_macro::wraps_base_error;

use crate::errors::ErrorKind;

pub mod container;
pub use container::{
    parse, BackupContainer, BackupHeader, Compression, ParsedBackup, BACKUP_MAGIC,
    CONTAINER_HEADER_SIZE, HEADER_LEN,
};

pub mod locator;
pub use locator::ArchiveLocator;

pub mod orchestrator;
pub use orchestrator::{create_backup, BackupOutcome};

/// Failures creating or decoding a backup container
#[wraps_base_error]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no packages to back up")]
    EmptyPackageList,

    #[error("invalid package name `{0}`")]
    InvalidPackage(String),

    #[error("backup timed out after {0:?} (user may not have approved on device)")]
    ApprovalTimeout(Duration),

    #[error("backup file is too small ({size} bytes, user may not have approved)")]
    TooSmall { size: u64 },

    #[error("backup failed: {stderr}")]
    NotCreated { stderr: String },

    #[error("transport error during backup: {0}")]
    Transport(crate::Error),

    #[error("invalid backup file format (wrong magic string)")]
    MagicMismatch,

    #[error("backup file truncated ({len} bytes, need 32)")]
    Truncated { len: usize },

    #[error("unsupported compression flag {0}")]
    UnsupportedCompression(u32),

    #[error("failed to decompress backup: {0}")]
    Decompression(io::Error),

    #[error("backup payload is not a valid archive: {0}")]
    InvalidArchive(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ApprovalTimeout(_) => ErrorKind::BackupApprovalTimeout,
            Self::TooSmall { .. } => ErrorKind::BackupTooSmall,
            Self::MagicMismatch => ErrorKind::ContainerMagicMismatch,
            Self::Truncated { .. } => ErrorKind::ContainerTruncated,
            Self::UnsupportedCompression(_) => ErrorKind::ContainerUnsupportedCompression,
            Self::Decompression(_) => ErrorKind::ContainerDecompressionFailed,
            Self::InvalidArchive(_) => ErrorKind::ContainerInvalidArchive,
            _ => ErrorKind::BackupFailed,
        }
    }
}
