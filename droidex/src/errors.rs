use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::path_must_str;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("required binary `{0}` not available")]
    MissingBin(String),
    #[error("missing required env var: {0}")]
    MissingEnv(String),

    #[error("{0}")]
    IO(io::Error),

    #[error("command failed with status {0}: {1}")]
    CommandError(i32, String),

    #[error("command `{0}` timed out after {1:?}")]
    CommandTimeout(String, Duration),

    #[error("failed to get basedirs")]
    NoBaseDirs,

    #[error("generic error: {0}")]
    Generic(String),

    #[error("invalid config {0}: {1}")]
    InvalidConfig(String, String),

    #[error("file {0} doesn't exist")]
    MissingFile(String),
}

impl Error {
    pub fn new_generic<S: ToString + ?Sized>(s: &S) -> Self {
        Self::Generic(s.to_string())
    }

    pub fn new_cfg<S: ToString + ?Sized>(path: &Path, s: &S) -> Self {
        let as_str = path_must_str(path.as_ref());
        Self::InvalidConfig(as_str.into(), s.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout(..))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::IO(err)
    }
}

/// Tags every failure an acquisition run can record.
///
/// Component errors map onto one of these via their `kind()` method so the
/// result record stays stable no matter which component failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    TransportUnavailable,
    DeviceNotConnected,
    PrivilegeUnavailable,
    PullTimeout,
    PullFailed,
    BackupApprovalTimeout,
    BackupTooSmall,
    BackupFailed,
    ContainerMagicMismatch,
    ContainerTruncated,
    ContainerUnsupportedCompression,
    ContainerDecompressionFailed,
    ContainerInvalidArchive,
    ArchiveMemberNotFound,
    DatabaseOpenFailed,
    HashIOFailed,
}

impl ErrorKind {
    /// Only these kinds end a run; everything else is recorded and skipped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TransportUnavailable | Self::DeviceNotConnected)
    }
}
