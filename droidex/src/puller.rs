use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

use droidex_proc_macro::wraps_base_error;

use crate::adb::Adb;
use crate::artifact::{ArtifactSpec, ArtifactType};
use crate::errors::ErrorKind;
use crate::evidence::EvidenceLayout;
use crate::result::{AcquiredFile, Provenance};
use crate::utils::{ensure_parent_exists, file_size, path_must_str};

/// Why a single candidate path didn't produce a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullFailure {
    Timeout,
    Transport(String),
    NonZeroExit { code: i32, stderr: String },
    /// adb claimed success but nothing landed locally
    Missing,
    Empty,
}

impl Display for PullFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out"),
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::NonZeroExit { code, stderr } => write!(f, "exit {}: {}", code, stderr),
            Self::Missing => f.write_str("destination file missing"),
            Self::Empty => f.write_str("extracted file is empty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullAttempt {
    pub path: String,
    pub failure: PullFailure,
}

fn describe(attempts: &[PullAttempt]) -> String {
    attempts
        .iter()
        .map(|it| format!("{} ({})", it.path, it.failure))
        .collect::<Vec<String>>()
        .join(", ")
}

#[wraps_base_error]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no device paths known for {0}")]
    NoCandidates(ArtifactType),

    #[error("timeout while extracting {kind} from {path}")]
    Timeout {
        kind: ArtifactType,
        path: String,
        attempts: Vec<PullAttempt>,
    },

    #[error("failed to extract {kind} from all known locations: {}", describe(.attempts))]
    Failed {
        kind: ArtifactType,
        attempts: Vec<PullAttempt>,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::PullTimeout,
            _ => ErrorKind::PullFailed,
        }
    }

    pub fn attempts(&self) -> &[PullAttempt] {
        match self {
            Self::Timeout { attempts, .. } | Self::Failed { attempts, .. } => attempts,
            _ => &[],
        }
    }
}

fn try_pull(adb: &dyn Adb, device_path: &str, local: &Path) -> Result<(), PullFailure> {
    let out = match adb.pull(device_path, path_must_str(local)) {
        Ok(v) => v,
        Err(e) if e.is_timeout() => return Err(PullFailure::Timeout),
        Err(e) => return Err(PullFailure::Transport(e.to_string())),
    };

    if !out.ok() {
        return Err(PullFailure::NonZeroExit {
            code: out.code(),
            stderr: out.stderr_utf8_lossy().trim().into(),
        });
    }

    match file_size(local) {
        None => Err(PullFailure::Missing),
        Some(0) => Err(PullFailure::Empty),
        Some(_) => Ok(()),
    }
}

/// Pull the artifact from the first device path that yields a non-empty file.
///
/// Paths are tried in catalog order. Each attempt lands in a staging folder
/// next to the artifact and is only moved to the artifact path once it
/// succeeds, a failed pull leaves an earlier acquisition untouched. If any
/// attempt timed out the whole pull is reported as a timeout, an unresponsive
/// device explains the rest.
pub fn pull_artifact(
    adb: &dyn Adb,
    spec: &ArtifactSpec,
    layout: &EvidenceLayout,
) -> Result<AcquiredFile, Error> {
    if spec.device_paths.is_empty() {
        return Err(Error::NoCandidates(spec.kind));
    }

    let local = layout.artifact_path(spec);
    ensure_parent_exists(&local)?;
    let parent = local.parent().unwrap_or_else(|| layout.root());

    let mut attempts = Vec::new();

    for path in spec.device_paths {
        log::debug!("pulling {} from {}", spec.kind, path);
        let staging = tempfile::Builder::new()
            .prefix(".pull-")
            .tempdir_in(parent)?;
        let staged = staging.path().join(spec.local_name);
        match try_pull(adb, path, &staged) {
            Ok(()) => {
                fs::rename(&staged, &local)?;
                return Ok(AcquiredFile::new(
                    spec.kind,
                    local,
                    Provenance::Device {
                        path: path.to_string(),
                    },
                    format!("Successfully extracted {}", spec.local_name),
                ));
            }
            Err(failure) => {
                log::debug!("pull of {} failed: {}", path, failure);
                attempts.push(PullAttempt {
                    path: path.to_string(),
                    failure,
                });
            }
        }
    }

    let timed_out = attempts
        .iter()
        .find(|it| it.failure == PullFailure::Timeout)
        .map(|it| it.path.clone());

    Err(match timed_out {
        Some(path) => Error::Timeout {
            kind: spec.kind,
            path,
            attempts,
        },
        None => Error::Failed {
            kind: spec.kind,
            attempts,
        },
    })
}
