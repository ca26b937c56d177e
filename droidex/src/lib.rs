pub mod context;
pub use context::{Context, DefaultContext};

pub mod config;

pub mod errors;
pub use errors::{Error, ErrorKind, Result};

pub mod adb;
pub use adb::{Adb, ExecAdb};

pub mod command;

pub mod transport;

pub mod privilege;

pub mod artifact;
pub use artifact::{ArtifactCatalog, ArtifactSpec, ArtifactType};

pub mod evidence;
pub use evidence::EvidenceLayout;

pub mod puller;

pub mod backup;

pub mod collect;

pub mod content_row;

pub mod harvest;

pub mod verify;

pub mod result;
pub use result::{AcquiredFile, AcquisitionResult, Strategy, VerificationRecord};

pub mod remediation;

pub mod progress;

pub mod acquire;
pub use acquire::{Acquisition, AcquisitionOptions};

pub mod utils;
pub use utils::fs::{DEVICE_PATH_SEP, DEVICE_PATH_SEP_CHAR};

#[cfg(test)]
pub mod testing;
