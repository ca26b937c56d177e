use std::collections::BTreeMap;
use std::fmt::{self, Display, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactType;
use crate::errors::ErrorKind;
use crate::utils::ensure_parent_exists;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Privileged pulls from fixed device paths
    Direct,
    /// `adb backup` container plus shell collection
    Backup,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Backup => f.write_str("backup"),
        }
    }
}

/// Where an acquired file came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    Device { path: String },
    Backup { member: String, heuristic: bool },
    /// Folder filled by one of the collectors
    Collected { files: usize },
}

impl Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device { path } => write!(f, "device:{}", path),
            Self::Backup { member, heuristic } => {
                if *heuristic {
                    write!(f, "backup:{} (heuristic match)", member)
                } else {
                    write!(f, "backup:{}", member)
                }
            }
            Self::Collected { files } => write!(f, "collected:{} files", files),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiredFile {
    pub artifact_type: ArtifactType,
    pub local_path: PathBuf,
    pub provenance: Provenance,
    pub message: String,
    /// Hex digest, or an `Error: ...` marker if hashing failed
    pub hash: Option<String>,
}

impl AcquiredFile {
    pub fn new<M: Into<String>>(
        artifact_type: ArtifactType,
        local_path: PathBuf,
        provenance: Provenance,
        message: M,
    ) -> Self {
        Self {
            artifact_type,
            local_path,
            provenance,
            message: message.into(),
            hash: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub file_exists: bool,
    pub file_size: u64,
    pub tables_found: Vec<String>,
    pub expected_tables: Vec<String>,
    pub tables_present: bool,
    pub row_counts: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationRecord {
    pub fn is_valid(&self) -> bool {
        self.file_exists && self.tables_present
    }

    /// Record for a database that couldn't be opened
    pub fn failed(file_exists: bool, file_size: u64, expected: &[String], error: String) -> Self {
        Self {
            file_exists,
            file_size,
            expected_tables: expected.to_vec(),
            tables_present: false,
            row_counts: expected.iter().map(|t| (t.clone(), 0)).collect(),
            error: Some(error),
            ..Default::default()
        }
    }
}

/// A warning or error recorded against a step of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub step: String,
    pub kind: Option<ErrorKind>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediation: Vec<String>,
}

impl Issue {
    pub fn new<S: Into<String>, M: Into<String>>(step: S, message: M) -> Self {
        Self {
            step: step.into(),
            kind: None,
            message: message.into(),
            remediation: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_remediation(mut self, remediation: Vec<String>) -> Self {
        self.remediation = remediation;
        self
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.step, self.message)
    }
}

/// Everything a single acquisition run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionResult {
    pub success: bool,
    pub strategy: Strategy,
    pub root_available: Option<bool>,
    pub acquired: BTreeMap<ArtifactType, AcquiredFile>,
    pub verification: BTreeMap<ArtifactType, VerificationRecord>,
    pub warnings: Vec<Issue>,
    pub errors: Vec<Issue>,
}

impl AcquisitionResult {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            success: false,
            strategy,
            root_available: None,
            acquired: BTreeMap::new(),
            verification: BTreeMap::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record_acquired(&mut self, file: AcquiredFile) {
        log::info!(
            "acquired {} at {:?} ({})",
            file.artifact_type,
            file.local_path,
            file.provenance
        );
        self.acquired.insert(file.artifact_type, file);
    }

    pub fn record_verification(&mut self, kind: ArtifactType, record: VerificationRecord) {
        self.verification.insert(kind, record);
    }

    pub fn warn(&mut self, issue: Issue) {
        log::warn!("{}", issue);
        self.warnings.push(issue);
    }

    pub fn error(&mut self, issue: Issue) {
        log::error!("{}", issue);
        self.errors.push(issue);
    }

    /// Seal the result, any acquired artifact makes the run a success
    pub fn finish(&mut self) {
        self.success = !self.acquired.is_empty();
    }

    pub fn has_error_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|it| it.kind == Some(kind))
    }

    pub fn summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(
            s,
            "{} acquisition {}: {} artifact(s), {} warning(s), {} error(s)",
            self.strategy,
            if self.success { "succeeded" } else { "failed" },
            self.acquired.len(),
            self.warnings.len(),
            self.errors.len()
        );
        if let Some(root) = self.root_available {
            let _ = writeln!(s, "root available: {}", root);
        }
        for (kind, file) in &self.acquired {
            let _ = writeln!(
                s,
                "  {:<15} {} [{}]",
                kind.as_str(),
                file.local_path.display(),
                file.hash.as_deref().unwrap_or("-")
            );
        }
        for w in &self.warnings {
            let _ = writeln!(s, "  warning: {}", w);
        }
        for e in &self.errors {
            let _ = writeln!(s, "  error: {}", e);
        }
        s
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| crate::Error::new_generic(&e))
    }

    pub fn write_json(&self, path: &Path) -> crate::Result<()> {
        ensure_parent_exists(path)?;
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    fn sms_file() -> AcquiredFile {
        AcquiredFile::new(
            ArtifactType::Sms,
            PathBuf::from("evidence/mmssms.db"),
            Provenance::Device {
                path: "/data/data/com.android.providers.telephony/databases/mmssms.db".into(),
            },
            "Successfully extracted mmssms.db",
        )
    }

    #[rstest]
    fn test_success_requires_an_artifact() {
        let mut res = AcquisitionResult::new(Strategy::Direct);
        res.warn(Issue::new("Root Access", "no root").with_kind(ErrorKind::PrivilegeUnavailable));
        res.error(Issue::new("SMS Extraction", "failed").with_kind(ErrorKind::PullFailed));
        res.finish();
        assert!(!res.success);

        res.record_acquired(sms_file());
        res.finish();
        assert!(res.success);
        assert!(res.has_error_kind(ErrorKind::PullFailed));
    }

    #[rstest]
    fn test_json_shape() {
        let mut res = AcquisitionResult::new(Strategy::Backup);
        res.record_acquired(sms_file());
        res.finish();
        let json = res.to_json().expect("json");
        let v: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(v["strategy"], "backup");
        assert_eq!(v["success"], true);
        assert_eq!(v["acquired"]["sms"]["provenance"]["source"], "device");

        let back: AcquisitionResult = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, res);
    }

    #[rstest]
    fn test_failed_verification_record() {
        let rec = VerificationRecord::failed(true, 10, &["sms".into()], "not a database".into());
        assert!(!rec.is_valid());
        assert_eq!(rec.row_counts.get("sms"), Some(&0));
    }
}
