use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use droidex_proc_macro::wraps_base_error;
use serde::Serialize;

use crate::artifact::{ArtifactSpec, ArtifactType};
use crate::errors::ErrorKind;
use crate::evidence::EvidenceLayout;
use crate::result::{AcquiredFile, Provenance};
use crate::utils::{ensure_parent_exists, open_file, path_has_ext, sanitize_relative};

#[wraps_base_error]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database not found in backup for {0}")]
    NotFound(ArtifactType),

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("archive member `{0}` has an unsafe path")]
    UnsafePath(String),

    #[error("archive member `{0}` disappeared while extracting")]
    MemberVanished(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArchive(_) => ErrorKind::ContainerInvalidArchive,
            _ => ErrorKind::ArchiveMemberNotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub name: String,
    pub size: u64,
    pub is_file: bool,
}

impl MemberInfo {
    fn qualifies(&self) -> bool {
        self.is_file && self.size > 0
    }
}

fn normalize(name: &str) -> &str {
    name.trim_start_matches("./")
}

/// Finds artifacts in the inner archive of a backup.
///
/// Member names are indexed once on open, each extraction then makes a
/// single pass over the archive to copy the chosen member out.
pub struct ArchiveLocator {
    archive_path: PathBuf,
    members: Vec<MemberInfo>,
}

impl ArchiveLocator {
    pub fn open(archive_path: &Path) -> Result<Self, Error> {
        let mut archive = tar::Archive::new(BufReader::new(open_file(archive_path)?));
        let mut members = Vec::new();

        let entries = archive
            .entries()
            .map_err(|e| Error::InvalidArchive(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::InvalidArchive(e.to_string()))?;
            let name = entry
                .path()
                .map_err(|e| Error::InvalidArchive(e.to_string()))?
                .to_string_lossy()
                .to_string();
            members.push(MemberInfo {
                name: normalize(&name).into(),
                size: entry.header().size().unwrap_or(0),
                is_file: entry.header().entry_type().is_file(),
            });
        }

        log::debug!("indexed {} members in {:?}", members.len(), archive_path);

        Ok(Self {
            archive_path: archive_path.into(),
            members,
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn list_members(&self) -> &[MemberInfo] {
        &self.members
    }

    fn find_exact(&self, spec: &ArtifactSpec) -> Option<&MemberInfo> {
        spec.backup_paths.iter().find_map(|want| {
            self.members
                .iter()
                .find(|m| m.qualifies() && m.name == normalize(want))
        })
    }

    /// Any database looking member whose name mentions the artifact
    fn find_heuristic(&self, spec: &ArtifactSpec) -> Option<&MemberInfo> {
        self.members.iter().filter(|m| m.qualifies()).find(|m| {
            let looks_like_db = path_has_ext(m.name.as_str(), "db")
                || spec
                    .content_marker
                    .map_or(false, |marker| m.name.contains(marker));
            if !looks_like_db {
                return false;
            }
            let lower = m.name.to_ascii_lowercase();
            lower.contains(spec.kind.as_str()) || spec.keywords.iter().any(|k| lower.contains(k))
        })
    }

    /// Select the member holding `spec`, exact paths first.
    ///
    /// Returns the member name and whether it came from the heuristic pass.
    pub fn locate(&self, spec: &ArtifactSpec) -> Option<(&str, bool)> {
        if let Some(m) = self.find_exact(spec) {
            return Some((m.name.as_str(), false));
        }
        self.find_heuristic(spec).map(|m| (m.name.as_str(), true))
    }

    /// Copy a single member to `dest`
    pub fn extract_member(&self, member: &str, dest: &Path) -> Result<u64, Error> {
        let mut archive = tar::Archive::new(BufReader::new(File::open(&self.archive_path)?));
        let entries = archive
            .entries()
            .map_err(|e| Error::InvalidArchive(e.to_string()))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| Error::InvalidArchive(e.to_string()))?;
            let matches = entry
                .path()
                .map(|p| normalize(&p.to_string_lossy()) == member)
                .unwrap_or(false);
            if !matches {
                continue;
            }
            ensure_parent_exists(dest)?;
            let mut out = File::create(dest)?;
            let n = io::copy(&mut entry, &mut out)?;
            return Ok(n);
        }

        Err(Error::MemberVanished(member.into()))
    }

    /// Pull `spec` out of the archive into the evidence folder.
    ///
    /// The member lands under the artifact's scratch folder first and is then
    /// copied to its canonical name at the evidence root.
    pub fn extract(
        &self,
        spec: &ArtifactSpec,
        layout: &EvidenceLayout,
    ) -> Result<AcquiredFile, Error> {
        let (member, heuristic) = self.locate(spec).ok_or(Error::NotFound(spec.kind))?;
        let rel = sanitize_relative(member).ok_or_else(|| Error::UnsafePath(member.into()))?;

        let scratch = layout.scratch_dir(spec.kind).join(rel);
        let size = self.extract_member(member, &scratch)?;
        log::debug!("extracted {} ({} bytes) to {:?}", member, size, scratch);

        let local = layout.artifact_path(spec);
        ensure_parent_exists(&local)?;
        fs::copy(&scratch, &local)?;

        let message = if heuristic {
            format!("Extracted {} from backup (found: {})", spec.kind, member)
        } else {
            format!("Extracted {} from backup", spec.kind)
        };

        Ok(AcquiredFile::new(
            spec.kind,
            local,
            Provenance::Backup {
                member: member.into(),
                heuristic,
            },
            message,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::artifact::ArtifactCatalog;
    use crate::backup::container::test::make_tar;
    use crate::backup::{parse, BackupContainer, Compression};
    use crate::testing::{tmp_context, TestContext};
    use crate::Context;
    use rstest::*;

    const SMS_DB: &[u8] = b"SQLite format 3\0 pretend this is an sms database";

    fn spec(kind: ArtifactType) -> ArtifactSpec {
        ArtifactCatalog::android_default()
            .get(kind)
            .cloned()
            .expect("in catalog")
    }

    fn setup(ctx: &TestContext, files: &[(&str, &[u8])]) -> (EvidenceLayout, ArchiveLocator) {
        let layout = EvidenceLayout::new(ctx.get_evidence_dir());
        layout.ensure().expect("layout");
        let archive = layout.inner_archive_path();
        fs::write(&archive, make_tar(files)).expect("write tar");
        let locator = ArchiveLocator::open(&archive).expect("open archive");
        (layout, locator)
    }

    #[rstest]
    fn test_container_to_sms_end_to_end(tmp_context: TestContext) {
        let layout = EvidenceLayout::new(tmp_context.get_evidence_dir());
        layout.ensure().expect("layout");

        let tar = make_tar(&[
            ("apps/com.android.providers.telephony/_manifest", &b"manifest"[..]),
            ("apps/com.android.providers.telephony/db/mmssms.db", SMS_DB),
        ]);
        fs::write(
            layout.backup_container_path(),
            BackupContainer::new(1, Compression::None, tar).encode(),
        )
        .expect("write container");

        let parsed = parse(&layout.backup_container_path(), &layout.inner_archive_path())
            .expect("parse");
        let locator = ArchiveLocator::open(&parsed.archive_path).expect("open");
        let file = locator
            .extract(&spec(ArtifactType::Sms), &layout)
            .expect("extract sms");

        assert_eq!(file.local_path, layout.root().join("mmssms.db"));
        assert_eq!(fs::read(&file.local_path).expect("read"), SMS_DB);
        assert_eq!(
            file.provenance,
            Provenance::Backup {
                member: "apps/com.android.providers.telephony/db/mmssms.db".into(),
                heuristic: false
            }
        );
        assert!(layout
            .scratch_dir(ArtifactType::Sms)
            .join("apps/com.android.providers.telephony/db/mmssms.db")
            .exists());
    }

    #[rstest]
    fn test_exact_path_priority(tmp_context: TestContext) {
        let (layout, locator) = setup(
            &tmp_context,
            &[
                ("apps/com.android.mms/db/mmssms.db", &b"second choice"[..]),
                ("apps/com.android.providers.telephony/db/mmssms.db", &b"first choice"[..]),
            ],
        );
        let file = locator.extract(&spec(ArtifactType::Sms), &layout).expect("extract");
        assert_eq!(fs::read(&file.local_path).expect("read"), &b"first choice"[..]);
    }

    #[rstest]
    fn test_empty_member_skipped(tmp_context: TestContext) {
        let (layout, locator) = setup(
            &tmp_context,
            &[
                ("apps/com.android.providers.telephony/db/mmssms.db", &b""[..]),
                ("apps/com.android.mms/db/mmssms.db", &b"fallback"[..]),
            ],
        );
        let file = locator.extract(&spec(ArtifactType::Sms), &layout).expect("extract");
        assert!(matches!(file.provenance, Provenance::Backup { ref member, heuristic: false } if member.contains("com.android.mms")));
    }

    #[rstest]
    fn test_heuristic_pass(tmp_context: TestContext) {
        let (layout, locator) = setup(
            &tmp_context,
            &[
                ("apps/com.android.providers.contacts/db/profile.db", &b"not calls"[..]),
                ("apps/com.vendor.dialer/db/calls_log.db", &b"calls here"[..]),
                ("apps/com.vendor.browser/f/chrome_data/History", &b"browser history"[..]),
            ],
        );

        let calls = locator.extract(&spec(ArtifactType::Calls), &layout).expect("calls");
        assert_eq!(
            calls.provenance,
            Provenance::Backup {
                member: "apps/com.vendor.dialer/db/calls_log.db".into(),
                heuristic: true
            }
        );
        assert!(calls.message.contains("found: apps/com.vendor.dialer/db/calls_log.db"));

        let chrome = locator.extract(&spec(ArtifactType::Chrome), &layout).expect("chrome");
        assert_eq!(fs::read(&chrome.local_path).expect("read"), &b"browser history"[..]);
    }

    #[rstest]
    fn test_not_found(tmp_context: TestContext) {
        let (layout, locator) = setup(
            &tmp_context,
            &[("apps/com.android.providers.telephony/db/mmssms.db", SMS_DB)],
        );
        let err = locator
            .extract(&spec(ArtifactType::Chrome), &layout)
            .expect_err("no chrome");
        assert!(matches!(err, Error::NotFound(ArtifactType::Chrome)));
        assert_eq!(err.kind(), ErrorKind::ArchiveMemberNotFound);
        assert!(!layout.root().join("History").exists());
    }

    #[rstest]
    fn test_list_members(tmp_context: TestContext) {
        let (_, locator) = setup(
            &tmp_context,
            &[
                ("./apps/a/db/x.db", &b"x"[..]),
                ("apps/b/f/y", &b""[..]),
            ],
        );
        let names: Vec<&str> = locator.list_members().iter().map(|it| it.name.as_str()).collect();
        assert_eq!(names, vec!["apps/a/db/x.db", "apps/b/f/y"]);
        assert_eq!(locator.list_members()[1].size, 0);
    }
}
