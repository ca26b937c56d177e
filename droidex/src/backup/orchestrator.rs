use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use super::{Error, CONTAINER_HEADER_SIZE};
use crate::adb::Adb;
use crate::utils::{ensure_parent_exists, file_size, path_must_str};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    pub path: PathBuf,
    pub size: u64,
    pub packages: Vec<String>,
}

impl BackupOutcome {
    pub fn message(&self) -> String {
        format!("Backup created successfully: {} bytes", self.size)
    }
}

/// Drop duplicate and unusable package names.
///
/// Every package is its own argv entry, but names with whitespace would still
/// be split apart by the device side argument handling so they are refused.
fn usable_packages<S: AsRef<str>>(packages: &[S]) -> Result<Vec<String>, Error> {
    if packages.is_empty() {
        return Err(Error::EmptyPackageList);
    }

    let mut rejected = None;
    let usable: Vec<String> = packages
        .iter()
        .map(|it| it.as_ref().trim())
        .filter(|it| {
            if it.is_empty() || it.chars().any(char::is_whitespace) {
                log::warn!("refusing to back up package `{}`", it);
                rejected.get_or_insert_with(|| it.to_string());
                false
            } else {
                true
            }
        })
        .unique()
        .map(String::from)
        .collect();

    if usable.is_empty() {
        return Err(match rejected {
            Some(name) => Error::InvalidPackage(name),
            None => Error::EmptyPackageList,
        });
    }
    Ok(usable)
}

/// Request one `adb backup` of all `packages` into `destination`.
///
/// The call blocks until the user approves the prompt on the device or the
/// backup timeout expires. A container at or below the header size means
/// nothing was exported.
pub fn create_backup<S: AsRef<str>>(
    adb: &dyn Adb,
    packages: &[S],
    destination: &Path,
) -> Result<BackupOutcome, Error> {
    let packages = usable_packages(packages)?;

    ensure_parent_exists(destination)?;
    // A stale container from an earlier run would pass the size check
    if destination.exists() {
        fs::remove_file(destination)?;
    }

    log::info!(
        "requesting backup of {} into {:?}, approve it on the device",
        packages.join(" "),
        destination
    );

    let out = match adb.backup(path_must_str(destination), &packages) {
        Ok(v) => v,
        Err(e) => {
            return Err(match e {
                crate::Error::CommandTimeout(_, dur) => Error::ApprovalTimeout(dur),
                e => Error::Transport(e),
            })
        }
    };

    match file_size(destination) {
        None => {
            let stderr = out.stderr_utf8_lossy();
            let stderr = stderr.trim();
            Err(Error::NotCreated {
                stderr: if stderr.is_empty() {
                    String::from("Backup file was not created")
                } else {
                    stderr.into()
                },
            })
        }
        Some(size) if size <= CONTAINER_HEADER_SIZE => Err(Error::TooSmall { size }),
        Some(size) => Ok(BackupOutcome {
            path: destination.into(),
            size,
            packages,
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testing::{cmd_output, mock_adb, ok_output, tmp_context, MockAdb, TestContext};
    use rstest::*;
    use std::time::Duration;

    #[rstest]
    fn test_combined_backup(tmp_context: TestContext, mut mock_adb: MockAdb) {
        let dest = tmp_context.to_abs("evidence/backup_extracted/backup.ab");
        mock_adb
            .expect_backup()
            .withf(|_, pkgs| {
                pkgs == ["com.android.providers.telephony", "com.android.chrome"]
            })
            .times(1)
            .returning(|dest, _| {
                fs::write(dest, vec![7u8; 100]).expect("write backup");
                Ok(ok_output(""))
            });

        let out = create_backup(
            &mock_adb,
            &[
                "com.android.providers.telephony",
                "com.android.chrome",
                "com.android.providers.telephony",
            ],
            &dest,
        )
        .expect("backup");
        assert_eq!(out.size, 100);
        assert_eq!(out.packages.len(), 2);
    }

    #[rstest]
    fn test_approval_timeout(tmp_context: TestContext, mut mock_adb: MockAdb) {
        mock_adb.expect_backup().returning(|_, _| {
            Err(crate::Error::CommandTimeout(
                "adb backup".into(),
                Duration::from_secs(120),
            ))
        });
        let err = create_backup(&mock_adb, &["com.android.chrome"], &tmp_context.to_abs("b.ab"))
            .expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::BackupApprovalTimeout);
        assert!(err.to_string().contains("may not have approved"));
    }

    #[rstest]
    #[case(0)]
    #[case(24)]
    fn test_too_small(
        tmp_context: TestContext,
        mut mock_adb: MockAdb,
        #[case] size: usize,
    ) {
        mock_adb.expect_backup().returning(move |dest, _| {
            fs::write(dest, vec![0u8; size]).expect("write backup");
            Ok(ok_output(""))
        });
        let err = create_backup(&mock_adb, &["com.android.chrome"], &tmp_context.to_abs("b.ab"))
            .expect_err("too small");
        assert_eq!(err.kind(), ErrorKind::BackupTooSmall);
    }

    #[rstest]
    fn test_not_created(tmp_context: TestContext, mut mock_adb: MockAdb) {
        mock_adb
            .expect_backup()
            .returning(|_, _| Ok(cmd_output(1, "", "adb: unable to connect for backup\n")));
        let err = create_backup(&mock_adb, &["com.android.chrome"], &tmp_context.to_abs("b.ab"))
            .expect_err("missing");
        assert!(matches!(err, Error::NotCreated { ref stderr } if stderr.contains("unable to connect")));
        assert_eq!(err.kind(), ErrorKind::BackupFailed);
    }

    #[rstest]
    fn test_package_validation(tmp_context: TestContext, mock_adb: MockAdb) {
        let dest = tmp_context.to_abs("b.ab");
        let empty: [&str; 0] = [];
        assert!(matches!(
            create_backup(&mock_adb, &empty, &dest),
            Err(Error::EmptyPackageList)
        ));
        assert!(matches!(
            create_backup(&mock_adb, &["com.evil app"], &dest),
            Err(Error::InvalidPackage(ref s)) if s == "com.evil app"
        ));
    }
}
