use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::adb::Adb;
use crate::command::quote;
use crate::utils::{ensure_parent_exists, file_size, path_must_str, sanitize_relative};

pub const DEFAULT_HARVEST_LIMIT: usize = 200;

pub const DEFAULT_HARVEST_ROOTS: &[&str] = &[
    "/sdcard/DCIM",
    "/sdcard/Pictures",
    "/sdcard/Download",
    "/sdcard/Documents",
    "/sdcard/WhatsApp/Media",
    "/sdcard/Android/media",
];

/// Aliases of the primary shared storage volume, stripped from local paths
const STORAGE_PREFIXES: &[&str] = &["/sdcard/", "/storage/emulated/0/", "/storage/self/primary/"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    /// Unique remote files found across all roots
    pub listed: usize,
    pub attempted: usize,
    pub pulled: usize,
    pub failed: usize,
}

/// Local destination for `remote` under `dest`, `None` if the path can't be
/// mapped safely
pub fn local_path_for(dest: &Path, remote: &str) -> Option<PathBuf> {
    let rel = STORAGE_PREFIXES
        .iter()
        .find_map(|p| remote.strip_prefix(p))
        .unwrap_or(remote);
    sanitize_relative(rel).map(|it| dest.join(it))
}

fn is_listable(adb: &dyn Adb, root: &str, timeout: Duration) -> bool {
    match adb.shell(&format!("ls -d {}", quote(root)), timeout) {
        Ok(out) => out.ok() && !out.stdout_contains("No such file"),
        Err(e) => {
            log::debug!("ls -d {} failed: {}", root, e);
            false
        }
    }
}

fn list_files(adb: &dyn Adb, root: &str, max: usize, timeout: Duration) -> Vec<String> {
    let cmd = format!(
        "find {} -type f 2>/dev/null | head -n {}",
        quote(root),
        max
    );
    match adb.shell(&cmd, timeout) {
        Ok(out) => out
            .stdout_utf8_lossy()
            .lines()
            .map(str::trim)
            .filter(|it| it.starts_with('/'))
            .map(String::from)
            .collect(),
        Err(e) => {
            log::warn!("listing {} failed: {}", root, e);
            Vec::new()
        }
    }
}

/// Enumerate up to `limit` files under `roots` and pull each into `dest`.
///
/// Roots are scanned in order until the limit is reached. The directory
/// structure below the storage volume is kept. A failed pull is logged and
/// counted, it never stops the batch.
pub fn harvest<S: AsRef<str>>(
    adb: &dyn Adb,
    roots: &[S],
    limit: usize,
    dest: &Path,
    timeout: Duration,
) -> HarvestReport {
    let mut report = HarvestReport::default();
    let mut seen = HashSet::new();
    let mut remote_files = Vec::new();

    for root in roots {
        let root = root.as_ref();
        if remote_files.len() >= limit {
            break;
        }
        if !is_listable(adb, root, timeout) {
            log::debug!("skipping {}, not listable", root);
            continue;
        }
        let remaining = limit - remote_files.len();
        for f in list_files(adb, root, remaining, timeout) {
            if remote_files.len() >= limit {
                break;
            }
            if seen.insert(f.clone()) {
                remote_files.push(f);
            }
        }
    }

    report.listed = remote_files.len();
    log::info!("harvesting {} files from shared storage", report.listed);

    for remote in &remote_files {
        report.attempted += 1;

        let local = match local_path_for(dest, remote) {
            Some(v) => v,
            None => {
                log::warn!("refusing to pull {}, unsafe path", remote);
                report.failed += 1;
                continue;
            }
        };

        if let Err(e) = ensure_parent_exists(&local) {
            log::warn!("failed to create parent of {:?}: {}", local, e);
            report.failed += 1;
            continue;
        }

        match adb.pull(remote, path_must_str(&local)) {
            Ok(out) if out.ok() && file_size(&local).is_some() => report.pulled += 1,
            Ok(out) => {
                log::warn!("pull of {} failed: {}", remote, out.stderr_utf8_lossy().trim());
                report.failed += 1;
            }
            Err(e) => {
                log::warn!("pull of {} failed: {}", remote, e);
                report.failed += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{cmd_output, mock_adb, ok_output, tmp_context, MockAdb, TestContext};
    use rstest::*;
    use std::fs;

    const T: Duration = Duration::from_secs(20);

    #[rstest]
    #[case("/sdcard/DCIM/Camera/a.jpg", Some("DCIM/Camera/a.jpg"))]
    #[case("/storage/emulated/0/Download/b.pdf", Some("Download/b.pdf"))]
    #[case("/storage/self/primary/c.txt", Some("c.txt"))]
    #[case("/mnt/media_rw/ABCD/d.txt", Some("mnt/media_rw/ABCD/d.txt"))]
    #[case("/sdcard/../../data/x", None)]
    fn test_local_path_for(#[case] remote: &str, #[case] expected: Option<&str>) {
        let dest = Path::new("shared_storage");
        assert_eq!(local_path_for(dest, remote), expected.map(|it| dest.join(it)));
    }

    #[rstest]
    fn test_harvest_respects_limit(tmp_context: TestContext, mut mock_adb: MockAdb) {
        let dest = tmp_context.to_abs("shared_storage");

        mock_adb.expect_shell().returning(|cmd, _| {
            if cmd.starts_with("ls -d") {
                if cmd.contains("Missing") {
                    Ok(cmd_output(1, "", "ls: /sdcard/Missing: No such file or directory"))
                } else {
                    Ok(ok_output("ok\n"))
                }
            } else if cmd.contains("'/sdcard/DCIM'") {
                assert!(cmd.ends_with("head -n 3"));
                Ok(ok_output("/sdcard/DCIM/a.jpg\n/sdcard/DCIM/b.jpg\n"))
            } else if cmd.contains("'/sdcard/Download'") {
                assert!(cmd.ends_with("head -n 1"));
                Ok(ok_output("/sdcard/Download/c.pdf\n"))
            } else {
                panic!("unexpected command {}", cmd);
            }
        });
        mock_adb.expect_pull().times(3).returning(|remote, local| {
            if remote.ends_with("b.jpg") {
                Ok(cmd_output(1, "", "adb: error: permission denied"))
            } else {
                fs::write(local, b"data").expect("write pulled");
                Ok(ok_output(""))
            }
        });

        let report = harvest(
            &mock_adb,
            &["/sdcard/Missing", "/sdcard/DCIM", "/sdcard/Download", "/sdcard/Pictures"],
            3,
            &dest,
            T,
        );
        assert_eq!(report.listed, 3);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.pulled, 2);
        assert_eq!(report.failed, 1);
        assert!(dest.join("DCIM/a.jpg").exists());
        assert!(dest.join("Download/c.pdf").exists());
    }

    #[rstest]
    fn test_duplicates_ignored(tmp_context: TestContext, mut mock_adb: MockAdb) {
        mock_adb.expect_shell().returning(|cmd, _| {
            if cmd.starts_with("ls -d") {
                Ok(ok_output("ok\n"))
            } else {
                Ok(ok_output("/sdcard/DCIM/a.jpg\n"))
            }
        });
        mock_adb.expect_pull().times(1).returning(|_, local| {
            fs::write(local, b"data").expect("write pulled");
            Ok(ok_output(""))
        });

        let report = harvest(
            &mock_adb,
            &["/sdcard/DCIM", "/storage/emulated/0/DCIM"],
            10,
            &tmp_context.to_abs("shared_storage"),
            T,
        );
        assert_eq!(report.listed, 1);
        assert_eq!(report.pulled, 1);
    }
}
