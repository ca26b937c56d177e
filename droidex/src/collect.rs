use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::adb::Adb;
use crate::utils::ensure_dir_exists;

/// Read only device state dumps, `(output file, shell command)`
pub const SYSTEM_DUMP_COMMANDS: &[(&str, &str)] = &[
    ("getprop.txt", "getprop"),
    ("packages.txt", "pm list packages -f"),
    ("battery.txt", "dumpsys batterystats"),
    ("network.txt", "ip addr"),
    ("usage_stats.txt", "dumpsys usagestats"),
    ("permissions.txt", "pm list permissions -g"),
];

/// Live content provider queries, `(output file, shell command)`
pub const CONTENT_QUERIES: &[(&str, &str)] = &[
    ("sms.txt", "content query --uri content://sms"),
    ("calls.txt", "content query --uri content://call_log/calls"),
    ("contacts.txt", "content query --uri content://contacts/phones"),
    (
        "calendar.txt",
        "content query --uri content://com.android.calendar/events",
    ),
    (
        "user_dictionary.txt",
        "content query --uri content://user_dictionary/words",
    ),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub attempted: usize,
    /// Commands that exited cleanly with something on stdout
    pub non_empty: usize,
    pub files: Vec<PathBuf>,
}

/// Run every command in `commands`, writing its output to `dir`.
///
/// Output is kept whatever the exit status, a permission denial is itself
/// worth having. A transport failure is written into the file in place of
/// the output. Nothing here fails the caller.
pub fn collect(
    adb: &dyn Adb,
    dir: &Path,
    commands: &[(&str, &str)],
    timeout: Duration,
) -> CollectionReport {
    let mut report = CollectionReport::default();

    if let Err(e) = ensure_dir_exists(dir) {
        log::warn!("failed to create {:?}: {}", dir, e);
    }

    for (name, cmd) in commands {
        report.attempted += 1;

        let content = match adb.shell(cmd, timeout) {
            Ok(out) => {
                if out.ok() && !out.stdout.is_empty() {
                    report.non_empty += 1;
                } else {
                    log::debug!("`{}` exited with {} ({} bytes)", cmd, out.code(), out.stdout.len());
                }
                out.combined_output()
            }
            Err(e) => {
                log::warn!("`{}` failed: {}", cmd, e);
                format!("Error: {}\n", e).into_bytes()
            }
        };

        let dest = dir.join(name);
        match fs::write(&dest, content) {
            Ok(()) => report.files.push(dest),
            Err(e) => log::warn!("failed to write {:?}: {}", dest, e),
        }
    }

    report
}

pub fn collect_system_dump(adb: &dyn Adb, dir: &Path, timeout: Duration) -> CollectionReport {
    collect(adb, dir, SYSTEM_DUMP_COMMANDS, timeout)
}

pub fn collect_content_queries(adb: &dyn Adb, dir: &Path, timeout: Duration) -> CollectionReport {
    collect(adb, dir, CONTENT_QUERIES, timeout)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{cmd_output, mock_adb, ok_output, tmp_context, MockAdb, TestContext};
    use rstest::*;

    #[rstest]
    fn test_output_kept_regardless_of_status(tmp_context: TestContext, mut mock_adb: MockAdb) {
        let dir = tmp_context.to_abs("system_dump");
        mock_adb.expect_shell().returning(|cmd, _| match cmd {
            "getprop" => Ok(ok_output("[ro.product.model]: [Pixel 7]\n")),
            "dumpsys usagestats" => Ok(cmd_output(
                255,
                "",
                "Permission Denial: can't dump UsageStats from pid=1234\n",
            )),
            "ip addr" => Err(crate::Error::CommandTimeout(
                "adb shell ip addr".into(),
                Duration::from_secs(20),
            )),
            _ => Ok(ok_output("ok\n")),
        });

        let report = collect_system_dump(&mock_adb, &dir, Duration::from_secs(20));
        assert_eq!(report.attempted, SYSTEM_DUMP_COMMANDS.len());
        assert_eq!(report.files.len(), SYSTEM_DUMP_COMMANDS.len());
        assert_eq!(report.non_empty, SYSTEM_DUMP_COMMANDS.len() - 2);

        let usage = fs::read_to_string(dir.join("usage_stats.txt")).expect("usage");
        assert!(usage.contains("Permission Denial"));
        let net = fs::read_to_string(dir.join("network.txt")).expect("network");
        assert!(net.starts_with("Error: "));
        let props = fs::read_to_string(dir.join("getprop.txt")).expect("getprop");
        assert!(props.contains("Pixel 7"));
    }

    #[rstest]
    fn test_content_queries(tmp_context: TestContext, mut mock_adb: MockAdb) {
        let dir = tmp_context.to_abs("content_query");
        mock_adb
            .expect_shell()
            .times(CONTENT_QUERIES.len())
            .returning(|cmd, _| {
                assert!(cmd.starts_with("content query --uri content://"));
                Ok(ok_output("Row: 0 _id=1, address=555\n"))
            });
        let report = collect_content_queries(&mock_adb, &dir, Duration::from_secs(20));
        assert_eq!(report.non_empty, CONTENT_QUERIES.len());
        assert!(dir.join("user_dictionary.txt").exists());
    }
}
