use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adb::Adb;

const ROOT_UID_MARKER: &'static str = "uid=0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeStatus {
    pub elevated: bool,
    pub message: String,
}

impl PrivilegeStatus {
    fn elevated() -> Self {
        Self {
            elevated: true,
            message: String::from("Root access enabled"),
        }
    }

    fn unavailable(detail: Option<String>) -> Self {
        let message = match detail {
            Some(d) => format!(
                "Root access not available (some files may be inaccessible): {}",
                d
            ),
            None => String::from("Root access not available (some files may be inaccessible)"),
        };
        Self {
            elevated: false,
            message,
        }
    }
}

/// Try to get a root shell on the device.
///
/// Asks adbd to restart as root, waits `settle` for the transport to come
/// back, then checks `id` through `su` and directly. This never fails, the
/// caller decides what a missing root shell means.
pub fn negotiate(adb: &dyn Adb, settle: Duration, verify_timeout: Duration) -> PrivilegeStatus {
    // Production builds refuse `adb root`, that alone doesn't rule out su
    match adb.root() {
        Ok(out) => log::debug!("adb root: {}", out.stdout_utf8_lossy().trim()),
        Err(e) => log::debug!("adb root failed: {}", e),
    }

    if !settle.is_zero() {
        thread::sleep(settle);
    }

    let mut last_err = None;

    for use_su in [true, false] {
        let (name, res) = if use_su {
            ("su -c id", adb.shell_su("id", verify_timeout))
        } else {
            ("id", adb.shell("id", verify_timeout))
        };
        match res {
            Ok(out) if out.stdout_contains(ROOT_UID_MARKER) => {
                log::info!("root confirmed via `{}`", name);
                return PrivilegeStatus::elevated();
            }
            Ok(_) => log::debug!("`{}` did not report uid 0", name),
            Err(e) => {
                log::debug!("`{}` failed: {}", name, e);
                last_err = Some(e.to_string());
            }
        }
    }

    PrivilegeStatus::unavailable(last_err)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{cmd_output, mock_adb, ok_output, MockAdb};
    use rstest::*;

    const NO_WAIT: Duration = Duration::ZERO;
    const VERIFY: Duration = Duration::from_secs(5);

    #[rstest]
    fn test_root_via_su(mut mock_adb: MockAdb) {
        mock_adb
            .expect_root()
            .times(1)
            .returning(|| Ok(ok_output("adbd cannot run as root in production builds\n")));
        mock_adb
            .expect_shell()
            .withf(|cmd, _| cmd == "su -c 'id'")
            .times(1)
            .returning(|_, _| Ok(ok_output("uid=0(root) gid=0(root) groups=0(root)\n")));

        let status = negotiate(&mock_adb, NO_WAIT, VERIFY);
        assert!(status.elevated);
        assert_eq!(status.message, "Root access enabled");
    }

    #[rstest]
    fn test_root_via_adbd(mut mock_adb: MockAdb) {
        mock_adb
            .expect_root()
            .returning(|| Ok(ok_output("restarting adbd as root\n")));
        mock_adb
            .expect_shell()
            .withf(|cmd, _| cmd == "su -c 'id'")
            .returning(|_, _| Ok(cmd_output(127, "", "/system/bin/sh: su: not found\n")));
        mock_adb
            .expect_shell()
            .withf(|cmd, _| cmd == "id")
            .returning(|_, _| Ok(ok_output("uid=0(root) gid=0(root)\n")));

        assert!(negotiate(&mock_adb, NO_WAIT, VERIFY).elevated);
    }

    #[rstest]
    fn test_no_root(mut mock_adb: MockAdb) {
        mock_adb
            .expect_root()
            .returning(|| Err(crate::Error::CommandTimeout("adb root".into(), VERIFY)));
        mock_adb
            .expect_shell()
            .returning(|_, _| Ok(ok_output("uid=2000(shell) gid=2000(shell)\n")));

        let status = negotiate(&mock_adb, NO_WAIT, VERIFY);
        assert!(!status.elevated);
        assert!(status.message.starts_with("Root access not available"));
    }
}
