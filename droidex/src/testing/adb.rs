use std::process::ExitStatus;
use std::time::Duration;

use mockall::mock;
use rstest::fixture;

use crate::command::CmdOutput;

mock! {
    pub Adb {

    }

    impl crate::adb::Adb for Adb {
        fn version(&self) -> crate::Result<CmdOutput>;
        fn devices(&self) -> crate::Result<CmdOutput>;
        fn root(&self) -> crate::Result<CmdOutput>;
        fn shell(&self, shell_cmd: &str, timeout: Duration) -> crate::Result<CmdOutput>;
        fn pull(&self, device: &str, local: &str) -> crate::Result<CmdOutput>;
        fn backup(&self, dest: &str, packages: &[String]) -> crate::Result<CmdOutput>;
    }
}

#[fixture]
pub fn mock_adb() -> MockAdb {
    MockAdb::new()
}

#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(code as u32)
}

/// Fabricate a `CmdOutput` with the given exit code
pub fn cmd_output(code: i32, stdout: &str, stderr: &str) -> CmdOutput {
    CmdOutput {
        status: exit_status(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

pub fn ok_output(stdout: &str) -> CmdOutput {
    cmd_output(0, stdout, "")
}

/// `adb devices` output listing a single ready device
pub fn devices_output(serial: &str) -> CmdOutput {
    ok_output(&format!("List of devices attached\n{}\tdevice\n\n", serial))
}
