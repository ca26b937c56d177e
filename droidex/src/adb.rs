use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{run_cmd_timeout, CmdOutput};
use crate::config::{AcquisitionConfig, Timeouts};
use crate::Context;

/// Default input handed to `adb backup`, some versions ask for a password on
/// the host terminal before waiting on the device.
const BACKUP_STDIN: &[u8] = b"\n";

/// The Adb trait abstracts the handful of `adb` subcommands acquisition needs.
///
/// Every call is bounded by a timeout, an unresponsive device must never hang
/// a run.
pub trait Adb: Send + Sync {
    /// `adb version`
    fn version(&self) -> crate::Result<CmdOutput>;

    /// `adb devices`
    fn devices(&self) -> crate::Result<CmdOutput>;

    /// `adb root`
    fn root(&self) -> crate::Result<CmdOutput>;

    /// Essentially the same as running `adb shell '...'`
    fn shell(&self, shell_cmd: &str, timeout: Duration) -> crate::Result<CmdOutput>;

    /// Essentially the same as running `adb pull $device $local`
    fn pull(&self, device: &str, local: &str) -> crate::Result<CmdOutput>;

    /// `adb backup -f $dest -noapk $packages...`
    ///
    /// This blocks until the user approves (or ignores) the prompt on the
    /// device screen.
    fn backup(&self, dest: &str, packages: &[String]) -> crate::Result<CmdOutput>;

    /// The device serial commands are pinned to, if any
    fn serial(&self) -> Option<&str> {
        None
    }

    /// Returns every entry listed by `adb devices`, regardless of state
    fn get_connected_devices(&self) -> crate::Result<Vec<DeviceEntry>> {
        let output = self.devices()?.err_on_status()?;
        Ok(parse_devices_output(&output.stdout_utf8_lossy()))
    }

    /// Run a command through `su -c` on the device
    fn shell_su(&self, shell_cmd: &str, timeout: Duration) -> crate::Result<CmdOutput> {
        self.shell(
            &format!("su -c {}", crate::command::quote(shell_cmd)),
            timeout,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Device,
    Unauthorized,
    Offline,
    Other(String),
}

impl From<&str> for DeviceState {
    fn from(value: &str) -> Self {
        match value {
            "device" => Self::Device,
            "unauthorized" => Self::Unauthorized,
            "offline" => Self::Offline,
            other => Self::Other(other.into()),
        }
    }
}

impl Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Offline => write!(f, "offline"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub serial: String,
    pub state: DeviceState,
}

impl DeviceEntry {
    pub fn is_ready(&self) -> bool {
        self.state == DeviceState::Device
    }
}

/// Parse the output of `adb devices` (with or without `-l`).
///
/// The first line is a header and is skipped along with blank lines and the
/// `* daemon ...` chatter adb prints when it has to start the server.
pub fn parse_devices_output(output: &str) -> Vec<DeviceEntry> {
    let mut lines = output.lines();
    let mut devices = Vec::new();

    // Skip the header, which may be preceded by daemon startup lines
    for l in lines.by_ref() {
        if l.starts_with("List of devices") {
            break;
        }
    }

    for l in lines {
        let l = l.trim();
        if l.is_empty() || l.starts_with('*') {
            continue;
        }
        let mut split = l.split_ascii_whitespace();
        let (serial, state) = match (split.next(), split.next()) {
            (Some(serial), Some(state)) => (serial, state),
            _ => continue,
        };
        devices.push(DeviceEntry {
            serial: serial.into(),
            state: DeviceState::from(state),
        });
    }

    devices
}

#[derive(Clone)]
/// An `Adb` implementation that just invokes the external `adb` command.
pub struct ExecAdb {
    bin: String,
    serial: Option<String>,
    timeouts: Timeouts,
}

impl ExecAdb {
    /// Creates a new `ExecAdb` from the given context.
    ///
    /// The executable comes from `DROIDEX_ADB`, then the `[adb]` table of the
    /// config, then the probing in [crate::transport::locate]. The serial comes
    /// from the config or `ANDROID_SERIAL`.
    pub fn new(ctx: &dyn Context) -> crate::Result<Self> {
        let cfg = ctx.get_config()?;
        Ok(Self::from_config(ctx, cfg))
    }

    pub fn from_config(ctx: &dyn Context, cfg: &AcquisitionConfig) -> Self {
        let bin = crate::transport::locate(ctx);
        let serial = cfg
            .adb
            .serial
            .clone()
            .or_else(|| ctx.maybe_get_env("ANDROID_SERIAL"));
        Self {
            bin,
            serial,
            timeouts: cfg.timeouts.clone(),
        }
    }

    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    pub fn has_serial(&self) -> bool {
        self.serial.is_some()
    }

    pub fn with_serial(mut self, serial: String) -> Self {
        self.serial = Some(serial);
        self
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }
}

impl Default for ExecAdb {
    fn default() -> Self {
        Self {
            bin: "adb".into(),
            serial: None,
            timeouts: Timeouts::default(),
        }
    }
}

/// Used to build an Adb implementation.
#[derive(Default)]
pub struct Builder {
    bin: Option<String>,
    serial: Option<String>,
    timeouts: Option<Timeouts>,
}

impl Builder {
    pub fn with_bin(mut self, bin: String) -> Self {
        self.bin = Some(bin);
        self
    }

    pub fn with_serial(mut self, serial: String) -> Self {
        self.serial = Some(serial);
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Consume the builder and return an Adb implementation
    pub fn build(self) -> ExecAdb {
        ExecAdb {
            bin: self.bin.unwrap_or_else(|| "adb".into()),
            serial: self.serial,
            timeouts: self.timeouts.unwrap_or_default(),
        }
    }
}

macro_rules! adb_cmd {
    ($adb:ident, $timeout:expr, $stdin:expr, $cmd:literal, $($args:expr),*) => {
        if let Some(ref serial) = $adb.serial {
            run_cmd_timeout(&$adb.bin, &["-s", serial.as_str(), $cmd, $($args),*], $stdin, $timeout)
        } else {
            run_cmd_timeout(&$adb.bin, &[$cmd, $($args),*], $stdin, $timeout)
        }
    }
}

impl Adb for ExecAdb {
    fn version(&self) -> crate::Result<CmdOutput> {
        run_cmd_timeout(&self.bin, &["version"], None, self.timeouts.version)
    }

    fn devices(&self) -> crate::Result<CmdOutput> {
        run_cmd_timeout(&self.bin, &["devices"], None, self.timeouts.devices)
    }

    fn root(&self) -> crate::Result<CmdOutput> {
        adb_cmd!(self, self.timeouts.root, None, "root",)
    }

    fn shell(&self, shell_cmd: &str, timeout: Duration) -> crate::Result<CmdOutput> {
        adb_cmd!(self, timeout, None, "shell", shell_cmd)
    }

    fn pull(&self, device: &str, local: &str) -> crate::Result<CmdOutput> {
        adb_cmd!(self, self.timeouts.pull, None, "pull", device, local)
    }

    fn backup(&self, dest: &str, packages: &[String]) -> crate::Result<CmdOutput> {
        let mut args: Vec<&str> = Vec::with_capacity(packages.len() + 6);
        if let Some(ref serial) = self.serial {
            args.push("-s");
            args.push(serial.as_str());
        }
        args.extend_from_slice(&["backup", "-f", dest, "-noapk"]);
        args.extend(packages.iter().map(String::as_str));
        run_cmd_timeout(&self.bin, &args, Some(BACKUP_STDIN), self.timeouts.backup)
    }

    fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{cmd_output, mock_adb, MockAdb};
    use rstest::*;

    #[rstest]
    fn test_parse_devices_output() {
        let output = "* daemon not running; starting now at tcp:5037\n\
* daemon started successfully\n\
List of devices attached\n\
R58M123ABC\tdevice\n\
emulator-5554\toffline\n\
\n\
0123456789\tunauthorized usb:1-1 transport_id:3\n";
        let devices = parse_devices_output(output);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].serial, "R58M123ABC");
        assert!(devices[0].is_ready());
        assert_eq!(devices[1].state, DeviceState::Offline);
        assert_eq!(devices[2].state, DeviceState::Unauthorized);
        assert!(!devices[2].is_ready());
    }

    #[rstest]
    fn test_parse_devices_output_empty() {
        assert!(parse_devices_output("List of devices attached\n\n").is_empty());
        assert!(parse_devices_output("").is_empty());
    }

    #[rstest]
    fn test_parse_devices_long_format() {
        let output = "List of devices attached\n\
emulator-5554          device product:sdk_gphone64 model:sdk_gphone64 device:emu64 transport_id:1\n";
        let devices = parse_devices_output(output);
        assert_eq!(devices.len(), 1);
        assert!(devices[0].is_ready());
    }

    #[rstest]
    fn test_get_connected_devices(mut mock_adb: MockAdb) {
        mock_adb
            .expect_devices()
            .returning(|| Ok(cmd_output(0, "List of devices attached\nABC\tdevice\n", "")));
        let devices = mock_adb.get_connected_devices().expect("devices");
        assert_eq!(devices[0].serial, "ABC");
    }

    #[rstest]
    fn test_builder() {
        let adb = ExecAdb::builder()
            .with_bin("/opt/platform-tools/adb".into())
            .with_serial("emulator-5554".into())
            .build();
        assert_eq!(adb.bin(), "/opt/platform-tools/adb");
        assert!(adb.has_serial());
        assert_eq!(adb.serial(), Some("emulator-5554"));
        assert_eq!(adb.timeouts(), &Timeouts::default());
        assert!(!ExecAdb::default().has_serial());
        assert_eq!(ExecAdb::default().serial(), None);
    }

    #[rstest]
    fn test_shell_su_quotes(mut mock_adb: MockAdb) {
        mock_adb
            .expect_shell()
            .withf(|cmd, _| cmd == "su -c 'id'")
            .returning(|_, _| Ok(cmd_output(0, "uid=0(root)", "")));
        let out = mock_adb
            .shell_su("id", Duration::from_secs(1))
            .expect("shell_su");
        assert!(out.stdout_contains("uid=0"));
    }
}
