use std::path::PathBuf;
use std::time::Duration;

use droidex_proc_macro::wraps_base_error;

use crate::adb::{Adb, DeviceEntry, DeviceState};
use crate::command::run_cmd_timeout;
use crate::errors::ErrorKind;
use crate::Context;

/// Name handed to the system search path when nothing else responds
pub const FALLBACK_ADB: &'static str = "adb";

#[wraps_base_error]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("adb executable `{0}` not found")]
    NotFound(String),

    #[error("adb exited with status {0}: {1}")]
    NonZeroExit(i32, String),

    #[error("adb did not respond within {0:?}")]
    Timeout(Duration),

    #[error("no device found")]
    NoDevice,

    #[error("device {0} is unauthorized, accept the USB debugging prompt")]
    Unauthorized(String),

    #[error("device {0} is offline")]
    Offline(String),

    #[error("device {0} is not ready ({1})")]
    NotReady(String, String),

    #[error("device {0} is not attached")]
    NotAttached(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoDevice
            | Self::Unauthorized(_)
            | Self::Offline(_)
            | Self::NotReady(..)
            | Self::NotAttached(_) => ErrorKind::DeviceNotConnected,
            _ => ErrorKind::TransportUnavailable,
        }
    }

    fn from_base(err: crate::Error) -> Self {
        match err {
            crate::Error::MissingBin(bin) => Self::NotFound(bin),
            crate::Error::CommandTimeout(_, dur) => Self::Timeout(dur),
            crate::Error::CommandError(code, stderr) => Self::NonZeroExit(code, stderr),
            e => Self::Base(e),
        }
    }
}

/// Candidate adb executables, most specific first
fn candidates(ctx: &dyn Context) -> Vec<String> {
    let mut found = Vec::new();

    if let Some(v) = ctx.maybe_get_env("DROIDEX_ADB") {
        found.push(v);
    }

    if let Ok(cfg) = ctx.get_config() {
        if let Some(v) = &cfg.adb.executable {
            found.push(v.clone());
        }
    }

    for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
        if let Some(home) = ctx.maybe_get_env(var) {
            let adb = PathBuf::from(home)
                .join("platform-tools")
                .join(platform_bin_name());
            found.push(adb.to_string_lossy().into());
        }
    }

    if let Some(v) = ctx.maybe_get_bin(FALLBACK_ADB) {
        found.push(v);
    }

    found.extend(platform_defaults(ctx));
    found.dedup();
    found
}

#[cfg(windows)]
fn platform_bin_name() -> &'static str {
    "adb.exe"
}

#[cfg(not(windows))]
fn platform_bin_name() -> &'static str {
    "adb"
}

#[cfg(windows)]
fn platform_defaults(ctx: &dyn Context) -> Vec<String> {
    let mut found = Vec::new();
    if let Some(local) = ctx.maybe_get_env("LOCALAPPDATA") {
        found.push(format!("{}\\Android\\Sdk\\platform-tools\\adb.exe", local));
    }
    if let Some(pf) = ctx.maybe_get_env("ProgramFiles") {
        found.push(format!("{}\\Android\\android-sdk\\platform-tools\\adb.exe", pf));
    }
    found
}

#[cfg(not(windows))]
fn platform_defaults(_ctx: &dyn Context) -> Vec<String> {
    vec!["/usr/bin/adb".into(), "/usr/local/bin/adb".into()]
}

fn responds(bin: &str, timeout: Duration) -> bool {
    match run_cmd_timeout(bin, &["version"], None, timeout) {
        Ok(out) => out.ok(),
        Err(e) => {
            log::trace!("adb candidate {} rejected: {}", bin, e);
            false
        }
    }
}

/// Find the adb executable to use.
///
/// Each candidate is probed with `adb version` and the first one that answers
/// wins. If none do the bare name is returned and left to the search path.
pub fn locate(ctx: &dyn Context) -> String {
    let timeout = ctx
        .get_config()
        .map(|it| it.timeouts.version)
        .unwrap_or(Duration::from_secs(5));

    for cand in candidates(ctx) {
        // Skip the spawn for absolute paths that plainly aren't there
        let as_path = PathBuf::from(&cand);
        if as_path.is_absolute() && !as_path.exists() {
            continue;
        }
        if responds(&cand, timeout) {
            log::debug!("using adb at {}", cand);
            return cand;
        }
    }

    log::debug!("no adb candidate responded, falling back to `{}`", FALLBACK_ADB);
    FALLBACK_ADB.into()
}

/// Make sure the transport executable runs, returning the first line of
/// `adb version` on success.
pub fn check_available(adb: &dyn Adb) -> Result<String, Error> {
    let out = adb.version().map_err(Error::from_base)?;
    if !out.ok() {
        return Err(Error::NonZeroExit(
            out.code(),
            out.stderr_utf8_lossy().trim().into(),
        ));
    }
    let stdout = out.stdout_utf8_lossy();
    let line = stdout.lines().next().unwrap_or("").trim();
    Ok(line.into())
}

fn not_ready(entry: DeviceEntry) -> Error {
    match entry.state {
        DeviceState::Unauthorized => Error::Unauthorized(entry.serial),
        DeviceState::Offline => Error::Offline(entry.serial),
        DeviceState::Device => unreachable!("only called for devices that aren't ready"),
        DeviceState::Other(state) => Error::NotReady(entry.serial, state),
    }
}

/// Pick the device acquisition will talk to.
///
/// With a pinned serial only that entry counts, another ready device doesn't
/// help since every command goes to `-s <serial>`. Otherwise the first ready
/// device wins.
pub fn select_device(devices: Vec<DeviceEntry>, serial: Option<&str>) -> Result<DeviceEntry, Error> {
    if let Some(serial) = serial {
        return match devices.into_iter().find(|it| it.serial == serial) {
            Some(v) if v.is_ready() => Ok(v),
            Some(v) => Err(not_ready(v)),
            None => Err(Error::NotAttached(serial.into())),
        };
    }

    if let Some(ready) = devices.iter().find(|it| it.is_ready()) {
        return Ok(ready.clone());
    }

    match devices.into_iter().next() {
        Some(v) => Err(not_ready(v)),
        None => Err(Error::NoDevice),
    }
}

/// Find the device commands will run against.
///
/// Attached devices that aren't ready (unauthorized, offline) are reported
/// as such, an empty listing is `NoDevice`.
pub fn check_device_connected(adb: &dyn Adb) -> Result<DeviceEntry, Error> {
    let devices = adb.get_connected_devices().map_err(Error::from_base)?;
    select_device(devices, adb.serial())
}
