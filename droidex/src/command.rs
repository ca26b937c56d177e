use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::Level::Debug;
use log::{debug, log_enabled};

/// How often a timed child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct CmdOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CmdOutput {
    /// Converts to a `Result` object that is `Ok` only if the [ExitStatus] is
    /// success.
    pub fn err_on_status(self) -> crate::Result<Self> {
        if self.status.success() {
            return Ok(self);
        }

        // Killed by a signal, there is no code to report
        let code = self.status.code().unwrap_or(-1);

        Err(crate::Error::CommandError(
            code,
            self.stderr_utf8_lossy().to_string(),
        ))
    }

    #[inline]
    pub fn ok(&self) -> bool {
        self.status.success()
    }

    #[inline]
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    #[inline]
    pub fn stdout_contains(&self, needle: &str) -> bool {
        self.stdout_utf8_lossy().contains(needle)
    }

    #[inline]
    pub fn stderr_contains(&self, needle: &str) -> bool {
        self.stderr_utf8_lossy().contains(needle)
    }

    #[inline]
    pub fn stdout_utf8_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    #[inline]
    pub fn stderr_utf8_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Stdout followed by stderr, the way a terminal would have shown them
    pub fn combined_output(&self) -> Vec<u8> {
        let mut all = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        all.extend_from_slice(&self.stdout);
        all.extend_from_slice(&self.stderr);
        all
    }
}

impl From<Output> for CmdOutput {
    fn from(output: Output) -> Self {
        Self {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Quotes a string with single quotes
pub fn quote(s: &str) -> String {
    let mut new = String::with_capacity(s.len() + 2);
    new.push('\'');
    for c in s.chars() {
        if c == '\'' {
            new.push_str("'\"'\"'");
        } else {
            new.push(c);
        }
    }
    new.push('\'');
    new
}

/// Run a command, killing it if it hasn't finished within `timeout`.
///
/// If `stdin` is given it is written to the child and the pipe is closed,
/// otherwise the child gets a null stdin. The child is killed and reaped on
/// expiry, the transport can hang forever on an unresponsive device so this
/// never relies on the child exiting by itself.
pub fn run_cmd_timeout<C, S>(
    cmd: C,
    args: &[S],
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> crate::Result<CmdOutput>
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    if log_enabled!(Debug) {
        log_cmd(&cmd, args);
    }

    let mut child = Command::new(cmd.as_ref())
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .spawn()
        .map_err(|e| spawn_error(&cmd, e))?;

    let out = child.stdout.take().map(drain);
    let err = child.stderr.take().map(drain);

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            // The child may exit without reading, that isn't our problem
            if let Err(e) = pipe.write_all(input) {
                log::debug!("failed to write child stdin: {}", e);
            }
        }
    }

    let status = match wait_deadline(&mut child, timeout)? {
        Some(status) => status,
        None => {
            log::warn!(
                "`{}` exceeded {:?}, killing it",
                cmd.as_ref().to_string_lossy(),
                timeout
            );
            if let Err(e) = child.kill() {
                log::error!("failed to kill child: {}", e);
            }
            let _ = child.wait();
            // Readers finish once the pipes close
            join_drain(out);
            join_drain(err);
            return Err(crate::Error::CommandTimeout(
                cmd_string(&cmd, args),
                timeout,
            ));
        }
    };

    Ok(CmdOutput {
        status,
        stdout: join_drain(out),
        stderr: join_drain(err),
    })
}

fn wait_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            log::debug!("error reading child pipe: {}", e);
        }
        buf
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn spawn_error<C: AsRef<OsStr>>(cmd: &C, err: io::Error) -> crate::Error {
    if err.kind() == io::ErrorKind::NotFound {
        crate::Error::MissingBin(cmd.as_ref().to_string_lossy().into())
    } else {
        err.into()
    }
}

fn cmd_string<C, S>(cmd: &C, args: &[S]) -> String
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    let mut s = String::from(cmd.as_ref().to_string_lossy());
    for a in args {
        s.push(' ');
        s.push_str(&a.as_ref().to_string_lossy());
    }
    s
}

pub fn log_cmd<C, S>(cmd: &C, args: &[S])
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    debug!("Running command: `{}`", cmd_string(cmd, args));
}
