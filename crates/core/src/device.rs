//! Device command channel.
//!
//! The engine only needs three things from a device: the accessibility tree
//! dump, a PNG screenshot and a tap. [`DeviceChannel`] is that seam; the
//! [`AdbChannel`] implementation shells out to `adb`, bounding every call
//! with a timeout.

use crate::config::{Config, Timeouts};
use crate::error::{AppError, Result};
use std::io::{Read, Write};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

const DUMP_PATH: &str = "/sdcard/ui_dump.xml";

/// Everything the engine consumes from a device.
pub trait DeviceChannel: Send + Sync {
    /// Dumps the accessibility tree and returns its text.
    fn dump_tree(&self, device: Option<&str>, timeouts: &Timeouts) -> Result<String>;

    /// Captures the current screen as PNG bytes.
    fn capture_screenshot(&self, device: Option<&str>, timeout: Duration) -> Result<Vec<u8>>;

    /// Taps at device pixel coordinates.
    fn send_tap(&self, device: Option<&str>, x: i32, y: i32) -> Result<()>;
}

/// [`DeviceChannel`] backed by the `adb` executable.
pub struct AdbChannel {
    adb_path: String,
    default_device: Option<String>,
    tap_delay: Duration,
}

impl AdbChannel {
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            default_device: None,
            tap_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            adb_path: config.adb_path.clone(),
            default_device: config.default_device.clone(),
            tap_delay: config.tap_delay,
        }
    }

    fn command(&self, device: Option<&str>, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(id) = device.or(self.default_device.as_deref()) {
            cmd.args(["-s", id]);
        }
        cmd.args(args);
        cmd
    }

    fn run(&self, device: Option<&str>, args: &[&str], timeout: Duration) -> Result<Output> {
        let cmd = self.command(device, args);
        let output = run_with_timeout(cmd, None, timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::capture(format!(
                "adb {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

impl DeviceChannel for AdbChannel {
    fn dump_tree(&self, device: Option<&str>, timeouts: &Timeouts) -> Result<String> {
        // uiautomator sometimes reports failure while still writing a usable
        // file, so only the read-back decides.
        let dump = self.command(device, &["shell", "uiautomator", "dump", DUMP_PATH]);
        match run_with_timeout(dump, None, timeouts.dump) {
            Ok(out) if !out.status.success() => {
                warn!(status = %out.status, "uiautomator dump returned non-zero")
            }
            Ok(_) => {}
            Err(e) => return Err(e),
        }

        let output = self.run(device, &["shell", "cat", DUMP_PATH], timeouts.dump_read)?;
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = text.len(), "hierarchy dump read back");
        Ok(text)
    }

    fn capture_screenshot(&self, device: Option<&str>, timeout: Duration) -> Result<Vec<u8>> {
        let output = self.run(device, &["exec-out", "screencap", "-p"], timeout)?;
        if output.stdout.is_empty() {
            return Err(AppError::capture("screencap returned no data"));
        }
        debug!(bytes = output.stdout.len(), "screenshot captured");
        Ok(output.stdout)
    }

    fn send_tap(&self, device: Option<&str>, x: i32, y: i32) -> Result<()> {
        let (x, y) = (x.to_string(), y.to_string());
        self.run(
            device,
            &["shell", "input", "tap", &x, &y],
            Duration::from_secs(10),
        )?;
        if !self.tap_delay.is_zero() {
            thread::sleep(self.tap_delay);
        }
        Ok(())
    }
}

/// Runs `cmd` to completion, killing it once `timeout` elapses.
///
/// Stdout and stderr are drained on their own threads so a chatty child
/// (a multi-megabyte screencap) cannot block on a full pipe.
pub fn run_with_timeout(mut cmd: Command, stdin: Option<Vec<u8>>, timeout: Duration) -> Result<Output> {
    let shown = describe(&cmd);
    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| AppError::capture(format!("failed to start `{shown}`: {e}")))?;

    let writer = match (stdin, child.stdin.take()) {
        (Some(bytes), Some(mut pipe)) => Some(thread::spawn(move || {
            // The child may exit before reading everything; that surfaces
            // through its status instead.
            let _ = pipe.write_all(&bytes);
        })),
        _ => None,
    };
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            warn!(command = %shown, ?timeout, "command timed out");
            return Err(AppError::Timeout {
                command: shown,
                after: timeout,
            });
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::Io(e));
        }
    };

    if let Some(writer) = writer {
        let _ = writer.join();
    }
    Ok(Output {
        status,
        stdout: join_drain(stdout),
        stderr: join_drain(stderr),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
