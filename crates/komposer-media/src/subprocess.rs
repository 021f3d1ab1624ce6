//! The single owner of `std::process::Command` in this workspace.
//!
//! Every external tool invocation — ffprobe for the Probe Cache, ffmpeg for
//! the Executor — goes through [`run_with_timeout`], so there is exactly one
//! place that enforces the per-invocation deadline (spec §5 "Cancellation &
//! timeouts").

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How long the watchdog waits after a graceful terminate request before
/// escalating to `kill()` (spec §5: "terminated, escalating to kill after a
/// short grace period").
const TERMINATE_GRACE_PERIOD: Duration = Duration::from_millis(300);

/// The result of running an external tool to completion or to its deadline.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code, if it exited normally (not killed).
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: Vec<u8>,
    /// Captured stderr.
    pub stderr: Vec<u8>,
    /// `true` if the watchdog terminated the process for exceeding its
    /// deadline (whether it exited from the graceful request or was killed
    /// after the grace period).
    pub timed_out: bool,
}

impl CommandOutput {
    /// `true` if the process exited with status 0 and was not killed.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// The last `max_bytes` of stderr, as lossy UTF-8 (spec §4.C "stderr
    /// tail").
    pub fn stderr_tail(&self, max_bytes: usize) -> String {
        let start = self.stderr.len().saturating_sub(max_bytes);
        String::from_utf8_lossy(&self.stderr[start..]).into_owned()
    }
}

/// Sends a graceful terminate request to `child` (`SIGTERM` on unix). A no-op
/// on platforms without a portable graceful-stop signal, where the grace
/// period below simply elapses before `kill()` escalates.
#[cfg(unix)]
#[allow(unsafe_code)]
fn request_graceful_stop(child: &Child) {
    // SAFETY: `child.id()` names a process this `Child` owns; signaling an
    // already-exited pid is a harmless no-op (ESRCH, ignored).
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_graceful_stop(_child: &Child) {}

/// Spawns `program` with `args`, no shell interpretation, and waits up to
/// `timeout`. On deadline, a watchdog thread sends a graceful terminate
/// request and, if the process hasn't exited within
/// [`TERMINATE_GRACE_PERIOD`], escalates to `kill()`; its partial output is
/// the caller's responsibility to discard (spec requires the allocated
/// output path be removed on timeout, which happens one layer up where the
/// path is known).
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> std::io::Result<CommandOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");

    let stdout_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let child = Arc::new(Mutex::new(child));
    let timed_out = Arc::new(AtomicBool::new(false));

    let watchdog = {
        let child = Arc::clone(&child);
        let timed_out = Arc::clone(&timed_out);
        thread::spawn(move || {
            let start = Instant::now();
            loop {
                {
                    let mut guard = child.lock().expect("child mutex poisoned");
                    if matches!(guard.try_wait(), Ok(Some(_))) {
                        return;
                    }
                    if start.elapsed() >= timeout {
                        timed_out.store(true, Ordering::SeqCst);
                        request_graceful_stop(&guard);
                        break;
                    }
                }
                thread::sleep(Duration::from_millis(25));
            }

            let grace_deadline = Instant::now() + TERMINATE_GRACE_PERIOD;
            loop {
                {
                    let mut guard = child.lock().expect("child mutex poisoned");
                    if matches!(guard.try_wait(), Ok(Some(_))) {
                        return;
                    }
                    if Instant::now() >= grace_deadline {
                        let _ = guard.kill();
                        return;
                    }
                }
                thread::sleep(Duration::from_millis(25));
            }
        })
    };

    let status = loop {
        let mut guard = child.lock().expect("child mutex poisoned");
        if let Some(status) = guard.try_wait()? {
            break status;
        }
        drop(guard);
        thread::sleep(Duration::from_millis(25));
    };
    let _ = watchdog.join();

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        timed_out: timed_out.load(Ordering::SeqCst),
    })
}
