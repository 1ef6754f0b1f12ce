//! Unix child process management for PTY sessions.
//!
//! Children are spawned through `tokio::process::Command` with the slave
//! side of the PTY as their standard streams. By default each child becomes
//! a session leader with the PTY as its controlling terminal, so its process
//! group id equals its pid and signals can target the whole job.

use std::ffi::OsStr;
use std::io;
use std::os::unix::io::OwnedFd;
use std::process::Stdio;

use futures::future::BoxFuture;
use rustix::io::Errno;
use rustix::process::{Pid, Signal, kill_process_group};
use tokio::process::{Child as TokioChild, Command};

use crate::config::{PtyConfig, PtySignal};
use crate::error::{PtyError, Result, errno_to_io};
use crate::traits::{ExitStatus, PtyChild};

/// Unix child process handle.
pub struct UnixPtyChild {
    child: TokioChild,
    pid: u32,
    status: Option<ExitStatus>,
}

impl std::fmt::Debug for UnixPtyChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixPtyChild")
            .field("pid", &self.pid)
            .field("status", &self.status)
            .finish()
    }
}

impl UnixPtyChild {
    fn new(child: TokioChild) -> Result<Self> {
        let pid = child.id().ok_or_else(|| {
            PtyError::Spawn(io::Error::other("child exited before its pid was read"))
        })?;
        Ok(Self {
            child,
            pid,
            status: None,
        })
    }

    fn record(&mut self, status: std::process::ExitStatus) -> ExitStatus {
        let status = ExitStatus::from(status);
        tracing::debug!(pid = self.pid, %status, "child reaped");
        self.status = Some(status);
        status
    }
}

impl PtyChild for UnixPtyChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<ExitStatus>> {
        Box::pin(async move {
            if let Some(status) = self.status {
                return Ok(status);
            }
            let status = self.child.wait().await.map_err(PtyError::Wait)?;
            Ok(self.record(status))
        })
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        match self.child.try_wait().map_err(PtyError::Wait)? {
            Some(status) => Ok(Some(self.record(status))),
            None => Ok(None),
        }
    }

    fn signal(&self, signal: PtySignal) -> Result<()> {
        if self.status.is_some() {
            return Ok(());
        }

        let pid = Pid::from_raw(self.pid as i32).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))
        })?;
        let sig = Signal::from_named_raw(signal.as_unix_signal()).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid signal"))
        })?;

        tracing::trace!(pid = self.pid, %signal, "signalling process group");
        match kill_process_group(pid, sig) {
            Ok(()) | Err(Errno::SRCH) => Ok(()),
            Err(e) => Err(PtyError::Signal(errno_to_io(e))),
        }
    }

    fn kill(&mut self) -> Result<()> {
        self.signal(PtySignal::Kill)?;
        if self.status.is_none() {
            // The group may already be gone while the leader is still unreaped.
            let _ = self.child.start_kill();
        }
        Ok(())
    }
}

fn reject_nul(value: &OsStr, kind: impl FnOnce() -> String) -> Result<()> {
    if value.as_encoded_bytes().contains(&0) {
        return Err(PtyError::NulByte { kind: kind() });
    }
    Ok(())
}

/// Spawn a child process with the given slave PTY as its standard streams.
///
/// The slave descriptor is consumed; the parent's copy is closed when this
/// returns so that the master sees EOF once the child side goes away.
pub fn spawn_child<S, I>(
    slave: OwnedFd,
    program: S,
    args: I,
    config: &PtyConfig,
) -> Result<UnixPtyChild>
where
    S: AsRef<OsStr>,
    I: IntoIterator,
    I::Item: AsRef<OsStr>,
{
    let program = program.as_ref();
    reject_nul(program, || "program".to_string())?;

    let mut cmd = Command::new(program);
    for (idx, arg) in args.into_iter().enumerate() {
        let arg = arg.as_ref();
        reject_nul(arg, || format!("argument[{idx}]"))?;
        cmd.arg(arg);
    }

    cmd.env_clear();
    cmd.envs(config.env.resolve());

    if let Some(dir) = &config.cwd {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::from(slave.try_clone().map_err(PtyError::Spawn)?));
    cmd.stdout(Stdio::from(slave.try_clone().map_err(PtyError::Spawn)?));
    cmd.stderr(Stdio::from(slave));
    cmd.kill_on_drop(true);

    if config.new_session {
        // SAFETY: the hook only calls setsid and ioctl, both async-signal-safe.
        // Standard streams are already attached to the slave when it runs.
        #[allow(unsafe_code)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                if libc::ioctl(0, libc::TIOCSCTTY, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    } else {
        cmd.process_group(0);
    }

    let child = cmd.spawn().map_err(PtyError::Spawn)?;
    let child = UnixPtyChild::new(child)?;
    tracing::debug!(pid = child.pid, program = %program.to_string_lossy(), "spawned child");

    Ok(child)
}
