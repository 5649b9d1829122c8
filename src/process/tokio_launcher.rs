//! # Launcher backed by `tokio::process`.
//!
//! Every process is started in the protocol directory with stdin closed and
//! stdout/stderr forwarded line by line to `tracing`, prefixed with the
//! request's log prefix and the pid. A waiter task reports the exit on the
//! channel handed to [`TokioLauncher::new`].
//!
//! Must be used from within a tokio runtime.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ProtoError;
use crate::process::launcher::{ExitCode, LaunchRequest, Launcher, ProcessExit, ProcessHandle};

/// Production [`Launcher`].
#[derive(Debug)]
pub struct TokioLauncher {
    dir: PathBuf,
    exits: mpsc::UnboundedSender<ProcessExit>,
    next_id: u64,
}

impl TokioLauncher {
    /// Creates a launcher that starts processes in `dir` and reports exits on `exits`.
    pub fn new(dir: impl Into<PathBuf>, exits: mpsc::UnboundedSender<ProcessExit>) -> Self {
        Self {
            dir: dir.into(),
            exits,
            next_id: 0,
        }
    }
}

impl Launcher for TokioLauncher {
    fn launch(&mut self, request: LaunchRequest) -> Result<ProcessHandle, ProtoError> {
        let spawn_error = |reason: String| ProtoError::Spawn {
            program: request.program().to_string(),
            reason,
        };
        let Some((program, args)) = request.argv.split_first() else {
            return Err(spawn_error("empty command".to_string()));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for entry in &request.env {
            match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    cmd.env(key, value);
                }
                _ => debug!(entry = %entry, "ignoring environment entry without '='"),
            }
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(e.to_string()))?;
        let Some(pid) = child.id() else {
            return Err(spawn_error("process exited before it could be tracked".to_string()));
        };

        self.next_id += 1;
        let handle = ProcessHandle {
            id: self.next_id,
            pid,
        };

        let prefix: Arc<str> = request.log_prefix.as_str().into();
        if let Some(out) = child.stdout.take() {
            forward_output(out, Arc::clone(&prefix), pid);
        }
        if let Some(err) = child.stderr.take() {
            forward_output(err, Arc::clone(&prefix), pid);
        }

        let exits = self.exits.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => match (status.code(), status.signal()) {
                    (Some(code), _) => ExitCode::Exited(code),
                    (None, Some(signo)) => ExitCode::Signaled(signo),
                    (None, None) => ExitCode::Exited(-1),
                },
                Err(e) => {
                    warn!(%prefix, pid, error = %e, "failed to wait for process");
                    ExitCode::Exited(-1)
                }
            };
            let _ = exits.send(ProcessExit { handle, code });
        });

        Ok(handle)
    }

    fn signal(&mut self, handle: ProcessHandle, sig: Option<Signal>) {
        let Ok(raw) = i32::try_from(handle.pid) else {
            return;
        };
        if let Err(e) = signal::kill(Pid::from_raw(raw), sig) {
            debug!(pid = handle.pid, signal = ?sig, error = %e, "signal not delivered");
        }
    }
}

fn forward_output<R>(reader: R, prefix: Arc<str>, pid: u32)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "protovisor::process", "{prefix} ({pid}): {line}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_exit_code() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut launcher = TokioLauncher::new("/", tx);

        let handle = launcher
            .launch(LaunchRequest::new(
                vec!["/bin/sh".into(), "-c".into(), "exit 3".into()],
                "test",
            ))
            .expect("spawned");

        let exit = rx.recv().await.expect("exit");
        assert_eq!(exit.handle, handle);
        assert_eq!(exit.code, ExitCode::Exited(3));
    }

    #[tokio::test]
    async fn passes_extra_environment() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut launcher = TokioLauncher::new("/", tx);

        launcher
            .launch(
                LaunchRequest::new(
                    vec!["/bin/sh".into(), "-c".into(), "exit $ERROR".into()],
                    "test",
                )
                .with_env(vec!["ERROR=7".into()]),
            )
            .expect("spawned");

        assert_eq!(rx.recv().await.expect("exit").code, ExitCode::Exited(7));
    }

    #[tokio::test]
    async fn kill_reports_signal() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut launcher = TokioLauncher::new("/", tx);

        let handle = launcher
            .launch(LaunchRequest::new(
                vec!["/bin/sh".into(), "-c".into(), "exec sleep 30".into()],
                "test",
            ))
            .expect("spawned");
        launcher.kill(handle);

        let exit = rx.recv().await.expect("exit");
        assert_eq!(exit.code, ExitCode::Signaled(Signal::SIGKILL as i32));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut launcher = TokioLauncher::new("/", tx);

        let err = launcher
            .launch(LaunchRequest::new(vec!["./does-not-exist.sh".into()], "test"))
            .unwrap_err();
        assert_eq!(err.as_label(), "proto_spawn_error");
    }
}
