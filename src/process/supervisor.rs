//! # Process Supervisor
//!
//! Owns one external process from defaulting to cleanup.
//!
//! ```text
//! NotStarted ──start()──▶ Starting ──ready──▶ Running ──stop()──▶ Stopping ──▶ Stopped
//!                            │                                       │
//!                            └── spawn error / exit / timeout ──▶ Failed ◀── stop timeout
//! ```
//!
//! `start()` resolves to exactly one of ready, exited or timed out. A
//! supervisor is single-use; `stop()` is idempotent and also cleans up
//! after a failed start.

use super::output::{
    spawn_pump, spawn_sink_writer, FanOutWriter, OutputSink, ReadinessScanner, SharedBuffer,
};
use super::readiness::{wait_until_healthy, ReadinessProbe};
use super::{ProcessSpec, ResolvedProcessState};
use crate::config::FrameworkConfig;
use crate::constants::{FORCE_KILL_GRACE_MS, OUTPUT_DRAIN_TIMEOUT_MS};
use crate::error::{Error, Result};
use futures::future::{self, BoxFuture};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SupervisorState::NotStarted => "not started",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Stopped => "stopped",
            SupervisorState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Captured output of one run
#[derive(Debug)]
struct Session {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
    pumps: Vec<JoinHandle<()>>,
}

impl Session {
    /// Wait briefly for the pumps to reach EOF, then detach them
    async fn drain(&mut self) {
        let pumps = std::mem::take(&mut self.pumps);
        if pumps.is_empty() {
            return;
        }
        let drain = timeout(
            Duration::from_millis(OUTPUT_DRAIN_TIMEOUT_MS),
            future::join_all(pumps),
        );
        if drain.await.is_err() {
            debug!("Output pipes still open after drain timeout");
        }
    }
}

enum StartOutcome {
    Ready,
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
}

pub struct ProcessSupervisor {
    spec: ProcessSpec,
    name: String,
    state: SupervisorState,
    resolved: Option<ResolvedProcessState>,
    child: Option<Child>,
    pid: Option<u32>,
    session: Option<Session>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(spec: ProcessSpec) -> Self {
        let name = spec.display_name();
        Self {
            spec,
            name,
            state: SupervisorState::NotStarted,
            resolved: None,
            child: None,
            pid: None,
            session: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// OS process ID of the current child, if one was spawned
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[must_use]
    pub fn resolved(&self) -> Option<&ResolvedProcessState> {
        self.resolved.as_ref()
    }

    /// Run defaulting now (once) so callers can render arguments against
    /// the resolved URL and directory before starting
    ///
    /// # Errors
    ///
    /// See [`ProcessSpec::resolve`].
    pub fn resolve(&mut self, config: &FrameworkConfig) -> Result<&ResolvedProcessState> {
        let resolved = match self.resolved.take() {
            Some(resolved) => resolved,
            None => self.spec.resolve(config)?,
        };
        Ok(&*self.resolved.insert(resolved))
    }

    /// Set the rendered argv
    ///
    /// # Errors
    ///
    /// `Error::NotDefaulted` before [`resolve`](Self::resolve),
    /// `Error::AlreadyStarted` once `start()` has been called.
    pub fn set_args(&mut self, args: Vec<String>) -> Result<()> {
        self.resolved_for_update()?.args = args;
        Ok(())
    }

    /// Set how readiness is detected; without a probe the process counts
    /// as ready once spawned
    ///
    /// # Errors
    ///
    /// Same as [`set_args`](Self::set_args).
    pub fn set_readiness(&mut self, probe: ReadinessProbe) -> Result<()> {
        self.resolved_for_update()?.readiness = Some(probe);
        Ok(())
    }

    /// Give up on a supervisor that was resolved but never spawned
    ///
    /// Moves `NotStarted` to `Failed` so `stop()` still removes the
    /// auto-created directory. No effect in any other state.
    pub fn abandon(&mut self) {
        if self.state == SupervisorState::NotStarted {
            debug!(process = %self.name, "Abandoning process before spawn");
            self.state = SupervisorState::Failed;
        }
    }

    fn resolved_for_update(&mut self) -> Result<&mut ResolvedProcessState> {
        if self.state != SupervisorState::NotStarted {
            return Err(Error::AlreadyStarted(self.name.clone()));
        }
        self.resolved.as_mut().ok_or(Error::NotDefaulted)
    }

    /// Bind URL: the explicit one if given, else the defaulted one
    ///
    /// # Errors
    ///
    /// `Error::NotDefaulted` when no URL was given and defaulting has not run.
    pub fn listening_url(&self) -> Result<Url> {
        if let Some(url) = &self.spec.url {
            return Ok(url.clone());
        }
        self.resolved
            .as_ref()
            .map(|resolved| resolved.url.clone())
            .ok_or(Error::NotDefaulted)
    }

    /// Live handle onto captured stdout
    ///
    /// # Errors
    ///
    /// `Error::NoSession` until a process has been spawned.
    pub fn stdout(&self) -> Result<SharedBuffer> {
        self.session
            .as_ref()
            .map(|session| session.stdout.clone())
            .ok_or_else(|| Error::NoSession(self.name.clone()))
    }

    /// Live handle onto captured stderr
    ///
    /// # Errors
    ///
    /// `Error::NoSession` until a process has been spawned.
    pub fn stderr(&self) -> Result<SharedBuffer> {
        self.session
            .as_ref()
            .map(|session| session.stderr.clone())
            .ok_or_else(|| Error::NoSession(self.name.clone()))
    }

    /// Spawn the process and wait until it is ready
    ///
    /// Defaulting runs here with [`FrameworkConfig::from_env`] if
    /// [`resolve`](Self::resolve) was not called. Output is also copied to
    /// the given sinks on blocking tasks of their own; a sink may lag behind
    /// the captured buffers until `stop()` drains it.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyStarted` on a second call
    /// - `Error::Spawn` if the binary cannot be executed
    /// - `Error::PrematureExit` if it exits before becoming ready
    /// - `Error::StartupTimeout` if readiness is not observed in time; the
    ///   child is killed before returning
    pub async fn start(
        &mut self,
        stdout: Option<OutputSink>,
        stderr: Option<OutputSink>,
    ) -> Result<()> {
        if self.state != SupervisorState::NotStarted {
            return Err(Error::AlreadyStarted(self.name.clone()));
        }
        self.state = SupervisorState::Starting;

        if self.resolved.is_none() {
            if let Err(e) = self.resolve(&FrameworkConfig::from_env()) {
                self.state = SupervisorState::Failed;
                return Err(e);
            }
        }
        let Some(resolved) = self.resolved.as_ref() else {
            self.state = SupervisorState::Failed;
            return Err(Error::NotDefaulted);
        };

        info!(
            process = %self.name,
            path = %resolved.path.display(),
            url = %resolved.url,
            "Starting process"
        );
        debug!(process = %self.name, args = ?resolved.args, "Process arguments");

        let mut command = Command::new(&resolved.path);
        command
            .args(&resolved.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                error!(process = %self.name, error = %source, "Failed to spawn process");
                self.state = SupervisorState::Failed;
                return Err(Error::Spawn {
                    path: resolved.path.clone(),
                    source,
                });
            }
        };
        self.pid = child.id();

        let (ready_tx, ready_rx) = watch::channel(false);
        let ready_tx = Arc::new(ready_tx);
        let log_marker = match &resolved.readiness {
            Some(ReadinessProbe::LogMessage(message)) => Some(message.as_str()),
            _ => None,
        };

        let session_stdout = SharedBuffer::new();
        let session_stderr = SharedBuffer::new();
        let mut pumps = Vec::with_capacity(4);
        for (stream, buffer, sink) in [
            ("stdout", &session_stdout, stdout),
            ("stderr", &session_stderr, stderr),
        ] {
            let mut writer = FanOutWriter::new(stream).with_sink(Box::new(buffer.clone()));
            if let Some(marker) = log_marker {
                writer.push(Box::new(ReadinessScanner::new(
                    marker,
                    Arc::clone(&ready_tx),
                )));
            }
            if let Some(sink) = sink {
                let (forwarder, sink_task) = spawn_sink_writer(stream, sink);
                writer.push(Box::new(forwarder));
                pumps.push(sink_task);
            }
            let pump = match stream {
                "stdout" => child.stdout.take().map(|pipe| spawn_pump(pipe, writer)),
                _ => child.stderr.take().map(|pipe| spawn_pump(pipe, writer)),
            };
            pumps.extend(pump);
        }
        self.session = Some(Session {
            stdout: session_stdout,
            stderr: session_stderr,
            pumps,
        });

        let ready: BoxFuture<'static, ()> = match resolved.readiness.clone() {
            None => Box::pin(future::ready(())),
            Some(ReadinessProbe::LogMessage(_)) => {
                let mut ready_rx = ready_rx;
                Box::pin(async move {
                    if ready_rx.wait_for(|ready| *ready).await.is_err() {
                        future::pending::<()>().await;
                    }
                })
            }
            Some(ReadinessProbe::HealthCheck { path }) => {
                Box::pin(wait_until_healthy(resolved.url.clone(), path))
            }
        };
        let start_timeout = resolved.start_timeout;
        let deadline = Instant::now() + start_timeout;

        // An expired deadline wins over readiness observed in the same poll
        let outcome = tokio::select! {
            biased;
            () = sleep_until(deadline) => StartOutcome::TimedOut,
            () = ready => StartOutcome::Ready,
            status = child.wait() => StartOutcome::Exited(status),
        };
        drop(ready_tx);

        match outcome {
            StartOutcome::Ready => {
                info!(process = %self.name, pid = ?self.pid, "Process is ready");
                self.child = Some(child);
                self.state = SupervisorState::Running;
                Ok(())
            }
            StartOutcome::Exited(Ok(status)) => {
                self.state = SupervisorState::Failed;
                let stderr = match self.session.as_mut() {
                    Some(session) => {
                        session.drain().await;
                        session.stderr.contents_lossy()
                    }
                    None => String::new(),
                };
                error!(process = %self.name, %status, "Process exited before becoming ready");
                Err(Error::PrematureExit {
                    name: self.name.clone(),
                    status,
                    stderr,
                })
            }
            StartOutcome::Exited(Err(e)) => {
                error!(process = %self.name, error = %e, "Failed waiting on process");
                self.kill_during_start(child).await;
                Err(Error::Io(e))
            }
            StartOutcome::TimedOut => {
                error!(
                    process = %self.name,
                    timeout = ?start_timeout,
                    "Process did not become ready in time, killing it"
                );
                self.kill_during_start(child).await;
                Err(Error::StartupTimeout {
                    name: self.name.clone(),
                    timeout: start_timeout,
                })
            }
        }
    }

    /// Force-kill a child that failed to start; keep it for `stop()` if that fails
    async fn kill_during_start(&mut self, mut child: Child) {
        self.state = SupervisorState::Failed;
        if let Err(e) = child.kill().await {
            warn!(process = %self.name, error = %e, "Failed to kill process");
            self.child = Some(child);
        }
    }

    /// Terminate the process and remove its auto-created directory
    ///
    /// No-op before `start()` and after a successful stop.
    ///
    /// # Errors
    ///
    /// - `Error::StopTimeout` if neither SIGTERM nor SIGKILL could be
    ///   confirmed; the supervisor is left `Failed` and `stop()` can be retried
    /// - `Error::Cleanup` if the directory cannot be removed; the supervisor
    ///   is still `Stopped`
    pub async fn stop(&mut self) -> Result<()> {
        if matches!(
            self.state,
            SupervisorState::NotStarted | SupervisorState::Stopped
        ) {
            return Ok(());
        }
        self.state = SupervisorState::Stopping;

        if let Some(mut child) = self.child.take() {
            if let Err(e) = self.terminate(&mut child).await {
                return Err(self.retain_unstopped(child, e));
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.drain().await;
        }

        let temp_dir = self.resolved.as_mut().and_then(ResolvedProcessState::take_temp_dir);
        self.state = SupervisorState::Stopped;
        if let Some(temp_dir) = temp_dir {
            let path = temp_dir.path().to_path_buf();
            debug!(process = %self.name, dir = %path.display(), "Removing directory");
            temp_dir
                .close()
                .map_err(|source| Error::Cleanup { path, source })?;
        }

        info!(process = %self.name, "Process stopped");
        Ok(())
    }

    /// Keep a child that could not be confirmed dead so `stop()` can retry
    fn retain_unstopped(&mut self, child: Child, err: Error) -> Error {
        error!(process = %self.name, error = %err, "Process could not be stopped");
        self.child = Some(child);
        self.state = SupervisorState::Failed;
        err
    }

    async fn terminate(&self, child: &mut Child) -> Result<()> {
        let stop_timeout = self
            .resolved
            .as_ref()
            .map_or_else(|| FrameworkConfig::default().default_stop_timeout(), |r| r.stop_timeout);

        // `id()` is None once the child has been reaped
        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            debug!(process = %self.name, pid, "Sending SIGTERM");
            if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                debug!(process = %self.name, pid, error = %e, "SIGTERM failed");
            }
        }

        match timeout(stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(process = %self.name, %status, "Process exited");
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(process = %self.name, error = %e, "Failed waiting for process, killing it");
            }
            Err(_) => {
                warn!(
                    process = %self.name,
                    timeout = ?stop_timeout,
                    "Process ignored SIGTERM, killing it"
                );
            }
        }

        if let Err(e) = child.start_kill() {
            debug!(process = %self.name, error = %e, "SIGKILL failed");
        }
        match timeout(Duration::from_millis(FORCE_KILL_GRACE_MS), child.wait()).await {
            Ok(Ok(status)) => {
                debug!(process = %self.name, %status, "Process killed");
                Ok(())
            }
            _ => Err(Error::StopTimeout {
                name: self.name.clone(),
                timeout: stop_timeout,
            }),
        }
    }
}
