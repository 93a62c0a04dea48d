//! Launching and tearing down the command under test.
//!
//! [`ProcessHarness::launch`] starts the command in its own process group with
//! the configured environment overlay and collects stdout line by line in a
//! background task. [`ProcessHandle::shutdown`] sends SIGINT to the group,
//! escalates to SIGKILL, and reports [`ConformanceError::Shutdown`] if the
//! process still survives. Dropping a handle that was never shut down kills
//! the group, so no exit path leaves the command running.

use crate::config::HarnessConfig;
use crate::error::{ConformanceError, Result};
use crate::qos::QosProfile;
use parking_lot::Mutex;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A program and its arguments, rendered for logs the way a shell would read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CliCommand {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `<cli> topic pub [qos flags] <topic> <type> "data: <payload>"`
    #[must_use]
    pub fn publish(config: &HarnessConfig, topic: &str, qos: Option<&QosProfile>) -> Self {
        let mut args = vec!["topic".to_owned(), "pub".to_owned()];
        if let Some(qos) = qos {
            args.extend(qos.cli_flags());
        }
        args.push(topic.to_owned());
        args.push(config.message_type.clone());
        args.push(config.message().to_echo_line());
        Self::new(config.cli.clone(), args)
    }

    /// `<cli> topic echo [qos flags] <topic> <type>`
    #[must_use]
    pub fn echo(config: &HarnessConfig, topic: &str, qos: Option<&QosProfile>) -> Self {
        let mut args = vec!["topic".to_owned(), "echo".to_owned()];
        if let Some(qos) = qos {
            args.extend(qos.cli_flags());
        }
        args.push(topic.to_owned());
        args.push(config.message_type.clone());
        Self::new(config.cli.clone(), args)
    }

    #[must_use]
    pub fn daemon(config: &HarnessConfig, action: &str) -> Self {
        Self::new(
            config.cli.clone(),
            vec!["daemon".to_owned(), action.to_owned()],
        )
    }
}

impl fmt::Display for CliCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Drops middleware banners and blank lines from captured output.
#[derive(Debug, Clone, Default)]
pub struct OutputFilter {
    filtered_implementation: Option<String>,
    prefixes: Vec<String>,
}

impl OutputFilter {
    #[must_use]
    pub fn for_implementation(implementation: &str, prefixes: &[String]) -> Self {
        Self {
            filtered_implementation: Some(implementation.to_owned()).filter(|s| !s.is_empty()),
            prefixes: prefixes.to_vec(),
        }
    }

    #[must_use]
    pub fn accepts(&self, line: &str) -> bool {
        if line.trim().is_empty() {
            return false;
        }
        if let Some(implementation) = &self.filtered_implementation {
            if line.contains(implementation.as_str()) {
                return false;
            }
        }
        !self.prefixes.iter().any(|p| line.starts_with(p.as_str()))
    }
}

/// What one invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_recorded: bool,
    pub exit_code: Option<i32>,
    pub captured_lines: Vec<String>,
    pub timed_out: bool,
}

/// What happens to the rest of the process group once the command has exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupCleanup {
    /// SIGKILL whatever is left in the group.
    #[default]
    KillLeftovers,
    /// Leave background children running after a successful exit, so a
    /// launcher that forks a daemon keeps it.
    KeepAfterCleanExit,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessHarness {
    env: Vec<(String, String)>,
    filter: OutputFilter,
}

impl ProcessHarness {
    #[must_use]
    pub fn new(env: Vec<(String, String)>, filter: OutputFilter) -> Self {
        Self { env, filter }
    }

    /// Harness for one middleware implementation, as configured.
    #[must_use]
    pub fn for_implementation(config: &HarnessConfig, implementation: &str) -> Self {
        Self::new(
            config.env_overlay(implementation),
            OutputFilter::for_implementation(implementation, &config.noise_prefixes),
        )
    }

    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Starts `command` with the environment overlay merged over the inherited one.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Launch`] if the process cannot be spawned.
    pub fn launch(&self, command: &CliCommand) -> Result<ProcessHandle> {
        self.launch_with(command, GroupCleanup::KillLeftovers)
    }

    /// Like [`launch`](Self::launch), choosing how the process group is
    /// treated after the command exits.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Launch`] if the process cannot be spawned.
    pub fn launch_with(
        &self,
        command: &CliCommand,
        cleanup: GroupCleanup,
    ) -> Result<ProcessHandle> {
        let rendered = command.to_string();
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so the whole tree can be signalled at once; on
        // Linux the child also gets SIGTERM if the harness itself dies.
        // SAFETY: the closure runs between fork and exec and only calls
        // async-signal-safe functions (setpgid, prctl) without allocating.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                #[cfg(target_os = "linux")]
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|source| ConformanceError::Launch {
            command: rendered.clone(),
            source,
        })?;
        let pid = child.id();
        info!(pid, "launched `{rendered}`");

        let lines = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = child.stdout.take().map(|stdout| {
            let lines = lines.clone();
            let filter = self.filter.clone();
            let name = command.program.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!("[{name}] {line}");
                    if filter.accepts(&line) {
                        lines.lock().push(line);
                    }
                }
            })
        });
        let stderr_task = child.stderr.take().map(|stderr| {
            let name = command.program.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!("[{name}] ERR: {line}");
                }
            })
        });

        Ok(ProcessHandle {
            command: rendered,
            pid,
            child,
            lines,
            stdout_task,
            stderr_task,
            exit: None,
            group_cleanup: cleanup,
            group_released: false,
        })
    }

    /// Runs `command` until it exits on its own or `timeout` elapses, then
    /// makes sure it is gone.
    ///
    /// # Errors
    /// Returns launch and shutdown errors.
    pub async fn run_to_completion(
        &self,
        command: &CliCommand,
        timeout: Duration,
    ) -> Result<ProcessOutcome> {
        self.run_to_completion_with(command, timeout, GroupCleanup::KillLeftovers)
            .await
    }

    /// [`run_to_completion`](Self::run_to_completion) with an explicit group policy.
    ///
    /// # Errors
    /// Returns launch and shutdown errors.
    pub async fn run_to_completion_with(
        &self,
        command: &CliCommand,
        timeout: Duration,
        cleanup: GroupCleanup,
    ) -> Result<ProcessOutcome> {
        let mut handle = self.launch_with(command, cleanup)?;
        let outcome = handle.wait_and_capture(timeout).await;
        handle.shutdown(timeout).await?;
        Ok(outcome)
    }
}

/// A running (or finished) command. Owns the process group.
pub struct ProcessHandle {
    command: String,
    pid: Option<u32>,
    child: Child,
    lines: Arc<Mutex<Vec<String>>>,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    exit: Option<ExitStatus>,
    group_cleanup: GroupCleanup,
    group_released: bool,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Lines captured so far.
    #[must_use]
    pub fn captured_lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn is_running(&mut self) -> bool {
        !self.poll_exit()
    }

    fn poll_exit(&mut self) -> bool {
        if self.exit.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("try_wait on `{}` failed: {e}", self.command);
                false
            }
        }
    }

    /// Waits up to `timeout` for the process to exit, then up to `timeout`
    /// for its output to drain. Does not terminate the process.
    pub async fn wait_and_capture(&mut self, timeout: Duration) -> ProcessOutcome {
        let timed_out = if self.poll_exit() {
            false
        } else {
            match tokio::time::timeout(timeout, self.child.wait()).await {
                Ok(Ok(status)) => {
                    self.exit = Some(status);
                    false
                }
                Ok(Err(e)) => {
                    warn!("waiting on `{}` failed: {e}", self.command);
                    false
                }
                Err(_) => true,
            }
        };

        if self.exit.is_some() {
            self.drain_output(timeout).await;
        }

        ProcessOutcome {
            exit_recorded: self.exit.is_some(),
            exit_code: self.exit.and_then(|s| s.code()),
            captured_lines: self.captured_lines(),
            timed_out,
        }
    }

    async fn drain_output(&mut self, timeout: Duration) {
        for task in [self.stdout_task.take(), self.stderr_task.take()]
            .into_iter()
            .flatten()
        {
            let abort = task.abort_handle();
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("output of `{}` did not close within {timeout:?}", self.command);
                abort.abort();
            }
        }
    }

    /// SIGINT, then SIGKILL after `timeout`. Safe to call repeatedly.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Shutdown`] if the process outlives SIGKILL by `timeout`.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        if self.poll_exit() {
            self.release_group();
            return Ok(());
        }

        debug!("sending SIGINT to `{}`", self.command);
        self.signal_group(Signal::Interrupt);
        if self.wait_for_exit(timeout).await {
            self.release_group();
            return Ok(());
        }

        warn!(
            "`{}` didn't stop within {timeout:?}, force killing",
            self.command
        );
        self.signal_group(Signal::Kill);
        if let Err(e) = self.child.start_kill() {
            debug!("start_kill on `{}`: {e}", self.command);
        }
        if self.wait_for_exit(timeout).await {
            self.release_group();
            return Ok(());
        }

        Err(ConformanceError::Shutdown {
            command: self.command.clone(),
            timeout,
        })
    }

    async fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("`{}` exited with {status}", self.command);
                self.exit = Some(status);
                true
            }
            Ok(Err(e)) => {
                warn!("waiting on `{}` failed: {e}", self.command);
                false
            }
            Err(_) => false,
        }
    }

    /// Kills whatever the command left behind in its process group, unless
    /// the group is meant to outlive a clean exit.
    fn release_group(&mut self) {
        if self.group_released {
            return;
        }
        self.group_released = true;
        let clean_exit = self.exit.is_some_and(|status| status.success());
        if clean_exit && self.group_cleanup == GroupCleanup::KeepAfterCleanExit {
            debug!("leaving the process group of `{}` running", self.command);
            return;
        }
        self.signal_group(Signal::Kill);
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: Signal) {
        let Some(pid) = self.pid.and_then(|p| i32::try_from(p).ok()) else {
            return;
        };
        let signo = match signal {
            Signal::Interrupt => libc::SIGINT,
            Signal::Kill => libc::SIGKILL,
        };
        // SAFETY: killpg has no memory-safety preconditions; ESRCH is ignored.
        unsafe {
            libc::killpg(pid, signo);
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _signal: Signal) {
        let _ = self.child.start_kill();
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.poll_exit() {
            warn!("`{}` dropped while running, killing it", self.command);
            self.signal_group(Signal::Kill);
            let _ = self.child.start_kill();
        } else {
            self.release_group();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Interrupt,
    Kill,
}

/// Restarts the discovery daemon (`daemon stop`, then `daemon start`) so each
/// implementation's run starts from clean discovery state. A daemon forked by
/// a successful `daemon start` is left running.
///
/// # Errors
/// Returns launch or shutdown errors from either step.
pub async fn restart_daemon(config: &HarnessConfig, harness: &ProcessHarness) -> Result<()> {
    for action in ["stop", "start"] {
        let command = CliCommand::daemon(config, action);
        let outcome = harness
            .run_to_completion_with(
                &command,
                config.shutdown_timeout,
                GroupCleanup::KeepAfterCleanExit,
            )
            .await?;
        if outcome.timed_out || outcome.exit_code != Some(0) {
            warn!(
                exit_code = ?outcome.exit_code,
                timed_out = outcome.timed_out,
                "`{command}` did not finish cleanly"
            );
        } else {
            info!("`{command}` done");
        }
    }
    Ok(())
}
