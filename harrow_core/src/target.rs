use crate::input::Input;
use crate::outcome::{ExecutionStatus, ProcessOutput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};

/// How often a running child is polled while a deadline is armed.
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargetError {
    #[error("command target needs a program to run")]
    EmptyCommand,

    #[error("file input template {0:?} has no '{{}}' placeholder")]
    MissingPlaceholder(String),
}

/// The fixed set of target variants a session can be run against.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    InProcess,
    Process,
    FileDriven,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::InProcess => "in-process",
            TargetKind::Process => "process",
            TargetKind::FileDriven => "file-driven",
        })
    }
}

/// Uniform wrapper around the thing under test.
///
/// `invoke` never fails: whatever the target does, including panicking or
/// exiting non-zero, is turned into an [`ExecutionStatus`].
pub trait Target: Send + Sync {
    fn kind(&self) -> TargetKind;

    /// Human-readable identity recorded in the session configuration.
    fn identity(&self) -> String;

    fn invoke(&self, input: &Input) -> ExecutionStatus;

    /// Runs `input` under a deadline the target enforces on its own, killing
    /// whatever it started on expiry. Targets that cannot do that return
    /// `None` and are supervised from the outside instead.
    fn invoke_killable(&self, _input: &Input, _deadline: Duration) -> Option<ExecutionStatus> {
        None
    }
}

/// Signature of an in-process harness. Errors are reported through their
/// `Display` text.
pub type HarnessFn = dyn Fn(&Input) -> anyhow::Result<String> + Send + Sync;

/// Calls a Rust function with each input.
///
/// A normal return becomes the outcome's output; an `Err` or a panic becomes
/// its error.
#[derive(Clone)]
pub struct InProcessTarget {
    name: String,
    kind: TargetKind,
    harness_fn: Arc<HarnessFn>,
}

impl InProcessTarget {
    pub fn new<F>(name: impl Into<String>, harness_fn: F) -> Self
    where
        F: Fn(&Input) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: TargetKind::InProcess,
            harness_fn: Arc::new(harness_fn),
        }
    }

    /// Same contract as [`InProcessTarget::new`], reported as a file-driven
    /// target because its inputs come from a line corpus.
    pub fn file_driven<F>(name: impl Into<String>, harness_fn: F) -> Self
    where
        F: Fn(&Input) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self {
            kind: TargetKind::FileDriven,
            ..Self::new(name, harness_fn)
        }
    }
}

impl fmt::Debug for InProcessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessTarget")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic type".to_string()
    }
}

impl Target for InProcessTarget {
    fn kind(&self) -> TargetKind {
        self.kind
    }

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn invoke(&self, input: &Input) -> ExecutionStatus {
        let result = catch_unwind(AssertUnwindSafe(|| (self.harness_fn)(input)));
        match result {
            Ok(Ok(output)) => ExecutionStatus::Ok(output),
            Ok(Err(e)) => ExecutionStatus::Error(e.to_string()),
            Err(panic_payload) => {
                let msg = panic_message(panic_payload);
                debug!(target_name = %self.name, "harness panicked: {msg}");
                ExecutionStatus::Error(format!("panic: {msg}"))
            }
        }
    }
}

/// Where a command target receives its input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputDelivery {
    /// Input bytes are written to stdin, which is then closed.
    #[default]
    StdIn,
    /// Input is written to a temporary file; the template argument with
    /// `{}` replaced by that file's path is appended to the command line.
    File(String),
    /// Input is appended verbatim as one trailing argument.
    Argument,
}

#[derive(Debug, Clone, Default)]
pub struct CommandTargetConfig {
    pub command: Vec<String>,
    pub input_delivery: InputDelivery,
    pub working_dir: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

/// Runs an external program once per input and records its stdout, stderr
/// and exit status.
///
/// The argv comes from configuration and is executed directly, without a
/// shell. The target is NOT sandboxed: whatever the program does to the host
/// (file writes, network calls) happens for real, once per input. Inputs
/// reach the program unvalidated; if the configured argv itself runs a shell
/// (`sh -c ...`) with argument delivery, the generated input is interpreted
/// by that shell.
#[derive(Debug, Clone)]
pub struct CommandTarget {
    config: CommandTargetConfig,
}

impl CommandTarget {
    pub fn new(config: CommandTargetConfig) -> Result<Self, TargetError> {
        if config.command.first().is_none_or(|program| program.is_empty()) {
            return Err(TargetError::EmptyCommand);
        }
        if let InputDelivery::File(template) = &config.input_delivery {
            if !template.contains("{}") {
                return Err(TargetError::MissingPlaceholder(template.clone()));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &CommandTargetConfig {
        &self.config
    }

    fn run(&self, input: &Input, deadline: Option<Duration>) -> ExecutionStatus {
        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..]);
        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }
        cmd.envs(self.config.envs.iter().map(|(k, v)| (k, v)));

        // Kept alive until the child has finished with it.
        let mut temp_file_handle: Option<tempfile::NamedTempFile> = None;

        match &self.config.input_delivery {
            InputDelivery::StdIn => {
                cmd.stdin(Stdio::piped());
            }
            InputDelivery::File(arg_template) => {
                let mut named_temp_file = match tempfile::NamedTempFile::new() {
                    Ok(f) => f,
                    Err(e) => {
                        return ExecutionStatus::Error(format!("Failed to create temp file: {e}"));
                    }
                };
                if let Err(e) = named_temp_file
                    .write_all(&input.to_payload())
                    .and_then(|_| named_temp_file.flush())
                {
                    return ExecutionStatus::Error(format!(
                        "Failed to write to temp file {:?}: {}",
                        named_temp_file.path(),
                        e
                    ));
                }
                let Some(path_str) = named_temp_file.path().to_str() else {
                    return ExecutionStatus::Error("Temp file path is not valid UTF-8".to_string());
                };
                cmd.arg(arg_template.replace("{}", path_str));
                cmd.stdin(Stdio::null());
                temp_file_handle = Some(named_temp_file);
            }
            InputDelivery::Argument => {
                cmd.arg(input.to_string());
                cmd.stdin(Stdio::null());
            }
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let error_msg = format!("Failed to spawn command {:?}: {}", self.config.command, e);
                error!("{error_msg}");
                return ExecutionStatus::Error(error_msg);
            }
        };

        let stdin_writer = child.stdin.take().map(|mut stdin| {
            let payload = input.to_payload().into_owned();
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                // The target may exit without reading its input.
                if let Err(e) = stdin.write_all(&payload) {
                    if e.kind() != ErrorKind::BrokenPipe {
                        debug!("Error writing to child stdin: {e}");
                    }
                }
                let _ = tx.send(());
            });
            rx
        });
        let stdout_reader = child.stdout.take().map(spawn_reader::<ChildStdout>);
        let stderr_reader = child.stderr.take().map(spawn_reader::<ChildStderr>);

        let started = Instant::now();
        let exit_status = match deadline {
            Some(timeout) => wait_with_timeout(&mut child, timeout),
            None => child.wait().map(Some).map_err(|e| format!("Error waiting for child: {e}")),
        };
        drop(temp_file_handle);

        match exit_status {
            Ok(Some(status)) => {
                // A background process spawned by the target can inherit the
                // pipes and hold them open after the child itself has exited.
                let until = deadline.map(|timeout| started + timeout);
                match drain_pipes(stdin_writer, stdout_reader, stderr_reader, until) {
                    Ok((stdout, stderr)) => {
                        ExecutionStatus::Exited(process_output(status, stdout, stderr))
                    }
                    Err(PipesStillOpen) => {
                        warn!(
                            command = ?self.config.command,
                            "Target exited but its pipes outlived the deadline"
                        );
                        ExecutionStatus::Timeout
                    }
                }
            }
            // Pipe threads are left behind: a grandchild may still hold the pipes open.
            Ok(None) => ExecutionStatus::Timeout,
            Err(msg) => {
                error!("{msg}");
                ExecutionStatus::Error(msg)
            }
        }
    }
}

/// The deadline passed while a pipe thread was still blocked.
#[derive(Debug)]
struct PipesStillOpen;

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Waits for one pipe thread, no later than `until` when it is set.
/// `Ok(None)` means the thread died without reporting.
fn recv_until<T>(rx: &Receiver<T>, until: Option<Instant>) -> Result<Option<T>, PipesStillOpen> {
    let Some(until) = until else {
        return Ok(rx.recv().ok());
    };
    match rx.recv_timeout(until.saturating_duration_since(Instant::now())) {
        Ok(value) => Ok(Some(value)),
        Err(RecvTimeoutError::Disconnected) => Ok(None),
        Err(RecvTimeoutError::Timeout) => Err(PipesStillOpen),
    }
}

fn drain_pipes(
    stdin_writer: Option<Receiver<()>>,
    stdout_reader: Option<Receiver<Vec<u8>>>,
    stderr_reader: Option<Receiver<Vec<u8>>>,
    until: Option<Instant>,
) -> Result<(String, String), PipesStillOpen> {
    if let Some(rx) = &stdin_writer {
        recv_until(rx, until)?;
    }
    let collect = |reader: Option<Receiver<Vec<u8>>>| -> Result<String, PipesStillOpen> {
        let bytes = match reader {
            Some(rx) => recv_until(&rx, until)?.unwrap_or_default(),
            None => Vec::new(),
        };
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    };
    let stdout = collect(stdout_reader)?;
    let stderr = collect(stderr_reader)?;
    Ok((stdout, stderr))
}

/// Polls the child until it exits or `timeout` elapses. `Ok(None)` means the
/// deadline won and the child has been killed and reaped.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>, String> {
    let start_time = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {
                if start_time.elapsed() >= timeout {
                    warn!(pid = child.id(), ?timeout, "Target timed out, killing");
                    if let Err(e) = child.kill() {
                        return Err(format!("Failed to kill timed-out process: {e}"));
                    }
                    let _ = child.wait();
                    return Ok(None);
                }
                let remaining = timeout.saturating_sub(start_time.elapsed());
                thread::sleep(CHILD_POLL_INTERVAL.min(remaining));
            }
            Err(e) => return Err(format!("Error waiting for child: {e}")),
        }
    }
}

fn process_output(status: ExitStatus, stdout: String, stderr: String) -> ProcessOutput {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ProcessOutput {
        stdout,
        stderr,
        exit_code: status.code(),
        signal,
    }
}

impl Target for CommandTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Process
    }

    fn identity(&self) -> String {
        self.config.command.join(" ")
    }

    fn invoke(&self, input: &Input) -> ExecutionStatus {
        self.run(input, None)
    }

    fn invoke_killable(&self, input: &Input, deadline: Duration) -> Option<ExecutionStatus> {
        Some(self.run(input, Some(deadline)))
    }
}
