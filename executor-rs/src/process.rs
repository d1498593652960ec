// executor-rs/src/process.rs
// Process spawning seam: specs, handles and the tokio-backed spawner

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use intent_schema::Action;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::plan::{ExecutionMode, ExecutionPlan};

/// A concrete program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    /// Translate a plan into a program invocation.
    ///
    /// `run_command` is the only action interpreted by a shell. `open_file`
    /// and `shutdown` call fixed programs with the target as a plain argument.
    pub fn for_plan(plan: &ExecutionPlan) -> Self {
        match plan.action {
            Action::RunCommand => shell_spec(&plan.command_line, plan.mode),
            Action::OpenFile => Self {
                program: OPENER.to_string(),
                args: vec![plan.command_line.clone()],
            },
            Action::Shutdown => Self {
                program: "shutdown".to_string(),
                args: SHUTDOWN_ARGS.iter().map(|a| a.to_string()).collect(),
            },
        }
    }
}

#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(windows)]
const OPENER: &str = "explorer";
#[cfg(not(any(target_os = "macos", windows)))]
const OPENER: &str = "xdg-open";

#[cfg(windows)]
const SHUTDOWN_ARGS: [&str; 3] = ["/s", "/t", "0"];
#[cfg(not(windows))]
const SHUTDOWN_ARGS: [&str; 2] = ["-h", "now"];

#[cfg(not(windows))]
fn shell_spec(command_line: &str, mode: ExecutionMode) -> ProcessSpec {
    // Foreground commands send stderr into the captured stdout stream
    let script = match mode {
        ExecutionMode::Foreground => format!("exec 2>&1\n{}", command_line),
        ExecutionMode::Background => command_line.to_string(),
    };
    ProcessSpec {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script],
    }
}

#[cfg(windows)]
fn shell_spec(command_line: &str, mode: ExecutionMode) -> ProcessSpec {
    let script = match mode {
        ExecutionMode::Foreground => format!("({}) 2>&1", command_line),
        ExecutionMode::Background => command_line.to_string(),
    };
    ProcessSpec {
        program: "cmd".to_string(),
        args: vec!["/C".to_string(), script],
    }
}

/// Everything a foreground process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Standard output followed by anything left on standard error
    pub output: Vec<u8>,
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// A running foreground process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Wait for exit, collecting output. Must be cancel-safe: dropping the
    /// future leaves the handle usable for [`ProcessHandle::terminate`].
    async fn wait_with_output(&mut self) -> io::Result<ProcessOutput>;

    /// Kill the process, along with anything it started in the foreground, and reap it.
    async fn terminate(&mut self) -> io::Result<()>;
}

/// Starts processes for the executor.
pub trait ProcessSpawner: Send + Sync {
    /// Spawn with piped output for a bounded foreground wait.
    fn spawn_captured(&self, spec: &ProcessSpec) -> io::Result<Box<dyn ProcessHandle>>;

    /// Spawn outside the caller's process group with all stdio discarded and
    /// return immediately. Nothing is retained: the process is disowned.
    fn spawn_detached(&self, spec: &ProcessSpec) -> io::Result<Option<u32>>;
}

/// [`ProcessSpawner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

impl ProcessSpawner for TokioSpawner {
    fn spawn_captured(&self, spec: &ProcessSpec) -> io::Result<Box<dyn ProcessHandle>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own group so a timeout reaches everything the shell forked
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        let group = child.id();

        Ok(Box::new(TokioProcess {
            child,
            group,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }))
    }

    fn spawn_detached(&self, spec: &ProcessSpec) -> io::Result<Option<u32>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        command.process_group(0);

        #[cfg(windows)]
        {
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        // Dropping the child without kill_on_drop leaves it running; tokio
        // reaps it in the background once it exits.
        let child = command.spawn()?;
        Ok(child.id())
    }
}

struct TokioProcess {
    child: Child,
    /// Process group id, equal to the leader's pid
    #[cfg_attr(not(unix), allow(dead_code))]
    group: Option<u32>,
    // Kept on the handle so a cancelled wait does not lose what was read
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

#[async_trait]
impl ProcessHandle for TokioProcess {
    async fn wait_with_output(&mut self) -> io::Result<ProcessOutput> {
        let mut stdout_pipe = self.child.stdout.take();
        let mut stderr_pipe = self.child.stderr.take();
        let stdout_buf = &mut self.stdout;
        let stderr_buf = &mut self.stderr;

        let read_stdout = async {
            if let Some(pipe) = stdout_pipe.as_mut() {
                pipe.read_to_end(stdout_buf).await?;
            }
            Ok::<_, io::Error>(())
        };
        let read_stderr = async {
            if let Some(pipe) = stderr_pipe.as_mut() {
                pipe.read_to_end(stderr_buf).await?;
            }
            Ok::<_, io::Error>(())
        };

        let (_, _, status) = tokio::try_join!(read_stdout, read_stderr, self.child.wait())?;

        let mut output = std::mem::take(&mut self.stdout);
        output.append(&mut self.stderr);

        Ok(ProcessOutput {
            output,
            exit_code: status.code(),
            success: status.success(),
        })
    }

    async fn terminate(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        if let Some(group) = self.group {
            kill_group(group)?;
        }

        match self.child.kill().await {
            Ok(()) => Ok(()),
            // Already exited and reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn kill_group(group: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(group)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "process group id out of range"))?;

    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        // Group already gone
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}
