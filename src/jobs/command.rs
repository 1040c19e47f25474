//! # Subprocess-backed job (`CommandJob`)
//!
//! Every attempt spawns a fresh child process. On Unix the child leads its own
//! process group; killing the attempt sends `SIGKILL` to the whole group, so
//! anything a shell line forked goes down with it. Elsewhere only the child is
//! terminated. The child is reaped before `kill` returns.
//!
//! The child inherits stdout/stderr, gets a null stdin, and sees the attempt
//! in its environment:
//!
//! | variable           | value                     |
//! |--------------------|---------------------------|
//! | `TPU_NAME`         | resource name             |
//! | `TPU_ZONE`         | resource zone             |
//! | `TPU_PROJECT`      | resource project          |
//! | `TPUVISOR_ATTEMPT` | attempt number (1-based)  |
//!
//! ## Example
//! ```rust
//! use tpuvisor::{CommandJob, JobRef};
//!
//! let job: JobRef = CommandJob::shell("train", "python3 train.py --resume").arc();
//! assert_eq!(job.name(), "train");
//! ```

use std::borrow::Cow;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::error::JobError;
use crate::jobs::job::{AttemptContext, Execution, Job};

/// Job that runs an external program per attempt.
#[derive(Clone, Debug)]
pub struct CommandJob {
    name: Cow<'static, str>,
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl CommandJob {
    /// Runs `program` with no arguments.
    pub fn new(name: impl Into<Cow<'static, str>>, program: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    /// Runs a command line through `sh -c`.
    pub fn shell(name: impl Into<Cow<'static, str>>, line: impl Into<OsString>) -> Self {
        Self::new(name, "sh").arg("-c").arg(line)
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an extra environment variable.
    pub fn env(mut self, key: impl Into<OsString>, val: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), val.into()));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Wraps the job into a shared handle.
    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn command(&self, ctx: &AttemptContext) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env("TPU_NAME", &ctx.resource.name)
            .env("TPU_ZONE", &ctx.resource.zone)
            .env("TPU_PROJECT", &ctx.resource.project)
            .env("TPUVISOR_ATTEMPT", ctx.attempt.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

impl Job for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn launch(&self, ctx: AttemptContext) -> Result<Box<dyn Execution>, JobError> {
        let child = self.command(&ctx).spawn().map_err(|e| JobError::Spawn {
            error: format!("{}: {e}", self.program.to_string_lossy()),
        })?;
        tracing::debug!(
            job = %self.name,
            pid = child.id(),
            attempt = ctx.attempt,
            "spawned job process"
        );
        Ok(Box::new(ProcessExecution {
            group: child.id(),
            child,
            status: None,
        }))
    }
}

/// A job attempt running as a child process.
struct ProcessExecution {
    child: Child,
    /// Process group id (equal to the child's pid).
    group: Option<u32>,
    status: Option<ExitStatus>,
}

impl ProcessExecution {
    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.group else { return };
        match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!(pgid, error = %e, "failed to signal job process group"),
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}

    fn outcome(status: ExitStatus) -> Result<(), JobError> {
        if status.success() {
            Ok(())
        } else {
            Err(JobError::Exit {
                code: status.code(),
            })
        }
    }
}

#[async_trait]
impl Execution for ProcessExecution {
    async fn wait(&mut self) -> Result<(), JobError> {
        if let Some(status) = self.status {
            return Self::outcome(status);
        }
        let status = self.child.wait().await.map_err(|e| JobError::Fail {
            error: format!("waiting for job process: {e}"),
        })?;
        self.status = Some(status);
        Self::outcome(status)
    }

    async fn kill(&mut self) {
        if self.status.is_some() {
            return;
        }
        self.kill_group();
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "job process already gone");
        }
        match self.child.wait().await {
            Ok(status) => self.status = Some(status),
            Err(e) => tracing::warn!(error = %e, "failed to reap killed job process"),
        }
    }

    fn is_finished(&self) -> bool {
        self.status.is_some()
    }
}

impl Drop for ProcessExecution {
    fn drop(&mut self) {
        // `kill_on_drop` only reaches the direct child.
        if self.status.is_none() {
            self.kill_group();
        }
    }
}
