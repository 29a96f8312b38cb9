//! Helpers intended for [`std::process::Command`].

use std::io::{ErrorKind, Write};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{anyhow, Context, Result};

/// Helpers intended for [`std::process::Command`].
pub trait CommandRunExt {
    /// Log (at debug level) the full child commandline.
    fn log_debug(&mut self) -> &mut Self;

    /// Execute the child process with stdout and stderr inherited
    /// from the parent, and return an error if it exited unsuccessfully.
    fn run_inherited(&mut self) -> Result<()>;

    /// Execute the child process, writing the provided bytes to its stdin.
    /// Stderr is captured and included in the error if the process fails.
    /// The input is never logged, so it is suitable for secrets. A child
    /// that exits before reading all of it is judged by its exit status alone.
    fn run_with_stdin(&mut self, input: &[u8]) -> Result<()>;

    /// Render the program and its arguments as a shell-quoted string.
    fn to_string_pretty(&self) -> String;
}

/// Turn a nonzero exit into an error, including any captured stderr.
fn check_status(status: ExitStatus, stderr: &[u8]) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Err(anyhow!("Subprocess failed: {status}"))
    } else {
        Err(anyhow!("Subprocess failed: {status}\n{stderr}"))
    }
}

impl CommandRunExt for Command {
    fn log_debug(&mut self) -> &mut Self {
        tracing::debug!("exec: {}", self.to_string_pretty());
        self
    }

    fn run_inherited(&mut self) -> Result<()> {
        let status = self
            .log_debug()
            .status()
            .with_context(|| format!("Spawning {:?}", self.get_program()))?;
        check_status(status, &[])
    }

    fn run_with_stdin(&mut self, input: &[u8]) -> Result<()> {
        let mut child = self
            .log_debug()
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Spawning {:?}", self.get_program()))?;
        let written = {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("Failed to open child stdin"))?;
            stdin.write_all(input)
            // Closing stdin here signals EOF to the child
        };
        // Always reap the child; its exit status and stderr explain a
        // failed write better than EPIPE does.
        let output = child.wait_with_output().context("Waiting for child")?;
        check_status(output.status, &output.stderr)?;
        match written {
            // The child is free to exit successfully without consuming input
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            r => r.context("Writing to child stdin"),
        }
    }

    fn to_string_pretty(&self) -> String {
        std::iter::once(self.get_program())
            .chain(self.get_args())
            .map(|arg| {
                let arg = arg.to_string_lossy();
                match shlex::try_quote(&arg) {
                    Ok(quoted) => quoted.into_owned(),
                    Err(_) => arg.into_owned(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
