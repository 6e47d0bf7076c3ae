use crate::discover::ToolSpec;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured output beyond this many bytes is cut from the front when it ends
/// up in an error message.
const MAX_REPORTED_OUTPUT: usize = 4096;

/// A located external executable and how to call it.
#[derive(Debug, Clone)]
pub struct Tool {
    name: String,
    program: PathBuf,
    /// Arguments placed before every invocation's own, for tools reached
    /// through a wrapper (`flatpak run …`, an interpreter).
    prefix: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Tool {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), program: program.into(), prefix: Vec::new(), timeout: None }
    }

    /// Locate `spec` (see [`ToolSpec::locate`]) and wrap the result.
    pub fn discover(spec: &ToolSpec, configured: Option<&Path>) -> Result<Self> {
        Ok(Self::new(spec.name, spec.locate(configured)?))
    }

    pub fn wrapped(
        name: impl Into<String>,
        program: impl Into<PathBuf>,
        prefix: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self { prefix: prefix.into_iter().map(Into::into).collect(), ..Self::new(name, program) }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run to completion and return combined stdout and stderr.
    ///
    /// With `inherit_output` the child writes straight to this process's
    /// terminal instead and the returned string is empty. The child is killed
    /// if the configured timeout elapses or the returned future is dropped.
    pub async fn run(&self, args: &[OsString], inherit_output: bool) -> Result<String> {
        let mut command = Command::new(&self.program);
        command.args(&self.prefix).args(args).stdin(Stdio::null()).kill_on_drop(true);
        if inherit_output {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        tracing::trace!(tool = %self.name, program = %self.program.display(), ?args, "Spawning");

        let child = command.spawn().or_raise(|| ErrorKind::Spawn(self.name.clone()))?;
        let waiting = child.wait_with_output();
        let output = match self.timeout {
            None => waiting.await,
            Some(limit) => match tokio::time::timeout(limit, waiting).await {
                Ok(output) => output,
                // Dropping the future drops the child, which kills it.
                Err(_) => exn::bail!(ErrorKind::Timeout { tool: self.name.clone(), secs: limit.as_secs() }),
            },
        }
        .or_raise(|| ErrorKind::Spawn(self.name.clone()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            exn::bail!(ErrorKind::Failed {
                tool: self.name.clone(),
                code: output.status.code(),
                output: tail(combined.trim(), MAX_REPORTED_OUTPUT).to_string(),
            });
        }
        Ok(combined)
    }
}

/// The last `max` bytes of `text`, moved forward to a character boundary.
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
