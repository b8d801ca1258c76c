use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::errors::{LodeError, LodeResult};

/// An external command, built up fluently and run to completion.
///
/// Used for the handful of tools lode shells out to (currently `git`).
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child. Later values win.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// `program arg1 arg2`, for logs and error messages.
    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the command and capture its output, whatever its exit status.
    pub fn exec(&self) -> LodeResult<Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        tracing::debug!("running `{}`", self.display());
        Ok(cmd.output()?)
    }

    /// Run the command and return its trimmed stdout. A non-zero exit is
    /// an error carrying the command line and its stderr.
    pub fn exec_stdout(&self) -> LodeResult<String> {
        let output = self.exec()?;
        if !output.status.success() {
            return Err(LodeError::Generic {
                message: format!(
                    "`{}` failed ({}): {}",
                    self.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
