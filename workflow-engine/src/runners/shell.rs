// Shell Runner
// Executes run steps through sh or bash

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Shells supported by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shell {
    /// POSIX sh
    #[default]
    Sh,
    /// Bash, resolved on PATH
    Bash,
}

impl Shell {
    /// Parse the `shell:` field of a run step
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sh" => Some(Shell::Sh),
            "bash" => Some(Shell::Bash),
            _ => None,
        }
    }

    /// Locate the shell executable
    fn resolve(&self) -> Result<PathBuf, String> {
        let name = match self {
            Shell::Sh => "sh",
            Shell::Bash => "bash",
        };
        which::which(name).map_err(|e| format!("shell '{}' not found: {}", name, e))
    }
}

/// Per-step execution options
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    /// Working directory override, relative paths resolved by the caller
    pub working_dir: Option<PathBuf>,
}

/// Output collected from a script
#[derive(Debug, Clone, Default)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; None when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn spawn_failure(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            exit_code: None,
        }
    }
}

/// Runner for script steps
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    default_shell: Shell,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_shell(shell: Shell) -> Self {
        Self {
            default_shell: shell,
        }
    }

    /// Run a script with the given (or default) shell.
    /// Never errors: spawn failures come back as a failed ShellOutput.
    pub async fn run(
        &self,
        script: &str,
        shell: Option<Shell>,
        env: &HashMap<String, String>,
        working_dir: &Path,
        config: &ShellConfig,
    ) -> ShellOutput {
        let shell = shell.unwrap_or(self.default_shell);
        let program = match shell.resolve() {
            Ok(path) => path,
            Err(message) => return ShellOutput::spawn_failure(message),
        };

        let work_dir = config.working_dir.as_deref().unwrap_or(working_dir);

        let mut cmd = Command::new(&program);
        cmd.arg("-c");
        cmd.arg(script);
        cmd.current_dir(work_dir);
        cmd.envs(env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ShellOutput::spawn_failure(format!(
                    "failed to spawn '{}': {}",
                    program.display(),
                    e
                ));
            }
        };

        let stdout_handle = child.stdout.take().map(collect_lines);
        let stderr_handle = child.stderr.take().map(collect_lines);

        let status = child.wait().await;

        let stdout = match stdout_handle {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        let stderr = match stderr_handle {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(_) => None,
        };

        ShellOutput {
            stdout,
            stderr,
            exit_code,
        }
    }
}

fn collect_lines<R>(reader: R) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut output = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&line);
        }
        output
    })
}
