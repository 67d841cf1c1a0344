//! Shell command execution for tasks and lifecycle scripts.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Maximum captured output size per stream.
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

/// Output from running a script.
#[derive(Debug, Default)]
pub struct ScriptOutput {
    /// Exit code, `-1` when killed by a signal.
    pub exit_code: i32,
    /// Captured stdout (empty unless capturing).
    pub stdout: String,
    /// Captured stderr (empty unless capturing).
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl ScriptOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Environment tweaks for a script.
#[derive(Debug, Clone, Default)]
pub struct ScriptOptions {
    /// Extra variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Directories prepended to `PATH`, first entry searched first.
    pub path_prefix: Vec<PathBuf>,
    /// Capture stdout/stderr instead of inheriting them.
    pub capture: bool,
}

impl ScriptOptions {
    #[must_use]
    pub fn captured() -> Self {
        Self {
            capture: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_path_prefix(mut self, dir: impl Into<PathBuf>) -> Self {
        self.path_prefix.push(dir.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn path_value(&self) -> io::Result<Option<OsString>> {
        if self.path_prefix.is_empty() {
            return Ok(None);
        }
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let dirs = self
            .path_prefix
            .iter()
            .cloned()
            .chain(std::env::split_paths(&inherited));
        std::env::join_paths(dirs)
            .map(Some)
            .map_err(io::Error::other)
    }
}

/// Run `command` through the platform shell in `cwd`.
///
/// # Errors
///
/// Returns an error if the shell cannot be spawned. A non-zero exit is not an
/// error; check [`ScriptOutput::success`].
pub async fn run_script(command: &str, cwd: &Path, options: &ScriptOptions) -> io::Result<ScriptOutput> {
    let (shell, shell_arg) = if cfg!(windows) {
        ("cmd.exe", "/C")
    } else {
        ("sh", "-c")
    };

    let mut cmd = Command::new(shell);
    cmd.arg(shell_arg).arg(command).current_dir(cwd).envs(&options.env);

    if let Some(path) = options.path_value()? {
        cmd.env("PATH", path);
    }

    if options.capture {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    }

    let output = cmd.output().await?;
    let (stdout, stdout_truncated) = truncate(&output.stdout);
    let (stderr, stderr_truncated) = truncate(&output.stderr);

    Ok(ScriptOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    })
}

fn truncate(bytes: &[u8]) -> (String, bool) {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end();
    if text.len() <= MAX_OUTPUT_SIZE {
        return (text.to_string(), false);
    }
    let mut end = MAX_OUTPUT_SIZE;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (text[..end].to_string(), true)
}
