//! Shell command execution with working-directory tracking.

use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Returns the appropriate shell command and argument for the current
/// platform: `("cmd", "/C")` on Windows, `("sh", "-c")` elsewhere.
#[must_use]
const fn get_shell_command() -> (&'static str, &'static str) {
    if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") }
}

/// Executes opaque command text and tracks the working directory across
/// commands.
///
/// `cd` is interpreted by the executor itself so the directory survives
/// between commands; everything else is handed verbatim to the platform
/// shell. A command's stderr, when non-empty, becomes the output prefixed
/// with `Error: `, matching what the control server reports upstream.
pub struct ShellExecutor {
    cwd: PathBuf,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellExecutor {
    /// Start in the process working directory.
    #[must_use]
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { cwd }
    }

    /// Start in a specific directory.
    #[must_use]
    pub const fn with_cwd(cwd: PathBuf) -> Self {
        Self { cwd }
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Execute one command to completion.
    ///
    /// Returns `(output, cwd)` where `cwd` is the working directory after
    /// the command. Never fails: execution problems become `Error: ...`
    /// output, since the caller's job is to report them, not handle them.
    pub async fn run(&mut self, command: &str) -> (String, String) {
        let trimmed = command.trim();
        if trimmed == "cd" || trimmed.starts_with("cd ") {
            return self.change_dir(trimmed[2..].trim());
        }

        let (shell, shell_arg) = get_shell_command();
        let output = Command::new(shell)
            .arg(shell_arg)
            .arg(trimmed)
            .current_dir(&self.cwd)
            .output()
            .await;

        let text = match output {
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stderr.trim().is_empty() {
                    String::from_utf8_lossy(&output.stdout).into_owned()
                } else {
                    format!("Error: {stderr}")
                }
            }
            Err(e) => format!("Error: {e}"),
        };
        (text, self.cwd_string())
    }

    fn change_dir(&mut self, target: &str) -> (String, String) {
        let requested = if target.is_empty() || target == "~" {
            dirs::home_dir().unwrap_or_else(|| self.cwd.clone())
        } else if let Some(rest) = target.strip_prefix("~/") {
            dirs::home_dir()
                .unwrap_or_else(|| self.cwd.clone())
                .join(rest)
        } else {
            let path = Path::new(target);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.cwd.join(path)
            }
        };

        match requested.canonicalize() {
            Ok(resolved) if resolved.is_dir() => {
                self.cwd = resolved;
                (String::new(), self.cwd_string())
            }
            Ok(resolved) => (
                format!("Error: not a directory: {}", resolved.display()),
                self.cwd_string(),
            ),
            Err(e) => (format!("Error: {e}"), self.cwd_string()),
        }
    }

    fn cwd_string(&self) -> String {
        self.cwd.display().to_string()
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let mut shell = ShellExecutor::new();
        let (output, cwd) = shell.run("echo shell-test").await;
        assert_eq!(output, "shell-test\n");
        assert_eq!(cwd, shell.cwd().display().to_string());
    }

    #[tokio::test]
    async fn stderr_becomes_error_output() {
        let mut shell = ShellExecutor::new();
        let (output, _) = shell.run("echo oops 1>&2").await;
        assert!(output.starts_with("Error: "), "got: {output}");
        assert!(output.contains("oops"));
    }

    #[tokio::test]
    async fn cd_changes_directory_for_later_commands() {
        let mut shell = ShellExecutor::with_cwd(std::env::temp_dir());
        let (output, cwd) = shell.run("cd /").await;
        assert_eq!(output, "");
        assert_eq!(cwd, "/");

        let (output, _) = shell.run("pwd").await;
        assert_eq!(output, "/\n");
    }

    #[tokio::test]
    async fn cd_to_missing_directory_reports_error_and_keeps_cwd() {
        let mut shell = ShellExecutor::with_cwd(PathBuf::from("/"));
        let (output, cwd) = shell.run("cd /definitely-not-a-real-dir").await;
        assert!(output.starts_with("Error: "));
        assert_eq!(cwd, "/");
    }

    #[tokio::test]
    async fn relative_cd_resolves_against_tracked_cwd() {
        let mut shell = ShellExecutor::with_cwd(PathBuf::from("/usr"));
        let (output, cwd) = shell.run("cd ..").await;
        assert_eq!(output, "");
        assert_eq!(cwd, "/");
    }
}
