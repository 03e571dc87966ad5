//! Shell command execution.

use std::io;
use std::process::Command;

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
    /// Whether the process exited with status 0.
    pub success: bool,
    /// `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
}

/// Runs external programs to completion.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`, waiting for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the program could not be spawned. A program
    /// that runs and fails is an `Ok` with `success == false`.
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;
}

/// Spawns real processes via [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        tracing::debug!(program, ?args, "Running command");
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_status() {
        let out = SystemCommandRunner.run("sh", &["-c", "echo hi"]).unwrap();
        assert!(out.success);
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout, "hi\n");
    }

    #[test]
    fn reports_failure_with_code() {
        let out = SystemCommandRunner
            .run("sh", &["-c", "echo oops >&2; exit 3"])
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stderr, "oops\n");
    }

    #[test]
    fn missing_program_is_spawn_error() {
        assert!(
            SystemCommandRunner
                .run("dory-definitely-not-a-real-program", &[])
                .is_err()
        );
    }
}
