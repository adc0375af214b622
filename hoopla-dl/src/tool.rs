//! External program invocation.

use async_trait::async_trait;
use colored::Colorize;
use log::{debug, info};
use std::{process::Stdio, time::Duration};
use tokio::process::Command;

/// One call of an external program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolInvocation {
    /// Shell like rendering used in logs.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|x| {
                if x.contains(' ') {
                    format!("\"{x}\"")
                } else {
                    x.to_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutput {
    Exited {
        /// `None` when the program was terminated by a signal.
        code: Option<i32>,
        success: bool,
        stdout: String,
        stderr: String,
    },
    /// The timeout elapsed and the program was killed.
    TimedOut,
}

/// Runs external programs. Substituted by test doubles.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Fails only when the program could not be started.
    async fn run(&self, invocation: &ToolInvocation) -> std::io::Result<ToolOutput>;
}

/// [`ToolRunner`] spawning real child processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> std::io::Result<ToolOutput> {
        info!("Executing {}", invocation.command_line().bold());

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the pending future drops the child, which kills it.
        match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                debug!("{} exited with {}", invocation.program, output.status);

                Ok(ToolOutput::Exited {
                    code: output.status.code(),
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Err(_) => Ok(ToolOutput::TimedOut),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ToolInvocation {
        ToolInvocation {
            program: "sh".to_owned(),
            args: vec!["-c".to_owned(), script.to_owned()],
            timeout,
        }
    }

    #[tokio::test]
    async fn test_captures_exit_status() {
        let output = ProcessRunner
            .run(&sh("echo out; echo err >&2; exit 3", Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(
            output,
            ToolOutput::Exited {
                code: Some(3),
                success: false,
                stdout: "out\n".to_owned(),
                stderr: "err\n".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn test_times_out() {
        let output = ProcessRunner
            .run(&sh("sleep 5", Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(output, ToolOutput::TimedOut);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let invocation = ToolInvocation {
            program: "hoopla-dl-no-such-program".to_owned(),
            args: vec![],
            timeout: Duration::from_secs(1),
        };

        assert!(ProcessRunner.run(&invocation).await.is_err());
    }

    #[test]
    fn test_command_line() {
        let invocation = sh("a b", Duration::ZERO);
        assert_eq!(invocation.command_line(), "sh -c \"a b\"");
    }
}
