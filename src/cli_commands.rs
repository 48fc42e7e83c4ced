use anyhow::Result;
use duct::cmd;
use std::path::PathBuf;

use crate::progress::ProgressHelper;

/// Captured result of an external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub struct CommandRunner {
    progress: ProgressHelper,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            progress: ProgressHelper::new(),
        }
    }

    /// Runs `program args..` in `dir`, capturing both streams.
    ///
    /// A non-zero exit is not an error here; callers decide what it means.
    pub async fn run_command(
        &mut self,
        program: String,
        args: Vec<String>,
        dir: Option<PathBuf>,
    ) -> Result<CommandOutput> {
        let message = format!("Running: {} {}", program, args.join(" "));
        tracing::debug!("{}", message);

        self.progress
            .with_progress(&message, move || {
                let mut expression = cmd(&program, &args)
                    .stdout_capture()
                    .stderr_capture()
                    .unchecked();
                if let Some(dir) = dir {
                    expression = expression.dir(dir);
                }
                let output = expression
                    .run()
                    .map_err(|e| anyhow::anyhow!("Failed to launch {}: {}", program, e))?;

                Ok(CommandOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            })
            .await
    }

    /// Whether `program args..` launches and exits zero. Output is discarded.
    pub fn probe(program: &str, args: &[&str]) -> bool {
        cmd(program, args)
            .stdout_null()
            .stderr_null()
            .unchecked()
            .run()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// First line of `program args..` stdout, if it ran successfully.
    pub fn version_of(program: &str, args: &[&str]) -> Option<String> {
        cmd(program, args)
            .stderr_null()
            .read()
            .ok()
            .and_then(|out| out.lines().next().map(|l| l.trim().to_string()))
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CommandRunner {
    fn drop(&mut self) {
        self.progress.finish();
    }
}
