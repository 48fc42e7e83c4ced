use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::future::Future;
use std::time::Duration;

/// Spinner shown on stderr while waiting on Docker, the model or the platform.
pub struct ProgressHelper {
    spinner: Option<ProgressBar>,
}

impl ProgressHelper {
    pub fn new() -> Self {
        Self { spinner: None }
    }

    pub fn start(&mut self, message: &str) {
        self.finish();

        let spinner = if console::Term::stderr().is_term() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
        };
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    pub fn set_message(&self, message: &str) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(message.to_string());
        }
    }

    pub fn finish(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Runs a blocking closure on the blocking pool with the spinner active.
    pub async fn with_progress<F, T>(&mut self, message: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.start(message);
        let result = tokio::task::spawn_blocking(f).await;
        self.finish();
        result.map_err(|e| anyhow::anyhow!("Background task failed: {}", e))?
    }

    /// Awaits `future` with the spinner active.
    pub async fn track<F, T>(&mut self, message: &str, future: F) -> T
    where
        F: Future<Output = T>,
    {
        self.start(message);
        let output = future.await;
        self.finish();
        output
    }
}

impl Default for ProgressHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressHelper {
    fn drop(&mut self) {
        self.finish();
    }
}
