use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::api::OpenAiClient;
use crate::cli_commands::CommandRunner;
use crate::config::{SettingKey, Settings};
use crate::dataset;
use crate::formbricks::FormbricksClient;
use crate::generator::Generator;
use crate::lifecycle::{self, DockerCompose, HttpHealthProbe, PollPolicy};
use crate::output::OutputHandler;
use crate::progress::ProgressHelper;
use crate::seed::{EntityKind, SeedOptions, Seeder};
use crate::synth::{LlmResponses, LocalSynthesizer, ResponsePolicy, ResponseSource};

/// Options for `formbricks seed`.
#[derive(Debug, Clone)]
pub struct SeedArgs {
    pub input: Option<PathBuf>,
    pub delay: Duration,
    pub responses_per_survey: usize,
    pub llm_responses: bool,
}

impl Default for SeedArgs {
    fn default() -> Self {
        Self {
            input: None,
            delay: crate::seed::DEFAULT_CALL_DELAY,
            responses_per_survey: 1,
            llm_responses: false,
        }
    }
}

/// One handler per subcommand, all sharing the settings loaded at startup.
pub struct App<'a> {
    settings: &'a Settings,
    output: OutputHandler,
}

impl<'a> App<'a> {
    pub fn new(settings: &'a Settings, verbose: bool) -> Self {
        Self {
            settings,
            output: OutputHandler::new().with_verbose(verbose),
        }
    }

    pub async fn up(&mut self, policy: PollPolicy) -> Result<()> {
        let settings = self.settings;
        let compose = DockerCompose::detect(settings.compose_file.clone()).await;
        let probe = HttpHealthProbe::new(&settings.formbricks_url)?;

        self.output.section("Starting Formbricks")?;
        self.output
            .info(&format!("Compose file: {}", compose.compose_file().display()))?;
        let mut progress = ProgressHelper::new();
        let attempts = lifecycle::up(&compose, &probe, policy, &mut progress)
            .await
            .context("Failed to start Formbricks")?;

        self.output.success(&format!(
            "Formbricks is up at {} ({} health check(s))",
            settings.formbricks_url, attempts
        ))?;
        self.output.info("Next steps:")?;
        self.output.info(&format!(
            "  1. Open {} and create an organization",
            settings.formbricks_url
        ))?;
        self.output.info(
            "  2. Create a Management API key under Organization Settings → API Keys",
        )?;
        self.output.info(&format!(
            "  3. Put it in .env as {} along with {} and {}",
            SettingKey::FormbricksApiKey.env_var(),
            SettingKey::OrganizationId.env_var(),
            SettingKey::EnvironmentId.env_var()
        ))?;
        Ok(())
    }

    pub async fn down(&mut self) -> Result<()> {
        let compose = DockerCompose::detect(self.settings.compose_file.clone()).await;

        self.output.section("Stopping Formbricks")?;
        self.output
            .info(&format!("Compose file: {}", compose.compose_file().display()))?;
        lifecycle::down(&compose)
            .await
            .context("Failed to stop Formbricks")?;
        self.output.success("Formbricks stopped")?;
        Ok(())
    }

    pub async fn generate(
        &mut self,
        surveys: usize,
        users: usize,
        output: Option<PathBuf>,
    ) -> Result<()> {
        let client = openai_client(self.settings)?;
        let model = client.model().to_string();
        let generator = Generator::new(Arc::new(client));
        let path = output.unwrap_or_else(|| self.settings.dataset_path());

        self.output.section("Generating data")?;
        let mut progress = ProgressHelper::new();
        let dataset = progress
            .track(
                &format!(
                    "Asking {} for {} surveys and {} users",
                    model, surveys, users
                ),
                generator.generate(surveys, users),
            )
            .await
            .context("Data generation failed")?;

        dataset::save(&path, &dataset)?;
        self.output.print_dataset_summary(&dataset)?;
        self.output
            .success(&format!("Saved dataset to {}", path.display()))?;
        Ok(())
    }

    pub async fn seed(&mut self, args: SeedArgs) -> Result<()> {
        let settings = self.settings;
        let path = args.input.clone().unwrap_or_else(|| settings.dataset_path());
        let dataset = dataset::load(&path).with_context(|| {
            format!(
                "Could not read {}. Run `formbricks generate` first",
                path.display()
            )
        })?;

        if dataset.is_empty() {
            self.output
                .warning(&format!("{} contains no surveys or users", path.display()))?;
        }
        for email in dataset.duplicate_emails() {
            self.output
                .warning(&format!("Duplicate email in dataset: {}", email))?;
        }

        let client = FormbricksClient::from_settings(settings)?;
        let policy = ResponsePolicy {
            responses_per_survey: args.responses_per_survey,
            response_url: Some(client.base_url().to_string()),
            ..ResponsePolicy::default()
        };
        let local = LocalSynthesizer::new(policy);
        let source: Box<dyn ResponseSource> = if args.llm_responses {
            let generator = Generator::new(Arc::new(openai_client(settings)?));
            Box::new(LlmResponses::new(generator, local))
        } else {
            Box::new(local)
        };

        self.output.section(&format!("Seeding {}", client.base_url()))?;
        let seeder = Seeder::new(&client, source.as_ref()).with_options(SeedOptions {
            delay: args.delay,
            ..SeedOptions::default()
        });

        let mut progress = ProgressHelper::new();
        progress.start("Checking platform");
        let report = seeder
            .seed_with(&dataset, |outcome| {
                let phase = match outcome.kind {
                    EntityKind::User => "Creating users",
                    EntityKind::Survey => "Creating surveys",
                    EntityKind::Response => "Submitting responses",
                };
                progress.set_message(&format!("{}: {}", phase, outcome.label));
            })
            .await;
        progress.finish();

        let report = report.context("Seeding aborted")?;
        if let Some(account) = &report.account {
            self.output.info(&format!("Authenticated as {}", account))?;
        }
        self.output.print_seed_report(&report)?;

        if report.has_failures() {
            self.output
                .warning("Some entities could not be created, see the failures above")?;
        } else {
            self.output.success("Seeding complete")?;
        }
        Ok(())
    }

    /// Reports whether the local toolchain and settings are in place.
    pub async fn check(&mut self) -> Result<()> {
        let settings = self.settings;
        let mut problems = 0;

        let mut progress = ProgressHelper::new();
        let (docker, compose) = progress
            .with_progress("Looking for Docker", || {
                let docker = CommandRunner::version_of("docker", &["--version"]);
                let compose = CommandRunner::version_of("docker", &["compose", "version"])
                    .or_else(|| CommandRunner::version_of("docker-compose", &["--version"]));
                Ok((docker, compose))
            })
            .await?;

        self.output.section("Tools")?;
        match docker {
            Some(version) => self.output.success(&version)?,
            None => {
                problems += 1;
                self.output.error("docker not found on PATH")?;
            }
        }
        match compose {
            Some(version) => self.output.success(&version)?,
            None => {
                problems += 1;
                self.output.error("Neither `docker compose` nor docker-compose is available")?;
            }
        }

        self.output.section("Files")?;
        problems += self.check_file(&settings.compose_file, true)?;
        problems += self.check_file(Path::new(".env"), false)?;
        let dataset_path = settings.dataset_path();
        if dataset_path.is_file() {
            self.output
                .success(&format!("{} (dataset)", dataset_path.display()))?;
        } else {
            self.output.info(&format!(
                "{} not generated yet",
                dataset_path.display()
            ))?;
        }

        self.output.section("Settings")?;
        for key in SettingKey::ALL {
            match settings.value(key) {
                Some(value) if key.is_secret() => self
                    .output
                    .success(&format!("{} = {}", key.env_var(), mask(&value)))?,
                Some(value) => self
                    .output
                    .success(&format!("{} = {}", key.env_var(), value))?,
                None => self
                    .output
                    .warning(&format!("{} is not set", key.env_var()))?,
            }
        }

        if problems > 0 {
            anyhow::bail!("{} problem(s) found", problems);
        }
        self.output.success("Ready")?;
        Ok(())
    }

    fn check_file(&mut self, path: &Path, required: bool) -> Result<usize> {
        if path.is_file() {
            self.output.success(&path.display().to_string())?;
            Ok(0)
        } else if required {
            self.output
                .error(&format!("{} is missing", path.display()))?;
            Ok(1)
        } else {
            self.output
                .warning(&format!("{} is missing", path.display()))?;
            Ok(0)
        }
    }
}

fn openai_client(settings: &Settings) -> Result<OpenAiClient> {
    let api_key = settings.require(SettingKey::OpenAiApiKey)?;
    OpenAiClient::new(&settings.openai_base_url, &api_key, &settings.openai_model)
}

/// Keeps the first and last four characters of long secrets.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_middle_of_secret() {
        assert_eq!(mask("sk-1234567890abcd"), "sk-1…abcd");
        assert_eq!(mask("short"), "*****");
        assert_eq!(mask(""), "");
    }

    #[test]
    fn test_seed_args_defaults() {
        let args = SeedArgs::default();
        assert_eq!(args.delay, Duration::from_millis(500));
        assert_eq!(args.responses_per_survey, 1);
        assert!(!args.llm_responses);
        assert!(args.input.is_none());
    }

    #[test]
    fn test_openai_client_uses_configured_model() {
        let settings = Settings::from_lookup(
            SettingKey::GENERATE,
            |key| match key {
                "OPENAI_API_KEY" => Some("sk-test".to_string()),
                "OPENAI_MODEL" => Some("gpt-4o".to_string()),
                _ => None,
            },
        )
        .unwrap();
        assert_eq!(openai_client(&settings).unwrap().model(), "gpt-4o");
    }
}
