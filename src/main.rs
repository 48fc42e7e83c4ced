use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use formbricks_seeder::app::{App, SeedArgs};
use formbricks_seeder::config::{SettingKey, Settings};
use formbricks_seeder::generator::{DEFAULT_SURVEY_COUNT, DEFAULT_USER_COUNT};
use formbricks_seeder::lifecycle::PollPolicy;
use formbricks_seeder::output::OutputHandler;

#[derive(Parser)]
#[command(name = "formbricks-seeder")]
#[command(about = "Run a local Formbricks instance and fill it with generated data", long_about = None)]
#[command(version)]
struct Cli {
    /// Show debug logs and full failure details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the local Formbricks platform
    Formbricks {
        #[command(subcommand)]
        action: FormbricksAction,
    },
}

#[derive(Subcommand)]
enum FormbricksAction {
    /// Start the Docker Compose deployment and wait until it is healthy
    Up {
        /// Seconds to wait for the health check
        #[arg(long, default_value_t = 120)]
        timeout: u64,

        /// Seconds between health checks
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },

    /// Stop the Docker Compose deployment
    Down,

    /// Generate surveys and users with the configured model
    Generate {
        #[arg(long, default_value_t = DEFAULT_SURVEY_COUNT)]
        surveys: usize,

        #[arg(long, default_value_t = DEFAULT_USER_COUNT)]
        users: usize,

        /// Where to write the dataset (default: <FORMBRICKS_DATA_DIR>/generated_data.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Create the generated users, surveys and responses on the platform
    Seed {
        /// Dataset to read (default: <FORMBRICKS_DATA_DIR>/generated_data.json)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Pause between API calls, in milliseconds
        #[arg(long, default_value_t = 500)]
        delay_ms: u64,

        #[arg(long, default_value_t = 1)]
        responses_per_survey: usize,

        /// Ask the model for response answers instead of synthesizing them
        #[arg(long)]
        llm_responses: bool,
    },

    /// Check that Docker, the compose file and settings are in place
    Check,
}

impl FormbricksAction {
    /// Settings that must be present before the action starts.
    fn required_keys(&self) -> Vec<SettingKey> {
        match self {
            FormbricksAction::Generate { .. } => SettingKey::GENERATE.to_vec(),
            FormbricksAction::Seed { llm_responses, .. } => SettingKey::for_seed(*llm_responses),
            FormbricksAction::Up { .. } | FormbricksAction::Down | FormbricksAction::Check => {
                Vec::new()
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(Command::Formbricks { action }) = cli.command else {
        OutputHandler::new().print_banner()?;
        println!();
        println!("Run `formbricks-seeder formbricks --help` to see available commands.");
        return Ok(());
    };

    if let Err(err) = run(action, cli.verbose).await {
        OutputHandler::new().error(&format!("{:#}", err))?;
        std::process::exit(1);
    }
    Ok(())
}

async fn run(action: FormbricksAction, verbose: bool) -> Result<()> {
    let settings = Settings::load(&action.required_keys())?;
    let mut app = App::new(&settings, verbose);

    match action {
        FormbricksAction::Up { timeout, interval } => {
            app.up(PollPolicy {
                interval: Duration::from_secs(interval.max(1)),
                timeout: Duration::from_secs(timeout),
            })
            .await
        }
        FormbricksAction::Down => app.down().await,
        FormbricksAction::Generate {
            surveys,
            users,
            output,
        } => app.generate(surveys, users, output).await,
        FormbricksAction::Seed {
            input,
            delay_ms,
            responses_per_survey,
            llm_responses,
        } => {
            app.seed(SeedArgs {
                input,
                delay: Duration::from_millis(delay_ms),
                responses_per_survey,
                llm_responses,
            })
            .await
        }
        FormbricksAction::Check => app.check().await,
    }
}

/// Logs go to stderr so they never mix with command output.
/// `RUST_LOG` wins over `--verbose`; `.env` is read later, with the settings.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("formbricks_seeder={}", default))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
