// Library exports for the formbricks-seeder CLI

pub mod api;
pub mod app;
pub mod cli_commands;
pub mod config;
pub mod dataset;
pub mod error;
pub mod formbricks;
pub mod generator;
pub mod lifecycle;
pub mod output;
pub mod progress;
pub mod seed;
pub mod synth;

pub use config::{SettingKey, Settings};
pub use dataset::GeneratedDataset;
pub use error::{ApiError, ConfigError, DatasetError, GenerationError, LifecycleError, SeedError};
pub use formbricks::{FormbricksClient, PlatformApi};
pub use output::OutputHandler;
pub use seed::{SeedReport, Seeder};
