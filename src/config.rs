use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_FORMBRICKS_URL: &str = "http://localhost:3000";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";
pub const DATASET_FILE_NAME: &str = "generated_data.json";

/// Every environment variable the tool understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    OpenAiApiKey,
    OpenAiModel,
    OpenAiBaseUrl,
    FormbricksApiKey,
    OrganizationId,
    EnvironmentId,
    FormbricksUrl,
    DataDir,
    ComposeFile,
}

impl SettingKey {
    pub const ALL: [SettingKey; 9] = [
        SettingKey::OpenAiApiKey,
        SettingKey::OpenAiModel,
        SettingKey::OpenAiBaseUrl,
        SettingKey::FormbricksApiKey,
        SettingKey::OrganizationId,
        SettingKey::EnvironmentId,
        SettingKey::FormbricksUrl,
        SettingKey::DataDir,
        SettingKey::ComposeFile,
    ];

    /// Keys the `generate` command cannot run without.
    pub const GENERATE: &'static [SettingKey] = &[SettingKey::OpenAiApiKey];

    /// Keys the `seed` command cannot run without.
    pub const SEED: &'static [SettingKey] = &[
        SettingKey::FormbricksApiKey,
        SettingKey::OrganizationId,
        SettingKey::EnvironmentId,
    ];

    /// Keys `seed` needs, plus the model key when answers come from the model.
    pub fn for_seed(llm_responses: bool) -> Vec<SettingKey> {
        let mut keys = SettingKey::SEED.to_vec();
        if llm_responses {
            keys.extend_from_slice(SettingKey::GENERATE);
        }
        keys
    }

    pub fn env_var(self) -> &'static str {
        match self {
            SettingKey::OpenAiApiKey => "OPENAI_API_KEY",
            SettingKey::OpenAiModel => "OPENAI_MODEL",
            SettingKey::OpenAiBaseUrl => "OPENAI_BASE_URL",
            SettingKey::FormbricksApiKey => "FORMBRICKS_API_KEY",
            SettingKey::OrganizationId => "ORGANIZATION_ID",
            SettingKey::EnvironmentId => "ENVIRONMENT_ID",
            SettingKey::FormbricksUrl => "FORMBRICKS_URL",
            SettingKey::DataDir => "FORMBRICKS_DATA_DIR",
            SettingKey::ComposeFile => "FORMBRICKS_COMPOSE_FILE",
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(self, SettingKey::OpenAiApiKey | SettingKey::FormbricksApiKey)
    }
}

/// Validated settings, built once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub formbricks_api_key: Option<String>,
    pub organization_id: Option<String>,
    pub environment_id: Option<String>,
    pub formbricks_url: String,
    pub data_dir: PathBuf,
    pub compose_file: PathBuf,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn load(required: &[SettingKey]) -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(required, |key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key/value source.
    ///
    /// Blank values count as absent. Every missing required key is reported,
    /// not only the first one.
    pub fn from_lookup<F>(required: &[SettingKey], lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: SettingKey| {
            lookup(key.env_var())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<&'static str> = required
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .map(SettingKey::env_var)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let formbricks_url = get(SettingKey::FormbricksUrl)
            .unwrap_or_else(|| DEFAULT_FORMBRICKS_URL.to_string());
        let openai_base_url = get(SettingKey::OpenAiBaseUrl)
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        check_url(SettingKey::FormbricksUrl, &formbricks_url)?;
        check_url(SettingKey::OpenAiBaseUrl, &openai_base_url)?;

        Ok(Self {
            openai_api_key: get(SettingKey::OpenAiApiKey),
            openai_model: get(SettingKey::OpenAiModel)
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: openai_base_url.trim_end_matches('/').to_string(),
            formbricks_api_key: get(SettingKey::FormbricksApiKey),
            organization_id: get(SettingKey::OrganizationId),
            environment_id: get(SettingKey::EnvironmentId),
            formbricks_url: formbricks_url.trim_end_matches('/').to_string(),
            data_dir: PathBuf::from(
                get(SettingKey::DataDir).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            compose_file: PathBuf::from(
                get(SettingKey::ComposeFile).unwrap_or_else(|| DEFAULT_COMPOSE_FILE.to_string()),
            ),
        })
    }

    /// Returns the current value of `key`, defaults included.
    pub fn value(&self, key: SettingKey) -> Option<String> {
        match key {
            SettingKey::OpenAiApiKey => self.openai_api_key.clone(),
            SettingKey::OpenAiModel => Some(self.openai_model.clone()),
            SettingKey::OpenAiBaseUrl => Some(self.openai_base_url.clone()),
            SettingKey::FormbricksApiKey => self.formbricks_api_key.clone(),
            SettingKey::OrganizationId => self.organization_id.clone(),
            SettingKey::EnvironmentId => self.environment_id.clone(),
            SettingKey::FormbricksUrl => Some(self.formbricks_url.clone()),
            SettingKey::DataDir => Some(self.data_dir.display().to_string()),
            SettingKey::ComposeFile => Some(self.compose_file.display().to_string()),
        }
    }

    /// Like [`Settings::value`] but turns an absent key into a `ConfigError`.
    pub fn require(&self, key: SettingKey) -> Result<String, ConfigError> {
        self.value(key)
            .ok_or_else(|| ConfigError::Missing(vec![key.env_var()]))
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.data_dir.join(DATASET_FILE_NAME)
    }
}

fn check_url(key: SettingKey, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key: key.env_var(),
            reason: "must start with http:// or https://".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_all_required_present() {
        let settings = Settings::from_lookup(
            SettingKey::SEED,
            lookup_from(&[
                ("FORMBRICKS_API_KEY", "fb-key"),
                ("ORGANIZATION_ID", "org-1"),
                ("ENVIRONMENT_ID", "env-1"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.formbricks_api_key.as_deref(), Some("fb-key"));
        assert_eq!(settings.organization_id.as_deref(), Some("org-1"));
        assert_eq!(settings.environment_id.as_deref(), Some("env-1"));
        assert_eq!(settings.formbricks_url, DEFAULT_FORMBRICKS_URL);
        assert_eq!(settings.openai_model, DEFAULT_OPENAI_MODEL);
        assert_eq!(settings.dataset_path(), PathBuf::from("data/generated_data.json"));
    }

    #[test]
    fn test_every_missing_key_is_named() {
        let err = Settings::from_lookup(
            SettingKey::SEED,
            lookup_from(&[("ORGANIZATION_ID", "org-1")]),
        )
        .unwrap_err();

        assert_eq!(
            err,
            ConfigError::Missing(vec!["FORMBRICKS_API_KEY", "ENVIRONMENT_ID"])
        );
    }

    #[test]
    fn test_each_subset_of_missing_keys_is_reported() {
        let all = [
            ("FORMBRICKS_API_KEY", "k"),
            ("ORGANIZATION_ID", "o"),
            ("ENVIRONMENT_ID", "e"),
        ];
        for mask in 0u8..7 {
            let present: Vec<(&str, &str)> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, pair)| *pair)
                .collect();
            let expected: Vec<&str> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) == 0)
                .map(|(_, (k, _))| *k)
                .collect();

            let err = Settings::from_lookup(SettingKey::SEED, lookup_from(&present)).unwrap_err();
            assert_eq!(err, ConfigError::Missing(expected));
        }
    }

    #[test]
    fn test_llm_seeding_also_needs_model_key() {
        let env = [
            ("FORMBRICKS_API_KEY", "k"),
            ("ORGANIZATION_ID", "o"),
            ("ENVIRONMENT_ID", "e"),
        ];
        assert!(Settings::from_lookup(&SettingKey::for_seed(false), lookup_from(&env)).is_ok());

        let err = Settings::from_lookup(&SettingKey::for_seed(true), lookup_from(&env)).unwrap_err();
        assert_eq!(err, ConfigError::Missing(vec!["OPENAI_API_KEY"]));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let err = Settings::from_lookup(
            SettingKey::GENERATE,
            lookup_from(&[("OPENAI_API_KEY", "   ")]),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing(vec!["OPENAI_API_KEY"]));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let err = Settings::from_lookup(&[], lookup_from(&[("FORMBRICKS_URL", "localhost:3000")]))
            .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { key: "FORMBRICKS_URL", .. });
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let settings = Settings::from_lookup(
            &[],
            lookup_from(&[
                ("FORMBRICKS_URL", "http://fb.local:8080/"),
                ("OPENAI_MODEL", "gpt-4o"),
                ("FORMBRICKS_DATA_DIR", "/tmp/seed"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.formbricks_url, "http://fb.local:8080");
        assert_eq!(settings.openai_model, "gpt-4o");
        assert_eq!(settings.dataset_path(), PathBuf::from("/tmp/seed/generated_data.json"));
        assert_matches!(
            settings.require(SettingKey::OpenAiApiKey),
            Err(ConfigError::Missing(keys)) if keys == vec!["OPENAI_API_KEY"]
        );
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() {
        std::env::set_var("OPENAI_API_KEY", "sk-from-env");
        let settings = Settings::load(SettingKey::GENERATE).unwrap();
        std::env::remove_var("OPENAI_API_KEY");

        assert_eq!(settings.openai_api_key.as_deref(), Some("sk-from-env"));
    }
}
