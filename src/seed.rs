//! Seeding: users, then surveys, then responses.
//!
//! Each phase is a barrier. A failed entity is recorded in the report and the
//! run moves on; only an unreachable or unauthenticated platform stops it.

use serde_json::Value;
use std::time::Duration;

use crate::dataset::GeneratedDataset;
use crate::error::{ApiError, SeedError};
use crate::formbricks::PlatformApi;
use crate::synth::ResponseSource;

/// Default pause between platform calls.
pub const DEFAULT_CALL_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Survey,
    Response,
}

/// Why one entity was not created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub status: Option<u16>,
    pub message: String,
}

impl From<&ApiError> for Failure {
    fn from(err: &ApiError) -> Self {
        let message = match err {
            ApiError::Status { body, .. } => body.clone(),
            other => other.to_string(),
        };
        Self {
            status: err.status(),
            message,
        }
    }
}

/// Result of one create call. `index` is the entity's position in the
/// dataset; for responses it is the position of the owning survey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: EntityKind,
    pub index: usize,
    pub label: String,
    pub result: Result<String, Failure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedCounts {
    pub users_created: usize,
    pub users_failed: usize,
    pub surveys_created: usize,
    pub surveys_failed: usize,
    pub responses_created: usize,
    pub responses_failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Display name of the account behind the API key.
    pub account: Option<String>,
    pub users: Vec<Outcome>,
    pub surveys: Vec<Outcome>,
    pub responses: Vec<Outcome>,
}

impl SeedReport {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome.kind {
            EntityKind::User => self.users.push(outcome),
            EntityKind::Survey => self.surveys.push(outcome),
            EntityKind::Response => self.responses.push(outcome),
        }
    }

    pub fn counts(&self) -> SeedCounts {
        let split = |outcomes: &[Outcome]| {
            let ok = outcomes.iter().filter(|o| o.result.is_ok()).count();
            (ok, outcomes.len() - ok)
        };
        let (users_created, users_failed) = split(&self.users);
        let (surveys_created, surveys_failed) = split(&self.surveys);
        let (responses_created, responses_failed) = split(&self.responses);

        SeedCounts {
            users_created,
            users_failed,
            surveys_created,
            surveys_failed,
            responses_created,
            responses_failed,
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &Outcome> {
        self.users
            .iter()
            .chain(self.surveys.iter())
            .chain(self.responses.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.all().filter(|o| o.result.is_err())
    }

    /// `(label, platform id)` for everything that was created.
    pub fn created_ids(&self) -> impl Iterator<Item = (&str, &str)> {
        self.all().filter_map(|o| match &o.result {
            Ok(id) => Some((o.label.as_str(), id.as_str())),
            Err(_) => None,
        })
    }

    /// Platform id of the dataset's `index`-th survey, if it was created.
    pub fn survey_id(&self, index: usize) -> Option<&str> {
        self.surveys
            .iter()
            .find(|o| o.index == index)
            .and_then(|o| o.result.as_ref().ok())
            .map(String::as_str)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeedOptions {
    /// Pause after each platform call.
    pub delay: Duration,
    /// Check health and credentials before creating anything.
    pub preflight: bool,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            delay: DEFAULT_CALL_DELAY,
            preflight: true,
        }
    }
}

pub struct Seeder<'a> {
    api: &'a dyn PlatformApi,
    responses: &'a dyn ResponseSource,
    options: SeedOptions,
}

impl<'a> Seeder<'a> {
    pub fn new(api: &'a dyn PlatformApi, responses: &'a dyn ResponseSource) -> Self {
        Self {
            api,
            responses,
            options: SeedOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SeedOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn seed(&self, dataset: &GeneratedDataset) -> Result<SeedReport, SeedError> {
        self.seed_with(dataset, |_| {}).await
    }

    /// Like [`Seeder::seed`], calling `on_outcome` as each entity settles.
    pub async fn seed_with<F>(
        &self,
        dataset: &GeneratedDataset,
        mut on_outcome: F,
    ) -> Result<SeedReport, SeedError>
    where
        F: FnMut(&Outcome),
    {
        let mut report = SeedReport::default();
        if dataset.is_empty() {
            return Ok(report);
        }

        if self.options.preflight {
            report.account = self.preflight().await?;
        }

        let mut settle = |report: &mut SeedReport, outcome: Outcome| {
            if let Err(failure) = &outcome.result {
                tracing::warn!(
                    label = %outcome.label,
                    status = ?failure.status,
                    "Create failed: {}",
                    failure.message
                );
            } else {
                tracing::debug!(label = %outcome.label, "Created");
            }
            on_outcome(&outcome);
            report.record(outcome);
        };

        for (index, user) in dataset.users.iter().enumerate() {
            let result = self.api.create_user(user).await;
            settle(
                &mut report,
                outcome(EntityKind::User, index, format!("user {} <{}>", user.name, user.email), result),
            );
            self.pace().await;
        }

        let mut created = Vec::new();
        for (index, spec) in dataset.surveys.iter().enumerate() {
            let mut survey = spec.clone();
            survey.assign_missing_ids();

            let result = self.api.create_survey(&survey).await;
            if let Ok(id) = &result {
                created.push((index, id.clone(), survey.clone()));
            }
            settle(
                &mut report,
                outcome(EntityKind::Survey, index, format!("survey \"{}\"", survey.name), result),
            );
            self.pace().await;
        }

        for (index, survey_id, survey) in created {
            let payloads = match self.responses.responses_for(&survey).await {
                Ok(payloads) => payloads,
                Err(e) => {
                    settle(
                        &mut report,
                        Outcome {
                            kind: EntityKind::Response,
                            index,
                            label: format!("responses for \"{}\"", survey.name),
                            result: Err(Failure {
                                status: None,
                                message: e.to_string(),
                            }),
                        },
                    );
                    continue;
                }
            };

            for (n, payload) in payloads.iter().enumerate() {
                let result = self.api.submit_response(&survey_id, payload).await;
                settle(
                    &mut report,
                    outcome(
                        EntityKind::Response,
                        index,
                        format!("response #{} for \"{}\"", n + 1, survey.name),
                        result,
                    ),
                );
                self.pace().await;
            }
        }

        Ok(report)
    }

    async fn preflight(&self) -> Result<Option<String>, SeedError> {
        if !self.api.health_check().await {
            return Err(SeedError::Unreachable);
        }
        let account = self
            .api
            .verify_auth()
            .await
            .map_err(SeedError::Unauthorized)?;
        Ok(account_name(&account))
    }

    async fn pace(&self) {
        if !self.options.delay.is_zero() {
            tokio::time::sleep(self.options.delay).await;
        }
    }
}

fn outcome(
    kind: EntityKind,
    index: usize,
    label: String,
    result: Result<String, ApiError>,
) -> Outcome {
    Outcome {
        kind,
        index,
        label,
        result: result.map_err(|e| Failure::from(&e)),
    }
}

fn account_name(account: &Value) -> Option<String> {
    let root = account.get("data").unwrap_or(account);
    ["name", "email"]
        .iter()
        .find_map(|key| root.get(*key).and_then(Value::as_str))
        .or_else(|| {
            root.get("environment")
                .and_then(|env| env.get("id"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{QuestionSpec, QuestionType, SurveySpec, UserRole, UserSpec};
    use crate::formbricks::{MockPlatformApi, ResponsePayload};
    use crate::synth::{LocalSynthesizer, ResponsePolicy};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn options() -> SeedOptions {
        SeedOptions {
            delay: Duration::ZERO,
            preflight: true,
        }
    }

    fn survey(name: &str) -> SurveySpec {
        SurveySpec::new(
            name,
            vec![
                QuestionSpec::new(QuestionType::Nps, "Recommend?"),
                QuestionSpec::new(QuestionType::MultipleChoiceSingle, "Plan?")
                    .with_choices(&["Free", "Pro"]),
            ],
        )
    }

    fn healthy(api: &mut MockPlatformApi) {
        api.expect_health_check().times(1).returning(|| true);
        api.expect_verify_auth()
            .times(1)
            .returning(|| Ok(json!({"name": "Seeder Key"})));
    }

    fn local() -> LocalSynthesizer {
        LocalSynthesizer::with_seed(ResponsePolicy::default(), 42)
    }

    #[tokio::test]
    async fn test_empty_dataset_is_a_no_op() {
        // No expectations: any call would panic.
        let api = MockPlatformApi::new();
        let source = local();

        let report = Seeder::new(&api, &source)
            .with_options(options())
            .seed(&GeneratedDataset::default())
            .await
            .unwrap();

        assert_eq!(report.counts(), SeedCounts::default());
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_failed_survey_does_not_block_sibling() {
        let mut api = MockPlatformApi::new();
        healthy(&mut api);
        api.expect_create_survey().times(2).returning(|survey| {
            if survey.name == "Broken" {
                Err(ApiError::Status {
                    status: 400,
                    body: "{\"error\":\"invalid survey\"}".to_string(),
                })
            } else {
                Ok("srv_2".to_string())
            }
        });
        api.expect_submit_response()
            .withf(|survey_id: &str, payload: &ResponsePayload| {
                survey_id == "srv_2" && payload.data.contains_key("q1")
            })
            .times(1)
            .returning(|_, _| Ok("resp_1".to_string()));

        let dataset = GeneratedDataset {
            surveys: vec![survey("Broken"), survey("Healthy")],
            ..Default::default()
        };
        let source = local();
        let report = Seeder::new(&api, &source)
            .with_options(options())
            .seed(&dataset)
            .await
            .unwrap();

        let counts = report.counts();
        assert_eq!(counts.surveys_failed, 1);
        assert_eq!(counts.surveys_created, 1);
        assert_eq!(counts.responses_created, 1);
        assert_eq!(report.survey_id(0), None);
        assert_eq!(report.survey_id(1), Some("srv_2"));
        assert_eq!(report.account.as_deref(), Some("Seeder Key"));

        let failure = report.failures().next().unwrap();
        assert_eq!(failure.label, "survey \"Broken\"");
        assert_eq!(
            failure.result,
            Err(Failure {
                status: Some(400),
                message: "{\"error\":\"invalid survey\"}".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_per_entity_failure() {
        let mut api = MockPlatformApi::new();
        healthy(&mut api);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        api.expect_create_user().times(3).returning(move |user| {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(ApiError::Status {
                    status: 409,
                    body: format!("User with email {} already exists", user.email),
                })
            } else {
                Ok(format!("usr_{}", user.name.to_lowercase()))
            }
        });

        let dataset = GeneratedDataset {
            users: vec![
                UserSpec::new("Ann", "ann@acme.io", UserRole::Owner),
                UserSpec::new("Ann2", "ann@acme.io", UserRole::Manager),
                UserSpec::new("Bob", "bob@acme.io", UserRole::Manager),
            ],
            ..Default::default()
        };
        let source = local();
        let report = Seeder::new(&api, &source)
            .with_options(options())
            .seed(&dataset)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let counts = report.counts();
        assert_eq!(counts.users_created, 2);
        assert_eq!(counts.users_failed, 1);
        assert_eq!(report.users[1].result.as_ref().unwrap_err().status, Some(409));
        assert_eq!(
            report.created_ids().collect::<Vec<_>>(),
            vec![
                ("user Ann <ann@acme.io>", "usr_ann"),
                ("user Bob <bob@acme.io>", "usr_bob"),
            ]
        );
    }

    #[tokio::test]
    async fn test_phases_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut api = MockPlatformApi::new();
        healthy(&mut api);

        let l = log.clone();
        api.expect_create_user().returning(move |user| {
            l.lock().unwrap().push(format!("user:{}", user.name));
            Ok(user.name.clone())
        });
        let l = log.clone();
        api.expect_create_survey().returning(move |survey| {
            l.lock().unwrap().push(format!("survey:{}", survey.name));
            Ok(format!("id-{}", survey.name))
        });
        let l = log.clone();
        api.expect_submit_response().returning(move |survey_id, _| {
            l.lock().unwrap().push(format!("response:{}", survey_id));
            Ok("r".to_string())
        });

        let dataset = GeneratedDataset {
            surveys: vec![survey("S1"), survey("S2")],
            users: vec![
                UserSpec::new("U1", "u1@x.io", UserRole::Owner),
                UserSpec::new("U2", "u2@x.io", UserRole::Manager),
            ],
            generated_at: None,
        };
        let source = local();
        let mut seen = Vec::new();
        Seeder::new(&api, &source)
            .with_options(options())
            .seed_with(&dataset, |o| seen.push(o.kind))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "user:U1",
                "user:U2",
                "survey:S1",
                "survey:S2",
                "response:id-S1",
                "response:id-S2",
            ]
        );
        assert_eq!(
            seen,
            vec![
                EntityKind::User,
                EntityKind::User,
                EntityKind::Survey,
                EntityKind::Survey,
                EntityKind::Response,
                EntityKind::Response,
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_platform_is_fatal() {
        let mut api = MockPlatformApi::new();
        api.expect_health_check().returning(|| false);

        let dataset = GeneratedDataset {
            surveys: vec![survey("S")],
            ..Default::default()
        };
        let source = local();
        let err = Seeder::new(&api, &source)
            .with_options(options())
            .seed(&dataset)
            .await
            .unwrap_err();

        assert_matches!(err, SeedError::Unreachable);
    }

    #[tokio::test]
    async fn test_bad_api_key_is_fatal() {
        let mut api = MockPlatformApi::new();
        api.expect_health_check().returning(|| true);
        api.expect_verify_auth().returning(|| {
            Err(ApiError::Status {
                status: 401,
                body: "Not authenticated".to_string(),
            })
        });

        let dataset = GeneratedDataset {
            users: vec![UserSpec::new("U", "u@x.io", UserRole::Owner)],
            ..Default::default()
        };
        let source = local();
        let err = Seeder::new(&api, &source)
            .with_options(options())
            .seed(&dataset)
            .await
            .unwrap_err();

        assert_matches!(err, SeedError::Unauthorized(ApiError::Status { status: 401, .. }));
    }

    struct BrokenSource;

    #[async_trait]
    impl ResponseSource for BrokenSource {
        async fn responses_for(&self, _: &SurveySpec) -> anyhow::Result<Vec<ResponsePayload>> {
            Err(anyhow::anyhow!("no answers today"))
        }
    }

    #[tokio::test]
    async fn test_response_source_failure_is_recorded() {
        let mut api = MockPlatformApi::new();
        api.expect_create_survey()
            .returning(|_| Ok("srv".to_string()));

        let dataset = GeneratedDataset {
            surveys: vec![survey("S")],
            ..Default::default()
        };
        let report = Seeder::new(&api, &BrokenSource)
            .with_options(SeedOptions {
                delay: Duration::ZERO,
                preflight: false,
            })
            .seed(&dataset)
            .await
            .unwrap();

        let counts = report.counts();
        assert_eq!(counts.surveys_created, 1);
        assert_eq!(counts.responses_failed, 1);
        assert_eq!(
            report.responses[0].result.as_ref().unwrap_err().message,
            "no answers today"
        );
    }

    #[test]
    fn test_account_name_shapes() {
        assert_eq!(account_name(&json!({"name": "A"})), Some("A".to_string()));
        assert_eq!(account_name(&json!({"data": {"email": "b@x"}})), Some("b@x".to_string()));
        assert_eq!(
            account_name(&json!({"environment": {"id": "env1"}})),
            Some("env1".to_string())
        );
        assert_eq!(account_name(&json!({})), None);
    }
}
