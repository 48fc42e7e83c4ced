//! Thin client for the Formbricks Management and Client APIs.

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::config::{SettingKey, Settings};
use crate::dataset::{SurveySpec, UserSpec};
use crate::error::{ApiError, ConfigError};
use crate::lifecycle::HEALTH_PATH;

pub const RESPONSE_SOURCE: &str = "Automated Seeding";

/// Body of a Client API response submission, minus the survey id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(default = "finished_default")]
    pub finished: bool,
    pub data: Map<String, Value>,
    #[serde(default)]
    pub meta: ResponseMeta,
}

fn finished_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            source: Some(RESPONSE_SOURCE.to_string()),
            url: None,
        }
    }
}

/// Operations the seeder needs from the platform. One HTTP call each.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn health_check(&self) -> bool;

    /// Returns the account behind the API key.
    async fn verify_auth(&self) -> Result<Value, ApiError>;

    async fn create_user(&self, user: &UserSpec) -> Result<String, ApiError>;

    async fn create_survey(&self, survey: &SurveySpec) -> Result<String, ApiError>;

    async fn submit_response(
        &self,
        survey_id: &str,
        response: &ResponsePayload,
    ) -> Result<String, ApiError>;
}

#[derive(Debug, Clone)]
pub struct FormbricksClient {
    client: Client,
    base_url: String,
    api_key: String,
    organization_id: String,
    environment_id: String,
}

impl FormbricksClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        organization_id: &str,
        environment_id: &str,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("formbricks-seeder/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            organization_id: organization_id.to_string(),
            environment_id: environment_id.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let missing: Vec<&'static str> = SettingKey::SEED
            .iter()
            .filter(|key| settings.value(**key).is_none())
            .map(|key| key.env_var())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing).into());
        }

        Ok(Self::new(
            &settings.formbricks_url,
            &settings.require(SettingKey::FormbricksApiKey)?,
            &settings.require(SettingKey::OrganizationId)?,
            &settings.require(SettingKey::EnvironmentId)?,
        )?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        tracing::debug!(method = method.as_str(), path, "Formbricks request");

        let mut builder = self
            .client
            .request(method, self.url(path))
            .header("x-api-key", &self.api_key);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        read_body(response).await
    }

    async fn create(&self, path: &str, body: &Value) -> Result<String, ApiError> {
        let value = self.request(Method::POST, path, Some(body)).await?;
        extract_id(&value).ok_or_else(|| ApiError::MissingId(value.to_string()))
    }

    /// Survey body as the Management API expects it: local-only fields
    /// removed, target environment set.
    pub fn survey_body(&self, survey: &SurveySpec) -> Value {
        let mut body = serde_json::to_value(survey).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut body {
            map.remove("category");
            map.insert(
                "environmentId".to_string(),
                Value::String(self.environment_id.clone()),
            );
        }
        body
    }
}

/// 2xx → parsed JSON (empty object for an empty body); anything else →
/// `ApiError::Status` with the body untouched.
async fn read_body(response: Response) -> Result<Value, ApiError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// The platform wraps most results in `{"data": {...}}`.
fn extract_id(value: &Value) -> Option<String> {
    value
        .get("data")
        .and_then(|data| data.get("id"))
        .or_else(|| value.get("id"))
        .and_then(|id| match id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[async_trait]
impl PlatformApi for FormbricksClient {
    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.url(HEALTH_PATH))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!("Health check failed: {}", e);
                false
            }
        }
    }

    async fn verify_auth(&self) -> Result<Value, ApiError> {
        self.request(Method::GET, "/api/v1/me", None).await
    }

    async fn create_user(&self, user: &UserSpec) -> Result<String, ApiError> {
        let path = format!(
            "/api/v2/{}/users",
            urlencoding::encode(&self.organization_id)
        );
        let body = json!({
            "name": user.name,
            "email": user.email,
            "role": user.role,
            "isActive": true,
        });
        self.create(&path, &body).await
    }

    async fn create_survey(&self, survey: &SurveySpec) -> Result<String, ApiError> {
        let body = self.survey_body(survey);
        self.create("/api/v1/management/surveys", &body).await
    }

    async fn submit_response(
        &self,
        survey_id: &str,
        response: &ResponsePayload,
    ) -> Result<String, ApiError> {
        let path = format!(
            "/api/v1/client/{}/responses",
            urlencoding::encode(&self.environment_id)
        );
        let mut body = serde_json::to_value(response).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut body {
            map.insert("surveyId".to_string(), Value::String(survey_id.to_string()));
        }
        self.create(&path, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{QuestionSpec, QuestionType, SurveyCategory};

    #[test]
    fn test_extract_id_shapes() {
        assert_eq!(extract_id(&json!({"data": {"id": "s1"}})), Some("s1".to_string()));
        assert_eq!(extract_id(&json!({"id": "u1"})), Some("u1".to_string()));
        assert_eq!(extract_id(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(extract_id(&json!({"data": {}})), None);
        assert_eq!(extract_id(&json!({"id": ""})), None);
    }

    #[test]
    fn test_survey_body_strips_category_and_sets_environment() {
        let client = FormbricksClient::new("http://localhost:3000/", "k", "org", "env-9").unwrap();
        let mut survey = SurveySpec::new(
            "Pulse",
            vec![QuestionSpec::new(QuestionType::OpenText, "Thoughts?").with_id("q1")],
        );
        survey.category = SurveyCategory::EventFeedback;

        let body = client.survey_body(&survey);

        assert_eq!(client.base_url(), "http://localhost:3000");
        assert!(body.get("category").is_none());
        assert_eq!(body["environmentId"], json!("env-9"));
        assert_eq!(body["type"], json!("link"));
        assert_eq!(body["status"], json!("inProgress"));
        assert_eq!(body["questions"][0]["id"], json!("q1"));
    }

    #[test]
    fn test_response_payload_defaults() {
        let payload: ResponsePayload = serde_json::from_value(json!({"data": {"q1": "hi"}})).unwrap();
        assert!(payload.finished);
        assert_eq!(payload.meta.source.as_deref(), Some(RESPONSE_SOURCE));
    }
}
