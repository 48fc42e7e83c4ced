//! Turns chat-completion output into a validated [`GeneratedDataset`].

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::{ChatMessage, CompletionClient};
use crate::dataset::{GeneratedDataset, QuestionType, SurveyCategory, SurveySpec, UserSpec};
use crate::error::GenerationError;
use crate::formbricks::ResponsePayload;

pub const DEFAULT_SURVEY_COUNT: usize = 5;
pub const DEFAULT_USER_COUNT: usize = 10;

const SURVEY_TEMPERATURE: f32 = 0.8;
const USER_TEMPERATURE: f32 = 0.9;
const RESPONSE_TEMPERATURE: f32 = 0.9;

const JSON_ONLY: &str = "Return only valid JSON. No prose, no Markdown.";

#[derive(Clone)]
pub struct Generator {
    client: Arc<dyn CompletionClient>,
}

impl Generator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Surveys first, then users. Fails without a partial result.
    pub async fn generate(
        &self,
        survey_count: usize,
        user_count: usize,
    ) -> Result<GeneratedDataset, GenerationError> {
        let surveys = self.generate_surveys(survey_count).await?;
        let users = self.generate_users(user_count).await?;

        Ok(GeneratedDataset {
            generated_at: Some(chrono::Utc::now()),
            surveys,
            users,
        })
    }

    pub async fn generate_surveys(&self, count: usize) -> Result<Vec<SurveySpec>, GenerationError> {
        const SECTION: &str = "surveys";
        if count == 0 {
            return Ok(Vec::new());
        }

        let messages = vec![
            ChatMessage::system(format!(
                "You are a survey design expert for an experience management platform. {}",
                JSON_ONLY
            )),
            ChatMessage::user(survey_prompt(count)),
        ];
        let content = self.ask(SECTION, messages, SURVEY_TEMPERATURE).await?;

        let mut surveys: Vec<SurveySpec> = parse_section(SECTION, &content)?;
        fit_count(SECTION, &mut surveys, count)?;

        for survey in &mut surveys {
            survey.assign_missing_ids();
            survey
                .validate()
                .map_err(|reason| GenerationError::new(SECTION, reason))?;
        }
        Ok(surveys)
    }

    pub async fn generate_users(&self, count: usize) -> Result<Vec<UserSpec>, GenerationError> {
        const SECTION: &str = "users";
        if count == 0 {
            return Ok(Vec::new());
        }

        let messages = vec![
            ChatMessage::system(format!(
                "You generate realistic business user profiles. {}",
                JSON_ONLY
            )),
            ChatMessage::user(user_prompt(count)),
        ];
        let content = self.ask(SECTION, messages, USER_TEMPERATURE).await?;

        let mut users: Vec<UserSpec> = parse_section(SECTION, &content)?;
        fit_count(SECTION, &mut users, count)?;

        for user in &users {
            user.validate()
                .map_err(|reason| GenerationError::new(SECTION, reason))?;
        }

        let check = GeneratedDataset {
            users: users.clone(),
            ..Default::default()
        };
        let duplicates = check.duplicate_emails();
        if !duplicates.is_empty() {
            return Err(GenerationError::new(
                SECTION,
                format!("duplicate emails: {}", duplicates.join(", ")),
            ));
        }
        Ok(users)
    }

    /// Model-written answers for one survey, keyed by the survey's question ids.
    pub async fn generate_responses(
        &self,
        survey: &SurveySpec,
        count: usize,
    ) -> Result<Vec<ResponsePayload>, GenerationError> {
        const SECTION: &str = "responses";
        if count == 0 {
            return Ok(Vec::new());
        }

        let messages = vec![
            ChatMessage::system(format!(
                "You are a thoughtful survey respondent. {}",
                JSON_ONLY
            )),
            ChatMessage::user(response_prompt(survey, count)),
        ];
        let content = self.ask(SECTION, messages, RESPONSE_TEMPERATURE).await?;

        let mut responses: Vec<ResponsePayload> = parse_section(SECTION, &content)?;
        fit_count(SECTION, &mut responses, count)?;

        let known: Vec<&str> = survey
            .questions
            .iter()
            .filter_map(|q| q.id.as_deref())
            .collect();
        for response in &responses {
            if let Some(unknown) = response.data.keys().find(|k| !known.contains(&k.as_str())) {
                return Err(GenerationError::new(
                    SECTION,
                    format!("answer for unknown question id '{}'", unknown),
                ));
            }
        }
        Ok(responses)
    }

    async fn ask(
        &self,
        section: &'static str,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        tracing::debug!(section, "Requesting completion");
        self.client
            .complete(messages, temperature)
            .await
            .map_err(|e| GenerationError::new(section, format!("completion failed: {}", e)))
    }
}

/// Removes a Markdown code fence around the payload, if any.
///
/// Text that already parses as JSON is returned as is, so backticks inside
/// string values are left alone.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") && serde_json::from_str::<Value>(trimmed).is_ok() {
        return trimmed;
    }
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after_fence = &trimmed[start + 3..];
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match after_fence.find('\n') {
        Some(newline)
            if !after_fence[..newline]
                .trim_start()
                .starts_with(|c: char| c == '[' || c == '{') =>
        {
            &after_fence[newline + 1..]
        }
        _ => after_fence,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parses `content` as a JSON array of `T`.
///
/// An object wrapping the array under the section name (`{"users": [..]}`)
/// is accepted. Each item is checked on its own so errors name the position.
pub fn parse_section<T: DeserializeOwned>(
    section: &'static str,
    content: &str,
) -> Result<Vec<T>, GenerationError> {
    let body = strip_code_fence(content);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| GenerationError::new(section, format!("not valid JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(section) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(GenerationError::new(
                    section,
                    format!("expected a JSON array or an object with a '{}' array", section),
                ))
            }
        },
        other => {
            return Err(GenerationError::new(
                section,
                format!("expected a JSON array, got {}", type_name(&other)),
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item)
                .map_err(|e| GenerationError::new(section, format!("item {}: {}", index + 1, e)))
        })
        .collect()
}

fn fit_count<T>(section: &'static str, items: &mut Vec<T>, requested: usize) -> Result<(), GenerationError> {
    if items.is_empty() {
        return Err(GenerationError::new(section, "model returned an empty list"));
    }
    if items.len() > requested {
        tracing::warn!(section, got = items.len(), requested, "Dropping surplus items");
        items.truncate(requested);
    } else if items.len() < requested {
        tracing::warn!(section, got = items.len(), requested, "Model returned fewer items than requested");
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn enum_names<T: serde::Serialize>(values: &[T]) -> String {
    values
        .iter()
        .filter_map(|v| serde_json::to_value(v).ok())
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect::<Vec<_>>()
        .join(", ")
}

fn survey_prompt(count: usize) -> String {
    let example = json!([{
        "name": "Survey Name",
        "category": "customerSatisfaction",
        "type": "link",
        "status": "inProgress",
        "displayOption": "displayOnce",
        "questions": [
            {
                "id": "q1",
                "type": "openText",
                "headline": {"default": "Question text?"},
                "placeholder": {"default": "Type your answer..."},
                "inputType": "text",
                "required": true
            },
            {
                "id": "q2",
                "type": "multipleChoiceSingle",
                "headline": {"default": "Question text?"},
                "required": true,
                "shuffleOption": "none",
                "choices": [
                    {"id": "choice-1", "label": {"default": "Option 1"}},
                    {"id": "choice-2", "label": {"default": "Option 2"}}
                ]
            },
            {
                "id": "q3",
                "type": "nps",
                "headline": {"default": "How likely are you to recommend us?"},
                "lowerLabel": {"default": "Not likely"},
                "upperLabel": {"default": "Very likely"},
                "required": true
            },
            {
                "id": "q4",
                "type": "rating",
                "headline": {"default": "Rate your experience"},
                "scale": "star",
                "range": 5,
                "required": true
            }
        ],
        "welcomeCard": {
            "enabled": true,
            "headline": {"default": "Welcome!"},
            "html": {"default": "<p>Welcome message</p>"},
            "showResponseCount": false,
            "timeToFinish": false
        },
        "endings": [{
            "type": "endScreen",
            "headline": {"default": "Thank you!"},
            "subheader": {"default": "Thank you message"},
            "buttonLabel": {"default": "Close"},
            "buttonLink": ""
        }],
        "hiddenFields": {"enabled": false, "fieldIds": []},
        "singleUse": {"enabled": false, "isEncrypted": true},
        "isVerifyEmailEnabled": false
    }]);

    format!(
        "Generate {count} realistic, diverse surveys for an experience management platform.\n\n\
         Each survey needs a clear name and purpose, a category (one of: {categories}), \
         3 to 5 questions mixing these types: {types}, a welcome card and a thank-you ending.\n\
         Choice questions need 2 to 5 choices. Rating questions use a range of 3, 4, 5, 7 or 10.\n\n\
         Return ONLY a JSON array of {count} objects shaped like this:\n{example}",
        count = count,
        categories = enum_names(&SurveyCategory::ALL),
        types = enum_names(&QuestionType::ALL),
        example = serde_json::to_string_pretty(&example).unwrap_or_default(),
    )
}

fn user_prompt(count: usize) -> String {
    format!(
        "Generate {count} realistic user profiles for a business software platform.\n\n\
         Each user has a full name, a unique professional email address and a role, \
         either \"manager\" or \"owner\" (spread roughly evenly).\n\n\
         Return ONLY a JSON array of {count} objects:\n\
         [{{\"name\": \"John Smith\", \"email\": \"john.smith@company.com\", \"role\": \"manager\"}}]",
        count = count
    )
}

fn response_prompt(survey: &SurveySpec, count: usize) -> String {
    let questions: Vec<Value> = survey
        .questions
        .iter()
        .map(|q| {
            let mut context = json!({
                "id": q.id,
                "type": q.question_type,
                "headline": q.headline.default,
            });
            if q.question_type.is_choice() {
                context["choices"] = json!(q
                    .choices
                    .iter()
                    .map(|c| c.label.default.clone())
                    .collect::<Vec<_>>());
            }
            if q.question_type == QuestionType::Rating {
                context["range"] = json!(q.range.unwrap_or(5));
            }
            context
        })
        .collect();

    format!(
        "Generate {count} realistic response(s) to the survey \"{name}\".\n\n\
         Questions:\n{questions}\n\n\
         Answer formats: openText → string, multipleChoiceSingle → one choice label, \
         multipleChoiceMulti → array of choice labels, nps → integer 0-10, \
         rating → integer from 1 to the range.\n\n\
         Return ONLY a JSON array of {count} objects:\n\
         [{{\"finished\": true, \"data\": {{\"<question id>\": <answer>}}}}]\n\
         Use exactly the question ids given above.",
        count = count,
        name = survey.name,
        questions = serde_json::to_string_pretty(&questions).unwrap_or_default(),
    )
}
