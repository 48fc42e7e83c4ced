//! Answers for seeded responses.
//!
//! Which answer a question gets is policy, kept in [`ResponsePolicy`] so the
//! orchestrator never hard-codes it.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::ops::RangeInclusive;
use std::sync::Mutex;

use crate::dataset::{QuestionSpec, QuestionType, SurveySpec};
use crate::formbricks::{ResponseMeta, ResponsePayload};
use crate::generator::Generator;

const DEFAULT_RATING_RANGE: u8 = 5;

#[derive(Debug, Clone)]
pub struct ResponsePolicy {
    /// Responses per created survey. Values below 1 are treated as 1.
    pub responses_per_survey: usize,
    pub open_text_samples: Vec<String>,
    pub nps_scores: RangeInclusive<u8>,
    /// Lowest rating handed out, capped by the question's own range.
    pub rating_floor: u8,
    pub max_multi_select: usize,
    pub response_url: Option<String>,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            responses_per_survey: 1,
            open_text_samples: [
                "Overall a smooth experience, the team was quick to help.",
                "It does what I need, though setup took longer than expected.",
                "Clear and easy to use. More keyboard shortcuts would be nice.",
                "Support answered within the hour, which made a big difference.",
                "Pricing is fair for what you get.",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            nps_scores: 6..=10,
            rating_floor: 3,
            max_multi_select: 2,
            response_url: None,
        }
    }
}

impl ResponsePolicy {
    pub fn count(&self) -> usize {
        self.responses_per_survey.max(1)
    }
}

/// Where the seeder gets answers for a created survey.
#[async_trait]
pub trait ResponseSource: Send + Sync {
    async fn responses_for(&self, survey: &SurveySpec) -> anyhow::Result<Vec<ResponsePayload>>;
}

/// Type-valid random answers, no network.
pub struct LocalSynthesizer {
    policy: ResponsePolicy,
    rng: Mutex<fastrand::Rng>,
}

impl LocalSynthesizer {
    pub fn new(policy: ResponsePolicy) -> Self {
        Self {
            policy,
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Deterministic output for a given seed.
    pub fn with_seed(policy: ResponsePolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    pub fn policy(&self) -> &ResponsePolicy {
        &self.policy
    }

    pub fn synthesize(&self, survey: &SurveySpec) -> ResponsePayload {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut data = Map::new();
        for question in &survey.questions {
            let Some(id) = question.id.as_deref() else {
                continue;
            };
            if let Some(answer) = self.answer(&mut rng, question) {
                data.insert(id.to_string(), answer);
            }
        }

        ResponsePayload {
            finished: true,
            data,
            meta: ResponseMeta {
                url: self.policy.response_url.clone(),
                ..ResponseMeta::default()
            },
        }
    }

    fn answer(&self, rng: &mut fastrand::Rng, question: &QuestionSpec) -> Option<Value> {
        let labels: Vec<&str> = question
            .choices
            .iter()
            .map(|c| c.label.default.as_str())
            .collect();

        match question.question_type {
            QuestionType::OpenText => {
                let samples = &self.policy.open_text_samples;
                let text = if samples.is_empty() {
                    "This is a sample response".to_string()
                } else {
                    samples[rng.usize(..samples.len())].clone()
                };
                Some(Value::String(text))
            }
            QuestionType::MultipleChoiceSingle => {
                if labels.is_empty() {
                    return None;
                }
                Some(Value::String(labels[rng.usize(..labels.len())].to_string()))
            }
            QuestionType::MultipleChoiceMulti => {
                if labels.is_empty() {
                    return None;
                }
                let max = self.policy.max_multi_select.clamp(1, labels.len());
                let picks = rng.usize(1..=max);
                let mut indices: Vec<usize> = (0..labels.len()).collect();
                rng.shuffle(&mut indices);
                let mut chosen: Vec<usize> = indices.into_iter().take(picks).collect();
                chosen.sort_unstable();
                Some(Value::Array(
                    chosen
                        .into_iter()
                        .map(|i| Value::String(labels[i].to_string()))
                        .collect(),
                ))
            }
            QuestionType::Nps => {
                let low = (*self.policy.nps_scores.start()).min(10);
                let high = (*self.policy.nps_scores.end()).clamp(low, 10);
                Some(Value::from(rng.u8(low..=high)))
            }
            QuestionType::Rating => {
                let range = question.range.unwrap_or(DEFAULT_RATING_RANGE).max(1);
                let floor = self.policy.rating_floor.clamp(1, range);
                Some(Value::from(rng.u8(floor..=range)))
            }
        }
    }
}

#[async_trait]
impl ResponseSource for LocalSynthesizer {
    async fn responses_for(&self, survey: &SurveySpec) -> anyhow::Result<Vec<ResponsePayload>> {
        Ok((0..self.policy.count())
            .map(|_| self.synthesize(survey))
            .collect())
    }
}

/// Model-written answers, falling back to local synthesis on any failure.
pub struct LlmResponses {
    generator: Generator,
    fallback: LocalSynthesizer,
}

impl LlmResponses {
    pub fn new(generator: Generator, fallback: LocalSynthesizer) -> Self {
        Self { generator, fallback }
    }
}

#[async_trait]
impl ResponseSource for LlmResponses {
    async fn responses_for(&self, survey: &SurveySpec) -> anyhow::Result<Vec<ResponsePayload>> {
        let count = self.fallback.policy().count();
        match self.generator.generate_responses(survey, count).await {
            Ok(mut responses) => {
                for response in &mut responses {
                    if response.meta.url.is_none() {
                        response.meta.url = self.fallback.policy().response_url.clone();
                    }
                }
                Ok(responses)
            }
            Err(e) => {
                tracing::warn!(survey = %survey.name, "Falling back to local answers: {}", e);
                self.fallback.responses_for(survey).await
            }
        }
    }
}
