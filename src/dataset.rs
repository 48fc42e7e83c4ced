//! The generated dataset and its on-disk JSON form.
//!
//! Only the fields the tool reasons about are typed. Everything else the
//! platform understands (welcome cards, endings, hidden fields, ...) rides
//! along in `extra` so a hand-edited file reaches the API unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::Path;

use crate::error::DatasetError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub surveys: Vec<SurveySpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
}

impl GeneratedDataset {
    pub fn is_empty(&self) -> bool {
        self.surveys.is_empty() && self.users.is_empty()
    }

    /// Emails that appear more than once, compared case-insensitively.
    pub fn duplicate_emails(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for user in &self.users {
            let email = user.email.trim().to_lowercase();
            if !seen.insert(email.clone()) && !duplicates.contains(&email) {
                duplicates.push(email);
            }
        }
        duplicates
    }
}

/// How the platform distributes a survey.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurveyType {
    #[default]
    Link,
    App,
}

/// What a survey is about. Local metadata only, never sent to the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurveyCategory {
    CustomerSatisfaction,
    Nps,
    ProductFeedback,
    EmployeeOnboarding,
    EventFeedback,
    #[default]
    Other,
}

impl SurveyCategory {
    pub const ALL: [SurveyCategory; 6] = [
        SurveyCategory::CustomerSatisfaction,
        SurveyCategory::Nps,
        SurveyCategory::ProductFeedback,
        SurveyCategory::EmployeeOnboarding,
        SurveyCategory::EventFeedback,
        SurveyCategory::Other,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurveyStatus {
    Draft,
    Scheduled,
    #[default]
    InProgress,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveySpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub survey_type: SurveyType,
    #[serde(default)]
    pub category: SurveyCategory,
    #[serde(default)]
    pub status: SurveyStatus,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SurveySpec {
    pub fn new(name: impl Into<String>, questions: Vec<QuestionSpec>) -> Self {
        Self {
            name: name.into(),
            survey_type: SurveyType::default(),
            category: SurveyCategory::default(),
            status: SurveyStatus::default(),
            questions,
            extra: Map::new(),
        }
    }

    /// Fills blank question ids with `q1`, `q2`, ... and blank choice ids
    /// with `choice-1`, ..., never reusing an id already present.
    pub fn assign_missing_ids(&mut self) {
        let mut taken: HashSet<String> = self
            .questions
            .iter()
            .filter_map(|q| q.id.clone())
            .filter(|id| !id.trim().is_empty())
            .collect();
        let mut next = 1;

        for question in &mut self.questions {
            if question.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                let id = loop {
                    let candidate = format!("q{}", next);
                    next += 1;
                    if taken.insert(candidate.clone()) {
                        break candidate;
                    }
                };
                question.id = Some(id);
            }

            for (index, choice) in question.choices.iter_mut().enumerate() {
                if choice.id.trim().is_empty() {
                    choice.id = format!("choice-{}", index + 1);
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("survey without a name".to_string());
        }
        if self.questions.is_empty() {
            return Err(format!("survey '{}' has no questions", self.name));
        }
        for (index, question) in self.questions.iter().enumerate() {
            question
                .validate()
                .map_err(|reason| format!("survey '{}' question {}: {}", self.name, index + 1, reason))?;
        }
        Ok(())
    }
}

/// The fixed set of question types the tool can generate and answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    OpenText,
    MultipleChoiceSingle,
    MultipleChoiceMulti,
    Nps,
    Rating,
}

impl QuestionType {
    pub const ALL: [QuestionType; 5] = [
        QuestionType::OpenText,
        QuestionType::MultipleChoiceSingle,
        QuestionType::MultipleChoiceMulti,
        QuestionType::Nps,
        QuestionType::Rating,
    ];

    pub fn is_choice(self) -> bool {
        matches!(
            self,
            QuestionType::MultipleChoiceSingle | QuestionType::MultipleChoiceMulti
        )
    }
}

/// Text keyed by language, `default` always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub default: String,
    #[serde(flatten)]
    pub translations: BTreeMap<String, String>,
}

impl LocalizedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            default: text.into(),
            translations: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub id: String,
    pub label: LocalizedText,
}

impl Choice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: LocalizedText::new(label),
        }
    }
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub headline: LocalizedText,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    /// Upper bound of a rating scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<u8>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuestionSpec {
    pub fn new(question_type: QuestionType, headline: impl Into<String>) -> Self {
        Self {
            id: None,
            question_type,
            headline: LocalizedText::new(headline),
            required: true,
            choices: Vec::new(),
            range: None,
            extra: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_choices(mut self, labels: &[&str]) -> Self {
        self.choices = labels
            .iter()
            .enumerate()
            .map(|(i, label)| Choice::new(format!("choice-{}", i + 1), *label))
            .collect();
        self
    }

    pub fn with_range(mut self, range: u8) -> Self {
        self.range = Some(range);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.headline.default.trim().is_empty() {
            return Err("empty headline".to_string());
        }
        if self.question_type.is_choice() && self.choices.is_empty() {
            return Err("choice question without choices".to_string());
        }
        if let Some(range) = self.range {
            if !(1..=10).contains(&range) {
                return Err(format!("rating range {} outside 1..=10", range));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Manager,
    Owner,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Manager => write!(f, "manager"),
            UserRole::Owner => write!(f, "owner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl UserSpec {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("user without a name".to_string());
        }
        match self.email.trim().split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(format!("invalid email '{}' for {}", self.email, self.name)),
        }
    }
}

/// Reads a dataset written by [`save`] (or edited by hand).
pub fn load(path: &Path) -> Result<GeneratedDataset, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the dataset next to `path` and renames it into place, so readers
/// never observe a half-written file. Overwrites any previous dataset.
pub fn save(path: &Path, dataset: &GeneratedDataset) -> Result<(), DatasetError> {
    let io_err = |source: std::io::Error| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    serde_json::to_writer_pretty(&mut tmp, dataset).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    tracing::debug!("Dataset written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> GeneratedDataset {
        let mut survey = SurveySpec::new(
            "Checkout Experience",
            vec![
                QuestionSpec::new(QuestionType::Rating, "How easy was checkout?").with_range(5),
                QuestionSpec::new(QuestionType::MultipleChoiceSingle, "How did you pay?")
                    .with_choices(&["Card", "PayPal"]),
                QuestionSpec::new(QuestionType::OpenText, "Anything else?"),
            ],
        );
        survey.category = SurveyCategory::CustomerSatisfaction;
        survey
            .extra
            .insert("welcomeCard".to_string(), json!({"enabled": true}));

        GeneratedDataset {
            generated_at: None,
            surveys: vec![survey],
            users: vec![
                UserSpec::new("Ada Park", "ada@acme.io", UserRole::Owner),
                UserSpec::new("Ben Ito", "ben@acme.io", UserRole::Manager),
            ],
        }
    }

    #[test]
    fn test_save_then_load_is_lossless() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("generated_data.json");
        let dataset = sample();

        save(&path, &dataset).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, dataset);
        assert_eq!(loaded.surveys.len(), 1);
        assert_eq!(loaded.users.len(), 2);
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("generated_data.json");

        save(&path, &sample()).unwrap();
        save(&path, &GeneratedDataset::default()).unwrap();

        assert!(load(&path).unwrap().is_empty());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_unknown_platform_fields_round_trip() {
        let raw = json!({
            "surveys": [{
                "name": "Onboarding",
                "type": "link",
                "status": "inProgress",
                "displayOption": "displayOnce",
                "endings": [{"type": "endScreen", "headline": {"default": "Thanks"}}],
                "questions": [{
                    "type": "nps",
                    "headline": {"default": "Recommend us?", "de": "Empfehlen?"},
                    "lowerLabel": {"default": "Not likely"},
                    "required": true
                }]
            }],
            "users": []
        });

        let dataset: GeneratedDataset = serde_json::from_value(raw.clone()).unwrap();
        let survey = &dataset.surveys[0];
        assert_eq!(survey.extra["displayOption"], json!("displayOnce"));
        assert_eq!(survey.questions[0].extra["lowerLabel"], json!({"default": "Not likely"}));
        assert_eq!(survey.questions[0].headline.translations["de"], "Empfehlen?");

        let back = serde_json::to_value(&dataset).unwrap();
        assert_eq!(back["surveys"][0]["endings"], raw["surveys"][0]["endings"]);
        assert_eq!(back["surveys"][0]["questions"][0]["headline"], raw["surveys"][0]["questions"][0]["headline"]);
    }

    #[test]
    fn test_unknown_question_type_is_rejected() {
        let raw = json!({
            "type": "matrix",
            "headline": {"default": "?"}
        });
        assert!(serde_json::from_value::<QuestionSpec>(raw).is_err());
    }

    #[test]
    fn test_assign_missing_ids_skips_taken() {
        let mut survey = SurveySpec::new(
            "S",
            vec![
                QuestionSpec::new(QuestionType::OpenText, "a"),
                QuestionSpec::new(QuestionType::OpenText, "b").with_id("q1"),
                QuestionSpec::new(QuestionType::MultipleChoiceMulti, "c").with_choices(&["x", "y"]),
            ],
        );
        survey.questions[2].choices[1].id.clear();

        survey.assign_missing_ids();

        let ids: Vec<_> = survey.questions.iter().map(|q| q.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["q2", "q1", "q3"]);
        assert_eq!(survey.questions[2].choices[1].id, "choice-2");
    }

    #[test]
    fn test_validation() {
        assert!(sample().surveys[0].validate().is_ok());
        assert!(SurveySpec::new("Empty", vec![]).validate().is_err());

        let no_choices = QuestionSpec::new(QuestionType::MultipleChoiceSingle, "Pick");
        assert!(no_choices.validate().is_err());

        assert!(UserSpec::new("X", "not-an-email", UserRole::Owner).validate().is_err());
        assert!(UserSpec::new("", "x@y.z", UserRole::Owner).validate().is_err());
    }

    #[test]
    fn test_duplicate_emails_case_insensitive() {
        let mut dataset = sample();
        dataset
            .users
            .push(UserSpec::new("Ada Again", "ADA@acme.io", UserRole::Manager));
        assert_eq!(dataset.duplicate_emails(), vec!["ada@acme.io".to_string()]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }
}
