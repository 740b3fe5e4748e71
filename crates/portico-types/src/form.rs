//! Client-facing forms and their submissions
//!
//! A submission keeps the raw `responses` map exactly as posted plus a
//! `detailed_responses` snapshot of every field, so later edits to the form do
//! not change what a past submission means.

use crate::{AccountId, ClientId, FormId, FormSubmissionId, PortalId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl std::str::FromStr for FormStatus {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "draft" => Ok(FormStatus::Draft),
            "published" => Ok(FormStatus::Published),
            "archived" => Ok(FormStatus::Archived),
            other => Err(crate::ParseEnumError::new("form status", other)),
        }
    }
}

/// One question of a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    /// Input widget: text, textarea, select, checkbox, date...
    #[serde(rename = "type")]
    pub field_type: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub account_id: AccountId,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    pub portal_id: Option<PortalId>,
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub fields: Vec<FormField>,
    #[serde(default)]
    pub status: FormStatus,
    pub max_submissions: Option<u32>,
    pub submission_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_submissions: u32,
    pub last_submission_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a form refused a submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("form is not accepting responses")]
    NotPublished,

    #[error("submission deadline has passed")]
    DeadlinePassed,

    #[error("form has reached its submission limit")]
    LimitReached,

    #[error("responses are required")]
    EmptyResponses,

    #[error("required field missing: {0}")]
    MissingRequired(String),
}

impl Form {
    pub fn new(account_id: AccountId, title: impl Into<String>, fields: Vec<FormField>) -> Self {
        let now = Utc::now();
        Self {
            id: FormId::generate(),
            account_id,
            client_id: None,
            project_id: None,
            portal_id: None,
            title: title.into(),
            description: None,
            instructions: None,
            fields,
            status: FormStatus::Draft,
            max_submissions: None,
            submission_deadline: None,
            total_submissions: 0,
            last_submission_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: FormStatus, now: DateTime<Utc>) {
        if status == FormStatus::Published && self.published_at.is_none() {
            self.published_at = Some(now);
        }
        self.status = status;
        self.updated_at = now;
    }

    /// Whether the form takes a new response at `now`
    pub fn check_open(&self, now: DateTime<Utc>) -> Result<(), SubmissionError> {
        if self.status != FormStatus::Published {
            return Err(SubmissionError::NotPublished);
        }
        if matches!(self.submission_deadline, Some(deadline) if deadline < now) {
            return Err(SubmissionError::DeadlinePassed);
        }
        if matches!(self.max_submissions, Some(max) if self.total_submissions >= max) {
            return Err(SubmissionError::LimitReached);
        }
        Ok(())
    }
}

/// A field together with the answer it received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedResponse {
    pub field_id: String,
    pub field_type: String,
    pub field_label: String,
    pub field_required: bool,
    pub response_value: Option<Value>,
    pub response_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: FormSubmissionId,
    pub form_id: FormId,
    pub account_id: AccountId,
    /// 1-based position among the form's submissions, assigned by storage
    #[serde(default)]
    pub submission_number: u32,
    pub respondent_name: Option<String>,
    pub respondent_email: Option<String>,
    pub form_title: String,
    pub responses: Map<String, Value>,
    pub detailed_responses: Vec<DetailedResponse>,
    pub total_fields: usize,
    pub completed_fields: usize,
    pub completion_percentage: f64,
    pub created_at: DateTime<Utc>,
}

fn is_answered(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn response_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(response_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

impl FormSubmission {
    /// Validate `responses` against the form's fields and snapshot them.
    ///
    /// Only answers to fields of the form count as completed; extra keys are
    /// kept in `responses` but ignored for the statistics.
    pub fn build(
        form: &Form,
        responses: Map<String, Value>,
        respondent_name: Option<String>,
        respondent_email: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, SubmissionError> {
        if responses.is_empty() {
            return Err(SubmissionError::EmptyResponses);
        }

        let mut detailed = Vec::with_capacity(form.fields.len());
        let mut completed = 0;
        for field in &form.fields {
            let answer = responses.get(&field.id).filter(|v| is_answered(v));
            if answer.is_some() {
                completed += 1;
            } else if field.required {
                return Err(SubmissionError::MissingRequired(field.label.clone()));
            }
            detailed.push(DetailedResponse {
                field_id: field.id.clone(),
                field_type: field.field_type.clone(),
                field_label: field.label.clone(),
                field_required: field.required,
                response_value: answer.cloned(),
                response_text: answer.map(response_text),
            });
        }

        let total = form.fields.len();
        let percentage = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(Self {
            id: FormSubmissionId::generate(),
            form_id: form.id,
            account_id: form.account_id,
            submission_number: 0,
            respondent_name: respondent_name.filter(|n| !n.trim().is_empty()),
            respondent_email: respondent_email
                .map(|e| crate::normalize_email(&e))
                .filter(|e| !e.is_empty()),
            form_title: form.title.clone(),
            responses,
            detailed_responses: detailed,
            total_fields: total,
            completed_fields: completed,
            completion_percentage: percentage,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(id: &str, required: bool) -> FormField {
        FormField {
            id: id.to_string(),
            field_type: "text".to_string(),
            label: id.to_uppercase(),
            description: None,
            required,
            options: None,
        }
    }

    fn published(fields: Vec<FormField>) -> Form {
        let mut form = Form::new(AccountId::generate(), "Onboarding", fields);
        form.set_status(FormStatus::Published, Utc::now());
        form
    }

    fn responses(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_completion_counts_answered_fields_only() {
        let form = published(vec![field("name", true), field("budget", false), field("notes", false)]);
        let submission = FormSubmission::build(
            &form,
            responses(json!({"name": "Ada", "budget": "", "stray": "x"})),
            Some("Ada".to_string()),
            Some(" Ada@Example.com ".to_string()),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(submission.total_fields, 3);
        assert_eq!(submission.completed_fields, 1);
        assert!((submission.completion_percentage - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(submission.respondent_email.as_deref(), Some("ada@example.com"));
        assert_eq!(submission.detailed_responses[1].response_value, None);
        assert!(submission.responses.contains_key("stray"));
    }

    #[test]
    fn test_list_answers_render_as_text() {
        let form = published(vec![field("tags", false)]);
        let submission = FormSubmission::build(
            &form,
            responses(json!({"tags": ["logo", "web"]})),
            None,
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            submission.detailed_responses[0].response_text.as_deref(),
            Some("logo, web")
        );
        assert_eq!(submission.completion_percentage, 100.0);
    }

    #[test]
    fn test_submission_rejections() {
        let form = published(vec![field("name", true)]);
        assert_eq!(
            FormSubmission::build(&form, Map::new(), None, None, Utc::now()),
            Err(SubmissionError::EmptyResponses)
        );
        assert_eq!(
            FormSubmission::build(&form, responses(json!({"name": "  "})), None, None, Utc::now()),
            Err(SubmissionError::MissingRequired("NAME".to_string()))
        );
    }

    #[test]
    fn test_check_open() {
        let now = Utc::now();
        let mut form = Form::new(AccountId::generate(), "Brief", vec![]);
        assert_eq!(form.check_open(now), Err(SubmissionError::NotPublished));

        form.set_status(FormStatus::Published, now);
        assert!(form.published_at.is_some());
        assert!(form.check_open(now).is_ok());

        form.submission_deadline = Some(now - chrono::Duration::hours(1));
        assert_eq!(form.check_open(now), Err(SubmissionError::DeadlinePassed));

        form.submission_deadline = None;
        form.max_submissions = Some(2);
        form.total_submissions = 2;
        assert_eq!(form.check_open(now), Err(SubmissionError::LimitReached));
    }
}
