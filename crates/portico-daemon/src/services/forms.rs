//! Forms: agency authoring, public and portal submissions

use super::{require_owned_client, require_owned_project, AgencyUser, PortalIdentity};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use portico_types::{
    normalize_email, AccountId, Activity, ActivitySource, ClientId, Form, FormField, FormId,
    FormStatus, FormSubmission, ProjectId, SubmissionError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

impl From<SubmissionError> for ServiceError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::EmptyResponses | SubmissionError::MissingRequired(_) => {
                ServiceError::BadRequest(err.to_string())
            }
            SubmissionError::NotPublished
            | SubmissionError::DeadlinePassed
            | SubmissionError::LimitReached => ServiceError::Conflict(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewForm {
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub fields: Vec<FormField>,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    pub max_submissions: Option<u32>,
    pub submission_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubmissionRequest {
    pub responses: Map<String, Value>,
    pub respondent_name: Option<String>,
    pub respondent_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionCheck {
    pub submitted: bool,
    pub total_submissions: u32,
}

fn not_found() -> ServiceError {
    ServiceError::NotFound("Form not found".to_string())
}

#[derive(Clone)]
pub struct FormService {
    storage: Arc<dyn Storage>,
}

impl FormService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn create(&self, user: &AgencyUser, new: NewForm) -> ServiceResult<Form> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(ServiceError::BadRequest("Form title is required".to_string()));
        }
        let mut seen = HashSet::new();
        for field in &new.fields {
            if field.id.trim().is_empty() || field.label.trim().is_empty() {
                return Err(ServiceError::Validation(
                    "Every field needs an id and a label".to_string(),
                ));
            }
            if !seen.insert(field.id.as_str()) {
                return Err(ServiceError::Validation(format!(
                    "Duplicate field id: {}",
                    field.id
                )));
            }
        }
        if new.max_submissions == Some(0) {
            return Err(ServiceError::Validation(
                "Submission limit must be at least 1".to_string(),
            ));
        }
        if let Some(client_id) = &new.client_id {
            require_owned_client(self.storage.as_ref(), &user.account_id, client_id).await?;
        }
        if let Some(project_id) = &new.project_id {
            require_owned_project(self.storage.as_ref(), &user.account_id, project_id).await?;
        }

        let mut form = Form::new(user.account_id, title, new.fields);
        form.description = new.description.filter(|d| !d.trim().is_empty());
        form.instructions = new.instructions.filter(|i| !i.trim().is_empty());
        form.client_id = new.client_id;
        form.project_id = new.project_id;
        form.max_submissions = new.max_submissions;
        form.submission_deadline = new.submission_deadline;
        self.storage.upsert_form(form.clone()).await?;

        tracing::info!(form_id = %form.id, fields = form.fields.len(), "Form created");
        Ok(form)
    }

    pub async fn get(&self, account_id: &AccountId, id: &FormId) -> ServiceResult<Form> {
        self.storage
            .get_form(id)
            .await?
            .filter(|f| f.account_id == *account_id)
            .ok_or_else(not_found)
    }

    pub async fn list(&self, account_id: &AccountId) -> ServiceResult<Vec<Form>> {
        Ok(self.storage.list_forms(account_id).await?)
    }

    /// Open or close a form for responses
    pub async fn set_status(
        &self,
        user: &AgencyUser,
        id: &FormId,
        status: &str,
    ) -> ServiceResult<Form> {
        let status = match status.trim() {
            "" => return Err(ServiceError::BadRequest("Status is required".to_string())),
            "draft" => FormStatus::Draft,
            "published" => FormStatus::Published,
            _ => {
                return Err(ServiceError::BadRequest(
                    "Status must be either \"draft\" or \"published\"".to_string(),
                ))
            }
        };
        let mut form = self.get(&user.account_id, id).await?;
        let previous = form.status;
        form.set_status(status, Utc::now());
        self.storage.upsert_form(form.clone()).await?;

        tracing::info!(form_id = %form.id, from = ?previous, to = ?form.status, "Form status changed");
        Ok(form)
    }

    /// Record a response from the public form link
    pub async fn submit(&self, id: &FormId, request: SubmissionRequest) -> ServiceResult<FormSubmission> {
        let form = self.storage.get_form(id).await?.ok_or_else(not_found)?;
        self.record(form, request).await
    }

    /// Record a response from a portal client; the respondent is the session holder
    pub async fn submit_from_portal(
        &self,
        identity: &PortalIdentity,
        id: &FormId,
        responses: Map<String, Value>,
    ) -> ServiceResult<FormSubmission> {
        let form = self.visible_to(identity, id).await?;
        self.record(
            form,
            SubmissionRequest {
                responses,
                respondent_name: Some(identity.display_name().to_string()),
                respondent_email: Some(identity.email.clone()),
            },
        )
        .await
    }

    /// Published forms addressed to the portal's client or to the whole account
    pub async fn list_for_client(&self, identity: &PortalIdentity) -> ServiceResult<Vec<Form>> {
        let client_id = identity.require_client()?;
        let forms = self.storage.list_forms(&identity.account_id).await?;
        Ok(forms
            .into_iter()
            .filter(|f| f.status == FormStatus::Published)
            .filter(|f| f.client_id.is_none() || f.client_id == Some(client_id))
            .collect())
    }

    async fn visible_to(&self, identity: &PortalIdentity, id: &FormId) -> ServiceResult<Form> {
        let client_id = identity.require_client()?;
        self.storage
            .get_form(id)
            .await?
            .filter(|f| f.account_id == identity.account_id)
            .filter(|f| f.client_id.is_none() || f.client_id == Some(client_id))
            .ok_or_else(not_found)
    }

    async fn record(&self, form: Form, request: SubmissionRequest) -> ServiceResult<FormSubmission> {
        let now = Utc::now();
        form.check_open(now)?;
        let submission = FormSubmission::build(
            &form,
            request.responses,
            request.respondent_name,
            request.respondent_email,
            now,
        )?;

        let submission = self
            .storage
            .record_form_submission(submission, form.max_submissions)
            .await?
            .ok_or_else(|| ServiceError::from(SubmissionError::LimitReached))?;

        if let Some(project_id) = form.project_id {
            let source = ActivitySource::Form;
            let mut activity = Activity::new(
                form.account_id,
                Some(project_id),
                source.activity_type(),
                "form_submitted",
                submission
                    .respondent_name
                    .clone()
                    .unwrap_or_else(|| "Client".to_string()),
            );
            activity.metadata = json!({
                "form_id": form.id,
                "submission_id": submission.id,
                "submission_number": submission.submission_number,
                "activity_source": source.as_str(),
            });
            self.storage.insert_activity(activity).await?;
            self.storage.touch_project(&project_id, now).await?;
        }

        tracing::info!(
            form_id = %form.id,
            submission_number = submission.submission_number,
            completion = submission.completion_percentage,
            "Form submitted"
        );
        Ok(submission)
    }

    pub async fn list_submissions(
        &self,
        account_id: &AccountId,
        id: &FormId,
        email: Option<&str>,
    ) -> ServiceResult<Vec<FormSubmission>> {
        let form = self.get(account_id, id).await?;
        let mut submissions = self.storage.list_form_submissions(&form.id).await?;
        if let Some(email) = email.map(normalize_email).filter(|e| !e.is_empty()) {
            submissions.retain(|s| s.respondent_email.as_deref() == Some(email.as_str()));
        }
        Ok(submissions)
    }

    /// Whether the portal client already answered this form
    pub async fn check_submitted(
        &self,
        identity: &PortalIdentity,
        id: &FormId,
    ) -> ServiceResult<SubmissionCheck> {
        let form = self.visible_to(identity, id).await?;
        let email = normalize_email(&identity.email);
        let submitted = self
            .storage
            .list_form_submissions(&form.id)
            .await?
            .iter()
            .any(|s| s.respondent_email.as_deref() == Some(email.as_str()));
        Ok(SubmissionCheck {
            submitted,
            total_submissions: form.total_submissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use portico_types::{Project, UserId};

    struct Fixture {
        service: FormService,
        storage: Arc<dyn Storage>,
        user: AgencyUser,
        client: PortalIdentity,
    }

    fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let account_id = AccountId::generate();
        Fixture {
            service: FormService::new(storage.clone()),
            storage,
            user: AgencyUser {
                account_id,
                user_id: UserId::generate(),
                user_name: "Jane Doe".to_string(),
            },
            client: PortalIdentity {
                email: "ada@example.com".to_string(),
                name: Some("Ada".to_string()),
                role: None,
                account_id,
                client_id: Some(ClientId::generate()),
                company_slug: "acme".to_string(),
                client_slug: "ada".to_string(),
            },
        }
    }

    fn fields() -> Vec<FormField> {
        serde_json::from_value(json!([
            {"id": "goal", "type": "textarea", "label": "Project goal", "required": true},
            {"id": "budget", "type": "select", "label": "Budget", "options": ["<5k", "5k+"]},
        ]))
        .unwrap()
    }

    fn answers(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn published(f: &Fixture, new: NewForm) -> Form {
        let form = f.service.create(&f.user, new).await.unwrap();
        f.service
            .set_status(&f.user, &form.id, "published")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_validates_fields() {
        let f = fixture();
        let err = f.service.create(&f.user, NewForm::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let mut duplicated = fields();
        duplicated.push(duplicated[0].clone());
        let err = f
            .service
            .create(
                &f.user,
                NewForm {
                    title: "Brief".to_string(),
                    fields: duplicated,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = f
            .service
            .create(
                &f.user,
                NewForm {
                    title: "Brief".to_string(),
                    project_id: Some(ProjectId::generate()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_toggle() {
        let f = fixture();
        let form = f
            .service
            .create(
                &f.user,
                NewForm {
                    title: "Brief".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = f
            .service
            .set_status(&f.user, &form.id, "archived")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let stranger = AgencyUser {
            account_id: AccountId::generate(),
            ..f.user.clone()
        };
        let err = f
            .service
            .set_status(&stranger, &form.id, "published")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let opened = f
            .service
            .set_status(&f.user, &form.id, "published")
            .await
            .unwrap();
        assert_eq!(opened.status, FormStatus::Published);
        assert!(opened.published_at.is_some());
    }

    #[tokio::test]
    async fn test_public_submission_logs_activity() {
        let f = fixture();
        let project = Project::new(f.user.account_id, None, "Website");
        f.storage.upsert_project(project.clone()).await.unwrap();
        let form = published(
            &f,
            NewForm {
                title: "Brief".to_string(),
                fields: fields(),
                project_id: Some(project.id),
                ..Default::default()
            },
        )
        .await;

        let submission = f
            .service
            .submit(
                &form.id,
                SubmissionRequest {
                    responses: answers(json!({"goal": "New site"})),
                    respondent_name: Some("Ada".to_string()),
                    respondent_email: Some("ada@example.com".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(submission.submission_number, 1);
        assert_eq!(submission.completed_fields, 1);
        assert_eq!(submission.completion_percentage, 50.0);

        let activities = f
            .storage
            .list_activities(&f.user.account_id, &project.id, 10)
            .await
            .unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].action, "form_submitted");
        assert_eq!(activities[0].metadata["activity_source"], "form");

        let stored = f.service.get(&f.user.account_id, &form.id).await.unwrap();
        assert_eq!(stored.total_submissions, 1);
        assert!(stored.last_submission_at.is_some());
    }

    #[tokio::test]
    async fn test_submission_rejections() {
        let f = fixture();
        let draft = f
            .service
            .create(
                &f.user,
                NewForm {
                    title: "Draft".to_string(),
                    fields: fields(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let request = || SubmissionRequest {
            responses: answers(json!({"goal": "x"})),
            ..Default::default()
        };

        let err = f.service.submit(&draft.id, request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = f.service.submit(&FormId::generate(), request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let capped = published(
            &f,
            NewForm {
                title: "Once".to_string(),
                fields: fields(),
                max_submissions: Some(1),
                ..Default::default()
            },
        )
        .await;
        let err = f
            .service
            .submit(
                &capped.id,
                SubmissionRequest {
                    responses: answers(json!({"budget": "5k+"})),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        f.service.submit(&capped.id, request()).await.unwrap();
        let err = f.service.submit(&capped.id, request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_portal_submission_and_check() {
        let f = fixture();
        let form = published(
            &f,
            NewForm {
                title: "Brief".to_string(),
                fields: fields(),
                ..Default::default()
            },
        )
        .await;
        let private = published(
            &f,
            NewForm {
                title: "Private".to_string(),
                ..Default::default()
            },
        )
        .await;
        // Re-addressed to a different client of the same account
        let mut scoped = private.clone();
        scoped.client_id = Some(ClientId::generate());
        f.storage.upsert_form(scoped.clone()).await.unwrap();

        let visible = f.service.list_for_client(&f.client).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, form.id);

        let before = f.service.check_submitted(&f.client, &form.id).await.unwrap();
        assert!(!before.submitted);

        let submission = f
            .service
            .submit_from_portal(&f.client, &form.id, answers(json!({"goal": "Shop"})))
            .await
            .unwrap();
        assert_eq!(submission.respondent_email.as_deref(), Some("ada@example.com"));
        assert_eq!(submission.respondent_name.as_deref(), Some("Ada"));

        let after = f.service.check_submitted(&f.client, &form.id).await.unwrap();
        assert!(after.submitted);
        assert_eq!(after.total_submissions, 1);

        let err = f
            .service
            .submit_from_portal(&f.client, &scoped.id, answers(json!({"x": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let mine = f
            .service
            .list_submissions(&f.user.account_id, &form.id, Some("ADA@example.com"))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        let none = f
            .service
            .list_submissions(&f.user.account_id, &form.id, Some("eve@example.com"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
