//! Project message threads shared by the agency and its client

use super::{AgencyUser, PortalIdentity};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{ReadScope, Storage};
use chrono::Utc;
use portico_types::{
    AccountId, Attachment, ClientId, Message, MessageId, Project, ProjectId, SenderType,
};
use serde::Deserialize;
use std::sync::Arc;

/// Body of a new message
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub parent_message_id: Option<MessageId>,
}

/// Who is reading or writing a thread
#[derive(Debug, Clone, Copy)]
pub enum Participant<'a> {
    Client(&'a PortalIdentity),
    User(&'a AgencyUser),
}

impl Participant<'_> {
    fn account_id(&self) -> AccountId {
        match self {
            Participant::Client(identity) => identity.account_id,
            Participant::User(user) => user.account_id,
        }
    }

    fn sender_type(&self) -> SenderType {
        match self {
            Participant::Client(_) => SenderType::Client,
            Participant::User(_) => SenderType::User,
        }
    }

    fn name(&self) -> String {
        match self {
            Participant::Client(identity) => identity.display_name().to_string(),
            Participant::User(user) => user.user_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MessageService {
    storage: Arc<dyn Storage>,
}

impl MessageService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The project, checked against the participant's tenant and, for clients, their client
    async fn project_for(
        &self,
        participant: Participant<'_>,
        project_id: &ProjectId,
    ) -> ServiceResult<Project> {
        let project = self
            .storage
            .get_project(project_id)
            .await?
            .filter(|p| p.account_id == participant.account_id())
            .ok_or_else(|| ServiceError::NotFound("Project not found".to_string()))?;

        if let Participant::Client(identity) = participant {
            let client_id: ClientId = identity.require_client()?;
            if project.client_id != Some(client_id) {
                return Err(ServiceError::Forbidden(
                    "Project is not shared with this client".to_string(),
                ));
            }
        }
        Ok(project)
    }

    /// Messages of a project, oldest first
    pub async fn list(
        &self,
        participant: Participant<'_>,
        project_id: &ProjectId,
    ) -> ServiceResult<Vec<Message>> {
        let project = self.project_for(participant, project_id).await?;
        Ok(self
            .storage
            .list_messages(&project.account_id, &project.id)
            .await?)
    }

    pub async fn post(
        &self,
        participant: Participant<'_>,
        project_id: &ProjectId,
        body: NewMessage,
    ) -> ServiceResult<Message> {
        if body.content.trim().is_empty() && body.attachment.is_none() {
            return Err(ServiceError::BadRequest("Message content is required".to_string()));
        }
        let project = self.project_for(participant, project_id).await?;

        let mut message = Message::new(
            project.account_id,
            project.id,
            participant.sender_type(),
            participant.name(),
            &body.content,
        );
        message.client_id = project.client_id;
        message.attachment = body.attachment;
        message.parent_message_id = body.parent_message_id;

        self.storage.insert_message(message.clone()).await?;
        self.storage.touch_project(&project.id, message.created_at).await?;

        tracing::info!(
            project_id = %project.id,
            message_id = %message.id,
            sender = ?message.sender_type,
            "Message posted"
        );
        Ok(message)
    }

    /// Mark messages read. Without ids, every unread message from the other party is cleared.
    pub async fn mark_read(
        &self,
        participant: Participant<'_>,
        project_id: &ProjectId,
        ids: Option<Vec<MessageId>>,
    ) -> ServiceResult<usize> {
        let project = self.project_for(participant, project_id).await?;
        let scope = match ids {
            Some(ids) if !ids.is_empty() => ReadScope::Ids(ids),
            _ => ReadScope::FromSender(participant.sender_type().counterpart()),
        };

        let updated = self
            .storage
            .mark_messages_read(&project.account_id, &project.id, scope, Utc::now())
            .await?;
        tracing::debug!(project_id = %project.id, updated, "Messages marked read");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use portico_types::UserId;
    use tokio_test::{assert_err, assert_ok};

    struct Fixture {
        service: MessageService,
        project: Project,
        user: AgencyUser,
        client: PortalIdentity,
    }

    async fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let account_id = AccountId::generate();
        let client_id = ClientId::generate();
        let project = Project::new(account_id, Some(client_id), "Launch");
        storage.upsert_project(project.clone()).await.unwrap();

        Fixture {
            service: MessageService::new(storage),
            project,
            user: AgencyUser {
                account_id,
                user_id: UserId::generate(),
                user_name: "Jane".to_string(),
            },
            client: PortalIdentity {
                email: "ada@example.com".to_string(),
                name: Some("Ada".to_string()),
                role: None,
                account_id,
                client_id: Some(client_id),
                company_slug: "acme".to_string(),
                client_slug: "ada".to_string(),
            },
        }
    }

    fn text(content: &str) -> NewMessage {
        NewMessage {
            content: content.to_string(),
            attachment: None,
            parent_message_id: None,
        }
    }

    #[tokio::test]
    async fn test_thread_is_shared_and_ordered() {
        let f = fixture().await;
        f.service
            .post(Participant::User(&f.user), &f.project.id, text("Kickoff on Monday"))
            .await
            .unwrap();
        f.service
            .post(Participant::Client(&f.client), &f.project.id, text(" Sounds good "))
            .await
            .unwrap();

        let thread = f
            .service
            .list(Participant::Client(&f.client), &f.project.id)
            .await
            .unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].sender_type, SenderType::User);
        assert_eq!(thread[1].content, "Sounds good");
        assert_eq!(thread[1].sender_name, "Ada");
    }

    #[tokio::test]
    async fn test_mark_read_clears_other_party() {
        let f = fixture().await;
        f.service
            .post(Participant::User(&f.user), &f.project.id, text("one"))
            .await
            .unwrap();
        f.service
            .post(Participant::User(&f.user), &f.project.id, text("two"))
            .await
            .unwrap();
        f.service
            .post(Participant::Client(&f.client), &f.project.id, text("mine"))
            .await
            .unwrap();

        let cleared = assert_ok!(
            f.service
                .mark_read(Participant::Client(&f.client), &f.project.id, None)
                .await
        );
        assert_eq!(cleared, 2);

        let again = assert_ok!(
            f.service
                .mark_read(Participant::Client(&f.client), &f.project.id, None)
                .await
        );
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_access_rules() {
        let f = fixture().await;

        let err = assert_err!(
            f.service
                .post(Participant::User(&f.user), &f.project.id, text("  "))
                .await
        );
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let mut stranger = f.client.clone();
        stranger.client_id = Some(ClientId::generate());
        let err = f
            .service
            .list(Participant::Client(&stranger), &f.project.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let mut other_tenant = f.user.clone();
        other_tenant.account_id = AccountId::generate();
        let err = f
            .service
            .list(Participant::User(&other_tenant), &f.project.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
