//! Project messages between the agency and its client

use crate::{AccountId, ClientId, MessageId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Client,
    #[serde(alias = "account_user")]
    User,
}

impl SenderType {
    /// The party whose unread messages a reader of this type clears
    pub fn counterpart(&self) -> SenderType {
        match self {
            SenderType::Client => SenderType::User,
            SenderType::User => SenderType::Client,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub account_id: AccountId,
    pub project_id: ProjectId,
    pub client_id: Option<ClientId>,
    pub sender_name: String,
    pub sender_type: SenderType,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub parent_message_id: Option<MessageId>,
    #[serde(default)]
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        account_id: AccountId,
        project_id: ProjectId,
        sender_type: SenderType,
        sender_name: impl Into<String>,
        content: &str,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            account_id,
            project_id,
            client_id: None,
            sender_name: sender_name.into(),
            sender_type,
            content: content.trim().to_string(),
            attachment: None,
            parent_message_id: None,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(now);
        }
    }
}
