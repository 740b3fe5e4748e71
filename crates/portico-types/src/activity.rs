//! Project activity feed

use crate::{AccountId, ActivityId, ProjectId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Window in which an identical (project, action, actor) entry counts as a duplicate
pub const DUPLICATE_WINDOW_SECS: i64 = 10;

/// Source of a logged activity, as sent by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    File,
    Invoice,
    Contract,
    Form,
    Project,
}

impl ActivitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySource::File => "file",
            ActivitySource::Invoice => "invoice",
            ActivitySource::Contract => "contract",
            ActivitySource::Form => "form",
            ActivitySource::Project => "project",
        }
    }

    /// Stored activity type. Only file events keep their own type.
    pub fn activity_type(&self) -> &'static str {
        match self {
            ActivitySource::File => "file",
            _ => "status_change",
        }
    }

    /// Value of `metadata.activity_source`; project events carry none.
    pub fn metadata_source(&self) -> Option<&'static str> {
        match self {
            ActivitySource::Project => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for ActivitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivitySource {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ActivitySource::File),
            "invoice" => Ok(ActivitySource::Invoice),
            "contract" => Ok(ActivitySource::Contract),
            "form" => Ok(ActivitySource::Form),
            "project" => Ok(ActivitySource::Project),
            other => Err(crate::ParseEnumError::new("activity type", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub account_id: AccountId,
    pub project_id: Option<ProjectId>,
    pub activity_type: String,
    pub action: String,
    pub actor_id: Option<UserId>,
    pub actor_name: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        account_id: AccountId,
        project_id: Option<ProjectId>,
        activity_type: impl Into<String>,
        action: impl Into<String>,
        actor_name: impl Into<String>,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            account_id,
            project_id,
            activity_type: activity_type.into(),
            action: action.into(),
            actor_id: None,
            actor_name: actor_name.into(),
            metadata: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    /// Build an activity from a caller-supplied source, merging the actor and
    /// source into the metadata object.
    pub fn from_source(
        account_id: AccountId,
        project_id: ProjectId,
        source: ActivitySource,
        action: impl Into<String>,
        actor_id: UserId,
        actor_name: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let actor_name = actor_name.into();
        let mut map = match metadata {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        map.insert("user_name".into(), serde_json::Value::String(actor_name.clone()));
        if let Some(src) = source.metadata_source() {
            map.insert("activity_source".into(), serde_json::Value::String(src.into()));
        }

        let mut activity = Self::new(
            account_id,
            Some(project_id),
            source.activity_type(),
            action,
            actor_name,
        );
        activity.actor_id = Some(actor_id);
        activity.metadata = serde_json::Value::Object(map);
        activity
    }

    /// Whether `self` repeats `earlier` within the duplicate window
    pub fn duplicates(&self, earlier: &Activity) -> bool {
        self.project_id == earlier.project_id
            && self.action == earlier.action
            && self.actor_id == earlier.actor_id
            && self.created_at - earlier.created_at < Duration::seconds(DUPLICATE_WINDOW_SECS)
            && self.created_at >= earlier.created_at
    }
}
