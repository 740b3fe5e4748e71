//! Project activity feed with duplicate suppression

use super::AgencyUser;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::Storage;
use chrono::Duration;
use portico_types::{
    activity::DUPLICATE_WINDOW_SECS, AccountId, Activity, ActivitySource, ProjectId,
};
use serde::Serialize;
use std::sync::Arc;

/// Default and ceiling for feed page sizes
pub const DEFAULT_FEED_LIMIT: usize = 50;
pub const MAX_FEED_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogOutcome {
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
}

#[derive(Clone)]
pub struct ActivityService {
    storage: Arc<dyn Storage>,
}

impl ActivityService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn check_project(&self, account_id: &AccountId, project_id: &ProjectId) -> ServiceResult<()> {
        self.storage
            .get_project(project_id)
            .await?
            .filter(|p| p.account_id == *account_id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound("Project not found".to_string()))
    }

    /// Record an activity unless the same actor logged the same action on the
    /// project within the duplicate window.
    pub async fn log(
        &self,
        user: &AgencyUser,
        source: ActivitySource,
        action: &str,
        project_id: &ProjectId,
        metadata: serde_json::Value,
    ) -> ServiceResult<LogOutcome> {
        let action = action.trim();
        if action.is_empty() {
            return Err(ServiceError::BadRequest("Action is required".to_string()));
        }
        self.check_project(&user.account_id, project_id).await?;

        let activity = Activity::from_source(
            user.account_id,
            *project_id,
            source,
            action,
            user.user_id,
            &user.user_name,
            metadata,
        );

        let since = activity.created_at - Duration::seconds(DUPLICATE_WINDOW_SECS);
        let recent = self
            .storage
            .find_recent_activity(project_id, action, &user.user_id, since)
            .await?;
        if recent.is_some_and(|earlier| activity.duplicates(&earlier)) {
            tracing::debug!(project_id = %project_id, action, "Duplicate activity suppressed");
            return Ok(LogOutcome {
                duplicate: true,
                activity: None,
            });
        }

        self.storage.insert_activity(activity.clone()).await?;
        self.storage
            .touch_project(project_id, activity.created_at)
            .await?;

        tracing::info!(
            project_id = %project_id,
            activity_type = %activity.activity_type,
            action,
            "Activity logged"
        );
        Ok(LogOutcome {
            duplicate: false,
            activity: Some(activity),
        })
    }

    /// Newest activities first
    pub async fn list(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
        limit: Option<usize>,
    ) -> ServiceResult<Vec<Activity>> {
        self.check_project(account_id, project_id).await?;
        let limit = limit.unwrap_or(DEFAULT_FEED_LIMIT).clamp(1, MAX_FEED_LIMIT);
        Ok(self
            .storage
            .list_activities(account_id, project_id, limit)
            .await?)
    }
}
