//! Brand profiles and the LLM-backed content generators

use crate::error::{IntegrationError, ServiceError, ServiceResult};
use crate::integrations::llm::parse_json_object;
use crate::integrations::CompletionClient;
use crate::storage::Storage;
use portico_types::{
    build_brand_prompt, growth::PLAN_SYSTEM_PROMPT, growth::MAX_POSTS_PER_WEEK,
    growth::MIN_POSTS_PER_WEEK, promo_distribution, AccountId, BrandProfile, PlanRequest,
    PostsRequest,
};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct GrowthService {
    storage: Arc<dyn Storage>,
    llm: Arc<dyn CompletionClient>,
}

impl GrowthService {
    pub fn new(storage: Arc<dyn Storage>, llm: Arc<dyn CompletionClient>) -> Self {
        Self { storage, llm }
    }

    /// The account's brand profile, or an empty one
    pub async fn brand_profile(&self, account_id: &AccountId) -> ServiceResult<BrandProfile> {
        let profile = self.storage.get_brand_profile(account_id).await?;
        Ok(profile.unwrap_or_else(|| BrandProfile {
            account_id: Some(*account_id),
            ..BrandProfile::default()
        }))
    }

    pub async fn save_brand_profile(
        &self,
        account_id: &AccountId,
        mut profile: BrandProfile,
    ) -> ServiceResult<BrandProfile> {
        profile.account_id = Some(*account_id);
        profile.topics.retain(|t| !t.trim().is_empty());
        profile.pinned_offers.retain(|o| !o.trim().is_empty());
        self.storage
            .upsert_brand_profile(account_id, profile.clone())
            .await?;
        tracing::info!(account_id = %account_id, "Brand profile saved");
        Ok(profile)
    }

    /// Generate a weekly growth plan as a JSON object
    pub async fn generate_plan(
        &self,
        account_id: &AccountId,
        request: PlanRequest,
    ) -> ServiceResult<Map<String, Value>> {
        if request.user_name.trim().is_empty() {
            return Err(ServiceError::BadRequest("User name is required".to_string()));
        }
        if !request.posts_per_week_in_range() {
            return Err(ServiceError::Validation(format!(
                "Posts per week must be between {} and {}",
                MIN_POSTS_PER_WEEK, MAX_POSTS_PER_WEEK
            )));
        }

        let profile = self.brand_profile(account_id).await?;
        let user_prompt = {
            let mut rng = rand::thread_rng();
            let brand_prompt = build_brand_prompt(&profile, request.include_promo, &mut rng);
            let total = request.posts_per_week as usize;
            let slots = if request.include_promo {
                promo_distribution(request.goal.promo_focus(), total, &mut rng)
            } else {
                vec![false; total]
            };
            request.prompt(&brand_prompt, &slots)
        };

        let content = self
            .llm
            .complete_json(PLAN_SYSTEM_PROMPT, &user_prompt)
            .await?;
        let plan = parse_json_object(&content)?;

        tracing::info!(
            account_id = %account_id,
            posts = request.posts_per_week,
            goal = request.goal.label(),
            "Growth plan generated"
        );
        Ok(plan)
    }

    /// Generate ad-hoc posts; the response must carry a `posts` array
    pub async fn generate_posts(
        &self,
        account_id: &AccountId,
        request: PostsRequest,
    ) -> ServiceResult<Map<String, Value>> {
        if request.prompt.trim().is_empty() {
            return Err(ServiceError::BadRequest("Prompt is required".to_string()));
        }

        let profile = self.brand_profile(account_id).await?;
        let system_prompt = {
            let mut rng = rand::thread_rng();
            let brand_prompt = build_brand_prompt(&profile, request.include_promo, &mut rng);
            request.system_prompt(&brand_prompt)
        };

        let content = self
            .llm
            .complete_json(&system_prompt, &request.user_prompt())
            .await?;
        let response = parse_json_object(&content)?;
        if !response.get("posts").is_some_and(Value::is_array) {
            return Err(IntegrationError::InvalidResponse(
                "completion had no posts array".to_string(),
            )
            .into());
        }

        tracing::info!(
            account_id = %account_id,
            platform = request.platform.as_str(),
            "Posts generated"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntegrationResult;
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use portico_types::{Goal, Platform, PlatformMode};
    use tokio::sync::Mutex;

    struct ScriptedLlm {
        reply: String,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedLlm {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedLlm {
        async fn complete_json(&self, system: &str, user: &str) -> IntegrationResult<String> {
            self.prompts
                .lock()
                .await
                .push((system.to_string(), user.to_string()));
            Ok(self.reply.clone())
        }
    }

    fn plan_request(posts_per_week: u32) -> PlanRequest {
        PlanRequest {
            user_name: "Jane".to_string(),
            industry: Some("design".to_string()),
            goal: Goal::Clients,
            topics: vec!["branding".to_string()],
            custom_focus: None,
            platform_mode: PlatformMode::Both,
            posts_per_week,
            schedule: vec!["morning".to_string()],
            include_promo: true,
        }
    }

    fn posts_request(prompt: &str) -> PostsRequest {
        PostsRequest {
            prompt: prompt.to_string(),
            platform: Platform::Linkedin,
            industry: None,
            include_promo: false,
        }
    }

    #[tokio::test]
    async fn test_brand_profile_defaults_and_saves() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let service = GrowthService::new(storage, ScriptedLlm::new("{}"));
        let account = AccountId::generate();

        let empty = service.brand_profile(&account).await.unwrap();
        assert_eq!(empty.account_id, Some(account));
        assert!(empty.topics.is_empty());

        let saved = service
            .save_brand_profile(
                &account,
                BrandProfile {
                    brand_name: Some("Acme".to_string()),
                    topics: vec!["ux".to_string(), " ".to_string()],
                    ..BrandProfile::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(saved.topics, vec!["ux".to_string()]);
        assert_eq!(
            service.brand_profile(&account).await.unwrap().brand_name.as_deref(),
            Some("Acme")
        );
    }

    #[tokio::test]
    async fn test_generate_plan_uses_brand_and_json_mode() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let llm = ScriptedLlm::new(r#"{"greeting": "Hi Jane", "posts": []}"#);
        let service = GrowthService::new(storage, llm.clone());

        let plan = service
            .generate_plan(&AccountId::generate(), plan_request(3))
            .await
            .unwrap();
        assert_eq!(plan["greeting"], "Hi Jane");

        let prompts = llm.prompts.lock().await;
        assert_eq!(prompts[0].0, PLAN_SYSTEM_PROMPT);
        assert!(prompts[0].1.contains("Posts per week: 3"));
    }

    #[tokio::test]
    async fn test_generate_plan_validation() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let service = GrowthService::new(storage, ScriptedLlm::new("{}"));

        let err = service
            .generate_plan(&AccountId::generate(), plan_request(15))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = service
            .generate_plan(&AccountId::generate(), plan_request(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_generate_plan_rejects_non_object_reply() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let service = GrowthService::new(storage, ScriptedLlm::new("[1, 2, 3]"));

        let err = service
            .generate_plan(&AccountId::generate(), plan_request(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Integration(_)));
    }

    #[tokio::test]
    async fn test_generate_posts() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let service = GrowthService::new(
            storage.clone(),
            ScriptedLlm::new(r#"{"posts": [{"content": "Ship it"}]}"#),
        );
        let posts = service
            .generate_posts(&AccountId::generate(), posts_request("launch week"))
            .await
            .unwrap();
        assert_eq!(posts["posts"][0]["content"], "Ship it");

        let err = service
            .generate_posts(&AccountId::generate(), posts_request("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let missing = GrowthService::new(storage, ScriptedLlm::new(r#"{"items": []}"#));
        let err = missing
            .generate_posts(&AccountId::generate(), posts_request("launch"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Integration(_)));
    }
}
